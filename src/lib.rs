pub mod api;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod flag_store;
pub mod grading;
pub mod llm_providers;
pub mod llm_service;
pub mod logging;
pub mod models;
pub mod question_bank;
pub mod runner;
pub mod session;
pub mod session_store;
pub mod summary;

pub use config::Config;
pub use errors::*;
pub use flag_store::{FlagStore, InMemoryFlagStore, SqliteFlagStore, WELCOME_SEEN_KEY};
pub use grading::{GradingPipeline, GradingService};
pub use llm_providers::{JsonResponseParser, LLMProvider, LLMProviderFactory, LLMProviderType};
pub use llm_service::LLMService;
pub use models::*;
pub use question_bank::QuestionBank;
pub use runner::{QuizRunner, SharedSession, Submission};
pub use session::{QuizSession, SessionPhase, SessionView};
pub use session_store::SessionStore;
pub use summary::{SummaryPipeline, SummaryService};
