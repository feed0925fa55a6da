use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub category: String,
    pub prompt: String, // Contains a blank marker, e.g. "The _______ plane ..."
    pub answer: String,
    #[serde(default)]
    pub images: Vec<String>, // Reference asset paths, display order
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Practice,
    Exam,
}

impl Mode {
    /// Whether verdict, feedback and hint are shown while the quiz is running.
    pub fn reveals_feedback(self) -> bool {
        matches!(self, Mode::Practice)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Practice => write!(f, "practice"),
            Mode::Exam => write!(f, "exam"),
        }
    }
}

/// Grading model tiers offered to the learner, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradingModel {
    #[serde(rename = "ministral-3")]
    Ministral3,
    MistralSmall,
    MagistralSmall,
    #[default]
    MistralMedium,
    MagistralMedium,
    MistralLarge,
}

impl GradingModel {
    pub const ALL: [GradingModel; 6] = [
        GradingModel::Ministral3,
        GradingModel::MistralSmall,
        GradingModel::MagistralSmall,
        GradingModel::MistralMedium,
        GradingModel::MagistralMedium,
        GradingModel::MistralLarge,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GradingModel::Ministral3 => "ministral-3",
            GradingModel::MistralSmall => "mistral-small",
            GradingModel::MagistralSmall => "magistral-small",
            GradingModel::MistralMedium => "mistral-medium",
            GradingModel::MagistralMedium => "magistral-medium",
            GradingModel::MistralLarge => "mistral-large",
        }
    }

    /// Model id sent to the chat completions endpoint.
    pub fn api_model_id(self) -> &'static str {
        match self {
            GradingModel::Ministral3 => "ministral-3",
            GradingModel::MistralSmall | GradingModel::MagistralSmall => "mistral-small-latest",
            GradingModel::MistralMedium | GradingModel::MagistralMedium => "mistral-medium-latest",
            GradingModel::MistralLarge => "mistral-large-latest",
        }
    }

    /// Lenient parse for callers that accept free-form tier names. Unknown names fall back to the default.
    pub fn parse_or_default(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl fmt::Display for GradingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GradingModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        GradingModel::ALL
            .into_iter()
            .find(|model| model.as_str() == wanted)
            .ok_or_else(|| format!("unknown grading model '{}'", s))
    }
}

/// One entry in the session's append-only result ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub summary: String,
    pub improvement_tips: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeSource {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub is_correct: bool,
    pub feedback: String,
    pub hint: String,
    pub source: OutcomeSource,
}

/// Payload sent to the semantic grading collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub category: String,
    #[serde(default)]
    pub model: GradingModel,
}

/// Verdict returned by the semantic grading collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeVerdict {
    pub is_correct: bool,
    pub feedback: String,
    pub hint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    pub results: Vec<ResultRecord>,
    #[serde(default)]
    pub model: GradingModel,
}
