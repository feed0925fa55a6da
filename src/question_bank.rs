use rand::Rng;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::errors::BankError;
use crate::models::Question;

const BUILTIN_BANK: &str = include_str!("../data/questions.json");

fn blank_marker() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"_{3,}").expect("blank marker pattern is valid"))
}

/// Static, validated set of fill-in-the-blank questions.
#[derive(Debug, Clone)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        if questions.is_empty() {
            return Err(BankError::Empty);
        }

        let mut seen_ids = HashSet::new();
        for question in &questions {
            if question.answer.trim().is_empty() {
                return Err(BankError::EmptyAnswer(question.id.clone()));
            }
            if !blank_marker().is_match(&question.prompt) {
                return Err(BankError::MissingBlank(question.id.clone()));
            }
            if !seen_ids.insert(question.id.as_str()) {
                return Err(BankError::DuplicateId(question.id.clone()));
            }
        }

        let bank = Self { questions };
        debug!(
            question_count = bank.questions.len(),
            category_count = bank.categories().len(),
            "Question bank validated"
        );
        Ok(bank)
    }

    /// The anatomy bank compiled into the binary.
    pub fn builtin() -> Result<Self, BankError> {
        Self::from_json_str(BUILTIN_BANK)
    }

    pub fn from_json_str(json: &str) -> Result<Self, BankError> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let bank = Self::from_json_str(&contents)?;
        info!(
            path = %path.display(),
            question_count = bank.len(),
            "Loaded question bank from file"
        );
        Ok(bank)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Distinct categories in order of first appearance.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.questions
            .iter()
            .map(|q| q.category.as_str())
            .filter(|category| seen.insert(*category))
            .collect()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.questions.iter().any(|q| q.category == category)
    }

    pub fn category_count(&self, category: &str) -> usize {
        self.questions.iter().filter(|q| q.category == category).count()
    }

    /// Questions in bank order for `category`, or the whole bank when unset.
    pub fn by_category(&self, category: Option<&str>) -> Vec<Question> {
        match category {
            Some(category) => self
                .questions
                .iter()
                .filter(|q| q.category == category)
                .cloned()
                .collect(),
            None => self.questions.clone(),
        }
    }

    /// Category following `current` in declaration order, wrapping to the first.
    pub fn next_category(&self, current: &str) -> Option<&str> {
        let categories = self.categories();
        let position = categories.iter().position(|c| *c == current)?;
        categories.get((position + 1) % categories.len()).copied()
    }
}

/// Uniform Fisher-Yates permutation of a copy of `questions`.
pub fn shuffle<T: Clone>(questions: &[T]) -> Vec<T> {
    shuffle_with(questions, &mut rand::thread_rng())
}

pub fn shuffle_with<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    for i in (1..shuffled.len()).rev() {
        let j = rng.gen_range(0..=i);
        shuffled.swap(i, j);
    }
    shuffled
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn question(id: &str, category: &str) -> Question {
        Question {
            id: id.to_string(),
            category: category.to_string(),
            prompt: format!("The _______ is {}.", id),
            answer: id.to_string(),
            images: vec![],
        }
    }

    #[test]
    fn test_builtin_bank_loads() {
        let bank = QuestionBank::builtin().unwrap();
        assert_eq!(
            bank.categories(),
            vec!["Body Planes", "Directional Terms", "Organ Systems", "Specific Organs", "Histology"]
        );
        assert!(bank.category_count("Body Planes") > 0);
    }

    #[test]
    fn test_validation_rejects_bad_questions() {
        let mut no_answer = question("a", "X");
        no_answer.answer = "  ".to_string();
        assert!(matches!(QuestionBank::new(vec![no_answer]), Err(BankError::EmptyAnswer(_))));

        let mut no_blank = question("b", "X");
        no_blank.prompt = "What plane?".to_string();
        assert!(matches!(QuestionBank::new(vec![no_blank]), Err(BankError::MissingBlank(_))));

        let duplicate = vec![question("c", "X"), question("c", "Y")];
        assert!(matches!(QuestionBank::new(duplicate), Err(BankError::DuplicateId(_))));

        assert!(matches!(QuestionBank::new(vec![]), Err(BankError::Empty)));
    }

    #[test]
    fn test_by_category_filters_and_keeps_order() {
        let bank = QuestionBank::new(vec![
            question("a", "X"),
            question("b", "Y"),
            question("c", "X"),
        ])
        .unwrap();

        let ids: Vec<_> = bank.by_category(Some("X")).into_iter().map(|q| q.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(bank.by_category(None).len(), 3);
        assert!(bank.by_category(Some("Z")).is_empty());
    }

    #[test]
    fn test_next_category_wraps() {
        let bank = QuestionBank::new(vec![
            question("a", "X"),
            question("b", "Y"),
            question("c", "Z"),
        ])
        .unwrap();

        assert_eq!(bank.next_category("X"), Some("Y"));
        assert_eq!(bank.next_category("Z"), Some("X"));
        assert_eq!(bank.next_category("missing"), None);
    }

    #[test]
    fn test_shuffle_is_permutation_and_leaves_input_alone() {
        let input: Vec<u32> = (0..50).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let shuffled = shuffle_with(&input, &mut rng);

        assert_eq!(input, (0..50).collect::<Vec<_>>());
        assert_eq!(shuffled.len(), input.len());
        let mut sorted = shuffled.clone();
        sorted.sort();
        assert_eq!(sorted, input);
    }

    #[test]
    fn test_shuffle_handles_tiny_inputs() {
        assert!(shuffle::<u8>(&[]).is_empty());
        assert_eq!(shuffle(&[42]), vec![42]);
    }

    #[test]
    fn test_shuffle_is_roughly_uniform() {
        let input = [0usize, 1, 2];
        let mut counts = std::collections::HashMap::new();
        let mut rng = StdRng::seed_from_u64(1234);
        for _ in 0..6000 {
            *counts.entry(shuffle_with(&input, &mut rng)).or_insert(0usize) += 1;
        }

        // 3! orderings, each expected ~1000 times
        assert_eq!(counts.len(), 6);
        for count in counts.values() {
            assert!((800..1200).contains(count), "skewed count {}", count);
        }
    }
}
