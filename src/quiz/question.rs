//! Quiz shapes returned to the client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    FillInBlank,
    Translation,
    MultipleChoice,
    Match,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::FillInBlank => "fill_in_blank",
            QuestionType::Translation => "translation",
            QuestionType::MultipleChoice => "multiple_choice",
            QuestionType::Match => "match",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fill_in_blank" => Ok(QuestionType::FillInBlank),
            "translation" => Ok(QuestionType::Translation),
            "multiple_choice" => Ok(QuestionType::MultipleChoice),
            "match" => Ok(QuestionType::Match),
            other => Err(format!("Unknown question type: {}", other)),
        }
    }
}

/// Answer and options, shaped by the question type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "question_type", rename_all = "snake_case")]
pub enum QuizPayload {
    FillInBlank {
        answer: String,
        options: Vec<String>,
    },
    Translation {
        answer: String,
        #[serde(default)]
        options: Vec<String>,
    },
    MultipleChoice {
        answer: String,
        options: Vec<String>,
    },
    Match {
        /// One `{source_word: target_word}` object per pair
        answer: Vec<BTreeMap<String, String>>,
        /// Word lists keyed by language name
        options: BTreeMap<String, Vec<String>>,
    },
}

impl QuizPayload {
    pub fn question_type(&self) -> QuestionType {
        match self {
            QuizPayload::FillInBlank { .. } => QuestionType::FillInBlank,
            QuizPayload::Translation { .. } => QuestionType::Translation,
            QuizPayload::MultipleChoice { .. } => QuestionType::MultipleChoice,
            QuizPayload::Match { .. } => QuestionType::Match,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub word: Option<String>,
    pub question: String,
    #[serde(flatten)]
    pub payload: QuizPayload,
}

/// A decoded quiz, or the raw model text when it could not be decoded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QuizOutcome {
    Parsed(Quiz),
    Unparsed { raw: String, error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_quiz_decodes() {
        let json = r#"{
            "topic": "house",
            "word": null,
            "question_type": "match",
            "question": "Match the words with their meanings",
            "answer": [{"home": "nhà"}, {"apartment": "căn hộ"}],
            "options": {"English": ["home", "apartment"], "Vietnamese": ["căn hộ", "nhà"]}
        }"#;

        let quiz: Quiz = serde_json::from_str(json).unwrap();
        assert_eq!(quiz.payload.question_type(), QuestionType::Match);
        assert_eq!(quiz.topic.as_deref(), Some("house"));
        match quiz.payload {
            QuizPayload::Match { answer, options } => {
                assert_eq!(answer[0].get("home").map(String::as_str), Some("nhà"));
                assert_eq!(options["Vietnamese"].len(), 2);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn serializes_flat_with_discriminant() {
        let quiz = Quiz {
            topic: None,
            word: Some("dog".to_string()),
            question: "Which word means 'dog'?".to_string(),
            payload: QuizPayload::MultipleChoice {
                answer: "chó".to_string(),
                options: vec!["chó".into(), "mèo".into(), "bàn".into(), "sông".into()],
            },
        };

        let value = serde_json::to_value(&quiz).unwrap();
        assert_eq!(value["question_type"], "multiple_choice");
        assert_eq!(value["answer"], "chó");
        assert_eq!(value["options"].as_array().unwrap().len(), 4);
        assert!(value["topic"].is_null());
    }

    #[test]
    fn question_type_parsing() {
        assert_eq!("fill_in_blank".parse::<QuestionType>().unwrap(), QuestionType::FillInBlank);
        assert_eq!("Translation".parse::<QuestionType>().unwrap(), QuestionType::Translation);
        assert!("essay".parse::<QuestionType>().is_err());
    }
}
