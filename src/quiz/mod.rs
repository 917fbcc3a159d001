//! # Quiz Module
//!
//! Vocabulary quiz generation. A text-generation model writes the quiz as
//! JSON; the reply is decoded into a payload tagged by `question_type`:
//!
//! - **fill_in_blank**: string answer, 4 options
//! - **translation**: 6-8 word translated answer, no options
//! - **multiple_choice**: string answer, 4 options
//! - **match**: word pairs as answer, word lists per language as options
//!
//! Replies that cannot be decoded are passed back as `{raw, error}`.

pub mod generator;
pub mod question;

pub use generator::{QuizGenerator, QuizRequest};

use crate::adapters::AdapterError;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("Missing 'word' or 'topic'")]
    MissingSubject,

    #[error("Missing 'question_type'")]
    MissingQuestionType,

    #[error("Unknown question type '{0}'")]
    InvalidQuestionType(String),

    #[error("quiz generation failed: {0}")]
    Generation(#[from] AdapterError),
}
