//! Prompting the text generator for a quiz and decoding its reply.

use super::question::{QuestionType, Quiz, QuizOutcome};
use super::QuizError;
use crate::adapters::{GenerationRequest, TextGenerator};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A validated quiz request.
#[derive(Debug, Clone)]
pub struct QuizRequest {
    pub word: Option<String>,
    pub topic: Option<String>,
    pub question_type: QuestionType,
    pub previous_question: Option<String>,
    /// Language the question is written in
    pub language_in: String,
    /// Language of answers and options
    pub language_out: String,
}

impl QuizRequest {
    /// Validate raw request fields. Blank strings count as missing.
    pub fn new(
        word: Option<String>,
        topic: Option<String>,
        question_type: Option<&str>,
    ) -> Result<Self, QuizError> {
        let word = non_blank(word);
        let topic = non_blank(topic);

        if word.is_none() && topic.is_none() {
            return Err(QuizError::MissingSubject);
        }

        let question_type = match question_type.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| QuizError::InvalidQuestionType(raw.to_string()))?,
            None => return Err(QuizError::MissingQuestionType),
        };

        Ok(Self {
            word,
            topic,
            question_type,
            previous_question: None,
            language_in: "English".to_string(),
            language_out: "Vietnamese".to_string(),
        })
    }

    pub fn with_previous_question(mut self, previous: Option<String>) -> Self {
        self.previous_question = non_blank(previous);
        self
    }

    pub fn with_languages(mut self, language_in: Option<String>, language_out: Option<String>) -> Self {
        if let Some(language_in) = non_blank(language_in) {
            self.language_in = language_in;
        }
        if let Some(language_out) = non_blank(language_out) {
            self.language_out = language_out;
        }
        self
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub struct QuizGenerator {
    generator: Arc<dyn TextGenerator>,
    model: String,
}

impl QuizGenerator {
    pub fn new(generator: Arc<dyn TextGenerator>, model: impl Into<String>) -> Self {
        Self { generator, model: model.into() }
    }

    #[instrument(skip(self, request), fields(question_type = %request.question_type))]
    pub async fn generate(&self, request: &QuizRequest) -> Result<QuizOutcome, QuizError> {
        let prompt = build_prompt(request);
        let reply = self
            .generator
            .generate(GenerationRequest::new(&self.model, prompt))
            .await?;

        debug!(reply_len = reply.len(), "Quiz reply received");
        Ok(decode_reply(&reply, request.question_type))
    }
}

/// Decode a model reply, degrading to the raw text on any mismatch.
pub fn decode_reply(reply: &str, expected: QuestionType) -> QuizOutcome {
    let text = strip_code_fences(reply);

    match serde_json::from_str::<Quiz>(text) {
        Ok(quiz) if quiz.payload.question_type() == expected => QuizOutcome::Parsed(quiz),
        Ok(quiz) => {
            warn!(expected = %expected, got = %quiz.payload.question_type(), "Quiz type mismatch");
            QuizOutcome::Unparsed {
                raw: text.to_string(),
                error: format!(
                    "expected question_type '{}' but model returned '{}'",
                    expected,
                    quiz.payload.question_type()
                ),
            }
        }
        Err(e) => {
            warn!(error = %e, "Quiz reply is not valid quiz JSON");
            QuizOutcome::Unparsed { raw: text.to_string(), error: e.to_string() }
        }
    }
}

/// Remove a surrounding markdown code fence such as ```` ```json ... ``` ````.
fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);

    // Skip the info string on the opening line.
    match inner.split_once('\n') {
        Some((info, body)) if info.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body.trim(),
        _ => inner.trim(),
    }
}

fn build_prompt(request: &QuizRequest) -> String {
    let lang_in = &request.language_in;
    let lang_out = &request.language_out;
    let word = request.word.as_deref().unwrap_or("pick one that fits the topic");
    let topic = request.topic.as_deref().unwrap_or("null");
    let previous = request.previous_question.as_deref().unwrap_or("none");

    format!(
        r#"You write JSON objects for bilingual vocabulary quizzes.

Reply with a single JSON object and nothing else (no markdown, no commentary):
{{
  "topic": "<topic or null>",
  "word": "<the word used, or null>",
  "question_type": "<type>",
  "question": "<question written in {lang_in}>",
  "answer": <string | array | object, in {lang_out}>,
  "options": <array | object, in {lang_out}>
}}

Content:
- Use the given word when there is one; otherwise choose a word related to the topic.
- Put the topic in "topic" when given, else null.
- "question_type" must be exactly the requested type.
- Do not repeat or closely paraphrase the previous question: "{previous}".
- Questions are in {lang_in}; answers and options are in {lang_out}.

Answer per type:
- fill_in_blank: one string in {lang_out}.
- translation: the {lang_in} -> {lang_out} translation, 6 to 8 words long.
- multiple_choice: one string in {lang_out}.
- match: an array of single-pair objects {lang_in} -> {lang_out}, e.g. [{{"home": "nhà"}}, {{"building": "tòa nhà"}}].

Options per type:
- multiple_choice and fill_in_blank: exactly 4 options in {lang_out}, one of them the answer, the other three unrelated words.
- match: {{"{lang_in}": ["w1", "w2", "w3", "w4"], "{lang_out}": ["m1", "m2", "m3", "m4"]}}
- translation: [].

Quiz to generate:
- Word: {word}
- Topic: {topic}
- Question type: {qtype}"#,
        qtype = request.question_type,
    )
}
