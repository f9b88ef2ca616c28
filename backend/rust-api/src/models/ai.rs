use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateQuizRequest {
    #[validate(length(
        min = 1,
        max = 200,
        message = "Topic must be between 1 and 200 characters"
    ))]
    pub topic: String,

    #[validate(custom(function = "validate_difficulty"))]
    pub difficulty: Option<String>,

    #[serde(default = "default_question_count")]
    #[validate(range(min = 1, max = 20, message = "questionCount must be between 1 and 20"))]
    pub question_count: u32,
}

fn default_question_count() -> u32 {
    5
}

fn validate_difficulty(value: &str) -> Result<(), ValidationError> {
    match value {
        "easy" | "medium" | "hard" => Ok(()),
        _ => Err(ValidationError::new("difficulty")
            .with_message("difficulty must be easy, medium or hard".into())),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl QuizQuestion {
    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() >= 2
            && self.correct_index < self.options.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateQuizResponse {
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FeedbackRequest {
    #[validate(length(min = 1, max = 2000, message = "Question must not be empty"))]
    pub question: String,

    #[validate(length(min = 1, max = 10000, message = "Answer must not be empty"))]
    pub answer: String,

    #[validate(length(max = 4000))]
    pub rubric: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub feedback: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExplainRequest {
    #[validate(length(min = 1, max = 300, message = "Concept must not be empty"))]
    pub concept: String,

    /// Audience level, e.g. "beginner".
    #[validate(length(max = 50))]
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[validate(length(min = 1, max = 8000, message = "Message content must not be empty"))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(
        length(min = 1, max = 50, message = "Between 1 and 50 messages required"),
        nested,
        custom(function = "validate_last_turn")
    )]
    pub messages: Vec<ChatMessage>,
}

fn validate_last_turn(messages: &[ChatMessage]) -> Result<(), ValidationError> {
    match messages.last() {
        Some(last) if last.role == ChatRole::User => Ok(()),
        _ => Err(ValidationError::new("messages")
            .with_message("The last message must come from the user".into())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
}
