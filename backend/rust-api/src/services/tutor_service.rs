use crate::metrics::track_ai_request;
use crate::models::ai::{
    ChatRequest, ChatResponse, ChatRole, ExplainRequest, ExplainResponse, FeedbackRequest,
    FeedbackResponse, GenerateQuizRequest, GenerateQuizResponse, QuizQuestion,
};

use super::ai_client::{AiClient, AiError, TurnRole};

const TUTOR_PERSONA: &str = "You are a patient tutor on an education platform. \
     Answer clearly, stay on the learning topic and never invent citations.";

/// AI-assisted learning features: prompt construction and output parsing
/// around [`AiClient`].
#[derive(Clone)]
pub struct TutorService {
    client: AiClient,
}

impl TutorService {
    pub fn new(client: AiClient) -> Self {
        Self { client }
    }

    pub async fn generate_quiz(
        &self,
        req: &GenerateQuizRequest,
    ) -> Result<GenerateQuizResponse, AiError> {
        let difficulty = req.difficulty.as_deref().unwrap_or("medium");
        tracing::info!(
            "Generating quiz: topic={}, difficulty={}, count={}",
            req.topic,
            difficulty,
            req.question_count
        );

        let prompt = format!(
            "Write {count} multiple-choice questions about \"{topic}\" at {difficulty} difficulty.\n\
             Respond with JSON only: an array of objects with the keys \
             \"question\" (string), \"options\" (array of 4 strings), \
             \"correctIndex\" (0-based integer) and \"explanation\" (string).",
            count = req.question_count,
            topic = req.topic,
            difficulty = difficulty,
        );

        let text = track_ai_request(
            "quiz",
            self.client
                .generate(Some(TUTOR_PERSONA), &[(TurnRole::User, prompt)]),
        )
        .await?;

        let questions = parse_quiz(&text, req.question_count as usize)?;
        Ok(GenerateQuizResponse { questions })
    }

    pub async fn grade_feedback(&self, req: &FeedbackRequest) -> Result<FeedbackResponse, AiError> {
        let mut prompt = format!(
            "Give constructive feedback on a student's answer.\n\nQuestion:\n{}\n\nStudent answer:\n{}\n",
            req.question, req.answer
        );
        if let Some(rubric) = req.rubric.as_deref().filter(|r| !r.trim().is_empty()) {
            prompt.push_str(&format!("\nGrading rubric:\n{}\n", rubric));
        }
        prompt.push_str(
            "\nPoint out what is correct, what is missing and one concrete next step. \
             Keep it under 200 words.",
        );

        let feedback = track_ai_request(
            "feedback",
            self.client
                .generate(Some(TUTOR_PERSONA), &[(TurnRole::User, prompt)]),
        )
        .await?;

        Ok(FeedbackResponse {
            feedback: feedback.trim().to_string(),
        })
    }

    pub async fn explain_concept(&self, req: &ExplainRequest) -> Result<ExplainResponse, AiError> {
        let level = req.level.as_deref().unwrap_or("beginner");
        let prompt = format!(
            "Explain the concept \"{}\" to a {} learner. Use one short example.",
            req.concept, level
        );

        let explanation = track_ai_request(
            "explain",
            self.client
                .generate(Some(TUTOR_PERSONA), &[(TurnRole::User, prompt)]),
        )
        .await?;

        Ok(ExplainResponse {
            explanation: explanation.trim().to_string(),
        })
    }

    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, AiError> {
        let turns: Vec<(TurnRole, String)> = req
            .messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    ChatRole::User => TurnRole::User,
                    ChatRole::Assistant => TurnRole::Model,
                };
                (role, message.content.clone())
            })
            .collect();

        let reply = track_ai_request(
            "chat",
            self.client.generate(Some(TUTOR_PERSONA), &turns),
        )
        .await?;

        Ok(ChatResponse {
            reply: reply.trim().to_string(),
        })
    }
}

/// Pulls the JSON payload out of model output that may be wrapped in
/// markdown fences or surrounded by prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let end = text.rfind([']', '}'])?;
    (end > start).then(|| &text[start..=end])
}

fn parse_quiz(text: &str, limit: usize) -> Result<Vec<QuizQuestion>, AiError> {
    let json = extract_json(text)
        .ok_or_else(|| AiError::MalformedOutput("no JSON found in quiz output".to_string()))?;

    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| AiError::MalformedOutput(format!("quiz output is not valid JSON: {}", e)))?;

    // Models sometimes wrap the array in an object.
    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("questions") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(AiError::MalformedOutput(
                    "quiz output has no questions array".to_string(),
                ))
            }
        },
        _ => {
            return Err(AiError::MalformedOutput(
                "quiz output is not an array".to_string(),
            ))
        }
    };

    let total = items.len();
    let questions: Vec<QuizQuestion> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<QuizQuestion>(item).ok())
        .filter(QuizQuestion::is_well_formed)
        .take(limit)
        .collect();

    if questions.is_empty() {
        return Err(AiError::MalformedOutput(
            "quiz output contained no usable questions".to_string(),
        ));
    }
    if questions.len() < total.min(limit) {
        tracing::warn!(
            "Dropped {} malformed quiz questions",
            total.min(limit) - questions.len()
        );
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fenced_array() {
        let text = "Here you go:\n```json\n[{\"question\":\"2+2?\",\"options\":[\"3\",\"4\"],\"correctIndex\":1}]\n```";
        let questions = parse_quiz(text, 5).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].options[questions[0].correct_index], "4");
    }

    #[test]
    fn accepts_wrapped_object_and_truncates() {
        let text = r#"{"questions":[
            {"question":"a","options":["x","y"],"correctIndex":0},
            {"question":"b","options":["x","y"],"correctIndex":1},
            {"question":"c","options":["x","y"],"correctIndex":1}
        ]}"#;
        let questions = parse_quiz(text, 2).unwrap();
        assert_eq!(
            questions.iter().map(|q| q.question.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn drops_malformed_questions() {
        let text = r#"[
            {"question":"bad index","options":["x","y"],"correctIndex":7},
            {"question":"missing options"},
            {"question":"ok","options":["x","y","z"],"correctIndex":2}
        ]"#;
        let questions = parse_quiz(text, 10).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "ok");
    }

    #[test]
    fn prose_only_output_is_malformed() {
        assert!(matches!(
            parse_quiz("Sorry, I cannot help with that.", 3),
            Err(AiError::MalformedOutput(_))
        ));
    }
}
