//! JSON shapes exchanged with the screening backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::prescreening::{
    ChannelAgents, Channels, PreScreeningRecord, PublishRecord, PublishResult, ScreeningMessages,
    Vacancy,
};
use crate::models::question::{ChangeStatus, Question, QuestionSet, QuestionType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireQuestion {
    pub id: String,
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_status: Option<ChangeStatus>,
}

impl WireQuestion {
    pub fn into_question(self, question_type: QuestionType) -> Question {
        let mut question = Question::new(self.id, question_type, self.question);
        question.ideal_answer = match question_type {
            QuestionType::Qualifying => self.ideal_answer,
            QuestionType::Knockout => None,
        };
        question.change_status = self.change_status;
        question
    }

    fn from_question(question: &Question) -> Self {
        Self {
            id: question.id.clone(),
            question: question.text.clone(),
            ideal_answer: question.ideal_answer.clone(),
            change_status: None,
        }
    }
}

fn into_question_set(knockout: Vec<WireQuestion>, qualifying: Vec<WireQuestion>) -> QuestionSet {
    QuestionSet {
        knockout: knockout
            .into_iter()
            .map(|q| q.into_question(QuestionType::Knockout))
            .collect(),
        qualifying: qualifying
            .into_iter()
            .map(|q| q.into_question(QuestionType::Qualifying))
            .collect(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Generation / feedback
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct GenerateInterviewRequest<'a> {
    pub vacancy_text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct FeedbackRequest<'a> {
    pub session_id: &'a str,
    pub message: &'a str,
}

/// Final payload of a generation or feedback stream.
#[derive(Debug, Deserialize)]
pub struct InterviewPayload {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub knockout_questions: Vec<WireQuestion>,
    #[serde(default)]
    pub qualification_questions: Vec<WireQuestion>,
}

impl InterviewPayload {
    pub fn into_question_set(self) -> (Option<String>, String, QuestionSet) {
        let questions = into_question_set(self.knockout_questions, self.qualification_questions);
        (self.session_id, self.message, questions)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Question mutations
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ReorderRequest<'a> {
    pub session_id: &'a str,
    pub knockout_order: &'a [String],
    pub qualification_order: &'a [String],
}

#[derive(Debug, Serialize)]
pub struct AddQuestionRequest<'a> {
    pub session_id: &'a str,
    pub question_type: QuestionType,
    pub question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ideal_answer: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct DeleteQuestionRequest<'a> {
    pub session_id: &'a str,
    pub question_id: &'a str,
}

// ────────────────────────────────────────────────────────────────────────────
// Persistence / publishing
// ────────────────────────────────────────────────────────────────────────────

/// Full snapshot sent to `savePreScreening`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreScreeningPayload {
    pub intro: String,
    pub knockout_questions: Vec<WireQuestion>,
    pub knockout_failed_action: String,
    pub qualification_questions: Vec<WireQuestion>,
    pub final_action: String,
    pub approved_ids: Vec<String>,
}

impl PreScreeningPayload {
    /// Builds the save payload. Questions still waiting for a server id are left out.
    pub fn build(questions: &QuestionSet, messages: &ScreeningMessages) -> Self {
        let confirmed = |list: &[Question]| -> Vec<WireQuestion> {
            list.iter()
                .filter(|q| !q.is_temporary())
                .map(WireQuestion::from_question)
                .collect()
        };
        let knockout_questions = confirmed(&questions.knockout);
        let qualification_questions = confirmed(&questions.qualifying);
        let approved_ids = knockout_questions
            .iter()
            .chain(qualification_questions.iter())
            .map(|q| q.id.clone())
            .collect();

        Self {
            intro: messages.intro.clone(),
            knockout_questions,
            knockout_failed_action: messages.knockout_failed_action.clone(),
            qualification_questions,
            final_action: messages.final_action.clone(),
            approved_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PreScreeningResponse {
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub knockout_questions: Vec<WireQuestion>,
    #[serde(default)]
    pub knockout_failed_action: Option<String>,
    #[serde(default)]
    pub qualification_questions: Vec<WireQuestion>,
    #[serde(default)]
    pub final_action: Option<String>,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_online: Option<bool>,
    #[serde(default)]
    pub voice_enabled: bool,
    #[serde(default)]
    pub whatsapp_enabled: bool,
    #[serde(default)]
    pub elevenlabs_agent_id: Option<String>,
    #[serde(default)]
    pub whatsapp_agent_id: Option<String>,
}

impl From<PreScreeningResponse> for PreScreeningRecord {
    fn from(response: PreScreeningResponse) -> Self {
        let defaults = ScreeningMessages::default();
        let messages = ScreeningMessages {
            intro: response.intro.unwrap_or(defaults.intro),
            knockout_failed_action: response
                .knockout_failed_action
                .unwrap_or(defaults.knockout_failed_action),
            final_action: response.final_action.unwrap_or(defaults.final_action),
        };
        // A stray online flag on a never-published record is ignored.
        let is_online = response.published_at.and(response.is_online);
        PreScreeningRecord {
            questions: into_question_set(
                response.knockout_questions,
                response.qualification_questions,
            ),
            messages,
            publish: PublishRecord {
                published_at: response.published_at,
                is_online,
                channels: Channels {
                    voice: response.voice_enabled,
                    whatsapp: response.whatsapp_enabled,
                },
                agents: ChannelAgents {
                    voice_agent_id: response.elevenlabs_agent_id,
                    whatsapp_agent_id: response.whatsapp_agent_id,
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublishRequest {
    pub enable_voice: bool,
    pub enable_whatsapp: bool,
}

#[derive(Debug, Deserialize)]
pub struct PublishResponse {
    pub published_at: DateTime<Utc>,
    pub is_online: bool,
    #[serde(default)]
    pub elevenlabs_agent_id: Option<String>,
    #[serde(default)]
    pub whatsapp_agent_id: Option<String>,
}

impl From<PublishResponse> for PublishResult {
    fn from(response: PublishResponse) -> Self {
        PublishResult {
            published_at: response.published_at,
            is_online: response.is_online,
            agents: ChannelAgents {
                voice_agent_id: response.elevenlabs_agent_id,
                whatsapp_agent_id: response.whatsapp_agent_id,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusPayload {
    pub is_online: bool,
}

#[derive(Debug, Deserialize)]
pub struct VacancyResponse {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl From<VacancyResponse> for Vacancy {
    fn from(response: VacancyResponse) -> Self {
        Vacancy {
            id: response.id,
            title: response.title,
            company: response.company,
            location: response.location,
            description: response.description,
        }
    }
}
