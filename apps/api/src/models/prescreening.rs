use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::QuestionSet;

/// Outbound channels a published question set can be served on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channels {
    pub voice: bool,
    pub whatsapp: bool,
}

impl Channels {
    pub fn any(&self) -> bool {
        self.voice || self.whatsapp
    }
}

/// Provider-assigned agent ids, one per activated channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAgents {
    pub voice_agent_id: Option<String>,
    pub whatsapp_agent_id: Option<String>,
}

/// Publication state of a vacancy's question set.
///
/// `is_online == None` means draft. It can only become `Some` once `published_at` is set,
/// and `published_at` never returns to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishRecord {
    pub published_at: Option<DateTime<Utc>>,
    pub is_online: Option<bool>,
    pub channels: Channels,
    #[serde(default)]
    pub agents: ChannelAgents,
}

/// Fixed texts framing the questions during a screening conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningMessages {
    pub intro: String,
    pub knockout_failed_action: String,
    pub final_action: String,
}

impl Default for ScreeningMessages {
    fn default() -> Self {
        Self {
            intro: "Hi! Thanks for your interest in this role. I have a few short questions for you."
                .to_string(),
            knockout_failed_action:
                "Thank you for your time. Unfortunately this role is not a match right now."
                    .to_string(),
            final_action: "Thanks, that was the last question. A recruiter will follow up soon."
                .to_string(),
        }
    }
}

/// Vacancy metadata as imported from the ATS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vacancy {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub description: String,
}

/// Pre-screening as last persisted by the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct PreScreeningRecord {
    pub questions: QuestionSet,
    pub messages: ScreeningMessages,
    pub publish: PublishRecord,
}

/// Result of activating channels for a vacancy.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishResult {
    pub published_at: DateTime<Utc>,
    pub is_online: bool,
    pub agents: ChannelAgents,
}
