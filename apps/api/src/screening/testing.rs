//! Scripted in-memory backend for engine tests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::backend_client::wire::PreScreeningPayload;
use crate::backend_client::{
    BackendError, FeedbackResult, GeneratedInterview, NewQuestion, ProgressEvent, ProgressSink,
    ScreeningBackend,
};
use crate::models::prescreening::{
    ChannelAgents, Channels, PreScreeningRecord, PublishResult, Vacancy,
};
use crate::models::question::{Question, QuestionSet, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    Generate,
    Feedback,
    Reorder,
    Add,
    Delete,
    Save,
    Publish,
    Status,
    GetPreScreening,
    GetVacancy,
}

#[derive(Default)]
struct Script {
    calls: HashMap<Call, u32>,
    /// Status codes of the next failures, per capability.
    failures: HashMap<Call, VecDeque<u16>>,
    delays: HashMap<Call, Duration>,
    generated: VecDeque<QuestionSet>,
    feedback: VecDeque<QuestionSet>,
    progress: Vec<ProgressEvent>,
    session_id: Option<String>,
    record: Option<PreScreeningRecord>,
    saved: Vec<PreScreeningPayload>,
    next_id: u32,
    last_description: Option<String>,
    last_session: Option<String>,
    last_channels: Option<Channels>,
}

#[derive(Default)]
pub struct MockBackend {
    script: Mutex<Script>,
}

impl MockBackend {
    /// Three knockout and three qualifying questions with ids prefixed by `prefix`.
    pub fn sample_set(prefix: &str) -> QuestionSet {
        let knockout = (1..=3)
            .map(|i| Question::new(format!("{prefix}-K{i}"), QuestionType::Knockout, format!("Knockout {i}?")))
            .collect();
        let qualifying = (1..=3)
            .map(|i| {
                Question::new(format!("{prefix}-Q{i}"), QuestionType::Qualifying, format!("Qualifying {i}?"))
                    .with_ideal_answer(format!("Ideal {i}"))
            })
            .collect();
        QuestionSet::new(knockout, qualifying)
    }

    pub fn fail_next(&self, call: Call, times: usize) {
        let mut script = self.script.lock();
        let queue = script.failures.entry(call).or_default();
        queue.extend(std::iter::repeat(503).take(times));
    }

    /// Fails the next call with a non-retryable status.
    pub fn reject_next(&self, call: Call, status: u16) {
        self.script
            .lock()
            .failures
            .entry(call)
            .or_default()
            .push_back(status);
    }

    /// Every later call of `call` waits `delay` before answering.
    pub fn delay(&self, call: Call, delay: Duration) {
        self.script.lock().delays.insert(call, delay);
    }

    pub fn queue_generated(&self, set: QuestionSet) {
        self.script.lock().generated.push_back(set);
    }

    pub fn queue_feedback(&self, set: QuestionSet) {
        self.script.lock().feedback.push_back(set);
    }

    pub fn with_progress(&self, events: Vec<ProgressEvent>) {
        self.script.lock().progress = events;
    }

    pub fn with_record(&self, record: PreScreeningRecord) {
        self.script.lock().record = Some(record);
    }

    pub fn set_session_id(&self, session_id: &str) {
        self.script.lock().session_id = Some(session_id.to_string());
    }

    pub fn calls(&self, call: Call) -> u32 {
        self.script.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn saved(&self) -> Vec<PreScreeningPayload> {
        self.script.lock().saved.clone()
    }

    pub fn last_description(&self) -> Option<String> {
        self.script.lock().last_description.clone()
    }

    pub fn last_session(&self) -> Option<String> {
        self.script.lock().last_session.clone()
    }

    pub fn last_channels(&self) -> Option<Channels> {
        self.script.lock().last_channels
    }

    /// Counts the call, waits the configured delay, then pops a scripted failure if any.
    async fn enter(&self, call: Call) -> Result<(), BackendError> {
        let delay = {
            let mut script = self.script.lock();
            *script.calls.entry(call).or_default() += 1;
            script.delays.get(&call).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self
            .script
            .lock()
            .failures
            .get_mut(&call)
            .and_then(|queue| queue.pop_front());
        match failure {
            Some(status) => Err(BackendError::Api {
                status,
                message: format!("scripted failure ({status})"),
            }),
            None => Ok(()),
        }
    }

    fn emit_progress(&self, progress: ProgressSink<'_>) {
        let events = self.script.lock().progress.clone();
        for event in events {
            progress(event);
        }
    }
}

#[async_trait]
impl ScreeningBackend for MockBackend {
    async fn generate_interview(
        &self,
        vacancy_text: &str,
        session_id: Option<&str>,
        progress: ProgressSink<'_>,
    ) -> Result<GeneratedInterview, BackendError> {
        let questions = {
            let mut script = self.script.lock();
            script.last_description = Some(vacancy_text.to_string());
            script.last_session = session_id.map(str::to_string);
            script
                .generated
                .pop_front()
                .unwrap_or_else(|| Self::sample_set("gen"))
        };
        self.emit_progress(progress);
        self.enter(Call::Generate).await?;
        let session_id = self
            .script
            .lock()
            .session_id
            .clone()
            .or_else(|| session_id.map(str::to_string))
            .unwrap_or_else(|| "vac-1".to_string());
        Ok(GeneratedInterview {
            session_id,
            questions,
            message: "Here is a first draft of the screening.".to_string(),
        })
    }

    async fn send_feedback(
        &self,
        session_id: &str,
        _message: &str,
        progress: ProgressSink<'_>,
    ) -> Result<FeedbackResult, BackendError> {
        let questions = {
            let mut script = self.script.lock();
            script.last_session = Some(session_id.to_string());
            script.feedback.pop_front()
        };
        self.emit_progress(progress);
        self.enter(Call::Feedback).await?;
        Ok(FeedbackResult {
            questions: questions.ok_or(BackendError::EmptyResult)?,
            message: "Updated the questions as requested.".to_string(),
        })
    }

    async fn reorder_questions(
        &self,
        _session_id: &str,
        _knockout_order: &[String],
        _qualifying_order: &[String],
    ) -> Result<(), BackendError> {
        self.enter(Call::Reorder).await
    }

    async fn add_question(
        &self,
        _session_id: &str,
        question: &NewQuestion,
    ) -> Result<Question, BackendError> {
        self.enter(Call::Add).await?;
        let id = {
            let mut script = self.script.lock();
            script.next_id += 1;
            format!("srv-{}", script.next_id)
        };
        let mut created = Question::new(id, question.question_type, question.text.clone());
        created.ideal_answer = question.ideal_answer.clone();
        Ok(created)
    }

    async fn delete_question(&self, _session_id: &str, _question_id: &str) -> Result<(), BackendError> {
        self.enter(Call::Delete).await
    }

    async fn save_pre_screening(
        &self,
        _vacancy_id: &str,
        payload: &PreScreeningPayload,
    ) -> Result<(), BackendError> {
        self.enter(Call::Save).await?;
        self.script.lock().saved.push(payload.clone());
        Ok(())
    }

    async fn publish_pre_screening(
        &self,
        vacancy_id: &str,
        channels: Channels,
    ) -> Result<PublishResult, BackendError> {
        self.enter(Call::Publish).await?;
        self.script.lock().last_channels = Some(channels);
        Ok(PublishResult {
            published_at: Utc::now(),
            is_online: true,
            agents: ChannelAgents {
                voice_agent_id: channels.voice.then(|| format!("voice-{vacancy_id}")),
                whatsapp_agent_id: channels.whatsapp.then(|| format!("wa-{vacancy_id}")),
            },
        })
    }

    async fn update_pre_screening_status(
        &self,
        _vacancy_id: &str,
        is_online: bool,
    ) -> Result<bool, BackendError> {
        self.enter(Call::Status).await?;
        Ok(is_online)
    }

    async fn get_pre_screening(
        &self,
        _vacancy_id: &str,
    ) -> Result<Option<PreScreeningRecord>, BackendError> {
        self.enter(Call::GetPreScreening).await?;
        Ok(self.script.lock().record.clone())
    }

    async fn get_vacancy(&self, vacancy_id: &str) -> Result<Vacancy, BackendError> {
        self.enter(Call::GetVacancy).await?;
        Ok(Vacancy {
            id: vacancy_id.to_string(),
            title: "Warehouse operative".to_string(),
            company: Some("Acme Logistics".to_string()),
            location: None,
            description: "Picking and packing orders in a cold store.".to_string(),
        })
    }
}

/// Lets spawned timer and request tasks run up to their next suspension point.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
