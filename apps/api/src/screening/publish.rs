//! Publish state machine: draft → online ⇄ offline.
//!
//! `published_at` is only ever written by a successful publish, so once set it can never
//! become null again. Every transition commits only after the backend has confirmed it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::backend_client::BackendError;
use crate::errors::AppError;
use crate::models::prescreening::{Channels, PublishRecord, PublishResult};
use crate::screening::editor::{Editor, EditorState, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Draft,
    Online,
    Offline,
}

impl PublishRecord {
    pub fn state(&self) -> PublishState {
        match (self.published_at, self.is_online) {
            (None, _) => PublishState::Draft,
            (Some(_), Some(false)) => PublishState::Offline,
            (Some(_), _) => PublishState::Online,
        }
    }

    pub fn is_published(&self) -> bool {
        self.published_at.is_some()
    }

    fn commit_publish(&mut self, channels: Channels, result: PublishResult) {
        self.published_at = Some(latest(self.published_at, result.published_at));
        self.is_online = Some(result.is_online);
        self.channels = channels;
        self.agents = result.agents;
    }

    fn commit_online(&mut self, online: bool) -> Result<(), AppError> {
        if !self.is_published() {
            return Err(AppError::InvalidTransition(
                "A draft cannot go online or offline before it is published".to_string(),
            ));
        }
        self.is_online = Some(online);
        Ok(())
    }
}

fn latest(previous: Option<DateTime<Utc>>, published_at: DateTime<Utc>) -> DateTime<Utc> {
    previous.map_or(published_at, |previous| previous.max(published_at))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusChange {
    Committed,
    /// Taking a published set offline stops new candidates; the caller must confirm.
    ConfirmationRequired,
}

impl Editor {
    /// Persists the current questions, then activates `channels`. Also used to republish
    /// with a different channel selection.
    pub async fn publish(self: &Arc<Self>, channels: Channels) -> Result<PublishRecord, AppError> {
        if !channels.any() {
            return Err(AppError::Validation(
                "Select at least one channel to publish on".to_string(),
            ));
        }
        self.detached(move |editor| async move {
            editor.persist(Operation::Publish).await?;
            editor.activate_channels(Operation::Publish, channels).await
        })
        .await
    }

    /// Saves edits and re-applies the existing channel selection. Only while online.
    pub async fn save_and_update_channels(self: &Arc<Self>) -> Result<PublishRecord, AppError> {
        let channels = {
            let state = self.state.lock();
            if state.publish.state() != PublishState::Online {
                return Err(AppError::InvalidTransition(
                    "Channels can only be updated while the screening is online".to_string(),
                ));
            }
            state.publish.channels
        };
        self.detached(move |editor| async move {
            editor.persist(Operation::UpdateChannels).await?;
            editor.activate_channels(Operation::UpdateChannels, channels).await
        })
        .await
    }

    async fn activate_channels(
        self: &Arc<Self>,
        operation: Operation,
        channels: Channels,
    ) -> Result<PublishRecord, AppError> {
        let result = self
            .backend
            .publish_pre_screening(self.vacancy_id(), channels)
            .await;

        let mut state = self.state.lock();
        if state.closed {
            return Err(AppError::ContextClosed);
        }
        match result {
            Ok(published) => {
                let from = state.publish.state();
                state.publish.commit_publish(channels, published);
                info!(
                    "Vacancy {} published ({:?} -> {:?}), voice={}, whatsapp={}",
                    self.vacancy_id(),
                    from,
                    state.publish.state(),
                    channels.voice,
                    channels.whatsapp
                );
                Ok(state.publish.clone())
            }
            Err(e) => Err(self.transition_failed(&mut state, operation, e)),
        }
    }

    /// Flips the online flag of a published set. Going offline needs `confirmed`.
    pub async fn set_online(
        self: &Arc<Self>,
        online: bool,
        confirmed: bool,
    ) -> Result<StatusChange, AppError> {
        {
            let state = self.state.lock();
            if state.closed {
                return Err(AppError::ContextClosed);
            }
            if !state.publish.is_published() {
                return Err(AppError::InvalidTransition(
                    "Publish the questions before changing their online status".to_string(),
                ));
            }
            if state.publish.is_online == Some(online) {
                return Ok(StatusChange::Committed);
            }
        }
        if !online && !confirmed {
            return Ok(StatusChange::ConfirmationRequired);
        }
        self.detached(move |editor| async move { editor.commit_status(online).await })
            .await
    }

    async fn commit_status(self: &Arc<Self>, online: bool) -> Result<StatusChange, AppError> {
        let result = self
            .backend
            .update_pre_screening_status(self.vacancy_id(), online)
            .await;

        let mut state = self.state.lock();
        if state.closed {
            return Err(AppError::ContextClosed);
        }
        match result {
            Ok(is_online) => {
                let from = state.publish.state();
                state.publish.commit_online(is_online)?;
                info!(
                    "Vacancy {} status {:?} -> {:?}",
                    self.vacancy_id(),
                    from,
                    state.publish.state()
                );
                Ok(StatusChange::Committed)
            }
            Err(e) => Err(self.transition_failed(&mut state, Operation::StatusChange, e)),
        }
    }

    fn transition_failed(
        &self,
        state: &mut EditorState,
        operation: Operation,
        error: BackendError,
    ) -> AppError {
        warn!("{} failed for vacancy {}: {}", operation.as_str(), self.vacancy_id(), error);
        state.push_notice(operation, format!("{} failed: {error}", describe(operation)));
        AppError::Backend(error)
    }
}

fn describe(operation: Operation) -> &'static str {
    match operation {
        Operation::Publish => "Publishing",
        Operation::StatusChange => "Changing the online status",
        _ => "Updating the channels",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::prescreening::{PreScreeningRecord, ScreeningMessages};
    use crate::models::question::{Question, QuestionSet, QuestionType};
    use crate::screening::testing::{Call, MockBackend};
    use crate::screening::EngineSettings;

    const VOICE_ONLY: Channels = Channels {
        voice: true,
        whatsapp: false,
    };

    fn editor(backend: &Arc<MockBackend>, publish: PublishRecord) -> Arc<Editor> {
        let editor = Editor::new("vac-2", backend.clone(), EngineSettings::default());
        editor.rehydrate(
            None,
            Some(PreScreeningRecord {
                questions: QuestionSet::new(
                    vec![Question::new("K1", QuestionType::Knockout, "Valid ID?")],
                    vec![],
                ),
                messages: ScreeningMessages::default(),
                publish,
            }),
        );
        editor
    }

    fn draft(backend: &Arc<MockBackend>) -> Arc<Editor> {
        editor(backend, PublishRecord::default())
    }

    #[tokio::test]
    async fn test_publish_then_confirmed_offline() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        assert_eq!(editor.publish_record().state(), PublishState::Draft);

        let record = editor.publish(VOICE_ONLY).await.unwrap();
        assert_eq!(record.is_online, Some(true));
        assert_eq!(record.channels, VOICE_ONLY);
        assert!(record.agents.voice_agent_id.is_some());
        assert_eq!(backend.calls(Call::Save), 1, "publish persists first");
        let published_at = record.published_at;

        let change = editor.set_online(false, false).await.unwrap();
        assert_eq!(change, StatusChange::ConfirmationRequired);
        assert_eq!(editor.publish_record().is_online, Some(true));
        assert_eq!(backend.calls(Call::Status), 0);

        let change = editor.set_online(false, true).await.unwrap();
        assert_eq!(change, StatusChange::Committed);
        let record = editor.publish_record();
        assert_eq!(record.is_online, Some(false));
        assert_eq!(record.published_at, published_at);
        assert_eq!(record.state(), PublishState::Offline);

        // Back online needs no confirmation.
        assert_eq!(editor.set_online(true, false).await.unwrap(), StatusChange::Committed);
        assert_eq!(editor.publish_record().state(), PublishState::Online);
    }

    #[tokio::test]
    async fn test_draft_cannot_toggle_online() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        assert!(matches!(
            editor.set_online(true, true).await,
            Err(AppError::InvalidTransition(_))
        ));
        assert!(matches!(
            editor.save_and_update_channels().await,
            Err(AppError::InvalidTransition(_))
        ));
        assert_eq!(editor.publish_record(), PublishRecord::default());
    }

    #[tokio::test]
    async fn test_publish_needs_a_channel() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        assert!(matches!(
            editor.publish(Channels::default()).await,
            Err(AppError::Validation(_))
        ));
        assert_eq!(backend.calls(Call::Save), 0);
    }

    #[tokio::test]
    async fn test_failed_publish_leaves_draft() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_next(Call::Publish, 1);
        let editor = draft(&backend);

        assert!(editor.publish(VOICE_ONLY).await.is_err());
        assert_eq!(editor.publish_record(), PublishRecord::default());
        assert_eq!(editor.notices()[0].operation, Operation::Publish);
    }

    #[tokio::test]
    async fn test_failed_save_aborts_publish() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_next(Call::Save, 1);
        let editor = draft(&backend);

        assert!(editor.publish(VOICE_ONLY).await.is_err());
        assert_eq!(backend.calls(Call::Publish), 0);
        assert_eq!(editor.publish_record().state(), PublishState::Draft);
    }

    #[tokio::test]
    async fn test_failed_status_change_keeps_state() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        editor.publish(VOICE_ONLY).await.unwrap();
        backend.fail_next(Call::Status, 1);

        assert!(editor.set_online(false, true).await.is_err());
        assert_eq!(editor.publish_record().state(), PublishState::Online);
    }

    #[tokio::test]
    async fn test_published_at_survives_every_operation() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        editor.publish(VOICE_ONLY).await.unwrap();

        backend.fail_next(Call::Publish, 1);
        let _ = editor.publish(Channels { voice: true, whatsapp: true }).await;
        let _ = editor.set_online(false, true).await;
        let _ = editor.save_and_update_channels().await;
        let _ = editor.set_online(true, false).await;
        editor
            .publish(Channels { voice: false, whatsapp: true })
            .await
            .unwrap();

        let record = editor.publish_record();
        assert!(record.published_at.is_some());
        assert_ne!(record.state(), PublishState::Draft);
    }

    #[tokio::test]
    async fn test_save_and_update_channels_reapplies_existing_selection() {
        let backend = Arc::new(MockBackend::default());
        let editor = draft(&backend);
        editor.publish(VOICE_ONLY).await.unwrap();

        let record = editor.save_and_update_channels().await.unwrap();
        assert_eq!(record.channels, VOICE_ONLY);
        assert_eq!(backend.calls(Call::Publish), 2);
        assert_eq!(backend.last_channels(), Some(VOICE_ONLY));
        assert_eq!(backend.calls(Call::Save), 2);
    }

    #[test]
    fn test_state_derivation() {
        let mut record = PublishRecord::default();
        assert_eq!(record.state(), PublishState::Draft);
        record.published_at = Some(Utc::now());
        record.is_online = Some(false);
        assert_eq!(record.state(), PublishState::Offline);
        record.is_online = Some(true);
        assert_eq!(record.state(), PublishState::Online);
    }

    #[test]
    fn test_republish_never_moves_published_at_backwards() {
        let earlier = Utc::now() - chrono::Duration::days(1);
        let now = Utc::now();
        assert_eq!(latest(Some(now), earlier), now);
        assert_eq!(latest(None, earlier), earlier);
    }
}
