//! Debounced persistence of the canonical question set.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend_client::wire::PreScreeningPayload;
use crate::backend_client::BackendError;
use crate::errors::AppError;
use crate::models::question::QuestionSet;
use crate::screening::editor::{Editor, EditorState, Operation};

#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoSaveStatus {
    pub pending: bool,
    pub in_flight: bool,
    pub last_saved_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Debounce timer plus the bookkeeping of the last save.
pub struct AutoSaver {
    debounce: Duration,
    token: u64,
    timer: Option<JoinHandle<()>>,
    in_flight: usize,
    /// Sequence of the last save started, and of the newest one that completed.
    issued: u64,
    settled: u64,
    last_saved_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl AutoSaver {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            token: 0,
            timer: None,
            in_flight: 0,
            issued: 0,
            settled: 0,
            last_saved_at: None,
            last_error: None,
        }
    }

    /// (Re)starts the debounce window. `on_due` runs with the window's token once it elapses.
    pub fn schedule<F, Fut>(&mut self, on_due: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.token += 1;
        let token = self.token;
        let debounce = self.debounce;
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            on_due(token).await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.token += 1;
    }

    /// Claims the elapsed window. False when it was cancelled or superseded meanwhile.
    pub fn take_due(&mut self, token: u64) -> bool {
        if token == self.token && self.timer.is_some() {
            self.timer = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.timer.is_some()
    }

    fn begin(&mut self) -> u64 {
        self.in_flight += 1;
        self.issued += 1;
        self.issued
    }

    /// Records the outcome of save `seq`. False when a later save already completed, in
    /// which case the outcome is stale and must not be applied.
    fn end(&mut self, seq: u64, result: Result<DateTime<Utc>, String>) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        if seq < self.settled {
            return false;
        }
        self.settled = seq;
        match result {
            Ok(at) => {
                self.last_saved_at = Some(at);
                self.last_error = None;
            }
            Err(message) => self.last_error = Some(message),
        }
        true
    }

    pub fn status(&self) -> AutoSaveStatus {
        AutoSaveStatus {
            pending: self.is_pending(),
            in_flight: self.in_flight > 0,
            last_saved_at: self.last_saved_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// What a save actually persists: confirmed questions without annotations.
fn persistable(questions: &QuestionSet) -> QuestionSet {
    let mut set = questions.stripped();
    set.knockout.retain(|q| !q.is_temporary());
    set.qualifying.retain(|q| !q.is_temporary());
    set
}

struct PendingSave {
    seq: u64,
    payload: PreScreeningPayload,
    saved: QuestionSet,
}

fn begin_save(state: &mut EditorState) -> Option<PendingSave> {
    if state.questions.is_empty() {
        return None;
    }
    Some(PendingSave {
        seq: state.autosave.begin(),
        payload: PreScreeningPayload::build(&state.questions, &state.messages),
        saved: persistable(&state.questions),
    })
}

impl Editor {
    /// Restarts the auto-save debounce window.
    pub(crate) fn schedule_save(self: &Arc<Self>, state: &mut EditorState) {
        if state.closed {
            return;
        }
        let editor = Arc::downgrade(self);
        state.autosave.schedule(move |token| async move {
            if let Some(editor) = editor.upgrade() {
                editor.fire_autosave(token).await;
            }
        });
    }

    async fn fire_autosave(&self, token: u64) {
        let pending = {
            let mut state = self.state.lock();
            if state.closed || !state.autosave.take_due(token) {
                return;
            }
            match begin_save(&mut state) {
                Some(pending) => pending,
                None => {
                    debug!("Auto-save skipped for vacancy {}: no questions", self.vacancy_id());
                    return;
                }
            }
        };

        let result = self
            .backend
            .save_pre_screening(self.vacancy_id(), &pending.payload)
            .await;
        // Failures stay in memory; the next edit schedules the next attempt.
        let _ = self.finish_save(pending, result, Operation::AutoSave);
    }

    /// Saves immediately, flushing any pending debounce window.
    pub async fn save_now(self: &Arc<Self>) -> Result<(), AppError> {
        self.detached(|editor| async move { editor.persist(Operation::Save).await })
            .await
    }

    pub(crate) async fn persist(self: &Arc<Self>, operation: Operation) -> Result<(), AppError> {
        let pending = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AppError::ContextClosed);
            }
            state.autosave.cancel();
            begin_save(&mut state).ok_or_else(|| {
                AppError::Validation("There are no questions to save".to_string())
            })?
        };

        let result = self
            .backend
            .save_pre_screening(self.vacancy_id(), &pending.payload)
            .await;
        self.finish_save(pending, result, operation)
            .map_err(AppError::from)
    }

    fn finish_save(
        &self,
        pending: PendingSave,
        result: Result<(), BackendError>,
        operation: Operation,
    ) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                let saved = pending.saved;
                if !state.autosave.end(pending.seq, Ok(Utc::now())) {
                    debug!(
                        "{} for vacancy {} completed after a newer save; ignoring",
                        operation.as_str(),
                        self.vacancy_id()
                    );
                } else if !state.closed {
                    debug!(
                        "{} persisted {} questions for vacancy {}",
                        operation.as_str(),
                        saved.len(),
                        self.vacancy_id()
                    );
                    state.persisted = Some(saved);
                }
                Ok(())
            }
            Err(e) => {
                let message = format!("Saving the questions failed: {e}");
                warn!("{} failed for vacancy {}: {}", operation.as_str(), self.vacancy_id(), e);
                let current = state.autosave.end(pending.seq, Err(message.clone()));
                if current && !state.closed {
                    state.push_notice(operation, message);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_client::wire::WireQuestion;
    use crate::backend_client::NewQuestion;
    use crate::models::prescreening::{PreScreeningRecord, PublishRecord, ScreeningMessages};
    use crate::models::question::{Question, QuestionType};
    use crate::screening::editor::MessagesPatch;
    use crate::screening::testing::{settle, Call, MockBackend};
    use crate::screening::EngineSettings;

    fn editor(backend: &Arc<MockBackend>, questions: QuestionSet) -> Arc<Editor> {
        let editor = Editor::new("vac-7", backend.clone(), EngineSettings::default());
        editor.rehydrate(
            None,
            Some(PreScreeningRecord {
                questions,
                messages: ScreeningMessages::default(),
                publish: PublishRecord::default(),
            }),
        );
        editor
    }

    fn base() -> QuestionSet {
        QuestionSet::new(
            vec![Question::new("K1", QuestionType::Knockout, "Forklift licence?")],
            vec![Question::new("Q1", QuestionType::Qualifying, "Warehouse experience?")
                .with_ideal_answer("Two years")],
        )
    }

    fn edit_intro(editor: &Arc<Editor>, intro: &str) {
        editor
            .update_messages(MessagesPatch {
                intro: Some(intro.to_string()),
                ..MessagesPatch::default()
            })
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_triggers_collapse_into_one_save_with_last_state() {
        let backend = Arc::new(MockBackend::default());
        let editor = editor(&backend, base());

        for i in 0..5 {
            edit_intro(&editor, &format!("Intro v{i}"));
            settle().await;
            tokio::time::advance(Duration::from_millis(100)).await;
        }
        assert_eq!(backend.calls(Call::Save), 0);

        tokio::time::advance(Duration::from_millis(400)).await;
        settle().await;

        assert_eq!(backend.calls(Call::Save), 1);
        assert_eq!(backend.saved().last().unwrap().intro, "Intro v4");
        assert!(editor.view().autosave.last_saved_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_set_is_never_saved() {
        let backend = Arc::new(MockBackend::default());
        let editor = editor(&backend, QuestionSet::default());

        edit_intro(&editor, "Hello");
        settle().await;
        tokio::time::advance(Duration::from_millis(600)).await;
        settle().await;

        assert_eq!(backend.calls(Call::Save), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_keeps_memory_and_reports_notice() {
        let backend = Arc::new(MockBackend::default());
        backend.fail_next(Call::Save, 1);
        let editor = editor(&backend, base());
        let before = editor.questions();

        edit_intro(&editor, "Changed");
        settle().await;
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;

        assert_eq!(backend.calls(Call::Save), 1);
        assert_eq!(editor.questions(), before);
        assert_eq!(editor.view().messages.intro, "Changed");
        let notices = editor.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].operation, Operation::AutoSave);
        assert!(editor.view().autosave.last_error.is_some());

        // No dedicated retry timer.
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(backend.calls(Call::Save), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_flushes_pending_debounce() {
        let backend = Arc::new(MockBackend::default());
        let editor = editor(&backend, base());

        edit_intro(&editor, "Now");
        editor.save_now().await.unwrap();
        assert_eq!(backend.calls(Call::Save), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(backend.calls(Call::Save), 1, "flushed window must not fire again");
    }

    #[tokio::test(start_paused = true)]
    async fn test_older_save_completing_last_keeps_newer_baseline() {
        let backend = Arc::new(MockBackend::default());
        let editor = editor(&backend, base());
        backend.delay(Call::Save, Duration::from_secs(3));

        editor
            .add_question(NewQuestion {
                question_type: QuestionType::Knockout,
                text: "Steel-toe boots?".to_string(),
                ideal_answer: None,
            })
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(500)).await;
        settle().await;
        // Auto-save with srv-1 is in flight until t=3.5.
        assert!(editor.view().autosave.in_flight);

        backend.delay(Call::Save, Duration::from_secs(1));
        editor.delete_question("srv-1").await.unwrap();
        editor.save_now().await.unwrap();
        assert!(!editor.has_unsaved_changes());

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(backend.calls(Call::Save), 2);
        assert!(!editor.view().autosave.in_flight);
        assert!(!editor.has_unsaved_changes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_now_rejects_empty_set() {
        let backend = Arc::new(MockBackend::default());
        let editor = editor(&backend, QuestionSet::default());
        assert!(matches!(editor.save_now().await, Err(AppError::Validation(_))));
        assert_eq!(backend.calls(Call::Save), 0);
    }

    #[test]
    fn test_temporary_questions_are_not_persisted() {
        let mut set = base();
        set.push(Question::new("temp_1700000000000", QuestionType::Knockout, "Pending"));
        let saved = persistable(&set);
        assert_eq!(saved.len(), 2);

        let payload = PreScreeningPayload::build(&set, &ScreeningMessages::default());
        assert!(payload
            .knockout_questions
            .iter()
            .all(|q: &WireQuestion| !q.id.starts_with("temp_")));
        assert_eq!(payload.approved_ids, vec!["K1", "Q1"]);
    }
}
