//! Optimistic reorder / add / delete.
//!
//! Each mutation is a command: it computes the next canonical set, confirms it with the
//! backend, and either commits the confirmation or is withdrawn. `run_optimistic` is the only
//! caller of these commands; it captures the question set and change snapshot before applying
//! anything, so a rollback is a plain restoration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend_client::{BackendError, NewQuestion, ScreeningBackend};
use crate::errors::AppError;
use crate::models::question::{Question, QuestionSet, QuestionType, TEMP_ID_PREFIX};
use crate::screening::diff::ChangeSource;
use crate::screening::editor::{Editor, EditorState, Operation};
use crate::screening::retry::{with_retry, RetryPolicy};
use crate::screening::EngineSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// Applied locally and confirmed by the backend.
    Confirmed,
    /// No session yet; applied locally without a backend call.
    LocalOnly,
    /// The command would not change anything.
    Unchanged,
    /// The editor was closed while the call was in flight.
    Discarded,
}

#[async_trait]
pub(crate) trait OptimisticCommand: Send + Sync {
    type Confirmed: Send;

    fn operation(&self) -> Operation;

    fn retry_policy(&self, settings: &EngineSettings) -> RetryPolicy {
        RetryPolicy::standard(settings)
    }

    fn requires_session(&self) -> bool {
        true
    }

    /// Computes the next canonical set. `None` when nothing would change.
    fn apply(&mut self, current: &QuestionSet) -> Result<Option<QuestionSet>, AppError>;

    async fn confirm(
        &self,
        backend: &dyn ScreeningBackend,
        session_id: &str,
    ) -> Result<Self::Confirmed, BackendError>;

    /// Folds the backend's confirmation into the already-applied state.
    fn commit(&self, _state: &mut EditorState, _confirmed: Self::Confirmed) {}

    /// Undoes side effects that outlive the captured state, after it has been restored.
    fn withdraw(&self, _state: &mut EditorState) {}
}

/// Pre-mutation state, restored verbatim on rollback.
struct Captured {
    questions: QuestionSet,
    snapshot: QuestionSet,
    landed: u64,
}

impl Captured {
    fn of(state: &EditorState) -> Self {
        Self {
            questions: state.questions.clone(),
            snapshot: state.snapshot.clone(),
            landed: state.epoch.landed(),
        }
    }

    fn restore(self, state: &mut EditorState) {
        // A regeneration that landed meanwhile owns the canonical set now. One that is
        // merely in flight does not.
        if state.epoch.landed() == self.landed {
            state.questions = self.questions;
            state.snapshot = self.snapshot;
        }
    }
}

pub(crate) async fn run_optimistic<C: OptimisticCommand>(
    editor: &Arc<Editor>,
    mut command: C,
) -> Result<MutationOutcome, AppError> {
    let operation = command.operation();

    let (captured, session_id) = {
        let mut state = editor.state.lock();
        if state.closed {
            return Err(AppError::ContextClosed);
        }
        let session_id = state.session_id();
        if session_id.is_none() && command.requires_session() {
            state.push_notice(
                operation,
                "No active session. Generate questions first.".to_string(),
            );
            return Err(AppError::NoActiveSession);
        }

        let Some(next) = command.apply(&state.questions)? else {
            return Ok(MutationOutcome::Unchanged);
        };
        let captured = Captured::of(&state);
        editor.accept_canonical(&mut state, next, ChangeSource::Local);

        match session_id {
            Some(session_id) => (captured, session_id),
            None => {
                debug!(
                    "No session for vacancy {}; {} applied locally",
                    editor.vacancy_id(),
                    operation.as_str()
                );
                editor.schedule_save(&mut state);
                return Ok(MutationOutcome::LocalOnly);
            }
        }
    };

    let policy = command.retry_policy(&editor.settings);
    let result = with_retry(&policy, operation.as_str(), |_| {}, || {
        command.confirm(editor.backend.as_ref(), &session_id)
    })
    .await;

    let mut state = editor.state.lock();
    if state.closed {
        debug!(
            "Discarding {} result for closed editor {}",
            operation.as_str(),
            editor.vacancy_id()
        );
        return Ok(MutationOutcome::Discarded);
    }

    match result {
        Ok(confirmed) => {
            command.commit(&mut state, confirmed);
            editor.schedule_save(&mut state);
            Ok(MutationOutcome::Confirmed)
        }
        Err(e) => {
            warn!(
                "Rolling back {} for vacancy {}: {}",
                operation.as_str(),
                editor.vacancy_id(),
                e
            );
            captured.restore(&mut state);
            command.withdraw(&mut state);
            state.reconcile_highlights();
            state.push_notice(operation, failure_message(operation, &e));
            Err(AppError::Backend(e))
        }
    }
}

fn failure_message(operation: Operation, error: &BackendError) -> String {
    let action = match operation {
        Operation::Reorder => "Reordering the questions",
        Operation::AddQuestion => "Adding the question",
        Operation::DeleteQuestion => "Deleting the question",
        _ => "The change",
    };
    format!("{action} failed and was undone: {error}")
}

// ────────────────────────────────────────────────────────────────────────────
// Commands
// ────────────────────────────────────────────────────────────────────────────

struct Reorder {
    knockout: Vec<String>,
    qualifying: Vec<String>,
}

#[async_trait]
impl OptimisticCommand for Reorder {
    type Confirmed = ();

    fn operation(&self) -> Operation {
        Operation::Reorder
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn apply(&mut self, current: &QuestionSet) -> Result<Option<QuestionSet>, AppError> {
        if current.ids(QuestionType::Knockout) == self.knockout
            && current.ids(QuestionType::Qualifying) == self.qualifying
        {
            return Ok(None);
        }
        current
            .reordered(&self.knockout, &self.qualifying)
            .map(Some)
            .map_err(AppError::Validation)
    }

    async fn confirm(&self, backend: &dyn ScreeningBackend, session_id: &str) -> Result<(), BackendError> {
        backend
            .reorder_questions(session_id, &self.knockout, &self.qualifying)
            .await
    }
}

struct Add {
    question: NewQuestion,
    temp_key: Option<Uuid>,
}

impl Add {
    /// `temp_<millis>`, bumped until unique within the set.
    fn temp_id(current: &QuestionSet) -> String {
        let mut millis = Utc::now().timestamp_millis();
        loop {
            let id = format!("{TEMP_ID_PREFIX}{millis}");
            if !current.contains(&id) {
                return id;
            }
            millis += 1;
        }
    }
}

#[async_trait]
impl OptimisticCommand for Add {
    type Confirmed = Question;

    fn operation(&self) -> Operation {
        Operation::AddQuestion
    }

    fn retry_policy(&self, _settings: &EngineSettings) -> RetryPolicy {
        RetryPolicy::single_attempt()
    }

    fn apply(&mut self, current: &QuestionSet) -> Result<Option<QuestionSet>, AppError> {
        let mut question = Question::new(
            Self::temp_id(current),
            self.question.question_type,
            self.question.text.clone(),
        );
        if question.question_type == QuestionType::Qualifying {
            question.ideal_answer = self.question.ideal_answer.clone();
        }
        self.temp_key = Some(question.key);

        let mut next = current.clone();
        next.push(question);
        Ok(Some(next))
    }

    async fn confirm(&self, backend: &dyn ScreeningBackend, session_id: &str) -> Result<Question, BackendError> {
        backend.add_question(session_id, &self.question).await
    }

    /// Swaps the temporary id for the server id in place; position, key and highlight stay.
    fn commit(&self, state: &mut EditorState, created: Question) {
        let Some(key) = self.temp_key else { return };
        if let Some(temp_id) = state.questions.replace_id(key, &created.id) {
            state.snapshot.replace_id(key, &created.id);
            info!("Question {} confirmed as {}", temp_id, created.id);
        }
    }

    fn withdraw(&self, state: &mut EditorState) {
        if let Some(key) = self.temp_key {
            state.questions.remove_by_key(key);
            state.snapshot.remove_by_key(key);
            state.highlights.withdraw(key);
        }
    }
}

struct Delete {
    question_id: String,
}

#[async_trait]
impl OptimisticCommand for Delete {
    type Confirmed = ();

    fn operation(&self) -> Operation {
        Operation::DeleteQuestion
    }

    fn apply(&mut self, current: &QuestionSet) -> Result<Option<QuestionSet>, AppError> {
        let Some(question) = current.get(&self.question_id) else {
            return Err(AppError::NotFound(format!(
                "Question '{}' does not exist",
                self.question_id
            )));
        };
        if question.is_temporary() {
            return Err(AppError::Validation(
                "The question is still being created".to_string(),
            ));
        }
        let mut next = current.clone();
        next.remove(&self.question_id);
        Ok(Some(next))
    }

    async fn confirm(&self, backend: &dyn ScreeningBackend, session_id: &str) -> Result<(), BackendError> {
        backend.delete_question(session_id, &self.question_id).await
    }
}

impl Editor {
    /// Moves questions into the given per-type order.
    pub async fn reorder(
        self: &Arc<Self>,
        knockout: Vec<String>,
        qualifying: Vec<String>,
    ) -> Result<MutationOutcome, AppError> {
        let command = Reorder { knockout, qualifying };
        self.detached(move |editor| async move { run_optimistic(&editor, command).await })
            .await
    }

    pub async fn add_question(self: &Arc<Self>, question: NewQuestion) -> Result<MutationOutcome, AppError> {
        if question.text.trim().is_empty() {
            return Err(AppError::Validation("Question text cannot be empty".to_string()));
        }
        let command = Add {
            question,
            temp_key: None,
        };
        self.detached(move |editor| async move { run_optimistic(&editor, command).await })
            .await
    }

    pub async fn delete_question(self: &Arc<Self>, question_id: &str) -> Result<MutationOutcome, AppError> {
        let command = Delete {
            question_id: question_id.to_string(),
        };
        self.detached(move |editor| async move { run_optimistic(&editor, command).await })
            .await
    }
}
