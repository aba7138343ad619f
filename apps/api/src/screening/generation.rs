//! Question generation from a vacancy description.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::backend_client::{BackendError, ProgressEvent};
use crate::errors::AppError;
use crate::screening::diff::ChangeSummary;
use crate::screening::editor::{Editor, EditorState, Operation};
use crate::screening::retry::{with_retry, RetryPolicy};
use crate::screening::session::establish_session;

/// Result of a generation or feedback request.
///
/// Exhausted retries are a normal outcome carrying a displayable message, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegenerationOutcome {
    Applied { message: String, changes: ChangeSummary },
    Failed { message: String },
    /// Superseded by a newer request, or the editor was closed.
    Discarded,
}

impl Editor {
    /// Generates a fresh question set. Without an explicit description the vacancy's own
    /// text is used.
    pub async fn generate(
        self: &Arc<Self>,
        description: Option<&str>,
    ) -> Result<RegenerationOutcome, AppError> {
        let description = description.map(str::to_string);
        self.detached(move |editor| async move { editor.run_generation(description.as_deref()).await })
            .await
    }

    async fn run_generation(
        self: &Arc<Self>,
        description: Option<&str>,
    ) -> Result<RegenerationOutcome, AppError> {
        let (epoch, session_id, description) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AppError::ContextClosed);
            }
            let description = description
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .or_else(|| {
                    state
                        .vacancy
                        .as_ref()
                        .map(|v| v.description.trim().to_string())
                        .filter(|d| !d.is_empty())
                })
                .ok_or_else(|| {
                    AppError::Validation("A vacancy description is required".to_string())
                })?;
            let epoch = state.epoch.begin();
            state.progress.start();
            (epoch, state.session_id(), description)
        };

        info!(
            "Generating questions for vacancy {} (epoch {}, session {:?})",
            self.vacancy_id(),
            epoch,
            session_id
        );

        let sink = move |event: ProgressEvent| self.on_progress(epoch, event);
        let result = with_retry(
            &RetryPolicy::standard(&self.settings),
            Operation::Generate.as_str(),
            |_| self.reset_phase(epoch),
            || {
                self.backend
                    .generate_interview(&description, session_id.as_deref(), &sink)
            },
        )
        .await;

        let mut state = self.state.lock();
        if !self.still_current(&state, epoch) {
            return Ok(RegenerationOutcome::Discarded);
        }
        Ok(match result {
            Ok(generated) => {
                establish_session(&mut state.session, generated.session_id);
                self.accept_generated(&mut state, generated.questions);
                state.progress.finish();
                state.last_narrative = Some(generated.message.clone());
                self.schedule_save(&mut state);
                info!(
                    "Generated {} knockout and {} qualifying questions for vacancy {}",
                    state.questions.knockout.len(),
                    state.questions.qualifying.len(),
                    self.vacancy_id()
                );
                RegenerationOutcome::Applied {
                    message: generated.message,
                    changes: ChangeSummary::default(),
                }
            }
            Err(e) => self.fail_request(&mut state, Operation::Generate, &e),
        })
    }

    /// True when a response for `epoch` may still be applied.
    pub(crate) fn still_current(&self, state: &EditorState, epoch: u64) -> bool {
        if state.closed {
            debug!(
                "Discarding response for closed editor {} (epoch {})",
                self.vacancy_id(),
                epoch
            );
            return false;
        }
        if !state.epoch.is_current(epoch) {
            debug!(
                "Discarding stale response for vacancy {}: epoch {} superseded by {}",
                self.vacancy_id(),
                epoch,
                state.epoch.current()
            );
            return false;
        }
        true
    }

    pub(crate) fn fail_request(
        &self,
        state: &mut EditorState,
        operation: Operation,
        error: &BackendError,
    ) -> RegenerationOutcome {
        let message = match operation {
            Operation::Feedback => format!("Updating the questions failed: {error}"),
            _ => format!("Generating the questions failed: {error}"),
        };
        state.progress.fail(message.clone());
        state.push_notice(operation, message.clone());
        RegenerationOutcome::Failed { message }
    }
}
