use std::sync::Arc;

use tracing::info;

use crate::backend_client::ProgressEvent;
use crate::errors::AppError;
use crate::screening::diff::ChangeSource;
use crate::screening::editor::{Editor, Operation};
use crate::screening::generation::RegenerationOutcome;
use crate::screening::retry::{with_retry, RetryPolicy};

impl Editor {
    /// Sends a free-text instruction for the current session and diffs the regenerated set
    /// against what was displayed before.
    pub async fn send_feedback(self: &Arc<Self>, instruction: &str) -> Result<RegenerationOutcome, AppError> {
        let instruction = instruction.to_string();
        self.detached(move |editor| async move { editor.run_feedback(&instruction).await })
            .await
    }

    async fn run_feedback(self: &Arc<Self>, instruction: &str) -> Result<RegenerationOutcome, AppError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(AppError::Validation("Feedback message cannot be empty".to_string()));
        }

        let (epoch, session_id) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(AppError::ContextClosed);
            }
            let Some(session_id) = state.session_id() else {
                state.push_notice(
                    Operation::Feedback,
                    "No active session. Generate questions first.".to_string(),
                );
                return Err(AppError::NoActiveSession);
            };
            let epoch = state.epoch.begin();
            state.progress.start();
            (epoch, session_id)
        };

        info!(
            "Sending feedback for vacancy {} (session {}, epoch {})",
            self.vacancy_id(),
            session_id,
            epoch
        );

        let sink = move |event: ProgressEvent| self.on_progress(epoch, event);
        let result = with_retry(
            &RetryPolicy::standard(&self.settings),
            Operation::Feedback.as_str(),
            |_| self.reset_phase(epoch),
            || self.backend.send_feedback(&session_id, instruction, &sink),
        )
        .await;

        let mut state = self.state.lock();
        if !self.still_current(&state, epoch) {
            return Ok(RegenerationOutcome::Discarded);
        }
        Ok(match result {
            Ok(updated) => {
                let changes = self.accept_canonical(&mut state, updated.questions, ChangeSource::Server);
                state.epoch.land();
                state.progress.finish();
                state.last_narrative = Some(updated.message.clone());
                self.schedule_save(&mut state);
                if changes.is_empty() {
                    info!("Feedback for vacancy {} changed no questions", self.vacancy_id());
                } else {
                    info!(
                        "Feedback applied for vacancy {}: {} new, {} updated",
                        self.vacancy_id(),
                        changes.new.len(),
                        changes.updated.len()
                    );
                }
                RegenerationOutcome::Applied {
                    message: updated.message,
                    changes,
                }
            }
            Err(e) => self.fail_request(&mut state, Operation::Feedback, &e),
        })
    }
}
