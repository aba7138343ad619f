use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::models::question::{Question, QuestionSet, QuestionType};
use crate::screening::editor::Editor;

/// Compares the last persisted set with the current one, question by question:
/// count, id, text and, for qualifying questions, the ideal answer.
///
/// Nothing persisted yet counts as unsaved only when there is something to save.
pub fn has_unsaved_changes(persisted: Option<&QuestionSet>, current: &QuestionSet) -> bool {
    let Some(persisted) = persisted else {
        return !current.is_empty();
    };
    if persisted.len() != current.len() {
        return true;
    }
    persisted
        .iter()
        .zip(current.iter())
        .any(|(before, after)| differs(before, after))
}

fn differs(before: &Question, after: &Question) -> bool {
    if before.id != after.id || before.text != after.text {
        return true;
    }
    after.question_type == QuestionType::Qualifying && before.ideal_answer != after.ideal_answer
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveDecision {
    /// The editor was closed; pending timers are cancelled.
    Left,
    /// Unsaved changes exist and the caller must ask before leaving.
    ConfirmationRequired,
}

impl Editor {
    pub fn has_unsaved_changes(&self) -> bool {
        let state = self.state.lock();
        has_unsaved_changes(state.persisted.as_ref(), &state.questions)
    }

    /// Whether closing or refreshing the browsing context must be intercepted.
    pub fn before_unload(&self) -> bool {
        self.has_unsaved_changes()
    }

    /// Navigation gate. Closes the editor unless unsaved changes need confirmation first.
    pub fn request_leave(self: &Arc<Self>, confirmed: bool) -> LeaveDecision {
        if !confirmed && self.before_unload() {
            return LeaveDecision::ConfirmationRequired;
        }
        self.close();
        info!("Left editor for vacancy {}", self.vacancy_id());
        LeaveDecision::Left
    }
}
