//! Change detection between the previously displayed question set and a new one.

use serde::Serialize;

use crate::models::question::{ChangeStatus, Question, QuestionSet};

/// Where the incoming set came from, which decides who owns the change status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSource {
    /// Backend response. A status carried by the question is authoritative.
    Server,
    /// Local optimistic edit. The status is computed from id membership and text.
    Local,
}

/// Ids tagged by a diff, in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    pub new: Vec<String>,
    pub updated: Vec<String>,
}

impl ChangeSummary {
    pub fn of(set: &QuestionSet) -> Self {
        let mut summary = ChangeSummary::default();
        for question in set.iter() {
            match question.change_status {
                Some(ChangeStatus::New) => summary.new.push(question.id.clone()),
                Some(ChangeStatus::Updated) => summary.updated.push(question.id.clone()),
                _ => {}
            }
        }
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty()
    }
}

/// Tags every question of `next` as new, updated, or unchanged (no tag) relative to `previous`.
///
/// - id absent from `previous` → `new`, whatever the source says;
/// - server status present → taken as is;
/// - otherwise `updated` when the text differs.
pub fn compute_changes(previous: &QuestionSet, mut next: QuestionSet, source: ChangeSource) -> QuestionSet {
    for question in next.iter_mut() {
        let status = match previous.get(&question.id) {
            None => Some(ChangeStatus::New),
            Some(before) => match (source, question.change_status) {
                (ChangeSource::Server, Some(server_status)) => Some(server_status),
                _ => local_status(before, question),
            },
        };
        question.change_status = ChangeStatus::normalized(status);
    }
    next
}

fn local_status(before: &Question, after: &Question) -> Option<ChangeStatus> {
    if before.text != after.text {
        Some(ChangeStatus::Updated)
    } else {
        None
    }
}
