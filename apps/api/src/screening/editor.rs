//! The editor: single owner of one vacancy's question set while it is being edited.
//!
//! Every engine operation is a method on `Editor`. State lives behind one lock that is
//! never held across a backend call; each operation captures what it needs, releases the
//! lock, awaits the backend, then re-locks to commit or roll back.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend_client::{ProgressEvent, ScreeningBackend};
use crate::errors::AppError;
use crate::models::prescreening::{PreScreeningRecord, PublishRecord, ScreeningMessages, Vacancy};
use crate::models::question::{Question, QuestionSet};
use crate::screening::autosave::{AutoSaveStatus, AutoSaver};
use crate::screening::diff::{compute_changes, ChangeSource, ChangeSummary};
use crate::screening::highlight::Highlights;
use crate::screening::publish::PublishState;
use crate::screening::session::{GenerationSession, RequestEpoch};
use crate::screening::unsaved::has_unsaved_changes;
use crate::screening::EngineSettings;

/// Phase label shown when a request starts and again before every retry.
pub const COLLECTING_DATA_LABEL: &str = "Collecting data";

const MAX_NOTICES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    Feedback,
    Reorder,
    AddQuestion,
    DeleteQuestion,
    Save,
    AutoSave,
    Publish,
    StatusChange,
    UpdateChannels,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Generate => "generate_interview",
            Operation::Feedback => "send_feedback",
            Operation::Reorder => "reorder_questions",
            Operation::AddQuestion => "add_question",
            Operation::DeleteQuestion => "delete_question",
            Operation::Save => "save_pre_screening",
            Operation::AutoSave => "auto_save",
            Operation::Publish => "publish_pre_screening",
            Operation::StatusChange => "update_pre_screening_status",
            Operation::UpdateChannels => "update_channels",
        }
    }
}

/// Failure signal for toast-style display.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub operation: Operation,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Busy flag, phase label and streamed narrative of the running generation/feedback request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Progress {
    pub busy: bool,
    pub phase: Option<String>,
    pub thinking: String,
    pub error: Option<String>,
}

impl Progress {
    pub(crate) fn start(&mut self) {
        self.busy = true;
        self.phase = Some(COLLECTING_DATA_LABEL.to_string());
        self.thinking.clear();
        self.error = None;
    }

    pub(crate) fn apply(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Status { label } => self.phase = Some(label),
            ProgressEvent::Thinking { text } => self.thinking.push_str(&text),
        }
    }

    pub(crate) fn restart_attempt(&mut self) {
        self.phase = Some(COLLECTING_DATA_LABEL.to_string());
        self.thinking.clear();
    }

    pub(crate) fn finish(&mut self) {
        self.busy = false;
        self.phase = None;
        self.thinking.clear();
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.finish();
        self.error = Some(message);
    }
}

pub struct EditorState {
    pub(crate) vacancy: Option<Vacancy>,
    pub(crate) questions: QuestionSet,
    /// Previous set held only for diffing. Never persisted.
    pub(crate) snapshot: QuestionSet,
    /// Last set the backend confirmed as saved.
    pub(crate) persisted: Option<QuestionSet>,
    pub(crate) messages: ScreeningMessages,
    pub(crate) session: Option<GenerationSession>,
    pub(crate) epoch: RequestEpoch,
    pub(crate) progress: Progress,
    pub(crate) highlights: Highlights,
    pub(crate) autosave: AutoSaver,
    pub(crate) publish: PublishRecord,
    pub(crate) notices: VecDeque<Notice>,
    pub(crate) last_narrative: Option<String>,
    pub(crate) closed: bool,
}

impl EditorState {
    fn new(settings: &EngineSettings) -> Self {
        Self {
            vacancy: None,
            questions: QuestionSet::default(),
            snapshot: QuestionSet::default(),
            persisted: None,
            messages: ScreeningMessages::default(),
            session: None,
            epoch: RequestEpoch::default(),
            progress: Progress::default(),
            highlights: Highlights::new(settings.highlight_window),
            autosave: AutoSaver::new(settings.autosave_debounce),
            publish: PublishRecord::default(),
            notices: VecDeque::new(),
            last_narrative: None,
            closed: false,
        }
    }

    /// Clears tags whose highlight window is no longer running.
    pub(crate) fn reconcile_highlights(&mut self) {
        let highlights = &self.highlights;
        for question in self.questions.iter_mut() {
            if !highlights.is_active(question.key) {
                question.change_status = None;
            }
        }
    }

    fn forget_removed_entrances(&mut self) {
        let live: HashSet<Uuid> = self.questions.iter().map(|q| q.key).collect();
        self.highlights.retain_entrances(&live);
    }

    pub(crate) fn push_notice(&mut self, operation: Operation, message: String) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            operation,
            message,
            at: Utc::now(),
        });
    }

    pub(crate) fn session_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.id().to_string())
    }

    fn highlighted_ids(&self) -> Vec<String> {
        self.questions
            .iter()
            .filter(|q| self.highlights.is_active(q.key))
            .map(|q| q.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionView {
    #[serde(flatten)]
    pub question: Question,
    /// One-time entrance treatment for a freshly inserted question.
    pub enter_animation: bool,
}

/// Read-only projection handed to consumers.
#[derive(Debug, Clone, Serialize)]
pub struct EditorView {
    pub vacancy_id: String,
    pub vacancy: Option<Vacancy>,
    pub session_id: Option<String>,
    pub knockout: Vec<QuestionView>,
    pub qualifying: Vec<QuestionView>,
    pub highlighted_ids: Vec<String>,
    pub progress: Progress,
    pub has_unsaved_changes: bool,
    pub publish_state: PublishState,
    pub publish: PublishRecord,
    pub autosave: AutoSaveStatus,
    pub messages: ScreeningMessages,
    pub last_narrative: Option<String>,
    pub notices: Vec<Notice>,
}

/// Partial update of the screening messages; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagesPatch {
    pub intro: Option<String>,
    pub knockout_failed_action: Option<String>,
    pub final_action: Option<String>,
}

pub struct Editor {
    vacancy_id: String,
    pub(crate) backend: Arc<dyn ScreeningBackend>,
    pub(crate) settings: EngineSettings,
    pub(crate) state: Mutex<EditorState>,
}

impl Editor {
    pub fn new(
        vacancy_id: impl Into<String>,
        backend: Arc<dyn ScreeningBackend>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            vacancy_id: vacancy_id.into(),
            backend,
            state: Mutex::new(EditorState::new(&settings)),
            settings,
        })
    }

    pub fn vacancy_id(&self) -> &str {
        &self.vacancy_id
    }

    /// Restores state after a reload. A persisted question set implies a session whose id
    /// is the vacancy id.
    pub fn rehydrate(&self, vacancy: Option<Vacancy>, record: Option<PreScreeningRecord>) {
        let mut state = self.state.lock();
        state.vacancy = vacancy;
        if let Some(record) = record {
            let questions = record.questions.stripped();
            if !questions.is_empty() {
                state.session = Some(GenerationSession::new(self.vacancy_id.clone()));
                state.persisted = Some(questions.clone());
            }
            info!(
                "Rehydrated vacancy {}: {} questions, publish state {:?}",
                self.vacancy_id,
                questions.len(),
                record.publish.state()
            );
            state.snapshot = questions.clone();
            state.questions = questions;
            state.messages = record.messages;
            state.publish = record.publish;
        }
    }

    pub fn questions(&self) -> QuestionSet {
        self.state.lock().questions.clone()
    }

    #[cfg(test)]
    pub fn change_snapshot(&self) -> QuestionSet {
        self.state.lock().snapshot.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.lock().session_id()
    }

    pub fn publish_record(&self) -> PublishRecord {
        self.state.lock().publish.clone()
    }

    pub fn highlighted_ids(&self) -> Vec<String> {
        self.state.lock().highlighted_ids()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.state.lock().notices.iter().cloned().collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Renders the current state. Consumes pending entrance treatments.
    pub fn view(&self) -> EditorView {
        let mut state = self.state.lock();
        let state = &mut *state;

        let mut render = |list: &[Question]| -> Vec<QuestionView> {
            list.iter()
                .map(|q| QuestionView {
                    question: q.clone(),
                    enter_animation: state.highlights.take_entrance(q.key),
                })
                .collect()
        };
        let knockout = render(&state.questions.knockout);
        let qualifying = render(&state.questions.qualifying);

        EditorView {
            vacancy_id: self.vacancy_id.clone(),
            vacancy: state.vacancy.clone(),
            session_id: state.session_id(),
            knockout,
            qualifying,
            highlighted_ids: state.highlighted_ids(),
            progress: state.progress.clone(),
            has_unsaved_changes: has_unsaved_changes(state.persisted.as_ref(), &state.questions),
            publish_state: state.publish.state(),
            publish: state.publish.clone(),
            autosave: state.autosave.status(),
            messages: state.messages.clone(),
            last_narrative: state.last_narrative.clone(),
            notices: state.notices.iter().cloned().collect(),
        }
    }

    pub fn update_messages(self: &Arc<Self>, patch: MessagesPatch) -> Result<ScreeningMessages, AppError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(AppError::ContextClosed);
        }
        if let Some(intro) = patch.intro {
            state.messages.intro = intro;
        }
        if let Some(action) = patch.knockout_failed_action {
            state.messages.knockout_failed_action = action;
        }
        if let Some(action) = patch.final_action {
            state.messages.final_action = action;
        }
        self.schedule_save(&mut state);
        Ok(state.messages.clone())
    }

    /// Runs `work` on its own task. Dropping the caller's future cannot interrupt it between
    /// applying a change and confirming or reverting it.
    pub(crate) async fn detached<T, F, Fut>(self: &Arc<Self>, work: F) -> Result<T, AppError>
    where
        F: FnOnce(Arc<Editor>) -> Fut,
        Fut: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(work(Arc::clone(self))).await {
            Ok(result) => result,
            Err(e) => Err(AppError::Internal(anyhow::anyhow!(
                "Editor task for vacancy {} did not complete: {e}",
                self.vacancy_id
            ))),
        }
    }

    /// Cancels timers and detaches the editor; late responses are discarded from now on.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.highlights.cancel_all();
        state.autosave.cancel();
        state.progress.finish();
        debug!("Editor for vacancy {} closed", self.vacancy_id);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Canonical-set plumbing shared by generation, feedback and mutations
    // ────────────────────────────────────────────────────────────────────────

    /// Diffs `next` against the change snapshot, makes it canonical and highlights what changed.
    ///
    /// Questions whose highlight window is still running keep their tag.
    pub(crate) fn accept_canonical(
        self: &Arc<Self>,
        state: &mut EditorState,
        mut next: QuestionSet,
        source: ChangeSource,
    ) -> ChangeSummary {
        next.inherit_keys(&state.questions);
        let mut annotated = compute_changes(&state.snapshot, next, source);

        let mut fresh = Vec::new();
        for question in annotated.iter_mut() {
            if question.is_highlighted() {
                let inserted = state.questions.get_by_key(question.key).is_none();
                fresh.push((question.key, inserted));
            } else if state.highlights.is_active(question.key) {
                question.change_status = state
                    .questions
                    .get_by_key(question.key)
                    .and_then(|q| q.change_status);
            }
        }

        state.snapshot = annotated.stripped();
        state.questions = annotated;
        state.forget_removed_entrances();

        for (key, inserted) in fresh {
            self.arm_highlight(state, key);
            if inserted {
                state.highlights.mark_entrance(key);
            }
        }
        ChangeSummary::of(&state.questions)
    }

    /// Installs a freshly generated set: no tags, and it doubles as the new change snapshot.
    pub(crate) fn accept_generated(&self, state: &mut EditorState, mut generated: QuestionSet) {
        generated.inherit_keys(&state.questions);
        state.highlights.cancel_all();
        let generated = generated.stripped();
        state.snapshot = generated.clone();
        state.questions = generated;
        state.forget_removed_entrances();
        state.epoch.land();
    }

    pub(crate) fn arm_highlight(self: &Arc<Self>, state: &mut EditorState, key: Uuid) {
        let editor = Arc::downgrade(self);
        state.highlights.arm(key, move |key, token| {
            if let Some(editor) = editor.upgrade() {
                editor.expire_highlight(key, token);
            }
        });
    }

    fn expire_highlight(&self, key: Uuid, token: u64) {
        let mut state = self.state.lock();
        if state.highlights.finish(key, token) {
            if let Some(question) = state.questions.get_by_key_mut(key) {
                question.change_status = None;
            }
        }
    }

    /// Progress callback body. Events from a superseded request are dropped.
    pub(crate) fn on_progress(&self, epoch: u64, event: ProgressEvent) {
        let mut state = self.state.lock();
        if !state.closed && state.epoch.is_current(epoch) {
            state.progress.apply(event);
        }
    }

    pub(crate) fn reset_phase(&self, epoch: u64) {
        let mut state = self.state.lock();
        if !state.closed && state.epoch.is_current(epoch) {
            state.progress.restart_attempt();
        }
    }
}
