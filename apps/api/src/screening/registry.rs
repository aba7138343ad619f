use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval, Instant};
use tracing::info;

use crate::backend_client::{BackendError, ScreeningBackend};
use crate::errors::AppError;
use crate::screening::editor::Editor;
use crate::screening::unsaved::LeaveDecision;
use crate::screening::EngineSettings;

struct OpenEditor {
    editor: Arc<Editor>,
    last_access: Instant,
}

/// Open editors, one per vacancy. Opening an editor that is not in memory rehydrates it
/// from the backend. Editors nobody opens for `editor_idle_ttl` are evicted, so a client
/// that never leaves does not pin its editor forever.
pub struct EditorRegistry {
    backend: Arc<dyn ScreeningBackend>,
    settings: EngineSettings,
    editors: Mutex<HashMap<String, OpenEditor>>,
}

impl EditorRegistry {
    pub fn new(backend: Arc<dyn ScreeningBackend>, settings: EngineSettings) -> Self {
        Self {
            backend,
            settings,
            editors: Mutex::new(HashMap::new()),
        }
    }

    pub async fn open(&self, vacancy_id: &str) -> Result<Arc<Editor>, AppError> {
        let existing = {
            let mut editors = self.editors.lock();
            editors
                .get_mut(vacancy_id)
                .filter(|open| !open.editor.is_closed())
                .map(|open| {
                    open.last_access = Instant::now();
                    open.editor.clone()
                })
        };
        if let Some(editor) = existing {
            return Ok(editor);
        }

        let vacancy = match self.backend.get_vacancy(vacancy_id).await {
            Ok(vacancy) => vacancy,
            Err(BackendError::Api { status: 404, .. }) => {
                return Err(AppError::NotFound(format!("Vacancy '{vacancy_id}' not found")));
            }
            Err(e) => return Err(e.into()),
        };
        let record = self.backend.get_pre_screening(vacancy_id).await?;

        let editor = Editor::new(vacancy_id, self.backend.clone(), self.settings.clone());
        editor.rehydrate(Some(vacancy), record);

        let mut editors = self.editors.lock();
        let open = editors
            .entry(vacancy_id.to_string())
            .or_insert_with(|| OpenEditor {
                editor: editor.clone(),
                last_access: Instant::now(),
            });
        // A concurrent open may have won; a closed leftover is replaced.
        if open.editor.is_closed() {
            open.editor = editor;
        }
        open.last_access = Instant::now();
        info!("Opened editor for vacancy {}", vacancy_id);
        Ok(open.editor.clone())
    }

    /// Navigation gate for the vacancy's editor. A vacancy without an open editor has
    /// nothing to lose.
    pub fn leave(&self, vacancy_id: &str, confirmed: bool) -> LeaveDecision {
        let Some(editor) = self
            .editors
            .lock()
            .get(vacancy_id)
            .map(|open| open.editor.clone())
        else {
            return LeaveDecision::Left;
        };
        let decision = editor.request_leave(confirmed);
        if decision == LeaveDecision::Left {
            self.editors.lock().remove(vacancy_id);
        }
        decision
    }

    /// Closes and forgets every editor not opened within `idle`. Returns how many went.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.editors.lock().retain(|vacancy_id, open| {
            if now.duration_since(open.last_access) < idle {
                return true;
            }
            evicted.push((vacancy_id.clone(), open.editor.clone()));
            false
        });

        for (vacancy_id, editor) in &evicted {
            editor.close();
            info!("Evicted idle editor for vacancy {}", vacancy_id);
        }
        evicted.len()
    }

    /// Runs `evict_idle` with the configured TTL, four times per TTL, until the registry
    /// is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>) {
        let registry = Arc::downgrade(self);
        let every = (self.settings.editor_idle_ttl / 4).max(Duration::from_secs(1));

        tokio::spawn(async move {
            let mut ticker = interval(every);

            loop {
                ticker.tick().await;

                let Some(registry) = registry.upgrade() else {
                    break;
                };
                registry.evict_idle(registry.settings.editor_idle_ttl);
            }
        });
    }

    pub fn open_count(&self) -> usize {
        self.editors.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::prescreening::{PreScreeningRecord, PublishRecord, ScreeningMessages};
    use crate::models::question::{Question, QuestionSet, QuestionType};
    use crate::screening::testing::{settle, Call, MockBackend};

    fn registry(backend: &Arc<MockBackend>) -> EditorRegistry {
        EditorRegistry::new(backend.clone(), EngineSettings::default())
    }

    #[tokio::test]
    async fn test_open_rehydrates_once() {
        let backend = Arc::new(MockBackend::default());
        backend.with_record(PreScreeningRecord {
            questions: QuestionSet::new(
                vec![Question::new("K1", QuestionType::Knockout, "Licence?")],
                vec![],
            ),
            messages: ScreeningMessages::default(),
            publish: PublishRecord::default(),
        });
        let registry = registry(&backend);

        let first = registry.open("vac-1").await.unwrap();
        let second = registry.open("vac-1").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.calls(Call::GetVacancy), 1);
        assert_eq!(first.session_id().as_deref(), Some("vac-1"));
        assert_eq!(first.questions().len(), 1);
        assert_eq!(registry.open_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_vacancy_is_not_found() {
        let backend = Arc::new(MockBackend::default());
        backend.reject_next(Call::GetVacancy, 404);
        let registry = registry(&backend);
        assert!(matches!(
            registry.open("missing").await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(registry.open_count(), 0);
    }

    #[tokio::test]
    async fn test_leave_closes_and_forgets_editor() {
        let backend = Arc::new(MockBackend::default());
        let registry = registry(&backend);
        let editor = registry.open("vac-1").await.unwrap();

        assert_eq!(registry.leave("vac-1", false), LeaveDecision::Left);
        assert!(editor.is_closed());
        assert_eq!(registry.open_count(), 0);

        let reopened = registry.open("vac-1").await.unwrap();
        assert!(!Arc::ptr_eq(&editor, &reopened));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_editors_are_evicted_and_closed() {
        let backend = Arc::new(MockBackend::default());
        let registry = registry(&backend);
        let stale = registry.open("vac-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        let fresh = registry.open("vac-2").await.unwrap();
        tokio::time::advance(Duration::from_secs(25 * 60)).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(30 * 60)), 1);

        assert!(stale.is_closed());
        assert!(!fresh.is_closed());
        assert_eq!(registry.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_again_keeps_editor_alive() {
        let backend = Arc::new(MockBackend::default());
        let registry = registry(&backend);
        let editor = registry.open("vac-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        registry.open("vac-1").await.unwrap();
        tokio::time::advance(Duration::from_secs(20 * 60)).await;

        assert_eq!(registry.evict_idle(Duration::from_secs(30 * 60)), 0);
        assert!(!editor.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_abandoned_editor() {
        let backend = Arc::new(MockBackend::default());
        let registry = Arc::new(registry(&backend));
        registry.spawn_idle_sweeper();
        let editor = registry.open("vac-1").await.unwrap();

        // Default TTL is 30 minutes, swept every 7.5 minutes.
        for _ in 0..6 {
            tokio::time::advance(Duration::from_secs(450)).await;
            settle().await;
        }

        assert!(editor.is_closed());
        assert_eq!(registry.open_count(), 0);
    }
}
