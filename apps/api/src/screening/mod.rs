//! Pre-screening question lifecycle engine.
//!
//! One `Editor` per vacancy owns the canonical question set and runs every operation on it:
//! generation, feedback, optimistic reorder/add/delete, debounced auto-save and publishing.

use std::time::Duration;

pub mod autosave;
pub mod diff;
pub mod editor;
pub mod feedback;
pub mod generation;
pub mod handlers;
pub mod highlight;
pub mod mutations;
pub mod publish;
pub mod registry;
pub mod retry;
pub mod session;
pub mod unsaved;

#[cfg(test)]
pub(crate) mod testing;

pub use editor::{Editor, EditorView, Operation, COLLECTING_DATA_LABEL};
pub use registry::EditorRegistry;

/// Timing knobs of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Total attempts for retried backend calls.
    pub max_attempts: u32,
    /// First backoff delay; doubles after every failed attempt.
    pub retry_base_delay: Duration,
    pub autosave_debounce: Duration,
    pub highlight_window: Duration,
    /// Editors untouched for this long are closed and dropped from memory.
    pub editor_idle_ttl: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
            autosave_debounce: Duration::from_millis(500),
            highlight_window: Duration::from_secs(5),
            editor_idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl EngineSettings {
    pub fn with_overrides(
        autosave_debounce_ms: Option<u64>,
        highlight_window_ms: Option<u64>,
        editor_idle_ttl_secs: Option<u64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            autosave_debounce: autosave_debounce_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.autosave_debounce),
            highlight_window: highlight_window_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.highlight_window),
            editor_idle_ttl: editor_idle_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.editor_idle_ttl),
            ..defaults
        }
    }
}
