use serde::Serialize;
use tracing::warn;

/// Server-side conversational context for one vacancy.
///
/// Once established the id is never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationSession {
    session_id: String,
}

impl GenerationSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.session_id
    }
}

/// Records the session returned by a generation, keeping an already established one.
pub fn establish_session(current: &mut Option<GenerationSession>, returned: String) {
    match current {
        Some(existing) if existing.id() != returned => {
            warn!(
                "Backend returned session {} but {} is already established; keeping it",
                returned,
                existing.id()
            );
        }
        Some(_) => {}
        None => *current = Some(GenerationSession::new(returned)),
    }
}

/// Monotonic request counter. Each generation or feedback request takes a new epoch;
/// a response is only applied while its epoch is still the current one.
///
/// `landed` counts the responses that actually replaced the canonical set.
#[derive(Debug, Default)]
pub struct RequestEpoch {
    current: u64,
    landed: u64,
}

impl RequestEpoch {
    pub fn begin(&mut self) -> u64 {
        self.current += 1;
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.current == epoch
    }

    pub fn land(&mut self) {
        self.landed += 1;
    }

    pub fn landed(&self) -> u64 {
        self.landed
    }
}
