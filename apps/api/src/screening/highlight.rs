//! Highlight windows for changed questions.
//!
//! Timers are keyed by the question's stable key, so an id swap after an add keeps
//! its window running. Re-arming a key restarts the window. Every timer carries a token;
//! an expiry is only honoured when its token is still the live one for that key.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

pub struct Highlights {
    window: Duration,
    timers: HashMap<Uuid, Timer>,
    next_token: u64,
    entrance_pending: HashSet<Uuid>,
    entrance_played: HashSet<Uuid>,
}

impl Highlights {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timers: HashMap::new(),
            next_token: 0,
            entrance_pending: HashSet::new(),
            entrance_played: HashSet::new(),
        }
    }

    /// Starts (or restarts) the window for `key`. `on_expire` receives the key and token
    /// when the window elapses and must call back into `finish`.
    pub fn arm<F>(&mut self, key: Uuid, on_expire: F)
    where
        F: FnOnce(Uuid, u64) + Send + 'static,
    {
        if let Some(previous) = self.timers.remove(&key) {
            previous.handle.abort();
        }
        self.next_token += 1;
        let token = self.next_token;
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            on_expire(key, token);
        });
        self.timers.insert(key, Timer { token, handle });
    }

    /// Ends the window for `key` if `token` is still current. Returns whether it did.
    pub fn finish(&mut self, key: Uuid, token: u64) -> bool {
        match self.timers.get(&key) {
            Some(timer) if timer.token == token => {
                self.timers.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Cancels the window and any pending entrance for `key`.
    pub fn withdraw(&mut self, key: Uuid) {
        if let Some(timer) = self.timers.remove(&key) {
            timer.handle.abort();
        }
        self.entrance_pending.remove(&key);
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        self.entrance_pending.clear();
    }

    pub fn is_active(&self, key: Uuid) -> bool {
        self.timers.contains_key(&key)
    }

    /// Drops entrance bookkeeping for keys that left the question set.
    pub fn retain_entrances(&mut self, live: &HashSet<Uuid>) {
        self.entrance_pending.retain(|key| live.contains(key));
        self.entrance_played.retain(|key| live.contains(key));
    }

    /// Queues the one-time entrance treatment for a newly inserted question.
    pub fn mark_entrance(&mut self, key: Uuid) {
        if !self.entrance_played.contains(&key) {
            self.entrance_pending.insert(key);
        }
    }

    /// True exactly once per key: on the first render after `mark_entrance`.
    pub fn take_entrance(&mut self, key: Uuid) -> bool {
        if self.entrance_pending.remove(&key) {
            self.entrance_played.insert(key);
            true
        } else {
            false
        }
    }
}

impl Drop for Highlights {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    async fn settle() {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
    }

    /// Highlights shared with their own expiry callbacks, the way the editor wires them.
    fn shared() -> Arc<Mutex<Highlights>> {
        Arc::new(Mutex::new(Highlights::new(Duration::from_secs(5))))
    }

    fn arm(highlights: &Arc<Mutex<Highlights>>, key: Uuid) {
        let weak = Arc::downgrade(highlights);
        highlights.lock().arm(key, move |key, token| {
            if let Some(h) = weak.upgrade() {
                h.lock().finish(key, token);
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_expires_after_five_seconds() {
        let highlights = shared();
        let key = Uuid::new_v4();
        arm(&highlights, key);
        settle().await;

        tokio::time::advance(Duration::from_millis(4_999)).await;
        settle().await;
        assert!(highlights.lock().is_active(key));

        tokio::time::advance(Duration::from_millis(1)).await;
        settle().await;
        assert!(!highlights.lock().is_active(key));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_restarts_the_window() {
        let highlights = shared();
        let key = Uuid::new_v4();
        arm(&highlights, key);
        settle().await;

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        arm(&highlights, key);
        settle().await;

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert!(highlights.lock().is_active(key), "restarted window must outlive the first");

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(!highlights.lock().is_active(key));
    }

    #[test]
    fn test_stale_token_does_not_finish() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let mut highlights = Highlights::new(Duration::from_secs(5));
            let key = Uuid::new_v4();
            highlights.arm(key, |_, _| {});
            highlights.arm(key, |_, _| {});
            assert!(!highlights.finish(key, 1));
            assert!(highlights.finish(key, 2));
            assert!(!highlights.is_active(key));
        });
    }

    #[test]
    fn test_entrance_plays_once() {
        let mut highlights = Highlights::new(Duration::from_secs(5));
        let key = Uuid::new_v4();
        highlights.mark_entrance(key);
        assert!(highlights.take_entrance(key));
        assert!(!highlights.take_entrance(key));

        highlights.mark_entrance(key);
        assert!(!highlights.take_entrance(key), "entrance never repeats for the same key");
    }

    #[test]
    fn test_withdraw_drops_pending_entrance() {
        let mut highlights = Highlights::new(Duration::from_secs(5));
        let key = Uuid::new_v4();
        highlights.mark_entrance(key);
        highlights.withdraw(key);
        assert!(!highlights.take_entrance(key));
    }

    #[test]
    fn test_entrances_of_removed_questions_are_forgotten() {
        let mut highlights = Highlights::new(Duration::from_secs(5));
        let kept = Uuid::new_v4();
        let gone = Uuid::new_v4();
        highlights.mark_entrance(kept);
        highlights.mark_entrance(gone);
        assert!(highlights.take_entrance(kept));
        assert!(highlights.take_entrance(gone));

        highlights.retain_entrances(&HashSet::from([kept]));

        assert!(highlights.entrance_played.contains(&kept));
        assert!(!highlights.entrance_played.contains(&gone));
        highlights.mark_entrance(kept);
        assert!(!highlights.take_entrance(kept), "a question still present never replays");
    }
}
