//! Time-sliced disclosure of the latest assistant text.
//!
//! One timer task per session, guarded by a cancellation token: replacing
//! the target cancels the old timer before the new one starts, so two
//! concurrent reveal timers can never race on the same session.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    Idle,
    Revealing,
    Settled,
}

/// The currently visible prefix and where the reveal stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealState {
    pub text: String,
    pub phase: RevealPhase,
}

impl RevealState {
    fn idle() -> Self {
        Self {
            text: String::new(),
            phase: RevealPhase::Idle,
        }
    }
}

pub struct RevealScheduler {
    tick: Duration,
    step_chars: usize,
    target: String,
    state: Arc<watch::Sender<RevealState>>,
    timer: Option<CancellationToken>,
}

impl RevealScheduler {
    pub fn new(tick: Duration, step_chars: usize) -> Self {
        let (tx, _rx) = watch::channel(RevealState::idle());
        Self {
            tick,
            step_chars: step_chars.max(1),
            target: String::new(),
            state: Arc::new(tx),
            timer: None,
        }
    }

    /// Replace the text to reveal and restart from an empty prefix.
    pub fn set_target(&mut self, text: impl Into<String>) {
        self.stop_timer();
        self.target = text.into();

        if self.target.is_empty() {
            self.state.send_replace(RevealState::idle());
            return;
        }

        self.state.send_replace(RevealState {
            text: String::new(),
            phase: RevealPhase::Revealing,
        });

        let token = CancellationToken::new();
        let guard = token.clone();
        let state = self.state.clone();
        let chars: Vec<char> = self.target.chars().collect();
        let tick = self.tick;
        let step = self.step_chars;

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(tick);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first interval tick completes immediately.
            timer.tick().await;

            let mut shown = 0usize;
            while shown < chars.len() {
                tokio::select! {
                    biased;
                    () = guard.cancelled() => return,
                    _ = timer.tick() => {}
                }
                if guard.is_cancelled() {
                    return;
                }
                shown = (shown + step).min(chars.len());
                let settled = shown == chars.len();
                state.send_replace(RevealState {
                    text: chars[..shown].iter().collect(),
                    phase: if settled {
                        RevealPhase::Settled
                    } else {
                        RevealPhase::Revealing
                    },
                });
            }
        });
        self.timer = Some(token);
    }

    /// Stop revelation immediately, leaving the last revealed prefix as-is.
    pub fn cancel(&mut self) {
        self.stop_timer();
    }

    /// Drop the target and return to idle with an empty prefix.
    pub fn reset(&mut self) {
        self.stop_timer();
        self.target.clear();
        self.state.send_replace(RevealState::idle());
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn current(&self) -> RevealState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RevealState> {
        self.state.subscribe()
    }

    pub fn updates(&self) -> WatchStream<RevealState> {
        WatchStream::new(self.subscribe())
    }

    fn stop_timer(&mut self) {
        if let Some(token) = self.timer.take() {
            token.cancel();
        }
    }
}

impl Drop for RevealScheduler {
    fn drop(&mut self) {
        self.stop_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> RevealScheduler {
        RevealScheduler::new(Duration::from_millis(8), 5)
    }

    async fn settle(reveal: &RevealScheduler) -> RevealState {
        let mut rx = reveal.subscribe();
        loop {
            let state = rx.borrow_and_update().clone();
            if state.phase != RevealPhase::Revealing {
                return state;
            }
            if rx.changed().await.is_err() {
                return reveal.current();
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reveals_target_progressively_until_settled() {
        let mut reveal = scheduler();
        reveal.set_target("hello, streamed world");

        let mut rx = reveal.subscribe();
        let mut last_len = 0usize;
        loop {
            let state = rx.borrow_and_update().clone();
            let len = state.text.chars().count();
            assert!(len >= last_len, "revealed prefix must be monotonic");
            assert!(state.text.len() <= "hello, streamed world".len());
            last_len = len;
            if state.phase == RevealPhase::Settled {
                break;
            }
            rx.changed().await.unwrap();
        }
        assert_eq!(reveal.current().text, "hello, streamed world");
    }

    #[tokio::test(start_paused = true)]
    async fn second_target_supersedes_first() {
        let mut reveal = scheduler();
        reveal.set_target("the first, rather long, target text");
        // Replace before the first reveal can complete.
        reveal.set_target("short");

        let state = settle(&reveal).await;
        assert_eq!(state.phase, RevealPhase::Settled);
        assert_eq!(state.text, "short");
        assert!(state.text.chars().count() <= "short".chars().count());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_keeps_last_prefix() {
        let mut reveal = scheduler();
        reveal.set_target("some text that takes several ticks");

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        let before = reveal.current().text;
        reveal.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reveal.current().text, before);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_returns_to_idle() {
        let mut reveal = scheduler();
        reveal.set_target("something");
        reveal.reset();
        assert_eq!(reveal.current(), RevealState::idle());
        assert_eq!(reveal.target(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_target_settles_immediately_to_idle() {
        let mut reveal = scheduler();
        reveal.set_target("");
        assert_eq!(reveal.current().phase, RevealPhase::Idle);
    }
}
