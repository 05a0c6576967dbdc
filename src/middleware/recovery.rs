use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::errors::TerminalCondition;

/// Recovery controller state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    /// Normal operation, the wrapped workflow is live
    Normal,
    /// A terminal condition tripped the controller; only an explicit reset
    /// returns to Normal
    Failed,
}

/// Error-boundary style supervisor for a stateful subtree.
///
/// Terminal conditions (forbidden word, unsupported input) trip the controller
/// into Failed; it never auto-recovers. An explicit reset returns to Normal
/// and increments a monotonic generation counter identifying the current
/// mount of the supervised subtree.
///
/// States:
/// - Normal: workflow runs, generation identifies the current mount
/// - Failed: fallback view shown, all workflow requests refused
#[derive(Clone)]
pub struct RecoveryController {
    inner: Arc<RwLock<RecoveryInner>>,
    /// Label used in logs and snapshots ("page" or "app")
    scope: &'static str,
}

struct RecoveryInner {
    state: RecoveryState,
    condition: Option<TerminalCondition>,
    generation: u64,
    total_trips: usize,
    total_resets: usize,
}

impl RecoveryController {
    pub fn new(scope: &'static str) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RecoveryInner {
                state: RecoveryState::Normal,
                condition: None,
                generation: 0,
                total_trips: 0,
                total_resets: 0,
            })),
            scope,
        }
    }

    /// Transition Normal → Failed with the given terminal condition.
    ///
    /// If the controller is already Failed, the first condition is kept; a
    /// second trip before the user resets changes nothing visible.
    pub fn trip(&self, condition: TerminalCondition) {
        let mut inner = self.inner.write();
        inner.total_trips += 1;

        match inner.state {
            RecoveryState::Normal => {
                warn!(scope = self.scope, condition = %condition, "Recovery controller tripped");
                inner.state = RecoveryState::Failed;
                inner.condition = Some(condition);
            }
            RecoveryState::Failed => {
                warn!(
                    scope = self.scope,
                    condition = %condition,
                    "Terminal condition while already failed, keeping first condition"
                );
            }
        }
    }

    /// Explicit user-invoked reset: Failed → Normal. Also valid from Normal;
    /// the reset action is always available.
    ///
    /// Increments the generation counter so in-flight work from before the
    /// reset is invalidated, and returns the new generation.
    pub fn reset(&self) -> u64 {
        let mut inner = self.inner.write();
        inner.state = RecoveryState::Normal;
        inner.condition = None;
        inner.generation += 1;
        inner.total_resets += 1;
        info!(scope = self.scope, generation = inner.generation, "Recovery controller reset");
        inner.generation
    }

    pub fn state(&self) -> RecoveryState {
        self.inner.read().state
    }

    pub fn is_failed(&self) -> bool {
        self.inner.read().state == RecoveryState::Failed
    }

    /// The condition that tripped the controller, while Failed.
    pub fn condition(&self) -> Option<TerminalCondition> {
        self.inner.read().condition.clone()
    }

    /// Current mount generation. Work issued under an older generation must
    /// be discarded on completion.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn scope(&self) -> &'static str {
        self.scope
    }

    /// Get statistics
    pub fn stats(&self) -> RecoveryStats {
        let inner = self.inner.read();
        RecoveryStats {
            state: inner.state,
            generation: inner.generation,
            total_trips: inner.total_trips,
            total_resets: inner.total_resets,
        }
    }
}

/// Recovery controller statistics
#[derive(Debug, Clone)]
pub struct RecoveryStats {
    pub state: RecoveryState,
    pub generation: u64,
    pub total_trips: usize,
    pub total_resets: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forbidden(word: &str) -> TerminalCondition {
        TerminalCondition::ForbiddenWord {
            word: word.to_string(),
            translation: format!("(ES) {}", word),
        }
    }

    #[test]
    fn test_trip_moves_to_failed_and_never_auto_recovers() {
        let controller = RecoveryController::new("page");
        assert_eq!(controller.state(), RecoveryState::Normal);

        controller.trip(forbidden("cat"));
        assert_eq!(controller.state(), RecoveryState::Failed);
        assert_eq!(controller.condition(), Some(forbidden("cat")));

        // Still failed until someone resets
        assert!(controller.is_failed());
    }

    #[test]
    fn test_first_condition_wins_while_failed() {
        let controller = RecoveryController::new("app");
        controller.trip(forbidden("cat"));
        controller.trip(forbidden("sun"));
        assert_eq!(controller.condition(), Some(forbidden("cat")));
        assert_eq!(controller.stats().total_trips, 2);
    }

    #[test]
    fn test_reset_returns_to_normal_and_bumps_generation() {
        let controller = RecoveryController::new("app");
        assert_eq!(controller.generation(), 0);

        controller.trip(forbidden("cat"));
        let generation = controller.reset();

        assert_eq!(generation, 1);
        assert_eq!(controller.state(), RecoveryState::Normal);
        assert_eq!(controller.condition(), None);
        assert_eq!(controller.generation(), 1);
    }

    #[test]
    fn test_reset_from_normal_still_bumps_generation() {
        let controller = RecoveryController::new("page");
        assert_eq!(controller.reset(), 1);
        assert_eq!(controller.reset(), 2);
        assert_eq!(controller.stats().total_resets, 2);
    }
}
