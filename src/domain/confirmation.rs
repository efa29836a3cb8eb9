use chrono::{DateTime, Utc};

use crate::domain::signal::Action;

/// The confirmation state machine, kept as an explicit value over persisted
/// fields rather than a coroutine, so a process restart resumes correctly
/// from the last persisted `confirmation_start_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    Idle,
    Confirming {
        action: Action,
        started_at: DateTime<Utc>,
    },
    Confirmed {
        action: Action,
    },
}

/// Outcome of feeding one evaluation's action into the state machine.
pub struct Transition {
    pub next: ConfirmationState,
    pub progress: f64,
    pub time_remaining_secs: i64,
}

impl ConfirmationState {
    /// Advances the state machine given a fresh evaluation's action and the
    /// bot's configured confirmation window. `now` is passed in rather than
    /// read internally so the transition is a pure function of its inputs.
    pub fn advance(self, action: Action, now: DateTime<Utc>, confirmation_seconds: i64) -> Transition {
        match (self, action) {
            (ConfirmationState::Idle, Action::Hold) => Transition {
                next: ConfirmationState::Idle,
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
            (ConfirmationState::Idle, a) => Transition {
                next: ConfirmationState::Confirming {
                    action: a,
                    started_at: now,
                },
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
            (ConfirmationState::Confirming { action: cur, started_at }, a) if cur == a => {
                let elapsed = (now - started_at).num_seconds();
                if elapsed >= confirmation_seconds {
                    Transition {
                        next: ConfirmationState::Confirmed { action: a },
                        progress: 1.0,
                        time_remaining_secs: 0,
                    }
                } else {
                    Transition {
                        next: ConfirmationState::Confirming {
                            action: cur,
                            started_at,
                        },
                        progress: elapsed as f64 / confirmation_seconds as f64,
                        time_remaining_secs: confirmation_seconds - elapsed,
                    }
                }
            }
            (ConfirmationState::Confirming { .. }, Action::Hold) => Transition {
                next: ConfirmationState::Idle,
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
            (ConfirmationState::Confirming { .. }, a) => Transition {
                next: ConfirmationState::Confirming {
                    action: a,
                    started_at: now,
                },
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
            // A Confirmed state is terminal from the evaluator's point of
            // view; TradeExecutor consumes it and resets to Idle regardless
            // of placement outcome. If another evaluation arrives first
            // (the executor hasn't caught up yet), re-running with the same
            // action is a no-op; a different action restarts confirmation.
            (ConfirmationState::Confirmed { action: cur }, a) if cur == a => Transition {
                next: ConfirmationState::Confirmed { action: cur },
                progress: 1.0,
                time_remaining_secs: 0,
            },
            (ConfirmationState::Confirmed { .. }, Action::Hold) => Transition {
                next: ConfirmationState::Idle,
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
            (ConfirmationState::Confirmed { .. }, a) => Transition {
                next: ConfirmationState::Confirming {
                    action: a,
                    started_at: now,
                },
                progress: 0.0,
                time_remaining_secs: confirmation_seconds,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn idle_plus_hold_stays_idle() {
        let t = ConfirmationState::Idle.advance(Action::Hold, now(), 300);
        assert_eq!(t.next, ConfirmationState::Idle);
    }

    #[test]
    fn idle_plus_buy_starts_confirming() {
        let t = ConfirmationState::Idle.advance(Action::Buy, now(), 300);
        assert!(matches!(t.next, ConfirmationState::Confirming { action: Action::Buy, .. }));
    }

    #[test]
    fn confirmation_expiring_exactly_at_boundary_promotes() {
        let started_at = now();
        let state = ConfirmationState::Confirming {
            action: Action::Buy,
            started_at,
        };
        let t = state.advance(Action::Buy, started_at + Duration::seconds(300), 300);
        assert_eq!(t.next, ConfirmationState::Confirmed { action: Action::Buy });
    }

    #[test]
    fn flip_to_different_action_resets_progress() {
        let started_at = now();
        let state = ConfirmationState::Confirming {
            action: Action::Buy,
            started_at,
        };
        let later = started_at + Duration::seconds(180);
        let t = state.advance(Action::Sell, later, 300);
        assert_eq!(t.progress, 0.0);
        match t.next {
            ConfirmationState::Confirming { action, started_at: s } => {
                assert_eq!(action, Action::Sell);
                assert_eq!(s, later);
            }
            _ => panic!("expected Confirming"),
        }
    }

    #[test]
    fn flip_to_hold_resets_to_idle() {
        let state = ConfirmationState::Confirming {
            action: Action::Buy,
            started_at: now(),
        };
        let t = state.advance(Action::Hold, now(), 300);
        assert_eq!(t.next, ConfirmationState::Idle);
    }
}
