//! Per-partition retry state machine
//!
//! Transitions are pure: [`PartitionState::next`] takes the current state and
//! an event and returns the new state without doing any I/O or sleeping. The
//! scraper drives the machine and performs the waits it asks for.

use crate::utils::error::FetchError;
use crate::utils::retry::RetryConfig;
use std::time::Duration;

/// Lifecycle of one partition fetch
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionState {
    /// Not yet dispatched
    Pending,
    /// Attempt `attempt` (1-based) is running
    InFlight { attempt: u32 },
    /// Attempt `attempt` failed transiently; wait `delay` and dispatch again
    Retrying {
        attempt: u32,
        delay: Duration,
        last: FetchError,
    },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, error: FetchError },
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionEvent {
    Dispatch,
    Succeeded,
    Failed(FetchError),
}

impl PartitionState {
    /// Apply `event` under `policy`.
    ///
    /// Events that make no sense in the current state leave it unchanged, so
    /// terminal states absorb everything.
    pub fn next(&self, event: PartitionEvent, policy: &RetryConfig) -> PartitionState {
        match (self, event) {
            (Self::Pending, PartitionEvent::Dispatch) => Self::InFlight { attempt: 1 },
            (Self::Retrying { attempt, .. }, PartitionEvent::Dispatch) => Self::InFlight {
                attempt: attempt + 1,
            },
            (Self::InFlight { attempt }, PartitionEvent::Succeeded) => Self::Succeeded {
                attempts: *attempt,
            },
            (Self::InFlight { attempt }, PartitionEvent::Failed(error)) => {
                let attempt = *attempt;
                if !error.is_transient() {
                    Self::Failed {
                        attempts: attempt,
                        error,
                    }
                } else if attempt <= policy.max_retries {
                    Self::Retrying {
                        attempt,
                        delay: policy.calculate_delay(attempt),
                        last: error,
                    }
                } else {
                    Self::Failed {
                        attempts: attempt,
                        error: FetchError::RetryExhausted {
                            url: error.url().unwrap_or_default().to_string(),
                            attempts: attempt,
                            last: Box::new(error),
                        },
                    }
                }
            }
            (state, _) => state.clone(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight { .. } => "in_flight",
            Self::Retrying { .. } => "retrying",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A partition state paired with the policy that governs it
#[derive(Debug, Clone)]
pub struct PartitionMachine {
    state: PartitionState,
    policy: RetryConfig,
}

impl PartitionMachine {
    pub fn new(policy: RetryConfig) -> Self {
        Self {
            state: PartitionState::Pending,
            policy,
        }
    }

    pub fn state(&self) -> &PartitionState {
        &self.state
    }

    pub fn apply(&mut self, event: PartitionEvent) -> &PartitionState {
        self.state = self.state.next(event, &self.policy);
        &self.state
    }

    /// Retries consumed so far
    pub fn retries(&self) -> u32 {
        match &self.state {
            PartitionState::Pending => 0,
            PartitionState::InFlight { attempt } | PartitionState::Retrying { attempt, .. } => {
                attempt.saturating_sub(1)
            }
            PartitionState::Succeeded { attempts } | PartitionState::Failed { attempts, .. } => {
                attempts.saturating_sub(1)
            }
        }
    }
}
