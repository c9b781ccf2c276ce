//! FIFO command queue with multi-tick confirmation, bounded retries and
//! restart-on-timeout.
//!
//! Exactly one command is attempted per tick. A command that reports
//! [`CommandOutcome::Waiting`] or [`CommandOutcome::Failure`] goes back to the
//! head of the queue, so nothing behind it runs until it settles.
//!
//! The executor keeps two counters for the command at the head:
//! - `strikes`: consecutive waits and failures
//! - `restarts`: how many times a timed-out wait re-issued its call
//!
//! When `strikes` reaches the attempt limit the command either restarts (only
//! if the last strike was a wait that timed out and restarts remain) or is
//! abandoned.

use std::collections::VecDeque;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::metrics::COMMANDS_TOTAL;

use super::types::OrchestratorError;

/// Result of one command attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Done; drop the command.
    Success,
    /// Issued earlier, waiting for the engine to confirm.
    Waiting,
    /// The attempt itself failed.
    Failure(String),
}

/// A deferred operation run by [`CommandQueue`] against a shared context.
#[async_trait]
pub trait QueuedCommand<C: Send>: Send {
    fn name(&self) -> &str;

    /// Make one attempt. Called at most once per tick.
    async fn attempt(&mut self, ctx: &mut C) -> CommandOutcome;

    /// Forget any in-progress state so the next attempt re-issues the
    /// underlying call instead of polling for its confirmation.
    fn restart(&mut self) {}
}

/// What happened during one executor tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    Idle,
    Succeeded {
        command: String,
    },
    Waiting {
        command: String,
        strikes: u32,
    },
    Retrying {
        command: String,
        strikes: u32,
        reason: String,
    },
    Restarted {
        command: String,
        restarts: u32,
    },
    Abandoned {
        command: String,
        reason: String,
    },
}

pub struct CommandQueue<C: Send> {
    pending: VecDeque<Box<dyn QueuedCommand<C>>>,
    strikes: u32,
    restarts: u32,
    max_strikes: u32,
    max_restarts: u32,
}

impl<C: Send> CommandQueue<C> {
    pub fn new(max_strikes: u32, max_restarts: u32) -> Self {
        Self {
            pending: VecDeque::new(),
            strikes: 0,
            restarts: 0,
            max_strikes: max_strikes.max(1),
            max_restarts,
        }
    }

    /// Append a command to the tail.
    pub fn enqueue(&mut self, command: Box<dyn QueuedCommand<C>>) {
        debug!("Queued command {}", command.name());
        self.pending.push_back(command);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pending.iter().any(|c| c.name() == name)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Command names, head first.
    pub fn names(&self) -> Vec<String> {
        self.pending.iter().map(|c| c.name().to_string()).collect()
    }

    /// Drop every queued command and reset the counters.
    pub fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.strikes = 0;
        self.restarts = 0;
        dropped
    }

    /// Counters for the command currently at the head: (strikes, restarts).
    pub fn counters(&self) -> (u32, u32) {
        (self.strikes, self.restarts)
    }

    /// Pop the head command and attempt it once.
    pub async fn run_one_tick(&mut self, ctx: &mut C) -> QueueEvent {
        let Some(mut command) = self.pending.pop_front() else {
            return QueueEvent::Idle;
        };
        let name = command.name().to_string();

        let failure = match command.attempt(ctx).await {
            CommandOutcome::Success => {
                info!("Command {} succeeded", name);
                self.strikes = 0;
                self.restarts = 0;
                COMMANDS_TOTAL.with_label_values(&[name.as_str(), "succeeded"]).inc();
                return QueueEvent::Succeeded { command: name };
            }
            CommandOutcome::Waiting => {
                self.strikes += 1;
                if self.strikes < self.max_strikes {
                    debug!(
                        "Command {} waiting for confirmation ({}/{})",
                        name, self.strikes, self.max_strikes
                    );
                    self.pending.push_front(command);
                    COMMANDS_TOTAL.with_label_values(&[name.as_str(), "waiting"]).inc();
                    return QueueEvent::Waiting {
                        command: name,
                        strikes: self.strikes,
                    };
                }
                // The wait budget is spent: this strike becomes a timeout
                // failure without counting twice.
                Failure::WaitTimeout
            }
            CommandOutcome::Failure(reason) => {
                self.strikes += 1;
                Failure::Attempt(reason)
            }
        };

        if self.strikes < self.max_strikes {
            let reason = failure.reason(&name);
            warn!(
                "Command {} failed ({}), retrying ({}/{})",
                name, reason, self.strikes, self.max_strikes
            );
            self.pending.push_front(command);
            COMMANDS_TOTAL.with_label_values(&[name.as_str(), "retrying"]).inc();
            return QueueEvent::Retrying {
                command: name,
                strikes: self.strikes,
                reason,
            };
        }

        if matches!(failure, Failure::WaitTimeout) && self.restarts < self.max_restarts {
            self.restarts += 1;
            self.strikes = 0;
            warn!(
                "Command {} never confirmed, re-issuing (restart {}/{})",
                name, self.restarts, self.max_restarts
            );
            command.restart();
            self.pending.push_front(command);
            COMMANDS_TOTAL.with_label_values(&[name.as_str(), "restarted"]).inc();
            return QueueEvent::Restarted {
                command: name,
                restarts: self.restarts,
            };
        }

        let abandoned = OrchestratorError::CommandAbandoned {
            command: name.clone(),
            reason: failure.reason(&name),
        };
        error!("{}", abandoned);
        self.strikes = 0;
        self.restarts = 0;
        COMMANDS_TOTAL.with_label_values(&[name.as_str(), "abandoned"]).inc();
        QueueEvent::Abandoned {
            command: name,
            reason: failure.reason_owned(),
        }
    }
}

enum Failure {
    WaitTimeout,
    Attempt(String),
}

impl Failure {
    fn reason(&self, command: &str) -> String {
        match self {
            Self::WaitTimeout => OrchestratorError::WaitTimeout(command.to_string()).to_string(),
            Self::Attempt(reason) => reason.clone(),
        }
    }

    fn reason_owned(self) -> String {
        match self {
            Self::WaitTimeout => "timed out waiting for confirmation".to_string(),
            Self::Attempt(reason) => reason,
        }
    }
}
