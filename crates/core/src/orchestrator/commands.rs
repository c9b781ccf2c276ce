//! Queued race engine commands.
//!
//! Confirmation commands issue their engine call once, then report
//! [`CommandOutcome::Waiting`] until telemetry shows the effect.

use async_trait::async_trait;
use tracing::info;

use crate::engine::RaceStatus;

use super::queue::{CommandOutcome, QueuedCommand};
use super::session::RaceSession;
use super::types::OrchestratorError;

pub type SessionCommand = Box<dyn QueuedCommand<RaceSession>>;

fn failed(e: crate::engine::EngineError) -> CommandOutcome {
    CommandOutcome::Failure(OrchestratorError::Engine(e).to_string())
}

/// Put the race into formation and wait for a live status.
#[derive(Debug, Default)]
pub struct ConfirmRaceStart {
    issued: bool,
}

impl ConfirmRaceStart {
    pub const NAME: &'static str = "confirm_race_start";

    pub fn boxed() -> SessionCommand {
        Box::new(Self::default())
    }
}

#[async_trait]
impl QueuedCommand<RaceSession> for ConfirmRaceStart {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&mut self, session: &mut RaceSession) -> CommandOutcome {
        if !self.issued {
            let engine = session.engine.clone();
            if let Err(e) = session
                .call_engine("set_race_status", engine.set_race_status(RaceStatus::Formation))
                .await
            {
                return failed(e);
            }
            info!("Race start sent, waiting for the engine to go live");
            self.issued = true;
            return CommandOutcome::Waiting;
        }
        if session.status.is_live() {
            CommandOutcome::Success
        } else {
            CommandOutcome::Waiting
        }
    }

    fn restart(&mut self) {
        self.issued = false;
    }
}

/// Stop the race and wait for the engine to report Stopped.
#[derive(Debug, Default)]
pub struct ConfirmRaceStop {
    issued: bool,
}

impl ConfirmRaceStop {
    pub const NAME: &'static str = "confirm_race_stop";

    pub fn boxed() -> SessionCommand {
        Box::new(Self::default())
    }
}

#[async_trait]
impl QueuedCommand<RaceSession> for ConfirmRaceStop {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&mut self, session: &mut RaceSession) -> CommandOutcome {
        if !self.issued {
            let engine = session.engine.clone();
            if let Err(e) = session
                .call_engine("set_race_status", engine.set_race_status(RaceStatus::Stopped))
                .await
            {
                return failed(e);
            }
            info!("Race stop sent, waiting for confirmation");
            self.issued = true;
            return CommandOutcome::Waiting;
        }
        if session.status == RaceStatus::Stopped {
            CommandOutcome::Success
        } else {
            CommandOutcome::Waiting
        }
    }

    fn restart(&mut self) {
        self.issued = false;
    }
}

/// Remove every car and wait until telemetry shows an empty field.
///
/// Sets the session's `deleting` flag for its whole lifetime, which suspends
/// reconciliation so the reconciler does not respawn cars being torn down.
#[derive(Debug, Default)]
pub struct DeleteAllEntrants {
    issued: bool,
}

impl DeleteAllEntrants {
    pub const NAME: &'static str = "delete_all_entrants";

    pub fn boxed() -> SessionCommand {
        Box::new(Self::default())
    }
}

#[async_trait]
impl QueuedCommand<RaceSession> for DeleteAllEntrants {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&mut self, session: &mut RaceSession) -> CommandOutcome {
        session.deleting = true;
        if !self.issued {
            let engine = session.engine.clone();
            if let Err(e) = session
                .call_engine("delete_all_participants", engine.delete_all_participants())
                .await
            {
                return failed(e);
            }
            info!(
                "Delete sent, waiting for {} car(s) to leave",
                session.observed_count()
            );
            self.issued = true;
            return CommandOutcome::Waiting;
        }
        if session.observed_count() == 0 {
            session.deleting = false;
            CommandOutcome::Success
        } else {
            CommandOutcome::Waiting
        }
    }

    fn restart(&mut self) {
        self.issued = false;
    }
}

/// Reset laps, flags and timing in the engine.
#[derive(Debug, Default)]
pub struct ResetRaceControl;

impl ResetRaceControl {
    pub const NAME: &'static str = "reset_race_control";

    pub fn boxed() -> SessionCommand {
        Box::new(Self)
    }
}

#[async_trait]
impl QueuedCommand<RaceSession> for ResetRaceControl {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&mut self, session: &mut RaceSession) -> CommandOutcome {
        let engine = session.engine.clone();
        match session
            .call_engine("reset_control", engine.reset_control())
            .await
        {
            Ok(()) => CommandOutcome::Success,
            Err(e) => failed(e),
        }
    }
}

/// Open entries for the next race. Local only.
#[derive(Debug)]
pub struct ReopenEntries {
    countdown_ticks: u32,
}

impl ReopenEntries {
    pub const NAME: &'static str = "reopen_entries";

    pub fn boxed(countdown_ticks: u32) -> SessionCommand {
        Box::new(Self { countdown_ticks })
    }
}

#[async_trait]
impl QueuedCommand<RaceSession> for ReopenEntries {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&mut self, session: &mut RaceSession) -> CommandOutcome {
        session.open_entries(self.countdown_ticks);
        info!("Entries reopened");
        CommandOutcome::Success
    }
}

/// The teardown sequence run after every race and on manual reset.
pub fn reset_sequence(entry_countdown_ticks: u32) -> Vec<SessionCommand> {
    vec![
        ConfirmRaceStop::boxed(),
        DeleteAllEntrants::boxed(),
        ResetRaceControl::boxed(),
        ReopenEntries::boxed(entry_countdown_ticks),
    ]
}
