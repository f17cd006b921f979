//! Control point command sequencing.
//!
//! The control point accepts one write at a time, and a target can only be
//! written after control has been granted. [`CommandSequencer`] keeps that
//! ordering as a small state machine with a single pending-target slot: the
//! caller asks it what to write next and reports back when each write
//! completes. It never touches the link itself.

use super::ftms::{
    build_request_control, build_set_target_power, build_set_wheel_circumference,
    build_start_training, FtmsControlOpcode,
};
use super::types::ControlError;
use std::collections::VecDeque;

/// A single control point write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Ask the trainer for control (0x00)
    RequestControl,
    /// ERG target in watts (0x05)
    SetTargetPower(i16),
    /// Wheel circumference in 0.1 mm (0x13)
    SetWheelCircumference(u16),
    /// Start or resume training (0x07)
    StartOrResume,
}

impl ControlCommand {
    /// Opcode this command is written with.
    pub fn opcode(&self) -> FtmsControlOpcode {
        match self {
            ControlCommand::RequestControl => FtmsControlOpcode::RequestControl,
            ControlCommand::SetTargetPower(_) => FtmsControlOpcode::SetTargetPower,
            ControlCommand::SetWheelCircumference(_) => FtmsControlOpcode::SetWheelCircumference,
            ControlCommand::StartOrResume => FtmsControlOpcode::StartOrResume,
        }
    }

    /// Wire bytes for the control point.
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ControlCommand::RequestControl => build_request_control(),
            ControlCommand::SetTargetPower(watts) => build_set_target_power(watts),
            ControlCommand::SetWheelCircumference(tenth_mm) => {
                build_set_wheel_circumference(tenth_mm)
            }
            ControlCommand::StartOrResume => build_start_training(),
        }
    }
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlCommand::RequestControl => write!(f, "request control"),
            ControlCommand::SetTargetPower(w) => write!(f, "set target power {}W", w),
            ControlCommand::SetWheelCircumference(c) => {
                write!(f, "set wheel circumference {:.1}mm", *c as f32 / 10.0)
            }
            ControlCommand::StartOrResume => write!(f, "start/resume"),
        }
    }
}

/// What the sequencer is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequencerPhase {
    /// Nothing outstanding
    #[default]
    Idle,
    /// A setup command was written
    AwaitSetupAck,
    /// Request-control was written; the grant releases the pending target
    AwaitControlGrant,
    /// The target itself was written
    AwaitTargetAck,
}

/// Serializes control point writes for one connection.
#[derive(Debug, Default)]
pub struct CommandSequencer {
    phase: SequencerPhase,
    setup: VecDeque<ControlCommand>,
    pending: Option<ControlCommand>,
    in_flight: Option<ControlCommand>,
}

impl CommandSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one-off connection setup writes. They go out in order, ahead of
    /// any target. Returns the write to issue now, if the link is free.
    pub fn queue_setup(
        &mut self,
        commands: impl IntoIterator<Item = ControlCommand>,
    ) -> Option<ControlCommand> {
        self.setup.extend(commands);
        self.poll()
    }

    /// Request a new target.
    ///
    /// The command replaces whatever target is pending (last write wins).
    /// Returns the write to issue now: a request-control when the link is
    /// free, otherwise nothing and the target waits for the current write.
    pub fn set_target(&mut self, command: ControlCommand) -> Option<ControlCommand> {
        if let Some(replaced) = self.pending.replace(command) {
            tracing::debug!(%replaced, %command, "Pending target replaced");
        }
        self.poll()
    }

    /// Report the outcome of the write returned earlier. Returns the next
    /// write to issue, if any.
    pub fn on_write_complete(
        &mut self,
        result: Result<(), ControlError>,
    ) -> Option<ControlCommand> {
        let written = self.in_flight.take();

        match self.phase {
            SequencerPhase::Idle => {
                tracing::debug!(?written, "Ignoring write completion with nothing in flight");
                return None;
            }
            SequencerPhase::AwaitSetupAck => {
                if let Err(e) = result {
                    tracing::warn!(?written, "Setup command failed: {}", e);
                }
            }
            SequencerPhase::AwaitControlGrant => match result {
                Ok(()) => {
                    if let Some(target) = self.pending.take() {
                        return Some(self.issue(target, SequencerPhase::AwaitTargetAck));
                    }
                }
                Err(e) => {
                    let dropped = self.pending.take();
                    tracing::warn!(?dropped, "Control not granted, target discarded: {}", e);
                }
            },
            SequencerPhase::AwaitTargetAck => {
                if let Err(e) = result {
                    tracing::warn!(?written, "Target write failed: {}", e);
                }
            }
        }

        self.phase = SequencerPhase::Idle;
        self.poll()
    }

    /// Drop all state. Called on disconnect; a completion arriving later is
    /// ignored.
    pub fn reset(&mut self) {
        if self.pending.is_some() || self.in_flight.is_some() || !self.setup.is_empty() {
            tracing::debug!(
                pending = ?self.pending,
                in_flight = ?self.in_flight,
                setup = self.setup.len(),
                "Command sequencer reset"
            );
        }
        *self = Self::default();
    }

    /// Current phase.
    pub fn phase(&self) -> SequencerPhase {
        self.phase
    }

    /// Target waiting to be written.
    pub fn pending(&self) -> Option<ControlCommand> {
        self.pending
    }

    /// Command currently on the wire.
    pub fn in_flight(&self) -> Option<ControlCommand> {
        self.in_flight
    }

    /// Whether no write is outstanding.
    pub fn is_idle(&self) -> bool {
        self.phase == SequencerPhase::Idle
    }

    fn poll(&mut self) -> Option<ControlCommand> {
        if self.phase != SequencerPhase::Idle {
            return None;
        }

        if let Some(command) = self.setup.pop_front() {
            return Some(self.issue(command, SequencerPhase::AwaitSetupAck));
        }

        if self.pending.is_some() {
            return Some(self.issue(
                ControlCommand::RequestControl,
                SequencerPhase::AwaitControlGrant,
            ));
        }

        None
    }

    fn issue(&mut self, command: ControlCommand, phase: SequencerPhase) -> ControlCommand {
        tracing::debug!(%command, ?phase, "Control point write");
        self.phase = phase;
        self.in_flight = Some(command);
        command
    }
}
