//! Real-time commands
//!
//! Single bytes Grbl acts on the moment they arrive, whatever is queued in
//! its buffers. They are never line terminated and never acknowledged.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single-byte real-time command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RealTimeCommand {
    SoftReset = 0x18,
    StatusReportQuery = b'?',
    CycleStartResume = b'~',
    FeedHold = b'!',
    SafetyDoor = 0x84,
    JogCancel = 0x85,
    FeedOverrideReset = 0x90,
    FeedOverrideCoarsePlus = 0x91,
    FeedOverrideCoarseMinus = 0x92,
    FeedOverrideFinePlus = 0x93,
    FeedOverrideFineMinus = 0x94,
    RapidOverrideReset = 0x95,
    RapidOverrideMedium = 0x96,
    RapidOverrideLow = 0x97,
    SpindleOverrideReset = 0x99,
    SpindleOverrideCoarsePlus = 0x9A,
    SpindleOverrideCoarseMinus = 0x9B,
    SpindleOverrideFinePlus = 0x9C,
    SpindleOverrideFineMinus = 0x9D,
    ToggleSpindleStop = 0x9E,
    ToggleFloodCoolant = 0xA0,
    ToggleMistCoolant = 0xA1,
}

/// The byte is not a real-time command
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("0x{0:02X} is not a real-time command")]
pub struct NotRealTimeCommand(pub u8);

impl RealTimeCommand {
    /// Every command, in byte order
    pub const ALL: [RealTimeCommand; 22] = [
        RealTimeCommand::SoftReset,
        RealTimeCommand::FeedHold,
        RealTimeCommand::StatusReportQuery,
        RealTimeCommand::CycleStartResume,
        RealTimeCommand::SafetyDoor,
        RealTimeCommand::JogCancel,
        RealTimeCommand::FeedOverrideReset,
        RealTimeCommand::FeedOverrideCoarsePlus,
        RealTimeCommand::FeedOverrideCoarseMinus,
        RealTimeCommand::FeedOverrideFinePlus,
        RealTimeCommand::FeedOverrideFineMinus,
        RealTimeCommand::RapidOverrideReset,
        RealTimeCommand::RapidOverrideMedium,
        RealTimeCommand::RapidOverrideLow,
        RealTimeCommand::SpindleOverrideReset,
        RealTimeCommand::SpindleOverrideCoarsePlus,
        RealTimeCommand::SpindleOverrideCoarseMinus,
        RealTimeCommand::SpindleOverrideFinePlus,
        RealTimeCommand::SpindleOverrideFineMinus,
        RealTimeCommand::ToggleSpindleStop,
        RealTimeCommand::ToggleFloodCoolant,
        RealTimeCommand::ToggleMistCoolant,
    ];

    /// Look up the command for `byte`
    pub fn from_byte(byte: u8) -> Result<Self, NotRealTimeCommand> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.byte() == byte)
            .ok_or(NotRealTimeCommand(byte))
    }

    /// Wire byte
    pub fn byte(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            RealTimeCommand::SoftReset => "soft reset",
            RealTimeCommand::StatusReportQuery => "status report query",
            RealTimeCommand::CycleStartResume => "cycle start / resume",
            RealTimeCommand::FeedHold => "feed hold",
            RealTimeCommand::SafetyDoor => "safety door",
            RealTimeCommand::JogCancel => "jog cancel",
            RealTimeCommand::FeedOverrideReset => "feed override: set 100% of programmed rate",
            RealTimeCommand::FeedOverrideCoarsePlus => "feed override: increase 10%",
            RealTimeCommand::FeedOverrideCoarseMinus => "feed override: decrease 10%",
            RealTimeCommand::FeedOverrideFinePlus => "feed override: increase 1%",
            RealTimeCommand::FeedOverrideFineMinus => "feed override: decrease 1%",
            RealTimeCommand::RapidOverrideReset => "rapid override: set to 100% full rapid rate",
            RealTimeCommand::RapidOverrideMedium => "rapid override: set to 50% of rapid rate",
            RealTimeCommand::RapidOverrideLow => "rapid override: set to 25% of rapid rate",
            RealTimeCommand::SpindleOverrideReset => "spindle speed override: set 100% of programmed spindle speed",
            RealTimeCommand::SpindleOverrideCoarsePlus => "spindle speed override: increase 10%",
            RealTimeCommand::SpindleOverrideCoarseMinus => "spindle speed override: decrease 10%",
            RealTimeCommand::SpindleOverrideFinePlus => "spindle speed override: increase 1%",
            RealTimeCommand::SpindleOverrideFineMinus => "spindle speed override: decrease 1%",
            RealTimeCommand::ToggleSpindleStop => "toggle spindle stop",
            RealTimeCommand::ToggleFloodCoolant => "toggle flood coolant",
            RealTimeCommand::ToggleMistCoolant => "toggle mist coolant",
        }
    }
}

impl fmt::Display for RealTimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for RealTimeCommand {
    type Error = NotRealTimeCommand;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte)
    }
}

/// Pull real-time bytes out of mixed input
///
/// Returns the commands in the order they appeared and the remaining bytes
/// with the real-time bytes removed.
pub fn split_realtime(input: &[u8]) -> (Vec<RealTimeCommand>, Vec<u8>) {
    let mut commands = Vec::new();
    let mut rest = Vec::with_capacity(input.len());
    for &byte in input {
        match RealTimeCommand::from_byte(byte) {
            Ok(cmd) => commands.push(cmd),
            Err(_) => rest.push(byte),
        }
    }
    (commands, rest)
}
