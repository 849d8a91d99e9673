//! CiA-402 state machine data: statusword decode, controlword commands and
//! the transition table.
//!
//! The tables here are pure data. Driving a real axis through them is the
//! job of [`Motor`](crate::Motor), which reads the statusword over SDO and
//! writes the controlword values this module hands out.

use core::fmt;

bitflags::bitflags! {
    /// CiA-402 controlword, object `0x6040`.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct ControlWord: u16 {
        /// Switch on.
        const SWITCH_ON = 1 << 0;
        /// Enable voltage.
        const ENABLE_VOLTAGE = 1 << 1;
        /// Quick stop (active low).
        const QUICK_STOP = 1 << 2;
        /// Enable operation.
        const ENABLE_OP = 1 << 3;
        /// Operation mode specific. New set-point in `pp`, start homing in
        /// `hm`.
        const NEW_SETPOINT = 1 << 4;
        /// Operation mode specific. Change set immediately in `pp`.
        const CHANGE_SET_IMMEDIATELY = 1 << 5;
        /// Operation mode specific. Relative move in `pp`.
        const RELATIVE = 1 << 6;
        /// Reset fault (only effective in FAULT).
        const FAULT_RESET = 1 << 7;
        /// Halt.
        const HALT = 1 << 8;

        /// Command: disable voltage paths, landing in SWITCH ON DISABLED.
        const STATE_DISABLE_VOLTAGE = 0;
        /// Command: shutdown, landing in READY TO SWITCH ON.
        const STATE_SHUTDOWN = Self::ENABLE_VOLTAGE.bits() | Self::QUICK_STOP.bits();
        /// Command: switch on, landing in SWITCHED ON.
        const STATE_SWITCH_ON = Self::STATE_SHUTDOWN.bits() | Self::SWITCH_ON.bits();
        /// Command: enable operation.
        const STATE_ENABLE_OP = Self::STATE_SWITCH_ON.bits() | Self::ENABLE_OP.bits();
        /// Command: quick stop.
        const STATE_QUICK_STOP = Self::ENABLE_VOLTAGE.bits();
        /// Command: acknowledge a fault, landing in SWITCH ON DISABLED.
        const STATE_FAULT_RESET = Self::FAULT_RESET.bits();
    }
}

bitflags::bitflags! {
    /// CiA-402 statusword, object `0x6041`.
    ///
    /// Bits 0 to 6 take part in the state decode. The higher bits are
    /// reported as-is; bit 14 in particular is manufacturer specific and is
    /// used by some drives as a set-point acknowledge.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct StatusWord: u16 {
        /// Ready to switch on, mandatory.
        const READY_TO_SWITCH_ON = 1 << 0;
        /// Switched on, mandatory.
        const SWITCHED_ON = 1 << 1;
        /// Operation enabled (voltage applied, torque present), mandatory.
        const OP_ENABLED = 1 << 2;
        /// Fault, mandatory.
        const FAULT = 1 << 3;
        /// Voltage enabled, optional.
        const VOLTAGE_ENABLED = 1 << 4;
        /// Quick stop (active low), optional.
        const QUICK_STOP = 1 << 5;
        /// Switch on disabled, mandatory.
        const SWITCH_ON_DISABLED = 1 << 6;
        /// Warning, optional.
        const WARNING = 1 << 7;
        /// Remote, optional.
        const REMOTE = 1 << 9;
        /// Target reached.
        const TARGET_REACHED = 1 << 10;
        /// Internal limit active.
        const INTERNAL_LIMIT = 1 << 11;
        /// Operation mode specific. Set-point acknowledge in `pp`.
        const OP_SPECIFIC_1 = 1 << 12;
        /// Operation mode specific.
        const OP_SPECIFIC_2 = 1 << 13;
        /// Manufacturer specific. Set-point acknowledge / axis moving on
        /// some stepper drives.
        const MAN_SPECIFIC_1 = 1 << 14;
        /// Manufacturer specific.
        const MAN_SPECIFIC_2 = 1 << 15;
    }
}

/// Symbolic CiA-402 device state.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum State {
    /// NOT READY TO SWITCH ON.
    NotReadyToSwitchOn,
    /// SWITCH ON DISABLED.
    SwitchOnDisabled,
    /// READY TO SWITCH ON.
    ReadyToSwitchOn,
    /// SWITCHED ON.
    SwitchedOn,
    /// OPERATION ENABLED.
    OperationEnabled,
    /// FAULT.
    Fault,
    /// FAULT REACTION ACTIVE.
    FaultReactionActive,
    /// QUICK STOP ACTIVE.
    QuickStopActive,
    /// The statusword did not match any known state pattern.
    Unknown,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::NotReadyToSwitchOn => f.write_str("NOT READY TO SWITCH ON"),
            State::SwitchOnDisabled => f.write_str("SWITCH ON DISABLED"),
            State::ReadyToSwitchOn => f.write_str("READY TO SWITCH ON"),
            State::SwitchedOn => f.write_str("SWITCHED ON"),
            State::OperationEnabled => f.write_str("OPERATION ENABLED"),
            State::Fault => f.write_str("FAULT"),
            State::FaultReactionActive => f.write_str("FAULT REACTION ACTIVE"),
            State::QuickStopActive => f.write_str("QUICK STOP ACTIVE"),
            State::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Statusword decode patterns, CiA-402 table 29. Scanned in declaration
/// order; first `(sw & mask) == bits` match wins.
const DECODE: &[(u16, u16, State)] = &[
    (0x4F, 0x00, State::NotReadyToSwitchOn),
    (0x4F, 0x40, State::SwitchOnDisabled),
    (0x6F, 0x21, State::ReadyToSwitchOn),
    (0x6F, 0x23, State::SwitchedOn),
    (0x6F, 0x27, State::OperationEnabled),
    (0x4F, 0x08, State::Fault),
    (0x4F, 0x0F, State::FaultReactionActive),
    (0x6F, 0x07, State::QuickStopActive),
];

impl State {
    /// Decode a raw statusword into a symbolic state.
    pub fn from_statusword(sw: u16) -> Self {
        DECODE
            .iter()
            .find(|(mask, bits, _)| sw & mask == *bits)
            .map(|(_, _, state)| *state)
            .unwrap_or(State::Unknown)
    }
}

impl From<StatusWord> for State {
    fn from(sw: StatusWord) -> Self {
        Self::from_statusword(sw.bits())
    }
}

/// Controlword commanding the single legal transition `from -> to`, or
/// `None` when CiA-402 defines no such edge.
///
/// Automatic transitions (NOT READY TO SWITCH ON -> SWITCH ON DISABLED,
/// FAULT REACTION ACTIVE -> FAULT) happen on the device side and are
/// deliberately absent.
pub fn transition(from: State, to: State) -> Option<ControlWord> {
    use State::*;

    let cw = match (from, to) {
        // Disable voltage, transitions 7, 9, 10 and 12.
        (ReadyToSwitchOn, SwitchOnDisabled)
        | (OperationEnabled, SwitchOnDisabled)
        | (SwitchedOn, SwitchOnDisabled)
        | (QuickStopActive, SwitchOnDisabled) => ControlWord::STATE_DISABLE_VOLTAGE,
        // Fault reset, transition 15.
        (Fault, SwitchOnDisabled) => ControlWord::STATE_FAULT_RESET,
        // Shutdown, transitions 2, 6 and 8.
        (SwitchOnDisabled, ReadyToSwitchOn)
        | (SwitchedOn, ReadyToSwitchOn)
        | (OperationEnabled, ReadyToSwitchOn) => ControlWord::STATE_SHUTDOWN,
        // Switch on, transitions 3 and 5.
        (ReadyToSwitchOn, SwitchedOn) | (OperationEnabled, SwitchedOn) => {
            ControlWord::STATE_SWITCH_ON
        }
        // Enable operation, transitions 4 and 16.
        (SwitchedOn, OperationEnabled) | (QuickStopActive, OperationEnabled) => {
            ControlWord::STATE_ENABLE_OP
        }
        // Quick stop, transition 11.
        (OperationEnabled, QuickStopActive) => ControlWord::STATE_QUICK_STOP,
        _ => return None,
    };

    Some(cw)
}

/// Ordered intermediate states to traverse from `from` to OPERATION
/// ENABLED, or `None` when no commanded walk exists (e.g. from FAULT
/// REACTION ACTIVE, which resolves on the device side).
pub fn path_to_operation_enabled(from: State) -> Option<&'static [State]> {
    use State::*;

    let path: &[State] = match from {
        Fault => &[SwitchOnDisabled, ReadyToSwitchOn, SwitchedOn, OperationEnabled],
        SwitchOnDisabled => &[ReadyToSwitchOn, SwitchedOn, OperationEnabled],
        ReadyToSwitchOn => &[SwitchedOn, OperationEnabled],
        SwitchedOn => &[OperationEnabled],
        QuickStopActive => &[OperationEnabled],
        OperationEnabled => &[],
        _ => return None,
    };

    Some(path)
}

/// Ordered intermediate states to traverse from `from` to SWITCH ON
/// DISABLED, stepping back down through the power stages.
pub fn path_to_switch_on_disabled(from: State) -> Option<&'static [State]> {
    use State::*;

    let path: &[State] = match from {
        Fault => &[SwitchOnDisabled],
        SwitchOnDisabled => &[],
        ReadyToSwitchOn => &[SwitchOnDisabled],
        SwitchedOn => &[ReadyToSwitchOn, SwitchOnDisabled],
        OperationEnabled => &[SwitchedOn, ReadyToSwitchOn, SwitchOnDisabled],
        QuickStopActive => &[
            OperationEnabled,
            SwitchedOn,
            ReadyToSwitchOn,
            SwitchOnDisabled,
        ],
        _ => return None,
    };

    Some(path)
}
