//! Operating-mode profiles and the per-motor mode table.

use crate::node::ObjectId;
use core::fmt;
use std::collections::HashMap;

/// A CiA-402 operating-mode profile.
///
/// Each variant knows which object its cyclic or one-shot command targets;
/// the device-side integer code comes from the [`ModeTable`], since
/// manufacturers renumber modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Profile {
    /// No mode selected.
    NoMode,
    /// Profile position: point-to-point moves with on-device ramps.
    ProfilePosition,
    /// Profile velocity: continuous rotation at a commanded speed.
    ProfileVelocity,
    /// Homing.
    Homing,
    /// Cyclic synchronous position: the host streams position set-points.
    CyclicSynchronousPosition,
    /// Cyclic synchronous velocity: the host streams velocity set-points.
    CyclicSynchronousVelocity,
}

impl Profile {
    /// The short name used throughout the API.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Profile::NoMode => "no_mode",
            Profile::ProfilePosition => "pp",
            Profile::ProfileVelocity => "pv",
            Profile::Homing => "hm",
            Profile::CyclicSynchronousPosition => "csp",
            Profile::CyclicSynchronousVelocity => "csv",
        }
    }

    /// Parse a mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Option<Self> {
        match mnemonic {
            "no_mode" => Some(Profile::NoMode),
            "pp" => Some(Profile::ProfilePosition),
            "pv" => Some(Profile::ProfileVelocity),
            "hm" => Some(Profile::Homing),
            "csp" => Some(Profile::CyclicSynchronousPosition),
            "csv" => Some(Profile::CyclicSynchronousVelocity),
            _ => None,
        }
    }

    /// The logical name of the object this profile's set-point targets,
    /// where one exists.
    pub fn command_object(self) -> Option<&'static str> {
        match self {
            Profile::ProfilePosition | Profile::CyclicSynchronousPosition => {
                Some("target_position")
            }
            Profile::ProfileVelocity | Profile::CyclicSynchronousVelocity => {
                Some("target_velocity")
            }
            Profile::NoMode | Profile::Homing => None,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Maps profile mnemonics to the integer codes programmed into the
/// modes-of-operation object.
///
/// The default codes target Trinamic stepper modules (`pv` is 2 there, not
/// the generic 3); both the codes and the object the motor writes them to
/// can be overridden per device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTable {
    object: ObjectId,
    codes: HashMap<String, i8>,
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            object: "operating_mode".into(),
            codes: [
                ("no_mode", 0),
                ("pp", 1),
                ("pv", 2),
                ("hm", 6),
                ("csp", 8),
                ("csv", 9),
            ]
            .into_iter()
            .map(|(mnemonic, code)| (mnemonic.to_owned(), code))
            .collect(),
        }
    }
}

impl ModeTable {
    /// The default code table, programmed through a different object.
    pub fn with_object(object: impl Into<ObjectId>) -> Self {
        Self {
            object: object.into(),
            ..Self::default()
        }
    }

    /// Add or override one profile's code.
    pub fn set_code(&mut self, mnemonic: impl Into<String>, code: i8) {
        self.codes.insert(mnemonic.into(), code);
    }

    /// The code for a mnemonic, if the table knows it.
    pub fn code(&self, mnemonic: &str) -> Option<i8> {
        self.codes.get(mnemonic).copied()
    }

    /// The object the mode code is written to, before renaming.
    pub fn object(&self) -> &ObjectId {
        &self.object
    }
}
