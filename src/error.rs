//! Axis402 error types.

use crate::state::State;
use core::time::Duration;

/// Bounded storage for variable names travelling inside errors.
pub type Name = heapless::String<64>;

/// An axis402 error.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Error {
    /// No object dictionary entry matches the given name or index.
    UnknownVariable {
        /// The name or index as supplied by the caller, after rename-table
        /// substitution.
        name: Name,
    },
    /// The requested state change is not a single legal CiA-402 transition.
    IllegalTransition {
        /// The state the drive was in when the request was made.
        from: State,
        /// The requested state.
        to: State,
    },
    /// The profile name is not present in the operating-mode table.
    IllegalMode {
        /// The unrecognised profile mnemonic.
        profile: Name,
    },
    /// An integer does not fit the target codec width.
    Range {
        /// The offending value.
        value: i64,
        /// The width of the target encoding, in bytes.
        width: u8,
        /// Whether the target encoding is signed.
        signed: bool,
    },
    /// A PDO was configured with a synchronous transmission type and a
    /// non-zero event timer. The two are mutually exclusive.
    PdoConstraint {
        /// Configured transmission type.
        trans_type: u8,
        /// Configured event timer in milliseconds.
        event_timer: u16,
    },
    /// A payload does not fit in a PDO frame or `Value` buffer.
    PayloadTooLong {
        /// Maximum length in bytes.
        max_length: usize,
        /// Actual length in bytes.
        length: usize,
    },
    /// The underlying SDO/PDO/NMT exchange failed.
    Transport(TransportError),
    /// A commanded state was not reflected in the statusword within the
    /// configured deadline.
    TransitionTimeout {
        /// The commanded state.
        target: State,
        /// The deadline that elapsed.
        timeout: Duration,
    },
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::UnknownVariable { name } => {
                write!(f, "no object dictionary entry for {:?}", name.as_str())
            }
            Error::IllegalTransition { from, to } => {
                write!(f, "no legal transition {} -> {}", from, to)
            }
            Error::IllegalMode { profile } => {
                write!(f, "unknown operating mode {:?}", profile.as_str())
            }
            Error::Range {
                value,
                width,
                signed,
            } => write!(
                f,
                "{} does not fit {} {}-byte encoding",
                value,
                if *signed { "signed" } else { "unsigned" },
                width
            ),
            Error::PdoConstraint {
                trans_type,
                event_timer,
            } => write!(
                f,
                "transmission type {} excludes event timer {} ms",
                trans_type, event_timer
            ),
            Error::PayloadTooLong { max_length, length } => write!(
                f,
                "payload of {} bytes exceeds maximum of {} bytes",
                length, max_length
            ),
            Error::Transport(e) => write!(f, "transport: {}", e),
            Error::TransitionTimeout { target, timeout } => write!(
                f,
                "statusword did not reflect {} within {:?}",
                target, timeout
            ),
        }
    }
}

/// An error reported by the CANopen transport collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TransportError {
    /// An SDO upload (read) failed.
    SdoUpload {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
    },
    /// An SDO download (write) failed.
    SdoDownload {
        /// Object index.
        index: u16,
        /// Object subindex.
        subindex: u8,
    },
    /// A PDO service call (clear/add/save/transmit) failed.
    Pdo {
        /// PDO number as used by the transport, starting at 1.
        number: u8,
    },
    /// The requested PDO number is not provided by the device.
    NoSuchPdo {
        /// PDO number as used by the transport, starting at 1.
        number: u8,
    },
    /// An NMT state write failed.
    Nmt,
    /// The bus round-trip timed out.
    Timeout,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TransportError::SdoUpload { index, subindex } => {
                write!(f, "SDO upload {:#06x}:{} failed", index, subindex)
            }
            TransportError::SdoDownload { index, subindex } => {
                write!(f, "SDO download {:#06x}:{} failed", index, subindex)
            }
            TransportError::Pdo { number } => write!(f, "PDO {} service failed", number),
            TransportError::NoSuchPdo { number } => write!(f, "device has no PDO {}", number),
            TransportError::Nmt => f.write_str("NMT state write failed"),
            TransportError::Timeout => f.write_str("bus timeout"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

pub(crate) fn bounded_name(name: &str) -> Name {
    let mut out = Name::new();

    // Longer names are truncated. The error message loses the tail, nothing
    // else does.
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }

    out
}
