//! The contract this crate consumes from a CANopen transport library.
//!
//! Frame transmission, SDO segmented transfer, NMT negotiation and object
//! dictionary parsing all live on the other side of these traits. A
//! transport binding implements [`Node`] for its remote-node handle and
//! hands out [`TxPdo`]/[`RxPdo`] channel objects; [`Motor`](crate::Motor)
//! does the rest.
//!
//! All methods block on the bus round-trip. The node handle must be safe to
//! share between the application thread, streamer worker threads and the
//! transport's own receive dispatcher.

use crate::error::{Error, TransportError};
use core::fmt;

/// One entry of the CANopen object dictionary: a 16 bit index plus an 8 bit
/// subindex.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Slot {
    /// Object index.
    pub index: u16,
    /// Object subindex, 0 when the object is a plain variable.
    pub subindex: u8,
}

impl Slot {
    /// Create a slot from an index and subindex.
    pub const fn new(index: u16, subindex: u8) -> Self {
        Self { index, subindex }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{}", self.index, self.subindex)
    }
}

/// How a caller names an object: symbolically or by numeric index.
///
/// Symbolic names pass through the per-axis rename table before being
/// resolved against the object dictionary, so application code can say
/// `"controlword"` and end up at `Controlword 3` on a multi-axis board.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectId {
    /// A logical or device display name, resolved via rename table and
    /// object dictionary.
    Name(String),
    /// A raw object index, validated against the object dictionary.
    Index(u16),
}

impl From<&str> for ObjectId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for ObjectId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<u16> for ObjectId {
    fn from(index: u16) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectId::Name(name) => f.write_str(name),
            ObjectId::Index(index) => write!(f, "{:#06x}", index),
        }
    }
}

/// Subindex access: a number, or a symbolic record field name for the
/// dictionary to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SubIndex {
    /// Subindex 0, the common case for plain variables.
    #[default]
    Zero,
    /// An explicit numeric subindex.
    Number(u8),
    /// A record field name, subject to rename-table substitution.
    Name(String),
}

impl From<u8> for SubIndex {
    fn from(value: u8) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for SubIndex {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

/// A payload as carried by an SDO exchange or one mapped PDO entry.
///
/// At most 8 bytes, little-endian two's-complement on the wire. The typed
/// accessors replace the dynamic `raw`/`bits` properties a dynamically
/// typed CANopen stack would expose.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Value {
    bytes: heapless::Vec<u8, 8>,
}

impl Value {
    /// Wrap raw little-endian bytes.
    ///
    /// Panics when given more than 8 bytes; use [`Value::try_new`] for
    /// payloads of unchecked origin.
    pub fn new(bytes: &[u8]) -> Self {
        Self::try_new(bytes).expect("value payloads are at most 8 bytes")
    }

    /// Wrap raw little-endian bytes, failing on frames longer than 8 bytes.
    pub fn try_new(bytes: &[u8]) -> Result<Self, Error> {
        heapless::Vec::from_slice(bytes)
            .map(|bytes| Self { bytes })
            .map_err(|_| Error::PayloadTooLong {
                max_length: 8,
                length: bytes.len(),
            })
    }

    /// The payload interpreted as a little-endian unsigned integer.
    pub fn as_unsigned(&self) -> u64 {
        self.bytes
            .iter()
            .rev()
            .fold(0u64, |acc, byte| acc << 8 | u64::from(*byte))
    }

    /// The payload interpreted as a little-endian two's-complement integer.
    pub fn as_signed(&self) -> i64 {
        let unsigned = self.as_unsigned();
        let bits = self.bytes.len() as u32 * 8;

        if bits == 0 || bits == 64 {
            return unsigned as i64;
        }

        // Sign-extend from the payload's own width.
        let sign = 1u64 << (bits - 1);
        ((unsigned ^ sign).wrapping_sub(sign)) as i64
    }

    /// One bit of the payload, little-endian bit order.
    ///
    /// Out-of-range bits read as `false`.
    pub fn bit(&self, bit: usize) -> bool {
        self.bytes
            .get(bit / 8)
            .is_some_and(|byte| byte >> (bit % 8) & 1 == 1)
    }

    /// The raw little-endian bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload width in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// CANopen NMT states commanded through the transport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum NmtState {
    /// PRE-OPERATIONAL: SDO traffic only; PDO parameters may be rewritten.
    PreOperational,
    /// OPERATIONAL: PDO traffic enabled.
    Operational,
    /// STOPPED: NMT control only.
    Stopped,
}

impl fmt::Display for NmtState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NmtState::PreOperational => f.write_str("PRE-OPERATIONAL"),
            NmtState::Operational => f.write_str("OPERATIONAL"),
            NmtState::Stopped => f.write_str("STOPPED"),
        }
    }
}

/// One mapped entry of an inbound PDO frame, already split out and decoded
/// by the transport's receive dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEntry {
    /// The dictionary slot this entry is mapped to.
    pub slot: Slot,
    /// The entry's payload.
    pub value: Value,
}

/// Callback invoked by the transport's dispatcher thread for every inbound
/// frame of a transmit PDO, in arrival order.
pub type FrameCallback = Box<dyn Fn(&[FrameEntry]) + Send + Sync>;

/// A transmit PDO (device to host) parameter block.
///
/// Mutating calls stage parameters locally; [`TxPdo::save`] commits the
/// staged block to the device. Committing must happen under NMT
/// PRE-OPERATIONAL or the device may reject the writes.
pub trait TxPdo: Send {
    /// Remove all mapped entries.
    fn clear(&mut self) -> Result<(), TransportError>;

    /// Append a dictionary slot to the mapping.
    fn add_entry(&mut self, slot: Slot) -> Result<(), TransportError>;

    /// Set the transmission type; 255 is asynchronous (event driven).
    fn set_transmission_type(&mut self, trans_type: u8);

    /// Set the event timer period in milliseconds; 0 disables it.
    fn set_event_timer(&mut self, milliseconds: u16);

    /// Allow or forbid remote transmission requests.
    fn set_rtr_allowed(&mut self, allowed: bool);

    /// Enable or disable the PDO.
    fn set_enabled(&mut self, enabled: bool);

    /// Commit the staged parameter block to the device.
    fn save(&mut self) -> Result<(), TransportError>;

    /// Install the callback the dispatcher invokes per inbound frame.
    fn set_callback(&mut self, callback: FrameCallback);
}

/// A receive PDO (host to device) parameter block plus its outbound frame
/// buffer.
pub trait RxPdo: Send {
    /// Remove all mapped entries.
    fn clear(&mut self) -> Result<(), TransportError>;

    /// Append a dictionary slot to the mapping.
    fn add_entry(&mut self, slot: Slot) -> Result<(), TransportError>;

    /// Set the transmission type.
    fn set_transmission_type(&mut self, trans_type: u8);

    /// Allow or forbid remote transmission requests.
    fn set_rtr_allowed(&mut self, allowed: bool);

    /// Enable or disable the PDO.
    fn set_enabled(&mut self, enabled: bool);

    /// Commit the staged parameter block to the device.
    fn save(&mut self) -> Result<(), TransportError>;

    /// Write a raw value into the `entry`-th mapped slot of the outbound
    /// frame buffer, encoding to that entry's dictionary width.
    fn write(&mut self, entry: usize, value: i64) -> Result<(), TransportError>;

    /// Transmit the current frame buffer.
    fn transmit(&mut self) -> Result<(), TransportError>;
}

/// A remote CANopen node as provided by the transport library.
///
/// One node may back several [`Motor`](crate::Motor)s (one per axis of a
/// multi-axis board). The node always outlives the motors borrowing it, and
/// no motor ever tears the transport down.
pub trait Node: Send + Sync {
    /// Resolve a name or numeric index against the device's object
    /// dictionary, yielding the canonical slot.
    ///
    /// `object` is either a display name (e.g. `"Target Position 1"`) or a
    /// numeric index; `subindex` may itself be a record field name for the
    /// dictionary to resolve.
    fn find(&self, object: &ObjectId, subindex: &SubIndex) -> Option<Slot>;

    /// SDO upload: read the current payload of a slot.
    fn upload(&self, slot: Slot) -> Result<Value, TransportError>;

    /// SDO download: write an exact-width payload to a slot.
    fn download(&self, slot: Slot, data: &[u8]) -> Result<(), TransportError>;

    /// Acquire the transmit PDO numbered `number` (starting at 1).
    fn tpdo(&self, number: u8) -> Result<Box<dyn TxPdo>, TransportError>;

    /// Acquire the receive PDO numbered `number` (starting at 1).
    fn rpdo(&self, number: u8) -> Result<Box<dyn RxPdo>, TransportError>;

    /// Command an NMT state change for this node.
    fn set_nmt_state(&self, state: NmtState) -> Result<(), TransportError>;
}
