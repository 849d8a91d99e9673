//! Process-data bindings: configuration for transmit PDOs (device to host,
//! mirrored locally) and receive PDOs (host to device, driven by a sample
//! stream).

use crate::{
    error::Error,
    node::{ObjectId, SubIndex},
};
use core::fmt;

/// One entry of a PDO mapping, still in caller terms. Resolved to a
/// [`Slot`](crate::Slot) when the configuration is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    /// The mapped object.
    pub object: ObjectId,
    /// Subindex within the object.
    pub subindex: SubIndex,
}

impl From<&str> for EntrySpec {
    fn from(name: &str) -> Self {
        Self {
            object: name.into(),
            subindex: SubIndex::Zero,
        }
    }
}

impl From<u16> for EntrySpec {
    fn from(index: u16) -> Self {
        Self {
            object: index.into(),
            subindex: SubIndex::Zero,
        }
    }
}

impl From<ObjectId> for EntrySpec {
    fn from(object: ObjectId) -> Self {
        Self {
            object,
            subindex: SubIndex::Zero,
        }
    }
}

impl From<(&str, u8)> for EntrySpec {
    fn from((name, subindex): (&str, u8)) -> Self {
        Self {
            object: name.into(),
            subindex: subindex.into(),
        }
    }
}

impl From<(u16, u8)> for EntrySpec {
    fn from((index, subindex): (u16, u8)) -> Self {
        Self {
            object: index.into(),
            subindex: subindex.into(),
        }
    }
}

/// Transmission type byte: 255 is asynchronous (event driven), lower values
/// are synchronous relative to SYNC frames.
pub const TRANS_TYPE_ASYNC: u8 = 255;

/// Configuration of one transmit PDO.
///
/// Defaults: asynchronous, no event timer, RTR allowed, enabled. A
/// synchronous transmission type and a non-zero event timer are mutually
/// exclusive, and the checked setters make that combination unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpdoConfig {
    pub(crate) number: u8,
    pub(crate) entries: Vec<EntrySpec>,
    pub(crate) trans_type: u8,
    pub(crate) event_timer: u16,
    pub(crate) rtr_allowed: bool,
    pub(crate) enabled: bool,
}

impl TpdoConfig {
    /// A TPDO mapping the given entries, with default parameters.
    pub fn new(number: u8, entries: impl IntoIterator<Item = impl Into<EntrySpec>>) -> Self {
        Self {
            number,
            entries: entries.into_iter().map(Into::into).collect(),
            trans_type: TRANS_TYPE_ASYNC,
            event_timer: 0,
            rtr_allowed: true,
            enabled: true,
        }
    }

    /// Set the transmission type.
    pub fn transmission_type(mut self, trans_type: u8) -> Result<Self, Error> {
        if trans_type != TRANS_TYPE_ASYNC && self.event_timer != 0 {
            return Err(Error::PdoConstraint {
                trans_type,
                event_timer: self.event_timer,
            });
        }

        self.trans_type = trans_type;

        Ok(self)
    }

    /// Set the event timer period in milliseconds.
    pub fn event_timer(mut self, milliseconds: u16) -> Result<Self, Error> {
        if milliseconds != 0 && self.trans_type != TRANS_TYPE_ASYNC {
            return Err(Error::PdoConstraint {
                trans_type: self.trans_type,
                event_timer: milliseconds,
            });
        }

        self.event_timer = milliseconds;

        Ok(self)
    }

    /// Allow or forbid remote transmission requests.
    pub fn rtr_allowed(mut self, allowed: bool) -> Self {
        self.rtr_allowed = allowed;
        self
    }

    /// Enable or disable the PDO. Disabled PDOs are configured and
    /// persisted but the device will not transmit them, and no mirror cell
    /// is registered for their entries.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The PDO number this configuration applies to.
    pub fn number(&self) -> u8 {
        self.number
    }
}

/// One tuple of a sample stream; the `i`-th element lands in the `i`-th
/// mapped PDO entry.
pub type Sample = heapless::Vec<i64, 8>;

/// A running sample stream.
pub type SampleIter = Box<dyn Iterator<Item = Sample> + Send>;

/// A restartable, lazily evaluated source of samples. Called once per
/// streamer start to produce a fresh stream.
pub type SampleSource = Box<dyn FnMut() -> SampleIter + Send>;

/// Build a [`Sample`] from up to 8 values.
pub fn sample(values: impl IntoIterator<Item = i64>) -> Sample {
    values.into_iter().collect()
}

/// Adapt any iterator-producing closure into a [`SampleSource`].
///
/// ```
/// use axis402::pdo::{sample, source_from_fn};
///
/// let ramp = source_from_fn(|| (0..1000).map(|i| sample([i])));
/// ```
pub fn source_from_fn<F, I>(mut factory: F) -> SampleSource
where
    F: FnMut() -> I + Send + 'static,
    I: IntoIterator<Item = Sample>,
    I::IntoIter: Send + 'static,
{
    Box::new(move || Box::new(factory().into_iter()))
}

/// Configuration of one receive PDO plus the stream that will feed it.
pub struct RpdoConfig {
    pub(crate) number: u8,
    pub(crate) entries: Vec<EntrySpec>,
    pub(crate) source: SampleSource,
    pub(crate) frequency: f64,
    pub(crate) trans_type: Option<u8>,
    pub(crate) rtr_allowed: bool,
    pub(crate) enabled: bool,
}

impl RpdoConfig {
    /// An RPDO mapping the given entries, fed from `source` at `frequency`
    /// hertz.
    pub fn new(
        number: u8,
        entries: impl IntoIterator<Item = impl Into<EntrySpec>>,
        source: SampleSource,
        frequency: f64,
    ) -> Self {
        Self {
            number,
            entries: entries.into_iter().map(Into::into).collect(),
            source,
            frequency,
            trans_type: None,
            rtr_allowed: true,
            enabled: true,
        }
    }

    /// Set the transmission type. Left untouched on the device when unset.
    pub fn transmission_type(mut self, trans_type: u8) -> Self {
        self.trans_type = Some(trans_type);
        self
    }

    /// Allow or forbid remote transmission requests.
    pub fn rtr_allowed(mut self, allowed: bool) -> Self {
        self.rtr_allowed = allowed;
        self
    }

    /// Enable or disable the PDO.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The PDO number this configuration applies to.
    pub fn number(&self) -> u8 {
        self.number
    }
}

impl fmt::Debug for RpdoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpdoConfig")
            .field("number", &self.number)
            .field("entries", &self.entries)
            .field("frequency", &self.frequency)
            .field("trans_type", &self.trans_type)
            .field("rtr_allowed", &self.rtr_allowed)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
