//! A simulated CiA-402 drive implementing the transport contract, used as
//! the far end of the bus for integration tests.
//!
//! The simulation covers two axes of a stepper board: standard profile
//! objects at their usual indices for axis 1, the same objects offset by
//! `0x800` for axis 2, reachable through `"<Display Name> 2"` dictionary
//! names. Controlword downloads drive the statusword like a real drive
//! acknowledging transitions, so multi-step walks can be exercised end to
//! end.

// Each test binary uses its own slice of the harness.
#![allow(dead_code)]

use axis402::{
    FrameEntry, NmtState, Node, ObjectId, Slot, SubIndex, Value,
    error::TransportError,
    node::{FrameCallback, RxPdo, TxPdo},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Instant,
};

/// Shared frame callback; the boxed one from the contract is wrapped so
/// the harness can invoke it without holding its own locks.
type SharedCallback = Arc<dyn Fn(&[FrameEntry]) + Send + Sync>;

#[derive(Default)]
pub struct TxState {
    pub entries: Vec<Slot>,
    pub trans_type: u8,
    pub event_timer: u16,
    pub rtr_allowed: bool,
    pub enabled: bool,
    pub saves: u32,
    callback: Option<SharedCallback>,
}

#[derive(Default)]
pub struct RxState {
    pub entries: Vec<Slot>,
    pub trans_type: u8,
    pub rtr_allowed: bool,
    pub enabled: bool,
    pub saves: u32,
    pub fail_transmit: bool,
    frame: Vec<Vec<u8>>,
    pub transmitted: Vec<(Vec<u8>, Instant)>,
}

#[derive(Default)]
struct SimState {
    storage: HashMap<Slot, Vec<u8>>,
    downloads: Vec<(Slot, Vec<u8>)>,
    nmt: Vec<NmtState>,
    tpdos: HashMap<u8, TxState>,
    rpdos: HashMap<u8, RxState>,
    fail_sdo: bool,
    freeze_status: bool,
}

struct SimInner {
    dict: HashMap<String, Slot>,
    widths: HashMap<(u16, u8), usize>,
    controlwords: HashSet<u16>,
    state: Mutex<SimState>,
}

/// A two-axis simulated drive.
pub struct SimDrive {
    inner: Arc<SimInner>,
}

const AXIS_OBJECTS: &[(&str, u16, u8, usize)] = &[
    // display name stem, index, subindex, width in bytes
    ("Controlword", 0x6040, 0, 2),
    ("Statusword", 0x6041, 0, 2),
    ("Modes of Operation", 0x6060, 0, 1),
    ("Position Actual Value", 0x6064, 0, 4),
    ("Position Window", 0x6067, 0, 4),
    ("Position Window Time", 0x6068, 0, 2),
    ("Velocity Actual Value", 0x606C, 0, 4),
    ("Target Position", 0x607A, 0, 4),
    ("Home Offset", 0x607C, 0, 4),
    ("Profile Velocity", 0x6081, 0, 4),
    ("Profile Acceleration", 0x6083, 0, 4),
    ("Profile Deceleration", 0x6084, 0, 4),
    ("Quick Stop Deceleration", 0x6085, 0, 4),
    ("Homing Method", 0x6098, 0, 1),
    ("Target Velocity", 0x60FF, 0, 4),
    ("Homing Acceleration", 0x609A, 0, 4),
];

const AXIS_RECORDS: &[(u16, u8, usize)] = &[
    (0x607D, 1, 4),
    (0x607D, 2, 4),
    (0x6099, 1, 4),
    (0x6099, 2, 4),
    (0x60C2, 1, 1),
    (0x60C2, 2, 1),
];

/// Logical names the object dictionary itself knows for axis 1, so tests
/// without a rename table still resolve.
const LOGICAL_NAMES: &[(&str, u16, u8)] = &[
    ("controlword", 0x6040, 0),
    ("statusword", 0x6041, 0),
    ("operating_mode", 0x6060, 0),
    ("position_actual_value", 0x6064, 0),
    ("position_window", 0x6067, 0),
    ("position_window_time", 0x6068, 0),
    ("velocity_actual_value", 0x606C, 0),
    ("target_position", 0x607A, 0),
    ("home_offset", 0x607C, 0),
    ("software_position_limit", 0x607D, 0),
    ("profile_velocity", 0x6081, 0),
    ("profile_acceleration", 0x6083, 0),
    ("profile_deceleration", 0x6084, 0),
    ("quick_stop_deceleration", 0x6085, 0),
    ("homing_method", 0x6098, 0),
    ("homing_speeds", 0x6099, 0),
    ("homing_acceleration", 0x609A, 0),
    ("interpolation_time_period", 0x60C2, 0),
    ("target_velocity", 0x60FF, 0),
    ("microstep_resolution", 0x2000, 0),
];

impl SimDrive {
    pub fn new() -> Self {
        let mut dict = HashMap::new();
        let mut widths = HashMap::new();
        let mut controlwords = HashSet::new();
        let mut state = SimState::default();

        for axis in 1u16..=2 {
            let offset = 0x800 * (axis - 1);

            for (stem, index, subindex, width) in AXIS_OBJECTS {
                let slot = Slot::new(index + offset, *subindex);

                dict.insert(format!("{stem} {axis}"), slot);
                widths.insert((slot.index, slot.subindex), *width);
            }

            for (index, subindex, width) in AXIS_RECORDS {
                widths.insert((index + offset, *subindex), *width);
            }

            let microstep = Slot::new(0x2000 + 0x200 * (axis - 1), 0);

            dict.insert(format!("Microstep Resolution {axis}"), microstep);
            widths.insert((microstep.index, 0), 1);

            controlwords.insert(0x6040 + offset);

            // Power-on state: SWITCH ON DISABLED.
            state
                .storage
                .insert(Slot::new(0x6041 + offset, 0), vec![0x40, 0x00]);
        }

        for (name, index, subindex) in LOGICAL_NAMES {
            dict.insert((*name).to_owned(), Slot::new(*index, *subindex));
        }

        Self {
            inner: Arc::new(SimInner {
                dict,
                widths,
                controlwords,
                state: Mutex::new(state),
            }),
        }
    }

    // --- Inspection ---

    /// Every payload downloaded to `slot`, in order.
    pub fn downloads_to(&self, slot: Slot) -> Vec<Vec<u8>> {
        self.inner
            .state
            .lock()
            .unwrap()
            .downloads
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Controlword values written to the given controlword index.
    pub fn controlword_writes(&self, index: u16) -> Vec<u16> {
        self.downloads_to(Slot::new(index, 0))
            .iter()
            .map(|data| u16::from_le_bytes([data[0], data[1]]))
            .collect()
    }

    pub fn nmt_log(&self) -> Vec<NmtState> {
        self.inner.state.lock().unwrap().nmt.clone()
    }

    pub fn raw(&self, slot: Slot) -> Option<Vec<u8>> {
        self.inner.state.lock().unwrap().storage.get(&slot).cloned()
    }

    pub fn set_raw(&self, slot: Slot, data: Vec<u8>) {
        self.inner.state.lock().unwrap().storage.insert(slot, data);
    }

    pub fn with_tpdo<R>(&self, number: u8, f: impl FnOnce(&TxState) -> R) -> R {
        f(&self.inner.state.lock().unwrap().tpdos[&number])
    }

    pub fn with_rpdo<R>(&self, number: u8, f: impl FnOnce(&RxState) -> R) -> R {
        f(&self.inner.state.lock().unwrap().rpdos[&number])
    }

    pub fn transmitted(&self, number: u8) -> Vec<(Vec<u8>, Instant)> {
        self.with_rpdo(number, |rpdo| rpdo.transmitted.clone())
    }

    // --- Fault and behavior injection ---

    pub fn set_statusword(&self, index: u16, value: u16) {
        self.set_raw(Slot::new(index, 0), value.to_le_bytes().to_vec());
    }

    pub fn set_fail_sdo(&self, fail: bool) {
        self.inner.state.lock().unwrap().fail_sdo = fail;
    }

    /// Stop acknowledging controlword commands, as a wedged drive would.
    pub fn set_freeze_status(&self, freeze: bool) {
        self.inner.state.lock().unwrap().freeze_status = freeze;
    }

    pub fn set_fail_transmit(&self, number: u8, fail: bool) {
        self.inner
            .state
            .lock()
            .unwrap()
            .rpdos
            .entry(number)
            .or_default()
            .fail_transmit = fail;
    }

    /// Deliver an inbound frame for TPDO `number`, as the transport's
    /// dispatcher thread would.
    pub fn push_frame(&self, number: u8, entries: &[FrameEntry]) {
        let callback = self
            .inner
            .state
            .lock()
            .unwrap()
            .tpdos
            .get(&number)
            .and_then(|tpdo| tpdo.callback.clone());

        if let Some(callback) = callback {
            callback(entries);
        }
    }
}

/// The drive's statusword reaction to a controlword, ignoring the
/// operation-mode-specific bits.
fn acknowledge(controlword: u16, current: u16) -> u16 {
    match controlword & 0x008F {
        0x0080 => 0x0040,
        0x0000 => 0x0040,
        0x0006 => 0x0021,
        0x0007 => 0x0023,
        0x000F => 0x0027,
        0x0002 => 0x0007,
        _ => current,
    }
}

impl Node for SimDrive {
    fn find(&self, object: &ObjectId, subindex: &SubIndex) -> Option<Slot> {
        let base = match object {
            ObjectId::Name(name) => *self.inner.dict.get(name)?,
            ObjectId::Index(index) => Slot::new(*index, 0),
        };

        let subindex = match subindex {
            SubIndex::Zero => base.subindex,
            SubIndex::Number(n) => *n,
            // Record fields by name are not modelled here.
            SubIndex::Name(_) => return None,
        };

        let slot = Slot::new(base.index, subindex);

        self.inner
            .widths
            .contains_key(&(slot.index, slot.subindex))
            .then_some(slot)
    }

    fn upload(&self, slot: Slot) -> Result<Value, TransportError> {
        let state = self.inner.state.lock().unwrap();

        if state.fail_sdo {
            return Err(TransportError::SdoUpload {
                index: slot.index,
                subindex: slot.subindex,
            });
        }

        let width = self
            .inner
            .widths
            .get(&(slot.index, slot.subindex))
            .ok_or(TransportError::SdoUpload {
                index: slot.index,
                subindex: slot.subindex,
            })?;

        let bytes = state
            .storage
            .get(&slot)
            .cloned()
            .unwrap_or_else(|| vec![0; *width]);

        Ok(Value::new(&bytes))
    }

    fn download(&self, slot: Slot, data: &[u8]) -> Result<(), TransportError> {
        let mut state = self.inner.state.lock().unwrap();

        let error = TransportError::SdoDownload {
            index: slot.index,
            subindex: slot.subindex,
        };

        if state.fail_sdo {
            return Err(error);
        }

        // Exact-width payloads only, like a real SDO server.
        let width = self
            .inner
            .widths
            .get(&(slot.index, slot.subindex))
            .ok_or(error.clone())?;

        if data.len() != *width {
            return Err(error);
        }

        state.downloads.push((slot, data.to_vec()));
        state.storage.insert(slot, data.to_vec());

        if self.inner.controlwords.contains(&slot.index) && !state.freeze_status {
            let statusword = Slot::new(slot.index + 1, 0);
            let controlword = u16::from_le_bytes([data[0], data[1]]);

            let current = state
                .storage
                .get(&statusword)
                .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
                .unwrap_or(0);

            let next = acknowledge(controlword, current);

            state
                .storage
                .insert(statusword, next.to_le_bytes().to_vec());
        }

        Ok(())
    }

    fn tpdo(&self, number: u8) -> Result<Box<dyn TxPdo>, TransportError> {
        self.inner
            .state
            .lock()
            .unwrap()
            .tpdos
            .entry(number)
            .or_default();

        Ok(Box::new(SimTxPdo {
            number,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn rpdo(&self, number: u8) -> Result<Box<dyn RxPdo>, TransportError> {
        self.inner
            .state
            .lock()
            .unwrap()
            .rpdos
            .entry(number)
            .or_default();

        Ok(Box::new(SimRxPdo {
            number,
            inner: Arc::clone(&self.inner),
        }))
    }

    fn set_nmt_state(&self, state: NmtState) -> Result<(), TransportError> {
        self.inner.state.lock().unwrap().nmt.push(state);

        Ok(())
    }
}

struct SimTxPdo {
    number: u8,
    inner: Arc<SimInner>,
}

impl SimTxPdo {
    fn with<R>(&self, f: impl FnOnce(&mut TxState) -> R) -> R {
        f(self
            .inner
            .state
            .lock()
            .unwrap()
            .tpdos
            .get_mut(&self.number)
            .expect("TPDO state exists for handed-out handles"))
    }
}

impl TxPdo for SimTxPdo {
    fn clear(&mut self) -> Result<(), TransportError> {
        self.with(|tpdo| tpdo.entries.clear());
        Ok(())
    }

    fn add_entry(&mut self, slot: Slot) -> Result<(), TransportError> {
        self.with(|tpdo| tpdo.entries.push(slot));
        Ok(())
    }

    fn set_transmission_type(&mut self, trans_type: u8) {
        self.with(|tpdo| tpdo.trans_type = trans_type);
    }

    fn set_event_timer(&mut self, milliseconds: u16) {
        self.with(|tpdo| tpdo.event_timer = milliseconds);
    }

    fn set_rtr_allowed(&mut self, allowed: bool) {
        self.with(|tpdo| tpdo.rtr_allowed = allowed);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.with(|tpdo| tpdo.enabled = enabled);
    }

    fn save(&mut self) -> Result<(), TransportError> {
        self.with(|tpdo| tpdo.saves += 1);
        Ok(())
    }

    fn set_callback(&mut self, callback: FrameCallback) {
        self.with(|tpdo| tpdo.callback = Some(Arc::from(callback)));
    }
}

struct SimRxPdo {
    number: u8,
    inner: Arc<SimInner>,
}

impl SimRxPdo {
    fn with<R>(&self, f: impl FnOnce(&mut RxState, &SimInner) -> R) -> R {
        let inner = &self.inner;

        f(
            inner
                .state
                .lock()
                .unwrap()
                .rpdos
                .get_mut(&self.number)
                .expect("RPDO state exists for handed-out handles"),
            inner,
        )
    }
}

impl RxPdo for SimRxPdo {
    fn clear(&mut self) -> Result<(), TransportError> {
        self.with(|rpdo, _| {
            rpdo.entries.clear();
            rpdo.frame.clear();
        });
        Ok(())
    }

    fn add_entry(&mut self, slot: Slot) -> Result<(), TransportError> {
        self.with(|rpdo, inner| {
            let width = inner
                .widths
                .get(&(slot.index, slot.subindex))
                .copied()
                .unwrap_or(0);

            rpdo.entries.push(slot);
            rpdo.frame.push(vec![0; width]);
        });
        Ok(())
    }

    fn set_transmission_type(&mut self, trans_type: u8) {
        self.with(|rpdo, _| rpdo.trans_type = trans_type);
    }

    fn set_rtr_allowed(&mut self, allowed: bool) {
        self.with(|rpdo, _| rpdo.rtr_allowed = allowed);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.with(|rpdo, _| rpdo.enabled = enabled);
    }

    fn save(&mut self) -> Result<(), TransportError> {
        self.with(|rpdo, _| rpdo.saves += 1);
        Ok(())
    }

    fn write(&mut self, entry: usize, value: i64) -> Result<(), TransportError> {
        let number = self.number;

        self.with(|rpdo, _| {
            let buffer = rpdo
                .frame
                .get_mut(entry)
                .ok_or(TransportError::Pdo { number })?;

            let width = buffer.len();

            buffer.copy_from_slice(&value.to_le_bytes()[..width]);

            Ok(())
        })
    }

    fn transmit(&mut self) -> Result<(), TransportError> {
        let number = self.number;

        self.with(|rpdo, _| {
            if rpdo.fail_transmit {
                return Err(TransportError::Pdo { number });
            }

            let payload: Vec<u8> = rpdo.frame.concat();

            rpdo.transmitted.push((payload, Instant::now()));

            Ok(())
        })
    }
}

/// Frame entry helper.
pub fn frame_entry(index: u16, subindex: u8, bytes: &[u8]) -> FrameEntry {
    FrameEntry {
        slot: Slot::new(index, subindex),
        value: Value::new(bytes),
    }
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
