//! One axis of a CiA-402 drive: variable access, PDO lifecycle, state
//! machine and the motion operations built on top of them.

use crate::{
    codec,
    error::{Error, bounded_name},
    lookup::RenameTable,
    node::{NmtState, Node, ObjectId, Slot, SubIndex, TxPdo, Value},
    pdo::{RpdoConfig, TpdoConfig},
    profile::{ModeTable, Profile},
    state::{self, ControlWord, State, StatusWord},
    streamer::Streamer,
};
use std::{
    collections::HashMap,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

/// Live mirror of TPDO-bound entries, keyed by slot. Written by the
/// transport's dispatcher thread, read by everyone else.
type Mirror = Arc<spin::RwLock<HashMap<Slot, Option<Value>>>>;

/// Timeouts governing commanded state transitions.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// How long a commanded state may take to show up in the statusword
    /// before [`Error::TransitionTimeout`] is raised.
    ///
    /// Defaults to 500 ms.
    pub state_transition: Duration,

    /// Statusword polling interval while waiting for a transition.
    ///
    /// Defaults to 1 ms.
    pub state_poll: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            state_transition: Duration::from_millis(500),
            state_poll: Duration::from_millis(1),
        }
    }
}

/// Configuration passed to [`Motor::new`].
#[derive(Debug, Clone, Default)]
pub struct MotorConfig {
    /// Per-axis renaming of logical names to device display names.
    pub rename: RenameTable,
    /// Operating-mode codes and the object they are programmed through.
    pub modes: ModeTable,
    /// State machine timeouts.
    pub timeouts: Timeouts,
}

/// Slots the motor touches on every state machine operation, resolved once
/// at construction so the hot path never goes through the rename table.
#[derive(Debug, Copy, Clone)]
struct Interned {
    controlword: Slot,
    statusword: Slot,
    operating_mode: Slot,
}

/// One axis of a CiA-402 drive reached through a CANopen [`Node`].
///
/// A motor borrows its node; several motors may share one node (one per
/// axis of a multi-axis board), distinguished purely by their rename
/// tables. The node must outlive the motors, and a motor never tears the
/// transport itself down.
///
/// Call [`Motor::shutdown`] before dropping: it walks the drive to SWITCH
/// ON DISABLED, disables every configured TPDO and joins every streamer
/// thread.
pub struct Motor<'node, N: Node + ?Sized> {
    node: &'node N,
    rename: RenameTable,
    modes: ModeTable,
    timeouts: Timeouts,
    interned: Interned,
    tpdos: HashMap<u8, Box<dyn TxPdo>>,
    streamers: HashMap<u8, Streamer>,
    mirror: Mirror,
}

impl<'node, N: Node + ?Sized> Motor<'node, N> {
    /// Bind a motor to a node.
    ///
    /// The node is expected to be in NMT PRE-OPERATIONAL, fresh from
    /// transport setup. The `controlword`, `statusword` and operating-mode
    /// objects are resolved here, once; a dictionary that knows none of
    /// these names (through the rename table or directly) is not a CiA-402
    /// axis and is rejected with [`Error::UnknownVariable`].
    pub fn new(node: &'node N, config: MotorConfig) -> Result<Self, Error> {
        let MotorConfig {
            rename,
            modes,
            timeouts,
        } = config;

        let interned = Interned {
            controlword: rename.resolve(node, &"controlword".into(), &SubIndex::Zero)?,
            statusword: rename.resolve(node, &"statusword".into(), &SubIndex::Zero)?,
            operating_mode: rename.resolve(node, modes.object(), &SubIndex::Zero)?,
        };

        log::debug!(
            "motor bound: controlword {}, statusword {}, mode {}",
            interned.controlword,
            interned.statusword,
            interned.operating_mode
        );

        Ok(Self {
            node,
            rename,
            modes,
            timeouts,
            interned,
            tpdos: HashMap::new(),
            streamers: HashMap::new(),
            mirror: Arc::new(spin::RwLock::new(HashMap::new())),
        })
    }

    /// Bind with an empty rename table and default mode codes.
    pub fn with_defaults(node: &'node N) -> Result<Self, Error> {
        Self::new(node, MotorConfig::default())
    }

    // --- Variable access ---

    /// Resolve a name or index to its canonical slot.
    pub fn resolve(
        &self,
        object: impl Into<ObjectId>,
        subindex: impl Into<SubIndex>,
    ) -> Result<Slot, Error> {
        self.rename
            .resolve(self.node, &object.into(), &subindex.into())
    }

    /// Read a variable (subindex 0), preferring the TPDO mirror.
    pub fn get(&self, object: impl Into<ObjectId>) -> Result<Value, Error> {
        self.get_with(object, SubIndex::Zero, false)
    }

    /// Read a variable.
    ///
    /// When the slot is bound to an enabled TPDO and a frame has arrived,
    /// the mirrored payload is returned without touching the bus;
    /// `force_sdo` bypasses the mirror for reads that must not race
    /// in-flight frames.
    pub fn get_with(
        &self,
        object: impl Into<ObjectId>,
        subindex: impl Into<SubIndex>,
        force_sdo: bool,
    ) -> Result<Value, Error> {
        let slot = self.resolve(object, subindex)?;

        self.read_slot(slot, force_sdo)
    }

    /// Write a variable (subindex 0) over SDO.
    pub fn set(&self, object: impl Into<ObjectId>, value: &Value) -> Result<(), Error> {
        self.set_with(object, SubIndex::Zero, value)
    }

    /// Write a variable over SDO.
    ///
    /// Writes always go through SDO; feeding an RPDO is the streamer's
    /// job. The payload must already have the exact width the dictionary
    /// entry expects (see [`codec`]).
    pub fn set_with(
        &self,
        object: impl Into<ObjectId>,
        subindex: impl Into<SubIndex>,
        value: &Value,
    ) -> Result<(), Error> {
        let slot = self.resolve(object, subindex)?;

        Ok(self.node.download(slot, value.as_slice())?)
    }

    fn read_slot(&self, slot: Slot, force_sdo: bool) -> Result<Value, Error> {
        if !force_sdo {
            if let Some(Some(value)) = self.mirror.read().get(&slot) {
                return Ok(value.clone());
            }
        }

        Ok(self.node.upload(slot)?)
    }

    // --- PDO lifecycle ---

    /// Configure transmit PDOs and register their entries in the live
    /// mirror.
    ///
    /// The node is dropped to PRE-OPERATIONAL for the whole
    /// clear-configure-save sequence (devices may reject parameter writes
    /// otherwise) and raised to OPERATIONAL afterwards.
    pub fn set_tpdos(
        &mut self,
        configs: impl IntoIterator<Item = TpdoConfig>,
    ) -> Result<(), Error> {
        self.node.set_nmt_state(NmtState::PreOperational)?;

        for config in configs {
            let mut pdo = self.node.tpdo(config.number)?;

            pdo.clear()?;

            for entry in &config.entries {
                let slot = self.rename.resolve(self.node, &entry.object, &entry.subindex)?;

                pdo.add_entry(slot)?;

                if config.enabled {
                    self.mirror.write().insert(slot, None);
                }
            }

            pdo.set_transmission_type(config.trans_type);
            pdo.set_event_timer(config.event_timer);
            pdo.set_rtr_allowed(config.rtr_allowed);
            pdo.set_enabled(config.enabled);
            pdo.save()?;

            let mirror = Arc::clone(&self.mirror);

            pdo.set_callback(Box::new(move |entries| {
                let mut mirror = mirror.write();

                for entry in entries {
                    mirror.insert(entry.slot, Some(entry.value.clone()));
                }
            }));

            log::debug!(
                "TPDO {} configured, {} entries, enabled: {}",
                config.number,
                config.entries.len(),
                config.enabled
            );

            self.tpdos.insert(config.number, pdo);
        }

        Ok(self.node.set_nmt_state(NmtState::Operational)?)
    }

    /// Configure receive PDOs and create (but do not start) their
    /// streamers.
    pub fn set_rpdos(
        &mut self,
        configs: impl IntoIterator<Item = RpdoConfig>,
    ) -> Result<(), Error> {
        self.node.set_nmt_state(NmtState::PreOperational)?;

        for config in configs {
            let mut pdo = self.node.rpdo(config.number)?;

            pdo.clear()?;

            for entry in &config.entries {
                let slot = self.rename.resolve(self.node, &entry.object, &entry.subindex)?;

                pdo.add_entry(slot)?;
            }

            if let Some(trans_type) = config.trans_type {
                pdo.set_transmission_type(trans_type);
            }

            pdo.set_rtr_allowed(config.rtr_allowed);
            pdo.set_enabled(config.enabled);
            pdo.save()?;

            log::debug!(
                "RPDO {} configured, {} entries at {} Hz",
                config.number,
                config.entries.len(),
                config.frequency
            );

            self.streamers.insert(
                config.number,
                Streamer::new(config.number, pdo, config.source, config.frequency),
            );
        }

        Ok(self.node.set_nmt_state(NmtState::Operational)?)
    }

    /// Start the streamer feeding RPDO `number`.
    pub fn start_rpdo(&mut self, number: u8) {
        match self.streamers.get_mut(&number) {
            Some(streamer) => streamer.start(),
            None => log::warn!("no streamer configured for RPDO {}", number),
        }
    }

    /// Stop the streamer feeding RPDO `number`, joining its thread.
    pub fn stop_rpdo(&mut self, number: u8) {
        if let Some(streamer) = self.streamers.get_mut(&number) {
            streamer.stop();
        }
    }

    /// Whether RPDO `number`'s streamer is currently running.
    pub fn rpdo_running(&self, number: u8) -> bool {
        self.streamers
            .get(&number)
            .is_some_and(|streamer| streamer.is_running())
    }

    /// Disable a configured TPDO and persist the disabled parameters.
    ///
    /// Mirror cells fed by this PDO are left in place; readers see the
    /// last received payload until the slot is re-bound or read over SDO.
    pub fn clear_tpdo(&mut self, number: u8) -> Result<(), Error> {
        let Some(pdo) = self.tpdos.get_mut(&number) else {
            log::warn!("no TPDO {} configured", number);
            return Ok(());
        };

        pdo.clear()?;
        pdo.set_enabled(false);

        Ok(pdo.save()?)
    }

    /// Stop RPDO `number`'s streamer and disable the PDO on the device.
    pub fn clear_rpdo(&mut self, number: u8) -> Result<(), Error> {
        let Some(streamer) = self.streamers.get_mut(&number) else {
            log::warn!("no streamer configured for RPDO {}", number);
            return Ok(());
        };

        streamer.stop();

        let pdo = streamer.pdo();
        let mut pdo = pdo.lock();

        pdo.clear()?;
        pdo.set_enabled(false);

        Ok(pdo.save()?)
    }

    // --- CiA-402 state machine ---

    /// The symbolic state decoded from a fresh SDO read of the statusword.
    ///
    /// Always reads over SDO: mirrored statuswords may lag behind a
    /// transition that is in flight.
    pub fn current_state(&self) -> Result<State, Error> {
        let sw = self.read_slot(self.interned.statusword, true)?;

        Ok(State::from_statusword(sw.as_unsigned() as u16))
    }

    /// The raw statusword, mirror allowed.
    pub fn statusword(&self) -> Result<StatusWord, Error> {
        let sw = self.read_slot(self.interned.statusword, false)?;

        Ok(StatusWord::from_bits_retain(sw.as_unsigned() as u16))
    }

    fn write_controlword(&self, cw: ControlWord) -> Result<(), Error> {
        log::trace!("controlword <- {:#06x}", cw.bits());

        self.node
            .download(self.interned.controlword, codec::u16(cw.bits().into())?.as_slice())?;

        Ok(())
    }

    /// Command a single state transition and wait for the statusword to
    /// reflect it.
    ///
    /// Exactly one legal CiA-402 edge is taken; composing multi-step walks
    /// is [`Motor::to_operational`]/[`Motor::to_switch_on_disabled`]'s
    /// job. Targets the host cannot command (NOT READY TO SWITCH ON, FAULT
    /// REACTION ACTIVE, FAULT) are rejected.
    pub fn request_state(&self, target: State) -> Result<(), Error> {
        let from = self.current_state()?;

        if from == target {
            return Ok(());
        }

        if matches!(
            target,
            State::NotReadyToSwitchOn | State::FaultReactionActive | State::Fault | State::Unknown
        ) {
            return Err(Error::IllegalTransition { from, to: target });
        }

        let cw = state::transition(from, target)
            .ok_or(Error::IllegalTransition { from, to: target })?;

        log::debug!("{} -> {}, controlword {:#06x}", from, target, cw.bits());

        self.write_controlword(cw)?;

        // One deadline for the whole wait, taken before the first poll.
        let deadline = Instant::now() + self.timeouts.state_transition;

        loop {
            if self.current_state()? == target {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::TransitionTimeout {
                    target,
                    timeout: self.timeouts.state_transition,
                });
            }

            thread::sleep(self.timeouts.state_poll);
        }
    }

    /// Walk the drive to OPERATION ENABLED from wherever it currently is,
    /// including out of FAULT.
    pub fn to_operational(&self) -> Result<(), Error> {
        let from = self.current_state()?;

        let path = state::path_to_operation_enabled(from).ok_or(Error::IllegalTransition {
            from,
            to: State::OperationEnabled,
        })?;

        for step in path {
            self.request_state(*step)?;
        }

        Ok(())
    }

    /// Walk the drive back to SWITCH ON DISABLED, dropping power stages in
    /// order.
    pub fn to_switch_on_disabled(&self) -> Result<(), Error> {
        let from = self.current_state()?;

        let path = state::path_to_switch_on_disabled(from).ok_or(Error::IllegalTransition {
            from,
            to: State::SwitchOnDisabled,
        })?;

        for step in path {
            self.request_state(*step)?;
        }

        Ok(())
    }

    /// Acknowledge a fault: FAULT -> SWITCH ON DISABLED.
    pub fn recover_from_fault(&self) -> Result<(), Error> {
        self.request_state(State::SwitchOnDisabled)
    }

    /// Command a quick stop.
    pub fn quick_stop(&self) -> Result<(), Error> {
        self.request_state(State::QuickStopActive)
    }

    /// Whether the drive reports FAULT.
    pub fn is_faulted(&self) -> Result<bool, Error> {
        Ok(self.current_state()? == State::Fault)
    }

    /// Statusword bit 10: the last commanded target has been reached.
    pub fn target_reached(&self) -> Result<bool, Error> {
        Ok(self.statusword()?.contains(StatusWord::TARGET_REACHED))
    }

    /// Statusword bit 14: set-point acknowledge on drives that report it
    /// there (manufacturer specific); reads as "axis is executing a move"
    /// on the stepper modules this crate grew up on.
    pub fn setpoint_acknowledged(&self) -> Result<bool, Error> {
        Ok(self.statusword()?.contains(StatusWord::MAN_SPECIFIC_1))
    }

    /// Statusword bit 2: voltage applied, torque present.
    pub fn torque_enabled(&self) -> Result<bool, Error> {
        Ok(self.statusword()?.contains(StatusWord::OP_ENABLED))
    }

    // --- Operating modes ---

    /// The mode code currently programmed into the drive.
    pub fn operating_mode_code(&self) -> Result<i8, Error> {
        let value = self.read_slot(self.interned.operating_mode, true)?;

        Ok(value.as_signed() as i8)
    }

    /// Select an operating-mode profile by mnemonic.
    ///
    /// Mode changes are forbidden while power is enabled, so when the
    /// programmed code differs the drive is first walked down to SWITCH ON
    /// DISABLED.
    pub fn set_operating_mode(&self, profile: &str) -> Result<(), Error> {
        let code = self.modes.code(profile).ok_or(Error::IllegalMode {
            profile: bounded_name(profile),
        })?;

        if self.operating_mode_code()? == code {
            return Ok(());
        }

        self.to_switch_on_disabled()?;

        log::debug!("operating mode <- {} ({})", profile, code);

        self.node
            .download(self.interned.operating_mode, codec::i8(code.into())?.as_slice())?;

        Ok(())
    }

    // --- Motion operations ---

    /// Run a point-to-point move.
    ///
    /// Walks to SWITCH ON DISABLED, programs the profile, walks to
    /// OPERATION ENABLED, writes the target and pulses the new-set-point
    /// bit. Returns as soon as the move is commanded; completion shows up
    /// in [`Motor::target_reached`] / [`Motor::setpoint_acknowledged`].
    pub fn move_to_target(&mut self, request: MoveRequest) -> Result<(), Error> {
        self.to_switch_on_disabled()?;
        self.set_operating_mode(&request.profile)?;
        self.to_operational()?;

        let slot = self.resolve(request.target.clone(), SubIndex::Zero)?;

        self.node
            .download(slot, codec::i32(request.value)?.as_slice())?;

        let mut cw = ControlWord::STATE_ENABLE_OP | ControlWord::NEW_SETPOINT;

        if request.relative {
            cw |= ControlWord::RELATIVE;
        }

        self.write_controlword(cw)?;
        self.write_controlword(ControlWord::STATE_ENABLE_OP)
    }

    /// Stream a trajectory through an RPDO.
    ///
    /// Installs the RPDO, programs the (cyclic) profile, enables power and
    /// starts the streamer. Every sample the source yields becomes one
    /// set-point on the wire.
    pub fn follow_trajectory(&mut self, config: RpdoConfig, profile: &str) -> Result<(), Error> {
        let number = config.number();

        self.to_switch_on_disabled()?;
        self.set_rpdos([config])?;
        self.set_operating_mode(profile)?;
        self.to_operational()?;
        self.start_rpdo(number);

        Ok(())
    }

    /// Start a homing cycle.
    ///
    /// `fast_speed` is the switch search speed, `slow_speed` the zero
    /// search speed (sub-entries 1 and 2 of the homing-speeds record). The
    /// start bit is raised and left asserted; dropping it mid-cycle aborts
    /// homing on common drives, so the falling edge is the caller's call.
    pub fn home(
        &mut self,
        method: i8,
        fast_speed: u32,
        slow_speed: u32,
        acceleration: u32,
    ) -> Result<(), Error> {
        self.to_switch_on_disabled()?;
        self.set_operating_mode("hm")?;
        self.to_operational()?;

        self.set_with("homing_method", SubIndex::Zero, &codec::i8(method.into())?)?;
        self.set_with("homing_speeds", 1, &codec::u32(fast_speed.into())?)?;
        self.set_with("homing_speeds", 2, &codec::u32(slow_speed.into())?)?;
        self.set_with("homing_acceleration", SubIndex::Zero, &codec::u32(acceleration.into())?)?;

        self.write_controlword(ControlWord::STATE_ENABLE_OP | ControlWord::NEW_SETPOINT)
    }

    /// Walk to SWITCH ON DISABLED, disable every configured TPDO and stop
    /// every streamer (joining its thread).
    ///
    /// After this returns no thread owned by this motor is running. The
    /// transport itself is untouched.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        self.to_switch_on_disabled()?;

        let tpdos: Vec<u8> = self.tpdos.keys().copied().collect();

        for number in tpdos {
            self.clear_tpdo(number)?;
        }

        let rpdos: Vec<u8> = self.streamers.keys().copied().collect();

        for number in rpdos {
            self.clear_rpdo(number)?;
        }

        Ok(())
    }

    // --- Profile tuning ---

    /// Velocity attained at the end of the acceleration ramp of a profiled
    /// move.
    pub fn set_profile_velocity(&self, velocity: u32) -> Result<(), Error> {
        self.set("profile_velocity", &codec::u32(velocity.into())?)
    }

    /// Acceleration used on the up ramp of a profiled move.
    pub fn set_profile_acceleration(&self, acceleration: u32) -> Result<(), Error> {
        self.set("profile_acceleration", &codec::u32(acceleration.into())?)
    }

    /// Deceleration used on the down ramp of a profiled move.
    pub fn set_profile_deceleration(&self, deceleration: u32) -> Result<(), Error> {
        self.set("profile_deceleration", &codec::u32(deceleration.into())?)
    }

    /// Deceleration applied on quick stop.
    pub fn set_quick_stop_deceleration(&self, deceleration: u32) -> Result<(), Error> {
        self.set("quick_stop_deceleration", &codec::u32(deceleration.into())?)
    }

    /// Symmetric window around the target within which the position counts
    /// as reached.
    pub fn set_position_window(&self, window: u32) -> Result<(), Error> {
        self.set("position_window", &codec::u32(window.into())?)
    }

    /// Minimum time inside the position window before "target reached" is
    /// reported, in milliseconds.
    pub fn set_position_window_time(&self, milliseconds: u16) -> Result<(), Error> {
        self.set("position_window_time", &codec::u16(milliseconds.into())?)
    }

    /// Position limits relative to the application's reference point
    /// (sub-entries 1 and 2).
    pub fn set_software_position_limit(&self, min: i32, max: i32) -> Result<(), Error> {
        self.set_with("software_position_limit", 1, &codec::i32(min.into())?)?;
        self.set_with("software_position_limit", 2, &codec::i32(max.into())?)
    }

    /// Interpolation period for cyclic synchronous modes:
    /// `base * 10^exponent` seconds (sub-entries 1 and 2).
    pub fn set_interpolation_time(&self, base: u8, exponent: i8) -> Result<(), Error> {
        self.set_with("interpolation_time_period", 1, &codec::u8(base.into())?)?;
        self.set_with("interpolation_time_period", 2, &codec::i8(exponent.into())?)
    }

    /// Current position in user units.
    pub fn actual_position(&self) -> Result<i64, Error> {
        Ok(self.get("position_actual_value")?.as_signed())
    }

    /// Current velocity in user units.
    pub fn actual_velocity(&self) -> Result<i64, Error> {
        Ok(self.get("velocity_actual_value")?.as_signed())
    }

    /// Offset between the home position and machine zero.
    pub fn home_offset(&self) -> Result<i64, Error> {
        Ok(self.get("home_offset")?.as_signed())
    }

    /// Microsteps per full step, decoded from the drive's log2 encoding.
    pub fn microstep_resolution(&self) -> Result<u32, Error> {
        let log2 = self.get("microstep_resolution")?.as_unsigned();

        Ok(1u32 << (log2 as u32).min(31))
    }

    /// Program the microstep resolution. The drive stores the exponent, so
    /// `microsteps` must be a power of two.
    pub fn set_microstep_resolution(&self, microsteps: u32) -> Result<(), Error> {
        if !microsteps.is_power_of_two() {
            return Err(Error::Range {
                value: microsteps.into(),
                width: 1,
                signed: false,
            });
        }

        self.set(
            "microstep_resolution",
            &codec::u8(microsteps.trailing_zeros().into())?,
        )
    }
}

/// A point-to-point move request for [`Motor::move_to_target`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRequest {
    value: i64,
    target: ObjectId,
    profile: String,
    relative: bool,
}

impl MoveRequest {
    /// Absolute move to `value` in profile-position mode.
    pub fn absolute(value: i64) -> Self {
        Self {
            value,
            target: "target_position".into(),
            profile: "pp".into(),
            relative: false,
        }
    }

    /// Relative move by `value` in profile-position mode.
    pub fn relative(value: i64) -> Self {
        Self {
            relative: true,
            ..Self::absolute(value)
        }
    }

    /// Continuous rotation at `value` in profile-velocity mode.
    pub fn velocity(value: i64) -> Self {
        Self {
            value,
            target: "target_velocity".into(),
            profile: "pv".into(),
            relative: false,
        }
    }

    /// Override the profile mnemonic. The target object follows the
    /// profile's natural set-point when it has one.
    pub fn profile(mut self, mnemonic: &str) -> Self {
        if let Some(object) = Profile::from_mnemonic(mnemonic).and_then(Profile::command_object) {
            self.target = object.into();
        }

        self.profile = mnemonic.to_owned();
        self
    }

    /// Override the object the set-point is written to.
    pub fn target(mut self, object: impl Into<ObjectId>) -> Self {
        self.target = object.into();
        self
    }
}
