//! CiA-402 drive control over CANopen.
//!
//! This crate drives the axes of servo and stepper controllers that speak
//! the CiA-402 device profile: it walks the drive state machine by pairing
//! statusword reads with controlword writes, binds transmit PDOs into a
//! live local mirror, streams set-points through receive PDOs at a fixed
//! rate, and resolves symbolic variable names through a per-axis rename
//! table so the same application code runs against any axis of a
//! multi-axis board.
//!
//! The CANopen transport itself (frame I/O, SDO transfer, dictionary
//! parsing from an EDS file) is not in here; bind any transport by
//! implementing the traits in [`node`].
//!
//! ```no_run
//! use axis402::{Motor, MotorConfig, MoveRequest, RenameTable};
//!
//! # use axis402::{error::TransportError, node::{NmtState, ObjectId, RxPdo, Slot, SubIndex, TxPdo, Value}};
//! # struct Stub;
//! # impl axis402::Node for Stub {
//! #     fn find(&self, _: &ObjectId, _: &SubIndex) -> Option<Slot> { unimplemented!() }
//! #     fn upload(&self, _: Slot) -> Result<Value, TransportError> { unimplemented!() }
//! #     fn download(&self, _: Slot, _: &[u8]) -> Result<(), TransportError> { unimplemented!() }
//! #     fn tpdo(&self, _: u8) -> Result<Box<dyn TxPdo>, TransportError> { unimplemented!() }
//! #     fn rpdo(&self, _: u8) -> Result<Box<dyn RxPdo>, TransportError> { unimplemented!() }
//! #     fn set_nmt_state(&self, _: NmtState) -> Result<(), TransportError> { unimplemented!() }
//! # }
//! # fn connect() -> Stub { Stub }
//! # fn main() -> Result<(), axis402::Error> {
//! let node = connect();
//!
//! let config = MotorConfig {
//!     rename: RenameTable::from_iter([
//!         ("controlword", "Controlword 1"),
//!         ("statusword", "Statusword 1"),
//!         ("operating_mode", "Modes of Operation 1"),
//!         ("target_position", "Target Position 1"),
//!     ]),
//!     ..MotorConfig::default()
//! };
//!
//! let mut motor = Motor::new(&node, config)?;
//!
//! motor.set_profile_velocity(51_200)?;
//! motor.move_to_target(MoveRequest::absolute(1_024_000))?;
//!
//! while !motor.target_reached()? {
//!     std::thread::sleep(std::time::Duration::from_millis(10));
//! }
//!
//! motor.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
mod lookup;
mod motor;
pub mod node;
pub mod pdo;
mod profile;
pub mod state;
mod streamer;

pub use error::Error;
pub use lookup::{Alias, RenameTable};
pub use motor::{Motor, MotorConfig, MoveRequest, Timeouts};
pub use node::{FrameEntry, NmtState, Node, ObjectId, Slot, SubIndex, Value};
pub use pdo::{EntrySpec, RpdoConfig, TpdoConfig};
pub use profile::{ModeTable, Profile};
pub use state::{ControlWord, State, StatusWord};
