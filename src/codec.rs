//! Exact-width little-endian integer codecs for SDO payloads.
//!
//! CANopen dictionary entries have a fixed binary width and an SDO download
//! of the wrong width is rejected by the device, so every write goes through
//! one of these six encoders. Each takes a plain `i64`, refuses values
//! outside the target range with [`Error::Range`] and yields a [`Value`]
//! holding exactly 1, 2 or 4 little-endian bytes. There is no rounding.

use crate::{error::Error, node::Value};

macro_rules! encoder {
    ($(#[$doc:meta])* $name:ident, $ty:ty) => {
        $(#[$doc])*
        pub fn $name(value: i64) -> Result<Value, Error> {
            let narrowed = <$ty>::try_from(value).map_err(|_| Error::Range {
                value,
                width: (<$ty>::BITS / 8) as u8,
                signed: <$ty>::MIN != 0,
            })?;

            Ok(Value::new(&narrowed.to_le_bytes()))
        }
    };
}

encoder!(
    /// Encode an 8 bit unsigned integer.
    u8, u8
);
encoder!(
    /// Encode an 8 bit signed integer.
    i8, i8
);
encoder!(
    /// Encode a 16 bit unsigned integer.
    u16, u16
);
encoder!(
    /// Encode a 16 bit signed integer.
    i16, i16
);
encoder!(
    /// Encode a 32 bit unsigned integer.
    u32, u32
);
encoder!(
    /// Encode a 32 bit signed integer.
    i32, i32
);
