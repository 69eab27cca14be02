mod byte_cursor;
pub(crate) mod bytes;
mod int_array;
pub(crate) mod utf16;

pub use self::byte_cursor::{ByteCursor, Endian};
pub use self::int_array::IndexedIntArray;
