//! Typed values (`Res_value`) as stored in tables and binary XML attributes.

use std::fmt;

use serde::Serialize;

use crate::err::Result;
use crate::string_pool::StringPool;
use crate::utils::ByteCursor;

/// The `dataType` byte of a [`ResValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DataType(pub u8);

impl DataType {
    pub const NULL: DataType = DataType(0x00);
    pub const REFERENCE: DataType = DataType(0x01);
    pub const ATTRIBUTE: DataType = DataType(0x02);
    pub const STRING: DataType = DataType(0x03);
    pub const FLOAT: DataType = DataType(0x04);
    pub const DIMENSION: DataType = DataType(0x05);
    pub const FRACTION: DataType = DataType(0x06);
    pub const INT_DEC: DataType = DataType(0x10);
    pub const INT_HEX: DataType = DataType(0x11);
    pub const INT_BOOLEAN: DataType = DataType(0x12);
    pub const INT_COLOR_ARGB8: DataType = DataType(0x1c);
    pub const INT_COLOR_RGB8: DataType = DataType(0x1d);
    pub const INT_COLOR_ARGB4: DataType = DataType(0x1e);
    pub const INT_COLOR_RGB4: DataType = DataType(0x1f);

    pub const FIRST_INT: DataType = DataType::INT_DEC;
    pub const FIRST_COLOR_INT: DataType = DataType::INT_COLOR_ARGB8;
    pub const LAST_COLOR_INT: DataType = DataType::INT_COLOR_RGB4;
    pub const LAST_INT: DataType = DataType(0x1f);

    pub fn is_int(self) -> bool {
        (Self::FIRST_INT..=Self::LAST_INT).contains(&self)
    }

    pub fn is_color(self) -> bool {
        (Self::FIRST_COLOR_INT..=Self::LAST_COLOR_INT).contains(&self)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            DataType::NULL => "null",
            DataType::REFERENCE => "reference",
            DataType::ATTRIBUTE => "attribute",
            DataType::STRING => "string",
            DataType::FLOAT => "float",
            DataType::DIMENSION => "dimension",
            DataType::FRACTION => "fraction",
            DataType::INT_DEC => "int",
            DataType::INT_HEX => "hex",
            DataType::INT_BOOLEAN => "boolean",
            t if t.is_color() => "color",
            DataType(other) => return write!(f, "0x{other:02x}"),
        };
        f.write_str(name)
    }
}

const COMPLEX_UNIT_MASK: u32 = 0xf;
const COMPLEX_RADIX_SHIFT: u32 = 4;
const COMPLEX_RADIX_MASK: u32 = 0x3;
const COMPLEX_MANTISSA_SHIFT: u32 = 8;
const COMPLEX_MANTISSA_MASK: u32 = 0x00ff_ffff;

const MANTISSA_MULT: f32 = 1.0 / (1 << COMPLEX_MANTISSA_SHIFT) as f32;
const RADIX_MULTS: [f32; 4] = [
    MANTISSA_MULT,
    MANTISSA_MULT / (1 << 7) as f32,
    MANTISSA_MULT / (1 << 15) as f32,
    MANTISSA_MULT / (1 << 23) as f32,
];

const DIMENSION_UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
const FRACTION_UNITS: [&str; 2] = ["%", "%p"];

/// `size(u16) res0(u8) dataType(u8) data(u32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ResValue {
    pub size: u16,
    pub res0: u8,
    pub data_type: DataType,
    pub data: u32,
}

impl ResValue {
    pub const SIZE: usize = 8;

    pub fn new(data_type: DataType, data: u32) -> Self {
        ResValue {
            size: Self::SIZE as u16,
            res0: 0,
            data_type,
            data,
        }
    }

    pub fn null() -> Self {
        ResValue::new(DataType::NULL, 0)
    }

    pub fn reference(id: u32) -> Self {
        ResValue::new(DataType::REFERENCE, id)
    }

    pub fn read(cursor: &mut ByteCursor<'_>) -> Result<Self> {
        Ok(ResValue {
            size: cursor.u16_named("value size")?,
            res0: cursor.u8_named("value res0")?,
            data_type: DataType(cursor.u8_named("value type")?),
            data: cursor.u32_named("value data")?,
        })
    }

    pub fn is_null(&self) -> bool {
        self.data_type == DataType::NULL
    }

    /// A reference to another resource. `@null` (data 0) does not count.
    pub fn is_reference(&self) -> bool {
        self.data_type == DataType::REFERENCE && self.data != 0
    }

    pub fn is_attribute(&self) -> bool {
        self.data_type == DataType::ATTRIBUTE
    }

    /// Render the value as text, looking strings up in `pool`.
    ///
    /// Returns `None` for NULL values, for strings missing from the pool and for unknown types.
    pub fn coerce_to_string(&self, pool: Option<&StringPool>) -> Option<String> {
        let data = self.data;
        match self.data_type {
            DataType::NULL => None,
            DataType::REFERENCE => Some(format!("@{data}")),
            DataType::ATTRIBUTE => Some(format!("?{data}")),
            DataType::STRING => pool?.string_at(data as usize),
            DataType::FLOAT => Some(format_float(f32::from_bits(data))),
            DataType::DIMENSION => Some(format!(
                "{}{}",
                format_float(complex_to_float(data)),
                DIMENSION_UNITS
                    .get((data & COMPLEX_UNIT_MASK) as usize)
                    .copied()
                    .unwrap_or("")
            )),
            DataType::FRACTION => Some(format!(
                "{}{}",
                format_float(complex_to_float(data) * 100.0),
                FRACTION_UNITS
                    .get((data & COMPLEX_UNIT_MASK) as usize)
                    .copied()
                    .unwrap_or("")
            )),
            DataType::INT_HEX => Some(format!("0x{data:x}")),
            DataType::INT_BOOLEAN => Some(if data != 0 { "true" } else { "false" }.to_string()),
            t if t.is_color() => Some(format!("#{data:x}")),
            t if t.is_int() => Some((data as i32).to_string()),
            _ => None,
        }
    }
}

/// Decode the packed mantissa/radix format used by dimensions and fractions.
pub fn complex_to_float(complex: u32) -> f32 {
    let mantissa = (complex & (COMPLEX_MANTISSA_MASK << COMPLEX_MANTISSA_SHIFT)) as i32;
    mantissa as f32 * RADIX_MULTS[((complex >> COMPLEX_RADIX_SHIFT) & COMPLEX_RADIX_MASK) as usize]
}

fn format_float(v: f32) -> String {
    if v.is_finite() && v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}
