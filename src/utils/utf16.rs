#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Utf16DecodeError {
    InvalidData,
}

/// Decode UTF-16 code units until the first NUL (0x0000), if present.
pub(crate) fn decode_utf16_units_z(units: &[u16]) -> Result<String, Utf16DecodeError> {
    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    decode_utf16_units(&units[..end])
}

/// Decode exactly `units`, embedded NULs included.
pub(crate) fn decode_utf16_units(units: &[u16]) -> Result<String, Utf16DecodeError> {
    // Fast path: pure ASCII converts without surrogate handling.
    if units.iter().all(|&c| c <= 0x7F) {
        return Ok(units.iter().map(|&c| char::from(c as u8)).collect());
    }

    String::from_utf16(units).map_err(|_| Utf16DecodeError::InvalidData)
}

/// Read `count` little-endian code units starting at `offset`.
pub(crate) fn read_utf16le_units(buf: &[u8], offset: usize, count: usize) -> Option<Vec<u16>> {
    let end = offset.checked_add(count.checked_mul(2)?)?;
    let bytes = buf.get(offset..end)?;
    Some(
        bytes
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decodes_ascii_and_surrogates() {
        let units: Vec<u16> = "héllo 🎉".encode_utf16().collect();
        assert_eq!(decode_utf16_units(&units).unwrap(), "héllo 🎉");
        assert_eq!(decode_utf16_units_z(&[0x61, 0, 0x62]).unwrap(), "a");
        assert_eq!(
            decode_utf16_units(&[0xd800]),
            Err(Utf16DecodeError::InvalidData)
        );
    }

    #[test]
    fn test_reads_units_with_bounds() {
        let buf = [0x41, 0x00, 0x42, 0x00];
        assert_eq!(read_utf16le_units(&buf, 0, 2), Some(vec![0x41, 0x42]));
        assert_eq!(read_utf16le_units(&buf, 2, 2), None);
    }
}
