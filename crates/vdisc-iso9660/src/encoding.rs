//! Both-endian integers.
//!
//! ISO 9660 records many numeric fields twice: little-endian, then
//! big-endian. Decoders insist the halves agree.

use crate::error::{IsoError, IsoResult};

pub fn put_u16_both(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn put_u32_both(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn u16_both(b: &[u8]) -> IsoResult<u16> {
    let b: &[u8; 4] = b
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| IsoError::format("truncated both-endian u16"))?;
    let le = u16::from_le_bytes([b[0], b[1]]);
    let be = u16::from_be_bytes([b[2], b[3]]);
    if le != be {
        return Err(IsoError::format(format!(
            "both-endian u16 halves disagree: {le} != {be}"
        )));
    }
    Ok(le)
}

pub fn u32_both(b: &[u8]) -> IsoResult<u32> {
    let b: &[u8; 8] = b
        .get(..8)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| IsoError::format("truncated both-endian u32"))?;
    let le = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let be = u32::from_be_bytes([b[4], b[5], b[6], b[7]]);
    if le != be {
        return Err(IsoError::format(format!(
            "both-endian u32 halves disagree: {le} != {be}"
        )));
    }
    Ok(le)
}

pub(crate) fn u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

pub(crate) fn u32_be(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout() {
        let mut out = Vec::new();
        put_u32_both(&mut out, 0x0102_0304);
        assert_eq!(out, [4, 3, 2, 1, 1, 2, 3, 4]);
        assert_eq!(u32_both(&out).unwrap(), 0x0102_0304);

        let mut out = Vec::new();
        put_u16_both(&mut out, 2048);
        assert_eq!(out, [0x00, 0x08, 0x08, 0x00]);
        assert_eq!(u16_both(&out).unwrap(), 2048);
    }

    #[test]
    fn disagreement_is_format_mismatch() {
        assert!(matches!(
            u32_both(&[1, 0, 0, 0, 0, 0, 0, 2]),
            Err(IsoError::FormatMismatch(_))
        ));
        assert!(matches!(u16_both(&[1, 0, 0]), Err(IsoError::FormatMismatch(_))));
    }
}
