//! Little-endian reads out of `&[u8]` at fixed offsets.
//!
//! All helpers return `None` when the read would leave the slice, so callers
//! map the failure onto their own [`Error`](crate::Error) variant.

pub(crate) fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Option<[u8; N]> {
    let end = offset.checked_add(N)?;
    buf.get(offset..end)?.try_into().ok()
}

pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(read_array::<2>(buf, offset)?))
}

pub(crate) fn read_u32_le(buf: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(read_array::<4>(buf, offset)?))
}

/// Round `pos` up to the next 4-byte boundary, measured from `origin`.
pub(crate) fn align4(origin: usize, pos: usize) -> usize {
    let rel = pos.saturating_sub(origin);
    origin.saturating_add(rel.saturating_add(3) & !3)
}

/// Collect the little-endian UTF-16 code units of `buf`.
///
/// A trailing odd byte is ignored; callers that care check the length first.
pub(crate) fn utf16_units(buf: &[u8]) -> Vec<u16> {
    buf.chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}
