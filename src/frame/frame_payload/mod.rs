mod decode;

pub use decode::*;

// Masks or unmasks a buffer with payload bytes. The offset is the offset of the buffer within the
// frames payload segment. Any multiple of 4 may be added to or subtracted from the offset without
// any effect on the result.
pub fn mask(mask: [u8; 4], mut offset: usize, buffer: &mut [u8]) {
    if mask != [0u8, 0u8, 0u8, 0u8] {
        for byte in buffer.iter_mut() {
            *byte ^= mask[offset & 3];
            offset = offset.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::frame::mask;

    #[test]
    fn mask_is_offset_aware() {
        let key = [1, 2, 3, 4];
        let mut whole = *b"abcdefgh";
        mask(key, 0, &mut whole);
        let mut split = *b"abcdefgh";
        mask(key, 0, &mut split[0..3]);
        mask(key, 3, &mut split[3..]);
        assert_eq!(whole, split);
        mask(key, 0, &mut whole);
        assert_eq!(&whole, b"abcdefgh");
    }
}
