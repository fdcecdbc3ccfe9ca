mod decode;

pub use decode::*;

use crate::frame::{Opcode, MAX_CONTROL_PAYLOAD};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHead {
    pub fin: bool,
    pub opcode: Opcode,
    pub mask: [u8; 4],
    pub payload_len: u64,
}

impl FrameHead {
    pub fn parse(buffer: &[u8]) -> Result<FrameHead, FrameHeadParseError> {
        if buffer.len() < 2 {
            return Err(FrameHeadParseError::Incomplete(2));
        }
        let (masked, extra_payload_len_bytes) = match buffer[1] {
            0..=125 => (false, 0usize),
            126 => (false, 2usize),
            127 => (false, 8usize),
            128..=253 => (true, 0usize),
            254 => (true, 2usize),
            255 => (true, 8usize),
        };
        let expected_buffer_len = 2 + extra_payload_len_bytes + (masked as usize) * 4;
        if buffer.len() < expected_buffer_len {
            return Err(FrameHeadParseError::Incomplete(expected_buffer_len));
        }
        let fin = match buffer[0] & 0xF0 {
            0x00 => false,
            0x80 => true,
            _ => return Err(FrameHeadParseError::RsvBit),
        };
        let opcode = match buffer[0] & 0x0F {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            n => return Err(FrameHeadParseError::InvalidOpcode(n)),
        };
        let mut payload_len = [0u8; 8];
        match extra_payload_len_bytes {
            0 => payload_len[7] = buffer[1] & 127,
            2 => payload_len[6..8].copy_from_slice(&buffer[2..4]),
            8 => payload_len.copy_from_slice(&buffer[2..10]),
            _ => unreachable!(),
        };
        let payload_len = u64::from_be_bytes(payload_len);
        if opcode.is_control() {
            if !fin {
                return Err(FrameHeadParseError::FragmentedControl);
            }
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(FrameHeadParseError::ControlTooLong(payload_len));
            }
        }
        let mut mask = [0u8; 4];
        if masked {
            mask.copy_from_slice(&buffer[2 + extra_payload_len_bytes..6 + extra_payload_len_bytes])
        }
        Ok(FrameHead {
            fin,
            opcode,
            mask,
            payload_len,
        })
    }
    // Length of the encoded frame head in bytes ([2..14]).
    pub fn len_bytes(&self) -> usize {
        let extra_payload_len_bytes = match self.payload_len {
            0..=125 => 0usize,
            126..=65535 => 2usize,
            _ => 8usize,
        };
        2 + extra_payload_len_bytes + self.masked() as usize * 4
    }
    pub fn masked(&self) -> bool {
        self.mask != [0u8, 0u8, 0u8, 0u8]
    }
    // Writes the frame header to `buffer`. Panics if `buffer` is too small.
    // See [len_bytes()][`Self::len_bytes()`].
    pub fn encode(&self, buffer: &mut [u8]) {
        buffer[0] = self.fin as u8 * 0x80;
        buffer[0] += match self.opcode {
            Opcode::Continuation => 0x0,
            Opcode::Text => 0x1,
            Opcode::Binary => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
        };
        buffer[1] = match self.payload_len {
            0..=125 => self.payload_len as u8,
            126..=65535 => 126u8,
            _ => 127u8,
        };
        match buffer[1] {
            126 => buffer[2..4].copy_from_slice(&(self.payload_len as u16).to_be_bytes()),
            127 => buffer[2..10].copy_from_slice(&self.payload_len.to_be_bytes()),
            _ => {}
        }
        if self.masked() {
            let mask_buffer = match buffer[1] {
                126 => &mut buffer[4..8],
                127 => &mut buffer[10..14],
                _ => &mut buffer[2..6],
            };
            mask_buffer.copy_from_slice(&self.mask);
            buffer[1] += 128;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum FrameHeadParseError {
    #[error("incomplete, need at least {0} bytes")]
    Incomplete(usize),
    #[error("one or more RSV bit is set")]
    RsvBit,
    #[error("invalid opcode {0:#x}")]
    InvalidOpcode(u8),
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlTooLong(u64),
}

#[cfg(test)]
mod tests {
    use crate::frame::{FrameHead, FrameHeadParseError, Opcode};

    fn encoded(head: &FrameHead) -> Vec<u8> {
        let mut buffer = vec![0u8; head.len_bytes()];
        head.encode(&mut buffer);
        buffer
    }

    #[test]
    fn parse_encoded_heads() {
        for payload_len in [0u64, 125, 126, 65535, 65536, 1 << 40] {
            for mask in [[0u8; 4], [1, 2, 3, 4]] {
                let head = FrameHead {
                    fin: payload_len % 2 == 0,
                    opcode: Opcode::Binary,
                    mask,
                    payload_len,
                };
                assert_eq!(FrameHead::parse(&encoded(&head)).unwrap(), head);
            }
        }
    }

    #[test]
    fn medium_length_uses_two_extra_bytes() {
        let head = FrameHead {
            fin: true,
            opcode: Opcode::Text,
            mask: [0; 4],
            payload_len: 65535,
        };
        assert_eq!(head.len_bytes(), 4);
        assert_eq!(encoded(&head), vec![0x81, 126, 0xFF, 0xFF]);
    }

    #[test]
    fn incomplete_head_reports_required_length() {
        match FrameHead::parse(&[0x82]) {
            Err(FrameHeadParseError::Incomplete(2)) => {}
            r => panic!("unexpected: {:?}", r),
        }
        match FrameHead::parse(&[0x82, 0xFE, 0x00]) {
            Err(FrameHeadParseError::Incomplete(8)) => {}
            r => panic!("unexpected: {:?}", r),
        }
    }

    #[test]
    fn rejects_invalid_heads() {
        assert!(matches!(
            FrameHead::parse(&[0xC2, 0x00]),
            Err(FrameHeadParseError::RsvBit)
        ));
        assert!(matches!(
            FrameHead::parse(&[0x83, 0x00]),
            Err(FrameHeadParseError::InvalidOpcode(3))
        ));
        assert!(matches!(
            FrameHead::parse(&[0x09, 0x00]),
            Err(FrameHeadParseError::FragmentedControl)
        ));
        assert!(matches!(
            FrameHead::parse(&[0x89, 126, 0x00, 0x7E]),
            Err(FrameHeadParseError::ControlTooLong(126))
        ));
    }
}
