use crate::frame::{mask, FrameHead, Opcode};
use rand::prelude::*;

/// Produces encoded frames. Clients mask every frame with a fresh key, servers never mask.
#[derive(Clone, Debug)]
pub struct FrameEncoder<R: RngCore = StdRng> {
    pub mask_rng: Option<R>,
}

impl FrameEncoder<StdRng> {
    pub fn client() -> Self {
        Self {
            mask_rng: Some(StdRng::from_entropy()),
        }
    }
    pub fn server() -> Self {
        Self { mask_rng: None }
    }
    pub fn new(masked: bool) -> Self {
        match masked {
            true => Self::client(),
            false => Self::server(),
        }
    }
}

impl<R: RngCore> FrameEncoder<R> {
    // Appends the encoded frame to `out`.
    pub fn encode(&mut self, opcode: Opcode, fin: bool, payload: &[u8], out: &mut Vec<u8>) {
        let head = FrameHead {
            fin,
            opcode,
            mask: self.mask_rng.as_mut().map_or([0u8, 0u8, 0u8, 0u8], |rng| {
                // an all zero key would read as unmasked
                let mut key = [0u8; 4];
                while key == [0u8; 4] {
                    key = rng.next_u32().to_ne_bytes();
                }
                key
            }),
            payload_len: payload.len() as u64,
        };
        let mut head_buf = [0u8; 14];
        head.encode(&mut head_buf);
        out.extend_from_slice(&head_buf[0..head.len_bytes()]);
        let start = out.len();
        out.extend_from_slice(payload);
        mask(head.mask, 0, &mut out[start..]);
    }
}
