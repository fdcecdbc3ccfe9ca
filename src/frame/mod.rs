mod encode;
mod frame_head;
mod frame_payload;

pub use encode::*;
pub use frame_head::*;
pub use frame_payload::*;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn is_control(&self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct WsControlFramePayload {
    len: u8,
    buffer: [u8; MAX_CONTROL_PAYLOAD],
}

impl WsControlFramePayload {
    pub fn new(data: &[u8]) -> Self {
        let len = data.len().min(MAX_CONTROL_PAYLOAD);
        let mut buffer = [0u8; MAX_CONTROL_PAYLOAD];
        buffer[0..len].copy_from_slice(&data[0..len]);
        Self {
            len: len as u8,
            buffer,
        }
    }
    // Close payload: big endian status code followed by a reason, truncated to fit.
    pub fn close(code: u16, reason: &str) -> Self {
        let mut data = [0u8; MAX_CONTROL_PAYLOAD];
        data[0..2].copy_from_slice(&code.to_be_bytes());
        let reason = &reason.as_bytes()[0..reason.len().min(MAX_CONTROL_PAYLOAD - 2)];
        data[2..2 + reason.len()].copy_from_slice(reason);
        Self::new(&data[0..2 + reason.len()])
    }
    pub fn data(&self) -> &[u8] {
        &self.buffer[0..self.len()]
    }
    pub fn len(&self) -> usize {
        self.len as usize
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    pub fn close_code(&self) -> Option<u16> {
        match self.len() {
            0 | 1 => None,
            _ => Some(u16::from_be_bytes([self.buffer[0], self.buffer[1]])),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::frame::WsControlFramePayload;

    #[test]
    fn close_payload_truncates_reason() {
        let reason = "x".repeat(200);
        let payload = WsControlFramePayload::close(1000, &reason);
        assert_eq!(payload.len(), 125);
        assert_eq!(payload.close_code(), Some(1000));
    }

    #[test]
    fn close_payload_without_code() {
        assert_eq!(WsControlFramePayload::new(&[]).close_code(), None);
        assert_eq!(WsControlFramePayload::new(&[3, 232]).close_code(), Some(1000));
    }
}
