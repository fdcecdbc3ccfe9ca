use crate::frame::Opcode;

/// Operation tag of a message handed out by [`WsConnection::next_reader`].
///
/// Pings are answered by the connection itself and never surface. A `Close` message is the
/// last message of a connection.
///
/// [`WsConnection::next_reader`]: crate::connection::WsConnection::next_reader
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
pub enum WsMessageKind {
    Binary,
    Text,
    Pong,
    Close,
}

impl WsMessageKind {
    pub fn opcode(&self) -> Opcode {
        match self {
            WsMessageKind::Binary => Opcode::Binary,
            WsMessageKind::Text => Opcode::Text,
            WsMessageKind::Pong => Opcode::Pong,
            WsMessageKind::Close => Opcode::Close,
        }
    }
    pub fn is_data(&self) -> bool {
        matches!(self, WsMessageKind::Binary | WsMessageKind::Text)
    }
}
