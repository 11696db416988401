/// 4-bit frame opcode.
///
/// Values outside the six defined by RFC 6455 are not rejected, they are carried through as
/// [`Opcode::Reserved`] with the raw nibble.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Cont,
    Text,
    Bin,
    Close,
    Ping,
    Pong,
    Reserved(u8),
}

impl From<u8> for Opcode {
    fn from(b: u8) -> Self {
        match b & 0x0F {
            0x0 => Self::Cont,
            0x1 => Self::Text,
            0x2 => Self::Bin,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            n => Self::Reserved(n),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(op: Opcode) -> Self {
        match op {
            Opcode::Cont => 0x0,
            Opcode::Text => 0x1,
            Opcode::Bin => 0x2,
            Opcode::Close => 0x8,
            Opcode::Ping => 0x9,
            Opcode::Pong => 0xA,
            Opcode::Reserved(n) => n & 0x0F,
        }
    }
}
