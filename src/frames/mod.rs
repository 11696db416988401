mod decode;
mod frame;
mod mask;
mod opcode;

pub(crate) use decode::FrameReader;
pub use frame::Frame;
pub(crate) use mask::mask;
pub use opcode::Opcode;
