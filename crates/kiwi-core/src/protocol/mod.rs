pub mod control;
pub mod frame;

pub use control::{ControlAction, ControlChannel};
pub use frame::{Frame, FrameCodec, GpsHeader, MsgParam};
