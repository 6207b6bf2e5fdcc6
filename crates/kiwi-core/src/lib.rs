//! Pure, I/O-free core of the KiwiSDR client: wire format, DSP
//! primitives, configuration data model, and WAV header math. Nothing in
//! this crate opens a socket or a file; `kiwi-client` drives all of that.

pub mod adpcm;
pub mod config;
pub mod error;
pub mod noise_floor;
pub mod protocol;
pub mod squelch;
pub mod util;
pub mod wav;

pub use adpcm::AdpcmDecoder;
pub use config::{FanoutConfig, FanoutField, Modulation, SessionConfig, SessionState, StreamKind};
pub use error::{KiwiError, Result};
pub use noise_floor::NoiseFloorRing;
pub use protocol::{ControlAction, ControlChannel, Frame, FrameCodec, GpsHeader, MsgParam};
pub use squelch::{Squelch, SquelchReport};
