//! Scanout - output backend layer for a nested compositor
//!
//! Presents a compositor's frames through one of several targets behind the
//! [`backend::Backend`] interface: a window on a host Wayland compositor, a
//! recording headless target, or a deferred wrapper that starts before the
//! real target is reachable.
pub mod backend;
pub mod color;
pub mod config;
pub mod cursor;
pub mod edid;
pub mod frame;
pub mod frame_clock;
pub mod input;
pub mod logging;
pub mod render;
pub mod testing;
pub mod tracy;
pub mod utils;

pub use backend::{Backend, BackendConnector, PresentError};
pub use config::{Config, OutputState, Runtime};
pub use frame::{FrameInfo, Layer};
