//! Testing infrastructure for the presentation path
//!
//! This module provides a fixture and recording collaborators for driving
//! connectors without a host compositor or a GPU.
//!
//! # Architecture
//!
//! 1. **HeadlessBackend**: records every surface request and lets tests queue
//!    host events that are dispatched on the next poll.
//!
//! 2. **Fixture**: wires a headless backend to recording collaborators and
//!    builds frames sized to the configured output.
//!
//! 3. **Recorders**: stand-ins for the GPU compositor, the vblank timer, the
//!    EDID writer and the input sink that remember what they were asked.
//!
//! # Example
//!
//! ```ignore
//! use scanout_core::testing::Fixture;
//!
//! #[test]
//! fn test_direct_present() {
//!     let fixture = Fixture::new();
//!     let connector = fixture.connector().unwrap();
//!
//!     let frame = fixture.frame(vec![fixture.screen_layer(false)]);
//!     assert!(fixture.present(&connector, &frame).is_ok());
//!     assert_eq!(fixture.renderer.composite_count(), 0);
//! }
//! ```

mod fixture;
mod recorders;

pub use fixture::Fixture;
pub use recorders::{
    InputRecord, RecordingEdidWriter, RecordingRenderer, RecordingSink, RecordingVblank,
};
