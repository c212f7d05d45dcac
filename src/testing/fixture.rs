//! Test fixture for integration testing
//!
//! The Fixture wires a headless backend to recording collaborators and
//! builds frames sized to the configured output.

use std::sync::Arc;

use tracing::info;

use crate::backend::connector::{Connector, ConnectorDeps};
use crate::backend::headless::{HeadlessBackend, HeadlessFb, HeadlessTransport, SurfaceOp};
use crate::backend::transport::ColorSupport;
use crate::backend::{Backend, BackendConnector, PresentError};
use crate::config::{Config, OutputState, Runtime};
use crate::frame::{FrameInfo, Layer, Texture};

use super::recorders::{RecordingEdidWriter, RecordingRenderer, RecordingVblank};

pub type HeadlessConnector = Connector<HeadlessTransport>;

/// Test fixture for integration testing
///
/// Provides a complete presentation environment with:
/// - Headless backend recording every surface request
/// - Recording GPU compositor, vblank timer and EDID writer
/// - A configured output and runtime state
pub struct Fixture {
    pub config: Config,
    pub output: Arc<OutputState>,
    pub runtime: Arc<Runtime>,
    pub renderer: Arc<RecordingRenderer>,
    pub vblank: Arc<RecordingVblank>,
    pub edid: Arc<RecordingEdidWriter>,
    backend: HeadlessBackend,
}

impl Fixture {
    /// Create a fixture with the default config and no color management.
    ///
    /// The backend is initialized, so connectors can be created right away.
    pub fn new() -> Self {
        Self::with_config(Config::default(), ColorSupport::default())
    }

    pub fn with_config(config: Config, color_support: ColorSupport) -> Self {
        let output = Arc::new(OutputState::new());
        let runtime = Arc::new(Runtime::default());
        let fixture = Self::uninitialized(config, color_support, output, runtime);
        if let Err(err) = fixture.backend.init().and_then(|_| fixture.backend.post_init()) {
            tracing::error!("Headless fixture failed to initialize: {:?}", err);
        }
        info!("Test fixture initialized with headless backend");
        fixture
    }

    /// A fixture whose backend was not initialized yet.
    pub fn uninitialized(
        config: Config,
        color_support: ColorSupport,
        output: Arc<OutputState>,
        runtime: Arc<Runtime>,
    ) -> Self {
        // Sized from the config so the output image matches once configured.
        let (width, height) = OutputState::from_config(&config.output)
            .map(|o| o.size())
            .unwrap_or((0, 0));
        let renderer = Arc::new(RecordingRenderer::new(width, height));
        let vblank = Arc::new(RecordingVblank::default());
        let edid = Arc::new(RecordingEdidWriter::default());
        let deps = ConnectorDeps {
            renderer: renderer.clone(),
            vblank: vblank.clone(),
            edid_writer: edid.clone(),
        };
        let backend = HeadlessBackend::with_deps(
            config.clone(),
            output.clone(),
            runtime.clone(),
            Arc::new(HeadlessTransport::new(color_support)),
            deps,
        );
        Self {
            config,
            output,
            runtime,
            renderer,
            vblank,
            edid,
            backend,
        }
    }

    pub fn backend(&self) -> &HeadlessBackend {
        &self.backend
    }

    pub fn transport(&self) -> &Arc<HeadlessTransport> {
        self.backend.transport()
    }

    /// Create the virtual connector every test presents on.
    pub fn connector(&self) -> Option<Arc<HeadlessConnector>> {
        self.backend.create_virtual_connector(0)
    }

    /// An opaque or translucent layer covering the output 1:1.
    pub fn screen_layer(&self, has_alpha: bool) -> Layer {
        let (width, height) = self.output.size();
        Self::layer(width, height, has_alpha)
    }

    /// A layer backed by a fresh headless framebuffer.
    pub fn layer(width: u32, height: u32, has_alpha: bool) -> Layer {
        Layer {
            tex: Some(Texture {
                width,
                height,
                has_alpha,
                fb: Some(HeadlessFb::new_handle()),
            }),
            ..Default::default()
        }
    }

    pub fn frame(&self, layers: Vec<Layer>) -> FrameInfo {
        FrameInfo {
            layers,
            ..Default::default()
        }
    }

    pub fn present(
        &self,
        connector: &HeadlessConnector,
        frame: &FrameInfo,
    ) -> Result<(), PresentError> {
        connector.present(frame, false)
    }

    /// Dispatch queued host events. Returns whether a repaint is needed.
    pub fn dispatch(&self) -> bool {
        self.backend.poll_state()
    }

    /// Take the ops recorded since the last call, indexed by surface id.
    pub fn take_ops(&self) -> Vec<Vec<SurfaceOp>> {
        self.transport().take_ops()
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
