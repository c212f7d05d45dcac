//! One logical display output.
//!
//! A [`Connector`] owns a root plane (the toplevel window) and seven overlay
//! subsurfaces stacked above it. Each frame it decides between handing the
//! frame's layers straight to the host and flattening them with the GPU
//! compositor, fills the planes and commits them.
//!
//! # Design Invariants
//!
//! 1. **Back-to-front commits**: overlays commit from the highest index down,
//!    the root last, so the host applies every subsurface state together with
//!    the root commit.
//!
//! 2. **Backing below translucent content**: unless the base layer covers the
//!    output opaquely, the root shows a 1x1 black buffer stretched to the
//!    output so nothing behind the window bleeds through.
//!
//! 3. **Host events never block presentation**: state mutated by host events
//!    lives in [`ConnectorShared`] (atomics plus a small color mutex), never
//!    behind the plane lock held across `present`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::backend::fb::{self, FbHandle};
use crate::backend::plane::{Plane, PlaneShared, PlaneState, PLANE_COUNT};
use crate::backend::transport::{
    Icon, PlaneSurface, SelectionKind, Transport, WindowListener,
};
use crate::backend::{BackendConnector, ScreenType};
use crate::color::{
    self, Colorspace, DisplayColorimetry, Eotf, FrogPreferredMetadata, FrogTransferFunction,
    HdrInfo, NativeColorimetry,
};
use crate::config::{Config, OutputState, Runtime};
use crate::cursor::CursorImage;
use crate::edid::{self, EdidWriter, FileEdidWriter};
use crate::frame::{FrameInfo, Layer, SampleFilter, ZPOS_BASE};
use crate::frame_clock::{FrameClock, VblankTimer};
use crate::render::{self, CompositePolicy, CompositeRenderer, NullRenderer};
use crate::tracy_span;
use crate::utils::{get_monotonic_time, to_logical, to_physical, SCALE_DENOMINATOR};

pub const CONNECTOR_NAME: &str = "Wayland";
pub const CONNECTOR_MAKE: &str = "Gamescope";
pub const CONNECTOR_MODEL: &str = "Virtual Display";
pub const DEFAULT_TITLE: &str = "gamescope";

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("vulkan_composite failed")]
    CompositeFailed,
}

impl PresentError {
    /// Errno-style code for callers that report integers.
    pub fn code(&self) -> i32 {
        match self {
            PresentError::CompositeFailed => -libc::EINVAL,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ColorState {
    hdr_info: HdrInfo,
    display: DisplayColorimetry,
}

/// Connector state shared with host event handlers and the input thread.
pub struct ConnectorShared {
    key: u64,
    output: Arc<OutputState>,
    runtime: Arc<Runtime>,
    vblank: Arc<dyn VblankTimer>,
    hdr_enabled: bool,
    adaptive_sync: bool,
    hdr10_saturation_scale: f32,
    host_vrr: AtomicBool,
    scale: AtomicU32,
    has_received_scale: AtomicBool,
    needs_decor_commit: AtomicBool,
    repaint: AtomicBool,
    close_requested: AtomicBool,
    color: Mutex<ColorState>,
}

impl ConnectorShared {
    pub fn new(
        key: u64,
        config: &Config,
        output: Arc<OutputState>,
        runtime: Arc<Runtime>,
        vblank: Arc<dyn VblankTimer>,
    ) -> Self {
        Self {
            key,
            output,
            runtime,
            vblank,
            hdr_enabled: config.hdr.enabled,
            adaptive_sync: config.adaptive_sync,
            hdr10_saturation_scale: config.hdr.hdr10_saturation_scale,
            host_vrr: AtomicBool::new(false),
            scale: AtomicU32::new(SCALE_DENOMINATOR),
            has_received_scale: AtomicBool::new(false),
            needs_decor_commit: AtomicBool::new(false),
            repaint: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
            color: Mutex::new(ColorState::default()),
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn output(&self) -> &Arc<OutputState> {
        &self.output
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    pub fn vblank(&self) -> &Arc<dyn VblankTimer> {
        &self.vblank
    }

    pub fn hdr10_saturation_scale(&self) -> f32 {
        self.hdr10_saturation_scale
    }

    pub fn is_host_vrr(&self) -> bool {
        self.host_vrr.load(Ordering::Relaxed)
    }

    pub fn set_host_vrr(&self, vrr: bool) {
        self.host_vrr.store(vrr, Ordering::Relaxed);
    }

    pub fn scale(&self) -> u32 {
        self.scale.load(Ordering::Relaxed)
    }

    pub fn set_scale(&self, scale: u32) {
        self.scale.store(scale, Ordering::Relaxed);
        self.has_received_scale.store(true, Ordering::Relaxed);
    }

    pub fn has_received_scale(&self) -> bool {
        self.has_received_scale.load(Ordering::Relaxed)
    }

    /// Output size in surface-local logical units.
    pub fn logical_size(&self) -> (i32, i32) {
        let scale = self.scale();
        let (w, h) = self.output.size();
        (to_logical(w as i32, scale), to_logical(h as i32, scale))
    }

    pub fn request_decor_commit(&self) {
        self.needs_decor_commit.store(true, Ordering::Release);
    }

    pub fn take_decor_commit(&self) -> bool {
        self.needs_decor_commit.swap(false, Ordering::AcqRel)
    }

    pub fn force_repaint(&self) {
        self.repaint.store(true, Ordering::Release);
        self.runtime.request_repaint();
    }

    pub fn take_repaint(&self) -> bool {
        self.repaint.swap(false, Ordering::AcqRel)
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::Acquire)
    }

    pub fn hdr_info(&self) -> HdrInfo {
        self.color.lock().hdr_info
    }

    pub fn display_colorimetry(&self) -> DisplayColorimetry {
        self.color.lock().display
    }
}

impl WindowListener for ConnectorShared {
    fn on_configure(&self, size: Option<(i32, i32)>, fullscreen: bool) {
        let (width, height) = size
            .filter(|&(w, h)| w > 0 && h > 0)
            .unwrap_or_else(|| self.logical_size());
        let scale = self.scale();
        let (w, h) = (to_physical(width, scale), to_physical(height, scale));
        debug!("Configure {}x{} logical, {}x{} physical", width, height, w, h);
        self.output.set_size(w.max(1) as u32, h.max(1) as u32);
        self.runtime.set_fullscreen_state(fullscreen);
        self.request_decor_commit();
        self.force_repaint();
    }

    fn on_close(&self) {
        debug!("Close requested for connector {}", self.key);
        self.close_requested.store(true, Ordering::Release);
    }

    fn on_preferred_transfer(&self, is_pq: bool) {
        self.color
            .lock()
            .hdr_info
            .set_preferred_transfer(is_pq, self.hdr_enabled);
    }

    fn on_target_primaries(&self, primaries: [u32; 8]) {
        self.color.lock().display = DisplayColorimetry::from_scaled(primaries, 1.0 / 10_000.0);
    }

    fn on_target_max_cll(&self, max_cll: u32) {
        self.color.lock().hdr_info.max_cll = max_cll.min(u32::from(u16::MAX)) as u16;
    }

    fn on_target_max_fall(&self, max_fall: u32) {
        self.color.lock().hdr_info.max_fall = max_fall.min(u32::from(u16::MAX)) as u16;
    }

    fn on_frog_preferred_metadata(&self, meta: FrogPreferredMetadata) {
        let mut color = self.color.lock();
        color.display = DisplayColorimetry::from_scaled(
            meta.primaries.map(u32::from),
            color::FROG_CHROMATICITY_UNIT,
        );
        color.hdr_info.set_preferred_transfer(
            meta.transfer_function == FrogTransferFunction::St2084Pq,
            self.hdr_enabled,
        );
        color.hdr_info.max_cll = meta.max_luminance;
        color.hdr_info.min_cll = meta.min_luminance;
        color.hdr_info.max_fall = meta.max_full_frame_luminance;
    }
}

/// Collaborators shared by every connector of a backend.
#[derive(Clone)]
pub struct ConnectorDeps {
    pub renderer: Arc<dyn CompositeRenderer>,
    pub vblank: Arc<dyn VblankTimer>,
    pub edid_writer: Arc<dyn EdidWriter>,
}

impl ConnectorDeps {
    /// No GPU compositor, a [`FrameClock`] and a file EDID writer.
    pub fn standalone(config: &Config, output: &Arc<OutputState>) -> Self {
        Self {
            renderer: Arc::new(NullRenderer),
            vblank: Arc::new(FrameClock::new(output.clone())),
            edid_writer: Arc::new(FileEdidWriter::new(
                config.patched_edid_path.clone(),
                config.hdr.enabled,
            )),
        }
    }
}

/// Connector-level knobs from the config.
#[derive(Debug, Clone)]
struct ConnectorSettings {
    composite_force: bool,
    heatmap: bool,
    itm_enable: bool,
    fullscreen: bool,
    force_relative_mouse: bool,
    title: Option<String>,
    app_id: String,
}

struct Planes<T: Transport> {
    root: Plane<T>,
    overlays: Vec<Plane<T>>,
    visible: bool,
}

impl<T: Transport> Planes<T> {
    fn get_mut(&mut self, index: usize) -> Option<&mut Plane<T>> {
        match index {
            0 => Some(&mut self.root),
            i => self.overlays.get_mut(i - 1),
        }
    }

    fn clear(&mut self, transport: &T, from: usize) {
        for i in from..PLANE_COUNT {
            if let Some(plane) = self.get_mut(i) {
                plane.present(transport, None);
            }
        }
    }

    fn commit(&mut self) {
        for plane in self.overlays.iter_mut().rev() {
            plane.commit();
        }
        self.root.commit();
    }
}

pub struct Connector<T: Transport> {
    shared: Arc<ConnectorShared>,
    transport: Arc<T>,
    renderer: Arc<dyn CompositeRenderer>,
    edid_writer: Arc<dyn EdidWriter>,
    settings: ConnectorSettings,
    planes: Mutex<Planes<T>>,
    edid: Vec<u8>,
}

impl<T: Transport> Connector<T> {
    /// Create the connector's surfaces and apply the startup window state.
    pub fn new(
        shared: Arc<ConnectorShared>,
        transport: Arc<T>,
        renderer: Arc<dyn CompositeRenderer>,
        edid_writer: Arc<dyn EdidWriter>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let settings = ConnectorSettings {
            composite_force: config.composite.force,
            heatmap: config.composite.heatmap,
            itm_enable: config.hdr.itm_enable,
            fullscreen: config.window.fullscreen,
            force_relative_mouse: config.window.force_relative_mouse,
            title: config.window.title.clone(),
            app_id: config.window.app_id.clone(),
        };

        let root_shared = Arc::new(PlaneShared::new(0, shared.clone()));
        let root_surface = transport.create_root_surface(&root_shared, &settings.app_id)?;
        let root = Plane::new(root_shared, root_surface);

        let mut overlays: Vec<Plane<T>> = Vec::with_capacity(PLANE_COUNT - 1);
        for index in 1..PLANE_COUNT {
            let plane_shared = Arc::new(PlaneShared::new(index, shared.clone()));
            let below = overlays.last().map_or(root.surface(), |p| p.surface());
            let surface = transport.create_subsurface(&plane_shared, root.surface(), below)?;
            overlays.push(Plane::new(plane_shared, surface));
        }

        let (nested_w, nested_h) = shared.output().nested_size();
        let connector = Self {
            shared,
            transport,
            renderer,
            edid_writer,
            settings,
            planes: Mutex::new(Planes {
                root,
                overlays,
                visible: true,
            }),
            edid: edid::generate(nested_w, nested_h),
        };
        connector.init();
        Ok(connector)
    }

    fn init(&self) {
        if self.settings.fullscreen {
            self.shared.runtime().request_fullscreen(true);
            self.update_fullscreen_state(&mut self.planes.lock());
        }

        self.write_patched_edid();

        if self.settings.force_relative_mouse {
            self.set_relative_mouse_mode(true);
        }
        self.set_title(None);
    }

    pub fn shared(&self) -> &Arc<ConnectorShared> {
        &self.shared
    }

    pub fn is_visible(&self) -> bool {
        self.planes.lock().visible
    }

    /// Plane shared state by index, for input mapping and inspection.
    pub fn plane_shared(&self, index: usize) -> Option<Arc<PlaneShared>> {
        self.planes.lock().get_mut(index).map(|p| p.shared().clone())
    }

    pub fn write_patched_edid(&self) {
        self.edid_writer
            .write_patched(&self.edid, &self.shared.hdr_info());
    }

    fn update_fullscreen_state(&self, planes: &mut Planes<T>) {
        let runtime = self.shared.runtime();
        if !planes.visible {
            runtime.set_fullscreen_state(false);
            return;
        }
        let desired = runtime.desired_fullscreen();
        if desired != runtime.is_fullscreen() {
            debug!("Setting fullscreen to {}", desired);
            planes.root.surface_mut().set_fullscreen(desired);
            runtime.set_fullscreen_state(desired);
            self.shared.request_decor_commit();
        }
    }

    fn composite_policy(&self) -> CompositePolicy {
        CompositePolicy {
            force: self.settings.composite_force,
            heatmap: self.settings.heatmap,
            itm_enable: self.settings.itm_enable,
            supports_color_management: self.transport.color_support().any(),
        }
    }

    fn backing_state(&self, black: FbHandle) -> PlaneState {
        let (w, h) = self.shared.output().size();
        PlaneState {
            dst_w: w as i32,
            dst_h: h as i32,
            opaque: true,
            fractional_scale: self.shared.scale(),
            ..PlaneState::new(black)
        }
    }

    fn present_direct(&self, planes: &mut Planes<T>, frame: &FrameInfo) {
        let output = self.shared.output().size();
        let needs_backing = frame
            .base_layer()
            .map_or(true, |layer| !(layer.is_screen_size(output) && !layer.has_alpha()));

        let mut next_plane = 0;
        if needs_backing {
            match self.transport.black_fb() {
                Some(black) => {
                    fb::on_compositor_acquire(&black);
                    let state = self.backing_state(black);
                    planes.root.present(&self.transport, Some(state));
                    next_plane = 1;
                }
                None => warn!("No black framebuffer for backing plane"),
            }
        }

        for i in 0..PLANE_COUNT {
            if next_plane >= PLANE_COUNT {
                break;
            }
            if let Some(plane) = planes.get_mut(next_plane) {
                plane.present_layer(&self.transport, frame.layers.get(i));
            }
            next_plane += 1;
        }
    }

    fn present_composite(&self, planes: &mut Planes<T>, frame: &FrameInfo) -> Result<(), PresentError> {
        let Some(sequence) = self.renderer.composite(frame) else {
            error!("vulkan_composite failed");
            return Err(PresentError::CompositeFailed);
        };
        self.renderer.wait(sequence);

        let colorspace = if frame.output_encoding_eotf == Eotf::Pq {
            Colorspace::Hdr10Pq
        } else {
            Colorspace::Srgb
        };
        let layer = Layer {
            tex: self.renderer.output_image(),
            scale: (1.0, 1.0),
            opacity: 1.0,
            zpos: ZPOS_BASE,
            colorspace,
            filter: SampleFilter::Nearest,
            ..Default::default()
        };
        planes.root.present_layer(&self.transport, Some(&layer));
        planes.clear(&self.transport, 1);
        Ok(())
    }
}

impl<T: Transport> BackendConnector for Connector<T> {
    fn virtual_connector_key(&self) -> u64 {
        self.shared.key
    }

    fn present(&self, frame: &FrameInfo, _is_async: bool) -> Result<(), PresentError> {
        tracy_span!("Connector::present");

        let mut planes = self.planes.lock();
        self.update_fullscreen_state(&mut planes);

        let mut needs_composite = false;
        if !planes.visible {
            planes.clear(&self.transport, 0);
        } else {
            needs_composite = render::needs_composite(frame, &self.composite_policy());
            if needs_composite {
                self.present_composite(&mut planes, frame)?;
            } else {
                self.present_direct(&mut planes, frame);
            }
        }

        planes.commit();
        drop(planes);

        self.transport.flush();
        let vblank = self.shared.vblank();
        vblank.update_was_compositing(needs_composite);
        vblank.update_last_draw_time(get_monotonic_time().saturating_sub(frame.wakeup_time));

        self.transport.poll();
        Ok(())
    }

    fn hdr_info(&self) -> HdrInfo {
        self.shared.hdr_info()
    }

    fn is_hdr_active(&self) -> bool {
        false
    }

    fn supports_vrr(&self) -> bool {
        self.shared.is_host_vrr()
    }

    fn is_vrr_active(&self) -> bool {
        self.shared.adaptive_sync && self.shared.is_host_vrr()
    }

    fn valid_dynamic_refresh_rates(&self) -> Vec<u32> {
        Vec::new()
    }

    fn raw_edid(&self) -> &[u8] {
        &self.edid
    }

    fn screen_type(&self) -> ScreenType {
        ScreenType::Internal
    }

    fn current_orientation(&self) -> u32 {
        0
    }

    fn name(&self) -> &str {
        CONNECTOR_NAME
    }

    fn make(&self) -> &str {
        CONNECTOR_MAKE
    }

    fn model(&self) -> &str {
        CONNECTOR_MODEL
    }

    fn native_colorimetry(&self, hdr10: bool) -> NativeColorimetry {
        color::native_colorimetry(
            hdr10,
            self.shared.display_colorimetry(),
            &self.shared.hdr_info(),
        )
    }

    fn set_cursor_image(&self, image: Option<Arc<CursorImage>>) {
        self.transport.set_cursor_image(image);
    }

    fn set_relative_mouse_mode(&self, relative: bool) {
        let planes = self.planes.lock();
        self.transport
            .set_relative_mouse_mode(planes.root.surface(), relative);
    }

    fn set_visible(&self, visible: bool) {
        let mut planes = self.planes.lock();
        if planes.visible == visible {
            return;
        }
        planes.visible = visible;
        drop(planes);
        self.shared.force_repaint();
    }

    fn set_title(&self, title: Option<&str>) {
        let base = title
            .or(self.settings.title.as_deref())
            .unwrap_or(DEFAULT_TITLE);
        let title = if self.shared.runtime().is_grabbed() {
            format!("{} (grabbed)", base)
        } else {
            base.to_string()
        };
        self.planes.lock().root.surface_mut().set_title(&title);
    }

    fn set_icon(&self, icon: Option<&[u32]>) {
        let icon = icon.and_then(Icon::from_raw);
        let planes = self.planes.lock();
        self.transport.set_icon(planes.root.surface(), icon.as_ref());
    }

    fn set_selection(&self, kind: SelectionKind, contents: String) {
        self.transport.set_selection(kind, contents);
    }
}

impl<T: Transport> Drop for Connector<T> {
    fn drop(&mut self) {
        self.transport.on_connector_destroyed(self.shared.key);
    }
}
