//! Headless backend for testing
//!
//! This module provides a backend that records every surface request instead
//! of talking to a host compositor, allowing the presentation path to run in
//! CI environments and for integration testing.
//!
//! # Design Invariants
//!
//! 1. **No host access**: the headless transport never opens a connection.
//!    Surfaces are plain op logs and framebuffers are ids.
//!
//! 2. **Deterministic output**: surfaces are numbered in creation order and
//!    ops are logged in request order, enabling reproducible snapshot tests.
//!
//! 3. **Event simulation**: host events (presentation feedback, configure,
//!    preferred color) are queued programmatically and dispatched on the
//!    next `poll`, the same point a real transport dispatches them.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::blob::{BackendBlob, BlobData};
use super::connector::{Connector, ConnectorDeps, ConnectorShared};
use super::fb::{self, BackendFb, DmabufAttributes, FbHandle, FbRefs};
use super::plane::PlaneShared;
use super::transport::{
    ColorSupport, Icon, PlaneSurface, SelectionKind, SrcRect, SurfaceListener, Transport,
    WindowListener,
};
use super::{fourcc, Backend, InputType, OutputFormats, PresentLayout, ScreenType, TouchClickMode};
use crate::color::{ColorDescription, FrogPreferredMetadata, FrogPrimaries, FrogTransferFunction};
use crate::config::{Config, OutputState, Runtime};
use crate::cursor::CursorImage;

static NEXT_FB_ID: AtomicU64 = AtomicU64::new(1);

/// Framebuffer that only carries an id.
#[derive(Debug)]
pub struct HeadlessFb {
    id: u64,
    refs: FbRefs,
}

impl HeadlessFb {
    pub fn new_handle() -> FbHandle {
        Arc::new(Self {
            id: NEXT_FB_ID.fetch_add(1, Ordering::Relaxed),
            refs: FbRefs::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Id of `fb` if it is a headless framebuffer.
    pub fn id_of(fb: &FbHandle) -> Option<u64> {
        fb.as_any().downcast_ref::<HeadlessFb>().map(HeadlessFb::id)
    }
}

impl BackendFb for HeadlessFb {
    fn refs(&self) -> &FbRefs {
        &self.refs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One request made on a headless surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    PresentationFeedback,
    ColorDescription(Option<ColorDescription>),
    FrogColor(FrogPrimaries, FrogTransferFunction),
    Viewport { src: SrcRect, dst: (i32, i32) },
    Position(i32, i32),
    /// Framebuffer id, or `None` to detach.
    Attach(Option<u64>),
    DamageAll,
    Opaque(bool),
    BufferScale(i32),
    CommitWindow(i32, i32),
    Commit,
    Fullscreen(bool),
    Title(String),
}

type OpLog = Arc<Mutex<Vec<SurfaceOp>>>;

pub struct HeadlessSurface {
    id: usize,
    ops: OpLog,
}

impl HeadlessSurface {
    pub fn id(&self) -> usize {
        self.id
    }

    fn push(&self, op: SurfaceOp) {
        self.ops.lock().push(op);
    }
}

impl PlaneSurface for HeadlessSurface {
    type Description = ColorDescription;

    fn request_presentation_feedback(&mut self) {
        self.push(SurfaceOp::PresentationFeedback);
    }

    fn set_color_description(&mut self, desc: Option<&ColorDescription>) {
        self.push(SurfaceOp::ColorDescription(desc.copied()));
    }

    fn set_frog_color(&mut self, primaries: FrogPrimaries, transfer: FrogTransferFunction) {
        self.push(SurfaceOp::FrogColor(primaries, transfer));
    }

    fn set_viewport(&mut self, src: SrcRect, dst: (i32, i32)) {
        self.push(SurfaceOp::Viewport { src, dst });
    }

    fn set_position(&mut self, x: i32, y: i32) {
        self.push(SurfaceOp::Position(x, y));
    }

    fn attach(&mut self, fb: Option<&FbHandle>) {
        self.push(SurfaceOp::Attach(fb.and_then(HeadlessFb::id_of)));
    }

    fn damage_all(&mut self) {
        self.push(SurfaceOp::DamageAll);
    }

    fn set_opaque(&mut self, opaque: bool) {
        self.push(SurfaceOp::Opaque(opaque));
    }

    fn set_buffer_scale(&mut self, scale: i32) {
        self.push(SurfaceOp::BufferScale(scale));
    }

    fn commit_window(&mut self, logical_size: (i32, i32)) {
        self.push(SurfaceOp::CommitWindow(logical_size.0, logical_size.1));
    }

    fn commit(&mut self) {
        self.push(SurfaceOp::Commit);
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.push(SurfaceOp::Fullscreen(fullscreen));
    }

    fn set_title(&mut self, title: &str) {
        self.push(SurfaceOp::Title(title.to_string()));
    }
}

/// A simulated host event, dispatched on the next poll.
#[derive(Debug, Clone, PartialEq)]
pub enum HeadlessEvent {
    Presented { time: Duration, refresh_ns: u32 },
    Discarded,
    PreferredScale(u32),
    Enter(u32),
    Leave(u32),
    Configure { size: Option<(i32, i32)>, fullscreen: bool },
    Close,
    PreferredTransfer { is_pq: bool },
    TargetPrimaries([u32; 8]),
    TargetMaxCll(u32),
    TargetMaxFall(u32),
    FrogPreferredMetadata(FrogPreferredMetadata),
}

struct SurfaceRecord {
    plane: Weak<PlaneShared>,
    ops: OpLog,
}

/// Everything the transport was asked to do outside of surfaces.
#[derive(Debug, Default)]
pub struct HostRequests {
    pub cursor_images: Vec<Option<Arc<CursorImage>>>,
    pub relative_mouse: Vec<bool>,
    pub selections: Vec<(SelectionKind, String)>,
    pub icons: Vec<Option<Icon>>,
    pub destroyed_connectors: Vec<u64>,
}

/// Recording transport.
pub struct HeadlessTransport {
    color_support: ColorSupport,
    surfaces: Mutex<Vec<SurfaceRecord>>,
    events: Mutex<VecDeque<(usize, HeadlessEvent)>>,
    /// Host outputs by id with their refresh rate in mHz.
    outputs: Mutex<HashMap<u32, i32>>,
    black_fb: Mutex<Option<FbHandle>>,
    requests: Mutex<HostRequests>,
    flushes: AtomicUsize,
}

impl Default for HeadlessTransport {
    fn default() -> Self {
        Self::new(ColorSupport::default())
    }
}

impl HeadlessTransport {
    pub fn new(color_support: ColorSupport) -> Self {
        Self {
            color_support,
            surfaces: Mutex::new(Vec::new()),
            events: Mutex::new(VecDeque::new()),
            outputs: Mutex::new(HashMap::new()),
            black_fb: Mutex::new(None),
            requests: Mutex::new(HostRequests::default()),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Create the 1x1 black buffer. Until then no backing plane is shown.
    pub fn create_black_fb(&self) {
        self.black_fb.lock().get_or_insert_with(HeadlessFb::new_handle);
    }

    pub fn surface_count(&self) -> usize {
        self.surfaces.lock().len()
    }

    /// Ops recorded on surface `id` so far.
    pub fn ops(&self, id: usize) -> Vec<SurfaceOp> {
        self.surfaces
            .lock()
            .get(id)
            .map(|s| s.ops.lock().clone())
            .unwrap_or_default()
    }

    /// Take and clear the ops recorded on every surface, indexed by surface id.
    pub fn take_ops(&self) -> Vec<Vec<SurfaceOp>> {
        self.surfaces
            .lock()
            .iter()
            .map(|s| std::mem::take(&mut *s.ops.lock()))
            .collect()
    }

    /// Id of the most recently created root surface.
    pub fn root_surface(&self) -> Option<usize> {
        self.surfaces
            .lock()
            .iter()
            .rposition(|s| s.plane.upgrade().is_some_and(|p| p.is_root()))
    }

    pub fn add_output(&self, id: u32, refresh_mhz: i32) {
        self.outputs.lock().insert(id, refresh_mhz);
    }

    pub fn queue_event(&self, surface: usize, event: HeadlessEvent) {
        self.events.lock().push_back((surface, event));
    }

    /// Queue an event for the current root surface.
    pub fn queue_root_event(&self, event: HeadlessEvent) {
        if let Some(root) = self.root_surface() {
            self.queue_event(root, event);
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> parking_lot::MutexGuard<'_, HostRequests> {
        self.requests.lock()
    }

    fn dispatch(&self, plane: &PlaneShared, event: HeadlessEvent) {
        let outputs = self.outputs.lock().clone();
        let refresh_of = |id: u32| outputs.get(&id).copied();
        let window: &ConnectorShared = plane.connector();
        match event {
            HeadlessEvent::Presented { time, refresh_ns } => {
                plane.on_presented(time, refresh_ns, &refresh_of);
            }
            HeadlessEvent::Discarded => plane.on_discarded(),
            HeadlessEvent::PreferredScale(scale) => plane.on_preferred_scale(scale),
            HeadlessEvent::Enter(output) => plane.on_enter(output, &refresh_of),
            HeadlessEvent::Leave(output) => plane.on_leave(output, &refresh_of),
            HeadlessEvent::Configure { size, fullscreen } => window.on_configure(size, fullscreen),
            HeadlessEvent::Close => window.on_close(),
            HeadlessEvent::PreferredTransfer { is_pq } => window.on_preferred_transfer(is_pq),
            HeadlessEvent::TargetPrimaries(primaries) => window.on_target_primaries(primaries),
            HeadlessEvent::TargetMaxCll(cll) => window.on_target_max_cll(cll),
            HeadlessEvent::TargetMaxFall(fall) => window.on_target_max_fall(fall),
            HeadlessEvent::FrogPreferredMetadata(meta) => window.on_frog_preferred_metadata(meta),
        }
    }

    fn new_surface(&self, plane: &Arc<PlaneShared>) -> HeadlessSurface {
        let ops = OpLog::default();
        let mut surfaces = self.surfaces.lock();
        surfaces.push(SurfaceRecord {
            plane: Arc::downgrade(plane),
            ops: ops.clone(),
        });
        HeadlessSurface {
            id: surfaces.len() - 1,
            ops,
        }
    }
}

impl Transport for HeadlessTransport {
    type Surface = HeadlessSurface;
    type Description = ColorDescription;

    fn create_root_surface(
        &self,
        plane: &Arc<PlaneShared>,
        app_id: &str,
    ) -> anyhow::Result<HeadlessSurface> {
        let surface = self.new_surface(plane);
        debug!("Headless root surface {} for {}", surface.id, app_id);
        Ok(surface)
    }

    fn create_subsurface(
        &self,
        plane: &Arc<PlaneShared>,
        _root: &HeadlessSurface,
        _below: &HeadlessSurface,
    ) -> anyhow::Result<HeadlessSurface> {
        Ok(self.new_surface(plane))
    }

    fn color_support(&self) -> ColorSupport {
        self.color_support
    }

    fn create_description(&self, desc: &ColorDescription) -> Option<ColorDescription> {
        self.color_support.wp.then_some(*desc)
    }

    fn resolve_fb(&self, fb: &FbHandle) -> Option<FbHandle> {
        fb::resolve(fb)
    }

    fn black_fb(&self) -> Option<FbHandle> {
        self.black_fb.lock().clone()
    }

    fn flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn poll(&self) -> bool {
        let events: Vec<_> = self.events.lock().drain(..).collect();
        let dispatched = !events.is_empty();
        for (surface, event) in events {
            let plane = self
                .surfaces
                .lock()
                .get(surface)
                .and_then(|s| s.plane.upgrade());
            match plane {
                Some(plane) => self.dispatch(&plane, event),
                None => debug!("Dropping event for dead surface {}: {:?}", surface, event),
            }
        }
        dispatched
    }

    fn set_cursor_image(&self, image: Option<Arc<CursorImage>>) {
        self.requests.lock().cursor_images.push(image);
    }

    fn set_relative_mouse_mode(&self, _root: &HeadlessSurface, relative: bool) {
        self.requests.lock().relative_mouse.push(relative);
    }

    fn set_selection(&self, kind: SelectionKind, contents: String) {
        self.requests.lock().selections.push((kind, contents));
    }

    fn set_icon(&self, _root: &HeadlessSurface, icon: Option<&Icon>) {
        self.requests.lock().icons.push(icon.cloned());
    }

    fn on_connector_destroyed(&self, key: u64) {
        self.requests.lock().destroyed_connectors.push(key);
    }
}

/// Headless backend state for testing without a host compositor
pub struct HeadlessBackend {
    config: Config,
    output: Arc<OutputState>,
    runtime: Arc<Runtime>,
    transport: Arc<HeadlessTransport>,
    deps: ConnectorDeps,
    focus: Mutex<Weak<Connector<HeadlessTransport>>>,
    /// `init` fails this many times before succeeding.
    pending_init_failures: AtomicU32,
    init_count: AtomicU32,
    post_init_count: AtomicU32,
    destroyed_blobs: Arc<AtomicUsize>,
    imports: AtomicUsize,
}

impl HeadlessBackend {
    pub fn new(config: Config, output: Arc<OutputState>, runtime: Arc<Runtime>) -> Self {
        let deps = ConnectorDeps::standalone(&config, &output);
        Self::with_deps(config, output, runtime, Arc::default(), deps)
    }

    pub fn with_deps(
        config: Config,
        output: Arc<OutputState>,
        runtime: Arc<Runtime>,
        transport: Arc<HeadlessTransport>,
        deps: ConnectorDeps,
    ) -> Self {
        Self {
            config,
            output,
            runtime,
            transport,
            deps,
            focus: Mutex::new(Weak::new()),
            pending_init_failures: AtomicU32::new(0),
            init_count: AtomicU32::new(0),
            post_init_count: AtomicU32::new(0),
            destroyed_blobs: Arc::new(AtomicUsize::new(0)),
            imports: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls to `init` fail, as if the host was not up.
    pub fn fail_init(&self, count: u32) {
        self.pending_init_failures.store(count, Ordering::Relaxed);
    }

    pub fn transport(&self) -> &Arc<HeadlessTransport> {
        &self.transport
    }

    pub fn init_count(&self) -> u32 {
        self.init_count.load(Ordering::Relaxed)
    }

    pub fn post_init_count(&self) -> u32 {
        self.post_init_count.load(Ordering::Relaxed)
    }

    pub fn destroyed_blobs(&self) -> usize {
        self.destroyed_blobs.load(Ordering::Relaxed)
    }

    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::Relaxed)
    }

    fn focus(&self) -> Option<Arc<Connector<HeadlessTransport>>> {
        self.focus.lock().upgrade()
    }
}

impl Backend for HeadlessBackend {
    type Connector = Connector<HeadlessTransport>;

    fn init(&self) -> anyhow::Result<()> {
        let failures = self.pending_init_failures.load(Ordering::Relaxed);
        if failures > 0 {
            self.pending_init_failures.store(failures - 1, Ordering::Relaxed);
            anyhow::bail!("headless host not reachable");
        }
        self.output.configure(&self.config.output)?;
        self.init_count.fetch_add(1, Ordering::Relaxed);
        info!("Headless backend initialized");
        Ok(())
    }

    fn post_init(&self) -> anyhow::Result<()> {
        self.transport.create_black_fb();
        self.post_init_count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn present_layout(&self) -> PresentLayout {
        PresentLayout::General
    }

    fn preferred_output_format(&self) -> OutputFormats {
        OutputFormats {
            primary: fourcc::XBGR2101010,
            overlay: fourcc::XRGB8888,
        }
    }

    fn valid_physical_device(&self) -> bool {
        true
    }

    fn dirty_state(&self, _force: bool, _force_modeset: bool) {}

    fn poll_state(&self) -> bool {
        self.transport.poll();
        let runtime_repaint = self.runtime.take_repaint_request();
        let connector_repaint = self.focus().is_some_and(|c| c.shared().take_repaint());
        runtime_repaint || connector_repaint
    }

    fn create_backend_blob(&self, data: BlobData) -> Arc<BackendBlob> {
        let destroyed = self.destroyed_blobs.clone();
        Arc::new(BackendBlob::with_destroy_hook(data, move |_| {
            destroyed.fetch_add(1, Ordering::Relaxed);
        }))
    }

    fn import_dmabuf(&self, attrs: &DmabufAttributes) -> Option<FbHandle> {
        self.imports.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Headless import {}x{} format {:#x}",
            attrs.width, attrs.height, attrs.format
        );
        Some(HeadlessFb::new_handle())
    }

    fn uses_modifiers(&self) -> bool {
        self.config.wayland.use_modifiers
    }

    fn supported_modifiers(&self, _format: u32) -> Vec<u64> {
        vec![fourcc::MOD_LINEAR]
    }

    fn current_connector(&self) -> Option<Arc<Self::Connector>> {
        self.focus()
    }

    fn connector(&self, screen_type: ScreenType) -> Option<Arc<Self::Connector>> {
        match screen_type {
            ScreenType::Internal => self.focus(),
            ScreenType::External => None,
        }
    }

    fn supports_plane_hardware_cursor(&self) -> bool {
        false
    }

    fn supports_tearing(&self) -> bool {
        false
    }

    fn uses_vulkan_swapchain(&self) -> bool {
        false
    }

    fn is_session_based(&self) -> bool {
        false
    }

    fn supports_explicit_sync(&self) -> bool {
        true
    }

    fn is_paused(&self) -> bool {
        false
    }

    fn is_visible(&self) -> bool {
        true
    }

    fn cursor_surface_size(&self, size: (u32, u32)) -> (u32, u32) {
        size
    }

    fn set_dynamic_refresh(&self, _refresh_mhz: i32) -> bool {
        false
    }

    fn hack_update_patched_edid(&self) {
        if let Some(connector) = self.focus() {
            connector.write_patched_edid();
        }
    }

    fn needs_frame_sync(&self) -> bool {
        false
    }

    fn touch_click_mode(&self) -> TouchClickMode {
        TouchClickMode::Passthrough
    }

    fn dump_debug_info(&self) {
        info!(
            "Headless backend: {} surfaces, {} imports, {} flushes",
            self.transport.surface_count(),
            self.import_count(),
            self.transport.flush_count()
        );
    }

    fn uses_virtual_connectors(&self) -> bool {
        true
    }

    fn create_virtual_connector(&self, key: u64) -> Option<Arc<Self::Connector>> {
        let shared = Arc::new(ConnectorShared::new(
            key,
            &self.config,
            self.output.clone(),
            self.runtime.clone(),
            self.deps.vblank.clone(),
        ));
        let connector = Connector::new(
            shared,
            self.transport.clone(),
            self.deps.renderer.clone(),
            self.deps.edid_writer.clone(),
            &self.config,
        );
        match connector {
            Ok(connector) => {
                let connector = Arc::new(connector);
                *self.focus.lock() = Arc::downgrade(&connector);
                Some(connector)
            }
            Err(err) => {
                tracing::error!("Failed to create headless connector {}: {:?}", key, err);
                None
            }
        }
    }

    fn notify_physical_input(&self, _kind: InputType) {}

    fn supports_vr_overlay_forwarding(&self) -> bool {
        false
    }

    fn should_fit_windows(&self) -> bool {
        true
    }
}
