//! Wayland backend: present into a window on a host compositor.
//!
//! Each connector is an xdg toplevel with seven subsurfaces stacked above it.
//! Application buffers are imported as `linux-dmabuf` buffers and attached
//! directly. Presentation timing, preferred scale and preferred color come
//! back as host events, dispatched on the presentation thread by
//! [`WaylandTransport::poll`]. Input is read by a separate thread on its own
//! event queue (see [`input_thread`]).
//!
//! # Design Invariants
//!
//! 1. **One main queue**: every surface, buffer and window object lives on
//!    the main event queue, guarded by one mutex. The input thread only
//!    owns its seat, pointer, keyboard and relative pointer.
//!
//! 2. **Lock order**: connector planes before the transport mutex. Event
//!    handlers never call back into a connector's planes.
//!
//! 3. **Conservative before init**: capability queries made before `init`
//!    succeeded answer as if no host features were available.

mod frog;
mod input_thread;
mod shm;
mod state;
mod surface;

use std::collections::HashMap;
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::sync::{Arc, OnceLock, Weak};

use anyhow::Context;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use wayland_client::backend::WaylandError;
use wayland_client::globals::registry_queue_init;
use wayland_client::{Connection, EventQueue, QueueHandle};
use wayland_protocols::wp::color_management::v1::client::wp_color_manager_v1;
use wayland_protocols::wp::linux_dmabuf::zv1::client::zwp_linux_buffer_params_v1;
use wayland_protocols::wp::pointer_constraints::zv1::client::zwp_pointer_constraints_v1;
use wayland_protocols::xdg::decoration::zv1::client::zxdg_toplevel_decoration_v1;

pub use state::{cursor_choice, ColorManagerFeatures, CursorChoice};
pub use surface::{WaylandDescription, WaylandFb, WaylandSurface};

use self::input_thread::InputThread;
use self::state::{request_preferred_description, CursorSurface, Globals, WaylandState};
use self::surface::{BufferData, ToplevelData, Window};
use super::blob::{BackendBlob, BlobData};
use super::connector::{Connector, ConnectorDeps, ConnectorShared, DEFAULT_TITLE};
use super::fb::{self, DmabufAttributes, FbHandle, FbRefs};
use super::plane::PlaneShared;
use super::transport::{ColorSupport, Icon, SelectionKind, Transport, TEXT_MIME_TYPES};
use super::{fourcc, Backend, InputType, OutputFormats, PresentLayout, ScreenType, TouchClickMode};
use crate::color::{ColorDescription, NamedPrimaries, PrimariesSpec};
use crate::config::{Config, OutputState, Runtime};
use crate::cursor::CursorImage;
use crate::input::{InputLock, InputTranslator};
use crate::tracy_span;

/// 8-bit output formats, most preferred first.
const FORMATS_8BIT: [u32; 4] = [
    fourcc::XRGB8888,
    fourcc::XBGR8888,
    fourcc::ARGB8888,
    fourcc::ABGR8888,
];

const FORMATS_10BIT: [u32; 4] = [
    fourcc::XBGR2101010,
    fourcc::XRGB2101010,
    fourcc::ABGR2101010,
    fourcc::ARGB2101010,
];

/// Pick output formats from the formats the host can import. The primary
/// plane prefers 10-bit, overlays always use 8-bit.
pub fn pick_output_formats(supported: &HashMap<u32, Vec<u64>>) -> OutputFormats {
    let first = |list: &[u32]| list.iter().copied().find(|f| supported.contains_key(f));
    let overlay = first(&FORMATS_8BIT).unwrap_or(fourcc::XRGB8888);
    OutputFormats {
        primary: first(&FORMATS_10BIT).unwrap_or(overlay),
        overlay,
    }
}

/// Non-blocking readability check, retried on EINTR and EAGAIN.
fn is_readable(fd: BorrowedFd<'_>) -> bool {
    let mut pollfd = libc::pollfd {
        fd: fd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        let ret = unsafe { libc::poll(&mut pollfd, 1, 0) };
        if ret >= 0 {
            return ret > 0 && pollfd.revents & libc::POLLIN != 0;
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINTR) | Some(libc::EAGAIN) => continue,
            _ => {
                warn!("Polling the host connection failed: {}", err);
                return false;
            }
        }
    }
}

struct Inner {
    queue: EventQueue<WaylandState>,
    state: WaylandState,
}

impl Inner {
    fn roundtrip(&mut self) -> anyhow::Result<()> {
        self.queue
            .roundtrip(&mut self.state)
            .context("host roundtrip failed")?;
        Ok(())
    }
}

/// Connection to the host compositor shared by every connector.
pub struct WaylandTransport {
    conn: Connection,
    qh: QueueHandle<WaylandState>,
    globals: Arc<Globals>,
    color_support: ColorSupport,
    /// Formats the host imports, with their modifiers.
    format_modifiers: HashMap<u32, Vec<u64>>,
    can_use_modifiers: bool,
    inner: Mutex<Inner>,
    black_fb: Mutex<Option<FbHandle>>,
    input: InputThread,
}

impl WaylandTransport {
    pub fn connect(config: &Config, runtime: Arc<Runtime>, sink: InputLock) -> anyhow::Result<Self> {
        let conn = Connection::connect_to_env().context("failed to connect to the host compositor")?;
        let (list, queue) =
            registry_queue_init::<WaylandState>(&conn).context("failed to list host globals")?;
        let qh = queue.handle();
        let globals = Arc::new(Globals::bind(&list, &qh)?);

        let state = WaylandState::new(
            globals.clone(),
            config.input.mouse_warp_without_keyboard_focus,
        );
        let mut inner = Inner { queue, state };
        // Modifiers, color manager features and output modes.
        inner.roundtrip()?;

        let wp = globals.color_manager.is_some()
            && inner.state.color_features.supports_hdr_descriptions();
        let color_support = ColorSupport {
            wp,
            frog: !wp && globals.frog.is_some(),
        };
        let format_modifiers = inner.state.format_modifiers.clone();
        let can_use_modifiers = inner.state.can_use_modifiers;

        let translator = InputTranslator::new(sink, runtime, config.input.clone());
        let input = InputThread::spawn(&conn, translator)?;

        info!(
            "Connected to host compositor: {} formats, modifiers {}, color management {}, frog {}",
            format_modifiers.len(),
            can_use_modifiers,
            color_support.wp,
            color_support.frog
        );

        Ok(Self {
            conn,
            qh,
            globals,
            color_support,
            format_modifiers,
            can_use_modifiers,
            inner: Mutex::new(inner),
            black_fb: Mutex::new(None),
            input,
        })
    }

    /// Create the 1x1 opaque black backing buffer.
    pub fn create_black_fb(&self) -> anyhow::Result<()> {
        let refs = Arc::new(FbRefs::default());
        let data = BufferData { refs: refs.clone() };
        let buffer = match &self.globals.single_pixel {
            Some(manager) => manager.create_u32_rgba_buffer(0, 0, 0, u32::MAX, &self.qh, data),
            None => shm::create_argb_buffer(
                &self.globals.shm,
                &self.qh,
                1,
                1,
                &0xff00_0000u32.to_le_bytes(),
                data,
            )?,
        };
        *self.black_fb.lock() = Some(Arc::new(WaylandFb::new(buffer, refs)));
        Ok(())
    }

    /// Host pointer image used while nested clients can't see the pointer.
    pub fn create_default_cursor(&self) -> anyhow::Result<()> {
        let cursor = CursorSurface::new(
            &CursorImage::fallback(),
            &self.globals.shm,
            &self.globals.compositor,
            &self.qh,
        )?;
        let mut inner = self.inner.lock();
        inner.state.default_cursor = Some(cursor);
        inner.state.update_cursor();
        Ok(())
    }

    pub fn import_dmabuf(&self, attrs: &DmabufAttributes) -> Option<FbHandle> {
        if attrs.planes.is_empty() {
            error!(
                "Refusing to import {}x{} dmabuf without planes",
                attrs.width, attrs.height
            );
            return None;
        }

        let params = self.globals.dmabuf.create_params(&self.qh, ());
        let modifier_hi = (attrs.modifier >> 32) as u32;
        let modifier_lo = (attrs.modifier & 0xffff_ffff) as u32;
        for (index, plane) in attrs.planes.iter().enumerate() {
            params.add(
                plane.fd.as_fd(),
                index as u32,
                plane.offset,
                plane.stride,
                modifier_hi,
                modifier_lo,
            );
        }

        let refs = Arc::new(FbRefs::default());
        let buffer = params.create_immed(
            attrs.width,
            attrs.height,
            attrs.format,
            zwp_linux_buffer_params_v1::Flags::empty(),
            &self.qh,
            BufferData { refs: refs.clone() },
        );
        params.destroy();
        debug!(
            "Imported {}x{} dmabuf, format {:#x} modifier {:#x}",
            attrs.width, attrs.height, attrs.format, attrs.modifier
        );
        Some(Arc::new(WaylandFb::new(buffer, refs)))
    }

    pub fn uses_modifiers(&self) -> bool {
        self.can_use_modifiers
    }

    pub fn supported_modifiers(&self, format: u32) -> Vec<u64> {
        self.format_modifiers.get(&format).cloned().unwrap_or_default()
    }

    pub fn output_formats(&self) -> OutputFormats {
        pick_output_formats(&self.format_modifiers)
    }

    fn new_surface(&self, plane: &Arc<PlaneShared>) -> WaylandSurface {
        let surface = self.globals.compositor.create_surface(&self.qh, plane.clone());
        let viewport = self.globals.viewporter.get_viewport(&surface, &self.qh, ());
        let color = self
            .globals
            .color_manager
            .as_ref()
            .map(|manager| manager.get_surface(&surface, &self.qh, ()));
        let frog = self
            .globals
            .frog
            .as_ref()
            .filter(|_| self.color_support.frog)
            .map(|factory| {
                let listener = plane.is_root().then(|| plane.connector().clone());
                factory.get_color_managed_surface(&surface, &self.qh, listener)
            });
        WaylandSurface {
            plane: plane.clone(),
            surface,
            viewport,
            subsurface: None,
            fractional_scale: None,
            color,
            color_feedback: None,
            frog,
            window: None,
            globals: self.globals.clone(),
            qh: self.qh.clone(),
        }
    }
}

impl Transport for WaylandTransport {
    type Surface = WaylandSurface;
    type Description = WaylandDescription;

    fn create_root_surface(
        &self,
        plane: &Arc<PlaneShared>,
        app_id: &str,
    ) -> anyhow::Result<WaylandSurface> {
        let connector = plane.connector().clone();
        let mut root = self.new_surface(plane);

        root.fractional_scale = self
            .globals
            .fractional_scale
            .as_ref()
            .map(|manager| manager.get_fractional_scale(&root.surface, &self.qh, plane.clone()));

        let data = Arc::new(ToplevelData {
            connector: connector.clone(),
            pending: Mutex::default(),
        });
        let xdg_surface = self
            .globals
            .xdg_wm_base
            .get_xdg_surface(&root.surface, &self.qh, data.clone());
        let toplevel = xdg_surface.get_toplevel(&self.qh, data);
        toplevel.set_title(DEFAULT_TITLE.to_string());
        toplevel.set_app_id(app_id.to_string());
        let decoration = self.globals.decoration.as_ref().map(|manager| {
            let decoration = manager.get_toplevel_decoration(&toplevel, &self.qh, ());
            decoration.set_mode(zxdg_toplevel_decoration_v1::Mode::ServerSide);
            decoration
        });
        root.window = Some(Window {
            xdg_surface,
            toplevel,
            decoration,
        });

        if let Some(manager) = &self.globals.color_manager {
            let feedback = manager.get_surface_feedback(&root.surface, &self.qh, connector.clone());
            request_preferred_description(&feedback, &connector, &self.qh);
            root.color_feedback = Some(feedback);
        }

        root.surface.commit();
        // Initial configure and preferred description.
        self.inner.lock().roundtrip()?;
        debug!("Created root surface for connector {}", connector.key());
        Ok(root)
    }

    fn create_subsurface(
        &self,
        plane: &Arc<PlaneShared>,
        root: &WaylandSurface,
        below: &WaylandSurface,
    ) -> anyhow::Result<WaylandSurface> {
        let mut overlay = self.new_surface(plane);
        let subsurface =
            self.globals
                .subcompositor
                .get_subsurface(&overlay.surface, &root.surface, &self.qh, ());
        subsurface.place_above(&below.surface);
        subsurface.set_sync();
        overlay.subsurface = Some(subsurface);
        Ok(overlay)
    }

    fn color_support(&self) -> ColorSupport {
        self.color_support
    }

    fn create_description(&self, desc: &ColorDescription) -> Option<WaylandDescription> {
        use wp_color_manager_v1::{Primaries, TransferFunction};

        if !self.color_support.wp {
            return None;
        }
        let manager = self.globals.color_manager.as_ref()?;
        let description = match desc {
            ColorDescription::WindowsScrgb => manager.create_windows_scrgb(&self.qh, ()),
            ColorDescription::Hdr10 {
                primaries,
                mastering,
            } => {
                let creator = manager.create_parametric_creator(&self.qh, ());
                match primaries {
                    PrimariesSpec::Named(NamedPrimaries::Srgb) => {
                        creator.set_primaries_named(Primaries::Srgb)
                    }
                    PrimariesSpec::Named(NamedPrimaries::Bt2020) => {
                        creator.set_primaries_named(Primaries::Bt2020)
                    }
                    PrimariesSpec::Custom(p) => {
                        creator.set_primaries(p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7])
                    }
                }
                creator.set_tf_named(TransferFunction::St2084Pq);
                if let Some(m) = mastering {
                    let p = m.primaries;
                    creator.set_mastering_display_primaries(
                        p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7],
                    );
                    creator.set_mastering_luminance(m.min_luminance, m.max_luminance);
                    creator.set_max_cll(m.max_cll);
                    creator.set_max_fall(m.max_fall);
                }
                creator.create(&self.qh, ())
            }
        };
        Some(WaylandDescription::new(description))
    }

    fn resolve_fb(&self, fb: &FbHandle) -> Option<FbHandle> {
        fb::resolve(fb).filter(|fb| fb.as_any().is::<WaylandFb>())
    }

    fn black_fb(&self) -> Option<FbHandle> {
        self.black_fb.lock().clone()
    }

    fn flush(&self) {
        match self.conn.flush() {
            Ok(()) => {}
            Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) => warn!("Failed to flush host connection: {}", err),
        }
    }

    fn poll(&self) -> bool {
        let mut inner = self.inner.lock();
        let Inner { queue, state } = &mut *inner;

        self.flush();
        if let Some(guard) = queue.prepare_read() {
            if is_readable(guard.connection_fd()) {
                match guard.read() {
                    Ok(_) => {}
                    Err(WaylandError::Io(err)) if err.kind() == io::ErrorKind::WouldBlock => {}
                    Err(err) => error!("Failed to read host events: {}", err),
                }
            }
        }

        match queue.dispatch_pending(state) {
            Ok(dispatched) => dispatched > 0,
            Err(err) => {
                error!("Failed to dispatch host events: {}", err);
                false
            }
        }
    }

    fn set_cursor_image(&self, image: Option<Arc<CursorImage>>) {
        let cursor = image.and_then(|image| {
            CursorSurface::new(&image, &self.globals.shm, &self.globals.compositor, &self.qh)
                .map_err(|err| warn!("Failed to create cursor surface: {:?}", err))
                .ok()
        });
        let mut inner = self.inner.lock();
        inner.state.app_cursor = cursor;
        inner.state.update_cursor();
        drop(inner);
        self.flush();
    }

    fn set_relative_mouse_mode(&self, root: &WaylandSurface, relative: bool) {
        let mut inner = self.inner.lock();
        let seat = &mut inner.state.seat;
        let Some(pointer) = seat.pointer.clone() else {
            return;
        };
        let same_surface = seat.locked_surface.as_ref() == Some(root.wl_surface());
        if relative == seat.locked.is_some() && (!relative || same_surface) {
            return;
        }

        if let Some(locked) = seat.locked.take() {
            locked.destroy();
        }
        seat.locked_surface = None;
        if relative {
            seat.locked = Some(self.globals.pointer_constraints.lock_pointer(
                root.wl_surface(),
                &pointer,
                None,
                zwp_pointer_constraints_v1::Lifetime::Persistent,
                &self.qh,
                (),
            ));
            seat.locked_surface = Some(root.wl_surface().clone());
        }
        debug!("Relative mouse mode {}", relative);

        self.input.set_relative(relative);
        inner.state.update_cursor();
        drop(inner);
        self.flush();
    }

    fn set_selection(&self, kind: SelectionKind, contents: String) {
        let Some(seat) = &self.globals.seat else {
            return;
        };
        let mut inner = self.inner.lock();
        let main = &mut inner.state.seat;
        match kind {
            SelectionKind::Clipboard => {
                let Some(manager) = &self.globals.data_device_manager else {
                    return;
                };
                let serial = main.keyboard_serial;
                let device = main
                    .data_device
                    .get_or_insert_with(|| manager.get_data_device(seat, &self.qh, ()));
                let source = manager.create_data_source(&self.qh, contents);
                for mime in TEXT_MIME_TYPES {
                    source.offer(mime.to_string());
                }
                device.set_selection(Some(&source), serial);
            }
            SelectionKind::Primary => {
                let Some(manager) = &self.globals.primary_selection else {
                    return;
                };
                let serial = main.pointer_serial;
                let device = main
                    .primary_device
                    .get_or_insert_with(|| manager.get_device(seat, &self.qh, ()));
                let source = manager.create_source(&self.qh, contents);
                for mime in TEXT_MIME_TYPES {
                    source.offer(mime.to_string());
                }
                device.set_selection(Some(&source), serial);
            }
        }
        drop(inner);
        self.flush();
    }

    fn set_icon(&self, root: &WaylandSurface, icon: Option<&Icon>) {
        let (Some(manager), Some(toplevel)) = (&self.globals.icon_manager, root.toplevel()) else {
            return;
        };
        match icon.filter(|icon| icon.width > 0 && icon.height > 0) {
            None => manager.set_icon(toplevel, None),
            Some(icon) => {
                let bytes: Vec<u8> = icon.pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
                let buffer = shm::create_argb_buffer(
                    &self.globals.shm,
                    &self.qh,
                    icon.width,
                    icon.height,
                    &bytes,
                    (),
                );
                match buffer {
                    Ok(buffer) => {
                        let xdg_icon = manager.create_icon(&self.qh, ());
                        xdg_icon.add_buffer(&buffer, 1);
                        manager.set_icon(toplevel, Some(&xdg_icon));
                        xdg_icon.destroy();
                        buffer.destroy();
                    }
                    Err(err) => warn!("Failed to create window icon: {:?}", err),
                }
            }
        }
        self.flush();
    }

    fn on_connector_destroyed(&self, key: u64) {
        let mut inner = self.inner.lock();
        let seat = &mut inner.state.seat;
        if let Some(locked) = seat.locked.take() {
            locked.destroy();
            seat.locked_surface = None;
            self.input.set_relative(false);
        }
        debug!("Connector {} destroyed", key);
    }
}

/// Presentation target backed by a window on a host compositor.
pub struct WaylandBackend {
    config: Config,
    output: Arc<OutputState>,
    runtime: Arc<Runtime>,
    deps: ConnectorDeps,
    sink: InputLock,
    transport: OnceLock<Arc<WaylandTransport>>,
    focus: Mutex<Weak<Connector<WaylandTransport>>>,
}

impl WaylandBackend {
    pub fn new(
        config: Config,
        output: Arc<OutputState>,
        runtime: Arc<Runtime>,
        sink: InputLock,
    ) -> Self {
        let deps = ConnectorDeps::standalone(&config, &output);
        Self::with_deps(config, output, runtime, sink, deps)
    }

    pub fn with_deps(
        config: Config,
        output: Arc<OutputState>,
        runtime: Arc<Runtime>,
        sink: InputLock,
        deps: ConnectorDeps,
    ) -> Self {
        Self {
            config,
            output,
            runtime,
            deps,
            sink,
            transport: OnceLock::new(),
            focus: Mutex::new(Weak::new()),
        }
    }

    fn transport(&self) -> Option<&Arc<WaylandTransport>> {
        self.transport.get()
    }

    fn focus(&self) -> Option<Arc<Connector<WaylandTransport>>> {
        self.focus.lock().upgrade()
    }
}

impl Backend for WaylandBackend {
    type Connector = Connector<WaylandTransport>;

    fn init(&self) -> anyhow::Result<()> {
        if self.transport.get().is_some() {
            return Ok(());
        }
        self.output.configure(&self.config.output)?;
        let transport =
            WaylandTransport::connect(&self.config, self.runtime.clone(), self.sink.clone())?;
        if self.transport.set(Arc::new(transport)).is_err() {
            debug!("Wayland backend initialized concurrently");
        }
        info!("Wayland backend initialized");
        Ok(())
    }

    fn post_init(&self) -> anyhow::Result<()> {
        let transport = self
            .transport()
            .context("post_init before the host connection was up")?;
        transport.create_black_fb()?;
        transport.create_default_cursor()?;
        transport.flush();
        Ok(())
    }

    fn instance_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn device_extensions(&self) -> &'static [&'static str] {
        &[]
    }

    fn present_layout(&self) -> PresentLayout {
        PresentLayout::General
    }

    fn preferred_output_format(&self) -> OutputFormats {
        match self.transport() {
            Some(transport) => transport.output_formats(),
            None => pick_output_formats(&HashMap::new()),
        }
    }

    fn valid_physical_device(&self) -> bool {
        true
    }

    fn dirty_state(&self, _force: bool, _force_modeset: bool) {}

    fn poll_state(&self) -> bool {
        tracy_span!("WaylandBackend::poll_state");

        if let Some(transport) = self.transport() {
            transport.poll();
        }
        let runtime_repaint = self.runtime.take_repaint_request();
        let connector_repaint = self.focus().is_some_and(|c| c.shared().take_repaint());
        runtime_repaint || connector_repaint
    }

    fn create_backend_blob(&self, data: BlobData) -> Arc<BackendBlob> {
        Arc::new(BackendBlob::new(data))
    }

    fn import_dmabuf(&self, attrs: &DmabufAttributes) -> Option<FbHandle> {
        self.transport()?.import_dmabuf(attrs)
    }

    fn uses_modifiers(&self) -> bool {
        self.config.wayland.use_modifiers && self.transport().is_some_and(|t| t.uses_modifiers())
    }

    fn supported_modifiers(&self, format: u32) -> Vec<u64> {
        self.transport()
            .map(|t| t.supported_modifiers(format))
            .unwrap_or_default()
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
        match self.transport() {
            Some(transport) => info!(
                "Wayland backend: {} host formats, modifiers {}, color management {}",
                transport.format_modifiers.len(),
                transport.can_use_modifiers,
                transport.color_support.wp
            ),
            None => info!("Wayland backend: not connected"),
        }
    }

    fn uses_virtual_connectors(&self) -> bool {
        true
    }

    fn create_virtual_connector(&self, key: u64) -> Option<Arc<Self::Connector>> {
        let Some(transport) = self.transport() else {
            error!("Virtual connector {} requested before the host connection", key);
            return None;
        };
        let shared = Arc::new(ConnectorShared::new(
            key,
            &self.config,
            self.output.clone(),
            self.runtime.clone(),
            self.deps.vblank.clone(),
        ));
        let connector = Connector::new(
            shared,
            transport.clone(),
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
                error!("Failed to create Wayland connector {}: {:?}", key, err);
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
