//! Main-queue state of the Wayland transport and its event handlers.
//!
//! Events for plane surfaces are routed through the user data attached when
//! the objects were created: surfaces, presentation feedback and fractional
//! scale objects carry their [`PlaneShared`], the toplevel objects carry the
//! connector. Handlers only call the listener traits.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, trace, warn};
use wayland_client::globals::{GlobalList, GlobalListContents};
use wayland_client::protocol::{
    wl_buffer::{self, WlBuffer},
    wl_compositor::WlCompositor,
    wl_data_device::{self, WlDataDevice},
    wl_data_device_manager::WlDataDeviceManager,
    wl_data_offer::WlDataOffer,
    wl_data_source::{self, WlDataSource},
    wl_keyboard::{self, WlKeyboard},
    wl_output::{self, WlOutput},
    wl_pointer::{self, WlPointer},
    wl_region::WlRegion,
    wl_registry::{self, WlRegistry},
    wl_seat::{self, WlSeat},
    wl_shm::WlShm,
    wl_shm_pool::WlShmPool,
    wl_subcompositor::WlSubcompositor,
    wl_subsurface::WlSubsurface,
    wl_surface::{self, WlSurface},
};
use wayland_client::{
    delegate_noop, event_created_child, Connection, Dispatch, Proxy, QueueHandle, WEnum,
};
use wayland_protocols::wp::color_management::v1::client::{
    wp_color_management_surface_feedback_v1::{self, WpColorManagementSurfaceFeedbackV1},
    wp_color_management_surface_v1::WpColorManagementSurfaceV1,
    wp_color_manager_v1::{self, WpColorManagerV1},
    wp_image_description_creator_params_v1::WpImageDescriptionCreatorParamsV1,
    wp_image_description_info_v1::{self, WpImageDescriptionInfoV1},
    wp_image_description_v1::{self, WpImageDescriptionV1},
};
use wayland_protocols::wp::fractional_scale::v1::client::{
    wp_fractional_scale_manager_v1::WpFractionalScaleManagerV1,
    wp_fractional_scale_v1::{self, WpFractionalScaleV1},
};
use wayland_protocols::wp::linux_dmabuf::zv1::client::{
    zwp_linux_buffer_params_v1::ZwpLinuxBufferParamsV1,
    zwp_linux_dmabuf_v1::{self, ZwpLinuxDmabufV1},
};
use wayland_protocols::wp::pointer_constraints::zv1::client::{
    zwp_locked_pointer_v1::ZwpLockedPointerV1, zwp_pointer_constraints_v1::ZwpPointerConstraintsV1,
};
use wayland_protocols::wp::presentation_time::client::{
    wp_presentation::WpPresentation,
    wp_presentation_feedback::{self, WpPresentationFeedback},
};
use wayland_protocols::wp::primary_selection::zv1::client::{
    zwp_primary_selection_device_manager_v1::ZwpPrimarySelectionDeviceManagerV1,
    zwp_primary_selection_device_v1::{self, ZwpPrimarySelectionDeviceV1},
    zwp_primary_selection_offer_v1::ZwpPrimarySelectionOfferV1,
    zwp_primary_selection_source_v1::{self, ZwpPrimarySelectionSourceV1},
};
use wayland_protocols::wp::relative_pointer::zv1::client::zwp_relative_pointer_manager_v1::ZwpRelativePointerManagerV1;
use wayland_protocols::wp::single_pixel_buffer::v1::client::wp_single_pixel_buffer_manager_v1::WpSinglePixelBufferManagerV1;
use wayland_protocols::wp::viewporter::client::{wp_viewport::WpViewport, wp_viewporter::WpViewporter};
use wayland_protocols::xdg::decoration::zv1::client::{
    zxdg_decoration_manager_v1::ZxdgDecorationManagerV1,
    zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1,
};
use wayland_protocols::xdg::shell::client::{
    xdg_surface::{self, XdgSurface},
    xdg_toplevel::{self, XdgToplevel},
    xdg_wm_base::{self, XdgWmBase},
};
use wayland_protocols::xdg::toplevel_icon::v1::client::{
    xdg_toplevel_icon_manager_v1::XdgToplevelIconManagerV1, xdg_toplevel_icon_v1::XdgToplevelIconV1,
};

use super::frog::{
    self, frog_color_managed_surface::{self, FrogColorManagedSurface},
    frog_color_management_factory_v1::FrogColorManagementFactoryV1,
};
use super::shm;
use super::surface::{BufferData, PreferredInfo, ToplevelData};
use crate::backend::connector::ConnectorShared;
use crate::backend::fb;
use crate::backend::fourcc;
use crate::backend::plane::PlaneShared;
use crate::backend::transport::{SurfaceListener, WindowListener};
use crate::cursor::CursorImage;

/// Host globals, bound once at connect.
pub struct Globals {
    pub compositor: WlCompositor,
    pub subcompositor: WlSubcompositor,
    pub xdg_wm_base: XdgWmBase,
    pub dmabuf: ZwpLinuxDmabufV1,
    pub viewporter: WpViewporter,
    pub presentation: WpPresentation,
    pub relative_pointer_manager: ZwpRelativePointerManagerV1,
    pub pointer_constraints: ZwpPointerConstraintsV1,
    pub shm: WlShm,
    pub single_pixel: Option<WpSinglePixelBufferManagerV1>,
    pub seat: Option<WlSeat>,
    pub color_manager: Option<WpColorManagerV1>,
    pub frog: Option<FrogColorManagementFactoryV1>,
    pub fractional_scale: Option<WpFractionalScaleManagerV1>,
    pub decoration: Option<ZxdgDecorationManagerV1>,
    pub icon_manager: Option<XdgToplevelIconManagerV1>,
    pub data_device_manager: Option<WlDataDeviceManager>,
    pub primary_selection: Option<ZwpPrimarySelectionDeviceManagerV1>,
}

impl Globals {
    /// Bind everything we use. Missing mandatory globals fail the connect.
    pub fn bind(list: &GlobalList, qh: &QueueHandle<WaylandState>) -> anyhow::Result<Self> {
        let globals = Self {
            compositor: list.bind(qh, 4..=4, ()).context("wl_compositor v4 missing")?,
            subcompositor: list.bind(qh, 1..=1, ()).context("wl_subcompositor missing")?,
            xdg_wm_base: list.bind(qh, 1..=1, ()).context("xdg_wm_base missing")?,
            dmabuf: list.bind(qh, 3..=3, ()).context("zwp_linux_dmabuf_v1 v3 missing")?,
            viewporter: list.bind(qh, 1..=1, ()).context("wp_viewporter missing")?,
            presentation: list.bind(qh, 1..=1, ()).context("wp_presentation missing")?,
            relative_pointer_manager: list
                .bind(qh, 1..=1, ())
                .context("zwp_relative_pointer_manager_v1 missing")?,
            pointer_constraints: list
                .bind(qh, 1..=1, ())
                .context("zwp_pointer_constraints_v1 missing")?,
            shm: list.bind(qh, 1..=1, ()).context("wl_shm missing")?,
            single_pixel: list.bind(qh, 1..=1, ()).ok(),
            seat: list.bind(qh, 8..=8, ()).ok(),
            color_manager: list.bind(qh, 1..=1, ()).ok(),
            frog: list.bind(qh, 1..=1, ()).ok(),
            fractional_scale: list.bind(qh, 1..=1, ()).ok(),
            decoration: list.bind(qh, 1..=1, ()).ok(),
            icon_manager: list.bind(qh, 1..=1, ()).ok(),
            data_device_manager: list.bind(qh, 3..=3, ()).ok(),
            primary_selection: list.bind(qh, 1..=1, ()).ok(),
        };

        let outputs = list.contents().with_list(|globals| {
            globals
                .iter()
                .filter(|g| g.interface == WlOutput::interface().name)
                .map(|g| (g.name, g.version))
                .collect::<Vec<_>>()
        });
        for (name, version) in outputs {
            list.registry()
                .bind::<WlOutput, _, _>(name, version.min(4), qh, ());
        }

        Ok(globals)
    }
}

/// Feature set advertised by the host color manager.
#[derive(Debug, Default)]
pub struct ColorManagerFeatures {
    pub features: Vec<wp_color_manager_v1::Feature>,
    pub transfer_functions: Vec<wp_color_manager_v1::TransferFunction>,
    pub primaries: Vec<wp_color_manager_v1::Primaries>,
}

impl ColorManagerFeatures {
    /// Everything needed to describe HDR10 and sRGB content.
    pub fn supports_hdr_descriptions(&self) -> bool {
        use wp_color_manager_v1::{Feature, Primaries, TransferFunction};

        let features = [
            Feature::Parametric,
            Feature::SetPrimaries,
            Feature::SetMasteringDisplayPrimaries,
            Feature::ExtendedTargetVolume,
            Feature::SetLuminances,
        ];
        features.iter().all(|f| self.features.contains(f))
            && [TransferFunction::Srgb, TransferFunction::St2084Pq]
                .iter()
                .all(|tf| self.transfer_functions.contains(tf))
            && [Primaries::Srgb, Primaries::Bt2020]
                .iter()
                .all(|p| self.primaries.contains(p))
    }
}

/// Which cursor the host pointer shows over our surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorChoice {
    /// The fallback arrow, while nested clients can't see the pointer.
    Host,
    /// The application's cursor image.
    App,
    Hide,
}

pub fn cursor_choice(
    mouse_warp_without_keyboard_focus: bool,
    locked: bool,
    keyboard_entered: bool,
    has_default: bool,
    has_app: bool,
) -> CursorChoice {
    let use_host = if mouse_warp_without_keyboard_focus {
        locked && !keyboard_entered && has_default
    } else {
        !keyboard_entered && has_default
    };

    if use_host {
        CursorChoice::Host
    } else if locked || !has_app {
        CursorChoice::Hide
    } else {
        CursorChoice::App
    }
}

/// A committed cursor surface with its hotspot. The buffer stays attached
/// until the surface is replaced.
pub struct CursorSurface {
    surface: WlSurface,
    buffer: WlBuffer,
    hotspot: (u32, u32),
}

impl CursorSurface {
    pub fn new(
        image: &CursorImage,
        shm: &WlShm,
        compositor: &WlCompositor,
        qh: &QueueHandle<WaylandState>,
    ) -> anyhow::Result<Self> {
        let buffer =
            shm::create_argb_buffer(shm, qh, image.width, image.height, &image.to_bytes(), ())?;
        let surface = compositor.create_surface(qh, ());
        surface.attach(Some(&buffer), 0, 0);
        surface.damage_buffer(0, 0, i32::MAX, i32::MAX);
        surface.commit();
        Ok(Self {
            surface,
            buffer,
            hotspot: image.hotspot,
        })
    }
}

impl Drop for CursorSurface {
    fn drop(&mut self) {
        self.surface.destroy();
        self.buffer.destroy();
    }
}

/// Seat objects of the presentation thread: cursor, pointer lock and
/// selections. Input events are read by the input thread on its own seat.
#[derive(Default)]
pub struct MainSeat {
    pub pointer: Option<WlPointer>,
    pub keyboard: Option<WlKeyboard>,
    pub pointer_serial: u32,
    pub keyboard_serial: u32,
    pub pointer_entered: bool,
    pub keyboard_entered: bool,
    pub locked: Option<ZwpLockedPointerV1>,
    pub locked_surface: Option<WlSurface>,
    pub data_device: Option<WlDataDevice>,
    pub primary_device: Option<ZwpPrimarySelectionDeviceV1>,
}

pub struct WaylandState {
    pub globals: Arc<Globals>,
    /// Refresh rate in mHz by output protocol id.
    pub outputs: HashMap<u32, i32>,
    pub color_features: ColorManagerFeatures,
    pub format_modifiers: HashMap<u32, Vec<u64>>,
    pub can_use_modifiers: bool,
    pub seat: MainSeat,
    pub default_cursor: Option<CursorSurface>,
    pub app_cursor: Option<CursorSurface>,
    pub mouse_warp_without_keyboard_focus: bool,
}

impl WaylandState {
    pub fn new(globals: Arc<Globals>, mouse_warp_without_keyboard_focus: bool) -> Self {
        Self {
            globals,
            outputs: HashMap::new(),
            color_features: ColorManagerFeatures::default(),
            format_modifiers: HashMap::new(),
            can_use_modifiers: false,
            seat: MainSeat::default(),
            default_cursor: None,
            app_cursor: None,
            mouse_warp_without_keyboard_focus,
        }
    }

    pub fn refresh_of(&self, output: u32) -> Option<i32> {
        self.outputs.get(&output).copied().filter(|&mhz| mhz > 0)
    }

    pub fn update_cursor(&self) {
        let Some(pointer) = &self.seat.pointer else {
            return;
        };
        let serial = self.seat.pointer_serial;
        let choice = cursor_choice(
            self.mouse_warp_without_keyboard_focus,
            self.seat.locked.is_some(),
            self.seat.keyboard_entered,
            self.default_cursor.is_some(),
            self.app_cursor.is_some(),
        );
        trace!("Cursor: {:?}", choice);
        let cursor = match choice {
            CursorChoice::Host => self.default_cursor.as_ref(),
            CursorChoice::App => self.app_cursor.as_ref(),
            CursorChoice::Hide => None,
        };
        match cursor {
            Some(cursor) => pointer.set_cursor(
                serial,
                Some(&cursor.surface),
                cursor.hotspot.0 as i32,
                cursor.hotspot.1 as i32,
            ),
            None => pointer.set_cursor(serial, None, 0, 0),
        }
    }
}

fn is_plane_surface(surface: &WlSurface) -> bool {
    surface.data::<Arc<PlaneShared>>().is_some()
}

fn write_selection(contents: &str, fd: std::os::fd::OwnedFd) {
    let mut file = std::fs::File::from(fd);
    if let Err(err) = file.write_all(contents.as_bytes()) {
        debug!("Failed to write {} bytes of selection: {}", contents.len(), err);
    }
}

impl Dispatch<WlRegistry, GlobalListContents> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WlRegistry,
        event: wl_registry::Event,
        _: &GlobalListContents,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_registry::Event::GlobalRemove { name } = event {
            trace!("Global {} removed", name);
        }
    }
}

delegate_noop!(WaylandState: ignore WlCompositor);
delegate_noop!(WaylandState: ignore WlSubcompositor);
delegate_noop!(WaylandState: ignore WlSubsurface);
delegate_noop!(WaylandState: ignore WlRegion);
delegate_noop!(WaylandState: ignore WlShm);
delegate_noop!(WaylandState: ignore WlShmPool);
delegate_noop!(WaylandState: ignore WpViewporter);
delegate_noop!(WaylandState: ignore WpViewport);
delegate_noop!(WaylandState: ignore WpPresentation);
delegate_noop!(WaylandState: ignore WpFractionalScaleManagerV1);
delegate_noop!(WaylandState: ignore WpSinglePixelBufferManagerV1);
delegate_noop!(WaylandState: ignore ZwpLinuxBufferParamsV1);
delegate_noop!(WaylandState: ignore ZwpRelativePointerManagerV1);
delegate_noop!(WaylandState: ignore ZwpPointerConstraintsV1);
delegate_noop!(WaylandState: ignore ZwpLockedPointerV1);
delegate_noop!(WaylandState: ignore ZxdgDecorationManagerV1);
delegate_noop!(WaylandState: ignore ZxdgToplevelDecorationV1);
delegate_noop!(WaylandState: ignore XdgToplevelIconManagerV1);
delegate_noop!(WaylandState: ignore XdgToplevelIconV1);
delegate_noop!(WaylandState: ignore WpColorManagementSurfaceV1);
delegate_noop!(WaylandState: ignore FrogColorManagementFactoryV1);
delegate_noop!(WaylandState: ignore WpImageDescriptionCreatorParamsV1);
delegate_noop!(WaylandState: ignore WlDataDeviceManager);
delegate_noop!(WaylandState: ignore WlDataOffer);
delegate_noop!(WaylandState: ignore ZwpPrimarySelectionDeviceManagerV1);
delegate_noop!(WaylandState: ignore ZwpPrimarySelectionOfferV1);

impl Dispatch<XdgWmBase, ()> for WaylandState {
    fn event(
        _: &mut Self,
        wm_base: &XdgWmBase,
        event: xdg_wm_base::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_wm_base::Event::Ping { serial } = event {
            wm_base.pong(serial);
        }
    }
}

impl Dispatch<ZwpLinuxDmabufV1, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &ZwpLinuxDmabufV1,
        event: zwp_linux_dmabuf_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Formats are advertised again by the modifier events.
        if let zwp_linux_dmabuf_v1::Event::Modifier {
            format,
            modifier_hi,
            modifier_lo,
        } = event
        {
            let modifier = (u64::from(modifier_hi) << 32) | u64::from(modifier_lo);
            if modifier != fourcc::MOD_INVALID {
                state.can_use_modifiers = true;
            }
            state.format_modifiers.entry(format).or_default().push(modifier);
        }
    }
}

impl Dispatch<WlOutput, ()> for WaylandState {
    fn event(
        state: &mut Self,
        output: &WlOutput,
        event: wl_output::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_output::Event::Mode { refresh, .. } = event {
            state.outputs.insert(output.id().protocol_id(), refresh);
        }
    }
}

impl Dispatch<WlBuffer, BufferData> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WlBuffer,
        event: wl_buffer::Event,
        data: &BufferData,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wl_buffer::Event::Release = event {
            fb::release(&data.refs);
        }
    }
}

// Cursor and icon buffers are destroyed right after use.
delegate_noop!(WaylandState: ignore WlBuffer);

impl Dispatch<WlSurface, Arc<PlaneShared>> for WaylandState {
    fn event(
        state: &mut Self,
        _: &WlSurface,
        event: wl_surface::Event,
        plane: &Arc<PlaneShared>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let refresh_of = |id: u32| state.refresh_of(id);
        match event {
            wl_surface::Event::Enter { output } => {
                plane.on_enter(output.id().protocol_id(), &refresh_of)
            }
            wl_surface::Event::Leave { output } => {
                plane.on_leave(output.id().protocol_id(), &refresh_of)
            }
            _ => {}
        }
    }
}

// Cursor surfaces.
delegate_noop!(WaylandState: ignore WlSurface);

impl Dispatch<WpPresentationFeedback, Arc<PlaneShared>> for WaylandState {
    fn event(
        state: &mut Self,
        _: &WpPresentationFeedback,
        event: wp_presentation_feedback::Event,
        plane: &Arc<PlaneShared>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wp_presentation_feedback::Event::Presented {
                tv_sec_hi,
                tv_sec_lo,
                tv_nsec,
                refresh,
                ..
            } => {
                let secs = (u64::from(tv_sec_hi) << 32) | u64::from(tv_sec_lo);
                let time = Duration::new(secs, tv_nsec);
                plane.on_presented(time, refresh, &|id| state.refresh_of(id));
            }
            wp_presentation_feedback::Event::Discarded => plane.on_discarded(),
            _ => {}
        }
    }
}

impl Dispatch<WpFractionalScaleV1, Arc<PlaneShared>> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WpFractionalScaleV1,
        event: wp_fractional_scale_v1::Event,
        plane: &Arc<PlaneShared>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wp_fractional_scale_v1::Event::PreferredScale { scale } = event {
            plane.on_preferred_scale(scale);
        }
    }
}

impl Dispatch<XdgSurface, Arc<ToplevelData>> for WaylandState {
    fn event(
        _: &mut Self,
        xdg_surface: &XdgSurface,
        event: xdg_surface::Event,
        data: &Arc<ToplevelData>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let xdg_surface::Event::Configure { serial } = event {
            xdg_surface.ack_configure(serial);
            let pending = std::mem::take(&mut *data.pending.lock());
            data.connector.on_configure(pending.size, pending.fullscreen);
        }
    }
}

impl Dispatch<XdgToplevel, Arc<ToplevelData>> for WaylandState {
    fn event(
        _: &mut Self,
        _: &XdgToplevel,
        event: xdg_toplevel::Event,
        data: &Arc<ToplevelData>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            xdg_toplevel::Event::Configure {
                width,
                height,
                states,
            } => {
                let fullscreen = states
                    .chunks_exact(4)
                    .filter_map(|c| c.try_into().ok().map(u32::from_ne_bytes))
                    .any(|s| s == xdg_toplevel::State::Fullscreen as u32);
                let mut pending = data.pending.lock();
                pending.size = (width > 0 && height > 0).then_some((width, height));
                pending.fullscreen = fullscreen;
            }
            xdg_toplevel::Event::Close => data.connector.on_close(),
            _ => {}
        }
    }
}

impl Dispatch<WpColorManagerV1, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &WpColorManagerV1,
        event: wp_color_manager_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        let features = &mut state.color_features;
        match event {
            wp_color_manager_v1::Event::SupportedFeature {
                feature: WEnum::Value(feature),
            } => features.features.push(feature),
            wp_color_manager_v1::Event::SupportedTfNamed { tf: WEnum::Value(tf) } => {
                features.transfer_functions.push(tf)
            }
            wp_color_manager_v1::Event::SupportedPrimariesNamed {
                primaries: WEnum::Value(primaries),
            } => features.primaries.push(primaries),
            wp_color_manager_v1::Event::Done => {
                debug!("Host color manager: {:?}", features);
            }
            _ => {}
        }
    }
}

/// Ask the host for its preferred image description of the root surface.
pub fn request_preferred_description(
    feedback: &WpColorManagementSurfaceFeedbackV1,
    connector: &Arc<ConnectorShared>,
    qh: &QueueHandle<WaylandState>,
) {
    let description = feedback.get_preferred(qh, ());
    description.get_information(
        qh,
        PreferredInfo {
            connector: connector.clone(),
            description: description.clone(),
        },
    );
}

impl Dispatch<WpColorManagementSurfaceFeedbackV1, Arc<ConnectorShared>> for WaylandState {
    fn event(
        _: &mut Self,
        feedback: &WpColorManagementSurfaceFeedbackV1,
        event: wp_color_management_surface_feedback_v1::Event,
        connector: &Arc<ConnectorShared>,
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        if let wp_color_management_surface_feedback_v1::Event::PreferredChanged { .. } = event {
            request_preferred_description(feedback, connector, qh);
        }
    }
}

impl Dispatch<FrogColorManagedSurface, Option<Arc<ConnectorShared>>> for WaylandState {
    fn event(
        _: &mut Self,
        _: &FrogColorManagedSurface,
        event: frog_color_managed_surface::Event,
        connector: &Option<Arc<ConnectorShared>>,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        // Only the root surface listens
        let Some(connector) = connector else {
            return;
        };
        if let frog_color_managed_surface::Event::PreferredMetadata {
            transfer_function,
            output_display_primary_red_x,
            output_display_primary_red_y,
            output_display_primary_green_x,
            output_display_primary_green_y,
            output_display_primary_blue_x,
            output_display_primary_blue_y,
            output_white_point_x,
            output_white_point_y,
            max_luminance,
            min_luminance,
            max_full_frame_luminance,
        } = event
        {
            let meta = frog::preferred_metadata(
                transfer_function,
                [
                    output_display_primary_red_x,
                    output_display_primary_red_y,
                    output_display_primary_green_x,
                    output_display_primary_green_y,
                    output_display_primary_blue_x,
                    output_display_primary_blue_y,
                    output_white_point_x,
                    output_white_point_y,
                ],
                [max_luminance, min_luminance, max_full_frame_luminance],
            );
            debug!("Frog preferred metadata: {:?}", meta);
            connector.on_frog_preferred_metadata(meta);
        }
    }
}

impl Dispatch<WpImageDescriptionV1, ()> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WpImageDescriptionV1,
        event: wp_image_description_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        if let wp_image_description_v1::Event::Failed { cause, msg } = event {
            warn!("Image description failed: {:?}: {}", cause, msg);
        }
    }
}

impl Dispatch<WpImageDescriptionInfoV1, PreferredInfo> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WpImageDescriptionInfoV1,
        event: wp_image_description_info_v1::Event,
        info: &PreferredInfo,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        use wp_image_description_info_v1::Event;

        let connector = &info.connector;
        match event {
            Event::TfNamed { tf } => {
                let is_pq = tf == WEnum::Value(wp_color_manager_v1::TransferFunction::St2084Pq);
                debug!("Host preferred transfer function: {:?}", tf);
                connector.on_preferred_transfer(is_pq);
            }
            Event::TargetPrimaries {
                r_x,
                r_y,
                g_x,
                g_y,
                b_x,
                b_y,
                w_x,
                w_y,
            } => {
                // Protocol chromaticities are scaled by 1e6, listeners take 1e4.
                let primaries = [r_x, r_y, g_x, g_y, b_x, b_y, w_x, w_y]
                    .map(|v| (v.max(0) / 100) as u32);
                connector.on_target_primaries(primaries);
            }
            Event::TargetMaxCll { max_cll } => connector.on_target_max_cll(max_cll),
            Event::TargetMaxFall { max_fall } => connector.on_target_max_fall(max_fall),
            Event::Done => info.description.destroy(),
            _ => {}
        }
    }
}

impl Dispatch<WlSeat, ()> for WaylandState {
    fn event(
        state: &mut Self,
        seat: &WlSeat,
        event: wl_seat::Event,
        _: &(),
        _: &Connection,
        qh: &QueueHandle<Self>,
    ) {
        let wl_seat::Event::Capabilities {
            capabilities: WEnum::Value(caps),
        } = event
        else {
            return;
        };

        let main = &mut state.seat;
        let has_pointer = caps.contains(wl_seat::Capability::Pointer);
        if has_pointer != main.pointer.is_some() {
            match main.pointer.take() {
                Some(pointer) => pointer.release(),
                None => main.pointer = Some(seat.get_pointer(qh, ())),
            }
        }

        let has_keyboard = caps.contains(wl_seat::Capability::Keyboard);
        if has_keyboard != main.keyboard.is_some() {
            match main.keyboard.take() {
                Some(keyboard) => keyboard.release(),
                None => main.keyboard = Some(seat.get_keyboard(qh, ())),
            }
        }
    }
}

impl Dispatch<WlPointer, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &WlPointer,
        event: wl_pointer::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_pointer::Event::Enter {
                serial, surface, ..
            } if is_plane_surface(&surface) => {
                state.seat.pointer_serial = serial;
                state.seat.pointer_entered = true;
                state.update_cursor();
            }
            wl_pointer::Event::Leave { surface, .. } if is_plane_surface(&surface) => {
                state.seat.pointer_entered = false;
            }
            _ => {}
        }
    }
}

impl Dispatch<WlKeyboard, ()> for WaylandState {
    fn event(
        state: &mut Self,
        _: &WlKeyboard,
        event: wl_keyboard::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_keyboard::Event::Enter {
                serial, surface, ..
            } if is_plane_surface(&surface) => {
                state.seat.keyboard_serial = serial;
                state.seat.keyboard_entered = true;
                state.update_cursor();
            }
            wl_keyboard::Event::Leave { surface, .. } if is_plane_surface(&surface) => {
                state.seat.keyboard_entered = false;
                state.update_cursor();
            }
            _ => {}
        }
    }
}

impl Dispatch<WlDataDevice, ()> for WaylandState {
    fn event(
        _: &mut Self,
        _: &WlDataDevice,
        _: wl_data_device::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }

    event_created_child!(WaylandState, WlDataDevice, [
        wl_data_device::EVT_DATA_OFFER_OPCODE => (WlDataOffer, ()),
    ]);
}

impl Dispatch<WlDataSource, String> for WaylandState {
    fn event(
        _: &mut Self,
        source: &WlDataSource,
        event: wl_data_source::Event,
        contents: &String,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            wl_data_source::Event::Send { fd, .. } => write_selection(contents, fd),
            wl_data_source::Event::Cancelled => source.destroy(),
            _ => {}
        }
    }
}

impl Dispatch<ZwpPrimarySelectionDeviceV1, ()> for WaylandState {
    fn event(
        _: &mut Self,
        _: &ZwpPrimarySelectionDeviceV1,
        _: zwp_primary_selection_device_v1::Event,
        _: &(),
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
    }

    event_created_child!(WaylandState, ZwpPrimarySelectionDeviceV1, [
        zwp_primary_selection_device_v1::EVT_DATA_OFFER_OPCODE => (ZwpPrimarySelectionOfferV1, ()),
    ]);
}

impl Dispatch<ZwpPrimarySelectionSourceV1, String> for WaylandState {
    fn event(
        _: &mut Self,
        source: &ZwpPrimarySelectionSourceV1,
        event: zwp_primary_selection_source_v1::Event,
        contents: &String,
        _: &Connection,
        _: &QueueHandle<Self>,
    ) {
        match event {
            zwp_primary_selection_source_v1::Event::Send { fd, .. } => {
                write_selection(contents, fd)
            }
            zwp_primary_selection_source_v1::Event::Cancelled => source.destroy(),
            _ => {}
        }
    }
}
