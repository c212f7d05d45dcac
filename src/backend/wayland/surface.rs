//! Host objects owned by planes: surfaces, buffers and image descriptions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;
use wayland_client::protocol::{wl_buffer::WlBuffer, wl_subsurface::WlSubsurface, wl_surface::WlSurface};
use wayland_client::{Proxy, QueueHandle};
use wayland_protocols::wp::color_management::v1::client::{
    wp_color_management_surface_feedback_v1::WpColorManagementSurfaceFeedbackV1,
    wp_color_management_surface_v1::WpColorManagementSurfaceV1, wp_color_manager_v1,
    wp_image_description_v1::WpImageDescriptionV1,
};
use wayland_protocols::wp::fractional_scale::v1::client::wp_fractional_scale_v1::WpFractionalScaleV1;
use wayland_protocols::wp::viewporter::client::wp_viewport::WpViewport;
use wayland_protocols::xdg::decoration::zv1::client::zxdg_toplevel_decoration_v1::ZxdgToplevelDecorationV1;
use wayland_protocols::xdg::shell::client::{xdg_surface::XdgSurface, xdg_toplevel::XdgToplevel};

use super::frog::frog_color_managed_surface::{FrogColorManagedSurface, RenderIntent};
use super::state::{Globals, WaylandState};
use crate::backend::connector::ConnectorShared;
use crate::backend::fb::{BackendFb, FbHandle, FbRefs};
use crate::backend::plane::PlaneShared;
use crate::backend::transport::{PlaneSurface, SrcRect};
use crate::color::{FrogPrimaries, FrogTransferFunction};

/// Data attached to every imported `wl_buffer`. The host's release event
/// drops one hold on the framebuffer.
pub struct BufferData {
    pub refs: Arc<FbRefs>,
}

/// A host `wl_buffer` that planes can attach.
pub struct WaylandFb {
    buffer: WlBuffer,
    refs: Arc<FbRefs>,
}

impl WaylandFb {
    /// Wrap a buffer created with `refs` as its [`BufferData`].
    pub fn new(buffer: WlBuffer, refs: Arc<FbRefs>) -> Self {
        Self { buffer, refs }
    }

    pub fn buffer(&self) -> &WlBuffer {
        &self.buffer
    }
}

impl fmt::Debug for WaylandFb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaylandFb")
            .field("buffer", &self.buffer.id())
            .field("refs", &self.refs)
            .finish()
    }
}

impl BackendFb for WaylandFb {
    fn refs(&self) -> &FbRefs {
        &self.refs
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for WaylandFb {
    fn drop(&mut self) {
        self.buffer.destroy();
    }
}

/// An image description created on the host, destroyed with the handle.
pub struct WaylandDescription(WpImageDescriptionV1);

impl WaylandDescription {
    pub fn new(description: WpImageDescriptionV1) -> Self {
        Self(description)
    }
}

impl Drop for WaylandDescription {
    fn drop(&mut self) {
        self.0.destroy();
    }
}

#[derive(Debug, Default)]
pub struct PendingConfigure {
    pub size: Option<(i32, i32)>,
    pub fullscreen: bool,
}

/// Shared by the xdg_surface and xdg_toplevel of a root plane.
pub struct ToplevelData {
    pub connector: Arc<ConnectorShared>,
    pub pending: Mutex<PendingConfigure>,
}

/// Info request for the host's preferred image description.
pub struct PreferredInfo {
    pub connector: Arc<ConnectorShared>,
    pub description: WpImageDescriptionV1,
}

pub(super) struct Window {
    pub xdg_surface: XdgSurface,
    pub toplevel: XdgToplevel,
    pub decoration: Option<ZxdgToplevelDecorationV1>,
}

/// One plane's host surface.
pub struct WaylandSurface {
    pub(super) plane: Arc<PlaneShared>,
    pub(super) surface: WlSurface,
    pub(super) viewport: WpViewport,
    pub(super) subsurface: Option<WlSubsurface>,
    pub(super) fractional_scale: Option<WpFractionalScaleV1>,
    pub(super) color: Option<WpColorManagementSurfaceV1>,
    pub(super) color_feedback: Option<WpColorManagementSurfaceFeedbackV1>,
    pub(super) frog: Option<FrogColorManagedSurface>,
    pub(super) window: Option<Window>,
    pub(super) globals: Arc<Globals>,
    pub(super) qh: QueueHandle<WaylandState>,
}

impl WaylandSurface {
    pub fn wl_surface(&self) -> &WlSurface {
        &self.surface
    }

    pub fn toplevel(&self) -> Option<&XdgToplevel> {
        self.window.as_ref().map(|w| &w.toplevel)
    }
}

impl PlaneSurface for WaylandSurface {
    type Description = WaylandDescription;

    fn request_presentation_feedback(&mut self) {
        self.globals
            .presentation
            .feedback(&self.surface, &self.qh, self.plane.clone());
    }

    fn set_color_description(&mut self, desc: Option<&WaylandDescription>) {
        let Some(color) = &self.color else {
            return;
        };
        match desc {
            Some(desc) => {
                color.set_image_description(&desc.0, wp_color_manager_v1::RenderIntent::Perceptual)
            }
            None => color.unset_image_description(),
        }
    }

    fn set_frog_color(&mut self, primaries: FrogPrimaries, transfer: FrogTransferFunction) {
        let Some(frog) = &self.frog else {
            trace!("No frog surface, dropping {:?}/{:?}", primaries, transfer);
            return;
        };
        frog.set_render_intent(RenderIntent::Perceptual);
        frog.set_known_container_color_volume(primaries.into());
        frog.set_known_transfer_function(transfer.into());
    }

    fn set_viewport(&mut self, src: SrcRect, dst: (i32, i32)) {
        self.viewport.set_source(src.x, src.y, src.w, src.h);
        self.viewport.set_destination(dst.0, dst.1);
    }

    fn set_position(&mut self, x: i32, y: i32) {
        if let Some(subsurface) = &self.subsurface {
            subsurface.set_position(x, y);
        }
    }

    fn attach(&mut self, fb: Option<&FbHandle>) {
        let buffer = fb.and_then(|fb| fb.as_any().downcast_ref::<WaylandFb>());
        self.surface.attach(buffer.map(WaylandFb::buffer), 0, 0);
    }

    fn damage_all(&mut self) {
        self.surface.damage_buffer(0, 0, i32::MAX, i32::MAX);
    }

    fn set_opaque(&mut self, opaque: bool) {
        if opaque {
            let region = self.globals.compositor.create_region(&self.qh, ());
            region.add(0, 0, i32::MAX, i32::MAX);
            self.surface.set_opaque_region(Some(&region));
            region.destroy();
        } else {
            self.surface.set_opaque_region(None);
        }
    }

    fn set_buffer_scale(&mut self, scale: i32) {
        self.surface.set_buffer_scale(scale);
    }

    fn commit_window(&mut self, logical_size: (i32, i32)) {
        if let Some(window) = &self.window {
            window
                .xdg_surface
                .set_window_geometry(0, 0, logical_size.0, logical_size.1);
        }
    }

    fn commit(&mut self) {
        self.surface.commit();
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        if let Some(toplevel) = self.toplevel() {
            if fullscreen {
                toplevel.set_fullscreen(None);
            } else {
                toplevel.unset_fullscreen();
            }
        }
    }

    fn set_title(&mut self, title: &str) {
        if let Some(toplevel) = self.toplevel() {
            toplevel.set_title(title.to_string());
        }
    }
}

impl Drop for WaylandSurface {
    fn drop(&mut self) {
        if let Some(window) = self.window.take() {
            if let Some(decoration) = window.decoration {
                decoration.destroy();
            }
            window.toplevel.destroy();
            window.xdg_surface.destroy();
        }
        if let Some(feedback) = self.color_feedback.take() {
            feedback.destroy();
        }
        if let Some(color) = self.color.take() {
            color.destroy();
        }
        if let Some(frog) = self.frog.take() {
            frog.destroy();
        }
        if let Some(scale) = self.fractional_scale.take() {
            scale.destroy();
        }
        if let Some(subsurface) = self.subsurface.take() {
            subsurface.destroy();
        }
        self.viewport.destroy();
        self.surface.destroy();
    }
}
