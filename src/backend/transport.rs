//! Seams between the presentation policy and a concrete host transport.
//!
//! Planes and connectors are generic over a [`Transport`], which creates
//! surfaces and performs the host requests. Host events flow the other way
//! through [`SurfaceListener`] and [`WindowListener`], one method per event,
//! implemented by the shared plane and connector state.
//!
//! # Design Invariants
//!
//! 1. **Transport owns the wire**: nothing outside a transport touches host
//!    protocol objects. Planes only see [`PlaneSurface`].
//!
//! 2. **Listeners never lock plane storage**: event handlers run while the
//!    transport dispatches, possibly from inside `Connector::present`, so they
//!    only touch atomics and the small per-plane mutexes.

use std::sync::Arc;
use std::time::Duration;

use crate::color::{ColorDescription, FrogPreferredMetadata, FrogPrimaries, FrogTransferFunction};
use crate::cursor::CursorImage;

use super::fb::FbHandle;

/// Which color management protocols the host offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColorSupport {
    /// The host's color management global covers every feature needed for
    /// HDR10 and scRGB descriptions.
    pub wp: bool,
    pub frog: bool,
}

impl ColorSupport {
    pub fn any(&self) -> bool {
        self.wp || self.frog
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Clipboard,
    Primary,
}

/// Mime types offered for text selections.
pub const TEXT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/plain;charset=utf-8",
    "TEXT",
    "STRING",
    "UTF8_STRING",
];

/// Window icon in ARGB8888 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Icon {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl Icon {
    /// Parse the `[width, height, pixels...]` layout used by X11 window icons.
    pub fn from_raw(raw: &[u32]) -> Option<Self> {
        if raw.len() < 3 {
            return None;
        }
        let (width, height) = (raw[0], raw[1]);
        let count = (width as usize).checked_mul(height as usize)?;
        let pixels = raw.get(2..2 + count)?.to_vec();
        Some(Self {
            width,
            height,
            pixels,
        })
    }
}

/// Source rectangle of a viewport, in buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SrcRect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

pub trait Transport: Send + Sync + 'static {
    type Surface: PlaneSurface<Description = Self::Description>;
    type Description: Send + 'static;

    /// Create the toplevel surface of a connector.
    fn create_root_surface(
        &self,
        plane: &Arc<super::plane::PlaneShared>,
        app_id: &str,
    ) -> anyhow::Result<Self::Surface>;

    /// Create an overlay stacked directly above `below`, parented to `root`.
    fn create_subsurface(
        &self,
        plane: &Arc<super::plane::PlaneShared>,
        root: &Self::Surface,
        below: &Self::Surface,
    ) -> anyhow::Result<Self::Surface>;

    fn color_support(&self) -> ColorSupport;

    fn create_description(&self, desc: &ColorDescription) -> Option<Self::Description>;

    /// The framebuffer to attach for `fb`, or `None` when it has no host buffer.
    fn resolve_fb(&self, fb: &FbHandle) -> Option<FbHandle>;

    /// 1x1 opaque black buffer used as backing.
    fn black_fb(&self) -> Option<FbHandle>;

    fn flush(&self);

    /// Drain pending host events without blocking. Returns whether any
    /// event was dispatched.
    fn poll(&self) -> bool;

    fn set_cursor_image(&self, image: Option<Arc<CursorImage>>);

    fn set_relative_mouse_mode(&self, root: &Self::Surface, relative: bool);

    fn set_selection(&self, kind: SelectionKind, contents: String);

    fn set_icon(&self, root: &Self::Surface, icon: Option<&Icon>);

    fn on_connector_destroyed(&self, key: u64);
}

/// One host surface: the toplevel for the root plane, a subsurface otherwise.
pub trait PlaneSurface: Send + 'static {
    type Description;

    fn request_presentation_feedback(&mut self);

    fn set_color_description(&mut self, desc: Option<&Self::Description>);

    fn set_frog_color(&mut self, primaries: FrogPrimaries, transfer: FrogTransferFunction);

    fn set_viewport(&mut self, src: SrcRect, dst: (i32, i32));

    /// Position relative to the root surface. Ignored for the root itself.
    fn set_position(&mut self, x: i32, y: i32);

    fn attach(&mut self, fb: Option<&FbHandle>);

    fn damage_all(&mut self);

    fn set_opaque(&mut self, opaque: bool);

    fn set_buffer_scale(&mut self, scale: i32);

    /// Commit pending window configuration (geometry, fullscreen) at the
    /// given logical size.
    fn commit_window(&mut self, logical_size: (i32, i32));

    fn commit(&mut self);

    fn set_fullscreen(&mut self, fullscreen: bool);

    fn set_title(&mut self, title: &str);
}

/// Per-surface host events.
pub trait SurfaceListener: Send + Sync {
    /// The host presented the last commit. `refresh_ns` is zero on VRR hosts.
    fn on_presented(&self, time: Duration, refresh_ns: u32, refresh_of: &dyn Fn(u32) -> Option<i32>);

    fn on_discarded(&self);

    fn on_preferred_scale(&self, scale: u32);

    fn on_enter(&self, output: u32, refresh_of: &dyn Fn(u32) -> Option<i32>);

    fn on_leave(&self, output: u32, refresh_of: &dyn Fn(u32) -> Option<i32>);
}

/// Toplevel window and preferred color events of a connector.
pub trait WindowListener: Send + Sync {
    /// `size` is the logical content size, or `None` to keep the current one.
    fn on_configure(&self, size: Option<(i32, i32)>, fullscreen: bool);

    fn on_close(&self);

    fn on_preferred_transfer(&self, is_pq: bool);

    /// r, g, b, white chromaticities scaled by 10000.
    fn on_target_primaries(&self, primaries: [u32; 8]);

    fn on_target_max_cll(&self, max_cll: u32);

    fn on_target_max_fall(&self, max_fall: u32);

    fn on_frog_preferred_metadata(&self, meta: FrogPreferredMetadata);
}
