//! Backend abstraction layer
//!
//! This module provides the presentation targets behind one interface:
//!
//! - **Wayland backend** (`wayland`): presents into a window on a host
//!   compositor, one subsurface per plane.
//!
//! - **Headless backend** (`headless`): records every surface request instead
//!   of talking to a host. Used by tests and `--headless` runs.
//!
//! - **Deferred backend** (`deferred`): wraps another backend so startup can
//!   proceed before the real target is reachable.
//!
//! # Design Invariants
//!
//! 1. **Backend isolation**: each backend owns its connection and its
//!    connectors. The compositor only talks to [`Backend`] and
//!    [`BackendConnector`].
//!
//! 2. **Static facts are static**: extension lists and the capability
//!    predicates never change after construction and have no side effects.
//!
//! 3. **Not ready is not an error**: queries made before a backend is
//!    connected answer with conservative defaults.

pub mod blob;
pub mod connector;
pub mod deferred;
pub mod fb;
pub mod headless;
pub mod plane;
pub mod transport;
pub mod wayland;

use std::sync::Arc;

pub use blob::{BackendBlob, BlobData};
pub use connector::{Connector, PresentError};
pub use deferred::DeferredBackend;
pub use fb::{BackendFb, DmabufAttributes, FbHandle};
pub use headless::HeadlessBackend;
pub use wayland::WaylandBackend;

use crate::color::{HdrInfo, NativeColorimetry};
use crate::cursor::CursorImage;
use crate::frame::FrameInfo;
use transport::SelectionKind;

/// DRM fourcc codes used for output formats.
pub mod fourcc {
    const fn code(a: u8, b: u8, c: u8, d: u8) -> u32 {
        (a as u32) | ((b as u32) << 8) | ((c as u32) << 16) | ((d as u32) << 24)
    }

    pub const XRGB8888: u32 = code(b'X', b'R', b'2', b'4');
    pub const XBGR8888: u32 = code(b'X', b'B', b'2', b'4');
    pub const ARGB8888: u32 = code(b'A', b'R', b'2', b'4');
    pub const ABGR8888: u32 = code(b'A', b'B', b'2', b'4');
    pub const XRGB2101010: u32 = code(b'X', b'R', b'3', b'0');
    pub const XBGR2101010: u32 = code(b'X', b'B', b'3', b'0');
    pub const ARGB2101010: u32 = code(b'A', b'R', b'3', b'0');
    pub const ABGR2101010: u32 = code(b'A', b'B', b'3', b'0');

    pub const MOD_LINEAR: u64 = 0;
    pub const MOD_INVALID: u64 = 0x00ff_ffff_ffff_ffff;
}

/// Renderer instance extensions needed by every backend: external memory for
/// dmabuf import plus the window-system surfaces.
pub const INSTANCE_EXTENSIONS: &[&str] = &[
    "VK_KHR_external_memory_capabilities",
    "VK_KHR_get_physical_device_properties2",
    "VK_KHR_external_fence_capabilities",
    "VK_KHR_surface",
    "VK_KHR_xcb_surface",
    "VK_KHR_xlib_surface",
    "VK_KHR_wayland_surface",
    "VK_KHR_external_semaphore_capabilities",
];

pub const DEVICE_EXTENSIONS: &[&str] = &[
    "VK_KHR_external_memory",
    "VK_KHR_external_semaphore",
    "VK_KHR_timeline_semaphore",
    "VK_KHR_dedicated_allocation",
    "VK_KHR_get_memory_requirements2",
    "VK_KHR_external_memory_fd",
    "VK_KHR_external_semaphore_fd",
    "VK_KHR_image_format_list",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenType {
    Internal,
    External,
}

/// Image layout the renderer leaves output images in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentLayout {
    General,
    PresentSrc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchClickMode {
    Hover,
    Left,
    Right,
    Middle,
    Passthrough,
    Disabled,
    Trackpad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    Mouse,
    Keyboard,
    Touch,
}

/// Preferred fourcc for the primary plane and for overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormats {
    pub primary: u32,
    pub overlay: u32,
}

/// Capability and lifecycle interface of a presentation target.
pub trait Backend: Send + Sync {
    type Connector: BackendConnector + ?Sized;

    /// Connect to the target. Missing mandatory capabilities fail here.
    fn init(&self) -> anyhow::Result<()>;

    /// Setup that depends on other subsystems being up. Called once after `init`.
    fn post_init(&self) -> anyhow::Result<()>;

    fn instance_extensions(&self) -> &'static [&'static str] {
        INSTANCE_EXTENSIONS
    }

    fn device_extensions(&self) -> &'static [&'static str] {
        DEVICE_EXTENSIONS
    }

    fn present_layout(&self) -> PresentLayout;

    fn preferred_output_format(&self) -> OutputFormats;

    fn valid_physical_device(&self) -> bool;

    fn dirty_state(&self, force: bool, force_modeset: bool);

    /// Drain pending events without blocking. Returns whether anything
    /// affecting output changed.
    fn poll_state(&self) -> bool;

    fn create_backend_blob(&self, data: BlobData) -> Arc<BackendBlob>;

    /// `None` when the target cannot import the buffer. The layer is dropped
    /// for that frame.
    fn import_dmabuf(&self, attrs: &DmabufAttributes) -> Option<FbHandle>;

    fn uses_modifiers(&self) -> bool;

    fn supported_modifiers(&self, format: u32) -> Vec<u64>;

    fn current_connector(&self) -> Option<Arc<Self::Connector>>;

    fn connector(&self, screen_type: ScreenType) -> Option<Arc<Self::Connector>>;

    fn supports_plane_hardware_cursor(&self) -> bool;

    fn supports_tearing(&self) -> bool;

    fn uses_vulkan_swapchain(&self) -> bool;

    fn is_session_based(&self) -> bool;

    fn supports_explicit_sync(&self) -> bool;

    fn is_paused(&self) -> bool;

    fn is_visible(&self) -> bool;

    fn cursor_surface_size(&self, size: (u32, u32)) -> (u32, u32);

    fn set_dynamic_refresh(&self, refresh_mhz: i32) -> bool;

    fn hack_update_patched_edid(&self);

    fn needs_frame_sync(&self) -> bool;

    fn touch_click_mode(&self) -> TouchClickMode;

    fn dump_debug_info(&self);

    fn uses_virtual_connectors(&self) -> bool;

    fn create_virtual_connector(&self, key: u64) -> Option<Arc<Self::Connector>>;

    fn notify_physical_input(&self, kind: InputType);

    fn supports_vr_overlay_forwarding(&self) -> bool;

    /// True once after the backend became ready.
    fn newly_initted(&self) -> bool {
        false
    }

    fn should_fit_windows(&self) -> bool;
}

/// One logical display output.
pub trait BackendConnector: Send + Sync {
    fn virtual_connector_key(&self) -> u64;

    fn present(&self, frame: &FrameInfo, is_async: bool) -> Result<(), PresentError>;

    fn hdr_info(&self) -> HdrInfo;

    fn is_hdr_active(&self) -> bool;

    fn supports_vrr(&self) -> bool;

    fn is_vrr_active(&self) -> bool;

    fn valid_dynamic_refresh_rates(&self) -> Vec<u32>;

    fn raw_edid(&self) -> &[u8];

    fn screen_type(&self) -> ScreenType;

    fn current_orientation(&self) -> u32;

    fn name(&self) -> &str;

    fn make(&self) -> &str;

    fn model(&self) -> &str;

    fn native_colorimetry(&self, hdr10: bool) -> NativeColorimetry;

    // Nested window hints.

    fn set_cursor_image(&self, image: Option<Arc<CursorImage>>);

    fn set_relative_mouse_mode(&self, relative: bool);

    fn set_visible(&self, visible: bool);

    fn set_title(&self, title: Option<&str>);

    /// `[width, height, pixels...]`, anything shorter clears the icon.
    fn set_icon(&self, icon: Option<&[u32]>);

    fn set_selection(&self, kind: SelectionKind, contents: String);
}
