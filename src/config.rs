//! Startup configuration and live process state.
//!
//! [`Config`] is read once at startup and never mutated. [`OutputState`] holds
//! the live output geometry shared by the backend, its connectors and the
//! input thread. [`Runtime`] holds the knobs changed while running (hotkeys,
//! grab state, fullscreen requests).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::frame::UpscaleFilter;

pub const DEFAULT_HEIGHT: u32 = 720;
pub const DEFAULT_REFRESH_MHZ: i32 = 60_000;
pub const MAX_SHARPNESS: u32 = 20;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("output width {0} given without an output height")]
    WidthWithoutHeight(u32),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub window: WindowConfig,
    pub composite: CompositeDebug,
    pub hdr: HdrConfig,
    pub input: InputConfig,
    pub wayland: WaylandConfig,
    pub adaptive_sync: bool,
    /// Where the patched EDID is written for clients to pick up.
    pub patched_edid_path: Option<PathBuf>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }
}

/// Requested output geometry. Zero means "pick a default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub width: u32,
    pub height: u32,
    pub refresh_mhz: i32,
    /// Resolution advertised to nested clients through the EDID.
    pub nested_width: u32,
    pub nested_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub fullscreen: bool,
    pub title: Option<String>,
    pub app_id: String,
    pub force_relative_mouse: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            fullscreen: false,
            title: None,
            app_id: "gamescope".to_string(),
            force_relative_mouse: false,
        }
    }
}

/// Debug switches that force the GPU composite path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeDebug {
    pub force: bool,
    pub heatmap: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HdrConfig {
    pub enabled: bool,
    /// Inverse tone mapping of SDR content on an HDR output.
    pub itm_enable: bool,
    pub hdr10_saturation_scale: f32,
}

impl Default for HdrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            itm_enable: false,
            hdr10_saturation_scale: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward pointer motion even while the host keyboard focus is elsewhere.
    pub mouse_warp_without_keyboard_focus: bool,
    pub relmotion_without_keyboard_focus: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mouse_warp_without_keyboard_focus: true,
            relmotion_without_keyboard_focus: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaylandConfig {
    pub use_modifiers: bool,
}

impl Default for WaylandConfig {
    fn default() -> Self {
        Self {
            use_modifiers: true,
        }
    }
}

/// Live output geometry in physical pixels.
#[derive(Debug, Default)]
pub struct OutputState {
    width: AtomicU32,
    height: AtomicU32,
    refresh_mhz: AtomicI32,
    nested_width: AtomicU32,
    nested_height: AtomicU32,
}

impl OutputState {
    /// Unconfigured state: everything zero until [`OutputState::configure`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &OutputConfig) -> Result<Self, ConfigError> {
        let state = Self::new();
        state.configure(config)?;
        Ok(state)
    }

    /// Apply the configured geometry, filling in defaults:
    /// height 0 becomes 720, width 0 follows a 16:9 aspect, refresh 0 becomes 60Hz.
    pub fn configure(&self, config: &OutputConfig) -> Result<(), ConfigError> {
        let (width, height) = resolve_size(config.width, config.height)?;
        let refresh_mhz = if config.refresh_mhz == 0 {
            DEFAULT_REFRESH_MHZ
        } else {
            config.refresh_mhz
        };
        let nested_width = if config.nested_width == 0 { width } else { config.nested_width };
        let nested_height = if config.nested_height == 0 { height } else { config.nested_height };

        self.set_size(width, height);
        self.set_refresh_mhz(refresh_mhz);
        self.nested_width.store(nested_width, Ordering::Relaxed);
        self.nested_height.store(nested_height, Ordering::Relaxed);
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width.load(Ordering::Relaxed)
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn set_size(&self, width: u32, height: u32) {
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
    }

    /// Rescale the output after a fractional scale change from `old` to `new`.
    pub fn rescale(&self, old: u32, new: u32) {
        if old == 0 {
            return;
        }
        let scale = |v: u32| (u64::from(v) * u64::from(new) / u64::from(old)) as u32;
        self.set_size(scale(self.width()), scale(self.height()));
    }

    pub fn refresh_mhz(&self) -> i32 {
        self.refresh_mhz.load(Ordering::Relaxed)
    }

    pub fn set_refresh_mhz(&self, mhz: i32) {
        self.refresh_mhz.store(mhz, Ordering::Relaxed);
    }

    pub fn nested_size(&self) -> (u32, u32) {
        (
            self.nested_width.load(Ordering::Relaxed),
            self.nested_height.load(Ordering::Relaxed),
        )
    }
}

fn resolve_size(width: u32, height: u32) -> Result<(u32, u32), ConfigError> {
    match (width, height) {
        (0, 0) => Ok((DEFAULT_HEIGHT * 16 / 9, DEFAULT_HEIGHT)),
        (w, 0) => Err(ConfigError::WidthWithoutHeight(w)),
        (0, h) => Ok((h * 16 / 9, h)),
        (w, h) => Ok((w, h)),
    }
}

/// Process-wide state changed at run time by hotkeys and window management.
#[derive(Debug)]
pub struct Runtime {
    desired_fullscreen: AtomicBool,
    fullscreen: AtomicBool,
    upscale_filter: AtomicU8,
    sharpness: AtomicU32,
    screenshot_requested: AtomicBool,
    grabbed: AtomicBool,
    repaint_requested: AtomicBool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            desired_fullscreen: AtomicBool::new(false),
            fullscreen: AtomicBool::new(false),
            upscale_filter: AtomicU8::new(UpscaleFilter::Linear as u8),
            sharpness: AtomicU32::new(2),
            screenshot_requested: AtomicBool::new(false),
            grabbed: AtomicBool::new(false),
            repaint_requested: AtomicBool::new(false),
        }
    }
}

impl Runtime {
    pub fn desired_fullscreen(&self) -> bool {
        self.desired_fullscreen.load(Ordering::Relaxed)
    }

    pub fn request_fullscreen(&self, fullscreen: bool) {
        self.desired_fullscreen.store(fullscreen, Ordering::Relaxed);
    }

    pub fn toggle_fullscreen(&self) {
        self.request_fullscreen(!self.is_fullscreen());
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen.load(Ordering::Relaxed)
    }

    pub fn set_fullscreen_state(&self, fullscreen: bool) {
        self.fullscreen.store(fullscreen, Ordering::Relaxed);
    }

    pub fn upscale_filter(&self) -> UpscaleFilter {
        UpscaleFilter::from_raw(self.upscale_filter.load(Ordering::Relaxed))
    }

    pub fn set_upscale_filter(&self, filter: UpscaleFilter) {
        self.upscale_filter.store(filter as u8, Ordering::Relaxed);
    }

    /// Switch to `filter`, or back to linear if it is already selected.
    pub fn toggle_upscale_filter(&self, filter: UpscaleFilter) {
        let next = if self.upscale_filter() == filter {
            UpscaleFilter::Linear
        } else {
            filter
        };
        self.set_upscale_filter(next);
    }

    pub fn sharpness(&self) -> u32 {
        self.sharpness.load(Ordering::Relaxed)
    }

    pub fn adjust_sharpness(&self, delta: i32) {
        let next = (self.sharpness() as i32 + delta).clamp(0, MAX_SHARPNESS as i32);
        self.sharpness.store(next as u32, Ordering::Relaxed);
    }

    pub fn request_screenshot(&self) {
        self.screenshot_requested.store(true, Ordering::Relaxed);
    }

    pub fn take_screenshot_request(&self) -> bool {
        self.screenshot_requested.swap(false, Ordering::Relaxed)
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed.load(Ordering::Relaxed)
    }

    pub fn set_grabbed(&self, grabbed: bool) {
        self.grabbed.store(grabbed, Ordering::Relaxed);
    }

    pub fn request_repaint(&self) {
        self.repaint_requested.store(true, Ordering::Release);
    }

    pub fn take_repaint_request(&self) -> bool {
        self.repaint_requested.swap(false, Ordering::AcqRel)
    }
}
