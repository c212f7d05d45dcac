//! Per-frame input to the presentation path.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::blob::BackendBlob;
use crate::backend::fb::FbHandle;
use crate::color::{Colorspace, Eotf, HdrMetadata};
use crate::utils::close_enough;

/// Z position of the bottom-most layer.
pub const ZPOS_BASE: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum UpscaleFilter {
    #[default]
    Linear = 0,
    Nearest = 1,
    Fsr = 2,
    Nis = 3,
    Pixel = 4,
}

impl UpscaleFilter {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Nearest,
            2 => Self::Fsr,
            3 => Self::Nis,
            4 => Self::Pixel,
            _ => Self::Linear,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFilter {
    #[default]
    Linear,
    Nearest,
}

/// A GPU image with an optional scanout-capable framebuffer.
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
    pub fb: Option<FbHandle>,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub tex: Option<Texture>,
    pub scale: (f32, f32),
    /// Negated position of the layer in output space.
    pub offset: (f32, f32),
    pub opacity: f32,
    pub zpos: i32,
    pub colorspace: Colorspace,
    pub hdr_metadata: Option<Arc<BackendBlob>>,
    pub filter: SampleFilter,
    pub blur: bool,
}

impl Default for Layer {
    fn default() -> Self {
        Self {
            tex: None,
            scale: (1.0, 1.0),
            offset: (0.0, 0.0),
            opacity: 1.0,
            zpos: ZPOS_BASE,
            colorspace: Colorspace::Passthru,
            hdr_metadata: None,
            filter: SampleFilter::Linear,
            blur: false,
        }
    }
}

impl Layer {
    /// Whether anything below the layer can show through it.
    pub fn has_alpha(&self) -> bool {
        self.opacity < 1.0 || self.tex.as_ref().is_some_and(|t| t.has_alpha)
    }

    pub fn is_unscaled(&self) -> bool {
        close_enough(self.scale.0, 1.0) && close_enough(self.scale.1, 1.0)
    }

    /// Whether the layer covers the output exactly 1:1.
    pub fn is_screen_size(&self, output: (u32, u32)) -> bool {
        let Some(tex) = &self.tex else {
            return false;
        };
        self.is_unscaled()
            && close_enough(self.offset.0, 0.0)
            && close_enough(self.offset.1, 0.0)
            && (tex.width, tex.height) == output
    }

    pub fn hdr_metadata(&self) -> Option<&HdrMetadata> {
        self.hdr_metadata.as_ref().and_then(|blob| blob.hdr_metadata())
    }
}

/// Content effects that can only be applied by the GPU compositor.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameEffects {
    pub fsr: bool,
    pub nis: bool,
    pub fading_out: bool,
    pub color_slider_in_use: bool,
    /// A post-processing shader is loaded.
    pub reshade: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FrameInfo {
    pub layers: Vec<Layer>,
    pub effects: FrameEffects,
    pub upscale_filter: UpscaleFilter,
    pub output_encoding_eotf: Eotf,
    pub hdr_output_enabled: bool,
    /// Monotonic time the vblank timer woke the compositor for this frame.
    pub wakeup_time: Duration,
}

impl FrameInfo {
    pub fn base_layer(&self) -> Option<&Layer> {
        self.layers.first()
    }
}
