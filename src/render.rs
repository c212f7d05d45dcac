//! GPU composite collaborator and the direct-scanout decision.
//!
//! # Design Invariants
//!
//! 1. **Any condition forces composite**: the decision is a plain OR of debug,
//!    content and capability flags. No condition outranks another.
//!
//! 2. **Composite is synchronous**: the presentation thread waits for the GPU
//!    before handing the output image to the host.

use crate::color::colorspace_is_hdr;
use crate::frame::{FrameInfo, Texture, UpscaleFilter};
use crate::tracy_span;

/// The GPU compositor that flattens a frame into one output image.
pub trait CompositeRenderer: Send + Sync {
    /// Record and submit the composite. Returns the sequence point to wait
    /// on, or `None` on failure.
    fn composite(&self, frame: &FrameInfo) -> Option<u64>;

    fn wait(&self, sequence: u64);

    /// The image written by the last composite.
    fn output_image(&self) -> Option<Texture>;
}

/// Settings that feed the composite decision besides the frame itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompositePolicy {
    pub force: bool,
    pub heatmap: bool,
    pub itm_enable: bool,
    pub supports_color_management: bool,
}

pub fn needs_composite(frame: &FrameInfo, policy: &CompositePolicy) -> bool {
    tracy_span!("needs_composite");

    let base = frame.base_layer();
    let base_unscaled = base.is_some_and(|layer| layer.is_unscaled());
    let base_hdr = base.is_some_and(|layer| colorspace_is_hdr(layer.colorspace));
    let base_blur = base.is_some_and(|layer| layer.blur);
    let nearest = matches!(
        frame.upscale_filter,
        UpscaleFilter::Nearest | UpscaleFilter::Pixel
    );
    let effects = &frame.effects;

    policy.force
        || effects.fsr
        || effects.nis
        || base_blur
        || (nearest && base.is_some() && !base_unscaled)
        || effects.color_slider_in_use
        || effects.fading_out
        || effects.reshade
        || (frame.hdr_output_enabled && policy.itm_enable)
        || (!policy.supports_color_management && base_hdr)
        || policy.heatmap
}

/// Renderer for runs without a GPU compositor. Every composite fails, so
/// frames that need one are dropped with an error.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl CompositeRenderer for NullRenderer {
    fn composite(&self, _frame: &FrameInfo) -> Option<u64> {
        None
    }

    fn wait(&self, _sequence: u64) {}

    fn output_image(&self) -> Option<Texture> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Colorspace;
    use crate::frame::Layer;

    fn screen_frame() -> FrameInfo {
        FrameInfo {
            layers: vec![Layer {
                tex: Some(Texture {
                    width: 1280,
                    height: 720,
                    has_alpha: false,
                    fb: None,
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_plain_frame_is_direct() {
        assert!(!needs_composite(&screen_frame(), &CompositePolicy::default()));
    }

    #[test]
    fn test_each_effect_forces_composite() {
        let policy = CompositePolicy::default();
        let mutations: Vec<fn(&mut FrameInfo)> = vec![
            |f| f.effects.fsr = true,
            |f| f.effects.nis = true,
            |f| f.layers[0].blur = true,
            |f| f.effects.color_slider_in_use = true,
            |f| f.effects.fading_out = true,
            |f| f.effects.reshade = true,
        ];
        for mutate in mutations {
            let mut frame = screen_frame();
            mutate(&mut frame);
            assert!(needs_composite(&frame, &policy));
        }
    }

    #[test]
    fn test_policy_flags_force_composite() {
        let frame = screen_frame();
        assert!(needs_composite(
            &frame,
            &CompositePolicy {
                force: true,
                ..Default::default()
            }
        ));
        assert!(needs_composite(
            &frame,
            &CompositePolicy {
                heatmap: true,
                ..Default::default()
            }
        ));
    }

    #[test]
    fn test_nearest_filter_only_matters_when_scaled() {
        let mut frame = screen_frame();
        frame.upscale_filter = UpscaleFilter::Nearest;
        assert!(!needs_composite(&frame, &CompositePolicy::default()));
        frame.layers[0].scale = (2.0, 2.0);
        assert!(needs_composite(&frame, &CompositePolicy::default()));
    }

    #[test]
    fn test_itm_requires_hdr_output() {
        let mut frame = screen_frame();
        let policy = CompositePolicy {
            itm_enable: true,
            ..Default::default()
        };
        assert!(!needs_composite(&frame, &policy));
        frame.hdr_output_enabled = true;
        assert!(needs_composite(&frame, &policy));
    }

    #[test]
    fn test_hdr_layer_without_color_management() {
        let mut frame = screen_frame();
        frame.layers[0].colorspace = Colorspace::Hdr10Pq;
        assert!(needs_composite(&frame, &CompositePolicy::default()));
        let managed = CompositePolicy {
            supports_color_management: true,
            ..Default::default()
        };
        assert!(!needs_composite(&frame, &managed));
    }
}
