//! Presentation path tests

mod color;
mod composite;
mod deferred;
mod direct;
mod host_events;
mod window;

use scanout_core::backend::headless::{HeadlessFb, SurfaceOp};
use scanout_core::Layer;

/// Headless framebuffer id of a layer's texture.
pub fn layer_fb(layer: &Layer) -> u64 {
    layer
        .tex
        .as_ref()
        .and_then(|tex| tex.fb.as_ref())
        .and_then(HeadlessFb::id_of)
        .expect("layer has a headless framebuffer")
}

/// Render ops one per line, naming framebuffers by role so snapshots do not
/// depend on allocation order.
pub fn render_ops(ops: &[SurfaceOp], names: &[(u64, &str)]) -> String {
    ops.iter()
        .map(|op| match op {
            SurfaceOp::Viewport { src, dst } => format!(
                "Viewport {}x{}+{}+{} -> {}x{}",
                src.w, src.h, src.x, src.y, dst.0, dst.1
            ),
            SurfaceOp::Attach(None) => "Attach(none)".to_string(),
            SurfaceOp::Attach(Some(id)) => {
                let name = names
                    .iter()
                    .find(|(fb, _)| fb == id)
                    .map_or("unknown", |(_, name)| name);
                format!("Attach({})", name)
            }
            other => format!("{:?}", other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The ops every cleared overlay gets in one frame.
pub fn cleared_overlay() -> Vec<SurfaceOp> {
    vec![SurfaceOp::Attach(None), SurfaceOp::DamageAll, SurfaceOp::Commit]
}
