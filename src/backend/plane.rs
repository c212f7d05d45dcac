//! Output surface (plane) controller.
//!
//! A [`Plane`] owns one host surface and turns a [`PlaneState`] into the
//! surface requests for one frame: color description, viewport, position,
//! buffer, damage and opaque region.
//!
//! # Design Invariants
//!
//! 1. **Root plane is special**: only plane 0 requests presentation feedback,
//!    tracks the preferred fractional scale and the outputs it overlaps.
//!    Overlays inherit the root's scale.
//!
//! 2. **Color descriptions are cached**: a host description is regenerated
//!    only when the `(colorspace, HDR metadata)` key changes.
//!
//! 3. **Current state is shared**: the state last presented is readable by
//!    the input thread to map pointer coordinates, always under the mutex.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::backend::blob::BackendBlob;
use crate::backend::connector::ConnectorShared;
use crate::backend::fb::{self, FbHandle};
use crate::backend::transport::{PlaneSurface, SrcRect, SurfaceListener, Transport};
use crate::color::{self, Colorspace};
use crate::frame::{Layer, ZPOS_BASE};
use crate::utils::{refresh_interval_to_mhz, to_logical, SCALE_DENOMINATOR};

pub const PLANE_COUNT: usize = 8;

/// What one plane shows for one frame, in physical output pixels.
#[derive(Debug, Clone)]
pub struct PlaneState {
    pub buffer: FbHandle,
    pub dest_x: i32,
    pub dest_y: i32,
    pub src_x: f64,
    pub src_y: f64,
    pub src_w: f64,
    pub src_h: f64,
    pub dst_w: i32,
    pub dst_h: i32,
    pub colorspace: Colorspace,
    pub hdr_metadata: Option<Arc<BackendBlob>>,
    pub opaque: bool,
    pub fractional_scale: u32,
}

impl PlaneState {
    pub fn new(buffer: FbHandle) -> Self {
        Self {
            buffer,
            dest_x: 0,
            dest_y: 0,
            src_x: 0.0,
            src_y: 0.0,
            src_w: 1.0,
            src_h: 1.0,
            dst_w: 1,
            dst_h: 1,
            colorspace: Colorspace::Passthru,
            hdr_metadata: None,
            opaque: false,
            fractional_scale: SCALE_DENOMINATOR,
        }
    }
}

/// Clip a plane's destination to the output, shrinking the source rect by
/// the same ratio. Rects inside the output are left unchanged.
///
/// Returns false when nothing of the plane is left on the output.
pub fn clip_plane(state: &mut PlaneState, output: (u32, u32)) -> bool {
    let out_w = output.0 as i32;
    let out_h = output.1 as i32;

    let clipped_w = out_w.min(state.dst_w + state.dest_x) - state.dest_x;
    let clipped_h = out_h.min(state.dst_h + state.dest_y) - state.dest_y;
    if clipped_w <= 0 || clipped_h <= 0 {
        return false;
    }

    if state.dst_w > 0 {
        state.src_w *= f64::from(clipped_w) / f64::from(state.dst_w);
    }
    if state.dst_h > 0 {
        state.src_h *= f64::from(clipped_h) / f64::from(state.dst_h);
    }
    state.dst_w = clipped_w;
    state.dst_h = clipped_h;
    true
}

/// Build the plane state for a layer whose framebuffer resolved to `buffer`,
/// or None when the layer lies entirely off the output.
pub fn layer_plane_state(
    layer: &Layer,
    buffer: FbHandle,
    tex_size: (u32, u32),
    scale: u32,
    output: (u32, u32),
) -> Option<PlaneState> {
    let (tex_w, tex_h) = tex_size;
    let mut state = PlaneState {
        buffer,
        dest_x: -layer.offset.0 as i32,
        dest_y: -layer.offset.1 as i32,
        src_x: 0.0,
        src_y: 0.0,
        src_w: f64::from(tex_w),
        src_h: f64::from(tex_h),
        dst_w: (tex_w as f32 / layer.scale.0).ceil() as i32,
        dst_h: (tex_h as f32 / layer.scale.1).ceil() as i32,
        colorspace: layer.colorspace,
        hdr_metadata: layer.hdr_metadata.clone(),
        opaque: layer.zpos == ZPOS_BASE,
        fractional_scale: scale,
    };
    clip_plane(&mut state, output).then_some(state)
}

/// Plane state visible to host event handlers and the input thread.
pub struct PlaneShared {
    index: usize,
    connector: Arc<ConnectorShared>,
    current: Mutex<Option<PlaneState>>,
    outputs: Mutex<Vec<u32>>,
}

impl PlaneShared {
    pub fn new(index: usize, connector: Arc<ConnectorShared>) -> Self {
        Self {
            index,
            connector,
            current: Mutex::new(None),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_root(&self) -> bool {
        self.index == 0
    }

    pub fn connector(&self) -> &Arc<ConnectorShared> {
        &self.connector
    }

    /// Snapshot of the last presented state.
    pub fn current_state(&self) -> Option<PlaneState> {
        self.current.lock().clone()
    }

    pub(crate) fn set_current_state(&self, state: Option<PlaneState>) {
        *self.current.lock() = state;
    }

    /// Map a surface-local position to normalized output coordinates.
    pub fn surface_to_output(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let current = self.current.lock();
        let state = current.as_ref()?;
        let (out_w, out_h) = self.connector.output().size();
        if out_w == 0 || out_h == 0 {
            return None;
        }
        let scale = f64::from(state.fractional_scale) / f64::from(SCALE_DENOMINATOR);
        Some((
            (x * scale + f64::from(state.dest_x)) / f64::from(out_w),
            (y * scale + f64::from(state.dest_y)) / f64::from(out_h),
        ))
    }

    /// Adopt the highest refresh rate among the outputs the root surface
    /// overlaps. Only meaningful on VRR hosts.
    pub fn update_vrr_refresh(&self, refresh_of: &dyn Fn(u32) -> Option<i32>) {
        if !self.is_root() || !self.connector.is_host_vrr() {
            return;
        }
        let outputs = self.outputs.lock();
        if outputs.is_empty() {
            return;
        }
        let max = outputs.iter().filter_map(|&id| refresh_of(id)).max();
        let Some(max) = max else {
            return;
        };
        let output = self.connector.output();
        if max != output.refresh_mhz() {
            info!("Changed refresh to: {:.3}hz", max as f32 / 1000.0);
            output.set_refresh_mhz(max);
        }
    }
}

impl SurfaceListener for PlaneShared {
    fn on_presented(
        &self,
        time: Duration,
        refresh_ns: u32,
        refresh_of: &dyn Fn(u32) -> Option<i32>,
    ) {
        let connector = &self.connector;
        if refresh_ns != 0 {
            let mhz = refresh_interval_to_mhz(refresh_ns);
            let output = connector.output();
            if mhz != output.refresh_mhz() {
                info!("Changed refresh to: {:.3}hz", mhz as f32 / 1000.0);
                output.set_refresh_mhz(mhz);
                crate::tracy_plot!("refresh_hz", mhz as f64 / 1000.0);
            }
            connector.set_host_vrr(false);
        } else {
            connector.set_host_vrr(true);
            self.update_vrr_refresh(refresh_of);
        }

        connector.vblank().mark_vblank(time);
        connector.vblank().nudge();
        crate::tracy_frame_mark!();
    }

    fn on_discarded(&self) {
        self.connector.vblank().nudge();
    }

    fn on_preferred_scale(&self, scale: u32) {
        if !self.is_root() {
            return;
        }
        let connector = &self.connector;
        let old = connector.scale();
        if old != scale && connector.has_received_scale() {
            connector.output().rescale(old, scale);
        }
        debug!("Preferred fractional scale {} (was {})", scale, old);
        connector.set_scale(scale);
        connector.force_repaint();
    }

    fn on_enter(&self, output: u32, refresh_of: &dyn Fn(u32) -> Option<i32>) {
        {
            let mut outputs = self.outputs.lock();
            if !outputs.contains(&output) {
                outputs.push(output);
            }
        }
        self.update_vrr_refresh(refresh_of);
    }

    fn on_leave(&self, output: u32, refresh_of: &dyn Fn(u32) -> Option<i32>) {
        self.outputs.lock().retain(|&o| o != output);
        self.update_vrr_refresh(refresh_of);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ColorKey {
    colorspace: Colorspace,
    hdr_blob: Option<u64>,
}

struct CachedDescription<D> {
    key: ColorKey,
    description: Option<D>,
}

pub struct Plane<T: Transport> {
    shared: Arc<PlaneShared>,
    surface: T::Surface,
    color: Option<CachedDescription<T::Description>>,
}

impl<T: Transport> Plane<T> {
    pub fn new(shared: Arc<PlaneShared>, surface: T::Surface) -> Self {
        Self {
            shared,
            surface,
            color: None,
        }
    }

    pub fn shared(&self) -> &Arc<PlaneShared> {
        &self.shared
    }

    pub fn surface(&self) -> &T::Surface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut T::Surface {
        &mut self.surface
    }

    /// Show `layer` on this plane, or nothing when it has no host buffer.
    pub fn present_layer(&mut self, transport: &T, layer: Option<&Layer>) {
        let state = layer.and_then(|layer| {
            let tex = layer.tex.as_ref()?;
            let buffer = transport.resolve_fb(tex.fb.as_ref()?)?;
            let connector = &self.shared.connector;
            let state = layer_plane_state(
                layer,
                buffer,
                (tex.width, tex.height),
                connector.scale(),
                connector.output().size(),
            )?;
            fb::on_compositor_acquire(&state.buffer);
            Some(state)
        });
        self.present(transport, state);
    }

    pub fn present(&mut self, transport: &T, state: Option<PlaneState>) {
        self.shared.set_current_state(state.clone());

        let Some(state) = state else {
            self.surface.attach(None);
            self.surface.damage_all();
            return;
        };

        if self.shared.is_root() {
            self.surface.request_presentation_feedback();
        }

        let support = transport.color_support();
        if support.wp {
            self.update_color_description(transport, &state);
        } else if support.frog {
            let (primaries, transfer) = color::frog_color(state.colorspace);
            self.surface.set_frog_color(primaries, transfer);
        }

        let scale = state.fractional_scale;
        self.surface.set_viewport(
            SrcRect {
                x: state.src_x,
                y: state.src_y,
                w: state.src_w,
                h: state.src_h,
            },
            (to_logical(state.dst_w, scale), to_logical(state.dst_h, scale)),
        );
        if !self.shared.is_root() {
            self.surface
                .set_position(to_logical(state.dest_x, scale), to_logical(state.dest_y, scale));
        }
        self.surface.attach(Some(&state.buffer));
        self.surface.damage_all();
        self.surface.set_opaque(state.opaque);
        self.surface.set_buffer_scale(1);
    }

    fn update_color_description(&mut self, transport: &T, state: &PlaneState) {
        let key = ColorKey {
            colorspace: state.colorspace,
            hdr_blob: state.hdr_metadata.as_ref().map(|blob| blob.id()),
        };

        if self.color.as_ref().map(|c| &c.key) != Some(&key) {
            let saturation = self.shared.connector.hdr10_saturation_scale();
            let hdr = state.hdr_metadata.as_ref().and_then(|blob| blob.hdr_metadata());
            let description = color::describe(state.colorspace, hdr, saturation)
                .and_then(|desc| transport.create_description(&desc));
            self.color = Some(CachedDescription { key, description });
        }

        let description = self.color.as_ref().and_then(|c| c.description.as_ref());
        self.surface.set_color_description(description);
    }

    pub fn commit(&mut self) {
        let connector = &self.shared.connector;
        if self.shared.is_root() && connector.take_decor_commit() {
            self.surface.commit_window(connector.logical_size());
        }
        self.surface.commit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::HeadlessFb;

    fn state(dest: (i32, i32), src: (f64, f64), dst: (i32, i32)) -> PlaneState {
        PlaneState {
            dest_x: dest.0,
            dest_y: dest.1,
            src_w: src.0,
            src_h: src.1,
            dst_w: dst.0,
            dst_h: dst.1,
            ..PlaneState::new(HeadlessFb::new_handle())
        }
    }

    #[test]
    fn test_clip_inside_is_identity() {
        let mut s = state((100, 50), (640.0, 360.0), (640, 360));
        clip_plane(&mut s, (1280, 720));
        assert_eq!((s.dst_w, s.dst_h), (640, 360));
        assert_eq!((s.src_w, s.src_h), (640.0, 360.0));
        assert_eq!((s.dest_x, s.dest_y), (100, 50));
    }

    #[test]
    fn test_clip_overhanging_right_edge() {
        let mut s = state((1000, 0), (800.0, 400.0), (400, 200));
        clip_plane(&mut s, (1280, 720));
        // Only 280 of the 400 destination pixels are visible
        assert_eq!(s.dst_w, 280);
        assert_eq!(s.dst_h, 200);
        assert!((s.src_w - 800.0 * 280.0 / 400.0).abs() < 1e-9);
        assert_eq!(s.src_h, 400.0);
    }

    #[test]
    fn test_clip_off_output() {
        let mut s = state((1280, 0), (64.0, 64.0), (64, 64));
        assert!(!clip_plane(&mut s, (1280, 720)));
        let mut s = state((0, 800), (64.0, 64.0), (64, 64));
        assert!(!clip_plane(&mut s, (1280, 720)));

        let layer = Layer {
            offset: (-1400.0, 0.0),
            zpos: 2,
            ..Default::default()
        };
        assert!(layer_plane_state(&layer, HeadlessFb::new_handle(), (64, 64), 120, (1280, 720)).is_none());
    }

    #[test]
    fn test_layer_state_upscaled() {
        let fb = HeadlessFb::new_handle();
        let layer = Layer {
            scale: (0.5, 0.5),
            offset: (-10.0, -20.0),
            zpos: 1,
            ..Default::default()
        };
        let s = layer_plane_state(&layer, fb, (640, 360), 120, (1280, 720)).expect("visible");
        assert_eq!((s.dest_x, s.dest_y), (10, 20));
        // 640 / 0.5 = 1280, clipped by the 10 pixel offset
        assert_eq!(s.dst_w, 1270);
        assert_eq!(s.dst_h, 700);
        assert!(!s.opaque);
        assert!((s.src_w - 640.0 * 1270.0 / 1280.0).abs() < 1e-9);
    }

    #[test]
    fn test_base_layer_is_opaque() {
        let layer = Layer::default();
        let s = layer_plane_state(&layer, HeadlessFb::new_handle(), (1280, 720), 120, (1280, 720))
            .expect("visible");
        assert!(s.opaque);
        assert_eq!((s.dst_w, s.dst_h), (1280, 720));
    }

    proptest::proptest! {
        #[test]
        fn test_clip_never_exceeds_output(
            dest_x in 0i32..1280,
            dest_y in 0i32..720,
            dst_w in 1i32..4000,
            dst_h in 1i32..4000,
        ) {
            let mut s = state((dest_x, dest_y), (f64::from(dst_w), f64::from(dst_h)), (dst_w, dst_h));
            proptest::prop_assert!(clip_plane(&mut s, (1280, 720)));
            proptest::prop_assert!(s.dest_x + s.dst_w <= 1280);
            proptest::prop_assert!(s.dest_y + s.dst_h <= 720);
            proptest::prop_assert!(s.src_w <= f64::from(dst_w) + 1e-9);
        }
    }
}
