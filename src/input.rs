//! Host input translation
//!
//! This module turns host seat events into synthetic input for the nested
//! clients. It knows nothing about the wire: the Wayland input thread feeds
//! it decoded events and it forwards them to an [`InputSink`] under the
//! global input lock, stamping each with a fake, strictly increasing time.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::backend::plane::PlaneShared;
use crate::config::{InputConfig, Runtime};
use crate::frame::UpscaleFilter;

/// Receiver of synthetic input, usually the nested compositor's seat.
pub trait InputSink: Send {
    fn key(&mut self, key: u32, pressed: bool, time: u32);

    fn button(&mut self, button: u32, pressed: bool, time: u32);

    /// Unaccelerated relative motion.
    fn relative_motion(&mut self, dx: f64, dy: f64, time: u32);

    /// Absolute position in normalized output coordinates.
    fn touch_motion(&mut self, x: f64, y: f64, touch_id: i32, time: u32);

    /// Scroll amounts in wheel detents.
    fn wheel(&mut self, x: f64, y: f64, time: u32);
}

/// The global input lock: every delivery happens with it held.
pub type InputLock = Arc<Mutex<Box<dyn InputSink>>>;

/// Sink that drops everything, for runs without nested clients.
#[derive(Debug, Default)]
pub struct NullSink;

impl InputSink for NullSink {
    fn key(&mut self, _key: u32, _pressed: bool, _time: u32) {}

    fn button(&mut self, _button: u32, _pressed: bool, _time: u32) {}

    fn relative_motion(&mut self, _dx: f64, _dy: f64, _time: u32) {}

    fn touch_motion(&mut self, _x: f64, _y: f64, _touch_id: i32, _time: u32) {}

    fn wheel(&mut self, _x: f64, _y: f64, _time: u32) {}
}

/// Linux evdev key codes of the hotkeys.
pub mod keys {
    pub const KEY_Y: u32 = 21;
    pub const KEY_U: u32 = 22;
    pub const KEY_I: u32 = 23;
    pub const KEY_O: u32 = 24;
    pub const KEY_S: u32 = 31;
    pub const KEY_F: u32 = 33;
    pub const KEY_B: u32 = 48;
    pub const KEY_N: u32 = 49;
}

/// Modifier bits as they appear in the seat's modifier state.
///
/// Derived from the core xkb modifier indices, which every keymap assigns
/// the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModMasks {
    pub shift: u32,
    pub caps: u32,
    pub ctrl: u32,
    pub alt: u32,
    pub num: u32,
    pub meta: u32,
}

impl Default for ModMasks {
    fn default() -> Self {
        Self {
            shift: 1 << 0,
            caps: 1 << 1,
            ctrl: 1 << 2,
            alt: 1 << 3,
            num: 1 << 4,
            meta: 1 << 6,
        }
    }
}

/// Super+key bindings handled locally, acted on key release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hotkey {
    ToggleFullscreen,
    PixelFilter,
    LinearFilter,
    ToggleFsr,
    ToggleNis,
    SharpnessUp,
    SharpnessDown,
    Screenshot,
}

impl Hotkey {
    pub fn from_key(key: u32) -> Option<Self> {
        let hotkey = match key {
            keys::KEY_F => Self::ToggleFullscreen,
            keys::KEY_N => Self::PixelFilter,
            keys::KEY_B => Self::LinearFilter,
            keys::KEY_U => Self::ToggleFsr,
            keys::KEY_Y => Self::ToggleNis,
            keys::KEY_I => Self::SharpnessUp,
            keys::KEY_O => Self::SharpnessDown,
            keys::KEY_S => Self::Screenshot,
            _ => return None,
        };
        Some(hotkey)
    }

    pub fn apply(self, runtime: &Runtime) {
        debug!("Hotkey {:?}", self);
        match self {
            Self::ToggleFullscreen => {
                runtime.toggle_fullscreen();
                runtime.request_repaint();
            }
            Self::PixelFilter => runtime.set_upscale_filter(UpscaleFilter::Pixel),
            Self::LinearFilter => runtime.set_upscale_filter(UpscaleFilter::Linear),
            Self::ToggleFsr => runtime.toggle_upscale_filter(UpscaleFilter::Fsr),
            Self::ToggleNis => runtime.toggle_upscale_filter(UpscaleFilter::Nis),
            Self::SharpnessUp => runtime.adjust_sharpness(1),
            Self::SharpnessDown => runtime.adjust_sharpness(-1),
            Self::Screenshot => runtime.request_screenshot(),
        }
    }
}

/// Result of processing a key event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Delivered to the sink
    Forward,
    /// A hotkey was released and applied
    Hotkey(Hotkey),
    /// A hotkey press, or a repeated state, swallowed
    Swallowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisSource {
    #[default]
    Wheel,
    Finger,
    Continuous,
    WheelTilt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

/// Seat state of the input thread.
pub struct InputTranslator {
    sink: InputLock,
    runtime: Arc<Runtime>,
    config: InputConfig,
    masks: ModMasks,
    fake_timestamp: u32,
    modifiers: u32,
    keyboard_entered: bool,
    held: HashSet<u32>,
    cursor_plane: Option<Arc<PlaneShared>>,
    pending_cursor: Option<(f64, f64)>,
    relative: bool,
    /// Horizontal, vertical.
    scroll_accum: [f64; 2],
    axis_source: AxisSource,
}

impl InputTranslator {
    pub fn new(sink: InputLock, runtime: Arc<Runtime>, config: InputConfig) -> Self {
        Self {
            sink,
            runtime,
            config,
            masks: ModMasks::default(),
            fake_timestamp: 0,
            modifiers: 0,
            keyboard_entered: false,
            held: HashSet::new(),
            cursor_plane: None,
            pending_cursor: None,
            relative: false,
            scroll_accum: [0.0; 2],
            axis_source: AxisSource::Wheel,
        }
    }

    fn next_time(&mut self) -> u32 {
        self.fake_timestamp = self.fake_timestamp.wrapping_add(1);
        self.fake_timestamp
    }

    fn pointer_allowed(&self) -> bool {
        self.config.mouse_warp_without_keyboard_focus || self.keyboard_entered
    }

    pub fn keyboard_entered(&self) -> bool {
        self.keyboard_entered
    }

    pub fn is_relative(&self) -> bool {
        self.relative
    }

    pub fn set_relative(&mut self, relative: bool) {
        self.relative = relative;
    }

    pub fn held_keys(&self) -> usize {
        self.held.len()
    }

    pub fn pointer_enter(&mut self, plane: Arc<PlaneShared>, x: f64, y: f64) {
        self.cursor_plane = Some(plane);
        self.pointer_motion(x, y);
    }

    pub fn pointer_leave(&mut self, plane: &Arc<PlaneShared>) {
        if self
            .cursor_plane
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, plane))
        {
            self.cursor_plane = None;
        }
    }

    /// Surface-local pointer position on the plane under the cursor.
    pub fn pointer_motion(&mut self, x: f64, y: f64) {
        if self.relative {
            return;
        }
        if !self.pointer_allowed() {
            self.pending_cursor = Some((x, y));
            return;
        }
        let Some((nx, ny)) = self
            .cursor_plane
            .as_ref()
            .and_then(|plane| plane.surface_to_output(x, y))
        else {
            return;
        };

        let time = self.next_time();
        self.sink.lock().touch_motion(nx, ny, 0, time);
    }

    pub fn pointer_button(&mut self, button: u32, pressed: bool) {
        if !self.pointer_allowed() {
            return;
        }
        let time = self.next_time();
        self.sink.lock().button(button, pressed, time);
    }

    pub fn pointer_axis_source(&mut self, source: AxisSource) {
        self.axis_source = source;
    }

    pub fn pointer_axis_value120(&mut self, axis: Axis, value120: i32) {
        if !self.pointer_allowed() {
            return;
        }
        let index = match axis {
            Axis::Horizontal => 0,
            Axis::Vertical => 1,
        };
        self.scroll_accum[index] += f64::from(value120) / 120.0;
    }

    /// End of a pointer event group: flush accumulated wheel scrolling.
    pub fn pointer_frame(&mut self) {
        let [x, y] = std::mem::take(&mut self.scroll_accum);
        let source = std::mem::take(&mut self.axis_source);

        if !self.pointer_allowed() || source != AxisSource::Wheel {
            return;
        }
        if x == 0.0 && y == 0.0 {
            return;
        }
        let time = self.next_time();
        self.sink.lock().wheel(x, y, time);
    }

    pub fn relative_motion(&mut self, dx_unaccel: f64, dy_unaccel: f64) {
        if !self.config.relmotion_without_keyboard_focus && !self.keyboard_entered {
            return;
        }
        let time = self.next_time();
        self.sink.lock().relative_motion(dx_unaccel, dy_unaccel, time);
    }

    /// Keyboard focus gained with `keys` already held.
    pub fn keyboard_enter(&mut self, keys: &[u32]) {
        self.keyboard_entered = true;
        self.held.clear();
        for &key in keys {
            self.handle_key(key, true);
            self.held.insert(key);
        }

        if let Some((x, y)) = self.pending_cursor.take() {
            self.pointer_motion(x, y);
        }
    }

    pub fn keyboard_leave(&mut self) {
        self.keyboard_entered = false;
        self.modifiers = 0;
        let held: Vec<u32> = self.held.drain().collect();
        for key in held {
            self.handle_key(key, false);
        }
    }

    pub fn keyboard_key(&mut self, key: u32, pressed: bool) -> KeyAction {
        if !self.keyboard_entered {
            return KeyAction::Swallowed;
        }
        let was_pressed = self.held.contains(&key);
        if was_pressed == pressed {
            trace!("Ignoring repeated state for key {}", key);
            return KeyAction::Swallowed;
        }

        let action = self.handle_key(key, pressed);
        if was_pressed {
            self.held.remove(&key);
        } else {
            self.held.insert(key);
        }
        action
    }

    pub fn keyboard_modifiers(&mut self, depressed: u32, latched: u32, locked: u32) {
        self.modifiers = depressed | latched | locked;
    }

    fn handle_key(&mut self, key: u32, pressed: bool) -> KeyAction {
        if self.modifiers & self.masks.meta != 0 {
            if let Some(hotkey) = Hotkey::from_key(key) {
                if pressed {
                    return KeyAction::Swallowed;
                }
                hotkey.apply(&self.runtime);
                return KeyAction::Hotkey(hotkey);
            }
        }

        let time = self.next_time();
        self.sink.lock().key(key, pressed, time);
        KeyAction::Forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::connector::ConnectorShared;
    use crate::backend::headless::HeadlessFb;
    use crate::backend::plane::PlaneState;
    use crate::config::{Config, OutputState};
    use crate::frame_clock::FrameClock;

    #[derive(Debug, Clone, PartialEq)]
    enum Delivered {
        Key(u32, bool, u32),
        Button(u32, bool),
        Relative(f64, f64),
        Touch(f64, f64),
        Wheel(f64, f64),
    }

    #[derive(Default)]
    struct Recorder(Arc<Mutex<Vec<Delivered>>>);

    impl InputSink for Recorder {
        fn key(&mut self, key: u32, pressed: bool, time: u32) {
            self.0.lock().push(Delivered::Key(key, pressed, time));
        }

        fn button(&mut self, button: u32, pressed: bool, _time: u32) {
            self.0.lock().push(Delivered::Button(button, pressed));
        }

        fn relative_motion(&mut self, dx: f64, dy: f64, _time: u32) {
            self.0.lock().push(Delivered::Relative(dx, dy));
        }

        fn touch_motion(&mut self, x: f64, y: f64, _touch_id: i32, _time: u32) {
            self.0.lock().push(Delivered::Touch(x, y));
        }

        fn wheel(&mut self, x: f64, y: f64, _time: u32) {
            self.0.lock().push(Delivered::Wheel(x, y));
        }
    }

    struct Setup {
        translator: InputTranslator,
        delivered: Arc<Mutex<Vec<Delivered>>>,
        runtime: Arc<Runtime>,
        output: Arc<OutputState>,
    }

    fn setup(config: InputConfig) -> Setup {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink: InputLock = Arc::new(Mutex::new(Box::new(Recorder(delivered.clone()))));
        let runtime = Arc::new(Runtime::default());
        let output = Arc::new(OutputState::new());
        output.set_size(1280, 720);
        let translator = InputTranslator::new(sink, runtime.clone(), config);
        Setup {
            translator,
            delivered,
            runtime,
            output,
        }
    }

    fn plane_at(output: &Arc<OutputState>, dest: (i32, i32), scale: u32) -> Arc<PlaneShared> {
        let connector = Arc::new(ConnectorShared::new(
            0,
            &Config::default(),
            output.clone(),
            Arc::new(Runtime::default()),
            Arc::new(FrameClock::new(output.clone())),
        ));
        let plane = Arc::new(PlaneShared::new(0, connector));
        plane.set_current_state(Some(PlaneState {
            dest_x: dest.0,
            dest_y: dest.1,
            fractional_scale: scale,
            ..PlaneState::new(HeadlessFb::new_handle())
        }));
        plane
    }

    const META: u32 = 1 << 6;

    #[test]
    fn test_hotkey_acts_on_release_only() {
        let mut s = setup(InputConfig::default());
        s.translator.keyboard_enter(&[]);
        s.translator.keyboard_modifiers(META, 0, 0);

        assert_eq!(s.translator.keyboard_key(keys::KEY_I, true), KeyAction::Swallowed);
        assert_eq!(s.runtime.sharpness(), 2);
        assert_eq!(
            s.translator.keyboard_key(keys::KEY_I, false),
            KeyAction::Hotkey(Hotkey::SharpnessUp)
        );
        assert_eq!(s.runtime.sharpness(), 3);
        assert!(s.delivered.lock().is_empty());
    }

    #[test]
    fn test_filter_hotkeys() {
        let mut s = setup(InputConfig::default());
        s.translator.keyboard_enter(&[]);
        s.translator.keyboard_modifiers(META, 0, 0);

        let mut tap = |key| {
            s.translator.keyboard_key(key, true);
            s.translator.keyboard_key(key, false);
        };
        tap(keys::KEY_U);
        assert_eq!(s.runtime.upscale_filter(), UpscaleFilter::Fsr);
        tap(keys::KEY_U);
        assert_eq!(s.runtime.upscale_filter(), UpscaleFilter::Linear);
        tap(keys::KEY_N);
        assert_eq!(s.runtime.upscale_filter(), UpscaleFilter::Pixel);
        tap(keys::KEY_Y);
        assert_eq!(s.runtime.upscale_filter(), UpscaleFilter::Nis);
        tap(keys::KEY_B);
        assert_eq!(s.runtime.upscale_filter(), UpscaleFilter::Linear);
        tap(keys::KEY_F);
        assert!(s.runtime.desired_fullscreen());
        tap(keys::KEY_S);
        assert!(s.runtime.take_screenshot_request());
    }

    #[test]
    fn test_keys_without_meta_are_forwarded_with_increasing_time() {
        let mut s = setup(InputConfig::default());
        s.translator.keyboard_enter(&[]);
        assert_eq!(s.translator.keyboard_key(keys::KEY_F, true), KeyAction::Forward);
        assert_eq!(s.translator.keyboard_key(keys::KEY_F, false), KeyAction::Forward);
        assert_eq!(
            *s.delivered.lock(),
            vec![
                Delivered::Key(keys::KEY_F, true, 1),
                Delivered::Key(keys::KEY_F, false, 2)
            ]
        );
    }

    #[test]
    fn test_duplicate_key_state_ignored() {
        let mut s = setup(InputConfig::default());
        s.translator.keyboard_enter(&[]);
        s.translator.keyboard_key(30, true);
        assert_eq!(s.translator.keyboard_key(30, true), KeyAction::Swallowed);
        assert_eq!(s.delivered.lock().len(), 1);
    }

    #[test]
    fn test_enter_presses_and_leave_releases_held_keys() {
        let mut s = setup(InputConfig::default());
        s.translator.keyboard_enter(&[30, 31]);
        assert_eq!(s.translator.held_keys(), 2);
        s.translator.keyboard_leave();
        assert_eq!(s.translator.held_keys(), 0);

        let delivered = s.delivered.lock();
        let presses = delivered
            .iter()
            .filter(|d| matches!(d, Delivered::Key(_, true, _)))
            .count();
        let releases = delivered
            .iter()
            .filter(|d| matches!(d, Delivered::Key(_, false, _)))
            .count();
        assert_eq!((presses, releases), (2, 2));
    }

    #[test]
    fn test_keys_ignored_without_focus() {
        let mut s = setup(InputConfig::default());
        assert_eq!(s.translator.keyboard_key(30, true), KeyAction::Swallowed);
        assert!(s.delivered.lock().is_empty());
    }

    #[test]
    fn test_motion_maps_to_normalized_output() {
        let mut s = setup(InputConfig::default());
        let plane = plane_at(&s.output, (0, 0), 240);
        // Surface-local 320x180 at scale 2 is physical 640x360
        s.translator.pointer_enter(plane, 320.0, 180.0);
        assert_eq!(*s.delivered.lock(), vec![Delivered::Touch(0.5, 0.5)]);
    }

    #[test]
    fn test_motion_dropped_while_relative() {
        let mut s = setup(InputConfig::default());
        let plane = plane_at(&s.output, (0, 0), 120);
        s.translator.set_relative(true);
        s.translator.pointer_enter(plane, 10.0, 10.0);
        assert!(s.delivered.lock().is_empty());
    }

    #[test]
    fn test_motion_pending_until_keyboard_enter() {
        let mut s = setup(InputConfig {
            mouse_warp_without_keyboard_focus: false,
            relmotion_without_keyboard_focus: false,
        });
        let plane = plane_at(&s.output, (0, 0), 120);
        s.translator.pointer_enter(plane, 640.0, 0.0);
        s.translator.pointer_button(272, true);
        assert!(s.delivered.lock().is_empty());

        s.translator.keyboard_enter(&[]);
        assert_eq!(*s.delivered.lock(), vec![Delivered::Touch(0.5, 0.0)]);
    }

    #[test]
    fn test_wheel_accumulates_until_frame() {
        let mut s = setup(InputConfig::default());
        s.translator.pointer_axis_value120(Axis::Vertical, 60);
        s.translator.pointer_axis_value120(Axis::Vertical, 60);
        s.translator.pointer_axis_value120(Axis::Horizontal, -120);
        assert!(s.delivered.lock().is_empty());
        s.translator.pointer_frame();
        assert_eq!(*s.delivered.lock(), vec![Delivered::Wheel(-1.0, 1.0)]);
    }

    #[test]
    fn test_finger_scroll_not_delivered() {
        let mut s = setup(InputConfig::default());
        s.translator.pointer_axis_source(AxisSource::Finger);
        s.translator.pointer_axis_value120(Axis::Vertical, 120);
        s.translator.pointer_frame();
        assert!(s.delivered.lock().is_empty());

        // Source resets to wheel after the frame
        s.translator.pointer_axis_value120(Axis::Vertical, 120);
        s.translator.pointer_frame();
        assert_eq!(*s.delivered.lock(), vec![Delivered::Wheel(0.0, 1.0)]);
    }

    #[test]
    fn test_relative_motion_requires_focus() {
        let mut s = setup(InputConfig::default());
        s.translator.relative_motion(1.0, 2.0);
        assert!(s.delivered.lock().is_empty());
        s.translator.keyboard_enter(&[]);
        s.translator.relative_motion(1.0, 2.0);
        assert_eq!(*s.delivered.lock(), vec![Delivered::Relative(1.0, 2.0)]);
    }
}
