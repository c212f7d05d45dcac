//! Recording stand-ins for the presentation path's collaborators.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::headless::HeadlessFb;
use crate::color::HdrInfo;
use crate::edid::EdidWriter;
use crate::frame::{FrameInfo, Texture};
use crate::frame_clock::VblankTimer;
use crate::input::InputSink;
use crate::render::CompositeRenderer;

/// GPU compositor that hands out one fixed output image.
pub struct RecordingRenderer {
    output: Texture,
    fail: AtomicBool,
    next_sequence: AtomicU64,
    composites: AtomicUsize,
    waits: Mutex<Vec<u64>>,
}

impl RecordingRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            output: Texture {
                width,
                height,
                has_alpha: false,
                fb: Some(HeadlessFb::new_handle()),
            },
            fail: AtomicBool::new(false),
            next_sequence: AtomicU64::new(1),
            composites: AtomicUsize::new(0),
            waits: Mutex::new(Vec::new()),
        }
    }

    /// Make every following composite fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn composite_count(&self) -> usize {
        self.composites.load(Ordering::Relaxed)
    }

    pub fn waits(&self) -> Vec<u64> {
        self.waits.lock().clone()
    }

    /// Headless id of the output image's framebuffer.
    pub fn output_fb_id(&self) -> Option<u64> {
        self.output.fb.as_ref().and_then(HeadlessFb::id_of)
    }
}

impl CompositeRenderer for RecordingRenderer {
    fn composite(&self, _frame: &FrameInfo) -> Option<u64> {
        self.composites.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.next_sequence.fetch_add(1, Ordering::Relaxed))
    }

    fn wait(&self, sequence: u64) {
        self.waits.lock().push(sequence);
    }

    fn output_image(&self) -> Option<Texture> {
        Some(self.output.clone())
    }
}

#[derive(Debug, Default)]
pub struct RecordingVblank {
    vblanks: Mutex<Vec<Duration>>,
    was_compositing: Mutex<Vec<bool>>,
    draw_times: Mutex<Vec<Duration>>,
    nudges: AtomicUsize,
}

impl RecordingVblank {
    pub fn vblanks(&self) -> Vec<Duration> {
        self.vblanks.lock().clone()
    }

    pub fn was_compositing(&self) -> Vec<bool> {
        self.was_compositing.lock().clone()
    }

    pub fn draw_time_count(&self) -> usize {
        self.draw_times.lock().len()
    }

    pub fn nudge_count(&self) -> usize {
        self.nudges.load(Ordering::Relaxed)
    }
}

impl VblankTimer for RecordingVblank {
    fn mark_vblank(&self, time: Duration) {
        self.vblanks.lock().push(time);
    }

    fn update_was_compositing(&self, was_compositing: bool) {
        self.was_compositing.lock().push(was_compositing);
    }

    fn update_last_draw_time(&self, draw_time: Duration) {
        self.draw_times.lock().push(draw_time);
    }

    fn nudge(&self) {
        self.nudges.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
pub struct RecordingEdidWriter {
    writes: Mutex<Vec<(Vec<u8>, HdrInfo)>>,
}

impl RecordingEdidWriter {
    pub fn write_count(&self) -> usize {
        self.writes.lock().len()
    }

    pub fn last(&self) -> Option<(Vec<u8>, HdrInfo)> {
        self.writes.lock().last().cloned()
    }
}

impl EdidWriter for RecordingEdidWriter {
    fn write_patched(&self, edid: &[u8], hdr: &HdrInfo) {
        self.writes.lock().push((edid.to_vec(), *hdr));
    }
}

/// One delivery to a [`RecordingSink`], timestamps included.
#[derive(Debug, Clone, PartialEq)]
pub enum InputRecord {
    Key { key: u32, pressed: bool, time: u32 },
    Button { button: u32, pressed: bool, time: u32 },
    RelativeMotion { dx: f64, dy: f64, time: u32 },
    TouchMotion { x: f64, y: f64, time: u32 },
    Wheel { x: f64, y: f64, time: u32 },
}

/// Input sink that appends to a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<InputRecord>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<InputRecord> {
        self.log.lock().clone()
    }

    pub fn take(&self) -> Vec<InputRecord> {
        std::mem::take(&mut *self.log.lock())
    }
}

impl InputSink for RecordingSink {
    fn key(&mut self, key: u32, pressed: bool, time: u32) {
        self.log.lock().push(InputRecord::Key { key, pressed, time });
    }

    fn button(&mut self, button: u32, pressed: bool, time: u32) {
        self.log.lock().push(InputRecord::Button {
            button,
            pressed,
            time,
        });
    }

    fn relative_motion(&mut self, dx: f64, dy: f64, time: u32) {
        self.log
            .lock()
            .push(InputRecord::RelativeMotion { dx, dy, time });
    }

    fn touch_motion(&mut self, x: f64, y: f64, _touch_id: i32, time: u32) {
        self.log.lock().push(InputRecord::TouchMotion { x, y, time });
    }

    fn wheel(&mut self, x: f64, y: f64, time: u32) {
        self.log.lock().push(InputRecord::Wheel { x, y, time });
    }
}
