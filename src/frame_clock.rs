//! Frame clock for VBlank prediction.
//!
//! Tracks the last presentation time reported by the host and the output
//! refresh interval to predict the next VBlank. The presentation path feeds
//! it through [`VblankTimer`]; the main loop asks it when to wake up for the
//! next frame.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, trace};

use crate::config::OutputState;
use crate::utils::{get_monotonic_time, mhz_to_interval};

/// Bookkeeping interface of the vblank timer driving frame scheduling.
pub trait VblankTimer: Send + Sync {
    /// The host presented a frame at `time` (monotonic).
    fn mark_vblank(&self, time: Duration);

    fn update_was_compositing(&self, was_compositing: bool);

    /// How long the last frame took from wakeup to commit.
    fn update_last_draw_time(&self, draw_time: Duration);

    /// Wake the timer without a vblank (feedback discarded).
    fn nudge(&self) {}
}

/// Extra slack added to the measured draw time when computing wakeups.
const DRAW_SLACK: Duration = Duration::from_micros(1_500);

#[derive(Debug, Default)]
struct ClockInner {
    last_presentation_time: Option<Duration>,
    was_compositing: bool,
    last_draw_time: Duration,
    nudged: bool,
}

#[derive(Debug)]
pub struct FrameClock {
    output: Arc<OutputState>,
    inner: Mutex<ClockInner>,
}

impl FrameClock {
    pub fn new(output: Arc<OutputState>) -> Self {
        Self {
            output,
            inner: Mutex::new(ClockInner::default()),
        }
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        mhz_to_interval(self.output.refresh_mhz())
    }

    pub fn last_presentation_time(&self) -> Option<Duration> {
        self.inner.lock().last_presentation_time
    }

    pub fn was_compositing(&self) -> bool {
        self.inner.lock().was_compositing
    }

    pub fn take_nudge(&self) -> bool {
        std::mem::take(&mut self.inner.lock().nudged)
    }

    /// Predict the next presentation time based on the last VBlank and refresh interval.
    pub fn next_presentation_time(&self) -> Duration {
        let mut now = get_monotonic_time();

        let Some(refresh_interval) = self.refresh_interval() else {
            return now;
        };
        let Some(last_presentation_time) = self.last_presentation_time() else {
            return now;
        };

        let refresh_interval_ns = refresh_interval.as_nanos() as u64;

        if now <= last_presentation_time {
            // Got an early VBlank.
            let orig_now = now;
            now += refresh_interval;

            if now < last_presentation_time {
                error!(
                    now = ?orig_now,
                    ?last_presentation_time,
                    "got a 2+ early VBlank, {:?} until presentation",
                    last_presentation_time - now,
                );
                now = last_presentation_time + refresh_interval;
            }
        }

        let since_last_ns = (now - last_presentation_time).as_nanos() as u64;
        let to_next_ns = (since_last_ns / refresh_interval_ns + 1) * refresh_interval_ns;

        last_presentation_time + Duration::from_nanos(to_next_ns)
    }

    /// When to wake up so the next frame is committed before the VBlank.
    pub fn next_wakeup_time(&self) -> Duration {
        let next = self.next_presentation_time();
        let budget = self.inner.lock().last_draw_time + DRAW_SLACK;
        next.saturating_sub(budget).max(get_monotonic_time())
    }
}

impl VblankTimer for FrameClock {
    fn mark_vblank(&self, time: Duration) {
        if time.is_zero() {
            return;
        }
        trace!("vblank at {:?}", time);
        self.inner.lock().last_presentation_time = Some(time);
    }

    fn update_was_compositing(&self, was_compositing: bool) {
        self.inner.lock().was_compositing = was_compositing;
    }

    fn update_last_draw_time(&self, draw_time: Duration) {
        self.inner.lock().last_draw_time = draw_time;
    }

    fn nudge(&self) {
        self.inner.lock().nudged = true;
    }
}
