//! OTA transfer bookkeeping.
//!
//! A transfer is *active* while an image size is recorded and the device
//! (or the upload itself) showed signs of life within the activity
//! window. Activity expires on its own: if the device goes quiet the
//! transfer stops counting as active without any further event, even
//! though `size` keeps its value until the next `begin`, `finish` or
//! `reset`.

use std::time::{Duration, Instant};

use crate::protocol::constants::OTA_ACTIVITY_WINDOW;

#[derive(Debug, Clone, Copy)]
pub struct OtaTracker {
    size: usize,
    last_activity: Option<Instant>,
    window: Duration,
}

impl Default for OtaTracker {
    fn default() -> Self {
        Self::new(OTA_ACTIVITY_WINDOW)
    }
}

impl OtaTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            size: 0,
            last_activity: None,
            window,
        }
    }

    /// Start tracking an upload of `size` bytes.
    pub fn begin(&mut self, size: usize, now: Instant) {
        self.size = size;
        self.last_activity = Some(now);
    }

    /// Record a sign of life.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = Some(now);
    }

    /// Explicit success or failure from the device.
    pub fn finish(&mut self) {
        self.size = 0;
    }

    /// New connection: forget everything.
    pub fn reset(&mut self) {
        self.size = 0;
        self.last_activity = None;
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_active_at(&self, now: Instant) -> bool {
        self.size > 0
            && self
                .last_activity
                .is_some_and(|t| now.saturating_duration_since(t) < self.window)
    }

    /// Progress of `offset` relative to the image size, in whole percent.
    pub fn percentage(&self, offset: u32) -> usize {
        if self.size == 0 {
            return 0;
        }
        (u64::from(offset) * 100 / self.size as u64) as usize
    }
}
