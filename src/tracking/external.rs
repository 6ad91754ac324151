//! Tracker for poses supplied from outside (motion capture, SLAM, files)

use crate::view::View;
use super::state::{Tracker, TrackingQuality, TrackingState};

/// Accepts whatever pose was seeded into the tracking state
#[derive(Debug, Default)]
pub struct ExternalTracker;

impl ExternalTracker {
    pub fn new() -> Self {
        Self
    }
}

impl Tracker for ExternalTracker {
    fn track(&mut self, _state: &mut TrackingState, _view: &View) -> TrackingQuality {
        TrackingQuality::PERFECT
    }

    fn requires_reference(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "external"
    }
}
