//! Frame timing utilities

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Pipeline stages timed per frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    View,
    Tracking,
    Fusion,
    Raycast,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::View, Stage::Tracking, Stage::Fusion, Stage::Raycast];

    fn index(self) -> usize {
        match self {
            Stage::View => 0,
            Stage::Tracking => 1,
            Stage::Fusion => 2,
            Stage::Raycast => 3,
        }
    }
}

/// Per-stage milliseconds for one frame
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct StageTimings {
    pub view_ms: f32,
    pub tracking_ms: f32,
    pub fusion_ms: f32,
    pub raycast_ms: f32,
}

impl StageTimings {
    pub fn total_ms(&self) -> f32 {
        self.view_ms + self.tracking_ms + self.fusion_ms + self.raycast_ms
    }

    fn slot_mut(&mut self, stage: Stage) -> &mut f32 {
        match stage {
            Stage::View => &mut self.view_ms,
            Stage::Tracking => &mut self.tracking_ms,
            Stage::Fusion => &mut self.fusion_ms,
            Stage::Raycast => &mut self.raycast_ms,
        }
    }
}

/// Tracks per-stage timings and a rolling frame-rate window
pub struct FrameTimer {
    frame_start: Option<Instant>,
    stage_start: [Option<Instant>; 4],
    current: StageTimings,
    last: StageTimings,
    frame_count: u64,
    /// Ring buffer of (timestamp, frame_time_secs) for rolling stats
    frame_history: VecDeque<(Instant, f32)>,
    window: Duration,
}

impl FrameTimer {
    /// Create a new frame timer with a 5 second rolling window
    pub fn new() -> Self {
        Self {
            frame_start: None,
            stage_start: [None; 4],
            current: StageTimings::default(),
            last: StageTimings::default(),
            frame_count: 0,
            frame_history: VecDeque::new(),
            window: Duration::from_secs(5),
        }
    }

    /// Call at the start of every processed frame
    pub fn begin_frame(&mut self) {
        self.frame_start = Some(Instant::now());
        self.current = StageTimings::default();
    }

    pub fn begin_stage(&mut self, stage: Stage) {
        self.stage_start[stage.index()] = Some(Instant::now());
    }

    pub fn end_stage(&mut self, stage: Stage) {
        if let Some(start) = self.stage_start[stage.index()].take() {
            *self.current.slot_mut(stage) += start.elapsed().as_secs_f32() * 1000.0;
        }
    }

    /// Close the frame and fold it into the rolling window
    pub fn end_frame(&mut self) -> StageTimings {
        let now = Instant::now();
        if let Some(start) = self.frame_start.take() {
            self.frame_history.push_back((now, (now - start).as_secs_f32()));
        }
        self.frame_count += 1;
        self.last = self.current;

        // Prune frames older than the window
        while let Some(&(timestamp, _)) = self.frame_history.front() {
            if now.duration_since(timestamp) > self.window {
                self.frame_history.pop_front();
            } else {
                break;
            }
        }

        self.last
    }

    /// Timings of the most recently completed frame
    pub fn last(&self) -> StageTimings {
        self.last
    }

    /// Total frames completed
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average processing rate over the rolling window (frames per second of
    /// processing time, not wall clock)
    pub fn processing_fps(&self) -> f32 {
        let total: f32 = self.frame_history.iter().map(|&(_, t)| t).sum();
        if total > 0.0 {
            self.frame_history.len() as f32 / total
        } else {
            0.0
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_accumulates() {
        let mut timer = FrameTimer::new();
        timer.begin_frame();
        timer.begin_stage(Stage::Fusion);
        std::thread::sleep(Duration::from_millis(2));
        timer.end_stage(Stage::Fusion);
        let timings = timer.end_frame();

        assert!(timings.fusion_ms >= 1.0);
        assert_eq!(timings.view_ms, 0.0);
        assert_eq!(timer.frame_count(), 1);
        assert!(timer.processing_fps() > 0.0);
    }

    #[test]
    fn test_end_without_begin_is_noop() {
        let mut timer = FrameTimer::new();
        timer.begin_frame();
        timer.end_stage(Stage::Raycast);
        assert_eq!(timer.end_frame().total_ms(), 0.0);
    }
}
