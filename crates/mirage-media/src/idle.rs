//! Idle-run tracking.

use mirage_models::blur_scale;

/// What to do with one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameDecision {
    /// The frame showed no motion towards its successor
    pub idle: bool,
    /// Resolution factor to degrade the frame by, if any
    pub scale: Option<f32>,
}

impl FrameDecision {
    /// Decision for a frame with motion.
    pub fn active() -> Self {
        Self {
            idle: false,
            scale: None,
        }
    }
}

/// Counts consecutive idle frames and maps the run length to a
/// degradation factor.
#[derive(Debug, Clone)]
pub struct IdleTracker {
    criteria: u32,
    idle_frames: u32,
}

impl IdleTracker {
    pub fn new(criteria: u32) -> Self {
        Self {
            criteria,
            idle_frames: 0,
        }
    }

    /// Length of the current idle run.
    pub fn idle_frames(&self) -> u32 {
        self.idle_frames
    }

    /// Record whether the latest frame pair showed motion.
    pub fn observe(&mut self, has_motion: bool) -> FrameDecision {
        if has_motion {
            self.idle_frames = 0;
            return FrameDecision::active();
        }

        self.idle_frames = self.idle_frames.saturating_add(1);
        FrameDecision {
            idle: true,
            scale: blur_scale(self.idle_frames, self.criteria),
        }
    }

    pub fn reset(&mut self) {
        self.idle_frames = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degrades_after_criteria() {
        let mut tracker = IdleTracker::new(5);

        for _ in 0..4 {
            let decision = tracker.observe(false);
            assert!(decision.idle);
            assert_eq!(decision.scale, None);
        }

        assert_eq!(tracker.observe(false).scale, Some(0.8));
        assert_eq!(tracker.idle_frames(), 5);
    }

    #[test]
    fn test_motion_resets_run() {
        let mut tracker = IdleTracker::new(2);
        tracker.observe(false);
        tracker.observe(false);
        assert_eq!(tracker.observe(false).scale, Some(0.8));

        let decision = tracker.observe(true);
        assert_eq!(decision, FrameDecision::active());
        assert_eq!(tracker.idle_frames(), 0);
        assert_eq!(tracker.observe(false).scale, None);
    }

    #[test]
    fn test_long_run_reaches_floor() {
        let mut tracker = IdleTracker::new(1);
        let mut last = FrameDecision::active();
        for _ in 0..100 {
            last = tracker.observe(false);
        }
        assert_eq!(last.scale, Some(0.1));

        tracker.reset();
        assert_eq!(tracker.idle_frames(), 0);
    }
}
