//! Render-side frame clock.
//!
//! Counts frames emitted since the last reset (silence included) and keeps the baseline
//! used to pace position reports. The raw counter is rebased before it grows past
//! `rebase_frames`; the baseline is kept relative to the counter, so both move in the
//! same step, and the rebase is recorded in `rebases` so [`PlaybackClock::absolute`]
//! never jumps.

/// Monotonic frame counter with an overflow guard.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frames: u64,
    rebases: u64,
    since_report: u64,
    rebase_frames: u64,
}

impl PlaybackClock {
    pub fn new(rebase_frames: u64) -> Self {
        Self {
            frames: 0,
            rebases: 0,
            since_report: 0,
            rebase_frames: rebase_frames.max(1),
        }
    }

    /// Advance by `frames` emitted frames and apply the overflow guard.
    pub fn advance(&mut self, frames: u64) {
        self.frames = self.frames.saturating_add(frames);
        self.since_report = self.since_report.saturating_add(frames);
        while self.frames >= self.rebase_frames {
            self.frames -= self.rebase_frames;
            self.rebases += 1;
        }
    }

    /// Returns `true` (and moves the baseline) when at least `interval` frames have
    /// passed since the previous report.
    pub fn take_report(&mut self, interval: u64) -> bool {
        if self.since_report >= interval {
            self.since_report = 0;
            true
        } else {
            false
        }
    }

    /// Frames since the last reset, unaffected by rebasing.
    pub fn absolute(&self) -> u64 {
        self.rebases
            .saturating_mul(self.rebase_frames)
            .saturating_add(self.frames)
    }

    /// Raw counter since the last rebase.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Number of rebases since the last reset.
    pub fn rebases(&self) -> u64 {
        self.rebases
    }

    /// Absolute clock value at the last position report.
    pub fn report_baseline(&self) -> u64 {
        self.absolute().saturating_sub(self.since_report)
    }

    /// Zero the counter and the report baseline together.
    pub fn reset(&mut self) {
        self.frames = 0;
        self.rebases = 0;
        self.since_report = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_interval() {
        let mut clock = PlaybackClock::new(u64::MAX);
        let mut reports = 0;
        for _ in 0..100 {
            clock.advance(128);
            if clock.take_report(1_470) {
                reports += 1;
            }
        }
        // 12_800 frames / 1_470 ≈ 8.7; each report lands on a quantum boundary.
        assert_eq!(reports, 8);
        assert_eq!(clock.absolute(), 12_800);
    }

    #[test]
    fn rebase_keeps_absolute_and_report_spacing() {
        let mut clock = PlaybackClock::new(1_000);
        clock.advance(900);
        assert!(clock.take_report(500));
        assert_eq!(clock.report_baseline(), 900);

        clock.advance(200);
        assert_eq!(clock.rebases(), 1);
        assert_eq!(clock.frames(), 100);
        assert_eq!(clock.absolute(), 1_100);
        assert_eq!(clock.report_baseline(), 900);
        assert!(!clock.take_report(500));
        clock.advance(300);
        assert!(clock.take_report(500));
    }

    #[test]
    fn large_advance_rebases_repeatedly() {
        let mut clock = PlaybackClock::new(100);
        clock.advance(1_050);
        assert_eq!(clock.rebases(), 10);
        assert_eq!(clock.frames(), 50);
        assert_eq!(clock.absolute(), 1_050);
    }

    #[test]
    fn reset_clears_baseline() {
        let mut clock = PlaybackClock::new(100);
        clock.advance(250);
        clock.take_report(10);
        clock.reset();
        assert_eq!(clock.absolute(), 0);
        assert_eq!(clock.report_baseline(), 0);
        assert!(!clock.take_report(10));
    }
}
