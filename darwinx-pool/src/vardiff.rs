//! Per-session variable difficulty controller (§4.6) plus an independent
//! flood-prevention ceiling (SPEC_FULL supplement, grounded in the
//! teacher's `FLOOD_PREVENTION_CAP` doc comment in `stratum_v1/mod.rs`).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct VarDiffConfig {
    pub diff_min: f64,
    pub diff_max: f64,
    pub initial_difficulty: f64,
    pub target_shares_per_min: f64,
    /// Sliding window, in seconds, the share rate is measured over.
    pub adjust_every_seconds: u64,
    /// Step multiplier applied on a rate-triggered adjustment: difficulty is
    /// multiplied by this on an increase, divided by it on a decrease.
    pub adjust_ratio: f64,
    /// Hard ceiling independent of the vardiff target; protects the process
    /// from a runaway or misbehaving miner even while vardiff is still
    /// converging toward the target rate.
    pub max_shares_per_sec: f64,
}

pub struct VarDiff {
    config: VarDiffConfig,
    current: f64,
    window: VecDeque<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    Unchanged,
    Increased(f64),
    Decreased(f64),
}

impl VarDiff {
    pub fn new(config: VarDiffConfig) -> Self {
        let current = config.initial_difficulty.clamp(config.diff_min, config.diff_max);
        Self {
            config,
            current,
            window: VecDeque::new(),
        }
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// True if the per-second share rate over the last second exceeds the
    /// flood cap; the session engine should drop the share (and may choose
    /// to disconnect) without touching `current`.
    pub fn flood_exceeded(&self, now: Instant) -> bool {
        let recent = self
            .window
            .iter()
            .filter(|&&t| now.duration_since(t) <= Duration::from_secs(1))
            .count();
        recent as f64 > self.config.max_shares_per_sec
    }

    /// Record a submit timestamp and re-evaluate the target rate, per the
    /// control law in §4.6: rate = |window|/adjust_every_seconds; >1.5x
    /// target multiplies difficulty by `adjust_ratio`, <0.5x target (above
    /// diff_min) divides by it, otherwise unchanged. Always clamped.
    pub fn record_share(&mut self, now: Instant) -> Adjustment {
        let window = Duration::from_secs(self.config.adjust_every_seconds.max(1));

        self.window.push_back(now);
        while let Some(&front) = self.window.front() {
            if now.duration_since(front) > window {
                self.window.pop_front();
            } else {
                break;
            }
        }

        let rate = self.window.len() as f64 / window.as_secs_f64();
        let target_per_sec = self.config.target_shares_per_min / 60.0;

        if rate > 1.5 * target_per_sec {
            let next = (self.current * self.config.adjust_ratio).min(self.config.diff_max);
            if next != self.current {
                self.current = next;
                return Adjustment::Increased(next);
            }
        } else if rate < 0.5 * target_per_sec && self.current > self.config.diff_min {
            let next = (self.current / self.config.adjust_ratio).max(self.config.diff_min);
            if next != self.current {
                self.current = next;
                return Adjustment::Decreased(next);
            }
        }

        Adjustment::Unchanged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> VarDiffConfig {
        VarDiffConfig {
            diff_min: 1.0,
            diff_max: 1_000_000.0,
            initial_difficulty: 1024.0,
            target_shares_per_min: 20.0,
            adjust_every_seconds: 60,
            adjust_ratio: 2.0,
            max_shares_per_sec: 5.0,
        }
    }

    #[test]
    fn clamps_initial_difficulty() {
        let mut cfg = config();
        cfg.initial_difficulty = 1_000_000_000.0;
        let vd = VarDiff::new(cfg);
        assert_eq!(vd.current(), cfg.diff_max);
    }

    #[test]
    fn high_rate_doubles_difficulty() {
        let mut vd = VarDiff::new(config());
        let start = Instant::now();
        // 40 shares in under 30s -> well above 1.5x the 20/min target.
        let mut last = Adjustment::Unchanged;
        for i in 0..40 {
            last = vd.record_share(start + Duration::from_millis(i * 500));
        }
        assert!(matches!(last, Adjustment::Increased(_)) || vd.current() > 1024.0);
    }

    #[test]
    fn low_rate_halves_difficulty_above_min() {
        let mut vd = VarDiff::new(config());
        let start = Instant::now();
        // One share every 10s for a minute -> well below 0.5x target.
        for i in 0..6 {
            vd.record_share(start + Duration::from_secs(i * 10));
        }
        assert!(vd.current() < 1024.0);
    }

    #[test]
    fn never_drops_below_diff_min() {
        let mut vd = VarDiff::new(config());
        let start = Instant::now();
        for i in 0..100 {
            vd.record_share(start + Duration::from_secs(i * 120));
        }
        assert!(vd.current() >= vd.config.diff_min);
    }

    #[test]
    fn flood_cap_is_independent_of_vardiff_target() {
        let mut vd = VarDiff::new(config());
        let start = Instant::now();
        for i in 0..10 {
            vd.record_share(start + Duration::from_millis(i * 10));
        }
        assert!(vd.flood_exceeded(start + Duration::from_millis(99)));
    }
}
