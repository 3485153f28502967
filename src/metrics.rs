//! Per-tick and per-run counters
//!
//! Metrics are plain values owned by whoever asked for them: `tick` returns a
//! `TickMetrics`, the physics thread folds those into a `RunMetrics`.

use std::time::Duration;

use serde::Serialize;

use crate::pipeline::PublishOutcome;

/// What happened during one `Simulation::tick`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TickMetrics {
    pub substeps: u32,
    /// Unique broad-phase pairs handed to the narrow phase
    pub candidate_pairs: u64,
    /// Pairs found overlapping
    pub contacts: u64,
    /// Approaching pairs that received an impulse
    pub impulses: u64,
    pub wall_hits: u64,
    /// Pairs skipped because a body held non-finite state
    pub skipped_pairs: u64,
    /// Non-finite bodies rolled back to their last valid state
    pub bodies_restored: u32,
    /// Non-finite bodies moved to the arena centre
    pub bodies_reset: u32,
    pub elapsed: Duration,
}

impl TickMetrics {
    /// Sum of two partial counts (used as a rayon reduction)
    pub fn merged(mut self, other: Self) -> Self {
        self.accumulate(&other);
        self
    }

    pub fn accumulate(&mut self, other: &Self) {
        self.substeps += other.substeps;
        self.candidate_pairs += other.candidate_pairs;
        self.contacts += other.contacts;
        self.impulses += other.impulses;
        self.wall_hits += other.wall_hits;
        self.skipped_pairs += other.skipped_pairs;
        self.bodies_restored += other.bodies_restored;
        self.bodies_reset += other.bodies_reset;
        self.elapsed += other.elapsed;
    }

    /// Bodies that needed repair this tick
    pub fn repaired(&self) -> u32 {
        self.bodies_restored + self.bodies_reset
    }
}

/// Totals for a physics thread's lifetime
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunMetrics {
    pub ticks: u64,
    /// Wall time spent inside `tick`
    pub busy: Duration,
    /// Ticks that took longer than the physics period
    pub overruns: u64,
    /// Backlogged ticks discarded by the catch-up limit
    pub dropped_ticks: u64,
    pub frames_published: u64,
    /// Ready frames replaced before the consumer took them
    pub frames_superseded: u64,
    /// Running sum of every tick's counters
    pub totals: TickMetrics,
    pub last_tick: TickMetrics,
}

impl RunMetrics {
    pub fn record_tick(&mut self, tick: &TickMetrics, budget: Duration) -> bool {
        self.ticks += 1;
        self.busy += tick.elapsed;
        self.totals.accumulate(tick);
        self.last_tick = *tick;

        let overran = tick.elapsed > budget;
        if overran {
            self.overruns += 1;
        }
        overran
    }

    pub fn record_publish(&mut self, outcome: PublishOutcome) {
        match outcome {
            PublishOutcome::Published => self.frames_published += 1,
            PublishOutcome::Superseded => {
                self.frames_published += 1;
                self.frames_superseded += 1;
            }
            PublishOutcome::Shutdown => {}
        }
    }

    /// Mean wall time per tick
    pub fn average_tick_time(&self) -> Duration {
        if self.ticks == 0 {
            Duration::ZERO
        } else {
            self.busy / self.ticks.min(u32::MAX as u64) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_sums_counts() {
        let a = TickMetrics {
            candidate_pairs: 3,
            contacts: 2,
            impulses: 1,
            ..Default::default()
        };
        let b = TickMetrics {
            candidate_pairs: 4,
            wall_hits: 5,
            bodies_reset: 1,
            ..Default::default()
        };

        let sum = a.merged(b);
        assert_eq!(sum.candidate_pairs, 7);
        assert_eq!(sum.contacts, 2);
        assert_eq!(sum.wall_hits, 5);
        assert_eq!(sum.repaired(), 1);
    }

    #[test]
    fn test_run_metrics_tracks_overruns_and_frames() {
        let mut run = RunMetrics::default();
        let fast = TickMetrics {
            elapsed: Duration::from_micros(100),
            ..Default::default()
        };
        let slow = TickMetrics {
            elapsed: Duration::from_millis(10),
            ..Default::default()
        };
        let budget = Duration::from_millis(4);

        assert!(!run.record_tick(&fast, budget));
        assert!(run.record_tick(&slow, budget));
        assert_eq!(run.ticks, 2);
        assert_eq!(run.overruns, 1);
        assert_eq!(run.average_tick_time(), (fast.elapsed + slow.elapsed) / 2);

        run.record_publish(PublishOutcome::Published);
        run.record_publish(PublishOutcome::Superseded);
        run.record_publish(PublishOutcome::Shutdown);
        assert_eq!(run.frames_published, 2);
        assert_eq!(run.frames_superseded, 1);
    }
}
