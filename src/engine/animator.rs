//! Synthetic, time-driven progress for a non-streaming optimizer call.
//!
//! The optimizer gives no progress signal, so the animator plays a fixed script of
//! labelled stages. It never looks at the real call; it only reports the passage of time.

use crate::model::StageTick;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

pub const DEFAULT_TICKS_PER_STAGE: u32 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    pub label: String,
    /// Nominal duration; also the stage's weight in overall progress.
    pub duration: Duration,
}

impl Stage {
    pub fn new(label: impl Into<String>, duration: Duration) -> Self {
        Self {
            label: label.into(),
            duration,
        }
    }
}

pub fn default_stages() -> Vec<Stage> {
    vec![
        Stage::new("Loading offerings and instructors", Duration::from_millis(600)),
        Stage::new("Generating initial population", Duration::from_millis(800)),
        Stage::new("Evaluating fitness", Duration::from_millis(1200)),
        Stage::new("Evolving generations", Duration::from_millis(2400)),
        Stage::new("Selecting best allocation", Duration::from_millis(600)),
    ]
}

/// Rescale stage durations so they add up to `total`, keeping their proportions.
pub fn scale_stages(stages: &[Stage], total: Duration) -> Vec<Stage> {
    let current: Duration = stages.iter().map(|s| s.duration).sum();
    if current.is_zero() {
        let each = total / (stages.len().max(1) as u32);
        return stages
            .iter()
            .map(|s| Stage::new(s.label.clone(), each))
            .collect();
    }
    stages
        .iter()
        .map(|s| {
            let nanos = s.duration.as_nanos() * total.as_nanos() / current.as_nanos();
            Stage::new(s.label.clone(), Duration::from_nanos(nanos as u64))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct StageAnimator {
    stages: Vec<Stage>,
    ticks_per_stage: u32,
}

struct Cursor {
    stages: Vec<Stage>,
    weights: Vec<f64>,
    total_weight: f64,
    ticks_per_stage: u32,
    stage: usize,
    step: u32,
    completed_weight: f64,
}

impl StageAnimator {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            ticks_per_stage: DEFAULT_TICKS_PER_STAGE,
        }
    }

    pub fn with_ticks_per_stage(mut self, ticks: u32) -> Self {
        self.ticks_per_stage = ticks.max(1);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Play the script. The stream is finite, ends at exactly 100% overall, and
    /// dropping it cancels the pending tick timer.
    pub fn run(self) -> BoxStream<'static, StageTick> {
        let mut weights: Vec<f64> = self
            .stages
            .iter()
            .map(|s| s.duration.as_secs_f64())
            .collect();
        if weights.iter().all(|w| *w <= 0.0) {
            weights.iter_mut().for_each(|w| *w = 1.0);
        }
        let total_weight = weights.iter().sum();
        let cursor = Cursor {
            stages: self.stages,
            weights,
            total_weight,
            ticks_per_stage: self.ticks_per_stage,
            stage: 0,
            step: 0,
            completed_weight: 0.0,
        };

        stream::unfold(cursor, |mut c| async move {
            let stage = c.stages.get(c.stage)?;
            tokio::time::sleep(stage.duration / c.ticks_per_stage).await;

            c.step += 1;
            let weight = c.weights[c.stage];
            let fraction = c.step as f64 / c.ticks_per_stage as f64;
            let is_last_tick = c.stage + 1 == c.stages.len() && c.step == c.ticks_per_stage;
            let overall_pct = if is_last_tick {
                100.0
            } else {
                ((c.completed_weight + weight * fraction) / c.total_weight * 100.0).min(100.0)
            };
            let tick = StageTick {
                overall_pct,
                stage_index: c.stage,
                stage_label: stage.label.clone(),
                stage_pct: c.step as f64 * 100.0 / c.ticks_per_stage as f64,
            };

            if c.step == c.ticks_per_stage {
                c.completed_weight += weight;
                c.stage += 1;
                c.step = 0;
            }
            Some((tick, c))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn emits_every_tick_and_ends_at_full_progress() {
        let animator = StageAnimator::new(default_stages());
        let total = animator.total_duration();
        let start = Instant::now();
        let ticks: Vec<StageTick> = animator.run().collect().await;

        assert_eq!(ticks.len(), 5 * DEFAULT_TICKS_PER_STAGE as usize);
        assert_eq!(ticks.last().unwrap().overall_pct, 100.0);
        assert!(ticks
            .windows(2)
            .all(|w| w[0].overall_pct <= w[1].overall_pct));

        let elapsed = start.elapsed();
        assert!(elapsed >= total, "finished early: {elapsed:?}");
        assert!(elapsed < total + Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn stages_play_in_order_with_their_own_progress() {
        let stages = vec![
            Stage::new("one", Duration::from_millis(100)),
            Stage::new("two", Duration::from_millis(300)),
        ];
        let ticks: Vec<StageTick> = StageAnimator::new(stages)
            .with_ticks_per_stage(4)
            .run()
            .collect()
            .await;

        let labels: Vec<&str> = ticks.iter().map(|t| t.stage_label.as_str()).collect();
        assert_eq!(
            labels,
            ["one", "one", "one", "one", "two", "two", "two", "two"]
        );
        assert_eq!(ticks[3].stage_pct, 100.0);
        assert_eq!(ticks[4].stage_pct, 25.0);
        // The first stage carries a quarter of the total weight.
        assert!((ticks[3].overall_pct - 25.0).abs() < 1e-9);
        assert_eq!(ticks[7].stage_index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_one_interval() {
        let stages = vec![Stage::new("only", Duration::from_millis(200))];
        let mut ticks = StageAnimator::new(stages).run();
        let start = Instant::now();
        let first = ticks.next().await.unwrap();
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(10) && waited < Duration::from_millis(11));
        assert_eq!(first.stage_pct, 5.0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_script_still_completes() {
        let stages = vec![
            Stage::new("a", Duration::ZERO),
            Stage::new("b", Duration::ZERO),
        ];
        let ticks: Vec<StageTick> = StageAnimator::new(stages)
            .with_ticks_per_stage(2)
            .run()
            .collect()
            .await;
        assert_eq!(ticks.len(), 4);
        assert_eq!(ticks[1].overall_pct, 50.0);
        assert_eq!(ticks[3].overall_pct, 100.0);

        let none: Vec<StageTick> = StageAnimator::new(Vec::new()).run().collect().await;
        assert!(none.is_empty());
    }

    #[test]
    fn scaling_keeps_proportions() {
        let scaled = scale_stages(&default_stages(), Duration::from_millis(2800));
        let total: Duration = scaled.iter().map(|s| s.duration).sum();
        assert_eq!(total, Duration::from_millis(2800));
        assert_eq!(scaled[0].duration, Duration::from_millis(300));
        assert_eq!(scaled[3].duration, Duration::from_millis(1200));
        assert_eq!(scaled[3].label, "Evolving generations");
    }
}
