//! Optimizer parameter resolution.
//!
//! Defaults come from the backend once per session. When they are unavailable the
//! built-in defaults are used instead; a missing backend default is never fatal.

use crate::api::SchedulerApi;
use crate::error::{ConfigUnavailable, RemoteError, RunError};
use crate::model::{OptimizerDefaults, RunConfig, Semester};
use std::sync::Arc;
use time::macros::format_description;
use time::Date;

/// Inclusive range with a snapping step, mirroring a slider control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamBounds<T> {
    pub min: T,
    pub max: T,
    pub step: T,
}

impl ParamBounds<u32> {
    /// `(min, max)` in ascending order; an inverted range is read the other way round.
    fn range(&self) -> (u32, u32) {
        (self.min.min(self.max), self.min.max(self.max))
    }

    pub fn contains(&self, v: u32) -> bool {
        let (lo, hi) = self.range();
        (lo..=hi).contains(&v)
    }

    pub fn snap(&self, v: u32) -> u32 {
        let (lo, hi) = self.range();
        let v = v.clamp(lo, hi);
        if self.step == 0 {
            return v;
        }
        let steps = ((v - lo) as f64 / self.step as f64).round() as u32;
        lo.saturating_add(steps.saturating_mul(self.step)).min(hi)
    }
}

impl ParamBounds<f64> {
    /// `(min, max)` in ascending order, or `None` when either end is NaN.
    fn range(&self) -> Option<(f64, f64)> {
        if self.min.is_nan() || self.max.is_nan() {
            return None;
        }
        Some((self.min.min(self.max), self.min.max(self.max)))
    }

    pub fn contains(&self, v: f64) -> bool {
        match self.range() {
            Some((lo, hi)) => v.is_finite() && v >= lo && v <= hi,
            None => false,
        }
    }

    pub fn snap(&self, v: f64) -> f64 {
        let Some((lo, hi)) = self.range() else {
            return v;
        };
        let v = if v.is_finite() { v } else { lo };
        let v = v.clamp(lo, hi);
        if self.step <= 0.0 || !self.step.is_finite() {
            return v;
        }
        let steps = ((v - lo) / self.step).round();
        // Round to the step's precision so 0.1 + 0.2 style drift doesn't leak out.
        let snapped = ((lo + steps * self.step) * 1e6).round() / 1e6;
        snapped.clamp(lo, hi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigBounds {
    pub population_size: ParamBounds<u32>,
    pub generations: ParamBounds<u32>,
    pub crossover_probability: ParamBounds<f64>,
    pub mutation_probability: ParamBounds<f64>,
}

impl Default for ConfigBounds {
    fn default() -> Self {
        Self {
            population_size: ParamBounds {
                min: 50,
                max: 200,
                step: 10,
            },
            generations: ParamBounds {
                min: 10,
                max: 100,
                step: 5,
            },
            crossover_probability: ParamBounds {
                min: 0.0,
                max: 1.0,
                step: 0.05,
            },
            mutation_probability: ParamBounds {
                min: 0.01,
                max: 0.5,
                step: 0.01,
            },
        }
    }
}

impl ConfigBounds {
    /// Clamp every numeric field into bounds, leaving the semester untouched.
    pub fn clamp(&self, cfg: &RunConfig) -> RunConfig {
        RunConfig {
            population_size: self.population_size.snap(cfg.population_size),
            generations: self.generations.snap(cfg.generations),
            crossover_probability: self.crossover_probability.snap(cfg.crossover_probability),
            mutation_probability: self.mutation_probability.snap(cfg.mutation_probability),
            semester: cfg.semester.clone(),
        }
    }

    /// Pre-flight check run before a run may start.
    pub fn validate(&self, cfg: &RunConfig) -> Result<(), RunError> {
        let mut issues = Vec::new();
        if !self.population_size.contains(cfg.population_size) {
            issues.push(format!(
                "population size {} outside {}..={}",
                cfg.population_size, self.population_size.min, self.population_size.max
            ));
        }
        if !self.generations.contains(cfg.generations) {
            issues.push(format!(
                "generation count {} outside {}..={}",
                cfg.generations, self.generations.min, self.generations.max
            ));
        }
        if !self.crossover_probability.contains(cfg.crossover_probability) {
            issues.push(format!(
                "crossover probability {} outside {}..={}",
                cfg.crossover_probability,
                self.crossover_probability.min,
                self.crossover_probability.max
            ));
        }
        if !self.mutation_probability.contains(cfg.mutation_probability) {
            issues.push(format!(
                "mutation probability {} outside {}..={}",
                cfg.mutation_probability,
                self.mutation_probability.min,
                self.mutation_probability.max
            ));
        }
        if cfg.semester.trim().is_empty() {
            issues.push("target semester is empty".to_string());
        }
        if issues.is_empty() {
            Ok(())
        } else {
            Err(RunError::InvalidConfig(issues.join("; ")))
        }
    }
}

/// A run configuration whose setters keep every field within bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct EditableConfig {
    config: RunConfig,
    bounds: ConfigBounds,
}

impl EditableConfig {
    pub fn new(config: RunConfig, bounds: ConfigBounds) -> Self {
        let config = bounds.clamp(&config);
        Self { config, bounds }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn into_config(self) -> RunConfig {
        self.config
    }

    pub fn bounds(&self) -> &ConfigBounds {
        &self.bounds
    }

    pub fn set_population_size(&mut self, v: u32) -> &mut Self {
        self.config.population_size = self.bounds.population_size.snap(v);
        self
    }

    pub fn set_generations(&mut self, v: u32) -> &mut Self {
        self.config.generations = self.bounds.generations.snap(v);
        self
    }

    pub fn set_crossover_probability(&mut self, v: f64) -> &mut Self {
        self.config.crossover_probability = self.bounds.crossover_probability.snap(v);
        self
    }

    pub fn set_mutation_probability(&mut self, v: f64) -> &mut Self {
        self.config.mutation_probability = self.bounds.mutation_probability.snap(v);
        self
    }

    pub fn set_semester(&mut self, name: &str) -> &mut Self {
        self.config.semester = name.trim().to_string();
        self
    }
}

pub struct ConfigResolver {
    api: Arc<dyn SchedulerApi>,
    bounds: ConfigBounds,
}

impl ConfigResolver {
    pub fn new(api: Arc<dyn SchedulerApi>) -> Self {
        Self {
            api,
            bounds: ConfigBounds::default(),
        }
    }

    pub fn with_bounds(mut self, bounds: ConfigBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> &ConfigBounds {
        &self.bounds
    }

    /// Fetch the backend's defaults, clamped into bounds. Single attempt.
    pub async fn load_defaults(&self) -> Result<RunConfig, ConfigUnavailable> {
        let defaults = self.api.fetch_default_config().await?;
        Ok(self.bounds.clamp(&config_from_defaults(&defaults)))
    }

    /// Backend defaults, or the built-in ones when the backend can't supply them.
    pub async fn resolve(&self) -> EditableConfig {
        let config = match self.load_defaults().await {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(error = %e, "falling back to built-in optimizer defaults");
                RunConfig::builtin()
            }
        };
        EditableConfig::new(config, self.bounds)
    }

    pub async fn semester_candidates(&self) -> Result<Vec<Semester>, RemoteError> {
        self.api.fetch_semester_candidates().await
    }
}

fn config_from_defaults(defaults: &OptimizerDefaults) -> RunConfig {
    let p = defaults.parameters;
    RunConfig {
        population_size: p.population_size,
        generations: p.generations,
        crossover_probability: p.crossover_probability,
        mutation_probability: p.mutation_probability,
        semester: String::new(),
    }
}

fn parse_date(s: &str) -> Option<Date> {
    // Accept plain dates as well as full timestamps by looking at the date prefix only.
    let prefix = s.get(..10)?;
    Date::parse(prefix, format_description!("[year]-[month]-[day]")).ok()
}

/// Pick the semester in session on `today`, else the most recent one.
pub fn pick_active_semester(candidates: &[Semester], today: Date) -> Option<&Semester> {
    let in_session = candidates.iter().find(|s| {
        match (parse_date(&s.start_date), parse_date(&s.end_date)) {
            (Some(start), Some(end)) => start <= today && today <= end,
            _ => false,
        }
    });
    in_session.or_else(|| {
        candidates
            .iter()
            .max_by(|a, b| (a.year, &a.period).cmp(&(b.year, &b.period)))
    })
}

/// Today's date in local time, falling back to UTC when the offset is unknown.
pub fn today() -> Date {
    time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .date()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedApi;
    use crate::model::OptimizerParameters;
    use time::macros::date;

    fn semester(id: i64, name: &str, year: i32, period: &str, start: &str, end: &str) -> Semester {
        Semester {
            id,
            name: name.into(),
            year,
            period: period.into(),
            start_date: start.into(),
            end_date: end.into(),
        }
    }

    #[test]
    fn snapping_follows_slider_steps() {
        let bounds = ConfigBounds::default();
        assert_eq!(bounds.population_size.snap(104), 100);
        assert_eq!(bounds.population_size.snap(106), 110);
        assert_eq!(bounds.population_size.snap(10), 50);
        assert_eq!(bounds.population_size.snap(500), 200);
        assert_eq!(bounds.generations.snap(52), 50);
        assert_eq!(bounds.mutation_probability.snap(0.0), 0.01);
        assert_eq!(bounds.mutation_probability.snap(0.123), 0.12);
        assert_eq!(bounds.crossover_probability.snap(f64::NAN), 0.0);
    }

    #[tokio::test]
    async fn inverted_bounds_are_read_in_order() {
        let mut bounds = ConfigBounds::default();
        bounds.population_size = ParamBounds {
            min: 200,
            max: 50,
            step: 10,
        };
        bounds.mutation_probability = ParamBounds {
            min: 0.5,
            max: 0.01,
            step: 0.01,
        };
        assert_eq!(bounds.population_size.snap(10), 50);
        assert_eq!(bounds.population_size.snap(104), 100);
        assert!(bounds.population_size.contains(120));
        assert_eq!(bounds.mutation_probability.snap(0.9), 0.5);
        assert!(bounds.mutation_probability.contains(0.1));

        let mut editable = EditableConfig::new(RunConfig::builtin(), bounds);
        editable.set_population_size(999).set_mutation_probability(0.0);
        assert_eq!(editable.config().population_size, 200);
        assert_eq!(editable.config().mutation_probability, 0.01);

        let resolver = ConfigResolver::new(Arc::new(ScriptedApi::new())).with_bounds(bounds);
        let cfg = resolver.load_defaults().await.unwrap();
        assert_eq!(cfg.population_size, 100);

        let nan = ParamBounds {
            min: f64::NAN,
            max: 1.0,
            step: 0.1,
        };
        assert_eq!(nan.snap(0.4), 0.4);
        assert!(!nan.contains(0.4));
    }

    #[test]
    fn validate_collects_every_issue() {
        let bounds = ConfigBounds::default();
        let cfg = RunConfig {
            population_size: 10,
            generations: 50,
            crossover_probability: 0.7,
            mutation_probability: 0.9,
            semester: "  ".into(),
        };
        let Err(RunError::InvalidConfig(msg)) = bounds.validate(&cfg) else {
            panic!("expected InvalidConfig");
        };
        assert!(msg.contains("population size"));
        assert!(msg.contains("mutation probability"));
        assert!(msg.contains("semester"));
        assert!(!msg.contains("crossover"));
    }

    #[test]
    fn validate_accepts_reference_config() {
        let cfg = RunConfig {
            population_size: 100,
            generations: 50,
            crossover_probability: 0.7,
            mutation_probability: 0.2,
            semester: "2024.1".into(),
        };
        assert_eq!(ConfigBounds::default().validate(&cfg), Ok(()));
    }

    #[test]
    fn editable_config_clamps_on_every_setter() {
        let mut edit = EditableConfig::new(RunConfig::builtin(), ConfigBounds::default());
        edit.set_population_size(1000)
            .set_generations(3)
            .set_mutation_probability(0.75)
            .set_semester("  2024.2 ");
        let cfg = edit.into_config();
        assert_eq!(cfg.population_size, 200);
        assert_eq!(cfg.generations, 10);
        assert_eq!(cfg.mutation_probability, 0.5);
        assert_eq!(cfg.semester, "2024.2");
    }

    #[tokio::test]
    async fn load_defaults_clamps_backend_values() {
        let api = Arc::new(ScriptedApi::new());
        api.set_defaults(Ok(OptimizerDefaults {
            parameters: OptimizerParameters {
                population_size: 120,
                generations: 500,
                crossover_probability: 0.9,
                mutation_probability: 0.05,
            },
            elite_size: Some(2),
            tournament_size: Some(3),
            seed: None,
        }));
        let resolver = ConfigResolver::new(api);
        let cfg = resolver.load_defaults().await.unwrap();
        assert_eq!(cfg.population_size, 120);
        assert_eq!(cfg.generations, 100);
        assert_eq!(cfg.crossover_probability, 0.9);
        assert_eq!(cfg.mutation_probability, 0.05);
        assert!(cfg.semester.is_empty());
    }

    #[tokio::test]
    async fn resolve_falls_back_when_defaults_unavailable() {
        let api = Arc::new(ScriptedApi::new());
        api.set_defaults(Err(ConfigUnavailable("connection refused".into())));
        let resolver = ConfigResolver::new(api.clone());
        assert!(resolver.load_defaults().await.is_err());
        let cfg = resolver.resolve().await.into_config();
        assert_eq!(cfg, RunConfig::builtin());
    }

    #[test]
    fn picks_semester_in_session() {
        let candidates = vec![
            semester(1, "2023.2", 2023, "2", "2023-08-01", "2023-12-15"),
            semester(2, "2024.1", 2024, "1", "2024-02-01", "2024-06-30"),
            semester(3, "2024.2", 2024, "2", "2024-08-01", "2024-12-15"),
        ];
        let picked = pick_active_semester(&candidates, date!(2024 - 03 - 10)).unwrap();
        assert_eq!(picked.name, "2024.1");
    }

    #[test]
    fn picks_most_recent_when_none_in_session() {
        let candidates = vec![
            semester(1, "2024.1", 2024, "1", "2024-02-01", "2024-06-30"),
            semester(2, "2024.2", 2024, "2", "2024-08-01T00:00:00", "not a date"),
            semester(3, "2023.2", 2023, "2", "2023-08-01", "2023-12-15"),
        ];
        let picked = pick_active_semester(&candidates, date!(2025 - 01 - 20)).unwrap();
        assert_eq!(picked.name, "2024.2");
        assert!(pick_active_semester(&[], date!(2025 - 01 - 20)).is_none());
    }
}
