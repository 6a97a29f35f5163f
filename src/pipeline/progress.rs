// 進捗通知: (stage, fraction) をスロットルして呼び出し側へ渡す

use std::time::{Duration, Instant};

use serde::Serialize;

/// Ordered stages of one compression call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preparing,
    Analyzing,
    Optimizing,
    Finalizing,
}

/// Throttled, monotonic progress reporting.
///
/// - Stages never go backwards; reports for an earlier stage are dropped.
/// - Within a stage the fraction never decreases.
/// - Stage changes and fraction 1.0 are always delivered; everything else
///   at most once per `interval`.
pub struct ProgressReporter<'a> {
    sink: Option<&'a mut dyn FnMut(Stage, f64)>,
    interval: Duration,
    stage: Stage,
    fraction: f64,
    last_emit: Option<Instant>,
    last_delivered: Option<(Stage, f64)>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(sink: &'a mut dyn FnMut(Stage, f64), interval: Duration) -> Self {
        Self {
            sink: Some(sink),
            interval,
            stage: Stage::Preparing,
            fraction: 0.0,
            last_emit: None,
            last_delivered: None,
        }
    }

    /// A reporter that drops every update.
    pub fn silent() -> Self {
        Self {
            sink: None,
            interval: Duration::ZERO,
            stage: Stage::Preparing,
            fraction: 0.0,
            last_emit: None,
            last_delivered: None,
        }
    }

    pub fn report(&mut self, stage: Stage, fraction: f64) {
        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 1.0)
        };

        if stage < self.stage {
            return;
        }
        if stage > self.stage {
            self.stage = stage;
            self.fraction = fraction;
            self.emit();
            return;
        }

        if fraction <= self.fraction && self.last_delivered.is_some() {
            return;
        }
        self.fraction = fraction.max(self.fraction);

        let throttled = self
            .last_emit
            .is_some_and(|t| t.elapsed() < self.interval);
        if throttled && self.fraction < 1.0 {
            return;
        }
        self.emit();
    }

    /// Report `(Finalizing, 1.0)` exactly once.
    pub fn finish(&mut self) {
        self.report(Stage::Finalizing, 1.0);
    }

    fn emit(&mut self) {
        let update = (self.stage, self.fraction);
        if self.last_delivered == Some(update) {
            return;
        }
        if let Some(sink) = self.sink.as_deref_mut() {
            sink(update.0, update.1);
        }
        self.last_emit = Some(Instant::now());
        self.last_delivered = Some(update);
    }
}
