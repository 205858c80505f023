use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for analysis-cycle events.
///
/// Keeps the scheduler free of output concerns: the CLI aggregates and
/// prints, tests discard.
pub trait CycleLogger: Send {
    /// A tick started a new capture/analysis cycle.
    fn cycle_started(&mut self, cycle: u64);

    /// Record how long a named stage took within one cycle.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces detected, attendance writes).
    fn metric(&mut self, name: &str, value: f64);

    /// A tick was dropped without running a cycle.
    fn skipped(&mut self, reason: &str);

    fn info(&mut self, message: &str);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullCycleLogger;

impl CycleLogger for NullCycleLogger {
    fn cycle_started(&mut self, _cycle: u64) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn skipped(&mut self, _reason: &str) {}
    fn info(&mut self, _message: &str) {}
}

/// Aggregates stage timings, metrics and skipped ticks and reports them
/// through the `log` facade.
pub struct StdoutCycleLogger {
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    skipped: HashMap<String, usize>,
    start_time: Instant,
    cycles: u64,
    messages: Vec<String>,
}

impl StdoutCycleLogger {
    pub fn new() -> Self {
        Self {
            timings: HashMap::new(),
            metrics: HashMap::new(),
            skipped: HashMap::new(),
            start_time: Instant::now(),
            cycles: 0,
            messages: Vec::new(),
        }
    }

    /// Returns the formatted summary string, or `None` if nothing ran.
    pub fn summary_string(&self) -> Option<String> {
        if self.cycles == 0 && self.skipped.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Analysis summary ({} cycles, {elapsed_s:.1}s total):",
            self.cycles
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            lines.push(format!(
                "  {stage:12}: avg {:6.1}ms  max {:6.1}ms",
                mean(durations),
                durations.iter().copied().fold(0.0, f64::max)
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            let values = &self.metrics[name];
            let total: f64 = values.iter().sum();
            lines.push(format!("  {name}: avg {:.1}  total {total:.0}", mean(values)));
        }

        let mut reasons: Vec<_> = self.skipped.iter().collect();
        reasons.sort();
        for (reason, count) in reasons {
            lines.push(format!("  skipped ({reason}): {count}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn skipped_for(&self, reason: &str) -> usize {
        self.skipped.get(reason).copied().unwrap_or(0)
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

impl Default for StdoutCycleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleLogger for StdoutCycleLogger {
    fn cycle_started(&mut self, cycle: u64) {
        self.cycles += 1;
        log::debug!("Analysis cycle {cycle} started");
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn skipped(&mut self, reason: &str) {
        *self.skipped.entry(reason.to_string()).or_default() += 1;
        log::debug!("Tick skipped: {reason}");
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
