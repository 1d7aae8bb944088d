use std::time::Instant;

use crate::coordinator::ProgressObserver;
use crate::model::{OperationState, StepStatus};

/// Consumes the snapshot stream and produces human or JSON output.
///
/// In JSON mode every snapshot is one NDJSON line on stdout. In human mode
/// only step transitions are printed, with a one-line summary available once
/// the run is over.
pub struct Reporter {
    json_mode: bool,
    started: Instant,
    snapshots_seen: usize,
    last: Option<OperationState>,
    #[cfg(feature = "cli")]
    bar: Option<indicatif::ProgressBar>,
}

impl Reporter {
    pub fn new(json_mode: bool) -> Self {
        Self {
            json_mode,
            started: Instant::now(),
            snapshots_seen: 0,
            last: None,
            #[cfg(feature = "cli")]
            bar: None,
        }
    }

    /// Terminal snapshot observed so far, if any.
    pub fn last_snapshot(&self) -> Option<&OperationState> {
        self.last.as_ref()
    }

    pub fn summary(&self) -> String {
        let elapsed = std::time::Duration::from_millis(self.started.elapsed().as_millis() as u64);
        match &self.last {
            Some(state) => format!(
                "{}: {} in {} ({} snapshots)",
                state.op,
                state.overall,
                humantime::format_duration(elapsed),
                self.snapshots_seen
            ),
            None => "no snapshots recorded".to_string(),
        }
    }

    fn print_line(&self, line: &str) {
        #[cfg(feature = "cli")]
        if let Some(bar) = &self.bar {
            bar.println(line);
            return;
        }
        println!("{line}");
    }

    fn print_step_changes(&self, state: &OperationState) {
        for step in &state.steps {
            let previous = self
                .last
                .as_ref()
                .and_then(|s| s.step(step.id))
                .map(|s| s.status);
            if previous != Some(step.status) && step.status != StepStatus::Pending {
                let line = match &step.detail {
                    Some(detail) => format!("  {} {:?} ({detail})", step.id, step.status),
                    None => format!("  {} {:?}", step.id, step.status),
                };
                self.print_line(&line);
            }
        }
    }

    #[cfg(feature = "cli")]
    fn update_bar(&mut self, state: &OperationState) {
        use indicatif::{ProgressBar, ProgressStyle};
        let bar = self.bar.get_or_insert_with(|| {
            let bar = ProgressBar::new(state.steps.len() as u64);
            bar.set_style(
                ProgressStyle::with_template("{bar:30} {pos}/{len} {msg}")
                    .expect("static progress template"),
            );
            bar
        });
        let done = state
            .steps
            .iter()
            .filter(|s| s.status.is_terminal())
            .count() as u64;
        bar.set_position(done);
        if let Some(running) = state.steps.iter().find(|s| s.status == StepStatus::Running) {
            bar.set_message(running.id.to_string());
        }
        if state.overall.is_terminal() {
            bar.finish_with_message(state.overall.to_string());
        }
    }
}

impl ProgressObserver for Reporter {
    fn on_snapshot(&mut self, state: &OperationState) {
        if self.json_mode {
            // One NDJSON line per snapshot.
            if let Ok(line) = serde_json::to_string(state) {
                println!("{line}");
            }
        } else {
            #[cfg(feature = "cli")]
            self.update_bar(state);
            self.print_step_changes(state);
        }
        self.snapshots_seen += 1;
        self.last = Some(state.clone());
    }
}
