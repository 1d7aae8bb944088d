use anyhow::{Context, Result};

use crate::cli::RunArgs;
use crate::coordinator::{CancelToken, Coordinator, ProgressObserver};
use crate::exit_codes::exit;
use crate::model::{OperationState, OverallStatus};
use crate::reporter::Reporter;
use crate::scenario::{self, ScriptedRunners};
use crate::session::{ProcessSessionProvider, TracingOperationLogger};

/// Wraps the reporter and trips the cancel token once `remaining` snapshots
/// have been observed. Cancellation is still honored only at step
/// boundaries, so the run winds down cooperatively.
struct CancelAfter<'a> {
    inner: &'a mut Reporter,
    token: CancelToken,
    remaining: u32,
}

impl ProgressObserver for CancelAfter<'_> {
    fn on_snapshot(&mut self, state: &OperationState) {
        self.inner.on_snapshot(state);
        if self.remaining > 0 {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.token.cancel();
            }
        }
    }
}

/// Replays one scenario through the coordinator and maps the terminal
/// overall status onto a process exit code.
pub fn run(args: RunArgs) -> Result<i32> {
    let scenario =
        scenario::load_scenario(&args.scenario).context("failed to load scenario")?;
    scenario.validate()?;

    let probes = scenario.probes.clone();
    let runners = ScriptedRunners::new(scenario.outcome.clone());
    let session = ProcessSessionProvider::new();
    let logger = TracingOperationLogger;
    let coordinator = Coordinator::new(&probes, &runners, &runners, &runners, &session, &logger);

    let cancel = CancelToken::new();
    let mut reporter = Reporter::new(args.json);
    let terminal = match args.cancel_after {
        Some(after) => {
            let mut observer = CancelAfter {
                inner: &mut reporter,
                token: cancel.clone(),
                remaining: after,
            };
            coordinator.start(&scenario.request, &cancel, &mut observer)
        }
        None => coordinator.start(&scenario.request, &cancel, &mut reporter),
    };

    if !args.json {
        println!("{}", reporter.summary());
    }

    Ok(match terminal.overall {
        OverallStatus::Success => exit::SUCCESS,
        OverallStatus::Partial => exit::PARTIAL,
        OverallStatus::Canceled => exit::CANCELED,
        // start() only returns finalized states; Idle/Running map with Failure.
        OverallStatus::Failure | OverallStatus::Idle | OverallStatus::Running => exit::FAILURE,
    })
}
