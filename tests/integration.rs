use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

use opseq::cli::RunArgs;
use opseq::coordinator::{CancelToken, Coordinator};
use opseq::error::OperationErrorCode;
use opseq::exit_codes::exit;
use opseq::model::{OperationState, OperationStepId, OverallStatus, StepStatus};
use opseq::reporter::Reporter;
use opseq::scenario::ScriptedRunners;
use opseq::session::{NoopLogger, ProcessSessionProvider};

fn write_scenario(root: &std::path::Path, scenario: serde_json::Value) -> PathBuf {
    let path = root.join("scenario.json");
    fs::write(&path, scenario.to_string()).unwrap();
    path
}

fn run_args(scenario: PathBuf) -> RunArgs {
    RunArgs {
        scenario,
        json: false,
        cancel_after: None,
    }
}

fn backup_success_scenario() -> serde_json::Value {
    json!({
        "request": {
            "op": "backup",
            "account_id": "a1",
            "account_name": "Main",
            "backup_root": "/backups"
        },
        "outcome": {
            "runner": "backup",
            "outcome": {
                "result": "success",
                "account_name": "Main",
                "backup_path": "/backups/a1"
            }
        }
    })
}

/// Runs a scenario through the coordinator directly, collecting every
/// emitted snapshot.
fn collect_snapshots(scenario_json: serde_json::Value) -> Vec<OperationState> {
    let scenario = opseq::scenario::from_json(&scenario_json.to_string()).unwrap();
    scenario.validate().unwrap();
    let probes = scenario.probes.clone();
    let runners = ScriptedRunners::new(scenario.outcome.clone());
    let session = ProcessSessionProvider::new();
    let logger = NoopLogger;
    let coordinator = Coordinator::new(&probes, &runners, &runners, &runners, &session, &logger);
    let mut snapshots = Vec::new();
    let mut observer = |state: &OperationState| snapshots.push(state.clone());
    coordinator.start(&scenario.request, &CancelToken::new(), &mut observer);
    snapshots
}

#[test]
fn test_backup_success_run_exits_zero() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(dir.path(), backup_success_scenario());
    let exit_code = opseq::engine::run(run_args(path))?;
    assert_eq!(exit_code, exit::SUCCESS);
    Ok(())
}

#[test]
fn test_backup_partial_success_exits_partial() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(
        dir.path(),
        json!({
            "request": {
                "op": "backup",
                "account_id": "a1",
                "account_name": "Main",
                "backup_root": "/backups"
            },
            "outcome": {
                "runner": "backup",
                "outcome": {
                    "result": "partial_success",
                    "account_name": "Main",
                    "backup_path": "/backups/a1",
                    "missing_ids": ["adid"]
                }
            }
        }),
    );
    let exit_code = opseq::engine::run(run_args(path))?;
    assert_eq!(exit_code, exit::PARTIAL);
    Ok(())
}

#[test]
fn test_restore_success_exits_zero() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(
        dir.path(),
        json!({
            "request": { "op": "restore", "account_id": "a1" },
            "probes": {
                "accounts": [
                    { "id": "a1", "name": "mgo_Main", "backup_path": "/backups/a1" }
                ]
            },
            "outcome": {
                "runner": "restore",
                "outcome": { "result": "success", "account_name": "Main" }
            }
        }),
    );
    let exit_code = opseq::engine::run(run_args(path))?;
    assert_eq!(exit_code, exit::SUCCESS);
    Ok(())
}

#[test]
fn test_root_denied_preflight_exits_failure() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(
        dir.path(),
        json!({
            "request": {
                "op": "backup",
                "account_id": "a1",
                "account_name": "Main",
                "backup_root": "/backups"
            },
            "probes": { "root_access": false }
        }),
    );
    let exit_code = opseq::engine::run(run_args(path))?;
    assert_eq!(exit_code, exit::FAILURE);
    Ok(())
}

#[test]
fn test_unsupported_operation_exits_failure() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(dir.path(), json!({ "request": { "op": "ssh_sync" } }));
    let exit_code = opseq::engine::run(run_args(path))?;
    assert_eq!(exit_code, exit::FAILURE);
    Ok(())
}

#[test]
fn test_cancel_after_snapshots_exits_canceled() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(dir.path(), backup_success_scenario());
    let exit_code = opseq::engine::run(RunArgs {
        scenario: path,
        json: false,
        cancel_after: Some(3),
    })?;
    assert_eq!(exit_code, exit::CANCELED);
    Ok(())
}

#[test]
fn test_mismatched_outcome_is_rejected_before_running() -> Result<()> {
    let dir = tempdir()?;
    let path = write_scenario(
        dir.path(),
        json!({
            "request": { "op": "restore", "account_id": "a1" },
            "outcome": {
                "runner": "backup",
                "outcome": { "result": "failure", "message": "x" }
            }
        }),
    );
    assert!(opseq::engine::run(run_args(path)).is_err());
    Ok(())
}

#[test]
fn test_snapshot_stream_is_ordered_and_non_coalesced() {
    let snapshots = collect_snapshots(backup_success_scenario());
    assert!(snapshots.len() > 2);
    assert_eq!(snapshots[0].overall, OverallStatus::Idle);
    assert_eq!(snapshots.last().unwrap().overall, OverallStatus::Success);

    // Consecutive snapshots always differ: one transition, one emission.
    for pair in snapshots.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }

    // Step statuses never regress to pending/running once terminal.
    for pair in snapshots.windows(2) {
        for step in &pair[0].steps {
            if step.status.is_terminal() {
                let later = pair[1].step(step.id).unwrap();
                assert!(
                    later.status.is_terminal(),
                    "step {} regressed from {:?} to {:?}",
                    step.id,
                    step.status,
                    later.status
                );
            }
        }
    }

    // Exactly one terminal snapshot, and it is the last one.
    let terminal_count = snapshots
        .iter()
        .filter(|s| s.overall.is_terminal())
        .count();
    assert_eq!(terminal_count, 1);
    assert!(!snapshots.last().unwrap().can_cancel);
}

#[test]
fn test_duplicate_user_id_failure_shape() {
    let snapshots = collect_snapshots(json!({
        "request": {
            "op": "backup",
            "account_id": "a1",
            "account_name": "Main",
            "backup_root": "/backups"
        },
        "outcome": {
            "runner": "backup",
            "outcome": {
                "result": "duplicate_user_id",
                "user_id": "u1",
                "existing_account_name": "ExistingAcct"
            }
        }
    }));
    let terminal = snapshots.last().unwrap();
    assert_eq!(terminal.overall, OverallStatus::Failure);

    let error = terminal.error.as_ref().unwrap();
    assert_eq!(error.code, OperationErrorCode::DuplicateUserId);
    assert_eq!(error.metadata.get("userId").unwrap(), "u1");
    assert_eq!(
        error.metadata.get("existingAccountName").unwrap(),
        "ExistingAcct"
    );

    assert_eq!(
        terminal.step(OperationStepId::DbUpdate).unwrap().status,
        StepStatus::Fail
    );
    assert_eq!(
        terminal.step(OperationStepId::Finalize).unwrap().status,
        StepStatus::Canceled
    );
}

#[test]
fn test_create_account_prepared_reports_result() {
    let snapshots = collect_snapshots(json!({
        "request": { "op": "create_account", "account_name": "Fresh" },
        "outcome": {
            "runner": "create_account",
            "terminal": {
                "event": "prepared",
                "account_id": "a9",
                "account_name": "mgo_Fresh"
            }
        }
    }));
    let terminal = snapshots.last().unwrap();
    assert_eq!(terminal.overall, OverallStatus::Success);
    assert!(
        terminal
            .steps
            .iter()
            .all(|s| s.status == StepStatus::Success)
    );
    match terminal.result.as_ref().unwrap() {
        opseq::model::OperationResult::CreateAccount {
            account_id,
            account_name,
        } => {
            assert_eq!(account_id, "a9");
            assert_eq!(account_name, "mgo_Fresh");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[test]
fn test_blank_account_name_fails_precheck() {
    let snapshots = collect_snapshots(json!({
        "request": { "op": "create_account", "account_name": "" }
    }));
    let terminal = snapshots.last().unwrap();
    assert_eq!(terminal.overall, OverallStatus::Failure);
    assert_eq!(
        terminal.error.as_ref().unwrap().detail.as_deref(),
        Some("name_blank")
    );
    assert_eq!(
        terminal.step(OperationStepId::Precheck).unwrap().status,
        StepStatus::Fail
    );
}

#[test]
fn test_reporter_observes_terminal_snapshot() {
    let scenario = opseq::scenario::from_json(&backup_success_scenario().to_string()).unwrap();
    let probes = scenario.probes.clone();
    let runners = ScriptedRunners::new(scenario.outcome.clone());
    let session = ProcessSessionProvider::new();
    let logger = NoopLogger;
    let coordinator = Coordinator::new(&probes, &runners, &runners, &runners, &session, &logger);
    let mut reporter = Reporter::new(false);
    let terminal = coordinator.start(&scenario.request, &CancelToken::new(), &mut reporter);
    assert_eq!(reporter.last_snapshot(), Some(&terminal));
    assert!(reporter.summary().contains("backup: success"));
}

mod cli {
    use super::*;
    use super::assert_eq;
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_schema_subcommand_prints_scenario_schema() {
        Command::cargo_bin("opseq")
            .unwrap()
            .arg("schema")
            .assert()
            .success()
            .stdout(predicate::str::contains("Scenario"));
    }

    #[test]
    fn test_steps_subcommand_lists_sequence() {
        Command::cargo_bin("opseq")
            .unwrap()
            .args(["steps", "--op", "restore"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("precheck\nstart_log_session\n"))
            .stdout(predicate::str::contains("set_permissions"))
            .stdout(predicate::str::ends_with("finalize\n"));
    }

    #[test]
    fn test_run_json_emits_parseable_snapshots() -> Result<()> {
        let dir = tempdir()?;
        let path = write_scenario(dir.path(), backup_success_scenario());
        let output = Command::cargo_bin("opseq")
            .unwrap()
            .args(["run", "--json", "--scenario"])
            .arg(&path)
            .output()?;
        assert!(output.status.success());

        let stdout = String::from_utf8(output.stdout)?;
        let snapshots: Vec<OperationState> = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).expect("snapshot line must parse"))
            .collect();
        assert!(snapshots.len() > 2);
        assert_eq!(snapshots[0].overall, OverallStatus::Idle);
        assert_eq!(snapshots.last().unwrap().overall, OverallStatus::Success);
        Ok(())
    }

    #[test]
    fn test_run_duplicate_user_id_exit_code() -> Result<()> {
        let dir = tempdir()?;
        let path = write_scenario(
            dir.path(),
            json!({
                "request": {
                    "op": "backup",
                    "account_id": "a1",
                    "account_name": "Main",
                    "backup_root": "/backups"
                },
                "outcome": {
                    "runner": "backup",
                    "outcome": {
                        "result": "duplicate_user_id",
                        "user_id": "u1",
                        "existing_account_name": "Old"
                    }
                }
            }),
        );
        Command::cargo_bin("opseq")
            .unwrap()
            .args(["run", "--scenario"])
            .arg(&path)
            .assert()
            .code(exit::FAILURE);
        Ok(())
    }
}
