//! Scenario manifests for the CLI harness.
//!
//! A scenario is a JSON file describing one operation request plus the
//! scripted behavior of every collaborator the engine would normally reach
//! through the device: probe answers and the runner outcome. Replaying a
//! scenario exercises the full coordinator without touching a real device.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::model::{CreateAccountRequest, OperationRequest};
use crate::preflight::PreflightProbes;
use crate::runner::{
    BackupOutcome, BackupRunner, CreateAccountEvent, CreateAccountRunner, RestoreOutcome,
    RestoreRunner,
};
use crate::sequence::CREATE_ACCOUNT_TOTAL_STEPS;

/// Root scenario document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Scenario {
    /// The operation request to run.
    pub request: OperationRequest,
    /// Scripted probe answers consulted during preflight.
    #[serde(default)]
    pub probes: ProbeScript,
    /// Scripted runner behavior. May be omitted for scenarios that fail
    /// before the runner is reached.
    #[serde(default)]
    pub outcome: Option<RunnerScript>,
}

impl Scenario {
    /// Basic sanity checks: a scripted outcome must match the request kind.
    pub fn validate(&self) -> Result<()> {
        let mismatch = match (&self.request, &self.outcome) {
            (_, None) => false,
            (OperationRequest::Backup(_), Some(RunnerScript::Backup { .. })) => false,
            (OperationRequest::CreateAccount(_), Some(RunnerScript::CreateAccount { .. })) => false,
            (OperationRequest::Restore(_), Some(RunnerScript::Restore { .. })) => false,
            _ => true,
        };
        if mismatch {
            anyhow::bail!(
                "scripted outcome does not match request type {}",
                self.request.operation_type()
            );
        }
        if let Some(RunnerScript::CreateAccount { terminal, .. }) = &self.outcome
            && !terminal.is_terminal()
        {
            anyhow::bail!("create_account terminal event must not be a progress event");
        }
        Ok(())
    }
}

/// Scripted environment answers. Defaults describe a healthy device: root
/// available, target app installed, every path writable and present. The
/// negative lists poke specific holes for failure scenarios.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProbeScript {
    #[serde(default = "default_true")]
    pub root_access: bool,
    #[serde(default = "default_true")]
    pub target_app_installed: bool,
    /// Paths reported as not writable.
    #[serde(default)]
    pub unwritable_paths: Vec<PathBuf>,
    /// Paths reported as absent.
    #[serde(default)]
    pub missing_paths: Vec<PathBuf>,
    /// Known accounts on the device.
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
}

fn default_true() -> bool {
    true
}

impl Default for ProbeScript {
    fn default() -> Self {
        Self {
            root_access: true,
            target_app_installed: true,
            unwritable_paths: Vec::new(),
            missing_paths: Vec::new(),
            accounts: Vec::new(),
        }
    }
}

/// One registered account as the probes see it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AccountRecord {
    pub id: String,
    /// Full registered name, including the prefix.
    pub name: String,
    #[serde(default)]
    pub backup_path: Option<PathBuf>,
}

impl PreflightProbes for ProbeScript {
    fn request_root_access(&self) -> bool {
        self.root_access
    }

    fn is_target_app_installed(&self) -> bool {
        self.target_app_installed
    }

    fn is_backup_path_writable(&self, path: &Path) -> bool {
        !self.unwritable_paths.iter().any(|p| p == path)
    }

    fn account_exists_by_name(&self, name: &str) -> bool {
        self.accounts.iter().any(|a| a.name == name)
    }

    fn account_exists_by_id(&self, id: &str) -> bool {
        self.accounts.iter().any(|a| a.id == id)
    }

    fn backup_path_for_account(&self, id: &str) -> Option<PathBuf> {
        self.accounts
            .iter()
            .find(|a| a.id == id)
            .and_then(|a| a.backup_path.clone())
    }

    fn path_exists(&self, path: &Path) -> bool {
        !self.missing_paths.iter().any(|p| p == path)
    }
}

/// Scripted runner behavior for the request's operation kind.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "runner", rename_all = "snake_case")]
pub enum RunnerScript {
    Backup {
        outcome: BackupOutcome,
    },
    CreateAccount {
        /// Number of numbered progress events emitted before the terminal
        /// event.
        #[serde(default = "default_progress_steps")]
        progress_steps: u32,
        terminal: CreateAccountEvent,
    },
    Restore {
        outcome: RestoreOutcome,
    },
}

fn default_progress_steps() -> u32 {
    CREATE_ACCOUNT_TOTAL_STEPS
}

/// Runner doubles that replay a [`RunnerScript`]. A missing or mismatched
/// script yields a plain failure outcome rather than a panic, so a bad
/// scenario still produces a well-formed terminal state.
pub struct ScriptedRunners {
    script: Option<RunnerScript>,
}

impl ScriptedRunners {
    pub fn new(script: Option<RunnerScript>) -> Self {
        Self { script }
    }
}

impl BackupRunner for ScriptedRunners {
    fn run(&self, _request: &crate::model::BackupRequest, _force_duplicate: bool) -> BackupOutcome {
        match &self.script {
            Some(RunnerScript::Backup { outcome }) => outcome.clone(),
            _ => BackupOutcome::Failure {
                message: "no scripted backup outcome".into(),
            },
        }
    }
}

impl CreateAccountRunner for ScriptedRunners {
    fn run(
        &self,
        _request: &CreateAccountRequest,
    ) -> Box<dyn Iterator<Item = CreateAccountEvent> + '_> {
        let events = match &self.script {
            Some(RunnerScript::CreateAccount {
                progress_steps,
                terminal,
            }) => {
                let mut events: Vec<CreateAccountEvent> = (1..=*progress_steps)
                    .map(|step| CreateAccountEvent::Progress {
                        step,
                        total_steps: CREATE_ACCOUNT_TOTAL_STEPS,
                        message: format!("entered step {step}"),
                    })
                    .collect();
                events.push(terminal.clone());
                events
            }
            _ => vec![CreateAccountEvent::Failure {
                message: "no scripted create_account outcome".into(),
            }],
        };
        Box::new(events.into_iter())
    }
}

impl RestoreRunner for ScriptedRunners {
    fn run(&self, _account_id: &str) -> RestoreOutcome {
        match &self.script {
            Some(RunnerScript::Restore { outcome }) => outcome.clone(),
            _ => RestoreOutcome::Failure {
                message: "no scripted restore outcome".into(),
            },
        }
    }
}

/// Generate JSON Schema for the Scenario type.
pub fn generate_schema() -> String {
    let schema = schemars::schema_for!(Scenario);
    serde_json::to_string_pretty(&schema).expect("failed to serialize schema")
}

/// Load a Scenario from a JSON file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let scenario = serde_json::from_reader(reader)?;
    Ok(scenario)
}

/// Create a Scenario from a JSON string.
pub fn from_json(json: &str) -> Result<Scenario> {
    let scenario = serde_json::from_str(json)?;
    Ok(scenario)
}
