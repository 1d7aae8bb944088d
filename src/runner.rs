//! Collaborator contracts for the domain layers that perform real work.
//!
//! The engine invokes exactly one runner per run and maps its outcome onto
//! the generic step/overall vocabulary; file operations, id generation and
//! database writes all live behind these traits. Outcome enums are closed:
//! a new variant is a compile error in the coordinator's mapping, never a
//! silent fallthrough.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::model::{BackupRequest, CreateAccountRequest};

/// Outcome of a backup run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum BackupOutcome {
    /// Backup completed; every expected id was captured.
    Success {
        account_name: String,
        backup_path: PathBuf,
    },
    /// Backup completed but one or more ids could not be read.
    PartialSuccess {
        account_name: String,
        backup_path: PathBuf,
        missing_ids: Vec<String>,
    },
    /// The user id is already held by another backed-up account. The runner
    /// has already removed its partial output; the engine only reports.
    DuplicateUserId {
        user_id: String,
        existing_account_name: String,
    },
    Failure {
        message: String,
    },
}

/// Performs the actual backup work.
pub trait BackupRunner {
    fn run(&self, request: &BackupRequest, force_duplicate: bool) -> BackupOutcome;
}

/// One event in the create-account progress sequence: zero or more Progress
/// events followed by exactly one terminal event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CreateAccountEvent {
    /// The runner entered numbered step `step` of `total_steps`.
    Progress {
        step: u32,
        total_steps: u32,
        message: String,
    },
    Prepared {
        account_id: String,
        account_name: String,
    },
    ValidationError {
        message: String,
    },
    Failure {
        message: String,
    },
}

impl CreateAccountEvent {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }
}

/// Performs the actual account creation, reporting progress as it goes.
pub trait CreateAccountRunner {
    fn run(&self, request: &CreateAccountRequest)
    -> Box<dyn Iterator<Item = CreateAccountEvent> + '_>;
}

/// Outcome of a restore run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Success { account_name: String },
    Failure { message: String },
}

/// Performs the actual restore work.
pub trait RestoreRunner {
    fn run(&self, account_id: &str) -> RestoreOutcome;
}
