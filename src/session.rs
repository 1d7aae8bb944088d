//! Cross-cutting collaborators: log-session correlation and audit logging.
//!
//! Logging is append-only and fire-and-forget; a logging failure can never
//! abort an operation, which is why the trait methods are infallible.

use crate::model::{OperationStepId, OperationType, OverallStatus};

/// Supplies the correlation id tying a run's log lines together.
pub trait SessionProvider {
    /// Stable id for the current application run.
    fn current_session_id(&self) -> String;
}

/// Audit hooks invoked around operations and steps.
pub trait OperationLogger {
    fn log_operation_start(&self, op: OperationType, session_id: &str);
    fn log_step_start(&self, step: OperationStepId);
    fn log_step_end(&self, step: OperationStepId, success: bool, detail: Option<&str>);
    fn log_operation_end(&self, op: OperationType, overall: OverallStatus);
}

/// Default provider: one uuid-v4 per process, fixed at construction.
pub struct ProcessSessionProvider {
    id: String,
}

impl ProcessSessionProvider {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for ProcessSessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for ProcessSessionProvider {
    fn current_session_id(&self) -> String {
        self.id.clone()
    }
}

/// Default logger: structured tracing events.
pub struct TracingOperationLogger;

impl OperationLogger for TracingOperationLogger {
    fn log_operation_start(&self, op: OperationType, session_id: &str) {
        tracing::info!(op = %op, session_id, "operation started");
    }

    fn log_step_start(&self, step: OperationStepId) {
        tracing::debug!(step = %step, "step started");
    }

    fn log_step_end(&self, step: OperationStepId, success: bool, detail: Option<&str>) {
        if success {
            tracing::debug!(step = %step, detail, "step finished");
        } else {
            tracing::warn!(step = %step, detail, "step failed");
        }
    }

    fn log_operation_end(&self, op: OperationType, overall: OverallStatus) {
        tracing::info!(op = %op, overall = %overall, "operation finished");
    }
}

/// Logger that discards everything. Useful in tests and embedding contexts
/// that subscribe to snapshots directly.
pub struct NoopLogger;

impl OperationLogger for NoopLogger {
    fn log_operation_start(&self, _op: OperationType, _session_id: &str) {}
    fn log_step_start(&self, _step: OperationStepId) {}
    fn log_step_end(&self, _step: OperationStepId, _success: bool, _detail: Option<&str>) {}
    fn log_operation_end(&self, _op: OperationType, _overall: OverallStatus) {}
}
