//! The root of the engine: drives one operation run end-to-end, emitting an
//! immutable snapshot per transition and mapping each runner's
//! domain-specific outcome onto the uniform step/overall vocabulary.
//!
//! The coordinator performs no real work itself. Preflight probes, runner
//! calls and logging are all injected collaborators; between their calls the
//! coordinator is pure bookkeeping over [`OperationState`] values.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{OperationError, OperationErrorCode, SuggestedAction};
use crate::model::{
    CreateAccountRequest, OperationRequest, OperationResult, OperationState, OperationStepId,
    OverallStatus, StepStatus,
};
use crate::preflight::{self, PreflightProbes};
use crate::runner::{
    BackupOutcome, BackupRunner, CreateAccountEvent, CreateAccountRunner, RestoreOutcome,
    RestoreRunner,
};
use crate::sequence;
use crate::session::{OperationLogger, SessionProvider};
use crate::state;

/// Cooperative cancellation handle for one run. Cancellation is a signal
/// polled at step boundaries; an in-flight runner call is never preempted.
/// The token is reset when a run starts, so it must not be shared by two
/// concurrent runs.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Receives every snapshot synchronously, in transition order.
pub trait ProgressObserver {
    fn on_snapshot(&mut self, state: &OperationState);
}

impl<F: FnMut(&OperationState)> ProgressObserver for F {
    fn on_snapshot(&mut self, state: &OperationState) {
        self(state)
    }
}

/// Drives one run per `start` call. Collaborators are constructor-injected;
/// the coordinator holds no state of its own between runs.
pub struct Coordinator<'a> {
    probes: &'a dyn PreflightProbes,
    backup: &'a dyn BackupRunner,
    create_account: &'a dyn CreateAccountRunner,
    restore: &'a dyn RestoreRunner,
    session: &'a dyn SessionProvider,
    logger: &'a dyn OperationLogger,
}

impl<'a> Coordinator<'a> {
    pub fn new(
        probes: &'a dyn PreflightProbes,
        backup: &'a dyn BackupRunner,
        create_account: &'a dyn CreateAccountRunner,
        restore: &'a dyn RestoreRunner,
        session: &'a dyn SessionProvider,
        logger: &'a dyn OperationLogger,
    ) -> Self {
        Self {
            probes,
            backup,
            create_account,
            restore,
            session,
            logger,
        }
    }

    /// Runs one operation to its terminal state. Each transition is emitted
    /// to `observer` before the coordinator proceeds; the returned value is
    /// the terminal snapshot. The sequence is finite and not restartable —
    /// every call is an independent run.
    pub fn start(
        &self,
        request: &OperationRequest,
        cancel: &CancelToken,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        cancel.reset();
        let op = request.operation_type();
        let mut state = OperationState::new(op);
        observer.on_snapshot(&state);

        let session_id = self.session.current_session_id();
        state = state::start_operation(&state, &session_id);
        self.logger.log_operation_start(op, &session_id);
        observer.on_snapshot(&state);

        match request {
            OperationRequest::Backup(req) => {
                let state = match self.prologue(state, request, cancel, observer) {
                    Ok(state) => state,
                    Err(terminal) => return terminal,
                };
                let state = self.begin_step(state, OperationStepId::StopApp, None, observer);
                let outcome = self.backup.run(req, req.force_duplicate);
                self.finish_backup(state, outcome, observer)
            }
            OperationRequest::CreateAccount(req) => {
                let state = match self.prologue(state, request, cancel, observer) {
                    Ok(state) => state,
                    Err(terminal) => return terminal,
                };
                let state = self.begin_step(state, OperationStepId::StopApp, None, observer);
                self.drive_create_account(state, req, observer)
            }
            OperationRequest::Restore(req) => {
                let state = match self.prologue(state, request, cancel, observer) {
                    Ok(state) => state,
                    Err(terminal) => return terminal,
                };
                let state = self.begin_step(state, OperationStepId::StopApp, None, observer);
                let outcome = self.restore.run(&req.account_id);
                self.finish_restore(state, outcome, observer)
            }
            // Reserved extension points: the sequences exist, but no runner
            // is wired. They fail before the precheck ever starts.
            OperationRequest::Export { .. }
            | OperationRequest::Import { .. }
            | OperationRequest::SshTest
            | OperationRequest::SshSync => {
                let error = OperationError::unknown(format!("unsupported_operation_{op}"));
                let state = self.cancel_pending(state, observer);
                self.finish(state, OverallStatus::Failure, None, Some(error), observer)
            }
        }
    }

    /// The uniform opening moves shared by every wired type: precheck, then
    /// the log-session step, with a cancellation poll after each. Err carries
    /// the terminal state when the run ends here.
    fn prologue(
        &self,
        state: OperationState,
        request: &OperationRequest,
        cancel: &CancelToken,
        observer: &mut dyn ProgressObserver,
    ) -> Result<OperationState, OperationState> {
        let state = self.begin_step(state, OperationStepId::Precheck, None, observer);
        let state = match preflight::run(request, self.probes) {
            Ok(()) => self.end_step(state, OperationStepId::Precheck, true, None, observer),
            Err(error) => {
                let reason = error.reason();
                let state =
                    self.end_step(state, OperationStepId::Precheck, false, Some(&reason), observer);
                let state = self.cancel_pending(state, observer);
                return Err(self.finish(state, OverallStatus::Failure, None, Some(error), observer));
            }
        };
        if cancel.is_canceled() {
            return Err(self.finish_canceled(state, observer));
        }

        // Always succeeds once a session id is known.
        let state = self.begin_step(state, OperationStepId::StartLogSession, None, observer);
        let state = self.end_step(state, OperationStepId::StartLogSession, true, None, observer);
        if cancel.is_canceled() {
            return Err(self.finish_canceled(state, observer));
        }
        Ok(state)
    }

    fn finish_backup(
        &self,
        state: OperationState,
        outcome: BackupOutcome,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        match outcome {
            BackupOutcome::Success {
                account_name,
                backup_path,
            } => {
                let state = self.complete_chain(state, &sequence::BACKUP_WORK_STEPS, observer);
                let state = self.complete_finalize(state, observer);
                let result = OperationResult::Backup {
                    account_name,
                    backup_path,
                    missing_ids: Vec::new(),
                };
                self.finish(state, OverallStatus::Success, Some(result), None, observer)
            }
            BackupOutcome::PartialSuccess {
                account_name,
                backup_path,
                missing_ids,
            } => {
                let state = self.complete_chain(state, &sequence::BACKUP_WORK_STEPS, observer);
                let state = self.complete_finalize(state, observer);
                let result = OperationResult::Backup {
                    account_name,
                    backup_path,
                    missing_ids,
                };
                self.finish(state, OverallStatus::Partial, Some(result), None, observer)
            }
            BackupOutcome::DuplicateUserId {
                user_id,
                existing_account_name,
            } => {
                // Everything before the database update had already run when
                // the conflict was detected.
                let state = self.complete_chain(state, &sequence::BACKUP_STEPS_BEFORE_DB, observer);
                let state = self.ensure_started(state, OperationStepId::DbUpdate, observer);
                let state = self.end_step(
                    state,
                    OperationStepId::DbUpdate,
                    false,
                    Some("duplicate_user_id"),
                    observer,
                );
                let state = self.cancel_pending(state, observer);
                let error = OperationError::new(OperationErrorCode::DuplicateUserId)
                    .with_metadata("userId", user_id)
                    .with_metadata("existingAccountName", existing_account_name)
                    .with_action(SuggestedAction::RenameAccount)
                    .with_action(SuggestedAction::Abort);
                self.finish(state, OverallStatus::Failure, None, Some(error), observer)
            }
            BackupOutcome::Failure { message } => {
                let state = self.end_step(
                    state,
                    OperationStepId::StopApp,
                    false,
                    Some(&message),
                    observer,
                );
                let state = self.cancel_pending(state, observer);
                let error = OperationError::unknown(message);
                self.finish(state, OverallStatus::Failure, None, Some(error), observer)
            }
        }
    }

    fn drive_create_account(
        &self,
        state: OperationState,
        request: &CreateAccountRequest,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let mut state = state;
        for event in self.create_account.run(request) {
            match event {
                CreateAccountEvent::Progress { step, message, .. } => {
                    // The domain layer reports only "entered step N"; the
                    // mapped step is started and completed in one move.
                    // Unknown numbers are ignored.
                    if let Some(id) = sequence::create_account_step(step) {
                        state = self.ensure_started(state, id, observer);
                        state = self.end_step(state, id, true, Some(&message), observer);
                    }
                }
                CreateAccountEvent::Prepared {
                    account_id,
                    account_name,
                } => {
                    let state = self.complete_finalize(state, observer);
                    let result = OperationResult::CreateAccount {
                        account_id,
                        account_name,
                    };
                    return self.finish(state, OverallStatus::Success, Some(result), None, observer);
                }
                CreateAccountEvent::ValidationError { message } => {
                    let state = self.end_step(
                        state,
                        OperationStepId::Precheck,
                        false,
                        Some(&message),
                        observer,
                    );
                    let state = self.cancel_pending(state, observer);
                    let error =
                        OperationError::unknown(message).with_action(SuggestedAction::RenameAccount);
                    return self.finish(state, OverallStatus::Failure, None, Some(error), observer);
                }
                CreateAccountEvent::Failure { message } => {
                    let state = self.ensure_started(state, OperationStepId::Finalize, observer);
                    let state = self.end_step(
                        state,
                        OperationStepId::Finalize,
                        false,
                        Some(&message),
                        observer,
                    );
                    let state = self.cancel_pending(state, observer);
                    let error = OperationError::unknown(message);
                    return self.finish(state, OverallStatus::Failure, None, Some(error), observer);
                }
            }
        }

        // The runner's event stream ended without a terminal event, which
        // violates its contract. Reported, not panicked on.
        let state = self.ensure_started(state, OperationStepId::Finalize, observer);
        let state = self.end_step(
            state,
            OperationStepId::Finalize,
            false,
            Some("missing_terminal_event"),
            observer,
        );
        let state = self.cancel_pending(state, observer);
        let error = OperationError::unknown("missing_terminal_event");
        self.finish(state, OverallStatus::Failure, None, Some(error), observer)
    }

    fn finish_restore(
        &self,
        state: OperationState,
        outcome: RestoreOutcome,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        match outcome {
            RestoreOutcome::Success { account_name } => {
                let state = self.complete_chain(state, &sequence::RESTORE_WORK_STEPS, observer);
                let state = self.complete_finalize(state, observer);
                let result = OperationResult::Restore { account_name };
                self.finish(state, OverallStatus::Success, Some(result), None, observer)
            }
            RestoreOutcome::Failure { message } => {
                let state = self.end_step(
                    state,
                    OperationStepId::StopApp,
                    false,
                    Some(&message),
                    observer,
                );
                let state = self.cancel_pending(state, observer);
                let error = OperationError::unknown(message);
                self.finish(state, OverallStatus::Failure, None, Some(error), observer)
            }
        }
    }

    fn begin_step(
        &self,
        state: OperationState,
        id: OperationStepId,
        detail: Option<&str>,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let next = state::start_step(&state, id, detail);
        self.logger.log_step_start(id);
        observer.on_snapshot(&next);
        next
    }

    fn end_step(
        &self,
        state: OperationState,
        id: OperationStepId,
        success: bool,
        detail: Option<&str>,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let next = if success {
            state::complete_step(&state, id, detail)
        } else {
            state::fail_step(&state, id, detail)
        };
        self.logger.log_step_end(id, success, detail);
        observer.on_snapshot(&next);
        next
    }

    /// Starts the step only if it is still Pending, so post-hoc completion
    /// never disturbs a step that is already Running or finished.
    fn ensure_started(
        &self,
        state: OperationState,
        id: OperationStepId,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        if state
            .step(id)
            .is_some_and(|s| s.status == StepStatus::Pending)
        {
            return self.begin_step(state, id, None, observer);
        }
        state
    }

    /// Starts-then-completes each step in order. Used when a runner outcome
    /// retroactively accounts for work the domain layer performed.
    fn complete_chain(
        &self,
        state: OperationState,
        ids: &[OperationStepId],
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let mut state = state;
        for &id in ids {
            state = self.ensure_started(state, id, observer);
            state = self.end_step(state, id, true, None, observer);
        }
        state
    }

    fn complete_finalize(
        &self,
        state: OperationState,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        // Already completed when the runner reported its finishing phase as a
        // numbered progress event.
        if state
            .step(OperationStepId::Finalize)
            .is_some_and(|s| s.status == StepStatus::Success)
        {
            return state;
        }
        let state = self.ensure_started(state, OperationStepId::Finalize, observer);
        self.end_step(state, OperationStepId::Finalize, true, None, observer)
    }

    fn cancel_pending(
        &self,
        state: OperationState,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        if !state.steps.iter().any(|s| s.status == StepStatus::Pending) {
            return state;
        }
        let next = state::cancel_pending_steps(&state);
        observer.on_snapshot(&next);
        next
    }

    fn finish(
        &self,
        state: OperationState,
        overall: OverallStatus,
        result: Option<OperationResult>,
        error: Option<OperationError>,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let next = state::finalize(&state, overall, result, error);
        self.logger.log_operation_end(next.op, overall);
        observer.on_snapshot(&next);
        next
    }

    fn finish_canceled(
        &self,
        state: OperationState,
        observer: &mut dyn ProgressObserver,
    ) -> OperationState {
        let mut state = state;
        if state.steps.iter().any(|s| s.status == StepStatus::Running) {
            state = state::cancel_running_steps(&state);
            observer.on_snapshot(&state);
        }
        state = self.cancel_pending(state, observer);
        self.finish(
            state,
            OverallStatus::Canceled,
            None,
            Some(OperationError::canceled()),
            observer,
        )
    }
}
