#![forbid(unsafe_code)]

use deepcheck_kernel_contracts::account::Username;
use deepcheck_kernel_contracts::session::{is_allowed_phase_transition, SessionPhase, SessionState};
use deepcheck_kernel_contracts::Validate;
use log::debug;

use crate::error::WorkflowError;

/// Per-client session. Every phase change goes through the transition table;
/// callers hold one of these per interactive user and pass it to the service.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    state: SessionState,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase
    }

    pub fn current_user(&self) -> Option<&Username> {
        self.state.current_user.as_ref()
    }

    pub(crate) fn require_logged_out(&self) -> Result<(), WorkflowError> {
        if self.state.is_authenticated() {
            return Err(WorkflowError::AlreadyAuthenticated);
        }
        Ok(())
    }

    pub(crate) fn require_phase(&self, phase: SessionPhase) -> Result<&Username, WorkflowError> {
        match (self.state.phase == phase, self.state.current_user.as_ref()) {
            (true, Some(user)) => Ok(user),
            _ => Err(WorkflowError::NotReady {
                phase: self.state.phase,
            }),
        }
    }

    pub(crate) fn require_ready(&self) -> Result<&Username, WorkflowError> {
        self.require_phase(SessionPhase::Ready)
    }

    pub(crate) fn enter_loading(&mut self, user: Username) -> Result<(), WorkflowError> {
        self.transition(SessionPhase::Loading, Some(user))
    }

    pub(crate) fn enter_ready(&mut self) -> Result<(), WorkflowError> {
        let user = self.state.current_user.clone();
        self.transition(SessionPhase::Ready, user)
    }

    pub(crate) fn reset(&mut self) -> Result<(), WorkflowError> {
        self.transition(SessionPhase::LoggedOut, None)
    }

    fn transition(
        &mut self,
        to: SessionPhase,
        user: Option<Username>,
    ) -> Result<(), WorkflowError> {
        let from = self.state.phase;
        if !is_allowed_phase_transition(from, to) {
            return Err(WorkflowError::NotReady { phase: from });
        }
        let next = SessionState {
            phase: to,
            current_user: user,
        };
        next.validate().map_err(WorkflowError::InvalidInput)?;
        debug!("session phase {} -> {}", from.as_str(), to.as_str());
        self.state = next;
        Ok(())
    }
}
