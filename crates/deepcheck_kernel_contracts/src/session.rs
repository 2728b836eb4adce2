#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::account::Username;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    LoggedOut,
    Loading,
    Ready,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::LoggedOut => "LOGGED_OUT",
            SessionPhase::Loading => "LOADING",
            SessionPhase::Ready => "READY",
        }
    }
}

pub fn is_allowed_phase_transition(from: SessionPhase, to: SessionPhase) -> bool {
    matches!(
        (from, to),
        (SessionPhase::LoggedOut, SessionPhase::Loading)
            | (SessionPhase::Loading, SessionPhase::Ready)
            | (SessionPhase::Loading, SessionPhase::LoggedOut)
            | (SessionPhase::Ready, SessionPhase::LoggedOut)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub current_user: Option<Username>,
}

impl SessionState {
    pub fn logged_out() -> Self {
        Self {
            phase: SessionPhase::LoggedOut,
            current_user: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::logged_out()
    }
}

impl Validate for SessionState {
    fn validate(&self) -> Result<(), ContractViolation> {
        match (self.phase, self.current_user.as_ref()) {
            (SessionPhase::LoggedOut, None) => Ok(()),
            (SessionPhase::LoggedOut, Some(_)) => Err(ContractViolation::InvalidValue {
                field: "session_state.current_user",
                reason: "must be empty while logged out",
            }),
            (_, None) => Err(ContractViolation::InvalidValue {
                field: "session_state.current_user",
                reason: "must be set while loading or ready",
            }),
            (_, Some(user)) => user.validate(),
        }
    }
}
