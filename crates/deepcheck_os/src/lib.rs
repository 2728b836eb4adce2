#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod session;
pub mod views;
pub mod workflow;

pub use config::{ClassifierSettings, ConfigError, WorkflowConfig};
pub use error::WorkflowError;
pub use session::SessionContext;
pub use views::VerificationResult;
pub use workflow::VerificationService;
