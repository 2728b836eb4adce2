#![forbid(unsafe_code)]

pub mod account;
pub mod classify;
pub mod common;
pub mod history;
pub mod session;

pub use common::{ContractViolation, Validate};
