//! Command implementations.

pub mod exec;
pub mod session;
pub mod status;
pub mod unlock;
