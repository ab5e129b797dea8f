#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod args;
pub mod daemon;
mod error;
pub mod hook;
pub mod push;
pub mod queue;
pub mod renew;
pub mod schedule;
pub mod sftp;

pub use error::{Result, ServerError, SyncError};
