//! # relay-task
//!
//! Execution building blocks for AgentRelay.
//! Everything an agent adapter needs to run an external coding-agent CLI safely.
//!
//! ## Features
//!
//! - **WorkspaceGuard**: declarative allow/deny checks for paths and shell commands
//! - **ProcessSupervisor**: one child process per run with timeout, SIGTERM -> SIGKILL
//!   escalation and bounded output retention
//! - **OutputEventNormalizer**: raw output lines to ordered, typed `AgentEvent`s

pub mod executor;
pub mod normalizer;

pub use executor::{
    OutputLine, OutputStream, ProcessOutput, ProcessSupervisor, Signal, WorkspaceGuard,
    LINE_CHANNEL_CAPACITY,
};
pub use normalizer::{classify, OutputEventNormalizer};
