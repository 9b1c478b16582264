//! Process execution and workspace policy
//!
//! - `ProcessSupervisor` - Spawns and supervises one agent process (timeout, kill escalation, output cap)
//! - `WorkspaceGuard` - Path/command/size validation scoped to one workspace root

pub mod supervisor;
pub mod workspace_guard;

pub use supervisor::{
    OutputLine, OutputStream, ProcessOutput, ProcessSupervisor, Signal, LINE_CHANNEL_CAPACITY,
};
pub use workspace_guard::WorkspaceGuard;
