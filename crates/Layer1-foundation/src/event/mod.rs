//! Event module
//!
//! - `types`: 이벤트 타입 (`AgentEvent`, `AgentEventType`, `EventId`)
//! - `run`: 실행 상태 및 요약 (`RunStatus`, `AgentRunResult`)

pub mod run;
pub mod types;

pub use run::{AgentRunResult, RunStatus, REASON_CANCELLED, REASON_TIMEOUT};
pub use types::{AgentEvent, AgentEventType, EventId};
