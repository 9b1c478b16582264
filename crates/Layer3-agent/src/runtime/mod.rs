//! # Agent Runtime
//!
//! 외부 코딩 에이전트 CLI 를 실행하는 공통 런타임입니다.
//!
//! - **AgentAdapter**: 모든 도구가 구현하는 공통 인터페이스
//! - **CliAgent**: 도구별 argv 규칙(`ToolSpec`) 위에 공유 생명주기를 조합
//! - **AdapterState**: `NotDetected → Detected → Authenticated → Running → 종료`
//! - **RunTable**: run ID 별 supervisor 와 종료 이력

mod cli_agent;
mod lifecycle;
mod runs;
mod traits;

pub use cli_agent::{extract_version, CliAgent, RejectedFile, AUTH_TIMEOUT_MS, DETECT_TIMEOUT_MS};
pub use lifecycle::{AdapterState, StateCell};
pub use runs::{LiveRun, RunTable, RUN_HISTORY_LIMIT};
pub use traits::{
    AgentAdapter, AgentCapability, AgentEventStream, AgentInfo, AuthResult, DetectResult,
    RunHandle,
};
