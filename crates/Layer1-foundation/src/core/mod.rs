//! Core Module - 작업/샌드박스/정책 타입
//!
//! 호출자가 만드는 입력 타입(`AgentJob`, `SandboxProfile`)과
//! 워크스페이스 정책 타입(`WorkspacePolicy`, `ValidationResult`)을 정의합니다.

pub mod types;

pub use types::{
    AgentJob, FileOp, RunId, SandboxProfile, ValidationResult, WorkspacePolicy,
    BASELINE_FORBIDDEN_PATHS, DEFAULT_FORBIDDEN_COMMANDS,
};
