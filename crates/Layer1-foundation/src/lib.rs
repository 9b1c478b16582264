//! # relay-foundation
//!
//! Foundation layer for AgentRelay:
//! - Core: 작업/샌드박스/정책 타입 (AgentJob, SandboxProfile, WorkspacePolicy)
//! - Event: 실행 이벤트 및 실행 요약 (AgentEvent, AgentRunResult)
//! - Config: 런타임 설정 (RuntimeConfig, SupervisorConfig)
//! - Storage: JSON 설정 저장소 (JsonStore)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Layer3-agent (AgentAdapter: claude-code, codex, aider) │
//! │                     │                                   │
//! │          ┌──────────┼──────────────┐                    │
//! │          ▼          ▼              ▼                    │
//! │   WorkspaceGuard  ProcessSupervisor  OutputEventNormalizer │
//! │          (Layer2-task)                                  │
//! │                     │                                   │
//! │                     ▼                                   │
//! │   relay-foundation (types, events, config, errors)     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod event;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Core (작업 및 정책 타입)
// ============================================================================
pub use self::core::{
    AgentJob, FileOp, RunId, SandboxProfile, ValidationResult, WorkspacePolicy,
    BASELINE_FORBIDDEN_PATHS, DEFAULT_FORBIDDEN_COMMANDS,
};

// ============================================================================
// Event (실행 이벤트)
// ============================================================================
pub use event::{
    AgentEvent, AgentEventType, AgentRunResult, EventId, RunStatus, REASON_CANCELLED,
    REASON_TIMEOUT,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    AgentOverride, RuntimeConfig, SupervisorConfig, DEFAULT_DRAIN_TIMEOUT_MS,
    DEFAULT_KILL_GRACE_MS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS, RUNTIME_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, APP_DIR};
