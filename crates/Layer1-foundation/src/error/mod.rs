//! Error types for AgentRelay
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// AgentRelay 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    // ========================================================================
    // 프로세스 실행 관련
    // ========================================================================
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Process killed by signal {signal}")]
    Killed { signal: i32 },

    #[error("Supervisor already started a run")]
    AlreadyStarted,

    // ========================================================================
    // 실행 추적 관련
    // ========================================================================
    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    // ========================================================================
    // 일반
    // ========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 바이너리를 찾을 수 없거나 실행할 수 없는 경우
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Error::Spawn { .. })
    }

    /// 타임아웃으로 종료된 경우
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// 외부 요청 또는 시그널로 종료된 경우
    pub fn is_killed(&self) -> bool {
        matches!(self, Error::Killed { .. })
    }

    /// 패턴 컴파일 에러 생성 헬퍼
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl ToString) -> Self {
        Error::InvalidPattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Spawn 에러 생성 헬퍼
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Error::Spawn {
            program: program.into(),
            source,
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
