//! Event Types - 에이전트 실행 이벤트 정의
//!
//! 실행 런타임이 생성하는 유일한 출력 단위입니다.
//! 생성 후에는 변경되지 않습니다.

use crate::core::RunId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Type
// ============================================================================

/// 고정된 이벤트 타입 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentEventType {
    TaskStart,
    TaskComplete,
    ToolUse,
    FileEdit,
    FileCreate,
    ShellExec,
    Thinking,
    Error,
    Progress,
}

impl AgentEventType {
    pub const ALL: [AgentEventType; 9] = [
        AgentEventType::TaskStart,
        AgentEventType::TaskComplete,
        AgentEventType::ToolUse,
        AgentEventType::FileEdit,
        AgentEventType::FileCreate,
        AgentEventType::ShellExec,
        AgentEventType::Thinking,
        AgentEventType::Error,
        AgentEventType::Progress,
    ];

    /// 타입 문자열 반환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskStart => "task_start",
            Self::TaskComplete => "task_complete",
            Self::ToolUse => "tool_use",
            Self::FileEdit => "file_edit",
            Self::FileCreate => "file_create",
            Self::ShellExec => "shell_exec",
            Self::Thinking => "thinking",
            Self::Error => "error",
            Self::Progress => "progress",
        }
    }

    /// 실행 종료 이벤트 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TaskComplete | Self::Error)
    }

    /// 실행 생명주기 이벤트 여부 (시작 + 종료)
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::TaskStart | Self::TaskComplete | Self::Error)
    }

    /// 대소문자/구분자를 무시하고 이벤트 이름을 해석
    ///
    /// `"TaskStart"`, `"task-start"`, `"TASK START"`, `"task.start"` 모두
    /// `TaskStart` 가 됩니다.
    pub fn from_loose(name: &str) -> Option<Self> {
        let normalized = normalize_event_name(name);
        match normalized.as_str() {
            "task_start" => Some(Self::TaskStart),
            "task_complete" | "task_completed" => Some(Self::TaskComplete),
            "tool_use" | "tool_call" => Some(Self::ToolUse),
            "file_edit" => Some(Self::FileEdit),
            "file_create" => Some(Self::FileCreate),
            "shell_exec" => Some(Self::ShellExec),
            "thinking" | "reasoning" => Some(Self::Thinking),
            "error" => Some(Self::Error),
            "progress" => Some(Self::Progress),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// camelCase 경계와 `-`, ` `, `.` 를 `_` 로 바꾸고 소문자로 변환
fn normalize_event_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if matches!(ch, '-' | ' ' | '.' | '_') {
            if !out.ends_with('_') {
                out.push('_');
            }
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

// ============================================================================
// AgentEvent
// ============================================================================

/// 실행 중 발생하는 하나의 타입 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    /// 이벤트 ID (이벤트마다 새로 생성)
    pub id: EventId,

    /// 소속 실행 ID
    pub run_id: RunId,

    /// 이벤트 타입
    #[serde(rename = "type")]
    pub event_type: AgentEventType,

    /// 생성 시각 (epoch millis)
    pub timestamp: i64,

    /// 불투명 key/value 페이로드
    pub data: Value,

    /// 실행 내 순서 (0 부터 단조 증가)
    pub sequence: u64,
}

impl AgentEvent {
    /// 새 이벤트 생성
    pub fn new(run_id: RunId, event_type: AgentEventType, sequence: u64, data: Value) -> Self {
        Self {
            id: EventId::new(),
            run_id,
            event_type,
            timestamp: chrono::Utc::now().timestamp_millis(),
            data,
            sequence,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.event_type.is_terminal()
    }

    /// 페이로드의 문자열 필드
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}
