//! Run Summary - 한 번의 실행 결과 요약
//!
//! 이벤트 스트림을 모두 소비한 뒤 만들어지는 요약입니다. 이 크레이트는
//! 요약을 저장하지 않습니다.

use super::types::{AgentEvent, AgentEventType};
use crate::core::RunId;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `error` 종료 이벤트의 취소 사유
pub const REASON_CANCELLED: &str = "cancelled";

/// `error` 종료 이벤트의 타임아웃 사유
pub const REASON_TIMEOUT: &str = "timeout";

// ============================================================================
// RunStatus
// ============================================================================

/// 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// 종료 이벤트에서 최종 상태 결정
    pub fn from_terminal(event: &AgentEvent) -> Option<Self> {
        match event.event_type {
            AgentEventType::TaskComplete => Some(Self::Completed),
            AgentEventType::Error if event.data_str("reason") == Some(REASON_CANCELLED) => {
                Some(Self::Cancelled)
            }
            AgentEventType::Error => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AgentRunResult
// ============================================================================

/// 실행 요약
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 파일 이벤트에서 수집한 경로 (중복 제거, 순서 유지)
    pub artifacts: Vec<String>,
    pub events: Vec<AgentEvent>,
}

impl AgentRunResult {
    /// 수집된 이벤트로부터 요약 생성
    pub fn from_events(run_id: RunId, events: Vec<AgentEvent>) -> Self {
        let terminal = events.iter().rev().find(|e| e.is_terminal());

        let status = match terminal.and_then(RunStatus::from_terminal) {
            Some(status) => status,
            None if events.is_empty() => RunStatus::Pending,
            None => RunStatus::Running,
        };

        let exit_code = terminal
            .and_then(|e| e.data.get("exitCode"))
            .and_then(Value::as_i64)
            .map(|code| code as i32);

        let started_at = events
            .first()
            .map(|e| millis_to_datetime(e.timestamp))
            .unwrap_or_else(Utc::now);
        let completed_at = terminal.map(|e| millis_to_datetime(e.timestamp));

        let mut artifacts: Vec<String> = Vec::new();
        for event in &events {
            if !matches!(
                event.event_type,
                AgentEventType::FileEdit | AgentEventType::FileCreate
            ) {
                continue;
            }
            if let Some(path) = event.data_str("path") {
                if !artifacts.iter().any(|p| p == path) {
                    artifacts.push(path.to_string());
                }
            }
        }

        Self {
            run_id,
            status,
            exit_code,
            started_at,
            completed_at,
            artifacts,
            events,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(Utc::now)
}
