//! Adapter Lifecycle
//!
//! 어댑터 상태 머신입니다.
//!
//! ```text
//! NotDetected → Detected → Authenticated → Running → {Completed, Failed, Cancelled}
//! ```
//!
//! 종료 상태에서 다시 `execute` 하면 `Running` 으로 돌아갑니다.

use relay_foundation::RunStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// AdapterState
// ============================================================================

/// 어댑터 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    /// 아직 감지되지 않음 (또는 미설치)
    #[default]
    NotDetected,

    /// 실행 파일 확인됨
    Detected,

    /// 인증 확인됨
    Authenticated,

    /// 실행 중
    Running,

    /// 마지막 실행 성공
    Completed,

    /// 마지막 실행 실패
    Failed,

    /// 마지막 실행 취소
    Cancelled,
}

impl AdapterState {
    /// 종료 상태 여부
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdapterState::Completed | AdapterState::Failed | AdapterState::Cancelled
        )
    }

    /// 전이 가능 여부
    pub fn can_transition_to(&self, next: AdapterState) -> bool {
        use AdapterState::*;
        match (self, next) {
            (NotDetected, Detected) => true,
            // 실행 파일이 사라진 경우 (실행 중에는 종료 상태가 우선)
            (Running, NotDetected) => false,
            (_, NotDetected) => true,
            (Detected | Authenticated, Authenticated) => true,
            (Authenticated, Detected) => true,
            // 실행은 감지 여부와 무관하게 시도할 수 있음 (spawn 실패는 종료 이벤트로 보고)
            (_, Running) => true,
            (Running, Completed | Failed | Cancelled) => true,
            (Completed | Failed | Cancelled, Detected | Authenticated) => true,
            _ => false,
        }
    }

    /// 실행 종료 상태에서 변환
    pub fn from_run_status(status: RunStatus) -> Option<Self> {
        match status {
            RunStatus::Completed => Some(AdapterState::Completed),
            RunStatus::Failed => Some(AdapterState::Failed),
            RunStatus::Cancelled => Some(AdapterState::Cancelled),
            RunStatus::Running => Some(AdapterState::Running),
            RunStatus::Pending => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterState::NotDetected => "not_detected",
            AdapterState::Detected => "detected",
            AdapterState::Authenticated => "authenticated",
            AdapterState::Running => "running",
            AdapterState::Completed => "completed",
            AdapterState::Failed => "failed",
            AdapterState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StateCell - 상태 보관 + 전이 기록
// ============================================================================

/// 전이 규칙을 적용하는 상태 보관소
#[derive(Debug, Default)]
pub struct StateCell {
    state: parking_lot::RwLock<AdapterState>,
}

impl StateCell {
    pub fn get(&self) -> AdapterState {
        *self.state.read()
    }

    /// 허용된 전이만 적용. 적용 여부 반환
    pub fn transition(&self, next: AdapterState) -> bool {
        let mut state = self.state.write();
        if *state == next {
            return true;
        }
        if !state.can_transition_to(next) {
            tracing::debug!("Ignoring adapter transition {} -> {}", *state, next);
            return false;
        }
        tracing::debug!("Adapter transition {} -> {}", *state, next);
        *state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let cell = StateCell::default();
        assert_eq!(cell.get(), AdapterState::NotDetected);
        assert!(cell.transition(AdapterState::Detected));
        assert!(cell.transition(AdapterState::Authenticated));
        assert!(cell.transition(AdapterState::Running));
        assert!(cell.transition(AdapterState::Completed));
        assert!(cell.get().is_terminal());
        assert!(cell.transition(AdapterState::Running));
    }

    #[test]
    fn test_invalid_transitions_are_ignored() {
        let cell = StateCell::default();
        assert!(!cell.transition(AdapterState::Authenticated));
        assert!(!cell.transition(AdapterState::Completed));
        assert_eq!(cell.get(), AdapterState::NotDetected);

        assert!(cell.transition(AdapterState::Running));
        assert!(!cell.transition(AdapterState::NotDetected));
        assert!(cell.transition(AdapterState::Failed));
        assert!(cell.transition(AdapterState::NotDetected));
    }

    #[test]
    fn test_from_run_status() {
        assert_eq!(
            AdapterState::from_run_status(RunStatus::Cancelled),
            Some(AdapterState::Cancelled)
        );
        assert_eq!(AdapterState::from_run_status(RunStatus::Pending), None);
    }
}
