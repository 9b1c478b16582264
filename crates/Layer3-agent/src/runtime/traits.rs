//! Agent Adapter Traits
//!
//! 지원하는 모든 외부 코딩 에이전트 CLI 가 구현하는 공통 계약입니다.
//! `detect → validate_auth → execute → cancel / get_run_status`

use super::lifecycle::AdapterState;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use relay_foundation::{AgentEvent, AgentJob, AgentRunResult, Result, RunId, RunStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

// ============================================================================
// AgentCapability - 에이전트 기능 태그
// ============================================================================

/// 에이전트가 지원하는 기능 태그
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentCapability {
    /// 파일 편집
    CodeEdit,

    /// 쉘 명령 실행
    ShellExec,

    /// 구조화된(JSON) 출력
    StructuredOutput,

    /// 실행 중 증분 출력
    Streaming,

    /// 여러 컨텍스트 파일 전달
    MultiFile,

    /// git 저장소 인식 (자동 커밋 등)
    GitAware,
}

impl AgentCapability {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCapability::CodeEdit => "code_edit",
            AgentCapability::ShellExec => "shell_exec",
            AgentCapability::StructuredOutput => "structured_output",
            AgentCapability::Streaming => "streaming",
            AgentCapability::MultiFile => "multi_file",
            AgentCapability::GitAware => "git_aware",
        }
    }
}

impl std::fmt::Display for AgentCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AgentInfo / DetectResult / AuthResult
// ============================================================================

/// 에이전트 정적 설명
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentInfo {
    /// 에이전트 ID (예: "claude-code")
    pub id: String,

    /// 표시 이름
    pub name: String,

    /// 기능 태그
    pub capabilities: Vec<AgentCapability>,

    /// 인증에 필요한 환경 변수 이름
    pub required_env: Vec<String>,

    /// 실행 파일 이름 (설정 덮어쓰기 반영)
    pub binary: String,
}

impl AgentInfo {
    pub fn has_capability(&self, capability: AgentCapability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// `detect()` 결과. 실패도 값으로 표현합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResult {
    pub installed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// `which` 로 찾은 실행 파일 경로
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// 미설치 사유
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DetectResult {
    pub fn installed(version: Option<String>, path: Option<PathBuf>) -> Self {
        Self {
            installed: true,
            version,
            path,
            reason: None,
        }
    }

    pub fn not_installed(reason: impl Into<String>) -> Self {
        Self {
            installed: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// `validate_auth()` 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuthResult {
    pub fn valid() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// RunHandle - 실행 이벤트 스트림
// ============================================================================

/// 박스된 이벤트 스트림
pub type AgentEventStream = Pin<Box<dyn Stream<Item = AgentEvent> + Send>>;

/// 하나의 실행에 대한 핸들
///
/// 이벤트는 한 번만 소비할 수 있습니다. 핸들을 버리면 실행 중인 프로세스도 종료됩니다.
pub struct RunHandle {
    pub run_id: RunId,
    events: AgentEventStream,
}

impl RunHandle {
    pub fn new(run_id: RunId, events: AgentEventStream) -> Self {
        Self { run_id, events }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// 모든 이벤트를 수집하여 실행 요약 생성
    pub async fn collect_result(self) -> AgentRunResult {
        let run_id = self.run_id.clone();
        let events: Vec<AgentEvent> = self.collect().await;
        AgentRunResult::from_events(run_id, events)
    }
}

impl Stream for RunHandle {
    type Item = AgentEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.as_mut().poll_next(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.events.size_hint()
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AgentAdapter - 공통 계약
// ============================================================================

/// 외부 코딩 에이전트 CLI 어댑터
///
/// ## 구현 예시
///
/// ```ignore
/// let agent = CliAgent::<ClaudeCode>::new(&RuntimeConfig::load()?);
///
/// if agent.detect().await.installed && agent.validate_auth().await.valid {
///     let mut run = agent.execute(AgentJob::new("/repo", "claude-code", "fix the tests")).await?;
///     while let Some(event) = run.next().await {
///         println!("{} {}", event.sequence, event.event_type);
///     }
/// }
/// ```
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// 정적 설명
    fn info(&self) -> AgentInfo;

    /// 현재 어댑터 상태
    fn state(&self) -> AdapterState;

    /// 설치 여부 확인 (절대 에러를 반환하지 않음)
    async fn detect(&self) -> DetectResult;

    /// 인증 확인 (필수 환경 변수 → 도구별 확인 명령)
    async fn validate_auth(&self) -> AuthResult;

    /// 작업 실행. 첫 이벤트는 `task_start`, 마지막 이벤트는 종료 이벤트입니다.
    async fn execute(&self, job: AgentJob) -> Result<RunHandle>;

    /// 실행 취소. 추적하지 않는 실행이면 `Error::RunNotFound`
    async fn cancel(&self, run_id: &RunId) -> Result<()>;

    /// 실행 상태 스냅샷
    fn get_run_status(&self, run_id: &RunId) -> Result<RunStatus>;

    /// 실행을 끝까지 소비하여 요약 반환
    async fn run(&self, job: AgentJob) -> Result<AgentRunResult> {
        let handle = self.execute(job).await?;
        Ok(handle.collect_result().await)
    }
}
