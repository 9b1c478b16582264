//! # relay-agent
//!
//! AgentRelay 의 에이전트 어댑터 계층입니다. Claude Code / Codex CLI / Aider 같은
//! 외부 코딩 에이전트 CLI 를 하나의 생명주기 뒤에 감춥니다.
//!
//! ## 핵심 원칙
//!
//! 1. **Closed Set** - 지원 도구는 `AgentKind` 의 닫힌 목록, 상속 대신 조합
//! 2. **One Process per Run** - run 마다 ProcessSupervisor 하나, run 간 공유 상태 없음
//! 3. **Deterministic Lifecycle** - 첫 이벤트 `task_start`(seq 0), 마지막 이벤트는 종료 이벤트 하나
//! 4. **Live Stream** - 출력 라인은 도착 즉시 이벤트로 변환
//!
//! ## 사용 예
//!
//! ```ignore
//! use futures::StreamExt;
//! use relay_agent::{AgentAdapter, AgentRegistry};
//! use relay_foundation::{AgentJob, RuntimeConfig};
//!
//! let registry = AgentRegistry::new(&RuntimeConfig::load()?);
//! let agent = registry.get("codex")?;
//!
//! let mut run = agent.execute(AgentJob::new("/repo", "codex", "fix the failing test")).await?;
//! let run_id = run.run_id().clone();
//! while let Some(event) = run.next().await {
//!     println!("[{}] {}", event.sequence, event.event_type);
//! }
//!
//! // 다른 태스크에서 취소
//! agent.cancel(&run_id).await?;
//! ```

pub mod runtime;
pub mod variant;

pub use runtime::{
    extract_version, AdapterState, AgentAdapter, AgentCapability, AgentEventStream, AgentInfo,
    AuthResult, CliAgent, DetectResult, RejectedFile, RunHandle, RunTable, DETECT_TIMEOUT_MS,
};
pub use variant::{
    create_default_registry, Aider, AgentKind, AgentRegistry, ClaudeCode, Codex, Invocation,
    ToolSpec,
};
