//! CLI Agent - 모든 도구가 공유하는 실행 생명주기
//!
//! 도구별 차이는 [`ToolSpec`] (argv 규칙) 에만 있고, 나머지는 여기서 조합합니다.
//!
//! ```text
//! execute(job)
//!   ├─ WorkspaceGuard   : 컨텍스트 파일 검증 (baseline deny-list + 설정)
//!   ├─ task_start       : seq 0, 프로세스 spawn 전
//!   ├─ ProcessSupervisor: spawn / timeout / kill escalation
//!   ├─ Normalizer       : 출력 라인 → 이벤트 (도착 즉시)
//!   └─ 종료 이벤트       : task_complete | error (정확히 하나)
//! ```

use super::lifecycle::{AdapterState, StateCell};
use super::runs::{LiveRun, RunFinisher, RunTable};
use super::traits::{AgentAdapter, AgentInfo, AuthResult, DetectResult, RunHandle};
use crate::variant::{AgentKind, Invocation, ToolSpec};
use async_stream::stream;
use async_trait::async_trait;
use regex::Regex;
use relay_foundation::{
    AgentEvent, AgentEventType, AgentJob, AgentOverride, Error, FileOp, Result, RunId, RunStatus,
    RuntimeConfig, SandboxProfile, SupervisorConfig, WorkspacePolicy, REASON_CANCELLED,
    REASON_TIMEOUT,
};
use relay_task::{
    OutputEventNormalizer, OutputLine, ProcessOutput, ProcessSupervisor, Signal, WorkspaceGuard,
    LINE_CHANNEL_CAPACITY,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// `detect()` 타임아웃
pub const DETECT_TIMEOUT_MS: u64 = 5_000;

/// 인증 확인 명령 타임아웃
pub const AUTH_TIMEOUT_MS: u64 = 15_000;

const VERSION_PATTERN: &str = r"(\d+\.\d+(?:\.\d+)?(?:[-+][0-9A-Za-z.]+)?)";

fn version_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VERSION_PATTERN).ok()).as_ref()
}

/// 버전 문자열 추출 (best-effort)
pub fn extract_version(output: &str) -> Option<String> {
    version_regex()?
        .captures(output)
        .map(|caps| caps[1].to_string())
}

/// 검증에서 제외된 컨텍스트 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub path: PathBuf,
    pub reason: String,
}

// ============================================================================
// CliAgent
// ============================================================================

/// 외부 CLI 도구 하나에 대한 어댑터
pub struct CliAgent<T: ToolSpec> {
    tool: T,
    supervisor_config: SupervisorConfig,
    extra_forbidden_paths: Vec<String>,
    strict_context_files: bool,
    overrides: AgentOverride,
    state: StateCell,
    runs: Arc<RunTable>,
}

impl<T: ToolSpec> CliAgent<T> {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self::with_tool(T::default(), config)
    }

    pub fn with_tool(tool: T, config: &RuntimeConfig) -> Self {
        Self {
            tool,
            supervisor_config: config.supervisor_config(),
            extra_forbidden_paths: config.extra_forbidden_paths.clone(),
            strict_context_files: config.strict_context_files,
            overrides: config.override_for(T::ID),
            state: StateCell::default(),
            runs: Arc::new(RunTable::new()),
        }
    }

    /// 실행 파일 (설정 덮어쓰기 우선)
    pub fn binary(&self) -> String {
        self.overrides
            .binary
            .clone()
            .unwrap_or_else(|| T::BINARY.to_string())
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn runs(&self) -> &Arc<RunTable> {
        &self.runs
    }

    /// 작업 실행에 쓰이는 워크스페이스 정책
    pub fn workspace_policy(&self) -> WorkspacePolicy {
        self.extra_forbidden_paths
            .iter()
            .fold(WorkspacePolicy::baseline(), |policy, pattern| {
                policy.forbid_path(pattern.clone())
            })
    }

    /// 컨텍스트 파일 검증 (경로 정책 + 크기 제한)
    pub fn validate_context_files(
        &self,
        guard: &WorkspaceGuard,
        files: &[PathBuf],
    ) -> (Vec<PathBuf>, Vec<RejectedFile>) {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();

        for file in files {
            let verdict = guard.validate_path(file, FileOp::Read);
            if !verdict.allowed {
                rejected.push(RejectedFile {
                    path: file.clone(),
                    reason: verdict.reason.unwrap_or_else(|| "denied".to_string()),
                });
                continue;
            }

            let Some(resolved) = guard.resolve(file) else {
                continue;
            };

            if guard.max_file_size_bytes().is_some() {
                if let Ok(meta) = std::fs::metadata(&resolved) {
                    let size = guard.validate_file_size(meta.len());
                    if !size.allowed {
                        rejected.push(RejectedFile {
                            path: file.clone(),
                            reason: size.reason.unwrap_or_else(|| "too large".to_string()),
                        });
                        continue;
                    }
                }
            }

            accepted.push(resolved);
        }

        (accepted, rejected)
    }

    /// 프로필 + 설정 환경 변수 (프로필 우선)
    fn effective_profile(&self, profile: &SandboxProfile) -> SandboxProfile {
        let mut effective = profile.clone();
        for (key, value) in &self.overrides.env {
            effective
                .env
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        effective
    }

    /// 버전/인증 확인용 짧은 명령 실행 (네트워크/쉘 차단 프로필)
    async fn probe(&self, args: &[String], timeout_ms: u64) -> Result<ProcessOutput> {
        let profile = self.effective_profile(
            &SandboxProfile::probe(timeout_ms)
                .with_network(false)
                .with_shell(false),
        );
        let supervisor = ProcessSupervisor::new(self.supervisor_config.clone());
        supervisor
            .run(&self.binary(), args, &profile, None, |_| {}, |_| {})
            .await
    }

    fn env_present(&self, key: &str) -> bool {
        self.overrides
            .env
            .get(key)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
            || std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false)
    }
}

#[async_trait]
impl<T: ToolSpec> AgentAdapter for CliAgent<T> {
    fn info(&self) -> AgentInfo {
        AgentInfo {
            id: T::ID.to_string(),
            name: T::NAME.to_string(),
            capabilities: T::CAPABILITIES.to_vec(),
            required_env: T::REQUIRED_ENV.iter().map(|s| s.to_string()).collect(),
            binary: self.binary(),
        }
    }

    fn state(&self) -> AdapterState {
        self.state.get()
    }

    async fn detect(&self) -> DetectResult {
        let binary = self.binary();
        let result = match self.probe(&self.tool.version_args(), DETECT_TIMEOUT_MS).await {
            Ok(output) if output.success() => {
                let version = extract_version(&output.stdout)
                    .or_else(|| extract_version(&output.stderr));
                let path = which::which(&binary).ok();
                DetectResult::installed(version, path)
            }
            Ok(output) => DetectResult::not_installed(format!(
                "'{} {}' exited with code {}",
                binary,
                self.tool.version_args().join(" "),
                output.exit_code
            )),
            Err(e) => DetectResult::not_installed(e.to_string()),
        };

        debug!("{} detect: {:?}", T::ID, result);
        if result.installed {
            if self.state.get() == AdapterState::NotDetected {
                self.state.transition(AdapterState::Detected);
            }
        } else {
            self.state.transition(AdapterState::NotDetected);
        }
        result
    }

    async fn validate_auth(&self) -> AuthResult {
        let missing: Vec<&str> = T::REQUIRED_ENV
            .iter()
            .copied()
            .filter(|key| !self.env_present(key))
            .collect();
        if !missing.is_empty() {
            return AuthResult::invalid(format!(
                "Missing required environment variable(s): {}",
                missing.join(", ")
            ));
        }

        let args = self.tool.auth_check_args();
        let result = match self.probe(&args, AUTH_TIMEOUT_MS).await {
            Ok(output) if output.success() => AuthResult::valid(),
            Ok(output) => {
                let detail = last_line(&output.stderr)
                    .or_else(|| last_line(&output.stdout))
                    .map(|l| format!(": {}", l))
                    .unwrap_or_default();
                AuthResult::invalid(format!(
                    "'{} {}' exited with code {}{}",
                    self.binary(),
                    args.join(" "),
                    output.exit_code,
                    detail
                ))
            }
            Err(e) => AuthResult::invalid(e.to_string()),
        };

        if result.valid {
            self.state.transition(AdapterState::Detected);
            self.state.transition(AdapterState::Authenticated);
        }
        result
    }

    async fn execute(&self, job: AgentJob) -> Result<RunHandle> {
        let targets_this = job.agent_id == T::ID
            || AgentKind::from_id(&job.agent_id).map(|kind| kind.id()) == Some(T::ID);
        if !targets_this {
            return Err(Error::Validation(format!(
                "Job targets agent '{}' but this adapter is '{}'",
                job.agent_id,
                T::ID
            )));
        }

        let run_id = RunId::new();
        let guard = WorkspaceGuard::new(&job.workspace_id, &self.workspace_policy())?;
        let (accepted, rejected) = self.validate_context_files(&guard, &job.context_files);
        for rejection in &rejected {
            warn!(
                "Run {}: context file {} rejected: {}",
                run_id,
                rejection.path.display(),
                rejection.reason
            );
        }

        let (cwd, cwd_rejection) = resolve_cwd(&guard, &job.profile);
        if let Some(rejection) = &cwd_rejection {
            warn!(
                "Run {}: working directory {} rejected, using workspace root: {}",
                run_id,
                rejection.path.display(),
                rejection.reason
            );
        }
        let mut profile = self.effective_profile(&job.profile);
        profile.cwd = Some(cwd.clone());
        let mut args = self.tool.build_args(&Invocation {
            task: &job.task,
            context_files: &accepted,
            profile: &profile,
            cwd: &cwd,
        });
        args.extend(self.overrides.extra_args.iter().cloned());

        let supervisor = Arc::new(ProcessSupervisor::new(self.supervisor_config.clone()));
        let live = LiveRun::new(Arc::clone(&supervisor));
        let cancel = Arc::clone(&live.cancel);
        self.runs.insert(run_id.clone(), live);
        self.state.transition(AdapterState::Running);

        info!(
            "Run {} ({}): {} files accepted, {} rejected",
            run_id,
            T::ID,
            accepted.len(),
            rejected.len()
        );

        let ctx = RunContext {
            run_id: run_id.clone(),
            agent_id: T::ID,
            binary: self.binary(),
            args,
            profile,
            cwd,
            job,
            accepted,
            rejected,
            cwd_rejection,
            strict_context_files: self.strict_context_files,
            guard,
        };
        let finisher = RunFinisher::new(Arc::clone(&self.runs), run_id.clone());
        let events = run_events(ctx, supervisor, cancel, finisher);

        Ok(RunHandle::new(run_id, Box::pin(events)))
    }

    async fn cancel(&self, run_id: &RunId) -> Result<()> {
        self.runs.cancel(run_id)
    }

    fn get_run_status(&self, run_id: &RunId) -> Result<RunStatus> {
        let status = self.runs.status(run_id)?;
        if status.is_terminal() {
            if let Some(state) = AdapterState::from_run_status(status) {
                if self.state.get() == AdapterState::Running && self.runs.live_runs().is_empty() {
                    self.state.transition(state);
                }
            }
        }
        Ok(status)
    }
}

// ============================================================================
// 이벤트 스트림
// ============================================================================

struct RunContext {
    run_id: RunId,
    agent_id: &'static str,
    binary: String,
    args: Vec<String>,
    profile: SandboxProfile,
    cwd: PathBuf,
    job: AgentJob,
    accepted: Vec<PathBuf>,
    rejected: Vec<RejectedFile>,
    cwd_rejection: Option<RejectedFile>,
    strict_context_files: bool,
    guard: WorkspaceGuard,
}

fn run_events(
    ctx: RunContext,
    supervisor: Arc<ProcessSupervisor>,
    cancel: Arc<tokio::sync::Notify>,
    mut finisher: RunFinisher,
) -> impl futures::Stream<Item = AgentEvent> + Send {
    stream! {
        let run_id = ctx.run_id.clone();
        let mut normalizer = OutputEventNormalizer::new();
        let started = Instant::now();

        yield normalizer.next_event(&run_id, AgentEventType::TaskStart, json!({
            "agentId": ctx.agent_id,
            "jobId": ctx.job.id,
            "task": ctx.job.task,
            "workspace": ctx.guard.root().display().to_string(),
            "cwd": ctx.cwd.display().to_string(),
            "contextFiles": paths_json(&ctx.accepted),
            "profile": ctx.profile.name,
        }));

        for rejection in &ctx.rejected {
            let path = rejection.path.display().to_string();
            if ctx.strict_context_files {
                finisher.finish(RunStatus::Failed);
                yield normalizer.next_event(&run_id, AgentEventType::Error, json!({
                    "reason": "context file rejected",
                    "path": path,
                    "message": rejection.reason,
                }));
                return;
            }
            yield normalizer.next_event(&run_id, AgentEventType::Progress, json!({
                "message": format!("Context file dropped: {}", path),
                "diagnostic": "context_file_rejected",
                "path": path,
                "reason": rejection.reason,
            }));
        }

        if let Some(rejection) = &ctx.cwd_rejection {
            yield normalizer.next_event(&run_id, AgentEventType::Progress, json!({
                "message": format!(
                    "Working directory {} rejected; using workspace root",
                    rejection.path.display()
                ),
                "diagnostic": "cwd_rejected",
                "path": rejection.path.display().to_string(),
                "reason": rejection.reason,
            }));
        }

        let (line_tx, mut line_rx) = mpsc::channel::<OutputLine>(LINE_CHANNEL_CAPACITY);
        let run = supervisor.run_streaming(
            &ctx.binary,
            &ctx.args,
            &ctx.profile,
            Some(ctx.cwd.as_path()),
            line_tx,
        );
        tokio::pin!(run);

        // 실행 결과와 취소를 라인보다 먼저 확인 (출력 폭주 중에도 종료 이벤트 보장)
        let mut cancel_requested = false;
        let outcome = loop {
            let line = tokio::select! {
                biased;
                result = &mut run => break result,
                _ = cancel.notified(), if !cancel_requested => {
                    cancel_requested = true;
                    supervisor.kill(Signal::Terminate);
                    continue;
                }
                Some((_, line)) = line_rx.recv() => line,
            };
            if let Some(event) = normalizer.parse_line(&line, &run_id) {
                yield annotate(event, &ctx.guard);
            }
        };

        // 채널 용량만큼만 남아 있음
        while let Ok((_, line)) = line_rx.try_recv() {
            if let Some(event) = normalizer.parse_line(&line, &run_id) {
                yield annotate(event, &ctx.guard);
            }
        }

        let (event_type, data, status) = terminal(outcome, started);
        info!("Run {} finished: {}", run_id, status);
        finisher.finish(status);
        yield normalizer.next_event(&run_id, event_type, data);
    }
}

/// 작업 디렉토리 해석. 상대 경로는 워크스페이스 루트 기준이고, 루트 밖이거나
/// 정책이 막는 경로는 루트로 대체
fn resolve_cwd(
    guard: &WorkspaceGuard,
    profile: &SandboxProfile,
) -> (PathBuf, Option<RejectedFile>) {
    let Some(dir) = &profile.cwd else {
        return (guard.root().to_path_buf(), None);
    };

    let verdict = guard.validate_path(dir, FileOp::Read);
    match guard.resolve(dir) {
        Some(resolved) if verdict.allowed => (resolved, None),
        _ => (
            guard.root().to_path_buf(),
            Some(RejectedFile {
                path: dir.clone(),
                reason: verdict
                    .reason
                    .unwrap_or_else(|| "outside workspace".to_string()),
            }),
        ),
    }
}

/// 실행 결과 → 종료 이벤트
fn terminal(outcome: Result<ProcessOutput>, started: Instant) -> (AgentEventType, Value, RunStatus) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match outcome {
        Ok(output) if output.success() => (
            AgentEventType::TaskComplete,
            json!({
                "exitCode": 0,
                "durationMs": output.duration_ms(),
                "truncated": output.truncated,
            }),
            RunStatus::Completed,
        ),
        Ok(output) => {
            let mut data = json!({
                "reason": format!("exit code {}", output.exit_code),
                "exitCode": output.exit_code,
                "durationMs": output.duration_ms(),
                "truncated": output.truncated,
            });
            if let Some(line) = last_line(&output.stderr) {
                data["message"] = json!(line);
            }
            (AgentEventType::Error, data, RunStatus::Failed)
        }
        Err(Error::Timeout { after_ms }) => (
            AgentEventType::Error,
            json!({ "reason": REASON_TIMEOUT, "timeoutMs": after_ms, "durationMs": elapsed_ms }),
            RunStatus::Failed,
        ),
        // 요청된 취소와 외부 시그널 모두 취소로 보고
        Err(Error::Killed { signal }) => (
            AgentEventType::Error,
            json!({ "reason": REASON_CANCELLED, "signal": signal, "durationMs": elapsed_ms }),
            RunStatus::Cancelled,
        ),
        Err(e) if e.is_spawn_failure() => (
            AgentEventType::Error,
            json!({ "reason": "spawn failed", "message": e.to_string(), "durationMs": elapsed_ms }),
            RunStatus::Failed,
        ),
        Err(e) => (
            AgentEventType::Error,
            json!({ "reason": e.to_string(), "durationMs": elapsed_ms }),
            RunStatus::Failed,
        ),
    }
}

/// 도구 출력 이벤트 후처리
///
/// - 생명주기 타입(task_start / task_complete / error)은 progress 로 강등
/// - shell_exec / 파일 이벤트에 정책 검증 결과 첨부
fn annotate(mut event: AgentEvent, guard: &WorkspaceGuard) -> AgentEvent {
    if event.event_type.is_lifecycle() {
        let reported = event.event_type.as_str();
        event.event_type = AgentEventType::Progress;
        if let Value::Object(map) = &mut event.data {
            map.insert("reportedType".into(), json!(reported));
        }
        return event;
    }

    let verdict = match event.event_type {
        AgentEventType::ShellExec => command_text(event.data.get("command"))
            .map(|command| guard.validate_command(&command)),
        AgentEventType::FileEdit | AgentEventType::FileCreate => event
            .data_str("path")
            .map(|path| guard.validate_path(path, FileOp::Write)),
        _ => None,
    };

    if let Some(verdict) = verdict {
        if !verdict.allowed {
            warn!(
                "Run {}: agent reported {} outside workspace policy: {}",
                event.run_id,
                event.event_type,
                verdict.reason.as_deref().unwrap_or("denied")
            );
        }
        if let Value::Object(map) = &mut event.data {
            map.insert("policy".into(), json!(verdict));
        }
    }
    event
}

fn command_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let parts: Vec<&str> = parts.iter().filter_map(Value::as_str).collect();
            (!parts.is_empty()).then(|| parts.join(" "))
        }
        _ => None,
    }
}

fn paths_json(paths: &[PathBuf]) -> Value {
    Value::Array(
        paths
            .iter()
            .map(|p| Value::String(p.display().to_string()))
            .collect(),
    )
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().rev().map(str::trim).find(|l| !l.is_empty())
}
