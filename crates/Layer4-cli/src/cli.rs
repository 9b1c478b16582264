//! Non-interactive CLI commands
//!
//! 각 명령은 프로세스 종료 코드를 돌려줍니다 (0 = 성공).

use futures::StreamExt;
use relay_agent::{AgentAdapter, AgentRegistry};
use relay_foundation::{
    AgentEvent, AgentEventType, AgentJob, FileOp, RunStatus, RuntimeConfig, SandboxProfile,
    ValidationResult, WorkspacePolicy,
};
use relay_task::WorkspaceGuard;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// `relay run` 인자
#[derive(Debug)]
pub struct RunArgs {
    pub agent: String,
    pub task: String,
    pub files: Vec<PathBuf>,
    pub workspace: PathBuf,
    pub timeout_ms: Option<u64>,
    pub network: bool,
    pub shell: bool,
    pub json: bool,
}

/// List supported agents
pub fn list_agents(config: &RuntimeConfig) -> i32 {
    let registry = AgentRegistry::new(config);
    for info in registry.list() {
        let caps: Vec<&str> = info.capabilities.iter().map(|c| c.as_str()).collect();
        let env = if info.required_env.is_empty() {
            "-".to_string()
        } else {
            info.required_env.join(",")
        };
        println!(
            "{:<12} {:<14} binary={:<10} env={:<18} [{}]",
            info.id,
            info.name,
            info.binary,
            env,
            caps.join(", ")
        );
    }
    0
}

pub async fn detect(config: &RuntimeConfig, agent: Option<&str>) -> anyhow::Result<i32> {
    let registry = AgentRegistry::new(config);
    let agents: Vec<Arc<dyn AgentAdapter>> = match agent {
        Some(id) => vec![registry.get(id)?],
        None => relay_agent::AgentKind::ALL
            .iter()
            .filter_map(|kind| registry.kind(*kind))
            .collect(),
    };

    let mut missing = 0;
    for adapter in agents {
        let id = adapter.info().id;
        let result = adapter.detect().await;
        if result.installed {
            let path = result
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "✓ {:<12} {:<12} {}",
                id,
                result.version.as_deref().unwrap_or("unknown"),
                path
            );
        } else {
            missing += 1;
            println!(
                "✗ {:<12} not installed ({})",
                id,
                result.reason.as_deref().unwrap_or("unknown reason")
            );
        }
    }

    // 단일 에이전트 조회만 실패 코드로 취급
    Ok(if agent.is_some() && missing > 0 { 1 } else { 0 })
}

pub async fn auth(config: &RuntimeConfig, agent: &str) -> anyhow::Result<i32> {
    let adapter = AgentRegistry::new(config).get(agent)?;
    let result = adapter.validate_auth().await;
    if result.valid {
        println!("✓ {} credentials look valid", adapter.info().id);
        Ok(0)
    } else {
        println!(
            "✗ {}: {}",
            adapter.info().id,
            result.reason.as_deref().unwrap_or("invalid credentials")
        );
        Ok(1)
    }
}

/// Run a task and stream events to stdout
///
/// Ctrl-C 는 `cancel(runId)` 로 전달되고, 종료 이벤트까지 계속 출력합니다.
pub async fn run(config: &RuntimeConfig, args: RunArgs) -> anyhow::Result<i32> {
    let registry = AgentRegistry::new(config);
    let adapter = registry.get(&args.agent)?;

    let mut profile = SandboxProfile::new("cli")
        .with_network(args.network)
        .with_shell(args.shell);
    if let Some(timeout_ms) = args.timeout_ms {
        profile = profile.with_timeout_ms(timeout_ms);
    }
    let job = args
        .files
        .iter()
        .fold(
            AgentJob::new(&args.workspace, adapter.info().id, &args.task),
            |job, file| job.with_context_file(file),
        )
        .with_profile(profile);

    let mut handle = adapter.execute(job).await?;
    let run_id = handle.run_id().clone();
    tracing::debug!("Started run {}", run_id);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_sent = false;
    let mut status = RunStatus::Running;

    loop {
        tokio::select! {
            event = handle.next() => {
                let Some(event) = event else { break };
                if let Some(terminal) = RunStatus::from_terminal(&event) {
                    status = terminal;
                }
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    println!("{}", format_event(&event));
                }
            }
            _ = &mut ctrl_c, if !cancel_sent => {
                cancel_sent = true;
                eprintln!("Cancelling run {}...", run_id);
                if let Err(e) = adapter.cancel(&run_id).await {
                    tracing::warn!("Cancel failed: {}", e);
                }
            }
        }
    }

    Ok(exit_code(status))
}

fn exit_code(status: RunStatus) -> i32 {
    match status {
        RunStatus::Completed => 0,
        RunStatus::Cancelled => 130,
        _ => 1,
    }
}

pub fn check_path(
    config: &RuntimeConfig,
    workspace: &Path,
    path: &Path,
    strict: bool,
) -> anyhow::Result<i32> {
    let guard = WorkspaceGuard::new(workspace, &cli_policy(config, strict))?;
    Ok(print_verdict(&path.display().to_string(), &guard.validate_path(path, FileOp::Read)))
}

pub fn check_command(config: &RuntimeConfig, command: &str, strict: bool) -> anyhow::Result<i32> {
    let guard = WorkspaceGuard::new(".", &cli_policy(config, strict))?;
    Ok(print_verdict(command, &guard.validate_command(command)))
}

fn cli_policy(config: &RuntimeConfig, strict: bool) -> WorkspacePolicy {
    let base = if strict {
        WorkspacePolicy::strict()
    } else {
        WorkspacePolicy::baseline()
    };
    config
        .extra_forbidden_paths
        .iter()
        .fold(base, |policy, pattern| policy.forbid_path(pattern.clone()))
}

fn print_verdict(subject: &str, verdict: &ValidationResult) -> i32 {
    if verdict.allowed {
        println!("allowed: {}", subject);
        0
    } else {
        println!(
            "denied: {} ({})",
            subject,
            verdict.reason.as_deref().unwrap_or("no reason given")
        );
        1
    }
}

/// 한 줄 요약 포맷
fn format_event(event: &AgentEvent) -> String {
    let time = chrono::DateTime::from_timestamp_millis(event.timestamp)
        .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_default();
    format!(
        "{} #{:<3} {:<13} {}",
        time,
        event.sequence,
        event.event_type.as_str(),
        summary(event)
    )
}

fn summary(event: &AgentEvent) -> String {
    let data = &event.data;
    let text = match event.event_type {
        AgentEventType::TaskStart => data.get("task").and_then(Value::as_str).map(str::to_string),
        AgentEventType::TaskComplete => data
            .get("durationMs")
            .and_then(Value::as_u64)
            .map(|ms| format!("done in {:.1}s", ms as f64 / 1000.0)),
        AgentEventType::Error => {
            let reason = event.data_str("reason").unwrap_or("error");
            Some(match event.data_str("message") {
                Some(message) => format!("{}: {}", reason, message),
                None => reason.to_string(),
            })
        }
        AgentEventType::ShellExec => {
            let command = match data.get("command") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let denied = data
                .get("policy")
                .and_then(|p| p.get("allowed"))
                .and_then(Value::as_bool)
                == Some(false);
            Some(if denied {
                format!("$ {}  [outside policy]", command)
            } else {
                format!("$ {}", command)
            })
        }
        AgentEventType::FileEdit | AgentEventType::FileCreate => event
            .data_str("path")
            .map(|path| format!("{} {}", event.data_str("action").unwrap_or("edit"), path)),
        _ => None,
    };

    text.or_else(|| event.data_str("message").map(str::to_string))
        .map(|s| truncate(&s, 160))
        .unwrap_or_else(|| truncate(&data.to_string(), 160))
}

/// Truncate a string for display
fn truncate(s: &str, max_chars: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_chars {
        s
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}
