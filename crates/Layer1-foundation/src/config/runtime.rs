//! Runtime Config - 에이전트 실행 런타임 설정
//!
//! 글로벌 설정과 프로젝트 설정을 병합하여 사용합니다.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "config.json";

/// 기본 실행 타임아웃 (10분)
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// SIGTERM 이후 SIGKILL 까지의 유예 시간
pub const DEFAULT_KILL_GRACE_MS: u64 = 5_000;

/// 스트림별 최대 보관 출력 크기 (8 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 8 * 1024 * 1024;

/// 프로세스 종료 후 남은 출력을 읽는 최대 시간
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// Agent Override
// ============================================================================

/// 에이전트별 설정 덮어쓰기
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverride {
    /// 실행 파일 경로 또는 이름 (기본 바이너리 대신 사용)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,

    /// 기본 argv 뒤에 추가할 인자
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_args: Vec<String>,

    /// 프로세스에 추가할 환경 변수
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl AgentOverride {
    fn merge(&mut self, other: AgentOverride) {
        if other.binary.is_some() {
            self.binary = other.binary;
        }
        if !other.extra_args.is_empty() {
            self.extra_args = other.extra_args;
        }
        self.env.extend(other.env);
    }
}

// ============================================================================
// Supervisor Config
// ============================================================================

/// ProcessSupervisor 에 전달되는 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// 프로필에 타임아웃이 없을 때 사용
    pub default_timeout: Duration,
    /// SIGTERM -> SIGKILL 유예 시간
    pub kill_grace: Duration,
    /// 스트림별 최대 보관 바이트
    pub max_output_bytes: usize,
    /// 종료 후 출력 drain 제한 시간
    pub drain_timeout: Duration,
    /// Unix 에서 프로세스 그룹 단위로 시그널 전달
    pub kill_process_group: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            kill_grace: Duration::from_millis(DEFAULT_KILL_GRACE_MS),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            kill_process_group: true,
        }
    }
}

// ============================================================================
// Runtime Config
// ============================================================================

/// AgentRelay 런타임 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 프로필 타임아웃이 0 일 때 사용할 기본값
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// SIGTERM 이후 SIGKILL 까지 대기
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,

    /// 스트림별 최대 보관 출력
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,

    /// 종료 후 drain 제한 시간
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// 기본 차단 목록에 추가되는 glob 패턴
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_forbidden_paths: Vec<String>,

    /// 컨텍스트 파일 검증 실패 시 작업 중단
    #[serde(default)]
    pub strict_context_files: bool,

    /// 에이전트별 설정 (agent id -> override)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub agents: HashMap<String, AgentOverride>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_kill_grace_ms() -> u64 {
    DEFAULT_KILL_GRACE_MS
}

fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

fn default_drain_timeout_ms() -> u64 {
    DEFAULT_DRAIN_TIMEOUT_MS
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            kill_grace_ms: DEFAULT_KILL_GRACE_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            extra_forbidden_paths: Vec::new(),
            strict_context_files: false,
            agents: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)? {
                debug!("Loaded global config from {}", global.file_path(RUNTIME_CONFIG_FILE).display());
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            {
                debug!("Loaded project config from {}", project.file_path(RUNTIME_CONFIG_FILE).display());
                config.merge(project_config);
            }
        }

        Ok(config)
    }

    /// 특정 저장소에서 로드 (없으면 기본값)
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            .unwrap_or_default())
    }

    /// 저장소에 저장
    pub fn save_to(&self, store: &JsonStore) -> Result<()> {
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    /// 다른 설정 병합 (other 의 기본값이 아닌 값이 우선)
    pub fn merge(&mut self, other: RuntimeConfig) {
        if other.default_timeout_ms != DEFAULT_TIMEOUT_MS {
            self.default_timeout_ms = other.default_timeout_ms;
        }
        if other.kill_grace_ms != DEFAULT_KILL_GRACE_MS {
            self.kill_grace_ms = other.kill_grace_ms;
        }
        if other.max_output_bytes != DEFAULT_MAX_OUTPUT_BYTES {
            self.max_output_bytes = other.max_output_bytes;
        }
        if other.drain_timeout_ms != DEFAULT_DRAIN_TIMEOUT_MS {
            self.drain_timeout_ms = other.drain_timeout_ms;
        }
        for pattern in other.extra_forbidden_paths {
            if !self.extra_forbidden_paths.contains(&pattern) {
                self.extra_forbidden_paths.push(pattern);
            }
        }
        self.strict_context_files |= other.strict_context_files;
        for (id, agent) in other.agents {
            self.agents.entry(id).or_default().merge(agent);
        }
    }

    // ========================================================================
    // 파생 설정
    // ========================================================================

    /// ProcessSupervisor 설정
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            kill_grace: Duration::from_millis(self.kill_grace_ms),
            max_output_bytes: self.max_output_bytes,
            drain_timeout: Duration::from_millis(self.drain_timeout_ms),
            kill_process_group: true,
        }
    }

    /// 에이전트별 덮어쓰기 설정
    pub fn override_for(&self, agent_id: &str) -> AgentOverride {
        self.agents.get(agent_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(!config.strict_context_files);

        let supervisor = config.supervisor_config();
        assert_eq!(supervisor.kill_grace, Duration::from_secs(5));
        assert_eq!(supervisor.max_output_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"killGraceMs": 250, "agents": {"codex": {"binary": "/opt/codex"}}}"#)
                .unwrap();
        assert_eq!(config.kill_grace_ms, 250);
        assert_eq!(config.default_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(
            config.override_for("codex").binary.as_deref(),
            Some("/opt/codex")
        );
        assert_eq!(config.override_for("aider"), AgentOverride::default());
    }

    #[test]
    fn test_merge_project_over_global() {
        let mut global = RuntimeConfig {
            kill_grace_ms: 1_000,
            extra_forbidden_paths: vec!["secrets/**".into()],
            ..Default::default()
        };
        global.agents.insert(
            "claude-code".into(),
            AgentOverride {
                binary: Some("claude-beta".into()),
                ..Default::default()
            },
        );

        let mut project = RuntimeConfig {
            default_timeout_ms: 30_000,
            extra_forbidden_paths: vec!["secrets/**".into(), "*.pem".into()],
            strict_context_files: true,
            ..Default::default()
        };
        project.agents.insert(
            "claude-code".into(),
            AgentOverride {
                extra_args: vec!["--model".into(), "opus".into()],
                ..Default::default()
            },
        );

        global.merge(project);
        assert_eq!(global.default_timeout_ms, 30_000);
        assert_eq!(global.kill_grace_ms, 1_000);
        assert_eq!(global.extra_forbidden_paths, vec!["secrets/**", "*.pem"]);
        assert!(global.strict_context_files);

        let claude = global.override_for("claude-code");
        assert_eq!(claude.binary.as_deref(), Some("claude-beta"));
        assert_eq!(claude.extra_args, vec!["--model", "opus"]);
    }

    #[test]
    fn test_save_and_load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());

        assert_eq!(RuntimeConfig::load_from(&store).unwrap(), RuntimeConfig::default());

        let config = RuntimeConfig {
            drain_timeout_ms: 10,
            ..Default::default()
        };
        config.save_to(&store).unwrap();
        assert_eq!(RuntimeConfig::load_from(&store).unwrap(), config);
    }
}
