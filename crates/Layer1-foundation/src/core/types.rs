//! Core Types - 작업/샌드박스/정책 데이터 타입
//!
//! 호출자가 생성하고 런타임은 읽기만 하는 불변 타입들입니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// RunId
// ============================================================================

/// 한 번의 AgentJob 실행을 식별하는 ID
///
/// 프로세스 수명 동안 유일합니다 (UUID v4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// 새 실행 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RunId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// SandboxProfile
// ============================================================================

/// 한 번의 실행에 대한 제약 조건
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxProfile {
    /// 프로필 이름
    pub name: String,

    /// 네트워크 접근 허용 (도구에 전달되는 선언일 뿐, OS 격리는 하지 않음)
    #[serde(default)]
    pub allow_network: bool,

    /// 쉘 명령 실행 허용
    #[serde(default)]
    pub allow_shell: bool,

    /// 벽시계 타임아웃 (ms). 0 이면 런타임 기본값 사용
    #[serde(default)]
    pub timeout_ms: u64,

    /// 프로세스 환경 변수 (상위 환경 위에 덮어씀)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// 작업 디렉토리
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl SandboxProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allow_network: false,
            allow_shell: false,
            timeout_ms: 0,
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// 버전 확인 등 짧은 진단 명령용 프로필 (네트워크/쉘 차단)
    pub fn probe(timeout_ms: u64) -> Self {
        Self::new("probe").with_timeout_ms(timeout_ms)
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_network(mut self, allow: bool) -> Self {
        self.allow_network = allow;
        self
    }

    pub fn with_shell(mut self, allow: bool) -> Self {
        self.allow_shell = allow;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

impl Default for SandboxProfile {
    fn default() -> Self {
        Self::new("default")
    }
}

// ============================================================================
// AgentJob
// ============================================================================

/// 위임할 코딩 작업 설명
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentJob {
    /// 작업 ID
    pub id: String,

    /// 워크스페이스 루트 경로
    pub workspace_id: PathBuf,

    /// 실행할 에이전트 ID (예: "claude-code")
    pub agent_id: String,

    /// 자유 형식 작업 설명
    pub task: String,

    /// 함께 전달할 컨텍스트 파일 (순서 유지)
    #[serde(default)]
    pub context_files: Vec<PathBuf>,

    /// 샌드박스 프로필
    #[serde(default)]
    pub profile: SandboxProfile,
}

impl AgentJob {
    pub fn new(
        workspace: impl Into<PathBuf>,
        agent_id: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workspace_id: workspace.into(),
            agent_id: agent_id.into(),
            task: task.into(),
            context_files: Vec::new(),
            profile: SandboxProfile::default(),
        }
    }

    pub fn with_context_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.context_files.push(path.into());
        self
    }

    pub fn with_profile(mut self, profile: SandboxProfile) -> Self {
        self.profile = profile;
        self
    }

    /// 실제 프로세스 작업 디렉토리 (profile.cwd 또는 워크스페이스 루트)
    pub fn working_dir(&self) -> PathBuf {
        self.profile
            .cwd
            .clone()
            .unwrap_or_else(|| self.workspace_id.clone())
    }
}

// ============================================================================
// WorkspacePolicy
// ============================================================================

/// 버전 관리 및 빌드 산출물 디렉토리 (항상 차단)
pub const BASELINE_FORBIDDEN_PATHS: &[&str] = &[
    "**/.git",
    "**/.git/**",
    "**/.hg/**",
    "**/.svn/**",
    "**/node_modules/**",
    "**/target/**",
    "**/dist/**",
    "**/build/**",
    "**/__pycache__/**",
];

/// 기본 차단 명령어 (정규식)
pub const DEFAULT_FORBIDDEN_COMMANDS: &[&str] = &[
    // 시스템 파괴
    r"rm\s+(-[rfRF]+\s+)+/(\*|\s|$)",
    r"rm\s+(-[rfRF]+\s+)+~",
    // Fork bomb
    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    // 디스크 파괴
    r"dd\s+if=.*of=/dev/[sh]d[a-z]",
    r">\s*/dev/[sh]d[a-z]",
    r"mkfs(\.\w+)?\s",
    // 시스템 종료
    r"\b(shutdown|reboot|halt|poweroff)\b",
    // 권한 파괴
    r"chmod\s+(-R\s+)?777\s+/(\s|$)",
    // 네트워크 악용
    r"bash\s+-i\s+>&\s*/dev/tcp",
    r"\|\s*(nc|netcat)\s",
    r"(curl|wget)\s+[^|]*\|\s*(ba|z)?sh\b",
];

/// 워크스페이스 접근 정책 (선언적 allow/deny)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspacePolicy {
    /// 허용 경로 glob (비어 있으면 제한 없음)
    #[serde(default)]
    pub allowed_paths: Vec<String>,

    /// 차단 경로 glob (allow 보다 우선)
    #[serde(default)]
    pub forbidden_paths: Vec<String>,

    /// 허용 명령어 정규식 (비어 있으면 제한 없음)
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// 차단 명령어 정규식
    #[serde(default)]
    pub forbidden_commands: Vec<String>,

    /// 최대 파일 크기
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size_bytes: Option<u64>,

    /// 한 번의 작업에서 다룰 수 있는 최대 파일 수
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files_per_op: Option<usize>,
}

impl WorkspacePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// VCS / 빌드 산출물 차단 목록만 가진 정책
    pub fn baseline() -> Self {
        Self {
            forbidden_paths: BASELINE_FORBIDDEN_PATHS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        }
    }

    /// baseline + 위험 명령어 차단 + 크기 제한
    pub fn strict() -> Self {
        Self {
            forbidden_commands: DEFAULT_FORBIDDEN_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_size_bytes: Some(10 * 1024 * 1024),
            max_files_per_op: Some(100),
            ..Self::baseline()
        }
    }

    pub fn allow_path(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_paths.push(pattern.into());
        self
    }

    pub fn forbid_path(mut self, pattern: impl Into<String>) -> Self {
        self.forbidden_paths.push(pattern.into());
        self
    }

    pub fn allow_command(mut self, pattern: impl Into<String>) -> Self {
        self.allowed_commands.push(pattern.into());
        self
    }

    pub fn forbid_command(mut self, pattern: impl Into<String>) -> Self {
        self.forbidden_commands.push(pattern.into());
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size_bytes = Some(bytes);
        self
    }

    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files_per_op = Some(count);
        self
    }
}

// ============================================================================
// ValidationResult
// ============================================================================

/// 정책 검증 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

/// 경로 검증 시 작업 종류 (거부 사유에 포함)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOp {
    Read,
    Write,
    Create,
    Delete,
}

impl FileOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileOp::Read => "read",
            FileOp::Write => "write",
            FileOp::Create => "create",
            FileOp::Delete => "delete",
        }
    }
}

impl std::fmt::Display for FileOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
