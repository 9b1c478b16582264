//! # Agent Variants
//!
//! 지원하는 외부 코딩 에이전트 CLI 목록입니다. 닫힌 집합이며, 각 도구는
//! [`ToolSpec`] 으로 argv 규칙만 정의하고 생명주기는 [`CliAgent`](crate::CliAgent) 가 공유합니다.
//!
//! ## 사용 가능한 도구
//!
//! - **ClaudeCode**: `claude -p … --output-format stream-json`
//! - **Codex**: `codex exec --json …`
//! - **Aider**: `aider --message … --yes-always`

mod aider;
mod claude_code;
mod codex;
mod registry;

pub use aider::Aider;
pub use claude_code::ClaudeCode;
pub use codex::Codex;
pub use registry::{AgentKind, AgentRegistry};

use crate::runtime::AgentCapability;
use relay_foundation::SandboxProfile;
use std::path::{Path, PathBuf};

/// argv 생성에 필요한 실행 정보
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// 작업 설명
    pub task: &'a str,
    /// 검증을 통과한 컨텍스트 파일 (절대 경로)
    pub context_files: &'a [PathBuf],
    pub profile: &'a SandboxProfile,
    /// 프로세스 작업 디렉토리
    pub cwd: &'a Path,
}

/// 도구별 호출 규칙
pub trait ToolSpec: Default + Send + Sync + 'static {
    /// 에이전트 ID
    const ID: &'static str;
    /// 표시 이름
    const NAME: &'static str;
    /// 기본 실행 파일
    const BINARY: &'static str;
    /// 인증에 필요한 환경 변수
    const REQUIRED_ENV: &'static [&'static str];
    const CAPABILITIES: &'static [AgentCapability];

    /// 작업 실행 argv
    fn build_args(&self, invocation: &Invocation<'_>) -> Vec<String>;

    /// 버전 확인 argv
    fn version_args(&self) -> Vec<String> {
        vec!["--version".to_string()]
    }

    /// 인증 확인 argv (싼 명령 하나)
    fn auth_check_args(&self) -> Vec<String> {
        self.version_args()
    }
}

/// 작업 설명 뒤에 컨텍스트 파일 목록을 붙인 프롬프트
pub(crate) fn prompt_with_files(task: &str, files: &[PathBuf], render: impl Fn(&Path) -> String) -> String {
    if files.is_empty() {
        return task.to_string();
    }
    let list: Vec<String> = files.iter().map(|f| render(f)).collect();
    format!("{}\n\nContext files:\n{}", task, list.join("\n"))
}

/// 기본 Agent Registry 생성 (모든 내장 도구 등록)
pub fn create_default_registry(config: &relay_foundation::RuntimeConfig) -> AgentRegistry {
    AgentRegistry::new(config)
}
