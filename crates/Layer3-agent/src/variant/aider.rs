//! Aider (`aider`)

use super::{Invocation, ToolSpec};
use crate::runtime::AgentCapability;

/// Aider pair-programming CLI
///
/// API 키는 모델에 따라 다르므로 필수 환경 변수가 없습니다.
/// 작업 디렉토리는 프로세스 cwd 로 전달됩니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aider;

impl ToolSpec for Aider {
    const ID: &'static str = "aider";
    const NAME: &'static str = "Aider";
    const BINARY: &'static str = "aider";
    const REQUIRED_ENV: &'static [&'static str] = &[];
    const CAPABILITIES: &'static [AgentCapability] = &[
        AgentCapability::CodeEdit,
        AgentCapability::MultiFile,
        AgentCapability::GitAware,
    ];

    fn build_args(&self, inv: &Invocation<'_>) -> Vec<String> {
        let mut args = vec![
            "--message".to_string(),
            inv.task.to_string(),
            "--yes-always".to_string(),
            "--no-stream".to_string(),
            "--no-pretty".to_string(),
            "--no-auto-commits".to_string(),
        ];
        if !inv.profile.allow_shell {
            args.push("--no-suggest-shell-commands".to_string());
        }
        for file in inv.context_files {
            args.push("--file".to_string());
            args.push(file.display().to_string());
        }
        args
    }
}
