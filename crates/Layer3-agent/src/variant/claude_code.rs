//! Claude Code (`claude`)

use super::{prompt_with_files, Invocation, ToolSpec};
use crate::runtime::AgentCapability;

/// Anthropic Claude Code CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaudeCode;

impl ToolSpec for ClaudeCode {
    const ID: &'static str = "claude-code";
    const NAME: &'static str = "Claude Code";
    const BINARY: &'static str = "claude";
    const REQUIRED_ENV: &'static [&'static str] = &["ANTHROPIC_API_KEY"];
    const CAPABILITIES: &'static [AgentCapability] = &[
        AgentCapability::CodeEdit,
        AgentCapability::ShellExec,
        AgentCapability::StructuredOutput,
        AgentCapability::Streaming,
        AgentCapability::MultiFile,
    ];

    fn build_args(&self, inv: &Invocation<'_>) -> Vec<String> {
        // @path 참조는 claude 가 직접 읽음
        let prompt = prompt_with_files(inv.task, inv.context_files, |p| {
            format!("@{}", p.display())
        });

        let mut args = vec![
            "-p".to_string(),
            prompt,
            "--output-format".to_string(),
            "stream-json".to_string(),
            "--verbose".to_string(),
            "--add-dir".to_string(),
            inv.cwd.display().to_string(),
        ];
        if !inv.profile.allow_shell {
            args.push("--disallowedTools".to_string());
            args.push("Bash".to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_foundation::SandboxProfile;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_args_without_shell() {
        let files = vec![PathBuf::from("/repo/src/lib.rs")];
        let profile = SandboxProfile::default();
        let args = ClaudeCode.build_args(&Invocation {
            task: "add docs",
            context_files: &files,
            profile: &profile,
            cwd: Path::new("/repo"),
        });

        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "add docs\n\nContext files:\n@/repo/src/lib.rs");
        assert!(args.windows(2).any(|w| w == ["--output-format", "stream-json"]));
        assert!(args.windows(2).any(|w| w == ["--add-dir", "/repo"]));
        assert!(args.windows(2).any(|w| w == ["--disallowedTools", "Bash"]));
    }

    #[test]
    fn test_args_with_shell() {
        let profile = SandboxProfile::default().with_shell(true);
        let args = ClaudeCode.build_args(&Invocation {
            task: "run tests",
            context_files: &[],
            profile: &profile,
            cwd: Path::new("/repo"),
        });
        assert_eq!(args[1], "run tests");
        assert!(!args.contains(&"--disallowedTools".to_string()));
    }
}
