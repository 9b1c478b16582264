//! Codex CLI (`codex exec`)

use super::{prompt_with_files, Invocation, ToolSpec};
use crate::runtime::AgentCapability;

/// OpenAI Codex CLI (non-interactive `exec` mode)
#[derive(Debug, Clone, Copy, Default)]
pub struct Codex;

impl ToolSpec for Codex {
    const ID: &'static str = "codex";
    const NAME: &'static str = "Codex CLI";
    const BINARY: &'static str = "codex";
    const REQUIRED_ENV: &'static [&'static str] = &["OPENAI_API_KEY"];
    const CAPABILITIES: &'static [AgentCapability] = &[
        AgentCapability::CodeEdit,
        AgentCapability::ShellExec,
        AgentCapability::StructuredOutput,
        AgentCapability::Streaming,
    ];

    fn build_args(&self, inv: &Invocation<'_>) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            "--json".to_string(),
            "--skip-git-repo-check".to_string(),
            "--cd".to_string(),
            inv.cwd.display().to_string(),
            "--sandbox".to_string(),
            "workspace-write".to_string(),
        ];
        if inv.profile.allow_network {
            args.push("-c".to_string());
            args.push("sandbox_workspace_write.network_access=true".to_string());
        }
        args.push(prompt_with_files(inv.task, inv.context_files, |p| {
            format!("- {}", p.display())
        }));
        args
    }

    fn auth_check_args(&self) -> Vec<String> {
        vec!["login".to_string(), "status".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_foundation::SandboxProfile;
    use std::path::{Path, PathBuf};

    #[test]
    fn test_args_shape() {
        let files = vec![PathBuf::from("/w/a.rs"), PathBuf::from("/w/b.rs")];
        let profile = SandboxProfile::default();
        let args = Codex.build_args(&Invocation {
            task: "fix lint",
            context_files: &files,
            profile: &profile,
            cwd: Path::new("/w"),
        });

        assert_eq!(&args[..3], ["exec", "--json", "--skip-git-repo-check"]);
        assert!(args.windows(2).any(|w| w == ["--cd", "/w"]));
        assert!(!args.contains(&"-c".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("fix lint\n\nContext files:\n- /w/a.rs\n- /w/b.rs")
        );
    }

    #[test]
    fn test_network_flag() {
        let profile = SandboxProfile::default().with_network(true);
        let args = Codex.build_args(&Invocation {
            task: "t",
            context_files: &[],
            profile: &profile,
            cwd: Path::new("/w"),
        });
        assert!(args
            .windows(2)
            .any(|w| w == ["-c", "sandbox_workspace_write.network_access=true"]));
        assert_eq!(Codex.auth_check_args(), vec!["login", "status"]);
    }
}
