//! Agent Registry
//!
//! 지원하는 도구의 닫힌 목록(`AgentKind`)과 ID 로 어댑터를 찾는 레지스트리입니다.

use super::{Aider, ClaudeCode, Codex, ToolSpec};
use crate::runtime::{AgentAdapter, AgentInfo, CliAgent};
use relay_foundation::{Error, Result, RuntimeConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// AgentKind
// ============================================================================

/// 지원하는 도구 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ClaudeCode,
    Codex,
    Aider,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::ClaudeCode, AgentKind::Codex, AgentKind::Aider];

    /// 에이전트 ID
    pub fn id(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => ClaudeCode::ID,
            AgentKind::Codex => Codex::ID,
            AgentKind::Aider => Aider::ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => ClaudeCode::NAME,
            AgentKind::Codex => Codex::NAME,
            AgentKind::Aider => Aider::NAME,
        }
    }

    /// ID 로 조회 ("claude" 같은 실행 파일 이름도 허용)
    pub fn from_id(id: &str) -> Option<Self> {
        let id = id.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == id || kind.binary() == id)
    }

    fn binary(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => ClaudeCode::BINARY,
            AgentKind::Codex => Codex::BINARY,
            AgentKind::Aider => Aider::BINARY,
        }
    }

    /// 설정을 적용한 어댑터 생성
    pub fn build(&self, config: &RuntimeConfig) -> Arc<dyn AgentAdapter> {
        match self {
            AgentKind::ClaudeCode => Arc::new(CliAgent::<ClaudeCode>::new(config)),
            AgentKind::Codex => Arc::new(CliAgent::<Codex>::new(config)),
            AgentKind::Aider => Arc::new(CliAgent::<Aider>::new(config)),
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_id(s).ok_or_else(|| Error::UnknownAgent(s.to_string()))
    }
}

// ============================================================================
// AgentRegistry
// ============================================================================

/// 모든 도구의 어댑터 인스턴스
///
/// 어댑터는 자체 run 테이블을 가지므로, 같은 run 을 취소하려면 같은
/// 레지스트리 인스턴스를 통해야 합니다.
pub struct AgentRegistry {
    agents: HashMap<AgentKind, Arc<dyn AgentAdapter>>,
}

impl AgentRegistry {
    pub fn new(config: &RuntimeConfig) -> Self {
        let agents = AgentKind::ALL
            .into_iter()
            .map(|kind| (kind, kind.build(config)))
            .collect();
        Self { agents }
    }

    /// ID 로 어댑터 조회
    pub fn get(&self, id: &str) -> Result<Arc<dyn AgentAdapter>> {
        let kind: AgentKind = id.parse()?;
        self.kind(kind)
            .ok_or_else(|| Error::UnknownAgent(id.to_string()))
    }

    pub fn kind(&self, kind: AgentKind) -> Option<Arc<dyn AgentAdapter>> {
        self.agents.get(&kind).cloned()
    }

    /// 등록 순서(AgentKind::ALL)대로 설명 목록
    pub fn list(&self) -> Vec<AgentInfo> {
        AgentKind::ALL
            .iter()
            .filter_map(|kind| self.agents.get(kind))
            .map(|agent| agent.info())
            .collect()
    }
}
