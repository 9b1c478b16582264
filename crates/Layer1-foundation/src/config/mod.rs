//! Configuration module
//!
//! - `runtime`: 에이전트 실행 런타임 설정 (타임아웃, kill 유예, 출력 제한, 에이전트별 override)

mod runtime;

pub use runtime::{
    AgentOverride, RuntimeConfig, SupervisorConfig, DEFAULT_DRAIN_TIMEOUT_MS,
    DEFAULT_KILL_GRACE_MS, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT_MS, RUNTIME_CONFIG_FILE,
};
