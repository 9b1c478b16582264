//! JSON 설정 파일 저장소
//!
//! `<config_dir>/agentrelay/` (글로벌) 과 `<project>/.agentrelay/` (프로젝트)
//! 두 위치를 같은 API 로 다룹니다. 저장은 임시 파일 + rename 으로 교체합니다.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 글로벌/프로젝트 설정 디렉토리 이름
pub const APP_DIR: &str = "agentrelay";

/// 디렉토리 하나에 묶인 JSON 파일 저장소
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 사용자 설정 디렉토리 아래 저장소
    pub fn global() -> Result<Self> {
        dirs::config_dir()
            .map(|dir| Self::new(dir.join(APP_DIR)))
            .ok_or_else(|| Error::Config("No user config directory on this platform".to_string()))
    }

    /// 프로젝트 루트의 `.agentrelay/`
    pub fn project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(format!(".{}", APP_DIR)))
    }

    pub fn current_project() -> Result<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| Error::Config(format!("Cannot resolve working directory: {}", e)))?;
        Ok(Self::project(cwd))
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.base_dir.join(filename)
    }

    /// 파일이 없으면 `Ok(None)`, 읽기/파싱 실패는 `Error::Config`
    pub fn load_optional<T: DeserializeOwned>(&self, filename: &str) -> Result<Option<T>> {
        let path = self.file_path(filename);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Config(format!("Cannot read {}: {}", path.display(), e)));
            }
        };

        let value = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Invalid JSON in {} (line {}, column {}): {}",
                path.display(),
                e.line(),
                e.column(),
                e
            ))
        })?;
        debug!("Loaded {}", path.display());
        Ok(Some(value))
    }

    /// 파일이 반드시 있어야 하는 로드
    pub fn load<T: DeserializeOwned>(&self, filename: &str) -> Result<T> {
        self.load_optional(filename)?.ok_or_else(|| {
            Error::Config(format!("{} does not exist", self.file_path(filename).display()))
        })
    }

    /// 없거나 깨진 파일은 기본값 (깨진 파일은 경고 로그)
    pub fn load_or_default<T: DeserializeOwned + Default>(&self, filename: &str) -> T {
        match self.load_optional(filename) {
            Ok(value) => value.unwrap_or_default(),
            Err(e) => {
                warn!("{}; falling back to defaults", e);
                T::default()
            }
        }
    }

    /// pretty JSON 으로 저장 (디렉토리 자동 생성)
    pub fn save<T: Serialize>(&self, filename: &str, data: &T) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| {
            Error::Config(format!("Cannot create {}: {}", self.base_dir.display(), e))
        })?;

        let path = self.file_path(filename);
        let staging = self.file_path(&format!(".{}.tmp", filename));
        let mut content = serde_json::to_string_pretty(data)?;
        content.push('\n');

        std::fs::write(&staging, content)
            .and_then(|_| std::fs::rename(&staging, &path))
            .map_err(|e| Error::Config(format!("Cannot write {}: {}", path.display(), e)))?;
        debug!("Saved {}", path.display());
        Ok(())
    }

    /// 파일 삭제 (없으면 false)
    pub fn remove(&self, filename: &str) -> Result<bool> {
        match std::fs::remove_file(self.file_path(filename)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.file_path(filename).is_file()
    }
}
