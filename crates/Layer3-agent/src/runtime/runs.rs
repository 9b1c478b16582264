//! Run Table
//!
//! 어댑터별 실행 추적 테이블입니다.
//! 실행 중인 run 은 ProcessSupervisor 를, 끝난 run 은 최종 상태만 보관합니다.

use parking_lot::RwLock;
use relay_foundation::{Error, Result, RunId, RunStatus};
use relay_task::{ProcessSupervisor, Signal};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

/// 종료된 run 상태 보관 개수
pub const RUN_HISTORY_LIMIT: usize = 1024;

/// 실행 중인 run
#[derive(Clone)]
pub struct LiveRun {
    pub supervisor: Arc<ProcessSupervisor>,
    /// 이벤트 스트림 쪽에 취소 요청 전달 (요청은 permit 으로 보존됨)
    pub cancel: Arc<Notify>,
}

impl LiveRun {
    pub fn new(supervisor: Arc<ProcessSupervisor>) -> Self {
        Self {
            supervisor,
            cancel: Arc::new(Notify::new()),
        }
    }
}

#[derive(Default)]
struct Inner {
    live: HashMap<RunId, LiveRun>,
    finished: HashMap<RunId, RunStatus>,
    order: VecDeque<RunId>,
}

/// run ID → 실행 상태
pub struct RunTable {
    inner: RwLock<Inner>,
    history_limit: usize,
}

impl RunTable {
    pub fn new() -> Self {
        Self::with_history_limit(RUN_HISTORY_LIMIT)
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            history_limit: history_limit.max(1),
        }
    }

    /// 실행 등록
    pub fn insert(&self, run_id: RunId, run: LiveRun) {
        self.inner.write().live.insert(run_id, run);
    }

    /// 실행 종료 기록 (이미 종료된 run 이면 무시)
    pub fn finish(&self, run_id: &RunId, status: RunStatus) {
        let mut inner = self.inner.write();
        if inner.live.remove(run_id).is_none() {
            return;
        }

        debug!("Run {} finished: {}", run_id, status);
        inner.finished.insert(run_id.clone(), status);
        inner.order.push_back(run_id.clone());
        while inner.order.len() > self.history_limit {
            if let Some(oldest) = inner.order.pop_front() {
                inner.finished.remove(&oldest);
            }
        }
    }

    /// 실행 중인 run 의 supervisor
    pub fn live(&self, run_id: &RunId) -> Option<LiveRun> {
        self.inner.read().live.get(run_id).cloned()
    }

    /// 취소 요청
    pub fn cancel(&self, run_id: &RunId) -> Result<()> {
        let Some(run) = self.live(run_id) else {
            return match self.inner.read().finished.get(run_id) {
                Some(status) => Err(Error::Validation(format!(
                    "Run {} already finished ({})",
                    run_id, status
                ))),
                None => Err(Error::RunNotFound(run_id.to_string())),
            };
        };

        info!("Cancelling run {}", run_id);
        run.cancel.notify_one();
        run.supervisor.kill(Signal::Terminate);
        Ok(())
    }

    /// 상태 스냅샷
    pub fn status(&self, run_id: &RunId) -> Result<RunStatus> {
        let inner = self.inner.read();
        if let Some(run) = inner.live.get(run_id) {
            let supervisor = &run.supervisor;
            return Ok(if supervisor.is_running() {
                RunStatus::Running
            } else if supervisor.has_started() {
                RunStatus::Completed
            } else {
                RunStatus::Pending
            });
        }
        inner
            .finished
            .get(run_id)
            .copied()
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    /// 실행 중인 run ID 목록
    pub fn live_runs(&self) -> Vec<RunId> {
        self.inner.read().live.keys().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.inner.read().finished.len()
    }
}

impl Default for RunTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 스트림이 어떤 식으로 끝나든 run 을 종료 상태로 옮기는 가드
///
/// 스트림이 종료 이벤트 전에 버려지면 `Cancelled` 로 기록합니다.
pub(crate) struct RunFinisher {
    table: Arc<RunTable>,
    run_id: RunId,
    done: bool,
}

impl RunFinisher {
    pub(crate) fn new(table: Arc<RunTable>, run_id: RunId) -> Self {
        Self {
            table,
            run_id,
            done: false,
        }
    }

    pub(crate) fn finish(&mut self, status: RunStatus) {
        self.table.finish(&self.run_id, status);
        self.done = true;
    }
}

impl Drop for RunFinisher {
    fn drop(&mut self) {
        if !self.done {
            debug!("Run {} stream dropped before completion", self.run_id);
            self.table.finish(&self.run_id, RunStatus::Cancelled);
        }
    }
}
