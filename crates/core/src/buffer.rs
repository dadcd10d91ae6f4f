//! 버퍼 매니저 — 출력별 유계 FIFO 큐와 백프레셔
//!
//! [`BufferManager`]는 출력 플러그인마다 배치 큐를 유지합니다.
//! 단일 `max_queue_size`(기본 1000)가 모든 출력에 적용되며,
//! 포인트가 아닌 *배치* 수를 제한합니다.
//!
//! 백프레셔는 보고될 뿐 강제되지 않습니다: 큐가 가득 차면
//! [`BufferManager::buffer`]가 `false`를 반환하고, 호출자는 입력을
//! 차단하지 않은 채 배치를 드롭하고 ERROR 이벤트를 발행해야 합니다.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value;

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::SignalpostError;
use crate::metrics as m;
use crate::types::{BufferStatus, DataBatch};

/// 기본 큐 용량 (배치 수)
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

struct BufferState {
    max_queue_size: usize,
    queues: HashMap<String, VecDeque<DataBatch>>,
    statuses: HashMap<String, BufferStatus>,
}

/// 버퍼 매니저
pub struct BufferManager {
    base: ComponentBase,
    state: RwLock<BufferState>,
}

impl BufferManager {
    /// 새 버퍼 매니저를 생성합니다.
    ///
    /// `max_queue_size`가 0이면 기본값 1000이 적용됩니다.
    pub fn new(max_queue_size: usize) -> Self {
        let max = if max_queue_size == 0 {
            DEFAULT_MAX_QUEUE_SIZE
        } else {
            max_queue_size
        };
        Self {
            base: ComponentBase::new("buffer_manager", "Buffer Manager"),
            state: RwLock::new(BufferState {
                max_queue_size: max,
                queues: HashMap::new(),
                statuses: HashMap::new(),
            }),
        }
    }

    /// 큐 용량을 변경합니다. 0은 무시됩니다.
    ///
    /// 이미 큐에 있는 배치에는 소급 적용되지 않습니다.
    pub fn set_max_queue_size(&self, max: usize) {
        if max == 0 {
            return;
        }
        self.state.write().expect("buffer lock poisoned").max_queue_size = max;
    }

    /// 현재 큐 용량을 반환합니다.
    pub fn max_queue_size(&self) -> usize {
        self.state.read().expect("buffer lock poisoned").max_queue_size
    }

    /// 출력의 큐에 배치를 추가합니다.
    ///
    /// - 빈 배치는 큐 항목을 만들지 않고 성공합니다.
    /// - 매니저가 `Running`이 아니면 `false`.
    /// - 큐가 가득 차면 상태에 `is_full`을 표시하고 `false`
    ///   (호출자는 백프레셔로 취급해야 합니다).
    pub fn buffer(&self, output_id: &str, batch: DataBatch) -> bool {
        if batch.is_empty() {
            return true;
        }
        if !self.base.is_running() {
            return false;
        }

        let mut state = self.state.write().expect("buffer lock poisoned");
        let max = state.max_queue_size;

        // 첫 참조 시 큐를 생성
        if !state.queues.contains_key(output_id) {
            state.queues.insert(output_id.to_owned(), VecDeque::new());
            state.statuses.insert(
                output_id.to_owned(),
                BufferStatus {
                    buffer_id: output_id.to_owned(),
                    queue_size: 0,
                    total_items: 0,
                    is_full: false,
                    last_update: Utc::now(),
                },
            );
        }

        let queue_len = state.queues[output_id].len();
        if queue_len >= max {
            let status = state
                .statuses
                .get_mut(output_id)
                .expect("status exists for queue");
            status.is_full = true;
            status.last_update = Utc::now();

            metrics::counter!(m::BUFFER_REJECTIONS_TOTAL, m::LABEL_OUTPUT => output_id.to_owned())
                .increment(1);
            return false;
        }

        let batch_size = batch.size();
        let queue = state
            .queues
            .get_mut(output_id)
            .expect("queue just ensured");
        queue.push_back(batch);
        let new_len = queue.len();

        let status = state
            .statuses
            .get_mut(output_id)
            .expect("status exists for queue");
        status.queue_size = new_len;
        status.total_items += batch_size;
        status.is_full = new_len >= max;
        status.last_update = Utc::now();

        metrics::counter!(m::BUFFER_BATCHES_BUFFERED_TOTAL, m::LABEL_OUTPUT => output_id.to_owned())
            .increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::BUFFER_QUEUE_SIZE, m::LABEL_OUTPUT => output_id.to_owned())
            .set(new_len as f64);

        true
    }

    /// 출력의 큐에서 배치를 FIFO 순서로 꺼냅니다.
    ///
    /// `max_batches == 0`은 "전부"를 의미합니다. 매니저가 `Running`이
    /// 아니거나 출력에 큐가 없거나 큐가 비어 있으면 `None`을
    /// 반환합니다. 성공적인 플러시는 `is_full`을 해제합니다.
    pub fn flush(&self, output_id: &str, max_batches: usize) -> Option<Vec<DataBatch>> {
        if !self.base.is_running() {
            return None;
        }

        let mut state = self.state.write().expect("buffer lock poisoned");
        let queue = state.queues.get_mut(output_id)?;

        let take = if max_batches == 0 {
            queue.len()
        } else {
            max_batches.min(queue.len())
        };
        if take == 0 {
            return None;
        }

        let result: Vec<DataBatch> = queue.drain(..take).collect();
        let remaining = queue.len();
        let flushed_items: usize = result.iter().map(DataBatch::size).sum();

        let status = state
            .statuses
            .get_mut(output_id)
            .expect("status exists for queue");
        status.queue_size = remaining;
        status.total_items = status.total_items.saturating_sub(flushed_items);
        status.is_full = false;
        status.last_update = Utc::now();

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::BUFFER_QUEUE_SIZE, m::LABEL_OUTPUT => output_id.to_owned())
            .set(remaining as f64);

        Some(result)
    }

    /// 모든 버퍼 상태의 깊은 복사본을 반환합니다.
    pub fn buffer_status(&self) -> HashMap<String, BufferStatus> {
        self.state
            .read()
            .expect("buffer lock poisoned")
            .statuses
            .clone()
    }

    /// 단일 출력의 버퍼 상태를 반환합니다.
    pub fn status_for(&self, output_id: &str) -> Option<BufferStatus> {
        self.state
            .read()
            .expect("buffer lock poisoned")
            .statuses
            .get(output_id)
            .cloned()
    }
}

impl Component for BufferManager {
    fn id(&self) -> &str {
        self.base.id()
    }

    fn name(&self) -> &str {
        self.base.name()
    }

    fn status(&self) -> ComponentStatus {
        self.base.status()
    }

    fn initialize(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            // 설정의 max_size를 초기화 시점에 반영
            if let Some(max) = self
                .base
                .config_value("max_size")
                .and_then(|v| v.as_u64())
            {
                self.set_max_queue_size(usize::try_from(max).unwrap_or(DEFAULT_MAX_QUEUE_SIZE));
            }
            self.base.begin_initialize()
        })
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move { self.base.begin_start() })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            let mut state = self.state.write().expect("buffer lock poisoned");
            state.queues.clear();
            state.statuses.clear();
            drop(state);
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::test_support::log_batch;
    use crate::types::TelemetryType;
    use serde_json::json;

    async fn running_manager(max: usize) -> BufferManager {
        let manager = BufferManager::new(max);
        manager.initialize().await.unwrap();
        manager.start().await.unwrap();
        manager
    }

    #[test]
    fn zero_max_defaults_to_1000() {
        let manager = BufferManager::new(0);
        assert_eq!(manager.max_queue_size(), DEFAULT_MAX_QUEUE_SIZE);
    }

    #[tokio::test]
    async fn buffer_and_flush_fifo() {
        let manager = running_manager(10).await;

        manager.buffer("out", log_batch("a", &["1"]));
        manager.buffer("out", log_batch("b", &["2"]));
        manager.buffer("out", log_batch("c", &["3"]));

        let batches = manager.flush("out", 2).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].source_id, "a");
        assert_eq!(batches[1].source_id, "b");

        let rest = manager.flush("out", 10).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].source_id, "c");
    }

    #[tokio::test]
    async fn empty_batch_is_noop_success() {
        let manager = running_manager(10).await;

        assert!(manager.buffer("out", DataBatch::new(TelemetryType::Log)));
        // 큐 항목이 생성되지 않음
        assert!(manager.status_for("out").is_none());
        assert!(manager.flush("out", 0).is_none());
    }

    #[tokio::test]
    async fn buffer_when_not_running_returns_false() {
        let manager = BufferManager::new(10);
        assert!(!manager.buffer("out", log_batch("a", &["1"])));
    }

    #[tokio::test]
    async fn backpressure_at_capacity() {
        let manager = running_manager(2).await;

        assert!(manager.buffer("out", log_batch("a", &["1"])));
        assert!(manager.buffer("out", log_batch("b", &["2"])));
        // 세 번째는 거부
        assert!(!manager.buffer("out", log_batch("c", &["3"])));

        let status = manager.status_for("out").unwrap();
        assert!(status.is_full);
        assert_eq!(status.queue_size, 2);
        assert_eq!(status.total_items, 2);
    }

    #[tokio::test]
    async fn is_full_true_exactly_at_capacity() {
        let manager = running_manager(2).await;

        manager.buffer("out", log_batch("a", &["1"]));
        assert!(!manager.status_for("out").unwrap().is_full);

        manager.buffer("out", log_batch("b", &["2"]));
        assert!(manager.status_for("out").unwrap().is_full);
    }

    #[tokio::test]
    async fn flush_clears_is_full() {
        let manager = running_manager(1).await;
        manager.buffer("out", log_batch("a", &["1"]));
        assert!(manager.status_for("out").unwrap().is_full);

        manager.flush("out", 1).unwrap();
        let status = manager.status_for("out").unwrap();
        assert!(!status.is_full);
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.total_items, 0);
    }

    #[tokio::test]
    async fn flush_unknown_output_returns_none() {
        let manager = running_manager(10).await;
        assert!(manager.flush("unknown", 5).is_none());
    }

    #[tokio::test]
    async fn flush_zero_takes_all() {
        let manager = running_manager(10).await;
        for i in 0..5 {
            manager.buffer("out", log_batch(&format!("s{i}"), &["x"]));
        }

        let all = manager.flush("out", 0).unwrap();
        assert_eq!(all.len(), 5);
        assert!(manager.flush("out", 0).is_none());
    }

    #[tokio::test]
    async fn flush_when_not_running_returns_none() {
        let manager = running_manager(10).await;
        manager.buffer("out", log_batch("a", &["1"]));
        manager.stop().await.unwrap();

        assert!(manager.flush("out", 1).is_none());
    }

    #[tokio::test]
    async fn total_items_counts_points() {
        let manager = running_manager(10).await;
        manager.buffer("out", log_batch("a", &["1", "2", "3"]));
        manager.buffer("out", log_batch("b", &["4"]));

        let status = manager.status_for("out").unwrap();
        assert_eq!(status.queue_size, 2);
        assert_eq!(status.total_items, 4);

        manager.flush("out", 1).unwrap();
        let status = manager.status_for("out").unwrap();
        assert_eq!(status.total_items, 1);
    }

    #[tokio::test]
    async fn queues_are_per_output() {
        let manager = running_manager(1).await;
        assert!(manager.buffer("out1", log_batch("a", &["1"])));
        // out1이 가득 차도 out2는 영향 없음
        assert!(!manager.buffer("out1", log_batch("b", &["2"])));
        assert!(manager.buffer("out2", log_batch("c", &["3"])));
    }

    #[tokio::test]
    async fn buffer_status_is_a_snapshot() {
        let manager = running_manager(10).await;
        manager.buffer("out", log_batch("a", &["1"]));

        let snapshot = manager.buffer_status();
        manager.buffer("out", log_batch("b", &["2"]));

        // 조회 시점 이후의 변경은 스냅샷에 반영되지 않음
        assert_eq!(snapshot["out"].queue_size, 1);
        assert_eq!(manager.status_for("out").unwrap().queue_size, 2);
    }

    #[tokio::test]
    async fn stop_clears_queues_and_statuses() {
        let manager = running_manager(10).await;
        manager.buffer("out", log_batch("a", &["1"]));

        manager.stop().await.unwrap();
        assert!(manager.buffer_status().is_empty());
        assert_eq!(manager.status(), ComponentStatus::Stopped);
    }

    #[tokio::test]
    async fn record_only_batch_occupies_queue_slot() {
        use crate::types::Record;
        use bytes::Bytes;

        let manager = running_manager(10).await;
        let mut batch = DataBatch::with_source(TelemetryType::Log, "socket");
        batch.push_record(Record::new("socket", Bytes::from_static(b"raw")));

        assert!(manager.buffer("out", batch));
        let status = manager.status_for("out").unwrap();
        assert_eq!(status.queue_size, 1);
        // 레코드는 total_items(포인트 수)에 포함되지 않음
        assert_eq!(status.total_items, 0);
    }

    #[tokio::test]
    async fn configure_max_size_applied_at_initialize() {
        let manager = BufferManager::new(0);
        manager.configure(json!({"max_size": 2})).unwrap();
        manager.initialize().await.unwrap();
        manager.start().await.unwrap();

        assert_eq!(manager.max_queue_size(), 2);
        assert!(manager.buffer("out", log_batch("a", &["1"])));
        assert!(manager.buffer("out", log_batch("b", &["2"])));
        assert!(!manager.buffer("out", log_batch("c", &["3"])));
    }
}
