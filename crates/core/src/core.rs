//! Core 컨트롤러 — 컴포넌트 조립, 생명주기 오케스트레이션, 데이터 흐름 워커
//!
//! [`Core`]는 모든 코어 컴포넌트를 생성 순서대로 소유하고, 역순으로
//! 해체합니다. `start()`는 입력 플러그인마다 수집 워커와 팬아웃
//! 워커를, 출력 플러그인마다 플러시 워커를 스폰합니다.
//!
//! # 데이터 흐름
//! ```text
//! input.collect() → Core.process_batch() → mpsc(100) → BufferManager.buffer()
//!                                                            │
//! output.send() ← BufferManager.flush(10) ← 출력 워커 tick ──┘
//! ```
//!
//! 모든 워커는 tick, 입력 채널, 취소 신호 중 하나에서 대기하며
//! 취소가 항상 우선합니다. 단일 입력의 배치는 파이프라인과 단일
//! 출력 큐를 통과하는 동안 제출 순서를 유지합니다 (출력별 FIFO).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::buffer::BufferManager;
use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::config::ConfigStore;
use crate::error::{ComponentError, PluginError, SignalpostError};
use crate::event::{Event, EventBus, EventType};
use crate::health::{HealthMonitor, HealthReport};
use crate::metrics as m;
use crate::pipeline::DataPipeline;
use crate::plugin::{CoreApi, InputPlugin, OutputPlugin, Plugin, PluginHandle};
use crate::registry::PluginRegistry;
use crate::types::{DataBatch, TelemetryType};

/// 입력별 배치 채널 용량
const INPUT_CHANNEL_CAPACITY: usize = 100;

/// 출력 워커가 tick마다 플러시하는 최대 배치 수
const FLUSH_MAX_BATCHES: usize = 10;

/// 수집/플러시 tick 기본 주기 (초)
const DEFAULT_TICK_SECS: u64 = 1;

/// Core 컨트롤러
pub struct Core {
    base: ComponentBase,
    event_bus: Arc<EventBus>,
    registry: Arc<PluginRegistry>,
    config: Arc<ConfigStore>,
    health: Arc<HealthMonitor>,
    buffers: Arc<BufferManager>,
    pipeline: Arc<DataPipeline>,
    /// 텔레메트리 유형 → 출력 ID 라우팅 테이블.
    /// 항목이 없는 유형은 모든 출력으로 라우팅됩니다.
    routes: RwLock<HashMap<TelemetryType, Vec<String>>>,
    cancel: RwLock<CancellationToken>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    weak_self: Weak<Core>,
}

impl Core {
    /// 코어와 모든 컴포넌트를 의존성 순서대로 생성합니다.
    ///
    /// 생성 순서: 이벤트 버스 → 레지스트리 → 설정 저장소 →
    /// 헬스 모니터 → 버퍼 매니저 → 파이프라인 (레지스트리 참조 보유).
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let registry = Arc::new(PluginRegistry::new());
            Self {
                base: ComponentBase::new("core", "Core System"),
                event_bus: Arc::new(EventBus::new()),
                registry: Arc::clone(&registry),
                config: Arc::new(ConfigStore::new()),
                health: Arc::new(HealthMonitor::new()),
                buffers: Arc::new(BufferManager::new(0)),
                pipeline: Arc::new(DataPipeline::new(registry)),
                routes: RwLock::new(HashMap::new()),
                cancel: RwLock::new(CancellationToken::new()),
                workers: Mutex::new(Vec::new()),
                weak_self: weak.clone(),
            }
        })
    }

    // ─── 컴포넌트 접근자 ─────────────────────────────────────────────

    /// 이벤트 버스를 반환합니다.
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// 플러그인 레지스트리를 반환합니다.
    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    /// 설정 저장소를 반환합니다.
    pub fn config_store(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// 헬스 모니터를 반환합니다.
    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// 버퍼 매니저를 반환합니다.
    pub fn buffer_manager(&self) -> &Arc<BufferManager> {
        &self.buffers
    }

    /// 데이터 파이프라인을 반환합니다.
    pub fn pipeline(&self) -> &Arc<DataPipeline> {
        &self.pipeline
    }

    /// ID로 컴포넌트를 조회합니다.
    ///
    /// 데이터 경로는 직접 참조를 사용하며, 이 조회는 외부 API의
    /// 리플렉션 용도로만 존재합니다.
    pub fn component(&self, id: &str) -> Option<Arc<dyn Component>> {
        match id {
            "core" => self
                .weak_self
                .upgrade()
                .map(|core| core as Arc<dyn Component>),
            "event_bus" => Some(Arc::clone(&self.event_bus) as Arc<dyn Component>),
            "plugin_registry" => Some(Arc::clone(&self.registry) as Arc<dyn Component>),
            "config_store" => Some(Arc::clone(&self.config) as Arc<dyn Component>),
            "health_monitor" => Some(Arc::clone(&self.health) as Arc<dyn Component>),
            "buffer_manager" => Some(Arc::clone(&self.buffers) as Arc<dyn Component>),
            "data_pipeline" => Some(Arc::clone(&self.pipeline) as Arc<dyn Component>),
            _ => self.registry.get(id).map(|h| h.as_component()),
        }
    }

    // ─── 플러그인 등록 ───────────────────────────────────────────────

    /// 플러그인을 코어에 등록합니다.
    ///
    /// 검증 → 코어 연결 → 레지스트리 삽입 → 헬스 모니터 등록 순서로
    /// 진행합니다. 거부된 플러그인은 어느 단계에서도 관찰되지 않도록
    /// 검증과 코어 연결이 레지스트리 삽입보다 먼저 수행됩니다.
    pub fn register_plugin(&self, handle: PluginHandle) -> Result<(), SignalpostError> {
        let id = handle.id().to_owned();

        if !handle.as_plugin().validate() {
            return Err(PluginError::ValidationFailed { id }.into());
        }

        let core_api = self
            .weak_self
            .upgrade()
            .map(|core| core as Arc<dyn CoreApi>)
            .ok_or_else(|| PluginError::RegistrationFailed { id: id.clone() })?;
        if !handle.as_plugin().register_with_core(core_api) {
            return Err(PluginError::RegistrationFailed { id }.into());
        }

        self.registry.register(handle.clone())?;
        self.health.register_component(handle.as_component());

        tracing::info!(plugin = %id, plugin_type = %handle.plugin_type(), "plugin registered");
        Ok(())
    }

    // ─── 라우팅 ──────────────────────────────────────────────────────

    /// 텔레메트리 유형의 출력 라우팅을 설정합니다.
    pub fn set_route(&self, telemetry_type: TelemetryType, output_ids: Vec<String>) {
        self.routes
            .write()
            .expect("route lock poisoned")
            .insert(telemetry_type, output_ids);
    }

    /// 현재 라우팅 테이블의 스냅샷을 반환합니다.
    pub fn routes(&self) -> HashMap<TelemetryType, Vec<String>> {
        self.routes.read().expect("route lock poisoned").clone()
    }

    /// 배치 유형을 수신할 출력 플러그인들을 반환합니다.
    ///
    /// 라우팅 항목이 없는 유형은 모든 출력으로 갑니다.
    pub fn outputs_for(&self, telemetry_type: TelemetryType) -> Vec<Arc<dyn OutputPlugin>> {
        let routes = self.routes.read().expect("route lock poisoned");
        match routes.get(&telemetry_type) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.registry.get(id).and_then(|h| h.output()))
                .collect(),
            None => self.registry.outputs(),
        }
    }

    // ─── 데이터 경로 ─────────────────────────────────────────────────

    /// 배치를 파이프라인으로 처리합니다 — 표준 제출 진입점.
    ///
    /// `DATA_RECEIVED`를 발행하고 파이프라인에 위임한 뒤, 비어 있지
    /// 않은 결과에 대해 `DATA_PROCESSED`를 발행합니다. 파이프라인
    /// 출력을 그대로 반환합니다.
    pub fn process_batch(&self, batch: DataBatch) -> Option<DataBatch> {
        if batch.is_empty() {
            return Some(batch);
        }

        metrics::counter!(m::CORE_BATCHES_RECEIVED_TOTAL).increment(1);
        self.publish_event(
            EventType::DataReceived,
            self.base.id(),
            json!({
                "batch_type": batch.batch_type.to_string(),
                "batch_size": batch.size(),
            }),
        );

        let processed = self.pipeline.process(batch);

        match &processed {
            Some(b) if !b.is_empty() => {
                metrics::counter!(m::CORE_BATCHES_PROCESSED_TOTAL).increment(1);
                self.publish_event(
                    EventType::DataProcessed,
                    self.base.id(),
                    json!({
                        "batch_type": b.batch_type.to_string(),
                        "batch_size": b.size(),
                    }),
                );
            }
            _ => {
                metrics::counter!(m::CORE_BATCHES_DROPPED_TOTAL).increment(1);
            }
        }

        processed
    }

    /// 이벤트를 생성하여 버스에 발행합니다. 현재 시각이 찍힙니다.
    pub fn publish_event(&self, event_type: EventType, source_id: &str, data: Value) {
        self.event_bus
            .publish(Event::new(event_type, source_id, data));
    }

    /// 시스템 헬스 리포트를 반환합니다.
    pub fn health_report(&self) -> HealthReport {
        self.health.health_report()
    }

    // ─── 원샷 실행 ───────────────────────────────────────────────────

    /// 워커 없이 수집 → 처리 → 버퍼링 → 플러시 → 전송을 한 번
    /// 수행하고 정지합니다. `--one-shot` 모드용입니다.
    ///
    /// `initialize()`가 선행되어야 합니다.
    pub async fn run_once(&self) -> Result<(), SignalpostError> {
        self.guard_start()?;
        self.apply_buffer_settings();
        self.start_components().await?;
        self.base.set_status(ComponentStatus::Running);

        let inputs = self.registry.inputs();
        let outputs = self.registry.outputs();
        for processor in self.registry.processors() {
            self.start_plugin(processor.as_ref()).await;
        }
        for input in &inputs {
            self.start_plugin(input.as_ref()).await;
        }
        for output in &outputs {
            self.start_plugin(output.as_ref()).await;
        }

        for input in &inputs {
            if input.status() != ComponentStatus::Running {
                continue;
            }
            let batches = input.collect().await;
            for batch in batches {
                if batch.is_empty() {
                    continue;
                }
                let Some(processed) = self.process_batch(batch) else {
                    continue;
                };
                if processed.is_empty() {
                    continue;
                }
                self.fan_out(input.id(), processed);
            }
        }

        for output in &outputs {
            if output.status() != ComponentStatus::Running {
                continue;
            }
            let Some(batches) = self.buffers.flush(output.id(), 0) else {
                continue;
            };
            for batch in batches {
                self.deliver(output.as_ref(), &batch).await;
            }
        }

        self.stop_impl().await
    }

    // ─── 내부 헬퍼 ───────────────────────────────────────────────────

    fn guard_start(&self) -> Result<(), SignalpostError> {
        match self.base.status() {
            ComponentStatus::Initialized | ComponentStatus::Stopped => Ok(()),
            from => {
                self.base.fail();
                Err(ComponentError::InvalidTransition {
                    component: self.base.id().to_owned(),
                    from: from.to_string(),
                    operation: "start".to_owned(),
                }
                .into())
            }
        }
    }

    fn components_in_order(&self) -> Vec<Arc<dyn Component>> {
        vec![
            Arc::clone(&self.event_bus) as Arc<dyn Component>,
            Arc::clone(&self.registry) as Arc<dyn Component>,
            Arc::clone(&self.config) as Arc<dyn Component>,
            Arc::clone(&self.health) as Arc<dyn Component>,
            Arc::clone(&self.buffers) as Arc<dyn Component>,
            Arc::clone(&self.pipeline) as Arc<dyn Component>,
        ]
    }

    async fn start_components(&self) -> Result<(), SignalpostError> {
        for component in self.components_in_order() {
            component.start().await?;
        }
        Ok(())
    }

    /// 설정의 `buffer.max_size`를 버퍼 매니저에 반영합니다.
    fn apply_buffer_settings(&self) {
        if let Some(max) = self
            .config
            .get("buffer.max_size", Value::Null)
            .as_u64()
        {
            self.buffers
                .set_max_queue_size(usize::try_from(max).unwrap_or(0));
        }
    }

    fn tick_interval(&self, key: &str) -> Duration {
        let secs = self
            .config
            .get(key, Value::Null)
            .as_u64()
            .unwrap_or(DEFAULT_TICK_SECS)
            .max(1);
        Duration::from_secs(secs)
    }

    /// 플러그인을 초기화하고 시작합니다.
    ///
    /// 실패한 플러그인은 `ERROR` 이벤트로 보고되고 건너뜁니다 —
    /// 다른 플러그인은 계속 진행됩니다.
    async fn start_plugin(&self, plugin: &dyn Plugin) {
        if plugin.status() == ComponentStatus::Uninitialized {
            if let Err(e) = plugin.initialize().await {
                tracing::warn!(plugin = plugin.id(), error = %e, "plugin initialization failed");
                self.publish_event(
                    EventType::Error,
                    plugin.id(),
                    json!({"error": e.to_string(), "operation": "initialize"}),
                );
                return;
            }
        }
        if plugin.status() == ComponentStatus::Running {
            return;
        }
        if let Err(e) = plugin.start().await {
            tracing::warn!(plugin = plugin.id(), error = %e, "plugin start failed");
            self.publish_event(
                EventType::Error,
                plugin.id(),
                json!({"error": e.to_string(), "operation": "start"}),
            );
        }
    }

    /// 배치를 구독 출력들의 버퍼에 넣습니다. 가득 찬 버퍼는
    /// `ERROR` 이벤트를 발행하고 해당 출력에 대해 배치를 드롭합니다.
    fn fan_out(&self, input_id: &str, batch: DataBatch) {
        let outputs = self.outputs_for(batch.batch_type);
        for output in outputs {
            let output_id = output.id().to_owned();
            if !self.buffers.buffer(&output_id, batch.clone()) {
                self.publish_event(
                    EventType::Error,
                    input_id,
                    json!({
                        "error": "buffer full",
                        "output_id": output_id,
                        "batch_type": batch.batch_type.to_string(),
                    }),
                );
            }
        }
    }

    /// 배치를 출력으로 전송하고 결과 이벤트를 발행합니다.
    async fn deliver(&self, output: &dyn OutputPlugin, batch: &DataBatch) {
        let output_id = output.id().to_owned();
        if output.send(batch).await {
            metrics::counter!(m::OUTPUT_BATCHES_SENT_TOTAL, m::LABEL_OUTPUT => output_id.clone())
                .increment(1);
            self.publish_event(
                EventType::DataSent,
                &output_id,
                json!({
                    "batch_type": batch.batch_type.to_string(),
                    "batch_size": batch.size(),
                }),
            );
        } else {
            metrics::counter!(m::OUTPUT_SEND_FAILURES_TOTAL, m::LABEL_OUTPUT => output_id.clone())
                .increment(1);
            self.publish_event(
                EventType::Error,
                &output_id,
                json!({
                    "error": "send failed",
                    "batch_type": batch.batch_type.to_string(),
                }),
            );
        }
    }

    async fn initialize_impl(&self) -> Result<(), SignalpostError> {
        for component in self.components_in_order() {
            component.initialize().await?;
        }

        if let Some(core) = self.weak_self.upgrade() {
            self.health
                .register_component(core as Arc<dyn Component>);
        }
        for component in self.components_in_order() {
            self.health.register_component(component);
        }

        self.base.begin_initialize()?;
        tracing::info!("core initialized");
        Ok(())
    }

    async fn start_impl(&self) -> Result<(), SignalpostError> {
        self.guard_start()?;

        let token = CancellationToken::new();
        *self.cancel.write().expect("cancel lock poisoned") = token.clone();

        self.apply_buffer_settings();
        self.start_components().await?;

        let collect_interval = self.tick_interval("buffer.collect_interval");
        let flush_interval = self.tick_interval("buffer.flush_interval");

        let core = self
            .weak_self
            .upgrade()
            .expect("core alive during start");

        let mut handles = Vec::new();

        // 프로세서는 워커를 갖지 않지만 파이프라인에서 호출되므로
        // 먼저 기동합니다.
        for processor in self.registry.processors() {
            self.start_plugin(processor.as_ref()).await;
        }

        for input in self.registry.inputs() {
            self.start_plugin(input.as_ref()).await;
            if input.status() != ComponentStatus::Running {
                continue;
            }

            let (tx, rx) = mpsc::channel::<DataBatch>(INPUT_CHANNEL_CAPACITY);
            handles.push(spawn_collect_worker(
                Arc::clone(&core),
                Arc::clone(&input),
                tx,
                collect_interval,
                token.clone(),
            ));
            handles.push(spawn_fanout_worker(
                Arc::clone(&core),
                input.id().to_owned(),
                rx,
                token.clone(),
            ));
        }

        for output in self.registry.outputs() {
            self.start_plugin(output.as_ref()).await;
            if output.status() != ComponentStatus::Running {
                continue;
            }
            handles.push(spawn_output_worker(
                Arc::clone(&core),
                Arc::clone(&output),
                flush_interval,
                token.clone(),
            ));
        }

        self.workers
            .lock()
            .expect("worker lock poisoned")
            .extend(handles);

        self.base.set_status(ComponentStatus::Running);
        self.publish_event(
            EventType::ComponentStatusChange,
            self.base.id(),
            json!({"status": ComponentStatus::Running.to_string()}),
        );
        tracing::info!("core started");
        Ok(())
    }

    async fn stop_impl(&self) -> Result<(), SignalpostError> {
        if self.base.status() == ComponentStatus::Stopped {
            return Ok(());
        }

        // 모든 워커에 단일 취소 신호
        self.cancel.read().expect("cancel lock poisoned").cancel();

        let handles: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .expect("worker lock poisoned")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }

        // 생성 역순으로 정지
        for component in self.components_in_order().into_iter().rev() {
            if let Err(e) = component.stop().await {
                tracing::warn!(component = component.id(), error = %e, "component stop failed");
            }
        }

        self.base.begin_stop();
        tracing::info!("core stopped");
        Ok(())
    }
}

impl Component for Core {
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
        Box::pin(self.initialize_impl())
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(self.start_impl())
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(self.stop_impl())
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

impl CoreApi for Core {
    fn process_batch(&self, batch: DataBatch) -> Option<DataBatch> {
        Core::process_batch(self, batch)
    }

    fn publish_event(&self, event_type: EventType, source_id: &str, data: Value) {
        Core::publish_event(self, event_type, source_id, data);
    }
}

// ─── 워커 ────────────────────────────────────────────────────────────

/// 입력 수집 워커: tick마다 `collect()`를 호출하고, 처리된 배치를
/// 입력별 채널로 전달합니다.
fn spawn_collect_worker(
    core: Arc<Core>,
    input: Arc<dyn InputPlugin>,
    tx: mpsc::Sender<DataBatch>,
    tick: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        'run: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = input.stop().await {
                        tracing::warn!(input = input.id(), error = %e, "input stop failed");
                    }
                    break 'run;
                }
                _ = interval.tick() => {
                    let batches = input.collect().await;
                    if !batches.is_empty() {
                        metrics::counter!(
                            m::INPUT_BATCHES_COLLECTED_TOTAL,
                            m::LABEL_INPUT => input.id().to_owned()
                        )
                        .increment(batches.len() as u64);
                    }
                    for batch in batches {
                        if batch.is_empty() {
                            continue;
                        }
                        let Some(processed) = core.process_batch(batch) else {
                            continue;
                        };
                        if processed.is_empty() {
                            continue;
                        }
                        tokio::select! {
                            _ = cancel.cancelled() => break 'run,
                            sent = tx.send(processed) => {
                                if sent.is_err() {
                                    break 'run;
                                }
                            }
                        }
                    }
                }
            }
        }
        tracing::debug!(input = input.id(), "collect worker exiting");
    })
}

/// 입력 팬아웃 워커: 입력 채널의 배치를 구독 출력들의 버퍼로
/// 분배합니다.
fn spawn_fanout_worker(
    core: Arc<Core>,
    input_id: String,
    mut rx: mpsc::Receiver<DataBatch>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Some(batch) => core.fan_out(&input_id, batch),
                    None => break,
                },
            }
        }
        tracing::debug!(input = %input_id, "fanout worker exiting");
    })
}

/// 출력 워커: tick마다 버퍼를 플러시하고 배치를 전송합니다.
/// 실패한 배치는 재큐잉되지 않습니다 (at-most-once).
fn spawn_output_worker(
    core: Arc<Core>,
    output: Arc<dyn OutputPlugin>,
    tick: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    if let Err(e) = output.stop().await {
                        tracing::warn!(output = output.id(), error = %e, "output stop failed");
                    }
                    break;
                }
                _ = interval.tick() => {
                    let Some(batches) = core.buffer_manager().flush(output.id(), FLUSH_MAX_BATCHES)
                    else {
                        continue;
                    };
                    for batch in batches {
                        core.deliver(output.as_ref(), &batch).await;
                    }
                }
            }
        }
        tracing::debug!(output = output.id(), "output worker exiting");
    })
}
