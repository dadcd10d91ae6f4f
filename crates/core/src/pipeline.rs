//! 데이터 파이프라인 — 텔레메트리 유형별 프로세서 체인
//!
//! [`DataPipeline`]은 텔레메트리 유형마다 독립된 프로세서 체인을
//! 관리합니다. 체인은 레지스트리가 소유한 프로세서를 `Arc`로 빌리는
//! 단방향 연결 리스트([`PipelineStage`])이며, 스테이지 실행은 엄격히
//! 순차적입니다. 서로 다른 유형의 체인은 동시에 실행될 수 있습니다.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::{PipelineError, SignalpostError};
use crate::plugin::ProcessorPlugin;
use crate::registry::PluginRegistry;
use crate::types::{DataBatch, TelemetryType};

// ─── PipelineStage ───────────────────────────────────────────────────

/// 파이프라인의 단일 처리 스테이지
///
/// 프로세서 참조와 다음 스테이지 포인터를 보관합니다.
pub struct PipelineStage {
    processor: Arc<dyn ProcessorPlugin>,
    next: Option<Box<PipelineStage>>,
}

impl PipelineStage {
    /// 스테이지를 통과시켜 배치를 처리합니다.
    ///
    /// 프로세서가 `None` 또는 빈 배치를 반환하면 체인을 중단하고
    /// `None`을 반환합니다. 호출자가 같은 유형의 빈 배치로 변환합니다.
    fn process(&self, batch: DataBatch) -> Option<DataBatch> {
        let processed = self.processor.process(batch)?;
        if processed.is_empty() {
            return None;
        }
        match &self.next {
            Some(next) => next.process(processed),
            None => Some(processed),
        }
    }

    /// 이 스테이지부터 체인 끝까지의 프로세서 ID 목록을 반환합니다.
    fn processor_ids(&self, out: &mut Vec<String>) {
        out.push(self.processor.id().to_owned());
        if let Some(next) = &self.next {
            next.processor_ids(out);
        }
    }
}

// ─── DataPipeline ────────────────────────────────────────────────────

/// 데이터 파이프라인
pub struct DataPipeline {
    base: ComponentBase,
    registry: Arc<PluginRegistry>,
    chains: RwLock<HashMap<TelemetryType, PipelineStage>>,
}

impl DataPipeline {
    /// 레지스트리 참조를 받아 새 파이프라인을 생성합니다.
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self {
            base: ComponentBase::new("data_pipeline", "Data Pipeline"),
            registry,
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// 텔레메트리 유형의 프로세서 체인을 구성합니다.
    ///
    /// 각 ID를 레지스트리에서 해석하며, 누락되었거나 프로세서가 아닌
    /// 플러그인이 있으면 실패합니다. 기존 체인은 교체됩니다.
    /// 빈 ID 목록은 에러입니다.
    pub fn create_pipeline(
        &self,
        telemetry_type: TelemetryType,
        processor_ids: &[String],
    ) -> Result<(), SignalpostError> {
        if processor_ids.is_empty() {
            return Err(PipelineError::EmptyProcessorList.into());
        }

        // 역순으로 체인을 조립 (마지막 스테이지부터)
        let mut chain: Option<Box<PipelineStage>> = None;
        for id in processor_ids.iter().rev() {
            let handle = self
                .registry
                .get(id)
                .ok_or_else(|| PipelineError::ProcessorNotFound { id: id.clone() })?;
            let processor = handle
                .processor()
                .ok_or_else(|| PipelineError::NotAProcessor { id: id.clone() })?;
            chain = Some(Box::new(PipelineStage {
                processor,
                next: chain,
            }));
        }

        let head = *chain.expect("non-empty processor list");
        self.chains
            .write()
            .expect("chain lock poisoned")
            .insert(telemetry_type, head);

        tracing::info!(
            telemetry_type = %telemetry_type,
            processors = processor_ids.len(),
            "pipeline installed"
        );
        Ok(())
    }

    /// 배치를 해당 유형의 체인으로 처리합니다.
    ///
    /// - 파이프라인이 `Running`이 아니면 `None`
    /// - 빈 배치는 `None`
    /// - 체인이 없으면 배치를 그대로 반환 (패스스루)
    /// - 어떤 스테이지가 드롭하면 같은 유형의 빈 배치 반환
    pub fn process(&self, batch: DataBatch) -> Option<DataBatch> {
        if batch.is_empty() {
            return None;
        }
        if !self.base.is_running() {
            return None;
        }

        let batch_type = batch.batch_type;
        let chains = self.chains.read().expect("chain lock poisoned");
        match chains.get(&batch_type) {
            None => Some(batch),
            Some(chain) => chain
                .process(batch)
                .or_else(|| Some(DataBatch::new(batch_type))),
        }
    }

    /// 유형에 체인이 설치되어 있는지 확인합니다.
    pub fn has_pipeline(&self, telemetry_type: TelemetryType) -> bool {
        self.chains
            .read()
            .expect("chain lock poisoned")
            .contains_key(&telemetry_type)
    }

    /// 유형의 체인을 제거합니다. 존재했으면 `true`를 반환합니다.
    pub fn remove_pipeline(&self, telemetry_type: TelemetryType) -> bool {
        self.chains
            .write()
            .expect("chain lock poisoned")
            .remove(&telemetry_type)
            .is_some()
    }

    /// 설치된 체인의 `유형 → 프로세서 ID 목록` 스냅샷을 반환합니다.
    pub fn pipelines(&self) -> HashMap<TelemetryType, Vec<String>> {
        let chains = self.chains.read().expect("chain lock poisoned");
        chains
            .iter()
            .map(|(t, chain)| {
                let mut ids = Vec::new();
                chain.processor_ids(&mut ids);
                (*t, ids)
            })
            .collect()
    }
}

impl Component for DataPipeline {
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
        Box::pin(async move { self.base.begin_initialize() })
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move { self.base.begin_start() })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            self.chains.write().expect("chain lock poisoned").clear();
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}
