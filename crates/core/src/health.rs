//! 헬스 모니터 — 컴포넌트 상태 집계와 자유 형식 메트릭
//!
//! 등록된 컴포넌트의 상태를 집계하여 시스템 전체 헬스 리포트를
//! 만듭니다. 집계 규칙:
//!
//! | 조건 | 시스템 상태 |
//! |---|---|
//! | ERROR 컴포넌트 존재 | `Error` |
//! | 모두 STOPPED | `Stopped` |
//! | RUNNING 없음 | `Initialized` |
//! | 일부만 RUNNING | `Initialized` (partially running) |
//! | 모두 RUNNING | `Running` |

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::SignalpostError;

// ─── HealthReport ────────────────────────────────────────────────────

/// 시스템 또는 단일 컴포넌트의 헬스 상태
///
/// `components`로 재귀 합성됩니다.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// 집계된 상태
    pub status: ComponentStatus,
    /// 리포트 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 사람이 읽을 수 있는 상태 메시지
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    /// 메트릭 스냅샷
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
    /// 컴포넌트별 하위 리포트
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, HealthReport>,
}

impl HealthReport {
    fn leaf(status: ComponentStatus, message: String) -> Self {
        Self {
            status,
            timestamp: Utc::now(),
            message,
            details: Map::new(),
            components: BTreeMap::new(),
        }
    }
}

// ─── HealthMonitor ───────────────────────────────────────────────────

struct MonitorState {
    components: BTreeMap<String, Arc<dyn Component>>,
    metrics: Map<String, Value>,
}

/// 헬스 모니터
pub struct HealthMonitor {
    base: ComponentBase,
    state: RwLock<MonitorState>,
}

impl HealthMonitor {
    /// 새 헬스 모니터를 생성합니다.
    pub fn new() -> Self {
        Self {
            base: ComponentBase::new("health_monitor", "Health Monitor"),
            state: RwLock::new(MonitorState {
                components: BTreeMap::new(),
                metrics: Map::new(),
            }),
        }
    }

    /// 모니터링 대상 컴포넌트를 등록합니다.
    pub fn register_component(&self, component: Arc<dyn Component>) {
        let mut state = self.state.write().expect("monitor lock poisoned");
        state
            .components
            .insert(component.id().to_owned(), component);
    }

    /// 자유 형식 메트릭을 기록합니다.
    ///
    /// `value`와 현재 시각이 `metadata` 맵에 찍혀 저장됩니다.
    pub fn add_metric(&self, name: &str, value: Value, metadata: Option<Map<String, Value>>) {
        let mut metadata = metadata.unwrap_or_default();
        metadata.insert("value".to_owned(), value);
        metadata.insert(
            "timestamp".to_owned(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let mut state = self.state.write().expect("monitor lock poisoned");
        state
            .metrics
            .insert(name.to_owned(), Value::Object(metadata));
    }

    /// 메트릭을 조회합니다.
    pub fn metric(&self, name: &str) -> Option<Value> {
        self.state
            .read()
            .expect("monitor lock poisoned")
            .metrics
            .get(name)
            .cloned()
    }

    /// 모든 메트릭의 스냅샷을 반환합니다.
    pub fn all_metrics(&self) -> Map<String, Value> {
        self.state
            .read()
            .expect("monitor lock poisoned")
            .metrics
            .clone()
    }

    /// 시스템 헬스 리포트를 생성합니다.
    pub fn health_report(&self) -> HealthReport {
        let state = self.state.read().expect("monitor lock poisoned");

        let mut components = BTreeMap::new();
        let mut error_count = 0usize;
        let mut stopped_count = 0usize;
        let mut running_count = 0usize;
        let total = state.components.len();

        for (id, component) in &state.components {
            let status = component.status();
            match status {
                ComponentStatus::Error => error_count += 1,
                ComponentStatus::Stopped => stopped_count += 1,
                ComponentStatus::Running => running_count += 1,
                _ => {}
            }
            components.insert(
                id.clone(),
                HealthReport::leaf(
                    status,
                    format!("{} status: {}", component.name(), status),
                ),
            );
        }

        let (status, message) = if error_count > 0 {
            (
                ComponentStatus::Error,
                format!("{error_count} components in ERROR state"),
            )
        } else if total > 0 && stopped_count == total {
            (ComponentStatus::Stopped, "System is stopped".to_owned())
        } else if running_count == 0 {
            (
                ComponentStatus::Initialized,
                "System is initializing".to_owned(),
            )
        } else if running_count < total {
            (
                ComponentStatus::Initialized,
                format!("System is partially running: {running_count} of {total}"),
            )
        } else {
            (ComponentStatus::Running, "System is healthy".to_owned())
        };

        HealthReport {
            status,
            timestamp: Utc::now(),
            message,
            details: state.metrics.clone(),
            components,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for HealthMonitor {
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
            self.state
                .write()
                .expect("monitor lock poisoned")
                .metrics
                .clear();
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}
