//! 이벤트 버스 — 타입별 publish/subscribe
//!
//! 생명주기/데이터 경로 이벤트는 [`EventBus`]를 통해 관찰자
//! (헬스 모니터, 로그 싱크, API)에게 전달됩니다.
//!
//! 전달 의미론은 at-most-once, 동기, best-effort입니다.
//! 콜백은 발행 태스크에서 직접 호출되므로 짧게 유지해야 하며,
//! 이벤트를 잃으면 안 되는 구독자는 스스로 버퍼링해야 합니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::SignalpostError;
use crate::metrics as m;

// ─── EventType ───────────────────────────────────────────────────────

/// 시스템 이벤트 유형 — 닫힌 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// 컴포넌트 상태 변경
    ComponentStatusChange,
    /// 설정 변경
    ConfigChange,
    /// 데이터 수신 (파이프라인 제출 전)
    DataReceived,
    /// 데이터 처리 완료
    DataProcessed,
    /// 데이터 전송 완료
    DataSent,
    /// 에러 발생
    Error,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ComponentStatusChange => write!(f, "COMPONENT_STATUS_CHANGE"),
            Self::ConfigChange => write!(f, "CONFIG_CHANGE"),
            Self::DataReceived => write!(f, "DATA_RECEIVED"),
            Self::DataProcessed => write!(f, "DATA_PROCESSED"),
            Self::DataSent => write!(f, "DATA_SENT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

// ─── Event ───────────────────────────────────────────────────────────

/// 시스템 이벤트
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// 이벤트 유형
    pub event_type: EventType,
    /// 이벤트를 발생시킨 컴포넌트/플러그인 ID
    pub source_id: String,
    /// 이벤트 페이로드
    pub data: Value,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// 현재 시각으로 새 이벤트를 생성합니다.
    pub fn new(event_type: EventType, source_id: impl Into<String>, data: Value) -> Self {
        Self {
            event_type,
            source_id: source_id.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Event[{}] source={}", self.event_type, self.source_id)
    }
}

/// 이벤트 수신 콜백
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

// ─── EventBus ────────────────────────────────────────────────────────

/// 이벤트 버스
///
/// 이벤트 유형별로 `(listener_id → callback)` 매핑을 관리합니다.
/// `publish`는 읽기 락 아래에서 구독자 스냅샷을 뜬 뒤 락을 놓고
/// 콜백을 호출하므로, 콜백 안에서 구독/해제를 해도 안전합니다.
///
/// 단일 publish 내 호출 순서는 listener ID의 사전순으로 결정적입니다.
pub struct EventBus {
    base: ComponentBase,
    subscribers: RwLock<HashMap<EventType, BTreeMap<String, EventCallback>>>,
}

impl EventBus {
    /// 새 이벤트 버스를 생성합니다.
    pub fn new() -> Self {
        Self {
            base: ComponentBase::new("event_bus", "Event Bus"),
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// 이벤트 유형에 콜백을 구독합니다.
    ///
    /// `(event_type, listener_id)` 쌍 기준으로 멱등하며,
    /// 재구독 시 기존 콜백을 교체합니다.
    pub fn subscribe(
        &self,
        event_type: EventType,
        listener_id: impl Into<String>,
        callback: EventCallback,
    ) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        subscribers
            .entry(event_type)
            .or_default()
            .insert(listener_id.into(), callback);
    }

    /// 구독을 해제합니다. 구독이 없으면 아무 일도 하지 않습니다.
    pub fn unsubscribe(&self, event_type: EventType, listener_id: &str) {
        let mut subscribers = self.subscribers.write().expect("subscriber lock poisoned");
        if let Some(listeners) = subscribers.get_mut(&event_type) {
            listeners.remove(listener_id);
        }
    }

    /// 이벤트를 발행합니다.
    ///
    /// 버스가 `Running`이 아니면 no-op입니다. 발행 시점에 존재하는
    /// 구독자 집합에 정확히 한 번씩 전달됩니다.
    pub fn publish(&self, event: Event) {
        if !self.base.is_running() {
            return;
        }

        // 스냅샷을 뜨고 락을 놓은 뒤 콜백을 호출합니다.
        let callbacks: Vec<EventCallback> = {
            let subscribers = self.subscribers.read().expect("subscriber lock poisoned");
            match subscribers.get(&event.event_type) {
                Some(listeners) => listeners.values().cloned().collect(),
                None => return,
            }
        };

        metrics::counter!(
            m::EVENT_BUS_EVENTS_PUBLISHED_TOTAL,
            m::LABEL_EVENT_TYPE => event.event_type.to_string()
        )
        .increment(1);

        for callback in callbacks {
            callback(&event);
        }
    }

    /// 이벤트 유형의 현재 구독자 수를 반환합니다.
    pub fn subscriber_count(&self, event_type: EventType) -> usize {
        self.subscribers
            .read()
            .expect("subscriber lock poisoned")
            .get(&event_type)
            .map_or(0, BTreeMap::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for EventBus {
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
            self.subscribers
                .write()
                .expect("subscriber lock poisoned")
                .clear();
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}
