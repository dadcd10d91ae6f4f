//! 플러그인 계약 — 유형별 capability trait과 타입 핸들
//!
//! 모든 플러그인은 [`Component`] 생명주기에 더해 [`Plugin`] 메타데이터를
//! 구현하고, 유형별 capability trait 하나를 구현합니다:
//!
//! - [`InputPlugin`]: `collect()` — 호출 시점에 수집 가능한 배치 반환
//! - [`ProcessorPlugin`]: `process()` — 새 배치 반환 (입력 불변)
//! - [`OutputPlugin`]: `send()` — 동기적 배치 전송
//!
//! trait들은 [`BoxFuture`]를 반환하여 dyn-compatible하며,
//! [`PluginHandle`]로 레지스트리에 저장됩니다.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::{BoxFuture, Component};
use crate::event::EventType;
use crate::types::DataBatch;

// ─── PluginType ──────────────────────────────────────────────────────

/// 플러그인 유형 — 닫힌 집합
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PluginType {
    /// 데이터를 수집하는 플러그인
    Input,
    /// 데이터를 변환하는 플러그인
    Processor,
    /// 데이터를 내보내는 플러그인
    Output,
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "INPUT"),
            Self::Processor => write!(f, "PROCESSOR"),
            Self::Output => write!(f, "OUTPUT"),
        }
    }
}

// ─── CoreApi ─────────────────────────────────────────────────────────

/// 플러그인에게 노출되는 코어 기능
///
/// 플러그인은 `register_with_core`로 이 핸들을 받아 배치 제출과
/// 이벤트 발행에 사용합니다.
pub trait CoreApi: Send + Sync {
    /// 배치를 파이프라인으로 처리합니다.
    fn process_batch(&self, batch: DataBatch) -> Option<DataBatch>;

    /// 이벤트 버스에 이벤트를 발행합니다.
    fn publish_event(&self, event_type: EventType, source_id: &str, data: Value);
}

// ─── Plugin Traits ───────────────────────────────────────────────────

/// 모든 플러그인의 공통 인터페이스
///
/// [`Component`] 생명주기에 플러그인 메타데이터를 추가합니다.
pub trait Plugin: Component {
    /// 플러그인 유형을 반환합니다.
    fn plugin_type(&self) -> PluginType;

    /// 설정이 올바른지 검증합니다.
    ///
    /// 코어는 등록 전에 호출하며, `false`면 등록이 거부됩니다.
    fn validate(&self) -> bool;

    /// 코어 핸들을 연결합니다. 실패 시 `false`를 반환합니다.
    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool;
}

/// 입력 플러그인 — 소스에서 데이터를 수집합니다.
pub trait InputPlugin: Plugin {
    /// 호출 시점에 수집 가능한 배치를 반환합니다.
    ///
    /// 비차단이어야 합니다: 수집할 것이 없으면 빈 Vec을 반환합니다.
    fn collect(&self) -> BoxFuture<'_, Vec<DataBatch>>;
}

/// 프로세서 플러그인 — 배치를 변환합니다.
pub trait ProcessorPlugin: Plugin {
    /// 배치를 변환하여 새 배치를 반환합니다.
    ///
    /// 입력 배치를 수정하지 않습니다. 빈 배치 반환은 드롭을,
    /// `None` 반환은 파이프라인 종료를 의미합니다.
    fn process(&self, batch: DataBatch) -> Option<DataBatch>;
}

/// 출력 플러그인 — 배치를 목적지로 내보냅니다.
pub trait OutputPlugin: Plugin {
    /// 배치를 전송합니다. 실패 시 `false`를 반환합니다.
    fn send<'a>(&'a self, batch: &'a DataBatch) -> BoxFuture<'a, bool>;
}

// ─── PluginHandle ────────────────────────────────────────────────────

/// 레지스트리에 저장되는 타입 플러그인 핸들
///
/// 유형별 trait 객체를 감싸 타입 디스패치를 제공합니다.
/// 등록 이후 플러그인 참조는 레지스트리가 소유하며,
/// 핸들 복제는 `Arc` 복제입니다.
#[derive(Clone)]
pub enum PluginHandle {
    /// 입력 플러그인
    Input(Arc<dyn InputPlugin>),
    /// 프로세서 플러그인
    Processor(Arc<dyn ProcessorPlugin>),
    /// 출력 플러그인
    Output(Arc<dyn OutputPlugin>),
}

impl PluginHandle {
    /// 공통 [`Plugin`] 인터페이스로 접근합니다.
    pub fn as_plugin(&self) -> &dyn Plugin {
        match self {
            Self::Input(p) => p.as_ref(),
            Self::Processor(p) => p.as_ref(),
            Self::Output(p) => p.as_ref(),
        }
    }

    /// [`Component`]로 업캐스트한 공유 참조를 반환합니다.
    ///
    /// 헬스 모니터 등록에 사용합니다.
    pub fn as_component(&self) -> Arc<dyn Component> {
        match self {
            Self::Input(p) => Arc::clone(p) as Arc<dyn Component>,
            Self::Processor(p) => Arc::clone(p) as Arc<dyn Component>,
            Self::Output(p) => Arc::clone(p) as Arc<dyn Component>,
        }
    }

    /// 플러그인 ID를 반환합니다.
    pub fn id(&self) -> &str {
        self.as_plugin().id()
    }

    /// 플러그인 유형을 반환합니다.
    pub fn plugin_type(&self) -> PluginType {
        self.as_plugin().plugin_type()
    }

    /// 입력 플러그인이면 해당 trait 객체를 반환합니다.
    pub fn input(&self) -> Option<Arc<dyn InputPlugin>> {
        match self {
            Self::Input(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    /// 프로세서 플러그인이면 해당 trait 객체를 반환합니다.
    pub fn processor(&self) -> Option<Arc<dyn ProcessorPlugin>> {
        match self {
            Self::Processor(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }

    /// 출력 플러그인이면 해당 trait 객체를 반환합니다.
    pub fn output(&self) -> Option<Arc<dyn OutputPlugin>> {
        match self {
            Self::Output(p) => Some(Arc::clone(p)),
            _ => None,
        }
    }
}

impl fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PluginHandle({} {})",
            self.plugin_type(),
            self.as_plugin().id(),
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! 코어 내부 테스트에서 공유하는 mock 플러그인
    use super::*;
    use crate::component::{ComponentBase, ComponentStatus};
    use crate::error::SignalpostError;
    use crate::types::TelemetryType;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// 테스트용 플러그인 — 세 capability trait 중 하나로 노출
    pub struct MockPlugin {
        pub base: ComponentBase,
        pub plugin_type: PluginType,
        pub valid: AtomicBool,
        /// collect()가 반환할 배치 큐
        pub pending: Mutex<Vec<DataBatch>>,
        /// process()가 호출된 횟수
        pub processed: AtomicUsize,
        /// send()가 받은 배치 수
        pub sent: AtomicUsize,
        /// send()가 실패를 반환할지 여부
        pub fail_send: AtomicBool,
        /// process()가 배치에 덧붙일 속성 키
        pub stamp: Option<String>,
    }

    impl MockPlugin {
        pub fn new(id: &str, plugin_type: PluginType) -> Self {
            Self {
                base: ComponentBase::new(id, format!("Mock {id}")),
                plugin_type,
                valid: AtomicBool::new(true),
                pending: Mutex::new(Vec::new()),
                processed: AtomicUsize::new(0),
                sent: AtomicUsize::new(0),
                fail_send: AtomicBool::new(false),
                stamp: None,
            }
        }

        pub fn invalid(self) -> Self {
            self.valid.store(false, Ordering::SeqCst);
            self
        }

        pub fn with_stamp(mut self, key: &str) -> Self {
            self.stamp = Some(key.to_owned());
            self
        }

        pub fn queue_batch(&self, batch: DataBatch) {
            self.pending.lock().unwrap().push(batch);
        }
    }

    impl Component for MockPlugin {
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
                self.base.begin_stop();
                Ok(())
            })
        }
        fn configure(&self, config: Value) -> Result<(), SignalpostError> {
            self.base.configure(config)
        }
    }

    impl Plugin for MockPlugin {
        fn plugin_type(&self) -> PluginType {
            self.plugin_type
        }
        fn validate(&self) -> bool {
            self.valid.load(Ordering::SeqCst)
        }
        fn register_with_core(&self, _core: Arc<dyn CoreApi>) -> bool {
            true
        }
    }

    impl InputPlugin for MockPlugin {
        fn collect(&self) -> BoxFuture<'_, Vec<DataBatch>> {
            Box::pin(async move { self.pending.lock().unwrap().drain(..).collect() })
        }
    }

    impl ProcessorPlugin for MockPlugin {
        fn process(&self, batch: DataBatch) -> Option<DataBatch> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            let mut out = batch;
            if let Some(key) = &self.stamp {
                for point in &mut out.points {
                    if let crate::types::DataPoint::Log(p) = point {
                        p.attributes
                            .insert(key.clone(), serde_json::Value::Bool(true));
                    }
                }
            }
            Some(out)
        }
    }

    impl OutputPlugin for MockPlugin {
        fn send(&self, batch: &DataBatch) -> BoxFuture<'_, bool> {
            let size = batch.size();
            Box::pin(async move {
                if self.fail_send.load(Ordering::SeqCst) {
                    return false;
                }
                self.sent.fetch_add(size.max(1), Ordering::SeqCst);
                true
            })
        }
    }

    /// LOG 배치 하나를 생성하는 헬퍼
    pub fn log_batch(source: &str, messages: &[&str]) -> DataBatch {
        use crate::types::{DataPoint, LogPoint};
        use std::collections::BTreeMap;

        let mut batch = DataBatch::with_source(TelemetryType::Log, source);
        for msg in messages {
            batch.push_point(DataPoint::Log(LogPoint {
                timestamp: chrono::Utc::now(),
                origin: source.to_owned(),
                labels: BTreeMap::new(),
                message: (*msg).to_owned(),
                level: "INFO".to_owned(),
                attributes: serde_json::Map::new(),
            }));
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MockPlugin;
    use super::*;

    #[test]
    fn plugin_type_display() {
        assert_eq!(PluginType::Input.to_string(), "INPUT");
        assert_eq!(PluginType::Processor.to_string(), "PROCESSOR");
        assert_eq!(PluginType::Output.to_string(), "OUTPUT");
    }

    #[test]
    fn plugin_type_serialize_roundtrip() {
        let json = serde_json::to_string(&PluginType::Input).unwrap();
        assert_eq!(json, "\"INPUT\"");
        let back: PluginType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PluginType::Input);
    }

    #[test]
    fn handle_exposes_id_and_type() {
        let handle =
            PluginHandle::Input(Arc::new(MockPlugin::new("file_input", PluginType::Input)));
        assert_eq!(handle.id(), "file_input");
        assert_eq!(handle.plugin_type(), PluginType::Input);
    }

    #[test]
    fn handle_typed_accessors() {
        let input = PluginHandle::Input(Arc::new(MockPlugin::new("in", PluginType::Input)));
        assert!(input.input().is_some());
        assert!(input.processor().is_none());
        assert!(input.output().is_none());

        let output = PluginHandle::Output(Arc::new(MockPlugin::new("out", PluginType::Output)));
        assert!(output.output().is_some());
        assert!(output.input().is_none());
    }

    #[tokio::test]
    async fn handle_as_component_shares_state() {
        let plugin = Arc::new(MockPlugin::new("p", PluginType::Processor));
        let handle = PluginHandle::Processor(plugin);

        let component = handle.as_component();
        component.initialize().await.unwrap();

        // 핸들과 컴포넌트 뷰가 같은 인스턴스를 가리킴
        use crate::component::ComponentStatus;
        assert_eq!(handle.as_plugin().status(), ComponentStatus::Initialized);
    }

    #[test]
    fn handle_debug_format() {
        let handle =
            PluginHandle::Output(Arc::new(MockPlugin::new("stdout", PluginType::Output)));
        let debug = format!("{handle:?}");
        assert!(debug.contains("OUTPUT"));
        assert!(debug.contains("stdout"));
    }
}
