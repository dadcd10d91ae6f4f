//! 컴포넌트 계약 — 모든 활성 요소의 공통 생명주기
//!
//! [`Component`] trait은 코어 컴포넌트(이벤트 버스, 레지스트리 등)와
//! 모든 플러그인이 구현하는 생명주기 인터페이스입니다.
//! [`ComponentBase`]는 상태/설정 보관 등 공통 기능을 제공합니다.
//!
//! # 상태 전환
//! ```text
//! Uninitialized → initialize() → Initialized → start() → Running → stop() → Stopped
//!                                     ↑______________________________|  (재시작 가능)
//! ```
//! 허용되지 않은 상태에서 생명주기 메서드가 호출되면 컴포넌트는
//! `Error` 상태로 전환되고 에러를 반환합니다. panic하지 않습니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ComponentError, SignalpostError};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// ─── ComponentStatus ─────────────────────────────────────────────────

/// 컴포넌트 생명주기 상태
///
/// 상태 전환은 컴포넌트 자신만 수행하며, 관찰자는 읽기만 합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentStatus {
    /// 생성됨, 아직 초기화 전
    Uninitialized,
    /// 초기화 완료 (start 가능)
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
    /// 오류 상태 — 어느 상태에서든 도달 가능
    Error,
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "UNINITIALIZED"),
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl ComponentStatus {
    /// 문자열에서 상태를 파싱합니다. 대소문자를 구분하지 않습니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNINITIALIZED" => Some(Self::Uninitialized),
            "INITIALIZED" => Some(Self::Initialized),
            "RUNNING" => Some(Self::Running),
            "STOPPED" => Some(Self::Stopped),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

// ─── Component Trait ─────────────────────────────────────────────────

/// 모든 활성 요소가 구현하는 생명주기 trait
///
/// 생명주기 메서드는 `BoxFuture`를 반환하여 `Arc<dyn Component>`로
/// 동적 관리할 수 있습니다. 구현체는 내부 가변성(단일 RwLock)으로
/// 상태를 보호합니다.
pub trait Component: Send + Sync {
    /// 컴포넌트 고유 ID (예: `"event_bus"`)
    fn id(&self) -> &str;

    /// 사람이 읽을 수 있는 이름 (예: `"Event Bus"`)
    fn name(&self) -> &str;

    /// 현재 상태를 반환합니다.
    fn status(&self) -> ComponentStatus;

    /// 컴포넌트를 초기화합니다.
    ///
    /// `Uninitialized` 상태에서 한 번만 호출 가능합니다.
    /// 설정은 초기화 시점에 읽습니다.
    fn initialize(&self) -> BoxFuture<'_, Result<(), SignalpostError>>;

    /// 컴포넌트를 시작합니다.
    ///
    /// `Initialized` 또는 `Stopped` 상태에서 호출 가능합니다.
    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>>;

    /// 컴포넌트를 정지하고 리소스를 해제합니다.
    ///
    /// 멱등합니다: 이미 정지된 컴포넌트에 대한 호출은 성공합니다.
    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>>;

    /// 설정을 교체합니다.
    ///
    /// JSON 객체가 아닌 값은 거부됩니다. `initialize` 전에 호출할 수
    /// 있으며, 컴포넌트는 초기화 시점에 설정을 읽습니다.
    fn configure(&self, config: Value) -> Result<(), SignalpostError>;
}

// ─── ComponentBase ───────────────────────────────────────────────────

/// 컴포넌트 공통 상태 보관소
///
/// 모든 컴포넌트/플러그인이 내장(embed)하여 사용합니다.
/// 상태 전환 규칙을 중앙에서 강제하고, 설정 객체를 보관합니다.
pub struct ComponentBase {
    id: String,
    name: String,
    status: RwLock<ComponentStatus>,
    config: RwLock<Map<String, Value>>,
}

impl ComponentBase {
    /// 새 베이스를 생성합니다. 초기 상태는 `Uninitialized`입니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: RwLock::new(ComponentStatus::Uninitialized),
            config: RwLock::new(Map::new()),
        }
    }

    /// 컴포넌트 ID를 반환합니다.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 컴포넌트 이름을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 현재 상태를 반환합니다.
    pub fn status(&self) -> ComponentStatus {
        *self.status.read().expect("status lock poisoned")
    }

    /// 상태를 직접 설정합니다.
    ///
    /// 전환 규칙 검사 없이 설정하므로 컴포넌트 내부에서만 사용합니다.
    pub fn set_status(&self, status: ComponentStatus) {
        *self.status.write().expect("status lock poisoned") = status;
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.status() == ComponentStatus::Running
    }

    /// `initialize` 전환을 시도합니다: `Uninitialized → Initialized`.
    ///
    /// 다른 상태에서 호출되면 `Error` 상태로 전환하고 에러를 반환합니다.
    pub fn begin_initialize(&self) -> Result<(), SignalpostError> {
        let mut status = self.status.write().expect("status lock poisoned");
        match *status {
            ComponentStatus::Uninitialized => {
                *status = ComponentStatus::Initialized;
                Ok(())
            }
            from => {
                *status = ComponentStatus::Error;
                Err(self.invalid_transition(from, "initialize"))
            }
        }
    }

    /// `start` 전환을 시도합니다: `Initialized | Stopped → Running`.
    pub fn begin_start(&self) -> Result<(), SignalpostError> {
        let mut status = self.status.write().expect("status lock poisoned");
        match *status {
            ComponentStatus::Initialized | ComponentStatus::Stopped => {
                *status = ComponentStatus::Running;
                Ok(())
            }
            from => {
                *status = ComponentStatus::Error;
                Err(self.invalid_transition(from, "start"))
            }
        }
    }

    /// `stop` 전환을 수행합니다. 어느 상태에서든 성공합니다 (멱등).
    pub fn begin_stop(&self) {
        *self.status.write().expect("status lock poisoned") = ComponentStatus::Stopped;
    }

    /// 컴포넌트를 `Error` 상태로 전환합니다.
    pub fn fail(&self) {
        *self.status.write().expect("status lock poisoned") = ComponentStatus::Error;
    }

    /// 설정을 교체합니다. JSON 객체가 아닌 값은 거부됩니다.
    pub fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        match config {
            Value::Object(map) => {
                *self.config.write().expect("config lock poisoned") = map;
                Ok(())
            }
            other => Err(ComponentError::InvalidConfig {
                component: self.id.clone(),
                reason: format!("expected JSON object, got {}", value_kind(&other)),
            }
            .into()),
        }
    }

    /// 현재 설정의 스냅샷을 반환합니다.
    pub fn config(&self) -> Map<String, Value> {
        self.config.read().expect("config lock poisoned").clone()
    }

    /// 설정에서 단일 키 값을 조회합니다.
    pub fn config_value(&self, key: &str) -> Option<Value> {
        self.config
            .read()
            .expect("config lock poisoned")
            .get(key)
            .cloned()
    }

    fn invalid_transition(&self, from: ComponentStatus, operation: &str) -> SignalpostError {
        ComponentError::InvalidTransition {
            component: self.id.clone(),
            from: from.to_string(),
            operation: operation.to_owned(),
        }
        .into()
    }
}

/// JSON 값의 종류명을 반환합니다 (에러 메시지용).
pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_display() {
        assert_eq!(ComponentStatus::Uninitialized.to_string(), "UNINITIALIZED");
        assert_eq!(ComponentStatus::Initialized.to_string(), "INITIALIZED");
        assert_eq!(ComponentStatus::Running.to_string(), "RUNNING");
        assert_eq!(ComponentStatus::Stopped.to_string(), "STOPPED");
        assert_eq!(ComponentStatus::Error.to_string(), "ERROR");
    }

    #[test]
    fn status_from_str_loose() {
        assert_eq!(
            ComponentStatus::from_str_loose("running"),
            Some(ComponentStatus::Running)
        );
        assert_eq!(
            ComponentStatus::from_str_loose("STOPPED"),
            Some(ComponentStatus::Stopped)
        );
        assert_eq!(ComponentStatus::from_str_loose("unknown"), None);
    }

    #[test]
    fn status_serialize_uses_wire_names() {
        let json = serde_json::to_string(&ComponentStatus::Uninitialized).unwrap();
        assert_eq!(json, "\"UNINITIALIZED\"");
        let back: ComponentStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ComponentStatus::Uninitialized);
    }

    #[test]
    fn base_starts_uninitialized() {
        let base = ComponentBase::new("test", "Test Component");
        assert_eq!(base.id(), "test");
        assert_eq!(base.name(), "Test Component");
        assert_eq!(base.status(), ComponentStatus::Uninitialized);
    }

    #[test]
    fn base_full_lifecycle() {
        let base = ComponentBase::new("test", "Test");
        base.begin_initialize().unwrap();
        assert_eq!(base.status(), ComponentStatus::Initialized);

        base.begin_start().unwrap();
        assert_eq!(base.status(), ComponentStatus::Running);
        assert!(base.is_running());

        base.begin_stop();
        assert_eq!(base.status(), ComponentStatus::Stopped);

        // 정지 후 재시작 가능
        base.begin_start().unwrap();
        assert_eq!(base.status(), ComponentStatus::Running);
    }

    #[test]
    fn double_initialize_fails_and_sets_error() {
        let base = ComponentBase::new("test", "Test");
        base.begin_initialize().unwrap();

        let err = base.begin_initialize().unwrap_err();
        assert!(err.to_string().contains("initialize"));
        assert_eq!(base.status(), ComponentStatus::Error);
    }

    #[test]
    fn start_from_uninitialized_fails() {
        let base = ComponentBase::new("test", "Test");
        let err = base.begin_start().unwrap_err();
        assert!(err.to_string().contains("UNINITIALIZED"));
        assert_eq!(base.status(), ComponentStatus::Error);
    }

    #[test]
    fn stop_is_idempotent() {
        let base = ComponentBase::new("test", "Test");
        base.begin_initialize().unwrap();
        base.begin_start().unwrap();

        base.begin_stop();
        base.begin_stop();
        assert_eq!(base.status(), ComponentStatus::Stopped);
    }

    #[test]
    fn configure_rejects_non_object() {
        let base = ComponentBase::new("test", "Test");
        assert!(base.configure(Value::Null).is_err());
        assert!(base.configure(json!([1, 2, 3])).is_err());
        assert!(base.configure(json!("string")).is_err());
        assert_eq!(base.status(), ComponentStatus::Uninitialized);
    }

    #[test]
    fn configure_replaces_config() {
        let base = ComponentBase::new("test", "Test");
        base.configure(json!({"a": 1})).unwrap();
        assert_eq!(base.config_value("a"), Some(json!(1)));

        base.configure(json!({"b": 2})).unwrap();
        assert_eq!(base.config_value("a"), None);
        assert_eq!(base.config_value("b"), Some(json!(2)));
    }

    #[test]
    fn configure_twice_with_same_config_is_idempotent() {
        let base = ComponentBase::new("test", "Test");
        let config = json!({"max_size": 100});
        base.configure(config.clone()).unwrap();
        base.configure(config).unwrap();
        assert_eq!(base.config_value("max_size"), Some(json!(100)));
    }

    #[test]
    fn configure_before_initialize_is_allowed() {
        let base = ComponentBase::new("test", "Test");
        base.configure(json!({"key": "value"})).unwrap();
        base.begin_initialize().unwrap();
        assert_eq!(base.config_value("key"), Some(json!("value")));
    }
}
