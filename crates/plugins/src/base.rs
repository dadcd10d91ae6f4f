//! 플러그인 공통 베이스 — 식별자, 상태, 설정, 코어 핸들
//!
//! [`PluginBase`]는 모든 표준 플러그인이 내장하는 공유 스캐폴딩입니다.
//! 코어의 [`ComponentBase`]에 플러그인 유형과 [`CoreApi`] 핸들,
//! 타입 강제 설정 접근자를 더합니다.
//!
//! 설정 트리는 동적 JSON이므로, 타입 강제와 기본값 적용은 이 경계에서
//! 수행합니다 — 코어의 설정 저장소는 경로 기반 프리미티브만 노출합니다.

use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};

use signalpost_core::plugin::CoreApi;
use signalpost_core::{ComponentBase, ComponentStatus, PluginType, SignalpostError};

/// 플러그인 공통 베이스
pub struct PluginBase {
    component: ComponentBase,
    plugin_type: PluginType,
    core: RwLock<Option<Arc<dyn CoreApi>>>,
}

impl PluginBase {
    /// 새 플러그인 베이스를 생성합니다.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        plugin_type: PluginType,
    ) -> Self {
        Self {
            component: ComponentBase::new(id, name),
            plugin_type,
            core: RwLock::new(None),
        }
    }

    /// 플러그인 ID
    pub fn id(&self) -> &str {
        self.component.id()
    }

    /// 플러그인 이름
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// 플러그인 유형
    pub fn plugin_type(&self) -> PluginType {
        self.plugin_type
    }

    /// 현재 상태
    pub fn status(&self) -> ComponentStatus {
        self.component.status()
    }

    /// 실행 중인지 확인합니다.
    pub fn is_running(&self) -> bool {
        self.component.is_running()
    }

    /// 내장 [`ComponentBase`]에 대한 참조
    pub fn component(&self) -> &ComponentBase {
        &self.component
    }

    /// 코어 핸들을 저장합니다.
    pub fn attach_core(&self, core: Arc<dyn CoreApi>) {
        *self.core.write().expect("core handle lock poisoned") = Some(core);
    }

    /// 코어 핸들을 반환합니다 (등록 전이면 `None`).
    pub fn core(&self) -> Option<Arc<dyn CoreApi>> {
        self.core.read().expect("core handle lock poisoned").clone()
    }

    /// 설정을 교체합니다. JSON 객체가 아닌 값은 거부됩니다.
    pub fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.component.configure(config)
    }

    /// 현재 설정의 스냅샷
    pub fn config(&self) -> Map<String, Value> {
        self.component.config()
    }

    // ─── 타입 강제 설정 접근자 ───────────────────────────────────────

    /// 문자열 설정값. 없거나 문자열이 아니면 `default`.
    pub fn str_value(&self, key: &str, default: &str) -> String {
        self.component
            .config_value(key)
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| default.to_owned())
    }

    /// 불리언 설정값. 없거나 불리언이 아니면 `default`.
    pub fn bool_value(&self, key: &str, default: bool) -> bool {
        self.component
            .config_value(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// 부호 없는 정수 설정값. 없거나 숫자가 아니면 `default`.
    pub fn u64_value(&self, key: &str, default: u64) -> u64 {
        self.component
            .config_value(key)
            .and_then(|v| v.as_u64())
            .unwrap_or(default)
    }

    /// 문자열 배열 설정값. 배열이 아니거나 없으면 빈 Vec.
    /// 문자열이 아닌 요소는 건너뜁니다.
    pub fn str_list(&self, key: &str) -> Vec<String> {
        self.component
            .config_value(key)
            .and_then(|v| {
                v.as_array().map(|items| {
                    items
                        .iter()
                        .filter_map(|item| item.as_str().map(str::to_owned))
                        .collect()
                })
            })
            .unwrap_or_default()
    }

    /// 객체 설정값. 없거나 객체가 아니면 `None`.
    pub fn object_value(&self, key: &str) -> Option<Map<String, Value>> {
        self.component
            .config_value(key)
            .and_then(|v| v.as_object().cloned())
    }
}
