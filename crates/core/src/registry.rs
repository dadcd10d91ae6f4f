//! 플러그인 레지스트리 — ID 키 기반 플러그인 저장소
//!
//! 등록된 플러그인 핸들을 보관하고 유형별 조회를 제공합니다.
//! 플러그인 생성은 팩토리(plugins 크레이트)가, 등록 이후의 참조
//! 소유는 레지스트리가 담당합니다.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::{PluginError, SignalpostError};
use crate::plugin::{InputPlugin, OutputPlugin, PluginHandle, PluginType, ProcessorPlugin};

/// 플러그인 레지스트리
pub struct PluginRegistry {
    base: ComponentBase,
    plugins: RwLock<BTreeMap<String, PluginHandle>>,
}

impl PluginRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            base: ComponentBase::new("plugin_registry", "Plugin Registry"),
            plugins: RwLock::new(BTreeMap::new()),
        }
    }

    /// 플러그인을 등록합니다.
    ///
    /// 동일 ID가 이미 등록되어 있으면 에러를 반환하고 기존 등록을
    /// 유지합니다. O(log n).
    pub fn register(&self, handle: PluginHandle) -> Result<(), SignalpostError> {
        let id = handle.id().to_owned();
        let mut plugins = self.plugins.write().expect("plugin lock poisoned");
        if plugins.contains_key(&id) {
            return Err(PluginError::AlreadyRegistered { id }.into());
        }
        plugins.insert(id, handle);
        Ok(())
    }

    /// 플러그인을 해제합니다. 존재했으면 `true`를 반환합니다.
    pub fn unregister(&self, plugin_id: &str) -> bool {
        self.plugins
            .write()
            .expect("plugin lock poisoned")
            .remove(plugin_id)
            .is_some()
    }

    /// ID로 플러그인을 조회합니다.
    pub fn get(&self, plugin_id: &str) -> Option<PluginHandle> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .get(plugin_id)
            .cloned()
    }

    /// 지정한 유형의 모든 플러그인을 반환합니다.
    pub fn by_type(&self, plugin_type: PluginType) -> Vec<PluginHandle> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .values()
            .filter(|h| h.plugin_type() == plugin_type)
            .cloned()
            .collect()
    }

    /// 모든 입력 플러그인을 반환합니다.
    pub fn inputs(&self) -> Vec<Arc<dyn InputPlugin>> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .values()
            .filter_map(PluginHandle::input)
            .collect()
    }

    /// 모든 프로세서 플러그인을 반환합니다.
    pub fn processors(&self) -> Vec<Arc<dyn ProcessorPlugin>> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .values()
            .filter_map(PluginHandle::processor)
            .collect()
    }

    /// 모든 출력 플러그인을 반환합니다.
    pub fn outputs(&self) -> Vec<Arc<dyn OutputPlugin>> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .values()
            .filter_map(PluginHandle::output)
            .collect()
    }

    /// 등록된 모든 플러그인 핸들을 반환합니다.
    pub fn handles(&self) -> Vec<PluginHandle> {
        self.plugins
            .read()
            .expect("plugin lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// 등록된 플러그인 수를 반환합니다.
    pub fn count(&self) -> usize {
        self.plugins.read().expect("plugin lock poisoned").len()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for PluginRegistry {
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
            // 등록된 모든 플러그인을 정지한 뒤 자신을 정지
            let handles = self.handles();
            for handle in handles {
                if let Err(e) = handle.as_plugin().stop().await {
                    tracing::warn!(
                        plugin = handle.id(),
                        error = %e,
                        "plugin stop failed during registry shutdown"
                    );
                }
            }
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}
