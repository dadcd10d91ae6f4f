//! 플러그인 팩토리 — 이름 키 기반 플러그인 생성
//!
//! 세 개의 `이름 → 생성자` 매핑(입력/프로세서/출력)을 보관하고,
//! 설정 파일의 PluginSpec 목록에서 플러그인 인스턴스를 조립합니다.
//! 등록은 프로그램 시작 시 정적으로 이루어지며, 실행 중에는 팩토리가
//! 변경되지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use signalpost_core::{
    InputPlugin, OutputPlugin, PluginError, PluginHandle, PluginType, ProcessorPlugin,
    SignalpostError,
};

use crate::input::{FileInput, SocketInput};
use crate::output::{FileOutput, StdoutOutput};
use crate::processor::ParserProcessor;

type InputCtor = Box<dyn Fn(&str) -> Arc<dyn InputPlugin> + Send + Sync>;
type ProcessorCtor = Box<dyn Fn(&str) -> Arc<dyn ProcessorPlugin> + Send + Sync>;
type OutputCtor = Box<dyn Fn(&str) -> Arc<dyn OutputPlugin> + Send + Sync>;

/// 플러그인 팩토리
pub struct PluginFactory {
    inputs: HashMap<String, InputCtor>,
    processors: HashMap<String, ProcessorCtor>,
    outputs: HashMap<String, OutputCtor>,
}

impl PluginFactory {
    /// 빈 팩토리를 생성합니다.
    pub fn new() -> Self {
        Self {
            inputs: HashMap::new(),
            processors: HashMap::new(),
            outputs: HashMap::new(),
        }
    }

    /// 표준 플러그인이 모두 등록된 팩토리를 생성합니다.
    ///
    /// - 입력: `file`, `socket`
    /// - 프로세서: `parser`
    /// - 출력: `stdout`, `file`
    pub fn with_standard_plugins() -> Self {
        let mut factory = Self::new();
        factory.register_input("file", Box::new(|id| Arc::new(FileInput::new(id))));
        factory.register_input("socket", Box::new(|id| Arc::new(SocketInput::new(id))));
        factory.register_processor("parser", Box::new(|id| Arc::new(ParserProcessor::new(id))));
        factory.register_output("stdout", Box::new(|id| Arc::new(StdoutOutput::new(id))));
        factory.register_output("file", Box::new(|id| Arc::new(FileOutput::new(id))));
        factory
    }

    /// 입력 플러그인 생성자를 등록합니다.
    pub fn register_input(&mut self, name: impl Into<String>, ctor: InputCtor) {
        self.inputs.insert(name.into(), ctor);
    }

    /// 프로세서 플러그인 생성자를 등록합니다.
    pub fn register_processor(&mut self, name: impl Into<String>, ctor: ProcessorCtor) {
        self.processors.insert(name.into(), ctor);
    }

    /// 출력 플러그인 생성자를 등록합니다.
    pub fn register_output(&mut self, name: impl Into<String>, ctor: OutputCtor) {
        self.outputs.insert(name.into(), ctor);
    }

    /// 유형과 이름으로 새 플러그인을 생성합니다.
    ///
    /// 알 수 없는 이름이면 에러를 반환합니다.
    pub fn create(
        &self,
        plugin_type: PluginType,
        name: &str,
        id: &str,
    ) -> Result<PluginHandle, SignalpostError> {
        let unknown = || {
            SignalpostError::from(PluginError::UnknownPlugin {
                plugin_type: plugin_type.to_string().to_lowercase(),
                name: name.to_owned(),
            })
        };

        match plugin_type {
            PluginType::Input => self
                .inputs
                .get(name)
                .map(|ctor| PluginHandle::Input(ctor(id)))
                .ok_or_else(unknown),
            PluginType::Processor => self
                .processors
                .get(name)
                .map(|ctor| PluginHandle::Processor(ctor(id)))
                .ok_or_else(unknown),
            PluginType::Output => self
                .outputs
                .get(name)
                .map(|ctor| PluginHandle::Output(ctor(id)))
                .ok_or_else(unknown),
        }
    }

    /// 설정 트리의 `plugins` 섹션에서 플러그인들을 조립합니다.
    ///
    /// 각 PluginSpec은 `{id, type, config}` 형식입니다. spec의 인라인
    /// `config` 위에 최상위 `<pluginId>` 섹션이 덮어써집니다.
    /// 잘못된 spec이나 알 수 없는 유형은 경고 후 건너뜁니다.
    pub fn build_from_config(
        &self,
        root: &Value,
    ) -> Result<Vec<PluginHandle>, SignalpostError> {
        let sections = [
            ("inputs", PluginType::Input),
            ("processors", PluginType::Processor),
            ("outputs", PluginType::Output),
        ];

        let mut plugins = Vec::new();
        for (section, plugin_type) in sections {
            let Some(specs) = root
                .get("plugins")
                .and_then(|p| p.get(section))
                .and_then(Value::as_array)
            else {
                continue;
            };

            for spec in specs {
                let Some(id) = spec.get("id").and_then(Value::as_str) else {
                    tracing::warn!(section, "plugin spec without id, skipping");
                    continue;
                };
                let Some(type_name) = spec.get("type").and_then(Value::as_str) else {
                    tracing::warn!(section, id, "plugin spec without type, skipping");
                    continue;
                };

                let handle = match self.create(plugin_type, type_name, id) {
                    Ok(handle) => handle,
                    Err(e) => {
                        tracing::warn!(section, id, error = %e, "skipping unknown plugin");
                        continue;
                    }
                };

                let mut effective: Map<String, Value> = spec
                    .get("config")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                // 최상위 <pluginId> 섹션이 spec 인라인 설정을 덮어씀
                if let Some(overlay) = root.get(id).and_then(Value::as_object) {
                    for (key, value) in overlay {
                        effective.insert(key.clone(), value.clone());
                    }
                }

                handle
                    .as_plugin()
                    .configure(Value::Object(effective))?;
                plugins.push(handle);
            }
        }

        Ok(plugins)
    }
}

impl Default for PluginFactory {
    fn default() -> Self {
        Self::with_standard_plugins()
    }
}
