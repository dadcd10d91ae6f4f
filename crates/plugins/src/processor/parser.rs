//! 정규식 파서 프로세서
//!
//! 로그 포인트의 메시지와 원시 레코드를 정규식 패턴으로 파싱하여
//! 구조화합니다. 첫 번째로 매칭된 패턴의 명명 캡처 그룹이 포인트
//! 속성으로 들어가며, `level`과 `timestamp` 캡처는 해당 포인트
//! 필드를 직접 갱신합니다 (timestamp는 RFC3339로 파싱 가능할 때).
//!
//! LOG 외의 배치는 손대지 않고 통과시킵니다.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::{Map, Value};

use signalpost_core::component::BoxFuture;
use signalpost_core::plugin::CoreApi;
use signalpost_core::{
    Component, ComponentError, ComponentStatus, DataBatch, DataPoint, LogPoint, Plugin,
    PluginType, ProcessorPlugin, Record, SignalpostError, TelemetryType,
};

use crate::base::PluginBase;

/// 정규식 파서 프로세서
pub struct ParserProcessor {
    base: PluginBase,
    patterns: RwLock<Vec<Regex>>,
}

impl ParserProcessor {
    /// 새 파서를 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: PluginBase::new(id, "Parser", PluginType::Processor),
            patterns: RwLock::new(Vec::new()),
        }
    }

    /// 로그 포인트 하나를 파싱하여 새 포인트를 만듭니다.
    fn parse_log_point(&self, point: &LogPoint) -> LogPoint {
        let mut parsed = point.clone();
        self.apply_patterns(&point.message, &mut parsed);
        parsed
    }

    /// 원시 레코드를 라인 단위로 파싱하여 로그 포인트로 변환합니다.
    fn parse_record(&self, record: &Record) -> Vec<LogPoint> {
        let text = String::from_utf8_lossy(&record.raw_data);
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut point = LogPoint {
                    timestamp: record.timestamp,
                    origin: record.source.clone(),
                    labels: BTreeMap::new(),
                    message: line.to_owned(),
                    level: "INFO".to_owned(),
                    attributes: Map::new(),
                };
                self.apply_patterns(line, &mut point);
                point
            })
            .collect()
    }

    /// 첫 번째로 매칭되는 패턴의 명명 캡처를 포인트에 반영합니다.
    ///
    /// `level`, `timestamp`, `message` 캡처는 해당 포인트 필드를
    /// 갱신하고, 그 외의 명명 캡처만 속성으로 들어갑니다.
    fn apply_patterns(&self, message: &str, point: &mut LogPoint) {
        let patterns = self.patterns.read().expect("pattern lock poisoned");
        for pattern in patterns.iter() {
            let Some(captures) = pattern.captures(message) else {
                continue;
            };

            for name in pattern.capture_names().flatten() {
                let Some(value) = captures.name(name) else {
                    continue;
                };

                match name {
                    "level" => point.level = value.as_str().to_owned(),
                    "timestamp" => {
                        if let Ok(ts) = DateTime::parse_from_rfc3339(value.as_str()) {
                            point.timestamp = ts.with_timezone(&Utc);
                        }
                    }
                    "message" => point.message = value.as_str().to_owned(),
                    other => {
                        point
                            .attributes
                            .insert(other.to_owned(), Value::String(value.as_str().to_owned()));
                    }
                }
            }
            break;
        }
    }
}

impl Component for ParserProcessor {
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
            let raw_patterns = self.base.str_list("patterns");
            let mut compiled = Vec::new();
            for raw in &raw_patterns {
                match Regex::new(raw) {
                    Ok(regex) => compiled.push(regex),
                    Err(e) => {
                        tracing::warn!(pattern = raw, error = %e, "skipping invalid pattern");
                    }
                }
            }

            if compiled.is_empty() {
                self.base.component().fail();
                return Err(ComponentError::InvalidConfig {
                    component: self.base.id().to_owned(),
                    reason: "patterns must contain at least one valid regex".to_owned(),
                }
                .into());
            }

            *self.patterns.write().expect("pattern lock poisoned") = compiled;
            self.base.component().begin_initialize()
        })
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move { self.base.component().begin_start() })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            self.base.component().begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

impl Plugin for ParserProcessor {
    fn plugin_type(&self) -> PluginType {
        self.base.plugin_type()
    }

    fn validate(&self) -> bool {
        !self.base.str_list("patterns").is_empty()
    }

    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool {
        self.base.attach_core(core);
        true
    }
}

impl ProcessorPlugin for ParserProcessor {
    fn process(&self, batch: DataBatch) -> Option<DataBatch> {
        if batch.batch_type != TelemetryType::Log {
            return Some(batch);
        }
        if !self.base.is_running() {
            return Some(batch);
        }

        let mut result = DataBatch::with_source(TelemetryType::Log, batch.source_id.clone());
        result.attributes = batch.attributes.clone();

        for point in &batch.points {
            match point {
                DataPoint::Log(log) => {
                    result.push_point(DataPoint::Log(self.parse_log_point(log)));
                }
                other => {
                    result.push_point(other.clone());
                }
            }
        }

        // 원시 레코드는 타입 포인트로 변환되어 배치에서 제거됨
        for record in &batch.records {
            for point in self.parse_record(record) {
                result.push_point(DataPoint::Log(point));
            }
        }

        Some(result)
    }
}
