//! 표준 출력 플러그인
//!
//! 배치의 포인트를 텍스트 또는 JSON 한 줄 형식으로 stdout에
//! 출력합니다. 텍스트 모드에서 로그 레벨별 ANSI 색상을 지원합니다.
//! 변환되지 않은 원시 레코드는 패스스루로 그대로 출력됩니다.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::SecondsFormat;
use serde_json::Value;

use signalpost_core::component::BoxFuture;
use signalpost_core::plugin::CoreApi;
use signalpost_core::{
    Component, ComponentStatus, DataBatch, DataPoint, OutputPlugin, Plugin, PluginType,
    SignalpostError,
};

use crate::base::PluginBase;

/// 표준 출력 플러그인
pub struct StdoutOutput {
    base: PluginBase,
    json_format: AtomicBool,
    colorize: AtomicBool,
}

impl StdoutOutput {
    /// 새 stdout 출력을 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: PluginBase::new(id, "Stdout Output", PluginType::Output),
            json_format: AtomicBool::new(false),
            colorize: AtomicBool::new(false),
        }
    }

    fn render_point(&self, out: &mut impl Write, point: &DataPoint) -> std::io::Result<()> {
        if self.json_format.load(Ordering::Relaxed) {
            let data = Value::Object(point.to_map());
            return writeln!(out, "{data}");
        }

        let timestamp = point
            .timestamp()
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        match point {
            DataPoint::Log(p) => {
                let level = if self.colorize.load(Ordering::Relaxed) {
                    colorize_level(&p.level)
                } else {
                    p.level.clone()
                };
                writeln!(out, "[{timestamp}] {level}: {}", p.message)?;
                if !p.attributes.is_empty() {
                    let attrs = Value::Object(p.attributes.clone());
                    writeln!(out, "  {attrs}")?;
                }
            }
            DataPoint::Metric(p) => {
                writeln!(out, "[{timestamp}] METRIC {}: {:.6}", p.name, p.value)?;
                if !p.dimensions.is_empty() {
                    let dims: Value = p
                        .dimensions
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                        .collect::<serde_json::Map<_, _>>()
                        .into();
                    writeln!(out, "  {dims}")?;
                }
            }
            DataPoint::Trace(p) => {
                let duration_ms = (p.end_time - p.start_time).num_milliseconds();
                writeln!(
                    out,
                    "[{timestamp}] TRACE {} (span: {}): {duration_ms}ms",
                    p.trace_id, p.span_id,
                )?;
            }
        }
        Ok(())
    }

    fn render_batch(&self, out: &mut impl Write, batch: &DataBatch) -> std::io::Result<()> {
        for point in &batch.points {
            self.render_point(out, point)?;
        }
        // 변환되지 않은 레코드는 그대로 출력 (패스스루)
        for record in &batch.records {
            if self.json_format.load(Ordering::Relaxed) {
                let data = Value::Object(record.to_map());
                writeln!(out, "{data}")?;
            } else {
                out.write_all(&record.raw_data)?;
                if !record.raw_data.ends_with(b"\n") {
                    writeln!(out)?;
                }
            }
        }
        Ok(())
    }
}

/// 로그 레벨에 ANSI 색상을 입힙니다.
fn colorize_level(level: &str) -> String {
    let code = match level {
        "ERROR" | "FATAL" => "\x1b[31m",   // red
        "WARN" | "WARNING" => "\x1b[33m",  // yellow
        "INFO" => "\x1b[32m",              // green
        "DEBUG" => "\x1b[36m",             // cyan
        "TRACE" => "\x1b[35m",             // magenta
        _ => return level.to_owned(),
    };
    format!("{code}{level}\x1b[0m")
}

impl Component for StdoutOutput {
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
            let format = self.base.str_value("format", "text");
            if format != "text" && format != "json" {
                tracing::warn!(format, "unknown stdout format, falling back to text");
            }
            self.json_format.store(format == "json", Ordering::Relaxed);
            self.colorize
                .store(self.base.bool_value("colorize", false), Ordering::Relaxed);
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

impl Plugin for StdoutOutput {
    fn plugin_type(&self) -> PluginType {
        self.base.plugin_type()
    }

    fn validate(&self) -> bool {
        true
    }

    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool {
        self.base.attach_core(core);
        true
    }
}

impl OutputPlugin for StdoutOutput {
    fn send<'a>(&'a self, batch: &'a DataBatch) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            if !self.base.is_running() {
                return false;
            }

            let stdout = std::io::stdout();
            let mut handle = stdout.lock();
            if let Err(e) = self.render_batch(&mut handle, batch) {
                tracing::warn!(error = %e, "stdout write failed");
                return false;
            }
            let _ = handle.flush();
            true
        })
    }
}
