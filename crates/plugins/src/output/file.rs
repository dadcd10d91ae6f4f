//! 파일 출력 플러그인
//!
//! 배치의 포인트를 JSON 라인 형식으로 출력 디렉토리의 파일에
//! 기록합니다. `rotate_interval`(초)마다 `filename_pattern`
//! (chrono 포맷 문자열)으로 새 파일을 엽니다.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;

use signalpost_core::component::BoxFuture;
use signalpost_core::plugin::CoreApi;
use signalpost_core::{
    Component, ComponentError, ComponentStatus, DataBatch, OutputPlugin, Plugin, PluginType,
    SignalpostError,
};

use crate::base::PluginBase;

/// 기본 로테이션 주기 (초)
const DEFAULT_ROTATE_INTERVAL_SECS: u64 = 3600;

/// 기본 파일명 패턴 (chrono strftime)
const DEFAULT_FILENAME_PATTERN: &str = "telemetry-%Y%m%d-%H%M%S.log";

struct WriterState {
    output_dir: PathBuf,
    rotate_interval: Duration,
    filename_pattern: String,
    current: Option<File>,
    opened_at: Option<Instant>,
}

/// 파일 출력 플러그인
pub struct FileOutput {
    base: PluginBase,
    state: Mutex<WriterState>,
}

impl FileOutput {
    /// 새 파일 출력을 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: PluginBase::new(id, "File Output", PluginType::Output),
            state: Mutex::new(WriterState {
                output_dir: PathBuf::new(),
                rotate_interval: Duration::from_secs(DEFAULT_ROTATE_INTERVAL_SECS),
                filename_pattern: DEFAULT_FILENAME_PATTERN.to_owned(),
                current: None,
                opened_at: None,
            }),
        }
    }

    /// 현재 파일이 없거나 로테이션 주기가 지났으면 새 파일을 엽니다.
    fn ensure_file(state: &mut WriterState) -> std::io::Result<()> {
        let needs_rotation = match state.opened_at {
            None => true,
            Some(opened) => opened.elapsed() >= state.rotate_interval,
        };
        if !needs_rotation && state.current.is_some() {
            return Ok(());
        }

        let filename = chrono::Utc::now()
            .format(&state.filename_pattern)
            .to_string();
        let path = state.output_dir.join(filename);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        tracing::debug!(path = %path.display(), "file output rotated");
        state.current = Some(file);
        state.opened_at = Some(Instant::now());
        Ok(())
    }

    fn write_batch(&self, batch: &DataBatch) -> std::io::Result<()> {
        let mut state = self.state.lock().expect("writer lock poisoned");
        Self::ensure_file(&mut state)?;
        let file = state.current.as_mut().expect("file just ensured");

        for point in &batch.points {
            let line = Value::Object(point.to_map());
            writeln!(file, "{line}")?;
        }
        for record in &batch.records {
            let line = Value::Object(record.to_map());
            writeln!(file, "{line}")?;
        }
        file.flush()
    }
}

impl Component for FileOutput {
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
            let output_dir = self.base.str_value("output_dir", "");
            if output_dir.is_empty() {
                self.base.component().fail();
                return Err(ComponentError::InvalidConfig {
                    component: self.base.id().to_owned(),
                    reason: "output_dir is required".to_owned(),
                }
                .into());
            }
            std::fs::create_dir_all(&output_dir)?;

            let mut state = self.state.lock().expect("writer lock poisoned");
            state.output_dir = PathBuf::from(output_dir);
            state.rotate_interval = Duration::from_secs(
                self.base
                    .u64_value("rotate_interval", DEFAULT_ROTATE_INTERVAL_SECS)
                    .max(1),
            );
            state.filename_pattern = self
                .base
                .str_value("filename_pattern", DEFAULT_FILENAME_PATTERN);
            drop(state);

            self.base.component().begin_initialize()
        })
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move { self.base.component().begin_start() })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            let mut state = self.state.lock().expect("writer lock poisoned");
            if let Some(file) = state.current.take() {
                drop(file);
            }
            state.opened_at = None;
            drop(state);
            self.base.component().begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

impl Plugin for FileOutput {
    fn plugin_type(&self) -> PluginType {
        self.base.plugin_type()
    }

    fn validate(&self) -> bool {
        !self.base.str_value("output_dir", "").is_empty()
    }

    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool {
        self.base.attach_core(core);
        true
    }
}

impl OutputPlugin for FileOutput {
    fn send<'a>(&'a self, batch: &'a DataBatch) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            if batch.is_empty() {
                return true;
            }
            if !self.base.is_running() {
                return false;
            }

            match self.write_batch(batch) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "file output write failed");
                    false
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::{Map, json};
    use signalpost_core::{DataPoint, LogPoint, TelemetryType};
    use std::collections::BTreeMap;

    fn sample_batch(messages: &[&str]) -> DataBatch {
        let mut batch = DataBatch::with_source(TelemetryType::Log, "test");
        for msg in messages {
            batch.push_point(DataPoint::Log(LogPoint {
                timestamp: Utc::now(),
                origin: "test".to_owned(),
                labels: BTreeMap::new(),
                message: (*msg).to_owned(),
                level: "INFO".to_owned(),
                attributes: Map::new(),
            }));
        }
        batch
    }

    async fn running_output(dir: &std::path::Path) -> FileOutput {
        let output = FileOutput::new("file_output");
        output
            .configure(json!({"output_dir": dir.display().to_string()}))
            .unwrap();
        output.initialize().await.unwrap();
        output.start().await.unwrap();
        output
    }

    #[test]
    fn validate_requires_output_dir() {
        let output = FileOutput::new("f");
        output.configure(json!({})).unwrap();
        assert!(!output.validate());

        output.configure(json!({"output_dir": "/tmp/out"})).unwrap();
        assert!(output.validate());
    }

    #[tokio::test]
    async fn initialize_without_output_dir_fails() {
        let output = FileOutput::new("f");
        output.configure(json!({})).unwrap();
        assert!(output.initialize().await.is_err());
        assert_eq!(output.status(), ComponentStatus::Error);
    }

    #[tokio::test]
    async fn send_writes_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let output = running_output(dir.path()).await;

        assert!(output.send(&sample_batch(&["one", "two"])).await);

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);

        let content = std::fs::read_to_string(&entries[0]).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["message"], json!("one"));
    }

    #[tokio::test]
    async fn repeated_sends_append_to_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = running_output(dir.path()).await;

        output.send(&sample_batch(&["a"])).await;
        output.send(&sample_batch(&["b"])).await;

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1);
        let content = std::fs::read_to_string(&entries[0]).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn send_when_not_running_fails() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new("f");
        output
            .configure(json!({"output_dir": dir.path().display().to_string()}))
            .unwrap();
        output.initialize().await.unwrap();

        assert!(!output.send(&sample_batch(&["x"])).await);
    }

    #[tokio::test]
    async fn empty_batch_succeeds_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = running_output(dir.path()).await;

        assert!(output.send(&DataBatch::new(TelemetryType::Log)).await);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn custom_filename_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let output = FileOutput::new("f");
        output
            .configure(json!({
                "output_dir": dir.path().display().to_string(),
                "filename_pattern": "fixed-name.jsonl",
            }))
            .unwrap();
        output.initialize().await.unwrap();
        output.start().await.unwrap();

        output.send(&sample_batch(&["x"])).await;
        assert!(dir.path().join("fixed-name.jsonl").exists());
    }
}
