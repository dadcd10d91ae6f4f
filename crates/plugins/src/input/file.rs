//! 파일 입력 플러그인
//!
//! 설정된 경로(글롭 허용)의 파일들을 감시하며, tick마다 새로 추가된
//! 라인을 로그 포인트로 수집합니다. 파일별 바이트 오프셋을 추적하고,
//! 파일 크기 축소(truncation/로테이션)를 감지하면 처음부터 다시
//! 읽습니다.

use std::collections::{BTreeMap, HashMap};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use signalpost_core::component::BoxFuture;
use signalpost_core::plugin::CoreApi;
use signalpost_core::{
    Component, ComponentError, ComponentStatus, DataBatch, DataPoint, InputPlugin, LogPoint,
    Plugin, PluginType, SignalpostError, TelemetryType,
};

use crate::base::PluginBase;

/// 배치당 최대 포인트 수 — 초과 시 배치를 분할합니다.
const MAX_BATCH_POINTS: usize = 1000;

/// 멀티라인 프레이밍 정책
///
/// `pattern`에 매칭되지 않는 라인은 직전 라인의 연속으로 간주되어
/// 합쳐집니다.
struct MultilineConfig {
    pattern: Regex,
}

/// 파일 입력 플러그인
pub struct FileInput {
    base: PluginBase,
    state: Mutex<FileState>,
}

struct FileState {
    paths: Vec<String>,
    positions: HashMap<PathBuf, u64>,
    multiline: Option<MultilineConfig>,
}

impl FileInput {
    /// 새 파일 입력을 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: PluginBase::new(id, "File Input", PluginType::Input),
            state: Mutex::new(FileState {
                paths: Vec::new(),
                positions: HashMap::new(),
                multiline: None,
            }),
        }
    }

    /// 파일에서 새로 추가된 라인을 읽습니다.
    ///
    /// 오프셋 이후의 내용만 읽으며, 마지막 개행 이전의 완성된
    /// 라인만 반환합니다. 파일이 줄어들었으면 처음부터 다시 읽습니다.
    async fn read_new_lines(path: &Path, positions: &mut HashMap<PathBuf, u64>) -> Vec<String> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cannot open watched file");
                return Vec::new();
            }
        };

        let len = match file.metadata().await {
            Ok(meta) => meta.len(),
            Err(_) => return Vec::new(),
        };

        let mut position = positions.get(path).copied().unwrap_or(0);
        if len < position {
            // truncation 또는 로테이션
            tracing::debug!(path = %path.display(), "file shrank, resetting offset");
            position = 0;
        }
        if len == position {
            return Vec::new();
        }

        if file.seek(SeekFrom::Start(position)).await.is_err() {
            return Vec::new();
        }

        let mut content = String::new();
        if file.read_to_string(&mut content).await.is_err() {
            // 비UTF-8 파일은 건너뜀
            positions.insert(path.to_path_buf(), len);
            return Vec::new();
        }

        // 마지막 개행까지가 완성된 라인; 미완성 꼬리는 다음 tick에 읽음
        let consumed = match content.rfind('\n') {
            Some(idx) => idx + 1,
            None => {
                return Vec::new();
            }
        };
        positions.insert(path.to_path_buf(), position + consumed as u64);

        content[..consumed]
            .lines()
            .map(str::to_owned)
            .collect()
    }

    fn log_point(&self, path: &Path, message: String) -> DataPoint {
        DataPoint::Log(LogPoint {
            timestamp: chrono::Utc::now(),
            origin: path.display().to_string(),
            labels: BTreeMap::from([
                ("source".to_owned(), "file".to_owned()),
                ("path".to_owned(), path.display().to_string()),
            ]),
            message,
            level: "INFO".to_owned(),
            attributes: Map::new(),
        })
    }
}

/// 멀티라인 정책에 따라 연속 라인을 합칩니다.
fn join_multiline(lines: Vec<String>, multiline: &Option<MultilineConfig>) -> Vec<String> {
    let Some(config) = multiline else {
        return lines;
    };

    let mut joined: Vec<String> = Vec::new();
    for line in lines {
        if config.pattern.is_match(&line) || joined.is_empty() {
            joined.push(line);
        } else {
            let last = joined.last_mut().expect("joined non-empty");
            last.push('\n');
            last.push_str(&line);
        }
    }
    joined
}

impl Component for FileInput {
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
            let paths = self.base.str_list("paths");
            if paths.is_empty() {
                self.base.component().fail();
                return Err(ComponentError::InvalidConfig {
                    component: self.base.id().to_owned(),
                    reason: "paths must be a non-empty list".to_owned(),
                }
                .into());
            }

            let multiline = match self.base.object_value("multiline") {
                Some(obj) => match obj.get("pattern").and_then(Value::as_str) {
                    Some(pattern) => match Regex::new(pattern) {
                        Ok(regex) => Some(MultilineConfig { pattern: regex }),
                        Err(e) => {
                            self.base.component().fail();
                            return Err(ComponentError::InvalidConfig {
                                component: self.base.id().to_owned(),
                                reason: format!("invalid multiline pattern: {e}"),
                            }
                            .into());
                        }
                    },
                    None => None,
                },
                None => None,
            };

            let mut state = self.state.lock().await;
            state.paths = paths;
            state.multiline = multiline;
            drop(state);

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

impl Plugin for FileInput {
    fn plugin_type(&self) -> PluginType {
        self.base.plugin_type()
    }

    fn validate(&self) -> bool {
        !self.base.str_list("paths").is_empty()
    }

    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool {
        self.base.attach_core(core);
        true
    }
}

impl InputPlugin for FileInput {
    fn collect(&self) -> BoxFuture<'_, Vec<DataBatch>> {
        Box::pin(async move {
            if !self.base.is_running() {
                return Vec::new();
            }

            let mut state = self.state.lock().await;
            let patterns = state.paths.clone();

            let mut results = Vec::new();
            let mut batch = DataBatch::with_source(TelemetryType::Log, self.base.id());

            for pattern in &patterns {
                let matches = match glob::glob(pattern) {
                    Ok(paths) => paths,
                    Err(e) => {
                        tracing::warn!(pattern, error = %e, "invalid glob pattern");
                        continue;
                    }
                };

                for entry in matches.flatten() {
                    let lines =
                        Self::read_new_lines(&entry, &mut state.positions).await;
                    let lines = join_multiline(lines, &state.multiline);
                    for line in lines {
                        batch.push_point(self.log_point(&entry, line));
                        if batch.size() >= MAX_BATCH_POINTS {
                            results.push(std::mem::replace(
                                &mut batch,
                                DataBatch::with_source(TelemetryType::Log, self.base.id()),
                            ));
                        }
                    }
                }
            }

            if !batch.is_empty() {
                results.push(batch);
            }
            results
        })
    }
}
