//! 설정 저장소 — 경로 주소 지정 계층 설정 및 변경 감시
//!
//! [`ConfigStore`]는 JSON 객체 트리를 점 구분 경로(`"a.b.c"`)로
//! 읽고 쓰는 저장소입니다. 설정 파일 전체가 외부 스키마이므로
//! 내부적으로는 경로 기반 프리미티브만 노출하며, 타입 강제와
//! 기본값 적용은 플러그인 경계에서 수행합니다.
//!
//! # 변경 전파
//!
//! `set`이 성공하면 변경 경로가 내부 채널로 전달되고, 알림 워커가
//! 경로의 모든 프리픽스(빈 경로와 전체 경로 포함) 구독자에게 해당
//! 프리픽스의 현재 값을 통지합니다. 채널이 가득 차면 통지는
//! 드롭됩니다 — `get`이 항상 신뢰할 수 있는 원본입니다.
//! 워커가 채널을 순서대로 소비하므로 구독자는 `set` 순서와 일치하는
//! 전체 순서를 관찰합니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::component::{BoxFuture, Component, ComponentBase, ComponentStatus};
use crate::error::{ConfigError, SignalpostError};
use crate::metrics as m;

/// 설정 변경 콜백
pub type WatchCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// 변경 통지 채널 용량
const UPDATE_CHANNEL_CAPACITY: usize = 64;

type WatcherMap = HashMap<String, Vec<WatchCallback>>;

/// 설정 저장소
pub struct ConfigStore {
    base: ComponentBase,
    tree: Arc<RwLock<Map<String, Value>>>,
    watchers: Arc<RwLock<WatcherMap>>,
    config_path: RwLock<Option<PathBuf>>,
    update_tx: RwLock<Option<mpsc::Sender<String>>>,
    notifier: Mutex<Option<JoinHandle<()>>>,
    cancel: RwLock<CancellationToken>,
}

impl ConfigStore {
    /// 빈 설정 저장소를 생성합니다.
    pub fn new() -> Self {
        Self {
            base: ComponentBase::new("config_store", "Config Store"),
            tree: Arc::new(RwLock::new(Map::new())),
            watchers: Arc::new(RwLock::new(HashMap::new())),
            config_path: RwLock::new(None),
            update_tx: RwLock::new(None),
            notifier: Mutex::new(None),
            cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// JSON 파일을 읽어 현재 트리를 원자적으로 교체합니다.
    ///
    /// 루트 수준 변경이 구독자에게 통지됩니다.
    pub async fn load(&self, path: impl AsRef<Path>) -> Result<(), SignalpostError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            SignalpostError::from(ConfigError::FileNotFound {
                path: format!("{} ({e})", path.display()),
            })
        })?;

        let parsed: Value =
            serde_json::from_slice(&data).map_err(|e| ConfigError::ParseFailed {
                reason: e.to_string(),
            })?;
        let Value::Object(root) = parsed else {
            return Err(ConfigError::RootNotObject.into());
        };

        {
            let mut tree = self.tree.write().expect("config tree lock poisoned");
            *tree = root;
        }
        *self.config_path.write().expect("config path lock poisoned") =
            Some(path.to_path_buf());

        tracing::info!(path = %path.display(), "configuration loaded");
        self.notify_change("");
        Ok(())
    }

    /// 현재 트리를 JSON 파일로 저장합니다.
    ///
    /// `path`가 `None`이면 마지막으로 `load`한 경로를 사용합니다.
    pub async fn save(&self, path: Option<&Path>) -> Result<(), SignalpostError> {
        let target = match path {
            Some(p) => p.to_path_buf(),
            None => self
                .config_path
                .read()
                .expect("config path lock poisoned")
                .clone()
                .ok_or(ConfigError::NoPathGiven)?,
        };

        let data = {
            let tree = self.tree.read().expect("config tree lock poisoned");
            serde_json::to_string_pretty(&Value::Object(tree.clone()))
                .map_err(|e| ConfigError::ParseFailed {
                    reason: e.to_string(),
                })?
        };

        tokio::fs::write(&target, data).await?;
        tracing::debug!(path = %target.display(), "configuration saved");
        Ok(())
    }

    /// 경로의 값을 조회합니다.
    ///
    /// 빈 경로는 트리 전체를 반환합니다. 경로가 없거나 비객체 값이
    /// 탐색을 가로막으면 `default`를 반환합니다.
    pub fn get(&self, path: &str, default: Value) -> Value {
        let tree = self.tree.read().expect("config tree lock poisoned");
        value_at(&tree, path).unwrap_or(default)
    }

    /// 경로에 값을 설정합니다.
    ///
    /// 중간 객체를 생성하며, 경로 위에 놓인 비객체 값은 객체로
    /// 대체됩니다. 빈 경로에는 객체 값만 허용됩니다 (루트 교체).
    pub fn set(&self, path: &str, value: Value) -> Result<(), SignalpostError> {
        if path.is_empty() {
            let Value::Object(root) = value else {
                return Err(ConfigError::RootNotObject.into());
            };
            {
                let mut tree = self.tree.write().expect("config tree lock poisoned");
                *tree = root;
            }
            metrics::counter!(m::CONFIG_UPDATES_TOTAL).increment(1);
            self.notify_change("");
            return Ok(());
        }

        let parts: Vec<&str> = path.split('.').collect();
        {
            let mut tree = self.tree.write().expect("config tree lock poisoned");
            let mut current: &mut Map<String, Value> = &mut tree;
            for part in &parts[..parts.len() - 1] {
                let slot = current
                    .entry((*part).to_owned())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    // 경로를 가로막는 비객체 값은 객체로 대체
                    *slot = Value::Object(Map::new());
                }
                current = slot.as_object_mut().expect("slot is an object");
            }
            current.insert((*parts.last().expect("parts non-empty")).to_owned(), value);
        }

        metrics::counter!(m::CONFIG_UPDATES_TOTAL).increment(1);
        self.notify_change(path);
        Ok(())
    }

    /// 경로에 변경 구독자를 등록합니다.
    ///
    /// 콜백은 등록 즉시 현재 값(없으면 `Null`)으로 한 번 호출되고,
    /// 이후 해당 경로 또는 모든 상위 경로의 변경마다 호출됩니다.
    pub fn watch(&self, path: impl Into<String>, callback: WatchCallback) {
        let path = path.into();
        let current = self.get(&path, Value::Null);
        {
            let mut watchers = self.watchers.write().expect("watcher lock poisoned");
            watchers.entry(path).or_default().push(Arc::clone(&callback));
        }
        callback(current);
    }

    /// 마지막으로 로드한 설정 파일 경로를 반환합니다.
    pub fn loaded_path(&self) -> Option<PathBuf> {
        self.config_path
            .read()
            .expect("config path lock poisoned")
            .clone()
    }

    fn notify_change(&self, path: &str) {
        let tx = self.update_tx.read().expect("update tx lock poisoned");
        let Some(tx) = tx.as_ref() else {
            // 저장소가 시작되기 전의 변경은 통지 없이 적용됩니다.
            return;
        };
        if tx.try_send(path.to_owned()).is_err() {
            metrics::counter!(m::CONFIG_NOTIFICATIONS_DROPPED_TOTAL).increment(1);
            tracing::debug!(path, "config notification dropped: update channel full");
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 트리에서 점 구분 경로의 값을 조회합니다.
fn value_at(tree: &Map<String, Value>, path: &str) -> Option<Value> {
    if path.is_empty() {
        return Some(Value::Object(tree.clone()));
    }

    let mut current = tree;
    let parts: Vec<&str> = path.split('.').collect();
    for (i, part) in parts.iter().enumerate() {
        let value = current.get(*part)?;
        if i == parts.len() - 1 {
            return Some(value.clone());
        }
        current = value.as_object()?;
    }
    None
}

/// 변경 경로의 모든 프리픽스 구독자에게 현재 값을 전달합니다.
fn deliver_change(
    tree: &Arc<RwLock<Map<String, Value>>>,
    watchers: &Arc<RwLock<WatcherMap>>,
    changed_path: &str,
) {
    let prefixes: Vec<String> = if changed_path.is_empty() {
        vec![String::new()]
    } else {
        let parts: Vec<&str> = changed_path.split('.').collect();
        (0..=parts.len()).map(|i| parts[..i].join(".")).collect()
    };

    for prefix in prefixes {
        let callbacks: Vec<WatchCallback> = {
            let watchers = watchers.read().expect("watcher lock poisoned");
            match watchers.get(&prefix) {
                Some(list) => list.clone(),
                None => continue,
            }
        };

        let value = {
            let tree = tree.read().expect("config tree lock poisoned");
            value_at(&tree, &prefix).unwrap_or(Value::Null)
        };

        for callback in callbacks {
            callback(value.clone());
        }
    }
}

impl Component for ConfigStore {
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
        Box::pin(async move {
            self.base.begin_start()?;

            let (tx, mut rx) = mpsc::channel::<String>(UPDATE_CHANNEL_CAPACITY);
            *self.update_tx.write().expect("update tx lock poisoned") = Some(tx);

            let cancel = CancellationToken::new();
            *self.cancel.write().expect("cancel lock poisoned") = cancel.clone();

            let tree = Arc::clone(&self.tree);
            let watchers = Arc::clone(&self.watchers);
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        changed = rx.recv() => match changed {
                            Some(path) => deliver_change(&tree, &watchers, &path),
                            None => break,
                        },
                    }
                }
                tracing::debug!("config notifier task exiting");
            });
            *self.notifier.lock().expect("notifier lock poisoned") = Some(handle);
            Ok(())
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            self.cancel.read().expect("cancel lock poisoned").cancel();
            *self.update_tx.write().expect("update tx lock poisoned") = None;

            let handle = self.notifier.lock().expect("notifier lock poisoned").take();
            if let Some(handle) = handle {
                let _ = handle.await;
            }

            self.watchers.write().expect("watcher lock poisoned").clear();
            self.base.begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn running_store() -> ConfigStore {
        let store = ConfigStore::new();
        store.initialize().await.unwrap();
        store.start().await.unwrap();
        store
    }

    /// 조건이 참이 될 때까지 폴링합니다 (비동기 통지 테스트용).
    async fn wait_until(check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached within timeout");
    }

    #[test]
    fn get_on_empty_store_returns_default() {
        let store = ConfigStore::new();
        assert_eq!(store.get("missing", json!("fallback")), json!("fallback"));
        assert_eq!(store.get("a.b.c", Value::Null), Value::Null);
    }

    #[test]
    fn set_then_get() {
        let store = ConfigStore::new();
        store.set("system.id", json!("collector-1")).unwrap();
        assert_eq!(store.get("system.id", Value::Null), json!("collector-1"));
        assert_eq!(store.get("system", Value::Null), json!({"id": "collector-1"}));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let store = ConfigStore::new();
        store.set("a.b.c.d", json!(42)).unwrap();
        assert_eq!(store.get("a.b.c.d", Value::Null), json!(42));
        assert!(store.get("a.b", Value::Null).is_object());
    }

    #[test]
    fn set_replaces_non_map_on_path() {
        let store = ConfigStore::new();
        store.set("a", json!("scalar")).unwrap();
        // 경로 위의 스칼라는 객체로 대체됨
        store.set("a.b", json!(1)).unwrap();
        assert_eq!(store.get("a.b", Value::Null), json!(1));
    }

    #[test]
    fn get_blocked_by_non_map_returns_default() {
        let store = ConfigStore::new();
        store.set("a", json!("scalar")).unwrap();
        assert_eq!(store.get("a.b", json!("default")), json!("default"));
    }

    #[test]
    fn set_succeeds_regardless_of_leaf_type() {
        let store = ConfigStore::new();
        store.set("key", json!({"nested": true})).unwrap();
        store.set("key", json!(7)).unwrap();
        assert_eq!(store.get("key", Value::Null), json!(7));
    }

    #[test]
    fn empty_path_get_returns_whole_tree() {
        let store = ConfigStore::new();
        store.set("x", json!(1)).unwrap();
        let tree = store.get("", Value::Null);
        assert_eq!(tree, json!({"x": 1}));
    }

    #[test]
    fn empty_path_set_requires_map() {
        let store = ConfigStore::new();
        assert!(store.set("", json!("not a map")).is_err());
        assert!(store.set("", json!(5)).is_err());

        store.set("", json!({"root": true})).unwrap();
        assert_eq!(store.get("root", Value::Null), json!(true));
    }

    #[test]
    fn empty_path_set_replaces_root() {
        let store = ConfigStore::new();
        store.set("old", json!(1)).unwrap();
        store.set("", json!({"new": 2})).unwrap();
        assert_eq!(store.get("old", Value::Null), Value::Null);
        assert_eq!(store.get("new", Value::Null), json!(2));
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let store = ConfigStore::new();
        store.set("system.id", json!("c1")).unwrap();
        store.set("buffer.max_size", json!(500)).unwrap();
        store.save(Some(&path)).await.unwrap();

        let restored = ConfigStore::new();
        restored.load(&path).await.unwrap();
        assert_eq!(restored.get("", Value::Null), store.get("", Value::Null));
        assert_eq!(restored.loaded_path(), Some(path));
    }

    #[tokio::test]
    async fn save_without_path_uses_loaded_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"a": 1}"#).await.unwrap();

        let store = ConfigStore::new();
        store.load(&path).await.unwrap();
        store.set("a", json!(2)).unwrap();
        store.save(None).await.unwrap();

        let data = tokio::fs::read_to_string(&path).await.unwrap();
        let value: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(value["a"], json!(2));
    }

    #[tokio::test]
    async fn save_without_any_path_fails() {
        let store = ConfigStore::new();
        let err = store.save(None).await.unwrap_err();
        assert!(err.to_string().contains("no config file path"));
    }

    #[tokio::test]
    async fn load_missing_file_fails() {
        let store = ConfigStore::new();
        let err = store.load("/nonexistent/config.json").await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn load_invalid_json_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = ConfigStore::new();
        assert!(store.load(&path).await.is_err());
    }

    #[tokio::test]
    async fn load_non_object_root_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("array.json");
        tokio::fs::write(&path, "[1, 2, 3]").await.unwrap();

        let store = ConfigStore::new();
        assert!(store.load(&path).await.is_err());
    }

    #[tokio::test]
    async fn load_preserves_unknown_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"system": {}, "custom_section": {"x": 1}}"#)
            .await
            .unwrap();

        let store = ConfigStore::new();
        store.load(&path).await.unwrap();
        assert_eq!(store.get("custom_section.x", Value::Null), json!(1));
    }

    #[test]
    fn watch_fires_immediately_with_current_value() {
        let store = ConfigStore::new();
        store.set("system.id", json!("c1")).unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        store.watch(
            "system.id",
            Arc::new(move |v| seen_clone.lock().unwrap().push(v)),
        );

        assert_eq!(*seen.lock().unwrap(), vec![json!("c1")]);
    }

    #[test]
    fn watch_absent_path_fires_with_null() {
        let store = ConfigStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        store.watch("nope", Arc::new(move |v| seen_clone.lock().unwrap().push(v)));
        assert_eq!(*seen.lock().unwrap(), vec![Value::Null]);
    }

    #[tokio::test]
    async fn set_notifies_watcher_on_exact_path() {
        let store = running_store().await;
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        store.watch(
            "system.id",
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(count.load(Ordering::SeqCst), 1); // 즉시 호출

        store.set("system.id", json!("X")).unwrap();
        wait_until(|| count.load(Ordering::SeqCst) == 2).await;

        store.stop().await.unwrap();
    }

    #[tokio::test]
    async fn set_notifies_all_ancestor_watchers() {
        let store = running_store().await;
        let root_seen = Arc::new(Mutex::new(Vec::new()));
        let system_seen = Arc::new(Mutex::new(Vec::new()));
        let id_seen = Arc::new(Mutex::new(Vec::new()));

        let root_clone = Arc::clone(&root_seen);
        store.watch("", Arc::new(move |v| root_clone.lock().unwrap().push(v)));
        let system_clone = Arc::clone(&system_seen);
        store.watch(
            "system",
            Arc::new(move |v| system_clone.lock().unwrap().push(v)),
        );
        let id_clone = Arc::clone(&id_seen);
        store.watch(
            "system.id",
            Arc::new(move |v| id_clone.lock().unwrap().push(v)),
        );

        store.set("system.id", json!("X")).unwrap();

        wait_until(|| id_seen.lock().unwrap().len() == 2).await;
        wait_until(|| system_seen.lock().unwrap().len() == 2).await;
        wait_until(|| root_seen.lock().unwrap().len() == 2).await;

        // 루트 구독자는 변경이 반영된 전체 트리를 관찰
        let root_last = root_seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(root_last["system"]["id"], json!("X"));
        let id_last = id_seen.lock().unwrap().last().cloned().unwrap();
        assert_eq!(id_last, json!("X"));

        store.stop().await.unwrap();
    }

    #[tokio::test]
    async fn sibling_watcher_not_notified() {
        let store = running_store().await;
        let count = Arc::new(AtomicUsize::new(0));

        let count_clone = Arc::clone(&count);
        store.watch(
            "system.version",
            Arc::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );

        store.set("system.id", json!("X")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // 형제 경로 변경으로는 호출되지 않음 (즉시 호출 1회뿐)
        assert_eq!(count.load(Ordering::SeqCst), 1);
        store.stop().await.unwrap();
    }

    #[tokio::test]
    async fn watchers_observe_set_order() {
        let store = running_store().await;
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        store.watch(
            "counter",
            Arc::new(move |v| seen_clone.lock().unwrap().push(v)),
        );

        for i in 0..5 {
            store.set("counter", json!(i)).unwrap();
        }
        wait_until(|| seen.lock().unwrap().len() >= 6).await;

        let values = seen.lock().unwrap().clone();
        assert_eq!(values[0], Value::Null); // 등록 시 초기값
        // set 순서대로 관찰... 마지막 값은 반드시 4
        assert_eq!(values.last().unwrap(), &json!(4));

        store.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_clears_watchers_and_is_idempotent() {
        let store = running_store().await;
        store.watch("x", Arc::new(|_| {}));

        store.stop().await.unwrap();
        store.stop().await.unwrap();
        assert_eq!(store.status(), ComponentStatus::Stopped);
    }

    #[tokio::test]
    async fn set_before_start_applies_without_notification() {
        let store = ConfigStore::new();
        // 시작 전 set은 통지 없이 적용됨
        store.set("early", json!(true)).unwrap();
        assert_eq!(store.get("early", Value::Null), json!(true));
    }
}
