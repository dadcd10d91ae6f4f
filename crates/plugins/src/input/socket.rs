//! 소켓 입력 플러그인
//!
//! TCP 또는 UDP 소켓에서 원시 바이트를 수신하여 [`Record`]로
//! 보관하고, `collect()` 호출 시 LOG 배치로 내보냅니다.
//!
//! TCP는 accept 루프와 연결별 리더 태스크로, UDP는 단일 데이터그램
//! 루프로 동작하며 모든 루프는 취소 토큰을 관찰합니다. 네트워크
//! 입력의 표준 패턴입니다: 루프는 소켓 I/O 또는 취소 신호에서
//! 대기하고 취소가 항상 우선합니다.

use std::sync::{Arc, Mutex as StdMutex, RwLock};

use bytes::Bytes;
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use signalpost_core::component::BoxFuture;
use signalpost_core::plugin::CoreApi;
use signalpost_core::{
    Component, ComponentError, ComponentStatus, DataBatch, InputPlugin, Plugin, PluginType,
    Record, SignalpostError, TelemetryType,
};

use crate::base::PluginBase;

/// 기본 프로토콜
const DEFAULT_PROTOCOL: &str = "tcp";

/// 기본 수신 주소
const DEFAULT_ADDRESS: &str = "localhost:8888";

/// 연결 리더의 읽기 버퍼 크기
const READ_BUFFER_SIZE: usize = 4096;

/// 수신 레코드 채널 용량 — 가득 차면 레코드를 드롭합니다.
const RECORD_CHANNEL_CAPACITY: usize = 1024;

/// 소켓 입력 플러그인
pub struct SocketInput {
    base: PluginBase,
    pending: Arc<StdMutex<Vec<Record>>>,
    cancel: RwLock<CancellationToken>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SocketInput {
    /// 새 소켓 입력을 생성합니다.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            base: PluginBase::new(id, "Socket Input", PluginType::Input),
            pending: Arc::new(StdMutex::new(Vec::new())),
            cancel: RwLock::new(CancellationToken::new()),
            tasks: StdMutex::new(Vec::new()),
        }
    }

    fn protocol(&self) -> String {
        self.base.str_value("protocol", DEFAULT_PROTOCOL)
    }

    fn address(&self) -> String {
        self.base.str_value("address", DEFAULT_ADDRESS)
    }

    fn enabled(&self) -> bool {
        self.base.bool_value("enabled", true)
    }
}

/// 수신 바이트를 레코드로 만들어 채널에 넣습니다. 채널이 가득 차면
/// 드롭합니다.
fn push_record(
    tx: &mpsc::Sender<Record>,
    source: &str,
    protocol: &str,
    address: &str,
    data: Bytes,
) {
    let mut record = Record::new(source, data);
    record
        .attributes
        .insert("protocol".to_owned(), json!(protocol));
    record
        .attributes
        .insert("address".to_owned(), json!(address));

    if tx.try_send(record).is_err() {
        tracing::warn!(source, "record channel full, dropping record");
    }
}

/// TCP accept 루프 — 연결마다 리더 태스크를 스폰합니다.
async fn tcp_accept_loop(
    listener: TcpListener,
    tx: mpsc::Sender<Record>,
    source: String,
    address: String,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tracing::debug!(%peer, "socket input accepted connection");
                    let tx = tx.clone();
                    let source = source.clone();
                    let address = address.clone();
                    let cancel = cancel.clone();
                    tokio::spawn(async move {
                        tcp_connection_loop(stream, tx, source, address, cancel).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "socket input accept failed");
                }
            },
        }
    }
}

/// 연결별 리더 — 연결이 닫히거나 취소될 때까지 바이트를 읽습니다.
async fn tcp_connection_loop(
    mut stream: tokio::net::TcpStream,
    tx: mpsc::Sender<Record>,
    source: String,
    address: String,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            read = stream.read(&mut buffer) => match read {
                Ok(0) => break,
                Ok(n) => {
                    push_record(
                        &tx,
                        &source,
                        "tcp",
                        &address,
                        Bytes::copy_from_slice(&buffer[..n]),
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, "socket connection read failed");
                    break;
                }
            },
        }
    }
}

/// UDP 수신 루프 — 데이터그램 하나가 레코드 하나입니다.
async fn udp_recv_loop(
    socket: UdpSocket,
    tx: mpsc::Sender<Record>,
    source: String,
    address: String,
    cancel: CancellationToken,
) {
    let mut buffer = vec![0u8; u16::MAX as usize];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buffer) => match received {
                Ok((0, _)) => {}
                Ok((n, _peer)) => {
                    push_record(
                        &tx,
                        &source,
                        "udp",
                        &address,
                        Bytes::copy_from_slice(&buffer[..n]),
                    );
                }
                Err(e) => {
                    tracing::warn!(error = %e, "socket input udp recv failed");
                    break;
                }
            },
        }
    }
}

/// 레코드 채널을 pending 목록으로 옮기는 수집 태스크
async fn drain_records(
    mut rx: mpsc::Receiver<Record>,
    pending: Arc<StdMutex<Vec<Record>>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => match received {
                Some(record) => pending.lock().expect("pending lock poisoned").push(record),
                None => break,
            },
        }
    }
}

impl Component for SocketInput {
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
        Box::pin(async move { self.base.component().begin_initialize() })
    }

    fn start(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            let protocol = self.protocol();
            let address = self.address();

            let cancel = CancellationToken::new();
            *self.cancel.write().expect("cancel lock poisoned") = cancel.clone();

            let (tx, rx) = mpsc::channel::<Record>(RECORD_CHANNEL_CAPACITY);
            let mut tasks = Vec::new();

            tasks.push(tokio::spawn(drain_records(
                rx,
                Arc::clone(&self.pending),
                cancel.clone(),
            )));

            let source = self.base.id().to_owned();
            match protocol.as_str() {
                "tcp" => {
                    let listener = TcpListener::bind(&address).await.map_err(|e| {
                        self.base.component().fail();
                        SignalpostError::from(ComponentError::InvalidConfig {
                            component: source.clone(),
                            reason: format!("cannot bind tcp {address}: {e}"),
                        })
                    })?;
                    tracing::info!(%address, "socket input listening (tcp)");
                    tasks.push(tokio::spawn(tcp_accept_loop(
                        listener,
                        tx,
                        source,
                        address,
                        cancel.clone(),
                    )));
                }
                "udp" => {
                    let socket = UdpSocket::bind(&address).await.map_err(|e| {
                        self.base.component().fail();
                        SignalpostError::from(ComponentError::InvalidConfig {
                            component: source.clone(),
                            reason: format!("cannot bind udp {address}: {e}"),
                        })
                    })?;
                    tracing::info!(%address, "socket input listening (udp)");
                    tasks.push(tokio::spawn(udp_recv_loop(
                        socket,
                        tx,
                        source,
                        address,
                        cancel.clone(),
                    )));
                }
                other => {
                    self.base.component().fail();
                    return Err(ComponentError::InvalidConfig {
                        component: source,
                        reason: format!("unsupported protocol '{other}'"),
                    }
                    .into());
                }
            }

            *self.tasks.lock().expect("task lock poisoned") = tasks;
            self.base.component().begin_start()
        })
    }

    fn stop(&self) -> BoxFuture<'_, Result<(), SignalpostError>> {
        Box::pin(async move {
            self.cancel.read().expect("cancel lock poisoned").cancel();
            let tasks: Vec<JoinHandle<()>> = self
                .tasks
                .lock()
                .expect("task lock poisoned")
                .drain(..)
                .collect();
            for task in tasks {
                let _ = task.await;
            }
            self.base.component().begin_stop();
            Ok(())
        })
    }

    fn configure(&self, config: Value) -> Result<(), SignalpostError> {
        self.base.configure(config)
    }
}

impl Plugin for SocketInput {
    fn plugin_type(&self) -> PluginType {
        self.base.plugin_type()
    }

    fn validate(&self) -> bool {
        // 명시적으로 비활성화된 플러그인은 유효함
        if !self.enabled() {
            return true;
        }
        matches!(self.protocol().as_str(), "tcp" | "udp")
    }

    fn register_with_core(&self, core: Arc<dyn CoreApi>) -> bool {
        self.base.attach_core(core);
        true
    }
}

impl InputPlugin for SocketInput {
    fn collect(&self) -> BoxFuture<'_, Vec<DataBatch>> {
        Box::pin(async move {
            if !self.enabled() || !self.base.is_running() {
                return Vec::new();
            }

            let records: Vec<Record> = {
                let mut pending = self.pending.lock().expect("pending lock poisoned");
                pending.drain(..).collect()
            };
            if records.is_empty() {
                return Vec::new();
            }

            let mut batch = DataBatch::with_source(TelemetryType::Log, self.base.id());
            for record in records {
                batch.push_record(record);
            }
            vec![batch]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn validate_protocols() {
        let input = SocketInput::new("s");
        input.configure(json!({})).unwrap();
        assert!(input.validate()); // 기본 tcp

        input.configure(json!({"protocol": "udp"})).unwrap();
        assert!(input.validate());

        input.configure(json!({"protocol": "sctp"})).unwrap();
        assert!(!input.validate());

        // 비활성화면 프로토콜과 무관하게 유효
        input
            .configure(json!({"protocol": "sctp", "enabled": false}))
            .unwrap();
        assert!(input.validate());
    }

    #[test]
    fn defaults() {
        let input = SocketInput::new("s");
        input.configure(json!({})).unwrap();
        assert_eq!(input.protocol(), "tcp");
        assert_eq!(input.address(), "localhost:8888");
        assert!(input.enabled());
    }

    #[tokio::test]
    async fn start_with_bad_protocol_fails() {
        let input = SocketInput::new("s");
        input.configure(json!({"protocol": "sctp"})).unwrap();
        input.initialize().await.unwrap();

        assert!(input.start().await.is_err());
        assert_eq!(input.status(), ComponentStatus::Error);
    }

    #[tokio::test]
    async fn tcp_bytes_become_records() {
        let input = SocketInput::new("socket_input");
        input
            .configure(json!({"protocol": "tcp", "address": "127.0.0.1:0"}))
            .unwrap();
        input.initialize().await.unwrap();

        // 포트 0 바인드는 커널이 포트를 할당하므로 직접 바인드해 주소를 얻는다
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);
        input
            .configure(json!({"protocol": "tcp", "address": address.clone()}))
            .unwrap();
        input.start().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(&address).await.unwrap();
        stream.write_all(b"hello socket").await.unwrap();
        stream.flush().await.unwrap();
        drop(stream);

        // 리더 태스크가 레코드를 적재할 때까지 대기
        let mut batches = Vec::new();
        for _ in 0..100 {
            batches = input.collect().await;
            if !batches.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].records.len(), 1);
        assert_eq!(&batches[0].records[0].raw_data[..], b"hello socket");
        assert_eq!(batches[0].records[0].attributes["protocol"], json!("tcp"));

        input.stop().await.unwrap();
        assert_eq!(input.status(), ComponentStatus::Stopped);
    }

    #[tokio::test]
    async fn udp_datagrams_become_records() {
        let input = SocketInput::new("socket_input");

        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = probe.local_addr().unwrap().to_string();
        drop(probe);

        input
            .configure(json!({"protocol": "udp", "address": address.clone()}))
            .unwrap();
        input.initialize().await.unwrap();
        input.start().await.unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"datagram one", &address).await.unwrap();
        sender.send_to(b"datagram two", &address).await.unwrap();

        let mut batches = Vec::new();
        for _ in 0..100 {
            batches = input.collect().await;
            if !batches.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let total: usize = batches.iter().map(|b| b.records.len()).sum();
        assert!(total >= 1);

        input.stop().await.unwrap();
    }

    #[tokio::test]
    async fn disabled_input_collects_nothing() {
        let input = SocketInput::new("s");
        input.configure(json!({"enabled": false})).unwrap();
        input.initialize().await.unwrap();
        // enabled=false여도 start는 바인드를 시도하므로 호출하지 않음
        assert!(input.collect().await.is_empty());
    }

    #[tokio::test]
    async fn collect_without_records_returns_nothing() {
        let input = SocketInput::new("s");
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        input
            .configure(json!({"protocol": "tcp", "address": address}))
            .unwrap();
        input.initialize().await.unwrap();
        input.start().await.unwrap();

        assert!(input.collect().await.is_empty());
        input.stop().await.unwrap();
    }
}
