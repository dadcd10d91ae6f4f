//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 컴포넌트는 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::gauge!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `signalpost_`
//! - 컴포넌트명: `core_`, `event_bus_`, `buffer_`, `config_`, `input_`, `output_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ──────────────────────────────────────────────────

/// 이벤트 유형 레이블 키
pub const LABEL_EVENT_TYPE: &str = "event_type";

/// 텔레메트리 유형 레이블 키 (LOG, METRIC, TRACE)
pub const LABEL_TELEMETRY_TYPE: &str = "telemetry_type";

/// 입력 플러그인 레이블 키
pub const LABEL_INPUT: &str = "input";

/// 출력 플러그인 레이블 키
pub const LABEL_OUTPUT: &str = "output";

// ─── Core 메트릭 ─────────────────────────────────────────────────────

/// Core: 파이프라인에 제출된 배치 수 (counter)
pub const CORE_BATCHES_RECEIVED_TOTAL: &str = "signalpost_core_batches_received_total";

/// Core: 파이프라인 처리를 통과한 배치 수 (counter)
pub const CORE_BATCHES_PROCESSED_TOTAL: &str = "signalpost_core_batches_processed_total";

/// Core: 파이프라인에서 드롭된 배치 수 (counter)
pub const CORE_BATCHES_DROPPED_TOTAL: &str = "signalpost_core_batches_dropped_total";

// ─── Event Bus 메트릭 ────────────────────────────────────────────────

/// Event Bus: 발행된 이벤트 수 (counter, label: event_type)
pub const EVENT_BUS_EVENTS_PUBLISHED_TOTAL: &str = "signalpost_event_bus_events_published_total";

// ─── Buffer 메트릭 ───────────────────────────────────────────────────

/// Buffer: 버퍼링된 배치 수 (counter, label: output)
pub const BUFFER_BATCHES_BUFFERED_TOTAL: &str = "signalpost_buffer_batches_buffered_total";

/// Buffer: 백프레셔로 거부된 배치 수 (counter, label: output)
pub const BUFFER_REJECTIONS_TOTAL: &str = "signalpost_buffer_rejections_total";

/// Buffer: 출력별 현재 큐 길이 (gauge, label: output)
pub const BUFFER_QUEUE_SIZE: &str = "signalpost_buffer_queue_size";

// ─── Config 메트릭 ───────────────────────────────────────────────────

/// Config: 적용된 설정 변경 수 (counter)
pub const CONFIG_UPDATES_TOTAL: &str = "signalpost_config_updates_total";

/// Config: 알림 채널 포화로 드롭된 변경 통지 수 (counter)
pub const CONFIG_NOTIFICATIONS_DROPPED_TOTAL: &str =
    "signalpost_config_notifications_dropped_total";

// ─── Input / Output 메트릭 ───────────────────────────────────────────

/// Input: 수집된 배치 수 (counter, label: input)
pub const INPUT_BATCHES_COLLECTED_TOTAL: &str = "signalpost_input_batches_collected_total";

/// Output: 전송 성공 배치 수 (counter, label: output)
pub const OUTPUT_BATCHES_SENT_TOTAL: &str = "signalpost_output_batches_sent_total";

/// Output: 전송 실패 배치 수 (counter, label: output)
pub const OUTPUT_SEND_FAILURES_TOTAL: &str = "signalpost_output_send_failures_total";

// ─── Daemon 메트릭 ───────────────────────────────────────────────────

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "signalpost_daemon_build_info";

/// Daemon: 기동 후 경과 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "signalpost_daemon_uptime_seconds";

/// Daemon: 등록된 플러그인 수 (gauge)
pub const DAEMON_PLUGINS_REGISTERED: &str = "signalpost_daemon_plugins_registered";

/// 모든 메트릭의 설명을 recorder에 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        CORE_BATCHES_RECEIVED_TOTAL,
        "Batches submitted to the processing pipeline"
    );
    describe_counter!(
        CORE_BATCHES_PROCESSED_TOTAL,
        "Batches that passed pipeline processing"
    );
    describe_counter!(
        CORE_BATCHES_DROPPED_TOTAL,
        "Batches dropped by pipeline processing"
    );
    describe_counter!(
        EVENT_BUS_EVENTS_PUBLISHED_TOTAL,
        "Events published on the event bus"
    );
    describe_counter!(
        BUFFER_BATCHES_BUFFERED_TOTAL,
        "Batches accepted into per-output buffers"
    );
    describe_counter!(
        BUFFER_REJECTIONS_TOTAL,
        "Batches rejected because an output buffer was full"
    );
    describe_gauge!(BUFFER_QUEUE_SIZE, "Current queue length per output buffer");
    describe_counter!(CONFIG_UPDATES_TOTAL, "Applied configuration changes");
    describe_counter!(
        CONFIG_NOTIFICATIONS_DROPPED_TOTAL,
        "Config change notifications dropped due to a saturated channel"
    );
    describe_counter!(
        INPUT_BATCHES_COLLECTED_TOTAL,
        "Batches collected from input plugins"
    );
    describe_counter!(
        OUTPUT_BATCHES_SENT_TOTAL,
        "Batches successfully sent by output plugins"
    );
    describe_counter!(
        OUTPUT_SEND_FAILURES_TOTAL,
        "Batches that failed to send at an output plugin"
    );
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (constant 1)");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_PLUGINS_REGISTERED, "Plugins registered with the core");
}
