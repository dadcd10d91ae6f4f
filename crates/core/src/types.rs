//! 텔레메트리 데이터 모델 — 포인트, 레코드, 배치
//!
//! 시스템 전역에서 사용되는 텔레메트리 데이터 구조를 정의합니다.
//! [`DataPoint`]는 로그/메트릭/트레이스의 닫힌 태그드 variant이며,
//! [`DataBatch`]는 파이프라인을 흐르는 전달 단위입니다.
//!
//! 배치는 소유권 이동으로 전달됩니다. 파이프라인에 제출된 배치는
//! 불변이며, 프로세서는 입력을 수정하지 않고 새 배치를 반환합니다.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ─── TelemetryType ───────────────────────────────────────────────────

/// 텔레메트리 유형 — 배치를 파이프라인으로 라우팅하는 키
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TelemetryType {
    /// 로그 데이터
    Log,
    /// 메트릭 데이터
    Metric,
    /// 트레이스(스팬) 데이터
    Trace,
}

impl fmt::Display for TelemetryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Log => write!(f, "LOG"),
            Self::Metric => write!(f, "METRIC"),
            Self::Trace => write!(f, "TRACE"),
        }
    }
}

impl TelemetryType {
    /// 설정 파일의 파이프라인 섹션 이름에서 유형을 파싱합니다.
    ///
    /// `"logs"`, `"metrics"`, `"traces"`만 인식하며,
    /// 알 수 없는 이름은 `None`을 반환합니다 (호출자가 무시).
    pub fn from_config_name(name: &str) -> Option<Self> {
        match name {
            "logs" => Some(Self::Log),
            "metrics" => Some(Self::Metric),
            "traces" => Some(Self::Trace),
            _ => None,
        }
    }
}

// ─── DataPoint ───────────────────────────────────────────────────────

/// 로그 포인트
#[derive(Debug, Clone)]
pub struct LogPoint {
    /// 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 데이터 출처 (파일 경로, 소켓 주소 등)
    pub origin: String,
    /// 메타데이터 레이블
    pub labels: BTreeMap<String, String>,
    /// 로그 메시지
    pub message: String,
    /// 로그 레벨 (INFO, ERROR 등)
    pub level: String,
    /// 파싱으로 추출된 추가 속성
    pub attributes: Map<String, Value>,
}

/// 메트릭 포인트
#[derive(Debug, Clone)]
pub struct MetricPoint {
    /// 측정 시각
    pub timestamp: DateTime<Utc>,
    /// 데이터 출처
    pub origin: String,
    /// 메타데이터 레이블
    pub labels: BTreeMap<String, String>,
    /// 메트릭 이름
    pub name: String,
    /// 측정값
    pub value: f64,
    /// 메트릭 유형 (counter, gauge 등)
    pub metric_type: String,
    /// 측정 차원
    pub dimensions: BTreeMap<String, String>,
}

/// 트레이스 포인트 (단일 스팬)
#[derive(Debug, Clone)]
pub struct TracePoint {
    /// 기록 시각
    pub timestamp: DateTime<Utc>,
    /// 데이터 출처
    pub origin: String,
    /// 메타데이터 레이블
    pub labels: BTreeMap<String, String>,
    /// 트레이스 ID
    pub trace_id: String,
    /// 스팬 ID
    pub span_id: String,
    /// 부모 스팬 ID (루트면 빈 문자열)
    pub parent_span_id: String,
    /// 스팬 시작 시각
    pub start_time: DateTime<Utc>,
    /// 스팬 종료 시각
    pub end_time: DateTime<Utc>,
}

/// 텔레메트리 데이터 포인트 — 닫힌 variant 집합
///
/// 세 variant는 공통 헤더(`timestamp`, `origin`, `labels`)를 공유하며,
/// [`DataPoint::to_map`]으로 무손실 직렬화 투영을 제공합니다.
/// variant 집합의 열린 확장은 지원하지 않습니다.
#[derive(Debug, Clone)]
pub enum DataPoint {
    /// 로그 엔트리
    Log(LogPoint),
    /// 메트릭 측정값
    Metric(MetricPoint),
    /// 트레이스 스팬
    Trace(TracePoint),
}

impl DataPoint {
    /// 포인트 생성 시각을 반환합니다.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Log(p) => p.timestamp,
            Self::Metric(p) => p.timestamp,
            Self::Trace(p) => p.timestamp,
        }
    }

    /// 데이터 출처를 반환합니다.
    pub fn origin(&self) -> &str {
        match self {
            Self::Log(p) => &p.origin,
            Self::Metric(p) => &p.origin,
            Self::Trace(p) => &p.origin,
        }
    }

    /// 메타데이터 레이블을 반환합니다.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Log(p) => &p.labels,
            Self::Metric(p) => &p.labels,
            Self::Trace(p) => &p.labels,
        }
    }

    /// 이 포인트가 속하는 텔레메트리 유형을 반환합니다.
    pub fn telemetry_type(&self) -> TelemetryType {
        match self {
            Self::Log(_) => TelemetryType::Log,
            Self::Metric(_) => TelemetryType::Metric,
            Self::Trace(_) => TelemetryType::Trace,
        }
    }

    /// 포인트를 JSON 맵으로 무손실 투영합니다.
    ///
    /// 타임스탬프는 RFC3339 문자열로 직렬화됩니다.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("timestamp".to_owned(), rfc3339(self.timestamp()));
        map.insert("origin".to_owned(), Value::String(self.origin().to_owned()));
        map.insert("labels".to_owned(), string_map_value(self.labels()));

        match self {
            Self::Log(p) => {
                map.insert("message".to_owned(), Value::String(p.message.clone()));
                map.insert("level".to_owned(), Value::String(p.level.clone()));
                map.insert("attributes".to_owned(), Value::Object(p.attributes.clone()));
            }
            Self::Metric(p) => {
                map.insert("name".to_owned(), Value::String(p.name.clone()));
                map.insert(
                    "value".to_owned(),
                    serde_json::Number::from_f64(p.value)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                );
                map.insert(
                    "metric_type".to_owned(),
                    Value::String(p.metric_type.clone()),
                );
                map.insert("dimensions".to_owned(), string_map_value(&p.dimensions));
            }
            Self::Trace(p) => {
                map.insert("trace_id".to_owned(), Value::String(p.trace_id.clone()));
                map.insert("span_id".to_owned(), Value::String(p.span_id.clone()));
                map.insert(
                    "parent_span_id".to_owned(),
                    Value::String(p.parent_span_id.clone()),
                );
                map.insert("start_time".to_owned(), rfc3339(p.start_time));
                map.insert("end_time".to_owned(), rfc3339(p.end_time));
            }
        }

        map
    }
}

fn rfc3339(ts: DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn string_map_value(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

// ─── Record ──────────────────────────────────────────────────────────

/// 구조화 이전의 원시 레코드
///
/// 소켓 입력 등 저수준 입력이 생성합니다. 프로세서가 타입 포인트로
/// 변환할 때까지, 또는 패스스루 출력이 그대로 내보낼 때까지
/// 배치에 담겨 운반됩니다.
#[derive(Debug, Clone)]
pub struct Record {
    /// 수집 소스 식별자
    pub source: String,
    /// 수신 시각
    pub timestamp: DateTime<Utc>,
    /// 원시 바이트
    pub raw_data: Bytes,
    /// 수집 시점 속성 (프로토콜, 주소 등)
    pub attributes: Map<String, Value>,
}

impl Record {
    /// 새 레코드를 생성합니다. 수신 시각은 현재 시각입니다.
    pub fn new(source: impl Into<String>, raw_data: Bytes) -> Self {
        Self {
            source: source.into(),
            timestamp: Utc::now(),
            raw_data,
            attributes: Map::new(),
        }
    }

    /// 레코드를 JSON 맵으로 투영합니다. 원시 바이트는 손실 허용
    /// UTF-8 문자열로 변환됩니다.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source".to_owned(), Value::String(self.source.clone()));
        map.insert("timestamp".to_owned(), rfc3339(self.timestamp));
        map.insert(
            "data".to_owned(),
            Value::String(String::from_utf8_lossy(&self.raw_data).into_owned()),
        );
        map.insert("attributes".to_owned(), Value::Object(self.attributes.clone()));
        map
    }
}

// ─── DataBatch ───────────────────────────────────────────────────────

/// 텔레메트리 흐름의 전달 단위
///
/// 같은 유형의 타입 포인트와 구조화 이전 레코드를 담습니다.
/// 배치의 모든 타입 포인트는 `batch_type`과 일치해야 하며,
/// [`DataBatch::push_point`]가 이를 강제합니다.
#[derive(Debug, Clone)]
pub struct DataBatch {
    /// 배치를 생성한 소스 ID
    pub source_id: String,
    /// 배치 텔레메트리 유형 (라우팅 키)
    pub batch_type: TelemetryType,
    /// 배치 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 타입 포인트 목록
    pub points: Vec<DataPoint>,
    /// 원시 레코드 목록
    pub records: Vec<Record>,
    /// 배치 수준 속성
    pub attributes: Map<String, Value>,
}

impl DataBatch {
    /// 지정한 유형의 빈 배치를 생성합니다.
    pub fn new(batch_type: TelemetryType) -> Self {
        Self {
            source_id: String::new(),
            batch_type,
            timestamp: Utc::now(),
            points: Vec::new(),
            records: Vec::new(),
            attributes: Map::new(),
        }
    }

    /// 소스 ID가 지정된 빈 배치를 생성합니다.
    pub fn with_source(batch_type: TelemetryType, source_id: impl Into<String>) -> Self {
        let mut batch = Self::new(batch_type);
        batch.source_id = source_id.into();
        batch
    }

    /// 타입 포인트를 추가합니다.
    ///
    /// 포인트의 유형이 `batch_type`과 다르면 추가하지 않고
    /// `false`를 반환합니다.
    pub fn push_point(&mut self, point: DataPoint) -> bool {
        if point.telemetry_type() != self.batch_type {
            return false;
        }
        self.points.push(point);
        true
    }

    /// 원시 레코드를 추가합니다.
    pub fn push_record(&mut self, record: Record) {
        self.records.push(record);
    }

    /// 타입 포인트 수를 반환합니다. 레코드는 세지 않습니다.
    pub fn size(&self) -> usize {
        self.points.len()
    }

    /// 포인트와 레코드가 모두 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.records.is_empty()
    }

    /// 배치를 JSON 맵으로 투영합니다.
    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source_id".to_owned(), Value::String(self.source_id.clone()));
        map.insert(
            "batch_type".to_owned(),
            Value::String(self.batch_type.to_string()),
        );
        map.insert("timestamp".to_owned(), rfc3339(self.timestamp));
        map.insert(
            "points".to_owned(),
            Value::Array(
                self.points
                    .iter()
                    .map(|p| Value::Object(p.to_map()))
                    .collect(),
            ),
        );
        map.insert(
            "records".to_owned(),
            Value::Array(
                self.records
                    .iter()
                    .map(|r| Value::Object(r.to_map()))
                    .collect(),
            ),
        );
        map.insert("attributes".to_owned(), Value::Object(self.attributes.clone()));
        map
    }
}

impl fmt::Display for DataBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataBatch[{}] type={} points={} records={}",
            self.source_id,
            self.batch_type,
            self.points.len(),
            self.records.len(),
        )
    }
}

// ─── BufferStatus ────────────────────────────────────────────────────

/// 버퍼 상태 스냅샷
///
/// 버퍼 매니저가 관리하는 출력별 큐의 상태입니다.
/// 라이브 뷰가 아닌 스냅샷이며, 조회 시점 이후의 변경을 반영하지 않습니다.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStatus {
    /// 버퍼(출력) ID
    pub buffer_id: String,
    /// 현재 큐에 있는 배치 수
    pub queue_size: usize,
    /// 현재 큐에 있는 타입 포인트 총수
    pub total_items: usize,
    /// 큐가 가득 찼는지 여부
    pub is_full: bool,
    /// 마지막 갱신 시각
    pub last_update: DateTime<Utc>,
}
