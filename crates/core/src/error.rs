//! 에러 타입 — 도메인별 에러 정의

/// Signalpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SignalpostError {
    /// 컴포넌트 생명주기 에러
    #[error("component error: {0}")]
    Component(#[from] ComponentError),

    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 플러그인 관리 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 파이프라인 구성/처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 컴포넌트 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// 허용되지 않은 상태 전환
    #[error("invalid transition for '{component}': {operation} called in state {from}")]
    InvalidTransition {
        component: String,
        from: String,
        operation: String,
    },

    /// 유효하지 않은 컴포넌트 설정
    #[error("invalid config for '{component}': {reason}")]
    InvalidConfig { component: String, reason: String },
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 루트 설정은 객체여야 함
    #[error("root config value must be a JSON object")]
    RootNotObject,

    /// 저장 경로 미지정 (load된 적도 없음)
    #[error("no config file path specified")]
    NoPathGiven,
}

/// 플러그인 관리 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 동일 ID의 플러그인이 이미 등록됨
    #[error("plugin already registered: {id}")]
    AlreadyRegistered { id: String },

    /// 플러그인을 찾을 수 없음
    #[error("plugin not found: {id}")]
    NotFound { id: String },

    /// 플러그인 설정 검증 실패
    #[error("plugin validation failed: {id}")]
    ValidationFailed { id: String },

    /// 플러그인의 코어 연결 실패
    #[error("plugin failed to register with core: {id}")]
    RegistrationFailed { id: String },

    /// 알 수 없는 플러그인 이름
    #[error("unknown {plugin_type} plugin: {name}")]
    UnknownPlugin { plugin_type: String, name: String },
}

/// 파이프라인 구성/처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 빈 프로세서 목록으로 파이프라인 생성 시도
    #[error("no processors specified for pipeline")]
    EmptyProcessorList,

    /// 프로세서 플러그인을 찾을 수 없음
    #[error("processor plugin not found: {id}")]
    ProcessorNotFound { id: String },

    /// 프로세서가 아닌 플러그인을 체인에 연결 시도
    #[error("plugin is not a processor: {id}")]
    NotAProcessor { id: String },
}
