//! 错误类型
use serde::Serialize;
use thiserror::Error;

/// 单条模式的编译错误
/// - 只对使用该模式的扫描有影响，不会中断会话或其他模式
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("invalid pattern `{name}`: {message}")]
pub struct PatternError {
    pub name: String,
    pub message: String,
}

/// 配置错误（配置文件读取、解析、阈值校验）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("min_decode_length ({min}) is greater than max_decode_length ({max})")]
    InvalidThresholds { min: usize, max: usize },

    #[error("unknown quote type `{0}`")]
    UnknownQuoteKind(String),

    #[error("encoding list is empty")]
    NoEncodings,
}
