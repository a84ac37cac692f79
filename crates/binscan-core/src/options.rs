//! 扫描选项与统计信息（模块）
use serde::Deserialize;
use std::path::Path;

use crate::detectors::{DecodeThresholds, QuoteKind};
use crate::error::ConfigError;

/// 超过该长度的引号字面量不做解码（准入上限）
pub const DEFAULT_MAX_DECODE_LENGTH: usize = 256;
/// 低于该长度的引号字面量不做解码
pub const DEFAULT_MIN_DECODE_LENGTH: usize = 0;
/// 解码时在命中两侧额外截取的上下文字节数
pub const DEFAULT_SURROUNDING_BYTES: usize = 64;
/// 默认尝试的候选编码（encoding_rs 标签）
pub const DEFAULT_ENCODINGS: &[&str] = &[
    "utf-8",
    "utf-16le",
    "utf-16be",
    "windows-1252",
    "iso-8859-7",
    "shift_jis",
    "gb18030",
];

/// 需要执行的扫描轮次
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassSelection {
    #[default]
    All,
    Dangerous,
    Quoted,
}

impl PassSelection {
    pub fn includes_dangerous(&self) -> bool {
        matches!(self, PassSelection::All | PassSelection::Dangerous)
    }

    pub fn includes_quoted(&self) -> bool {
        matches!(self, PassSelection::All | PassSelection::Quoted)
    }
}

/// 扫描选项
/// - 可从 TOML 配置文件加载（缺省字段取默认值），CLI 参数再覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanOptions {
    /// 引号字面量解码长度上限（含）
    pub max_decode_length: usize,
    /// 引号字面量解码长度下限（含）
    pub min_decode_length: usize,
    /// 仅扫描某一种引号；None 表示全部
    pub quote_kind_filter: Option<QuoteKind>,
    /// 上下文窗口单侧宽度（字节）
    pub surrounding_bytes: usize,
    /// 候选编码列表
    pub encodings: Vec<String>,
    /// 执行哪些扫描轮次
    pub passes: PassSelection,
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            max_decode_length: DEFAULT_MAX_DECODE_LENGTH,
            min_decode_length: DEFAULT_MIN_DECODE_LENGTH,
            quote_kind_filter: None,
            surrounding_bytes: DEFAULT_SURROUNDING_BYTES,
            encodings: DEFAULT_ENCODINGS.iter().map(|e| e.to_string()).collect(),
            passes: PassSelection::All,
            max_file_size: None,
            threads: None,
        }
    }
}

impl ScanOptions {
    /// 从 TOML 文本解析并校验
    pub fn from_toml_str(txt: &str) -> Result<Self, ConfigError> {
        let opts: ScanOptions = toml::from_str(txt)?;
        opts.validate()?;
        Ok(opts)
    }

    /// 从 TOML 配置文件加载
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_toml_str(&txt)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_decode_length > self.max_decode_length {
            return Err(ConfigError::InvalidThresholds {
                min: self.min_decode_length,
                max: self.max_decode_length,
            });
        }
        if self.encodings.is_empty() {
            return Err(ConfigError::NoEncodings);
        }
        Ok(())
    }

    /// 引号字面量模式的默认阈值
    pub fn thresholds(&self) -> DecodeThresholds {
        DecodeThresholds {
            min_decode_length: self.min_decode_length,
            max_decode_length: self.max_decode_length,
        }
    }
}

/// 批量扫描统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub matches_total: usize,
    pub reports_written: usize,
}
