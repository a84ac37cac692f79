//! 模式编译与目录（DangerousInstruction / QuotedLiteral）
use regex_automata::meta;
use regex_automata::util::syntax;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{ConfigError, PatternError};
use crate::findings::SuppressionReason;
use crate::options::ScanOptions;
use crate::rules::PatternSpec;

/// 引号字面量的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteKind {
    Backtick,
    Guillemet,
    EscapedDoubleQuote,
    EscapedSingleQuote,
    FrontSlash,
}

impl QuoteKind {
    pub const ALL: [QuoteKind; 5] = [
        QuoteKind::Backtick,
        QuoteKind::Guillemet,
        QuoteKind::EscapedDoubleQuote,
        QuoteKind::EscapedSingleQuote,
        QuoteKind::FrontSlash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteKind::Backtick => "backtick",
            QuoteKind::Guillemet => "guillemet",
            QuoteKind::EscapedDoubleQuote => "escaped_double_quote",
            QuoteKind::EscapedSingleQuote => "escaped_single_quote",
            QuoteKind::FrontSlash => "front_slash",
        }
    }

    /// 用于分节标题的可读名称
    pub fn title(&self) -> &'static str {
        match self {
            QuoteKind::Backtick => "Backtick",
            QuoteKind::Guillemet => "Guillemet",
            QuoteKind::EscapedDoubleQuote => "Escaped double quote",
            QuoteKind::EscapedSingleQuote => "Escaped single quote",
            QuoteKind::FrontSlash => "Front slash",
        }
    }
}

impl fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteKind {
    type Err = ConfigError;

    /// 接受 `escaped_double_quote`、`escaped-double-quote`、`escaped double quote` 等写法
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        QuoteKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownQuoteKind(s.to_string()))
    }
}

/// 模式类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "category", content = "kind", rename_all = "snake_case")]
pub enum PatternCategory {
    DangerousInstruction,
    QuotedLiteral(QuoteKind),
}

impl PatternCategory {
    pub fn quote_kind(&self) -> Option<QuoteKind> {
        match self {
            PatternCategory::QuotedLiteral(kind) => Some(*kind),
            PatternCategory::DangerousInstruction => None,
        }
    }
}

/// 解码长度阈值（闭区间 `[min, max]` 内才会解码）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeThresholds {
    pub min_decode_length: usize,
    pub max_decode_length: usize,
}

impl DecodeThresholds {
    /// 判定给定长度是否应被抑制；返回 None 表示可以解码
    pub fn classify(&self, len: usize) -> Option<SuppressionReason> {
        if len == 0 {
            Some(SuppressionReason::Empty)
        } else if len < self.min_decode_length {
            Some(SuppressionReason::TooSmall)
        } else if len > self.max_decode_length {
            Some(SuppressionReason::TooLarge)
        } else {
            None
        }
    }
}

/// 模式在目录中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PatternId(pub usize);

/// 编译后的扫描模式
#[derive(Debug)]
pub struct ScanPattern {
    id: PatternId,
    name: String,
    label: String,
    category: PatternCategory,
    /// 构造时确定：DangerousInstruction 恒为 true，绕过长度阈值
    force_decode: bool,
    /// 仅 QuotedLiteral 持有
    thresholds: Option<DecodeThresholds>,
    regex: meta::Regex,
}

impl ScanPattern {
    /// 编译单条模式规格
    /// - 字节语义：关闭 Unicode，`.` 匹配任意字节（含换行）
    pub fn compile(id: PatternId, spec: &PatternSpec, defaults: DecodeThresholds) -> Result<Self, PatternError> {
        let regex = build_bytes_regex(&spec.pattern).map_err(|e| PatternError {
            name: spec.name.clone(),
            message: e.to_string(),
        })?;

        let (force_decode, thresholds) = match spec.category {
            PatternCategory::DangerousInstruction => (true, None),
            PatternCategory::QuotedLiteral(_) => {
                let thresholds = DecodeThresholds {
                    min_decode_length: spec.min_decode_length.unwrap_or(defaults.min_decode_length),
                    max_decode_length: spec.max_decode_length.unwrap_or(defaults.max_decode_length),
                };
                if thresholds.min_decode_length > thresholds.max_decode_length {
                    return Err(PatternError {
                        name: spec.name.clone(),
                        message: format!(
                            "min_decode_length {} exceeds max_decode_length {}",
                            thresholds.min_decode_length, thresholds.max_decode_length
                        ),
                    });
                }
                (false, Some(thresholds))
            }
        };

        let label = match (&spec.label, spec.category) {
            (Some(l), _) => l.clone(),
            (None, PatternCategory::QuotedLiteral(kind)) => format!("{} quoted", kind.as_str()),
            (None, PatternCategory::DangerousInstruction) => spec.name.clone(),
        };

        Ok(Self {
            id,
            name: spec.name.clone(),
            label,
            category: spec.category,
            force_decode,
            thresholds,
            regex,
        })
    }

    pub fn id(&self) -> PatternId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn category(&self) -> PatternCategory {
        self.category
    }

    pub fn force_decode(&self) -> bool {
        self.force_decode
    }

    pub fn thresholds(&self) -> Option<DecodeThresholds> {
        self.thresholds
    }

    pub(crate) fn regex(&self) -> &meta::Regex {
        &self.regex
    }

    /// 准入判定：强制解码的模式永不抑制
    pub fn admission(&self, len: usize) -> Option<SuppressionReason> {
        if self.force_decode {
            return None;
        }
        self.thresholds.and_then(|t| t.classify(len))
    }
}

fn build_bytes_regex(pattern: &str) -> Result<meta::Regex, meta::BuildError> {
    meta::Regex::builder()
        .syntax(
            syntax::Config::new()
                .unicode(false)
                .utf8(false)
                .dot_matches_new_line(true),
        )
        .configure(meta::Regex::config().utf8_empty(false))
        .build(pattern)
}

/// 被拒绝（编译失败）的模式及其类别
#[derive(Debug, Clone)]
pub struct RejectedPattern {
    pub category: PatternCategory,
    pub error: PatternError,
}

/// 模式目录：编译后的模式 + 被拒绝的条目
/// - 迭代顺序与声明顺序一致
/// - 不可变，可通过 Arc 在多个会话/线程间共享
#[derive(Debug, Default)]
pub struct PatternCatalog {
    patterns: Vec<ScanPattern>,
    rejected: Vec<RejectedPattern>,
}

impl PatternCatalog {
    /// 从规格列表编译；非法条目只记录，不中断
    pub fn compile(specs: &[PatternSpec], opts: &ScanOptions) -> Self {
        let defaults = opts.thresholds();
        let mut patterns = Vec::with_capacity(specs.len());
        let mut rejected = Vec::new();

        for spec in specs {
            let id = PatternId(patterns.len());
            match ScanPattern::compile(id, spec, defaults) {
                Ok(p) => patterns.push(p),
                Err(error) => {
                    warn!(pattern = %spec.name, %error, "rejecting pattern");
                    rejected.push(RejectedPattern { category: spec.category, error });
                }
            }
        }

        Self { patterns, rejected }
    }

    /// 内置目录
    pub fn builtin(opts: &ScanOptions) -> Self {
        Self::compile(&crate::rules::builtin_specs(), opts)
    }

    pub fn patterns(&self) -> &[ScanPattern] {
        &self.patterns
    }

    pub fn rejected(&self) -> &[RejectedPattern] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn dangerous_instructions(&self) -> impl Iterator<Item = &ScanPattern> {
        self.patterns
            .iter()
            .filter(|p| p.category == PatternCategory::DangerousInstruction)
    }

    /// 指定种类的引号模式；kind 为 None 时返回全部引号模式
    pub fn quoted_literals(&self, kind: Option<QuoteKind>) -> impl Iterator<Item = &ScanPattern> {
        self.patterns.iter().filter(move |p| match (p.category, kind) {
            (PatternCategory::QuotedLiteral(_), None) => true,
            (PatternCategory::QuotedLiteral(k), Some(want)) => k == want,
            _ => false,
        })
    }

    /// 目录中出现过的引号种类（按首次出现顺序）
    pub fn quote_kinds(&self) -> Vec<QuoteKind> {
        let mut kinds: Vec<QuoteKind> = Vec::new();
        for kind in self.patterns.iter().filter_map(|p| p.category.quote_kind()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        for kind in self.rejected.iter().filter_map(|r| r.category.quote_kind()) {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        kinds
    }

    pub(crate) fn rejected_matching(&self, pred: impl Fn(PatternCategory) -> bool) -> Vec<PatternError> {
        self.rejected
            .iter()
            .filter(|r| pred(r.category))
            .map(|r| r.error.clone())
            .collect()
    }
}
