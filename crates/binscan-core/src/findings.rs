//! 命中跨度、抑制通知与解码结果
use serde::Serialize;

use crate::detectors::{PatternId, ScanPattern};

/// 单个模式的一次命中
/// - 同一模式产出的跨度起始偏移严格递增且互不重叠
/// - `ordinal` 从 1 开始计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchSpan {
    pub pattern: PatternId,
    pub start: usize,
    pub end: usize,
    pub ordinal: usize,
}

impl MatchSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 跳过解码的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Empty,
    TooSmall,
    TooLarge,
}

/// 被排除在解码之外的命中
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuppressionNotice {
    pub span: MatchSpan,
    pub reason: SuppressionReason,
    pub message: String,
}

impl SuppressionNotice {
    pub fn new(pattern: &ScanPattern, span: MatchSpan, reason: SuppressionReason) -> Self {
        let label = pattern.label();
        let message = match (reason, pattern.thresholds()) {
            (SuppressionReason::Empty, _) => {
                format!("Skipping zero length {label} bytes at position {}", span.start)
            }
            (SuppressionReason::TooSmall, Some(t)) => format!(
                "Too little to attempt decode of {} byte {label} at position {} (--min-decode-length is {} bytes)",
                span.len(),
                span.start,
                t.min_decode_length
            ),
            (SuppressionReason::TooLarge, Some(t)) => format!(
                "Suppressing decode of {} byte {label} at position {} (--max-decode-length is {} bytes)",
                span.len(),
                span.start,
                t.max_decode_length
            ),
            (_, None) => format!("Suppressing decode of {} byte {label} at position {}", span.len(), span.start),
        };
        Self { span, reason, message }
    }
}

/// 单个编码的解码结论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeVerdict {
    /// 严格解码成功
    Decoded,
    /// 只有容错解码才得到可读文本
    Forced,
    /// 无法解码
    Failed,
}

/// 单个编码的一次尝试
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncodingAttempt {
    pub encoding: String,
    pub verdict: DecodeVerdict,
    /// 解码文本预览（仅供展示）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl EncodingAttempt {
    pub fn failed(encoding: &str) -> Self {
        Self { encoding: encoding.to_string(), verdict: DecodeVerdict::Failed, text: None }
    }
}

/// 一次解码的结果；各编码相互独立
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeOutcome {
    pub span: MatchSpan,
    pub attempts: Vec<EncodingAttempt>,
}
