//! 解码器接口与基于 encoding_rs 的默认实现
use encoding_rs::Encoding;

use crate::engine_bytes::ContextWindow;
use crate::findings::{DecodeOutcome, DecodeVerdict, EncodingAttempt};

/// 外部解码器
/// - 对任意字节输入（含非法序列）都必须返回结果，失败以 `Failed` 表示，不得 panic
pub trait Decoder {
    fn decode(&self, window: &ContextWindow<'_>, encodings: &[String]) -> DecodeOutcome;
}

/// 预览文本默认截断长度（字符）
pub const DEFAULT_PREVIEW_CHARS: usize = 80;

/// 基于 encoding_rs 的解码器
/// - 未知标签 → Failed
/// - 严格解码（不替换非法序列）成功 → Decoded
/// - 容错解码后替换字符不超过一半 → Forced，否则 Failed
#[derive(Debug, Clone)]
pub struct EncodingRsDecoder {
    preview_chars: usize,
}

impl Default for EncodingRsDecoder {
    fn default() -> Self {
        Self { preview_chars: DEFAULT_PREVIEW_CHARS }
    }
}

impl EncodingRsDecoder {
    fn attempt(&self, label: &str, bytes: &[u8]) -> EncodingAttempt {
        let encoding = match Encoding::for_label(label.trim().as_bytes()) {
            Some(e) => e,
            None => return EncodingAttempt::failed(label),
        };

        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return EncodingAttempt {
                encoding: label.to_string(),
                verdict: DecodeVerdict::Decoded,
                text: Some(self.preview(&text)),
            };
        }

        let (text, _) = encoding.decode_without_bom_handling(bytes);
        let total = text.chars().count();
        let replaced = text.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count();
        if total > 0 && replaced * 2 <= total {
            EncodingAttempt {
                encoding: label.to_string(),
                verdict: DecodeVerdict::Forced,
                text: Some(self.preview(&text)),
            }
        } else {
            EncodingAttempt::failed(label)
        }
    }

    fn preview(&self, text: &str) -> String {
        text.chars()
            .take(self.preview_chars)
            .map(|c| if c.is_control() && c != '\n' && c != '\t' { '.' } else { c })
            .collect()
    }
}

impl Decoder for EncodingRsDecoder {
    fn decode(&self, window: &ContextWindow<'_>, encodings: &[String]) -> DecodeOutcome {
        let bytes = window.matched();
        let attempts = encodings.iter().map(|label| self.attempt(label, bytes)).collect();
        DecodeOutcome { span: window.span, attempts }
    }
}
