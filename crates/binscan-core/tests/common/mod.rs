//! 集成测试共用的辅助函数

use binscan_core::{
    ContextWindow, DecodeOutcome, DecodeVerdict, Decoder, EncodingAttempt, PatternCatalog, PatternCategory,
    PatternSpec, ScanOptions, ScanSession,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 计数解码器：每个编码都报告成功，并记录调用次数
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CountingDecoder {
    pub calls: Arc<AtomicUsize>,
}

#[allow(dead_code)]
impl CountingDecoder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Decoder for CountingDecoder {
    fn decode(&self, window: &ContextWindow<'_>, encodings: &[String]) -> DecodeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        DecodeOutcome {
            span: window.span,
            attempts: encodings
                .iter()
                .map(|e| EncodingAttempt { encoding: e.clone(), verdict: DecodeVerdict::Decoded, text: None })
                .collect(),
        }
    }
}

/// 使用内置目录的会话
#[allow(dead_code)]
pub fn builtin_session(bytes: &[u8], opts: ScanOptions) -> ScanSession {
    let catalog = Arc::new(PatternCatalog::builtin(&opts));
    ScanSession::new(bytes.to_vec(), catalog, opts)
}

/// 使用给定模式规格的会话
#[allow(dead_code)]
pub fn custom_session(bytes: &[u8], specs: &[PatternSpec], opts: ScanOptions) -> ScanSession {
    let catalog = Arc::new(PatternCatalog::compile(specs, &opts));
    ScanSession::new(bytes.to_vec(), catalog, opts)
}

#[allow(dead_code)]
pub fn spec(name: &str, pattern: &str, category: PatternCategory) -> PatternSpec {
    PatternSpec {
        name: name.to_string(),
        label: None,
        pattern: pattern.to_string(),
        category,
        min_decode_length: None,
        max_decode_length: None,
    }
}
