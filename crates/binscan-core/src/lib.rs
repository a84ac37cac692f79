//! 二进制流可疑片段扫描与多编码解码核心库
//!
//! 设计要点：
//! - 全程在字节上匹配（`regex-automata` 字节语义），NUL 与非法序列不会导致失败。
//! - 危险指令模式一律强制解码；引号字面量模式受 `[min, max]` 长度阈值约束。
//! - 被跳过的命中先入队，在下一次成功解码前或一轮扫描结束时成批输出。
//! - 统计按 模式 → 编码 两级累计；队列与统计只属于单个会话。

mod options;
mod error;
mod types;
mod findings;
mod detectors;
mod rules;
mod engine_bytes;
mod decoder;
mod suppression;
mod stats;
mod sink;
mod orchestrator;
mod session;
mod scan;

pub use options::{BatchStats, PassSelection, ScanOptions, DEFAULT_ENCODINGS, DEFAULT_MAX_DECODE_LENGTH,
    DEFAULT_MIN_DECODE_LENGTH, DEFAULT_SURROUNDING_BYTES};
pub use error::{ConfigError, PatternError};
pub use types::FileReport;
pub use findings::{DecodeOutcome, DecodeVerdict, EncodingAttempt, MatchSpan, SuppressionNotice, SuppressionReason};
pub use detectors::{DecodeThresholds, PatternCatalog, PatternCategory, PatternId, QuoteKind, RejectedPattern, ScanPattern};
pub use rules::{builtin_specs, display_bytes, escape_bytes, load_pattern_specs, parse_pattern_specs, PatternSpec,
    CURRENTFILE_EEXEC};
pub use engine_bytes::{locate_marker, scan_spans, ContextWindow, SpanIter};
pub use decoder::{Decoder, EncodingRsDecoder, DEFAULT_PREVIEW_CHARS};
pub use suppression::SuppressionQueue;
pub use stats::{EncodingCounts, PatternStats, StatsAggregator, StatsReport};
pub use sink::{NullSink, RecordingSink, ReportSink, SessionEvent};
pub use orchestrator::{DecodeOrchestrator, Processed};
pub use session::{PassSummary, ScanSession, StreamPreview, DANGER_SECTION_TITLE};
pub use scan::{collect_files, scan_and_write, scan_bytes, scan_file};
