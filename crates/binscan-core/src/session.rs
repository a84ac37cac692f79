//! 扫描会话：持有缓冲区、模式目录与本会话的队列/统计
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::decoder::{Decoder, EncodingRsDecoder};
use crate::detectors::{PatternCatalog, PatternCategory, QuoteKind, ScanPattern};
use crate::engine_bytes::{locate_marker, scan_spans};
use crate::error::PatternError;
use crate::findings::MatchSpan;
use crate::options::ScanOptions;
use crate::orchestrator::DecodeOrchestrator;
use crate::rules::CURRENTFILE_EEXEC;
use crate::sink::ReportSink;
use crate::stats::{StatsAggregator, StatsReport};
use crate::suppression::SuppressionQueue;

/// 危险指令扫描的分节标题
pub const DANGER_SECTION_TITLE: &str = "Scanning Binary For Anything 'Mad Sus'...";

/// 一轮扫描的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub patterns_scanned: usize,
    pub matches: usize,
    pub decoded: usize,
    pub suppressed: usize,
    /// 本轮本应使用但编译失败的模式
    pub errors: Vec<PatternError>,
}

/// 缓冲区首尾预览
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPreview<'b> {
    pub head: &'b [u8],
    /// 缓冲区足够短时为空，head 即全部内容
    pub tail: &'b [u8],
    pub skipped: usize,
    pub total: usize,
}

impl StreamPreview<'_> {
    pub fn is_complete(&self) -> bool {
        self.skipped == 0 && self.tail.is_empty()
    }
}

/// 扫描会话
/// - 缓冲区不可变，会话独占
/// - 队列与统计只属于本会话，不跨会话共享
pub struct ScanSession {
    buffer: Vec<u8>,
    label: String,
    catalog: Arc<PatternCatalog>,
    options: ScanOptions,
    decoder: Box<dyn Decoder + Send + Sync>,
    marker_offset: Option<usize>,
    queue: SuppressionQueue,
    stats: StatsAggregator,
}

impl ScanSession {
    pub fn new(buffer: Vec<u8>, catalog: Arc<PatternCatalog>, options: ScanOptions) -> Self {
        let marker_offset = locate_marker(&buffer, CURRENTFILE_EEXEC);
        Self {
            buffer,
            label: String::new(),
            catalog,
            options,
            decoder: Box::new(EncodingRsDecoder::default()),
            marker_offset,
            queue: SuppressionQueue::new(),
            stats: StatsAggregator::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_decoder(mut self, decoder: impl Decoder + Send + Sync + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// 标记序列的起始偏移
    pub fn marker_offset(&self) -> Option<usize> {
        self.marker_offset
    }

    /// 引号字面量扫描的起点：标记之后的第一个字节；无标记时为 0
    pub fn quoted_resume_offset(&self) -> usize {
        self.marker_offset
            .map(|at| at + CURRENTFILE_EEXEC.len())
            .unwrap_or(0)
    }

    /// 标记之后的字节；无标记时为整个缓冲区
    pub fn bytes_after_marker(&self) -> &[u8] {
        &self.buffer[self.quoted_resume_offset()..]
    }

    /// 首尾各 `num_bytes` 字节的预览
    pub fn stream_preview(&self, num_bytes: usize) -> StreamPreview<'_> {
        let total = self.buffer.len();
        if num_bytes.saturating_mul(2) >= total {
            return StreamPreview { head: &self.buffer, tail: &[], skipped: 0, total };
        }
        StreamPreview {
            head: &self.buffer[..num_bytes],
            tail: &self.buffer[total - num_bytes..],
            skipped: total - num_bytes * 2,
            total,
        }
    }

    /// 扫描全部危险指令：强制解码，整个缓冲区
    pub fn scan_dangerous_instructions(&mut self, sink: &mut dyn ReportSink) -> PassSummary {
        let catalog = Arc::clone(&self.catalog);
        let mut summary = PassSummary {
            errors: catalog.rejected_matching(|c| c == PatternCategory::DangerousInstruction),
            ..PassSummary::default()
        };
        for error in &summary.errors {
            warn!(%error, "skipping dangerous-instruction pattern");
        }

        sink.begin_section(DANGER_SECTION_TITLE);
        let patterns: Vec<&ScanPattern> = catalog.dangerous_instructions().collect();
        self.run_section(&patterns, 0, sink, &mut summary);

        info!(
            label = %self.label,
            patterns = summary.patterns_scanned,
            matches = summary.matches,
            decoded = summary.decoded,
            "dangerous instruction scan finished"
        );
        summary
    }

    /// 扫描引号字面量：按种类分节，受长度阈值约束，标记之后开始
    /// - `filter` 为 None 时使用配置中的 `quote_kind_filter`，再为 None 则扫描全部种类
    pub fn scan_quoted_literals(&mut self, filter: Option<QuoteKind>, sink: &mut dyn ReportSink) -> PassSummary {
        let catalog = Arc::clone(&self.catalog);
        let filter = filter.or(self.options.quote_kind_filter);
        let resume = self.quoted_resume_offset();
        let kinds: Vec<QuoteKind> = match filter {
            Some(kind) => vec![kind],
            None => catalog.quote_kinds(),
        };

        let mut summary = PassSummary {
            errors: catalog.rejected_matching(|c| match (c, filter) {
                (PatternCategory::QuotedLiteral(_), None) => true,
                (PatternCategory::QuotedLiteral(k), Some(want)) => k == want,
                _ => false,
            }),
            ..PassSummary::default()
        };
        for error in &summary.errors {
            warn!(%error, "skipping quoted-literal pattern");
        }

        for kind in kinds {
            sink.begin_section(&format!("Forcing Decode of {} Quoted Strings", kind.title()));
            let patterns: Vec<&ScanPattern> = catalog.quoted_literals(Some(kind)).collect();
            self.run_section(&patterns, resume, sink, &mut summary);
        }

        info!(
            label = %self.label,
            resume_offset = resume,
            patterns = summary.patterns_scanned,
            matches = summary.matches,
            decoded = summary.decoded,
            "quoted literal scan finished"
        );
        summary
    }

    /// 只提取跨度（不解码、不计数），供外部检查或对比
    pub fn quoted_literal_spans(&self, filter: Option<QuoteKind>) -> Vec<(String, Vec<MatchSpan>)> {
        let resume = self.quoted_resume_offset();
        self.catalog
            .quoted_literals(filter)
            .map(|p| (p.name().to_string(), scan_spans(p, &self.buffer, resume).collect()))
            .collect()
    }

    /// 只提取危险指令跨度
    pub fn dangerous_instruction_spans(&self) -> Vec<(String, Vec<MatchSpan>)> {
        self.catalog
            .dangerous_instructions()
            .map(|p| (p.name().to_string(), scan_spans(p, &self.buffer, 0).collect()))
            .collect()
    }

    pub fn report(&self) -> StatsReport {
        self.stats.report()
    }

    /// 当前尚未冲刷的通知数（一轮扫描结束后恒为 0）
    pub fn pending_notices(&self) -> usize {
        self.queue.len()
    }

    fn run_section(
        &mut self,
        patterns: &[&ScanPattern],
        resume_offset: usize,
        sink: &mut dyn ReportSink,
        summary: &mut PassSummary,
    ) {
        let mut orchestrator = DecodeOrchestrator::new(
            &self.buffer,
            &self.options,
            self.decoder.as_ref(),
            &mut self.queue,
            &mut self.stats,
            sink,
        );
        for pattern in patterns {
            let (matches, decoded) = orchestrator.run(pattern, scan_spans(pattern, &self.buffer, resume_offset));
            summary.patterns_scanned += 1;
            summary.matches += matches;
            summary.decoded += decoded;
            summary.suppressed += matches - decoded;
        }
        orchestrator.finish();
    }
}
