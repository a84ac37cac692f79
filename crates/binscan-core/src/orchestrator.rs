//! 解码编排：准入判定、抑制通知、委托解码、统计
use crate::decoder::Decoder;
use crate::detectors::ScanPattern;
use crate::engine_bytes::ContextWindow;
use crate::findings::{DecodeOutcome, MatchSpan, SuppressionNotice, SuppressionReason};
use crate::options::ScanOptions;
use crate::sink::ReportSink;
use crate::stats::StatsAggregator;
use crate::suppression::SuppressionQueue;

/// 单个跨度的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    Decoded(DecodeOutcome),
    Suppressed(SuppressionReason),
}

/// 解码编排器
/// - 队列与统计由会话持有，这里只借用
pub struct DecodeOrchestrator<'a> {
    buffer: &'a [u8],
    options: &'a ScanOptions,
    decoder: &'a dyn Decoder,
    queue: &'a mut SuppressionQueue,
    stats: &'a mut StatsAggregator,
    sink: &'a mut dyn ReportSink,
}

impl<'a> DecodeOrchestrator<'a> {
    pub fn new(
        buffer: &'a [u8],
        options: &'a ScanOptions,
        decoder: &'a dyn Decoder,
        queue: &'a mut SuppressionQueue,
        stats: &'a mut StatsAggregator,
        sink: &'a mut dyn ReportSink,
    ) -> Self {
        Self { buffer, options, decoder, queue, stats, sink }
    }

    /// 处理一个跨度
    /// - 强制解码的模式绕过长度阈值
    /// - 被抑制：入队通知并记录原因
    /// - 可解码：先冲刷队列，再取上下文窗口交给解码器
    pub fn process(&mut self, pattern: &ScanPattern, span: MatchSpan) -> Processed {
        self.stats.record_match(pattern, &span);

        if let Some(reason) = pattern.admission(span.len()) {
            self.queue.append(SuppressionNotice::new(pattern, span, reason));
            self.stats.record_suppressed(pattern, &span, reason);
            return Processed::Suppressed(reason);
        }

        self.queue.flush(&mut *self.sink);
        let window = ContextWindow::around(self.buffer, span, self.options.surrounding_bytes);
        let outcome = self.decoder.decode(&window, &self.options.encodings);
        self.stats.record_decoded(pattern, &outcome);
        self.sink.decoded(pattern, &window, &outcome);
        Processed::Decoded(outcome)
    }

    /// 处理一个模式的全部跨度；返回 (命中数, 解码数)
    pub fn run<I>(&mut self, pattern: &ScanPattern, spans: I) -> (usize, usize)
    where
        I: IntoIterator<Item = MatchSpan>,
    {
        self.stats.register(pattern);
        let mut matches = 0;
        let mut decoded = 0;
        for span in spans {
            matches += 1;
            if let Processed::Decoded(_) = self.process(pattern, span) {
                decoded += 1;
            }
        }
        if matches == 0 {
            self.sink.pattern_not_found(pattern);
        }
        (matches, decoded)
    }

    /// 结束本轮：冲刷尾部通知
    pub fn finish(self) -> usize {
        self.queue.flush(self.sink)
    }
}
