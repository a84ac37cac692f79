//! 字节级流式扫描器（惰性、可重启）
use aho_corasick::{AhoCorasick, MatchKind};
use regex_automata::util::captures::Captures;
use regex_automata::Input;

use crate::detectors::ScanPattern;
use crate::findings::MatchSpan;

/// 在 `buffer` 中从 `resume_offset` 开始惰性地产出 `pattern` 的命中跨度
/// - 每次调用都是独立的迭代器，无共享游标
/// - 最左优先、互不重叠：下一次搜索从上一次整体匹配的结束处开始
/// - 存在捕获组 1 时以其为跨度，否则取整体匹配；零长度跨度照常产出
/// - `resume_offset` 超出缓冲区时退回从 0 开始
pub fn scan_spans<'p, 'b>(pattern: &'p ScanPattern, buffer: &'b [u8], resume_offset: usize) -> SpanIter<'p, 'b> {
    SpanIter {
        pattern,
        buffer,
        at: if resume_offset > buffer.len() { 0 } else { resume_offset },
        ordinal: 0,
        last_start: None,
        caps: pattern.regex().create_captures(),
        done: false,
    }
}

/// 命中跨度迭代器
pub struct SpanIter<'p, 'b> {
    pattern: &'p ScanPattern,
    buffer: &'b [u8],
    at: usize,
    ordinal: usize,
    last_start: Option<usize>,
    caps: Captures,
    done: bool,
}

impl Iterator for SpanIter<'_, '_> {
    type Item = MatchSpan;

    fn next(&mut self) -> Option<MatchSpan> {
        while !self.done {
            if self.at > self.buffer.len() {
                self.done = true;
                break;
            }
            // 在 [at..] 范围内继续查找下一个匹配
            let input = Input::new(self.buffer).span(self.at..self.buffer.len());
            self.pattern.regex().captures(input, &mut self.caps);
            let m0 = match self.caps.get_match() {
                Some(m) => m,
                None => {
                    self.done = true;
                    break;
                }
            };
            let (start, end) = match self.caps.get_group(1) {
                Some(g1) => (g1.start, g1.end),
                None => (m0.start(), m0.end()),
            };
            // 推进光标，防止零宽循环
            self.at = if m0.end() > m0.start() { m0.end() } else { m0.end() + 1 };

            // 空捕获可能与上一个跨度同起点，保证起始偏移严格递增
            if self.last_start.map_or(false, |last| start <= last) {
                continue;
            }
            self.last_start = Some(start);
            self.ordinal += 1;
            return Some(MatchSpan {
                pattern: self.pattern.id(),
                start,
                end,
                ordinal: self.ordinal,
            });
        }
        None
    }
}

/// 定位标记序列的起始偏移；不存在时返回 None
pub fn locate_marker(buffer: &[u8], marker: &[u8]) -> Option<usize> {
    if marker.is_empty() {
        return None;
    }
    let ac = AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostFirst)
        .build([marker])
        .ok()?;
    ac.find(buffer).map(|m| m.start())
}

/// 命中周围的上下文窗口
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow<'b> {
    /// 窗口字节
    pub bytes: &'b [u8],
    /// 窗口在整个缓冲区中的起始偏移
    pub offset: usize,
    pub span: MatchSpan,
}

impl<'b> ContextWindow<'b> {
    /// 以跨度为中心向两侧各扩展 `surrounding` 字节，并裁剪到缓冲区边界
    pub fn around(buffer: &'b [u8], span: MatchSpan, surrounding: usize) -> Self {
        let end = span.end.min(buffer.len());
        let start = span.start.min(end);
        let ws = start.saturating_sub(surrounding);
        let we = end.saturating_add(surrounding).min(buffer.len());
        let span = MatchSpan { start, end, ..span };
        Self { bytes: &buffer[ws..we], offset: ws, span }
    }

    /// 命中本身的字节
    pub fn matched(&self) -> &'b [u8] {
        &self.bytes[self.span.start - self.offset..self.span.end - self.offset]
    }

    pub fn before(&self) -> &'b [u8] {
        &self.bytes[..self.span.start - self.offset]
    }

    pub fn after(&self) -> &'b [u8] {
        &self.bytes[self.span.end - self.offset..]
    }
}
