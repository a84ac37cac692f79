//! 按模式、按编码的解码统计
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::detectors::{PatternCategory, PatternId, ScanPattern};
use crate::findings::{DecodeOutcome, DecodeVerdict, MatchSpan, SuppressionReason};

/// 单个编码的累计结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EncodingCounts {
    pub encoding: String,
    pub decoded: usize,
    pub forced: usize,
    pub failed: usize,
}

impl EncodingCounts {
    fn zeroed(encoding: &str) -> Self {
        Self { encoding: encoding.to_string(), ..Self::default() }
    }

    fn bump(&mut self, verdict: DecodeVerdict) {
        match verdict {
            DecodeVerdict::Decoded => self.decoded += 1,
            DecodeVerdict::Forced => self.forced += 1,
            DecodeVerdict::Failed => self.failed += 1,
        }
    }
}

/// 单个模式在本会话中的统计
/// 不变式：`match_count == matches_decoded + skipped_empty + skipped_too_small + skipped_too_large`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternStats {
    pub pattern: String,
    pub label: String,
    pub category: PatternCategory,
    pub match_count: usize,
    pub bytes_matched: usize,
    pub matches_decoded: usize,
    pub skipped_empty: usize,
    pub skipped_too_small: usize,
    pub skipped_too_large: usize,
    /// 被跳过命中的长度直方图（长度 → 次数）
    pub skipped_lengths: BTreeMap<usize, usize>,
    /// 第二层：按首次出现顺序排列的编码计数
    pub encodings: Vec<EncodingCounts>,
}

impl PatternStats {
    fn zeroed(pattern: &ScanPattern) -> Self {
        Self {
            pattern: pattern.name().to_string(),
            label: pattern.label().to_string(),
            category: pattern.category(),
            match_count: 0,
            bytes_matched: 0,
            matches_decoded: 0,
            skipped_empty: 0,
            skipped_too_small: 0,
            skipped_too_large: 0,
            skipped_lengths: BTreeMap::new(),
            encodings: Vec::new(),
        }
    }

    pub fn skipped(&self) -> usize {
        self.skipped_empty + self.skipped_too_small + self.skipped_too_large
    }

    /// 计数是否满足会计恒等式
    pub fn is_balanced(&self) -> bool {
        self.match_count == self.matches_decoded + self.skipped()
    }

    pub fn encoding(&self, name: &str) -> Option<&EncodingCounts> {
        self.encodings.iter().find(|e| e.encoding == name)
    }

    /// 首次访问时以零值初始化
    fn encoding_entry(&mut self, name: &str) -> &mut EncodingCounts {
        let idx = match self.encodings.iter().position(|e| e.encoding == name) {
            Some(idx) => idx,
            None => {
                self.encodings.push(EncodingCounts::zeroed(name));
                self.encodings.len() - 1
            }
        };
        &mut self.encodings[idx]
    }
}

/// 两级统计表：模式 → 编码 → 计数
/// - 模式按首次登记顺序排列
#[derive(Debug, Default, Clone)]
pub struct StatsAggregator {
    entries: Vec<PatternStats>,
    index: HashMap<PatternId, usize>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记模式（零值），用于让未命中的模式也出现在报告中
    pub fn register(&mut self, pattern: &ScanPattern) {
        self.entry(pattern);
    }

    /// 每个跨度恰好调用一次，无论结果如何
    pub fn record_match(&mut self, pattern: &ScanPattern, span: &MatchSpan) {
        let stats = self.entry(pattern);
        stats.match_count += 1;
        stats.bytes_matched += span.len();
    }

    pub fn record_suppressed(&mut self, pattern: &ScanPattern, span: &MatchSpan, reason: SuppressionReason) {
        let stats = self.entry(pattern);
        match reason {
            SuppressionReason::Empty => stats.skipped_empty += 1,
            SuppressionReason::TooSmall => stats.skipped_too_small += 1,
            SuppressionReason::TooLarge => stats.skipped_too_large += 1,
        }
        *stats.skipped_lengths.entry(span.len()).or_insert(0) += 1;
    }

    /// 累加，不覆盖
    pub fn record_decoded(&mut self, pattern: &ScanPattern, outcome: &DecodeOutcome) {
        let stats = self.entry(pattern);
        stats.matches_decoded += 1;
        for attempt in &outcome.attempts {
            stats.encoding_entry(&attempt.encoding).bump(attempt.verdict);
        }
    }

    pub fn get(&self, id: PatternId) -> Option<&PatternStats> {
        self.index.get(&id).map(|&i| &self.entries[i])
    }

    /// 只读快照：有命中的模式在前，未命中的模式单列在后，各自保持登记顺序
    pub fn report(&self) -> StatsReport {
        let (found, not_found): (Vec<_>, Vec<_>) =
            self.entries.iter().cloned().partition(|s| s.match_count > 0);
        StatsReport { found, not_found }
    }

    fn entry(&mut self, pattern: &ScanPattern) -> &mut PatternStats {
        let idx = match self.index.get(&pattern.id()) {
            Some(&idx) => idx,
            None => {
                let idx = self.entries.len();
                self.entries.push(PatternStats::zeroed(pattern));
                self.index.insert(pattern.id(), idx);
                idx
            }
        };
        &mut self.entries[idx]
    }
}

/// 统计快照
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub found: Vec<PatternStats>,
    pub not_found: Vec<PatternStats>,
}

impl StatsReport {
    /// 按展示顺序遍历：先有命中的，再未命中的
    pub fn iter(&self) -> impl Iterator<Item = &PatternStats> {
        self.found.iter().chain(self.not_found.iter())
    }

    pub fn total_matches(&self) -> usize {
        self.found.iter().map(|s| s.match_count).sum()
    }

    pub fn find(&self, pattern: &str) -> Option<&PatternStats> {
        self.iter().find(|s| s.pattern == pattern)
    }
}
