//! 展示层边界：扫描过程中产生的事件
use serde::Serialize;

use crate::detectors::ScanPattern;
use crate::engine_bytes::ContextWindow;
use crate::findings::{DecodeOutcome, SuppressionNotice};
use crate::rules::display_bytes;

/// 展示层接收端（只读消费，渲染格式由实现决定）
pub trait ReportSink {
    /// 新的扫描分节开始
    fn begin_section(&mut self, _title: &str) {}

    /// 一批被跳过的命中（按入队顺序）
    fn suppression_batch(&mut self, _notices: Vec<SuppressionNotice>) {}

    /// 一次解码完成
    fn decoded(&mut self, _pattern: &ScanPattern, _window: &ContextWindow<'_>, _outcome: &DecodeOutcome) {}

    /// 某模式在本轮中没有任何命中
    fn pattern_not_found(&mut self, _pattern: &ScanPattern) {}
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ReportSink for NullSink {}

/// 可序列化的会话事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Section { title: String },
    Suppressed { notices: Vec<SuppressionNotice> },
    Decoded {
        pattern: String,
        offset: usize,
        before: String,
        matched: String,
        after: String,
        outcome: DecodeOutcome,
    },
    NotFound { pattern: String },
}

/// 记录全部事件，供批量输出或测试断言
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    events: Vec<SessionEvent>,
}

impl RecordingSink {
    pub fn events(&self) -> &[SessionEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SessionEvent> {
        self.events
    }
}

impl ReportSink for RecordingSink {
    fn begin_section(&mut self, title: &str) {
        self.events.push(SessionEvent::Section { title: title.to_string() });
    }

    fn suppression_batch(&mut self, notices: Vec<SuppressionNotice>) {
        self.events.push(SessionEvent::Suppressed { notices });
    }

    fn decoded(&mut self, pattern: &ScanPattern, window: &ContextWindow<'_>, outcome: &DecodeOutcome) {
        self.events.push(SessionEvent::Decoded {
            pattern: pattern.name().to_string(),
            offset: window.span.start,
            before: display_bytes(window.before()),
            matched: display_bytes(window.matched()),
            after: display_bytes(window.after()),
            outcome: outcome.clone(),
        });
    }

    fn pattern_not_found(&mut self, pattern: &ScanPattern) {
        self.events.push(SessionEvent::NotFound { pattern: pattern.name().to_string() });
    }
}
