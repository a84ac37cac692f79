//! 抑制通知队列（先进先出，批量冲刷）
use tracing::debug;

use crate::findings::SuppressionNotice;
use crate::sink::ReportSink;

/// 被跳过命中的通知队列
/// - 下一次成功解码前必须先冲刷，保证输出按时间顺序可读
/// - 一轮扫描结束时也要冲刷一次，尾部通知不会丢失
#[derive(Debug, Default)]
pub struct SuppressionQueue {
    pending: Vec<SuppressionNotice>,
}

impl SuppressionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, notice: SuppressionNotice) {
        debug!(position = notice.span.start, reason = ?notice.reason, "queueing suppression notice");
        self.pending.push(notice);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 把全部待发通知作为一个批次交给 sink 并清空队列；队列为空时不做任何事
    /// 返回本次冲刷的通知数
    pub fn flush(&mut self, sink: &mut dyn ReportSink) -> usize {
        if self.pending.is_empty() {
            return 0;
        }
        // 先清空队列再交给 sink
        let batch = std::mem::take(&mut self.pending);
        let count = batch.len();
        debug!(count, "flushing suppression notices");
        sink.suppression_batch(batch);
        count
    }
}
