//! 公共类型（对外暴露）
use serde::Serialize;

use crate::session::PassSummary;
use crate::sink::SessionEvent;
use crate::stats::StatsReport;

/// 单个文件的扫描报告（对应输出 JSON 数组的单个元素）
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub length: usize,
    pub marker_offset: Option<usize>,
    pub passes: Vec<PassSummary>,
    pub events: Vec<SessionEvent>,
    pub report: StatsReport,
}

impl FileReport {
    pub fn total_matches(&self) -> usize {
        self.passes.iter().map(|p| p.matches).sum()
    }
}
