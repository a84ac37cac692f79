//! 批量扫描主流程与并行调度
use anyhow::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::detectors::PatternCatalog;
use crate::options::{BatchStats, ScanOptions};
use crate::session::ScanSession;
use crate::sink::RecordingSink;
use crate::types::FileReport;

/// 扫描单个文件或目录下的文件，并将结果以 JSON 数组流式写入 `out`
/// 稳定性保证：
/// - 文件级：按文件名排序，确保输出顺序可复现
/// - 文件内：事件按扫描顺序记录，每个文件独占一个会话
pub fn scan_and_write(
    input: &Path,
    out: &mut dyn Write,
    opts: &ScanOptions,
    catalog: Arc<PatternCatalog>,
) -> Result<BatchStats> {
    let files = collect_files(input);
    let mut stats = BatchStats::default();

    // 决策：线程数>1 且文件数>1 时走并行调度；否则使用串行扫描
    let threads = opts.threads.unwrap_or_else(num_cpus::get);
    if threads > 1 && files.len() > 1 {
        scan_and_write_parallel(&files, out, opts, &catalog, &mut stats, threads)?;
        return Ok(stats);
    }

    write!(out, "[")?;
    let mut first = true;
    for path in &files {
        let res = scan_file(path, opts, &catalog);
        write_result(out, path, res, &mut first, &mut stats)?;
    }
    write!(out, "]")?;
    Ok(stats)
}

/// 收集输入：文件直接返回；目录只取第一层文件
pub fn collect_files(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }
    let mut files: Vec<PathBuf> = vec![];
    for entry in WalkDir::new(input).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "failed to read directory entry");
                continue;
            }
        };
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    // 按文件名排序，确保输出顺序稳定
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

/// 扫描单个文件；超过大小上限时返回 None
pub fn scan_file(path: &Path, opts: &ScanOptions, catalog: &Arc<PatternCatalog>) -> Result<Option<FileReport>> {
    if let Some(max) = opts.max_file_size {
        if std::fs::metadata(path)?.len() > max {
            debug!(?path, max, "file exceeds max_file_size, skipping");
            return Ok(None);
        }
    }
    let bytes = std::fs::read(path)?;
    Ok(Some(scan_bytes(&path.display().to_string(), bytes, opts, catalog)))
}

/// 对内存中的字节运行一个完整会话
pub fn scan_bytes(label: &str, bytes: Vec<u8>, opts: &ScanOptions, catalog: &Arc<PatternCatalog>) -> FileReport {
    let length = bytes.len();
    let mut session = ScanSession::new(bytes, Arc::clone(catalog), opts.clone()).with_label(label);
    let mut sink = RecordingSink::default();
    let mut passes = Vec::new();

    if opts.passes.includes_dangerous() {
        passes.push(session.scan_dangerous_instructions(&mut sink));
    }
    if opts.passes.includes_quoted() {
        passes.push(session.scan_quoted_literals(opts.quote_kind_filter, &mut sink));
    }

    FileReport {
        file: label.to_string(),
        length,
        marker_offset: session.marker_offset(),
        passes,
        events: sink.into_events(),
        report: session.report(),
    }
}

fn write_result(
    out: &mut dyn Write,
    path: &Path,
    res: Result<Option<FileReport>>,
    first: &mut bool,
    stats: &mut BatchStats,
) -> Result<()> {
    match res {
        Ok(Some(report)) => {
            stats.files_scanned += 1;
            stats.matches_total += report.total_matches();
            stats.reports_written += 1;
            if !*first {
                write!(out, ",")?;
            } else {
                *first = false;
            }
            serde_json::to_writer(&mut *out, &report)?;
        }
        Ok(None) => stats.files_skipped += 1,
        Err(e) => {
            warn!(?path, error = %e, "scan failed");
            stats.files_skipped += 1;
        }
    }
    Ok(())
}

/// 并行调度：
/// - 每个文件一个独立会话，在 Rayon 线程池中执行
/// - 单线程 Writer 按 idx 重排并流式写 JSON，保证稳定顺序
fn scan_and_write_parallel(
    files: &[PathBuf],
    out: &mut dyn Write,
    opts: &ScanOptions,
    catalog: &Arc<PatternCatalog>,
    stats: &mut BatchStats,
    threads: usize,
) -> Result<()> {
    use crossbeam_channel as channel;
    use rayon::prelude::*;
    use std::collections::BTreeMap;

    write!(out, "[")?;
    let mut first = true;

    // 通道用于 worker → writer 传递结果
    type Msg = (usize /*idx*/, Result<Option<FileReport>>);
    let (tx, rx) = channel::bounded::<Msg>(256);

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let catalog = Arc::clone(catalog);
    let opts = opts.clone();
    let files_vec: Vec<(usize, PathBuf)> = files.iter().cloned().enumerate().collect();

    // Writer 保持在当前线程，扫描在后台线程的 Rayon 池内执行
    // Receiver 被丢弃后 send 失败，try_for_each 随之停止派发剩余文件
    let scan_thread = std::thread::spawn(move || {
        pool.install(|| {
            let _ = files_vec
                .par_iter()
                .try_for_each(|(idx, path)| tx.send((*idx, scan_file(path, &opts, &catalog))));
        });
    });

    // Writer：维护 next_idx 与缓存，按序输出
    let mut next_idx: usize = 0;
    let mut pending: BTreeMap<usize, Result<Option<FileReport>>> = BTreeMap::new();
    let mut write_err = None;

    'recv: while let Ok((idx, res)) = rx.recv() {
        pending.insert(idx, res);
        while let Some(res) = pending.remove(&next_idx) {
            if let Err(e) = write_result(out, &files[next_idx], res, &mut first, stats) {
                write_err = Some(e);
                break 'recv;
            }
            next_idx += 1;
        }
    }

    drop(rx);
    if scan_thread.join().is_err() {
        warn!("scan worker thread panicked");
    }
    if let Some(e) = write_err {
        return Err(e);
    }

    // worker 异常退出时可能缺少部分结果：已到达的照常输出，缺失的计为跳过
    for idx in next_idx..files.len() {
        match pending.remove(&idx) {
            Some(res) => write_result(out, &files[idx], res, &mut first, stats)?,
            None => {
                warn!(path = ?files[idx], "no scan result received, counting file as skipped");
                stats.files_skipped += 1;
            }
        }
    }

    write!(out, "]")?;
    Ok(())
}
