use anyhow::{bail, Context, Result};
use binscan_core::{
    builtin_specs, display_bytes, load_pattern_specs, scan_and_write, BatchStats, PassSelection, PatternCatalog,
    QuoteKind, ScanOptions, ScanSession,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行入口（基于 clap）
#[derive(Parser, Debug)]
#[command(name = "binscan", version, about = "Scan binary blobs for suspicious bytes and force-decode quoted literals")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// 需要执行的扫描轮次
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Only {
    Dangerous,
    Quoted,
}

/// scan 子命令参数
#[derive(Args, Debug)]
struct ScanArgs {
    /// 输入文件或目录
    #[arg(long)]
    input: PathBuf,

    /// 输出文件（JSON 数组）；"-" 表示标准输出
    #[arg(long, default_value = "./binscan-report.json")]
    output: PathBuf,

    /// 配置文件（TOML）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 模式目录文件（TOML）；缺省使用内置目录
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// 引号字面量解码长度上限
    #[arg(long)]
    max_decode_length: Option<usize>,

    /// 引号字面量解码长度下限
    #[arg(long)]
    min_decode_length: Option<usize>,

    /// 只扫描一种引号，例如 backtick、guillemet、escaped_double_quote
    #[arg(long)]
    quote_type: Option<String>,

    /// 解码时命中两侧的上下文字节数
    #[arg(long)]
    surrounding_bytes: Option<usize>,

    /// 候选编码，逗号分隔
    #[arg(long, value_delimiter = ',')]
    encodings: Option<Vec<String>>,

    /// 线程数（"auto"=CPU 核心数）；缺省沿用配置文件
    #[arg(long)]
    threads: Option<String>,

    /// 最大扫描文件大小（字节）
    #[arg(long)]
    max_file_size: Option<u64>,

    /// 只执行某一轮扫描
    #[arg(long, value_enum)]
    only: Option<Only>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 扫描文件（或目录下的文件）并生成 JSON 报告
    Scan(ScanArgs),

    /// 打印文件首尾字节预览
    Preview {
        #[arg(long)]
        input: PathBuf,

        /// 首尾各显示的字节数
        #[arg(long, default_value_t = 80)]
        bytes: usize,
    },
}

fn main() -> Result<()> {
    // 初始化日志（支持通过 RUST_LOG 控制等级，例如 info、debug）
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan(args) => run_scan(&args)?,
        Commands::Preview { input, bytes } => run_preview(&input, bytes)?,
    }

    Ok(())
}

fn run_scan(args: &ScanArgs) -> Result<()> {
    info!(input = ?args.input, output = ?args.output, "starting scan");
    let opts = resolve_options(args)?;

    let specs = match &args.patterns {
        Some(path) => load_pattern_specs(path)
            .with_context(|| format!("load pattern catalog {}", path.display()))?,
        None => builtin_specs(),
    };
    let catalog = Arc::new(PatternCatalog::compile(&specs, &opts));
    if !catalog.rejected().is_empty() {
        warn!(rejected = catalog.rejected().len(), "some patterns failed to compile");
    }

    let stats = if args.output.as_os_str() == "-" {
        write_report(&args.input, std::io::stdout().lock(), &opts, catalog)?
    } else {
        let file = File::create(&args.output).context("create output file")?;
        write_report(&args.input, file, &opts, catalog)?
    };

    info!(
        files_scanned = stats.files_scanned,
        files_skipped = stats.files_skipped,
        matches = stats.matches_total,
        reports_written = stats.reports_written,
        "scan finished"
    );
    Ok(())
}

/// 以缓冲方式按 JSON 数组流式写入；flush 失败视为扫描失败
fn write_report<W: Write>(input: &Path, out: W, opts: &ScanOptions, catalog: Arc<PatternCatalog>) -> Result<BatchStats> {
    let mut out = BufWriter::new(out);
    let stats = scan_and_write(input, &mut out, opts, catalog).context("scan and write failed")?;
    out.flush().context("flush output")?;
    Ok(stats)
}

/// 配置文件打底，命令行参数覆盖，最后统一校验
fn resolve_options(args: &ScanArgs) -> Result<ScanOptions> {
    let mut opts = match &args.config {
        Some(path) => ScanOptions::from_toml_file(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => ScanOptions::default(),
    };
    if let Some(n) = args.max_decode_length { opts.max_decode_length = n; }
    if let Some(n) = args.min_decode_length { opts.min_decode_length = n; }
    if let Some(q) = &args.quote_type { opts.quote_kind_filter = Some(q.parse::<QuoteKind>()?); }
    if let Some(n) = args.surrounding_bytes { opts.surrounding_bytes = n; }
    if let Some(e) = &args.encodings { opts.encodings = e.clone(); }
    if let Some(n) = args.max_file_size { opts.max_file_size = Some(n); }
    if let Some(t) = &args.threads { opts.threads = parse_threads(t)?; }
    if let Some(only) = args.only {
        opts.passes = match only {
            Only::Dangerous => PassSelection::Dangerous,
            Only::Quoted => PassSelection::Quoted,
        };
    }
    opts.validate().context("invalid scan options")?;
    Ok(opts)
}

fn run_preview(input: &Path, bytes: usize) -> Result<()> {
    let data = std::fs::read(input).with_context(|| format!("read {}", input.display()))?;
    let session = ScanSession::new(data, Arc::new(PatternCatalog::default()), ScanOptions::default())
        .with_label(input.display().to_string());
    let preview = session.stream_preview(bytes);

    let mut out = std::io::stdout().lock();
    if preview.is_complete() {
        writeln!(out, "All {} bytes in stream", preview.total)?;
    } else {
        writeln!(out, "First and last {} bytes of {} byte stream", bytes, preview.total)?;
    }
    writeln!(out, "---- BEGIN BYTES ----")?;
    writeln!(out, "{}", display_bytes(preview.head))?;
    if !preview.is_complete() {
        writeln!(out, "\n    <...skip {} bytes...>\n", preview.skipped)?;
        writeln!(out, "{}", display_bytes(preview.tail))?;
    }
    writeln!(out, "---- END BYTES ----")?;
    if let Some(at) = session.marker_offset() {
        writeln!(out, "marker found at offset {at}")?;
    }
    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    // 支持通过环境变量 RUST_LOG 控制日志等级，如：RUST_LOG=debug；日志写 stderr
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 解析线程参数："auto" → None，其余必须是正整数
fn parse_threads(s: &str) -> Result<Option<usize>> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(None);
    }
    match s.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(Some(n)),
        _ => bail!("invalid --threads value `{s}`: expected \"auto\" or a positive integer"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn scan_args(extra: &[&str]) -> ScanArgs {
        let mut argv = vec!["binscan", "scan", "--input", "blob.bin"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).expect("parse args").command {
            Commands::Scan(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempdir().expect("tempdir");
        let config = dir.path().join("binscan.toml");
        fs::write(&config, "max_decode_length = 64\nmin_decode_length = 2\nthreads = 3\nquote_kind_filter = \"backtick\"\n")
            .expect("write config");
        let config = config.to_string_lossy().to_string();

        let opts = resolve_options(&scan_args(&[
            "--config", &config,
            "--max-decode-length", "16",
            "--quote-type", "front slash",
            "--encodings", "utf-8,gb18030",
            "--only", "quoted",
        ]))
        .expect("resolve");
        assert_eq!(opts.max_decode_length, 16);
        assert_eq!(opts.min_decode_length, 2, "untouched keys keep the config value");
        assert_eq!(opts.threads, Some(3), "threads falls back to the config value");
        assert_eq!(opts.quote_kind_filter, Some(QuoteKind::FrontSlash));
        assert_eq!(opts.encodings, vec!["utf-8".to_string(), "gb18030".to_string()]);
        assert_eq!(opts.passes, PassSelection::Quoted);
    }

    #[test]
    fn explicit_auto_threads_clears_config_value() {
        let dir = tempdir().expect("tempdir");
        let config = dir.path().join("binscan.toml");
        fs::write(&config, "threads = 3\n").expect("write config");
        let config = config.to_string_lossy().to_string();

        let opts = resolve_options(&scan_args(&["--config", &config, "--threads", "auto"])).expect("resolve");
        assert_eq!(opts.threads, None);
    }

    #[test]
    fn invalid_threads_value_is_an_error() {
        assert!(resolve_options(&scan_args(&["--threads", "abc"])).is_err());
        assert!(resolve_options(&scan_args(&["--threads", "0"])).is_err());
        assert_eq!(parse_threads("4").expect("valid"), Some(4));
        assert_eq!(parse_threads("AUTO").expect("valid"), None);
    }

    /// 任何写入都失败的输出端
    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_flush_fails_the_scan() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("blob.bin");
        fs::write(&input, b"eval `x`").expect("write blob");
        let opts = ScanOptions { threads: Some(1), ..ScanOptions::default() };
        let catalog = Arc::new(PatternCatalog::compile(&builtin_specs(), &opts));

        let err = write_report(&input, BrokenPipe, &opts, catalog).expect_err("flush error must surface");
        assert!(format!("{err:#}").contains("pipe closed"));
    }

    #[test]
    fn overrides_are_validated_together() {
        let err = resolve_options(&scan_args(&["--min-decode-length", "10", "--max-decode-length", "5"]));
        assert!(err.is_err());
        assert!(resolve_options(&scan_args(&["--quote-type", "smart quote"])).is_err());
    }
}
