//! 模式目录加载（TOML 文件 + 内置目录）
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::detectors::{PatternCategory, QuoteKind};

/// Type 1 字体加密段的起始标记；引号字面量只在其之后扫描
pub const CURRENTFILE_EEXEC: &[u8] = b"currentfile eexec";

/// PDF 动作/脚本相关键名与脚本调用
const DANGEROUS_INSTRUCTIONS: &[&str] = &[
    "/AA",
    "/AcroForm",
    "/GoToE",
    "/GoToR",
    "/JavaScript",
    "/JS",
    "/Launch",
    "/OpenAction",
    "/RichMedia",
    "/URI",
    "/XFA",
    "eval",
    "exec",
    "system",
];

/// 字节序标记及其可读名称
const BOMS: &[(&[u8], &str)] = &[
    (b"\xEF\xBB\xBF", "UTF-8 BOM"),
    (b"\xFF\xFE\x00\x00", "UTF-32 LE BOM"),
    (b"\x00\x00\xFE\xFF", "UTF-32 BE BOM"),
    (b"\xFF\xFE", "UTF-16 LE BOM"),
    (b"\xFE\xFF", "UTF-16 BE BOM"),
];

/// 目录文件中的类别字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CategoryEntry {
    DangerousInstruction,
    QuotedLiteral,
}

/// 单条模式的配置（支持 pattern 或 regex 字段）
#[derive(Debug, Clone, Deserialize)]
struct PatternEntry {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    pub category: CategoryEntry,
    #[serde(default)]
    pub kind: Option<QuoteKind>,
    #[serde(default)]
    pub min_decode_length: Option<usize>,
    #[serde(default)]
    pub max_decode_length: Option<usize>,
}

/// 顶层目录文件结构
#[derive(Debug, Clone, Deserialize)]
struct PatternFile {
    #[serde(default)]
    pub patterns: Vec<PatternEntry>,
}

/// 归一化后的模式规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    pub name: String,
    pub label: Option<String>,
    pub pattern: String,
    pub category: PatternCategory,
    pub min_decode_length: Option<usize>,
    pub max_decode_length: Option<usize>,
}

/// 从 TOML 目录文件加载并归一化为 PatternSpec 列表
pub fn load_pattern_specs(path: &Path) -> Result<Vec<PatternSpec>> {
    let txt = std::fs::read_to_string(path)?;
    parse_pattern_specs(&txt)
}

/// 解析 TOML 目录文本；缺少模式或引号种类的条目会被跳过
pub fn parse_pattern_specs(txt: &str) -> Result<Vec<PatternSpec>> {
    let parsed: PatternFile = toml::from_str(txt)?;
    let mut out = Vec::new();

    for e in parsed.patterns {
        // 兼容两种字段名：pattern 或 regex
        let pattern = match (e.pattern, e.regex) {
            (Some(p), _) => p,
            (None, Some(r)) => r,
            _ => {
                warn!(name = %e.name, "pattern entry has neither `pattern` nor `regex`, skipping");
                continue;
            }
        };
        let category = match (e.category, e.kind) {
            (CategoryEntry::DangerousInstruction, _) => PatternCategory::DangerousInstruction,
            (CategoryEntry::QuotedLiteral, Some(kind)) => PatternCategory::QuotedLiteral(kind),
            (CategoryEntry::QuotedLiteral, None) => {
                warn!(name = %e.name, "quoted_literal entry has no `kind`, skipping");
                continue;
            }
        };
        out.push(PatternSpec {
            name: e.name,
            label: e.label,
            pattern,
            category,
            min_decode_length: e.min_decode_length,
            max_decode_length: e.max_decode_length,
        });
    }

    Ok(out)
}

/// 内置目录：危险指令（含 BOM）在前，五种引号在后
pub fn builtin_specs() -> Vec<PatternSpec> {
    let mut out = Vec::new();

    for instruction in DANGEROUS_INSTRUCTIONS {
        out.push(dangerous_literal(instruction.as_bytes(), None));
    }
    for (bom, name) in BOMS {
        out.push(dangerous_literal(bom, Some(format!("({name})"))));
    }
    for kind in QuoteKind::ALL {
        out.push(PatternSpec {
            name: kind.as_str().to_string(),
            label: None,
            pattern: quote_regex(kind).to_string(),
            category: PatternCategory::QuotedLiteral(kind),
            min_decode_length: None,
            max_decode_length: None,
        });
    }

    out
}

fn dangerous_literal(bytes: &[u8], label: Option<String>) -> PatternSpec {
    PatternSpec {
        name: display_bytes(bytes),
        label,
        pattern: escape_bytes(bytes),
        category: PatternCategory::DangerousInstruction,
        min_decode_length: None,
        max_decode_length: None,
    }
}

/// 引号正则：捕获组 1 为引号内的字节
fn quote_regex(kind: QuoteKind) -> &'static str {
    match kind {
        QuoteKind::Backtick => r"`(.*?)`",
        QuoteKind::Guillemet => r"\xAB(.*?)\xBB",
        QuoteKind::EscapedDoubleQuote => r#"\\"(.*?)\\""#,
        QuoteKind::EscapedSingleQuote => r"\\'(.*?)\\'",
        QuoteKind::FrontSlash => r"/(.*?)/",
    }
}

/// 把字面量字节转为字节正则：可打印 ASCII 走 regex::escape，其余写成 `\xHH`
pub fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push_str(&regex::escape(&char::from(b).to_string()));
        } else {
            out.push_str(&format!("\\x{:02X}", b));
        }
    }
    out
}

/// 可读化字节：可打印 ASCII 原样输出，其余写成 `\xhh`
pub fn display_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_bytes_handles_meta_and_binary() {
        assert_eq!(escape_bytes(b"/JS"), "/JS");
        assert_eq!(escape_bytes(b"a.b"), r"a\.b");
        assert_eq!(escape_bytes(b"\xEF\xBB\xBF"), r"\xEF\xBB\xBF");
    }

    #[test]
    fn display_bytes_escapes_non_printable() {
        assert_eq!(display_bytes(b"ab\x00\xff"), r"ab\x00\xff");
    }

    #[test]
    fn parses_catalog_with_both_field_names() {
        let txt = r#"
            [[patterns]]
            name = "powershell"
            pattern = "powershell"
            category = "dangerous_instruction"

            [[patterns]]
            name = "pipes"
            regex = '\|(.*?)\|'
            category = "quoted_literal"
            kind = "front_slash"
            max_decode_length = 16

            [[patterns]]
            name = "no-kind"
            pattern = "x"
            category = "quoted_literal"

            [[patterns]]
            name = "no-pattern"
            category = "dangerous_instruction"
        "#;
        let specs = parse_pattern_specs(txt).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].category, PatternCategory::DangerousInstruction);
        assert_eq!(specs[1].pattern, r"\|(.*?)\|");
        assert_eq!(specs[1].category, PatternCategory::QuotedLiteral(QuoteKind::FrontSlash));
        assert_eq!(specs[1].max_decode_length, Some(16));
    }

    #[test]
    fn builtin_specs_label_boms() {
        let specs = builtin_specs();
        let bom = specs.iter().find(|s| s.label.as_deref() == Some("(UTF-8 BOM)")).unwrap();
        assert_eq!(bom.name, r"\xef\xbb\xbf");
        assert_eq!(bom.category, PatternCategory::DangerousInstruction);
        assert_eq!(
            specs.iter().filter(|s| matches!(s.category, PatternCategory::QuotedLiteral(_))).count(),
            QuoteKind::ALL.len()
        );
    }
}
