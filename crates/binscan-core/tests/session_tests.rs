mod common;

use binscan_core::{
    NullSink, PatternCategory, QuoteKind, RecordingSink, ScanOptions, SessionEvent,
    SuppressionReason, CURRENTFILE_EEXEC, DANGER_SECTION_TITLE,
};
use common::{builtin_session, custom_session, spec, CountingDecoder};

fn marker_buffer(tail: &[u8]) -> Vec<u8> {
    let mut buf = vec![b'x'; 20];
    buf.extend_from_slice(CURRENTFILE_EEXEC);
    buf.extend_from_slice(tail);
    buf
}

#[test]
fn backtick_literals_after_marker() {
    let buf = marker_buffer(b"`abc``de`");
    let mut session = builtin_session(&buf, ScanOptions::default());
    let resume = 20 + CURRENTFILE_EEXEC.len();
    assert_eq!(session.quoted_resume_offset(), resume);

    let spans = session.quoted_literal_spans(Some(QuoteKind::Backtick));
    assert_eq!(spans.len(), 1);
    let lengths: Vec<usize> = spans[0].1.iter().map(|s| s.len()).collect();
    assert_eq!(lengths, vec![3, 2]);
    assert!(spans[0].1.iter().all(|s| s.start > resume));

    let summary = session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut NullSink);
    assert_eq!(summary.matches, 2);
    assert_eq!(summary.decoded, 2);
    let report = session.report();
    let stats = report.find("backtick").expect("backtick stats");
    assert_eq!(stats.match_count, 2);
    assert_eq!(stats.bytes_matched, 5);
    assert_eq!(stats.matches_decoded, 2);
}

#[test]
fn oversized_literal_is_suppressed_without_decoding() {
    let opts = ScanOptions { max_decode_length: 5, ..ScanOptions::default() };
    let decoder = CountingDecoder::default();
    let mut session = builtin_session(b"`0123456789`", opts).with_decoder(decoder.clone());
    let mut sink = RecordingSink::default();

    let summary = session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut sink);
    assert_eq!(summary.matches, 1);
    assert_eq!(summary.suppressed, 1);
    assert_eq!(decoder.calls(), 0, "decoder must not see suppressed spans");
    assert_eq!(session.pending_notices(), 0, "trailing notices are flushed at pass end");

    let stats = session.report().find("backtick").cloned().expect("backtick stats");
    assert_eq!(stats.skipped_too_large, 1);
    assert_eq!(stats.skipped_lengths.get(&10), Some(&1));

    let notices: Vec<_> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Suppressed { notices } => Some(notices.clone()),
            _ => None,
        })
        .flatten()
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].reason, SuppressionReason::TooLarge);
    assert!(notices[0].message.contains("--max-decode-length is 5 bytes"));
}

#[test]
fn dangerous_zero_length_capture_is_force_decoded() {
    let specs = vec![spec("eval-call", r"eval\((.*?)\)", PatternCategory::DangerousInstruction)];
    let mut session = custom_session(b"eval()", &specs, ScanOptions::default());

    let summary = session.scan_dangerous_instructions(&mut NullSink);
    assert_eq!(summary.matches, 1);
    assert_eq!(summary.decoded, 1);

    let stats = session.report().find("eval-call").cloned().expect("stats");
    assert_eq!(stats.match_count, 1);
    assert_eq!(stats.bytes_matched, 0);
    assert_eq!(stats.matches_decoded, 1);
    assert_eq!(stats.skipped_empty, 0);
}

#[test]
fn dangerous_scan_ignores_marker() {
    let mut buf = b"exec ".to_vec();
    buf.extend_from_slice(CURRENTFILE_EEXEC);
    buf.extend_from_slice(b" /`q`/");
    let session = builtin_session(&buf, ScanOptions::default());
    let resume = session.quoted_resume_offset();

    let dangerous = session.dangerous_instruction_spans();
    let exec = &dangerous.iter().find(|(name, _)| name == "exec").expect("exec pattern").1;
    assert!(exec.iter().any(|s| s.start < resume));
    assert_eq!(exec.len(), 2, "standalone exec plus the one inside eexec");

    for (_, spans) in session.quoted_literal_spans(None) {
        assert!(spans.iter().all(|s| s.start >= resume));
    }
}

#[test]
fn quoted_scan_is_deterministic() {
    let buf = marker_buffer(b"\\\"a\\\" /bc/ \xabde\xbb \\'f\\' `g`");
    let mut session = builtin_session(&buf, ScanOptions::default());
    let first = session.quoted_literal_spans(None);
    session.scan_quoted_literals(None, &mut NullSink);
    let second = session.quoted_literal_spans(None);
    assert_eq!(first, second);
    assert!(first.iter().all(|(_, spans)| spans.len() == 1));
}

#[test]
fn rescanning_accumulates_stats() {
    let mut session = builtin_session(b"`ab`", ScanOptions::default());
    session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut NullSink);
    session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut NullSink);
    let stats = session.report().find("backtick").cloned().expect("stats");
    assert_eq!(stats.match_count, 2);
    assert_eq!(stats.matches_decoded, 2);
    assert_eq!(stats.encoding("utf-8").map(|e| e.decoded), Some(2));
}

#[test]
fn decoder_failures_are_recorded_per_encoding() {
    let opts = ScanOptions {
        encodings: vec!["utf-8".into(), "utf-16le".into()],
        ..ScanOptions::default()
    };
    let mut session = builtin_session(b"\xff\xfe", opts);
    session.scan_dangerous_instructions(&mut NullSink);

    let report = session.report();
    let bom = report.find(r"\xff\xfe").expect("utf-16 le bom stats");
    assert_eq!(bom.label, "(UTF-16 LE BOM)");
    assert_eq!(bom.encoding("utf-8").map(|e| e.failed), Some(1));
    assert_eq!(bom.encoding("utf-16le").map(|e| e.decoded), Some(1));
}

#[test]
fn unmatched_patterns_are_listed_after_matched_ones() {
    let mut session = builtin_session(b"/JS eval", ScanOptions::default());
    let mut sink = RecordingSink::default();
    session.scan_dangerous_instructions(&mut sink);

    let report = session.report();
    let found: Vec<&str> = report.found.iter().map(|s| s.pattern.as_str()).collect();
    assert_eq!(found, vec!["/JS", "eval"]);
    assert!(report.not_found.iter().all(|s| s.match_count == 0));
    assert_eq!(report.not_found.first().map(|s| s.pattern.as_str()), Some("/AA"));

    assert_eq!(sink.events()[0], SessionEvent::Section { title: DANGER_SECTION_TITLE.to_string() });
    assert!(sink.events().contains(&SessionEvent::NotFound { pattern: "/AA".into() }));
}

#[test]
fn invalid_pattern_only_fails_its_own_scan() {
    let specs = vec![
        spec("broken", "`(unclosed", PatternCategory::QuotedLiteral(QuoteKind::Backtick)),
        spec("backtick", r"`(.*?)`", PatternCategory::QuotedLiteral(QuoteKind::Backtick)),
        spec("eval", "eval", PatternCategory::DangerousInstruction),
    ];
    let mut session = custom_session(b"eval `x`", &specs, ScanOptions::default());

    let quoted = session.scan_quoted_literals(None, &mut NullSink);
    assert_eq!(quoted.errors.len(), 1);
    assert_eq!(quoted.errors[0].name, "broken");
    assert_eq!(quoted.matches, 1);

    let dangerous = session.scan_dangerous_instructions(&mut NullSink);
    assert!(dangerous.errors.is_empty());
    assert_eq!(dangerous.matches, 1);
}

#[test]
fn one_section_per_quote_kind() {
    let mut session = builtin_session(b"", ScanOptions::default());
    let mut sink = RecordingSink::default();
    session.scan_quoted_literals(None, &mut sink);
    let titles: Vec<String> = sink
        .events()
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Section { title } => Some(title.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(titles.len(), QuoteKind::ALL.len());
    assert_eq!(titles[0], "Forcing Decode of Backtick Quoted Strings");
}

#[test]
fn configured_filter_applies_when_no_explicit_kind() {
    let opts = ScanOptions { quote_kind_filter: Some(QuoteKind::FrontSlash), ..ScanOptions::default() };
    let mut session = builtin_session(b"`a` /b/", opts);
    let summary = session.scan_quoted_literals(None, &mut NullSink);
    assert_eq!(summary.patterns_scanned, 1);
    assert_eq!(summary.matches, 1);
    assert!(session.report().find("backtick").is_none());
}

#[test]
fn min_length_suppresses_short_literals() {
    let opts = ScanOptions { min_decode_length: 3, ..ScanOptions::default() };
    let mut session = builtin_session(b"`ab` `abc` ``", opts);
    session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut NullSink);
    let stats = session.report().find("backtick").cloned().expect("stats");
    assert_eq!(stats.skipped_too_small, 1);
    assert_eq!(stats.skipped_empty, 1);
    assert_eq!(stats.matches_decoded, 1);
    assert!(stats.is_balanced());
}

#[test]
fn binary_garbage_never_panics() {
    let buf: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    let mut session = builtin_session(&buf, ScanOptions::default());
    session.scan_dangerous_instructions(&mut NullSink);
    session.scan_quoted_literals(None, &mut NullSink);
    let report = session.report();
    assert!(report.iter().all(|s| s.is_balanced()));
    assert!(report
        .iter()
        .flat_map(|s| s.encodings.iter())
        .all(|e| e.decoded + e.forced + e.failed > 0));
}

#[test]
fn decoded_event_splits_context_around_match() {
    let opts = ScanOptions { surrounding_bytes: 1, ..ScanOptions::default() };
    let mut session = builtin_session(b"xx`ab`yy", opts);
    let mut sink = RecordingSink::default();
    session.scan_quoted_literals(Some(QuoteKind::Backtick), &mut sink);

    let decoded = sink
        .events()
        .iter()
        .find_map(|e| match e {
            SessionEvent::Decoded { offset, before, matched, after, .. } => {
                Some((*offset, before.clone(), matched.clone(), after.clone()))
            }
            _ => None,
        })
        .expect("decoded event");
    assert_eq!(decoded, (3, "`".to_string(), "ab".to_string(), "`".to_string()));
}
