mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use latte_core::reparse::relex;
use latte_core::{
    lex, CancelToken, ChangeRange, DiffStrategy, EngineConfig, ReparseEngine, TemplateLexer, TokenKind, ValidNames,
};
use pretty_assertions::assert_eq;

fn engine() -> ReparseEngine {
    ReparseEngine::new(EngineConfig::default(), ValidNames::default())
}

fn whole_engine() -> ReparseEngine {
    let config = EngineConfig {
        diff: DiffStrategy::Whole,
        ..EngineConfig::default()
    };
    ReparseEngine::new(config, ValidNames::default())
}

const FOREACH: &str = "<div>{foreach $x as $y}A{/foreach}</div>";

#[test]
fn first_sight_is_whole_text() {
    let engine = engine();
    let ranges = engine.parse_changed_parts(Path::new("page.latte"), FOREACH).unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(0, FOREACH.len())]);
}

#[test]
fn unchanged_text_is_idempotent() {
    let engine = engine();
    let file = Path::new("page.latte");
    engine.parse_changed_parts(file, FOREACH).unwrap();
    assert!(engine.parse_changed_parts(file, FOREACH).unwrap().is_empty());
    assert!(engine.parse_changed_parts(file, FOREACH).unwrap().is_empty());
}

#[test]
fn edit_inside_block_expands_to_whole_block() {
    let file = Path::new("page.latte");
    let edited = FOREACH.replace("}A{", "}B{");
    for engine in [engine(), whole_engine()] {
        engine.parse_changed_parts(file, FOREACH).unwrap();
        let ranges = engine.parse_changed_parts(file, &edited).unwrap();
        assert_eq!(ranges, vec![ChangeRange::new(5, 34)]);
    }
}

#[test]
fn edit_in_macro_arguments() {
    let engine = engine();
    let file = Path::new("page.latte");
    engine.parse_changed_parts(file, FOREACH).unwrap();
    let edited = FOREACH.replace("$x as", "$xs as");
    let ranges = engine.parse_changed_parts(file, &edited).unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(5, 35)]);
}

#[test]
fn unclosed_block_extends_to_end_of_text() {
    let engine = engine();
    let file = Path::new("page.latte");
    let old = "<p>{if $a}</p>\n<p>tail</p>";
    let new = "<p>{if $ab}</p>\n<p>tail</p>";
    engine.parse_changed_parts(file, old).unwrap();
    let ranges = engine.parse_changed_parts(file, new).unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(3, new.len())]);
}

#[test]
fn distant_edits_stay_separate() {
    let engine = engine();
    let file = Path::new("page.latte");
    let filler = "<p>plain</p>\n".repeat(20);
    let old = format!("{{$a}}\n{filler}{{$b}}");
    let new = format!("{{$c}}\n{filler}{{$d}}");
    engine.parse_changed_parts(file, &old).unwrap();
    let ranges = engine.parse_changed_parts(file, &new).unwrap();
    assert_eq!(ranges.len(), 2);
    assert_eq!(ranges[0], ChangeRange::new(0, 4));
    assert_eq!(ranges[1], ChangeRange::new(new.len() - 4, new.len()));
}

#[test]
fn deletion_at_end_of_text() {
    let engine = engine();
    let file = Path::new("page.latte");
    engine.parse_changed_parts(file, "abc{$x}").unwrap();
    let ranges = engine.parse_changed_parts(file, "abc").unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(0, 3)]);
}

#[test]
fn cancellation_leaves_cache_untouched() {
    let engine = engine();
    let file = Path::new("page.latte");
    engine.parse_changed_parts(file, FOREACH).unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    let edited = FOREACH.replace("}A{", "}B{");
    assert!(engine.parse_changed_parts_cancellable(file, &edited, &cancel).is_err());
    assert_eq!(engine.last_known(file).as_deref(), Some(FOREACH));

    let ranges = engine.parse_changed_parts(file, &edited).unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(5, 34)]);
}

#[test]
fn files_are_tracked_separately() {
    let engine = engine();
    engine.parse_changed_parts(Path::new("a.latte"), "{$a}").unwrap();
    let ranges = engine.parse_changed_parts(Path::new("b.latte"), "{$a}").unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(0, 4)]);
}

#[test]
fn relexed_ranges_match_full_lex() {
    let engine = engine();
    let file = Path::new("page.latte");
    let old = "{syntax double}<p>{{$a}}</p>{/syntax}<p>{$b}</p>";
    let new = "{syntax double}<p>{{$abc}}</p>{/syntax}<p>{$b}</p>";
    engine.parse_changed_parts(file, old).unwrap();
    let ranges = engine.parse_changed_parts(file, new).unwrap();
    assert_eq!(ranges, vec![ChangeRange::new(18, 26)]);

    let text: Arc<str> = Arc::from(new);
    let mut lexer = TemplateLexer::new(engine.config(), ValidNames::default());
    let relexed = relex(&text, &ranges, &mut lexer).unwrap();
    let full: Vec<_> = lex(new)
        .into_iter()
        .filter(|t| t.span.start >= 18 && t.span.end <= 26)
        .collect();
    assert_eq!(relexed[0].1, full);
    assert_eq!(relexed[0].1[0].kind, TokenKind::MacroStart);
}

// ===========================================================================
// Splicing re-lexed ranges
// ===========================================================================

fn assert_splices(old: &str, new: &str) -> Vec<ChangeRange> {
    for engine in [engine(), whole_engine()] {
        let (_, tokens) = common::spliced(&engine, old, new);
        assert_eq!(tokens, lex(new), "{old:?} -> {new:?}");
    }
    common::spliced(&engine(), old, new).0
}

#[test]
fn n_syntax_insertion_relexes_the_element_body() {
    let old = "<div>{if $a}x{/if}</div>";
    let new = "<div n:syntax=\"off\">{if $a}x{/if}</div>";
    let ranges = assert_splices(old, new);
    let closer = new.find("{/if}").unwrap();
    assert!(ranges.iter().any(|r| r.start <= closer && closer + 5 <= r.end), "{ranges:?}");
}

#[test]
fn closing_an_off_region_relexes_what_follows() {
    let old = "{syntax off}A B{if $x}C{/if}";
    let new = "{syntax off}A{/syntax} B{if $x}C{/if}";
    let ranges = assert_splices(old, new);
    let opener = new.find("{if").unwrap();
    assert!(ranges.iter().any(|r| r.start <= opener && opener + 7 <= r.end), "{ranges:?}");
}

#[test]
fn removing_a_mode_switch_relexes_what_follows() {
    assert_splices("<p n:syntax=\"double\">{$a}</p>{{$b}} {$c}", "<p>{$a}</p>{{$b}} {$c}");
    assert_splices("{syntax double}{{$a}}{/syntax}{$b}", "{syntax double}{{$a}}{$b}");
}

#[test]
fn attribute_value_edit_keeps_quotes_paired() {
    let old = "<div n:if=\"$a\" class=\"x\">t</div>";
    let new = "<div n:if=\"$b\" class=\"x\">t</div>";
    let ranges = assert_splices(old, new);
    let tokens = lex(new);
    for range in &ranges {
        assert!(tokens.iter().any(|t| t.span.start == range.start), "{range:?}");
        assert!(tokens.iter().any(|t| t.span.end == range.end), "{range:?}");
    }
    assert!(tokens.iter().all(|t| t.kind != TokenKind::ErrorUnclosedAttributeQuotes));
}

#[test]
fn unbalanced_quote_relexes_the_rest_of_the_tag() {
    assert_splices("<a href=\"x\" title='y'>{$z}</a>", "<a href=\"x title='y'>{$z}</a>");
    assert_splices("<p>{* note *}{$a}</p>", "<p>{* note {$a}</p>");
}

#[test]
fn large_document_edit_is_bounded() {
    let mut old = String::new();
    for i in 0..10_000 {
        if i % 10 == 0 {
            old.push_str(&format!("<li n:class=\"$a\">{{$item{i}|upper}}</li>\n"));
        } else {
            old.push_str("<p>plain paragraph text with a brace { in it</p>\n");
        }
    }
    let middle = old.len() / 2;
    let mut new = old.clone();
    new.insert_str(middle, "{if $flag}");

    let engine = engine();
    let file = Path::new("large.latte");
    engine.parse_changed_parts(file, &old).unwrap();
    let started = Instant::now();
    let ranges = engine.parse_changed_parts(file, &new).unwrap();
    let elapsed = started.elapsed();

    assert!(!ranges.is_empty());
    assert!(ranges[0].start <= middle);
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}
