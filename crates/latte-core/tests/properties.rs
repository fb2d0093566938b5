//! Property-based tests over documents assembled from template fragments.

mod common;

use std::path::Path;

use latte_core::reparse::changed_ranges;
use latte_core::{
    classify_window, lex, parse_document, tokenize, DiffStrategy, EngineConfig, Limits, ReparseEngine, Token,
    ValidNames,
};
use proptest::prelude::*;

const FRAGMENTS: &[&str] = &[
    "{", "}", "{{", "}}", "{if $a}", "{/if}", "{else}", "{foreach $a as $b}", "{/foreach}", "{/}",
    "{syntax off}", "{syntax double}", "{/syntax}", "{$x|upper}", "{$x|}", "|", "||", "{*", "*}", "{* c *}",
    "<div", "<p>", "</p>", ">", "/>", " n:if=\"$a\"", " n:syntax=\"double\"", " n:invalid", " class='x'",
    "\"", "'", "=", "<!--", "-->", "<script>", "</script>", "<!DOCTYPE html>", "{block a /}", "{_}", "{=$a}",
    "é", "ščř", "\n", " ", "\t", "text", "$a", "{icon}",
];

fn fragment() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => proptest::sample::select(FRAGMENTS).prop_map(str::to_string),
        1 => "[ -~]{0,8}",
    ]
}

fn document() -> impl Strategy<Value = String> {
    proptest::collection::vec(fragment(), 0..40).prop_map(|parts| parts.concat())
}

/// An old document and an edited copy: one fragment inserted or removed, or
/// an unrelated document.
fn edit() -> impl Strategy<Value = (String, String)> {
    let local = (
        proptest::collection::vec(fragment(), 1..30),
        any::<proptest::sample::Index>(),
        fragment(),
        any::<bool>(),
    )
        .prop_map(|(mut parts, at, inserted, remove)| {
            let old = parts.concat();
            let i = at.index(parts.len());
            if remove {
                parts.remove(i);
            } else {
                parts.insert(i, inserted);
            }
            (old, parts.concat())
        });
    prop_oneof![3 => local, 1 => (document(), document())]
}

fn assert_total(text: &str, tokens: &[Token]) -> Result<(), TestCaseError> {
    let mut pos = 0;
    for token in tokens {
        prop_assert_eq!(token.span.start, pos);
        prop_assert!(token.span.end > token.span.start);
        pos = token.span.end;
    }
    prop_assert_eq!(pos, text.len());
    Ok(())
}

proptest! {
    #[test]
    fn tokenization_is_total(input in document()) {
        assert_total(&input, &lex(&input))?;
    }

    #[test]
    fn native_attributes_are_total(input in document()) {
        let config = EngineConfig {
            attribute_tokenization: latte_core::AttributeTokenization::Native,
            ..EngineConfig::default()
        };
        let tokens = tokenize(&input, &config, &ValidNames::default()).unwrap();
        assert_total(&input, &tokens)?;
    }

    #[test]
    fn exhausted_budget_stays_total(input in document(), max_tokens in 1u64..16) {
        let mut config = EngineConfig::default();
        config.limits = Limits { max_tokens, ..Limits::default() };
        let tokens = tokenize(&input, &config, &ValidNames::default()).unwrap();
        assert_total(&input, &tokens)?;
        prop_assert!(tokens.len() as u64 <= max_tokens + 1);
    }

    #[test]
    fn documents_always_build(input in document()) {
        let doc = parse_document(&input, &EngineConfig::default(), &ValidNames::default());
        prop_assert_eq!(doc.len, input.len());
        prop_assert_eq!(doc.tokens, lex(&input));
    }

    #[test]
    fn changed_ranges_cover_the_edit(old in document(), new in document()) {
        let engine = ReparseEngine::new(EngineConfig::default(), ValidNames::default());
        let file = Path::new("prop.latte");
        engine.parse_changed_parts(file, &old).unwrap();
        let ranges = engine.parse_changed_parts(file, &new).unwrap();

        for pair in ranges.windows(2) {
            prop_assert!(pair[0].end < pair[1].start);
        }
        for range in &ranges {
            prop_assert!(range.start <= range.end && range.end <= new.len());
        }
        let raw = changed_ranges(&old, &new, DiffStrategy::Precise, &Limits::default());
        for candidate in raw.iter().filter(|c| !c.is_empty()) {
            prop_assert!(
                ranges.iter().any(|r| r.start <= candidate.start && candidate.end <= r.end),
                "{:?} not covered by {:?}", candidate, ranges
            );
        }
        prop_assert!(engine.parse_changed_parts(file, &new).unwrap().is_empty());
    }

    #[test]
    fn window_classification_never_panics(input in document(), offset in 0usize..400) {
        let _ = classify_window(&input, offset);
    }

    #[test]
    fn relexed_ranges_splice_into_full_lex((old, new) in edit(), whole in any::<bool>()) {
        let config = EngineConfig {
            diff: if whole { DiffStrategy::Whole } else { DiffStrategy::Precise },
            ..EngineConfig::default()
        };
        let engine = ReparseEngine::new(config, ValidNames::default());
        let (ranges, tokens) = common::spliced(&engine, &old, &new);
        prop_assert_eq!(tokens, lex(&new), "ranges {:?}", ranges);
    }
}
