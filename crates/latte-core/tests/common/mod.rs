//! Incremental update applied the way an editor would apply it.

use std::path::Path;
use std::sync::Arc;

use latte_core::reparse::{changed_hunks, relex, Hunk};
use latte_core::{tokenize, ChangeRange, ReparseEngine, TemplateLexer, Token};

/// Old token moved to its place in the new text, if it sits inside an
/// unchanged stretch.
fn shifted(token: &Token, hunks: &[Hunk]) -> Option<Token> {
    let (mut old_at, mut new_at) = (0, 0);
    for hunk in hunks.iter().map(Some).chain([None]) {
        let old_end = hunk.map_or(usize::MAX, |h| h.old.start);
        if old_at <= token.span.start && token.span.end <= old_end {
            let shift = |offset: usize| offset - old_at + new_at;
            return Some(Token::new(token.kind, shift(token.span.start), shift(token.span.end)));
        }
        if let Some(hunk) = hunk {
            old_at = hunk.old.end;
            new_at = hunk.new.end;
        }
    }
    None
}

/// Feed `old` then `new` to `engine`, relex the reported ranges and splice
/// them into the old stream.
pub fn spliced(engine: &ReparseEngine, old: &str, new: &str) -> (Vec<ChangeRange>, Vec<Token>) {
    let file = Path::new("spliced.latte");
    engine.forget(file);
    engine.parse_changed_parts(file, old).unwrap();
    let ranges = engine.parse_changed_parts(file, new).unwrap();

    let config = engine.config();
    let hunks = changed_hunks(old, new, config.diff, &config.limits);
    let old_tokens = tokenize(old, config, engine.names()).unwrap();
    let overlaps = |t: &Token| ranges.iter().any(|r| t.span.start < r.end && r.start < t.span.end);

    let mut tokens: Vec<Token> = old_tokens
        .iter()
        .filter_map(|t| shifted(t, &hunks))
        .filter(|t| !overlaps(t))
        .collect();
    let mut lexer = TemplateLexer::new(config, engine.names().clone());
    for (_, relexed) in relex(&Arc::from(new), &ranges, &mut lexer).unwrap() {
        tokens.extend(relexed);
    }
    tokens.sort_by_key(|t| t.span.start);
    (ranges, tokens)
}
