//! Incremental reparse: which parts of a new text have to be tokenized again.
//!
//! A pass diffs the new text against the last one, widens each changed
//! stretch to whole macro constructs with raw text scans, and then checks the
//! result against the token streams: any token of the new text that does not
//! reappear, shifted, in an unchanged stretch of the old stream is added. The
//! returned ranges always start and end on token boundaries of the new text,
//! so splicing their tokens into the old stream gives the full stream.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use similar::{Algorithm, DiffTag, TextDiff};

use crate::budget::CancelToken;
use crate::config::{DiffStrategy, EngineConfig, Limits};
use crate::error::{ParseFailure, ReparseError};
use crate::lexer::TemplateLexer;
use crate::names::ValidNames;
use crate::pool::LexerPool;
use crate::scan::{expanded_end, expanded_start};
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{ChangeRange, Token};

// ---------------------------------------------------------------------------
// Diffing
// ---------------------------------------------------------------------------

/// One changed stretch, in old and in new text offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk {
    pub old: ChangeRange,
    pub new: ChangeRange,
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

fn common_suffix(a: &str, b: &str) -> usize {
    a.chars()
        .rev()
        .zip(b.chars().rev())
        .take_while(|(x, y)| x == y)
        .map(|(c, _)| c.len_utf8())
        .sum()
}

fn char_starts(text: &str) -> Vec<usize> {
    let mut starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    starts.push(text.len());
    starts
}

/// Character-level hunks between `old` and `new`, as byte ranges offset by
/// `base`.
fn precise_hunks(old: &str, new: &str, base: usize, limits: &Limits) -> Vec<Hunk> {
    let mut config = TextDiff::configure();
    config.algorithm(Algorithm::Myers);
    if let Some(timeout) = limits.scan_timeout() {
        config.deadline(Instant::now() + timeout);
    }
    let diff = config.diff_chars(old, new);

    let old_starts = char_starts(old);
    let new_starts = char_starts(new);
    let bytes = |starts: &[usize], range: std::ops::Range<usize>| {
        ChangeRange::new(base + starts[range.start], base + starts[range.end])
    };

    diff.ops()
        .iter()
        .filter(|op| op.tag() != DiffTag::Equal)
        .map(|op| Hunk {
            old: bytes(&old_starts, op.old_range()),
            new: bytes(&new_starts, op.new_range()),
        })
        .collect()
}

/// Changed stretches between `old` and `new`, sorted, before expansion.
pub fn changed_hunks(old: &str, new: &str, strategy: DiffStrategy, limits: &Limits) -> Vec<Hunk> {
    if old == new {
        return Vec::new();
    }
    let prefix = common_prefix(old, new);
    let suffix = common_suffix(&old[prefix..], &new[prefix..]);
    let old_middle = &old[prefix..old.len() - suffix];
    let new_middle = &new[prefix..new.len() - suffix];
    let whole = Hunk {
        old: ChangeRange::new(prefix, old.len() - suffix),
        new: ChangeRange::new(prefix, new.len() - suffix),
    };

    let splittable = strategy == DiffStrategy::Precise
        && !old_middle.is_empty()
        && !new_middle.is_empty()
        && old_middle.len().max(new_middle.len()) <= limits.precise_diff_limit;
    if !splittable {
        return vec![whole];
    }
    let hunks = precise_hunks(old_middle, new_middle, prefix, limits);
    if hunks.is_empty() {
        vec![whole]
    } else {
        hunks
    }
}

/// Raw changed regions of `new` relative to `old`, before expansion.
pub fn changed_ranges(old: &str, new: &str, strategy: DiffStrategy, limits: &Limits) -> Vec<ChangeRange> {
    changed_hunks(old, new, strategy, limits)
        .into_iter()
        .map(|hunk| hunk.new)
        .collect()
}

/// Sort and coalesce overlapping or touching ranges.
pub fn merge(mut ranges: Vec<ChangeRange>) -> Vec<ChangeRange> {
    ranges.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<ChangeRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last) if last.end >= range.start => last.end = last.end.max(range.end),
            _ => merged.push(range),
        }
    }
    merged
}

/// Widen each candidate to whole constructs and merge the results.
pub fn expand(
    text: &str,
    candidates: &[ChangeRange],
    names: &ValidNames,
    limits: &Limits,
    cancel: Option<&CancelToken>,
) -> Result<Vec<ChangeRange>, ReparseError> {
    let mut expanded = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut end = candidate.end;
        if candidate.is_empty() {
            end = text[end..]
                .chars()
                .next()
                .map_or(end, |c| end + c.len_utf8());
        }
        let start = expanded_start(text, candidate.start, &mut limits.scan_budget(cancel.cloned()))?;
        let stop = expanded_end(text, start, end, names, &mut limits.scan_budget(cancel.cloned()))?;
        expanded.push(ChangeRange::new(start, stop.max(end)));
    }
    Ok(merge(expanded))
}

// ---------------------------------------------------------------------------
// Token synchronization
// ---------------------------------------------------------------------------

/// Unchanged stretch of text: `[new_start, new_end)` in the new text starts
/// at `old_start` in the old one.
#[derive(Debug, Clone, Copy)]
struct Unchanged {
    new_start: usize,
    new_end: usize,
    old_start: usize,
}

fn unchanged_stretches(hunks: &[Hunk]) -> Vec<Unchanged> {
    let mut stretches = Vec::with_capacity(hunks.len() + 1);
    let (mut old_at, mut new_at) = (0, 0);
    for hunk in hunks {
        stretches.push(Unchanged {
            new_start: new_at,
            new_end: hunk.new.start,
            old_start: old_at,
        });
        old_at = hunk.old.end;
        new_at = hunk.new.end;
    }
    stretches.push(Unchanged {
        new_start: new_at,
        new_end: usize::MAX,
        old_start: old_at,
    });
    stretches
}

/// Spans of `new_tokens` that have no counterpart in `old_tokens`.
///
/// A new token has a counterpart when it lies inside one unchanged stretch
/// and the old stream holds a token of the same kind at the same relative
/// offset with the same length. Tokens touching a hunk never do.
pub fn token_changes(old_tokens: &[Token], new_tokens: &[Token], hunks: &[Hunk]) -> Vec<ChangeRange> {
    let stretches = unchanged_stretches(hunks);
    let mut at = 0;
    let mut changes = Vec::new();
    for token in new_tokens {
        while at + 1 < stretches.len() && stretches[at].new_end <= token.span.start {
            at += 1;
        }
        let stretch = stretches[at];
        let inside = stretch.new_start <= token.span.start && token.span.end <= stretch.new_end;
        let kept = inside && {
            let old_start = token.span.start - stretch.new_start + stretch.old_start;
            old_tokens
                .binary_search_by_key(&old_start, |t| t.span.start)
                .is_ok_and(|i| old_tokens[i].kind == token.kind && old_tokens[i].span.len() == token.span.len())
        };
        if !kept {
            changes.push(ChangeRange::new(token.span.start, token.span.end));
        }
    }
    changes
}

/// Widen each range to whole tokens and merge again.
fn align_to_tokens(ranges: Vec<ChangeRange>, tokens: &[Token]) -> Vec<ChangeRange> {
    let token_at = |offset: usize| tokens.get(tokens.partition_point(|t| t.span.end <= offset));
    let aligned = ranges
        .into_iter()
        .map(|range| {
            if range.is_empty() {
                return range;
            }
            let start = token_at(range.start).map_or(range.start, |t| t.span.start.min(range.start));
            let end = token_at(range.end - 1).map_or(range.end, |t| t.span.end.max(range.end));
            ChangeRange::new(start, end)
        })
        .collect();
    merge(aligned)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// What the engine remembers about a file.
#[derive(Debug, Clone)]
struct Snapshot {
    text: Arc<str>,
    tokens: Arc<[Token]>,
}

/// Tracks the last text and token stream seen per file and reports what
/// changed.
#[derive(Debug, Default)]
pub struct ReparseEngine {
    last_known: Mutex<HashMap<PathBuf, Snapshot>>,
    lexers: LexerPool,
}

impl ReparseEngine {
    pub fn new(config: EngineConfig, names: ValidNames) -> Self {
        Self {
            last_known: Mutex::new(HashMap::new()),
            lexers: LexerPool::new(config, names),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        self.lexers.config()
    }

    pub fn names(&self) -> &ValidNames {
        self.lexers.names()
    }

    /// Ranges of `new_text` to tokenize again since the last call for `file`.
    pub fn parse_changed_parts(&self, file: &Path, new_text: &str) -> Result<Vec<ChangeRange>, ReparseError> {
        self.changed_parts(file, new_text, None)
    }

    /// Like [`parse_changed_parts`](Self::parse_changed_parts), abandoning
    /// the pass once `cancel` fires. A cancelled pass leaves the stored text
    /// untouched.
    pub fn parse_changed_parts_cancellable(
        &self,
        file: &Path,
        new_text: &str,
        cancel: &CancelToken,
    ) -> Result<Vec<ChangeRange>, ReparseError> {
        self.changed_parts(file, new_text, Some(cancel))
    }

    fn changed_parts(
        &self,
        file: &Path,
        new_text: &str,
        cancel: Option<&CancelToken>,
    ) -> Result<Vec<ChangeRange>, ReparseError> {
        let previous = self.last_known.lock().get(file).cloned();
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(ReparseError::Cancelled);
        }
        let Some(previous) = previous else {
            let text: Arc<str> = Arc::from(new_text);
            let tokens = self.tokenize(&text, cancel)?;
            self.store(file, Snapshot { text, tokens });
            tracing::debug!(file = %file.display(), len = new_text.len(), "first sight, whole text changed");
            return Ok(vec![ChangeRange::new(0, new_text.len())]);
        };

        let config = self.config();
        let hunks = changed_hunks(&previous.text, new_text, config.diff, &config.limits);
        if hunks.is_empty() {
            return Ok(Vec::new());
        }
        let candidates: Vec<ChangeRange> = hunks.iter().map(|hunk| hunk.new).collect();
        let mut ranges = expand(new_text, &candidates, self.names(), &config.limits, cancel)?;

        let text: Arc<str> = Arc::from(new_text);
        let tokens = self.tokenize(&text, cancel)?;
        let drift = token_changes(&previous.tokens, &tokens, &hunks);
        tracing::trace!(file = %file.display(), tokens = drift.len(), "tokens without a counterpart");
        ranges.extend(drift);
        let ranges = align_to_tokens(merge(ranges), &tokens);

        self.store(file, Snapshot { text, tokens });
        tracing::debug!(
            file = %file.display(),
            hunks = hunks.len(),
            ranges = ranges.len(),
            "changed ranges computed"
        );
        Ok(ranges)
    }

    fn tokenize(&self, text: &Arc<str>, cancel: Option<&CancelToken>) -> Result<Arc<[Token]>, ReparseError> {
        let mut lexer = self.lexers.checkout();
        lexer.set_cancel(cancel.cloned());
        lexer.start(Arc::clone(text), 0..text.len(), SyntaxModeStack::new());
        Ok(lexer.tokenize_all()?.into())
    }

    fn store(&self, file: &Path, snapshot: Snapshot) {
        self.last_known.lock().insert(file.to_path_buf(), snapshot);
    }

    /// The text stored for `file` by the last successful pass.
    pub fn last_known(&self, file: &Path) -> Option<Arc<str>> {
        self.last_known.lock().get(file).map(|s| Arc::clone(&s.text))
    }

    /// The token stream of [`last_known`](Self::last_known).
    pub fn tokens(&self, file: &Path) -> Option<Arc<[Token]>> {
        self.last_known.lock().get(file).map(|s| Arc::clone(&s.tokens))
    }

    /// Drop the stored text for `file`; the next pass reports the whole text.
    pub fn forget(&self, file: &Path) -> bool {
        let removed = self.last_known.lock().remove(file).is_some();
        tracing::trace!(file = %file.display(), removed, "cache entry invalidated");
        removed
    }

    pub fn clear(&self) {
        let mut cache = self.last_known.lock();
        tracing::trace!(entries = cache.len(), "cache cleared");
        cache.clear();
    }
}

// ---------------------------------------------------------------------------
// Re-lexing
// ---------------------------------------------------------------------------

/// The syntax mode stack in effect at `offset`, replaying every mode signal
/// in `text[..offset]`.
pub fn mode_at(text: &Arc<str>, offset: usize, lexer: &mut TemplateLexer) -> Result<SyntaxModeStack, ParseFailure> {
    lexer.start(Arc::clone(text), 0..offset.min(text.len()), SyntaxModeStack::new());
    while lexer.next_token()?.is_some() {}
    Ok(lexer.modes().clone())
}

/// The tokens of each range, as a pass over the whole text produces them.
///
/// Lexer state at a range start (an open tag, an attribute value, a script
/// body) is only known from what precedes it, so the pass runs from the
/// start of the text and stops after the last range.
pub fn relex(
    text: &Arc<str>,
    ranges: &[ChangeRange],
    lexer: &mut TemplateLexer,
) -> Result<Vec<(ChangeRange, Vec<Token>)>, ParseFailure> {
    let mut out: Vec<(ChangeRange, Vec<Token>)> = ranges.iter().map(|r| (*r, Vec::new())).collect();
    let Some(stop) = ranges.iter().map(|r| r.end).max() else {
        return Ok(out);
    };
    lexer.start(Arc::clone(text), 0..text.len(), SyntaxModeStack::new());
    while let Some(token) = lexer.next_token()? {
        if token.span.start >= stop {
            break;
        }
        for (range, tokens) in &mut out {
            if range.start <= token.span.start && token.span.end <= range.end {
                tokens.push(token);
            }
        }
    }
    Ok(out)
}
