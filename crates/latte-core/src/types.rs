use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source positions
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` into the template text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span {start}..{end} is reversed");
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `offset` lies inside the span (end exclusive).
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Maps byte offsets to 1-based line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i + 1),
        );
        Self { line_starts }
    }

    /// 1-based `(line, col)`; columns count bytes.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, offset - self.line_starts[line] + 1)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

// ---------------------------------------------------------------------------
// Language versions and syntax modes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatteVersion {
    V2,
    #[default]
    V3,
    V4,
}

/// Active delimiter scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxMode {
    /// `{macro}`
    #[default]
    Default,
    /// `{{macro}}`
    Double,
    /// Everything is opaque until `{/syntax}`.
    Off,
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    // Markup (host tokenizer)
    Text,
    Whitespace,
    /// `<div`
    TagOpen,
    /// `</div`
    EndTagOpen,
    /// `>` or `/>`
    TagEnd,
    MarkupAttributeName,
    MarkupEquals,
    MarkupQuote,
    MarkupAttributeValue,
    HtmlComment,
    /// `<!DOCTYPE …>`, `<?xml …?>`
    MarkupDeclaration,
    /// A whole `n:` attribute as seen by the host; replaced by attribute tokens.
    NAttribute,
    BadCharacter,

    // Macros
    MacroStart,
    MacroEnd,
    MacroName,
    MacroContent,
    ErrorInvalidMacroName,
    FilterPipe,
    FilterName,
    ErrorUnknownFilter,
    ErrorInvalidFilterSyntax,

    // Latte comments `{* … *}`
    CommentStart,
    CommentContent,
    CommentEnd,

    // n: attributes
    AttributeName,
    /// The `=` introducing an `n:` attribute value.
    AttributeStart,
    AttributeValue,
    ErrorInvalidAttributeSyntax,
    ErrorUnclosedAttributeQuotes,
}

impl TokenKind {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::ErrorInvalidMacroName
                | TokenKind::ErrorUnknownFilter
                | TokenKind::ErrorInvalidFilterSyntax
                | TokenKind::ErrorInvalidAttributeSyntax
                | TokenKind::ErrorUnclosedAttributeQuotes
        )
    }

    /// Tokens produced between a `MacroStart` and its `MacroEnd`.
    pub fn is_macro_part(self) -> bool {
        matches!(
            self,
            TokenKind::MacroName
                | TokenKind::MacroContent
                | TokenKind::ErrorInvalidMacroName
                | TokenKind::FilterPipe
                | TokenKind::FilterName
                | TokenKind::ErrorUnknownFilter
                | TokenKind::ErrorInvalidFilterSyntax
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Self {
            kind,
            span: Span::new(start, end),
        }
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        self.span.text(source)
    }
}

// ---------------------------------------------------------------------------
// Macro occurrences
// ---------------------------------------------------------------------------

/// One `{…}` occurrence, as seen by the nesting walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MacroTag {
    /// Tag name without the leading `/`; empty for print tags (`{$x}`) and `{/}`.
    pub name: String,
    pub closing: bool,
    /// Trimmed text between the name and the end delimiter.
    pub args: String,
    /// `{block foo /}`
    pub self_closed: bool,
    /// False when the end delimiter is missing.
    pub terminated: bool,
    pub span: Span,
}

impl MacroTag {
    pub fn is_bare(&self) -> bool {
        self.args.is_empty()
    }
}

/// Entry on the nesting stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroInfo {
    pub name: String,
    pub open_offset: usize,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: DiagnosticSeverity,
    pub span: Span,
    pub line: usize,
    pub col: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Default)]
pub struct ValidateOptions {
    /// Also report blocks that rely on implicit closing at end of file.
    pub strict: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidateResult {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

// ---------------------------------------------------------------------------
// Incremental reparse and editor queries
// ---------------------------------------------------------------------------

/// Region of the new text that has to be tokenized again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRange {
    pub start: usize,
    pub end: usize,
}

impl ChangeRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// What the cursor is sitting in, for completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorContext {
    MacroName,
    MacroContent,
    FilterName,
    AttributeName,
    AttributeValue,
    PlainText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_positions() {
        let index = LineIndex::new("ab\ncd\n\nx");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(1), (1, 2));
        assert_eq!(index.line_col(3), (2, 1));
        assert_eq!(index.line_col(6), (3, 1));
        assert_eq!(index.line_col(7), (4, 1));
        assert_eq!(index.line_count(), 4);
    }

    #[test]
    fn span_contains_is_end_exclusive() {
        let span = Span::new(2, 4);
        assert!(span.contains(2));
        assert!(span.contains(3));
        assert!(!span.contains(4));
        assert_eq!(span.text("abcdef"), "cd");
    }

    #[test]
    fn error_kinds() {
        assert!(TokenKind::ErrorUnknownFilter.is_error());
        assert!(!TokenKind::FilterName.is_error());
        assert!(TokenKind::FilterPipe.is_macro_part());
        assert!(!TokenKind::MacroEnd.is_macro_part());
    }
}
