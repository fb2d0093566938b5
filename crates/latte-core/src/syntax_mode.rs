use crate::types::SyntaxMode;

/// Current delimiter mode plus the modes it replaced.
///
/// `{syntax X}` and `n:syntax="X"` push, `{/syntax}` pops. One stack is owned
/// by each lexer and handed by `&mut` to every tokenizer layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyntaxModeStack {
    current: SyntaxMode,
    previous: Vec<SyntaxMode>,
}

impl SyntaxModeStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack whose current mode is `mode` with nothing to pop back to.
    pub fn starting_in(mode: SyntaxMode) -> Self {
        Self {
            current: mode,
            previous: Vec::new(),
        }
    }

    pub fn current(&self) -> SyntaxMode {
        self.current
    }

    /// Number of modes that `{/syntax}` can still restore.
    pub fn depth(&self) -> usize {
        self.previous.len()
    }

    /// Push the current mode and switch according to a `{syntax}` parameter.
    pub fn set_mode(&mut self, parameter: &str) {
        self.previous.push(self.current);
        self.current = parse_mode(parameter);
        tracing::trace!(
            parameter,
            mode = ?self.current,
            depth = self.previous.len(),
            "syntax mode pushed"
        );
    }

    /// Restore the mode active before the last [`set_mode`](Self::set_mode).
    ///
    /// An unmatched `{/syntax}` falls back to the default mode.
    pub fn end_scope(&mut self) {
        match self.previous.pop() {
            Some(mode) => self.current = mode,
            None => {
                tracing::trace!("unmatched syntax scope end, resetting to default");
                self.current = SyntaxMode::Default;
            }
        }
    }

    pub fn reset(&mut self) {
        self.previous.clear();
        self.current = SyntaxMode::Default;
    }
}

/// `double` and `off` (any case) select those modes; everything else is the default syntax.
pub fn parse_mode(parameter: &str) -> SyntaxMode {
    let parameter = parameter.trim();
    if parameter.eq_ignore_ascii_case("double") {
        SyntaxMode::Double
    } else if parameter.eq_ignore_ascii_case("off") {
        SyntaxMode::Off
    } else {
        SyntaxMode::Default
    }
}
