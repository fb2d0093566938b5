//! One reusable [`TemplateLexer`] per thread.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::budget::CancelToken;
use crate::config::EngineConfig;
use crate::error::ParseFailure;
use crate::lexer::TemplateLexer;
use crate::names::ValidNames;
use crate::parser::{parse_with, Document};

#[derive(Debug, Default)]
pub struct LexerPool {
    config: EngineConfig,
    names: ValidNames,
    lexers: Mutex<HashMap<ThreadId, TemplateLexer>>,
}

impl LexerPool {
    pub fn new(config: EngineConfig, names: ValidNames) -> Self {
        Self {
            config,
            names,
            lexers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn names(&self) -> &ValidNames {
        &self.names
    }

    /// The calling thread's lexer, reset for a new document. It goes back to
    /// the pool when the guard is dropped.
    pub fn checkout(&self) -> PooledLexer<'_> {
        let thread = thread::current().id();
        let idle = self.lexers.lock().remove(&thread);
        let mut lexer = match idle {
            Some(lexer) => {
                tracing::trace!(?thread, "lexer reused");
                lexer
            }
            None => {
                tracing::trace!(?thread, "lexer created");
                TemplateLexer::new(&self.config, self.names.clone())
            }
        };
        lexer.set_cancel(None);
        lexer.reset();
        PooledLexer {
            pool: self,
            thread,
            lexer: Some(lexer),
        }
    }

    /// Lexers waiting for their thread to come back.
    pub fn idle(&self) -> usize {
        self.lexers.lock().len()
    }

    /// Parse `text` with this thread's lexer.
    pub fn parse(&self, text: &str, cancel: Option<CancelToken>) -> Result<Document, ParseFailure> {
        let mut lexer = self.checkout();
        parse_with(&mut lexer, text, &self.config, cancel)
    }

    fn give_back(&self, thread: ThreadId, lexer: TemplateLexer) {
        self.lexers.lock().insert(thread, lexer);
    }
}

/// Guard over a checked-out lexer.
#[derive(Debug)]
pub struct PooledLexer<'p> {
    pool: &'p LexerPool,
    thread: ThreadId,
    lexer: Option<TemplateLexer>,
}

impl Deref for PooledLexer<'_> {
    type Target = TemplateLexer;

    fn deref(&self) -> &TemplateLexer {
        self.lexer.as_ref().expect("lexer is held until drop")
    }
}

impl DerefMut for PooledLexer<'_> {
    fn deref_mut(&mut self) -> &mut TemplateLexer {
        self.lexer.as_mut().expect("lexer is held until drop")
    }
}

impl Drop for PooledLexer<'_> {
    fn drop(&mut self) {
        if let Some(lexer) = self.lexer.take() {
            self.pool.give_back(self.thread, lexer);
        }
    }
}
