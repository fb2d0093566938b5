pub mod attribute_lexer;
pub mod budget;
pub mod catalogs;
pub mod config;
pub mod cursor;
pub mod error;
pub mod lexer;
pub mod macro_lexer;
pub mod markup;
pub mod names;
pub mod parser;
pub mod pool;
pub mod reparse;
pub mod scan;
pub mod syntax_mode;
pub mod types;
pub mod validator;

pub use budget::{Budget, CancelToken};
pub use config::{AttributeTokenization, DiffStrategy, EngineConfig, Limits};
pub use cursor::{classify, classify_window};
pub use error::{ConfigError, ParseFailure, ReparseError};
pub use lexer::{lex, tokenize, HostTokenizer, LexContext, TemplateLexer, Tokenize};
pub use names::{ExtensionNames, NameKind, SharedExtensions, StaticExtensions, ValidNames};
pub use parser::{parse_document, parse_tokens, try_parse_document, Document, ErrorNode, Node, PairNode};
pub use pool::{LexerPool, PooledLexer};
pub use reparse::ReparseEngine;
pub use syntax_mode::SyntaxModeStack;
pub use types::*;
pub use validator::{validate, NestingValidator};
