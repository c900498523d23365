//! Error types for all phases: lexing, parsing, compiling, loading and running.

use crate::span::Span;
use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of file at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),

    #[error("{message} at {span}")]
    General { message: String, span: Span },
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof(span)
    }

    pub fn invalid_assignment_target(span: Span) -> Self {
        Self::InvalidAssignmentTarget(span)
    }

    pub fn general(message: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
            Self::General { span, .. } => *span,
        }
    }
}

impl From<LexerError> for ParserError {
    fn from(err: LexerError) -> Self {
        Self::General {
            message: err.to_string(),
            span: err.span(),
        }
    }
}

/// Bytecode compilation errors. Every variant names the file being compiled.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{file}:{span}: {message}")]
    General {
        message: String,
        file: String,
        span: Span,
    },

    #[error("{file}: {source}")]
    Syntax {
        file: String,
        #[source]
        source: ParserError,
    },

    #[error("{file}: import cycle detected")]
    ImportCycle { file: String },

    #[error("{file}: source is {size} bytes, limit is {limit}")]
    SourceTooLarge { file: String, size: u64, limit: u64 },

    #[error("{file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn new(message: impl Into<String>, file: impl Into<String>, span: Span) -> Self {
        Self::General {
            message: message.into(),
            file: file.into(),
            span,
        }
    }

    pub fn syntax(file: impl Into<String>, source: impl Into<ParserError>) -> Self {
        Self::Syntax {
            file: file.into(),
            source: source.into(),
        }
    }

    pub fn io(file: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            file: file.into(),
            source,
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            Self::General { span, .. } => Some(*span),
            Self::Syntax { source, .. } => Some(source.span()),
            _ => None,
        }
    }
}

/// Fatal runtime errors. Recoverable errors are thrown values and never
/// surface here unless no handler catches them.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Integer division by zero")]
    DivisionByZero,

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Index out of bounds: {index} (length {length})")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("Cannot call non-function value of type {0}")]
    NotCallable(&'static str),

    #[error("Uncaught exception: {0}")]
    UncaughtException(String),

    #[error("Invalid bytecode: {0}")]
    InvalidBytecode(String),

    #[error("Value stack underflow")]
    StackUnderflow,

    #[error("Maximum call depth of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("{0}")]
    General(String),

    #[error("[{file}] {source}")]
    InModule {
        file: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::General(message.into())
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError(message.into())
    }

    pub fn invalid_bytecode(message: impl Into<String>) -> Self {
        Self::InvalidBytecode(message.into())
    }

    pub fn index_out_of_bounds(index: i64, length: usize) -> Self {
        Self::IndexOutOfBounds { index, length }
    }

    /// Attach the path of the module that was executing. Already-located
    /// errors are returned unchanged.
    pub fn in_module(self, file: impl Into<String>) -> Self {
        match self {
            located @ Self::InModule { .. } => located,
            other => Self::InModule {
                file: file.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error without its module location.
    pub fn root(&self) -> &RuntimeError {
        match self {
            Self::InModule { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors reading or writing the binary module format.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Not a proto file (magic {0:#010x})")]
    InvalidMagic(u32),

    #[error("Unsupported proto version {0}.{1}")]
    UnsupportedVersion(u8, u8),

    #[error("Unknown constant tag {0}")]
    UnknownConstTag(u8),

    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A unified error type for all phases.
#[derive(Debug, Error)]
pub enum GscriptError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("Proto error: {0}")]
    Proto(#[from] ProtoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
