//! Shared error utilities used across the compilation pipeline.
//!
//! Every phase owns a small error enum and fails fast: the first error aborts
//! the phase and nothing downstream runs. Compile-time errors carry a 1-based
//! source position, runtime errors carry the instruction index that raised
//! them. `render` formats a compile error in the chibicc style, echoing the
//! offending line with a caret under the column.

use std::fmt;

use snafu::Snafu;

use crate::ty::Kind;

pub type CompileResult<T> = Result<T, CompileError>;
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Line/column pair, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
  pub line: usize,
  pub column: usize,
}

impl Location {
  pub fn new(line: usize, column: usize) -> Self {
    Self { line, column }
  }
}

impl fmt::Display for Location {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LexError {
  #[snafu(display("{at}: unexpected character '{ch}'"))]
  UnexpectedChar { ch: char, at: Location },

  #[snafu(display("{at}: unterminated string literal"))]
  UnterminatedString { at: Location },

  #[snafu(display("{at}: integer literal {text} does not fit in 64 bits"))]
  IntegerOverflow { text: String, at: Location },
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ParseError {
  #[snafu(display("{at}: expected {expected}, but got {got}"))]
  Expected {
    expected: String,
    got: String,
    at: Location,
  },

  #[snafu(display("{at}: program nests deeper than {limit} levels"))]
  TooDeep { limit: usize, at: Location },
}

/// Failures reported by the symbol table itself; the parser attaches a
/// source position and turns them into a [`SemanticError`].
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SymbolError {
  #[snafu(display("'{name}' is used before it is assigned"))]
  #[snafu(context(name(SymbolUndeclaredSnafu)))]
  UndeclaredIdentifier { name: String },

  #[snafu(display("'{name}' was declared {declared}, cannot hold {requested}"))]
  #[snafu(context(name(SymbolKindConflictSnafu)))]
  KindConflict {
    name: String,
    declared: Kind,
    requested: Kind,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SemanticError {
  #[snafu(display("{at}: undeclared identifier '{name}'"))]
  UndeclaredIdentifier { name: String, at: Location },

  #[snafu(display("{at}: {subject} must be {expected}, found {found}"))]
  KindConflict {
    subject: String,
    expected: Kind,
    found: Kind,
    at: Location,
  },
}

impl SemanticError {
  /// Anchor a symbol-table failure at the position that triggered it.
  pub fn from_symbol(err: SymbolError, at: Location) -> Self {
    match err {
      SymbolError::UndeclaredIdentifier { name } => Self::UndeclaredIdentifier { name, at },
      SymbolError::KindConflict {
        name,
        declared,
        requested,
      } => Self::KindConflict {
        subject: format!("variable '{name}'"),
        expected: declared,
        found: requested,
        at,
      },
    }
  }
}

/// Label bookkeeping failures. These only fire on a generator bug; a
/// well-formed AST always links.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LinkError {
  #[snafu(display("instruction {pc} jumps to undefined label L{label}"))]
  UndefinedLabel { label: usize, pc: usize },

  #[snafu(display("label L{label} is defined at both {first} and {second}"))]
  DuplicateLabel {
    label: usize,
    first: usize,
    second: usize,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CompileError {
  #[snafu(display("lexical error at {source}"))]
  Lex { source: LexError },

  #[snafu(display("syntax error at {source}"))]
  Parse { source: ParseError },

  #[snafu(display("semantic error at {source}"))]
  Semantic { source: SemanticError },

  #[snafu(display("internal error: {source}"))]
  Link { source: LinkError },
}

impl CompileError {
  /// Source position of the error, if it has one.
  pub fn location(&self) -> Option<Location> {
    match self {
      Self::Lex { source } => Some(match source {
        LexError::UnexpectedChar { at, .. }
        | LexError::UnterminatedString { at }
        | LexError::IntegerOverflow { at, .. } => *at,
      }),
      Self::Parse { source } => Some(match source {
        ParseError::Expected { at, .. } | ParseError::TooDeep { at, .. } => *at,
      }),
      Self::Semantic { source } => Some(match source {
        SemanticError::UndeclaredIdentifier { at, .. } | SemanticError::KindConflict { at, .. } => {
          *at
        }
      }),
      Self::Link { .. } => None,
    }
  }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuntimeError {
  #[snafu(display("instruction {pc}: division by zero"))]
  DivisionByZero { pc: usize },

  #[snafu(display("instruction {pc}: expected {expected} value, found {found}"))]
  TypeMismatch {
    pc: usize,
    expected: Kind,
    found: Kind,
  },

  #[snafu(display("instruction {pc}: input {text:?} is not an integer"))]
  InputKindMismatch { pc: usize, text: String },

  #[snafu(display("instruction {pc}: input requested but none is available"))]
  InputExhausted { pc: usize },

  #[snafu(display("instruction {pc}: operand stack underflow"))]
  StackUnderflow { pc: usize },

  #[snafu(display("instruction {pc}: step limit of {limit} exceeded"))]
  StepLimit { pc: usize, limit: u64 },

  #[snafu(display("instruction {pc}: operand does not resolve to a slot or label"))]
  InvalidOperand { pc: usize },

  #[snafu(display("instruction {pc}: I/O failure: {source}"))]
  Io { pc: usize, source: std::io::Error },
}

impl RuntimeError {
  /// Index of the instruction that failed.
  pub fn pc(&self) -> usize {
    match self {
      Self::DivisionByZero { pc }
      | Self::TypeMismatch { pc, .. }
      | Self::InputKindMismatch { pc, .. }
      | Self::InputExhausted { pc }
      | Self::StackUnderflow { pc }
      | Self::StepLimit { pc, .. }
      | Self::InvalidOperand { pc }
      | Self::Io { pc, .. } => *pc,
    }
  }
}

/// Either half of a compile-and-run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
  #[snafu(display("{source}"))]
  Compile { source: CompileError },

  #[snafu(display("runtime error at {source}"))]
  Runtime { source: RuntimeError },
}

/// Format a compile error against the source it came from, pointing at the
/// offending column with a caret.
pub fn render(source: &str, err: &CompileError) -> String {
  let Some(at) = err.location() else {
    return err.to_string();
  };
  let line = source.lines().nth(at.line.saturating_sub(1)).unwrap_or("");
  let marker = format!("{}^", " ".repeat(at.column.saturating_sub(1)));
  format!("{line}\n{marker} {err}")
}
