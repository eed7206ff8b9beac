//! Lexical analysis: turns the raw input string into a stream of lexemes.
//!
//! The lexer knows nothing about semantics beyond recognising operators,
//! keywords, and literals. Multi-character punctuators are matched before
//! single-character ones to avoid ambiguity, and keywords are looked up only
//! after a whole identifier has been scanned.

use snafu::ensure;

use crate::error::{
  IntegerOverflowSnafu, LexError, Location, UnexpectedCharSnafu, UnterminatedStringSnafu,
};

/// Kinds of lexemes recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LexemeKind {
  #[default]
  Nop,
  Eof,
  Ident,
  Integer,
  String,
  Assign,
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  Ne,
  Lt,
  Gt,
  Le,
  Ge,
  And,
  Or,
  Not,
  If,
  Else,
  While,
  LParen,
  RParen,
  LBrace,
  RBrace,
  Semi,
  Comma,
  Print,
  Input,
}

const KEYWORDS: [(&str, LexemeKind); 5] = [
  ("if", LexemeKind::If),
  ("else", LexemeKind::Else),
  ("while", LexemeKind::While),
  ("print", LexemeKind::Print),
  ("input", LexemeKind::Input),
];

const DOUBLE_PUNCTUATORS: [(&str, LexemeKind); 6] = [
  ("==", LexemeKind::Eq),
  ("!=", LexemeKind::Ne),
  ("<=", LexemeKind::Le),
  (">=", LexemeKind::Ge),
  ("&&", LexemeKind::And),
  ("||", LexemeKind::Or),
];

impl LexemeKind {
  /// Descriptive name used by listings.
  pub fn name(&self) -> &'static str {
    match self {
      LexemeKind::Nop => "No_operation",
      LexemeKind::Eof => "End_of_file",
      LexemeKind::Ident => "Identifier",
      LexemeKind::Integer => "Integer",
      LexemeKind::String => "String",
      LexemeKind::Assign => "Op_Assign",
      LexemeKind::Add => "Op_Add",
      LexemeKind::Sub => "Op_Subtract",
      LexemeKind::Mul => "Op_Multiply",
      LexemeKind::Div => "Op_Divide",
      LexemeKind::Mod => "Op_Mod",
      LexemeKind::Eq => "Op_Equal",
      LexemeKind::Ne => "Op_NotEqual",
      LexemeKind::Lt => "Op_Less",
      LexemeKind::Gt => "Op_Greater",
      LexemeKind::Le => "Op_LessEqual",
      LexemeKind::Ge => "Op_GreaterEqual",
      LexemeKind::And => "Op_And",
      LexemeKind::Or => "Op_Or",
      LexemeKind::Not => "Op_Not",
      LexemeKind::If => "Keyword_If",
      LexemeKind::Else => "Keyword_Else",
      LexemeKind::While => "Keyword_While",
      LexemeKind::LParen => "LeftParen",
      LexemeKind::RParen => "RightParen",
      LexemeKind::LBrace => "LeftBrace",
      LexemeKind::RBrace => "RightBrace",
      LexemeKind::Semi => "Semicolon",
      LexemeKind::Comma => "Comma",
      LexemeKind::Print => "Keyword_print",
      LexemeKind::Input => "Keyword_input",
    }
  }

  /// Fixed spelling of punctuators and keywords; `None` for lexemes whose
  /// text varies.
  pub fn symbol(&self) -> Option<&'static str> {
    let text = match self {
      LexemeKind::Nop | LexemeKind::Eof => return None,
      LexemeKind::Ident | LexemeKind::Integer | LexemeKind::String => return None,
      LexemeKind::Assign => "=",
      LexemeKind::Add => "+",
      LexemeKind::Sub => "-",
      LexemeKind::Mul => "*",
      LexemeKind::Div => "/",
      LexemeKind::Mod => "%",
      LexemeKind::Eq => "==",
      LexemeKind::Ne => "!=",
      LexemeKind::Lt => "<",
      LexemeKind::Gt => ">",
      LexemeKind::Le => "<=",
      LexemeKind::Ge => ">=",
      LexemeKind::And => "&&",
      LexemeKind::Or => "||",
      LexemeKind::Not => "!",
      LexemeKind::If => "if",
      LexemeKind::Else => "else",
      LexemeKind::While => "while",
      LexemeKind::LParen => "(",
      LexemeKind::RParen => ")",
      LexemeKind::LBrace => "{",
      LexemeKind::RBrace => "}",
      LexemeKind::Semi => ";",
      LexemeKind::Comma => ",",
      LexemeKind::Print => "print",
      LexemeKind::Input => "input",
    };
    Some(text)
  }

  /// Human-friendly description of what a parser expected to see.
  pub fn describe(&self) -> String {
    match (self, self.symbol()) {
      (_, Some(symbol)) => format!("\"{symbol}\""),
      (LexemeKind::Ident, None) => "an identifier".to_string(),
      (LexemeKind::Integer, None) => "an integer".to_string(),
      (LexemeKind::String, None) => "a string".to_string(),
      (LexemeKind::Eof, None) => "EOF".to_string(),
      _ => self.name().to_string(),
    }
  }
}

/// A classified, positioned token.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lexeme {
  pub kind: LexemeKind,
  /// Identifier name, string contents (without quotes), or literal digits.
  pub text: String,
  pub value: Option<i64>,
  pub at: Location,
}

impl Lexeme {
  pub fn new(kind: LexemeKind, text: impl Into<String>, at: Location) -> Self {
    Self {
      kind,
      text: text.into(),
      value: None,
      at,
    }
  }

  /// Human-friendly description used in diagnostics.
  pub fn describe(&self) -> String {
    match self.kind {
      LexemeKind::Eof => "EOF".to_string(),
      _ => format!("\"{}\"", self.text),
    }
  }
}

/// Cursor over the source that hands out one lexeme per call.
pub struct Lexer<'a> {
  source: &'a str,
  pos: usize,
  line: usize,
  column: usize,
}

impl<'a> Lexer<'a> {
  pub fn new(source: &'a str) -> Self {
    Self {
      source,
      pos: 0,
      line: 1,
      column: 1,
    }
  }

  /// Scan the next lexeme. Once the input is exhausted every call returns
  /// an `Eof` lexeme.
  pub fn next_lexeme(&mut self) -> Result<Lexeme, LexError> {
    while self.peek().is_some_and(|c| c.is_whitespace()) {
      self.bump();
    }

    let at = self.location();
    let Some(c) = self.peek() else {
      return Ok(Lexeme::new(LexemeKind::Eof, "", at));
    };

    if c.is_ascii_digit() {
      return self.integer(at);
    }

    if c.is_ascii_alphabetic() || c == '_' {
      return Ok(self.word(at));
    }

    if c == '"' {
      return self.string(at);
    }

    if let Some((op, kind)) = DOUBLE_PUNCTUATORS
      .into_iter()
      .find(|(op, _)| self.rest().starts_with(op))
    {
      self.bump();
      self.bump();
      return Ok(Lexeme::new(kind, op, at));
    }

    let kind = match c {
      '=' => LexemeKind::Assign,
      '+' => LexemeKind::Add,
      '-' => LexemeKind::Sub,
      '*' => LexemeKind::Mul,
      '/' => LexemeKind::Div,
      '%' => LexemeKind::Mod,
      '<' => LexemeKind::Lt,
      '>' => LexemeKind::Gt,
      '!' => LexemeKind::Not,
      '(' => LexemeKind::LParen,
      ')' => LexemeKind::RParen,
      '{' => LexemeKind::LBrace,
      '}' => LexemeKind::RBrace,
      ';' => LexemeKind::Semi,
      ',' => LexemeKind::Comma,
      _ => return UnexpectedCharSnafu { ch: c, at }.fail(),
    };
    self.bump();
    Ok(Lexeme::new(kind, c, at))
  }

  fn integer(&mut self, at: Location) -> Result<Lexeme, LexError> {
    let start = self.pos;
    while self.peek().is_some_and(|c| c.is_ascii_digit()) {
      self.bump();
    }
    let text = &self.source[start..self.pos];
    let value = text.parse::<i64>().ok();
    ensure!(value.is_some(), IntegerOverflowSnafu { text, at });
    Ok(Lexeme {
      value,
      ..Lexeme::new(LexemeKind::Integer, text, at)
    })
  }

  fn word(&mut self, at: Location) -> Lexeme {
    let start = self.pos;
    while self
      .peek()
      .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
    {
      self.bump();
    }
    let text = &self.source[start..self.pos];
    let kind = KEYWORDS
      .into_iter()
      .find(|(keyword, _)| *keyword == text)
      .map_or(LexemeKind::Ident, |(_, kind)| kind);
    Lexeme::new(kind, text, at)
  }

  fn string(&mut self, at: Location) -> Result<Lexeme, LexError> {
    self.bump();
    let start = self.pos;
    loop {
      match self.peek() {
        Some('"') => break,
        Some('\n') | None => return UnterminatedStringSnafu { at }.fail(),
        Some(_) => {
          self.bump();
        }
      }
    }
    let text = &self.source[start..self.pos];
    self.bump();
    Ok(Lexeme::new(LexemeKind::String, text, at))
  }

  fn rest(&self) -> &'a str {
    &self.source[self.pos..]
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    if c == '\n' {
      self.line += 1;
      self.column = 1;
    } else {
      self.column += 1;
    }
    Some(c)
  }

  fn location(&self) -> Location {
    Location::new(self.line, self.column)
  }
}

/// Lex the input into a flat vector of lexemes terminated by an `Eof` marker.
pub fn tokenize(input: &str) -> Result<Vec<Lexeme>, LexError> {
  let mut lexer = Lexer::new(input);
  let mut lexemes = Vec::new();
  loop {
    let lexeme = lexer.next_lexeme()?;
    let done = lexeme.kind == LexemeKind::Eof;
    lexemes.push(lexeme);
    if done {
      return Ok(lexemes);
    }
  }
}
