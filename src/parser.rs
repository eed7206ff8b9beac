//! Recursive-descent parser producing the program AST.
//!
//! The parser mirrors the classic chibicc structure: one helper per
//! precedence tier, each looping over its own operators so chains associate
//! to the left, and a thin statement layer on top. Variables are declared
//! into the symbol table as assignments and `input` statements are seen, so
//! every identifier node leaves the parser already bound to a slot with a
//! known kind.

use snafu::ResultExt;

use crate::error::{
  CompileResult, ExpectedSnafu, KindConflictSnafu, Location, ParseSnafu, SemanticError,
  SemanticSnafu, TooDeepSnafu,
};
use crate::symbols::SymbolTable;
use crate::tokenizer::{Lexeme, LexemeKind};
use crate::ty::Kind;

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Mod,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

impl BinaryOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Mod => "%",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
      BinaryOp::And => "&&",
      BinaryOp::Or => "||",
    }
  }

  /// Evaluate the operator on two integers. Arithmetic wraps on overflow,
  /// division and remainder truncate toward zero, comparisons and logical
  /// operators yield 1 or 0. Returns `None` for a zero divisor.
  ///
  /// Both the optimizer and the virtual machine go through this function so
  /// folded and executed results cannot drift apart.
  pub fn apply(&self, lhs: i64, rhs: i64) -> Option<i64> {
    let value = match self {
      BinaryOp::Add => lhs.wrapping_add(rhs),
      BinaryOp::Sub => lhs.wrapping_sub(rhs),
      BinaryOp::Mul => lhs.wrapping_mul(rhs),
      BinaryOp::Div if rhs == 0 => return None,
      BinaryOp::Div => lhs.wrapping_div(rhs),
      BinaryOp::Mod if rhs == 0 => return None,
      BinaryOp::Mod => lhs.wrapping_rem(rhs),
      BinaryOp::Eq => i64::from(lhs == rhs),
      BinaryOp::Ne => i64::from(lhs != rhs),
      BinaryOp::Lt => i64::from(lhs < rhs),
      BinaryOp::Le => i64::from(lhs <= rhs),
      BinaryOp::Gt => i64::from(lhs > rhs),
      BinaryOp::Ge => i64::from(lhs >= rhs),
      BinaryOp::And => i64::from(lhs != 0 && rhs != 0),
      BinaryOp::Or => i64::from(lhs != 0 || rhs != 0),
    };
    Some(value)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
  Neg,
  Not,
}

impl UnaryOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      UnaryOp::Neg => "-",
      UnaryOp::Not => "!",
    }
  }

  pub fn apply(&self, operand: i64) -> i64 {
    match self {
      UnaryOp::Neg => operand.wrapping_neg(),
      UnaryOp::Not => i64::from(operand == 0),
    }
  }
}

/// Program tree produced by the parser. Identifier and string nodes hold a
/// slot in the accompanying [`SymbolTable`] rather than the name or text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AstNode {
  Nop,
  /// Terminates the top-level sequence; lowered to `Halt`.
  End,
  Ident {
    slot: usize,
    kind: Kind,
  },
  Integer {
    value: i64,
  },
  Str {
    slot: usize,
  },
  Assign {
    slot: usize,
    value: Box<AstNode>,
  },
  Unary {
    op: UnaryOp,
    operand: Box<AstNode>,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<AstNode>,
    rhs: Box<AstNode>,
  },
  If {
    cond: Box<AstNode>,
    then_branch: Box<AstNode>,
    else_branch: Option<Box<AstNode>>,
  },
  While {
    cond: Box<AstNode>,
    body: Box<AstNode>,
  },
  PrintStr {
    value: Box<AstNode>,
  },
  PrintInt {
    value: Box<AstNode>,
  },
  Input {
    slot: usize,
  },
  Sequence {
    body: Vec<AstNode>,
  },
}

impl AstNode {
  pub fn number(value: i64) -> Self {
    Self::Integer { value }
  }

  pub fn unary(op: UnaryOp, operand: AstNode) -> Self {
    Self::Unary {
      op,
      operand: Box::new(operand),
    }
  }

  pub fn binary(op: BinaryOp, lhs: AstNode, rhs: AstNode) -> Self {
    Self::Binary {
      op,
      lhs: Box::new(lhs),
      rhs: Box::new(rhs),
    }
  }

  pub fn assign(slot: usize, value: AstNode) -> Self {
    Self::Assign {
      slot,
      value: Box::new(value),
    }
  }

  /// Static kind of an expression node; `None` for statements.
  pub fn kind(&self) -> Option<Kind> {
    match self {
      AstNode::Ident { kind, .. } => Some(*kind),
      AstNode::Str { .. } => Some(Kind::Str),
      AstNode::Integer { .. } | AstNode::Unary { .. } | AstNode::Binary { .. } => Some(Kind::Int),
      _ => None,
    }
  }

  /// Descriptive name used by listings.
  pub fn name(&self) -> &'static str {
    match self {
      AstNode::Nop => "No_operation",
      AstNode::End => "End_of_file",
      AstNode::Ident { .. } => "Identifier",
      AstNode::Integer { .. } => "Integer",
      AstNode::Str { .. } => "String",
      AstNode::Assign { .. } => "Op_Assign",
      AstNode::Unary { op, .. } => match op {
        UnaryOp::Neg => "Op_Negate",
        UnaryOp::Not => "Op_Not",
      },
      AstNode::Binary { op, .. } => match op {
        BinaryOp::Add => "Op_Add",
        BinaryOp::Sub => "Op_Subtract",
        BinaryOp::Mul => "Op_Multiply",
        BinaryOp::Div => "Op_Divide",
        BinaryOp::Mod => "Op_Mod",
        BinaryOp::Eq => "Op_Equal",
        BinaryOp::Ne => "Op_NotEqual",
        BinaryOp::Lt => "Op_Less",
        BinaryOp::Le => "Op_LessEqual",
        BinaryOp::Gt => "Op_Greater",
        BinaryOp::Ge => "Op_GreaterEqual",
        BinaryOp::And => "Op_And",
        BinaryOp::Or => "Op_Or",
      },
      AstNode::If { .. } => "Keyword_If",
      AstNode::While { .. } => "Keyword_While",
      AstNode::PrintStr { .. } => "Print_String",
      AstNode::PrintInt { .. } => "Print_Integer",
      AstNode::Input { .. } => "Keyword_input",
      AstNode::Sequence { .. } => "Code_sequence",
    }
  }
}

/// Parse a whole program, declaring its variables into `symbols`.
///
/// The result is always a `Sequence` whose last element is `End`. Any error
/// aborts the parse; no partial tree is returned.
pub fn parse(lexemes: Vec<Lexeme>, symbols: &mut SymbolTable) -> CompileResult<AstNode> {
  let mut parser = Parser::new(lexemes, symbols);
  let mut body = Vec::new();
  while !parser.stream.is_eof() {
    body.push(parser.statement()?);
  }
  body.push(AstNode::End);
  Ok(AstNode::Sequence { body })
}

type BinaryTable = [(LexemeKind, BinaryOp)];

const OR_OPS: &BinaryTable = &[(LexemeKind::Or, BinaryOp::Or)];
const AND_OPS: &BinaryTable = &[(LexemeKind::And, BinaryOp::And)];
const EQUALITY_OPS: &BinaryTable = &[
  (LexemeKind::Eq, BinaryOp::Eq),
  (LexemeKind::Ne, BinaryOp::Ne),
];
const RELATIONAL_OPS: &BinaryTable = &[
  (LexemeKind::Lt, BinaryOp::Lt),
  (LexemeKind::Gt, BinaryOp::Gt),
  (LexemeKind::Le, BinaryOp::Le),
  (LexemeKind::Ge, BinaryOp::Ge),
];
const ADDITIVE_OPS: &BinaryTable = &[
  (LexemeKind::Add, BinaryOp::Add),
  (LexemeKind::Sub, BinaryOp::Sub),
];
const TERM_OPS: &BinaryTable = &[
  (LexemeKind::Mul, BinaryOp::Mul),
  (LexemeKind::Div, BinaryOp::Div),
  (LexemeKind::Mod, BinaryOp::Mod),
];

/// How deep blocks, parentheses, unary operators and operator chains may
/// nest. Bounds both the parser's own recursion and the height of the tree
/// that later passes walk recursively.
pub const MAX_DEPTH: usize = 64;

struct Parser<'a> {
  stream: TokenStream,
  symbols: &'a mut SymbolTable,
  depth: usize,
}

impl<'a> Parser<'a> {
  fn new(lexemes: Vec<Lexeme>, symbols: &'a mut SymbolTable) -> Self {
    Self {
      stream: TokenStream::new(lexemes),
      symbols,
      depth: 0,
    }
  }

  fn statement(&mut self) -> CompileResult<AstNode> {
    match self.stream.peek().kind {
      LexemeKind::Semi => {
        self.stream.advance();
        Ok(AstNode::Nop)
      }
      LexemeKind::LBrace => self.nested(Self::block),
      LexemeKind::If => self.nested(Self::if_stmt),
      LexemeKind::While => self.nested(Self::while_stmt),
      LexemeKind::Print => self.print_stmt(),
      LexemeKind::Input => self.input_stmt(),
      LexemeKind::Ident => self.assignment(),
      _ => expected("a statement", self.stream.peek()),
    }
  }

  fn block(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::LBrace)?;
    let mut body = Vec::new();
    while !self.stream.equal(LexemeKind::RBrace) {
      if self.stream.is_eof() {
        return expected("\"}\"", self.stream.peek());
      }
      body.push(self.statement()?);
    }
    Ok(AstNode::Sequence { body })
  }

  fn if_stmt(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::If)?;
    let cond = self.condition()?;
    let then_branch = self.statement()?;
    // A trailing `else` always belongs to the innermost open `if`.
    let else_branch = if self.stream.equal(LexemeKind::Else) {
      Some(Box::new(self.statement()?))
    } else {
      None
    };
    Ok(AstNode::If {
      cond: Box::new(cond),
      then_branch: Box::new(then_branch),
      else_branch,
    })
  }

  fn while_stmt(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::While)?;
    let cond = self.condition()?;
    let body = self.statement()?;
    Ok(AstNode::While {
      cond: Box::new(cond),
      body: Box::new(body),
    })
  }

  fn condition(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::LParen)?;
    let at = self.stream.peek().at;
    let cond = self.expr()?;
    self.stream.skip(LexemeKind::RParen)?;
    require_integer(&cond, "condition", at)?;
    Ok(cond)
  }

  fn print_stmt(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::Print)?;
    let mut prints = Vec::new();
    loop {
      let value = Box::new(self.expr()?);
      prints.push(match expr_kind(&value) {
        Kind::Str => AstNode::PrintStr { value },
        Kind::Int => AstNode::PrintInt { value },
      });
      if !self.stream.equal(LexemeKind::Comma) {
        break;
      }
    }
    self.stream.skip(LexemeKind::Semi)?;

    if prints.len() == 1 {
      Ok(prints.remove(0))
    } else {
      Ok(AstNode::Sequence { body: prints })
    }
  }

  fn input_stmt(&mut self) -> CompileResult<AstNode> {
    self.stream.skip(LexemeKind::Input)?;
    let parenthesised = self.stream.equal(LexemeKind::LParen);
    let (name, at) = self.stream.get_ident()?;
    if parenthesised {
      self.stream.skip(LexemeKind::RParen)?;
    }
    self.stream.skip(LexemeKind::Semi)?;

    // Reading into an undeclared name declares it as an integer.
    let kind = self
      .symbols
      .lookup(&name)
      .ok()
      .and_then(|slot| self.symbols.variable(slot))
      .map_or(Kind::Int, |var| var.kind);
    let slot = self.declare(&name, kind, at)?;
    Ok(AstNode::Input { slot })
  }

  fn assignment(&mut self) -> CompileResult<AstNode> {
    let (name, at) = self.stream.get_ident()?;
    self.stream.skip(LexemeKind::Assign)?;
    let value = self.expr()?;
    self.stream.skip(LexemeKind::Semi)?;

    // The right-hand side is parsed first, so `x = x + 1;` needs a prior
    // declaration of `x`.
    let slot = self.declare(&name, expr_kind(&value), at)?;
    Ok(AstNode::assign(slot, value))
  }

  fn expr(&mut self) -> CompileResult<AstNode> {
    self.logical_or()
  }

  fn logical_or(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(OR_OPS, Self::logical_and)
  }

  fn logical_and(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(AND_OPS, Self::equality)
  }

  fn equality(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(EQUALITY_OPS, Self::relational)
  }

  fn relational(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(RELATIONAL_OPS, Self::additive)
  }

  fn additive(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(ADDITIVE_OPS, Self::term)
  }

  fn term(&mut self) -> CompileResult<AstNode> {
    self.binary_tier(TERM_OPS, Self::unary)
  }

  /// Parse `next (op next)*` for the operators of one precedence tier.
  fn binary_tier(
    &mut self,
    ops: &BinaryTable,
    next: fn(&mut Self) -> CompileResult<AstNode>,
  ) -> CompileResult<AstNode> {
    let depth = self.depth;
    let mut node = next(self)?;

    loop {
      let lexeme = self.stream.peek();
      let Some(op) = ops
        .iter()
        .find(|(kind, _)| *kind == lexeme.kind)
        .map(|(_, op)| *op)
      else {
        break;
      };
      let at = lexeme.at;
      self.stream.advance();

      // Every chained operator lengthens the left spine by one node.
      self.descend(at)?;
      let rhs = next(self)?;
      require_integer(&node, &format!("left operand of \"{}\"", op.symbol()), at)?;
      require_integer(&rhs, &format!("right operand of \"{}\"", op.symbol()), at)?;
      node = AstNode::binary(op, node, rhs);
    }

    self.depth = depth;
    Ok(node)
  }

  fn unary(&mut self) -> CompileResult<AstNode> {
    let op = match self.stream.peek().kind {
      LexemeKind::Sub => UnaryOp::Neg,
      LexemeKind::Not => UnaryOp::Not,
      _ => return self.primary(),
    };
    let at = self.stream.advance().at;
    let operand = self.nested(Self::unary)?;
    require_integer(&operand, &format!("operand of \"{}\"", op.symbol()), at)?;
    Ok(AstNode::unary(op, operand))
  }

  fn primary(&mut self) -> CompileResult<AstNode> {
    let lexeme = self.stream.peek().clone();
    match lexeme.kind {
      LexemeKind::Integer => {
        self.stream.advance();
        Ok(AstNode::number(lexeme.value.unwrap_or_default()))
      }
      LexemeKind::String => {
        self.stream.advance();
        let slot = self.symbols.intern_string(&lexeme.text);
        Ok(AstNode::Str { slot })
      }
      LexemeKind::Ident => {
        self.stream.advance();
        let slot = self
          .symbols
          .lookup(&lexeme.text)
          .map_err(|err| SemanticError::from_symbol(err, lexeme.at))
          .context(SemanticSnafu)?;
        let kind = self
          .symbols
          .variable(slot)
          .map_or(Kind::Int, |var| var.kind);
        Ok(AstNode::Ident { slot, kind })
      }
      LexemeKind::LParen => {
        self.stream.advance();
        let node = self.nested(Self::expr)?;
        self.stream.skip(LexemeKind::RParen)?;
        Ok(node)
      }
      _ => expected("an expression", &lexeme),
    }
  }

  /// Run `parse` one nesting level deeper.
  fn nested<T>(&mut self, parse: fn(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
    let at = self.stream.peek().at;
    self.descend(at)?;
    let result = parse(self);
    self.depth -= 1;
    result
  }

  fn descend(&mut self, at: Location) -> CompileResult<()> {
    if self.depth >= MAX_DEPTH {
      return TooDeepSnafu {
        limit: MAX_DEPTH,
        at,
      }
      .fail()
      .context(ParseSnafu);
    }
    self.depth += 1;
    Ok(())
  }

  fn declare(&mut self, name: &str, kind: Kind, at: Location) -> CompileResult<usize> {
    self
      .symbols
      .declare(name, kind)
      .map_err(|err| SemanticError::from_symbol(err, at))
      .context(SemanticSnafu)
  }
}

fn expr_kind(node: &AstNode) -> Kind {
  node.kind().unwrap_or(Kind::Int)
}

fn require_integer(node: &AstNode, subject: &str, at: Location) -> CompileResult<()> {
  match expr_kind(node) {
    Kind::Int => Ok(()),
    found => KindConflictSnafu {
      subject,
      expected: Kind::Int,
      found,
      at,
    }
    .fail()
    .context(SemanticSnafu),
  }
}

fn expected<T>(what: &str, got: &Lexeme) -> CompileResult<T> {
  ExpectedSnafu {
    expected: what,
    got: got.describe(),
    at: got.at,
  }
  .fail()
  .context(ParseSnafu)
}

/// Lightweight cursor over the lexeme vector. The vector always ends in an
/// `Eof` lexeme and the cursor never moves past it.
struct TokenStream {
  lexemes: Vec<Lexeme>,
  pos: usize,
}

impl TokenStream {
  fn new(mut lexemes: Vec<Lexeme>) -> Self {
    if lexemes.last().is_none_or(|lexeme| lexeme.kind != LexemeKind::Eof) {
      let at = lexemes.last().map(|lexeme| lexeme.at).unwrap_or_default();
      lexemes.push(Lexeme::new(LexemeKind::Eof, "", at));
    }
    Self { lexemes, pos: 0 }
  }

  fn peek(&self) -> &Lexeme {
    &self.lexemes[self.pos]
  }

  /// Consume and return the current lexeme, staying put on `Eof`.
  fn advance(&mut self) -> Lexeme {
    let lexeme = self.lexemes[self.pos].clone();
    if self.pos + 1 < self.lexemes.len() {
      self.pos += 1;
    }
    lexeme
  }

  /// Consume the current lexeme if it has the given kind.
  fn equal(&mut self, kind: LexemeKind) -> bool {
    if self.peek().kind == kind {
      self.advance();
      return true;
    }
    false
  }

  fn skip(&mut self, kind: LexemeKind) -> CompileResult<()> {
    if self.equal(kind) {
      Ok(())
    } else {
      expected(&kind.describe(), self.peek())
    }
  }

  fn get_ident(&mut self) -> CompileResult<(String, Location)> {
    if self.peek().kind == LexemeKind::Ident {
      let lexeme = self.advance();
      return Ok((lexeme.text, lexeme.at));
    }
    expected("an identifier", self.peek())
  }

  fn is_eof(&self) -> bool {
    self.peek().kind == LexemeKind::Eof
  }
}
