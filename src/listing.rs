//! Plain-text listings of each compiler stage's output.
//!
//! Everything here only reads the lexemes, AST, symbol table and program; the
//! CLI prints the results for `--tokens`, `--ast`, `--symbols` and `--asm`.

use crate::codegen::{Instruction, Program};
use crate::parser::AstNode;
use crate::symbols::SymbolTable;
use crate::tokenizer::{Lexeme, LexemeKind};

/// One lexeme per line: position, kind name, then the literal value if any.
pub fn lexemes(lexemes: &[Lexeme]) -> String {
  let mut out = String::new();
  out.push_str(" line  col  kind             value\n");
  for lexeme in lexemes {
    let value = match lexeme.kind {
      LexemeKind::Integer => lexeme.value.map(|v| v.to_string()).unwrap_or_default(),
      LexemeKind::Ident => lexeme.text.clone(),
      LexemeKind::String => format!("\"{}\"", lexeme.text),
      _ => String::new(),
    };
    let line = format!(
      "{:>5} {:>4}  {:<16} {value}",
      lexeme.at.line,
      lexeme.at.column,
      lexeme.kind.name()
    );
    out.push_str(line.trim_end());
    out.push('\n');
  }
  out
}

/// Pre-order dump of the tree, two spaces of indent per level.
pub fn ast(ast: &AstNode, symbols: &SymbolTable) -> String {
  let mut out = String::new();
  write_node(&mut out, ast, symbols, 0);
  out
}

fn write_node(out: &mut String, node: &AstNode, symbols: &SymbolTable, depth: usize) {
  let indent = "  ".repeat(depth);
  let detail = match node {
    AstNode::Ident { slot, .. } | AstNode::Input { slot } => variable_name(symbols, *slot),
    AstNode::Assign { slot, .. } => format!("{} =", variable_name(symbols, *slot)),
    AstNode::Integer { value } => value.to_string(),
    AstNode::Str { slot } => format!("\"{}\"", symbols.string(*slot).unwrap_or("?")),
    AstNode::Unary { op, .. } => op.symbol().to_string(),
    AstNode::Binary { op, .. } => op.symbol().to_string(),
    _ => String::new(),
  };
  let line = format!("{indent}{} {detail}", node.name());
  out.push_str(line.trim_end());
  out.push('\n');

  let depth = depth + 1;
  match node {
    AstNode::Assign { value, .. }
    | AstNode::PrintInt { value }
    | AstNode::PrintStr { value } => write_node(out, value, symbols, depth),
    AstNode::Unary { operand, .. } => write_node(out, operand, symbols, depth),
    AstNode::Binary { lhs, rhs, .. } => {
      write_node(out, lhs, symbols, depth);
      write_node(out, rhs, symbols, depth);
    }
    AstNode::If {
      cond,
      then_branch,
      else_branch,
    } => {
      write_node(out, cond, symbols, depth);
      write_node(out, then_branch, symbols, depth);
      if let Some(branch) = else_branch {
        write_node(out, branch, symbols, depth);
      }
    }
    AstNode::While { cond, body } => {
      write_node(out, cond, symbols, depth);
      write_node(out, body, symbols, depth);
    }
    AstNode::Sequence { body } => {
      for child in body {
        write_node(out, child, symbols, depth);
      }
    }
    _ => {}
  }
}

/// Variables with their slot and kind, then the interned strings.
pub fn symbols(symbols: &SymbolTable) -> String {
  let mut out = String::new();
  out.push_str("variables:\n");
  for (slot, var) in symbols.variables().iter().enumerate() {
    out.push_str(&format!("  [{slot}] {} : {}\n", var.name, var.kind));
  }
  out.push_str("strings:\n");
  for (slot, text) in symbols.strings().iter().enumerate() {
    out.push_str(&format!("  [{slot}] \"{text}\"\n"));
  }
  out
}

/// Numbered instruction list with slots resolved to names and string text.
pub fn asm(program: &Program, symbols: &SymbolTable) -> String {
  let mut out = String::new();
  for (pc, instruction) in program.instructions().iter().enumerate() {
    let comment = match instruction {
      Instruction::PushStr(slot) => program
        .string(*slot)
        .map(|text| format!("\"{text}\""))
        .unwrap_or_default(),
      Instruction::Fetch(slot) | Instruction::Store(slot) | Instruction::Input(slot) => {
        variable_name(symbols, *slot)
      }
      _ => String::new(),
    };
    if comment.is_empty() {
      out.push_str(&format!("{pc:>4}  {instruction}\n"));
    } else {
      out.push_str(&format!("{pc:>4}  {:<20} ; {comment}\n", instruction.to_string()));
    }
  }
  out
}

fn variable_name(symbols: &SymbolTable, slot: usize) -> String {
  symbols
    .variable(slot)
    .map_or_else(|| format!("var[{slot}]"), |var| var.name.clone())
}
