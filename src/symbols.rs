//! Symbol table: the declared variables and interned string literals of one
//! compilation unit.
//!
//! Both tables are append-only. A slot index is handed out on first
//! insertion and never renumbered, so the AST and the instruction list refer
//! to storage purely by index.

use snafu::{OptionExt, ensure};

use crate::error::{SymbolError, SymbolKindConflictSnafu, SymbolUndeclaredSnafu};
use crate::ty::Kind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
  pub name: String,
  pub kind: Kind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
  variables: Vec<Variable>,
  strings: Vec<String>,
}

impl SymbolTable {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register `name` with `kind`, returning its slot. Declaring the same
  /// name again with the same kind is a no-op that yields the same slot.
  pub fn declare(&mut self, name: &str, kind: Kind) -> Result<usize, SymbolError> {
    if let Some(slot) = self.position(name) {
      let declared = self.variables[slot].kind;
      ensure!(
        declared == kind,
        SymbolKindConflictSnafu {
          name,
          declared,
          requested: kind,
        }
      );
      return Ok(slot);
    }

    self.variables.push(Variable {
      name: name.to_string(),
      kind,
    });
    Ok(self.variables.len() - 1)
  }

  /// Slot of a previously declared variable.
  pub fn lookup(&self, name: &str) -> Result<usize, SymbolError> {
    self.position(name).context(SymbolUndeclaredSnafu { name })
  }

  /// Slot of a string literal; equal values share one slot.
  pub fn intern_string(&mut self, value: &str) -> usize {
    if let Some(slot) = self.strings.iter().position(|s| s == value) {
      return slot;
    }
    self.strings.push(value.to_string());
    self.strings.len() - 1
  }

  pub fn variable(&self, slot: usize) -> Option<&Variable> {
    self.variables.get(slot)
  }

  pub fn string(&self, slot: usize) -> Option<&str> {
    self.strings.get(slot).map(String::as_str)
  }

  pub fn variables(&self) -> &[Variable] {
    &self.variables
  }

  pub fn strings(&self) -> &[String] {
    &self.strings
  }

  fn position(&self, name: &str) -> Option<usize> {
    self.variables.iter().position(|var| var.name == name)
  }
}
