//! Code generation: lower the parsed AST into stack-machine instructions.
//!
//! Every expression leaves exactly one value on the operand stack and every
//! statement leaves the stack as it found it. Structured control flow turns
//! into label markers and jumps; labels are fresh per compilation unit and
//! are resolved to absolute instruction indices by [`Program::link`] before
//! anything runs.

use std::fmt;
use std::rc::Rc;

use snafu::{ResultExt, ensure};
use tracing::debug;

use crate::error::{CompileResult, DuplicateLabelSnafu, LinkError, LinkSnafu, UndefinedLabelSnafu};
use crate::parser::{AstNode, BinaryOp, UnaryOp};
use crate::symbols::SymbolTable;
use crate::ty::Kind;

/// Symbolic jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub usize);

impl fmt::Display for Label {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "L{}", self.0)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
  /// Push an integer literal.
  Push(i64),
  /// Push the interned string in the given slot.
  PushStr(usize),
  Fetch(usize),
  Store(usize),
  Binary(BinaryOp),
  Unary(UnaryOp),
  Jmp(Label),
  Jz(Label),
  Jnz(Label),
  /// Zero-width jump target.
  Label(Label),
  PrintStr,
  PrintInt,
  /// Read one value into the variable in the given slot.
  Input(usize),
  Halt,
}

impl Instruction {
  /// Assembler mnemonic.
  pub fn mnemonic(&self) -> &'static str {
    match self {
      Instruction::Push(_) | Instruction::PushStr(_) => "PUSH",
      Instruction::Fetch(_) => "_FETCH_",
      Instruction::Store(_) => "_STORE_",
      Instruction::Binary(op) => match op {
        BinaryOp::Add => "O_ADD",
        BinaryOp::Sub => "O_SUB",
        BinaryOp::Mul => "O_MUL",
        BinaryOp::Div => "O_DIV",
        BinaryOp::Mod => "O_MOD",
        BinaryOp::Eq => "O_EQ",
        BinaryOp::Ne => "O_NEQ",
        BinaryOp::Lt => "O_LSS",
        BinaryOp::Le => "O_LEQ",
        BinaryOp::Gt => "O_GTR",
        BinaryOp::Ge => "O_GEQ",
        BinaryOp::And => "O_AND",
        BinaryOp::Or => "O_OR",
      },
      Instruction::Unary(UnaryOp::Neg) => "O_NEGATE",
      Instruction::Unary(UnaryOp::Not) => "O_NOT",
      Instruction::Jmp(_) => "JMP",
      Instruction::Jz(_) => "O_JZ",
      Instruction::Jnz(_) => "O_JNZ",
      Instruction::Label(_) => "_LABEL_",
      Instruction::PrintStr => "O_PRTS",
      Instruction::PrintInt => "O_PRTI",
      Instruction::Input(_) => "_INPUT_",
      Instruction::Halt => "HALT",
    }
  }

  /// Label this instruction may transfer control to.
  pub fn jump_target(&self) -> Option<Label> {
    match self {
      Instruction::Jmp(label) | Instruction::Jz(label) | Instruction::Jnz(label) => Some(*label),
      _ => None,
    }
  }
}

impl fmt::Display for Instruction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mnemonic = self.mnemonic();
    match self {
      Instruction::Push(value) => write!(f, "{mnemonic} {value}"),
      Instruction::PushStr(slot) => write!(f, "{mnemonic} str[{slot}]"),
      Instruction::Fetch(slot) | Instruction::Store(slot) | Instruction::Input(slot) => {
        write!(f, "{mnemonic} var[{slot}]")
      }
      Instruction::Jmp(label)
      | Instruction::Jz(label)
      | Instruction::Jnz(label)
      | Instruction::Label(label) => write!(f, "{mnemonic} {label}"),
      _ => f.write_str(mnemonic),
    }
  }
}

/// A linked, self-contained program: the instruction list, where each label
/// lives, and the storage layout the VM needs. Immutable once built, so one
/// program can be executed any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
  instructions: Vec<Instruction>,
  targets: Vec<Option<usize>>,
  slots: Vec<Kind>,
  strings: Vec<Rc<str>>,
}

impl Program {
  /// Resolve every label marker to its absolute index and check that each
  /// jump lands on exactly one marker.
  pub fn link(
    instructions: Vec<Instruction>,
    slots: Vec<Kind>,
    strings: Vec<Rc<str>>,
  ) -> Result<Self, LinkError> {
    let mut targets: Vec<Option<usize>> = Vec::new();
    for (pc, instruction) in instructions.iter().enumerate() {
      let Instruction::Label(label) = instruction else {
        continue;
      };
      if targets.len() <= label.0 {
        targets.resize(label.0 + 1, None);
      }
      if let Some(first) = targets[label.0] {
        return DuplicateLabelSnafu {
          label: label.0,
          first,
          second: pc,
        }
        .fail();
      }
      targets[label.0] = Some(pc);
    }

    for (pc, instruction) in instructions.iter().enumerate() {
      if let Some(label) = instruction.jump_target() {
        let defined = targets.get(label.0).is_some_and(Option::is_some);
        ensure!(defined, UndefinedLabelSnafu { label: label.0, pc });
      }
    }

    Ok(Self {
      instructions,
      targets,
      slots,
      strings,
    })
  }

  pub fn instructions(&self) -> &[Instruction] {
    &self.instructions
  }

  /// Absolute index of a label marker.
  pub fn target(&self, label: Label) -> Option<usize> {
    self.targets.get(label.0).copied().flatten()
  }

  /// Declared kind of every variable slot.
  pub fn slots(&self) -> &[Kind] {
    &self.slots
  }

  pub fn string(&self, slot: usize) -> Option<&Rc<str>> {
    self.strings.get(slot)
  }

  pub fn len(&self) -> usize {
    self.instructions.len()
  }

  pub fn is_empty(&self) -> bool {
    self.instructions.is_empty()
  }
}

/// Emit and link the program for `ast`.
pub fn generate(ast: &AstNode, symbols: &SymbolTable) -> CompileResult<Program> {
  let mut generator = Generator::default();
  generator.emit_node(ast);
  if generator.code.last() != Some(&Instruction::Halt) {
    generator.emit(Instruction::Halt);
  }

  debug!(
    instructions = generator.code.len(),
    labels = generator.next_label,
    "code generation finished"
  );

  let slots = symbols.variables().iter().map(|var| var.kind).collect();
  let strings = symbols.strings().iter().map(|s| Rc::from(s.as_str())).collect();
  Program::link(generator.code, slots, strings).context(LinkSnafu)
}

#[derive(Default)]
struct Generator {
  code: Vec<Instruction>,
  next_label: usize,
}

impl Generator {
  fn emit(&mut self, instruction: Instruction) {
    self.code.push(instruction);
  }

  fn new_label(&mut self) -> Label {
    let label = Label(self.next_label);
    self.next_label += 1;
    label
  }

  fn emit_node(&mut self, node: &AstNode) {
    match node {
      AstNode::Nop => {}
      AstNode::End => self.emit(Instruction::Halt),
      AstNode::Ident { slot, .. } => self.emit(Instruction::Fetch(*slot)),
      AstNode::Integer { value } => self.emit(Instruction::Push(*value)),
      AstNode::Str { slot } => self.emit(Instruction::PushStr(*slot)),
      AstNode::Assign { slot, value } => {
        self.emit_node(value);
        self.emit(Instruction::Store(*slot));
      }
      AstNode::Unary { op, operand } => {
        self.emit_node(operand);
        self.emit(Instruction::Unary(*op));
      }
      AstNode::Binary { op, lhs, rhs } => {
        self.emit_node(lhs);
        self.emit_node(rhs);
        self.emit(Instruction::Binary(*op));
      }
      AstNode::If {
        cond,
        then_branch,
        else_branch,
      } => {
        let else_label = self.new_label();
        self.emit_node(cond);
        self.emit(Instruction::Jz(else_label));
        self.emit_node(then_branch);
        match else_branch {
          Some(else_branch) => {
            let end_label = self.new_label();
            self.emit(Instruction::Jmp(end_label));
            self.emit(Instruction::Label(else_label));
            self.emit_node(else_branch);
            self.emit(Instruction::Label(end_label));
          }
          None => self.emit(Instruction::Label(else_label)),
        }
      }
      AstNode::While { cond, body } => {
        let start = self.new_label();
        let end = self.new_label();
        self.emit(Instruction::Label(start));
        self.emit_node(cond);
        self.emit(Instruction::Jz(end));
        self.emit_node(body);
        self.emit(Instruction::Jmp(start));
        self.emit(Instruction::Label(end));
      }
      AstNode::PrintStr { value } => {
        self.emit_node(value);
        self.emit(Instruction::PrintStr);
      }
      AstNode::PrintInt { value } => {
        self.emit_node(value);
        self.emit(Instruction::PrintInt);
      }
      AstNode::Input { slot } => self.emit(Instruction::Input(*slot)),
      AstNode::Sequence { body } => {
        for child in body {
          self.emit_node(child);
        }
      }
    }
  }
}
