//! Stack virtual machine executing a linked [`Program`].
//!
//! The machine owns an operand stack and a variable store sized to the
//! program's slot table. Input and output are injected through the
//! [`InputSource`] and [`OutputSink`] traits so the runtime never touches a
//! terminal directly.

use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, trace, warn};

use crate::codegen::{Instruction, Label, Program};
use crate::error::{
  DivisionByZeroSnafu, InputExhaustedSnafu, InputKindMismatchSnafu, InvalidOperandSnafu, IoSnafu,
  RuntimeResult, StackUnderflowSnafu, StepLimitSnafu, TypeMismatchSnafu,
};
use crate::ty::{Kind, Value};

/// Where `input` statements read from. One call yields one line, without
/// its terminator; `None` means the source is exhausted.
pub trait InputSource {
  fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Where `print` statements write to.
pub trait OutputSink {
  fn emit(&mut self, value: &Value) -> io::Result<()>;
}

/// Line-oriented input over any buffered reader, e.g. locked stdin.
pub struct LineInput<R> {
  reader: R,
}

impl<R: BufRead> LineInput<R> {
  pub fn new(reader: R) -> Self {
    Self { reader }
  }
}

impl<R: BufRead> InputSource for LineInput<R> {
  fn read_line(&mut self) -> io::Result<Option<String>> {
    let mut line = String::new();
    if self.reader.read_line(&mut line)? == 0 {
      return Ok(None);
    }
    let trimmed = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed);
    Ok(Some(line))
  }
}

/// Fixed sequence of input lines, handy for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
  lines: VecDeque<String>,
}

impl ScriptedInput {
  pub fn new<I, S>(lines: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      lines: lines.into_iter().map(Into::into).collect(),
    }
  }
}

impl InputSource for ScriptedInput {
  fn read_line(&mut self) -> io::Result<Option<String>> {
    Ok(self.lines.pop_front())
  }
}

/// Collects printed values in order.
impl OutputSink for Vec<Value> {
  fn emit(&mut self, value: &Value) -> io::Result<()> {
    self.push(value.clone());
    Ok(())
  }
}

/// Writes each printed value on its own line.
pub struct WriteSink<W> {
  writer: W,
}

impl<W: Write> WriteSink<W> {
  pub fn new(writer: W) -> Self {
    Self { writer }
  }

  pub fn into_inner(self) -> W {
    self.writer
  }
}

impl<W: Write> OutputSink for WriteSink<W> {
  fn emit(&mut self, value: &Value) -> io::Result<()> {
    writeln!(self.writer, "{value}")?;
    self.writer.flush()
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VmConfig {
  /// Abort with `StepLimit` after this many executed instructions.
  pub step_limit: Option<u64>,
}

/// Normal termination of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Halted {
  /// Instructions executed, label markers included.
  pub steps: u64,
  /// Index of the `Halt` executed, or the program length for an implicit
  /// halt off the end.
  pub pc: usize,
}

enum Step {
  Continue,
  Halt,
}

pub struct Vm<'p> {
  program: &'p Program,
  config: VmConfig,
  pc: usize,
  stack: Vec<Value>,
  vars: Vec<Value>,
  steps: u64,
}

impl<'p> Vm<'p> {
  pub fn new(program: &'p Program) -> Self {
    Self::with_config(program, VmConfig::default())
  }

  pub fn with_config(program: &'p Program, config: VmConfig) -> Self {
    Self {
      program,
      config,
      pc: 0,
      stack: Vec::new(),
      vars: program.slots().iter().map(Kind::zero).collect(),
      steps: 0,
    }
  }

  /// Execute until `Halt`, the end of the program, or the first error.
  pub fn run<I, O>(&mut self, input: &mut I, output: &mut O) -> RuntimeResult<Halted>
  where
    I: InputSource + ?Sized,
    O: OutputSink + ?Sized,
  {
    loop {
      match self.step(input, output) {
        Ok(Step::Continue) => {}
        Ok(Step::Halt) => {
          debug!(steps = self.steps, pc = self.pc, "program halted");
          return Ok(Halted {
            steps: self.steps,
            pc: self.pc,
          });
        }
        Err(err) => {
          warn!(pc = err.pc(), error = %err, "execution aborted");
          return Err(err);
        }
      }
    }
  }

  pub fn pc(&self) -> usize {
    self.pc
  }

  pub fn stack(&self) -> &[Value] {
    &self.stack
  }

  pub fn variables(&self) -> &[Value] {
    &self.vars
  }

  fn step<I, O>(&mut self, input: &mut I, output: &mut O) -> RuntimeResult<Step>
  where
    I: InputSource + ?Sized,
    O: OutputSink + ?Sized,
  {
    let pc = self.pc;
    let Some(&instruction) = self.program.instructions().get(pc) else {
      return Ok(Step::Halt);
    };
    if let Some(limit) = self.config.step_limit {
      ensure!(self.steps < limit, StepLimitSnafu { pc, limit });
    }
    self.steps += 1;
    self.pc += 1;
    trace!(pc, %instruction, depth = self.stack.len(), "step");

    match instruction {
      Instruction::Push(value) => self.stack.push(Value::Int(value)),
      Instruction::PushStr(slot) => {
        let text = self.program.string(slot).context(InvalidOperandSnafu { pc })?;
        self.stack.push(Value::Str(Rc::clone(text)));
      }
      Instruction::Fetch(slot) => {
        let value = self.vars.get(slot).context(InvalidOperandSnafu { pc })?;
        self.stack.push(value.clone());
      }
      Instruction::Store(slot) => {
        let value = self.pop(pc)?;
        self.store(slot, value, pc)?;
      }
      Instruction::Binary(op) => {
        let rhs = self.pop_int(pc)?;
        let lhs = self.pop_int(pc)?;
        let value = op.apply(lhs, rhs).context(DivisionByZeroSnafu { pc })?;
        self.stack.push(Value::Int(value));
      }
      Instruction::Unary(op) => {
        let operand = self.pop_int(pc)?;
        self.stack.push(Value::Int(op.apply(operand)));
      }
      Instruction::Jmp(label) => self.jump(label, pc)?,
      Instruction::Jz(label) => {
        if self.pop_int(pc)? == 0 {
          self.jump(label, pc)?;
        }
      }
      Instruction::Jnz(label) => {
        if self.pop_int(pc)? != 0 {
          self.jump(label, pc)?;
        }
      }
      Instruction::Label(_) => {}
      Instruction::PrintStr => self.print(Kind::Str, output, pc)?,
      Instruction::PrintInt => self.print(Kind::Int, output, pc)?,
      Instruction::Input(slot) => {
        let kind = self.slot_kind(slot, pc)?;
        let line = input
          .read_line()
          .context(IoSnafu { pc })?
          .context(InputExhaustedSnafu { pc })?;
        let value = match kind {
          Kind::Int => {
            let parsed = line.trim().parse::<i64>();
            Value::Int(parsed.ok().context(InputKindMismatchSnafu { pc, text: line })?)
          }
          Kind::Str => Value::Str(Rc::from(line)),
        };
        self.store(slot, value, pc)?;
      }
      Instruction::Halt => {
        self.pc = pc;
        return Ok(Step::Halt);
      }
    }

    Ok(Step::Continue)
  }

  fn pop(&mut self, pc: usize) -> RuntimeResult<Value> {
    self.stack.pop().context(StackUnderflowSnafu { pc })
  }

  fn pop_int(&mut self, pc: usize) -> RuntimeResult<i64> {
    let value = self.pop(pc)?;
    value.as_int().context(TypeMismatchSnafu {
      pc,
      expected: Kind::Int,
      found: value.kind(),
    })
  }

  fn slot_kind(&self, slot: usize, pc: usize) -> RuntimeResult<Kind> {
    self
      .program
      .slots()
      .get(slot)
      .copied()
      .context(InvalidOperandSnafu { pc })
  }

  fn store(&mut self, slot: usize, value: Value, pc: usize) -> RuntimeResult<()> {
    let expected = self.slot_kind(slot, pc)?;
    let found = value.kind();
    ensure!(
      expected == found,
      TypeMismatchSnafu {
        pc,
        expected,
        found
      }
    );
    self.vars[slot] = value;
    Ok(())
  }

  fn jump(&mut self, label: Label, pc: usize) -> RuntimeResult<()> {
    self.pc = self.program.target(label).context(InvalidOperandSnafu { pc })?;
    Ok(())
  }

  fn print<O>(&mut self, kind: Kind, output: &mut O, pc: usize) -> RuntimeResult<()>
  where
    O: OutputSink + ?Sized,
  {
    let value = self.pop(pc)?;
    ensure!(
      value.kind() == kind,
      TypeMismatchSnafu {
        pc,
        expected: kind,
        found: value.kind()
      }
    );
    output.emit(&value).context(IoSnafu { pc })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codegen::generate;
  use crate::error::RuntimeError;
  use crate::parser::{BinaryOp, parse};
  use crate::symbols::SymbolTable;
  use crate::tokenizer::tokenize;

  fn compile(source: &str) -> Program {
    let mut symbols = SymbolTable::new();
    let ast = parse(tokenize(source).unwrap(), &mut symbols).unwrap();
    generate(&ast, &symbols).unwrap()
  }

  fn run_with(source: &str, lines: &[&str]) -> RuntimeResult<Vec<Value>> {
    let program = compile(source);
    let mut output = Vec::new();
    let mut input = ScriptedInput::new(lines.iter().copied());
    Vm::new(&program).run(&mut input, &mut output)?;
    Ok(output)
  }

  fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::Int).collect()
  }

  #[test]
  fn precedence_and_associativity_at_runtime() {
    assert_eq!(run_with("print 1 + 2 * 3; print 10 - 3 - 2;", &[]).unwrap(), ints(&[7, 5]));
  }

  #[test]
  fn while_loop_counts() {
    let output = run_with("x = 0; while (x < 3) { print x; x = x + 1; }", &[]).unwrap();
    assert_eq!(output, ints(&[0, 1, 2]));
  }

  #[test]
  fn if_without_else_on_false_prints_nothing() {
    assert_eq!(run_with("if (0) print 1;", &[]).unwrap(), vec![]);
    assert_eq!(run_with("if (0) print 1; else print 2;", &[]).unwrap(), ints(&[2]));
  }

  #[test]
  fn input_feeds_variables_by_kind() {
    let source = "input x; name = \"\"; input name; print name, x;";
    let output = run_with(source, &[" 42 ", "Ada"]).unwrap();
    assert_eq!(output, vec![Value::from("Ada"), Value::Int(42)]);
  }

  #[test]
  fn non_numeric_input_for_integer_fails() {
    let err = run_with("input x;", &["forty"]).unwrap_err();
    assert!(matches!(err, RuntimeError::InputKindMismatch { pc: 0, ref text } if text == "forty"));
  }

  #[test]
  fn exhausted_input_fails() {
    let err = run_with("input x; input y;", &["1"]).unwrap_err();
    assert!(matches!(err, RuntimeError::InputExhausted { pc: 1 }));
  }

  #[test]
  fn division_by_zero_reports_instruction() {
    let err = run_with("x = 0; print 5 / x;", &[]).unwrap_err();
    assert!(matches!(err, RuntimeError::DivisionByZero { pc: 4 }));
  }

  #[test]
  fn store_checks_declared_kind() {
    let program = Program::link(
      vec![Instruction::PushStr(0), Instruction::Store(0), Instruction::Halt],
      vec![Kind::Int],
      vec![Rc::from("oops")],
    )
    .unwrap();
    let err = Vm::new(&program)
      .run(&mut ScriptedInput::default(), &mut Vec::new())
      .unwrap_err();
    assert!(matches!(
      err,
      RuntimeError::TypeMismatch {
        pc: 1,
        expected: Kind::Int,
        found: Kind::Str
      }
    ));
  }

  #[test]
  fn jnz_branches_on_non_zero() {
    let program = Program::link(
      vec![
        Instruction::Push(3),
        Instruction::Jnz(Label(0)),
        Instruction::Push(1),
        Instruction::PrintInt,
        Instruction::Label(Label(0)),
        Instruction::Push(2),
        Instruction::PrintInt,
      ],
      vec![],
      vec![],
    )
    .unwrap();
    let mut output = Vec::new();
    let halted = Vm::new(&program)
      .run(&mut ScriptedInput::default(), &mut output)
      .unwrap();
    assert_eq!(output, ints(&[2]));
    // No explicit halt: running off the end stops at the program length.
    assert_eq!(halted.pc, program.len());
  }

  #[test]
  fn underflow_is_an_error_not_a_panic() {
    let program = Program::link(vec![Instruction::Binary(BinaryOp::Add)], vec![], vec![]).unwrap();
    let err = Vm::new(&program)
      .run(&mut ScriptedInput::default(), &mut Vec::new())
      .unwrap_err();
    assert!(matches!(err, RuntimeError::StackUnderflow { pc: 0 }));
  }

  #[test]
  fn step_limit_stops_runaway_loops() {
    let program = compile("while (1) ;");
    let config = VmConfig {
      step_limit: Some(100),
    };
    let err = Vm::with_config(&program, config)
      .run(&mut ScriptedInput::default(), &mut Vec::new())
      .unwrap_err();
    assert!(matches!(err, RuntimeError::StepLimit { limit: 100, .. }));
  }

  #[test]
  fn rerunning_a_program_starts_fresh() {
    let program = compile(
      "input n; total = 0; while (n > 0) { total = total + n; n = n - 1; } print total;",
    );
    for _ in 0..2 {
      let mut output = Vec::new();
      Vm::new(&program)
        .run(&mut ScriptedInput::new(["4"]), &mut output)
        .unwrap();
      assert_eq!(output, ints(&[10]));
    }
  }

  #[test]
  fn variables_start_at_kind_zero() {
    let program = compile("if (0) { s = \"x\"; n = 1; }");
    let mut vm = Vm::new(&program);
    vm.run(&mut ScriptedInput::default(), &mut Vec::new()).unwrap();
    assert_eq!(vm.variables(), &[Value::from(""), Value::Int(0)]);
    assert!(vm.stack().is_empty());
  }

  #[test]
  fn write_sink_puts_each_value_on_a_line() {
    let mut sink = WriteSink::new(Vec::new());
    sink.emit(&Value::Int(7)).unwrap();
    sink.emit(&Value::from("seven")).unwrap();
    assert_eq!(sink.into_inner(), b"7\nseven\n");
  }

  #[test]
  fn line_input_strips_terminators() {
    let mut input = LineInput::new(&b"12\r\nabc\n"[..]);
    assert_eq!(input.read_line().unwrap().as_deref(), Some("12"));
    assert_eq!(input.read_line().unwrap().as_deref(), Some("abc"));
    assert_eq!(input.read_line().unwrap(), None);
  }
}
