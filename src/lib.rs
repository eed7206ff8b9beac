//! Crate root: wires together the compilation pipeline.
//!
//! Each stage is a small module with a single entry point:
//! - `tokenizer` turns source text into positioned lexemes.
//! - `parser` builds the AST and declares variables into the `symbols` table.
//! - `optimizer` folds constant subexpressions.
//! - `codegen` lowers the AST into a linked stack-machine `Program`.
//! - `vm` executes a `Program` against injected input and output.
//! - `listing` renders every intermediate form as text.
//! - `error` holds the per-phase error enums and diagnostic rendering.

pub mod codegen;
pub mod error;
pub mod listing;
pub mod optimizer;
pub mod parser;
pub mod symbols;
pub mod tokenizer;
pub mod ty;
pub mod vm;

use snafu::ResultExt;
use tracing::debug;

pub use codegen::Program;
pub use error::{CompileError, CompileResult, Error, RuntimeError, RuntimeResult};
pub use ty::{Kind, Value};
pub use vm::{Halted, InputSource, OutputSink, ScriptedInput, Vm, VmConfig};

use crate::error::{CompileSnafu, LexSnafu, RuntimeSnafu};
use crate::parser::AstNode;
use crate::symbols::SymbolTable;
use crate::tokenizer::Lexeme;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
  /// Run constant folding before code generation.
  pub optimize: bool,
  /// Number of folding passes; zero behaves like `optimize: false`.
  pub passes: usize,
}

impl Default for CompileOptions {
  fn default() -> Self {
    Self {
      optimize: true,
      passes: 2,
    }
  }
}

/// Everything one compilation produced, kept around for listings.
#[derive(Debug, Clone)]
pub struct Compilation {
  pub lexemes: Vec<Lexeme>,
  pub ast: AstNode,
  pub symbols: SymbolTable,
  pub program: Program,
}

/// Compile a source string into a linked program.
pub fn compile(source: &str, options: &CompileOptions) -> CompileResult<Compilation> {
  let lexemes = tokenizer::tokenize(source).context(LexSnafu)?;
  debug!(lexemes = lexemes.len(), "tokenized");

  let mut symbols = SymbolTable::new();
  let mut ast = parser::parse(lexemes.clone(), &mut symbols)?;
  debug!(
    variables = symbols.variables().len(),
    strings = symbols.strings().len(),
    "parsed"
  );

  if options.optimize {
    for _ in 0..options.passes {
      ast = optimizer::optimize(ast);
    }
  }

  let program = codegen::generate(&ast, &symbols)?;
  Ok(Compilation {
    lexemes,
    ast,
    symbols,
    program,
  })
}

/// Execute a compiled program on a fresh machine.
pub fn run<I, O>(
  program: &Program,
  config: VmConfig,
  input: &mut I,
  output: &mut O,
) -> RuntimeResult<Halted>
where
  I: InputSource + ?Sized,
  O: OutputSink + ?Sized,
{
  Vm::with_config(program, config).run(input, output)
}

/// Compile and run `source` with scripted input lines, returning what it
/// printed.
pub fn run_source(
  source: &str,
  options: &CompileOptions,
  input: &[&str],
) -> Result<Vec<Value>, Error> {
  let compilation = compile(source, options).context(CompileSnafu)?;
  let mut output = Vec::new();
  let mut input = ScriptedInput::new(input.iter().copied());
  run(
    &compilation.program,
    VmConfig::default(),
    &mut input,
    &mut output,
  )
  .context(RuntimeSnafu)?;
  Ok(output)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codegen::Instruction;

  #[test]
  fn default_options_fold_constants() {
    let folded = compile("print 2 * 3;", &CompileOptions::default()).unwrap();
    assert_eq!(
      folded.program.instructions(),
      &[Instruction::Push(6), Instruction::PrintInt, Instruction::Halt]
    );
  }

  #[test]
  fn disabled_optimizer_keeps_the_arithmetic() {
    let options = CompileOptions {
      optimize: false,
      ..CompileOptions::default()
    };
    let plain = compile("print 2 * 3;", &options).unwrap();
    assert_eq!(plain.program.len(), 5);
    assert_eq!(run_source("print 2 * 3;", &options, &[]).unwrap(), vec![Value::Int(6)]);
  }

  #[test]
  fn errors_name_their_phase() {
    let options = CompileOptions::default();
    assert!(matches!(
      compile("x = @;", &options),
      Err(CompileError::Lex { .. })
    ));
    assert!(matches!(
      compile("x = ;", &options),
      Err(CompileError::Parse { .. })
    ));
    assert!(matches!(
      compile("print y;", &options),
      Err(CompileError::Semantic { .. })
    ));
    assert!(matches!(
      run_source("print 1 / 0;", &options, &[]),
      Err(Error::Runtime {
        source: RuntimeError::DivisionByZero { .. }
      })
    ));
  }
}
