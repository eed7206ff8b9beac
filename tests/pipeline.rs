use opal::codegen::Instruction;
use opal::error::{CompileError, Error, ParseError, SemanticError, render};
use opal::{CompileOptions, RuntimeError, Value, compile, run_source};

fn unoptimized() -> CompileOptions {
  CompileOptions {
    optimize: false,
    ..CompileOptions::default()
  }
}

fn both_ways(source: &str, input: &[&str]) -> Vec<Value> {
  let folded = run_source(source, &CompileOptions::default(), input).unwrap();
  let plain = run_source(source, &unoptimized(), input).unwrap();
  assert_eq!(folded, plain, "optimizer changed the output of {source:?}");
  folded
}

fn ints(values: &[i64]) -> Vec<Value> {
  values.iter().copied().map(Value::Int).collect()
}

#[test]
fn multiplication_binds_tighter_than_addition() {
  assert_eq!(both_ways("x = 1 + 2 * 3; print x;", &[]), ints(&[7]));
}

#[test]
fn subtraction_is_left_associative() {
  assert_eq!(both_ways("print 10 - 3 - 2;", &[]), ints(&[5]));
  assert_eq!(both_ways("print 100 / 10 / 5;", &[]), ints(&[2]));
}

#[test]
fn division_truncates_toward_zero() {
  assert_eq!(both_ways("print -7 / 2, -7 % 2, 7 % -2;", &[]), ints(&[-3, -1, 1]));
}

#[test]
fn comparisons_and_logic_yield_one_or_zero() {
  let source = "print 3 < 4, 3 >= 4, 2 == 2, 2 != 2, !0, !5, 1 && 0, 0 || 7;";
  assert_eq!(both_ways(source, &[]), ints(&[1, 0, 1, 0, 1, 0, 0, 1]));
}

#[test]
fn if_else_takes_the_right_branch() {
  assert_eq!(both_ways("if (1 > 2) print 1; else print 2;", &[]), ints(&[2]));
}

#[test]
fn dangling_else_binds_to_the_inner_if() {
  assert_eq!(both_ways("if (1) if (0) print 1; else print 2;", &[]), ints(&[2]));
  assert_eq!(both_ways("if (0) if (1) print 1; else print 2;", &[]), ints(&[]));
}

#[test]
fn while_loop_runs_until_condition_fails() {
  let source = "x = 0; while (x < 3) { print x; x = x + 1; }";
  assert_eq!(both_ways(source, &[]), ints(&[0, 1, 2]));
}

#[test]
fn nested_loops() {
  let source = "
    i = 0;
    while (i < 3) {
      j = 0;
      while (j < i) { print i * 10 + j; j = j + 1; }
      i = i + 1;
    }
  ";
  assert_eq!(both_ways(source, &[]), ints(&[10, 20, 21]));
}

#[test]
fn input_round_trips_through_a_variable() {
  assert_eq!(both_ways("input x; print x;", &["42"]), ints(&[42]));
  assert_eq!(both_ways("input(x); print(x + 1);", &["-8"]), ints(&[-7]));
}

#[test]
fn strings_are_printed_verbatim() {
  let source = "greeting = \"hello, world\"; print greeting; print \"x = \", 3;";
  assert_eq!(
    both_ways(source, &[]),
    vec![Value::from("hello, world"), Value::from("x = "), Value::Int(3)]
  );
}

#[test]
fn string_input_reads_the_whole_line() {
  let source = "name = \"\"; input name; print \"hi \", name;";
  assert_eq!(
    both_ways(source, &["Grace Hopper"]),
    vec![Value::from("hi "), Value::from("Grace Hopper")]
  );
}

#[test]
fn reassigning_a_different_kind_is_rejected() {
  let err = compile("x = \"a\"; x = 1;", &CompileOptions::default()).unwrap_err();
  assert!(matches!(
    err,
    CompileError::Semantic {
      source: SemanticError::KindConflict { .. }
    }
  ));
}

#[test]
fn operators_on_strings_are_rejected() {
  for source in ["s = \"a\"; print s + 1;", "s = \"a\"; if (s) print 1;", "print -\"a\";"] {
    let err = compile(source, &CompileOptions::default()).unwrap_err();
    assert!(
      matches!(
        err,
        CompileError::Semantic {
          source: SemanticError::KindConflict { .. }
        }
      ),
      "{source:?} gave {err}"
    );
  }
}

#[test]
fn use_before_assignment_is_rejected() {
  let err = compile("x = x + 1;", &CompileOptions::default()).unwrap_err();
  assert!(matches!(
    err,
    CompileError::Semantic {
      source: SemanticError::UndeclaredIdentifier { .. }
    }
  ));
}

#[test]
fn logical_operators_do_not_short_circuit() {
  let source = "print (1 == 1) || (1 / 0 == 0);";
  for options in [CompileOptions::default(), unoptimized()] {
    let err = run_source(source, &options, &[]).unwrap_err();
    assert!(matches!(
      err,
      Error::Runtime {
        source: RuntimeError::DivisionByZero { .. }
      }
    ));
  }
}

#[test]
fn output_before_a_runtime_error_is_kept() {
  let compilation = compile("print 1; print 2 / 0;", &CompileOptions::default()).unwrap();
  let mut output = Vec::new();
  let err = opal::run(
    &compilation.program,
    opal::VmConfig::default(),
    &mut opal::ScriptedInput::default(),
    &mut output,
  )
  .unwrap_err();
  assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
  assert_eq!(output, ints(&[1]));
}

#[test]
fn every_jump_lands_on_a_label_marker() {
  let source = "
    n = 5;
    while (n > 0) {
      if (n % 2 == 0) print n; else { if (n == 3) print 0; }
      n = n - 1;
    }
  ";
  let compilation = compile(source, &unoptimized()).unwrap();
  let program = &compilation.program;
  for instruction in program.instructions() {
    if let Some(label) = instruction.jump_target() {
      let target = program.target(label).unwrap();
      assert_eq!(program.instructions()[target], Instruction::Label(label));
    }
  }
  assert_eq!(both_ways(source, &[]), ints(&[4, 0, 2]));
}

#[test]
fn compiling_twice_gives_identical_programs() {
  let source = "input a; b = a * 2; if (b > 10) print b; else print \"small\";";
  let first = compile(source, &CompileOptions::default()).unwrap();
  let second = compile(source, &CompileOptions::default()).unwrap();
  assert_eq!(first.program, second.program);
}

#[test]
fn diagnostics_point_at_the_offending_column() {
  let source = "x = 1;\nprint x +;\n";
  let err = compile(source, &CompileOptions::default()).unwrap_err();
  let rendered = render(source, &err);
  let mut lines = rendered.lines();
  assert_eq!(lines.next(), Some("print x +;"));
  assert!(lines.next().unwrap().starts_with("         ^ syntax error at 2:10"));
}

fn too_deep(err: &CompileError) -> bool {
  matches!(
    err,
    CompileError::Parse {
      source: ParseError::TooDeep { .. }
    }
  )
}

#[test]
fn deep_parentheses_fail_to_compile_instead_of_crashing() {
  let source = format!("print {}1{};", "(".repeat(10_000), ")".repeat(10_000));
  let err = compile(&source, &CompileOptions::default()).unwrap_err();
  assert!(too_deep(&err), "got {err}");
  assert!(render(&source, &err).contains("deeper than"));
}

#[test]
fn long_chains_fail_to_compile_with_the_optimizer_on() {
  let source = format!("x = 0; print x{};", " + 1".repeat(10_000));
  match run_source(&source, &CompileOptions::default(), &[]) {
    Err(Error::Compile { source }) => assert!(too_deep(&source), "got {source}"),
    other => panic!("expected a compile error, got {other:?}"),
  }
}

#[test]
fn chains_within_the_limit_fold_and_run() {
  let source = format!("x = 0; print x{};", " + 1".repeat(opal::parser::MAX_DEPTH));
  let expected = i64::try_from(opal::parser::MAX_DEPTH).unwrap();
  assert_eq!(both_ways(&source, &[]), ints(&[expected]));
}

#[test]
fn most_negative_integer_needs_an_expression() {
  let err = compile("print -9223372036854775808;", &CompileOptions::default()).unwrap_err();
  assert!(matches!(err, CompileError::Lex { .. }));
  assert_eq!(
    both_ways("print -9223372036854775807 - 1;", &[]),
    ints(&[i64::MIN])
  );
}
