//! Property tests over randomly generated programs.

use opal::error::Error;
use opal::{CompileOptions, RuntimeError, Value, run_source};
use proptest::prelude::*;

/// Fully parenthesised constant expression.
fn constant_expr() -> impl Strategy<Value = String> {
  let leaf = (0i64..1000).prop_map(|n| n.to_string());
  leaf.prop_recursive(4, 32, 2, |inner| {
    prop_oneof![
      inner.clone().prop_map(|e| format!("(-{e})")),
      inner.clone().prop_map(|e| format!("(!{e})")),
      (
        inner.clone(),
        prop::sample::select(vec![
          "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
        ]),
        inner,
      )
        .prop_map(|(l, op, r)| format!("({l} {op} {r})")),
    ]
  })
}

/// Output, or the runtime error kind; error positions differ once folded.
fn outcome(result: Result<Vec<Value>, Error>) -> Result<Vec<Value>, &'static str> {
  match result {
    Ok(values) => Ok(values),
    Err(Error::Runtime {
      source: RuntimeError::DivisionByZero { .. },
    }) => Err("division by zero"),
    Err(err) => panic!("unexpected failure: {err}"),
  }
}

proptest! {
  /// Folding never changes what a constant expression evaluates to.
  #[test]
  fn folding_preserves_results(expr in constant_expr()) {
    let source = format!("print {expr};");
    let folded = outcome(run_source(&source, &CompileOptions::default(), &[]));
    let plain = outcome(run_source(
      &source,
      &CompileOptions { optimize: false, ..CompileOptions::default() },
      &[],
    ));
    prop_assert_eq!(folded, plain);
  }

  /// Same program and input, same output.
  #[test]
  fn execution_is_deterministic(n in 0i64..200, step in 1i64..7) {
    let source = format!(
      "input n; total = 0; i = 0; \
       while (i <= n) {{ total = total + i; i = i + {step}; }} \
       print total;"
    );
    let input = n.to_string();
    let first = run_source(&source, &CompileOptions::default(), &[input.as_str()]).unwrap();
    let second = run_source(&source, &CompileOptions::default(), &[input.as_str()]).unwrap();
    let expected: i64 = (0..=n).step_by(step as usize).sum();
    prop_assert_eq!(&first, &second);
    prop_assert_eq!(first, vec![Value::Int(expected)]);
  }

  /// Arithmetic wraps instead of trapping.
  #[test]
  fn arithmetic_wraps(a in any::<i64>(), b in any::<i64>()) {
    let source = "input a; input b; print a + b, a - b, a * b;";
    let (sa, sb) = (a.to_string(), b.to_string());
    let input = [sa.as_str(), sb.as_str()];
    let output = run_source(source, &CompileOptions::default(), &input).unwrap();
    prop_assert_eq!(
      output,
      vec![
        Value::Int(a.wrapping_add(b)),
        Value::Int(a.wrapping_sub(b)),
        Value::Int(a.wrapping_mul(b)),
      ]
    );
  }
}
