use std::env;
use std::fs;
use std::io::{self, Read};
use std::process;

use opal::error::render;
use opal::vm::{LineInput, WriteSink};
use opal::{CompileOptions, VmConfig, listing};
use snafu::{ResultExt, Snafu};
use tracing::level_filters::LevelFilter;

const USAGE: &str =
  "usage: opal [-d] [-q] [-O0] [--tokens] [--ast] [--symbols] [--asm] [--no-run] FILE";

#[derive(Debug, Snafu)]
enum CliError {
  #[snafu(display("{message}"))]
  Usage { message: String },

  #[snafu(display("cannot read {path}: {source}"))]
  ReadSource { path: String, source: io::Error },
}

#[derive(Debug, Default)]
struct Args {
  verbosity: u8,
  quiet: bool,
  no_optimize: bool,
  tokens: bool,
  ast: bool,
  symbols: bool,
  asm: bool,
  no_run: bool,
  path: Option<String>,
}

impl Args {
  fn parse(args: &[String]) -> Result<Self, CliError> {
    let mut parsed = Args::default();
    for arg in args {
      match arg.as_str() {
        "-d" | "--debug" => parsed.verbosity += 1,
        "-dd" => parsed.verbosity += 2,
        "-q" | "--quiet" => parsed.quiet = true,
        "-O0" => parsed.no_optimize = true,
        "--tokens" => parsed.tokens = true,
        "--ast" => parsed.ast = true,
        "--symbols" => parsed.symbols = true,
        "--asm" => parsed.asm = true,
        "--no-run" => parsed.no_run = true,
        flag if flag.starts_with('-') && flag != "-" => {
          return UsageSnafu {
            message: format!("unknown option {flag}"),
          }
          .fail();
        }
        path => {
          if parsed.path.is_some() {
            return UsageSnafu {
              message: "more than one input file",
            }
            .fail();
          }
          parsed.path = Some(path.to_string());
        }
      }
    }
    if parsed.path.is_none() {
      return UsageSnafu {
        message: "no input file",
      }
      .fail();
    }
    Ok(parsed)
  }

  fn level(&self) -> LevelFilter {
    match (self.quiet, self.verbosity) {
      (true, _) => LevelFilter::ERROR,
      (false, 0) => LevelFilter::WARN,
      (false, 1) => LevelFilter::DEBUG,
      (false, _) => LevelFilter::TRACE,
    }
  }
}

fn read_source(path: &str) -> Result<String, CliError> {
  if path == "-" {
    let mut source = String::new();
    io::stdin()
      .read_to_string(&mut source)
      .context(ReadSourceSnafu { path: "<stdin>" })?;
    Ok(source)
  } else {
    fs::read_to_string(path).context(ReadSourceSnafu { path })
  }
}

fn main() {
  let argv: Vec<String> = env::args().collect();
  let args = match Args::parse(argv.get(1..).unwrap_or_default()) {
    Ok(args) => args,
    Err(err) => {
      eprintln!("opal: {err}");
      eprintln!("{USAGE}");
      process::exit(1);
    }
  };

  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_max_level(args.level())
    .init();

  let path = args.path.as_deref().unwrap_or("-");
  let source = match read_source(path) {
    Ok(source) => source,
    Err(err) => {
      eprintln!("opal: {err}");
      process::exit(1);
    }
  };

  let options = CompileOptions {
    optimize: !args.no_optimize,
    ..CompileOptions::default()
  };
  let compilation = match opal::compile(&source, &options) {
    Ok(compilation) => compilation,
    Err(err) => {
      eprintln!("{}", render(&source, &err));
      process::exit(2);
    }
  };

  if args.tokens {
    print!("{}", listing::lexemes(&compilation.lexemes));
  }
  if args.ast {
    print!("{}", listing::ast(&compilation.ast, &compilation.symbols));
  }
  if args.symbols {
    print!("{}", listing::symbols(&compilation.symbols));
  }
  if args.asm {
    print!("{}", listing::asm(&compilation.program, &compilation.symbols));
  }
  if args.no_run {
    return;
  }

  let mut input = LineInput::new(io::stdin().lock());
  let mut output = WriteSink::new(io::stdout().lock());
  if let Err(err) = opal::run(
    &compilation.program,
    VmConfig::default(),
    &mut input,
    &mut output,
  ) {
    eprintln!("opal: runtime error at {err}");
    process::exit(3);
  }
}
