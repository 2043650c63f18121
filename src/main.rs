use std::error::Error;
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use log::LevelFilter;

use luna::codegen::{self, fmt::FmtMode};
use luna::diagnostic::{ansi::AnsiRenderer, json, Diagnostic};
use luna::lexer::{self, LexError};
use luna::parser::ParseError;
use luna::source::Source;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    Ansi,
    Json,
}

/// Run or inspect a Luna program.
#[derive(Debug, Parser)]
#[command(name = "luna", version, about)]
struct Cli {
    /// Source file (tries FILE.luna when FILE has no extension); stdin when omitted
    file: Option<PathBuf>,

    /// Print the token stream and stop
    #[arg(short, long)]
    tokens: bool,

    /// Print the AST as JSON
    #[arg(short, long)]
    ast: bool,

    /// Print the formatted source
    #[arg(short, long)]
    pretty: bool,

    /// With --pretty, put the whole program on one line
    #[arg(long, requires = "pretty")]
    dense: bool,

    /// Print the compiled bytecode
    #[arg(short, long)]
    dis: bool,

    /// Diagnostic output format
    #[arg(long, value_enum, default_value_t = ErrorFormat::Ansi)]
    errors: ErrorFormat,

    /// Disable colored diagnostics
    #[arg(long)]
    no_color: bool,

    /// Raise log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn inspecting(&self) -> bool {
        self.ast || self.pretty || self.dis
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).env().init() {
        eprintln!("luna: logger already initialized: {e}");
    }
}

fn load(file: Option<&PathBuf>) -> io::Result<Source> {
    match file {
        Some(path) => Source::from_path(path),
        None => Source::from_reader("stdin", io::stdin().lock()),
    }
}

fn print_tokens(source: &Source) -> Result<(), ParseError> {
    let tokens = lexer::tokenize(&source.text, &source.name)
        .map_err(|error: LexError| ParseError::Lex { error, context: "program" })?;
    for token in tokens {
        println!("{:>4}  {token}", token.line);
    }
    Ok(())
}

fn run(cli: &Cli, source: &Source) -> Result<(), Box<dyn Error>> {
    if cli.tokens {
        print_tokens(source).map_err(luna::Error::from)?;
        return Ok(());
    }

    let ast = luna::parse(&source.text, &source.name).map_err(luna::Error::from)?;
    log::info!("parsed {} statements from {}", ast.stmts.len(), source.name);

    if cli.ast {
        println!("{}", serde_json::to_string_pretty(&ast)?);
    }
    if cli.pretty {
        let mode = if cli.dense { FmtMode::Dense } else { FmtMode::Expanded };
        let text = codegen::fmt::format(&ast, mode);
        if mode == FmtMode::Dense { println!("{text}") } else { print!("{text}") }
    }
    if cli.inspecting() && !cli.dis {
        return Ok(());
    }

    let program = codegen::compile(&ast).map_err(luna::Error::from)?;
    if cli.dis {
        print!("{program}");
        return Ok(());
    }

    let value = luna::vm::run(&program).map_err(luna::Error::from)?;
    println!("{value}");
    Ok(())
}

fn report(cli: &Cli, source: &Source, err: &luna::Error) {
    let d = Diagnostic::from(err).in_file(&source.name).with_source(source);
    match cli.errors {
        ErrorFormat::Json => eprintln!("{}", json::render(&d)),
        ErrorFormat::Ansi => {
            let use_color = !cli.no_color && io::stderr().is_terminal();
            eprint!("{}", AnsiRenderer { use_color }.render(&d));
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let source = match load(cli.file.as_ref()) {
        Ok(s) => s,
        Err(e) => {
            let name = cli.file.as_ref().map_or("stdin".into(), |p| p.display().to_string());
            eprintln!("luna: cannot read {name}: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<luna::Error>() {
                Some(e) => report(&cli, &source, e),
                None => eprintln!("luna: {err}"),
            }
            ExitCode::FAILURE
        }
    }
}
