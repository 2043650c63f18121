//! Luna: lexer, parser, register bytecode compiler and VM.
//!
//! ```
//! let value = luna::eval("1 + 2 * 3", "inline").unwrap();
//! assert_eq!(value, luna::object::Value::Int(7));
//! ```

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod diagnostic;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod source;
pub mod vm;

use bytecode::Program;
use codegen::CompileError;
use object::Value;
use parser::ParseError;
use vm::RuntimeError;

pub use parser::parse;

/// Failure from any stage of [`eval`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Parse and compile `source`.
pub fn compile(source: &str, filename: &str) -> Result<Program, Error> {
    let ast = parse(source, filename)?;
    Ok(codegen::compile(&ast)?)
}

/// Parse, compile and run `source`, returning the VM result.
pub fn eval(source: &str, filename: &str) -> Result<Value, Error> {
    let program = compile(source, filename)?;
    Ok(vm::run(&program)?)
}
