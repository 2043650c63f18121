use luna::bytecode::OpCode;
use luna::codegen::{self, fmt::FmtMode, CompileError};
use luna::diagnostic::{Diagnostic, Phase};
use luna::object::Value;
use luna::vm::RuntimeError;
use luna::Error;

#[test]
fn eval_arithmetic_and_comparisons() {
    assert_eq!(luna::eval("1 + 2 * 3", "t"), Ok(Value::Int(7)));
    assert_eq!(luna::eval("1 < 2", "t"), Ok(Value::Int(1)));
    assert_eq!(luna::eval("2 < 1", "t"), Ok(Value::Int(0)));
    assert_eq!(
        luna::eval("2 ** 3", "t").map_err(|e| e.to_string()),
        Err("operator '**' cannot be compiled yet".to_string())
    );
}

#[test]
fn program_value_is_last_statement() {
    assert_eq!(luna::eval("1\n2.5\n'x'", "t"), Ok(Value::from("x")));
}

#[test]
fn unlowered_statements_are_skipped() {
    let src = "if x\n  1\nend\nwhile y\nend\ndef f(a)\n  return a\nend\n40 + 2";
    assert_eq!(luna::eval(src, "t"), Ok(Value::Int(42)));
}

#[test]
fn errors_by_phase() {
    let err = luna::eval("def\n(", "t").unwrap_err();
    let Error::Parse(parse) = &err else { panic!("expected parse error, got {err:?}") };
    assert_eq!(parse.context(), "function statement");
    assert_eq!(parse.message(), "missing function name");
    assert_eq!(parse.line(), 2);
    assert_eq!(parse.filename(), "t");

    let d = Diagnostic::from(&luna::eval("def\n(", "demo.luna").unwrap_err());
    assert_eq!(d.filename, "demo.luna");
    assert_eq!(d.line, Some(2));
    assert_eq!(d.context.as_deref(), Some("function statement"));

    assert!(matches!(
        luna::eval("x * 2", "t"),
        Err(Error::Compile(CompileError::UnsupportedOperand { kind: "identifier", line: 1 }))
    ));
    assert_eq!(luna::eval("5 % 0", "t"), Err(Error::Runtime(RuntimeError::ModuloByZero)));
}

#[test]
fn diagnostics_from_errors() {
    let err = luna::eval("'unterminated", "demo.luna").unwrap_err();
    let d = Diagnostic::from(&err);
    assert_eq!(d.filename, "demo.luna");
    assert_eq!(d.phase, Phase::Syntax);
    assert_eq!(d.line, Some(1));
    assert_eq!(d.message, "unterminated string literal");
}

#[test]
fn compile_ends_with_halt() {
    let program = luna::compile("1 + 2", "t").unwrap();
    let last = program.code.last().copied().unwrap();
    assert_eq!(last.opcode(), Some(OpCode::Halt));
    assert_eq!(program.words().count(), 2);
}

#[test]
fn compile_errors_keep_ast_inspectable() {
    let ast = luna::parse("a && b", "t").unwrap();
    assert!(codegen::compile(&ast).is_err());
    assert_eq!(codegen::fmt::format(&ast, FmtMode::Expanded), "a && b\n");
}

#[test]
fn formatting_round_trip() {
    let src = "def area(w, h: int = 2): int\n  return w * h\nend\nif area(3) > 5\n  big = true\nelse\n  big = false\nend\n";
    let once = codegen::fmt::format(&luna::parse(src, "t").unwrap(), FmtMode::Expanded);
    assert_eq!(once, src);
    let twice = codegen::fmt::format(&luna::parse(&once, "t").unwrap(), FmtMode::Expanded);
    assert_eq!(once, twice);
}

#[test]
fn disassembly_listing() {
    let program = luna::compile("3 >= 2", "t").unwrap();
    let listing = program.to_string();
    let lines: Vec<&str> = listing.lines().collect();
    assert_eq!(
        lines,
        vec![
            "0000  LTE    k1(2), k0(3)",
            "0001  JMP    +1",
            "0002  LOADB  r0, k2(1), 1",
            "0003  LOADB  r0, k3(0), 0",
            "0004  HALT",
        ]
    );
}
