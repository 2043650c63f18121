use crate::ast::visit::{self, Visitor};
use crate::ast::*;
use crate::bytecode::{Instruction, OpCode, Operand, Program, REGISTERS};
use crate::object::Value;

pub mod fmt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("too many constants (limit {limit})", limit = crate::bytecode::MAX_CONSTANTS)]
    TooManyConstants { line: usize },
    #[error("expression needs more than {max} registers", max = REGISTERS)]
    TooManyRegisters { line: usize },
    #[error("operator '{op}' cannot be compiled yet")]
    UnsupportedOperator { op: String, line: usize },
    #[error("{kind} cannot be compiled as an operand yet")]
    UnsupportedOperand { kind: &'static str, line: usize },
}

impl CompileError {
    pub fn line(&self) -> usize {
        match self {
            CompileError::TooManyConstants { line }
            | CompileError::TooManyRegisters { line }
            | CompileError::UnsupportedOperator { line, .. }
            | CompileError::UnsupportedOperand { line, .. } => *line,
        }
    }
}

type Result<T> = std::result::Result<T, CompileError>;

/// Initial instruction buffer size.
const CODE_CAPACITY: usize = 1024;

/// Lowers statement-level expressions into register bytecode.
///
/// Each expression statement evaluates into register 0, so after `HALT` the
/// VM's result is the value of the last lowered statement. Statement kinds
/// without a lowering (`if`, `while`, `def`, `return`, ...) and expression
/// statements that are not arithmetic, comparisons or literals emit nothing.
struct Codegen {
    program: Program,
    /// Register the current expression writes to.
    dest: u8,
    next_reg: u8,
    max_reg: u8,
    /// Set by every callback that emitted code for the visited expression.
    lowered: bool,
}

impl Codegen {
    fn new() -> Self {
        Codegen {
            program: Program::with_capacity(CODE_CAPACITY),
            dest: 0,
            next_reg: 1,
            max_reg: 1,
            lowered: false,
        }
    }

    fn alloc_reg(&mut self, line: usize) -> Result<u8> {
        let r = self.next_reg;
        if r as usize >= REGISTERS {
            return Err(CompileError::TooManyRegisters { line });
        }
        self.next_reg += 1;
        if self.next_reg > self.max_reg {
            self.max_reg = self.next_reg;
        }
        Ok(r)
    }

    fn emit_abc(&mut self, op: OpCode, a: u8, b: u8, c: u8) -> usize {
        self.program.emit(Instruction::abc(op, a, b, c))
    }

    fn constant(&mut self, val: Value, line: usize) -> Result<Operand> {
        self.program
            .add_const(val)
            .ok_or(CompileError::TooManyConstants { line })
    }

    /// Visit `expr` writing into `dest`. Returns whether anything was emitted.
    fn lower_into(&mut self, expr: &Expr, dest: u8) -> Result<bool> {
        let saved_dest = std::mem::replace(&mut self.dest, dest);
        self.lowered = false;
        visit::visit_expr(self, expr)?;
        self.dest = saved_dest;
        Ok(std::mem::take(&mut self.lowered))
    }

    /// Value of `expr` as an instruction operand. Literals go straight to the
    /// constant pool; anything else is evaluated into `target`, or a fresh
    /// register when `target` is `None`.
    fn operand(&mut self, expr: &Expr, target: Option<u8>) -> Result<Operand> {
        if let Some(val) = literal(expr) {
            return self.constant(val, expr.line);
        }
        let reg = match target {
            Some(r) => r,
            None => self.alloc_reg(expr.line)?,
        };
        if !self.lower_into(expr, reg)? {
            return Err(CompileError::UnsupportedOperand { kind: expr.name(), line: expr.line });
        }
        Ok(Operand::Register(reg))
    }

    /// Left operand may reuse the destination; the right one must not, since
    /// it is evaluated after the left value is already live.
    fn operands(&mut self, node: &BinaryOp) -> Result<(Operand, Operand)> {
        let left = self.operand(&node.left, Some(self.dest))?;
        let right = self.operand(&node.right, None)?;
        Ok((left, right))
    }

    /// `CMP b c; JMP +1; LOADB dest, K(t), 1; LOADB dest, K(f), 0`
    ///
    /// A true comparison skips the jump and lands on the first LOADB, which
    /// in turn skips the second. `t` is 1 and `f` is 0 unless `negate`.
    fn emit_compare(&mut self, op: OpCode, b: Operand, c: Operand, negate: bool, line: usize) -> Result<()> {
        let (on_true, on_false) = if negate { (0, 1) } else { (1, 0) };
        let dest = self.dest;
        let t = self.constant(Value::Int(on_true), line)?;
        let f = self.constant(Value::Int(on_false), line)?;
        self.emit_abc(op, 0, b.encode(), c.encode());
        self.emit_abc(OpCode::Jmp, 0, 1, 0);
        self.emit_abc(OpCode::LoadB, dest, t.encode(), 1);
        self.emit_abc(OpCode::LoadB, dest, f.encode(), 0);
        Ok(())
    }

    fn load_literal(&mut self, val: Value, line: usize) -> Result<()> {
        let k = self.constant(val, line)?;
        self.emit_abc(OpCode::LoadK, self.dest, k.encode(), 0);
        self.lowered = true;
        Ok(())
    }
}

fn literal(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Int(n) => Some(Value::Int(*n)),
        ExprKind::Float(n) => Some(Value::Float(*n)),
        ExprKind::Str(s) => Some(Value::Str(s.clone())),
        ExprKind::Bool(b) => Some(Value::Bool(*b)),
        ExprKind::Null => Some(Value::Null),
        _ => None,
    }
}

impl Visitor for Codegen {
    type Error = CompileError;

    fn visit_block(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.stmts {
            self.next_reg = 1;
            let before = self.program.code.len();
            visit::visit_stmt(self, stmt)?;
            if self.program.code.len() == before {
                log::debug!("line {}: statement emitted no code", stmt.line);
            }
        }
        Ok(())
    }

    fn visit_expr_stmt(&mut self, expr: &Expr) -> Result<()> {
        self.lower_into(expr, 0)?;
        Ok(())
    }

    fn visit_int(&mut self, value: i64, line: usize) -> Result<()> {
        self.load_literal(Value::Int(value), line)
    }

    fn visit_float(&mut self, value: f64, line: usize) -> Result<()> {
        self.load_literal(Value::Float(value), line)
    }

    fn visit_string(&mut self, value: &str, line: usize) -> Result<()> {
        self.load_literal(Value::Str(value.to_string()), line)
    }

    fn visit_bool(&mut self, value: bool, line: usize) -> Result<()> {
        self.load_literal(Value::Bool(value), line)
    }

    fn visit_null(&mut self, line: usize) -> Result<()> {
        self.load_literal(Value::Null, line)
    }

    fn visit_unary(&mut self, node: &UnaryOp, line: usize) -> Result<()> {
        let saved_next = self.next_reg;
        match node.op {
            UnOp::Neg => {
                let b = self.operand(&node.operand, Some(self.dest))?;
                self.emit_abc(OpCode::Negate, self.dest, b.encode(), 0);
            }
            UnOp::Plus => {
                let b = self.operand(&node.operand, Some(self.dest))?;
                if let Operand::Constant(_) = b {
                    self.emit_abc(OpCode::LoadK, self.dest, b.encode(), 0);
                }
            }
            op => {
                return Err(CompileError::UnsupportedOperator { op: op.to_string(), line });
            }
        }
        self.next_reg = saved_next;
        self.lowered = true;
        Ok(())
    }

    fn visit_binary(&mut self, node: &BinaryOp, line: usize) -> Result<()> {
        let saved_next = self.next_reg;
        let arith = match node.op {
            BinOp::Add => Some(OpCode::Add),
            BinOp::Sub => Some(OpCode::Sub),
            BinOp::Mul => Some(OpCode::Mul),
            BinOp::Div => Some(OpCode::Div),
            BinOp::Mod => Some(OpCode::Mod),
            _ => None,
        };

        if let Some(op) = arith {
            let (b, c) = self.operands(node)?;
            self.emit_abc(op, self.dest, b.encode(), c.encode());
        } else {
            match node.op {
                BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Neq => {
                    let (l, r) = self.operands(node)?;
                    match node.op {
                        BinOp::Lt => self.emit_compare(OpCode::Lt, l, r, false, line)?,
                        BinOp::Le => self.emit_compare(OpCode::Lte, l, r, false, line)?,
                        BinOp::Gt => self.emit_compare(OpCode::Lt, r, l, false, line)?,
                        BinOp::Ge => self.emit_compare(OpCode::Lte, r, l, false, line)?,
                        BinOp::Eq => self.emit_compare(OpCode::Eq, l, r, false, line)?,
                        _ => self.emit_compare(OpCode::Eq, l, r, true, line)?,
                    }
                }
                op => {
                    return Err(CompileError::UnsupportedOperator { op: op.to_string(), line });
                }
            }
        }

        self.next_reg = saved_next;
        self.lowered = true;
        Ok(())
    }
}

/// Compile a parsed program. The result always ends with `HALT`.
pub fn compile(block: &Block) -> Result<Program> {
    let mut cg = Codegen::new();
    cg.visit_block(block)?;
    cg.emit_abc(OpCode::Halt, 0, 0, 0);
    log::debug!(
        "compiled {} instructions, {} constants, {} registers",
        cg.program.code.len(),
        cg.program.constants.len(),
        cg.max_reg
    );
    Ok(cg.program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::disasm;
    use crate::parser::parse;

    fn compile_src(source: &str) -> Result<Program> {
        compile(&parse(source, "test").unwrap())
    }

    fn listing(source: &str) -> Vec<String> {
        let program = compile_src(source).unwrap();
        program.code.iter().map(|i| disasm::instruction(*i, &program)).collect()
    }

    #[test]
    fn empty_program_is_just_halt() {
        assert_eq!(listing(""), vec!["HALT"]);
    }

    #[test]
    fn literal_statement_loads_register_zero() {
        assert_eq!(listing("42"), vec!["LOADK  r0, k0(42)", "HALT"]);
    }

    #[test]
    fn arithmetic_uses_constant_operands() {
        assert_eq!(listing("1 + 2"), vec!["ADD    r0, k0(1), k1(2)", "HALT"]);
    }

    #[test]
    fn nested_arithmetic_reuses_destination() {
        assert_eq!(
            listing("1 + 2 * 3"),
            vec!["MUL    r1, k1(2), k2(3)", "ADD    r0, k0(1), r1", "HALT"]
        );
        assert_eq!(
            listing("(1 - 2) * 3"),
            vec!["SUB    r0, k0(1), k1(2)", "MUL    r0, r0, k2(3)", "HALT"]
        );
    }

    #[test]
    fn less_than_uses_skip_idiom() {
        assert_eq!(
            listing("1 < 2"),
            vec![
                "LT     k0(1), k1(2)",
                "JMP    +1",
                "LOADB  r0, k2(1), 1",
                "LOADB  r0, k3(0), 0",
                "HALT",
            ]
        );
    }

    #[test]
    fn greater_than_swaps_operands() {
        assert_eq!(listing("1 > 2")[0], "LT     k1(2), k0(1)");
        assert_eq!(listing("1 >= 2")[0], "LTE    k1(2), k0(1)");
    }

    #[test]
    fn not_equal_swaps_loads() {
        let l = listing("1 != 2");
        assert_eq!(l[0], "EQ     k0(1), k1(2)");
        assert_eq!(l[2], "LOADB  r0, k2(0), 1");
        assert_eq!(l[3], "LOADB  r0, k3(1), 0");
    }

    #[test]
    fn repeated_literals_get_fresh_constants() {
        let program = compile_src("1 + 1").unwrap();
        assert_eq!(program.constants, vec![Value::Int(1), Value::Int(1)]);
    }

    #[test]
    fn negation() {
        assert_eq!(listing("-5"), vec!["NEGATE r0, k0(5)", "HALT"]);
        assert_eq!(listing("+5"), vec!["LOADK  r0, k0(5)", "HALT"]);
        assert_eq!(listing("-(1 + 2)"), vec!["ADD    r0, k0(1), k1(2)", "NEGATE r0, r0", "HALT"]);
    }

    #[test]
    fn unlowered_statements_are_skipped() {
        let src = "if x\n  1\nend\nwhile y; end\ndef f end\nreturn 3\nuse io\ntype T end\nfoo()\nname";
        assert_eq!(listing(src), vec!["HALT"]);
    }

    #[test]
    fn statements_each_target_register_zero() {
        assert_eq!(listing("1\n2"), vec!["LOADK  r0, k0(1)", "LOADK  r0, k1(2)", "HALT"]);
    }

    #[test]
    fn unsupported_operand_is_an_error() {
        let err = compile_src("\nx + 1").unwrap_err();
        assert_eq!(err, CompileError::UnsupportedOperand { kind: "identifier", line: 2 });
    }

    #[test]
    fn unsupported_operator_is_an_error() {
        let err = compile_src("1 && 2").unwrap_err();
        assert_eq!(err, CompileError::UnsupportedOperator { op: "&&".into(), line: 1 });
        assert!(matches!(compile_src("!1"), Err(CompileError::UnsupportedOperator { .. })));
    }

    #[test]
    fn constant_pool_overflow() {
        let src = vec!["1"; crate::bytecode::MAX_CONSTANTS + 1].join("\n");
        assert!(matches!(compile_src(&src), Err(CompileError::TooManyConstants { line: 225 })));
    }

    #[test]
    fn register_file_overflow() {
        let mut src = String::from("1");
        for _ in 0..40 {
            src = format!("1 + ({src})");
        }
        assert!(matches!(compile_src(&src), Err(CompileError::TooManyRegisters { .. })));
    }
}
