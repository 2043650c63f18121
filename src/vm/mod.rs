use std::cmp::Ordering;

use crate::bytecode::{disasm, Instruction, OpCode, Operand, Program, REGISTERS};
use crate::object::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("modulo by zero")]
    ModuloByZero,
    #[error("integer overflow in {op}")]
    IntegerOverflow { op: &'static str },
    #[error("register r{reg} is outside the register file")]
    RegisterOutOfRange { reg: u8 },
    #[error("constant k{index} is outside the constant pool")]
    ConstantOutOfRange { index: u8 },
    #[error("unknown opcode: {op}")]
    UnknownOpcode { op: u8 },
    #[error("jump from {from} to {target} leaves the program")]
    JumpOutOfRange { from: usize, target: isize },
    #[error("reached instruction {ip} without HALT")]
    MissingHalt { ip: usize },
    #[error("cannot {action} {left} and {right}")]
    Type { action: &'static str, left: &'static str, right: &'static str },
    #[error("cannot negate {0}")]
    Negate(&'static str),
}

type Result<T> = std::result::Result<T, RuntimeError>;

/// Register machine over a borrowed [`Program`].
///
/// All registers start out as integer `0`. Comparison instructions write no
/// register; a true result skips the following instruction instead.
pub struct Vm<'p> {
    program: &'p Program,
    registers: [Value; REGISTERS],
    ip: usize,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program) -> Self {
        Vm {
            program,
            registers: std::array::from_fn(|_| Value::Int(0)),
            ip: 0,
        }
    }

    /// Register-or-constant operand lookup.
    fn rk(&self, raw: u8) -> Result<&Value> {
        match Operand::decode(raw) {
            Operand::Register(r) => Ok(&self.registers[r as usize]),
            Operand::Constant(k) => self
                .program
                .constants
                .get(k as usize)
                .ok_or(RuntimeError::ConstantOutOfRange { index: k }),
        }
    }

    fn set(&mut self, reg: u8, val: Value) -> Result<()> {
        let slot = self
            .registers
            .get_mut(reg as usize)
            .ok_or(RuntimeError::RegisterOutOfRange { reg })?;
        *slot = val;
        Ok(())
    }

    fn fetch(&self) -> Result<Instruction> {
        self.program
            .code
            .get(self.ip)
            .copied()
            .ok_or(RuntimeError::MissingHalt { ip: self.ip })
    }

    /// Execute until `HALT`, returning register 0.
    pub fn run(&mut self) -> Result<Value> {
        loop {
            let inst = self.fetch()?;
            log::trace!("{:04}  {}", self.ip, disasm::instruction(inst, self.program));
            self.ip += 1;

            let op = OpCode::try_from(inst.op()).map_err(|op| RuntimeError::UnknownOpcode { op })?;
            match op {
                OpCode::LoadK => {
                    let v = self.rk(inst.b())?.clone();
                    self.set(inst.a(), v)?;
                }
                OpCode::LoadB => {
                    let v = self.rk(inst.b())?.clone();
                    self.set(inst.a(), v)?;
                    if inst.c() != 0 {
                        self.ip += 1;
                    }
                }
                OpCode::Add | OpCode::Sub | OpCode::Div | OpCode::Mul | OpCode::Mod => {
                    let v = arith(op, self.rk(inst.b())?, self.rk(inst.c())?)?;
                    self.set(inst.a(), v)?;
                }
                OpCode::Negate => {
                    let v = negate(self.rk(inst.b())?)?;
                    self.set(inst.a(), v)?;
                }
                OpCode::Lt | OpCode::Lte | OpCode::Eq => {
                    if compare(op, self.rk(inst.b())?, self.rk(inst.c())?)? {
                        self.ip += 1;
                    }
                }
                OpCode::Jmp => {
                    let from = self.ip - 1;
                    let target = self.ip as isize + inst.b() as i8 as isize;
                    if target < 0 || target as usize > self.program.code.len() {
                        return Err(RuntimeError::JumpOutOfRange { from, target });
                    }
                    self.ip = target as usize;
                }
                OpCode::Halt => {
                    let result = self.registers[0].clone();
                    log::debug!("halt at {:04}, result {}", self.ip - 1, result.inspect());
                    return Ok(result);
                }
            }
        }
    }
}

/// Run `program` on a fresh VM.
pub fn run(program: &Program) -> Result<Value> {
    Vm::new(program).run()
}

// ── Arithmetic ──────────────────────────────────────────────────────

fn arith(op: OpCode, b: &Value, c: &Value) -> Result<Value> {
    match (b, c) {
        (Value::Int(x), Value::Int(y)) => int_arith(op, *x, *y).map(Value::Int),
        (Value::Str(x), Value::Str(y)) if op == OpCode::Add => Ok(Value::Str(format!("{x}{y}"))),
        _ => match (b.as_f64(), c.as_f64()) {
            (Some(x), Some(y)) => float_arith(op, x, y).map(Value::Float),
            _ => Err(type_error(
                match op {
                    OpCode::Add => "add",
                    OpCode::Sub => "subtract",
                    OpCode::Mul => "multiply",
                    OpCode::Div => "divide",
                    _ => "take modulo of",
                },
                b,
                c,
            )),
        },
    }
}

fn int_arith(op: OpCode, x: i64, y: i64) -> Result<i64> {
    let result = match op {
        OpCode::Add => x.checked_add(y),
        OpCode::Sub => x.checked_sub(y),
        OpCode::Mul => x.checked_mul(y),
        OpCode::Div if y == 0 => return Err(RuntimeError::DivisionByZero),
        OpCode::Div => x.checked_div(y),
        OpCode::Mod if y == 0 => return Err(RuntimeError::ModuloByZero),
        OpCode::Mod => x.checked_rem(y),
        _ => return Err(RuntimeError::UnknownOpcode { op: op as u8 }),
    };
    result.ok_or(RuntimeError::IntegerOverflow { op: op.name() })
}

fn float_arith(op: OpCode, x: f64, y: f64) -> Result<f64> {
    match op {
        OpCode::Add => Ok(x + y),
        OpCode::Sub => Ok(x - y),
        OpCode::Mul => Ok(x * y),
        OpCode::Div if y == 0.0 => Err(RuntimeError::DivisionByZero),
        OpCode::Div => Ok(x / y),
        OpCode::Mod if y == 0.0 => Err(RuntimeError::ModuloByZero),
        OpCode::Mod => Ok(x % y),
        _ => Err(RuntimeError::UnknownOpcode { op: op as u8 }),
    }
}

fn negate(v: &Value) -> Result<Value> {
    match v {
        Value::Int(n) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or(RuntimeError::IntegerOverflow { op: OpCode::Negate.name() }),
        Value::Float(n) => Ok(Value::Float(-n)),
        other => Err(RuntimeError::Negate(other.type_name())),
    }
}

fn type_error(action: &'static str, b: &Value, c: &Value) -> RuntimeError {
    RuntimeError::Type { action, left: b.type_name(), right: c.type_name() }
}

// ── Comparison ──────────────────────────────────────────────────────

fn compare(op: OpCode, b: &Value, c: &Value) -> Result<bool> {
    if op == OpCode::Eq {
        return Ok(values_equal(b, c));
    }
    let ord = match (b, c) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
        _ => match (b.as_f64(), c.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y),
            _ => return Err(type_error("compare", b, c)),
        },
    };
    Ok(match op {
        OpCode::Lt => ord == Some(Ordering::Less),
        _ => matches!(ord, Some(Ordering::Less | Ordering::Equal)),
    })
}

/// Structural equality with int/float promotion.
fn values_equal(b: &Value, c: &Value) -> bool {
    match (b, c) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => b.as_f64() == c.as_f64(),
        _ => b == c,
    }
}
