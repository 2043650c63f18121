use crate::object::Value;

pub mod disasm;

/// Size of the VM register file. Operand indices at or above this address
/// the constant pool.
pub const REGISTERS: usize = 32;

/// Constants addressable by an 8-bit operand.
pub const MAX_CONSTANTS: usize = 256 - REGISTERS;

// ── Opcodes ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// R[A] = RK[B]
    LoadK = 0,
    /// R[A] = RK[B]; skip next if C != 0
    LoadB = 1,
    Add = 2,
    Sub = 3,
    Div = 4,
    Mul = 5,
    Mod = 6,
    /// R[A] = -RK[B]
    Negate = 7,
    /// skip next if RK[B] < RK[C]
    Lt = 8,
    /// skip next if RK[B] <= RK[C]
    Lte = 9,
    /// skip next if RK[B] == RK[C]
    Eq = 10,
    /// ip += (B as i8)
    Jmp = 11,
    Halt = 12,
}

impl OpCode {
    pub fn name(self) -> &'static str {
        match self {
            OpCode::LoadK => "LOADK",
            OpCode::LoadB => "LOADB",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Div => "DIV",
            OpCode::Mul => "MUL",
            OpCode::Mod => "MOD",
            OpCode::Negate => "NEGATE",
            OpCode::Lt => "LT",
            OpCode::Lte => "LTE",
            OpCode::Eq => "EQ",
            OpCode::Jmp => "JMP",
            OpCode::Halt => "HALT",
        }
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(op: u8) -> Result<Self, u8> {
        Ok(match op {
            0 => OpCode::LoadK,
            1 => OpCode::LoadB,
            2 => OpCode::Add,
            3 => OpCode::Sub,
            4 => OpCode::Div,
            5 => OpCode::Mul,
            6 => OpCode::Mod,
            7 => OpCode::Negate,
            8 => OpCode::Lt,
            9 => OpCode::Lte,
            10 => OpCode::Eq,
            11 => OpCode::Jmp,
            12 => OpCode::Halt,
            _ => return Err(op),
        })
    }
}

// ── Operands ────────────────────────────────────────────────────────

/// A register-or-constant operand. Encoded into a single byte: registers
/// below [`REGISTERS`], constant `k` as `REGISTERS + k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(u8),
    Constant(u8),
}

impl Operand {
    pub fn encode(self) -> u8 {
        match self {
            Operand::Register(r) => r,
            Operand::Constant(k) => k.saturating_add(REGISTERS as u8),
        }
    }

    pub fn decode(raw: u8) -> Self {
        if (raw as usize) < REGISTERS {
            Operand::Register(raw)
        } else {
            Operand::Constant(raw - REGISTERS as u8)
        }
    }
}

// ── Instruction encoding ────────────────────────────────────────────
//
// [OP:8 | A:8 | B:8 | C:8]

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction(pub u32);

impl Instruction {
    #[inline(always)]
    pub fn abc(op: OpCode, a: u8, b: u8, c: u8) -> Self {
        Instruction((op as u32) << 24 | (a as u32) << 16 | (b as u32) << 8 | c as u32)
    }

    #[inline(always)]
    pub fn op(self) -> u8 {
        (self.0 >> 24) as u8
    }

    #[inline(always)]
    pub fn a(self) -> u8 {
        (self.0 >> 16 & 0xFF) as u8
    }

    #[inline(always)]
    pub fn b(self) -> u8 {
        (self.0 >> 8 & 0xFF) as u8
    }

    #[inline(always)]
    pub fn c(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    pub fn opcode(self) -> Option<OpCode> {
        OpCode::try_from(self.op()).ok()
    }
}

// ── Program ─────────────────────────────────────────────────────────

/// Compiled instruction stream plus its constant pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
}

impl Program {
    pub fn with_capacity(code: usize) -> Self {
        Program { code: Vec::with_capacity(code), constants: Vec::new() }
    }

    pub fn emit(&mut self, inst: Instruction) -> usize {
        let idx = self.code.len();
        self.code.push(inst);
        idx
    }

    /// Append a constant, returning `None` once the pool is full.
    /// Equal values are not merged.
    pub fn add_const(&mut self, val: Value) -> Option<Operand> {
        if self.constants.len() >= MAX_CONSTANTS {
            return None;
        }
        let idx = self.constants.len() as u8;
        self.constants.push(val);
        Some(Operand::Constant(idx))
    }

    /// Raw 32-bit words, for tooling that wants the packed form.
    pub fn words(&self) -> impl Iterator<Item = u32> + '_ {
        self.code.iter().map(|i| i.0)
    }
}
