use std::fmt;

use super::{Instruction, OpCode, Operand, Program};

fn operand(raw: u8, program: &Program) -> String {
    match Operand::decode(raw) {
        Operand::Register(r) => format!("r{r}"),
        Operand::Constant(k) => match program.constants.get(k as usize) {
            Some(v) => format!("k{k}({})", v.inspect()),
            None => format!("k{k}(?)"),
        },
    }
}

/// One instruction as `NAME operands`, resolving constants against `program`.
pub fn instruction(inst: Instruction, program: &Program) -> String {
    let Some(op) = inst.opcode() else {
        return format!("??? {:#010x}", inst.0);
    };
    let name = op.name();
    match op {
        OpCode::LoadK | OpCode::Negate => {
            format!("{name:<7}r{}, {}", inst.a(), operand(inst.b(), program))
        }
        OpCode::LoadB => format!(
            "{name:<7}r{}, {}, {}",
            inst.a(),
            operand(inst.b(), program),
            inst.c()
        ),
        OpCode::Add | OpCode::Sub | OpCode::Div | OpCode::Mul | OpCode::Mod => format!(
            "{name:<7}r{}, {}, {}",
            inst.a(),
            operand(inst.b(), program),
            operand(inst.c(), program)
        ),
        OpCode::Lt | OpCode::Lte | OpCode::Eq => format!(
            "{name:<7}{}, {}",
            operand(inst.b(), program),
            operand(inst.c(), program)
        ),
        OpCode::Jmp => format!("{name:<7}{:+}", inst.b() as i8),
        OpCode::Halt => name.to_string(),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (ip, inst) in self.code.iter().enumerate() {
            writeln!(f, "{ip:04}  {}", instruction(*inst, self))?;
        }
        Ok(())
    }
}
