//! Disassembler: one mnemonic line per instruction.
//!
//! Output is diagnostic text, not a reassemblable source form. Offsets are
//! printed so jump targets can be followed by eye.

use oakscript_common::{builtins, Opcode, Program};

use crate::emitter::HANDLER_FINALLY;

/// Render the code section as one line per instruction.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let code = &program.code;
    let mut pc = 0usize;

    while pc < code.len() {
        let byte = code[pc];
        let Some(op) = Opcode::from_byte(byte) else {
            out.push_str(&format!("{pc:04}  ?? 0x{byte:02x}\n"));
            break;
        };
        if pc + 1 + op.operand_width() > code.len() {
            out.push_str(&format!("{pc:04}  {} <truncated>\n", op.mnemonic()));
            break;
        }

        out.push_str(&format!("{pc:04}  {}", op.mnemonic()));
        let imm = pc + 1;
        match op {
            Opcode::PushInt => {
                let v = i64::from_le_bytes(code[imm..imm + 8].try_into().unwrap());
                out.push_str(&format!(" {v}"));
            }
            Opcode::PushFloat => {
                let v = f64::from_le_bytes(code[imm..imm + 8].try_into().unwrap());
                out.push_str(&format!(" {v}"));
            }
            Opcode::LoadConstStr
            | Opcode::Load
            | Opcode::Store
            | Opcode::StoreLocal
            | Opcode::StoreConst
            | Opcode::Delete => {
                let idx = read_u32(code, imm);
                out.push_str(&format!(" {idx}"));
                if let Some(s) = program.strings.get(idx as usize) {
                    out.push_str(&format!(" ; \"{s}\""));
                }
            }
            Opcode::Jump | Opcode::JumpIfFalse | Opcode::JumpIfTrue => {
                out.push_str(&format!(" {:04}", read_u32(code, imm)));
            }
            Opcode::CallBuiltin => {
                let id = u16::from_le_bytes([code[imm], code[imm + 1]]);
                let argc = code[imm + 2];
                out.push_str(&format!(" {id} {argc}"));
                if let Some(spec) = builtins::spec_for(id) {
                    out.push_str(&format!(" ; {}", spec.name));
                }
            }
            Opcode::CallUser => {
                let addr = read_u32(code, imm);
                let argc = code[imm + 4];
                out.push_str(&format!(" {addr:04} {argc}"));
            }
            Opcode::Return => {
                out.push_str(&format!(" {}", code[imm]));
            }
            Opcode::PushHandler => {
                let kind = if code[imm] == HANDLER_FINALLY {
                    "finally"
                } else {
                    "catch"
                };
                out.push_str(&format!(" {kind} {:04}", read_u32(code, imm + 1)));
            }
            Opcode::Line => {
                out.push_str(&format!(" {}", read_u32(code, imm)));
            }
            _ => {}
        }
        out.push('\n');
        pc += 1 + op.operand_width();
    }
    out
}

fn read_u32(code: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(code[at..at + 4].try_into().unwrap())
}
