//! Bytecode rewriting passes
//!
//! Two destructive passes over a decoded instruction list, run in order:
//! constant folding, then post-return dead-code elimination. Both
//! preserve the observable integer behavior of the method and neither
//! moves or removes a `Label`.

use crate::classfile::opcodes::*;
use crate::classfile::{CodeAttribute, ConstantPool, Instruction};
use crate::common::error::Result;

/// Per-method rewrite counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizationStats {
    /// Number of fold replacements applied
    pub folded: usize,
    /// Number of dead instructions removed
    pub removed: usize,
}

/// Run both passes over a method body
pub fn optimize_method(
    code: &mut CodeAttribute,
    pool: &mut ConstantPool,
) -> Result<OptimizationStats> {
    let folded = fold_constants(&mut code.instructions, pool)?;
    let removed = eliminate_dead_code(&mut code.instructions);
    Ok(OptimizationStats { folded, removed })
}

/// Integer value of an instruction that pushes a compile-time constant
fn int_constant(instruction: &Instruction, pool: &ConstantPool) -> Option<i32> {
    match instruction {
        Instruction::Op(op) if (ICONST_M1..=ICONST_5).contains(op) => {
            Some(*op as i32 - ICONST_0 as i32)
        }
        Instruction::Push { value, .. } => Some(*value),
        Instruction::Cp { opcode, index } if *opcode == LDC || *opcode == LDC_W => {
            pool.integer(*index)
        }
        _ => None,
    }
}

/// Constant folding over a sliding three-instruction window.
///
/// `(push a, push b, iadd)` collapses to a single `ldc` of the wrapping
/// 32-bit sum. After a replacement the window is re-examined at the
/// folded constant, so left-nested chains like `1+2+3+4` collapse all the
/// way down to one load.
pub fn fold_constants(
    instructions: &mut Vec<Instruction>,
    pool: &mut ConstantPool,
) -> Result<usize> {
    let mut folded = 0;
    let mut i = 0;
    while i + 2 < instructions.len() {
        let window = (
            int_constant(&instructions[i], pool),
            int_constant(&instructions[i + 1], pool),
            instructions[i + 2].opcode(),
        );
        if let (Some(lhs), Some(rhs), Some(IADD)) = window {
            let sum = lhs.wrapping_add(rhs);
            let index = pool.add_integer(sum)?;
            log::debug!("constant folding: {} + {} = {}", lhs, rhs, sum);
            instructions.splice(i..i + 3, [Instruction::Cp { opcode: LDC, index }]);
            folded += 1;
        } else {
            i += 1;
        }
    }
    Ok(folded)
}

/// Remove instructions that no straight-line path can reach.
///
/// Everything after a return up to (but not including) the next `Label`
/// is unreachable; metadata nodes in that span are kept so the line
/// number table survives the rewrite.
pub fn eliminate_dead_code(instructions: &mut Vec<Instruction>) -> usize {
    let mut keep = vec![true; instructions.len()];
    let mut removed = 0;
    let mut i = 0;
    while i < instructions.len() {
        if instructions[i].is_return() {
            let mut j = i + 1;
            while j < instructions.len() {
                match &instructions[j] {
                    Instruction::Label(_) => break,
                    Instruction::LineNumber(_) | Instruction::Frame => {}
                    _ => {
                        if keep[j] {
                            keep[j] = false;
                            removed += 1;
                        }
                    }
                }
                j += 1;
            }
        }
        i += 1;
    }
    if removed > 0 {
        log::debug!("dead code: removed {} unreachable instructions", removed);
        let mut index = 0;
        instructions.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
    }
    removed
}
