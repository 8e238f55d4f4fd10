//! Decoded instruction model and the code-array codec
//!
//! Methods are decoded into a flat instruction list in which jump targets
//! are symbolic labels rather than byte offsets, so rewriting passes can
//! insert and remove instructions without tracking positions. Two
//! synthetic node kinds live in the same list: `Label` (a transparent
//! jump-target marker) and `LineNumber`/`Frame` (metadata that rewrite
//! passes preserve and the emitter ignores). Encoding recomputes every
//! offset, including the alignment padding of `tableswitch` and
//! `lookupswitch`, so a decode→encode round-trip of unmodified code is
//! byte-identical.

use std::collections::{BTreeSet, HashMap};

use crate::classfile::opcodes::*;
use crate::common::error::{Error, Result};

/// Symbolic jump-target identifier, unique within one method body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u16);

/// One decoded bytecode instruction or synthetic marker
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// Bare opcode with no operand bytes
    Op(u8),
    /// `bipush` / `sipush` immediate push
    Push { opcode: u8, value: i32 },
    /// Local-variable access: `iload`..`astore`, the compact `_N` forms
    /// (index implied by the opcode), and `ret`
    Var { opcode: u8, index: u16, wide: bool },
    /// `iinc`
    Iinc { index: u16, delta: i16, wide: bool },
    /// Constant-pool reference: `ldc` forms, field and method refs,
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Cp { opcode: u8, index: u16 },
    /// `invokeinterface` with its historical count operand
    InvokeInterface { index: u16, count: u8 },
    /// `invokedynamic`
    InvokeDynamic { index: u16 },
    /// `newarray` with its primitive element type tag
    NewArray { atype: u8 },
    /// `multianewarray`
    MultiANewArray { index: u16, dims: u8 },
    /// Conditional or unconditional jump
    Branch { opcode: u8, target: LabelId },
    TableSwitch { default: LabelId, low: i32, high: i32, targets: Vec<LabelId> },
    LookupSwitch { default: LabelId, pairs: Vec<(i32, LabelId)> },
    /// Synthetic jump-target marker, transparent to every consumer
    Label(LabelId),
    /// Source line marker recovered from a LineNumberTable
    LineNumber(u16),
    /// Stack-map frame marker, preserved across rewrites
    Frame,
}

impl Instruction {
    /// True for synthetic nodes that are not real instructions
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame
        )
    }

    /// The JVM opcode, or `None` for synthetic nodes
    pub fn opcode(&self) -> Option<u8> {
        match self {
            Instruction::Op(op) => Some(*op),
            Instruction::Push { opcode, .. } => Some(*opcode),
            Instruction::Var { opcode, .. } => Some(*opcode),
            Instruction::Iinc { .. } => Some(IINC),
            Instruction::Cp { opcode, .. } => Some(*opcode),
            Instruction::InvokeInterface { .. } => Some(INVOKEINTERFACE),
            Instruction::InvokeDynamic { .. } => Some(INVOKEDYNAMIC),
            Instruction::NewArray { .. } => Some(NEWARRAY),
            Instruction::MultiANewArray { .. } => Some(MULTIANEWARRAY),
            Instruction::Branch { opcode, .. } => Some(*opcode),
            Instruction::TableSwitch { .. } => Some(TABLESWITCH),
            Instruction::LookupSwitch { .. } => Some(LOOKUPSWITCH),
            Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame => None,
        }
    }

    /// True for every return-family opcode (`ireturn`..`return`)
    pub fn is_return(&self) -> bool {
        matches!(self.opcode(), Some(op) if (IRETURN..=RETURN).contains(&op))
    }
}

fn is_compact_var(opcode: u8) -> bool {
    (ILOAD_0..=ALOAD_3).contains(&opcode) || (ISTORE_0..=ASTORE_3).contains(&opcode)
}

fn is_short_branch(opcode: u8) -> bool {
    (IFEQ..=JSR).contains(&opcode) || opcode == IFNULL || opcode == IFNONNULL
}

fn switch_pad(opcode_pc: u32) -> u32 {
    (4 - ((opcode_pc + 1) % 4)) % 4
}

/// Byte cursor over a code array with bounds-checked reads
struct CodeCursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> CodeCursor<'a> {
    fn new(code: &'a [u8]) -> Self {
        Self { code, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.code.len()
    }

    fn u8(&mut self) -> Result<u8> {
        let byte = *self
            .code
            .get(self.pos)
            .ok_or_else(|| Error::malformed("truncated bytecode"))?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn i16(&mut self) -> Result<i16> {
        Ok(self.u16()? as i16)
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes([self.u8()?, self.u8()?, self.u8()?, self.u8()?]))
    }

    fn skip(&mut self, count: usize) -> Result<()> {
        if self.pos + count > self.code.len() {
            return Err(Error::malformed("truncated bytecode"));
        }
        self.pos += count;
        Ok(())
    }
}

fn branch_target(pc: u32, rel: i32, code_len: usize) -> Result<u16> {
    let target = pc as i64 + rel as i64;
    if target < 0 || target as usize >= code_len {
        return Err(Error::malformed(format!(
            "branch target {} outside method (pc {}, code length {})",
            target, pc, code_len
        )));
    }
    Ok(target as u16)
}

/// First scan: instruction start offsets and all jump-target offsets
fn scan_boundaries(code: &[u8]) -> Result<(BTreeSet<u16>, BTreeSet<u16>)> {
    let mut cursor = CodeCursor::new(code);
    let mut starts = BTreeSet::new();
    let mut targets = BTreeSet::new();
    while !cursor.at_end() {
        let pc = cursor.pos as u32;
        starts.insert(pc as u16);
        let opcode = cursor.u8()?;
        match opcode {
            BIPUSH | LDC | NEWARRAY => cursor.skip(1)?,
            SIPUSH | LDC_W | LDC2_W | IINC => cursor.skip(2)?,
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => cursor.skip(1)?,
            op if is_short_branch(op) => {
                let rel = cursor.i16()? as i32;
                targets.insert(branch_target(pc, rel, code.len())?);
            }
            GOTO_W | JSR_W => {
                let rel = cursor.i32()?;
                targets.insert(branch_target(pc, rel, code.len())?);
            }
            TABLESWITCH => {
                cursor.skip(switch_pad(pc) as usize)?;
                let default = cursor.i32()?;
                targets.insert(branch_target(pc, default, code.len())?);
                let low = cursor.i32()?;
                let high = cursor.i32()?;
                if high < low {
                    return Err(Error::malformed("tableswitch high below low"));
                }
                for _ in low..=high {
                    let rel = cursor.i32()?;
                    targets.insert(branch_target(pc, rel, code.len())?);
                }
            }
            LOOKUPSWITCH => {
                cursor.skip(switch_pad(pc) as usize)?;
                let default = cursor.i32()?;
                targets.insert(branch_target(pc, default, code.len())?);
                let npairs = cursor.i32()?;
                if npairs < 0 {
                    return Err(Error::malformed("lookupswitch negative pair count"));
                }
                for _ in 0..npairs {
                    cursor.skip(4)?;
                    let rel = cursor.i32()?;
                    targets.insert(branch_target(pc, rel, code.len())?);
                }
            }
            WIDE => {
                let wide_op = cursor.u8()?;
                match wide_op {
                    IINC => cursor.skip(4)?,
                    ILOAD..=ALOAD | ISTORE..=ASTORE | RET => cursor.skip(2)?,
                    other => {
                        return Err(Error::malformed(format!(
                            "wide prefix before opcode 0x{:02x}",
                            other
                        )))
                    }
                }
            }
            GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                cursor.skip(2)?
            }
            INVOKEINTERFACE | INVOKEDYNAMIC => cursor.skip(4)?,
            MULTIANEWARRAY => cursor.skip(3)?,
            _ => {}
        }
    }
    Ok((starts, targets))
}

/// Decode a code array into an instruction list.
///
/// `extra_label_pcs` names offsets that must become labels even without a
/// branch pointing at them (exception-table boundaries); `line_numbers`
/// carries `(start_pc, line)` pairs from a LineNumberTable. Returns the
/// list together with the offset→label mapping used for decode-side
/// translation of tables that reference code offsets.
pub fn decode_code(
    code: &[u8],
    extra_label_pcs: &[u16],
    line_numbers: &[(u16, u16)],
) -> Result<(Vec<Instruction>, HashMap<u16, LabelId>)> {
    let (starts, mut label_pcs) = scan_boundaries(code)?;
    for &pc in extra_label_pcs {
        label_pcs.insert(pc);
    }
    for pc in &label_pcs {
        if !starts.contains(pc) && *pc as usize != code.len() {
            return Err(Error::malformed(format!(
                "offset {} is not an instruction boundary",
                pc
            )));
        }
    }
    for (pc, _) in line_numbers {
        if !starts.contains(pc) && *pc as usize != code.len() {
            return Err(Error::malformed(format!(
                "line number at offset {} is not an instruction boundary",
                pc
            )));
        }
    }

    let labels: HashMap<u16, LabelId> = label_pcs
        .iter()
        .enumerate()
        .map(|(ordinal, pc)| (*pc, LabelId(ordinal as u16)))
        .collect();
    let label_at = |pc: u16| -> LabelId { labels[&pc] };

    let mut instructions = Vec::new();
    let emit_markers = |instructions: &mut Vec<Instruction>, pc: u16| {
        if let Some(label) = labels.get(&pc) {
            instructions.push(Instruction::Label(*label));
        }
        for (start_pc, line) in line_numbers {
            if *start_pc == pc {
                instructions.push(Instruction::LineNumber(*line));
            }
        }
    };

    let mut cursor = CodeCursor::new(code);
    while !cursor.at_end() {
        let pc = cursor.pos as u32;
        emit_markers(&mut instructions, pc as u16);
        let opcode = cursor.u8()?;
        let instruction = match opcode {
            BIPUSH => Instruction::Push { opcode, value: cursor.u8()? as i8 as i32 },
            SIPUSH => Instruction::Push { opcode, value: cursor.i16()? as i32 },
            LDC => Instruction::Cp { opcode, index: cursor.u8()? as u16 },
            LDC_W | LDC2_W => Instruction::Cp { opcode, index: cursor.u16()? },
            ILOAD..=ALOAD | ISTORE..=ASTORE | RET => {
                Instruction::Var { opcode, index: cursor.u8()? as u16, wide: false }
            }
            op if is_compact_var(op) => {
                let base = if (ILOAD_0..=ALOAD_3).contains(&op) { ILOAD_0 } else { ISTORE_0 };
                Instruction::Var { opcode: op, index: ((op - base) % 4) as u16, wide: false }
            }
            IINC => Instruction::Iinc {
                index: cursor.u8()? as u16,
                delta: cursor.u8()? as i8 as i16,
                wide: false,
            },
            op if is_short_branch(op) => {
                let rel = cursor.i16()? as i32;
                Instruction::Branch { opcode: op, target: label_at(branch_target(pc, rel, code.len())?) }
            }
            GOTO_W | JSR_W => {
                let rel = cursor.i32()?;
                Instruction::Branch { opcode, target: label_at(branch_target(pc, rel, code.len())?) }
            }
            TABLESWITCH => {
                cursor.skip(switch_pad(pc) as usize)?;
                let default = label_at(branch_target(pc, cursor.i32()?, code.len())?);
                let low = cursor.i32()?;
                let high = cursor.i32()?;
                let mut switch_targets = Vec::with_capacity((high - low + 1) as usize);
                for _ in low..=high {
                    switch_targets.push(label_at(branch_target(pc, cursor.i32()?, code.len())?));
                }
                Instruction::TableSwitch { default, low, high, targets: switch_targets }
            }
            LOOKUPSWITCH => {
                cursor.skip(switch_pad(pc) as usize)?;
                let default = label_at(branch_target(pc, cursor.i32()?, code.len())?);
                let npairs = cursor.i32()?;
                let mut pairs = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let key = cursor.i32()?;
                    pairs.push((key, label_at(branch_target(pc, cursor.i32()?, code.len())?)));
                }
                Instruction::LookupSwitch { default, pairs }
            }
            WIDE => {
                let wide_op = cursor.u8()?;
                if wide_op == IINC {
                    Instruction::Iinc { index: cursor.u16()?, delta: cursor.i16()?, wide: true }
                } else {
                    Instruction::Var { opcode: wide_op, index: cursor.u16()?, wide: true }
                }
            }
            GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                Instruction::Cp { opcode, index: cursor.u16()? }
            }
            INVOKEINTERFACE => {
                let index = cursor.u16()?;
                let count = cursor.u8()?;
                cursor.skip(1)?;
                Instruction::InvokeInterface { index, count }
            }
            INVOKEDYNAMIC => {
                let index = cursor.u16()?;
                cursor.skip(2)?;
                Instruction::InvokeDynamic { index }
            }
            NEWARRAY => Instruction::NewArray { atype: cursor.u8()? },
            MULTIANEWARRAY => {
                let index = cursor.u16()?;
                let dims = cursor.u8()?;
                Instruction::MultiANewArray { index, dims }
            }
            other => Instruction::Op(other),
        };
        instructions.push(instruction);
    }
    // Labels that sit exactly past the last instruction (exception-table
    // end offsets) still need a node.
    emit_markers(&mut instructions, code.len() as u16);
    Ok((instructions, labels))
}

/// Result of encoding an instruction list back to a code array
#[derive(Debug)]
pub struct EncodedCode {
    pub code: Vec<u8>,
    pub label_pcs: HashMap<LabelId, u16>,
    pub line_numbers: Vec<(u16, u16)>,
}

fn encoded_size(instruction: &Instruction, pc: u32) -> usize {
    match instruction {
        Instruction::Op(_) => 1,
        Instruction::Push { opcode, .. } => {
            if *opcode == BIPUSH { 2 } else { 3 }
        }
        Instruction::Var { opcode, index, wide } => {
            if is_compact_var(*opcode) {
                1
            } else if *wide || *index > 0xff {
                4
            } else {
                2
            }
        }
        Instruction::Iinc { index, delta, wide } => {
            if *wide || *index > 0xff || i8::try_from(*delta).is_err() { 6 } else { 3 }
        }
        Instruction::Cp { opcode, index } => {
            if *opcode == LDC && *index <= 0xff { 2 } else { 3 }
        }
        Instruction::InvokeInterface { .. } | Instruction::InvokeDynamic { .. } => 5,
        Instruction::NewArray { .. } => 2,
        Instruction::MultiANewArray { .. } => 4,
        Instruction::Branch { opcode, .. } => {
            if *opcode == GOTO_W || *opcode == JSR_W { 5 } else { 3 }
        }
        Instruction::TableSwitch { low, high, .. } => {
            1 + switch_pad(pc) as usize + 12 + 4 * (*high - *low + 1) as usize
        }
        Instruction::LookupSwitch { pairs, .. } => {
            1 + switch_pad(pc) as usize + 8 + 8 * pairs.len()
        }
        Instruction::Label(_) | Instruction::LineNumber(_) | Instruction::Frame => 0,
    }
}

/// Encode an instruction list into a code array, resolving labels
pub fn encode_code(instructions: &[Instruction]) -> Result<EncodedCode> {
    // Sizing pass: fix every instruction's offset and every label's value.
    let mut label_pcs = HashMap::new();
    let mut positions = Vec::with_capacity(instructions.len());
    let mut pc: u32 = 0;
    for instruction in instructions {
        positions.push(pc);
        if let Instruction::Label(label) = instruction {
            if label_pcs.insert(*label, pc as u16).is_some() {
                return Err(Error::internal(format!("duplicate label {:?}", label)));
            }
        }
        pc += encoded_size(instruction, pc) as u32;
        if pc > u16::MAX as u32 {
            return Err(Error::codegen_error("method body exceeds 65535 bytes"));
        }
    }

    let resolve = |label: LabelId| -> Result<u16> {
        label_pcs
            .get(&label)
            .copied()
            .ok_or_else(|| Error::internal(format!("unresolved label {:?}", label)))
    };

    // Emission pass.
    let mut code = Vec::with_capacity(pc as usize);
    let mut line_numbers = Vec::new();
    for (instruction, &insn_pc) in instructions.iter().zip(&positions) {
        match instruction {
            Instruction::Op(op) => code.push(*op),
            Instruction::Push { opcode, value } => {
                code.push(*opcode);
                if *opcode == BIPUSH {
                    code.push(*value as i8 as u8);
                } else {
                    code.extend_from_slice(&(*value as i16).to_be_bytes());
                }
            }
            Instruction::Var { opcode, index, wide } => {
                if is_compact_var(*opcode) {
                    code.push(*opcode);
                } else if *wide || *index > 0xff {
                    code.push(WIDE);
                    code.push(*opcode);
                    code.extend_from_slice(&index.to_be_bytes());
                } else {
                    code.push(*opcode);
                    code.push(*index as u8);
                }
            }
            Instruction::Iinc { index, delta, wide } => {
                if *wide || *index > 0xff || i8::try_from(*delta).is_err() {
                    code.push(WIDE);
                    code.push(IINC);
                    code.extend_from_slice(&index.to_be_bytes());
                    code.extend_from_slice(&delta.to_be_bytes());
                } else {
                    code.push(IINC);
                    code.push(*index as u8);
                    code.push(*delta as i8 as u8);
                }
            }
            Instruction::Cp { opcode, index } => {
                if *opcode == LDC {
                    if *index <= 0xff {
                        code.push(LDC);
                        code.push(*index as u8);
                    } else {
                        // A folded constant landed past the one-byte range.
                        code.push(LDC_W);
                        code.extend_from_slice(&index.to_be_bytes());
                    }
                } else {
                    code.push(*opcode);
                    code.extend_from_slice(&index.to_be_bytes());
                }
            }
            Instruction::InvokeInterface { index, count } => {
                code.push(INVOKEINTERFACE);
                code.extend_from_slice(&index.to_be_bytes());
                code.push(*count);
                code.push(0);
            }
            Instruction::InvokeDynamic { index } => {
                code.push(INVOKEDYNAMIC);
                code.extend_from_slice(&index.to_be_bytes());
                code.extend_from_slice(&[0, 0]);
            }
            Instruction::NewArray { atype } => {
                code.push(NEWARRAY);
                code.push(*atype);
            }
            Instruction::MultiANewArray { index, dims } => {
                code.push(MULTIANEWARRAY);
                code.extend_from_slice(&index.to_be_bytes());
                code.push(*dims);
            }
            Instruction::Branch { opcode, target } => {
                let rel = resolve(*target)? as i32 - insn_pc as i32;
                if *opcode == GOTO_W || *opcode == JSR_W {
                    code.push(*opcode);
                    code.extend_from_slice(&rel.to_be_bytes());
                } else {
                    let rel = i16::try_from(rel).map_err(|_| {
                        Error::codegen_error(format!("branch target too far: {}", rel))
                    })?;
                    code.push(*opcode);
                    code.extend_from_slice(&rel.to_be_bytes());
                }
            }
            Instruction::TableSwitch { default, low, high, targets } => {
                code.push(TABLESWITCH);
                code.resize(code.len() + switch_pad(insn_pc) as usize, 0);
                let rel = resolve(*default)? as i32 - insn_pc as i32;
                code.extend_from_slice(&rel.to_be_bytes());
                code.extend_from_slice(&low.to_be_bytes());
                code.extend_from_slice(&high.to_be_bytes());
                for target in targets {
                    let rel = resolve(*target)? as i32 - insn_pc as i32;
                    code.extend_from_slice(&rel.to_be_bytes());
                }
            }
            Instruction::LookupSwitch { default, pairs } => {
                code.push(LOOKUPSWITCH);
                code.resize(code.len() + switch_pad(insn_pc) as usize, 0);
                let rel = resolve(*default)? as i32 - insn_pc as i32;
                code.extend_from_slice(&rel.to_be_bytes());
                code.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for (key, target) in pairs {
                    code.extend_from_slice(&key.to_be_bytes());
                    let rel = resolve(*target)? as i32 - insn_pc as i32;
                    code.extend_from_slice(&rel.to_be_bytes());
                }
            }
            Instruction::Label(_) | Instruction::Frame => {}
            Instruction::LineNumber(line) => {
                line_numbers.push((insn_pc as u16, *line));
            }
        }
    }
    Ok(EncodedCode { code, label_pcs, line_numbers })
}
