//! Native code generation
//!
//! Translates one method's decoded instruction stream into machine code
//! for a target ISA. The source is a stack machine, so the translation
//! keeps operands on the native call stack: constant pushes materialize
//! into a scratch register and push, binary operations pop two operands,
//! compute, and push back. The two emitters share only the instruction
//! selector and an operation vocabulary; their encodings are independent.

pub mod aarch64;
pub mod x86_64;

use std::fmt;
use std::str::FromStr;

use crate::classfile::opcodes::*;
use crate::classfile::{ConstantPool, Instruction};
use crate::common::error::Error;

/// Target instruction set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetIsa {
    X86_64,
    Arm64,
}

impl TargetIsa {
    /// Detect the ISA of the machine running the compiler
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => TargetIsa::Arm64,
            _ => TargetIsa::X86_64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TargetIsa::X86_64 => "X86_64",
            TargetIsa::Arm64 => "ARM64",
        }
    }
}

impl fmt::Display for TargetIsa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TargetIsa {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        match value.to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "amd64" => Ok(TargetIsa::X86_64),
            "arm64" | "aarch64" => Ok(TargetIsa::Arm64),
            other => Err(Error::codegen_error(format!("unknown ISA: {}", other))),
        }
    }
}

/// Append-only buffer for emitted machine code
#[derive(Debug, Default)]
pub struct CodeBuffer {
    code: Vec<u8>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self { code: Vec::new() }
    }

    /// Emit raw bytes
    pub fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn finish(self) -> Vec<u8> {
        self.code
    }
}

/// Machine code emitted for one method (or several, concatenated)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBlob {
    bytes: Vec<u8>,
}

impl NativeBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Binary integer operations the emitters implement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Operation vocabulary shared by the ISA emitters.
///
/// One implementation per ISA; no encodings are shared between them.
pub(crate) trait InsnEmitter {
    fn prologue(&self, buf: &mut CodeBuffer);
    fn epilogue(&self, buf: &mut CodeBuffer);
    fn push_const(&self, buf: &mut CodeBuffer, value: i32);
    fn load_local(&self, buf: &mut CodeBuffer, index: u16);
    fn store_local(&self, buf: &mut CodeBuffer, index: u16);
    fn binop(&self, buf: &mut CodeBuffer, op: BinOp);
    /// Move top-of-stack into the integer return register, then tear the
    /// frame down
    fn ret_int(&self, buf: &mut CodeBuffer);
    fn nop(&self, buf: &mut CodeBuffer);
}

/// Per-method instruction selector over an ISA emitter
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    isa: TargetIsa,
}

impl CodeGenerator {
    pub fn new(isa: TargetIsa) -> Self {
        Self { isa }
    }

    /// Generator bound to the host architecture
    pub fn host() -> Self {
        Self::new(TargetIsa::host())
    }

    pub fn isa(&self) -> TargetIsa {
        self.isa
    }

    fn emitter(&self) -> &'static dyn InsnEmitter {
        match self.isa {
            TargetIsa::X86_64 => &x86_64::X86_64Emitter,
            TargetIsa::Arm64 => &aarch64::Arm64Emitter,
        }
    }

    /// Emit machine code for one method body. Never fails: opcodes the
    /// backend does not support become a single native `nop` (reported
    /// through the log) and malformed streams are the reader's problem.
    pub fn generate_method(
        &self,
        instructions: &[Instruction],
        pool: &ConstantPool,
    ) -> NativeBlob {
        let emitter = self.emitter();
        let mut buf = CodeBuffer::new();
        emitter.prologue(&mut buf);

        let mut terminated = false;
        for instruction in instructions {
            if instruction.is_metadata() {
                continue;
            }
            terminated = false;
            match instruction {
                Instruction::Op(op) if (ICONST_M1..=ICONST_5).contains(op) => {
                    emitter.push_const(&mut buf, *op as i32 - ICONST_0 as i32);
                }
                Instruction::Push { value, .. } => {
                    emitter.push_const(&mut buf, *value);
                }
                Instruction::Cp { opcode, index } if *opcode == LDC || *opcode == LDC_W => {
                    match pool.integer(*index) {
                        Some(value) => emitter.push_const(&mut buf, value),
                        None => self.unsupported(emitter, &mut buf, *opcode),
                    }
                }
                Instruction::Var { opcode, index, .. }
                    if *opcode == ILOAD || (ILOAD_0..=ILOAD_3).contains(opcode) =>
                {
                    emitter.load_local(&mut buf, *index);
                }
                Instruction::Var { opcode, index, .. }
                    if *opcode == ISTORE || (ISTORE_0..=ISTORE_3).contains(opcode) =>
                {
                    emitter.store_local(&mut buf, *index);
                }
                Instruction::Op(IADD) => emitter.binop(&mut buf, BinOp::Add),
                Instruction::Op(ISUB) => emitter.binop(&mut buf, BinOp::Sub),
                Instruction::Op(IMUL) => emitter.binop(&mut buf, BinOp::Mul),
                Instruction::Op(IDIV) => emitter.binop(&mut buf, BinOp::Div),
                Instruction::Op(IRETURN) => {
                    emitter.ret_int(&mut buf);
                    terminated = true;
                }
                Instruction::Op(RETURN) => {
                    emitter.epilogue(&mut buf);
                    terminated = true;
                }
                other => {
                    let opcode = other.opcode().unwrap_or(NOP);
                    self.unsupported(emitter, &mut buf, opcode);
                }
            }
        }
        // Methods normally end in a return; cover the stream that does
        // not so the blob still tears its frame down.
        if !terminated {
            emitter.epilogue(&mut buf);
        }
        NativeBlob::from_bytes(buf.finish())
    }

    fn unsupported(&self, emitter: &dyn InsnEmitter, buf: &mut CodeBuffer, opcode: u8) {
        log::warn!(
            "{}: unsupported opcode {}, emitting nop",
            self.isa.name(),
            mnemonic(opcode)
        );
        emitter.nop(buf);
    }
}
