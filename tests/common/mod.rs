//! Shared test helpers: synthetic class construction and a straight-line
//! interpreter used as the execution oracle.

#![allow(dead_code)]

use jnc::classfile::opcodes::*;
use jnc::classfile::{
    access_flags, class_file_to_bytes, ClassFile, CodeAttribute, ConstantPool, Instruction,
    MethodAttribute, MethodInfo,
};

/// Push-constant instruction in its smallest encoding; values outside the
/// `sipush` range need a pool entry, which callers manage themselves.
pub fn iconst(value: i32) -> Instruction {
    match value {
        -1..=5 => Instruction::Op((value + ICONST_0 as i32) as u8),
        -128..=127 => Instruction::Push { opcode: BIPUSH, value },
        -32768..=32767 => Instruction::Push { opcode: SIPUSH, value },
        _ => panic!("constant {} needs an ldc; add it to the pool", value),
    }
}

pub fn iload(index: u16) -> Instruction {
    if index <= 3 {
        Instruction::Var { opcode: ILOAD_0 + index as u8, index, wide: false }
    } else {
        Instruction::Var { opcode: ILOAD, index, wide: false }
    }
}

pub fn istore(index: u16) -> Instruction {
    if index <= 3 {
        Instruction::Var { opcode: ISTORE_0 + index as u8, index, wide: false }
    } else {
        Instruction::Var { opcode: ISTORE, index, wide: false }
    }
}

/// One method for a synthetic class
pub struct TestMethod {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub instructions: Vec<Instruction>,
}

impl TestMethod {
    pub fn new(name: &str, descriptor: &str, instructions: Vec<Instruction>) -> Self {
        Self {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            access_flags: access_flags::ACC_PUBLIC | access_flags::ACC_STATIC,
            instructions,
        }
    }

    pub fn returning_int(name: &str, instructions: Vec<Instruction>) -> Self {
        Self::new(name, "()I", instructions)
    }

    pub fn with_flags(mut self, access_flags: u16) -> Self {
        self.access_flags = access_flags;
        self
    }
}

/// Build an in-memory class with the given public static methods
pub fn build_class(class_name: &str, methods: Vec<TestMethod>) -> ClassFile {
    let mut class = ClassFile::default();
    class.access_flags = access_flags::ACC_PUBLIC | access_flags::ACC_SUPER;
    class.this_class = class.constant_pool.add_class(class_name).expect("pool");
    class.super_class = class.constant_pool.add_class("java/lang/Object").expect("pool");
    let code_name = class.constant_pool.add_utf8("Code").expect("pool");

    for method in methods {
        let name_index = class.constant_pool.add_utf8(&method.name).expect("pool");
        let descriptor_index = class.constant_pool.add_utf8(&method.descriptor).expect("pool");
        class.methods.push(MethodInfo {
            access_flags: method.access_flags,
            name_index,
            descriptor_index,
            attributes: vec![MethodAttribute::Code(CodeAttribute {
                name_index: code_name,
                max_stack: 8,
                max_locals: 8,
                instructions: method.instructions,
                exception_table: Vec::new(),
                attributes: Vec::new(),
            })],
        });
    }
    class
}

/// Serialized bytes of a synthetic single-method class returning int
pub fn int_method_class(class_name: &str, method_name: &str, instructions: Vec<Instruction>) -> Vec<u8> {
    let class = build_class(class_name, vec![TestMethod::returning_int(method_name, instructions)]);
    class_file_to_bytes(&class).expect("serialize synthetic class")
}

/// Straight-line interpreter over the supported opcode subset; the
/// execution oracle for round-trip comparisons. Returns `None` on
/// division by zero or when the method never returns a value.
pub fn interpret(instructions: &[Instruction], pool: &ConstantPool) -> Option<i32> {
    let mut stack: Vec<i32> = Vec::new();
    let mut locals = [0i32; 64];
    for instruction in instructions {
        match instruction {
            Instruction::Op(op) if (ICONST_M1..=ICONST_5).contains(op) => {
                stack.push(*op as i32 - ICONST_0 as i32);
            }
            Instruction::Push { value, .. } => stack.push(*value),
            Instruction::Cp { opcode, index } if *opcode == LDC || *opcode == LDC_W => {
                stack.push(pool.integer(*index)?);
            }
            Instruction::Var { opcode, index, .. }
                if *opcode == ILOAD || (ILOAD_0..=ILOAD_3).contains(opcode) =>
            {
                stack.push(locals[*index as usize]);
            }
            Instruction::Var { opcode, index, .. }
                if *opcode == ISTORE || (ISTORE_0..=ISTORE_3).contains(opcode) =>
            {
                locals[*index as usize] = stack.pop()?;
            }
            Instruction::Op(op @ (IADD | ISUB | IMUL | IDIV)) => {
                let rhs = stack.pop()?;
                let lhs = stack.pop()?;
                let result = match *op {
                    IADD => lhs.wrapping_add(rhs),
                    ISUB => lhs.wrapping_sub(rhs),
                    IMUL => lhs.wrapping_mul(rhs),
                    _ => {
                        if rhs == 0 {
                            return None;
                        }
                        lhs.wrapping_div(rhs)
                    }
                };
                stack.push(result);
            }
            Instruction::Op(IRETURN) => return stack.pop(),
            Instruction::Op(RETURN) => return None,
            _ => {}
        }
    }
    None
}

/// Oracle over serialized class bytes: parse, find the method, interpret
pub fn interpret_class_method(class_bytes: &[u8], method_name: &str) -> Option<i32> {
    let class = jnc::classfile::parse_class(class_bytes).expect("parse class for oracle");
    let method = class.find_method(method_name, None)?;
    let code = method.code()?;
    interpret(&code.instructions, &class.constant_pool)
}

/// Find a byte subsequence; used to assert on emitted encodings
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
