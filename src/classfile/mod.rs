//! Class-file object model
//!
//! The in-memory representation mirrors the on-disk structure closely
//! enough that a decode→encode round trip of an untouched class is
//! byte-identical: constant-pool indices never move, uninterpreted
//! attributes are carried as raw bytes in their original positions, and
//! only `Code`, `Exceptions`, and `LineNumberTable` are decoded into
//! structured form.

pub mod constpool;
pub mod instruction;
pub mod opcodes;
pub mod reader;
pub mod writer;

pub use constpool::{Constant, ConstantPool};
pub use instruction::{Instruction, LabelId};
pub use reader::parse_class;
pub use writer::class_file_to_bytes;

use crate::common::error::Result;

/// Class file magic number (0xCAFEBABE)
pub const MAGIC: u32 = 0xCAFEBABE;

/// Access flags for classes, fields, and methods
pub mod access_flags {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_PRIVATE: u16 = 0x0002;
    pub const ACC_PROTECTED: u16 = 0x0004;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
    pub const ACC_SYNTHETIC: u16 = 0x1000;
    pub const ACC_ENUM: u16 = 0x4000;
}

/// Names of the attributes the pipeline interprets
pub mod attribute_names {
    pub const CODE: &str = "Code";
    pub const EXCEPTIONS: &str = "Exceptions";
    pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
}

/// An attribute carried as raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

/// One exception-table entry with label-based range bounds
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    pub catch_type: u16,
}

/// An attribute nested inside a `Code` attribute
#[derive(Debug, Clone, PartialEq)]
pub enum CodeSubAttribute {
    /// Marker for the LineNumberTable; the entries themselves live in the
    /// instruction list and the table is regenerated on encode
    LineNumberTable { name_index: u16 },
    Raw(RawAttribute),
}

/// Decoded `Code` attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub name_index: u16,
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Instruction>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeSubAttribute>,
}

/// A method-level attribute
#[derive(Debug, Clone, PartialEq)]
pub enum MethodAttribute {
    Code(CodeAttribute),
    Exceptions { name_index: u16, exception_index_table: Vec<u16> },
    Raw(RawAttribute),
}

/// Field metadata (attributes are pass-through only)
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<RawAttribute>,
}

/// One method with its decoded instruction stream
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<MethodAttribute>,
}

impl MethodInfo {
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8(self.descriptor_index)
    }

    /// `name + descriptor`, the per-class unique method key
    pub fn key(&self, pool: &ConstantPool) -> Result<String> {
        Ok(format!("{}{}", self.name(pool)?, self.descriptor(pool)?))
    }

    pub fn code(&self) -> Option<&CodeAttribute> {
        self.attributes.iter().find_map(|attr| match attr {
            MethodAttribute::Code(code) => Some(code),
            _ => None,
        })
    }

    pub fn code_mut(&mut self) -> Option<&mut CodeAttribute> {
        self.attributes.iter_mut().find_map(|attr| match attr {
            MethodAttribute::Code(code) => Some(code),
            _ => None,
        })
    }

    /// The return-type portion of the descriptor (`I`, `V`, `Lx/y;`, ...)
    pub fn return_descriptor<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        let descriptor = self.descriptor(pool)?;
        match descriptor.rfind(')') {
            Some(close) => Ok(&descriptor[close + 1..]),
            None => Ok(descriptor),
        }
    }

    /// True when the descriptor declares a `void` return
    pub fn returns_void(&self, pool: &ConstantPool) -> bool {
        self.return_descriptor(pool).map(|r| r == "V").unwrap_or(false)
    }
}

/// A parsed class file
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<RawAttribute>,
}

impl ClassFile {
    /// The class's internal (slashed) name
    pub fn class_name(&self) -> Result<&str> {
        self.constant_pool.class_name(self.this_class)
    }

    /// The super class's internal name, `None` for `java/lang/Object` itself
    pub fn super_class_name(&self) -> Result<Option<&str>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        Ok(Some(self.constant_pool.class_name(self.super_class)?))
    }

    /// Find a method by name, optionally narrowed by exact descriptor
    pub fn find_method(&self, name: &str, descriptor: Option<&str>) -> Option<&MethodInfo> {
        self.methods.iter().find(|method| {
            method.name(&self.constant_pool).map(|n| n == name).unwrap_or(false)
                && descriptor
                    .map(|d| {
                        method
                            .descriptor(&self.constant_pool)
                            .map(|md| md == d)
                            .unwrap_or(false)
                    })
                    .unwrap_or(true)
        })
    }
}

impl Default for ClassFile {
    fn default() -> Self {
        Self {
            minor_version: 0,
            major_version: 52,
            constant_pool: ConstantPool::new(),
            access_flags: 0,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// Constructor and static-initializer names, excluded from native compilation
pub fn is_initializer(name: &str) -> bool {
    name == "<init>" || name == "<clinit>"
}
