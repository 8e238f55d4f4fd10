//! Constant pool parsing, lookup, and serialization
//!
//! The pool is stored exactly as it appears in the class file: slot 0 is
//! unused, and `long`/`double` entries own a phantom second slot. The JIT
//! round-trip relies on indices never moving; new entries (integers minted
//! by constant folding) are only ever appended.

use crate::classfile::reader::ByteReader;
use crate::common::error::{Error, Result};

/// Entry tags from the class-file format
mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// A single constant pool entry, grouped by payload shape rather than
/// tag order: inline literal data, a single pool index, an index pair,
/// or (for method handles) a kind byte plus an index. Reference-kind
/// operands stay as unresolved pool indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    // inline literal data
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    // one pool index
    Class(u16),
    String(u16),
    MethodType(u16),
    Module(u16),
    Package(u16),
    // a pair of pool indices
    FieldRef(u16, u16),
    MethodRef(u16, u16),
    InterfaceMethodRef(u16, u16),
    NameAndType(u16, u16),
    Dynamic(u16, u16),
    InvokeDynamic(u16, u16),
    // reference kind byte + pool index
    MethodHandle(u8, u16),
}

impl Constant {
    /// The tag byte identifying this entry kind on disk
    pub fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => tag::UTF8,
            Constant::Integer(_) => tag::INTEGER,
            Constant::Float(_) => tag::FLOAT,
            Constant::Long(_) => tag::LONG,
            Constant::Double(_) => tag::DOUBLE,
            Constant::Class(_) => tag::CLASS,
            Constant::String(_) => tag::STRING,
            Constant::MethodType(_) => tag::METHOD_TYPE,
            Constant::Module(_) => tag::MODULE,
            Constant::Package(_) => tag::PACKAGE,
            Constant::FieldRef(..) => tag::FIELD_REF,
            Constant::MethodRef(..) => tag::METHOD_REF,
            Constant::InterfaceMethodRef(..) => tag::INTERFACE_METHOD_REF,
            Constant::NameAndType(..) => tag::NAME_AND_TYPE,
            Constant::Dynamic(..) => tag::DYNAMIC,
            Constant::InvokeDynamic(..) => tag::INVOKE_DYNAMIC,
            Constant::MethodHandle(..) => tag::METHOD_HANDLE,
        }
    }

    /// True for entries that occupy two pool slots
    pub fn is_wide(&self) -> bool {
        matches!(self, Constant::Long(_) | Constant::Double(_))
    }

    /// Append `tag + payload` in class-file encoding. Payloads group by
    /// arity: inline literal data, one pool index, or an index pair.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(self.tag());
        match self {
            Constant::Utf8(text) => {
                out.extend_from_slice(&(text.len() as u16).to_be_bytes());
                out.extend_from_slice(text.as_bytes());
            }
            Constant::Integer(value) => out.extend_from_slice(&value.to_be_bytes()),
            Constant::Float(value) => out.extend_from_slice(&value.to_be_bytes()),
            Constant::Long(value) => out.extend_from_slice(&value.to_be_bytes()),
            Constant::Double(value) => out.extend_from_slice(&value.to_be_bytes()),
            Constant::MethodHandle(kind, reference) => {
                out.push(*kind);
                out.extend_from_slice(&reference.to_be_bytes());
            }
            Constant::Class(index)
            | Constant::String(index)
            | Constant::MethodType(index)
            | Constant::Module(index)
            | Constant::Package(index) => out.extend_from_slice(&index.to_be_bytes()),
            Constant::FieldRef(first, second)
            | Constant::MethodRef(first, second)
            | Constant::InterfaceMethodRef(first, second)
            | Constant::NameAndType(first, second)
            | Constant::Dynamic(first, second)
            | Constant::InvokeDynamic(first, second) => {
                out.extend_from_slice(&first.to_be_bytes());
                out.extend_from_slice(&second.to_be_bytes());
            }
        }
    }
}

fn read_index_pair(reader: &mut ByteReader<'_>) -> Result<(u16, u16)> {
    Ok((reader.read_u16()?, reader.read_u16()?))
}

/// Constant pool with class-file slot numbering
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    // entries[0] is pool index 1; None marks the phantom slot after a
    // long or double entry
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Parse a constant pool, including its leading entry count
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self> {
        let count = reader.read_u16()?;
        let mut pool = Self::new();
        let mut index = 1u16;
        while index < count {
            let tag_byte = reader.read_u8()?;
            let constant = match tag_byte {
                tag::UTF8 => {
                    let length = reader.read_u16()? as usize;
                    let bytes = reader.read_bytes(length)?;
                    let value = String::from_utf8(bytes.to_vec()).map_err(|_| {
                        Error::malformed(format!("invalid UTF-8 in constant #{}", index))
                    })?;
                    Constant::Utf8(value)
                }
                tag::INTEGER => Constant::Integer(reader.read_u32()? as i32),
                tag::FLOAT => Constant::Float(f32::from_bits(reader.read_u32()?)),
                tag::LONG => Constant::Long(reader.read_u64()? as i64),
                tag::DOUBLE => Constant::Double(f64::from_bits(reader.read_u64()?)),
                tag::CLASS => Constant::Class(reader.read_u16()?),
                tag::STRING => Constant::String(reader.read_u16()?),
                tag::METHOD_TYPE => Constant::MethodType(reader.read_u16()?),
                tag::MODULE => Constant::Module(reader.read_u16()?),
                tag::PACKAGE => Constant::Package(reader.read_u16()?),
                tag::METHOD_HANDLE => {
                    Constant::MethodHandle(reader.read_u8()?, reader.read_u16()?)
                }
                tag::FIELD_REF => {
                    let (class, name_and_type) = read_index_pair(reader)?;
                    Constant::FieldRef(class, name_and_type)
                }
                tag::METHOD_REF => {
                    let (class, name_and_type) = read_index_pair(reader)?;
                    Constant::MethodRef(class, name_and_type)
                }
                tag::INTERFACE_METHOD_REF => {
                    let (class, name_and_type) = read_index_pair(reader)?;
                    Constant::InterfaceMethodRef(class, name_and_type)
                }
                tag::NAME_AND_TYPE => {
                    let (name, descriptor) = read_index_pair(reader)?;
                    Constant::NameAndType(name, descriptor)
                }
                tag::DYNAMIC => {
                    let (bootstrap, name_and_type) = read_index_pair(reader)?;
                    Constant::Dynamic(bootstrap, name_and_type)
                }
                tag::INVOKE_DYNAMIC => {
                    let (bootstrap, name_and_type) = read_index_pair(reader)?;
                    Constant::InvokeDynamic(bootstrap, name_and_type)
                }
                other => return Err(Error::UnsupportedConstant { tag: other }),
            };
            let wide = constant.is_wide();
            pool.entries.push(Some(constant));
            if wide {
                pool.entries.push(None);
                index += 2;
            } else {
                index += 1;
            }
        }
        Ok(pool)
    }

    /// The `constant_pool_count` value written to the class file
    pub fn entry_count(&self) -> u16 {
        self.entries.len() as u16 + 1
    }

    /// Look up an entry by its class-file index
    pub fn get(&self, index: u16) -> Option<&Constant> {
        if index == 0 {
            return None;
        }
        self.entries.get(index as usize - 1)?.as_ref()
    }

    /// Resolve a Utf8 entry
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Utf8(value)) => Ok(value),
            _ => Err(Error::malformed(format!(
                "constant #{} is not a Utf8 entry",
                index
            ))),
        }
    }

    /// Resolve a Class entry to its (slashed) name
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index) {
            Some(Constant::Class(name_index)) => self.utf8(*name_index),
            _ => Err(Error::malformed(format!(
                "constant #{} is not a Class entry",
                index
            ))),
        }
    }

    /// Integer value of an entry, if it is an Integer constant
    pub fn integer(&self, index: u16) -> Option<i32> {
        match self.get(index) {
            Some(Constant::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    /// Find or append a Utf8 entry, returning its index
    pub fn add_utf8(&mut self, value: &str) -> Result<u16> {
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some(Constant::Utf8(existing)) = entry {
                if existing == value {
                    return Ok(slot as u16 + 1);
                }
            }
        }
        self.push(Constant::Utf8(value.to_string()))
    }

    /// Find or append a Class entry for a (slashed) name
    pub fn add_class(&mut self, name: &str) -> Result<u16> {
        let name_index = self.add_utf8(name)?;
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some(Constant::Class(existing)) = entry {
                if *existing == name_index {
                    return Ok(slot as u16 + 1);
                }
            }
        }
        self.push(Constant::Class(name_index))
    }

    /// Find or append an Integer entry, returning its index
    pub fn add_integer(&mut self, value: i32) -> Result<u16> {
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some(Constant::Integer(existing)) = entry {
                if *existing == value {
                    return Ok(slot as u16 + 1);
                }
            }
        }
        self.push(Constant::Integer(value))
    }

    fn push(&mut self, constant: Constant) -> Result<u16> {
        let slots = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + slots > u16::MAX as usize - 1 {
            return Err(Error::internal(format!(
                "constant pool exhausted ({} slots in use)",
                self.entries.len()
            )));
        }
        let wide = constant.is_wide();
        self.entries.push(Some(constant));
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(None);
        }
        Ok(index)
    }

    /// Serialize the pool, including its leading entry count
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.entry_count().to_be_bytes());
        for entry in self.entries.iter().flatten() {
            entry.write_to(&mut bytes);
        }
        bytes
    }
}
