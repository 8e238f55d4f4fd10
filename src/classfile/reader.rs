//! Class-file parser
//!
//! Parses a class file to the depth the rest of the pipeline consumes:
//! the full constant pool, field metadata, fully decoded method bodies,
//! and raw pass-through for every attribute the pipeline does not
//! interpret. Structural violations surface as `MalformedClass`; unknown
//! constant-pool tags as `UnsupportedConstant`.

use crate::classfile::{
    attribute_names, instruction, CodeAttribute, CodeSubAttribute, ClassFile, ConstantPool,
    ExceptionHandler, FieldInfo, MethodAttribute, MethodInfo, RawAttribute, MAGIC,
};
use crate::common::error::{Error, Result};

/// Bounds-checked big-endian cursor over class-file bytes
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| Error::malformed("unexpected end of class file"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes([self.read_u8()?, self.read_u8()?]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes([
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
            self.read_u8()?,
        ]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(((self.read_u32()? as u64) << 32) | self.read_u32()? as u64)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.pos + count > self.data.len() {
            return Err(Error::malformed("unexpected end of class file"));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }
}

/// Parse a complete class file
pub fn parse_class(bytes: &[u8]) -> Result<ClassFile> {
    let mut reader = ByteReader::new(bytes);

    let magic = reader.read_u32()?;
    if magic != MAGIC {
        return Err(Error::malformed(format!(
            "bad magic 0x{:08x} (expected 0x{:08x})",
            magic, MAGIC
        )));
    }
    let minor_version = reader.read_u16()?;
    let major_version = reader.read_u16()?;
    if major_version < 45 {
        return Err(Error::malformed(format!(
            "implausible class file version {}.{}",
            major_version, minor_version
        )));
    }

    let constant_pool = ConstantPool::parse(&mut reader)?;

    let access_flags = reader.read_u16()?;
    let this_class = reader.read_u16()?;
    let super_class = reader.read_u16()?;

    let interface_count = reader.read_u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(reader.read_u16()?);
    }

    let field_count = reader.read_u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(&mut reader)?);
    }

    let method_count = reader.read_u16()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parse_method(&mut reader, &constant_pool)?);
    }

    let attribute_count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(attribute_count as usize);
    for _ in 0..attribute_count {
        attributes.push(parse_raw_attribute(&mut reader)?);
    }

    if reader.remaining() != 0 {
        return Err(Error::malformed(format!(
            "{} trailing bytes after class structure",
            reader.remaining()
        )));
    }

    let class = ClassFile {
        minor_version,
        major_version,
        constant_pool,
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };
    // The this_class entry must resolve; everything downstream names the
    // class in diagnostics.
    class.class_name()?;
    Ok(class)
}

fn parse_raw_attribute(reader: &mut ByteReader<'_>) -> Result<RawAttribute> {
    let name_index = reader.read_u16()?;
    let length = reader.read_u32()? as usize;
    let info = reader.read_bytes(length)?.to_vec();
    Ok(RawAttribute { name_index, info })
}

fn parse_field(reader: &mut ByteReader<'_>) -> Result<FieldInfo> {
    let access_flags = reader.read_u16()?;
    let name_index = reader.read_u16()?;
    let descriptor_index = reader.read_u16()?;
    let attribute_count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(attribute_count as usize);
    for _ in 0..attribute_count {
        attributes.push(parse_raw_attribute(reader)?);
    }
    Ok(FieldInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_method(reader: &mut ByteReader<'_>, pool: &ConstantPool) -> Result<MethodInfo> {
    let access_flags = reader.read_u16()?;
    let name_index = reader.read_u16()?;
    let descriptor_index = reader.read_u16()?;
    let attribute_count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(attribute_count as usize);
    for _ in 0..attribute_count {
        let raw = parse_raw_attribute(reader)?;
        let name = pool.utf8(raw.name_index)?;
        let attribute = match name {
            attribute_names::CODE => {
                MethodAttribute::Code(parse_code_attribute(raw.name_index, &raw.info, pool)?)
            }
            attribute_names::EXCEPTIONS => {
                let mut inner = ByteReader::new(&raw.info);
                let count = inner.read_u16()?;
                let mut table = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    table.push(inner.read_u16()?);
                }
                if inner.remaining() != 0 {
                    return Err(Error::malformed("trailing bytes in Exceptions attribute"));
                }
                MethodAttribute::Exceptions {
                    name_index: raw.name_index,
                    exception_index_table: table,
                }
            }
            _ => MethodAttribute::Raw(raw),
        };
        attributes.push(attribute);
    }
    Ok(MethodInfo { access_flags, name_index, descriptor_index, attributes })
}

fn parse_code_attribute(
    name_index: u16,
    info: &[u8],
    pool: &ConstantPool,
) -> Result<CodeAttribute> {
    let mut reader = ByteReader::new(info);
    let max_stack = reader.read_u16()?;
    let max_locals = reader.read_u16()?;
    let code_length = reader.read_u32()? as usize;
    if code_length > u16::MAX as usize {
        return Err(Error::malformed("method body exceeds 65535 bytes"));
    }
    let code = reader.read_bytes(code_length)?.to_vec();

    let exception_count = reader.read_u16()?;
    let mut raw_handlers = Vec::with_capacity(exception_count as usize);
    let mut label_pcs = Vec::new();
    for _ in 0..exception_count {
        let start_pc = reader.read_u16()?;
        let end_pc = reader.read_u16()?;
        let handler_pc = reader.read_u16()?;
        let catch_type = reader.read_u16()?;
        label_pcs.extend_from_slice(&[start_pc, end_pc, handler_pc]);
        raw_handlers.push((start_pc, end_pc, handler_pc, catch_type));
    }

    // Sub-attributes: decode LineNumberTable entries into the instruction
    // list (a marker keeps the attribute's position); keep the rest raw.
    let attribute_count = reader.read_u16()?;
    let mut attributes = Vec::with_capacity(attribute_count as usize);
    let mut line_numbers = Vec::new();
    let mut saw_line_table = false;
    for _ in 0..attribute_count {
        let raw = parse_raw_attribute(&mut reader)?;
        let name = pool.utf8(raw.name_index)?;
        if name == attribute_names::LINE_NUMBER_TABLE && !saw_line_table {
            saw_line_table = true;
            let mut inner = ByteReader::new(&raw.info);
            let count = inner.read_u16()?;
            for _ in 0..count {
                let start_pc = inner.read_u16()?;
                let line = inner.read_u16()?;
                line_numbers.push((start_pc, line));
            }
            if inner.remaining() != 0 {
                return Err(Error::malformed("trailing bytes in LineNumberTable"));
            }
            attributes.push(CodeSubAttribute::LineNumberTable { name_index: raw.name_index });
        } else {
            attributes.push(CodeSubAttribute::Raw(raw));
        }
    }
    if reader.remaining() != 0 {
        return Err(Error::malformed("trailing bytes in Code attribute"));
    }

    let (instructions, labels) = instruction::decode_code(&code, &label_pcs, &line_numbers)?;
    let exception_table = raw_handlers
        .into_iter()
        .map(|(start, end, handler, catch_type)| ExceptionHandler {
            start: labels[&start],
            end: labels[&end],
            handler: labels[&handler],
            catch_type,
        })
        .collect();

    Ok(CodeAttribute {
        name_index,
        max_stack,
        max_locals,
        instructions,
        exception_table,
        attributes,
    })
}
