//! Class-file serializer
//!
//! The encode direction of the round trip. Structure mirrors the reader
//! exactly; everything decoded is regenerated (code arrays, exception
//! tables, LineNumberTable) and everything raw is copied back in place.

use crate::classfile::{
    instruction, ClassFile, CodeAttribute, CodeSubAttribute, MethodAttribute, MethodInfo,
    RawAttribute, MAGIC,
};
use crate::common::error::{Error, Result};

/// Serialize a class file back to bytes
pub fn class_file_to_bytes(class: &ClassFile) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();

    bytes.extend_from_slice(&MAGIC.to_be_bytes());
    bytes.extend_from_slice(&class.minor_version.to_be_bytes());
    bytes.extend_from_slice(&class.major_version.to_be_bytes());

    bytes.extend_from_slice(&class.constant_pool.to_bytes());

    bytes.extend_from_slice(&class.access_flags.to_be_bytes());
    bytes.extend_from_slice(&class.this_class.to_be_bytes());
    bytes.extend_from_slice(&class.super_class.to_be_bytes());

    bytes.extend_from_slice(&(class.interfaces.len() as u16).to_be_bytes());
    for interface in &class.interfaces {
        bytes.extend_from_slice(&interface.to_be_bytes());
    }

    bytes.extend_from_slice(&(class.fields.len() as u16).to_be_bytes());
    for field in &class.fields {
        bytes.extend_from_slice(&field.access_flags.to_be_bytes());
        bytes.extend_from_slice(&field.name_index.to_be_bytes());
        bytes.extend_from_slice(&field.descriptor_index.to_be_bytes());
        bytes.extend_from_slice(&(field.attributes.len() as u16).to_be_bytes());
        for attribute in &field.attributes {
            write_raw_attribute(&mut bytes, attribute);
        }
    }

    bytes.extend_from_slice(&(class.methods.len() as u16).to_be_bytes());
    for method in &class.methods {
        write_method(&mut bytes, method)?;
    }

    bytes.extend_from_slice(&(class.attributes.len() as u16).to_be_bytes());
    for attribute in &class.attributes {
        write_raw_attribute(&mut bytes, attribute);
    }

    Ok(bytes)
}

fn write_raw_attribute(bytes: &mut Vec<u8>, attribute: &RawAttribute) {
    bytes.extend_from_slice(&attribute.name_index.to_be_bytes());
    bytes.extend_from_slice(&(attribute.info.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&attribute.info);
}

fn write_method(bytes: &mut Vec<u8>, method: &MethodInfo) -> Result<()> {
    bytes.extend_from_slice(&method.access_flags.to_be_bytes());
    bytes.extend_from_slice(&method.name_index.to_be_bytes());
    bytes.extend_from_slice(&method.descriptor_index.to_be_bytes());
    bytes.extend_from_slice(&(method.attributes.len() as u16).to_be_bytes());
    for attribute in &method.attributes {
        match attribute {
            MethodAttribute::Code(code) => {
                let body = encode_code_attribute(code)?;
                bytes.extend_from_slice(&code.name_index.to_be_bytes());
                bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
                bytes.extend_from_slice(&body);
            }
            MethodAttribute::Exceptions { name_index, exception_index_table } => {
                bytes.extend_from_slice(&name_index.to_be_bytes());
                let length = 2 + 2 * exception_index_table.len() as u32;
                bytes.extend_from_slice(&length.to_be_bytes());
                bytes.extend_from_slice(&(exception_index_table.len() as u16).to_be_bytes());
                for index in exception_index_table {
                    bytes.extend_from_slice(&index.to_be_bytes());
                }
            }
            MethodAttribute::Raw(raw) => write_raw_attribute(bytes, raw),
        }
    }
    Ok(())
}

fn encode_code_attribute(code: &CodeAttribute) -> Result<Vec<u8>> {
    let encoded = instruction::encode_code(&code.instructions)?;
    let resolve = |label| -> Result<u16> {
        encoded
            .label_pcs
            .get(&label)
            .copied()
            .ok_or_else(|| Error::internal(format!("unresolved label {:?} in exception table", label)))
    };

    let mut body = Vec::new();
    body.extend_from_slice(&code.max_stack.to_be_bytes());
    body.extend_from_slice(&code.max_locals.to_be_bytes());
    body.extend_from_slice(&(encoded.code.len() as u32).to_be_bytes());
    body.extend_from_slice(&encoded.code);

    body.extend_from_slice(&(code.exception_table.len() as u16).to_be_bytes());
    for handler in &code.exception_table {
        body.extend_from_slice(&resolve(handler.start)?.to_be_bytes());
        body.extend_from_slice(&resolve(handler.end)?.to_be_bytes());
        body.extend_from_slice(&resolve(handler.handler)?.to_be_bytes());
        body.extend_from_slice(&handler.catch_type.to_be_bytes());
    }

    body.extend_from_slice(&(code.attributes.len() as u16).to_be_bytes());
    for attribute in &code.attributes {
        match attribute {
            CodeSubAttribute::LineNumberTable { name_index } => {
                body.extend_from_slice(&name_index.to_be_bytes());
                let length = 2 + 4 * encoded.line_numbers.len() as u32;
                body.extend_from_slice(&length.to_be_bytes());
                body.extend_from_slice(&(encoded.line_numbers.len() as u16).to_be_bytes());
                for (pc, line) in &encoded.line_numbers {
                    body.extend_from_slice(&pc.to_be_bytes());
                    body.extend_from_slice(&line.to_be_bytes());
                }
            }
            CodeSubAttribute::Raw(raw) => write_raw_attribute(&mut body, raw),
        }
    }
    Ok(body)
}
