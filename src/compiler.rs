//! Native compilation pipeline
//!
//! Drives class bytes end to end: parse, select, optionally optimize,
//! emit machine code, and package the result into an executable
//! container. Selection follows the demo-friendly policy of the JVM
//! side: `main` first, then the first public static method, then any
//! non-constructor method.

use std::collections::HashMap;
use std::path::Path;

use crate::analysis;
use crate::classfile::opcodes::{IRETURN, LDC};
use crate::classfile::{access_flags, is_initializer, parse_class, ClassFile, ConstantPool, Instruction};
use crate::codegen::{CodeGenerator, NativeBlob, TargetIsa};
use crate::common::{Config, Error, Result};
use crate::container::{self, ContainerFormat, ContainerImage};
use crate::opt;

/// Ahead-of-time compiler from class bytes to native executables
#[derive(Debug, Clone)]
pub struct NativeCompiler {
    isa: TargetIsa,
    format: ContainerFormat,
    config: Config,
}

impl NativeCompiler {
    pub fn new(config: Config) -> Self {
        Self {
            isa: config.target_isa(),
            format: config.container_format(),
            config,
        }
    }

    pub fn isa(&self) -> TargetIsa {
        self.isa
    }

    pub fn format(&self) -> ContainerFormat {
        self.format
    }

    /// Compile one method to a standalone executable.
    ///
    /// `selector` is `name` or `name:descriptor`; without it the
    /// executable-method policy picks the target.
    pub fn compile_method(
        &self,
        class_bytes: &[u8],
        selector: Option<&str>,
        out_path: &Path,
    ) -> Result<ContainerImage> {
        let mut class = parse_class(class_bytes)?;
        let index = select_method_index(&class, selector)?;
        let key = class.methods[index].key(&class.constant_pool)?;
        log::debug!(
            "native: compiling {}.{} for {} / {}",
            class.class_name()?,
            key,
            self.isa,
            self.format
        );
        let summary = analysis::summarize_method(&class.methods[index], &class.constant_pool)?;
        log::debug!(
            "native: {} instructions, {} arithmetic ops",
            summary.instruction_count,
            summary.arithmetic_ops
        );

        if self.config.optimize {
            if let Some(code) = class.methods[index].code_mut() {
                opt::optimize_method(code, &mut class.constant_pool)?;
            }
        }

        let blob = self.generate(&class, index);
        container::write_executable(out_path, self.format, self.isa, &blob, 0)
    }

    /// Compile every non-constructor method, concatenated in class-file
    /// order. Entry is the first emitted method (offset 0); there is no
    /// inter-method linkage.
    pub fn compile_class(&self, class_bytes: &[u8], out_path: &Path) -> Result<ContainerImage> {
        let mut class = parse_class(class_bytes)?;

        if self.config.optimize {
            for index in 0..class.methods.len() {
                if let Some(code) = class.methods[index].code_mut() {
                    opt::optimize_method(code, &mut class.constant_pool)?;
                }
            }
        }

        let mut combined = Vec::new();
        let mut offsets: HashMap<String, usize> = HashMap::new();
        for index in 0..class.methods.len() {
            let name = class.methods[index].name(&class.constant_pool)?;
            if is_initializer(name) {
                continue;
            }
            let key = class.methods[index].key(&class.constant_pool)?;
            let blob = self.generate(&class, index);
            log::debug!("native: {} at blob offset {}", key, combined.len());
            offsets.insert(key, combined.len());
            combined.extend_from_slice(blob.as_bytes());
        }
        if offsets.is_empty() {
            return Err(Error::NoExecutableMethod);
        }

        let blob = NativeBlob::from_bytes(combined);
        container::write_executable(out_path, self.format, self.isa, &blob, 0)
    }

    /// Compile a literal integer into an executable that exits with it.
    /// The value goes through the regular emitter as a constant load
    /// followed by an integer return.
    pub fn compile_expression(&self, value: i32, out_path: &Path) -> Result<ContainerImage> {
        let mut pool = ConstantPool::new();
        let index = pool.add_integer(value)?;
        let instructions = vec![
            Instruction::Cp { opcode: LDC, index },
            Instruction::Op(IRETURN),
        ];
        let blob = CodeGenerator::new(self.isa).generate_method(&instructions, &pool);
        container::write_executable(out_path, self.format, self.isa, &blob, 0)
    }

    fn generate(&self, class: &ClassFile, index: usize) -> NativeBlob {
        let generator = CodeGenerator::new(self.isa);
        match class.methods[index].code() {
            Some(code) => generator.generate_method(&code.instructions, &class.constant_pool),
            // Abstract and native methods have no body; emit an empty frame.
            None => generator.generate_method(&[], &class.constant_pool),
        }
    }
}

/// Resolve an explicit `name` / `name:descriptor` selector, or fall back
/// to the executable-method policy
fn select_method_index(class: &ClassFile, selector: Option<&str>) -> Result<usize> {
    match selector {
        Some(selector) => {
            let (name, descriptor) = match selector.split_once(':') {
                Some((name, descriptor)) => (name, Some(descriptor)),
                None => (selector, None),
            };
            class
                .methods
                .iter()
                .position(|method| {
                    method.name(&class.constant_pool).map(|n| n == name).unwrap_or(false)
                        && descriptor
                            .map(|d| {
                                method
                                    .descriptor(&class.constant_pool)
                                    .map(|md| md == d)
                                    .unwrap_or(false)
                            })
                            .unwrap_or(true)
                })
                .ok_or(Error::NoExecutableMethod)
        }
        None => find_executable_method(class),
    }
}

/// `main([Ljava/lang/String;)V` first, then the first public static
/// non-constructor method, then any non-constructor method
fn find_executable_method(class: &ClassFile) -> Result<usize> {
    let pool = &class.constant_pool;

    for (index, method) in class.methods.iter().enumerate() {
        if method.name(pool).unwrap_or("") == "main"
            && method.descriptor(pool).unwrap_or("") == "([Ljava/lang/String;)V"
        {
            return Ok(index);
        }
    }
    for (index, method) in class.methods.iter().enumerate() {
        let public_static = method.access_flags & access_flags::ACC_PUBLIC != 0
            && method.access_flags & access_flags::ACC_STATIC != 0;
        if public_static && !is_initializer(method.name(pool).unwrap_or("")) {
            return Ok(index);
        }
    }
    for (index, method) in class.methods.iter().enumerate() {
        if !is_initializer(method.name(pool).unwrap_or("")) {
            return Ok(index);
        }
    }
    Err(Error::NoExecutableMethod)
}
