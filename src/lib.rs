//! jnc — ahead-of-time native compiler for JVM class files
//!
//! Ingests compiled `.class` files, translates integer-arithmetic method
//! bodies into native machine code, and wraps the result in a minimal
//! platform executable whose exit code is the method's return value.
//!
//! ## Architecture
//!
//! - **classfile**: class-file parsing, the decoded instruction model,
//!   and the round-trip serializer
//! - **analysis**: per-method instruction census and the hot-method
//!   heuristic
//! - **opt**: constant folding and post-return dead-code elimination
//! - **jit**: in-memory rewrite path (optimize hot methods, re-encode)
//! - **codegen**: per-ISA machine-code emitters (x86-64, AArch64)
//! - **container**: ELF64 and Mach-O 64 executable assembly
//! - **compiler**: the native pipeline gluing the stages together
//!
//! ## Compilation flow
//!
//! ```text
//! .class bytes → classfile → analysis → (opt) → codegen → container → executable
//!                              └────────> opt → classfile (JIT rewrite)
//! ```

pub mod analysis;
pub mod classfile;
pub mod codegen;
pub mod common;
pub mod compiler;
pub mod container;
pub mod jit;
pub mod opt;

use std::collections::HashMap;
use std::path::Path;

pub use analysis::MethodSummary;
pub use codegen::{NativeBlob, TargetIsa};
pub use common::{Classpath, Config, Error, Result};
pub use compiler::NativeCompiler;
pub use container::{ContainerFormat, ContainerImage};
pub use jit::RewriteOutcome;

/// Analyze a class: per-method census keyed by `name + descriptor`
pub fn analyze(class_bytes: &[u8]) -> Result<HashMap<String, MethodSummary>> {
    let class = classfile::parse_class(class_bytes)?;
    analysis::summarize_class(&class)
}

/// Rewrite a class in memory: optimize hot methods, re-encode the rest
/// untouched. The returned bytes are loadable by a class loader.
pub fn jit_rewrite(class_bytes: &[u8], config: &Config) -> Result<RewriteOutcome> {
    jit::rewrite_class(class_bytes, config)
}

/// Compile one method of a class to a native executable
pub fn compile_method_native(
    class_bytes: &[u8],
    method_selector: Option<&str>,
    out_path: &Path,
    config: &Config,
) -> Result<ContainerImage> {
    NativeCompiler::new(config.clone()).compile_method(class_bytes, method_selector, out_path)
}

/// Compile every non-constructor method of a class to one executable
pub fn compile_class_native(
    class_bytes: &[u8],
    out_path: &Path,
    config: &Config,
) -> Result<ContainerImage> {
    NativeCompiler::new(config.clone()).compile_class(class_bytes, out_path)
}

/// Compile a literal integer to an executable that exits with it
pub fn compile_expression(value: i32, out_path: &Path, config: &Config) -> Result<ContainerImage> {
    NativeCompiler::new(config.clone()).compile_expression(value, out_path)
}
