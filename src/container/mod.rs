//! Executable container assembly
//!
//! Wraps emitted machine code into a platform executable and writes it
//! to disk with executable permissions. Two interchangeable formats; the
//! caller picks one and the builders share nothing beyond the
//! `ContainerImage` result shape.

pub mod elf;
pub mod macho;
pub mod trampoline;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::codegen::{NativeBlob, TargetIsa};
use crate::common::error::{Error, Result};

pub use elf::ElfWriter;
pub use macho::MachOWriter;

/// Executable container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Elf64,
    MachO64,
}

impl ContainerFormat {
    /// The native format of the machine running the compiler
    pub fn host() -> Self {
        if cfg!(target_os = "macos") {
            ContainerFormat::MachO64
        } else {
            ContainerFormat::Elf64
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Elf64 => "ELF64",
            ContainerFormat::MachO64 => "Mach-O 64",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ContainerFormat {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "elf" | "elf64" | "linux" => Ok(ContainerFormat::Elf64),
            "macho" | "mach-o" | "macho64" | "macos" => Ok(ContainerFormat::MachO64),
            other => Err(Error::codegen_error(format!("unknown container format: {}", other))),
        }
    }
}

/// An assembled executable image
#[derive(Debug, Clone)]
pub struct ContainerImage {
    /// The complete file contents
    pub bytes: Vec<u8>,
    /// File offset of the entry point
    pub entry_offset: u64,
    /// Virtual address of the entry point
    pub entry_vaddr: u64,
}

/// Assemble an executable image in memory
pub fn build_image(
    format: ContainerFormat,
    isa: TargetIsa,
    blob: &NativeBlob,
    entry_offset: u64,
) -> ContainerImage {
    match format {
        ContainerFormat::Elf64 => ElfWriter::new(isa).build(blob.as_bytes(), entry_offset),
        ContainerFormat::MachO64 => MachOWriter::new(isa).build(blob.as_bytes(), entry_offset),
    }
}

/// Assemble an executable and write it to `path` with mode rwxr-xr-x
pub fn write_executable(
    path: &Path,
    format: ContainerFormat,
    isa: TargetIsa,
    blob: &NativeBlob,
    entry_offset: u64,
) -> Result<ContainerImage> {
    let image = build_image(format, isa, blob, entry_offset);
    std::fs::write(path, &image.bytes).map_err(|err| Error::write_failed(path, err))?;
    make_executable(path);
    log::debug!(
        "wrote {} executable: {} ({} bytes, entry 0x{:x})",
        format,
        path.display(),
        image.bytes.len(),
        image.entry_vaddr
    );
    Ok(image)
}

/// Best-effort chmod; platforms without POSIX permission bits only warn
#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let permissions = std::fs::Permissions::from_mode(0o755);
    if let Err(err) = std::fs::set_permissions(path, permissions) {
        log::warn!(
            "could not set executable permissions on {}: {}",
            path.display(),
            err
        );
    }
}

#[cfg(not(unix))]
fn make_executable(path: &Path) {
    log::warn!(
        "POSIX permissions unsupported here; {} may need manual chmod",
        path.display()
    );
}
