//! ELF64 executable writer
//!
//! Emits a minimal static executable: one ELF header, one `PT_LOAD`
//! program header, zero padding up to the page-aligned code region, and
//! the exit-trampoline-wrapped machine code. No section headers, no
//! symbol tables, no dynamic linking.

use crate::codegen::TargetIsa;
use crate::container::{trampoline, ContainerImage};

// ELF identification
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ELFOSABI_NONE: u8 = 0;

// Object file type
const ET_EXEC: u16 = 2;

// Machine types
const EM_X86_64: u16 = 62;
const EM_AARCH64: u16 = 183;

// Program header
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_R: u32 = 4;

/// Image base virtual address
pub const BASE_VADDR: u64 = 0x40_0000;
/// File offset (and vaddr delta) of the code region
pub const CODE_OFFSET: u64 = 0x1000;

/// ELF64 writer for one target ISA
#[derive(Debug, Clone, Copy)]
pub struct ElfWriter {
    isa: TargetIsa,
}

impl ElfWriter {
    pub fn new(isa: TargetIsa) -> Self {
        Self { isa }
    }

    /// Build the executable image for a machine-code blob. `entry_offset`
    /// is relative to the wrapped blob; the wrapper sits at offset 0.
    pub fn build(&self, machine_code: &[u8], entry_offset: u64) -> ContainerImage {
        let code_vaddr = BASE_VADDR + CODE_OFFSET;
        let entry = code_vaddr + entry_offset;

        // Trampoline first, user code after it.
        let mut code = trampoline::linux_exit(self.isa);
        code.extend_from_slice(machine_code);

        let mut image = Vec::with_capacity(CODE_OFFSET as usize + code.len());
        self.write_header(&mut image, entry);
        self.write_program_header(&mut image, code.len() as u64, code_vaddr);

        // Zero padding up to the code region.
        image.resize(CODE_OFFSET as usize, 0);
        image.extend_from_slice(&code);

        log::debug!(
            "elf: {} bytes, entry 0x{:x}, code at 0x{:x}",
            image.len(),
            entry,
            CODE_OFFSET
        );
        ContainerImage {
            bytes: image,
            entry_offset: CODE_OFFSET + entry_offset,
            entry_vaddr: entry,
        }
    }

    fn machine(&self) -> u16 {
        match self.isa {
            TargetIsa::X86_64 => EM_X86_64,
            TargetIsa::Arm64 => EM_AARCH64,
        }
    }

    fn write_header(&self, image: &mut Vec<u8>, entry: u64) {
        image.extend_from_slice(&[0x7f, b'E', b'L', b'F']); // magic
        image.push(ELFCLASS64);
        image.push(ELFDATA2LSB);
        image.push(EV_CURRENT);
        image.push(ELFOSABI_NONE);
        image.extend_from_slice(&[0; 8]); // ABI version + padding
        image.extend_from_slice(&ET_EXEC.to_le_bytes()); // e_type
        image.extend_from_slice(&self.machine().to_le_bytes()); // e_machine
        image.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes()); // e_version
        image.extend_from_slice(&entry.to_le_bytes()); // e_entry
        image.extend_from_slice(&64u64.to_le_bytes()); // e_phoff
        image.extend_from_slice(&0u64.to_le_bytes()); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
        image.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
        image.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    }

    fn write_program_header(&self, image: &mut Vec<u8>, code_size: u64, code_vaddr: u64) {
        image.extend_from_slice(&PT_LOAD.to_le_bytes()); // p_type
        image.extend_from_slice(&(PF_R | PF_X).to_le_bytes()); // p_flags
        image.extend_from_slice(&CODE_OFFSET.to_le_bytes()); // p_offset
        image.extend_from_slice(&code_vaddr.to_le_bytes()); // p_vaddr
        image.extend_from_slice(&code_vaddr.to_le_bytes()); // p_paddr
        image.extend_from_slice(&code_size.to_le_bytes()); // p_filesz
        image.extend_from_slice(&code_size.to_le_bytes()); // p_memsz
        image.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align
    }
}
