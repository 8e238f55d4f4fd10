//! Mach-O 64 executable writer
//!
//! Emits a minimal executable: `mach_header_64`, one `LC_SEGMENT_64`
//! carrying a single `__text` section, one `LC_MAIN`, zero padding up to
//! the page-aligned code region, and the raw machine code. The blob is
//! entered directly (no exit trampoline); its final `ret` only
//! terminates the process via the dyld `LC_MAIN` path.

use crate::codegen::TargetIsa;
use crate::container::ContainerImage;

const MH_MAGIC_64: u32 = 0xfeed_facf;

// CPU types and subtypes
const CPU_TYPE_X86_64: u32 = 0x0100_0007;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;
const CPU_SUBTYPE_X86_64_ALL: u32 = 3;
const CPU_SUBTYPE_ARM64_ALL: u32 = 0;

const MH_EXECUTE: u32 = 0x2;
const MH_NOUNDEFS: u32 = 0x1;
const MH_DYLDLINK: u32 = 0x4;
const MH_PIE: u32 = 0x20_0000;

const LC_SEGMENT_64: u32 = 0x19;
const LC_MAIN: u32 = 0x8000_0028;

const VM_PROT_READ: u32 = 0x1;
const VM_PROT_EXECUTE: u32 = 0x4;

// S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS
const TEXT_SECTION_FLAGS: u32 = 0x8000_0400;

/// Image base virtual address
pub const BASE_VADDR: u64 = 0x1_0000_0000;
/// File offset of the code region
pub const CODE_OFFSET: u64 = 0x1000;

const PAGE_SIZE: usize = 4096;
// segment_command_64 + section_64 + entry_point_command
const SIZEOF_CMDS: u32 = 72 + 80 + 24;

/// Mach-O 64 writer for one target ISA
#[derive(Debug, Clone, Copy)]
pub struct MachOWriter {
    isa: TargetIsa,
}

impl MachOWriter {
    pub fn new(isa: TargetIsa) -> Self {
        Self { isa }
    }

    /// Build the executable image for a machine-code blob. `entry_offset`
    /// is relative to the blob, which lands at file offset 0x1000.
    pub fn build(&self, machine_code: &[u8], entry_offset: u64) -> ContainerImage {
        let entry_file_offset = entry_offset + CODE_OFFSET;

        let mut image = Vec::with_capacity(CODE_OFFSET as usize + machine_code.len());
        self.write_header(&mut image);
        self.write_segment_command(&mut image, machine_code.len() as u64);
        self.write_text_section(&mut image, machine_code.len() as u64);
        self.write_main_command(&mut image, entry_file_offset);

        // Zero padding up to the code region, then the code, then out to
        // a page boundary.
        image.resize(CODE_OFFSET as usize, 0);
        image.extend_from_slice(machine_code);
        let padded = image.len().div_ceil(PAGE_SIZE) * PAGE_SIZE;
        image.resize(padded, 0);

        log::debug!(
            "mach-o: {} bytes, entry offset 0x{:x}, code at 0x{:x}",
            image.len(),
            entry_file_offset,
            CODE_OFFSET
        );
        ContainerImage {
            bytes: image,
            entry_offset: entry_file_offset,
            entry_vaddr: BASE_VADDR + entry_file_offset,
        }
    }

    fn cpu_type(&self) -> (u32, u32) {
        match self.isa {
            TargetIsa::X86_64 => (CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_ALL),
            TargetIsa::Arm64 => (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL),
        }
    }

    fn write_header(&self, image: &mut Vec<u8>) {
        let (cputype, cpusubtype) = self.cpu_type();
        image.extend_from_slice(&MH_MAGIC_64.to_le_bytes()); // magic
        image.extend_from_slice(&cputype.to_le_bytes());
        image.extend_from_slice(&cpusubtype.to_le_bytes());
        image.extend_from_slice(&MH_EXECUTE.to_le_bytes()); // filetype
        image.extend_from_slice(&2u32.to_le_bytes()); // ncmds
        image.extend_from_slice(&SIZEOF_CMDS.to_le_bytes()); // sizeofcmds
        image.extend_from_slice(&(MH_NOUNDEFS | MH_DYLDLINK | MH_PIE).to_le_bytes()); // flags
        image.extend_from_slice(&0u32.to_le_bytes()); // reserved
    }

    fn write_segment_command(&self, image: &mut Vec<u8>, code_size: u64) {
        image.extend_from_slice(&LC_SEGMENT_64.to_le_bytes()); // cmd
        image.extend_from_slice(&(72u32 + 80).to_le_bytes()); // cmdsize (+ section)
        write_name(image, "__TEXT"); // segname
        image.extend_from_slice(&BASE_VADDR.to_le_bytes()); // vmaddr
        image.extend_from_slice(&code_size.to_le_bytes()); // vmsize
        image.extend_from_slice(&CODE_OFFSET.to_le_bytes()); // fileoff
        image.extend_from_slice(&code_size.to_le_bytes()); // filesize
        image.extend_from_slice(&(VM_PROT_READ | VM_PROT_EXECUTE).to_le_bytes()); // maxprot
        image.extend_from_slice(&(VM_PROT_READ | VM_PROT_EXECUTE).to_le_bytes()); // initprot
        image.extend_from_slice(&1u32.to_le_bytes()); // nsects
        image.extend_from_slice(&0u32.to_le_bytes()); // flags
    }

    fn write_text_section(&self, image: &mut Vec<u8>, code_size: u64) {
        write_name(image, "__text"); // sectname
        write_name(image, "__TEXT"); // segname
        image.extend_from_slice(&(BASE_VADDR + CODE_OFFSET).to_le_bytes()); // addr
        image.extend_from_slice(&code_size.to_le_bytes()); // size
        image.extend_from_slice(&(CODE_OFFSET as u32).to_le_bytes()); // offset
        image.extend_from_slice(&4u32.to_le_bytes()); // align (2^4 = 16)
        image.extend_from_slice(&0u32.to_le_bytes()); // reloff
        image.extend_from_slice(&0u32.to_le_bytes()); // nreloc
        image.extend_from_slice(&TEXT_SECTION_FLAGS.to_le_bytes()); // flags
        image.extend_from_slice(&0u32.to_le_bytes()); // reserved1
        image.extend_from_slice(&0u32.to_le_bytes()); // reserved2
        image.extend_from_slice(&0u32.to_le_bytes()); // reserved3
    }

    fn write_main_command(&self, image: &mut Vec<u8>, entry_file_offset: u64) {
        image.extend_from_slice(&LC_MAIN.to_le_bytes()); // cmd
        image.extend_from_slice(&24u32.to_le_bytes()); // cmdsize
        image.extend_from_slice(&entry_file_offset.to_le_bytes()); // entryoff
        image.extend_from_slice(&0u64.to_le_bytes()); // stacksize
    }
}

fn write_name(image: &mut Vec<u8>, name: &str) {
    let mut bytes = [0u8; 16];
    let copy_len = name.len().min(16);
    bytes[..copy_len].copy_from_slice(&name.as_bytes()[..copy_len]);
    image.extend_from_slice(&bytes);
}
