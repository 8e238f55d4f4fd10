use jnc::classfile::opcodes::*;
use jnc::classfile::{ConstantPool, Instruction};
use jnc::codegen::{CodeGenerator, NativeBlob, TargetIsa};
use jnc::container::{build_image, ContainerFormat};

mod common;
use common::iconst;

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn u64_at(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn zero_return_blob(isa: TargetIsa) -> NativeBlob {
    let pool = ConstantPool::new();
    CodeGenerator::new(isa).generate_method(&[iconst(0), Instruction::Op(IRETURN)], &pool)
}

#[test]
fn header_matches_the_fixed_layout() {
    let blob = zero_return_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    // MH_MAGIC_64 reads CF FA ED FE byte-wise.
    assert_eq!(&bytes[0..4], &[0xcf, 0xfa, 0xed, 0xfe]);
    assert_eq!(u32_at(bytes, 4), 0x0100000c, "CPU_TYPE_ARM64");
    assert_eq!(u32_at(bytes, 8), 0, "CPU_SUBTYPE_ARM64_ALL");
    assert_eq!(u32_at(bytes, 12), 2, "MH_EXECUTE");
    assert_eq!(u32_at(bytes, 16), 2, "ncmds");
    assert_eq!(u32_at(bytes, 20), 176, "sizeofcmds");
    assert_eq!(u32_at(bytes, 24), 0x200005, "MH_NOUNDEFS | MH_DYLDLINK | MH_PIE");
    assert_eq!(u32_at(bytes, 28), 0, "reserved");
}

#[test]
fn x86_64_cpu_type() {
    let blob = zero_return_blob(TargetIsa::X86_64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::X86_64, &blob, 0);
    assert_eq!(u32_at(&image.bytes, 4), 0x01000007, "CPU_TYPE_X86_64");
    assert_eq!(u32_at(&image.bytes, 8), 3, "CPU_SUBTYPE_X86_64_ALL");
}

#[test]
fn text_segment_maps_the_code() {
    let blob = zero_return_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    // segment_command_64 at offset 32
    assert_eq!(u32_at(bytes, 32), 0x19, "LC_SEGMENT_64");
    assert_eq!(u32_at(bytes, 36), 152, "cmdsize includes the section");
    assert_eq!(&bytes[40..56], b"__TEXT\0\0\0\0\0\0\0\0\0\0");
    assert_eq!(u64_at(bytes, 56), 0x100000000, "vmaddr");
    assert_eq!(u64_at(bytes, 64), blob.len() as u64, "vmsize");
    assert_eq!(u64_at(bytes, 72), 0x1000, "fileoff");
    assert_eq!(u64_at(bytes, 80), blob.len() as u64, "filesize");
    assert_eq!(u32_at(bytes, 88), 5, "maxprot r-x");
    assert_eq!(u32_at(bytes, 92), 5, "initprot r-x");
    assert_eq!(u32_at(bytes, 96), 1, "nsects");
    assert_eq!(u32_at(bytes, 100), 0, "segment flags");
}

#[test]
fn text_section_describes_pure_instructions() {
    let blob = zero_return_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    // section_64 at offset 104
    assert_eq!(&bytes[104..120], b"__text\0\0\0\0\0\0\0\0\0\0");
    assert_eq!(&bytes[120..136], b"__TEXT\0\0\0\0\0\0\0\0\0\0");
    assert_eq!(u64_at(bytes, 136), 0x100001000, "addr");
    assert_eq!(u64_at(bytes, 144), blob.len() as u64, "size");
    assert_eq!(u32_at(bytes, 152), 0x1000, "offset");
    assert_eq!(u32_at(bytes, 156), 4, "align 2^4");
    assert_eq!(u32_at(bytes, 160), 0, "reloff");
    assert_eq!(u32_at(bytes, 164), 0, "nreloc");
    assert_eq!(u32_at(bytes, 168), 0x80000400, "pure + some instructions");
    assert_eq!(u32_at(bytes, 172), 0);
    assert_eq!(u32_at(bytes, 176), 0);
    assert_eq!(u32_at(bytes, 180), 0);
}

#[test]
fn main_command_points_at_the_code_file_offset() {
    let blob = zero_return_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    // entry_point_command at offset 184
    assert_eq!(u32_at(bytes, 184), 0x80000028, "LC_MAIN");
    assert_eq!(u32_at(bytes, 188), 24, "cmdsize");
    assert_eq!(u64_at(bytes, 192), 0x1000, "entryoff");
    assert_eq!(u64_at(bytes, 200), 0, "stacksize");
    assert_eq!(image.entry_offset, 0x1000);
    assert_eq!(image.entry_vaddr, 0x100001000);

    let shifted = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0x20);
    assert_eq!(u64_at(&shifted.bytes, 192), 0x1020, "entryoff honors the blob offset");
}

#[test]
fn code_sits_at_0x1000_unwrapped_and_page_padded() {
    let blob = zero_return_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::MachO64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    // No trampoline: the blob itself is the entry.
    assert_eq!(&bytes[0x1000..0x1000 + blob.len()], blob.as_bytes());
    // Load-command padding is all zero.
    assert!(bytes[208..0x1000].iter().all(|&b| b == 0));
    // The file ends on a page boundary.
    assert_eq!(bytes.len() % 4096, 0);
    assert!(bytes[0x1000 + blob.len()..].iter().all(|&b| b == 0));
}
