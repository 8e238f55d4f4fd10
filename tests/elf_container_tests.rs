use jnc::classfile::opcodes::*;
use jnc::classfile::{ConstantPool, Instruction};
use jnc::codegen::{CodeGenerator, NativeBlob, TargetIsa};
use jnc::container::{build_image, write_executable, ContainerFormat};

mod common;
use common::{contains_bytes, iconst};

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn u64_at(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn sample_blob(isa: TargetIsa) -> NativeBlob {
    let pool = ConstantPool::new();
    CodeGenerator::new(isa).generate_method(
        &[iconst(0), iconst(42), Instruction::Op(IADD), Instruction::Op(IRETURN)],
        &pool,
    )
}

#[test]
fn header_fields_match_the_fixed_layout() {
    let blob = sample_blob(TargetIsa::X86_64);
    let image = build_image(ContainerFormat::Elf64, TargetIsa::X86_64, &blob, 0);
    let bytes = &image.bytes;

    assert_eq!(&bytes[0..4], &[0x7f, b'E', b'L', b'F']);
    assert_eq!(bytes[4], 2, "ELFCLASS64");
    assert_eq!(bytes[5], 1, "little endian");
    assert_eq!(bytes[6], 1, "EV_CURRENT");
    assert_eq!(bytes[7], 0, "ELFOSABI_NONE");
    assert_eq!(u16_at(bytes, 16), 2, "ET_EXEC");
    assert_eq!(u16_at(bytes, 18), 62, "EM_X86_64");
    assert_eq!(u32_at(bytes, 20), 1, "e_version");
    assert_eq!(u64_at(bytes, 24), 0x401000, "entry");
    assert_eq!(u64_at(bytes, 32), 64, "phoff");
    assert_eq!(u64_at(bytes, 40), 0, "shoff");
    assert_eq!(u32_at(bytes, 48), 0, "flags");
    assert_eq!(u16_at(bytes, 52), 64, "ehsize");
    assert_eq!(u16_at(bytes, 54), 56, "phentsize");
    assert_eq!(u16_at(bytes, 56), 1, "phnum");
    assert_eq!(u16_at(bytes, 58), 0, "shentsize");
    assert_eq!(u16_at(bytes, 60), 0, "shnum");
    assert_eq!(u16_at(bytes, 62), 0, "shstrndx");

    assert_eq!(image.entry_vaddr, 0x401000);
    assert_eq!(image.entry_offset, 0x1000);
}

#[test]
fn program_header_loads_the_code_page() {
    let blob = sample_blob(TargetIsa::X86_64);
    let wrapped_len = blob.len() as u64 + 17; // trampoline + user code
    let image = build_image(ContainerFormat::Elf64, TargetIsa::X86_64, &blob, 0);
    let bytes = &image.bytes;

    assert_eq!(u32_at(bytes, 64), 1, "PT_LOAD");
    assert_eq!(u32_at(bytes, 68), 5, "PF_R | PF_X");
    assert_eq!(u64_at(bytes, 72), 0x1000, "p_offset");
    assert_eq!(u64_at(bytes, 80), 0x401000, "p_vaddr");
    assert_eq!(u64_at(bytes, 88), 0x401000, "p_paddr");
    assert_eq!(u64_at(bytes, 96), wrapped_len, "p_filesz");
    assert_eq!(u64_at(bytes, 104), wrapped_len, "p_memsz");
    assert_eq!(u64_at(bytes, 112), 0x1000, "p_align");
}

#[test]
fn code_region_starts_at_0x1000_with_the_trampoline() {
    let blob = sample_blob(TargetIsa::X86_64);
    let image = build_image(ContainerFormat::Elf64, TargetIsa::X86_64, &blob, 0);
    let bytes = &image.bytes;

    // Header padding is all zero.
    assert!(bytes[120..0x1000].iter().all(|&b| b == 0));
    // The 17-byte exit trampoline sits first.
    assert_eq!(
        &bytes[0x1000..0x1011],
        &[
            0xe8, 0x0c, 0x00, 0x00, 0x00, // call +12
            0x48, 0x89, 0xc7, // mov rdi, rax
            0x48, 0xc7, 0xc0, 0x3c, 0x00, 0x00, 0x00, // mov rax, 60
            0x0f, 0x05, // syscall
        ]
    );
    // The user blob follows unmodified.
    assert_eq!(&bytes[0x1011..], blob.as_bytes());
}

#[test]
fn aarch64_image_gets_machine_and_svc_trampoline() {
    let blob = sample_blob(TargetIsa::Arm64);
    let image = build_image(ContainerFormat::Elf64, TargetIsa::Arm64, &blob, 0);
    let bytes = &image.bytes;

    assert_eq!(u16_at(bytes, 18), 183, "EM_AARCH64");
    // bl +12; movz x8, #93; svc #0
    assert_eq!(&bytes[0x1000..0x1004], &0x94000003u32.to_le_bytes());
    assert_eq!(&bytes[0x1004..0x1008], &0xd2800ba8u32.to_le_bytes());
    assert_eq!(&bytes[0x1008..0x100c], &0xd4000001u32.to_le_bytes());
    assert_eq!(&bytes[0x100c..], blob.as_bytes());
}

#[test]
fn entry_offset_shifts_the_entry_address() {
    let blob = sample_blob(TargetIsa::X86_64);
    let image = build_image(ContainerFormat::Elf64, TargetIsa::X86_64, &blob, 0x40);
    assert_eq!(u64_at(&image.bytes, 24), 0x401040);
    assert_eq!(image.entry_vaddr, 0x401040);
    assert_eq!(image.entry_offset, 0x1040);
}

#[test]
fn written_file_is_executable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("e1");
    let blob = sample_blob(TargetIsa::X86_64);
    let image = write_executable(&path, ContainerFormat::Elf64, TargetIsa::X86_64, &blob, 0)
        .expect("write");

    let on_disk = std::fs::read(&path).expect("read back");
    assert_eq!(on_disk, image.bytes);
    assert!(contains_bytes(&on_disk, blob.as_bytes()));

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}
