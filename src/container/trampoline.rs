//! Process-exit trampolines
//!
//! A Linux executable entered at `_start` has nothing to return to, so
//! the user blob is prepended with a tiny wrapper that calls it and then
//! invokes the `exit` syscall with the returned value as the process
//! exit code. Mach-O images get no wrapper: `LC_MAIN` enters the blob
//! directly and its `ret` unwinds into dyld (inherited limitation).

use crate::codegen::TargetIsa;

/// Build the Linux exit trampoline for an ISA. The wrapper sits at
/// offset 0 and the user blob immediately after it.
pub fn linux_exit(isa: TargetIsa) -> Vec<u8> {
    match isa {
        TargetIsa::X86_64 => {
            let mut code = Vec::with_capacity(17);
            // call +12 (skip the rest of the wrapper, into the user blob)
            code.extend_from_slice(&[0xe8, 0x0c, 0x00, 0x00, 0x00]);
            // mov rdi, rax (return value becomes the exit code)
            code.extend_from_slice(&[0x48, 0x89, 0xc7]);
            // mov rax, 60 (exit)
            code.extend_from_slice(&[0x48, 0xc7, 0xc0, 0x3c, 0x00, 0x00, 0x00]);
            // syscall
            code.extend_from_slice(&[0x0f, 0x05]);
            code
        }
        TargetIsa::Arm64 => {
            let mut code = Vec::with_capacity(12);
            // bl +12 (skip the rest of the wrapper; return value lands in w0)
            code.extend_from_slice(&0x9400_0003u32.to_le_bytes());
            // movz x8, #93 (exit)
            code.extend_from_slice(&0xd280_0ba8u32.to_le_bytes());
            // svc #0
            code.extend_from_slice(&0xd400_0001u32.to_le_bytes());
            code
        }
    }
}
