//! x86-64 emitter
//!
//! System V frame: `rbp` anchors 64 bytes of local slots (16 four-byte
//! locals, indices beyond that are not validated). Operands live on the
//! native stack in 8-byte push/pop slots; arithmetic reads the 32-bit
//! halves. Scratch registers are `rax` and `rbx`; the integer return
//! register is `eax`.

use super::{BinOp, CodeBuffer, InsnEmitter};

pub struct X86_64Emitter;

fn local_disp(index: u16) -> u8 {
    // [rbp - (index+1)*4]; the displacement byte wraps past slot 15,
    // mirroring the unchecked 64-byte reservation
    let offset = (index as i32 + 1) * 4;
    (-offset) as u8
}

impl InsnEmitter for X86_64Emitter {
    fn prologue(&self, buf: &mut CodeBuffer) {
        // push rbp
        buf.emit(&[0x55]);
        // mov rbp, rsp
        buf.emit(&[0x48, 0x89, 0xe5]);
        // sub rsp, 64
        buf.emit(&[0x48, 0x83, 0xec, 0x40]);
    }

    fn epilogue(&self, buf: &mut CodeBuffer) {
        // mov rsp, rbp
        buf.emit(&[0x48, 0x89, 0xec]);
        // pop rbp
        buf.emit(&[0x5d]);
        // ret
        buf.emit(&[0xc3]);
    }

    fn push_const(&self, buf: &mut CodeBuffer, value: i32) {
        // mov eax, imm32
        buf.emit(&[0xb8]);
        buf.emit(&value.to_le_bytes());
        // push rax
        buf.emit(&[0x50]);
    }

    fn load_local(&self, buf: &mut CodeBuffer, index: u16) {
        // mov eax, [rbp - disp]
        buf.emit(&[0x8b, 0x45, local_disp(index)]);
        // push rax
        buf.emit(&[0x50]);
    }

    fn store_local(&self, buf: &mut CodeBuffer, index: u16) {
        // pop rax
        buf.emit(&[0x58]);
        // mov [rbp - disp], eax
        buf.emit(&[0x89, 0x45, local_disp(index)]);
    }

    fn binop(&self, buf: &mut CodeBuffer, op: BinOp) {
        // pop rbx (right operand)
        buf.emit(&[0x5b]);
        // pop rax (left operand)
        buf.emit(&[0x58]);
        match op {
            // add eax, ebx
            BinOp::Add => buf.emit(&[0x01, 0xd8]),
            // sub eax, ebx
            BinOp::Sub => buf.emit(&[0x29, 0xd8]),
            // imul eax, ebx
            BinOp::Mul => buf.emit(&[0x0f, 0xaf, 0xc3]),
            BinOp::Div => {
                // cdq (sign-extend eax into edx:eax)
                buf.emit(&[0x99]);
                // idiv ebx
                buf.emit(&[0xf7, 0xfb]);
            }
        }
        // push rax
        buf.emit(&[0x50]);
    }

    fn ret_int(&self, buf: &mut CodeBuffer) {
        // pop rax (return value into eax)
        buf.emit(&[0x58]);
        self.epilogue(buf);
    }

    fn nop(&self, buf: &mut CodeBuffer) {
        buf.emit(&[0x90]);
    }
}
