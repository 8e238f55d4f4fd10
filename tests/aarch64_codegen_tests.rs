use jnc::classfile::opcodes::*;
use jnc::classfile::{ConstantPool, Instruction};
use jnc::codegen::{CodeGenerator, TargetIsa};

mod common;
use common::{iconst, iload, istore};

const PROLOGUE: [u32; 3] = [0xa9bf7bfd, 0x910003fd, 0xd10103ff];
const EPILOGUE: [u32; 3] = [0x910103ff, 0xa8c17bfd, 0xd65f03c0];
const PUSH_X0: u32 = 0xf81f0fe0;
const POP_X0: u32 = 0xf84107e0;
const POP_X1: u32 = 0xf84107e1;
const POP_X2: u32 = 0xf84107e2;

fn generate(instructions: &[Instruction]) -> Vec<u32> {
    let pool = ConstantPool::new();
    words(
        &CodeGenerator::new(TargetIsa::Arm64)
            .generate_method(instructions, &pool)
            .into_bytes(),
    )
}

fn words(code: &[u8]) -> Vec<u32> {
    assert_eq!(code.len() % 4, 0, "AArch64 blob must be word-aligned");
    code.chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn contains_words(haystack: &[u32], needle: &[u32]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[test]
fn return_42_word_sequence() {
    let code = generate(&[Instruction::Push { opcode: BIPUSH, value: 42 }, Instruction::Op(IRETURN)]);
    let mut expected = PROLOGUE.to_vec();
    // movz w0, #42; push
    expected.push(0x52800000 | (42 << 5));
    expected.push(PUSH_X0);
    // pop into w0, tear down
    expected.push(POP_X0);
    expected.extend_from_slice(&EPILOGUE);
    assert_eq!(code, expected);
}

#[test]
fn every_blob_ends_with_ret() {
    let bodies: Vec<Vec<Instruction>> = vec![
        vec![iconst(0), Instruction::Op(IRETURN)],
        vec![Instruction::Op(RETURN)],
        vec![iconst(1)],
        vec![],
    ];
    for body in bodies {
        let code = generate(&body);
        assert_eq!(*code.last().expect("nonempty"), 0xd65f03c0, "body {:?}", body);
    }
}

#[test]
fn wide_constants_use_movz_movk() {
    let code = generate(&[
        Instruction::Push { opcode: SIPUSH, value: 0x1234 },
        Instruction::Op(IRETURN),
    ]);
    // Low half only: a single movz.
    assert!(contains_words(&code, &[0x52800000 | (0x1234 << 5), PUSH_X0]));

    let mut pool = ConstantPool::new();
    let index = pool.add_integer(0x0012_3456).expect("pool");
    let code = words(
        &CodeGenerator::new(TargetIsa::Arm64)
            .generate_method(
                &[Instruction::Cp { opcode: LDC, index }, Instruction::Op(IRETURN)],
                &pool,
            )
            .into_bytes(),
    );
    // movz w0, #0x3456; movk w0, #0x12, lsl #16
    assert!(contains_words(
        &code,
        &[0x52800000 | (0x3456 << 5), 0x72a00000 | (0x12 << 5), PUSH_X0]
    ));
}

#[test]
fn negative_constants_fill_both_halves() {
    let code = generate(&[
        Instruction::Push { opcode: BIPUSH, value: -1 },
        Instruction::Op(IRETURN),
    ]);
    // movz w0, #0xffff; movk w0, #0xffff, lsl #16
    assert!(contains_words(
        &code,
        &[0x52800000 | (0xffff << 5), 0x72a00000 | (0xffff << 5)]
    ));
}

#[test]
fn arithmetic_pops_two_operands() {
    let cases: [(Instruction, u32); 4] = [
        (Instruction::Op(IADD), 0x0b020020),
        (Instruction::Op(ISUB), 0x4b020020),
        (Instruction::Op(IMUL), 0x1b027c20),
        (Instruction::Op(IDIV), 0x1ac20c20),
    ];
    for (op, encoding) in cases {
        let code = generate(&[iconst(4), iconst(2), op.clone(), Instruction::Op(IRETURN)]);
        assert!(
            contains_words(&code, &[POP_X2, POP_X1, encoding, PUSH_X0]),
            "missing encoding 0x{:08x} for {:?}",
            encoding,
            op
        );
    }
}

#[test]
fn locals_use_frame_relative_slots() {
    let code = generate(&[iconst(9), istore(2), iload(2), Instruction::Op(IRETURN)]);
    let imm9 = (-12i32 as u32) & 0x1ff;
    // stur w0, [x29, #-12]
    assert!(contains_words(&code, &[POP_X0, 0xb8000000 | (imm9 << 12) | (29 << 5)]));
    // ldur w0, [x29, #-12]
    assert!(contains_words(&code, &[0xb8400000 | (imm9 << 12) | (29 << 5), PUSH_X0]));
}

#[test]
fn unsupported_opcode_becomes_single_nop() {
    let code = generate(&[Instruction::Op(MONITORENTER), Instruction::Op(RETURN)]);
    let mut expected = PROLOGUE.to_vec();
    expected.push(0xd503201f);
    expected.extend_from_slice(&EPILOGUE);
    assert_eq!(code, expected);
}
