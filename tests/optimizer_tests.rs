use jnc::classfile::opcodes::*;
use jnc::classfile::{ConstantPool, Instruction, LabelId};
use jnc::opt::{eliminate_dead_code, fold_constants};

mod common;
use common::{iconst, interpret};

fn fold(instructions: &mut Vec<Instruction>) -> (usize, ConstantPool) {
    let mut pool = ConstantPool::new();
    let folded = fold_constants(instructions, &mut pool).expect("fold");
    (folded, pool)
}

#[test]
fn folds_simple_addition() {
    let mut instructions = vec![iconst(5), iconst(3), Instruction::Op(IADD), Instruction::Op(IRETURN)];
    let (folded, pool) = fold(&mut instructions);
    assert_eq!(folded, 1);
    assert_eq!(instructions.len(), 2);
    match &instructions[0] {
        Instruction::Cp { opcode: LDC, index } => assert_eq!(pool.integer(*index), Some(8)),
        other => panic!("expected folded ldc, got {:?}", other),
    }
}

#[test]
fn folds_bipush_sipush_and_ldc_forms() {
    let mut pool = ConstantPool::new();
    let big = pool.add_integer(100_000).expect("pool");
    let mut instructions = vec![
        Instruction::Push { opcode: BIPUSH, value: 100 },
        Instruction::Push { opcode: SIPUSH, value: 1000 },
        Instruction::Op(IADD),
        Instruction::Cp { opcode: LDC, index: big },
        Instruction::Op(IADD),
        Instruction::Op(IRETURN),
    ];
    let folded = fold_constants(&mut instructions, &mut pool).expect("fold");
    assert_eq!(folded, 2);
    assert_eq!(instructions.len(), 2);
    assert_eq!(interpret(&instructions, &pool), Some(101_100));
}

#[test]
fn folds_left_nested_chain_to_single_load() {
    // 1 + 2 + 3 + 4: three iadds collapse to one constant load.
    let mut instructions = vec![
        iconst(1),
        iconst(2),
        Instruction::Op(IADD),
        iconst(3),
        Instruction::Op(IADD),
        iconst(4),
        Instruction::Op(IADD),
        Instruction::Op(IRETURN),
    ];
    let (folded, pool) = fold(&mut instructions);
    assert_eq!(folded, 3);
    assert_eq!(instructions.len(), 2);
    assert_eq!(interpret(&instructions, &pool), Some(10));
    let pushes = instructions
        .iter()
        .filter(|insn| matches!(insn, Instruction::Cp { .. } | Instruction::Push { .. } | Instruction::Op(ICONST_M1..=ICONST_5)))
        .count();
    assert_eq!(pushes, 1);
}

#[test]
fn folding_wraps_around_i32() {
    let mut pool = ConstantPool::new();
    let max = pool.add_integer(i32::MAX).expect("pool");
    let mut instructions = vec![
        Instruction::Cp { opcode: LDC, index: max },
        iconst(1),
        Instruction::Op(IADD),
        Instruction::Op(IRETURN),
    ];
    fold_constants(&mut instructions, &mut pool).expect("fold");
    match &instructions[0] {
        Instruction::Cp { index, .. } => assert_eq!(pool.integer(*index), Some(i32::MIN)),
        other => panic!("expected folded ldc, got {:?}", other),
    }
}

#[test]
fn only_iadd_is_folded() {
    let mut instructions = vec![
        iconst(6),
        iconst(2),
        Instruction::Op(IMUL),
        iconst(6),
        iconst(2),
        Instruction::Op(ISUB),
        Instruction::Op(IRETURN),
    ];
    let (folded, _) = fold(&mut instructions);
    assert_eq!(folded, 0);
    assert_eq!(instructions.len(), 7);
}

#[test]
fn fold_preserves_observable_result() {
    let original = vec![
        iconst(2),
        Instruction::Push { opcode: BIPUSH, value: 40 },
        Instruction::Op(IADD),
        iconst(2),
        Instruction::Op(IMUL),
        Instruction::Op(IRETURN),
    ];
    let mut rewritten = original.clone();
    let mut pool = ConstantPool::new();
    fold_constants(&mut rewritten, &mut pool).expect("fold");
    assert_eq!(
        interpret(&original, &pool),
        interpret(&rewritten, &pool),
    );
}

#[test]
fn removes_code_after_return_up_to_label() {
    let mut instructions = vec![
        iconst(1),
        Instruction::Op(IRETURN),
        iconst(2),
        Instruction::Op(POP),
        Instruction::Label(LabelId(0)),
        iconst(3),
        Instruction::Op(IRETURN),
    ];
    let removed = eliminate_dead_code(&mut instructions);
    assert_eq!(removed, 2);
    assert_eq!(
        instructions,
        vec![
            iconst(1),
            Instruction::Op(IRETURN),
            Instruction::Label(LabelId(0)),
            iconst(3),
            Instruction::Op(IRETURN),
        ]
    );
}

#[test]
fn dead_code_removal_keeps_metadata() {
    let mut instructions = vec![
        iconst(1),
        Instruction::Op(IRETURN),
        Instruction::LineNumber(7),
        iconst(2),
        Instruction::Frame,
        Instruction::Label(LabelId(0)),
        Instruction::Op(RETURN),
    ];
    let removed = eliminate_dead_code(&mut instructions);
    assert_eq!(removed, 1);
    assert_eq!(
        instructions,
        vec![
            iconst(1),
            Instruction::Op(IRETURN),
            Instruction::LineNumber(7),
            Instruction::Frame,
            Instruction::Label(LabelId(0)),
            Instruction::Op(RETURN),
        ]
    );
}

#[test]
fn dead_code_runs_to_end_without_label() {
    let mut instructions = vec![
        iconst(1),
        Instruction::Op(IRETURN),
        iconst(2),
        iconst(3),
        Instruction::Op(IADD),
    ];
    let removed = eliminate_dead_code(&mut instructions);
    assert_eq!(removed, 3);
    assert_eq!(instructions, vec![iconst(1), Instruction::Op(IRETURN)]);
}

#[test]
fn no_labels_are_ever_removed() {
    let mut instructions = vec![
        Instruction::Label(LabelId(0)),
        iconst(1),
        Instruction::Op(IRETURN),
        Instruction::Label(LabelId(1)),
        Instruction::Label(LabelId(2)),
        Instruction::Op(RETURN),
    ];
    eliminate_dead_code(&mut instructions);
    let labels = instructions
        .iter()
        .filter(|insn| matches!(insn, Instruction::Label(_)))
        .count();
    assert_eq!(labels, 3);
}
