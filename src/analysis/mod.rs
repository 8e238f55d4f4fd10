//! Per-method bytecode census
//!
//! Pure classification of a method's instruction stream into the counters
//! the optimizer and the JIT gating consult. Synthetic nodes (labels,
//! line numbers, frames) are not instructions and are never counted.

use std::collections::HashMap;

use crate::classfile::opcodes::*;
use crate::classfile::{ClassFile, ConstantPool, Instruction, MethodInfo};
use crate::common::error::Result;

/// Census of one method's instruction stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSummary {
    pub name: String,
    pub descriptor: String,
    pub access_flags: u16,
    pub instruction_count: usize,
    pub arithmetic_ops: usize,
    pub method_call_count: usize,
    pub field_access_count: usize,
    pub branch_count: usize,
    pub return_count: usize,
}

impl MethodSummary {
    /// Heuristic for methods worth optimizing: enough instructions,
    /// arithmetic, or branching to matter.
    pub fn is_hot(&self) -> bool {
        self.instruction_count > 10 || self.arithmetic_ops > 3 || self.branch_count > 2
    }
}

/// Summarize one method. Counting is stateless, so repeated calls over
/// the same method yield identical summaries.
pub fn summarize_method(method: &MethodInfo, pool: &ConstantPool) -> Result<MethodSummary> {
    let mut summary = MethodSummary {
        name: method.name(pool)?.to_string(),
        descriptor: method.descriptor(pool)?.to_string(),
        access_flags: method.access_flags,
        instruction_count: 0,
        arithmetic_ops: 0,
        method_call_count: 0,
        field_access_count: 0,
        branch_count: 0,
        return_count: 0,
    };
    if let Some(code) = method.code() {
        for instruction in &code.instructions {
            classify(instruction, &mut summary);
        }
    }
    Ok(summary)
}

/// Summarize every method of a class, keyed by `name + descriptor`
pub fn summarize_class(class: &ClassFile) -> Result<HashMap<String, MethodSummary>> {
    let mut summaries = HashMap::new();
    for method in &class.methods {
        let summary = summarize_method(method, &class.constant_pool)?;
        summaries.insert(method.key(&class.constant_pool)?, summary);
    }
    Ok(summaries)
}

fn classify(instruction: &Instruction, summary: &mut MethodSummary) {
    let opcode = match instruction.opcode() {
        Some(opcode) => opcode,
        None => return,
    };
    summary.instruction_count += 1;
    match opcode {
        IADD..=DREM => summary.arithmetic_ops += 1,
        IRETURN..=RETURN => summary.return_count += 1,
        INVOKEVIRTUAL..=INVOKEDYNAMIC => summary.method_call_count += 1,
        GETSTATIC..=PUTFIELD => summary.field_access_count += 1,
        _ if matches!(instruction, Instruction::Branch { .. }) => summary.branch_count += 1,
        _ => {}
    }
}

/// Human-readable census dump for the CLI `analyze` subcommand
pub fn format_report(class_name: &str, summaries: &HashMap<String, MethodSummary>) -> String {
    let mut keys: Vec<&String> = summaries.keys().collect();
    keys.sort();
    let mut report = String::new();
    report.push_str(&format!("Class: {}\n", class_name));
    report.push_str("Methods:\n");
    for key in keys {
        let summary = &summaries[key];
        report.push_str(&format!("  {}{}\n", summary.name, summary.descriptor));
        report.push_str(&format!("    Instructions: {}\n", summary.instruction_count));
        report.push_str(&format!("    Arithmetic ops: {}\n", summary.arithmetic_ops));
        report.push_str(&format!("    Method calls: {}\n", summary.method_call_count));
        report.push_str(&format!("    Branches: {}\n", summary.branch_count));
        report.push_str(&format!("    Field accesses: {}\n", summary.field_access_count));
        report.push_str(&format!("    Returns: {}\n", summary.return_count));
        report.push_str(&format!("    Hot: {}\n", summary.is_hot()));
    }
    report
}
