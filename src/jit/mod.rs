//! In-memory JIT rewrite path
//!
//! Decodes a class, runs the optimizer over hot method bodies, and
//! re-encodes the class to loadable bytes. Cold methods and every piece
//! of class metadata round-trip untouched; loading the result into a
//! running VM is the caller's business.

use std::collections::HashMap;

use crate::analysis;
use crate::classfile::{class_file_to_bytes, parse_class};
use crate::common::{Config, Result};
use crate::opt;

/// Per-method record of what the rewrite did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodRewrite {
    pub name: String,
    pub descriptor: String,
    /// True when the optimizer ran over this method
    pub optimized: bool,
    pub folded: usize,
    pub removed: usize,
}

/// Result of rewriting one class
#[derive(Debug)]
pub struct RewriteOutcome {
    /// Re-encoded class bytes, loadable by a class loader
    pub class_bytes: Vec<u8>,
    /// Rewrite bookkeeping keyed by `name + descriptor`
    pub methods: HashMap<String, MethodRewrite>,
}

/// Rewrite a class: optimize hot methods, pass everything else through
pub fn rewrite_class(bytes: &[u8], config: &Config) -> Result<RewriteOutcome> {
    let mut class = parse_class(bytes)?;
    let summaries = analysis::summarize_class(&class)?;

    let mut methods = HashMap::new();
    for method in &mut class.methods {
        let key = method.key(&class.constant_pool)?;
        let summary = &summaries[&key];
        let mut record = MethodRewrite {
            name: summary.name.clone(),
            descriptor: summary.descriptor.clone(),
            optimized: false,
            folded: 0,
            removed: 0,
        };
        if config.optimize && summary.is_hot() {
            if let Some(code) = method.code_mut() {
                log::debug!("jit: optimizing hot method {}", key);
                let stats = opt::optimize_method(code, &mut class.constant_pool)?;
                record.optimized = true;
                record.folded = stats.folded;
                record.removed = stats.removed;
            }
        }
        methods.insert(key, record);
    }

    let class_bytes = class_file_to_bytes(&class)?;
    Ok(RewriteOutcome { class_bytes, methods })
}
