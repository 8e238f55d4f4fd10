//! Classpath resolution for compiled class files
//!
//! Maps dotted class names (`com.example.Calculator`) onto `.class` files
//! under a set of root directories. Lookup by fully qualified name is a
//! direct path probe; lookup by simple name scans the roots.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::common::error::{Error, Result};

/// Ordered set of directories searched for `.class` files
#[derive(Debug, Clone)]
pub struct Classpath {
    roots: Vec<PathBuf>,
}

impl Classpath {
    /// Create a classpath with a single root directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { roots: vec![root.into()] }
    }

    /// Create a classpath from a list of root directories
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// Append another root directory, searched after the existing ones
    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Convert a dotted class name to its slashed internal form
    pub fn internal_name(class_name: &str) -> String {
        class_name.replace('.', "/")
    }

    /// Locate the `.class` file for a fully qualified dotted name
    pub fn find_class_file(&self, class_name: &str) -> Option<PathBuf> {
        let relative = format!("{}.class", Self::internal_name(class_name));
        for root in &self.roots {
            let candidate = root.join(&relative);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }

    /// Find the fully qualified dotted name for a bare class name by
    /// scanning the roots. The first match in root order wins.
    pub fn find_class_by_simple_name(&self, simple_name: &str) -> Option<String> {
        let file_name = format!("{}.class", simple_name);
        for root in &self.roots {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if entry.file_type().is_file()
                    && entry.file_name().to_string_lossy() == file_name.as_str()
                {
                    if let Some(qualified) = Self::qualified_name(root, entry.path()) {
                        return Some(qualified);
                    }
                }
            }
        }
        None
    }

    /// Read the class-file bytes for a dotted name. Falls back to a
    /// simple-name scan when the direct probe misses.
    pub fn load_class(&self, class_name: &str) -> Result<Vec<u8>> {
        let path = self
            .find_class_file(class_name)
            .or_else(|| {
                if class_name.contains('.') {
                    None
                } else {
                    self.find_class_by_simple_name(class_name)
                        .and_then(|qualified| self.find_class_file(&qualified))
                }
            })
            .ok_or_else(|| Error::class_not_found(class_name))?;
        log::debug!("classpath: resolved {} -> {}", class_name, path.display());
        Ok(std::fs::read(path)?)
    }

    fn qualified_name(root: &Path, class_path: &Path) -> Option<String> {
        let relative = class_path.strip_prefix(root).ok()?;
        let stem = relative.with_extension("");
        let mut parts = Vec::new();
        for component in stem.components() {
            parts.push(component.as_os_str().to_str()?.to_string());
        }
        Some(parts.join("."))
    }
}
