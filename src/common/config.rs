use crate::codegen::TargetIsa;
use crate::container::ContainerFormat;

/// Compilation options shared by the JIT and native pipelines
#[derive(Debug, Clone)]
pub struct Config {
    /// Run the bytecode optimizer (constant folding + dead-code elimination)
    pub optimize: bool,
    /// Target instruction set; `None` selects the host architecture
    pub isa: Option<TargetIsa>,
    /// Executable container format; `None` selects the host platform's format
    pub format: Option<ContainerFormat>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            optimize: true,
            isa: None,
            format: None,
        }
    }
}

impl Config {
    /// Resolve the target ISA, falling back to the host architecture
    pub fn target_isa(&self) -> TargetIsa {
        self.isa.unwrap_or_else(TargetIsa::host)
    }

    /// Resolve the container format, falling back to the host platform
    pub fn container_format(&self) -> ContainerFormat {
        self.format.unwrap_or_else(ContainerFormat::host)
    }
}
