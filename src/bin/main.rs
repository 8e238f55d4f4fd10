use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use jnc::{Classpath, Config, ContainerFormat, TargetIsa};

#[derive(Parser)]
#[command(name = "jnc")]
#[command(about = "Ahead-of-time native compiler for JVM class files")]
#[command(version)]
struct Cli {
    /// Classpath roots searched when a class is given by name
    #[arg(short = 'c', long, value_name = "DIR", global = true)]
    classpath: Vec<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a class and print its per-method census
    Analyze {
        /// Class name or path to a .class file
        #[arg(value_name = "CLASS")]
        class: String,
    },

    /// Rewrite a class in memory (optimize hot methods) and save it
    Rewrite {
        /// Class name or path to a .class file
        #[arg(value_name = "CLASS")]
        class: String,

        /// Output .class path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Disable the bytecode optimizer
        #[arg(long)]
        no_opt: bool,
    },

    /// Compile one method to a native executable
    Compile {
        /// Class name or path to a .class file
        #[arg(value_name = "CLASS")]
        class: String,

        /// Method selector (`name` or `name:descriptor`); defaults to the
        /// executable-method policy
        #[arg(short, long, value_name = "METHOD")]
        method: Option<String>,

        /// Output executable path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Target ISA (x86_64, arm64); defaults to the host
        #[arg(long, value_name = "ISA")]
        isa: Option<String>,

        /// Container format (elf, macho); defaults to the host
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,

        /// Disable the bytecode optimizer
        #[arg(long)]
        no_opt: bool,
    },

    /// Compile every method of a class into one native executable
    CompileClass {
        /// Class name or path to a .class file
        #[arg(value_name = "CLASS")]
        class: String,

        /// Output executable path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Target ISA (x86_64, arm64); defaults to the host
        #[arg(long, value_name = "ISA")]
        isa: Option<String>,

        /// Container format (elf, macho); defaults to the host
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,

        /// Disable the bytecode optimizer
        #[arg(long)]
        no_opt: bool,
    },

    /// Compile a literal integer into an executable that exits with it
    Expr {
        /// The integer value
        #[arg(value_name = "VALUE", allow_hyphen_values = true)]
        value: i32,

        /// Output executable path
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Target ISA (x86_64, arm64); defaults to the host
        #[arg(long, value_name = "ISA")]
        isa: Option<String>,

        /// Container format (elf, macho); defaults to the host
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let classpath = build_classpath(&cli.classpath);

    match &cli.command {
        Commands::Analyze { class } => {
            let bytes = load_class(&classpath, class)?;
            let summaries = jnc::analyze(&bytes)?;
            let parsed = jnc::classfile::parse_class(&bytes)?;
            print!("{}", jnc::analysis::format_report(parsed.class_name()?, &summaries));
        }
        Commands::Rewrite { class, output, no_opt } => {
            let bytes = load_class(&classpath, class)?;
            let config = Config { optimize: !no_opt, ..Config::default() };
            let outcome = jnc::jit_rewrite(&bytes, &config)?;
            std::fs::write(output, &outcome.class_bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            let optimized = outcome.methods.values().filter(|m| m.optimized).count();
            println!(
                "Rewrote {} ({} methods, {} optimized) -> {}",
                class,
                outcome.methods.len(),
                optimized,
                output.display()
            );
        }
        Commands::Compile { class, method, output, isa, format, no_opt } => {
            let bytes = load_class(&classpath, class)?;
            let config = build_config(isa.as_deref(), format.as_deref(), !no_opt)?;
            let image = jnc::compile_method_native(&bytes, method.as_deref(), output, &config)?;
            println!(
                "Compiled {} -> {} ({} bytes, entry 0x{:x})",
                class,
                output.display(),
                image.bytes.len(),
                image.entry_vaddr
            );
        }
        Commands::CompileClass { class, output, isa, format, no_opt } => {
            let bytes = load_class(&classpath, class)?;
            let config = build_config(isa.as_deref(), format.as_deref(), !no_opt)?;
            let image = jnc::compile_class_native(&bytes, output, &config)?;
            println!(
                "Compiled {} -> {} ({} bytes)",
                class,
                output.display(),
                image.bytes.len()
            );
        }
        Commands::Expr { value, output, isa, format } => {
            let config = build_config(isa.as_deref(), format.as_deref(), true)?;
            jnc::compile_expression(*value, output, &config)?;
            println!("Compiled expression {} -> {}", value, output.display());
        }
    }

    Ok(())
}

fn build_classpath(roots: &[PathBuf]) -> Classpath {
    if roots.is_empty() {
        Classpath::new(".")
    } else {
        Classpath::with_roots(roots.to_vec())
    }
}

fn build_config(isa: Option<&str>, format: Option<&str>, optimize: bool) -> Result<Config> {
    Ok(Config {
        optimize,
        isa: isa.map(str::parse::<TargetIsa>).transpose()?,
        format: format.map(str::parse::<ContainerFormat>).transpose()?,
    })
}

/// A `CLASS` argument is a file path when it names a readable file,
/// otherwise a dotted class name resolved against the classpath.
fn load_class(classpath: &Classpath, class: &str) -> Result<Vec<u8>> {
    let path = PathBuf::from(class);
    if path.is_file() {
        return std::fs::read(&path).with_context(|| format!("reading {}", path.display()));
    }
    Ok(classpath.load_class(class)?)
}
