use std::path::{Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Parser, Subcommand};

use arcvm_core::{
    val::Primitive,
    vm::{Image, Vm, VmConfig, listing},
};

static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "arcvm_core=warn,arcvm=warn,arcvm_cli=info";

#[derive(Debug, Parser)]
#[command(name = "arcvm", author, version, about = "Run and inspect arcvm program images", long_about = None)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Execute a program image and print the final accumulator.
    Run {
        /// JSON program image
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
        /// TOML machine configuration
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Operand stack size in slots (overrides --config)
        #[arg(long, value_name = "N")]
        stack_size: Option<usize>,
        /// tracing filter, e.g. `arcvm::vm::stackgc=debug`
        #[arg(long, value_name = "FILTER")]
        trace: Option<String>,
    },
    /// Print a disassembly listing of a program image.
    Disasm {
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
}

/// `--trace` wins over `ARCVM_TRACE`, which wins over `RUST_LOG`.
fn init_tracing(flag: Option<&str>) {
    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = flag
            .map(str::to_string)
            .or_else(|| std::env::var("ARCVM_TRACE").ok())
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|expr| !expr.trim().is_empty());

        let builder = fmt().with_writer(std::io::stderr);
        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn machine_config(config: Option<&Path>, stack_size: Option<usize>) -> anyhow::Result<VmConfig> {
    let mut cfg = match config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::default(),
    };
    if let Some(n) = stack_size {
        cfg.stack_size = n;
    }
    Ok(cfg)
}

fn run_image(path: &Path, cfg: VmConfig) -> anyhow::Result<String> {
    let image = Image::load(path)?;
    let mut vm = Vm::with_config(cfg)?;
    vm.bind_primitive(Primitive::call_cc());
    vm.load_program(&image.to_program());
    vm.run().with_context(|| format!("running {}", path.display()))?;

    let stats = vm.stats();
    tracing::info!(
        target: "arcvm_cli",
        instructions = stats.instructions,
        reclaims = stats.stack_reclaims,
        "program halted"
    );
    Ok(vm.acc().to_string())
}

fn disasm_image(path: &Path) -> anyhow::Result<String> {
    let image = Image::load(path)?;
    listing(&image.code).with_context(|| format!("disassembling {}", path.display()))
}

fn execute(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            image,
            config,
            stack_size,
            trace,
        } => {
            init_tracing(trace.as_deref());
            let cfg = machine_config(config.as_deref(), stack_size)?;
            println!("{}", run_image(&image, cfg)?);
        }
        Commands::Disasm { image } => {
            init_tracing(None);
            print!("{}", disasm_image(&image)?);
        }
    }
    Ok(())
}

fn main() {
    let CliArgs { command } = CliArgs::parse();
    if let Err(err) = execute(command) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
