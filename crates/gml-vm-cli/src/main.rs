//! Runs a GameMaker code listing (or a dumped program) from the command line.

use std::{fs, path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use gml_vm::{assemble, Frame, Program, StdPrint, Vm, VmConfig, World};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "gml-vm")]
#[command(about = "Run GameMaker bytecode from an assembly listing or a dumped program")]
struct Cli {
    /// Listing to assemble, or a `.bin` program written by `--dump`
    path: PathBuf,

    /// Code entry to run after global init
    #[arg(long, default_value = "gml_Script_main")]
    entry: String,

    /// Maximum nesting of code entry activations
    #[arg(long)]
    max_call_depth: Option<usize>,

    /// Copy arrays before an indexed store writes into them
    #[arg(long)]
    copy_on_write: bool,

    /// Write the assembled program to this file and exit
    #[arg(long)]
    dump: Option<PathBuf>,

    /// Spawn one instance of this object before running (repeatable)
    #[arg(long = "object")]
    objects: Vec<String>,
}

fn init_logging() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_program(path: &PathBuf) -> Result<Program, String> {
    let is_binary = path.extension().is_some_and(|ext| ext == "bin");
    if is_binary {
        let bytes = fs::read(path).map_err(|err| format!("error reading {}: {err}", path.display()))?;
        Program::load(&bytes).map_err(|err| err.to_string())
    } else {
        let source = fs::read_to_string(path).map_err(|err| format!("error reading {}: {err}", path.display()))?;
        assemble(&source).map_err(|err| format!("{}: {err}", path.display()))
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let program = match load_program(&cli.path) {
        Ok(program) => program,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if let Some(out) = &cli.dump {
        let written = program
            .dump()
            .map_err(|err| err.to_string())
            .and_then(|bytes| fs::write(out, bytes).map_err(|err| err.to_string()));
        return match written {
            Ok(()) => {
                info!(path = %out.display(), "program written");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!("failed to write {}: {err}", out.display());
                ExitCode::FAILURE
            }
        };
    }

    let mut config = VmConfig {
        array_copy_on_write: cli.copy_on_write,
        ..VmConfig::default()
    };
    if let Some(depth) = cli.max_call_depth {
        config.max_call_depth = depth;
    }
    let mut world = World::new(config);
    if let Err(err) = program.install(&mut world) {
        error!("{err}");
        return ExitCode::FAILURE;
    }
    for name in &cli.objects {
        let Some(object_index) = world.object_index(name) else {
            error!("object {name} is not declared in {}", cli.path.display());
            return ExitCode::FAILURE;
        };
        world.create_instance(object_index);
    }

    let mut print = StdPrint;
    let mut vm = Vm::new(&mut world, &mut print);
    let mut root = Frame::new();
    let start = Instant::now();
    let result = vm
        .run_global_init(&mut root, &program.global_init)
        .and_then(|()| vm.run(&cli.entry, Some(&mut root)));
    let elapsed = start.elapsed();

    match result {
        Ok(value) => {
            info!(?elapsed, "finished");
            println!("{value}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            error!(?elapsed, severity = %err.severity(), kind = %err.kind(), "run failed");
            ExitCode::FAILURE
        }
    }
}
