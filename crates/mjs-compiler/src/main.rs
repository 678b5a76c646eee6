//! `mjsc` — ECMAScript-to-bytecode compiler CLI.
//!
//! Command-line front end for the `mjsc` library: parse a `.js` source
//! file and dump the resulting [`FunctionTemplate`], or just validate
//! that it compiles.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use mjsc::{CompileError, CompilerConfig, FunctionTemplate};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;

#[derive(ClapParser)]
#[command(name = "mjsc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "ECMAScript-to-bytecode compiler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    /// Human-readable summary (register count, instruction count, ...).
    Summary,
    /// The full `FunctionTemplate`, serialized as JSON.
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to a function template.
    Compile {
        /// Input ECMAScript source file.
        input: PathBuf,

        /// Optional TOML config overriding compiler defaults.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Compile as a direct `eval` body rather than a program.
        #[arg(long)]
        eval: bool,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    /// Parse a source file and report success/failure without emitting output.
    Check {
        /// Input ECMAScript source file(s).
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OutputFormat::Summary => "summary",
            OutputFormat::Json => "json",
        };
        write!(f, "{s}")
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("mjsc=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile {
            input,
            config,
            eval,
            format,
        } => run_compile(&input, config.as_deref(), eval, format),
        Commands::Check { paths } => run_check(&paths),
        Commands::Completions { shell } => run_completions(shell),
    }
}

fn run_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mjsc", &mut io::stdout());
}

fn load_config(config_path: Option<&Path>) -> CompilerConfig {
    match config_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => match CompilerConfig::from_toml(&text) {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Error parsing config: {e}");
                    process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("Error reading config {}: {e}", path.display());
                process::exit(1);
            }
        },
        None => CompilerConfig::new(),
    }
}

fn run_compile(input: &Path, config_path: Option<&Path>, eval: bool, format: OutputFormat) {
    let source = match fs::read_to_string(input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {e}", input.display());
            process::exit(1);
        }
    };
    let config = load_config(config_path);
    info!(path = %input.display(), "compiling");
    let result = if eval {
        mjsc::compile_eval(&source, config)
    } else {
        mjsc::compile_program(&source, config)
    };
    match result {
        Ok(template) => print_template(&template, format),
        Err(e) => report_error(input, &e),
    }
}

fn run_check(paths: &[PathBuf]) {
    let mut failed = false;
    for path in paths {
        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading {}: {e}", path.display());
                failed = true;
                continue;
            }
        };
        match mjsc::compile_program(&source, CompilerConfig::new()) {
            Ok(_) => println!("{}: ok", path.display()),
            Err(e) => {
                report_error(path, &e);
                failed = true;
            }
        }
    }
    if failed {
        process::exit(1);
    }
}

fn print_template(template: &FunctionTemplate, format: OutputFormat) {
    match format {
        OutputFormat::Summary => {
            println!(
                "{} instructions, {} registers, {} constants, {} nested functions",
                template.bytecode.len(),
                template.nregs,
                template.constants.len(),
                template.child_templates.len(),
            );
        }
        OutputFormat::Json => match serde_json::to_string_pretty(template) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing template: {e}");
                process::exit(1);
            }
        },
    }
}

fn report_error(path: &Path, e: &CompileError) {
    eprintln!("{}: {e}", path.display());
    process::exit(1);
}
