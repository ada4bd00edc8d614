mod test_runner;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;

use blockscript::Config;
use blockscript::block::BlockKind;
use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing::{debug, info_span};
use tracing_subscriber::EnvFilter;

use runtime::{DiagnosticError, ExecutionContext, Globals, LogLevel, Settings};

const SUBCOMMANDS: &[&str] = &["run", "check", "fmt", "test", "help"];

#[derive(Parser)]
#[command(name = "bscript", version, about = "Block script runner")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Show debug events (same as RUST_LOG=debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a script once per input
    Run(RunArgs),

    /// Parse a script and report errors without running it
    Check(CheckArgs),

    /// Print a script in canonical form
    Fmt(FmtArgs),

    /// Run .test.bs test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Script file to execute
    file: String,

    /// Task input, available to the script as <INPUT>
    #[arg(short, long, default_value = "")]
    input: String,

    /// File with one task input per line; tasks run concurrently and share Global variables
    #[arg(long, conflicts_with = "input")]
    inputs_file: Option<PathBuf>,

    /// TOML settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Seed the random source of each task (task i gets seed + i)
    #[arg(long)]
    seed: Option<u64>,

    /// Dump parsed blocks
    #[arg(long)]
    ast: bool,

    /// List the blocks of the script
    #[arg(long)]
    list_blocks: bool,

    /// Only print captured variables
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Script file to check
    file: String,
}

#[derive(clap::Args)]
struct FmtArgs {
    /// Script file to format
    file: String,

    /// Lay out dictionaries on indented continuation lines
    #[arg(long)]
    indent: bool,

    /// Rewrite the file in place instead of printing
    #[arg(short, long)]
    write: bool,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.bs file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    // `bscript file.bs` runs like `bscript run file.bs`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(pos) = args.iter().skip(1).position(|a| !a.starts_with('-')) {
        if !SUBCOMMANDS.contains(&args[pos + 1].as_str()) {
            args.insert(pos + 1, "run".to_string());
        }
    }

    let cli = Cli::parse_from(&args);
    init_tracing(cli.verbose);

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Run(run_args) => do_run(run_args, color_choice),
        Command::Check(check_args) => {
            let (config, _files) = load(&check_args.file, color_choice);
            eprintln!("ok: {} parsed successfully ({} blocks)", check_args.file, config.statements.len());
        }
        Command::Fmt(fmt_args) => do_fmt(fmt_args, color_choice),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

/// Read and parse a script, reporting parse errors and exiting on failure.
fn load(file: &str, color_choice: ColorChoice) -> (Config, SimpleFiles<String, String>) {
    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", file, e);
            process::exit(1);
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(file.to_string(), source.clone());

    match blockscript::Parser::new(source, file_id).parse() {
        Ok(config) => (config, files),
        Err(errors) => {
            let writer = StandardStream::stderr(color_choice);
            let config = term::Config::default();
            for error in &errors {
                let diagnostic = error.to_diagnostic();
                let _ = term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
            }
            process::exit(1);
        }
    }
}

fn load_settings(path: Option<&Path>, script: &Path) -> Settings {
    let mut base_dir_set = false;
    let mut settings = match path {
        None => Settings::default(),
        Some(path) => {
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("error: cannot read settings '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            let parsed = text
                .parse::<toml::Table>()
                .map_err(|e| e.to_string())
                .and_then(|table| {
                    base_dir_set = table.contains_key("base_dir");
                    toml::Value::Table(table)
                        .try_into::<Settings>()
                        .map_err(|e| e.to_string())
                });
            match parsed {
                Ok(settings) => settings,
                Err(e) => {
                    eprintln!("error: invalid settings '{}': {}", path.display(), e);
                    process::exit(1);
                }
            }
        }
    };

    if !base_dir_set {
        settings.base_dir = script
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
    }
    settings
}

fn do_run(args: RunArgs, color_choice: ColorChoice) {
    let (config, files) = load(&args.file, color_choice);

    if args.ast {
        println!("{:#?}", config);
        return;
    }

    if args.list_blocks {
        for (index, block) in config.blocks().enumerate() {
            let what = match &block.kind {
                BlockKind::Function(body) => format!("FUNCTION {}", body.function.kind()),
                BlockKind::Utility(body) => format!("UTILITY {}", body.op.group()),
            };
            let disabled = if block.disabled { " (disabled)" } else { "" };
            println!("{:>3}  {:<20} {}{}", index, block.label, what, disabled);
        }
        return;
    }

    let settings = load_settings(args.settings.as_deref(), Path::new(&args.file));
    let inputs = match &args.inputs_file {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(text) => text.lines().map(str::to_string).collect(),
            Err(e) => {
                eprintln!("error: cannot read inputs '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None => vec![args.input.clone()],
    };

    let globals = Arc::new(Globals::new());
    let results = run_tasks(&config, &inputs, &globals, &settings, args.seed);

    let writer = StandardStream::stderr(color_choice);
    let term_config = term::Config::default();
    let mut failed = false;

    for (index, (input, (ctx, result))) in inputs.iter().zip(results).enumerate() {
        if inputs.len() > 1 || !args.quiet {
            println!("task {} [{}]", index + 1, input);
        }
        if !args.quiet {
            for entry in ctx.log.entries() {
                let level = match entry.level {
                    LogLevel::Info => "info",
                    LogLevel::Warn => "warn",
                    LogLevel::Error => "error",
                };
                println!("  {:<5} {}", level, entry.message);
            }
        }
        for capture in ctx.captures() {
            println!("  {}", capture);
        }
        if let Err(error) = result {
            failed = true;
            emit_diagnostic_error(&writer, &term_config, &files, &error);
        }
    }

    if failed {
        process::exit(1);
    }
}

/// One task per input, all sharing `globals`, run concurrently.
fn run_tasks(
    config: &Config,
    inputs: &[String],
    globals: &Arc<Globals>,
    settings: &Settings,
    seed: Option<u64>,
) -> Vec<(ExecutionContext, Result<(), DiagnosticError>)> {
    thread::scope(|scope| {
        let handles: Vec<_> = inputs
            .iter()
            .enumerate()
            .map(|(index, input)| {
                scope.spawn(move || {
                    let _span = info_span!("task", index).entered();
                    let mut ctx =
                        ExecutionContext::new(Arc::clone(globals), settings.clone()).with_input(input.clone());
                    if let Some(seed) = seed {
                        ctx = ctx.with_seed(seed.wrapping_add(index as u64));
                    }
                    let result = runtime::execute_config(config, &mut ctx);
                    debug!(ok = result.is_ok(), "task finished");
                    (ctx, result)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(outcome) => outcome,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

fn do_fmt(args: FmtArgs, color_choice: ColorChoice) {
    let (config, _files) = load(&args.file, color_choice);
    let formatted = config.to_script(args.indent);

    if args.write {
        if let Err(e) = std::fs::write(&args.file, &formatted) {
            eprintln!("error: cannot write '{}': {}", args.file, e);
            process::exit(1);
        }
    } else {
        print!("{}", formatted);
    }
}

fn emit_diagnostic_error(
    writer: &StandardStream,
    config: &term::Config,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    if let Some(span) = &error.span {
        let diagnostic = Diagnostic::error()
            .with_message(error.to_string())
            .with_labels(vec![Label::primary(error.source_id, span.clone())]);
        let _ = term::emit_to_write_style(&mut writer.lock(), config, files, &diagnostic);
    } else {
        eprintln!("runtime error: {}", error);
    }
}
