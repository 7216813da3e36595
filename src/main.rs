// Fri Oct 16 2026 - Alex

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use script_engine::{
    config::EngineConfig,
    scripting::{native_function, ScriptError, ScriptManager, UncaughtException},
};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author = "Alex")]
#[command(version = "1.0.0")]
#[command(about = "Run scripts on the embedded script engine", long_about = None)]
struct Args {
    /// Script files, evaluated in order on one engine.
    files: Vec<PathBuf>,

    /// Evaluate this source after the files.
    #[arg(short, long)]
    eval: Option<String>,

    /// Only check syntax.
    #[arg(long)]
    check: bool,

    /// JSON engine configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    strict_threads: bool,

    /// Abort scripts after this many steps (0 = unlimited).
    #[arg(long)]
    execution_limit: Option<u64>,

    /// Evaluate on a dedicated engine thread.
    #[arg(long)]
    engine_thread: bool,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[arg(long)]
    no_color: bool,
}

fn setup_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.strict_threads {
        config = config.with_strict_thread_checks(true);
    }
    if let Some(limit) = args.execution_limit {
        config = config.with_execution_limit(limit);
    }
    Ok(config)
}

fn print_exception(report: &UncaughtException) {
    eprintln!("{} {}", "[!]".red(), report);
    for frame in &report.backtrace {
        eprintln!("    at {}", frame.dimmed());
    }
}

fn sources(args: &Args) -> Result<Vec<(String, String)>> {
    let mut sources = Vec::new();
    for path in &args.files {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sources.push((source, path.display().to_string()));
    }
    if let Some(source) = &args.eval {
        sources.push((source.clone(), "<eval>".to_string()));
    }
    if sources.is_empty() {
        bail!("Nothing to run: pass script files or --eval");
    }
    Ok(sources)
}

fn check(manager: &ScriptManager, sources: &[(String, String)]) -> bool {
    let mut ok = true;
    for (source, file_name) in sources {
        let result = manager.check_syntax(source, file_name);
        match &result.error_message {
            None => println!("{} {}", "[+]".green(), file_name),
            Some(message) => {
                ok = false;
                eprintln!(
                    "{} {}:{}:{}: {}",
                    "[!]".red(),
                    file_name,
                    result.line_number,
                    result.column_number,
                    message
                );
            }
        }
    }
    ok
}

fn run(manager: &ScriptManager, sources: Vec<(String, String)>, engine_thread: bool) -> Result<bool> {
    if engine_thread {
        let thread = manager.start_engine_thread()?;
        println!("{} Engine thread {:?}", "[*]".blue(), thread);
    }

    for (source, file_name) in sources {
        let outcome = if engine_thread {
            let name = file_name.clone();
            manager
                .call(move |engine| {
                    let value = engine.evaluate(&source, &name);
                    match engine.uncaught_exception_report() {
                        Some(report) => {
                            engine.maybe_emit_uncaught_exception(&name);
                            Err(report)
                        }
                        None => Ok(value.to_string()),
                    }
                })?
                .map_err(ScriptError::Uncaught)
        } else {
            manager.run(&source, &file_name).map(|value| value.to_string())
        };

        match outcome {
            Ok(display) => println!("{} {} => {}", "[+]".green(), file_name, display),
            Err(ScriptError::Uncaught(report)) => {
                print_exception(&report);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }
    setup_logging(&args.log_level);

    let config = load_config(&args)?;
    let sources = sources(&args)?;
    let manager = ScriptManager::new(config)?;
    manager.engine().register_function(
        "now",
        native_function(|_ctx, engine| {
            let millis = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            engine.new_number(millis)
        }),
        0,
    );

    let start_time = Instant::now();
    let ok = if args.check {
        check(&manager, &sources)
    } else {
        run(&manager, sources, args.engine_thread)?
    };
    manager.shutdown();

    println!(
        "{} Finished in {:.2}ms",
        "[*]".blue(),
        start_time.elapsed().as_secs_f64() * 1000.0
    );
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
