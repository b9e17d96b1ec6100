//! Tabular partitions core - rolling-window partition processing
//!
//! The main entry point for tp-core, handling:
//! - Partition processing runs against a model file
//! - Dry-run plans of what a run would change
//! - Run configuration inspection and validation

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tp_common::{Error, OutputFormat, RunId, SCHEMA_VERSION};
use tp_core::config::{load_run_config, ConfigError, LoadedConfig, ModePreset, RunConfiguration};
use tp_core::events::{LogSink, TracingSink};
use tp_core::exit_codes::ExitCode;
use tp_core::logging::{event_names, get_host_id, init_logging, LogSettings, Stage};
use tp_core::output::{envelope, render_error, render_machine, render_plan, render_run, Status};
use tp_core::plan::build_run_plan;
use tp_core::processor::{run_partition_processing, RunContext};
use tp_core::store::{InMemoryStore, ModelSnapshot, PartitionStore};

/// Tabular partitions core - rolling-window partition management
#[derive(Parser)]
#[command(name = "tp-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the run configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Roll the partition windows of every configured table
    Run(RunArgs),

    /// Show what a run would change without touching the model
    Plan(PlanArgs),

    /// Inspect and validate the run configuration
    Config(ConfigArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Model file holding tables and partitions
    #[arg(long, env = "TP_MODEL")]
    model: PathBuf,

    /// Override the processing flags of the configuration
    #[arg(long)]
    mode: Option<ModePreset>,

    /// Do not write committed changes back to the model file
    #[arg(long)]
    no_save: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Model file holding tables and partitions
    #[arg(long, env = "TP_MODEL")]
    model: PathBuf,

    /// Override the processing flags of the configuration
    #[arg(long)]
    mode: Option<ModePreset>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the resolved configuration)
        path: Option<PathBuf>,
    },

    /// Print the JSON schema of the configuration file
    Schema,
}

fn main() {
    let cli = Cli::parse();

    // Machine output on stdout pairs with JSONL logs on stderr.
    init_logging(&LogSettings::from_flags(
        cli.global.quiet,
        cli.global.verbose,
        cli.global.format.is_machine(),
    ));

    let exit_code = match &cli.command {
        Commands::Run(args) => run_processing(&cli.global, args),
        Commands::Plan(args) => run_plan(&cli.global, args),
        Commands::Config(args) => run_config(&cli.global, args),
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    std::process::exit(exit_code.as_i32());
}

/// Load the configuration and apply a mode preset.
fn load_config(
    global: &GlobalOpts,
    command: &str,
    mode: Option<ModePreset>,
) -> Result<LoadedConfig, ExitCode> {
    let mut loaded = match load_run_config(global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => return Err(output_config_error(global, command, e)),
    };
    if let Some(preset) = mode {
        preset.apply(&mut loaded.config);
    }
    Ok(loaded)
}

fn load_model(global: &GlobalOpts, command: &str, path: &Path) -> Result<ModelSnapshot, ExitCode> {
    ModelSnapshot::from_file(path).map_err(|e| output_error(global, command, &e))
}

fn run_processing(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let loaded = match load_config(global, "run", args.mode) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let model = match load_model(global, "run", &args.model) {
        Ok(model) => model,
        Err(code) => return code,
    };

    let LoadedConfig {
        config,
        location,
        snapshot,
    } = loaded;
    let ctx = RunContext::new(config, get_host_id());
    let source = location
        .path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    TracingSink.log(
        &ctx.log
            .at(Stage::Init)
            .info(
                event_names::CONFIG_LOADED,
                format!("Configuration loaded from {} ({})", source, snapshot.short_id()),
            )
            .field("config_hash", &snapshot.hash),
    );

    let mut store = InMemoryStore::new(model);
    let outcome = run_partition_processing(&mut store, &ctx, &TracingSink);

    // Committed work is kept even when the run stopped early.
    if !args.no_save {
        if let Err(e) = store.committed().save(&args.model) {
            return output_error(global, "run", &e);
        }
    }

    match render_run(global.format, &outcome.summary, outcome.error.as_ref()) {
        Ok(text) => println!("{}", text),
        Err(e) => return output_error(global, "run", &e),
    }

    match &outcome.error {
        Some(err) => ExitCode::for_error(err),
        None if outcome.summary.has_changes() => ExitCode::RunOk,
        None => ExitCode::Clean,
    }
}

fn run_plan(global: &GlobalOpts, args: &PlanArgs) -> ExitCode {
    let loaded = match load_config(global, "plan", args.mode) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let model = match load_model(global, "plan", &args.model) {
        Ok(model) => model,
        Err(code) => return code,
    };

    let config = &loaded.config;
    let mut store = InMemoryStore::new(model);
    if let Err(e) = store.connect(&config.connection) {
        return output_error(global, "plan", &Error::from(e));
    }
    let plan = build_run_plan(&store, config);
    let _ = store.disconnect();
    let plan = match plan {
        Ok(plan) => plan,
        Err(e) => return output_error(global, "plan", &e),
    };

    let run_id = RunId::new();
    match render_plan(global.format, run_id.as_str(), &plan) {
        Ok(text) => println!("{}", text),
        Err(e) => return output_error(global, "plan", &e),
    }

    if plan.has_changes() {
        ExitCode::PlanReady
    } else {
        ExitCode::Clean
    }
}

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => run_config_show(global),
        ConfigCommands::Validate { path } => {
            run_config_validate(global, path.as_deref().or(global.config.as_deref()))
        }
        ConfigCommands::Schema => run_config_schema(global),
    }
}

/// Display the resolved configuration and where it came from.
fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load_config(global, "config show", None) {
        Ok(loaded) => loaded,
        Err(code) => return code,
    };
    let run_id = RunId::new();

    if global.format.is_machine() {
        let payload = serde_json::json!({
            "snapshot": loaded.snapshot,
            "config": loaded.config,
        });
        let value = envelope("config show", run_id.as_str(), Status::Ok, payload);
        return print_machine(global, "config show", &value);
    }

    let summary = &loaded.snapshot.summary;
    println!(
        "Configuration: {} ({})",
        loaded
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        loaded.snapshot.source
    );
    println!("Model: {}/{}", summary.server, summary.database);
    println!(
        "Flags: initial_setup={} incremental_online={} incremental_parallel_tables={}",
        summary.initial_setup, summary.incremental_online, summary.incremental_parallel_tables
    );
    for table in &loaded.config.tables {
        if table.partitioning.is_empty() {
            println!("  {}: whole table", table.name);
        }
        for p in &table.partitioning {
            println!(
                "  {}: {} from {}.{}, window {} ending {}, incremental {}",
                table.name,
                p.granularity,
                p.source_table,
                p.source_column,
                p.partitions_full,
                p.max_date,
                p.partitions_incremental
            );
        }
    }
    ExitCode::Clean
}

fn run_config_validate(global: &GlobalOpts, path: Option<&Path>) -> ExitCode {
    let loaded = match load_run_config(path) {
        Ok(loaded) => loaded,
        Err(e) => return output_config_error(global, "config validate", e),
    };
    let run_id = RunId::new();

    if global.format.is_machine() {
        let payload = serde_json::json!({
            "valid": true,
            "path": loaded.path().map(|p| p.display().to_string()),
            "hash": loaded.snapshot.hash,
            "summary": loaded.snapshot.summary,
        });
        let value = envelope("config validate", run_id.as_str(), Status::Ok, payload);
        return print_machine(global, "config validate", &value);
    }

    println!("[{}] config validate: OK", loaded.snapshot.short_id());
    ExitCode::Clean
}

fn run_config_schema(global: &GlobalOpts) -> ExitCode {
    let schema = schemars::schema_for!(RunConfiguration);
    match serde_json::to_string_pretty(&schema) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Clean
        }
        Err(e) => output_error(global, "config schema", &Error::from(e)),
    }
}

fn print_machine(global: &GlobalOpts, command: &str, value: &serde_json::Value) -> ExitCode {
    match render_machine(global.format, value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::Clean
        }
        Err(e) => output_error(global, command, &e),
    }
}

/// Output a config error in the appropriate format.
fn output_config_error(global: &GlobalOpts, command: &str, error: ConfigError) -> ExitCode {
    output_error(global, command, &Error::from(error))
}

/// Output an error in the appropriate format and pick its exit code.
fn output_error(global: &GlobalOpts, command: &str, error: &Error) -> ExitCode {
    let run_id = RunId::new();
    let rendered = if global.format.is_machine() {
        render_error(global.format, command, run_id.as_str(), error)
    } else {
        tp_common::format_error_human(error, !global.no_color)
    };
    eprintln!("{}", rendered);
    ExitCode::for_error(error)
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "config_schema_version": tp_core::config::CONFIG_SCHEMA_VERSION,
        "tp_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    if global.format.is_machine() {
        if let Ok(text) = render_machine(global.format, &version_info) {
            println!("{}", text);
        }
    } else {
        println!("tp-core {}", env!("CARGO_PKG_VERSION"));
        println!("schema version: {}", SCHEMA_VERSION);
    }
}
