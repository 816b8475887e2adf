use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use objectview_core::config::Config;
use objectview_core::core_id::IdCreator;
use objectview_core::core_view::encode::{encode_diff, FieldMap};
use objectview_core::core_view::{ChangeEvent, ChangeMessage, Document, Dump, ReplicaEngine, TargetMode};
use objectview_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "objectview")]
#[command(author, version, about = "Offline tools for ObjectView replicas and commands", long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Configuration file; OBJECTVIEW_* environment variables apply otherwise
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply a dump and a change log, printing the resulting documents
    Replay {
        /// Dump object: {"seq": n, "<id>": {...}}
        #[arg(long)]
        dump: PathBuf,

        /// Change log: one event or an array of events
        #[arg(long)]
        changes: PathBuf,

        #[arg(long, value_enum, default_value_t = ReplayMode::Owned)]
        mode: ReplayMode,
    },

    /// Encode the commands moving a document from old to new values
    Diff {
        /// Field map in wire form
        #[arg(long)]
        field_map: PathBuf,

        /// Document id
        #[arg(long)]
        id: String,

        /// New values
        #[arg(long)]
        new: PathBuf,

        /// Old values; without them every mapped field is set
        #[arg(long)]
        old: Option<PathBuf>,
    },

    /// Generate object ids
    NewId {
        /// Object type, e.g. UserDataModel::[Custom]Product
        type_name: String,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },

    /// Print the effective configuration
    ShowConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReplayMode {
    Owned,
    Merged,
    /// Track sequence numbers only
    Detached,
}

impl From<ReplayMode> for TargetMode {
    fn from(mode: ReplayMode) -> Self {
        match mode {
            ReplayMode::Owned => TargetMode::Owned,
            ReplayMode::Merged => TargetMode::Merged,
            ReplayMode::Detached => TargetMode::Detached,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &args.log_level {
        log_config.level = level.parse::<LogLevel>().unwrap_or_else(|err| {
            eprintln!("{}, using 'info'", err);
            LogLevel::Info
        });
    }
    if args.json_logs {
        log_config.json_format = true;
    }
    init_logging_with_config(log_config)?;

    debug!("ObjectView CLI started");

    let output = match args.command {
        Command::Replay { dump, changes, mode } => replay(&dump, &changes, mode.into())?,
        Command::Diff { field_map, id, new, old } => diff(&field_map, &id, &new, old.as_deref())?,
        Command::NewId { type_name, count } => new_ids(&type_name, count),
        Command::ShowConfig => serde_json::to_value(&config)?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn read_document(path: &Path) -> Result<Document> {
    match read_json(path)? {
        Value::Object(document) => Ok(document),
        _ => bail!("{} does not hold a JSON object", path.display()),
    }
}

fn replay(dump: &Path, changes: &Path, mode: TargetMode) -> Result<Value> {
    let mut engine = ReplicaEngine::new("replay", mode);
    engine.apply_dump(Some(Dump::from_value(read_json(dump)?)?));

    let message = ChangeMessage::parse(read_json(changes)?)?;
    let mut applied = 0usize;
    engine
        .apply_changes(&message, &mut |_: &ChangeEvent| applied += 1)
        .with_context(|| format!("replaying {}", changes.display()))?;
    info!("Applied {} of {} changes", applied, message.event_count());

    Ok(json!({
        "seq": engine.sequence(),
        "documents": engine.replica().map(|r| r.to_json()).unwrap_or(Value::Null),
    }))
}

fn diff(field_map: &Path, id: &str, new: &Path, old: Option<&Path>) -> Result<Value> {
    let field_map: FieldMap = serde_json::from_value(read_json(field_map)?)
        .with_context(|| format!("decoding field map {}", field_map.display()))?;
    let new_values = read_document(new)?;
    let old_values = old.map(read_document).transpose()?;

    let commands = encode_diff(&field_map, id, &new_values, old_values.as_ref())?;
    info!("{} commands for {}", commands.len(), id);
    Ok(serde_json::to_value(commands)?)
}

fn new_ids(type_name: &str, count: usize) -> Value {
    let ids = IdCreator::new();
    Value::Array((0..count).map(|_| Value::String(ids.create_object(type_name))).collect())
}
