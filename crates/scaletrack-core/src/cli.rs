use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use scaletrack_shared::{OwnerId, RelatedRef, TaskPriority, TaskStatus};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "scaletrack",
    version,
    about = "Scaletrack: care tasks for reptile enclosures, animals and hardware"
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Config file (default: <config dir>/scaletrack/config.toml)
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding tasks.data
    #[arg(long = "data", global = true)]
    pub data: Option<PathBuf>,

    /// Acting user id
    #[arg(long = "owner", global = true)]
    pub owner: Option<OwnerId>,

    #[arg(
        long = "set",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append,
        global = true
    )]
    pub overrides: Vec<KeyVal>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Schedule a care task
    Add(AddArgs),
    /// Soonest pending tasks (default)
    Upcoming,
    /// Upcoming tasks grouped by due date
    Agenda,
    /// All tasks, optionally by status
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Mark a task completed
    Done { id: String },
    /// Delete a task
    Delete { id: String },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    /// today, tomorrow, friday, +3d, 2024-03-01, ...
    #[arg(long, default_value = "today")]
    pub due: String,

    /// 09:00, 2:30pm, 9am
    #[arg(long)]
    pub time: Option<String>,

    #[arg(long, default_value = "medium")]
    pub priority: TaskPriority,

    #[arg(long)]
    pub description: Option<String>,

    /// KIND:UUID where KIND is enclosure, hardware or animal
    #[arg(long)]
    pub related: Option<RelatedRef>,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
