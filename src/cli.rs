use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::ResourceKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "gerritctl")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declaratively manage Gerrit accounts, groups and projects", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/gerritctl/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Server connection flags; each falls back to the environment, then the config file
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Gerrit base URL
    #[arg(long, env = "GERRIT_URL", global = true)]
    pub url: Option<String>,

    /// Admin username for the authenticated REST API
    #[arg(long, env = "GERRIT_ADMIN_USERNAME", global = true)]
    pub username: Option<String>,

    /// HTTP password for the admin user
    #[arg(long, env = "GERRIT_ADMIN_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Reconcile resources with a declared invocation or manifest
    Apply(ApplyArgs),

    /// Show what apply would change, without writing
    Diff(DiffArgs),

    /// Show the current state of one resource
    Show(ShowArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Invocation or manifest file (JSON or TOML); `-` reads stdin
    #[arg(default_value = "-")]
    pub file: PathBuf,

    /// Plan only: report changes without writing
    #[arg(long)]
    pub check: bool,

    /// Number of resources reconciled in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Stop starting new work once any resource fails
    #[arg(long)]
    pub fail_fast: bool,

    /// Only reconcile matching resources: `kind` or `kind.name`
    #[arg(short, long)]
    pub target: Option<String>,

    /// Print results as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Also exit non-zero when any field was rejected
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Invocation or manifest file (JSON or TOML); `-` reads stdin
    #[arg(default_value = "-")]
    pub file: PathBuf,

    /// Only diff matching resources: `kind` or `kind.name`
    #[arg(short, long)]
    pub target: Option<String>,

    /// Number of resources fetched in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: u16,

    /// Print results as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Resource kind: account, group or project
    pub kind: ResourceKind,

    /// Username, group name or project name
    pub identity: String,

    /// Print the state as JSON on stdout
    #[arg(long)]
    pub json: bool,
}
