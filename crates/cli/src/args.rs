use clap::{Args as ClapArgs, CommandFactory, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about = "cccc collaboration CLI", long_about = None, bin_name = "cccc")]
pub struct Cli {
  /// Print raw JSON results instead of the human summary
  #[arg(long, global = true)]
  pub json: bool,
  #[command(subcommand)]
  pub command: Option<Commands>,
}

/// Which group and identity a group-scoped command acts for.
#[derive(Debug, Clone, ClapArgs)]
pub struct Scope {
  /// Group id (defaults to the group attached to the current directory)
  #[arg(long, short = 'g', env = "CCCC_GROUP_ID")]
  pub group: Option<String>,
  /// Caller identity: `user` or an actor id
  #[arg(long, env = "CCCC_ACTOR_ID", default_value = "user")]
  pub by: String,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  /// Daemon related commands
  Daemon(DaemonArgs),
  /// Attach a directory as a group scope
  Attach(AttachArgs),
  /// Manage actors
  Actor(ActorArgs),
  /// Send a message
  Send(SendArgs),
  /// Reply to a message
  Reply(ReplyArgs),
  /// List unread inbox items
  Inbox(InboxArgs),
  /// Mark inbox items read up to an event id
  Read(ReadArgs),
  /// Acknowledge an attention message
  Ack(AckArgs),
  /// Show the last ledger events
  Tail(TailArgs),
  /// Show or set the group state
  State(StateArgs),
}

#[derive(Debug, ClapArgs)]
pub struct DaemonArgs {
  #[command(subcommand)]
  pub command: DaemonSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum DaemonSubcommand {
  /// Show daemon status
  Status,
  /// Start the daemon in the background
  Start,
  /// Stop the daemon
  Stop,
  /// Run the daemon (foreground)
  Run,
}

#[derive(Debug, ClapArgs)]
pub struct AttachArgs {
  /// Directory to attach (defaults to the current directory)
  pub path: Option<String>,
  /// Group title (defaults to the directory name)
  #[arg(long)]
  pub title: Option<String>,
}

#[derive(Debug, ClapArgs)]
pub struct ActorArgs {
  #[command(flatten)]
  pub scope: Scope,
  #[command(subcommand)]
  pub command: ActorSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ActorSubcommand {
  /// Register a new actor
  Add(ActorAddArgs),
  /// Start an actor
  Start { actor_id: String },
  /// Stop an actor
  Stop { actor_id: String },
  /// Restart an actor
  Restart { actor_id: String },
  /// Remove a stopped actor
  Remove { actor_id: String },
  /// List actors
  List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunnerArg {
  Pty,
  Headless,
}

impl RunnerArg {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunnerArg::Pty => "pty",
      RunnerArg::Headless => "headless",
    }
  }
}

#[derive(Debug, ClapArgs)]
pub struct ActorAddArgs {
  pub actor_id: String,
  /// Runtime name from config (claude, codex, shell, ...)
  #[arg(long, default_value = "shell")]
  pub runtime: String,
  #[arg(long, value_enum, default_value = "pty")]
  pub runner: RunnerArg,
  /// Working directory (defaults to the group scope)
  #[arg(long)]
  pub cwd: Option<String>,
  /// Launch command overriding the runtime's (everything after `--`)
  #[arg(last = true)]
  pub command: Vec<String>,
}

#[derive(Debug, ClapArgs)]
pub struct SendArgs {
  #[command(flatten)]
  pub scope: Scope,
  /// Message text
  pub text: String,
  /// Recipient token (repeatable): actor id, @all, @peers, @foreman, user
  #[arg(long = "to")]
  pub to: Vec<String>,
  /// Require an acknowledgement from every recipient
  #[arg(long)]
  pub attention: bool,
}

#[derive(Debug, ClapArgs)]
pub struct ReplyArgs {
  #[command(flatten)]
  pub scope: Scope,
  /// Event id being replied to
  pub reply_to: u64,
  pub text: String,
  /// Recipient token (repeatable); defaults to every actor
  #[arg(long = "to")]
  pub to: Vec<String>,
  #[arg(long)]
  pub attention: bool,
}

#[derive(Debug, ClapArgs)]
pub struct InboxArgs {
  #[command(flatten)]
  pub scope: Scope,
  #[arg(long)]
  pub limit: Option<usize>,
}

#[derive(Debug, ClapArgs)]
pub struct ReadArgs {
  #[command(flatten)]
  pub scope: Scope,
  /// Event id to mark read (omit with --all)
  pub event_id: Option<u64>,
  /// Mark everything read
  #[arg(long, conflicts_with = "event_id")]
  pub all: bool,
}

#[derive(Debug, ClapArgs)]
pub struct AckArgs {
  #[command(flatten)]
  pub scope: Scope,
  pub event_id: u64,
}

#[derive(Debug, ClapArgs)]
pub struct TailArgs {
  #[command(flatten)]
  pub scope: Scope,
  #[arg(short = 'n', default_value_t = 20)]
  pub n: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
  Active,
  Idle,
  Paused,
}

impl StateArg {
  pub fn as_str(&self) -> &'static str {
    match self {
      StateArg::Active => "active",
      StateArg::Idle => "idle",
      StateArg::Paused => "paused",
    }
  }
}

#[derive(Debug, ClapArgs)]
pub struct StateArgs {
  #[command(flatten)]
  pub scope: Scope,
  /// New state; omit to show the current one
  #[arg(value_enum)]
  pub state: Option<StateArg>,
}

impl Cli {
  pub fn print_help_and_exit() {
    let mut cmd = Cli::command();
    cmd.print_help().expect("print help");
    println!();
  }
}
