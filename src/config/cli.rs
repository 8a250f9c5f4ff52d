use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, builder::BoolishValueParser};
use happylife_types::Collection;
use uuid::Uuid;

use crate::gateway::Bucket;

/// Command-line arguments for the happylife client.
#[derive(Debug, Parser)]
#[command(
    name = "happylife",
    version,
    about = "HappyLifeNepal data client: cached queries, realtime refresh and admin actions"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "HAPPYLIFE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Use the in-process backend instead of the remote one.
    #[arg(long, global = true)]
    pub offline: bool,

    #[arg(long = "backend-url", value_name = "URL", value_hint = ValueHint::Url, global = true)]
    pub backend_url: Option<String>,

    #[arg(long = "anon-key", env = "HAPPYLIFE_ANON_KEY", value_name = "KEY", global = true)]
    pub anon_key: Option<String>,

    /// Postgres URL used for change notifications.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

/// Admin credentials for commands that write.
#[derive(Debug, Args, Default, Clone)]
pub struct Credentials {
    #[arg(long, env = "HAPPYLIFE_ADMIN_EMAIL", value_name = "EMAIL")]
    pub email: Option<String>,

    #[arg(
        long,
        env = "HAPPYLIFE_ADMIN_PASSWORD",
        value_name = "PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Mount a page and log every refresh until interrupted.
    Watch(WatchArgs),
    /// Print the rows of a collection as the public site lists them.
    List(ListArgs),
    /// Print a single record.
    Show(ShowArgs),
    /// Print the admin dashboard counters.
    Stats(AdminArgs),
    /// Submit the public contact form.
    Contact(ContactArgs),
    /// Mark a contact message as read.
    #[command(name = "mark-read")]
    MarkRead(MarkReadArgs),
    /// Delete a record.
    Delete(DeleteArgs),
    /// Upload a file into a storage bucket and print its public URL.
    Upload(UploadArgs),
    /// Realtime utilities.
    Realtime(RealtimeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PageArg {
    Home,
    Donations,
    Events,
    Blogs,
    Dashboard,
    Messages,
}

#[derive(Debug, Args, Clone)]
pub struct WatchArgs {
    #[arg(value_enum)]
    pub page: PageArg,

    /// Search text applied to list pages.
    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct ListArgs {
    #[arg(value_name = "COLLECTION")]
    pub collection: Collection,

    #[arg(long, value_name = "TEXT")]
    pub search: Option<String>,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct ShowArgs {
    #[arg(value_name = "COLLECTION")]
    pub collection: Collection,

    #[arg(value_name = "ID")]
    pub id: Uuid,
}

#[derive(Debug, Args, Clone)]
pub struct AdminArgs {
    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct ContactArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub subject: Option<String>,

    #[arg(long)]
    pub message: String,
}

#[derive(Debug, Args, Clone)]
pub struct MarkReadArgs {
    #[arg(value_name = "ID")]
    pub id: Uuid,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct DeleteArgs {
    #[arg(value_name = "COLLECTION")]
    pub collection: Collection,

    #[arg(value_name = "ID")]
    pub id: Uuid,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct UploadArgs {
    #[arg(value_name = "BUCKET")]
    pub bucket: Bucket,

    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    #[command(flatten)]
    pub credentials: Credentials,
}

#[derive(Debug, Args, Clone)]
pub struct RealtimeArgs {
    #[command(subcommand)]
    pub command: RealtimeCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum RealtimeCommand {
    /// Install the change-notification triggers into the database.
    Install,
}

impl Command {
    /// Credentials attached to the command, if it takes any.
    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            Command::Watch(args) => Some(&args.credentials),
            Command::List(args) => Some(&args.credentials),
            Command::Stats(args) => Some(&args.credentials),
            Command::MarkRead(args) => Some(&args.credentials),
            Command::Delete(args) => Some(&args.credentials),
            Command::Upload(args) => Some(&args.credentials),
            Command::Show(_) | Command::Contact(_) | Command::Realtime(_) => None,
        }
    }
}
