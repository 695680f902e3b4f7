use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use cpk_ledger::Role;
use cpk_types::RepoRef;

#[derive(Parser)]
#[command(
    name = "cpk",
    about = "chainpack: sync git history through a ledger and a content-addressed store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding ledger.json, blobs/ and an optional cpk.toml
    #[arg(long, global = true, default_value = ".cpk")]
    pub state: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Register a repository; pass a public key to make it private
    Register(RegisterArgs),
    /// Grant a role on a repository
    Add(AddArgs),
    /// Revoke a role on a repository
    Remove(RemoveArgs),
    /// Push the checked-out head of a local git repository
    Push(PushArgs),
    /// Create a new local repository from a remote ref
    Clone(CloneArgs),
    /// Bring a local repository up to a remote ref
    Pull(PullArgs),
    /// Print the recorded head of a remote ref
    Head(HeadArgs),
    /// Write a new PEM keypair
    Keygen(KeygenArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RoleArg {
    Owner,
    Writer,
    Reader,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Owner => Role::Owner,
            RoleArg::Writer => Role::Writer,
            RoleArg::Reader => Role::Reader,
        }
    }
}

#[derive(Args)]
pub struct RegisterArgs {
    pub repo: String,
    #[arg(long)]
    pub public_key: Option<PathBuf>,
    /// Acting principal
    #[arg(long)]
    pub from: String,
}

#[derive(Args)]
pub struct AddArgs {
    pub role: RoleArg,
    pub repo: String,
    pub principal: String,
    /// Caller's private key (private repos)
    #[arg(long)]
    pub private_key: Option<PathBuf>,
    /// New member's public key (private repos)
    #[arg(long)]
    pub public_key: Option<PathBuf>,
    #[arg(long)]
    pub from: String,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub role: RoleArg,
    pub repo: String,
    pub principal: String,
    #[arg(long)]
    pub from: String,
}

#[derive(Args)]
pub struct PushArgs {
    pub path: PathBuf,
    /// repo:ref
    pub target: RepoRef,
    #[arg(long)]
    pub private_key: Option<PathBuf>,
    #[arg(long)]
    pub from: String,
}

#[derive(Args)]
pub struct CloneArgs {
    /// repo:ref
    pub source: RepoRef,
    pub path: PathBuf,
    #[arg(long)]
    pub private_key: Option<PathBuf>,
    #[arg(long)]
    pub from: Option<String>,
}

#[derive(Args)]
pub struct PullArgs {
    /// repo:ref
    pub source: RepoRef,
    pub path: PathBuf,
    #[arg(long)]
    pub private_key: Option<PathBuf>,
    #[arg(long)]
    pub from: Option<String>,
}

#[derive(Args)]
pub struct HeadArgs {
    /// repo:ref
    pub target: RepoRef,
}

#[derive(Args)]
pub struct KeygenArgs {
    /// Writes <prefix>.pem and <prefix>.pub.pem
    pub prefix: PathBuf,
}
