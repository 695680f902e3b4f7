use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use cpk_crypto::{PrivateKey, PublicKey};
use cpk_git::GitRepository;
use cpk_ledger::{FileLedger, Role};
use cpk_store::FsObjectStore;
use cpk_sync::{PullResult, SyncConfig, SyncEngine, SyncStatus};
use cpk_types::{Principal, RepoName};
use tracing::debug;

use crate::cli::*;

type Engine = SyncEngine<FileLedger, FsObjectStore>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let state = cli.state;
    match cli.command {
        Command::Register(args) => cmd_register(&state, args),
        Command::Add(args) => cmd_add(&state, args),
        Command::Remove(args) => cmd_remove(&state, args),
        Command::Push(args) => cmd_push(&state, args),
        Command::Clone(args) => cmd_clone(&state, args),
        Command::Pull(args) => cmd_pull(&state, args),
        Command::Head(args) => cmd_head(&state, args),
        Command::Keygen(args) => cmd_keygen(args),
    }
}

fn open_engine(state: &Path) -> anyhow::Result<Engine> {
    fs::create_dir_all(state)
        .with_context(|| format!("creating state directory {}", state.display()))?;
    let config_path = state.join("cpk.toml");
    let config = if config_path.exists() {
        SyncConfig::load(&config_path)?
    } else {
        SyncConfig::default()
    };
    let ledger = FileLedger::open(state.join("ledger.json"))?;
    let store = FsObjectStore::open(state.join("blobs"))?;
    debug!(state = %state.display(), "opened state");
    Ok(SyncEngine::with_config(ledger, store, config))
}

fn read_private_key(path: Option<&PathBuf>) -> anyhow::Result<Option<PrivateKey>> {
    path.map(|p| {
        let buf = fs::read(p).with_context(|| format!("reading private key {}", p.display()))?;
        PrivateKey::from_buffer(&buf)
            .with_context(|| format!("parsing private key {}", p.display()))
    })
    .transpose()
}

fn read_public_key(path: Option<&PathBuf>) -> anyhow::Result<Option<PublicKey>> {
    path.map(|p| {
        let buf = fs::read(p).with_context(|| format!("reading public key {}", p.display()))?;
        PublicKey::from_buffer(&buf).with_context(|| format!("parsing public key {}", p.display()))
    })
    .transpose()
}

fn cmd_register(state: &Path, args: RegisterArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    let public_key = read_public_key(args.public_key.as_ref())?;
    let name = engine.register(&Principal::new(args.from), &args.repo, public_key.as_ref())?;
    let kind = if public_key.is_some() { "private" } else { "public" };
    println!("{} Registered {} repo {}", "✓".green().bold(), kind, name.to_string().bold());
    Ok(())
}

fn cmd_add(state: &Path, args: AddArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    let repo = RepoName::new(args.repo)?;
    let role = Role::from(args.role);
    let private_key = read_private_key(args.private_key.as_ref())?;
    let public_key = read_public_key(args.public_key.as_ref())?;
    engine.add_member(
        &Principal::new(args.from),
        &repo,
        role,
        &Principal::new(args.principal.clone()),
        private_key.as_ref(),
        public_key.as_ref(),
    )?;
    println!(
        "{} Added {} as {} of {}",
        "✓".green().bold(),
        args.principal.bold(),
        role.as_str().cyan(),
        repo.to_string().bold()
    );
    Ok(())
}

fn cmd_remove(state: &Path, args: RemoveArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    let repo = RepoName::new(args.repo)?;
    let role = Role::from(args.role);
    engine.remove_member(
        &Principal::new(args.from),
        &repo,
        role,
        &Principal::new(args.principal.clone()),
    )?;
    println!(
        "{} Removed {} as {} of {}",
        "✓".green().bold(),
        args.principal.bold(),
        role.as_str().cyan(),
        repo.to_string().bold()
    );
    Ok(())
}

fn cmd_push(state: &Path, args: PushArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    let private_key = read_private_key(args.private_key.as_ref())?;
    let mut local = GitRepository::open(&args.path)?;
    let result = engine.push(
        &Principal::new(args.from),
        &mut local,
        &args.target,
        private_key.as_ref(),
    )?;
    match result.status {
        SyncStatus::UpToDate => println!("Everything up-to-date"),
        SyncStatus::Updated => {
            let from = result
                .previous
                .as_ref()
                .map(|p| p.short_hex())
                .unwrap_or_else(|| "(new)".into());
            println!(
                "{} Pushed {}..{} to {} ({} objects, {} bytes{})",
                "✓".green().bold(),
                from.dimmed(),
                result.head.short_hex().yellow(),
                args.target.to_string().bold(),
                result.objects_sent,
                result.bytes_transferred,
                if result.encrypted { ", encrypted" } else { "" }
            );
        }
    }
    Ok(())
}

fn cmd_clone(state: &Path, args: CloneArgs) -> anyhow::Result<()> {
    if args.path.exists() && fs::read_dir(&args.path)?.next().is_some() {
        bail!("destination {} already exists and is not empty", args.path.display());
    }
    let engine = open_engine(state)?;
    let private_key = read_private_key(args.private_key.as_ref())?;
    let caller = args.from.map(Principal::new);
    let mut local = GitRepository::init(&args.path)?;
    let result = engine.clone_into(
        caller.as_ref(),
        &mut local,
        &args.source,
        private_key.as_ref(),
    )?;
    println!(
        "{} Cloned {} into {}",
        "✓".green().bold(),
        args.source.to_string().bold(),
        args.path.display()
    );
    print_pull(&result);
    Ok(())
}

fn cmd_pull(state: &Path, args: PullArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    let private_key = read_private_key(args.private_key.as_ref())?;
    let caller = args.from.map(Principal::new);
    let mut local = GitRepository::open(&args.path)?;
    let result = engine.pull(caller.as_ref(), &mut local, &args.source, private_key.as_ref())?;
    print_pull(&result);
    Ok(())
}

fn print_pull(result: &PullResult) {
    match result.status {
        SyncStatus::UpToDate => {
            println!("Already up to date at {}", result.head.short_hex().yellow())
        }
        SyncStatus::Updated => println!(
            "  Head: {}  ({} pushes, {} objects, {} bytes)",
            result.head.short_hex().yellow(),
            result.records.len(),
            result.objects_received,
            result.bytes_transferred
        ),
    }
}

fn cmd_head(state: &Path, args: HeadArgs) -> anyhow::Result<()> {
    let engine = open_engine(state)?;
    match engine.head(&args.target)? {
        Some(head) => println!("{}", head.to_hex()),
        None => println!("{}", "(no pushes)".dimmed()),
    }
    Ok(())
}

fn cmd_keygen(args: KeygenArgs) -> anyhow::Result<()> {
    let key = PrivateKey::generate();
    let private_path = args.prefix.with_extension("pem");
    let public_path = args.prefix.with_extension("pub.pem");
    fs::write(&private_path, key.to_pem())
        .with_context(|| format!("writing {}", private_path.display()))?;
    fs::write(&public_path, key.public().to_pem())
        .with_context(|| format!("writing {}", public_path.display()))?;
    println!(
        "{} Wrote {} and {}",
        "✓".green().bold(),
        private_path.display(),
        public_path.display()
    );
    Ok(())
}
