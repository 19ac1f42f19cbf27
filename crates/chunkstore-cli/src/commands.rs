use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chunkstore::{ChunkedObjectStore, Header, ObjectStore, Urn};
use chunkstore_backend::DirectoryBackend;
use colored::Colorize;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = CliConfig::load(&cli.config)?;
    match cli.command {
        Command::NewUrn => { println!("{}", Urn::generate()); Ok(()) },
        command => {
            let store = open_store(&config)?;
            dispatch(&store, command)
        }
    }
}

fn open_store(config: &CliConfig) -> anyhow::Result<ChunkedObjectStore> {
    let backend = DirectoryBackend::new(&config.backend.root);
    tracing::debug!(root = %backend.root().display(), pool = %config.store.pool, "opening store");
    Ok(ChunkedObjectStore::new(Arc::new(backend), config.store.clone())?)
}

fn dispatch(store: &ChunkedObjectStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Put(args) => cmd_put(store, args),
        Command::Get(args) => cmd_get(store, args),
        Command::Rm(args) => cmd_rm(store, args),
        Command::Stat(args) => cmd_stat(store, args),
        Command::Verify(args) => cmd_verify(store, args),
        Command::NewUrn => { println!("{}", Urn::generate()); Ok(()) },
        Command::StorageId => { println!("{}", store.storage_id()); Ok(()) },
    }
}

fn parse_urn(raw: &str) -> anyhow::Result<Urn> {
    raw.parse().with_context(|| format!("invalid urn {raw:?}"))
}

fn cmd_put(store: &ChunkedObjectStore, args: PutArgs) -> anyhow::Result<()> {
    let urn = parse_urn(&args.urn)?;
    let mut input: Box<dyn Read> = match &args.file {
        Some(path) => Box::new(open_input(path)?),
        None => Box::new(io::stdin().lock()),
    };
    let header = store.write_object(&urn, &mut input)?;
    println!(
        "{} Stored {} ({} bytes in {} parts)",
        "✓".green().bold(),
        urn.to_string().yellow(),
        header.size,
        header.parts
    );
    Ok(())
}

fn cmd_get(store: &ChunkedObjectStore, args: GetArgs) -> anyhow::Result<()> {
    let urn = parse_urn(&args.urn)?;
    let mut reader = store.read_object(&urn)?;
    match &args.file {
        Some(path) => {
            let mut out = File::create(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let copied = io::copy(&mut reader, &mut out)?;
            out.flush()?;
            println!(
                "{} Wrote {} ({} bytes) to {}",
                "✓".green().bold(),
                urn.to_string().yellow(),
                copied,
                path.display().to_string().bold()
            );
        }
        None => {
            let mut out = io::stdout().lock();
            io::copy(&mut reader, &mut out)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn cmd_rm(store: &ChunkedObjectStore, args: UrnArgs) -> anyhow::Result<()> {
    let urn = parse_urn(&args.urn)?;
    store.delete_object(&urn)?;
    println!("{} Deleted {}", "✓".green().bold(), urn.to_string().yellow());
    Ok(())
}

fn cmd_stat(store: &ChunkedObjectStore, args: StatArgs) -> anyhow::Result<()> {
    let urn = parse_urn(&args.urn)?;
    let header = store.stat_object(&urn)?;
    print!("{}", render_header(&urn, &header, &args.format)?);
    Ok(())
}

fn cmd_verify(store: &ChunkedObjectStore, args: UrnArgs) -> anyhow::Result<()> {
    let urn = parse_urn(&args.urn)?;
    let header = store.verify_object(&urn)?;
    println!(
        "{} {} intact: {} parts verified",
        "✓".green().bold(),
        urn.to_string().yellow(),
        header.parts
    );
    Ok(())
}

fn open_input(path: &Path) -> anyhow::Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn render_header(urn: &Urn, header: &Header, format: &OutputFormat) -> anyhow::Result<String> {
    let mut out = String::new();
    match format {
        OutputFormat::Json => {
            out.push_str(&serde_json::to_string_pretty(header)?);
            out.push('\n');
        }
        OutputFormat::Text => {
            out.push_str(&format!("{}\n", urn.to_string().yellow().bold()));
            out.push_str(&format!("  Size: {} bytes\n", header.size));
            out.push_str(&format!("  Parts: {}\n", header.parts));
            for (name, meta) in header.metadata.iter() {
                out.push_str(&format!(
                    "  {} @{} +{} {}\n",
                    name.cyan(),
                    meta.start,
                    meta.size,
                    meta.hash.dimmed()
                ));
            }
        }
    }
    Ok(out)
}
