use std::path::Path;

use archindex::{
    ConfigDb,
    DataDir,
    DocumentStore,
    EntityId,
    Error,
    IndexerConfig,
    ObjectStore,
    Result,
    Session,
    TantivyStore,
    cli::{Cli, Command, ConfigAction, IngestArgs, ObjectAction},
    config_db::keys,
    ingestion::{self, IngestSummary},
    walker,
};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("ARCHINDEX_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let config_db = ConfigDb::open(&data_dir.config_db())?;

    match cli.command {
        Command::Ingest(args) => cmd_ingest(&config_db, &data_dir, &args)?,
        Command::Remove { id } => cmd_remove(&config_db, &data_dir, &id)?,
        Command::Show { id, json } => {
            cmd_show(&config_db, &data_dir, &id, json)?
        }
        Command::Descendants { id } => {
            cmd_descendants(&config_db, &data_dir, &id)?
        }
        Command::Object { action } => {
            let objects = ObjectStore::open(&data_dir.objects_db())?;
            match action {
                ObjectAction::Put { id, path } => {
                    object_put(&objects, &id, &path)?
                }
                ObjectAction::Remove { id } => object_remove(&objects, &id)?,
                ObjectAction::List => {
                    for id in objects.list_ids()? {
                        println!("{id}");
                    }
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key } => {
                println!("{}", IndexerConfig::load(&config_db)?.setting(&key)?);
            }
            ConfigAction::Set { key, value } => {
                IndexerConfig::validate_setting(&key, &value)?;
                config_db.set_setting(&key, &value)?;
                println!("{key} = {value}");
            }
            ConfigAction::Unset { key } => {
                if !config_db.remove_setting(&key)? {
                    return Err(Error::NotFound {
                        kind: "setting",
                        name: key,
                    });
                }
                println!("Reset {key}");
            }
            ConfigAction::List => {
                let config = IndexerConfig::load(&config_db)?;
                for key in keys::ALL {
                    println!("{key}\t{}", config.setting(key)?);
                }
            }
        },
        Command::Status { json } => cmd_status(&config_db, &data_dir, json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn open_index(
    config: &IndexerConfig,
    data_dir: &DataDir,
) -> Result<TantivyStore> {
    TantivyStore::open(&data_dir.index_dir()?, config.writer_memory_budget)
}

fn cmd_ingest(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    args: &IngestArgs,
) -> Result<()> {
    let mut files = Vec::new();
    for path in &args.paths {
        let found = walker::discover_batches(path)?;
        if found.is_empty() {
            warn!(path = %path.display(), "no batch files found");
        }
        files.extend(found);
    }

    let config = IndexerConfig::load(config_db)?;
    let store = open_index(&config, data_dir)?;
    let objects = ObjectStore::open(&data_dir.objects_db())?;

    let mut total = IngestSummary::default();
    if args.commit_each {
        for file in &files {
            let mut session = Session::open(&store)
                .with_config(config.clone())
                .with_content(&objects);
            let summary =
                ingestion::ingest_files(&mut session, std::slice::from_ref(file))?;
            session.close()?;
            total.batches += summary.batches;
            total.report.merge(summary.report);
        }
    } else {
        let mut session = Session::open(&store)
            .with_config(config)
            .with_content(&objects);
        total = ingestion::ingest_files(&mut session, &files)?;
        session.close()?;
    }

    println!(
        "Ingested {} batch file(s): {} indexed, {} retrofitted",
        total.batches, total.report.indexed, total.report.retrofitted
    );
    Ok(())
}

fn cmd_remove(config_db: &ConfigDb, data_dir: &DataDir, id: &str) -> Result<()> {
    let config = IndexerConfig::load(config_db)?;
    let store = open_index(&config, data_dir)?;
    let id = EntityId::from(id);

    if store.lookup(&id)?.is_none() {
        return Err(Error::NotFound {
            kind: "document",
            name: id.to_string(),
        });
    }

    let mut session = Session::open(&store).with_config(config);
    session.remove(&id)?;
    session.close()?;
    println!("Removed {id}");
    Ok(())
}

fn cmd_show(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    id: &str,
    json: bool,
) -> Result<()> {
    let config = IndexerConfig::load(config_db)?;
    let store = open_index(&config, data_dir)?;
    let doc = store.lookup(&EntityId::from(id))?.ok_or_else(|| {
        Error::NotFound {
            kind: "document",
            name: id.to_string(),
        }
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        for (name, values) in doc.iter() {
            let rendered: Vec<String> =
                values.iter().map(ToString::to_string).collect();
            println!("{name}\t{}", rendered.join(", "));
        }
    }
    Ok(())
}

fn cmd_descendants(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    id: &str,
) -> Result<()> {
    let config = IndexerConfig::load(config_db)?;
    let store = open_index(&config, data_dir)?;
    for found in store.descendants(&EntityId::from(id))? {
        println!("{found}");
    }
    Ok(())
}

fn object_put(objects: &ObjectStore, id: &str, path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Config(format!(
            "not a readable file: {}",
            path.display()
        )));
    }
    let data = std::fs::read(path)?;
    objects.put(&EntityId::from(id), &data)?;
    println!("Stored {} bytes for {id}", data.len());
    Ok(())
}

fn object_remove(objects: &ObjectStore, id: &str) -> Result<()> {
    if !objects.remove(&EntityId::from(id))? {
        return Err(Error::NotFound {
            kind: "object",
            name: id.to_string(),
        });
    }
    println!("Removed object {id}");
    Ok(())
}

fn cmd_status(
    config_db: &ConfigDb,
    data_dir: &DataDir,
    json: bool,
) -> Result<()> {
    let config = IndexerConfig::load(config_db)?;
    let documents = open_index(&config, data_dir)?.num_docs()?;
    let objects = ObjectStore::open(&data_dir.objects_db())?.list_ids()?.len();

    if json {
        let settings: serde_json::Map<String, serde_json::Value> = keys::ALL
            .iter()
            .map(|key| Ok(((*key).to_string(), config.setting(key)?.into())))
            .collect::<Result<_>>()?;
        let status = serde_json::json!({
            "data_dir": data_dir.root(),
            "data_dir_source": data_dir.source().to_string(),
            "documents": documents,
            "objects": objects,
            "settings": settings,
        });
        println!("{status}");
    } else {
        println!(
            "Data directory: {} (from {})",
            data_dir.root().display(),
            data_dir.source()
        );
        println!("Documents: {documents}");
        println!("Objects: {objects}");
        println!("Settings:");
        for key in keys::ALL {
            println!("  {key}: {}", config.setting(key)?);
        }
    }
    Ok(())
}
