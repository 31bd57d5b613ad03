pub mod cli;
pub mod coerce;
pub mod config;
pub mod data;
pub mod error;
pub mod header;
pub mod import;
pub mod io_utils;
pub mod mapping;
pub mod schema;
pub mod store;
pub mod table;
pub mod template;
pub mod upsert;
mod yaml_provider;

use std::{env, io::Write, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    cli::{Cli, Commands},
    config::ImportConfig,
    data::TRUTHY_VALUES,
    import::{ImportRequest, ImportStatus, Importer},
    mapping::MappingRegistry,
    store::JsonFileStore,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("mes_csv_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Import(args) => handle_import(&args),
        Commands::Template(args) => handle_template(&args),
        Commands::Mappings(args) => handle_mappings(&args),
        Commands::Check(args) => handle_check(&args),
    }
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let config = ImportConfig::load(&args.config)?;
    let contents = io_utils::read_input(&args.input)?;
    let file_name = match &args.file_name {
        Some(name) => name.clone(),
        None => args
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| args.input.display().to_string()),
    };
    let mut store = JsonFileStore::open(&args.store, &config)?;
    let importer = Importer::new(&config, &config);
    let outcome = importer.import(
        &mut store,
        &ImportRequest {
            data_type: &args.data_type,
            file_name: &file_name,
            contents: &contents,
        },
    );
    println!("{}", outcome.to_json().context("Serializing import response")?);
    match outcome.status {
        ImportStatus::Error => bail!("{} (HTTP {})", outcome.message, outcome.http_status()),
        ImportStatus::PartialSuccess => {
            warn!(
                "{} row(s) were rejected; see the error list",
                outcome.errors.len()
            );
            Ok(())
        }
        ImportStatus::Success => Ok(()),
    }
}

fn handle_template(args: &cli::TemplateArgs) -> Result<()> {
    let config = ImportConfig::load(&args.config)?;
    let bytes = template::render_template(&config, &args.data_type)?;
    let target = args.output.as_ref().map(|path| {
        if path.is_dir() {
            path.join(template::template_file_name(&args.data_type))
        } else {
            path.clone()
        }
    });
    let mut writer = io_utils::open_output(target.as_deref())?;
    writer.write_all(&bytes).context("Writing template")?;
    writer.flush().context("Flushing template")?;
    if let Some(path) = target.as_deref().filter(|p| !io_utils::is_dash(p)) {
        info!("Template for '{}' written to {:?}", args.data_type, path);
    }
    Ok(())
}

fn handle_mappings(args: &cli::MappingsArgs) -> Result<()> {
    let config = ImportConfig::load(&args.config)?;
    let mappings = config.active_mappings(&args.data_type)?;
    print!("{}", table::render_mappings(&mappings));
    println!();
    println!(
        "Boolean cells are true for: {} (case-insensitive); any other non-empty value is false.",
        TRUTHY_VALUES.join(", ")
    );
    println!("Integer cells accept full-width digits (e.g. １００) and truncate decimals.");
    Ok(())
}

fn handle_check(args: &cli::CheckArgs) -> Result<()> {
    let config = ImportConfig::load(&args.config)?;
    config
        .validate()
        .with_context(|| format!("Validating {:?}", args.config))?;
    info!(
        "✓ {} data type(s) in {:?} are importable",
        config.data_types.len(),
        args.config
    );
    Ok(())
}
