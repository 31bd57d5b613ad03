use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Import operator CSV files through configurable column mappings", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a CSV file into the record store
    Import(ImportArgs),
    /// Write a header-only CSV template for a data type
    Template(TemplateArgs),
    /// List the active column mappings of a data type
    Mappings(MappingsArgs),
    /// Validate the mapping and field configuration of every data type
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// YAML import configuration
    #[arg(short, long)]
    pub config: PathBuf,
    /// Data type to import (e.g. item, supplier, purchase_order)
    #[arg(short = 't', long = "data-type")]
    pub data_type: String,
    /// CSV file to import ('-' reads stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// File name reported for stdin uploads
    #[arg(long = "file-name")]
    pub file_name: Option<String>,
    /// JSON record store, created when missing
    #[arg(short, long)]
    pub store: PathBuf,
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// YAML import configuration
    #[arg(short, long)]
    pub config: PathBuf,
    /// Data type to build the template for
    #[arg(short = 't', long = "data-type")]
    pub data_type: String,
    /// Output file or directory (stdout if omitted or '-')
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MappingsArgs {
    /// YAML import configuration
    #[arg(short, long)]
    pub config: PathBuf,
    /// Data type to list
    #[arg(short = 't', long = "data-type")]
    pub data_type: String,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// YAML import configuration
    #[arg(short, long)]
    pub config: PathBuf,
}
