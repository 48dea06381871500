use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "speech-annotate",
    version,
    about = "Local speech expertise annotation tool"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the annotation form on a local address.
    Serve(ServeArgs),
    /// Validate the input pool and describe it.
    Pool(PoolArgs),
    /// Report stored annotations and per-rater progress.
    Status(StatusArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum StoreKind {
    Csv,
    Sqlite,
}

impl StoreKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn default_output_path(self) -> PathBuf {
        match self {
            Self::Csv => PathBuf::from("data/annotations.csv"),
            Self::Sqlite => PathBuf::from("data/annotations.sqlite"),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value = "data/sampled_speeches.json")]
    pub pool_path: PathBuf,

    /// Defaults to data/annotations.csv or data/annotations.sqlite.
    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StoreKind::Csv)]
    pub store: StoreKind,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8501)]
    pub port: u16,

    #[arg(long, default_value_t = 1)]
    pub score_min: u32,

    #[arg(long, default_value_t = 5)]
    pub score_max: u32,

    /// Only load the first N items of the pool.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    #[arg(long, default_value = "data/sampled_speeches.json")]
    pub pool_path: PathBuf,

    #[arg(long)]
    pub manifest_path: Option<PathBuf>,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[arg(long, default_value = "data/sampled_speeches.json")]
    pub pool_path: PathBuf,

    #[arg(long)]
    pub output_path: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = StoreKind::Csv)]
    pub store: StoreKind,

    #[arg(long)]
    pub limit: Option<usize>,

    #[arg(long)]
    pub rater_id: Option<String>,
}
