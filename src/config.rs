use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::Parser;
use directories::ProjectDirs;

use crate::cli::*;

static DATA_DIR: LazyLock<DataDir> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "", "imquery").expect("failed to get project dir");
    DataDir { path: proj_dirs.data_dir().to_path_buf() }
});

fn default_data_dir() -> &'static str {
    DATA_DIR.path().to_str().unwrap()
}

/// File extensions accepted by the indexer and the upload endpoint
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Whether a filename carries an allowed image extension (case-insensitive)
pub fn is_allowed_file(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imquery", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// Directory holding the persisted index artifacts
    #[arg(short = 'c', long, default_value = default_data_dir())]
    pub data_dir: DataDir,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// Rebuild the index from the image folder
    Build(BuildCommand),
    /// Query the index with free text
    Search(SearchCommand),
    /// Start the HTTP search service
    Server(ServerCommand),
}

/// Location of the two persisted artifacts. Neither file is meaningful
/// without the other; they are always read and written as a pair.
#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Serialized vector index
    pub fn index(&self) -> PathBuf {
        self.path.join("index.bin")
    }

    /// JSON manifest of indexed image paths, order-aligned with the index
    pub fn manifest(&self) -> PathBuf {
        self.path.join("image_paths.json")
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
