//! Index lifecycle management.
//!
//! [`ImageStore`] owns the vector index, the path manifest and the embedding
//! provider, and decides whether persisted artifacts can be loaded or the
//! index has to be rebuilt from the image folder. Index and manifest are
//! positionally aligned: position `i` in the index corresponds to path `i`
//! in the manifest. Rebuilds always recompute every embedding; there is no
//! incremental add, which keeps the two artifacts trivially consistent.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use log::{info, warn};
use serde::Serialize;
use walkdir::WalkDir;

use crate::clip::Embedder;
use crate::config::{DataDir, is_allowed_file};
use crate::index::FlatIndex;

/// A search result mapped back from index position to image path.
#[derive(Debug, Clone)]
pub struct Hit {
    pub path: PathBuf,
    /// Squared L2 distance between query and image embedding
    pub distance: f32,
}

/// Outcome of a rebuild pass: how many images made it into the index and
/// which files were skipped, with the reason.
#[derive(Debug, Serialize)]
pub struct RebuildSummary {
    pub indexed: usize,
    pub skipped: Vec<SkippedImage>,
}

#[derive(Debug, Serialize)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

pub struct ImageStore {
    data_dir: DataDir,
    images_dir: PathBuf,
    embedder: Box<dyn Embedder>,
    index: FlatIndex,
    paths: Vec<PathBuf>,
}

impl ImageStore {
    /// Create a store with an empty in-memory index. Call
    /// [`ImageStore::load_or_rebuild`] to populate it.
    pub fn new(data_dir: DataDir, images_dir: PathBuf, embedder: Box<dyn Embedder>) -> Self {
        let index = FlatIndex::new(embedder.dim());
        Self { data_dir, images_dir, embedder, index, paths: Vec::new() }
    }

    /// Create a store and populate it from disk, rebuilding if the
    /// persisted artifacts are missing. Entry point used by both the CLI
    /// and the web service at startup.
    pub fn open(data_dir: DataDir, images_dir: PathBuf, embedder: Box<dyn Embedder>) -> Result<Self> {
        let mut store = Self::new(data_dir, images_dir, embedder);
        store.load_or_rebuild()?;
        Ok(store)
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Number of indexed images
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths of all indexed images, in index position order
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Load the persisted index and manifest if both exist, otherwise
    /// rebuild from the image folder.
    pub fn load_or_rebuild(&mut self) -> Result<()> {
        if self.data_dir.index().exists() && self.data_dir.manifest().exists() {
            self.load()
        } else {
            self.rebuild().map(|_| ())
        }
    }

    /// Read both artifacts from disk without recomputing any embedding.
    fn load(&mut self) -> Result<()> {
        let index = FlatIndex::read_file(self.data_dir.index())
            .with_context(|| format!("failed to read {}", self.data_dir.index().display()))?;
        let file = File::open(self.data_dir.manifest())
            .with_context(|| format!("failed to read {}", self.data_dir.manifest().display()))?;
        let paths: Vec<PathBuf> = serde_json::from_reader(BufReader::new(file))?;

        ensure!(
            paths.len() == index.len(),
            "persisted state is corrupted: index holds {} vectors but manifest lists {} paths",
            index.len(),
            paths.len()
        );

        self.index = index;
        self.paths = paths;
        info!("loaded existing index with {} images", self.len());
        Ok(())
    }

    /// Re-embed every image in the folder, replace the in-memory state and
    /// overwrite the persisted artifacts.
    ///
    /// Per-file failures (undecodable image, inference error) are logged,
    /// recorded in the summary and skipped; the rebuild itself continues.
    /// A missing folder is created, yielding a valid empty index.
    pub fn rebuild(&mut self) -> Result<RebuildSummary> {
        if !self.images_dir.exists() {
            fs::create_dir_all(&self.images_dir)?;
        }

        info!("rebuilding index from {}", self.images_dir.display());

        let mut index = FlatIndex::new(self.embedder.dim());
        let mut paths = Vec::new();
        let mut skipped = Vec::new();

        for path in self.image_files() {
            match self.embed_file(&path) {
                Ok(vector) => {
                    index.add(&vector)?;
                    paths.push(path);
                }
                Err(err) => {
                    warn!("skipping {}: {:#}", path.display(), err);
                    skipped.push(SkippedImage { path, reason: format!("{:#}", err) });
                }
            }
        }

        self.index = index;
        self.paths = paths;
        self.persist()?;

        info!("index built with {} images", self.len());
        Ok(RebuildSummary { indexed: self.len(), skipped })
    }

    /// Embed `query` and return the `k` closest images, best first.
    ///
    /// `k` is clamped to the index size; an empty index yields an empty
    /// result.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Hit>> {
        let vector = self.embedder.embed_text(query)?;
        let neighbors = self.index.search(&vector, k)?;
        Ok(neighbors
            .into_iter()
            .map(|n| Hit { path: self.paths[n.id].clone(), distance: n.distance })
            .collect())
    }

    /// Files in the image folder with an allowed extension, sorted for a
    /// deterministic manifest order.
    fn image_files(&self) -> Vec<PathBuf> {
        let mut files = WalkDir::new(&self.images_dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .map(|name| is_allowed_file(&name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();
        files.sort();
        files
    }

    fn embed_file(&self, path: &Path) -> Result<Vec<f32>> {
        let image = image::open(path).with_context(|| "failed to decode image")?;
        self.embedder.embed_image(&image)
    }

    /// Write both artifacts through a temp file and rename, so a crash
    /// mid-write cannot leave a half-written pair.
    fn persist(&self) -> Result<()> {
        fs::create_dir_all(self.data_dir.path())?;

        let index_file = self.data_dir.index();
        let tmp = index_file.with_extension("bin.tmp");
        self.index.write_file(&tmp)?;
        fs::rename(&tmp, &index_file)?;

        let manifest_file = self.data_dir.manifest();
        let tmp = manifest_file.with_extension("json.tmp");
        let file = File::create(&tmp)?;
        serde_json::to_writer(BufWriter::new(file), &self.paths)?;
        fs::rename(&tmp, &manifest_file)?;

        Ok(())
    }
}
