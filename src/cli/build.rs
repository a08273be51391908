use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use super::SubCommandExtend;
use crate::clip::ClipEmbedder;
use crate::config::Opts;
use crate::store::ImageStore;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    /// Folder of images to index
    #[arg(long, default_value = "images")]
    pub images: PathBuf,
}

impl SubCommandExtend for BuildCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = ClipEmbedder::load()?;
        let mut store =
            ImageStore::new(opts.data_dir.clone(), self.images.clone(), Box::new(embedder));

        let summary = store.rebuild()?;
        println!("Indexed {} images", summary.indexed);
        for skip in &summary.skipped {
            println!("Skipped {}: {}", skip.path.display(), skip.reason);
        }
        Ok(())
    }
}
