use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use super::SubCommandExtend;
use crate::clip::ClipEmbedder;
use crate::config::Opts;
use crate::store::ImageStore;
use crate::utils;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// Run a single query instead of entering the interactive prompt
    pub query: Option<String>,
    /// Folder of images to index
    #[arg(long, default_value = "images")]
    pub images: PathBuf,
    /// Number of results per query
    #[arg(short, long, default_value_t = 1)]
    pub count: usize,
    /// Do not render matches inline in the terminal
    #[arg(long)]
    pub no_preview: bool,
}

impl SubCommandExtend for SearchCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = ClipEmbedder::load()?;
        let store =
            ImageStore::open(opts.data_dir.clone(), self.images.clone(), Box::new(embedder))?;

        if let Some(query) = &self.query {
            return self.run_query(&store, query);
        }

        loop {
            let line = utils::read_line("\nEnter search text (or 'exit' to quit): ")?;
            if line.eq_ignore_ascii_case("exit") {
                break;
            }
            if line.is_empty() {
                continue;
            }
            self.run_query(&store, &line)?;
        }
        Ok(())
    }
}

impl SearchCommand {
    fn run_query(&self, store: &ImageStore, query: &str) -> Result<()> {
        let hits = store.search(query, self.count)?;
        if hits.is_empty() {
            println!("No images indexed yet");
            return Ok(());
        }

        println!("\nTop matches:");
        for (rank, hit) in hits.iter().enumerate() {
            println!("{}: {} (distance: {:.4})", rank + 1, hit.path.display(), hit.distance);
        }

        if !self.no_preview {
            for hit in &hits {
                let image = image::open(&hit.path)?;
                print!("{}", utils::render_preview(&image, 64));
            }
        }
        Ok(())
    }
}
