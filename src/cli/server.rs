use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use super::SubCommandExtend;
use crate::clip::ClipEmbedder;
use crate::config::Opts;
use crate::server::{AppState, create_app};
use crate::store::ImageStore;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8000")]
    pub addr: String,
    /// Folder of images to index
    #[arg(long, default_value = "images")]
    pub images: PathBuf,
}

impl SubCommandExtend for ServerCommand {
    #[tokio::main]
    async fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = ClipEmbedder::load()?;
        let store =
            ImageStore::open(opts.data_dir.clone(), self.images.clone(), Box::new(embedder))?;
        let state = AppState::new(store);
        let app = create_app(state);

        info!("starting server at http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }
}
