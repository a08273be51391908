//! CLIP embedding provider.
//!
//! Wraps the candle port of CLIP ViT-B/32 and exposes the two operations the
//! rest of the crate needs: embed an image, embed a text string. Both land in
//! the same 512-dimensional space, so the L2 distance between a text vector
//! and an image vector is meaningful. Vectors are used as the model emits
//! them, without normalization.

use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::DynamicImage;
use image::imageops::FilterType;
use log::info;
use tokenizers::Tokenizer;

const MODEL_ID: &str = "openai/clip-vit-base-patch32";
// main branch of the upstream repo carries no safetensors weights
const MODEL_REVISION: &str = "refs/pr/15";

/// Converts images and text into vectors of a shared embedding space.
///
/// The trait exists so the index lifecycle can be exercised in tests with a
/// stub returning fixed vectors instead of running model inference.
pub trait Embedder: Send + Sync {
    /// Embedding dimensionality
    fn dim(&self) -> usize;
    /// Embed a decoded image
    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>>;
    /// Embed a text string into the same space as [`Embedder::embed_image`]
    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

pub struct ClipEmbedder {
    model: ClipModel,
    tokenizer: Tokenizer,
    config: ClipConfig,
    device: Device,
}

impl ClipEmbedder {
    /// Load model weights and tokenizer from the Hugging Face Hub cache,
    /// downloading them on first use.
    pub fn load() -> Result<Self> {
        let device = Device::Cpu;

        info!("loading CLIP model {}", MODEL_ID);
        let api = Api::new()?;
        let repo = api.repo(Repo::with_revision(
            MODEL_ID.to_string(),
            RepoType::Model,
            MODEL_REVISION.to_string(),
        ));
        let weights_filename = repo.get("model.safetensors")?;
        let tokenizer_filename = repo.get("tokenizer.json")?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename).map_err(anyhow::Error::msg)?;

        let config = ClipConfig::vit_base_patch32();
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_filename], DType::F32, &device)? };
        let model = ClipModel::new(vb, &config)?;

        Ok(Self { model, tokenizer, config, device })
    }

    /// Resize to the model input resolution and scale pixel values into
    /// [-1, 1], returning a `(3, size, size)` tensor.
    fn preprocess(&self, image: &DynamicImage) -> Result<Tensor> {
        let size = self.config.image_size;
        let image = image.resize_to_fill(size as u32, size as u32, FilterType::Triangle);
        let image = image.to_rgb8().into_raw();
        let tensor = Tensor::from_vec(image, (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(2. / 255., -1.)?;
        Ok(tensor)
    }
}

impl Embedder for ClipEmbedder {
    fn dim(&self) -> usize {
        self.config.text_config.projection_dim
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let pixel_values = self.preprocess(image)?.unsqueeze(0)?;
        let features = self.model.get_image_features(&pixel_values)?;
        let features = features.squeeze(0)?.to_vec1::<f32>()?;
        Ok(features)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let encoding = self.tokenizer.encode(text, true).map_err(anyhow::Error::msg)?;
        let ids = encoding.get_ids().to_vec();
        let input_ids = Tensor::new(vec![ids], &self.device)
            .context("failed to build token tensor")?;
        let features = self.model.get_text_features(&input_ids)?;
        let features = features.squeeze(0)?.to_vec1::<f32>()?;
        Ok(features)
    }
}

/// Fixed-vector embedder for tests. Images map to a vector derived from
/// their pixel width, texts to a vector registered up front.
#[cfg(test)]
pub(crate) mod stub {
    use std::collections::HashMap;

    use super::*;

    pub struct StubEmbedder {
        dim: usize,
        by_width: HashMap<u32, Vec<f32>>,
        by_text: HashMap<String, Vec<f32>>,
    }

    impl StubEmbedder {
        pub fn new(dim: usize) -> Self {
            Self { dim, by_width: HashMap::new(), by_text: HashMap::new() }
        }

        /// Map any image of pixel width `width` to `vector`
        pub fn image(mut self, width: u32, vector: Vec<f32>) -> Self {
            assert_eq!(vector.len(), self.dim);
            self.by_width.insert(width, vector);
            self
        }

        /// Map the exact query string `text` to `vector`
        pub fn text(mut self, text: &str, vector: Vec<f32>) -> Self {
            assert_eq!(vector.len(), self.dim);
            self.by_text.insert(text.to_string(), vector);
            self
        }
    }

    impl Embedder for StubEmbedder {
        fn dim(&self) -> usize {
            self.dim
        }

        fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
            self.by_width
                .get(&image.width())
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no stub vector for width {}", image.width()))
        }

        fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
            self.by_text
                .get(text)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no stub vector for text {:?}", text))
        }
    }
}
