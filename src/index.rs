//! Exact nearest-neighbor index over dense float vectors.
//!
//! Vectors are kept in a flat row-major buffer and searched with a full scan
//! under squared L2 distance. Positions are assigned in insertion order and
//! never change; the only way to mutate an existing index is to rebuild it
//! from scratch.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// A single search result: position in the index plus squared L2 distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: usize,
    pub distance: f32,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append a vector, assigning it the next position.
    pub fn add(&mut self, vector: &[f32]) -> Result<()> {
        ensure!(
            vector.len() == self.dim,
            "vector dimension {} does not match index dimension {}",
            vector.len(),
            self.dim
        );
        self.data.extend_from_slice(vector);
        Ok(())
    }

    /// Return the `k` nearest vectors to `query`, closest first.
    ///
    /// `k` is clamped to the number of stored vectors, so an empty index
    /// yields an empty result. Ties are broken arbitrarily.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        ensure!(
            query.len() == self.dim,
            "query dimension {} does not match index dimension {}",
            query.len(),
            self.dim
        );
        let mut neighbors = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(id, row)| Neighbor { id, distance: squared_l2(query, row) })
            .collect::<Vec<_>>();
        neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        neighbors.truncate(k);
        Ok(neighbors)
    }

    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        bincode::serialize_into(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let index = bincode::deserialize_from(BufReader::new(file))?;
        Ok(index)
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
