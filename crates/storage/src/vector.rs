//! Lexical similarity search over term-frequency vectors.
//!
//! Vocabulary indices are assigned in first-seen order and never reused.
//! Vectors only have dimensions for the first [`MAX_DIMS`] terms, so tokens
//! seen later still count towards the vector length but match nothing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use deskpilot_core::{Result, VectorHit, VectorSearch};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const MAX_DIMS: usize = 500;
pub const MAX_ENTRIES: usize = 1000;
pub const MIN_SCORE: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    id: String,
    text: String,
    vector: Vec<f64>,
    #[serde(default)]
    metadata: serde_json::Value,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Index {
    entries: Vec<Entry>,
    vocabulary: HashMap<String, usize>,
}

impl Index {
    fn vectorize(&mut self, text: &str) -> Vec<f64> {
        let tokens = tokenize(text);
        let mut freq: Vec<(String, usize)> = Vec::new();
        for token in tokens.iter() {
            match freq.iter_mut().find(|(t, _)| t == token) {
                Some((_, n)) => *n += 1,
                None => freq.push((token.clone(), 1)),
            }
        }

        for (token, _) in &freq {
            let next = self.vocabulary.len();
            self.vocabulary.entry(token.clone()).or_insert(next);
        }

        let mut vector = vec![0.0; self.vocabulary.len().min(MAX_DIMS)];
        for (token, count) in &freq {
            if let Some(&idx) = self.vocabulary.get(token) {
                if idx < MAX_DIMS {
                    vector[idx] = *count as f64 / tokens.len() as f64;
                }
            }
        }
        vector
    }

    fn trim(&mut self) {
        if self.entries.len() > MAX_ENTRIES {
            let excess = self.entries.len() - MAX_ENTRIES;
            self.entries.drain(..excess);
        }
    }
}

/// Lowercased word tokens longer than two characters.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Cosine over the shared prefix of two vectors of possibly different length.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let (mut dot, mut mag_a, mut mag_b) = (0.0, 0.0, 0.0);
    for i in 0..len {
        dot += a[i] * b[i];
        mag_a += a[i] * a[i];
        mag_b += b[i] * b[i];
    }
    let denom = mag_a.sqrt() * mag_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

pub struct TermVectorStore {
    index: RwLock<Index>,
    path: Option<PathBuf>,
}

impl TermVectorStore {
    pub fn in_memory() -> Self {
        Self {
            index: RwLock::new(Index::default()),
            path: None,
        }
    }

    /// Loads a persisted index, starting fresh if the file is missing or unreadable.
    pub fn open(path: PathBuf) -> Self {
        let index = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Vector index unreadable, starting fresh");
                Index::default()
            }),
            Err(_) => Index::default(),
        };
        debug!(entries = index.entries.len(), "Vector index loaded");
        Self {
            index: RwLock::new(index),
            path: Some(path),
        }
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.write().entries.retain(|e| e.id != id);
        self.persist()
    }

    pub fn clear(&self) -> Result<()> {
        {
            let mut index = self.write();
            index.entries.clear();
            index.vocabulary.clear();
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string(&*self.read())?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Index> {
        self.index.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Index> {
        self.index.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl VectorSearch for TermVectorStore {
    async fn add(&self, id: &str, text: &str, metadata: serde_json::Value) -> Result<()> {
        {
            let mut index = self.write();
            let vector = index.vectorize(text);
            index.entries.push(Entry {
                id: id.to_string(),
                text: text.to_string(),
                vector,
                metadata,
            });
            index.trim();
        }
        self.persist()
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>> {
        let mut index = self.write();
        let query_vec = index.vectorize(query);
        let mut hits: Vec<VectorHit> = index
            .entries
            .iter()
            .map(|e| VectorHit {
                id: e.id.clone(),
                text: e.text.clone(),
                score: cosine(&query_vec, &e.vector),
                metadata: e.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits.retain(|h| h.score > MIN_SCORE);
        Ok(hits)
    }
}
