use crate::coach::provider::EmbeddingProvider;
use crate::coach::splitter::{Chunk, TextSplitter};
use crate::coach::CoachError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Index format version written to disk
pub const INDEX_VERSION: u32 = 1;

/// Source name of the built-in knowledge text
pub const BUILTIN_SOURCE: &str = "builtin";

/// Knowledge used when no document directory is available
pub const BUILTIN_KNOWLEDGE: &str = "\
Hypertension, or high blood pressure, means the force of blood against artery walls \
stays too high. Readings of 130 systolic or 80 diastolic and above are considered \
elevated. It often has no symptoms, so regular measurement matters.

Nutrition: the DASH eating pattern lowers blood pressure. Eat vegetables, fruits, \
whole grains, legumes, nuts and low-fat dairy. Limit sodium to under 2300 mg a day, \
ideally 1500 mg. Processed food, bread, cured meat and sauces carry most of the salt. \
Potassium-rich foods such as bananas, beans and leafy greens help balance sodium.

Exercise: aim for at least 150 minutes of moderate aerobic activity per week, for \
example a brisk 30-minute walk on five days. Add muscle-strengthening activity twice \
a week. Even short walks after meals help. Losing 5 to 10 percent of body weight \
lowers blood pressure in people with overweight or obesity. A waist measurement under \
half of your height is a useful target.

Sleep: adults need 7 to 9 hours of sleep. Short sleep raises blood pressure. Keep a \
regular schedule, limit screens before bed and avoid caffeine late in the day.

Stress: chronic stress raises blood pressure. Breathing exercises, meditation, \
regular physical activity and time with friends help manage it.

Tobacco and alcohol: smoking damages blood vessels and raises blood pressure with \
every cigarette. Quitting brings benefits within weeks; ask about cessation support. \
Limit alcohol to at most one drink a day for women and two for men.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Retrieved chunk with its similarity
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<'a> {
    pub chunk: &'a IndexedChunk,
    pub score: f32,
}

/// In-memory similarity index over knowledge-base chunks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    pub version: u32,
    /// Embedding model the vectors were produced with
    pub model: String,
    chunks: Vec<IndexedChunk>,
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

/// Read every `.txt` document in a directory, sorted by file name
///
/// Falls back to the built-in knowledge text when the directory is missing or
/// holds no usable document.
pub fn load_documents<P: AsRef<Path>>(dir: P) -> Result<Vec<(String, String)>> {
    let dir = dir.as_ref();
    let mut documents = Vec::new();

    if dir.is_dir() {
        let mut paths: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
            .collect();
        paths.sort();

        for path in paths {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {:?}", path))?;
            if text.trim().is_empty() {
                warn!("Skipping empty document {:?}", path);
                continue;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            debug!("Loaded document {} ({} chars)", name, text.len());
            documents.push((name, text));
        }
    }

    if documents.is_empty() {
        warn!(
            "No knowledge-base documents in {:?}, using the built-in knowledge text",
            dir
        );
        documents.push((BUILTIN_SOURCE.to_string(), BUILTIN_KNOWLEDGE.to_string()));
    } else {
        info!("Found {} knowledge-base documents in {:?}", documents.len(), dir);
    }
    Ok(documents)
}

impl VectorIndex {
    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// Embed chunks into a new index
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self, CoachError> {
        if chunks.is_empty() {
            return Err(CoachError::Index("no chunks to index".to_string()));
        }
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(CoachError::Index(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let chunks = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk {
                source: chunk.source,
                text: chunk.text,
                embedding,
            })
            .collect();
        Ok(Self {
            version: INDEX_VERSION,
            model: embedder.model_id().to_string(),
            chunks,
        })
    }

    /// Load the documents of a directory, split them and build an index
    pub async fn build_from_dir<P: AsRef<Path>>(
        kb_dir: P,
        splitter: &TextSplitter,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let chunks: Vec<Chunk> = load_documents(kb_dir)?
            .iter()
            .flat_map(|(source, text)| splitter.split_document(source, text))
            .collect();
        info!(
            "Embedding {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );
        let index = Self::build(chunks, embedder).await?;
        Ok(index)
    }

    /// Use a saved index when it matches the embedding model, else build one
    pub async fn load_or_build<P: AsRef<Path>, Q: AsRef<Path>>(
        index_path: P,
        kb_dir: Q,
        splitter: &TextSplitter,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let index_path = index_path.as_ref();
        if index_path.is_file() {
            match Self::load(index_path) {
                Ok(index) if index.model == embedder.model_id() && !index.is_empty() => {
                    return Ok(index);
                }
                Ok(index) => warn!(
                    "Index {:?} was built with '{}', rebuilding with '{}'",
                    index_path,
                    index.model,
                    embedder.model_id()
                ),
                Err(e) => warn!("Ignoring unreadable index {:?}: {:#}", index_path, e),
            }
        }
        Self::build_from_dir(kb_dir, splitter, embedder).await
    }

    /// Top-k chunks by cosine similarity, best first
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchResult<'_>> {
        let mut results: Vec<SearchResult> = self
            .chunks
            .iter()
            .map(|chunk| SearchResult {
                chunk,
                score: cosine_similarity(query, &chunk.embedding),
            })
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        results
    }

    /// Save as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let json = serde_json::to_string(self).context("Failed to serialize index")?;
        fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        info!("Saved index with {} chunks to {:?}", self.len(), path);
        Ok(())
    }

    /// Load from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let index: Self =
            serde_json::from_str(&json).with_context(|| format!("Failed to parse {:?}", path))?;
        info!(
            "Loaded index with {} chunks ({}) from {:?}",
            index.len(),
            index.model,
            path
        );
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coach::provider::testing::KeywordEmbeddings;
    use tempfile::TempDir;

    fn chunk(source: &str, text: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            text: text.to_string(),
        }
    }

    async fn small_index() -> VectorIndex {
        let chunks = vec![
            chunk("a.txt", "Cut salt and sodium from processed food."),
            chunk("b.txt", "A brisk walk is good exercise."),
            chunk("c.txt", "Keep a regular sleep schedule."),
        ];
        VectorIndex::build(chunks, &KeywordEmbeddings::health())
            .await
            .unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_ranks_relevant_chunk_first() {
        let index = small_index().await;
        let embedder = KeywordEmbeddings::health();
        let query = embedder.embed("how much salt is too much").await.unwrap();

        let results = index.search(&query, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.source, "a.txt");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_save_and_reuse_matching_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb_index.json");
        let index = small_index().await;
        index.save(&path).unwrap();

        let loaded = VectorIndex::load_or_build(
            &path,
            dir.path().join("missing_kb"),
            &TextSplitter::default(),
            &KeywordEmbeddings::health(),
        )
        .await
        .unwrap();
        assert_eq!(loaded, index);
    }

    #[tokio::test]
    async fn test_model_change_triggers_rebuild() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb_index.json");
        let mut index = small_index().await;
        index.model = "older-model".to_string();
        index.save(&path).unwrap();

        let rebuilt = VectorIndex::load_or_build(
            &path,
            dir.path().join("missing_kb"),
            &TextSplitter::default(),
            &KeywordEmbeddings::health(),
        )
        .await
        .unwrap();
        assert_eq!(rebuilt.model, "keyword-test");
        assert!(rebuilt.chunks().iter().all(|c| c.source == BUILTIN_SOURCE));
    }

    #[test]
    fn test_documents_sorted_and_fallback() {
        let dir = TempDir::new().unwrap();
        let empty = load_documents(dir.path()).unwrap();
        assert_eq!(empty[0].0, BUILTIN_SOURCE);

        fs::write(dir.path().join("b_sleep.txt"), "Sleep well.").unwrap();
        fs::write(dir.path().join("a_salt.txt"), "Less salt.").unwrap();
        fs::write(dir.path().join("notes.md"), "ignored").unwrap();
        fs::write(dir.path().join("c_blank.txt"), "  \n").unwrap();

        let docs = load_documents(dir.path()).unwrap();
        let names: Vec<&str> = docs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a_salt.txt", "b_sleep.txt"]);
    }

    #[tokio::test]
    async fn test_build_rejects_empty_input() {
        let result = VectorIndex::build(Vec::new(), &KeywordEmbeddings::health()).await;
        assert!(matches!(result, Err(CoachError::Index(_))));
    }
}
