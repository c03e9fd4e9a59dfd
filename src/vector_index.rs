//! In-memory nearest-neighbor index over chunk embeddings.
//!
//! A [`VectorIndex`] is immutable once built: rebuilding produces a new value
//! which the indexer swaps in whole. Search is an exact cosine scan over a
//! flat `f32` buffer with precomputed norms, so results are reproducible
//! bit-for-bit across a save/load round trip.
//!
//! # Artifact
//!
//! [`save`](VectorIndex::save) writes a SQLite database (see
//! [`migrate`](crate::migrate)) next to the target, then renames it over
//! the live file. [`load`](VectorIndex::load) reports anything it cannot use
//! as [`IndexError::IndexNotFound`], except an artifact built for a different
//! vector dimension, which is a [`IndexError::DimensionMismatch`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::ChunkingConfig;
use crate::db::{self, OpenMode};
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::{IndexError, Result};
use crate::migrate::{self, FORMAT_VERSION};
use crate::models::Chunk;

/// What an index was built with. Carried into the artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexMeta {
    pub model: String,
    pub dims: usize,
    pub chunking: ChunkingConfigMeta,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkingConfigMeta {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl From<ChunkingConfig> for ChunkingConfigMeta {
    fn from(c: ChunkingConfig) -> Self {
        Self {
            chunk_size: c.chunk_size,
            chunk_overlap: c.chunk_overlap,
        }
    }
}

impl IndexMeta {
    pub fn new(model: impl Into<String>, dims: usize, chunking: ChunkingConfig) -> Self {
        Self {
            model: model.into(),
            dims,
            chunking: chunking.into(),
            built_at: Utc::now(),
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    /// Slot of the chunk inside the index.
    pub position: usize,
    pub chunk: Chunk,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

/// Summary of a persisted artifact, read without loading vectors.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub meta: IndexMeta,
    pub chunks: usize,
    /// Chunk count per source.
    pub by_source: BTreeMap<String, usize>,
    /// File digest per source the artifact was built from.
    #[serde(skip)]
    pub digests: BTreeMap<String, String>,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    meta: IndexMeta,
    chunks: Vec<Chunk>,
    /// `chunks.len() * meta.dims` values, row-major.
    vectors: Vec<f32>,
    norms: Vec<f32>,
    /// File digest each source's chunks were produced from.
    sources: BTreeMap<String, String>,
}

impl VectorIndex {
    /// Build from parallel `chunks` / `vectors`.
    ///
    /// Fails with `DimensionMismatch` unless there is exactly one vector per
    /// chunk and every vector has `meta.dims` components.
    pub fn build(meta: IndexMeta, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::DimensionMismatch {
                context: "chunk/vector count",
                expected: chunks.len(),
                found: vectors.len(),
            });
        }

        let dims = meta.dims;
        let mut flat = Vec::with_capacity(chunks.len() * dims);
        let mut norms = Vec::with_capacity(chunks.len());
        for v in &vectors {
            if v.len() != dims {
                return Err(IndexError::DimensionMismatch {
                    context: "vector length",
                    expected: dims,
                    found: v.len(),
                });
            }
            norms.push(norm(v));
            flat.extend_from_slice(v);
        }

        Ok(Self {
            meta,
            chunks,
            vectors: flat,
            norms,
            sources: BTreeMap::new(),
        })
    }

    /// Record the file digest (source → digest) the chunks were built from.
    pub fn with_source_digests(mut self, sources: BTreeMap<String, String>) -> Self {
        self.sources = sources;
        self
    }

    /// Digest of the file content this index holds for `source`.
    pub fn source_digest(&self, source: &str) -> Option<&str> {
        self.sources.get(source).map(String::as_str)
    }

    pub fn source_digests(&self) -> &BTreeMap<String, String> {
        &self.sources
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn dims(&self) -> usize {
        self.meta.dims
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dims = self.meta.dims;
        self.vectors.get(position * dims..(position + 1) * dims)
    }

    /// Chunks and vectors grouped by source, in index order.
    pub fn entries_by_source(&self) -> BTreeMap<&str, Vec<(&Chunk, &[f32])>> {
        let mut grouped: BTreeMap<&str, Vec<(&Chunk, &[f32])>> = BTreeMap::new();
        let dims = self.meta.dims;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let v = &self.vectors[i * dims..(i + 1) * dims];
            grouped.entry(chunk.source.as_str()).or_default().push((chunk, v));
        }
        grouped
    }

    /// Whether chunks in this index can be reused under `chunking` and `model`.
    pub fn is_compatible(&self, model: &str, dims: usize, chunking: ChunkingConfig) -> bool {
        self.meta.model == model
            && self.meta.dims == dims
            && self.meta.chunking == ChunkingConfigMeta::from(chunking)
    }

    /// Top `k` chunks by cosine similarity to `query`, best first.
    ///
    /// Ties keep index order. An empty index or `k == 0` yields no results.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.meta.dims {
            return Err(IndexError::DimensionMismatch {
                context: "query vector",
                expected: self.meta.dims,
                found: query.len(),
            });
        }

        let query_norm = norm(query);
        let dims = self.meta.dims;
        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .chunks_exact(dims.max(1))
            .zip(self.norms.iter())
            .enumerate()
            .map(|(i, (v, &n))| (i, cosine(query, query_norm, v, n)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                position,
                chunk: self.chunks[position].clone(),
                score,
            })
            .collect())
    }

    /// Persist to `path`, atomically replacing any existing artifact.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        remove_if_exists(&tmp).await?;

        let pool = db::connect(&tmp, OpenMode::Create).await?;
        let written = self.write_rows(&pool).await;
        pool.close().await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| IndexError::io(path, e))?;
        debug!(path = %path.display(), chunks = self.len(), "index artifact saved");
        Ok(())
    }

    async fn write_rows(&self, pool: &SqlitePool) -> Result<()> {
        migrate::create_schema(pool).await?;

        let mut tx = pool.begin().await?;
        let meta = [
            ("format_version", FORMAT_VERSION.to_string()),
            ("model", self.meta.model.clone()),
            ("dims", self.meta.dims.to_string()),
            ("chunk_size", self.meta.chunking.chunk_size.to_string()),
            ("chunk_overlap", self.meta.chunking.chunk_overlap.to_string()),
            ("built_at", self.meta.built_at.to_rfc3339()),
        ];
        for (key, value) in meta {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        let dims = self.meta.dims;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let blob = vec_to_blob(&self.vectors[i * dims..(i + 1) * dims]);
            sqlx::query(
                r#"INSERT INTO chunks
                   (position, source, page, seq, start_char, char_len, text, hash, vector)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(i as i64)
            .bind(&chunk.source)
            .bind(chunk.page.map(i64::from))
            .bind(chunk.seq as i64)
            .bind(chunk.start_char as i64)
            .bind(chunk.char_len as i64)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(blob)
            .execute(&mut *tx)
            .await?;
        }

        for (source, digest) in &self.sources {
            sqlx::query("INSERT INTO sources (source, digest) VALUES (?, ?)")
                .bind(source)
                .bind(digest)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Load the artifact at `path` for a provider producing `expected_dims`.
    pub async fn load(path: &Path, expected_dims: usize) -> Result<Self> {
        let pool = open_existing(path).await?;
        let loaded = read_index(&pool, path).await;
        pool.close().await;
        let index = loaded?;

        if index.meta.dims != expected_dims {
            return Err(IndexError::DimensionMismatch {
                context: "index artifact",
                expected: expected_dims,
                found: index.meta.dims,
            });
        }
        debug!(path = %path.display(), chunks = index.len(), "index artifact loaded");
        Ok(index)
    }

    /// Metadata and counts for the artifact at `path`.
    pub async fn inspect(path: &Path) -> Result<ArtifactInfo> {
        let pool = open_existing(path).await?;
        let info = read_info(&pool, path).await;
        pool.close().await;
        info
    }
}

/// Remove the artifact at `path` and any leftover temp file. Idempotent.
pub async fn delete_artifact(path: &Path) -> Result<()> {
    remove_if_exists(path).await?;
    remove_if_exists(&tmp_path(path)).await
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(IndexError::io(path, e)),
    }
}

async fn open_existing(path: &Path) -> Result<SqlitePool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(IndexError::not_found(path, "not a file")),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IndexError::not_found(path, "missing"))
        }
        Err(e) => return Err(IndexError::not_found(path, e.to_string())),
    }
    db::connect(path, OpenMode::ReadOnly)
        .await
        .map_err(|e| IndexError::not_found(path, e.to_string()))
}

async fn read_meta(pool: &SqlitePool, path: &Path) -> Result<IndexMeta> {
    let rows = sqlx::query("SELECT key, value FROM index_meta")
        .fetch_all(pool)
        .await
        .map_err(|e| IndexError::not_found(path, format!("unreadable metadata: {}", e)))?;
    let mut values = BTreeMap::new();
    for row in rows {
        let key: String = row
            .try_get("key")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        let value: String = row
            .try_get("value")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        values.insert(key, value);
    }

    let version: u32 = parse_field(&values, "format_version", path)?;
    if version != FORMAT_VERSION {
        return Err(IndexError::not_found(
            path,
            format!("format version {} (expected {})", version, FORMAT_VERSION),
        ));
    }

    let built_at = DateTime::parse_from_rfc3339(meta_field(&values, "built_at", path)?)
        .map_err(|e| IndexError::not_found(path, format!("bad built_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(IndexMeta {
        model: meta_field(&values, "model", path)?.to_string(),
        dims: parse_field(&values, "dims", path)?,
        chunking: ChunkingConfigMeta {
            chunk_size: parse_field(&values, "chunk_size", path)?,
            chunk_overlap: parse_field(&values, "chunk_overlap", path)?,
        },
        built_at,
    })
}

fn meta_field<'a>(values: &'a BTreeMap<String, String>, key: &str, path: &Path) -> Result<&'a str> {
    values
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| IndexError::not_found(path, format!("metadata key '{}' missing", key)))
}

fn parse_field<T: std::str::FromStr>(
    values: &BTreeMap<String, String>,
    key: &str,
    path: &Path,
) -> Result<T> {
    meta_field(values, key, path)?
        .parse()
        .map_err(|_| IndexError::not_found(path, format!("metadata key '{}' is malformed", key)))
}

async fn read_index(pool: &SqlitePool, path: &Path) -> Result<VectorIndex> {
    let corrupt = |what: String| IndexError::not_found(path, what);
    let meta = read_meta(pool, path).await?;

    let rows = sqlx::query(
        "SELECT source, page, seq, start_char, char_len, text, hash, vector \
         FROM chunks ORDER BY position",
    )
    .fetch_all(pool)
    .await
    .map_err(|e| corrupt(format!("unreadable chunks: {}", e)))?;

    let mut chunks = Vec::with_capacity(rows.len());
    let mut vectors = Vec::with_capacity(rows.len());
    for row in rows {
        let read = || -> std::result::Result<(Chunk, Vec<u8>), sqlx::Error> {
            let page: Option<i64> = row.try_get("page")?;
            let chunk = Chunk {
                source: row.try_get("source")?,
                page: page.map(|p| p as u32),
                seq: row.try_get::<i64, _>("seq")? as usize,
                start_char: row.try_get::<i64, _>("start_char")? as usize,
                char_len: row.try_get::<i64, _>("char_len")? as usize,
                text: row.try_get("text")?,
                hash: row.try_get("hash")?,
            };
            let blob: Vec<u8> = row.try_get("vector")?;
            Ok((chunk, blob))
        };
        let (chunk, blob) = read().map_err(|e| corrupt(e.to_string()))?;
        let vector = blob_to_vec(&blob)
            .filter(|v| v.len() == meta.dims)
            .ok_or_else(|| corrupt(format!("bad vector blob of {} bytes", blob.len())))?;
        chunks.push(chunk);
        vectors.push(vector);
    }

    let sources = read_sources(pool, path).await?;
    VectorIndex::build(meta, chunks, vectors)
        .map(|index| index.with_source_digests(sources))
        .map_err(|e| corrupt(format!("inconsistent artifact: {}", e)))
}

async fn read_sources(pool: &SqlitePool, path: &Path) -> Result<BTreeMap<String, String>> {
    let rows = sqlx::query("SELECT source, digest FROM sources")
        .fetch_all(pool)
        .await
        .map_err(|e| IndexError::not_found(path, format!("unreadable sources: {}", e)))?;

    let mut sources = BTreeMap::new();
    for row in rows {
        let source: String = row
            .try_get("source")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        let digest: String = row
            .try_get("digest")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        sources.insert(source, digest);
    }
    Ok(sources)
}

async fn read_info(pool: &SqlitePool, path: &Path) -> Result<ArtifactInfo> {
    let meta = read_meta(pool, path).await?;
    let rows = sqlx::query("SELECT source, COUNT(*) AS n FROM chunks GROUP BY source ORDER BY source")
        .fetch_all(pool)
        .await
        .map_err(|e| IndexError::not_found(path, e.to_string()))?;

    let mut by_source = BTreeMap::new();
    for row in rows {
        let source: String = row
            .try_get("source")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| IndexError::not_found(path, e.to_string()))?;
        by_source.insert(source, n as usize);
    }
    let digests = read_sources(pool, path).await?;
    let bytes = tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(ArtifactInfo {
        path: path.to_path_buf(),
        meta,
        chunks: by_source.values().sum(),
        by_source,
        digests,
        bytes,
    })
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    let denom = a_norm * b_norm;
    if denom < f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, seq: usize, text: &str) -> Chunk {
        Chunk {
            source: source.to_string(),
            page: if source.ends_with(".pdf") { Some(seq as u32 + 1) } else { None },
            seq,
            start_char: seq * 10,
            char_len: text.chars().count(),
            text: text.to_string(),
            hash: crate::hasher::digest_text(text),
        }
    }

    fn meta(dims: usize) -> IndexMeta {
        IndexMeta::new("test-model", dims, ChunkingConfig::default())
    }

    fn sample() -> VectorIndex {
        VectorIndex::build(
            meta(3),
            vec![
                chunk("a.txt", 0, "alpha"),
                chunk("a.txt", 1, "beta"),
                chunk("b.pdf", 0, "gamma"),
                chunk("c.md", 0, "delta"),
            ],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.7, 0.7, 0.0],
                vec![-1.0, 0.0, 0.0],
            ],
        )
        .unwrap()
        .with_source_digests(
            [("a.txt", "d-a"), ("b.pdf", "d-b"), ("c.md", "d-c")]
                .into_iter()
                .map(|(s, d)| (s.to_string(), d.to_string()))
                .collect(),
        )
    }

    #[test]
    fn build_rejects_count_mismatch() {
        let err = VectorIndex::build(meta(2), vec![chunk("a", 0, "x")], vec![]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn build_rejects_ragged_vectors() {
        let err = VectorIndex::build(
            meta(2),
            vec![chunk("a", 0, "x"), chunk("a", 1, "y")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn search_orders_by_descending_similarity() {
        let index = sample();
        let hits = index.search(&[1.0, 0.1, 0.0], 3).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "gamma", "beta"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        assert_eq!(hits[0].position, 0);
    }

    #[test]
    fn search_truncates_to_k_and_handles_large_k() {
        let index = sample();
        assert_eq!(index.search(&[0.0, 1.0, 0.0], 1).unwrap().len(), 1);
        assert_eq!(index.search(&[0.0, 1.0, 0.0], 50).unwrap().len(), 4);
        assert!(index.search(&[0.0, 1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn ties_keep_index_order() {
        let index = VectorIndex::build(
            meta(2),
            vec![chunk("x", 0, "first"), chunk("x", 1, "second")],
            vec![vec![1.0, 1.0], vec![2.0, 2.0]],
        )
        .unwrap();
        let hits = index.search(&[1.0, 1.0], 2).unwrap();
        assert_eq!(hits[0].chunk.text, "first");
        assert_eq!(hits[1].chunk.text, "second");
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = VectorIndex::build(meta(3), vec![], vec![]).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 3).unwrap().is_empty());
    }

    #[test]
    fn wrong_query_length_is_dimension_mismatch() {
        let err = sample().search(&[1.0, 0.0], 3).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }

    #[test]
    fn entries_by_source_groups_chunks() {
        let index = sample();
        let grouped = index.entries_by_source();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped["a.txt"].len(), 2);
        assert_eq!(grouped["a.txt"][1].1, &[0.0, 1.0, 0.0][..]);
    }

    #[tokio::test]
    async fn save_then_load_reproduces_search() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        let index = sample();
        index.save(&path).await.unwrap();
        assert!(!tmp_path(&path).exists());

        let loaded = VectorIndex::load(&path, 3).await.unwrap();
        assert_eq!(loaded.meta(), index.meta());
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(loaded.source_digests(), index.source_digests());
        assert_eq!(loaded.source_digest("b.pdf"), Some("d-b"));
        for query in [[1.0, 0.1, 0.0], [0.3, -0.2, 0.9], [-1.0, 0.5, 0.5]] {
            assert_eq!(
                loaded.search(&query, 4).unwrap(),
                index.search(&query, 4).unwrap()
            );
        }
    }

    #[tokio::test]
    async fn save_replaces_existing_artifact() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        sample().save(&path).await.unwrap();

        let smaller =
            VectorIndex::build(meta(3), vec![chunk("z", 0, "zeta")], vec![vec![0.0, 0.0, 1.0]])
                .unwrap();
        smaller.save(&path).await.unwrap();
        let loaded = VectorIndex::load(&path, 3).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.source_digests().is_empty());
        assert_eq!(loaded.chunks()[0].text, "zeta");
    }

    #[tokio::test]
    async fn missing_artifact_is_index_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = VectorIndex::load(&tmp.path().join("index.sqlite"), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn corrupt_artifact_is_index_not_found() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        std::fs::write(&path, b"definitely not a sqlite database, just some bytes").unwrap();
        let err = VectorIndex::load(&path, 3).await.unwrap_err();
        assert!(matches!(err, IndexError::IndexNotFound { .. }));
    }

    #[tokio::test]
    async fn other_dimension_is_dimension_mismatch() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        sample().save(&path).await.unwrap();
        let err = VectorIndex::load(&path, 8).await.unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 8,
                found: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn inspect_reports_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        sample().save(&path).await.unwrap();
        let info = VectorIndex::inspect(&path).await.unwrap();
        assert_eq!(info.chunks, 4);
        assert_eq!(info.by_source.len(), 3);
        assert_eq!(info.by_source["a.txt"], 2);
        assert_eq!(info.digests["c.md"], "d-c");
        assert_eq!(info.meta.model, "test-model");
        assert!(info.bytes > 0);
    }

    #[tokio::test]
    async fn delete_artifact_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("index.sqlite");
        sample().save(&path).await.unwrap();
        delete_artifact(&path).await.unwrap();
        delete_artifact(&path).await.unwrap();
        assert!(!path.exists());
    }
}
