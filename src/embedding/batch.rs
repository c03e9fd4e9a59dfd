//! Sub-batching with bounded concurrency and positional reassembly.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{IndexError, Result};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Most texts sent in one provider call.
    pub max_batch_size: usize,
    /// Sub-batches in flight at once.
    pub concurrency: usize,
    /// Applied to each provider call, including the provider's own retries.
    pub timeout: Duration,
}

impl BatchOptions {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            timeout: super::retry_budget(config),
        }
    }
}

/// Embed `texts`, returning one vector per text in input order.
///
/// Inputs longer than `max_batch_size` are split into sub-batches that may
/// complete in any order; results are placed back by sub-batch position.
/// Any failed, timed-out or malformed sub-batch aborts the whole pass and
/// nothing is returned. `on_progress(done, total)` fires as sub-batches land.
pub async fn embed_all<F>(
    provider: &Arc<dyn EmbeddingProvider>,
    texts: &[String],
    options: &BatchOptions,
    mut on_progress: F,
) -> Result<Vec<Vec<f32>>>
where
    F: FnMut(usize, usize),
{
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let dims = provider.dims();
    let total = texts.len();
    let batches: Vec<Vec<String>> = texts
        .chunks(options.max_batch_size.max(1))
        .map(<[String]>::to_vec)
        .collect();
    let n_batches = batches.len();
    debug!(texts = total, batches = n_batches, "embedding");

    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (position, batch) in batches.into_iter().enumerate() {
        let provider = provider.clone();
        let semaphore = semaphore.clone();
        let timeout = options.timeout;
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = tokio::time::timeout(timeout, provider.embed_batch(&batch)).await;
            (position, batch.len(), outcome)
        });
    }

    let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; n_batches];
    let mut done = 0usize;
    while let Some(joined) = tasks.join_next().await {
        let (position, expected, outcome) = match joined {
            Ok(result) => result,
            Err(e) => {
                tasks.abort_all();
                return Err(IndexError::EmbeddingProvider(format!(
                    "embedding task failed: {}",
                    e
                )));
            }
        };

        let vectors = match outcome {
            Err(_) => {
                tasks.abort_all();
                return Err(IndexError::Timeout {
                    operation: "embedding batch",
                    after: options.timeout,
                });
            }
            Ok(Err(e)) => {
                tasks.abort_all();
                return Err(IndexError::EmbeddingProvider(format!("{:#}", e)));
            }
            Ok(Ok(vectors)) => vectors,
        };

        if vectors.len() != expected {
            tasks.abort_all();
            return Err(IndexError::EmbeddingProvider(format!(
                "provider returned {} vectors for {} inputs",
                vectors.len(),
                expected
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            tasks.abort_all();
            return Err(IndexError::DimensionMismatch {
                context: "embedding vector length",
                expected: dims,
                found: bad.len(),
            });
        }

        done += expected;
        on_progress(done, total);
        slots[position] = Some(vectors);
    }

    Ok(slots.into_iter().flatten().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Encodes each text's trailing number as a one-hot-ish vector and sleeps
    /// longer for earlier batches so they finish last.
    struct SentinelProvider {
        calls: AtomicUsize,
        max_seen: AtomicUsize,
        in_flight: AtomicUsize,
    }

    impl SentinelProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for SentinelProvider {
        fn model_name(&self) -> &str {
            "sentinel"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);

            let first: u64 = texts[0].trim_start_matches("sentinel-").parse()?;
            tokio::time::sleep(Duration::from_millis(40u64.saturating_sub(first))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            texts
                .iter()
                .map(|t| -> anyhow::Result<Vec<f32>> {
                    let n: f32 = t.trim_start_matches("sentinel-").parse()?;
                    Ok(vec![n, 1.0])
                })
                .collect()
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t == "poison") {
                anyhow::bail!("upstream 500");
            }
            Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn options(max_batch_size: usize, concurrency: usize) -> BatchOptions {
        BatchOptions {
            max_batch_size,
            concurrency,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn preserves_input_order_across_out_of_order_batches() {
        let stub = Arc::new(SentinelProvider::new());
        let provider: Arc<dyn EmbeddingProvider> = stub.clone();
        let texts: Vec<String> = (0..23).map(|i| format!("sentinel-{}", i)).collect();

        let mut progress = Vec::new();
        let vectors = embed_all(&provider, &texts, &options(4, 3), |done, total| {
            progress.push((done, total))
        })
        .await
        .unwrap();

        assert_eq!(vectors.len(), 23);
        for (i, v) in vectors.iter().enumerate() {
            assert_eq!(v[0], i as f32);
        }
        assert_eq!(stub.calls.load(Ordering::SeqCst), 6);
        assert!(stub.max_seen.load(Ordering::SeqCst) <= 3);
        assert_eq!(progress.last(), Some(&(23, 23)));
    }

    #[tokio::test]
    async fn one_failed_batch_aborts_everything() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(FailingProvider);
        let mut texts: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        texts[7] = "poison".to_string();

        let err = embed_all(&provider, &texts, &options(3, 2), |_, _| {})
            .await
            .unwrap_err();
        match err {
            IndexError::EmbeddingProvider(msg) => assert!(msg.contains("upstream 500")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_vector_length_is_dimension_mismatch() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(ShortProvider);
        let err = embed_all(&provider, &["a".to_string()], &options(10, 1), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 3,
                found: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn slow_batch_times_out() {
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(SentinelProvider::new());
        let opts = BatchOptions {
            max_batch_size: 10,
            concurrency: 1,
            timeout: Duration::from_millis(5),
        };
        let err = embed_all(&provider, &["sentinel-0".to_string()], &opts, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Timeout { .. }));
    }

    #[tokio::test]
    async fn empty_input_makes_no_calls() {
        let stub = Arc::new(SentinelProvider::new());
        let provider: Arc<dyn EmbeddingProvider> = stub.clone();
        let vectors = embed_all(&provider, &[], &options(4, 2), |_, _| {})
            .await
            .unwrap();
        assert!(vectors.is_empty());
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }
}
