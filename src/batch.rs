use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::backend::ForecastBackend;
use crate::error::{PipelineError, PipelineResult};
use crate::normalize::Normalized;
use crate::types::{BulkForecastRequest, ForecastResult, HexagonId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchStrategy {
    /// All chunks in flight together, optionally capped; 0 means no cap.
    Parallel { max_in_flight: usize },
    /// One chunk at a time, in order.
    Sequential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchPlan {
    pub chunk_size: usize,
    pub strategy: DispatchStrategy,
}

#[derive(Debug, Default, Clone)]
pub struct BatchOutcome {
    pub forecasts: Vec<ForecastResult>,
    pub failures: Vec<PipelineError>,
    pub total_chunks: usize,
    pub skipped_items: usize,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_chunks(&self) -> usize {
        self.failures.len()
    }
}

pub fn partition(ids: &[HexagonId], chunk_size: usize) -> Vec<&[HexagonId]> {
    ids.chunks(chunk_size.max(1)).collect()
}

/// Fetches forecasts for `ids` chunk by chunk.
///
/// A failing chunk is recorded in `failures` and its ids simply contribute
/// nothing; sibling chunks are unaffected. Record order is not meaningful.
pub async fn get_forecasts<B: ForecastBackend>(
    backend: &B,
    ids: &[HexagonId],
    service_type: i64,
    horizons: &[i64],
    plan: BatchPlan,
) -> BatchOutcome {
    let chunks = partition(ids, plan.chunk_size);
    let total_chunks = chunks.len();
    if total_chunks == 0 {
        return BatchOutcome::default();
    }

    info!(
        "Fetching forecasts for {} hexagons in {total_chunks} chunks ({:?})",
        ids.len(),
        plan.strategy
    );

    // Each request owns its ids so the dispatch future stays `Send`.
    let requests: Vec<_> = chunks
        .into_iter()
        .map(<[_]>::to_vec)
        .enumerate()
        .map(|(index, hexagons)| {
            let request = BulkForecastRequest {
                hexagons,
                service_type,
                horizons: horizons.to_vec(),
            };
            fetch_chunk(backend, index, request)
        })
        .collect();

    let results: Vec<(usize, usize, PipelineResult<Normalized>)> = match plan.strategy {
        DispatchStrategy::Parallel { max_in_flight } => {
            let limit = if max_in_flight == 0 {
                total_chunks
            } else {
                max_in_flight
            };
            stream::iter(requests).buffer_unordered(limit).collect().await
        }
        DispatchStrategy::Sequential => {
            let mut results = Vec::with_capacity(total_chunks);
            for request in requests {
                results.push(request.await);
            }
            results
        }
    };

    let mut outcome = BatchOutcome {
        total_chunks,
        ..BatchOutcome::default()
    };
    for (index, size, result) in results {
        match result {
            Ok(normalized) => {
                outcome.skipped_items += normalized.skipped;
                outcome.forecasts.extend(normalized.records);
            }
            Err(error) => {
                warn!(
                    "Forecast chunk {}/{total_chunks} ({size} hexagons) failed: {error}",
                    index + 1
                );
                outcome.failures.push(PipelineError::ChunkFetchFailure {
                    index,
                    size,
                    message: error.to_string(),
                });
            }
        }
    }

    if outcome.is_complete() {
        info!("Received {} forecasts", outcome.forecasts.len());
    } else {
        warn!(
            "Partial forecast result: {} of {total_chunks} chunks failed, {} forecasts kept",
            outcome.failed_chunks(),
            outcome.forecasts.len()
        );
    }
    outcome
}

async fn fetch_chunk<B: ForecastBackend>(
    backend: &B,
    index: usize,
    request: BulkForecastRequest,
) -> (usize, usize, PipelineResult<Normalized>) {
    let size = request.hexagons.len();
    debug!("Dispatching forecast chunk {index} with {size} hexagons");
    let result = backend.fetch_bulk_forecast(request).await;
    (index, size, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ids, MockBackend};

    const PARALLEL: BatchPlan = BatchPlan {
        chunk_size: 200,
        strategy: DispatchStrategy::Parallel { max_in_flight: 0 },
    };

    #[test]
    fn partitions_into_bounded_chunks() {
        let all = ids(1050);
        let chunks = partition(&all, 200);
        assert_eq!(chunks.len(), 6);
        assert!(chunks[..5].iter().all(|chunk| chunk.len() == 200));
        assert_eq!(chunks[5].len(), 50);
        assert!(partition(&[], 200).is_empty());
    }

    #[tokio::test]
    async fn failed_chunk_is_excluded_but_siblings_survive() {
        let all = ids(1050);
        // First id of the third chunk.
        let backend = MockBackend::default().failing_on(all[400].clone());

        let outcome = get_forecasts(&backend, &all, 1, &[30], PARALLEL).await;

        assert_eq!(outcome.total_chunks, 6);
        assert_eq!(outcome.failed_chunks(), 1);
        assert!(!outcome.is_complete());
        assert_eq!(outcome.forecasts.len(), 850);
        match &outcome.failures[0] {
            PipelineError::ChunkFetchFailure { index, size, .. } => {
                assert_eq!(*index, 2);
                assert_eq!(*size, 200);
            }
            other => panic!("unexpected failure {other:?}"),
        }
        let kept: std::collections::HashSet<_> =
            outcome.forecasts.iter().map(|record| record.hexagon.clone()).collect();
        assert!(kept.contains(&all[0]));
        assert!(kept.contains(&all[399]));
        assert!(!kept.contains(&all[400]));
        assert!(!kept.contains(&all[599]));
        assert!(kept.contains(&all[600]));
        assert!(kept.contains(&all[1049]));
    }

    #[tokio::test]
    async fn sequential_dispatch_runs_one_chunk_at_a_time_in_order() {
        let all = ids(450);
        let backend = MockBackend::default();
        let plan = BatchPlan {
            chunk_size: 200,
            strategy: DispatchStrategy::Sequential,
        };

        let outcome = get_forecasts(&backend, &all, 1, &[30], plan).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.forecasts.len(), 450);
        assert_eq!(backend.max_in_flight(), 1);
        assert_eq!(backend.chunk_sizes(), vec![200, 200, 50]);
    }

    #[tokio::test]
    async fn sequential_dispatch_isolates_failed_chunk() {
        let all = ids(450);
        let backend = MockBackend::default().failing_on(all[250].clone());
        let plan = BatchPlan {
            chunk_size: 200,
            strategy: DispatchStrategy::Sequential,
        };

        let outcome = get_forecasts(&backend, &all, 1, &[30], plan).await;

        assert_eq!(outcome.total_chunks, 3);
        assert_eq!(outcome.failed_chunks(), 1);
        assert_eq!(outcome.forecasts.len(), 250);
        assert_eq!(backend.chunk_sizes(), vec![200, 200, 50]);
        assert!(matches!(
            outcome.failures[0],
            PipelineError::ChunkFetchFailure { index: 1, size: 200, .. }
        ));
    }

    #[tokio::test]
    async fn parallel_dispatch_overlaps_requests() {
        let all = ids(1050);
        let backend = MockBackend::default();

        let outcome = get_forecasts(&backend, &all, 1, &[30], PARALLEL).await;

        assert!(outcome.is_complete());
        assert_eq!(outcome.forecasts.len(), 1050);
        assert!(backend.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn parallel_dispatch_respects_in_flight_cap() {
        let all = ids(1050);
        let backend = MockBackend::default();
        let plan = BatchPlan {
            chunk_size: 100,
            strategy: DispatchStrategy::Parallel { max_in_flight: 2 },
        };

        let outcome = get_forecasts(&backend, &all, 1, &[30], plan).await;

        assert_eq!(outcome.total_chunks, 11);
        assert_eq!(outcome.forecasts.len(), 1050);
        assert!(backend.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn empty_id_list_issues_no_requests() {
        let backend = MockBackend::default();
        let outcome = get_forecasts(&backend, &[], 1, &[30], PARALLEL).await;
        assert_eq!(outcome.total_chunks, 0);
        assert_eq!(backend.bulk_calls(), 0);
    }
}
