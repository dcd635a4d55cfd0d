use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::backend::ForecastBackend;
use crate::batch::{get_forecasts, BatchPlan};
use crate::error::{PipelineError, PipelineResult};
use crate::merge::merge;
use crate::types::{ForecastResult, HexagonId, HexagonInfo, HexagonWithForecast};
use crate::utils::now_ms;

/// One finished query cycle: the merged dataset for a service type.
#[derive(Clone, Debug)]
pub struct SurgeLayer {
    pub service_type: i64,
    pub generation: u64,
    pub hexagons: Vec<HexagonWithForecast>,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub fetched_at_ms: i64,
}

impl SurgeLayer {
    pub fn is_complete(&self) -> bool {
        self.failed_chunks == 0
    }
}

#[derive(Default)]
pub struct PipelineStats {
    cycles: AtomicU64,
    skipped_items: AtomicU64,
    skipped_directory_entries: AtomicU64,
    invalid_identifiers: AtomicU64,
    failed_chunks: AtomicU64,
    stale_discards: AtomicU64,
    cache_hits: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub skipped_items: u64,
    pub skipped_directory_entries: u64,
    pub invalid_identifiers: u64,
    pub failed_chunks: u64,
    pub stale_discards: u64,
    pub cache_hits: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            skipped_items: self.skipped_items.load(Ordering::Relaxed),
            skipped_directory_entries: self.skipped_directory_entries.load(Ordering::Relaxed),
            invalid_identifiers: self.invalid_identifiers.load(Ordering::Relaxed),
            failed_chunks: self.failed_chunks.load(Ordering::Relaxed),
            stale_discards: self.stale_discards.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicU64, amount: usize) {
        counter.fetch_add(amount as u64, Ordering::Relaxed);
    }
}

struct Cached<T> {
    value: Arc<T>,
    stored_at: Instant,
}

impl<T> Cached<T> {
    fn new(value: Arc<T>) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
        }
    }

    fn fresh(&self, ttl: Duration) -> Option<Arc<T>> {
        (self.stored_at.elapsed() < ttl).then(|| self.value.clone())
    }
}

#[derive(Clone, Debug)]
pub struct LayerSettings {
    pub plan: BatchPlan,
    pub horizons: Vec<i64>,
    pub directory_ttl: Duration,
    pub forecast_ttl: Duration,
}

type ForecastKey = (i64, usize);

#[derive(Clone, Copy, Debug)]
enum ForecastSource {
    Cached,
    Backend,
}

pub struct SurgeLayerService<B> {
    backend: B,
    settings: LayerSettings,
    directory_cache: Mutex<HashMap<i64, Cached<Vec<HexagonInfo>>>>,
    forecast_cache: Mutex<HashMap<ForecastKey, Cached<Vec<ForecastResult>>>>,
    generation: AtomicU64,
    latest: RwLock<Option<Arc<SurgeLayer>>>,
    stats: PipelineStats,
}

impl<B: ForecastBackend> SurgeLayerService<B> {
    pub fn new(backend: B, settings: LayerSettings) -> Self {
        Self {
            backend,
            settings,
            directory_cache: Mutex::new(HashMap::new()),
            forecast_cache: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            latest: RwLock::new(None),
            stats: PipelineStats::default(),
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settings(&self) -> &LayerSettings {
        &self.settings
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub async fn latest(&self) -> Option<Arc<SurgeLayer>> {
        self.latest.read().await.clone()
    }

    /// Runs one query cycle: directory, then forecasts in chunks, then the merge.
    ///
    /// Only a directory failure is an error. Chunk failures shrink the fetched
    /// set, never the merged one.
    pub async fn load(&self, service_type: i64) -> PipelineResult<SurgeLayer> {
        self.run_cycle(service_type, ForecastSource::Cached).await
    }

    /// Like [`load`](Self::load), but always refetches forecasts and refreshes the cache.
    pub async fn reload(&self, service_type: i64) -> PipelineResult<SurgeLayer> {
        self.run_cycle(service_type, ForecastSource::Backend).await
    }

    async fn run_cycle(
        &self,
        service_type: i64,
        source: ForecastSource,
    ) -> PipelineResult<SurgeLayer> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        PipelineStats::add(&self.stats.cycles, 1);

        let directory = self.directory(service_type).await?;
        if directory.is_empty() {
            info!("Directory for service type {service_type} is empty; skipping forecasts");
            return Ok(SurgeLayer {
                service_type,
                generation,
                hexagons: Vec::new(),
                total_chunks: 0,
                failed_chunks: 0,
                fetched_at_ms: now_ms(),
            });
        }

        let ids = self.fetchable_ids(&directory);
        let (forecasts, total_chunks, failed_chunks) =
            self.forecasts(service_type, directory.len(), &ids, source).await;

        let hexagons = merge(&directory, &forecasts);
        info!(
            "Service type {service_type} generation {generation}: {} hexagons, {} forecasts",
            hexagons.len(),
            forecasts.len()
        );
        Ok(SurgeLayer {
            service_type,
            generation,
            hexagons,
            total_chunks,
            failed_chunks,
            fetched_at_ms: now_ms(),
        })
    }

    /// Stores `layer` unless the filter moved on or a newer cycle already landed.
    pub async fn commit(&self, layer: SurgeLayer, current_service_type: i64) -> bool {
        if layer.service_type != current_service_type {
            PipelineStats::add(&self.stats.stale_discards, 1);
            info!(
                "Discarding layer for service type {} (filter is now {current_service_type})",
                layer.service_type
            );
            return false;
        }

        let mut latest = self.latest.write().await;
        if let Some(existing) = latest.as_ref() {
            if existing.service_type == layer.service_type
                && existing.generation > layer.generation
            {
                PipelineStats::add(&self.stats.stale_discards, 1);
                info!(
                    "Discarding generation {} for service type {}; generation {} already stored",
                    layer.generation, layer.service_type, existing.generation
                );
                return false;
            }
        }
        *latest = Some(Arc::new(layer));
        true
    }

    pub async fn forecast_single(
        &self,
        hexagon: &HexagonId,
        service_type: i64,
    ) -> PipelineResult<Vec<ForecastResult>> {
        hexagon.geometry_form()?;
        self.backend
            .fetch_forecast(hexagon, service_type, &self.settings.horizons)
            .await
    }

    async fn directory(&self, service_type: i64) -> PipelineResult<Arc<Vec<HexagonInfo>>> {
        if let Some(cached) = lock(&self.directory_cache)
            .get(&service_type)
            .and_then(|entry| entry.fresh(self.settings.directory_ttl))
        {
            PipelineStats::add(&self.stats.cache_hits, 1);
            return Ok(cached);
        }

        let payload = self
            .backend
            .fetch_hexagons(service_type)
            .await
            .map_err(|error| PipelineError::DirectoryFetchFailure(error.to_string()))?;
        PipelineStats::add(&self.stats.skipped_directory_entries, payload.skipped);
        let directory = Arc::new(payload.entries);
        lock(&self.directory_cache).insert(service_type, Cached::new(directory.clone()));
        Ok(directory)
    }

    /// Ids that survive the codec; the rest stay in the directory and merge as "no data".
    fn fetchable_ids(&self, directory: &[HexagonInfo]) -> Vec<HexagonId> {
        let mut invalid = 0;
        let ids: Vec<HexagonId> = directory
            .iter()
            .filter(|info| match info.hexagon.geometry_form() {
                Ok(_) => true,
                Err(error) => {
                    warn!("Not requesting forecast: {error}");
                    invalid += 1;
                    false
                }
            })
            .map(|info| info.hexagon.clone())
            .collect();
        PipelineStats::add(&self.stats.invalid_identifiers, invalid);
        ids
    }

    async fn forecasts(
        &self,
        service_type: i64,
        directory_len: usize,
        ids: &[HexagonId],
        source: ForecastSource,
    ) -> (Arc<Vec<ForecastResult>>, usize, usize) {
        let key = (service_type, directory_len);
        let cached = match source {
            ForecastSource::Cached => lock(&self.forecast_cache)
                .get(&key)
                .and_then(|entry| entry.fresh(self.settings.forecast_ttl)),
            ForecastSource::Backend => None,
        };
        if let Some(cached) = cached {
            PipelineStats::add(&self.stats.cache_hits, 1);
            let total_chunks = ids.chunks(self.settings.plan.chunk_size.max(1)).len();
            return (cached, total_chunks, 0);
        }

        let outcome = get_forecasts(
            &self.backend,
            ids,
            service_type,
            &self.settings.horizons,
            self.settings.plan,
        )
        .await;
        PipelineStats::add(&self.stats.skipped_items, outcome.skipped_items);
        PipelineStats::add(&self.stats.failed_chunks, outcome.failed_chunks());

        let complete = outcome.is_complete();
        let total_chunks = outcome.total_chunks;
        let failed_chunks = outcome.failed_chunks();
        let forecasts = Arc::new(outcome.forecasts);
        // Partial results are served but never cached.
        if complete {
            lock(&self.forecast_cache).insert(key, Cached::new(forecasts.clone()));
        }
        (forecasts, total_chunks, failed_chunks)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
