use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::backend::ForecastBackend;
use crate::pipeline::SurgeLayerService;
use crate::types::AppState;
use crate::viewport::ViewportHandle;

pub fn spawn_background_workers(state: AppState) {
    let layers = state.layers.clone();
    let viewport = state.viewport.clone();
    tokio::spawn(async move {
        filter_loop(layers, viewport).await;
    });

    let layers = state.layers.clone();
    let viewport = state.viewport.clone();
    let interval = state.cfg.forecast_ttl.max(Duration::from_secs(1));
    tokio::spawn(async move {
        periodic_loop(layers, viewport, interval).await;
    });
}

/// Reloads whenever the service type filter changes; viewport moves alone do not.
async fn filter_loop<B>(layers: Arc<SurgeLayerService<B>>, viewport: ViewportHandle)
where
    B: ForecastBackend + 'static,
{
    let mut filters = viewport.subscribe();
    let mut last_service_type = None;
    loop {
        let service_type = filters.borrow_and_update().service_type;
        if last_service_type != Some(service_type) {
            last_service_type = Some(service_type);
            spawn_refresh(layers.clone(), viewport.clone(), service_type, Refresh::Cached);
        }
        if filters.changed().await.is_err() {
            warn!("Filter channel closed; stopping filter refresh loop");
            break;
        }
    }
}

/// Refetches forecasts for the current filter every `interval`, bypassing the forecast cache.
async fn periodic_loop<B>(
    layers: Arc<SurgeLayerService<B>>,
    viewport: ViewportHandle,
    interval: Duration,
) where
    B: ForecastBackend + 'static,
{
    loop {
        sleep(interval).await;
        let service_type = viewport.current().service_type;
        spawn_refresh(layers.clone(), viewport.clone(), service_type, Refresh::Forced);
    }
}

#[derive(Clone, Copy, Debug)]
enum Refresh {
    Cached,
    Forced,
}

fn spawn_refresh<B>(
    layers: Arc<SurgeLayerService<B>>,
    viewport: ViewportHandle,
    service_type: i64,
    refresh: Refresh,
) where
    B: ForecastBackend + 'static,
{
    tokio::spawn(async move {
        let result = match refresh {
            Refresh::Cached => layers.load(service_type).await,
            Refresh::Forced => layers.reload(service_type).await,
        };
        match result {
            Ok(layer) => {
                let generation = layer.generation;
                let current = viewport.current().service_type;
                if layers.commit(layer, current).await {
                    info!("Committed layer generation {generation} for service type {service_type}");
                }
            }
            Err(error) => warn!("Layer refresh for service type {service_type} failed: {error}"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{BatchPlan, DispatchStrategy};
    use crate::pipeline::LayerSettings;
    use crate::testing::{directory, ids, MockBackend};
    use crate::types::Viewport;
    use crate::viewport::{spawn_viewport_task, FilterState, ViewportCommand};

    fn service() -> Arc<SurgeLayerService<MockBackend>> {
        let settings = LayerSettings {
            plan: BatchPlan {
                chunk_size: 200,
                strategy: DispatchStrategy::Parallel { max_in_flight: 0 },
            },
            horizons: vec![30],
            directory_ttl: Duration::from_secs(300),
            forecast_ttl: Duration::from_secs(120),
        };
        Arc::new(SurgeLayerService::new(
            MockBackend::with_directory(directory(&ids(20), 1)),
            settings,
        ))
    }

    async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if done() {
                return true;
            }
            sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn service_type_change_reloads_but_viewport_move_does_not() {
        let layers = service();
        let viewport = spawn_viewport_task(FilterState::initial(1, 1));
        tokio::spawn(filter_loop(layers.clone(), viewport.clone()));

        assert!(wait_until(|| layers.backend().bulk_calls() == 1).await);
        assert_eq!(layers.stats().cycles, 1);

        viewport
            .send(ViewportCommand::SetViewport {
                viewport: Viewport { longitude: 51.4, latitude: 35.7, zoom: 13.0 },
            })
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(layers.stats().cycles, 1);

        viewport
            .send(ViewportCommand::SetServiceType { service_type: 2 })
            .await
            .unwrap();
        assert!(wait_until(|| layers.backend().bulk_calls() == 2).await);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(layers.stats().cycles, 2);
        assert_eq!(layers.latest().await.map(|layer| layer.service_type), Some(2));
    }

    #[tokio::test]
    async fn periodic_refresh_refetches_within_cache_window() {
        let layers = service();
        let viewport = spawn_viewport_task(FilterState::initial(1, 1));
        layers.load(1).await.unwrap();
        assert_eq!(layers.backend().bulk_calls(), 1);

        tokio::spawn(periodic_loop(
            layers.clone(),
            viewport,
            Duration::from_millis(20),
        ));

        assert!(wait_until(|| layers.backend().bulk_calls() >= 3).await);
        assert_eq!(layers.backend().directory_calls(), 1);
    }
}
