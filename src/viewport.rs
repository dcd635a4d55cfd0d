use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::constants::{find_city, find_service_type, City, CITIES, DEFAULT_CITY_ID};
use crate::types::Viewport;

const COMMAND_BUFFER: usize = 64;

/// Filters and map viewport shared by the query cycle and the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FilterState {
    pub service_type: i64,
    pub city_id: u32,
    pub viewport: Viewport,
    /// Bumped on every accepted command.
    pub revision: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewportCommand {
    SetServiceType { service_type: i64 },
    SelectCity { city_id: u32 },
    SetViewport { viewport: Viewport },
}

impl FilterState {
    pub fn initial(city_id: u32, service_type: i64) -> Self {
        let city = find_city(city_id)
            .or_else(|| find_city(DEFAULT_CITY_ID))
            .unwrap_or(&CITIES[0]);
        Self {
            service_type,
            city_id: city.id,
            viewport: city_viewport(city),
            revision: 0,
        }
    }

    /// Returns the next state, or `None` when the command is rejected.
    pub fn apply(&self, command: ViewportCommand) -> Option<Self> {
        let mut next = *self;
        match command {
            ViewportCommand::SetServiceType { service_type } => {
                if service_type != 0 && find_service_type(service_type).is_none() {
                    return None;
                }
                next.service_type = service_type;
            }
            ViewportCommand::SelectCity { city_id } => {
                let city = find_city(city_id)?;
                next.city_id = city.id;
                next.viewport = city_viewport(city);
            }
            ViewportCommand::SetViewport { viewport } => {
                let finite = viewport.longitude.is_finite()
                    && viewport.latitude.is_finite()
                    && viewport.zoom.is_finite();
                if !finite {
                    return None;
                }
                next.viewport = viewport;
            }
        }
        next.revision = self.revision + 1;
        Some(next)
    }
}

fn city_viewport(city: &City) -> Viewport {
    Viewport {
        longitude: city.longitude,
        latitude: city.latitude,
        zoom: city.zoom,
    }
}

type Envelope = (ViewportCommand, oneshot::Sender<Option<FilterState>>);

/// Cheap handle onto the single task that owns the filter state.
#[derive(Clone)]
pub struct ViewportHandle {
    commands: mpsc::Sender<Envelope>,
    state: watch::Receiver<FilterState>,
}

impl ViewportHandle {
    pub fn current(&self) -> FilterState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<FilterState> {
        self.state.clone()
    }

    /// Sends a command and waits for the owner to apply it.
    ///
    /// `Ok(None)` means the command was rejected and the state is unchanged.
    pub async fn send(&self, command: ViewportCommand) -> Result<Option<FilterState>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| anyhow!("Viewport task is not running"))?;
        reply_rx
            .await
            .map_err(|_| anyhow!("Viewport task dropped the reply"))
    }
}

pub fn spawn_viewport_task(initial: FilterState) -> ViewportHandle {
    let (commands, mut inbox) = mpsc::channel::<Envelope>(COMMAND_BUFFER);
    let (publisher, state) = watch::channel(initial);

    tokio::spawn(async move {
        while let Some((command, reply)) = inbox.recv().await {
            let current = *publisher.borrow();
            let outcome = current.apply(command);
            match outcome {
                Some(next) => {
                    debug!("Viewport command {command:?} -> revision {}", next.revision);
                    publisher.send_replace(next);
                }
                None => warn!("Ignoring viewport command {command:?}"),
            }
            let _ = reply.send(outcome);
        }
    });

    ViewportHandle { commands, state }
}
