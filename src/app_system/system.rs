use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{AppContext, BackendKind, Config};
use crate::backend::hosted::{realtime::feed_url, HostedAuth, HostedClient, RealtimeBridge, RestOrderStore};
use crate::backend::{spawn_session_refresher, AuthApi, OrderStore, REFRESH_LEAD};
use crate::backend::memory::{seed_demo_orders, spawn_demo_feed, MemoryAuth, MemoryOrderStore};
use crate::realtime::RealtimeHub;
use crate::router::{Navigator, Route};
use crate::session_store::SessionStore;
use crate::toast::Toaster;

/// The running application: shared context plus its background tasks.
///
/// Responsible for wiring the selected backend, starting feeds, and shutdown.
pub struct OrderDeskSystem {
    pub ctx: AppContext,
    /// Tasks that own a receiver and stop once every client is dropped.
    actors: Vec<tokio::task::JoinHandle<()>>,
    /// Endless feeds that are aborted on shutdown.
    feeds: Vec<tokio::task::JoinHandle<()>>,
}

impl OrderDeskSystem {
    pub async fn start(config: &Config, start: Route) -> Result<Self, String> {
        config.validate().map_err(|e| e.to_string())?;

        let session = SessionStore::new();
        let realtime = RealtimeHub::new();
        let toaster = Toaster::new();
        let navigator = Navigator::new(start);

        let mut actors = Vec::new();
        let mut feeds = Vec::new();

        let (auth, orders): (Arc<dyn AuthApi>, Arc<dyn OrderStore>) =
            match config.backend.kind {
                BackendKind::Memory => {
                    info!("Starting in-memory backend");
                    let (store, handle) = MemoryOrderStore::spawn(realtime.clone());
                    actors.push(handle);

                    if config.memory.seed_demo_orders {
                        seed_demo_orders(&store).await.map_err(|e| e.to_string())?;
                    }
                    if let Some(secs) = config.memory.demo_feed_secs {
                        info!(interval_secs = secs, "Demo order feed enabled");
                        feeds.push(spawn_demo_feed(store.clone(), Duration::from_secs(secs.max(1))));
                    }

                    (Arc::new(MemoryAuth::new(config.memory.staff.clone())), Arc::new(store))
                }
                BackendKind::Hosted => {
                    info!(url = %config.backend.url, "Starting hosted backend");
                    let client = HostedClient::new(
                        &config.backend.url,
                        &config.backend.anon_key,
                        Duration::from_secs(config.backend.timeout_secs),
                        session.clone(),
                    )
                    .map_err(|e| format!("Failed to build HTTP client: {}", e))?;

                    let url = config
                        .backend
                        .realtime_url
                        .clone()
                        .unwrap_or_else(|| feed_url(&config.backend.url, &config.backend.anon_key));
                    let bridge = RealtimeBridge::new(url, config.backend.anon_key.clone(), session.clone(), realtime.clone());
                    feeds.push(bridge.spawn());

                    // Hosted sessions expire; memory ones never do.
                    let auth: Arc<dyn AuthApi> = Arc::new(HostedAuth::new(client.clone()));
                    feeds.push(spawn_session_refresher(auth.clone(), session.clone(), REFRESH_LEAD));

                    (auth, Arc::new(RestOrderStore::new(client)))
                }
            };

        let ctx = AppContext {
            session,
            auth,
            orders,
            realtime,
            toaster,
            navigator,
        };

        Ok(Self { ctx, actors, feeds })
    }

    pub async fn shutdown(self) -> Result<(), String> {
        info!("Shutting down system...");

        for feed in &self.feeds {
            feed.abort();
        }
        for feed in self.feeds {
            if let Err(e) = feed.await {
                if !e.is_cancelled() {
                    error!("Feed task failed: {:?}", e);
                }
            }
        }

        // Dropping the context closes the store channels; actors then exit.
        drop(self.ctx);

        for handle in self.actors {
            match tokio::time::timeout(Duration::from_secs(2), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Actor task failed: {:?}", e);
                    return Err(format!("Actor task failed: {:?}", e));
                }
                Err(_) => warn!("Actor still referenced at shutdown; leaving it to the runtime"),
            }
        }

        info!("System shutdown complete.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OrderQuery;

    #[tokio::test]
    async fn test_memory_system_starts_seeded_and_shuts_down() {
        let mut config = Config::for_test();
        config.memory.seed_demo_orders = true;

        let system = OrderDeskSystem::start(&config, Route::Login).await.unwrap();
        let pending = system.ctx.orders.fetch_orders(&OrderQuery::for_filter(None)).await.unwrap();
        assert!(!pending.is_empty());
        assert_eq!(system.ctx.navigator.current(), Route::Login);

        system.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_refuses_to_start() {
        let mut config = Config::for_test();
        config.backend.kind = BackendKind::Hosted;
        assert!(OrderDeskSystem::start(&config, Route::Login).await.is_err());
    }
}
