//! Dashboard Module
//!
//! HTTP/WebSocket surface for real-time monitoring of the signal engine.

mod api;
mod types;
mod websocket;

pub use api::{create_router, start_server};
pub use types::*;
pub use websocket::{BroadcastReport, Broadcaster, SubscriberId, Subscription};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::engine::{EngineObserver, HealthSnapshot};
use crate::strategy::BiasStats;

/// In-memory state for the dashboard API
#[derive(Debug, Default)]
pub struct DashboardMemory {
    /// Most recent market update
    pub latest_update: RwLock<Option<MarketUpdate>>,
    /// Engine health after the last cycle
    pub health: RwLock<HealthSnapshot>,
    /// Per-symbol win/loss statistics
    pub stats: RwLock<Vec<BiasStats>>,
}

impl DashboardMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_state(&self) -> Option<MarketUpdate> {
        self.latest_update.read().await.clone()
    }

    pub async fn get_health(&self) -> HealthSnapshot {
        self.health.read().await.clone()
    }

    pub async fn get_stats(&self) -> Vec<BiasStats> {
        self.stats.read().await.clone()
    }
}

#[async_trait]
impl EngineObserver for DashboardMemory {
    async fn on_update(&self, update: &MarketUpdate) {
        *self.latest_update.write().await = Some(update.clone());
    }

    async fn on_health(&self, health: &HealthSnapshot) {
        *self.health.write().await = health.clone();
    }

    async fn on_stats(&self, stats: &[BiasStats]) {
        *self.stats.write().await = stats.to_vec();
    }
}
