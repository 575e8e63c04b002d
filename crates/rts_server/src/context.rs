//! Shared server state handed to every connection and match task.

use std::sync::Arc;
use std::time::Duration;

use rts_core::data::ContentTables;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::lobby::SessionId;
use crate::match_loop::{run_match, MatchLaunch, Outbound};
use crate::protocol::ClientFrame;
use crate::registry::Registry;

/// The registry behind a lock, plus what match tasks need to start.
#[derive(Debug)]
pub struct ServerContext {
    registry: Mutex<Registry>,
    tick_period: Duration,
}

impl ServerContext {
    /// Fresh context.
    #[must_use]
    pub fn new(content: Arc<ContentTables>, config: ServerConfig) -> Self {
        let tick_period = config.tick_period();
        Self {
            registry: Mutex::new(Registry::new(content, config)),
            tick_period,
        }
    }

    /// Register a connection.
    pub async fn connect(&self, outbound: Outbound) -> SessionId {
        self.registry.lock().await.connect(outbound)
    }

    /// Handle a client frame, spawning a match task if it started one.
    pub async fn handle(self: &Arc<Self>, session: SessionId, frame: ClientFrame) {
        let launch = self.registry.lock().await.handle(session, &frame);
        if let Some(launch) = launch {
            self.spawn_match(launch);
        }
    }

    /// A connection closed.
    pub async fn disconnect(&self, session: SessionId) {
        self.registry.lock().await.disconnect(session);
    }

    /// A match task ended.
    pub async fn finish_match(&self, match_id: u64) {
        self.registry.lock().await.finish_match(match_id);
    }

    fn spawn_match(self: &Arc<Self>, launch: MatchLaunch) {
        tokio::spawn(run_match(launch, self.tick_period, Arc::clone(self)));
    }
}
