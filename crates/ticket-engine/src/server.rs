//! # Ticket Engine Server
//!
//! [`TicketEngineServer`] wires the repositories, the routing orchestrator,
//! the escalation monitor and the lifecycle handlers together, and owns the
//! background task that sweeps for SLA breaches.
//!
//! ```no_run
//! use fixdesk_ticket_engine::server::TicketEngineServerBuilder;
//! use fixdesk_ticket_engine::config::TicketEngineConfig;
//!
//! # async fn example() -> fixdesk_ticket_engine::Result<()> {
//! let mut server = TicketEngineServerBuilder::new()
//!     .with_config(TicketEngineConfig::default())
//!     .with_database_url("sqlite://tickets.db")
//!     .build()
//!     .await?;
//!
//! server.start().await?;
//! // ... route tickets through server.orchestrator() ...
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::classification::{Classifier, KeywordClassifier};
use crate::clock::{Clock, SystemClock};
use crate::config::TicketEngineConfig;
use crate::database::SqliteStore;
use crate::error::{Result, TicketEngineError};
use crate::escalation::EscalationMonitor;
use crate::lifecycle::TicketLifecycle;
use crate::repository::Repositories;
use crate::routing::RoutingOrchestrator;
use crate::sla::SlaPolicy;

/// Running ticket engine with its background sweep
pub struct TicketEngineServer {
    config: TicketEngineConfig,

    repos: Repositories,

    orchestrator: Arc<RoutingOrchestrator>,

    monitor: Arc<EscalationMonitor>,

    lifecycle: Arc<TicketLifecycle>,

    /// Handle to the sweep loop while it runs
    sweep_handle: Option<JoinHandle<()>>,
}

impl TicketEngineServer {
    pub fn new(
        config: TicketEngineConfig,
        repos: Repositories,
        classifier: Arc<dyn Classifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let orchestrator = Arc::new(RoutingOrchestrator::new(
            repos.clone(),
            classifier,
            &config,
            clock.clone(),
        ));
        let monitor = Arc::new(EscalationMonitor::new(
            repos.clone(),
            SlaPolicy::from_config(&config.sla),
            clock.clone(),
        ));
        let lifecycle = Arc::new(TicketLifecycle::new(repos.clone(), clock));

        Self {
            config,
            repos,
            orchestrator,
            monitor,
            lifecycle,
            sweep_handle: None,
        }
    }

    /// Start the escalation sweep loop
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.escalation.enabled {
            info!("⏸️ Escalation sweep disabled by configuration");
            return Ok(());
        }
        if self.sweep_handle.is_some() {
            warn!("Escalation sweep already running");
            return Ok(());
        }

        let monitor = self.monitor.clone();
        let every = Duration::from_secs(self.config.escalation.sweep_interval_secs.max(1));
        self.sweep_handle = Some(tokio::spawn(async move {
            Self::sweep_loop(monitor, every).await;
        }));

        info!("✅ Escalation sweep started (every {:?})", every);
        Ok(())
    }

    /// Stop the sweep loop
    pub async fn stop(&mut self) -> Result<()> {
        info!("🛑 Stopping ticket engine...");

        if let Some(handle) = self.sweep_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        info!("✅ Ticket engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sweep_handle.is_some()
    }

    pub fn config(&self) -> &TicketEngineConfig {
        &self.config
    }

    pub fn repositories(&self) -> &Repositories {
        &self.repos
    }

    pub fn orchestrator(&self) -> &Arc<RoutingOrchestrator> {
        &self.orchestrator
    }

    pub fn monitor(&self) -> &Arc<EscalationMonitor> {
        &self.monitor
    }

    pub fn lifecycle(&self) -> &Arc<TicketLifecycle> {
        &self.lifecycle
    }

    async fn sweep_loop(monitor: Arc<EscalationMonitor>, every: Duration) {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            match monitor.sweep().await {
                Ok(report) => debug!("Sweep report: {:?}", report),
                // Retried on the next tick
                Err(e) => error!("❌ Escalation sweep failed: {}", e),
            }
        }
    }
}

/// Builder for [`TicketEngineServer`]
pub struct TicketEngineServerBuilder {
    config: Option<TicketEngineConfig>,
    database_url: Option<String>,
    repos: Option<Repositories>,
    classifier: Option<Arc<dyn Classifier>>,
    clock: Option<Arc<dyn Clock>>,
}

impl TicketEngineServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            database_url: None,
            repos: None,
            classifier: None,
            clock: None,
        }
    }

    pub fn with_config(mut self, config: TicketEngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override `database.url` from the configuration
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Use a private in-memory SQLite database
    pub fn with_in_memory_database(mut self) -> Self {
        self.database_url = Some("sqlite::memory:".to_string());
        self
    }

    /// Use already constructed repositories instead of opening a database
    pub fn with_repositories(mut self, repos: Repositories) -> Self {
        self.repos = Some(repos);
        self
    }

    /// Defaults to [`KeywordClassifier`]
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Defaults to [`SystemClock`]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub async fn build(self) -> Result<TicketEngineServer> {
        let mut config = self.config.unwrap_or_default();
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        config.validate().map_err(TicketEngineError::config)?;

        let repos = match self.repos {
            Some(repos) => repos,
            None => {
                let store = SqliteStore::connect(&config.database).await?;
                Repositories::from_backend(Arc::new(store))
            }
        };

        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(KeywordClassifier::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        Ok(TicketEngineServer::new(config, repos, classifier, clock))
    }
}

impl Default for TicketEngineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut server = TicketEngineServerBuilder::new()
            .with_repositories(Repositories::from_backend(Arc::new(InMemoryStore::new())))
            .build()
            .await
            .unwrap();

        server.start().await.unwrap();
        assert!(server.is_running());
        server.stop().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_disabled_sweep_does_not_start() {
        let mut config = TicketEngineConfig::default();
        config.escalation.enabled = false;
        let mut server = TicketEngineServerBuilder::new()
            .with_config(config)
            .with_repositories(Repositories::from_backend(Arc::new(InMemoryStore::new())))
            .build()
            .await
            .unwrap();

        server.start().await.unwrap();
        assert!(!server.is_running());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = TicketEngineConfig::default();
        config.scoring.skill_match_weight = 0.9;
        let result = TicketEngineServerBuilder::new()
            .with_config(config)
            .with_in_memory_database()
            .build()
            .await;
        assert!(matches!(result, Err(TicketEngineError::Config(_))));
    }

    #[tokio::test]
    async fn test_in_memory_sqlite_backend() {
        let server = TicketEngineServerBuilder::new()
            .with_in_memory_database()
            .build()
            .await
            .unwrap();
        let report = server.monitor().sweep().await.unwrap();
        assert_eq!(report.tickets_evaluated, 0);
    }
}
