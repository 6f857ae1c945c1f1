//! # FixDesk Ticket Engine
//!
//! Routing and SLA escalation for in-store maintenance tickets.
//!
//! A reported issue is classified, matched against the pool of approved
//! service providers, scored on skills, availability, proximity and past
//! performance, and assigned to the best candidate. Independently, a
//! background sweep watches every active ticket and raises escalations to the
//! store's moderator when assignment, acceptance or resolution deadlines pass.
//!
//! ## Components
//!
//! | module | role |
//! |--------|------|
//! | [`geo`] | great-circle distance |
//! | [`availability`] | qualified providers with spare capacity, ordered |
//! | [`scoring`] | weighted multi-factor provider score |
//! | [`routing`] | intake, selection and atomic assignment, re-routing |
//! | [`sla`] | per-priority timeouts and deadlines |
//! | [`escalation`] | idempotent SLA sweep |
//! | [`lifecycle`] | accept and complete, releasing provider load |
//! | [`repository`] | storage traits and the in-memory backend |
//! | [`database`] | SQLite backend |
//! | [`server`] | wiring plus the periodic sweep task |
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use fixdesk_ticket_engine::prelude::*;
//!
//! # async fn example() -> fixdesk_ticket_engine::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let shop = Store::new("Main Street", 40.7128, -74.0060);
//! store.save_store(&shop).await?;
//! store
//!     .save_provider(
//!         &ServiceProvider::new("Arctic Refrigeration", vec!["Refrigeration".into()], 5)
//!             .with_location(40.73, -73.99),
//!     )
//!     .await?;
//!
//! let server = TicketEngineServerBuilder::new()
//!     .with_repositories(Repositories::from_backend(store))
//!     .build()
//!     .await?;
//!
//! let outcome = server
//!     .orchestrator()
//!     .process_new_ticket(NewTicketRequest::new(
//!         "Walk-in freezer is not cooling, product at risk",
//!         "Back room",
//!         shop.id,
//!         uuid::Uuid::new_v4(),
//!     ))
//!     .await?;
//! assert!(outcome.is_assigned());
//! # Ok(())
//! # }
//! ```

pub mod availability;
pub mod classification;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod escalation;
pub mod geo;
pub mod lifecycle;
pub mod logging;
pub mod repository;
pub mod routing;
pub mod scoring;
pub mod server;
pub mod skills;
pub mod sla;
pub mod types;

pub use availability::{AvailabilityFinder, ScoredProvider};
pub use classification::{Classification, Classifier, KeywordClassifier};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TicketEngineConfig;
pub use database::SqliteStore;
pub use error::{Result, TicketEngineError};
pub use escalation::{EscalationMonitor, SweepReport};
pub use lifecycle::TicketLifecycle;
pub use repository::{InMemoryStore, Repositories};
pub use routing::{AssignmentDecision, RoutingOrchestrator, RoutingOutcome, RoutingStage};
pub use scoring::{ProviderScore, ProviderScorer, ScoringWeights, TicketContext};
pub use server::{TicketEngineServer, TicketEngineServerBuilder};
pub use sla::{EscalationTrigger, SlaPolicy};

/// Common imports for embedding the engine
pub mod prelude {
    pub use crate::classification::{Classification, Classifier, KeywordClassifier};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::TicketEngineConfig;
    pub use crate::error::{Result, TicketEngineError};
    pub use crate::escalation::{EscalationMonitor, SweepReport};
    pub use crate::repository::{
        AssignmentRepository, EscalationRepository, InMemoryStore, ProviderRepository,
        Repositories, StoreRepository, TicketHistoryRepository, TicketRepository,
    };
    pub use crate::routing::{RoutingOrchestrator, RoutingOutcome, RoutingStage};
    pub use crate::server::{TicketEngineServer, TicketEngineServerBuilder};
    pub use crate::types::*;
}
