//! Domain types shared by routing, scoring and escalation
//!
//! Every status enum stores as the uppercase label used in the database
//! (`OPEN`, `PROPOSED`, `TRIGGERED`, ...) and round-trips through
//! [`std::fmt::Display`] and [`std::str::FromStr`].

pub mod assignment;
pub mod escalation;
pub mod provider;
pub mod store;
pub mod ticket;

pub use assignment::{AssignmentStatus, TicketAssignment};
pub use escalation::{Escalation, EscalationStatus};
pub use provider::{ApprovalStatus, GeoPoint, ServiceProvider};
pub use store::{Store, StoreTicketStats};
pub use ticket::{CompletionStats, NewTicketRequest, Priority, Ticket, TicketStatus};
