//! # Provider Availability
//!
//! [`AvailabilityFinder`] turns the provider pool into an ordered candidate
//! list for one ticket. It is a read-only step: nothing is reserved here, the
//! capacity check is repeated when the assignment is committed.
//!
//! ## Ordering
//!
//! Candidates are ordered by availability first. Providers whose availability
//! lies within the configured band (0.1 by default) of the band leader are
//! treated as equally available and ordered by distance to the store instead,
//! so a marginally less loaded provider on the other side of town does not
//! beat one around the corner.
//!
//! ```text
//! availability  1.0  0.95  0.92 | 0.8  0.75 | 0.5
//!               └─ by distance ─┘ └─ dist ─┘
//! ```
//!
//! ## Failure policy
//!
//! A malformed store location is the caller's mistake and fails with
//! [`TicketEngineError::InvalidLocation`]. Anything that goes wrong while
//! reading the pool degrades to an empty list, which routing already treats
//! as "no candidates".

use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{Result, TicketEngineError};
use crate::geo;
use crate::repository::ProviderRepository;
use crate::skills;
use crate::types::{GeoPoint, ServiceProvider};

/// Default width of an availability band
pub const DEFAULT_AVAILABILITY_BAND: f64 = 0.1;

/// Slack for float noise at the band edge
const BAND_EPSILON: f64 = 1e-9;

/// A provider that passed the availability filter
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProvider {
    pub provider: ServiceProvider,
    /// Kilometres from the store, [`geo::UNREACHABLE_DISTANCE_KM`] when the
    /// provider's coordinates are unusable
    pub distance_km: f64,
    /// `1 - current_load / capacity_per_day`, always positive here
    pub availability_score: f64,
}

/// Finds qualified providers with spare capacity
pub struct AvailabilityFinder {
    providers: Arc<dyn ProviderRepository>,
    band: f64,
}

impl AvailabilityFinder {
    pub fn new(providers: Arc<dyn ProviderRepository>) -> Self {
        Self {
            providers,
            band: DEFAULT_AVAILABILITY_BAND,
        }
    }

    pub fn with_band(mut self, band: f64) -> Self {
        self.band = band;
        self
    }

    pub fn band(&self) -> f64 {
        self.band
    }

    /// Ordered candidates for the required skills around `store_location`.
    ///
    /// An empty `required_skills` lets every routable provider through.
    pub async fn find_available(
        &self,
        required_skills: &[String],
        store_location: &GeoPoint,
    ) -> Result<Vec<ScoredProvider>> {
        if !store_location.is_finite() {
            return Err(TicketEngineError::invalid_location(format!(
                "store location ({}, {}) is not a finite coordinate",
                store_location.latitude, store_location.longitude
            )));
        }

        let pool = match self.providers.find_approved_with_capacity().await {
            Ok(pool) => pool,
            Err(e) => {
                error!("❌ Failed to load provider pool, treating as empty: {}", e);
                return Ok(Vec::new());
            }
        };
        let pool_size = pool.len();

        let mut candidates: Vec<ScoredProvider> = pool
            .into_iter()
            .filter(ServiceProvider::is_routable)
            .filter(|p| {
                required_skills.is_empty()
                    || required_skills
                        .iter()
                        .any(|required| skills::covers(&p.skills, required))
            })
            .filter_map(|provider| {
                let availability_score = provider.availability_ratio().max(0.0);
                if availability_score <= 0.0 {
                    return None;
                }
                let distance_km = geo::distance_between(provider.location.as_ref(), store_location);
                Some(ScoredProvider {
                    provider,
                    distance_km,
                    availability_score,
                })
            })
            .collect();

        order_candidates(&mut candidates, self.band);

        debug!(
            "🔍 {} of {} providers available for skills {:?}",
            candidates.len(),
            pool_size,
            required_skills
        );
        Ok(candidates)
    }
}

/// Sort candidates into availability bands, distance first inside a band.
///
/// Each band starts at the most available remaining candidate and takes
/// everyone within `band` of it. Ties fall through to provider id so the
/// order never depends on how the repository happened to return rows.
pub fn order_candidates(candidates: &mut [ScoredProvider], band: f64) {
    candidates.sort_by(|a, b| {
        b.availability_score
            .total_cmp(&a.availability_score)
            .then_with(|| by_distance(a, b))
    });

    let mut start = 0;
    while start < candidates.len() {
        let leader = candidates[start].availability_score;
        let end = candidates[start..]
            .iter()
            .position(|c| leader - c.availability_score > band + BAND_EPSILON)
            .map_or(candidates.len(), |offset| start + offset);

        candidates[start..end].sort_by(by_distance);
        start = end;
    }
}

fn by_distance(a: &ScoredProvider, b: &ScoredProvider) -> Ordering {
    a.distance_km
        .total_cmp(&b.distance_km)
        .then_with(|| b.availability_score.total_cmp(&a.availability_score))
        .then_with(|| a.provider.id.cmp(&b.provider.id))
}
