//! # Provider Scoring
//!
//! [`ProviderScorer`] rates one candidate for one ticket on four factors and
//! combines them with [`ScoringWeights`]:
//!
//! | factor       | value                                         | base weight |
//! |--------------|-----------------------------------------------|-------------|
//! | skill match  | matched requirement weight / total weight     | 0.4 |
//! | availability | `1 - current_load / capacity_per_day`         | 0.2 |
//! | proximity    | `max(0, 1 - distance / 50 km)`                | 0.3 |
//! | performance  | on-time share of completions in last 30 days  | 0.1 |
//!
//! HIGH priority tickets move 0.1 from skill match and from performance onto
//! proximity and availability. The weights still sum to one.
//!
//! Every score carries a plain-text explanation that is stored with the
//! assignment for later audit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::availability::ScoredProvider;
use crate::config::ScoringConfig;
use crate::repository::TicketHistoryRepository;
use crate::skills::{self, SkillTable};
use crate::types::Priority;

/// Weight of each factor in the total score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub skill_match: f64,
    pub availability: f64,
    pub proximity: f64,
    pub performance: f64,
}

impl ScoringWeights {
    pub fn base(config: &ScoringConfig) -> Self {
        Self {
            skill_match: config.skill_match_weight,
            availability: config.availability_weight,
            proximity: config.proximity_weight,
            performance: config.performance_weight,
        }
    }

    /// Base weights with the HIGH priority shift applied when it applies
    pub fn for_priority(config: &ScoringConfig, priority: Priority) -> Self {
        let mut weights = Self::base(config);
        if priority == Priority::High {
            let shift = config.high_priority_shift;
            weights.proximity += shift;
            weights.availability += shift;
            weights.skill_match -= shift;
            weights.performance -= shift;
        }
        weights
    }

    pub fn total(&self) -> f64 {
        self.skill_match + self.availability + self.proximity + self.performance
    }
}

/// What the scorer needs to know about the ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketContext {
    pub priority: Priority,
    pub category: String,
    pub subcategory: String,
}

impl TicketContext {
    pub fn new(priority: Priority, category: impl Into<String>, subcategory: impl Into<String>) -> Self {
        Self {
            priority,
            category: category.into(),
            subcategory: subcategory.into(),
        }
    }
}

/// Factor values before weighting, each in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub skill_match: f64,
    pub availability: f64,
    pub proximity: f64,
    pub performance: f64,
    pub weights: ScoringWeights,
}

impl ScoreBreakdown {
    pub fn weighted_total(&self) -> f64 {
        self.skill_match * self.weights.skill_match
            + self.availability * self.weights.availability
            + self.proximity * self.weights.proximity
            + self.performance * self.weights.performance
    }
}

/// Scoring result for one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderScore {
    pub provider_id: Uuid,
    /// In `[0, 1]`
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
    pub explanation: String,
}

/// Multi-factor provider scorer
pub struct ProviderScorer {
    history: Arc<dyn TicketHistoryRepository>,
    skills: SkillTable,
    config: ScoringConfig,
}

impl ProviderScorer {
    pub fn new(history: Arc<dyn TicketHistoryRepository>, skills: SkillTable, config: ScoringConfig) -> Self {
        Self {
            history,
            skills,
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Share of the category's requirement weight the provider covers
    pub fn skill_match_score(&self, provider_skills: &[String], category: &str, subcategory: &str) -> f64 {
        let requirements = self.skills.requirements_for(category, subcategory);
        let total: f64 = requirements.iter().map(|r| r.weight).sum();
        if total <= 0.0 {
            return 0.0;
        }

        let matched: f64 = requirements
            .iter()
            .filter(|r| skills::covers(provider_skills, &r.skill))
            .map(|r| r.weight)
            .sum();
        matched / total
    }

    pub fn proximity_score(&self, distance_km: f64) -> f64 {
        if !distance_km.is_finite() || self.config.proximity_cutoff_km <= 0.0 {
            return 0.0;
        }
        (1.0 - distance_km / self.config.proximity_cutoff_km).max(0.0)
    }

    /// On-time completion share over the trailing window.
    ///
    /// No history, or a failed lookup, gives the neutral score.
    pub async fn performance_score(&self, provider_id: Uuid, now: DateTime<Utc>) -> f64 {
        let since = now - Duration::days(self.config.performance_window_days as i64);
        match self.history.completion_stats(provider_id, since).await {
            Ok(stats) => stats
                .on_time_ratio()
                .unwrap_or(self.config.neutral_performance),
            Err(e) => {
                warn!(
                    "⚠️ Performance lookup failed for provider {}, using neutral score: {}",
                    provider_id, e
                );
                self.config.neutral_performance
            }
        }
    }

    pub async fn score(
        &self,
        candidate: &ScoredProvider,
        ticket: &TicketContext,
        now: DateTime<Utc>,
    ) -> ProviderScore {
        let provider = &candidate.provider;
        let weights = ScoringWeights::for_priority(&self.config, ticket.priority);

        let breakdown = ScoreBreakdown {
            skill_match: self.skill_match_score(&provider.skills, &ticket.category, &ticket.subcategory),
            availability: provider.availability_ratio(),
            proximity: self.proximity_score(candidate.distance_km),
            performance: self.performance_score(provider.id, now).await,
            weights,
        };
        let total_score = breakdown.weighted_total().clamp(0.0, 1.0);

        let explanation = format!(
            "Provider {} scored {:.1}%:\n\
             - Skill Match: {:.1}% (weight: {:.1})\n\
             - Availability: {:.1}% ({}/{} capacity)\n\
             - Proximity: {:.1}% ({:.1} km away)\n\
             - Performance: {:.1}% (historical average)\n\
             Priority: {}",
            provider.company_name,
            total_score * 100.0,
            breakdown.skill_match * 100.0,
            weights.skill_match,
            breakdown.availability * 100.0,
            provider.current_load,
            provider.capacity_per_day,
            breakdown.proximity * 100.0,
            candidate.distance_km,
            breakdown.performance * 100.0,
            ticket.priority,
        );

        debug!(
            "Scored provider {} at {:.3} for {}/{}",
            provider.company_name, total_score, ticket.category, ticket.subcategory
        );

        ProviderScore {
            provider_id: provider.id,
            total_score,
            breakdown,
            explanation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, TicketEngineError};
    use crate::repository::InMemoryStore;
    use crate::types::{CompletionStats, ServiceProvider};
    use async_trait::async_trait;

    struct FailingHistory;

    #[async_trait]
    impl TicketHistoryRepository for FailingHistory {
        async fn completion_stats(&self, _: Uuid, _: DateTime<Utc>) -> Result<CompletionStats> {
            Err(TicketEngineError::internal("history offline"))
        }
    }

    struct FixedHistory(CompletionStats);

    #[async_trait]
    impl TicketHistoryRepository for FixedHistory {
        async fn completion_stats(&self, _: Uuid, _: DateTime<Utc>) -> Result<CompletionStats> {
            Ok(self.0)
        }
    }

    fn scorer() -> ProviderScorer {
        ProviderScorer::new(
            Arc::new(InMemoryStore::new()),
            SkillTable::default(),
            ScoringConfig::default(),
        )
    }

    fn candidate(name: &str, skills: &[&str], distance_km: f64) -> ScoredProvider {
        let provider = ServiceProvider::new(name, skills.iter().map(|s| s.to_string()).collect(), 10);
        ScoredProvider {
            availability_score: provider.availability_ratio(),
            provider,
            distance_km,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let config = ScoringConfig::default();
        for priority in Priority::ALL {
            let weights = ScoringWeights::for_priority(&config, priority);
            assert!((weights.total() - 1.0).abs() < 1e-9);
        }
        let high = ScoringWeights::for_priority(&config, Priority::High);
        assert!((high.proximity - 0.4).abs() < 1e-9);
        assert!((high.performance - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_skill_match_is_weighted() {
        let scorer = scorer();
        let hvac_only = vec!["HVAC".to_string()];
        let score = scorer.skill_match_score(&hvac_only, "Facilities", "Cold Storage");
        assert!((score - 0.7 / 2.0).abs() < 1e-9);

        let generic = vec!["general maintenance".to_string()];
        assert_eq!(scorer.skill_match_score(&generic, "General", "Safety"), 1.0);
        assert_eq!(scorer.skill_match_score(&hvac_only, "General", "Safety"), 0.0);
    }

    #[test]
    fn test_proximity_cutoff() {
        let scorer = scorer();
        assert_eq!(scorer.proximity_score(0.0), 1.0);
        assert!((scorer.proximity_score(25.0) - 0.5).abs() < 1e-9);
        assert_eq!(scorer.proximity_score(75.0), 0.0);
        assert_eq!(scorer.proximity_score(crate::geo::UNREACHABLE_DISTANCE_KM), 0.0);
    }

    #[tokio::test]
    async fn test_skill_match_outweighs_proximity() {
        let scorer = scorer();
        let now = Utc::now();
        let ticket = TicketContext::new(Priority::Medium, "Facilities", "Cold Storage");

        let nearby = candidate("Nearby Plumbing", &["Plumbing"], 2.0);
        let specialist = candidate(
            "Arctic Refrigeration",
            &["Refrigeration", "HVAC", "Electrical"],
            40.0,
        );

        let a = scorer.score(&nearby, &ticket, now).await;
        let b = scorer.score(&specialist, &ticket, now).await;

        assert!((a.total_score - 0.558).abs() < 1e-9);
        assert!((b.total_score - 0.73).abs() < 1e-9);
        assert!(b.total_score > a.total_score);
    }

    #[tokio::test]
    async fn test_explanation_format() {
        let scorer = scorer();
        let ticket = TicketContext::new(Priority::Medium, "Facilities", "Cold Storage");
        let specialist = candidate(
            "Arctic Refrigeration",
            &["Refrigeration", "HVAC", "Electrical"],
            40.0,
        );

        let score = scorer.score(&specialist, &ticket, Utc::now()).await;
        assert_eq!(
            score.explanation,
            "Provider Arctic Refrigeration scored 73.0%:\n\
             - Skill Match: 100.0% (weight: 0.4)\n\
             - Availability: 100.0% (0/10 capacity)\n\
             - Proximity: 20.0% (40.0 km away)\n\
             - Performance: 70.0% (historical average)\n\
             Priority: MEDIUM"
        );
    }

    #[tokio::test]
    async fn test_performance_uses_history() {
        let history = FixedHistory(CompletionStats {
            completed: 4,
            within_sla: 3,
        });
        let scorer = ProviderScorer::new(Arc::new(history), SkillTable::default(), ScoringConfig::default());
        assert_eq!(scorer.performance_score(Uuid::new_v4(), Utc::now()).await, 0.75);
    }

    #[tokio::test]
    async fn test_performance_lookup_failure_is_neutral() {
        let scorer = ProviderScorer::new(
            Arc::new(FailingHistory),
            SkillTable::default(),
            ScoringConfig::default(),
        );
        assert_eq!(scorer.performance_score(Uuid::new_v4(), Utc::now()).await, 0.7);
    }
}
