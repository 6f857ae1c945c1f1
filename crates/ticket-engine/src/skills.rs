//! # Skill Requirements
//!
//! Maps a ticket's category/subcategory to the skills a provider needs, each
//! with an importance weight in `0.0..=1.0`. The requirement list feeds two
//! places:
//!
//! - the availability filter, which only needs the skill names
//! - the skill-match factor of the scorer, which sums the weights of the
//!   requirements a provider covers
//!
//! Categories missing from the table fall back to a single
//! "General Maintenance" requirement at weight 1.0.
//!
//! Matching between a required skill and a provider skill ignores case and
//! accepts a substring in either direction, so "HVAC" matches
//! "HVAC Repair" and "Electrical Systems" matches "Electrical".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Skill required when a category has no explicit entry
pub const GENERIC_SKILL: &str = "General Maintenance";

/// One required skill and how much it matters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRequirement {
    pub skill: String,
    /// Importance between 0.0 and 1.0
    pub weight: f64,
}

impl SkillRequirement {
    pub fn with_weight(skill: impl Into<String>, weight: f64) -> Self {
        Self {
            skill: skill.into(),
            weight,
        }
    }
}

/// Case-insensitive, bidirectional substring match
pub fn skills_match(required: &str, offered: &str) -> bool {
    let required = required.trim().to_lowercase();
    let offered = offered.trim().to_lowercase();
    if required.is_empty() || offered.is_empty() {
        return false;
    }
    offered.contains(&required) || required.contains(&offered)
}

/// Whether any offered skill covers `required`
pub fn covers(offered: &[String], required: &str) -> bool {
    offered.iter().any(|skill| skills_match(required, skill))
}

/// Category/subcategory to requirement table
#[derive(Debug, Clone)]
pub struct SkillTable {
    entries: HashMap<(String, String), Vec<SkillRequirement>>,
    fallback: Vec<SkillRequirement>,
}

impl Default for SkillTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert("Facilities", "Cold Storage", &[("Refrigeration", 1.0), ("HVAC", 0.7), ("Electrical", 0.3)]);
        table.insert("Facilities", "Electrical", &[("Electrical", 1.0), (GENERIC_SKILL, 0.5)]);
        table.insert("Facilities", "Plumbing", &[("Plumbing", 1.0), (GENERIC_SKILL, 0.5)]);
        table.insert("Facilities", "HVAC", &[("HVAC", 1.0), ("Electrical", 0.4)]);
        table.insert("IT", "POS Systems", &[("POS Systems", 1.0), ("IT Support", 0.8), ("Electrical", 0.3)]);
        table.insert("IT", "Network", &[("Network", 1.0), ("IT Support", 0.8)]);
        table.insert("Equipment", "Shopping Carts", &[(GENERIC_SKILL, 1.0), ("Mechanical", 0.7)]);
        table
    }
}

impl SkillTable {
    /// Table with only the generic fallback
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: vec![SkillRequirement::with_weight(GENERIC_SKILL, 1.0)],
        }
    }

    fn key(category: &str, subcategory: &str) -> (String, String) {
        (category.trim().to_lowercase(), subcategory.trim().to_lowercase())
    }

    pub fn insert(&mut self, category: &str, subcategory: &str, skills: &[(&str, f64)]) {
        let requirements = skills
            .iter()
            .map(|(skill, weight)| SkillRequirement::with_weight(*skill, *weight))
            .collect();
        self.entries.insert(Self::key(category, subcategory), requirements);
    }

    /// Weighted requirements for a category, falling back to the generic skill
    pub fn requirements_for(&self, category: &str, subcategory: &str) -> &[SkillRequirement] {
        self.entries
            .get(&Self::key(category, subcategory))
            .map(Vec::as_slice)
            .unwrap_or(&self.fallback)
    }

    /// Skill names only, as used by the availability filter
    pub fn required_skills_for(&self, category: &str, subcategory: &str) -> Vec<String> {
        self.requirements_for(category, subcategory)
            .iter()
            .map(|r| r.skill.clone())
            .collect()
    }
}
