//! Issue classification
//!
//! The engine treats classification as an external capability behind the
//! [`Classifier`] trait. Any failure is absorbed by [`classify_or_fallback`],
//! which substitutes [`Classification::fallback`] so ticket creation never
//! blocks on it.
//!
//! [`KeywordClassifier`] is a small deterministic implementation used by the
//! command line tool and by embedders without a model-backed classifier.
//!
//! ## Categories
//!
//! | category   | subcategories |
//! |------------|---------------|
//! | Facilities | Cold Storage, Electrical, Plumbing, HVAC, Structural |
//! | IT         | POS Systems, Network, Computers, Software |
//! | Equipment  | Shopping Carts, Shelving, Security, Cleaning |
//! | General    | Maintenance, Safety |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::types::Priority;

/// Known categories and their subcategories
pub const CATEGORIES: &[(&str, &[&str])] = &[
    ("Facilities", &["Cold Storage", "Electrical", "Plumbing", "HVAC", "Structural"]),
    ("IT", &["POS Systems", "Network", "Computers", "Software"]),
    ("Equipment", &["Shopping Carts", "Shelving", "Security", "Cleaning"]),
    ("General", &["Maintenance", "Safety"]),
];

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub subcategory: String,
    pub priority: Priority,
    /// Between 0.0 and 1.0
    pub confidence: f64,
    pub reasoning: String,
}

impl Classification {
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        priority: Priority,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            priority,
            confidence,
            reasoning: reasoning.into(),
        }
        .normalized()
    }

    /// Used whenever the classifier fails
    pub fn fallback() -> Self {
        Self {
            category: "General".to_string(),
            subcategory: "Maintenance".to_string(),
            priority: Priority::Medium,
            confidence: 0.3,
            reasoning: "Fallback classification due to processing error".to_string(),
        }
    }

    /// Clamp confidence into `[0, 1]`; NaN becomes 0
    pub fn normalized(mut self) -> Self {
        self.confidence = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        self
    }
}

/// Turns an issue description into category, subcategory and priority
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, description: &str) -> Result<Classification>;
}

/// Run the classifier, substituting the fallback on error.
///
/// The flag is `true` when the fallback was used.
pub async fn classify_or_fallback(
    classifier: &dyn Classifier,
    description: &str,
) -> (Classification, bool) {
    match classifier.classify(description).await {
        Ok(classification) => (classification.normalized(), false),
        Err(e) => {
            warn!("⚠️ Classification failed, using fallback: {}", e);
            (Classification::fallback(), true)
        }
    }
}

struct KeywordRule {
    category: &'static str,
    subcategory: &'static str,
    keywords: &'static [&'static str],
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule { category: "Facilities", subcategory: "Cold Storage", keywords: &["freezer", "refrigerat", "cooler", "cold storage", "chiller", "ice machine"] },
    KeywordRule { category: "Facilities", subcategory: "HVAC", keywords: &["hvac", "air condition", "heating", "ventilation", "thermostat", "a/c"] },
    KeywordRule { category: "Facilities", subcategory: "Plumbing", keywords: &["leak", "pipe", "drain", "toilet", "sink", "water"] },
    KeywordRule { category: "Facilities", subcategory: "Electrical", keywords: &["light", "outlet", "power", "electrical", "breaker", "wiring"] },
    KeywordRule { category: "Facilities", subcategory: "Structural", keywords: &["door", "window", "floor", "wall", "ceiling", "roof"] },
    KeywordRule { category: "IT", subcategory: "POS Systems", keywords: &["pos terminal", "point of sale", "register", "checkout", "card reader", "scanner"] },
    KeywordRule { category: "IT", subcategory: "Network", keywords: &["wifi", "wi-fi", "network", "internet", "connectivity", "router"] },
    KeywordRule { category: "IT", subcategory: "Computers", keywords: &["computer", "monitor", "workstation", "printer", "keyboard"] },
    KeywordRule { category: "IT", subcategory: "Software", keywords: &["software", "application", "system error", "login", "crash"] },
    KeywordRule { category: "Equipment", subcategory: "Shopping Carts", keywords: &["cart", "trolley", "basket", "wheel"] },
    KeywordRule { category: "Equipment", subcategory: "Shelving", keywords: &["shelf", "shelving", "racking", "display"] },
    KeywordRule { category: "Equipment", subcategory: "Security", keywords: &["camera", "alarm", "cctv", "access control", "badge"] },
    KeywordRule { category: "Equipment", subcategory: "Cleaning", keywords: &["scrubber", "floor cleaner", "vacuum", "mop"] },
    KeywordRule { category: "General", subcategory: "Safety", keywords: &["hazard", "injury", "fire", "smoke", "spill", "exit"] },
];

const HIGH_PRIORITY_KEYWORDS: &[&str] = &[
    "safety", "hazard", "fire", "smoke", "spark", "injur", "spoil", "flood",
    "not cooling", "down", "outage", "completely", "emergency", "all registers",
];

const LOW_PRIORITY_KEYWORDS: &[&str] = &[
    "cosmetic", "scratch", "paint", "minor", "squeak", "scheduled", "when possible", "dent",
];

/// Keyword table classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn priority_for(text: &str) -> (Priority, &'static str) {
        if HIGH_PRIORITY_KEYWORDS.iter().any(|k| text.contains(k)) {
            (Priority::High, "safety, spoilage or full outage indicators")
        } else if LOW_PRIORITY_KEYWORDS.iter().any(|k| text.contains(k)) {
            (Priority::Low, "cosmetic or minor issue indicators")
        } else {
            (Priority::Medium, "operational impact without critical indicators")
        }
    }
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn classify(&self, description: &str) -> Result<Classification> {
        let text = description.to_lowercase();
        let (priority, priority_reason) = Self::priority_for(&text);

        let best = KEYWORD_RULES
            .iter()
            .map(|rule| {
                let hits = rule.keywords.iter().filter(|k| text.contains(*k)).count();
                (rule, hits)
            })
            .filter(|(_, hits)| *hits > 0)
            .fold(None::<(&KeywordRule, usize)>, |best, (rule, hits)| match best {
                Some((_, best_hits)) if best_hits >= hits => best,
                _ => Some((rule, hits)),
            });

        let classification = match best {
            Some((rule, hits)) => {
                debug!(
                    "Keyword classification {}/{} with {} hit(s)",
                    rule.category, rule.subcategory, hits
                );
                Classification::new(
                    rule.category,
                    rule.subcategory,
                    priority,
                    (0.5 + 0.1 * hits as f64).min(0.9),
                    format!(
                        "Matched {} keyword(s) for {}/{}; priority from {}",
                        hits, rule.category, rule.subcategory, priority_reason
                    ),
                )
            }
            None => Classification::new(
                "General",
                "Maintenance",
                priority,
                0.4,
                format!("No category keywords matched; priority from {}", priority_reason),
            ),
        };

        Ok(classification)
    }
}
