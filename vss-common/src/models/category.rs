//! Clinical classification categories
//!
//! ClinVar reports free-text clinical significance. Everything downstream
//! (transition detection, notification preferences) works on the four
//! coarse buckets defined here.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Coarse clinical classification bucket
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Unknown,
    Benign,
    Uncertain,
    Pathogenic,
}

impl Category {
    /// All categories, in display order
    pub const ALL: [Category; 4] = [
        Category::Unknown,
        Category::Benign,
        Category::Uncertain,
        Category::Pathogenic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Unknown => "unknown",
            Category::Benign => "benign",
            Category::Uncertain => "uncertain",
            Category::Pathogenic => "pathogenic",
        }
    }

    /// Short form used in notification preference names (`vus_to_path`)
    pub fn preference_label(&self) -> &'static str {
        match self {
            Category::Unknown => "unknown",
            Category::Benign => "benign",
            Category::Uncertain => "vus",
            Category::Pathogenic => "path",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a raw clinical significance string to its category.
///
/// Only the part before the first comma is considered, so qualifiers such as
/// `"Pathogenic, association"` map like `"Pathogenic"`. Unrecognized text maps
/// to [`Category::Unknown`] and emits a warning; it never fails.
pub fn categorize(significance: &str) -> Category {
    let normalized = significance
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match normalized.as_str() {
        "pathogenic" | "likely pathogenic" | "pathogenic/likely pathogenic" => {
            Category::Pathogenic
        }
        "uncertain significance"
        | "conflicting interpretations of pathogenicity" => Category::Uncertain,
        "benign" | "likely benign" | "benign/likely benign" => Category::Benign,
        "not provided" => Category::Unknown,
        _ => {
            warn!(significance = %normalized, "Unknown clinical significance");
            Category::Unknown
        }
    }
}
