//! Data models for parsed performance listings

use serde::{Deserialize, Serialize};

/// One performance extracted from an afisha listing page.
///
/// Every field is always present; missing data is an empty string rather
/// than a missing key, so the JSON output has the same shape for every
/// record regardless of how much of the block survived extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub title: String,
    pub category: String,
    pub age_rating: String,
    pub datetime: String,
    pub venue: String,
    pub price: String,
    pub image_url: String,
    pub image_filename: String,
    pub detail_url: String,
}

impl PerformanceRecord {
    /// Records without a title are dropped before the session returns.
    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}
