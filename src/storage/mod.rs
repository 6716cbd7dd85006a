//! JSON persistence and the console report.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::PerformanceRecord;
use crate::urls;

/// Read a locally saved listing page.
pub fn read_local_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// The write image of the records: every non-empty detail URL carries the
/// resolved marker exactly once. Applied immediately before the write so
/// the in-memory records stay untagged.
pub fn tagged_for_write(records: &[PerformanceRecord]) -> Vec<PerformanceRecord> {
    records
        .iter()
        .cloned()
        .map(|mut record| {
            if !record.detail_url.is_empty() {
                record.detail_url = urls::tag_resolved(&record.detail_url);
            }
            record
        })
        .collect()
}

pub fn save_to_json(records: &[PerformanceRecord], path: &Path) -> Result<()> {
    let tagged = tagged_for_write(records);
    let json = serde_json::to_string_pretty(&tagged).context("failed to serialize records")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;

    info!(count = tagged.len(), path = %path.display(), "records written");
    Ok(())
}

/// Human-readable run report mirroring the JSON payload.
pub fn print_summary(records: &[PerformanceRecord]) {
    let with_url = records.iter().filter(|record| !record.detail_url.is_empty()).count();

    println!("\n=== Summary ===");
    println!("Performances: {}", records.len());
    println!("With detail URL: {with_url}");
    println!("Without detail URL: {}", records.len() - with_url);
    println!("{}", "=".repeat(50));

    for (position, record) in records.iter().enumerate() {
        println!("\n{}. {}", position + 1, record.title);
        println!("   Category: {}", record.category);
        println!("   Age rating: {}", record.age_rating);
        println!("   Date and time: {}", record.datetime);
        println!("   Venue: {}", record.venue);
        println!("   Price: {}", record.price);
        println!("   Image: {}", record.image_filename);
        if record.detail_url.is_empty() {
            println!("   Detail URL: none");
        } else {
            println!("   Detail URL: {}", record.detail_url);
        }
    }
}
