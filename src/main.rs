use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod afisha_scraper;
mod images;
mod links;
mod models;
mod parsing;
mod renderer;
mod session;
mod storage;
mod traits;
mod urls;

use afisha_scraper::AfishaScraper;
use traits::ScrapeConfig;

/// Extract performance records from an afisha listing page.
#[derive(Parser)]
#[command(name = "afisha-scraper")]
struct Cli {
    /// Page URL (http/https) or path to a locally saved listing page
    source: String,

    /// Where the JSON output is written
    #[arg(short, long, default_value = "performances.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let scraper = AfishaScraper::new(ScrapeConfig::default())?;

    let records = if urls::is_well_formed_http_url(&cli.source) {
        scraper.scrape_from_url(&cli.source).await
    } else {
        scraper.scrape_from_file(Path::new(&cli.source)).await?
    };

    if records.is_empty() {
        println!("No performances found");
        return Ok(());
    }

    if let Err(error) = scraper.save_to_json(&records, &cli.output) {
        error!(error = %error, "failed to persist records");
    }
    scraper.print_summary(&records);

    Ok(())
}
