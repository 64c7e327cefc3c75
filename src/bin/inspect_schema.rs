//! Utility to inspect the `leads` table and report whether duplicate phone
//! numbers are currently rejected.

use anyhow::Context;
use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;
use university_leads_api::db::PHONE_UNIQUE_INDEX;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL")
        .or_else(|_| env::var("DB_URL"))
        .context("DATABASE_URL or DB_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .context("connecting to database")?;

    let columns: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
         WHERE table_name = 'leads' ORDER BY ordinal_position",
    )
    .fetch_all(&pool)
    .await?;

    if columns.is_empty() {
        println!("Table 'leads' not found (it is created on first server start).");
        return Ok(());
    }

    println!("leads");
    for (col, type_, nullable) in &columns {
        let null = if nullable == "YES" { "" } else { " not null" };
        println!("  - {}: {}{}", col, type_, null);
    }

    let indexes: Vec<(String, String)> = sqlx::query_as(
        "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = 'leads' ORDER BY indexname",
    )
    .fetch_all(&pool)
    .await?;

    println!("\nIndexes:");
    for (name, def) in &indexes {
        println!("  - {}: {}", name, def);
    }

    let rejects_duplicates = indexes.iter().any(|(name, _)| name == PHONE_UNIQUE_INDEX);
    println!(
        "\nDuplicate phone numbers: {}",
        if rejects_duplicates { "rejected" } else { "allowed" }
    );

    let (total, distinct): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COUNT(DISTINCT phone_number) FROM leads")
            .fetch_one(&pool)
            .await?;
    println!("Leads: {} ({} distinct phone numbers)", total, distinct);
    if total > distinct {
        println!("Note: duplicates present; DUPLICATE_PHONE_POLICY=reject will fail at startup until they are removed.");
    }

    Ok(())
}
