// Dump the most recent batch aggregates from a loader database as JSON.
//
// Usage: cargo run --example dump_buckets -- [DB_PATH] [LIMIT]
//   DB_PATH  default: ./data/iostat.db
//   LIMIT    default: 5

use iostat_loader::sink::SqliteStore;
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(String::as_str).unwrap_or("./data/iostat.db");
    let limit: u32 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5);

    let store = SqliteStore::connect(path).await?;
    store.init().await?;
    let docs = store.get_recent_aggregates(limit).await?;
    eprintln!(
        "{}: {} aggregates, {} point buckets",
        iostat_loader::LOADER_ID,
        store.count_aggregates().await?,
        store.count_points().await?
    );

    println!("{}", serde_json::to_string_pretty(&docs)?);
    Ok(())
}
