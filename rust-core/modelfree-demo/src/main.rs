// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//! ModelFree demo binary
//!
//! Walks a `widgets` collection through its lifecycle: count, create,
//! re-fetch, update, sample, list, delete. Uses PostgreSQL when a database
//! URL is given and the in-memory backend otherwise.

use std::time::Duration;

use clap::Parser;
use serde_json::json;

use modelfree_backend::{MemoryBackend, MemoryConfig, PostgresBackend, PostgresConfig, DEFAULT_KEY_SIZE};
use modelfree_store::ModelFree;

#[derive(Parser, Debug)]
#[command(name = "modelfree-demo", version, about = "ModelFree collection walkthrough")]
struct Cli {
    /// PostgreSQL connection URL. The in-memory backend is used when absent.
    #[arg(long, env = "MODELFREE_DATABASE_URL")]
    database_url: Option<String>,

    /// Length of generated document keys.
    #[arg(long, default_value_t = DEFAULT_KEY_SIZE)]
    key_size: usize,

    /// Collection to work on.
    #[arg(long, default_value = "widgets")]
    collection: String,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if cli.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let mf = match &cli.database_url {
        Some(url) => {
            let config = PostgresConfig::from_url(url.as_str()).with_key_size(cli.key_size);
            let backend = PostgresBackend::new(config)?;
            tracing::info!(database = backend.database(), "using postgres backend");
            ModelFree::new(backend)
        }
        None => {
            tracing::info!("using in-memory backend");
            ModelFree::new(MemoryBackend::with_config(MemoryConfig {
                key_size: cli.key_size,
            }))
        }
    };

    let widgets = mf.collection_with_key_size(&cli.collection, cli.key_size).await?;
    let subscription = widgets
        .subscribe(|event| {
            tracing::info!(collection = %event.collection, key = %event.key, "changed");
            Ok(())
        })
        .await?;

    println!("{} {} found", widgets.count().await?, widgets.name());

    let mut widget = widgets.create(json!({"name": "my widget"})).await?;
    widget.save().await?;
    println!("{} {} found", widgets.count().await?, widgets.name());

    if let Some(also) = widgets.get(widget.key()).await? {
        println!("{} {}", widget.value()["name"], also.value()["name"]);
    }

    widget.set("name", "renamed widget")?;
    widget.save().await?;

    if let Some(picked) = widgets.random().await? {
        println!("random: {} {}", picked.key(), picked.value());
    }
    for doc in widgets.all().await? {
        println!("row: {} {}", doc.key(), doc.value());
    }

    // Relational notifications arrive asynchronously.
    tokio::time::sleep(Duration::from_millis(200)).await;
    widgets.unsubscribe(subscription).await?;

    widget.delete().await?;
    println!("{} {} found", widgets.count().await?, widgets.name());

    mf.destroy().await?;
    Ok(())
}
