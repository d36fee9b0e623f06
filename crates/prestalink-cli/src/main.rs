use anyhow::{Context, bail};
use clap::Parser;
use dotenvy::dotenv;
use futures::stream::{self, StreamExt};
use sqlx::postgres::PgPoolOptions;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use prestalink_cli::{unique_ids, Command, Config};
use prestalink_client::{PrestashopClient, ProductImageAdapter};
use prestalink_core::{
    load_backends_config, AppError, DbConfig, HttpConfig, ImportConfig, ImportStats,
    PickingListener, ProductImageImporter, QuantityExporter, RemoteId, StockMoveWrite,
    StockPropagator, ThumbnailResizer, WriteContext,
};
use prestalink_db::{apply_schema, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Logs go to stderr; stdout carries command output
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = Config::parse();

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(DbConfig::default().max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store = PgStore::new(pool.clone());

    let result = match config.command {
        Command::InitDb => apply_schema(&pool).await.map(|_| println!("Schema applied.")),
        Command::ImportImages {
            ref backend,
            product,
            ref images,
        } => {
            return import_images(&store, &config, backend, product, images).await;
        }
        Command::WriteMove {
            ref moves,
            state,
            qty,
            from,
            to,
            no_export,
        } => {
            let vals = StockMoveWrite {
                state,
                product_qty: qty,
                location_id: from,
                location_dest_id: to,
                ..Default::default()
            };
            let ctx = if no_export {
                WriteContext::no_export()
            } else {
                WriteContext::default()
            };
            write_moves(&store, moves, &vals, ctx).await
        }
        Command::PostInventory { inventory } => post_inventory(&store, inventory).await,
        Command::TrackingAdded { picking } => tracking_added(&store, picking).await,
        Command::Checkpoints { limit } => show_checkpoints(&store, limit).await,
    };

    result.map_err(|e| anyhow::anyhow!(e.user_message()))
}

/// Import images of one product from a configured backend
async fn import_images(
    store: &PgStore,
    config: &Config,
    backend_name: &str,
    product: RemoteId,
    images: &[RemoteId],
) -> anyhow::Result<()> {
    let backends = load_backends_config(config.config.as_deref())?
        .context("No backends.toml found. Create one or pass --config")?;
    let entry = backends
        .find(backend_name)
        .with_context(|| format!("Backend '{}' not found in configuration", backend_name))?;
    if !entry.enabled {
        bail!("Backend '{}' is disabled", backend_name);
    }
    let backend = entry.to_backend();
    let api_key = config
        .api_key
        .as_deref()
        .context("PRESTASHOP_API_KEY is required for imports")?;

    let client = PrestashopClient::with_config(&backend.location, api_key, HttpConfig::default())
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let adapter = ProductImageAdapter::new(&client);
    let resizer = ThumbnailResizer::default();
    let importer = ProductImageImporter::new(&backend, store, &adapter, &resizer)?;

    // Two tasks importing the same image would race on one binding.
    let total_requested = images.len();
    let images = unique_ids(images);
    if images.len() < total_requested {
        warn!(
            "Ignoring {} repeated image ids",
            total_requested - images.len()
        );
    }

    info!(
        "Importing {} images of product {} from {}",
        images.len(),
        product,
        backend.name
    );

    let total = images.len();
    let importer = &importer;
    let results: Vec<_> = stream::iter(images.iter().copied().enumerate())
        .map(|(i, image)| async move {
            let result = importer.run(product, image).await;
            match &result {
                Ok(outcome) => info!("[{}/{}] Image {}: {:?}", i + 1, total, image, outcome),
                Err(e) => error!("[{}/{}] Image {} failed: {}", i + 1, total, image, e),
            }
            result
        })
        .buffer_unordered(ImportConfig::default().concurrency)
        .collect()
        .await;

    let mut stats = ImportStats::new();
    for result in results {
        match result {
            Ok(outcome) => stats.record(outcome),
            Err(_) => stats.record_failure(),
        }
    }

    info!(
        "Import complete: {} created, {} updated, {} checkpointed, {} failed out of {} total",
        stats.created,
        stats.updated,
        stats.checkpointed,
        stats.failed,
        stats.total()
    );
    if stats.needs_attention() {
        warn!("Some images need attention. Run `prestalink checkpoints` for details.");
    }

    Ok(())
}

async fn write_moves(
    store: &PgStore,
    moves: &[i64],
    vals: &StockMoveWrite,
    ctx: WriteContext,
) -> Result<(), AppError> {
    let quantities = QuantityExporter::new(store, store);
    let propagator = StockPropagator::new(store, &quantities);
    let exported = propagator.write_moves(moves, vals, ctx).await?;
    println!(
        "Wrote {} moves, exported {} products",
        moves.len(),
        exported.len()
    );
    Ok(())
}

async fn post_inventory(store: &PgStore, inventory: i64) -> Result<(), AppError> {
    let quantities = QuantityExporter::new(store, store);
    let propagator = StockPropagator::new(store, &quantities);
    let exported = propagator.post_inventory(inventory).await?;
    println!(
        "Inventory {} posted, exported {} products",
        inventory,
        exported.len()
    );
    Ok(())
}

async fn tracking_added(store: &PgStore, picking_id: i64) -> Result<(), AppError> {
    use prestalink_core::ports::StockStore;

    let picking = store
        .load_picking(picking_id)
        .await?
        .ok_or_else(|| AppError::Generic(format!("Picking {} not found", picking_id)))?;
    if picking.carrier_tracking_ref.is_none() {
        warn!("Picking {} has no tracking number", picking_id);
    }

    let listener = PickingListener::new(store, store);
    let scheduled = listener.on_tracking_number_added(&picking).await?;
    println!("Scheduled {} tracking number exports", scheduled);
    Ok(())
}

async fn show_checkpoints(store: &PgStore, limit: usize) -> Result<(), AppError> {
    let checkpoints = store.list_checkpoints(limit).await?;

    if checkpoints.is_empty() {
        println!("No checkpoints.");
        return Ok(());
    }

    for checkpoint in &checkpoints {
        let record = checkpoint
            .record
            .map(|r| format!("{} {}", r.model, r.id))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  backend {}  {}  {}",
            checkpoint.created_at.format("%Y-%m-%dT%H:%M:%SZ"),
            checkpoint.backend_id,
            record,
            checkpoint.message
        );
    }
    Ok(())
}
