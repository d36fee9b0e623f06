use clap::{Parser, Subcommand};
use prestalink_core::models::RemoteId;
use prestalink_core::stock::MoveState;
use std::collections::HashSet;
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "prestalink")]
#[command(author, version, about = "ERP connector for PrestaShop shops")]
#[command(after_help = "Examples:
  prestalink init-db
  prestalink import-images --backend main --product 10 42 43
  prestalink write-move 7 8 --state done
  prestalink post-inventory 3
  prestalink checkpoints --limit 20")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// PrestaShop webservice key, required for imports
    #[arg(long, env = "PRESTASHOP_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Custom path to backends.toml configuration file
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database tables
    InitDb,
    /// Import product images from a shop
    #[command(after_help = "Example: prestalink import-images --backend main --product 10 42 43")]
    ImportImages {
        /// Backend name from the configuration file
        #[arg(short, long, value_name = "NAME")]
        backend: String,
        /// Remote id of the product owning the images
        #[arg(short, long, value_name = "ID")]
        product: RemoteId,
        /// Remote ids of the images to import
        #[arg(value_name = "IMAGE_ID", required = true)]
        images: Vec<RemoteId>,
    },
    /// Write stock moves and export the quantities they change
    #[command(after_help = "Examples:
  prestalink write-move 7 --state done
  prestalink write-move 7 8 --to 4 --no-export")]
    WriteMove {
        /// Local ids of the moves to write
        #[arg(value_name = "MOVE_ID", required = true)]
        moves: Vec<i64>,
        /// New state
        #[arg(long)]
        state: Option<MoveState>,
        /// New quantity
        #[arg(long)]
        qty: Option<f64>,
        /// New source location
        #[arg(long, value_name = "LOCATION_ID")]
        from: Option<i64>,
        /// New destination location
        #[arg(long, value_name = "LOCATION_ID")]
        to: Option<i64>,
        /// Write without exporting quantities
        #[arg(long)]
        no_export: bool,
    },
    /// Post an inventory and export the quantities of its products
    PostInventory {
        #[arg(value_name = "INVENTORY_ID")]
        inventory: i64,
    },
    /// Schedule the tracking number export of a shipped picking
    TrackingAdded {
        #[arg(value_name = "PICKING_ID")]
        picking: i64,
    },
    /// List the most recent checkpoints
    Checkpoints {
        /// Maximum number of checkpoints to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Drops repeated ids, keeping the first occurrence of each.
pub fn unique_ids(ids: &[RemoteId]) -> Vec<RemoteId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}
