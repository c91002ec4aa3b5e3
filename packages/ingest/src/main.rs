#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the crime incident shapefile loader.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use delito_map_database::store::PostgresStore;
use delito_map_database::{db, queries, run_migrations};
use delito_map_ingest::{LoadParams, load_shapefile};

#[derive(Parser)]
#[command(name = "delito_map_ingest", about = "Crime incident shapefile loader")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a point shapefile of incidents into the database
    Load {
        /// Path to the `.shp` file (the sibling `.dbf` is read with it)
        shapefile: PathBuf,
        /// EPSG code of the shapefile's coordinate system
        #[arg(long)]
        srid: Option<i32>,
        /// Upsert against existing rows by `OBJECTID` instead of clearing
        /// the table first
        #[arg(long)]
        keep_existing: bool,
    },
    /// Run database migrations
    Migrate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Migrate => {
            log::info!("Running database migrations...");
            let db = db::connect_from_env().await?;
            run_migrations(db.as_ref()).await?;
            log::info!("Migrations complete.");
        }
        Commands::Load {
            shapefile,
            srid,
            keep_existing,
        } => {
            let db = db::connect_from_env().await?;
            run_migrations(db.as_ref()).await?;

            let store = PostgresStore::new(db);

            let params = LoadParams {
                shapefile_path: shapefile,
                source_srid: srid,
                force_delete: !keep_existing,
            };

            let summary = load_shapefile(&store, &params).await?;

            let count = queries::count_incidents(store.database()).await?;
            log::info!(
                "{} feature(s) loaded ({} new, {} updated); crime_incidents now holds {count} row(s)",
                summary.total,
                summary.new,
                summary.updated,
            );
        }
    }

    Ok(())
}
