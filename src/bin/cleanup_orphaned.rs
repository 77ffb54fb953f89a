//! Maintenance tool that removes uploaded bytes no record references.
//!
//! Walks `{data_dir}/uploads` and deletes every file or directory whose
//! path is not stored in the metadata document. With `--purge-trash` the
//! records in the trash are hard-deleted first, so their bytes are swept too.
//!
//! Usage:
//!   cleanup_orphaned --data-dir public --db-path database.json [--purge-trash] [--dry-run]
//!
//! Run it while the server is stopped; the document is rewritten wholesale.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use minidrive::drive::StorageLayout;
use minidrive::maintenance::{find_orphans_among, purge_trash, purgeable, remove_orphans};
use minidrive::store::MetadataStore;

#[derive(Parser, Debug)]
#[command(name = "cleanup_orphaned")]
#[command(about = "Delete uploaded files and folders that no record references")]
struct Args {
    /// Directory holding the `uploads` tree
    #[arg(long, env = "DATA_DIR", default_value = "public")]
    data_dir: PathBuf,

    /// Path to the JSON metadata document
    #[arg(long, env = "DB_PATH", default_value = "database.json")]
    db_path: PathBuf,

    /// Permanently remove records in the trash before sweeping
    #[arg(long, default_value = "false")]
    purge_trash: bool,

    /// Dry run - show what would be done without making changes
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Cleaning up {}", args.data_dir.display());
    if args.dry_run {
        tracing::info!("DRY RUN mode - no changes will be made");
    }

    if !args.db_path.exists() {
        anyhow::bail!("Database {} does not exist", args.db_path.display());
    }
    let store = MetadataStore::open(&args.db_path)?;
    let layout = StorageLayout::new(&args.data_dir);

    let mut records = store.all()?;
    if args.purge_trash {
        if args.dry_run {
            // Sweep as if the purge had happened.
            let doomed = purgeable(&records);
            tracing::info!("Would purge {} records from the trash", doomed.len());
            records.retain(|f| !doomed.contains(&f.id));
        } else {
            purge_trash(&store)?;
            records = store.all()?;
        }
    }

    let orphans = find_orphans_among(&records, &layout)?;
    if orphans.is_empty() {
        tracing::info!("No orphaned files found");
        return Ok(());
    }

    for item in &orphans {
        let kind = if item.is_dir { "folder" } else { "file" };
        tracing::info!("Orphaned {}: {}", kind, item.path);
    }

    if args.dry_run {
        tracing::info!("Would delete {} orphaned items", orphans.len());
        return Ok(());
    }

    let report = remove_orphans(&orphans);

    tracing::info!("=== Cleanup Complete ===");
    tracing::info!("Files deleted: {}", report.files_removed);
    tracing::info!("Folders deleted: {}", report.dirs_removed);
    tracing::info!("Failed: {}", report.failures);

    if report.failures > 0 {
        tracing::warn!("Some items could not be deleted. Run again to retry.");
    }

    Ok(())
}
