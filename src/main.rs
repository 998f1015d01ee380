use std::process::ExitCode;

use tracing::{error, info};

use boxroom::access::{GroupRepository, PermissionRepository};
use boxroom::library::{FolderRepository, UserFileRepository};
use boxroom::{Config, Database, FileStorage, FolderService, UserFileService};

const DEFAULT_CONFIG_PATH: &str = "boxroom.toml";

#[tokio::main]
async fn main() -> ExitCode {
    // Load configuration
    let path = std::env::var("BOXROOM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match Config::load_with_env(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {path}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = boxroom::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        boxroom::logging::init_console_only(&config.logging.level);
    }

    info!("Boxroom document library");

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &Config) -> boxroom::Result<()> {
    config.validate()?;
    let db = Database::open_with_config(&config.database).await?;
    let storage = FileStorage::new(&config.storage.path)?;
    info!("Attachments stored in {:?}", storage.base_path());

    let root = FolderService::new(&db, &storage).root().await?;
    let files = UserFileService::from_config(&db, &storage, &config.storage)?;
    info!("Uploads limited to {} bytes", files.max_file_size());

    let mut conn = db.acquire().await?;
    let folders = FolderRepository::count(&mut conn).await?;
    let file_count = UserFileRepository::count(&mut conn).await?;
    let groups = GroupRepository::count(&mut conn).await?;
    let permissions = PermissionRepository::count(&mut conn).await?;
    let size = FolderRepository::total_size(&mut conn, root.id).await?;
    drop(conn);

    info!(
        "Root folder {}: {} folders, {} files ({} bytes), {} groups, {} permissions",
        root.id, folders, file_count, size, groups, permissions
    );

    db.close().await;
    Ok(())
}
