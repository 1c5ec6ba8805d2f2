use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::Snapshot;
use crate::utils::error::{AppError, Result};

/// Durable mirror of the current snapshot. Holds at most one snapshot;
/// every save overwrites the previous one.
#[async_trait]
pub trait SnapshotPersistence: Send + Sync {
    /// Human readable location, for logs.
    fn describe(&self) -> String;

    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<Snapshot>>;

    async fn save(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Opens the backend named by `storage`: `sqlite:` URLs select SQLite,
/// anything else is a JSON file path.
pub async fn open(storage: &str) -> Result<Arc<dyn SnapshotPersistence>> {
    if storage.starts_with("sqlite:") {
        #[cfg(feature = "sqlite")]
        {
            let store = SqliteSnapshotPersistence::connect(storage).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "sqlite"))]
        {
            return Err(AppError::Persistence(format!(
                "{} requires the `sqlite` feature",
                storage
            )));
        }
    }
    Ok(Arc::new(FileSnapshotPersistence::new(storage)))
}

pub struct FileSnapshotPersistence {
    path: PathBuf,
}

impl FileSnapshotPersistence {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotPersistence for FileSnapshotPersistence {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<Option<Snapshot>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot = serde_json::from_str(&raw).map_err(|e| {
            AppError::Persistence(format!("{} is not a valid snapshot: {}", self.describe(), e))
        })?;
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let body = serde_json::to_vec_pretty(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSnapshotPersistence;

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use sqlx::SqlitePool;
    use std::str::FromStr;

    const CREATE_TABLE: &str = r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            fetched_at INTEGER NOT NULL,
            payload TEXT NOT NULL,
            saved_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
    "#;

    const UPSERT: &str = r#"
        INSERT INTO snapshots (id, fetched_at, payload, saved_at)
        VALUES (1, ?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(id) DO UPDATE SET
            fetched_at = excluded.fetched_at,
            payload = excluded.payload,
            saved_at = excluded.saved_at
    "#;

    /// Single-row SQLite table holding the latest snapshot as JSON.
    pub struct SqliteSnapshotPersistence {
        url: String,
        pool: SqlitePool,
    }

    /// File path named by a `sqlite:` URL; `None` for in-memory databases.
    pub(super) fn database_path(url: &str) -> Option<&Path> {
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))?;
        let path = rest.split('?').next().unwrap_or(rest);
        if path.is_empty() || path == ":memory:" {
            return None;
        }
        Some(Path::new(path))
    }

    impl SqliteSnapshotPersistence {
        pub async fn connect(url: &str) -> Result<Self> {
            if let Some(parent) = database_path(url)
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
            let pool = SqlitePoolOptions::new()
                .max_connections(2)
                .connect_with(options)
                .await?;
            sqlx::query(CREATE_TABLE).execute(&pool).await?;
            Ok(Self {
                url: url.to_string(),
                pool,
            })
        }
    }

    #[async_trait]
    impl SnapshotPersistence for SqliteSnapshotPersistence {
        fn describe(&self) -> String {
            self.url.clone()
        }

        async fn load(&self) -> Result<Option<Snapshot>> {
            let payload: Option<String> =
                sqlx::query_scalar("SELECT payload FROM snapshots WHERE id = 1")
                    .fetch_optional(&self.pool)
                    .await?;
            payload
                .map(|raw| {
                    serde_json::from_str(&raw).map_err(|e| {
                        AppError::Persistence(format!("stored snapshot is invalid: {}", e))
                    })
                })
                .transpose()
        }

        async fn save(&self, snapshot: &Snapshot) -> Result<()> {
            let payload = serde_json::to_string(snapshot)?;
            sqlx::query(UPSERT)
                .bind(snapshot.fetched_at)
                .bind(payload)
                .execute(&self.pool)
                .await?;
            Ok(())
        }
    }
}
