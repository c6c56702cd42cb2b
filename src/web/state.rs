use crate::config::AppConfig;
use crate::db::executor::{QueryExecutor, QueryOutput};
use crate::db::schema_inspector::SchemaInspector;
use crate::db::{DbError, DbPool};
use crate::ingest::schema::{ColumnSchema, TableSchema};
use crate::ingest::{IngestError, IngestManager};
use crate::llm::LlmManager;
use crate::resolve::QueryResolver;
use std::path::PathBuf;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::info;

/// The one table currently available for querying.
#[derive(Debug, Clone)]
pub struct ActiveDataset {
    pub table_name: String,
    pub columns: Vec<ColumnSchema>,
    pub row_count: u64,
}

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub schema_inspector: SchemaInspector,
    pub executor: QueryExecutor,
    pub ingest_manager: IngestManager,
    pub resolver: QueryResolver,
    /// Replaced only under the write guard; requests hold the read guard
    /// from schema lookup through execution.
    dataset: RwLock<Option<ActiveDataset>>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: DbPool, llm_manager: LlmManager, data_dir: PathBuf) -> Self {
        Self {
            config,
            data_dir,
            schema_inspector: SchemaInspector::new(db_pool.clone()),
            executor: QueryExecutor::new(db_pool.clone()),
            ingest_manager: IngestManager::new(db_pool),
            resolver: QueryResolver::new(llm_manager),
            dataset: RwLock::new(None),
            startup_time: chrono::Utc::now(),
        }
    }

    pub async fn active_table(&self) -> Option<String> {
        self.dataset
            .read()
            .await
            .as_ref()
            .map(|dataset| dataset.table_name.clone())
    }

    /// Writes the upload to disk, loads it and makes it the active dataset.
    /// Last upload wins.
    pub async fn replace_dataset(&self, table_name: &str, contents: &[u8]) -> Result<ActiveDataset, IngestError> {
        let mut guard = self.dataset.write().await;

        let upload_dir = self.data_dir.join("uploads");
        tokio::fs::create_dir_all(&upload_dir).await?;
        let path = upload_dir.join(format!("{}.csv", table_name));
        tokio::fs::write(&path, contents).await?;

        let report = self.ingest_manager.ingest_file(&path, table_name).await?;

        let dataset = ActiveDataset {
            table_name: report.schema.name,
            columns: report.schema.columns,
            row_count: report.rows_processed,
        };

        if let Some(previous) = guard.as_ref() {
            if previous.table_name != dataset.table_name {
                info!("Active dataset changed from {} to {}", previous.table_name, dataset.table_name);
            }
        }
        *guard = Some(dataset.clone());

        Ok(dataset)
    }

    /// Read access to the active dataset. Upload waits until the view is
    /// dropped, so everything done through one view sees the same table.
    pub async fn read_dataset(&self) -> DatasetView<'_> {
        DatasetView {
            dataset: self.dataset.read().await,
            state: self,
        }
    }
}

/// The active dataset held under the read guard for one request.
pub struct DatasetView<'a> {
    dataset: RwLockReadGuard<'a, Option<ActiveDataset>>,
    state: &'a AppState,
}

impl DatasetView<'_> {
    pub fn table_name(&self) -> Option<&str> {
        self.dataset.as_ref().map(|dataset| dataset.table_name.as_str())
    }

    pub async fn describe(&self, table: &str) -> Result<(TableSchema, u64), DbError> {
        self.state.schema_inspector.describe(table).await
    }

    pub async fn execute(&self, sql: &str) -> Result<QueryOutput, DbError> {
        self.state.executor.run(sql).await
    }
}
