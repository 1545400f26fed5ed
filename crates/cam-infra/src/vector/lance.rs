//! LanceDB connection wrapper and table lifecycle helpers.
//!
//! `LanceVectorStore` owns a `lancedb::Connection` at a filesystem path and
//! knows how to open, create and drop tables from an Arrow schema. Record
//! semantics live in [`super::memory`].

use std::path::PathBuf;
use std::sync::Arc;

use arrow_schema::{DataType, Schema};

/// LanceDB connection rooted at a directory.
pub struct LanceVectorStore {
    db: lancedb::Connection,
    base_path: PathBuf,
}

impl LanceVectorStore {
    /// Open or create a LanceDB database at the given path.
    ///
    /// Creates the directory if it does not exist.
    pub async fn new(base_path: PathBuf) -> Result<Self, lancedb::Error> {
        std::fs::create_dir_all(&base_path).map_err(|e| lancedb::Error::CreateDir {
            path: base_path.display().to_string(),
            source: e,
        })?;

        let uri = base_path
            .to_str()
            .ok_or_else(|| lancedb::Error::InvalidInput {
                message: format!("Path contains invalid UTF-8: {}", base_path.display()),
            })?;

        let db = lancedb::connect(uri).execute().await?;

        Ok(Self { db, base_path })
    }

    /// Open the table, creating it empty with `schema` if it does not exist.
    pub async fn ensure_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
    ) -> Result<lancedb::Table, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(table),
            Err(lancedb::Error::TableNotFound { .. }) => {
                self.db
                    .create_empty_table(table_name, schema)
                    .execute()
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Open an existing table, or `None` when it does not exist.
    pub async fn open_table(&self, table_name: &str) -> Result<Option<lancedb::Table>, lancedb::Error> {
        match self.db.open_table(table_name).execute().await {
            Ok(table) => Ok(Some(table)),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn table_exists(&self, table_name: &str) -> bool {
        matches!(self.open_table(table_name).await, Ok(Some(_)))
    }

    /// Drop a table. Dropping a missing table is not an error.
    pub async fn drop_table(&self, table_name: &str) -> Result<(), lancedb::Error> {
        match self.db.drop_table(table_name, &[]).await {
            Ok(()) => Ok(()),
            Err(lancedb::Error::TableNotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub async fn table_names(&self) -> Result<Vec<String>, lancedb::Error> {
        self.db.table_names().execute().await
    }

    /// Width of the fixed-size `vector` column of an existing table.
    ///
    /// `None` when the table is missing or has no such column.
    pub async fn vector_width(&self, table_name: &str) -> Result<Option<usize>, lancedb::Error> {
        let Some(table) = self.open_table(table_name).await? else {
            return Ok(None);
        };
        let schema = table.schema().await?;
        let width = schema
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            });
        Ok(width)
    }

    /// Column names of an existing table, in schema order.
    pub async fn column_names(&self, table_name: &str) -> Result<Option<Vec<String>>, lancedb::Error> {
        let Some(table) = self.open_table(table_name).await? else {
            return Ok(None);
        };
        let schema = table.schema().await?;
        Ok(Some(
            schema.fields().iter().map(|f| f.name().clone()).collect(),
        ))
    }

    pub fn base_path(&self) -> &PathBuf {
        &self.base_path
    }
}
