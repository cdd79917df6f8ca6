//! Read-only access to the public-API catalog (SQLite).
//!
//! The pipeline only ever reads the catalog. Schema creation and inserts exist
//! so fixtures and local setups can build a catalog file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiParameter {
    pub param_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogResource {
    pub api_id: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub provider: String,
    pub is_active: bool,
    #[serde(default)]
    pub parameters: Vec<ApiParameter>,
}

impl CatalogResource {
    /// Text indexed for similarity search.
    pub fn search_text(&self) -> String {
        format!("{} {} {}", self.name, self.description, self.category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub category: String,
    pub count: usize,
    pub sample_names: Vec<String>,
}

/// Async-safe handle to the catalog.
///
/// Queries run on tokio's blocking pool so SQLite I/O never stalls the
/// async workers.
#[derive(Clone)]
pub struct CatalogHandle {
    inner: Arc<std::sync::Mutex<CatalogDb>>,
}

impl CatalogHandle {
    pub fn new(db: CatalogDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure against the catalog on a blocking thread.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&CatalogDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("Catalog lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("Catalog task panicked")?
    }
}

pub struct CatalogDb {
    conn: Connection,
}

const RESOURCE_COLUMNS: &str = "api_id, name, description, category, provider, is_active";

impl CatalogDb {
    /// Open an existing catalog read-only.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Catalog not found at {}", path.display());
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open catalog {}", path.display()))?;
        Ok(Self { conn })
    }

    /// Create (or open) a writable catalog with the schema in place.
    pub fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.create_schema()?;
        Ok(db)
    }

    fn create_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS apis (
                    api_id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    category TEXT NOT NULL DEFAULT '',
                    provider TEXT NOT NULL DEFAULT '',
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS api_parameters (
                    api_id TEXT NOT NULL REFERENCES apis(api_id),
                    param_name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT ''
                );

                CREATE INDEX IF NOT EXISTS idx_api_parameters_api ON api_parameters(api_id);
                CREATE INDEX IF NOT EXISTS idx_apis_category ON apis(category);
                ",
            )
            .context("Failed to create catalog schema")?;
        Ok(())
    }

    pub fn insert_resource(&self, resource: &CatalogResource) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO apis (api_id, name, description, category, provider, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    resource.api_id,
                    resource.name,
                    resource.description,
                    resource.category,
                    resource.provider,
                    resource.is_active,
                ],
            )
            .context("Failed to insert api")?;
        self.conn
            .execute(
                "DELETE FROM api_parameters WHERE api_id = ?1",
                params![resource.api_id],
            )
            .context("Failed to clear api parameters")?;
        for p in &resource.parameters {
            self.conn
                .execute(
                    "INSERT INTO api_parameters (api_id, param_name, description) VALUES (?1, ?2, ?3)",
                    params![resource.api_id, p.param_name, p.description],
                )
                .context("Failed to insert api parameter")?;
        }
        Ok(())
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM apis", [], |row| row.get(0))
            .context("Failed to count apis")?;
        Ok(n.max(0) as usize)
    }

    fn query_resources(&self, sql: &str, args: &[&dyn rusqlite::ToSql]) -> Result<Vec<CatalogResource>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare catalog query")?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(CatalogResource {
                    api_id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    category: row.get(3)?,
                    provider: row.get(4)?,
                    is_active: row.get(5)?,
                    parameters: Vec::new(),
                })
            })
            .context("Failed to query apis")?;
        let mut resources = Vec::new();
        for row in rows {
            resources.push(row.context("Failed to read api row")?);
        }
        Ok(resources)
    }

    pub fn list_active_resources(&self) -> Result<Vec<CatalogResource>> {
        self.query_resources(
            &format!("SELECT {RESOURCE_COLUMNS} FROM apis WHERE is_active = 1 ORDER BY api_id"),
            &[],
        )
    }

    /// Look up one resource with its parameters.
    pub fn get_resource(&self, api_id: &str) -> Result<Option<CatalogResource>> {
        let resource = self
            .conn
            .query_row(
                &format!("SELECT {RESOURCE_COLUMNS} FROM apis WHERE api_id = ?1"),
                params![api_id],
                |row| {
                    Ok(CatalogResource {
                        api_id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        category: row.get(3)?,
                        provider: row.get(4)?,
                        is_active: row.get(5)?,
                        parameters: Vec::new(),
                    })
                },
            )
            .optional()
            .context("Failed to query api")?;
        match resource {
            Some(mut r) => {
                r.parameters = self.parameters(api_id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    pub fn find_by_category(&self, category: &str) -> Result<Vec<CatalogResource>> {
        self.query_resources(
            &format!(
                "SELECT {RESOURCE_COLUMNS} FROM apis WHERE is_active = 1 AND category = ?1 ORDER BY api_id"
            ),
            &[&category],
        )
    }

    pub fn parameters(&self, api_id: &str) -> Result<Vec<ApiParameter>> {
        let mut stmt = self
            .conn
            .prepare("SELECT param_name, description FROM api_parameters WHERE api_id = ?1 ORDER BY rowid")
            .context("Failed to prepare parameters query")?;
        let rows = stmt
            .query_map(params![api_id], |row| {
                Ok(ApiParameter {
                    param_name: row.get(0)?,
                    description: row.get(1)?,
                })
            })
            .context("Failed to query parameters")?;
        let mut params = Vec::new();
        for row in rows {
            params.push(row.context("Failed to read parameter row")?);
        }
        Ok(params)
    }

    /// Active resource counts per category with up to three sample names, largest first.
    pub fn domain_summaries(&self) -> Result<Vec<DomainSummary>> {
        let mut summaries: Vec<DomainSummary> = Vec::new();
        for resource in self.list_active_resources()? {
            match summaries.iter_mut().find(|s| s.category == resource.category) {
                Some(summary) => {
                    summary.count += 1;
                    if summary.sample_names.len() < 3 {
                        summary.sample_names.push(resource.name);
                    }
                }
                None => summaries.push(DomainSummary {
                    category: resource.category,
                    count: 1,
                    sample_names: vec![resource.name],
                }),
            }
        }
        summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
        Ok(summaries)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn resource(id: &str, name: &str, category: &str, params: &[&str]) -> CatalogResource {
        CatalogResource {
            api_id: id.to_string(),
            name: name.to_string(),
            description: format!("{} open data", name),
            category: category.to_string(),
            provider: "public".to_string(),
            is_active: true,
            parameters: params
                .iter()
                .map(|p| ApiParameter {
                    param_name: p.to_string(),
                    description: String::new(),
                })
                .collect(),
        }
    }

    /// Small catalog covering the dry-run ideas.
    pub fn sample_catalog() -> CatalogDb {
        let db = CatalogDb::new_in_memory().unwrap();
        for r in [
            resource("AIR-01", "Air quality measurements", "environment", &["station_code", "region_code", "pm10"]),
            resource("AIR-02", "Air quality forecast", "environment", &["region_code", "date"]),
            resource("TRF-01", "Traffic accident statistics", "transport", &["region_code", "year"]),
            resource("POP-01", "Population statistics by district", "population", &["adm_cd", "year"]),
            resource("HSP-01", "Hospital location registry", "health", &["hospital_id", "address", "lat", "lon"]),
            resource("WTH-01", "Weather observation archive", "environment", &["station_code", "date"]),
        ] {
            db.insert_resource(&r).unwrap();
        }
        let mut retired = resource("OLD-01", "Retired air quality feed", "environment", &[]);
        retired.is_active = false;
        db.insert_resource(&retired).unwrap();
        db
    }
}
