use std::{path::Path, sync::Arc};

use dashmap::DashMap;
use log::{debug, info};

use crate::{
    DEFAULT_MAX_PAGE_SIZE,
    core::{
        logical::{compare_records, record_matches},
        predicate::Predicate,
        record::Record,
        schema::{OrderBy, TableDescriptor},
    },
    error::SourceError,
};

use super::{DataSource, SourceResult};

/// Tables of JSON records held in memory.
///
/// Like the hosted database it never returns more than `page_cap` rows per query.
pub struct MemorySource {
    tables: DashMap<String, Arc<Vec<Record>>>,
    page_cap: usize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_page_cap(DEFAULT_MAX_PAGE_SIZE)
    }

    pub fn with_page_cap(page_cap: usize) -> Self {
        Self {
            tables: DashMap::new(),
            page_cap: page_cap.max(1),
        }
    }

    pub fn insert_table(&self, name: &str, records: Vec<Record>) {
        debug!("Loaded {} records into table {}", records.len(), name);
        self.tables.insert(name.to_string(), Arc::new(records));
    }

    pub fn table_len(&self, name: &str) -> Option<usize> {
        self.tables.get(name).map(|records| records.len())
    }

    /// Loads every `<table>.json` file (a JSON array of objects) in `dir`.
    pub async fn load_json_dir(&self, dir: impl AsRef<Path>) -> SourceResult<usize> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut loaded = 0;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();

            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            let Some(table) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let bytes = tokio::fs::read(&path).await?;
            let records = parse_records(&bytes)
                .map_err(|e| SourceError::Decode(format!("{}: {}", path.display(), e)))?;

            self.insert_table(table, records);
            loaded += 1;
        }

        info!("Loaded {} tables from {}", loaded, dir.display());
        Ok(loaded)
    }

    fn rows(&self, table: &str) -> SourceResult<Arc<Vec<Record>>> {
        self.tables
            .get(table)
            .map(|rows| Arc::clone(rows.value()))
            .ok_or_else(|| SourceError::UnknownTable(table.to_string()))
    }
}

fn parse_records(bytes: &[u8]) -> Result<Vec<Record>, String> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
    values.into_iter().map(Record::try_from).collect()
}

impl DataSource for MemorySource {
    async fn query(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> SourceResult<Vec<Record>> {
        let rows = self.rows(&table.name)?;

        let ordering: Vec<(OrderBy, String)> = ordering
            .iter()
            .map(|order| {
                let path = table
                    .find_field(&order.field)
                    .map(|field| field.path().to_string())
                    .unwrap_or_else(|| order.field.clone());
                (order.clone(), path)
            })
            .collect();

        let mut matching: Vec<&Record> = rows
            .iter()
            .filter(|record| record_matches(record, predicates))
            .collect();

        matching.sort_by(|a, b| compare_records(a, b, &ordering));

        Ok(matching
            .into_iter()
            .skip(offset)
            .take(limit.min(self.page_cap))
            .cloned()
            .collect())
    }

    async fn count(&self, table: &TableDescriptor, predicates: &[Predicate]) -> SourceResult<u64> {
        let rows = self.rows(&table.name)?;
        Ok(rows.iter().filter(|record| record_matches(record, predicates)).count() as u64)
    }

    fn get_name(&self) -> &'static str {
        "memory"
    }
}
