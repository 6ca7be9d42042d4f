use std::future::Future;

use crate::{
    core::{predicate::Predicate, record::Record, schema::{OrderBy, TableDescriptor}},
    error::SourceError,
};

pub mod memory;
pub mod postgrest;

use memory::MemorySource;
use postgrest::PostgrestSource;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Read side of the store behind the dashboard.
///
/// Implementations may return fewer than `limit` rows when they enforce their own
/// page cap; callers page with `offset` until a short page comes back.
#[allow(async_fn_in_trait)]
pub trait DataSource: Send + Sync + 'static {
    fn query(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> impl Future<Output = SourceResult<Vec<Record>>> + Send;

    fn count(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
    ) -> impl Future<Output = SourceResult<u64>> + Send;

    fn get_name(&self) -> &'static str;
}

/// Backend chosen at startup.
pub enum SourceBackend {
    Memory(MemorySource),
    Postgrest(PostgrestSource),
}

impl DataSource for SourceBackend {
    async fn query(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> SourceResult<Vec<Record>> {
        match self {
            SourceBackend::Memory(source) => source.query(table, predicates, ordering, limit, offset).await,
            SourceBackend::Postgrest(source) => source.query(table, predicates, ordering, limit, offset).await,
        }
    }

    async fn count(&self, table: &TableDescriptor, predicates: &[Predicate]) -> SourceResult<u64> {
        match self {
            SourceBackend::Memory(source) => source.count(table, predicates).await,
            SourceBackend::Postgrest(source) => source.count(table, predicates).await,
        }
    }

    fn get_name(&self) -> &'static str {
        match self {
            SourceBackend::Memory(source) => source.get_name(),
            SourceBackend::Postgrest(source) => source.get_name(),
        }
    }
}
