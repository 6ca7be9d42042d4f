use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::{
    cache::{AggregationCache, CacheStats},
    configuration::Configuration,
    core::{
        aggregation::{Accumulator, AggregationResult, AggregationSpec},
        catalog::Catalog,
        filter::{FilterNormalizer, FilterSpec},
        predicate::{PredicateTranslator, Translation},
        processor::{fetch::PaginatedFetch, full_scan::FullScan},
        record::Record,
        schema::{OrderBy, TableDescriptor},
    },
    error::{EngineError, Result},
    source::DataSource,
};

/// Request parameter holding the list sort, `field` or `-field`.
pub const SORT_PARAM: &str = "sort";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub records: Vec<Record>,
    pub page: usize,
    pub page_size: usize,
    pub has_more: bool,
}

/// Serves list, count and chart requests over one data source.
pub struct Engine<S: DataSource> {
    source: S,
    catalog: Catalog,
    cache: AggregationCache,
    config: Configuration,
}

impl<S: DataSource> Engine<S> {
    pub fn new(source: S, catalog: Catalog, config: Configuration) -> Self {
        let cache = AggregationCache::new(config.cache_ttl, config.cache_capacity);
        Self::with_cache(source, catalog, config, cache)
    }

    pub fn with_cache(source: S, catalog: Catalog, config: Configuration, cache: AggregationCache) -> Self {
        info!(
            "Engine ready: {} tables on {} source, batch {}, scan cap {}",
            catalog.len(),
            source.get_name(),
            config.batch_size,
            config.scan_cap
        );

        Self { source, catalog, cache, config }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// One page of matching records; `page` is 1-based.
    pub async fn list_page<K, V>(
        &self,
        table: &str,
        params: &[(K, V)],
        page: Option<usize>,
        page_size: Option<usize>,
    ) -> Result<Page>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let table = self.catalog.get(table)?;
        let (_, translation) = self.translate(&table, params);

        let sort = params
            .iter()
            .find(|(key, _)| key.as_ref() == SORT_PARAM)
            .and_then(|(_, value)| OrderBy::parse(value.as_ref()));
        let ordering = table.ordering(sort);

        let page = page.unwrap_or(1).max(1);
        let page_size = self.config.clamp_page_size(page_size);
        let offset = (page - 1).saturating_mul(page_size);

        let (records, has_more) = PaginatedFetch::new(&self.source, self.config.max_page_size)
            .fetch_with_lookahead(&table, &translation.predicates, &ordering, page_size, offset)
            .await?;

        debug!(
            "Listed {} records of {} (page {}, size {})",
            records.len(),
            table.name,
            page,
            page_size
        );

        Ok(Page { records, page, page_size, has_more })
    }

    pub async fn count<K, V>(&self, table: &str, params: &[(K, V)]) -> Result<u64>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let table = self.catalog.get(table)?;
        let (_, translation) = self.translate(&table, params);

        Ok(self.source.count(&table, &translation.predicates).await?)
    }

    /// A named aggregation of the table, served from the cache while fresh.
    pub async fn aggregation<K, V>(
        &self,
        table: &str,
        aggregation_id: &str,
        params: &[(K, V)],
    ) -> Result<Arc<AggregationResult>>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let table = self.catalog.get(table)?;
        let spec = table
            .find_aggregation(aggregation_id)
            .ok_or_else(|| EngineError::UnknownAggregation {
                table: table.name.clone(),
                id: aggregation_id.to_string(),
            })?;

        let (filters, translation) = self.translate(&table, params);
        let key = AggregationCache::key(&table.name, aggregation_id, &filters.canonical());

        self.cache
            .get_or_try_insert_with(key, || self.compute(&table, spec, translation))
            .await
    }

    /// Runs a caller-built aggregation without touching the cache.
    pub async fn aggregate<K, V>(&self, table: &str, spec: &AggregationSpec, params: &[(K, V)]) -> Result<AggregationResult>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let table = self.catalog.get(table)?;
        let (_, translation) = self.translate(&table, params);

        self.compute(&table, spec, translation).await
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn translate<K, V>(&self, table: &TableDescriptor, params: &[(K, V)]) -> (FilterSpec, Translation)
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let filters = FilterNormalizer::new(&table.filters)
            .normalize(params.iter().map(|(key, value)| (key.as_ref(), value.as_ref())));

        let translation = PredicateTranslator::new(table, self.config.pattern_cap).translate(&filters);

        (filters, translation)
    }

    async fn compute(&self, table: &TableDescriptor, spec: &AggregationSpec, translation: Translation) -> Result<AggregationResult> {
        debug!(
            "Computing aggregation {} of {} with {} predicates",
            spec.id,
            table.name,
            translation.predicates.len()
        );

        let mut accumulator = Accumulator::new(table, spec)?;

        let outcome = FullScan::new(
            &self.source,
            self.config.batch_size,
            self.config.scan_cap,
            self.config.scan_deadline,
        )
        .run(table, &translation.predicates, |record| accumulator.visit(record))
        .await?;

        let mut result = accumulator.finish();
        result.truncated = outcome.truncated;
        result.capped_filters = translation.capped;

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::ManualClock,
        core::{
            aggregation::{DimensionSpec, MissingPolicy},
            field_type::FieldType,
            schema::{FieldDescriptor, FilterBinding, MatchKind},
        },
        source::memory::MemorySource,
    };
    use serde_json::{Value, json};
    use std::time::Duration;

    fn catalog() -> Catalog {
        let catalog = Catalog::new();
        catalog
            .insert(
                TableDescriptor::new("companies")
                    .field(FieldDescriptor::new("name", FieldType::Text))
                    .field(FieldDescriptor::new("industry", FieldType::Text))
                    .filter(FilterBinding::new("industry", &["industry"], MatchKind::Equals))
                    .filter(FilterBinding::new("search", &["name"], MatchKind::Contains))
                    .aggregation(
                        AggregationSpec::new("overview")
                            .dimension(DimensionSpec::categorical("industries", "industry")),
                    ),
            )
            .unwrap();
        catalog
    }

    fn source(rows: &[Value]) -> MemorySource {
        let source = MemorySource::new();
        source.insert_table(
            "companies",
            rows.iter().cloned().map(|row| Record::try_from(row).unwrap()).collect(),
        );
        source
    }

    fn engine(clock: Arc<ManualClock>) -> Engine<MemorySource> {
        let rows: Vec<Value> = (1..=30)
            .map(|id| {
                let industry = if id % 3 == 0 { "Biotech" } else { "Fintech" };
                json!({"id": id, "name": format!("Company {id}"), "industry": industry})
            })
            .collect();

        let config = Configuration::default();
        let cache = AggregationCache::with_clock(config.cache_ttl, config.cache_capacity, clock);
        Engine::with_cache(source(&rows), catalog(), config, cache)
    }

    #[tokio::test]
    async fn test_list_page_numbers_are_one_based() {
        let engine = engine(Arc::new(ManualClock::new()));

        let page = engine
            .list_page("companies", &[("industry", "Fintech")], Some(2), Some(5))
            .await
            .unwrap();

        let ids: Vec<i64> = page
            .records
            .iter()
            .filter_map(|r| r.get_path("id").and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, vec![8, 10, 11, 13, 14]);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_list_page_honors_sort_param() {
        let engine = engine(Arc::new(ManualClock::new()));

        let page = engine
            .list_page("companies", &[("sort", "-id")], None, Some(3))
            .await
            .unwrap();

        let ids: Vec<i64> = page
            .records
            .iter()
            .filter_map(|r| r.get_path("id").and_then(Value::as_i64))
            .collect();
        assert_eq!(ids, vec![30, 29, 28]);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_count_applies_filters() {
        let engine = engine(Arc::new(ManualClock::new()));

        let none: &[(&str, &str)] = &[];
        assert_eq!(engine.count("companies", none).await.unwrap(), 30);
        assert_eq!(engine.count("companies", &[("industry", "Biotech")]).await.unwrap(), 10);
        assert_eq!(engine.count("companies", &[("industry", "all")]).await.unwrap(), 30);
    }

    #[tokio::test]
    async fn test_reordered_filters_hit_the_cache() {
        let engine = engine(Arc::new(ManualClock::new()));

        let first = engine
            .aggregation("companies", "overview", &[("industry", "Fintech"), ("search", "Company")])
            .await
            .unwrap();
        let second = engine
            .aggregation("companies", "overview", &[("search", "Company"), ("industry", "Fintech")])
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_recomputed() {
        let clock = Arc::new(ManualClock::new());
        let engine = engine(clock.clone());
        let none: &[(&str, &str)] = &[];

        let first = engine.aggregation("companies", "overview", none).await.unwrap();
        clock.advance(Duration::from_secs(601));
        let second = engine.aggregation("companies", "overview", none).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_unknown_names_are_typed_errors() {
        let engine = engine(Arc::new(ManualClock::new()));
        let none: &[(&str, &str)] = &[];

        assert!(matches!(
            engine.aggregation("companies", "missing", none).await,
            Err(EngineError::UnknownAggregation { .. })
        ));
        assert!(matches!(
            engine.count("people", none).await,
            Err(EngineError::UnknownTable(_))
        ));
    }

    #[tokio::test]
    async fn test_ad_hoc_aggregate() {
        let engine = engine(Arc::new(ManualClock::new()));
        let spec = AggregationSpec::new("adhoc").dimension(
            DimensionSpec::categorical("industries", "industry").missing(MissingPolicy::Exclude),
        );

        let result = engine
            .aggregate("companies", &spec, &[("industry", "Biotech")])
            .await
            .unwrap();

        assert_eq!(result.scanned, 10);
        assert_eq!(result.dimension("industries").unwrap()[0].value, 10);
        assert!(!result.truncated);
    }
}
