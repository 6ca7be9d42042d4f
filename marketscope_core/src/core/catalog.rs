use std::{path::Path, sync::Arc};

use dashmap::DashMap;
use itertools::Itertools;
use log::info;

use crate::{
    core::{
        aggregation::{AggregationSpec, BucketTable, DimensionSpec, MissingPolicy, RankingSpec},
        field_type::{FieldType, TextNumberFormat},
        schema::{FieldDescriptor, FilterBinding, MatchKind, OrderBy, TableDescriptor},
    },
    error::EngineError,
};

/// Table descriptors the engine serves, keyed by table name.
#[derive(Default)]
pub struct Catalog {
    tables: DashMap<String, Arc<TableDescriptor>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a table, replacing any previous one with the same name.
    pub fn insert(&self, table: TableDescriptor) -> Result<(), EngineError> {
        table.validate().map_err(EngineError::Catalog)?;
        self.tables.insert(table.name.clone(), Arc::new(table));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<TableDescriptor>, EngineError> {
        self.tables
            .get(name)
            .map(|table| Arc::clone(table.value()))
            .ok_or_else(|| EngineError::UnknownTable(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.tables.iter().map(|entry| entry.key().clone()).sorted().collect()
    }

    pub fn tables(&self) -> Vec<Arc<TableDescriptor>> {
        self.tables
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .sorted_by(|a, b| a.name.cmp(&b.name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Parses a JSON array of table descriptors.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let tables: Vec<TableDescriptor> =
            serde_json::from_str(json).map_err(|e| EngineError::Catalog(e.to_string()))?;

        let catalog = Self::new();
        for table in tables {
            catalog.insert(table)?;
        }
        Ok(catalog)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Catalog(format!("{}: {}", path.display(), e)))?;

        let catalog = Self::from_json_str(&json)?;
        info!("Loaded {} tables from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Descriptors for the dashboard's tables.
    pub fn builtin() -> Result<Self, EngineError> {
        let catalog = Self::new();
        for table in [
            companies()?,
            investors()?,
            funding_rounds()?,
            incubators()?,
            sanctions(),
            rankings()?,
            news()?,
        ] {
            catalog.insert(table)?;
        }
        Ok(catalog)
    }
}

fn buckets(bounds: &[(&str, f64)]) -> Result<BucketTable, EngineError> {
    BucketTable::from_bounds(bounds).map_err(EngineError::Catalog)
}

fn text(name: &str) -> FieldDescriptor {
    FieldDescriptor::new(name, FieldType::Text)
}

fn country_filter(field: &str) -> FilterBinding {
    FilterBinding::new("country", &[field], MatchKind::Membership)
        .with_alias("us", &["United States"])
        .with_alias("usa", &["United States"])
        .with_alias("uk", &["United Kingdom"])
        .with_alias("gb", &["United Kingdom"])
        .with_alias("de", &["Germany"])
        .with_alias("fr", &["France"])
        .with_alias("uae", &["United Arab Emirates"])
}

fn millions() -> FieldType {
    FieldType::Formatted(TextNumberFormat::new("$", "M", 1.0, false))
}

fn companies() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("companies")
        .field(text("name"))
        .field(text("description"))
        .field(text("industry"))
        .field(FieldDescriptor::nested("country", "hq.country", FieldType::Text))
        .field(FieldDescriptor::nested("city", "hq.city", FieldType::Text))
        .field(FieldDescriptor::new("employees", FieldType::Integer))
        .field(FieldDescriptor::new("founded_year", FieldType::Integer))
        .field(FieldDescriptor::new("total_funding", millions()))
        .field(text("status"))
        .field(text("tags"))
        .filter(FilterBinding::new("search", &["name", "description"], MatchKind::Contains))
        .filter(FilterBinding::new("industry", &["industry"], MatchKind::Membership))
        .filter(country_filter("country"))
        .filter(FilterBinding::new("employees", &["employees"], MatchKind::Range))
        .filter(FilterBinding::new("founded", &["founded_year"], MatchKind::Range))
        .filter(FilterBinding::new("funding", &["total_funding"], MatchKind::Range))
        .filter(FilterBinding::new("status", &["status"], MatchKind::Equals))
        .filter(FilterBinding::new("tag", &["tags"], MatchKind::Contains))
        .order_by(OrderBy::asc("name"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("industries", "industry").top(10))
                .dimension(DimensionSpec::categorical("countries", "country").top(10))
                .dimension(DimensionSpec::numeric(
                    "team_sizes",
                    "employees",
                    buckets(&[
                        ("1-10", 1.0),
                        ("11-50", 11.0),
                        ("51-200", 51.0),
                        ("201-1000", 201.0),
                        ("1000+", 1001.0),
                    ])?,
                ))
                .dimension(DimensionSpec::numeric(
                    "funding",
                    "total_funding",
                    buckets(&[("<$1M", 0.0), ("$1M-$10M", 1.0), ("$10M-$100M", 10.0), ("$100M+", 100.0)])?,
                ))
                .ranking(RankingSpec::new("top_funded", "name", "total_funding", 10)),
        )
        .aggregation(
            AggregationSpec::new("status").dimension(
                DimensionSpec::categorical("statuses", "status").missing(MissingPolicy::Exclude),
            ),
        ))
}

fn investors() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("investors")
        .field(text("name"))
        .field(text("investor_type"))
        .field(text("country"))
        .field(text("focus_sectors"))
        .field(FieldDescriptor::new("portfolio_size", FieldType::Integer))
        .field(FieldDescriptor::new("min_ticket", FieldType::Float))
        .field(FieldDescriptor::new("max_ticket", FieldType::Float))
        .filter(FilterBinding::new("search", &["name", "focus_sectors"], MatchKind::Contains))
        .filter(FilterBinding::new("type", &["investor_type"], MatchKind::Equals))
        .filter(country_filter("country"))
        .filter(FilterBinding::new("sector", &["focus_sectors"], MatchKind::Contains))
        // Investors whose largest ticket reaches the requested amount.
        .filter(FilterBinding::new("min_investment", &["max_ticket"], MatchKind::Minimum))
        .filter(FilterBinding::new("max_investment", &["min_ticket"], MatchKind::Maximum))
        .filter(FilterBinding::new("portfolio", &["portfolio_size"], MatchKind::Range))
        .order_by(OrderBy::asc("name"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("types", "investor_type"))
                .dimension(DimensionSpec::categorical("countries", "country").top(10))
                .dimension(DimensionSpec::numeric(
                    "portfolio_sizes",
                    "portfolio_size",
                    buckets(&[("0-10", 0.0), ("10-50", 10.0), ("50-100", 50.0), ("100+", 100.0)])?,
                ))
                .ranking(RankingSpec::new("most_active", "name", "portfolio_size", 10)),
        ))
}

fn funding_rounds() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("funding_rounds")
        .field(text("company_name"))
        .field(text("round_type"))
        .field(text("lead_investor"))
        .field(text("industry"))
        .field(text("country"))
        .field(text("announced_on"))
        // Amounts in millions of USD.
        .field(FieldDescriptor::new("amount", FieldType::Float))
        .filter(FilterBinding::new("search", &["company_name", "lead_investor"], MatchKind::Contains))
        .filter(FilterBinding::new("round", &["round_type"], MatchKind::Equals))
        .filter(FilterBinding::new("industry", &["industry"], MatchKind::Membership))
        .filter(country_filter("country"))
        .filter(FilterBinding::new("amount", &["amount"], MatchKind::Range))
        .filter(FilterBinding::new("min_amount", &["amount"], MatchKind::Minimum))
        .order_by(OrderBy::desc("announced_on"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("round_types", "round_type"))
                .dimension(DimensionSpec::categorical("industries", "industry").top(10))
                .dimension(DimensionSpec::numeric(
                    "amounts",
                    "amount",
                    buckets(&[("0-10", 0.0), ("10-50", 10.0), ("50+", 50.0)])?,
                ))
                .ranking(RankingSpec::new("largest_rounds", "company_name", "amount", 10)),
        ))
}

fn incubators() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("incubators")
        .field(text("name"))
        .field(text("country"))
        .field(text("program_type"))
        .field(text("focus"))
        .field(FieldDescriptor::new("cohort_size", FieldType::Integer))
        .filter(FilterBinding::new("search", &["name", "focus"], MatchKind::Contains))
        .filter(country_filter("country"))
        .filter(FilterBinding::new("program", &["program_type"], MatchKind::Equals))
        .order_by(OrderBy::asc("name"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("countries", "country").top(10))
                .dimension(DimensionSpec::categorical("programs", "program_type"))
                .dimension(DimensionSpec::numeric(
                    "cohort_sizes",
                    "cohort_size",
                    buckets(&[("1-10", 1.0), ("11-25", 11.0), ("26-50", 26.0), ("50+", 51.0)])?,
                )),
        ))
}

fn sanctions() -> TableDescriptor {
    TableDescriptor::new("sanctions")
        .field(text("name"))
        .field(text("list_name"))
        .field(text("entity_type"))
        .field(text("country"))
        .field(text("program"))
        .field(text("listed_on"))
        .filter(FilterBinding::new("search", &["name", "program"], MatchKind::Contains))
        .filter(FilterBinding::new("list", &["list_name"], MatchKind::Equals))
        .filter(FilterBinding::new("entity_type", &["entity_type"], MatchKind::Equals))
        .filter(country_filter("country"))
        .order_by(OrderBy::asc("name"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("lists", "list_name"))
                .dimension(DimensionSpec::categorical("entity_types", "entity_type"))
                .dimension(DimensionSpec::categorical("countries", "country").top(15)),
        )
}

fn rankings() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("rankings")
        .field(text("name"))
        .field(text("category"))
        .field(text("country"))
        .field(FieldDescriptor::new(
            "rank",
            FieldType::Formatted(TextNumberFormat::new("# ", "", 1.0, false)),
        ))
        .field(FieldDescriptor::new("score", FieldType::Float))
        .field(FieldDescriptor::new("year", FieldType::Integer))
        .filter(FilterBinding::new("search", &["name"], MatchKind::Contains))
        .filter(FilterBinding::new("category", &["category"], MatchKind::Equals))
        .filter(country_filter("country"))
        .filter(FilterBinding::new("rank", &["rank"], MatchKind::Range))
        .filter(FilterBinding::new("year", &["year"], MatchKind::Equals))
        .order_by(OrderBy::desc("score"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("categories", "category"))
                .dimension(DimensionSpec::numeric(
                    "scores",
                    "score",
                    buckets(&[("0-50", 0.0), ("50-75", 50.0), ("75-90", 75.0), ("90+", 90.0)])?,
                ))
                .ranking(RankingSpec::new("top_scores", "name", "score", 10)),
        ))
}

fn news() -> Result<TableDescriptor, EngineError> {
    Ok(TableDescriptor::new("news")
        .field(text("title"))
        .field(text("summary"))
        .field(text("source"))
        .field(text("category"))
        .field(text("published_at"))
        .field(FieldDescriptor::new("sentiment", FieldType::Float))
        .filter(FilterBinding::new("search", &["title", "summary"], MatchKind::Contains))
        .filter(FilterBinding::new("source", &["source"], MatchKind::Equals))
        .filter(FilterBinding::new("category", &["category"], MatchKind::Equals))
        .order_by(OrderBy::desc("published_at"))
        .aggregation(
            AggregationSpec::new("overview")
                .dimension(DimensionSpec::categorical("sources", "source").top(10))
                .dimension(DimensionSpec::categorical("categories", "category"))
                .dimension(
                    DimensionSpec::numeric(
                        "sentiment",
                        "sentiment",
                        buckets(&[("negative", -1.0), ("neutral", -0.2), ("positive", 0.2)])?,
                    )
                    .missing(MissingPolicy::Exclude),
                ),
        ))
}
