use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};

pub mod accumulator;
pub mod buckets;
pub mod shaper;

pub use accumulator::Accumulator;
pub use buckets::{BucketBound, BucketTable};

/// How records without a usable value count toward a dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    Exclude,
    Label(String),
}

impl Default for MissingPolicy {
    fn default() -> Self {
        MissingPolicy::Label("Unknown".to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    CountDesc,
    NameAsc,
    BucketOrder,
}

/// One grouped count over a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionSpec {
    pub name: String,
    pub field: String,
    /// Numeric bucketing; categorical counting when absent.
    #[serde(default)]
    pub buckets: Option<BucketTable>,
    #[serde(default)]
    pub missing: MissingPolicy,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub sort: SortOrder,
}

impl DimensionSpec {
    pub fn categorical(name: &str, field: &str) -> Self {
        Self {
            name: name.to_string(),
            field: field.to_string(),
            buckets: None,
            missing: MissingPolicy::default(),
            top_n: None,
            sort: SortOrder::CountDesc,
        }
    }

    /// Numeric dimensions keep the bucket table order by default.
    pub fn numeric(name: &str, field: &str, buckets: BucketTable) -> Self {
        Self {
            buckets: Some(buckets),
            sort: SortOrder::BucketOrder,
            ..Self::categorical(name, field)
        }
    }

    pub fn missing(mut self, policy: MissingPolicy) -> Self {
        self.missing = policy;
        self
    }

    pub fn top(mut self, n: usize) -> Self {
        self.top_n = Some(n);
        self
    }

    pub fn sorted(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Top entries by a numeric measure, e.g. the largest funding rounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingSpec {
    pub name: String,
    pub label_field: String,
    pub measure_field: String,
    pub limit: usize,
}

impl RankingSpec {
    pub fn new(name: &str, label_field: &str, measure_field: &str, limit: usize) -> Self {
        Self {
            name: name.to_string(),
            label_field: label_field.to_string(),
            measure_field: measure_field.to_string(),
            limit,
        }
    }
}

/// A named aggregation request a table exposes to chart endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationSpec {
    pub id: String,
    #[serde(default)]
    pub dimensions: Vec<DimensionSpec>,
    #[serde(default)]
    pub rankings: Vec<RankingSpec>,
}

impl AggregationSpec {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            dimensions: Vec::new(),
            rankings: Vec::new(),
        }
    }

    pub fn dimension(mut self, dimension: DimensionSpec) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn ranking(mut self, ranking: RankingSpec) -> Self {
        self.rankings.push(ranking);
        self
    }

    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .map(|d| d.field.as_str())
            .chain(
                self.rankings
                    .iter()
                    .flat_map(|r| [r.label_field.as_str(), r.measure_field.as_str()]),
            )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedBuckets {
    pub name: String,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedRanking {
    pub name: String,
    pub entries: Vec<RankedEntry>,
}

/// Chart-ready output of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    pub dimensions: Vec<NamedBuckets>,
    pub rankings: Vec<NamedRanking>,
    pub scanned: u64,
    /// The safety cap stopped the scan before the data ran out.
    pub truncated: bool,
    pub capped_filters: Vec<String>,
}

impl AggregationResult {
    pub fn dimension(&self, name: &str) -> Option<&[Bucket]> {
        self.dimensions
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.buckets.as_slice())
    }

    pub fn ranking(&self, name: &str) -> Option<&[RankedEntry]> {
        self.rankings
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.entries.as_slice())
    }
}

#[derive(Serialize)]
struct ResultMeta<'a> {
    scanned: u64,
    truncated: bool,
    capped_filters: &'a [String],
}

// Serialized flat: `{ "<dimension>": [...], "<ranking>": [...], "meta": {...} }`.
impl Serialize for AggregationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dimensions.len() + self.rankings.len() + 1))?;

        for dimension in &self.dimensions {
            map.serialize_entry(&dimension.name, &dimension.buckets)?;
        }

        for ranking in &self.rankings {
            map.serialize_entry(&ranking.name, &ranking.entries)?;
        }

        map.serialize_entry(
            "meta",
            &ResultMeta {
                scanned: self.scanned,
                truncated: self.truncated,
                capped_filters: &self.capped_filters,
            },
        )?;

        map.end()
    }
}
