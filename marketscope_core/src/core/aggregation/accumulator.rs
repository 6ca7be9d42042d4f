use std::{cmp::Ordering, cmp::Reverse, collections::BinaryHeap};

use crate::{
    core::{
        aggregation::{
            AggregationResult, AggregationSpec, BucketTable, DimensionSpec, MissingPolicy, NamedBuckets,
            NamedRanking, RankedEntry, RankingSpec, shaper::Counter,
        },
        record::{Record, value_as_text},
        schema::{FieldDescriptor, TableDescriptor},
    },
    error::EngineError,
};

/// Folds scanned records into the counters of one aggregation.
pub struct Accumulator {
    dimensions: Vec<DimensionState>,
    rankings: Vec<RankingState>,
    scanned: u64,
}

struct DimensionState {
    spec: DimensionSpec,
    field: FieldDescriptor,
    counter: Counter,
}

struct RankingState {
    spec: RankingSpec,
    label: FieldDescriptor,
    measure: FieldDescriptor,
    heap: BinaryHeap<Reverse<Ranked>>,
    seen: u64,
}

/// Orders by measure; on equal measures the earlier record ranks higher.
struct Ranked {
    value: f64,
    seq: u64,
    name: String,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl Accumulator {
    pub fn new(table: &TableDescriptor, spec: &AggregationSpec) -> Result<Self, EngineError> {
        let resolve = |name: &str| {
            table.find_field(name).cloned().ok_or_else(|| {
                EngineError::Catalog(format!(
                    "aggregation {} on {} references unknown field {}",
                    spec.id, table.name, name
                ))
            })
        };

        let mut dimensions = Vec::with_capacity(spec.dimensions.len());
        for dimension in &spec.dimensions {
            let counter = match &dimension.buckets {
                Some(buckets) => Counter::seeded(buckets.names()),
                None => Counter::new(),
            };

            dimensions.push(DimensionState {
                field: resolve(&dimension.field)?,
                spec: dimension.clone(),
                counter,
            });
        }

        let mut rankings = Vec::with_capacity(spec.rankings.len());
        for ranking in &spec.rankings {
            rankings.push(RankingState {
                label: resolve(&ranking.label_field)?,
                measure: resolve(&ranking.measure_field)?,
                spec: ranking.clone(),
                heap: BinaryHeap::with_capacity(ranking.limit + 1),
                seen: 0,
            });
        }

        Ok(Self { dimensions, rankings, scanned: 0 })
    }

    pub fn visit(&mut self, record: &Record) {
        self.scanned += 1;

        for state in &mut self.dimensions {
            state.visit(record);
        }

        for state in &mut self.rankings {
            state.visit(record);
        }
    }

    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    pub fn finish(self) -> AggregationResult {
        let dimensions = self
            .dimensions
            .into_iter()
            .map(|state| NamedBuckets {
                buckets: state.counter.shape(state.spec.sort, state.spec.top_n),
                name: state.spec.name,
            })
            .collect();

        let rankings = self
            .rankings
            .into_iter()
            .map(|state| NamedRanking {
                // Ascending order of `Reverse` is descending order of the measure.
                entries: state
                    .heap
                    .into_sorted_vec()
                    .into_iter()
                    .map(|Reverse(ranked)| RankedEntry { name: ranked.name, value: ranked.value })
                    .collect(),
                name: state.spec.name,
            })
            .collect();

        AggregationResult {
            dimensions,
            rankings,
            scanned: self.scanned,
            truncated: false,
            capped_filters: Vec::new(),
        }
    }
}

impl DimensionState {
    fn visit(&mut self, record: &Record) {
        let value = record.get_path(self.field.path());

        let name = match &self.spec.buckets {
            Some(buckets) => value.and_then(|value| bucket_name(buckets, &self.field, value)),
            None => value.and_then(value_as_text),
        };

        match (name, &self.spec.missing) {
            (Some(name), _) => self.counter.increment(&name),
            (None, MissingPolicy::Label(label)) => self.counter.increment(label),
            (None, MissingPolicy::Exclude) => {}
        }
    }
}

fn bucket_name(buckets: &BucketTable, field: &FieldDescriptor, value: &serde_json::Value) -> Option<String> {
    let number = field.field_type.numeric_value(value)?;
    buckets.locate(number).map(|index| buckets.name(index).to_string())
}

impl RankingState {
    fn visit(&mut self, record: &Record) {
        if self.spec.limit == 0 {
            return;
        }

        let Some(value) = record
            .get_path(self.measure.path())
            .and_then(|value| self.measure.field_type.numeric_value(value))
        else {
            return;
        };

        let Some(name) = record.get_path(self.label.path()).and_then(value_as_text) else {
            return;
        };

        self.seen += 1;
        self.heap.push(Reverse(Ranked { value, seq: self.seen, name }));

        if self.heap.len() > self.spec.limit {
            self.heap.pop();
        }
    }
}
