use ahash::AHashMap;
use itertools::Itertools;

use super::{Bucket, SortOrder};

/// Counts per name, remembering the order names were first seen.
#[derive(Debug, Default, Clone)]
pub struct Counter {
    entries: Vec<(String, u64)>,
    index: AHashMap<String, usize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with every name present at zero, in the given order.
    pub fn seeded<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut counter = Self::new();
        for name in names {
            counter.slot(name);
        }
        counter
    }

    pub fn increment(&mut self, name: &str) {
        let slot = self.slot(name);
        self.entries[slot].1 += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.index.get(name).map_or(0, |&slot| self.entries[slot].1)
    }

    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, count)| count).sum()
    }

    fn slot(&mut self, name: &str) -> usize {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }

        let slot = self.entries.len();
        self.entries.push((name.to_string(), 0));
        self.index.insert(name.to_string(), slot);
        slot
    }

    pub fn shape(self, sort: SortOrder, top_n: Option<usize>) -> Vec<Bucket> {
        shape(self.entries, sort, top_n)
    }
}

/// Orders counted entries for charting and applies the top-N cut.
///
/// `CountDesc` breaks ties by name ascending; `BucketOrder` keeps the input order.
pub fn shape(entries: Vec<(String, u64)>, sort: SortOrder, top_n: Option<usize>) -> Vec<Bucket> {
    let buckets = entries
        .into_iter()
        .map(|(name, value)| Bucket { name, value });

    let sorted: Vec<Bucket> = match sort {
        SortOrder::CountDesc => buckets
            .sorted_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)))
            .collect(),
        SortOrder::NameAsc => buckets.sorted_by(|a, b| a.name.cmp(&b.name)).collect(),
        SortOrder::BucketOrder => buckets.collect(),
    };

    match top_n {
        Some(limit) => sorted.into_iter().take(limit).collect(),
        None => sorted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(buckets: &[Bucket]) -> Vec<&str> {
        buckets.iter().map(|b| b.name.as_str()).collect()
    }

    fn counter() -> Counter {
        let mut counter = Counter::new();
        for name in ["Fintech", "Biotech", "Fintech", "Unknown", "AI", "AI", "Fintech"] {
            counter.increment(name);
        }
        counter
    }

    #[test]
    fn test_count_desc_breaks_ties_by_name() {
        let buckets = counter().shape(SortOrder::CountDesc, None);

        assert_eq!(names(&buckets), vec!["Fintech", "AI", "Biotech", "Unknown"]);
        assert_eq!(buckets[0].value, 3);
        assert_eq!(buckets[1].value, 2);
    }

    #[test]
    fn test_name_and_bucket_order() {
        assert_eq!(
            names(&counter().shape(SortOrder::NameAsc, None)),
            vec!["AI", "Biotech", "Fintech", "Unknown"]
        );
        assert_eq!(
            names(&counter().shape(SortOrder::BucketOrder, None)),
            vec!["Fintech", "Biotech", "Unknown", "AI"]
        );
    }

    #[test]
    fn test_top_n_truncates_after_sorting() {
        let buckets = counter().shape(SortOrder::CountDesc, Some(2));
        assert_eq!(names(&buckets), vec!["Fintech", "AI"]);

        let buckets = counter().shape(SortOrder::CountDesc, Some(0));
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_seeded_counter_keeps_zero_buckets() {
        let mut counter = Counter::seeded(["0-10", "10-50", "50+"]);
        counter.increment("50+");

        assert_eq!(counter.get("0-10"), 0);
        assert_eq!(counter.total(), 1);

        let buckets = counter.shape(SortOrder::BucketOrder, None);
        assert_eq!(names(&buckets), vec!["0-10", "10-50", "50+"]);
    }
}
