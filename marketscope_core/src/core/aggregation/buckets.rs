use serde::{Deserialize, Serialize};

/// Lower bound of one bucket; the bucket runs up to the next bound (exclusive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketBound {
    pub name: String,
    pub min: f64,
}

/// Fixed numeric buckets as half-open intervals `[min_i, min_{i+1})`, the last
/// one open-ended. Values below the first bound belong to no bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<BucketBound>", into = "Vec<BucketBound>")]
pub struct BucketTable {
    bounds: Vec<BucketBound>,
}

impl BucketTable {
    pub fn from_bounds(bounds: &[(&str, f64)]) -> Result<Self, String> {
        let bounds: Vec<BucketBound> = bounds
            .iter()
            .map(|(name, min)| BucketBound { name: name.to_string(), min: *min })
            .collect();

        Self::try_from(bounds)
    }

    /// Index of the bucket holding `value`, if any.
    pub fn locate(&self, value: f64) -> Option<usize> {
        if !value.is_finite() {
            return None;
        }

        match self.bounds.partition_point(|bound| bound.min <= value) {
            0 => None,
            index => Some(index - 1),
        }
    }

    pub fn name(&self, index: usize) -> &str {
        &self.bounds[index].name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bounds.iter().map(|bound| bound.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

impl TryFrom<Vec<BucketBound>> for BucketTable {
    type Error = String;

    fn try_from(bounds: Vec<BucketBound>) -> Result<Self, Self::Error> {
        if bounds.is_empty() {
            return Err("bucket table needs at least one bound".to_string());
        }

        for (i, bound) in bounds.iter().enumerate() {
            if !bound.min.is_finite() {
                return Err(format!("bucket {} has a non-finite lower bound", bound.name));
            }

            if i > 0 && bounds[i - 1].min >= bound.min {
                return Err(format!(
                    "bucket {} must start above {} ({} >= {})",
                    bound.name,
                    bounds[i - 1].name,
                    bounds[i - 1].min,
                    bound.min
                ));
            }

            if bounds[..i].iter().any(|other| other.name == bound.name) {
                return Err(format!("duplicate bucket name {}", bound.name));
            }
        }

        Ok(Self { bounds })
    }
}

impl From<BucketTable> for Vec<BucketBound> {
    fn from(table: BucketTable) -> Self {
        table.bounds
    }
}
