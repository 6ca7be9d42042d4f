use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

use crate::core::{
    field_type::FieldType,
    filter::{FilterSpec, FilterValue, NumericRange},
    schema::{FieldDescriptor, FilterBinding, MatchKind, TableDescriptor},
    text_range::enumerate_candidates,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PredicateKind {
    Equals(Value),
    /// Case-insensitive substring.
    Contains(String),
    Range(NumericRange),
    Membership(Vec<Value>),
}

/// One constraint. With several fields the constraint holds when any field satisfies it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    pub fields: SmallVec<[FieldDescriptor; 2]>,
    pub kind: PredicateKind,
}

impl Predicate {
    pub fn new(field: FieldDescriptor, kind: PredicateKind) -> Self {
        let mut fields = SmallVec::new();
        fields.push(field);
        Self { fields, kind }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Translation {
    pub predicates: Vec<Predicate>,
    /// Filter keys whose text-range candidate list was cut short by the cap.
    pub capped: Vec<String>,
}

/// Maps a normalized [`FilterSpec`] onto predicates for one table.
pub struct PredicateTranslator<'a> {
    table: &'a TableDescriptor,
    pattern_cap: usize,
}

impl<'a> PredicateTranslator<'a> {
    pub fn new(table: &'a TableDescriptor, pattern_cap: usize) -> Self {
        Self { table, pattern_cap }
    }

    /// Predicates come out in binding declaration order, so equal specs translate identically.
    pub fn translate(&self, spec: &FilterSpec) -> Translation {
        let mut translation = Translation::default();

        for binding in &self.table.filters {
            let Some(value) = spec.get(&binding.key) else {
                continue;
            };

            let fields: SmallVec<[FieldDescriptor; 2]> = binding
                .fields
                .iter()
                .filter_map(|name| self.table.find_field(name).cloned())
                .collect();

            if fields.is_empty() {
                warn!("Filter {} on table {} binds no declared field", binding.key, self.table.name);
                continue;
            }

            let Some(resolved) = self.kind_for(binding, value) else {
                continue;
            };

            let kind = match resolved {
                Resolved::Kind(kind) => kind,
                Resolved::Range(range) => match &fields[0].field_type {
                    FieldType::Formatted(format) => {
                        let Some(candidates) = enumerate_candidates(format, &range, self.pattern_cap) else {
                            warn!(
                                "Ignoring range {} on filter {}: bounds are too large to enumerate",
                                range.to_token(),
                                binding.key
                            );
                            continue;
                        };

                        if candidates.truncated {
                            warn!(
                                "Range {} on filter {} needs more than {} candidates; matching only the first {}",
                                range.to_token(),
                                binding.key,
                                self.pattern_cap,
                                candidates.values.len()
                            );
                            translation.capped.push(binding.key.clone());
                        }

                        PredicateKind::Membership(
                            candidates.values.into_iter().map(Value::String).collect(),
                        )
                    }
                    _ => PredicateKind::Range(range),
                },
            };

            translation.predicates.push(Predicate { fields, kind });
        }

        debug!(
            "Translated {} filters into {} predicates for {}",
            spec.len(),
            translation.predicates.len(),
            self.table.name
        );

        translation
    }

    fn kind_for(&self, binding: &FilterBinding, value: &FilterValue) -> Option<Resolved> {
        match (binding.kind, value) {
            (MatchKind::Equals, FilterValue::Text(text)) => {
                Some(Resolved::Kind(PredicateKind::Equals(Value::String(text.clone()))))
            }
            (MatchKind::Equals, FilterValue::Number(number)) => {
                Some(Resolved::Kind(PredicateKind::Equals(Value::from(*number))))
            }
            (MatchKind::Contains, FilterValue::Text(text)) => {
                Some(Resolved::Kind(PredicateKind::Contains(text.clone())))
            }
            (MatchKind::Membership, FilterValue::Text(text)) => {
                let allowed = match binding.aliases.get(&text.to_lowercase()) {
                    Some(canonical) => canonical.iter().cloned().map(Value::String).collect(),
                    None => vec![Value::String(text.clone())],
                };
                Some(Resolved::Kind(PredicateKind::Membership(allowed)))
            }
            (MatchKind::Minimum, FilterValue::Number(min)) => {
                NumericRange::new(Some(*min), None).map(Resolved::Range)
            }
            (MatchKind::Maximum, FilterValue::Number(max)) => {
                NumericRange::new(None, Some(*max)).map(Resolved::Range)
            }
            (MatchKind::Range, FilterValue::Range(range)) => Some(Resolved::Range(*range)),
            (kind, value) => {
                warn!(
                    "Skipping filter {}: value {:?} does not fit a {:?} match",
                    binding.key, value, kind
                );
                None
            }
        }
    }
}

enum Resolved {
    Kind(PredicateKind),
    Range(NumericRange),
}
