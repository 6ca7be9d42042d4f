use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{aggregation::AggregationSpec, field_type::FieldType};

/// Declares one field of a table: its name, where it lives in the row and how it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    /// Dotted path into a nested JSON column; defaults to `name`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_field_type")]
    pub field_type: FieldType,
}

fn default_field_type() -> FieldType {
    FieldType::Text
}

impl FieldDescriptor {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            field_type,
        }
    }

    pub fn nested(name: &str, path: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.to_string()),
            field_type,
        }
    }

    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Equals,
    Contains,
    /// Accepts `"a-b"`, `"a+"` or a single number.
    Range,
    /// Numeric lower bound, e.g. a minimum investment amount.
    Minimum,
    Maximum,
    Membership,
}

impl MatchKind {
    pub fn is_numeric(&self) -> bool {
        matches!(self, MatchKind::Range | MatchKind::Minimum | MatchKind::Maximum)
    }
}

/// Binds a request filter key to the fields it constrains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterBinding {
    pub key: String,
    /// More than one field means "any of these fields".
    pub fields: SmallVec<[String; 2]>,
    pub kind: MatchKind,
    /// Lower-cased short codes expanded to canonical stored values.
    #[serde(default)]
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl FilterBinding {
    pub fn new(key: &str, fields: &[&str], kind: MatchKind) -> Self {
        Self {
            key: key.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
            kind,
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_alias(mut self, code: &str, canonical: &[&str]) -> Self {
        self.aliases.insert(
            code.to_lowercase(),
            canonical.iter().map(|c| c.to_string()).collect(),
        );
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        Self { field: field.to_string(), descending: false }
    }

    pub fn desc(field: &str) -> Self {
        Self { field: field.to_string(), descending: true }
    }

    /// Parses `name` or `-name`.
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        match token.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(Self::desc(field)),
            Some(_) => None,
            None if !token.is_empty() => Some(Self::asc(token)),
            None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub filters: Vec<FilterBinding>,
    #[serde(default)]
    pub aggregations: Vec<AggregationSpec>,
    #[serde(default)]
    pub default_order: Option<OrderBy>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

impl TableDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            primary_key: default_primary_key(),
            fields: vec![FieldDescriptor::new("id", FieldType::Integer)],
            filters: Vec::new(),
            aggregations: Vec::new(),
            default_order: None,
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn filter(mut self, binding: FilterBinding) -> Self {
        self.filters.push(binding);
        self
    }

    pub fn aggregation(mut self, spec: AggregationSpec) -> Self {
        self.aggregations.push(spec);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.default_order = Some(order);
        self
    }

    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_aggregation(&self, id: &str) -> Option<&AggregationSpec> {
        self.aggregations.iter().find(|a| a.id == id)
    }

    /// Ordering used for paging: the requested (or default) field, then the primary key.
    pub fn ordering(&self, requested: Option<OrderBy>) -> SmallVec<[OrderBy; 2]> {
        let mut ordering = SmallVec::new();

        let primary = requested
            .filter(|order| self.find_field(&order.field).is_some())
            .or_else(|| self.default_order.clone());

        if let Some(order) = primary {
            let on_primary_key = order.field == self.primary_key;
            ordering.push(order);
            if on_primary_key {
                return ordering;
            }
        }

        ordering.push(OrderBy::asc(&self.primary_key));
        ordering
    }

    /// Checks that every binding, dimension and ranking names a declared field.
    pub fn validate(&self) -> Result<(), String> {
        if self.find_field(&self.primary_key).is_none() {
            return Err(format!(
                "table {}: primary key {} is not a declared field",
                self.name, self.primary_key
            ));
        }

        for binding in &self.filters {
            if binding.fields.is_empty() {
                return Err(format!("table {}: filter {} binds no fields", self.name, binding.key));
            }
            let mut bound_type = None;
            for field in &binding.fields {
                let Some(descriptor) = self.find_field(field) else {
                    return Err(format!(
                        "table {}: filter {} references unknown field {}",
                        self.name, binding.key, field
                    ));
                };

                // Numeric matches over several fields share one translation.
                if binding.kind.is_numeric() {
                    match bound_type {
                        None => bound_type = Some(&descriptor.field_type),
                        Some(first) if first != &descriptor.field_type => {
                            return Err(format!(
                                "table {}: numeric filter {} mixes field types {} and {}",
                                self.name, binding.key, first, descriptor.field_type
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        for spec in &self.aggregations {
            for field in spec.referenced_fields() {
                if self.find_field(field).is_none() {
                    return Err(format!(
                        "table {}: aggregation {} references unknown field {}",
                        self.name, spec.id, field
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn companies() -> TableDescriptor {
        TableDescriptor::new("companies")
            .field(FieldDescriptor::new("name", FieldType::Text))
            .field(FieldDescriptor::nested("country", "hq.country", FieldType::Text))
            .filter(FilterBinding::new("search", &["name"], MatchKind::Contains))
    }

    #[test]
    fn test_ordering_always_ends_with_primary_key() {
        let table = companies();

        let ordering = table.ordering(None);
        assert_eq!(ordering.as_slice(), &[OrderBy::asc("id")]);

        let ordering = table.ordering(Some(OrderBy::desc("name")));
        assert_eq!(ordering.as_slice(), &[OrderBy::desc("name"), OrderBy::asc("id")]);

        let ordering = table.ordering(Some(OrderBy::desc("id")));
        assert_eq!(ordering.as_slice(), &[OrderBy::desc("id")]);
    }

    #[test]
    fn test_undeclared_sort_field_is_ignored() {
        let ordering = companies().ordering(Some(OrderBy::asc("password")));
        assert_eq!(ordering.as_slice(), &[OrderBy::asc("id")]);
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("-name"), Some(OrderBy::desc("name")));
        assert_eq!(OrderBy::parse("name"), Some(OrderBy::asc("name")));
        assert_eq!(OrderBy::parse("-"), None);
        assert_eq!(OrderBy::parse(""), None);
    }

    #[test]
    fn test_validate_rejects_unknown_binding_field() {
        let table = companies().filter(FilterBinding::new("status", &["status"], MatchKind::Equals));
        assert!(table.validate().is_err());
        assert!(companies().validate().is_ok());
    }

    #[test]
    fn test_nested_path() {
        let table = companies();
        assert_eq!(table.find_field("country").unwrap().path(), "hq.country");
        assert_eq!(table.find_field("name").unwrap().path(), "name");
    }
}
