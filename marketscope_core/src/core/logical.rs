use std::cmp::Ordering;

use serde_json::Value;

use crate::core::{
    field_type::{FieldType, parse_number},
    predicate::{Predicate, PredicateKind},
    record::{Record, value_as_text},
    schema::OrderBy,
};

/// All predicates must hold (logical AND).
pub fn record_matches(record: &Record, predicates: &[Predicate]) -> bool {
    predicates.iter().all(|predicate| predicate_matches(record, predicate))
}

/// Any of the predicate's fields may satisfy it; a null or missing field never does.
pub fn predicate_matches(record: &Record, predicate: &Predicate) -> bool {
    predicate.fields.iter().any(|field| match record.get_path(field.path()) {
        Some(value) => perform_comparison_operation(value, &field.field_type, &predicate.kind),
        None => false,
    })
}

#[inline(always)]
pub fn perform_comparison_operation(value: &Value, field_type: &FieldType, kind: &PredicateKind) -> bool {
    match kind {
        PredicateKind::Equals(expected) => values_equal(value, expected),
        PredicateKind::Contains(needle) => match value_as_text(value) {
            Some(text) => text.to_lowercase().contains(&needle.to_lowercase()),
            None => false,
        },
        PredicateKind::Range(range) => field_type
            .numeric_value(value)
            .is_some_and(|number| range.contains(number)),
        PredicateKind::Membership(allowed) => allowed.iter().any(|candidate| values_equal(value, candidate)),
    }
}

fn values_equal(stored: &Value, expected: &Value) -> bool {
    match (stored, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(a), Value::String(b)) | (Value::String(b), Value::Number(a)) => {
            a.as_f64().is_some() && a.as_f64() == parse_number(b)
        }
        _ => match (value_as_text(stored), value_as_text(expected)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

/// Orders two optional values; nulls sort last regardless of direction and
/// numbers sort before every other value.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (sortable_number(a), sortable_number(b)) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => value_as_text(a).cmp(&value_as_text(b)),
        },
    }
}

fn sortable_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        _ => None,
    }
}

/// Compares two records by a multi-key ordering.
pub fn compare_records(a: &Record, b: &Record, ordering: &[(OrderBy, String)]) -> Ordering {
    for (order, path) in ordering {
        let a_value = a.get_path(path);
        let b_value = b.get_path(path);

        let mut result = compare_values(a_value, b_value);

        // Nulls stay last in both directions.
        if order.descending && a_value.is_some() && b_value.is_some() {
            result = result.reverse();
        }

        if result != Ordering::Equal {
            return result;
        }
    }

    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        field_type::TextNumberFormat,
        filter::NumericRange,
        schema::FieldDescriptor,
    };
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::try_from(value).unwrap()
    }

    #[test]
    fn test_contains_is_case_insensitive() {
        let predicate = Predicate::new(
            FieldDescriptor::new("name", FieldType::Text),
            PredicateKind::Contains("acme".to_string()),
        );

        assert!(predicate_matches(&record(json!({"name": "ACME Robotics"})), &predicate));
        assert!(!predicate_matches(&record(json!({"name": "Globex"})), &predicate));
    }

    #[test]
    fn test_null_never_matches() {
        let field = FieldDescriptor::new("industry", FieldType::Text);
        let null_record = record(json!({"industry": null}));
        let missing_record = record(json!({}));

        for kind in [
            PredicateKind::Equals(json!("Fintech")),
            PredicateKind::Contains(String::new()),
            PredicateKind::Range(NumericRange { min: None, max: None }),
            PredicateKind::Membership(vec![json!("Fintech")]),
        ] {
            let predicate = Predicate::new(field.clone(), kind);
            assert!(!predicate_matches(&null_record, &predicate));
            assert!(!predicate_matches(&missing_record, &predicate));
        }
    }

    #[test]
    fn test_range_parses_numbers_stored_as_text() {
        let predicate = Predicate::new(
            FieldDescriptor::new("employees", FieldType::Integer),
            PredicateKind::Range(NumericRange { min: Some(10.0), max: Some(50.0) }),
        );

        assert!(predicate_matches(&record(json!({"employees": "25"})), &predicate));
        assert!(!predicate_matches(&record(json!({"employees": "1,000"})), &predicate));
        assert!(predicate_matches(&record(json!({"employees": 50})), &predicate));
        assert!(!predicate_matches(&record(json!({"employees": 51})), &predicate));
        assert!(!predicate_matches(&record(json!({"employees": "n/a"})), &predicate));
    }

    #[test]
    fn test_range_on_formatted_field() {
        let predicate = Predicate::new(
            FieldDescriptor::new(
                "valuation",
                FieldType::Formatted(TextNumberFormat::new("$", "M", 1.0, false)),
            ),
            PredicateKind::Range(NumericRange { min: Some(1.0), max: None }),
        );

        assert!(predicate_matches(&record(json!({"valuation": "$1.5M"})), &predicate));
        assert!(!predicate_matches(&record(json!({"valuation": "$0.5M"})), &predicate));
    }

    #[test]
    fn test_equals_across_number_and_text() {
        assert!(values_equal(&json!(5), &json!("5")));
        assert!(values_equal(&json!("active"), &json!("active")));
        assert!(!values_equal(&json!("Active"), &json!("active")));
    }

    #[test]
    fn test_any_field_satisfies_multi_field_predicate() {
        let mut predicate = Predicate::new(
            FieldDescriptor::new("name", FieldType::Text),
            PredicateKind::Contains("payments".to_string()),
        );
        predicate.fields.push(FieldDescriptor::new("description", FieldType::Text));

        let row = record(json!({"name": "Stripe", "description": "Online payments"}));
        assert!(predicate_matches(&row, &predicate));
    }

    #[test]
    fn test_nested_path_lookup() {
        let predicate = Predicate::new(
            FieldDescriptor::nested("country", "hq.country", FieldType::Text),
            PredicateKind::Membership(vec![json!("United States")]),
        );

        assert!(predicate_matches(&record(json!({"hq": {"country": "United States"}})), &predicate));
        assert!(!predicate_matches(&record(json!({"hq": "United States"})), &predicate));
    }

    #[test]
    fn test_compare_records_nulls_last_both_directions() {
        let a = record(json!({"id": 1, "score": null}));
        let b = record(json!({"id": 2, "score": 5}));

        let asc = vec![(OrderBy::asc("score"), "score".to_string())];
        let desc = vec![(OrderBy::desc("score"), "score".to_string())];

        assert_eq!(compare_records(&a, &b, &asc), Ordering::Greater);
        assert_eq!(compare_records(&a, &b, &desc), Ordering::Greater);
    }

    #[test]
    fn test_mixed_column_orders_numbers_before_text() {
        let ten = json!(10);
        let nine = json!(9);
        let text = json!("5a");

        assert_eq!(compare_values(Some(&nine), Some(&ten)), Ordering::Less);
        assert_eq!(compare_values(Some(&ten), Some(&text)), Ordering::Less);
        assert_eq!(compare_values(Some(&nine), Some(&text)), Ordering::Less);
        assert_eq!(compare_values(Some(&text), Some(&ten)), Ordering::Greater);

        let mut values = vec![json!("apple"), json!(10), json!("5a"), json!(9), json!(2.5)];
        values.sort_by(|a, b| compare_values(Some(a), Some(b)));

        assert_eq!(values, vec![json!(2.5), json!(9), json!(10), json!("5a"), json!("apple")]);
    }
}
