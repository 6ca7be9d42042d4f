use std::time::Duration;

use log::{debug, error};
use reqwest::{Client, RequestBuilder, header};
use serde_json::{Map, Value};

use crate::{
    core::{
        field_type::format_number,
        filter::NumericRange,
        predicate::{Predicate, PredicateKind},
        record::{Record, value_as_text},
        schema::{FieldDescriptor, OrderBy, TableDescriptor},
    },
    error::SourceError,
};

use super::{DataSource, SourceResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Reads from a PostgREST endpoint (e.g. Supabase's `/rest/v1`).
pub struct PostgrestSource {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl PostgrestSource {
    pub fn new(base_url: &str, api_key: Option<String>) -> SourceResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn get(&self, table: &str) -> RequestBuilder {
        let request = self.client.get(format!("{}/{}", self.base_url, table));

        match &self.api_key {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, table: &str, request: RequestBuilder) -> SourceResult<reqwest::Response> {
        let response = request.send().await.inspect_err(|e| {
            error!("Request to {} failed: {}", table, e);
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Upstream answered {} for {}: {}", status, table, body);
            return Err(SourceError::Status { status: status.as_u16(), body });
        }

        Ok(response)
    }
}

impl DataSource for PostgrestSource {
    async fn query(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> SourceResult<Vec<Record>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(predicates));

        if let Some(order) = order_param(table, ordering) {
            params.push(("order".to_string(), order));
        }
        params.push(("limit".to_string(), limit.to_string()));
        params.push(("offset".to_string(), offset.to_string()));

        debug!("GET {} {:?}", table.name, params);

        let response = self.send(&table.name, self.get(&table.name).query(&params)).await?;
        let bytes = response.bytes().await?;

        let rows: Vec<Map<String, Value>> =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode(e.to_string()))?;

        Ok(rows.into_iter().map(Record::from).collect())
    }

    async fn count(&self, table: &TableDescriptor, predicates: &[Predicate]) -> SourceResult<u64> {
        let mut params = vec![
            ("select".to_string(), column_name(&table.primary_key)),
            ("limit".to_string(), "1".to_string()),
        ];
        params.extend(filter_params(predicates));

        let request = self
            .get(&table.name)
            .query(&params)
            .header("Prefer", "count=exact");

        let response = self.send(&table.name, request).await?;

        let content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| SourceError::Decode("missing Content-Range header".to_string()))?;

        parse_content_range(content_range)
            .ok_or_else(|| SourceError::Decode(format!("unreadable Content-Range {:?}", content_range)))
    }

    fn get_name(&self) -> &'static str {
        "postgrest"
    }
}

/// `hq.country` becomes `hq->>country`; deeper paths step through `->`.
pub fn column_name(path: &str) -> String {
    let parts: Vec<&str> = path.split('.').collect();

    match parts.split_last() {
        Some((last, init)) if !init.is_empty() => format!("{}->>{}", init.join("->"), last),
        _ => path.to_string(),
    }
}

fn field_column(field: &FieldDescriptor) -> String {
    column_name(field.path())
}

/// Quotes values that would otherwise break the filter grammar.
fn quote(value: &str) -> String {
    if value.chars().any(|c| matches!(c, ',' | '(' | ')' | '"' | ':' | '\\') || c.is_whitespace()) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn operand(value: &Value) -> String {
    match value {
        Value::Number(number) => number
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| number.to_string()),
        other => value_as_text(other).unwrap_or_default(),
    }
}

/// `operator.value` pairs for one field; a closed range needs two.
fn conditions(kind: &PredicateKind, quoted: bool) -> Vec<String> {
    let text = |value: String| if quoted { quote(&value) } else { value };

    match kind {
        PredicateKind::Equals(value) => vec![format!("eq.{}", text(operand(value)))],
        PredicateKind::Contains(needle) => vec![format!("ilike.{}", text(format!("*{}*", needle)))],
        PredicateKind::Range(NumericRange { min, max }) => {
            let mut conditions = Vec::with_capacity(2);
            if let Some(min) = min {
                conditions.push(format!("gte.{}", format_number(*min)));
            }
            if let Some(max) = max {
                conditions.push(format!("lte.{}", format_number(*max)));
            }
            conditions
        }
        PredicateKind::Membership(values) => {
            let list: Vec<String> = values.iter().map(|v| quote(&operand(v))).collect();
            vec![format!("in.({})", list.join(","))]
        }
    }
}

/// Logic-tree form of a multi-field predicate: `or(a.ilike.*x*,b.ilike.*x*)`.
fn or_group(predicate: &Predicate) -> String {
    let branches: Vec<String> = predicate
        .fields
        .iter()
        .map(|field| {
            let column = field_column(field);
            let parts: Vec<String> = conditions(&predicate.kind, true)
                .into_iter()
                .map(|condition| format!("{}.{}", column, condition))
                .collect();

            match parts.len() {
                1 => parts.join(","),
                _ => format!("and({})", parts.join(",")),
            }
        })
        .collect();

    format!("or({})", branches.join(","))
}

/// Query-string filters for a conjunction of predicates.
pub fn filter_params(predicates: &[Predicate]) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut groups = Vec::new();

    for predicate in predicates {
        if conditions(&predicate.kind, false).is_empty() {
            continue;
        }

        match predicate.fields.as_slice() {
            [field] => {
                let column = field_column(field);
                for condition in conditions(&predicate.kind, false) {
                    params.push((column.clone(), condition));
                }
            }
            _ => groups.push(or_group(predicate)),
        }
    }

    // One `or` parameter per request; several groups are joined under `and`.
    match groups.len() {
        0 => {}
        1 => {
            let group = groups.remove(0);
            let inner = group.trim_start_matches("or");
            params.push(("or".to_string(), inner.to_string()));
        }
        _ => params.push(("and".to_string(), format!("({})", groups.join(",")))),
    }

    params
}

pub fn order_param(table: &TableDescriptor, ordering: &[OrderBy]) -> Option<String> {
    if ordering.is_empty() {
        return None;
    }

    let terms: Vec<String> = ordering
        .iter()
        .map(|order| {
            let column = table
                .find_field(&order.field)
                .map(field_column)
                .unwrap_or_else(|| column_name(&order.field));
            let direction = if order.descending { "desc" } else { "asc" };
            format!("{}.{}.nullslast", column, direction)
        })
        .collect();

    Some(terms.join(","))
}

/// Total from `0-24/120` or `*/0`.
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}
