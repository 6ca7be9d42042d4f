use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage shape of a field as the data source returns it.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    /// A number stored as decorated text, e.g. `"$1.5M"` or `"# 48"`.
    Formatted(TextNumberFormat),
    Json,
}

impl Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Text => f.write_str("TEXT"),
            FieldType::Integer => f.write_str("INTEGER"),
            FieldType::Float => f.write_str("FLOAT"),
            FieldType::Formatted(format) => write!(f, "FORMATTED({}_{})", format.prefix, format.suffix),
            FieldType::Json => f.write_str("JSON"),
        }
    }
}

impl FieldType {
    /// True when the store can compare the column numerically.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    /// Reads a number out of a stored value, honoring the field's text decoration.
    pub fn numeric_value(&self, value: &Value) -> Option<f64> {
        match (self, value) {
            (_, Value::Null) => None,
            (FieldType::Formatted(format), Value::String(text)) => format.parse(text),
            (_, Value::Number(number)) => number.as_f64().filter(|n| n.is_finite()),
            (_, Value::String(text)) => parse_number(text),
            _ => None,
        }
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TextNumberFormat {
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub suffix: String,
    /// Distance between two consecutive enumerated candidates.
    #[serde(default = "default_step")]
    pub step: f64,
    /// Whether rendered numbers carry `,` thousands separators.
    #[serde(default)]
    pub thousands: bool,
}

fn default_step() -> f64 {
    1.0
}

impl TextNumberFormat {
    pub fn new(prefix: &str, suffix: &str, step: f64, thousands: bool) -> Self {
        Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            step,
            thousands,
        }
    }

    pub fn parse(&self, text: &str) -> Option<f64> {
        let mut text = text.trim();

        if !self.prefix.is_empty() {
            text = text.strip_prefix(self.prefix.as_str()).unwrap_or(text);
        }

        if !self.suffix.is_empty() {
            text = text.strip_suffix(self.suffix.as_str()).unwrap_or(text);
        }

        parse_number(text)
    }

    pub fn render(&self, value: f64) -> String {
        let number = format_number(value);

        let number = if self.thousands {
            group_thousands(&number)
        } else {
            number
        };

        format!("{}{}{}", self.prefix, number, self.suffix)
    }
}

/// Parses a number, tolerating surrounding whitespace and `,` thousands separators.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Shortest textual form of a number: `10` rather than `10.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn group_thousands(number: &str) -> String {
    let (sign, unsigned) = match number.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", number),
    };

    let (integer, fraction) = match unsigned.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (unsigned, None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);

    for (i, c) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_number_with_commas() {
        assert_eq!(parse_number("1,065"), Some(1065.0));
        assert_eq!(parse_number(" 42.5 "), Some(42.5));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_formatted_round_trip_through_text() {
        let money = TextNumberFormat::new("$", "M", 1.0, false);
        assert_eq!(money.parse("$1.5M"), Some(1.5));
        assert_eq!(money.render(12.0), "$12M");

        let rank = TextNumberFormat::new("# ", "", 1.0, true);
        assert_eq!(rank.parse("# 1,048"), Some(1048.0));
        assert_eq!(rank.render(1048.0), "# 1,048");
    }

    #[test]
    fn test_numeric_value_per_type() {
        assert_eq!(FieldType::Integer.numeric_value(&json!(7)), Some(7.0));
        assert_eq!(FieldType::Float.numeric_value(&json!("2,500.5")), Some(2500.5));
        assert_eq!(FieldType::Text.numeric_value(&Value::Null), None);

        let formatted = FieldType::Formatted(TextNumberFormat::new("$", "B", 0.5, false));
        assert_eq!(formatted.numeric_value(&json!("$2.5B")), Some(2.5));
        assert_eq!(formatted.numeric_value(&json!(true)), None);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands("1000000"), "1,000,000");
        assert_eq!(group_thousands("-12345.75"), "-12,345.75");
        assert_eq!(group_thousands("999"), "999");
    }
}
