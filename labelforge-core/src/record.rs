//! Product Records - Inbound Inventory Lines
//!
//! Loose upstream values (null, numbers, strings) are coerced to owned strings
//! here, at deserialization time. Nothing past this boundary sees a raw JSON
//! value.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "STYLE_NAME", alias = "style_name", default, deserialize_with = "coerce_string")]
    pub style_name: String,
    #[serde(rename = "VPM", alias = "vpm", default, deserialize_with = "coerce_string")]
    pub vpm: String,
    #[serde(rename = "COLOR", alias = "color", default, deserialize_with = "coerce_string")]
    pub color: String,
    #[serde(rename = "SIZE", alias = "size", default, deserialize_with = "coerce_string")]
    pub size: String,
    #[serde(rename = "BARCODE", alias = "barcode", default, deserialize_with = "coerce_optional_string")]
    pub barcode: Option<String>,
    #[serde(rename = "PO", alias = "po", default, deserialize_with = "coerce_optional_string")]
    pub po: Option<String>,
    #[serde(rename = "QTY", alias = "quantity", default = "default_quantity", deserialize_with = "coerce_quantity")]
    pub quantity: Quantity,
}

/// Requested label count as read from the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Quantity {
    Count(i64),
    /// Text that is not a whole number, kept verbatim for the operator.
    Unparseable(String),
}

impl Quantity {
    pub fn count(&self) -> Option<i64> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Unparseable(_) => None,
        }
    }
}

impl From<i64> for Quantity {
    fn from(n: i64) -> Self {
        Self::Count(n)
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{}", n),
            Self::Unparseable(raw) => write!(f, "'{}'", raw),
        }
    }
}

fn default_quantity() -> Quantity { Quantity::Count(1) }

impl ProductRecord {
    pub fn new(
        style_name: impl Into<String>,
        vpm: impl Into<String>,
        color: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            style_name: style_name.into(),
            vpm: vpm.into(),
            color: color.into(),
            size: size.into(),
            barcode: None,
            po: None,
            quantity: default_quantity(),
        }
    }

    pub fn with_barcode(mut self, barcode: impl Into<String>) -> Self {
        self.barcode = non_blank(barcode.into());
        self
    }

    pub fn with_po(mut self, po: impl Into<String>) -> Self {
        self.po = non_blank(po.into());
        self
    }

    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = Quantity::Count(quantity);
        self
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Renders any scalar JSON value as text. Containers and null yield `None`.
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => non_blank(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn coerce_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(scalar_to_string))
}

fn coerce_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(coerce_optional_string(deserializer)?.unwrap_or_default())
}

/// Whole numbers in integer or decimal spelling ("3", "3.0", "3e0").
fn parse_count(text: &str) -> Option<i64> {
    // Beyond 2^53 an f64 no longer holds every integer exactly.
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() <= EXACT_LIMIT)
            .map(|f| f as i64)
    })
}

/// Numbers and numeric strings go through the same parser. Anything else is
/// kept as text so the sequence expander can report what was entered instead
/// of the record failing to load.
fn coerce_quantity<'de, D>(deserializer: D) -> Result<Quantity, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let text = match value {
        None | Some(Value::Null) => return Ok(default_quantity()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(default_quantity()),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };
    Ok(parse_count(&text).map_or(Quantity::Unparseable(text), Quantity::Count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_uppercase_ingestion_fields() {
        let record: ProductRecord = serde_json::from_value(json!({
            "STYLE_NAME": "JASMINE",
            "VPM": "L458-JASM-11.0-SILV-1885",
            "COLOR": "SILVER",
            "SIZE": "11.0",
            "BARCODE": null,
            "QTY": 3
        }))
        .unwrap();
        assert_eq!(record.vpm, "L458-JASM-11.0-SILV-1885");
        assert_eq!(record.barcode, None);
        assert_eq!(record.quantity, Quantity::Count(3));
    }

    #[test]
    fn test_numeric_barcode_coerced() {
        let record: ProductRecord = serde_json::from_value(json!({
            "VPM": "L1-X",
            "BARCODE": 197416145132u64
        }))
        .unwrap();
        assert_eq!(record.barcode.as_deref(), Some("197416145132"));
    }

    #[test]
    fn test_blank_barcode_is_absent() {
        let record: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "BARCODE": "  "})).unwrap();
        assert_eq!(record.barcode, None);
    }

    #[test]
    fn test_missing_quantity_defaults_to_one() {
        let record: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X"})).unwrap();
        assert_eq!(record.quantity, Quantity::Count(1));
        assert_eq!(record.style_name, "");
    }

    #[test]
    fn test_string_quantity_parsed() {
        let record: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "QTY": " 12 "})).unwrap();
        assert_eq!(record.quantity, Quantity::Count(12));
    }

    #[test]
    fn test_garbage_quantity_kept_verbatim() {
        let record: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "QTY": "lots"})).unwrap();
        assert_eq!(record.quantity, Quantity::Unparseable("lots".to_string()));
        assert_eq!(record.quantity.count(), None);
    }

    #[test]
    fn test_decimal_spellings_agree() {
        for qty in [json!(3.0), json!("3.0"), json!("3"), json!(3)] {
            let record: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "QTY": qty})).unwrap();
            assert_eq!(record.quantity, Quantity::Count(3));
        }
    }

    #[test]
    fn test_fractional_quantity_unparseable() {
        let from_number: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "QTY": 2.5})).unwrap();
        let from_text: ProductRecord = serde_json::from_value(json!({"VPM": "L1-X", "QTY": "2.5"})).unwrap();
        assert_eq!(from_number.quantity, Quantity::Unparseable("2.5".to_string()));
        assert_eq!(from_text.quantity, from_number.quantity);
    }

    #[test]
    fn test_snake_case_aliases() {
        let record: ProductRecord = serde_json::from_value(json!({
            "style_name": "HANA",
            "vpm": "L264-HANA-5.0-WHIT-1120",
            "quantity": 2
        }))
        .unwrap();
        assert_eq!(record.style_name, "HANA");
        assert_eq!(record.quantity, Quantity::Count(2));
    }
}
