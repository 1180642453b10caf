//! Semantic filter fields and their tri-state values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The seven semantic fields extracted from a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Geography,
    Industry,
    TargetCustomerType,
    Title,
    EmployeeSize,
    SquareFootage,
    SalesVolume,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Geography,
        Field::Industry,
        Field::TargetCustomerType,
        Field::Title,
        Field::EmployeeSize,
        Field::SquareFootage,
        Field::SalesVolume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Geography => "geography",
            Field::Industry => "industry",
            Field::TargetCustomerType => "target_customer_type",
            Field::Title => "title",
            Field::EmployeeSize => "employee_size",
            Field::SquareFootage => "square_footage",
            Field::SalesVolume => "sales_volume",
        }
    }

    /// Table column the field filters on, if any
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Field::Geography => Some("geography"),
            Field::Industry => Some("industry"),
            Field::TargetCustomerType => None,
            Field::Title => Some("title_tier"),
            Field::EmployeeSize => Some("employee_size"),
            Field::SquareFootage => Some("square_footage"),
            Field::SalesVolume => Some("sales_volume"),
        }
    }

    /// Fields that accept comma-separated lists of values
    pub fn is_multi_valued(&self) -> bool {
        matches!(self, Field::Geography | Field::Industry | Field::Title)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True for text that carries no value ("", "null", "none", "not specified")
pub fn is_empty_value(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "" | "null" | "none" | "not specified"
    )
}

/// Split a comma-delimited multi-value field into trimmed, non-empty parts
pub fn split_values(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

/// A field's value: never addressed, explicitly cleared, or set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Unset,
    /// The user asked for no filter on this field
    Cleared,
    Value(String),
}

impl FieldValue {
    /// Value for a field the user explicitly addressed
    pub fn mentioned(raw: Option<&str>) -> Self {
        match raw {
            Some(v) if !is_empty_value(v) => FieldValue::Value(v.trim().to_string()),
            _ => FieldValue::Cleared,
        }
    }

    pub fn as_value(&self) -> Option<&str> {
        match self {
            FieldValue::Value(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_cleared(&self) -> bool {
        matches!(self, FieldValue::Cleared)
    }

    pub fn is_set(&self) -> bool {
        matches!(self, FieldValue::Value(_))
    }
}

/// Snapshot of all seven fields
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtractedInfo {
    #[serde(default)]
    pub geography: FieldValue,
    #[serde(default)]
    pub industry: FieldValue,
    #[serde(default)]
    pub target_customer_type: FieldValue,
    #[serde(default)]
    pub title: FieldValue,
    #[serde(default)]
    pub employee_size: FieldValue,
    #[serde(default)]
    pub square_footage: FieldValue,
    #[serde(default)]
    pub sales_volume: FieldValue,
}

impl ExtractedInfo {
    pub fn get(&self, field: Field) -> &FieldValue {
        match field {
            Field::Geography => &self.geography,
            Field::Industry => &self.industry,
            Field::TargetCustomerType => &self.target_customer_type,
            Field::Title => &self.title,
            Field::EmployeeSize => &self.employee_size,
            Field::SquareFootage => &self.square_footage,
            Field::SalesVolume => &self.sales_volume,
        }
    }

    pub fn get_mut(&mut self, field: Field) -> &mut FieldValue {
        match field {
            Field::Geography => &mut self.geography,
            Field::Industry => &mut self.industry,
            Field::TargetCustomerType => &mut self.target_customer_type,
            Field::Title => &mut self.title,
            Field::EmployeeSize => &mut self.employee_size,
            Field::SquareFootage => &mut self.square_footage,
            Field::SalesVolume => &mut self.sales_volume,
        }
    }

    pub fn set(&mut self, field: Field, value: FieldValue) {
        *self.get_mut(field) = value;
    }

    /// Text value of a field, `None` when unset or cleared
    pub fn value(&self, field: Field) -> Option<&str> {
        self.get(field).as_value()
    }

    /// Fields holding a value, in canonical order
    pub fn present(&self) -> impl Iterator<Item = (Field, &str)> + '_ {
        Field::ALL
            .into_iter()
            .filter_map(move |f| self.value(f).map(|v| (f, v)))
    }

    /// `field: value` pairs for prompts, `None` when nothing is set
    pub fn describe(&self) -> Option<String> {
        let parts: Vec<String> = self
            .present()
            .map(|(f, v)| format!("{}: {}", f, v))
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }

    /// Flat JSON view (`null` for unset or cleared)
    pub fn to_json(&self) -> serde_json::Value {
        let map: BTreeMap<&str, Option<&str>> = Field::ALL
            .into_iter()
            .map(|f| (f.as_str(), self.value(f)))
            .collect();
        serde_json::json!(map)
    }
}
