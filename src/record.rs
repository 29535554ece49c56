// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Tag carrying the file a record was read from
pub const PATH_TAG: &str = "path";

/// A typed field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(v) => write!(f, "{}i", v),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::String(v) => write!(f, "{:?}", v),
            FieldValue::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// One parsed line: a measurement with its fields, tags and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub measurement: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    pub fn new(measurement: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            measurement: measurement.into(),
            fields: BTreeMap::new(),
            tags: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }

    /// Sets the source path tag, replacing any captured value of the same name.
    pub fn set_path(&mut self, path: &std::path::Path) {
        self.tags
            .insert(PATH_TAG.to_string(), path.display().to_string());
    }
}

impl fmt::Display for Record {
    /// Line-protocol style rendering, handy in logs
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.measurement)?;
        for (k, v) in &self.tags {
            write!(f, ",{}={}", k, v)?;
        }
        let mut sep = ' ';
        for (k, v) in &self.fields {
            write!(f, "{}{}={}", sep, k, v)?;
            sep = ',';
        }
        let nanos = self
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.timestamp.timestamp());
        write!(f, " {}", nanos)
    }
}
