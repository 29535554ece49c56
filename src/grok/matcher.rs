// SPDX-License-Identifier: Apache-2.0

use chrono::Utc;
use regex::Captures;
use tracing::trace;

use super::convert::{self, ConvertError};
use super::pattern::{CompiledPattern, Role, SemanticType};
use super::timestamp::TimeZoneSetting;
use crate::record::{FieldValue, Record};

/// Matches lines against the compiled patterns in configured order.
#[derive(Debug, Clone)]
pub struct GrokMatcher {
    patterns: Vec<CompiledPattern>,
    measurement: String,
    timezone: TimeZoneSetting,
}

impl GrokMatcher {
    pub fn new(
        patterns: Vec<CompiledPattern>,
        measurement: impl Into<String>,
        timezone: TimeZoneSetting,
    ) -> Self {
        Self {
            patterns,
            measurement: measurement.into(),
            timezone,
        }
    }

    /// First pattern that matches and converts cleanly wins. The caller adds
    /// the source path tag.
    pub fn match_line(&self, line: &str) -> Option<Record> {
        for pattern in self.patterns.iter().filter(|p| p.is_usable()) {
            let Some(caps) = pattern.regex.captures(line) else {
                continue;
            };
            match self.build_record(pattern, &caps) {
                Ok(record) => return Some(record),
                Err(e) => {
                    trace!(pattern = pattern.name(), error = %e, "Capture conversion failed");
                }
            }
        }
        None
    }

    fn build_record(
        &self,
        pattern: &CompiledPattern,
        caps: &Captures<'_>,
    ) -> Result<Record, ConvertError> {
        let mut record = Record::new(self.measurement.clone(), Utc::now());

        for capture in &pattern.captures {
            let Some(raw) = caps.name(&capture.group).map(|m| m.as_str()) else {
                continue;
            };
            if raw.is_empty() {
                continue;
            }

            match capture.role {
                Role::Ignored => {}
                Role::Tag => {
                    record.tags.insert(capture.name.clone(), raw.to_string());
                }
                Role::Measurement => record.measurement = raw.to_string(),
                Role::Timestamp => {
                    if let SemanticType::Timestamp(layout) = &capture.semantic {
                        record.timestamp = layout.parse(raw, &self.timezone).ok_or_else(|| {
                            ConvertError::Timestamp {
                                value: raw.to_string(),
                                layout: format!("{:?}", layout),
                            }
                        })?;
                    }
                }
                Role::Field => {
                    let value = convert_field(&capture.semantic, raw)?;
                    record.fields.insert(capture.name.clone(), value);
                }
            }
        }

        Ok(record)
    }
}

fn convert_field(semantic: &SemanticType, raw: &str) -> Result<FieldValue, ConvertError> {
    match semantic {
        SemanticType::Int => convert::to_int(raw),
        SemanticType::Float => convert::to_float(raw),
        SemanticType::Bool => convert::to_bool(raw),
        SemanticType::Duration => convert::to_duration(raw),
        SemanticType::String | SemanticType::Timestamp(_) | SemanticType::Drop => {
            Ok(convert::to_text(raw))
        }
    }
}
