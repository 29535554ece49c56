// SPDX-License-Identifier: Apache-2.0

use regex::Regex;

use super::timestamp::TimestampLayout;

/// How a captured substring is converted
#[derive(Debug, Clone, PartialEq)]
pub enum SemanticType {
    Int,
    Float,
    String,
    Bool,
    /// Go duration string stored as integer nanoseconds
    Duration,
    Timestamp(TimestampLayout),
    Drop,
}

/// Where a converted capture ends up in the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Field,
    Tag,
    Timestamp,
    Measurement,
    Ignored,
}

/// Maps a capture modifier to its type and role. `None` means no modifier.
pub fn parse_modifier(modifier: Option<&str>) -> Option<(SemanticType, Role)> {
    let Some(modifier) = modifier else {
        return Some((SemanticType::String, Role::Field));
    };

    let parsed = match modifier {
        "string" => (SemanticType::String, Role::Field),
        "int" => (SemanticType::Int, Role::Field),
        "float" => (SemanticType::Float, Role::Field),
        "bool" => (SemanticType::Bool, Role::Field),
        "duration" => (SemanticType::Duration, Role::Field),
        "tag" => (SemanticType::String, Role::Tag),
        "measurement" => (SemanticType::String, Role::Measurement),
        "drop" => (SemanticType::Drop, Role::Ignored),
        other => {
            let layout = TimestampLayout::from_modifier(other)?;
            (SemanticType::Timestamp(layout), Role::Timestamp)
        }
    };
    Some(parsed)
}

/// A named capture inside a compiled pattern
#[derive(Debug, Clone)]
pub struct CaptureSpec {
    pub name: String,
    pub semantic: SemanticType,
    pub role: Role,
    /// Internal regex group the capture is read from
    pub(crate) group: String,
}

/// One configured top-level pattern, fully expanded and compiled
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub(crate) name: String,
    pub(crate) regex: Regex,
    pub(crate) captures: Vec<CaptureSpec>,
    /// Set when a capture uses an unknown modifier; such a pattern never matches
    pub(crate) unusable: Option<String>,
}

impl CompiledPattern {
    /// The pattern as configured
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn captures(&self) -> &[CaptureSpec] {
        &self.captures
    }

    pub fn is_usable(&self) -> bool {
        self.unusable.is_none()
    }
}
