// SPDX-License-Identifier: Apache-2.0

//! Grok pattern engine: a library of named, composable patterns compiled into
//! regular expressions whose captures carry a type and a role.

mod builtin;
pub mod convert;
mod library;
mod matcher;
mod pattern;
pub mod timestamp;

pub use builtin::DEFAULT_PATTERNS;
pub use convert::ConvertError;
pub use library::PatternLibrary;
pub use matcher::GrokMatcher;
pub use pattern::{CaptureSpec, CompiledPattern, Role, SemanticType, parse_modifier};
pub use timestamp::{TimeZoneSetting, TimestampLayout};
