// SPDX-License-Identifier: Apache-2.0

//! Tails log files and turns each line matching a grok pattern into a
//! typed record.

pub mod bounded_channel;
pub mod config;
pub mod error;
pub mod grok;
pub mod init;
pub mod input;
pub mod record;
pub mod sink;
pub mod supervisor;
pub mod telemetry;

pub use config::LogParserConfig;
pub use error::{Error, Result};
pub use record::{FieldValue, Record};
pub use sink::{Accumulator, CollectingAccumulator};
pub use supervisor::{LogParser, ParserState};
