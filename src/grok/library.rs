// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use super::builtin::DEFAULT_PATTERNS;
use super::pattern::{CaptureSpec, CompiledPattern, parse_modifier};
use crate::error::{Error, Result};

const BUILTIN_ORIGIN: &str = "built-in";
const INLINE_ORIGIN: &str = "custom_patterns";

/// Expanded grok patterns get large, especially with Unicode classes
const REGEX_SIZE_LIMIT: usize = 64 * (1 << 20);

/// `%{NAME}`, `%{NAME:capture}` or `%{NAME:capture:modifier}`
static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"%\{(?P<pattern>[A-Za-z0-9_]+)(?::(?P<capture>[^:}]+)(?::(?P<modifier>[^}]+))?)?\}",
    )
    .unwrap()
});

#[derive(Debug, Clone)]
struct Definition {
    template: String,
    origin: String,
}

/// Named pattern templates, built-in first and then user supplied.
#[derive(Debug, Clone, Default)]
pub struct PatternLibrary {
    definitions: HashMap<String, Definition>,
}

struct Frame<'a> {
    /// None for the configured entry itself
    name: Option<&'a str>,
    template: &'a str,
    pos: usize,
}

struct Expansion {
    regex: String,
    captures: Vec<CaptureSpec>,
    unusable: Option<String>,
}

impl PatternLibrary {
    /// Built-in definitions, then each custom pattern file in order, then inline text.
    pub fn load(custom_pattern_files: &[PathBuf], inline: &str) -> Result<Self> {
        let mut library = Self::default();
        library.add_definitions(DEFAULT_PATTERNS, BUILTIN_ORIGIN)?;

        for path in custom_pattern_files {
            let text = fs::read_to_string(path).map_err(|source| Error::PatternFile {
                path: path.clone(),
                source,
            })?;
            library.add_definitions(&text, &path.display().to_string())?;
        }

        if !inline.trim().is_empty() {
            library.add_definitions(inline, INLINE_ORIGIN)?;
        }

        debug!(patterns = library.len(), "Loaded pattern library");
        Ok(library)
    }

    /// Adds `NAME TEMPLATE` lines. Blank lines and `#` comments are skipped.
    pub fn add_definitions(&mut self, text: &str, origin: &str) -> Result<()> {
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (name, template) =
                parse_definition(line).ok_or_else(|| Error::InvalidPatternDefinition {
                    origin: origin.to_string(),
                    line: idx + 1,
                    text: raw.to_string(),
                })?;
            self.define(name, template, origin);
        }
        Ok(())
    }

    /// Later definitions replace earlier ones of the same name.
    pub fn define(&mut self, name: &str, template: &str, origin: &str) {
        let definition = Definition {
            template: template.to_string(),
            origin: origin.to_string(),
        };
        if let Some(previous) = self.definitions.insert(name.to_string(), definition) {
            if previous.template != template {
                warn!(
                    pattern = name,
                    previous = %previous.origin,
                    replacement = origin,
                    "Pattern definition overrides an earlier one"
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.definitions.get(name).map(|d| d.template.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.definitions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Compiles every non-empty entry, keeping the configured order.
    pub fn compile(&self, entries: &[String], anchored: bool) -> Result<Vec<CompiledPattern>> {
        entries
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .map(|entry| self.compile_pattern(entry, anchored))
            .collect()
    }

    /// An entry is a template; a bare defined name is shorthand for `%{NAME}`.
    pub fn compile_pattern(&self, entry: &str, anchored: bool) -> Result<CompiledPattern> {
        let template = if !entry.contains("%{") && self.contains(entry) {
            format!("%{{{}}}", entry)
        } else {
            entry.to_string()
        };

        let expansion = self.expand(&template, entry)?;
        let source = if anchored {
            format!("^(?:{})$", expansion.regex)
        } else {
            expansion.regex
        };

        let regex = RegexBuilder::new(&source)
            .size_limit(REGEX_SIZE_LIMIT)
            .dfa_size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| Error::Regex {
                pattern: entry.to_string(),
                message: e.to_string(),
            })?;

        if let Some(reason) = &expansion.unusable {
            warn!(pattern = entry, reason = %reason, "Pattern can never match");
        }
        debug!(
            pattern = entry,
            captures = expansion.captures.len(),
            "Compiled pattern"
        );

        Ok(CompiledPattern {
            name: entry.to_string(),
            regex,
            captures: expansion.captures,
            unusable: expansion.unusable,
        })
    }

    /// Substitutes references until only regex text remains. Uses an explicit
    /// stack of templates; a name already on the stack is a cycle.
    fn expand<'a>(&'a self, root: &'a str, entry: &str) -> Result<Expansion> {
        let mut out = String::with_capacity(root.len() * 4);
        let mut captures = Vec::new();
        let mut unusable = None;
        let mut next_group = 0usize;
        let mut stack = vec![Frame {
            name: None,
            template: root,
            pos: 0,
        }];

        while let Some(top) = stack.last() {
            let (current, template, pos) = (top.name, top.template, top.pos);

            let found = REFERENCE.captures_at(template, pos).and_then(|caps| {
                let range = caps.get(0)?.range();
                Some((range, caps))
            });
            let Some((range, caps)) = found else {
                out.push_str(&template[pos..]);
                stack.pop();
                if !stack.is_empty() {
                    out.push(')');
                }
                continue;
            };

            out.push_str(&template[pos..range.start]);
            if let Some(top) = stack.last_mut() {
                top.pos = range.end;
            }

            let name = caps.name("pattern").map_or("", |m| m.as_str());
            if stack.iter().any(|frame| frame.name == Some(name)) {
                let chain = stack
                    .iter()
                    .filter_map(|frame| frame.name)
                    .chain(std::iter::once(name))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(Error::PatternCycle {
                    name: name.to_string(),
                    chain,
                });
            }

            let definition =
                self.definitions
                    .get(name)
                    .ok_or_else(|| Error::UndefinedPattern {
                        name: name.to_string(),
                        referenced_by: current.unwrap_or(entry).to_string(),
                    })?;

            match caps.name("capture") {
                Some(capture) => {
                    let group = format!("_g{}", next_group);
                    next_group += 1;

                    let modifier = caps.name("modifier").map(|m| m.as_str());
                    match parse_modifier(modifier) {
                        Some((semantic, role)) => captures.push(CaptureSpec {
                            name: capture.as_str().to_string(),
                            semantic,
                            role,
                            group: group.clone(),
                        }),
                        None => {
                            unusable.get_or_insert_with(|| {
                                format!(
                                    "unknown modifier {:?} on capture {:?}",
                                    modifier.unwrap_or_default(),
                                    capture.as_str()
                                )
                            });
                        }
                    }

                    out.push_str("(?P<");
                    out.push_str(&group);
                    out.push('>');
                }
                None => out.push_str("(?:"),
            }

            stack.push(Frame {
                name: Some(name),
                template: &definition.template,
                pos: 0,
            });
        }

        Ok(Expansion {
            regex: out,
            captures,
            unusable,
        })
    }
}

fn parse_definition(line: &str) -> Option<(&str, &str)> {
    let (name, template) = line.split_once(char::is_whitespace)?;
    let template = template.trim();
    let valid_name = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid_name || template.is_empty() {
        return None;
    }
    Some((name, template))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grok::pattern::{Role, SemanticType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn library(custom: &str) -> PatternLibrary {
        PatternLibrary::load(&[], custom).unwrap()
    }

    #[test]
    fn test_builtins_compile() {
        let lib = library("");
        for name in [
            "COMMON_LOG_FORMAT",
            "COMBINED_LOG_FORMAT",
            "HTTPD_ERRORLOG",
            "SYSLOGBASE",
            "TIMESTAMP_ISO8601",
            "URI",
            "MAC",
            "UUID",
            "EXAMPLE_LOG",
        ] {
            let compiled = lib.compile_pattern(name, false);
            assert!(compiled.is_ok(), "{} failed: {:?}", name, compiled.err());
        }
    }

    #[test]
    fn test_nested_references_and_captures() {
        let lib = library("INNER %{NUMBER:value:int}\nOUTER %{WORD:name:tag}=%{INNER}");
        let compiled = lib.compile_pattern("%{OUTER}", false).unwrap();

        let names: Vec<_> = compiled.captures().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["name", "value"]);
        assert_eq!(compiled.captures()[0].role, Role::Tag);
        assert_eq!(compiled.captures()[1].semantic, SemanticType::Int);
        assert!(compiled.regex().is_match("load=42"));
    }

    #[test]
    fn test_bare_name_entry() {
        let lib = library("GREETING hello %{WORD:who}");
        let compiled = lib.compile_pattern("GREETING", false).unwrap();
        assert!(compiled.regex().is_match("say hello world"));
        assert_eq!(compiled.captures().len(), 1);

        // not a defined name: used as a literal regex
        let literal = lib.compile_pattern("plain text", false).unwrap();
        assert!(literal.regex().is_match("some plain text"));
    }

    #[test]
    fn test_undefined_pattern() {
        let lib = library("");
        match lib.compile_pattern("%{FOOBAR}", false) {
            Err(Error::UndefinedPattern {
                name,
                referenced_by,
            }) => {
                assert_eq!(name, "FOOBAR");
                assert_eq!(referenced_by, "%{FOOBAR}");
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.name)),
        }

        let lib = library("USES_MISSING %{MISSING}");
        match lib.compile_pattern("%{USES_MISSING}", false) {
            Err(Error::UndefinedPattern { referenced_by, .. }) => {
                assert_eq!(referenced_by, "USES_MISSING")
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.name)),
        }
    }

    #[test]
    fn test_reference_cycle() {
        let lib = library("A x%{B}\nB y%{C}\nC z%{A}\nSELF %{SELF}");
        match lib.compile_pattern("%{A}", false) {
            Err(Error::PatternCycle { name, chain }) => {
                assert_eq!(name, "A");
                assert_eq!(chain, "A -> B -> C -> A");
            }
            other => panic!("unexpected result: {:?}", other.map(|p| p.name)),
        }
        assert!(matches!(
            lib.compile_pattern("SELF", false),
            Err(Error::PatternCycle { .. })
        ));
    }

    #[test]
    fn test_repeated_reference_is_not_a_cycle() {
        let lib = library("PAIR %{WORD:a} %{WORD:a}");
        let compiled = lib.compile_pattern("%{PAIR}", false).unwrap();
        assert_eq!(compiled.captures().len(), 2);
        assert!(compiled.regex().is_match("one two"));
    }

    #[test]
    fn test_malformed_definition() {
        let err = PatternLibrary::load(&[], "GOOD \\d+\nLONELY\n").unwrap_err();
        match err {
            Error::InvalidPatternDefinition { origin, line, .. } => {
                assert_eq!(origin, "custom_patterns");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_override_replaces_builtin() {
        let lib = library("NUMBER \\d{3}");
        assert_eq!(lib.get("NUMBER"), Some("\\d{3}"));
        let compiled = lib.compile_pattern("^%{NUMBER:n:int}$", false).unwrap();
        assert!(compiled.regex().is_match("123"));
        assert!(!compiled.regex().is_match("1.5"));
    }

    #[test]
    fn test_pattern_files_load_in_order() {
        let mut first = NamedTempFile::new().unwrap();
        writeln!(first, "# comment\nLEVEL [A-Z]+\n\nMSG %{{LEVEL:level:tag}}").unwrap();
        let mut second = NamedTempFile::new().unwrap();
        writeln!(second, "LEVEL (?:INFO|WARN)").unwrap();

        let lib = PatternLibrary::load(
            &[first.path().to_path_buf(), second.path().to_path_buf()],
            "",
        )
        .unwrap();
        assert_eq!(lib.get("LEVEL"), Some("(?:INFO|WARN)"));
        assert!(lib.contains("MSG"));

        let missing = PatternLibrary::load(&[PathBuf::from("/nonexistent/patterns")], "");
        assert!(matches!(missing, Err(Error::PatternFile { .. })));
    }

    #[test]
    fn test_anchored_patterns() {
        let lib = library("");
        let unanchored = lib.compile_pattern("%{INT:n:int}", false).unwrap();
        let anchored = lib.compile_pattern("%{INT:n:int}", true).unwrap();
        assert!(unanchored.regex().is_match("value 42 ok"));
        assert!(!anchored.regex().is_match("value 42 ok"));
        assert!(anchored.regex().is_match("42"));
    }

    #[test]
    fn test_unknown_modifier_marks_unusable() {
        let lib = library("");
        let compiled = lib.compile_pattern("%{WORD:w:integer}", false).unwrap();
        assert!(!compiled.is_usable());
    }

    #[test]
    fn test_invalid_regex() {
        let lib = library("BROKEN [a-");
        assert!(matches!(
            lib.compile_pattern("%{BROKEN}", false),
            Err(Error::Regex { .. })
        ));
    }

    #[test]
    fn test_compile_keeps_order_and_skips_blank() {
        let lib = library("");
        let patterns = lib
            .compile(
                &[
                    "%{IP:ip}".to_string(),
                    " ".to_string(),
                    "%{WORD:w}".to_string(),
                ],
                false,
            )
            .unwrap();
        let names: Vec<_> = patterns.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["%{IP:ip}", "%{WORD:w}"]);
    }
}
