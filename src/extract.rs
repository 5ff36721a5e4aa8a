//! Key extraction from CSS module files.
//!
//! The pipeline only depends on the [`Extractor`] trait. [`CssModuleExtractor`]
//! is the default implementation: it collects local class names and
//! `@value` definitions in order of appearance and applies the configured
//! [`LocalsConvention`].

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use crate::config::LocalsConvention;
use crate::error::ExtractionError;

/// Produces the symbolic keys of one source file.
///
/// Keys may repeat; callers deduplicate.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractionError>;
}

/// Extracts exported locals from CSS module sources.
#[derive(Debug, Clone)]
pub struct CssModuleExtractor {
    /// Relative input paths are read from here.
    context: PathBuf,
    locals_convention: LocalsConvention,
}

impl CssModuleExtractor {
    pub fn new(context: impl Into<PathBuf>, locals_convention: LocalsConvention) -> Self {
        Self {
            context: context.into(),
            locals_convention,
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.context.join(path)
        }
    }
}

#[async_trait]
impl Extractor for CssModuleExtractor {
    async fn extract(&self, path: &Path) -> Result<Vec<String>, ExtractionError> {
        let source = tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|source| ExtractionError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let locals = extract_locals(&source).map_err(|reason| ExtractionError::Parse {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(apply_convention(locals, self.locals_convention))
    }
}

/// A top-level piece of a stylesheet.
#[derive(Debug, PartialEq)]
enum Chunk {
    /// Text in front of a `{`: a selector list or an at-rule prelude.
    Prelude(String),
    /// Text terminated by `;`: a declaration or an at-rule statement.
    Statement(String),
}

/// Split CSS into preludes and statements, skipping comments and
/// keeping quoted strings intact.
fn chunks(source: &str) -> Result<Vec<Chunk>, String> {
    let mut out = Vec::new();
    let mut segment = String::new();
    let mut depth = 0usize;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                let mut closed = false;
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        closed = true;
                        break;
                    }
                    prev = c;
                }
                if !closed {
                    return Err("unterminated comment".to_string());
                }
                segment.push(' ');
            }
            '"' | '\'' => {
                segment.push(c);
                let mut closed = false;
                while let Some(s) = chars.next() {
                    segment.push(s);
                    if s == '\\' {
                        if let Some(escaped) = chars.next() {
                            segment.push(escaped);
                        }
                    } else if s == c {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err("unterminated string".to_string());
                }
            }
            '{' => {
                out.push(Chunk::Prelude(std::mem::take(&mut segment)));
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    return Err("unexpected '}'".to_string());
                }
                depth -= 1;
                segment.clear();
            }
            ';' => out.push(Chunk::Statement(std::mem::take(&mut segment))),
            _ => segment.push(c),
        }
    }

    if depth != 0 {
        return Err("unclosed block".to_string());
    }
    Ok(out)
}

fn class_regex() -> &'static Regex {
    static CLASS: OnceLock<Regex> = OnceLock::new();
    CLASS.get_or_init(|| Regex::new(r"\.(-?[_a-zA-Z][_a-zA-Z0-9-]*)").expect("valid class regex"))
}

fn non_local_regex() -> &'static Regex {
    // :global(...) groups and attribute selectors never contribute locals
    static NON_LOCAL: OnceLock<Regex> = OnceLock::new();
    NON_LOCAL.get_or_init(|| Regex::new(r":global\([^)]*\)|\[[^\]]*\]").expect("valid selector regex"))
}

fn value_regex() -> &'static Regex {
    static VALUE: OnceLock<Regex> = OnceLock::new();
    VALUE.get_or_init(|| Regex::new(r"^@value\s+([_a-zA-Z][_a-zA-Z0-9-]*)\s*:").expect("valid value regex"))
}

/// Collect local class names and `@value` names in source order.
pub fn extract_locals(source: &str) -> Result<Vec<String>, String> {
    let mut locals = Vec::new();

    for chunk in chunks(source)? {
        match chunk {
            Chunk::Prelude(prelude) => {
                let prelude = prelude.trim();
                if prelude.starts_with('@') {
                    continue;
                }
                let selector = non_local_regex().replace_all(prelude, " ");
                locals.extend(
                    class_regex()
                        .captures_iter(&selector)
                        .map(|caps| caps[1].to_string()),
                );
            }
            Chunk::Statement(statement) => {
                if let Some(caps) = value_regex().captures(statement.trim()) {
                    locals.push(caps[1].to_string());
                }
            }
        }
    }

    Ok(locals)
}

/// Camel-case a class name: separators are dropped and the next character upper-cased.
pub fn camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;

    for c in name.chars() {
        if c == '-' || c == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}

/// Apply the locals convention to extracted names.
pub fn apply_convention(locals: Vec<String>, convention: LocalsConvention) -> Vec<String> {
    match convention {
        LocalsConvention::AsIs => locals,
        LocalsConvention::CamelCase => locals
            .into_iter()
            .flat_map(|name| {
                let camel = camel_case(&name);
                if camel == name {
                    vec![name]
                } else {
                    vec![name, camel]
                }
            })
            .collect(),
        LocalsConvention::CamelCaseOnly => locals.into_iter().map(|name| camel_case(&name)).collect(),
    }
}
