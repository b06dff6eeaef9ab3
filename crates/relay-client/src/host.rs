//! Host document seams.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Error raised by a host stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SheetError {
    /// The sheet's rules cannot be read, typically because the import failed.
    #[error("stylesheet rules are not readable: {0}")]
    Unreadable(String),

    #[error("rule index {0} out of range")]
    IndexOutOfRange(usize),

    #[error("invalid rule: {0}")]
    Syntax(String),
}

/// A loaded stylesheet.
pub trait StyleSheet: Send + Sync {
    /// Read the sheet's rules.
    fn css_rules(&self) -> Result<Vec<String>, SheetError>;
}

/// An `@import` rule inside a carrier sheet.
#[derive(Clone)]
pub struct ImportRule {
    /// Full rule text.
    pub css_text: String,
    /// Imported URL.
    pub href: String,
    /// The imported sheet, once the host has attached it.
    pub sheet: Option<Arc<dyn StyleSheet>>,
}

impl std::fmt::Debug for ImportRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRule")
            .field("href", &self.href)
            .field("attached", &self.sheet.is_some())
            .finish()
    }
}

/// A stylesheet that hosts dynamically inserted import rules.
pub trait ImportSheet: Send + Sync {
    /// Insert a rule at `index`.
    fn insert_rule(&self, rule: &str, index: usize) -> Result<usize, SheetError>;

    /// The sheet's import rules, in order.
    fn rules(&self) -> Vec<ImportRule>;

    /// Remove the rule at `index`.
    fn delete_rule(&self, index: usize) -> Result<(), SheetError>;
}

/// The document the carrier sheet lives in.
pub trait StyleDocument: Send + Sync {
    /// Find the stylesheet owned by the element matching `selector`.
    fn find_sheet(&self, selector: &str) -> Option<Arc<dyn ImportSheet>>;
}

/// The `@import` rule text for `url`.
pub fn import_rule(url: &str) -> String {
    format!("@import url(\"{url}\");")
}

/// The URL of an `@import url("...")` rule.
pub fn parse_import_href(rule: &str) -> Option<&str> {
    rule.trim()
        .strip_prefix("@import url(\"")?
        .split_once("\")")
        .map(|(href, _)| href)
}

#[derive(Debug, Clone)]
enum Nested {
    Readable(Vec<String>),
    Unreadable(String),
}

struct NestedSheet(Nested);

impl StyleSheet for NestedSheet {
    fn css_rules(&self) -> Result<Vec<String>, SheetError> {
        match &self.0 {
            Nested::Readable(rules) => Ok(rules.clone()),
            Nested::Unreadable(reason) => Err(SheetError::Unreadable(reason.clone())),
        }
    }
}

#[derive(Debug, Default)]
struct SheetState {
    rules: Vec<String>,
    nested: HashMap<String, Nested>,
    inserts: usize,
}

/// Carrier sheet held in memory.
///
/// Imports stay unattached until `attach` or `attach_unreadable` is called
/// for their URL, which is how a test or an embedding host simulates the
/// browser finishing an import.
#[derive(Debug, Default)]
pub struct MemorySheet {
    state: Mutex<SheetState>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a readable sheet for imports of `href`.
    pub fn attach(&self, href: impl Into<String>, rules: Vec<&str>) {
        let rules = rules.into_iter().map(String::from).collect();
        self.lock().nested.insert(href.into(), Nested::Readable(rules));
    }

    /// Attach a sheet whose rules cannot be read.
    pub fn attach_unreadable(&self, href: impl Into<String>, reason: impl Into<String>) {
        self.lock()
            .nested
            .insert(href.into(), Nested::Unreadable(reason.into()));
    }

    /// Current rule texts, in order.
    pub fn rule_texts(&self) -> Vec<String> {
        self.lock().rules.clone()
    }

    /// Number of `insert_rule` calls so far.
    pub fn insert_count(&self) -> usize {
        self.lock().inserts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SheetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ImportSheet for MemorySheet {
    fn insert_rule(&self, rule: &str, index: usize) -> Result<usize, SheetError> {
        if parse_import_href(rule).is_none() {
            return Err(SheetError::Syntax(rule.to_string()));
        }
        let mut state = self.lock();
        if index > state.rules.len() {
            return Err(SheetError::IndexOutOfRange(index));
        }
        state.rules.insert(index, rule.to_string());
        state.inserts += 1;
        Ok(index)
    }

    fn rules(&self) -> Vec<ImportRule> {
        let state = self.lock();
        state
            .rules
            .iter()
            .filter_map(|text| {
                let href = parse_import_href(text)?;
                Some(ImportRule {
                    css_text: text.clone(),
                    href: href.to_string(),
                    sheet: state
                        .nested
                        .get(href)
                        .map(|nested| Arc::new(NestedSheet(nested.clone())) as Arc<dyn StyleSheet>),
                })
            })
            .collect()
    }

    fn delete_rule(&self, index: usize) -> Result<(), SheetError> {
        let mut state = self.lock();
        if index >= state.rules.len() {
            return Err(SheetError::IndexOutOfRange(index));
        }
        state.rules.remove(index);
        Ok(())
    }
}

/// Document whose sheets are registered by selector.
#[derive(Default)]
pub struct MemoryDocument {
    sheets: HashMap<String, Arc<MemorySheet>>,
    lookups: Mutex<usize>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sheet` under `selector`.
    pub fn with_sheet(mut self, selector: impl Into<String>, sheet: Arc<MemorySheet>) -> Self {
        self.sheets.insert(selector.into(), sheet);
        self
    }

    /// Number of `find_sheet` calls so far.
    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StyleDocument for MemoryDocument {
    fn find_sheet(&self, selector: &str) -> Option<Arc<dyn ImportSheet>> {
        *self.lookups.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        self.sheets
            .get(selector)
            .map(|sheet| Arc::clone(sheet) as Arc<dyn ImportSheet>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_rule_round_trip() {
        let rule = import_rule("https://cdn.test/a.css");
        assert_eq!(rule, r#"@import url("https://cdn.test/a.css");"#);
        assert_eq!(parse_import_href(&rule), Some("https://cdn.test/a.css"));
        assert_eq!(parse_import_href("body { color: red }"), None);
    }

    #[test]
    fn test_memory_sheet_attaches_nested_sheets() {
        let sheet = MemorySheet::new();
        sheet.insert_rule(&import_rule("/a.css"), 0).unwrap();
        sheet.insert_rule(&import_rule("/b.css"), 1).unwrap();
        sheet.attach("/a.css", vec![".a { color: red }"]);
        sheet.attach_unreadable("/b.css", "blocked");

        let rules = sheet.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].sheet.as_ref().unwrap().css_rules().unwrap().len(), 1);
        assert!(matches!(
            rules[1].sheet.as_ref().unwrap().css_rules(),
            Err(SheetError::Unreadable(_))
        ));
    }

    #[test]
    fn test_memory_sheet_rejects_bad_indices() {
        let sheet = MemorySheet::new();
        assert_eq!(
            sheet.insert_rule(&import_rule("/a.css"), 3),
            Err(SheetError::IndexOutOfRange(3))
        );
        assert_eq!(sheet.delete_rule(0), Err(SheetError::IndexOutOfRange(0)));
        assert!(matches!(sheet.insert_rule("p {}", 0), Err(SheetError::Syntax(_))));
    }
}
