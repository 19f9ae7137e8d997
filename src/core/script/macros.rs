//! Macro table and `$NAME` expansion
//!
//! Constant macros (`NAME := value`) are bound once during validation.
//! Variable macros (`NAME ?= PLUGIN.COMMAND ...`) are registered during
//! validation but only receive a value when their command executes, so a
//! reference may stay unresolved for a while. Unresolved references are left
//! untouched and picked up again on the next expansion.
//!
//! A macro value may itself contain `$NAME` references. Expansion repeats
//! until the text stops changing, bounded by [`MAX_EXPANSION_PASSES`] so a
//! cyclic binding cannot hang the interpreter.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;

/// Upper bound of substitution passes over one line
pub const MAX_EXPANSION_PASSES: usize = 16;

static MACRO_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").expect("macro reference pattern"));

/// Value slot of a macro
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MacroValue {
    /// Literal bound at validation time
    Constant(String),
    /// Result of a plugin command, `None` until the command ran
    Variable(Option<String>),
}

impl MacroValue {
    /// Currently bound text, if any
    pub fn bound(&self) -> Option<&str> {
        match self {
            Self::Constant(value) => Some(value),
            Self::Variable(value) => value.as_deref(),
        }
    }
}

/// Mapping of macro name to its value slot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MacroTable {
    entries: BTreeMap<String, MacroValue>,
}

impl MacroTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a constant macro. Returns `false` when the name is already taken.
    #[must_use]
    pub fn define_constant(&mut self, name: &str, value: &str) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries
            .insert(name.to_string(), MacroValue::Constant(value.to_string()));
        true
    }

    /// Register a variable macro name. Re-registering a variable is allowed;
    /// returns `false` only when the name belongs to a constant.
    #[must_use]
    pub fn register_variable(&mut self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(MacroValue::Constant(_)) => false,
            Some(MacroValue::Variable(_)) => true,
            None => {
                self.entries.insert(name.to_string(), MacroValue::Variable(None));
                true
            }
        }
    }

    /// Bind the result of a variable macro's command
    pub fn bind(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .insert(name.to_string(), MacroValue::Variable(Some(value.into())));
    }

    /// Currently bound text of a macro
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).and_then(MacroValue::bound)
    }

    /// Whether the name was defined or registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Constant macros only, in name order
    pub fn constants(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().filter_map(|(name, value)| match value {
            MacroValue::Constant(v) => Some((name.as_str(), v.as_str())),
            MacroValue::Variable(_) => None,
        })
    }

    /// Variable macros with their current value, in name order
    pub fn variables(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().filter_map(|(name, value)| match value {
            MacroValue::Variable(v) => Some((name.as_str(), v.as_deref())),
            MacroValue::Constant(_) => None,
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Is the table empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every bound `$NAME` reference until nothing changes; unbound
    /// ones stay as written
    pub fn expand(&self, line: &str) -> String {
        let mut text = line.to_string();
        for _ in 0..MAX_EXPANSION_PASSES {
            if !text.contains('$') {
                break;
            }
            let next = self.substitute(&text);
            if next == text {
                break;
            }
            text = next;
        }
        text
    }

    fn substitute(&self, line: &str) -> String {
        MACRO_REF
            .replace_all(line, |caps: &Captures<'_>| match self.get(&caps[1]) {
                Some(value) => value.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// Names referenced as `$NAME` in the line that are not in the table at all
    pub fn undefined_references<'a>(&self, line: &'a str) -> Vec<&'a str> {
        MACRO_REF
            .captures_iter(line)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .filter(|name| !self.contains(name))
            .collect()
    }
}
