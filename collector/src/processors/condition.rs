//! Compiled condition expressions
//!
//! Processors that match on an event's shape compile their condition once
//! at init time and evaluate it per event. The language is intentionally
//! small: a field selector, an equality operator and a literal.
//!
//! ```text
//! .values.number == "42"
//! .tags.interface != "mgmt0"
//! .name == "sub1"
//! .timestamp != 0
//! ```
//!
//! Parse failures are configuration errors and fatal at init. Evaluation
//! failures are reported as [`PluginError::Expression`]; callers treat
//! them as "no match" and never abort the batch.

use serde_json::Value;
use virta_core::{scalar_to_string, EventMsg, PluginError};

/// A condition compiled against an event's shape
#[derive(Debug, Clone)]
pub struct Condition {
    selector: Selector,
    op: Op,
    literal: Value,
    src: String,
}

#[derive(Debug, Clone, PartialEq)]
enum Selector {
    Name,
    Timestamp,
    Tag(String),
    ValueField(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    Ne,
}

impl Condition {
    /// Compile a condition expression
    ///
    /// # Errors
    /// Returns [`PluginError::Config`] on any syntax error.
    pub fn parse(expr: &str) -> Result<Self, PluginError> {
        let src = expr.trim().to_string();
        if src.is_empty() {
            return Err(PluginError::Config("empty condition".to_string()));
        }

        // Split on the first operator occurrence; selectors never
        // contain '=' so this is unambiguous.
        let (idx, op) = match (src.find("=="), src.find("!=")) {
            (Some(eq), Some(ne)) => {
                if ne < eq {
                    (ne, Op::Ne)
                } else {
                    (eq, Op::Eq)
                }
            }
            (Some(eq), None) => (eq, Op::Eq),
            (None, Some(ne)) => (ne, Op::Ne),
            (None, None) => {
                return Err(PluginError::Config(format!(
                    "condition {src:?} is missing an operator, expected == or !="
                )))
            }
        };
        let selector = src[..idx].trim();
        let literal = src[idx + 2..].trim();
        if literal.is_empty() {
            return Err(PluginError::Config(format!(
                "condition {src:?} is missing a literal"
            )));
        }

        let selector = Self::parse_selector(selector)?;
        let literal = Self::parse_literal(literal)?;

        Ok(Self {
            selector,
            op,
            literal,
            src,
        })
    }

    fn parse_selector(s: &str) -> Result<Selector, PluginError> {
        let path = s.strip_prefix('.').ok_or_else(|| {
            PluginError::Config(format!("selector {s:?} must start with '.'"))
        })?;
        match path {
            "name" => Ok(Selector::Name),
            "timestamp" => Ok(Selector::Timestamp),
            _ => match path.split_once('.') {
                Some(("tags", key)) if !key.is_empty() => Ok(Selector::Tag(key.to_string())),
                Some(("values", key)) if !key.is_empty() => {
                    Ok(Selector::ValueField(key.to_string()))
                }
                _ => Err(PluginError::Config(format!(
                    "unknown selector {s:?}, expected .name, .timestamp, .tags.<key> or .values.<key>"
                ))),
            },
        }
    }

    fn parse_literal(s: &str) -> Result<Value, PluginError> {
        if let Some(inner) = strip_quotes(s) {
            return Ok(Value::String(inner.to_string()));
        }
        match s {
            "true" => return Ok(Value::Bool(true)),
            "false" => return Ok(Value::Bool(false)),
            _ => {}
        }
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Value::from(n));
        }
        if let Ok(f) = s.parse::<f64>() {
            return Ok(Value::from(f));
        }
        Err(PluginError::Config(format!(
            "invalid literal {s:?}, expected a quoted string, number or bool"
        )))
    }

    /// Evaluate the condition against one event
    ///
    /// A missing tag or value key compares as null: `==` is false, `!=`
    /// is true.
    pub fn eval(&self, ev: &EventMsg) -> Result<bool, PluginError> {
        let actual = match &self.selector {
            Selector::Name => Some(Value::String(ev.name.clone())),
            Selector::Timestamp => {
                if !self.literal.is_number() {
                    return Err(PluginError::Expression(format!(
                        "condition {:?} compares .timestamp to a non-number",
                        self.src
                    )));
                }
                Some(Value::from(ev.timestamp))
            }
            Selector::Tag(key) => ev.tags.get(key).cloned().map(Value::String),
            Selector::ValueField(key) => ev.values.get(key).cloned(),
        };

        let equal = match actual {
            None => false,
            Some(actual) => loose_eq(&actual, &self.literal),
        };
        Ok(match self.op {
            Op::Eq => equal,
            Op::Ne => !equal,
        })
    }

    /// The original expression source
    pub fn source(&self) -> &str {
        &self.src
    }
}

/// Equality with cross-type coercion through scalar rendering
///
/// `42 == "42"` holds, matching how sources report numbers as strings.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    scalar_to_string(a) == scalar_to_string(b)
}

fn strip_quotes(s: &str) -> Option<&str> {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return Some(&s[1..s.len() - 1]);
        }
    }
    None
}
