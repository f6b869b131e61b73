//! Template interpolation and condition evaluation.
//!
//! Supports:
//! - `${{ key }}` - a context window entry
//! - `${{ key.field.items[0] }}` - nested navigation into an entry
//! - `${{ params.name }}` - a run parameter

use crate::context::ContextWindow;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

static TEMPLATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\{\s*([^}]+?)\s*\}\}").expect("template pattern is valid")
});

/// Root segment that addresses run parameters instead of the context window.
pub const PARAMS_ROOT: &str = "params";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unresolved expression '{0}'")]
    Unresolved(String),
    #[error("malformed path '{0}'")]
    MalformedPath(String),
}

/// Resolves template expressions against a context window and run parameters.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    context: &'a ContextWindow,
    params: &'a HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    pub fn new(context: &'a ContextWindow, params: &'a HashMap<String, Value>) -> Self {
        Self { context, params }
    }

    /// Look up a dotted path.
    pub fn lookup(&self, path: &str) -> Result<Option<Value>, TemplateError> {
        let segments = parse_path(path)?;
        let Some((root, rest)) = segments.split_first() else {
            return Err(TemplateError::MalformedPath(path.to_string()));
        };

        let (mut current, rest) = if root.name == PARAMS_ROOT && root.indices.is_empty() {
            let Some((param, rest)) = rest.split_first() else {
                return Err(TemplateError::MalformedPath(path.to_string()));
            };
            match self.params.get(&param.name) {
                Some(v) => (index_into(v, &param.indices), rest),
                None => return Ok(None),
            }
        } else {
            match self.context.get(&root.name) {
                Some(v) => (index_into(v, &root.indices), rest),
                None => return Ok(None),
            }
        };

        for segment in rest {
            current = current
                .and_then(|v| v.get(&segment.name))
                .and_then(|v| index_into(v, &segment.indices));
        }
        Ok(current.cloned())
    }

    /// Resolve templates throughout a JSON value tree.
    ///
    /// A string that is exactly one expression keeps the resolved JSON type;
    /// mixed text is stringified.
    pub fn resolve_value(&self, value: &Value) -> Result<Value, TemplateError> {
        match value {
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_string(&self, s: &str) -> Result<Value, TemplateError> {
        if let Some(caps) = TEMPLATE.captures(s)
            && caps.get(0).is_some_and(|m| m.start() == 0 && m.end() == s.len())
        {
            let expr = caps.get(1).map_or("", |m| m.as_str());
            return self
                .lookup(expr)?
                .ok_or_else(|| TemplateError::Unresolved(expr.to_string()));
        }
        self.interpolate(s).map(Value::String)
    }

    /// Replace every expression in `input` with its stringified value.
    pub fn interpolate(&self, input: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in TEMPLATE.captures_iter(input) {
            let (Some(whole), Some(expr)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = self
                .lookup(expr.as_str())?
                .ok_or_else(|| TemplateError::Unresolved(expr.as_str().to_string()))?;
            out.push_str(&input[last..whole.start()]);
            out.push_str(&stringify(&value));
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }

    /// Evaluate a condition expression.
    ///
    /// Comparisons are ` contains `, `==`, `!=`, `<=`, `>=`, `<` and `>`.
    /// The operator is located in the raw expression, outside any
    /// `${{ }}` template, and each operand is interpolated on its own.
    /// Without an operator the expression is true only if it renders as
    /// `true`.
    pub fn evaluate_condition(&self, expr: &str) -> Result<bool, TemplateError> {
        let expr = expr.trim();
        let Some((left, op, right)) = split_condition(expr) else {
            return Ok(self.interpolate(expr)?.trim() == "true");
        };
        let left = self.interpolate(left)?;
        let right = self.interpolate(right)?;
        let (left, right) = (unquote(&left), unquote(&right));
        Ok(match op {
            CONTAINS => left.contains(right),
            op => compare(left, right, op),
        })
    }
}

const CONTAINS: &str = " contains ";

const OPERATORS: [&str; 7] = [CONTAINS, "==", "!=", "<=", ">=", "<", ">"];

/// Split on the first operator found outside template expressions.
fn split_condition(expr: &str) -> Option<(&str, &'static str, &str)> {
    let masked = mask_templates(expr);
    OPERATORS.iter().find_map(|&op| {
        masked
            .find(op)
            .map(|i| (&expr[..i], op, &expr[i + op.len()..]))
    })
}

/// Same byte length as `expr`, with every template replaced by `_`.
fn mask_templates(expr: &str) -> String {
    let mut masked = String::with_capacity(expr.len());
    let mut last = 0;
    for m in TEMPLATE.find_iter(expr) {
        masked.push_str(&expr[last..m.start()]);
        masked.extend(std::iter::repeat_n('_', m.len()));
        last = m.end();
    }
    masked.push_str(&expr[last..]);
    masked
}

fn compare(left: &str, right: &str, op: &str) -> bool {
    let ordering = match (left.parse::<f64>(), right.parse::<f64>()) {
        (Ok(l), Ok(r)) => l.partial_cmp(&r),
        _ => Some(left.cmp(right)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "==" => ordering.is_eq(),
        "!=" => ordering.is_ne(),
        "<=" => ordering.is_le(),
        ">=" => ordering.is_ge(),
        "<" => ordering.is_lt(),
        ">" => ordering.is_gt(),
        _ => false,
    }
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote).and_then(|r| r.strip_suffix(quote)) {
            return inner;
        }
    }
    s
}

/// Render a value for inline substitution: strings raw, everything else as JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug)]
struct Segment {
    name: String,
    indices: Vec<usize>,
}

fn parse_path(path: &str) -> Result<Vec<Segment>, TemplateError> {
    let malformed = || TemplateError::MalformedPath(path.to_string());
    path.split('.')
        .map(|part| {
            let (name, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(malformed());
            }
            let mut indices = Vec::new();
            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(malformed)?;
                let idx = rest
                    .get(1..close)
                    .and_then(|n| n.parse::<usize>().ok())
                    .filter(|_| rest.starts_with('['))
                    .ok_or_else(malformed)?;
                indices.push(idx);
                rest = &rest[close + 1..];
            }
            Ok(Segment {
                name: name.to_string(),
                indices,
            })
        })
        .collect()
}

fn index_into<'v>(value: &'v Value, indices: &[usize]) -> Option<&'v Value> {
    indices.iter().try_fold(value, |v, &i| v.get(i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn window() -> ContextWindow {
        let mut ctx = ContextWindow::default();
        ctx.insert("page", json!({"status": 200, "items": [{"id": "a"}, {"id": "b"}]}))
            .unwrap();
        ctx.insert("label", json!("done")).unwrap();
        ctx
    }

    #[test]
    fn test_lookup_nested_paths() {
        let ctx = window();
        let params = HashMap::from([("region".to_string(), json!("eu"))]);
        let r = Resolver::new(&ctx, &params);

        assert_eq!(r.lookup("page.status").unwrap(), Some(json!(200)));
        assert_eq!(r.lookup("page.items[1].id").unwrap(), Some(json!("b")));
        assert_eq!(r.lookup("params.region").unwrap(), Some(json!("eu")));
        assert_eq!(r.lookup("missing").unwrap(), None);
        assert!(r.lookup("page..x").is_err());
    }

    #[test]
    fn test_whole_expression_keeps_type() {
        let ctx = window();
        let params = HashMap::new();
        let r = Resolver::new(&ctx, &params);

        let resolved = r
            .resolve_value(&json!({
                "items": "${{ page.items }}",
                "msg": "status=${{ page.status }} ${{label}}",
                "n": 3
            }))
            .unwrap();

        assert_eq!(
            resolved,
            json!({
                "items": [{"id": "a"}, {"id": "b"}],
                "msg": "status=200 done",
                "n": 3
            })
        );
    }

    #[test]
    fn test_unresolved_expression_is_an_error() {
        let ctx = window();
        let params = HashMap::new();
        let r = Resolver::new(&ctx, &params);
        assert_eq!(
            r.resolve_value(&json!("${{ nope.x }}")),
            Err(TemplateError::Unresolved("nope.x".into()))
        );
    }

    #[test]
    fn test_conditions() {
        let ctx = window();
        let params = HashMap::from([("limit".to_string(), json!(10))]);
        let r = Resolver::new(&ctx, &params);

        assert!(r.evaluate_condition("${{ page.status }} == 200").unwrap());
        assert!(r.evaluate_condition("${{ label }} == 'done'").unwrap());
        assert!(r.evaluate_condition("${{ label }} != pending").unwrap());
        assert!(r.evaluate_condition("9 < ${{ params.limit }}").unwrap());
        assert!(!r.evaluate_condition("${{ params.limit }} >= 11").unwrap());
        assert!(r.evaluate_condition("${{ label }} contains on").unwrap());
        assert!(r.evaluate_condition("true").unwrap());
        assert!(!r.evaluate_condition("whatever").unwrap());
    }

    #[test]
    fn test_operators_inside_values_do_not_split() {
        let mut ctx = window();
        ctx.insert("body", json!("<p>ok</p>")).unwrap();
        ctx.insert("query", json!("a=b")).unwrap();
        ctx.insert("arrow", json!("x -> y")).unwrap();
        ctx.insert("flag", json!(true)).unwrap();
        let params = HashMap::new();
        let r = Resolver::new(&ctx, &params);

        assert!(!r.evaluate_condition("${{ body }} contains missing").unwrap());
        assert!(r.evaluate_condition("${{ body }} contains ok").unwrap());
        assert!(r.evaluate_condition("${{ query }} == 'a=b'").unwrap());
        assert!(!r.evaluate_condition("${{ query }} != a=b").unwrap());
        assert!(r.evaluate_condition("${{ arrow }} contains '->'").unwrap());
        assert!(r.evaluate_condition("${{ flag }}").unwrap());
        assert!(!r.evaluate_condition("${{ label }}").unwrap());
    }
}
