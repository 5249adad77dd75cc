//! Entity values and the algebra used for dirty tracking.
//!
//! An entity is a flat-ish JSON object with no fixed schema. Models keep two
//! copies of it (current and last-synchronized) and everything a model or a
//! collection needs to know about them is computed here:
//! - [`merge`] / [`layered`]: deep merge, later layers win on key collision
//! - [`diff`]: the changed subtree of one object relative to another
//! - [`matches`]: partial structural match used by collection lookups
//! - [`get`] / [`set`] / [`unset`]: [`Path`]-addressed access
//! - [`compare`]: total ordering used by stable collection sorts

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Field name to arbitrary JSON value. No fixed schema.
pub type EntityValues = Map<String, Value>;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// Object property.
    Key(String),
    /// Array position.
    Index(usize),
}

/// A parsed property path such as `title`, `meta.author` or
/// `posts[0].comment`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    raw: String,
    segments: Vec<PathSegment>,
}

impl Path {
    /// Parses a dotted/bracketed property path.
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: raw.to_string(),
            reason: reason.to_string(),
        };

        if raw.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut segments = Vec::new();
        let mut key = String::new();
        let mut after_index = false;
        let mut after_dot = false;
        let mut chars = raw.chars();

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(invalid("empty segment"));
                    }
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    after_index = false;
                    after_dot = true;
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    } else if after_dot {
                        return Err(invalid("empty segment"));
                    }
                    let mut digits = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(d) => digits.push(d),
                            None => return Err(invalid("unclosed bracket")),
                        }
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| invalid("bracket index must be a non-negative integer"))?;
                    segments.push(PathSegment::Index(index));
                    after_index = true;
                    after_dot = false;
                }
                ']' => return Err(invalid("unexpected ']'")),
                other => {
                    if after_index {
                        return Err(invalid("expected '.' or '[' after an index"));
                    }
                    key.push(other);
                    after_dot = false;
                }
            }
        }

        if !key.is_empty() {
            segments.push(PathSegment::Key(key));
        } else if after_dot {
            return Err(invalid("trailing '.'"));
        }

        if !matches!(segments.first(), Some(PathSegment::Key(_))) {
            return Err(invalid("path must start with a property name"));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The parsed segments, never empty and always starting with a key.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// The path as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// ── Merge ────────────────────────────────────────────────────────

/// Deep-merges `incoming` into `base`. Nested objects are merged key by key;
/// every other value (arrays included) is replaced wholesale.
pub fn merge(base: &mut EntityValues, incoming: &EntityValues) {
    for (key, value) in incoming {
        if let (Some(Value::Object(existing)), Value::Object(update)) = (base.get_mut(key), value) {
            merge(existing, update);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Folds `layers` left to right with [`merge`] into a fresh object.
#[must_use]
pub fn layered(layers: &[&EntityValues]) -> EntityValues {
    let mut out = Map::new();
    for layer in layers {
        merge(&mut out, layer);
    }
    out
}

// ── Diff ─────────────────────────────────────────────────────────

/// Returns the subtree of `values` that differs from `base`.
///
/// Changed scalars (and arrays) are reported with their new value. When both
/// sides hold an object under the same key the diff recurses and only the
/// changed nested keys are reported. Keys present only in `base` are not
/// reported.
#[must_use]
pub fn diff(values: &EntityValues, base: &EntityValues) -> EntityValues {
    let mut changed = Map::new();
    for (key, value) in values {
        let previous = base.get(key);
        if previous == Some(value) {
            continue;
        }
        let entry = match (value, previous) {
            (Value::Object(current), Some(Value::Object(old))) => Value::Object(diff(current, old)),
            _ => value.clone(),
        };
        changed.insert(key.clone(), entry);
    }
    changed
}

// ── Matching & ordering ──────────────────────────────────────────

/// Partial structural match: every key in `filter` must be present in
/// `values` with an equal value. Nested objects in the filter match
/// partially as well. An empty filter matches everything.
#[must_use]
pub fn matches(values: &EntityValues, filter: &EntityValues) -> bool {
    filter.iter().all(|(key, expected)| {
        values
            .get(key)
            .is_some_and(|actual| value_matches(actual, expected))
    })
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => matches(actual, expected),
        _ => actual == expected,
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        Some(Value::Bool(_)) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Array(_)) => 3,
        Some(Value::Object(_)) => 4,
        Some(Value::Null) => 5,
        None => 6,
    }
}

/// Total order over optional JSON values used for sorting.
///
/// Values of the same type compare naturally (numbers numerically, strings
/// lexicographically, arrays element-wise). Across types the order is
/// bool < number < string < array < object < null < missing, so absent
/// and null fields sink to the end of an ascending sort.
#[must_use]
pub fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Array(x)), Some(Value::Array(y))) => {
            for (left, right) in x.iter().zip(y) {
                let ord = compare(Some(left), Some(right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

// ── Path access ──────────────────────────────────────────────────

/// Reads the value at `path`. A top-level key spelled exactly like the raw
/// path wins over path traversal, so flat keys such as `"todos.0.title"`
/// stay addressable.
#[must_use]
pub fn get<'a>(values: &'a EntityValues, path: &Path) -> Option<&'a Value> {
    if let Some(value) = values.get(path.as_str()) {
        return Some(value);
    }
    let (first, rest) = path.segments.split_first()?;
    let PathSegment::Key(key) = first else {
        return None;
    };
    let mut current = values.get(key)?;
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// How far past the end of an existing array [`set`] may write. The gap is
/// filled with `null`.
pub const MAX_ARRAY_GROWTH: usize = 1024;

/// Writes `value` at `path`, creating intermediate objects and arrays as
/// needed. Anything in the way that has the wrong shape is replaced.
///
/// Fails without touching `values` when an index lies more than
/// [`MAX_ARRAY_GROWTH`] past the end of its array.
pub fn set(values: &mut EntityValues, path: &Path, value: Value) -> Result<()> {
    let Some((PathSegment::Key(key), rest)) = path.segments.split_first() else {
        return Ok(());
    };
    check_growth(values.get(key), rest, path)?;
    if rest.is_empty() {
        values.insert(key.clone(), value);
        return Ok(());
    }
    let slot = values.entry(key.clone()).or_insert(Value::Null);
    set_in(slot, rest, value);
    Ok(())
}

fn check_growth(mut current: Option<&Value>, segments: &[PathSegment], path: &Path) -> Result<()> {
    for segment in segments {
        current = match segment {
            PathSegment::Key(key) => current.and_then(|value| value.get(key)),
            PathSegment::Index(index) => {
                let len = current.and_then(Value::as_array).map_or(0, Vec::len);
                if index.saturating_sub(len) > MAX_ARRAY_GROWTH {
                    return Err(Error::InvalidPath {
                        path: path.as_str().to_string(),
                        reason: format!(
                            "index {index} is more than {MAX_ARRAY_GROWTH} past the end of an array of {len}"
                        ),
                    });
                }
                current.and_then(|value| value.get(*index))
            }
        };
    }
    Ok(())
}

fn set_in(slot: &mut Value, segments: &[PathSegment], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };
    match head {
        PathSegment::Key(key) => {
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(map) = slot {
                set_in(map.entry(key.clone()).or_insert(Value::Null), rest, value);
            }
        }
        PathSegment::Index(index) => {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            if let Value::Array(items) = slot {
                if items.len() <= *index {
                    items.resize(index + 1, Value::Null);
                }
                set_in(&mut items[*index], rest, value);
            }
        }
    }
}

/// Removes the value at `path` and returns it.
///
/// Object properties are removed outright. Array elements are replaced by
/// `null` so the positions of their siblings do not shift.
pub fn unset(values: &mut EntityValues, path: &Path) -> Option<Value> {
    if let Some(value) = values.remove(path.as_str()) {
        return Some(value);
    }
    let (last, parents) = path.segments.split_last()?;
    if parents.is_empty() {
        return match last {
            PathSegment::Key(key) => values.remove(key),
            PathSegment::Index(_) => None,
        };
    }
    let parent = get_mut(values, parents)?;
    match (last, parent) {
        (PathSegment::Key(key), Value::Object(map)) => map.remove(key),
        (PathSegment::Index(index), Value::Array(items)) => items
            .get_mut(*index)
            .map(|slot| std::mem::replace(slot, Value::Null)),
        _ => None,
    }
}

fn get_mut<'a>(values: &'a mut EntityValues, segments: &[PathSegment]) -> Option<&'a mut Value> {
    let (first, rest) = segments.split_first()?;
    let PathSegment::Key(key) = first else {
        return None;
    };
    let mut current = values.get_mut(key)?;
    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Index(index), Value::Array(items)) => items.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Converts an arbitrary JSON value into [`EntityValues`], failing when it
/// is not an object.
pub fn from_value(value: Value) -> Result<EntityValues> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::Serialization(serde::de::Error::custom(format!(
            "expected a JSON object, found {}",
            kind(&other)
        )))),
    }
}

/// Short name of a JSON value's type, for error messages.
#[must_use]
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
