//! Property tree for calibration metadata
//!
//! Values are JSON-like (scalars, lists and maps) and addressed by path
//! expressions: map keys separated by `.` and list elements selected with
//! `[n]`, e.g. `vna.model` or `switches[0][1]`. The calibration core stores
//! these trees but never interprets them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, VnaCalError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>> {
    let bad = |why: &str| VnaCalError::InvalidArgument(format!("property path {path:?}: {why}"));
    let mut segments = Vec::new();
    let mut chars = path.chars().peekable();
    let mut key = String::new();
    let mut after_index = false;

    while let Some(ch) = chars.next() {
        match ch {
            '.' => {
                if key.is_empty() && !after_index {
                    return Err(bad("empty key"));
                }
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                after_index = false;
                if chars.peek().is_none() {
                    return Err(bad("trailing '.'"));
                }
            }
            '[' => {
                if !key.is_empty() {
                    segments.push(Segment::Key(std::mem::take(&mut key)));
                }
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        Some(_) => return Err(bad("list index must be a number")),
                        None => return Err(bad("unterminated '['")),
                    }
                }
                let index = digits.parse::<usize>().map_err(|_| bad("empty list index"))?;
                segments.push(Segment::Index(index));
                after_index = true;
            }
            ']' => return Err(bad("unbalanced ']'")),
            c => {
                if after_index {
                    return Err(bad("expected '.' or '[' after ']'"));
                }
                key.push(c);
            }
        }
    }
    if !key.is_empty() {
        segments.push(Segment::Key(key));
    }
    Ok(segments)
}

/// Path-addressed metadata tree
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    root: Value,
}

impl Properties {
    pub fn new() -> Self {
        Self { root: Value::Null }
    }

    /// Whole tree
    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_null()
    }

    /// Look up the value at `path`; the empty path is the root.
    pub fn get(&self, path: &str) -> Result<Option<&Value>> {
        let mut node = &self.root;
        for segment in parse_path(path)? {
            let next = match (&segment, node) {
                (Segment::Key(k), Value::Object(map)) => map.get(k),
                (Segment::Index(i), Value::Array(list)) => list.get(*i),
                _ => None,
            };
            match next {
                Some(n) => node = n,
                None => return Ok(None),
            }
        }
        Ok(Some(node))
    }

    /// Store `value` at `path`, creating intermediate maps and lists.
    ///
    /// A list index may address an existing element or the position just
    /// past the end (append). Scalars in the way are replaced.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let segments = parse_path(path)?;
        let mut node = &mut self.root;
        for segment in &segments {
            node = match segment {
                Segment::Key(k) => {
                    if !node.is_object() {
                        *node = Value::Object(Map::new());
                    }
                    match node {
                        Value::Object(map) => map.entry(k.clone()).or_insert(Value::Null),
                        _ => unreachable!("node was just made an object"),
                    }
                }
                Segment::Index(i) => {
                    if !node.is_array() {
                        *node = Value::Array(Vec::new());
                    }
                    match node {
                        Value::Array(list) => {
                            if *i > list.len() {
                                return Err(VnaCalError::IndexOutOfRange {
                                    what: "property list",
                                    index: *i,
                                    limit: list.len(),
                                });
                            }
                            if *i == list.len() {
                                list.push(Value::Null);
                            }
                            &mut list[*i]
                        }
                        _ => unreachable!("node was just made an array"),
                    }
                }
            };
        }
        *node = value.into();
        Ok(())
    }

    /// Remove and return the value at `path`.
    pub fn delete(&mut self, path: &str) -> Result<Value> {
        let mut segments = parse_path(path)?;
        let missing = || VnaCalError::InvalidArgument(format!("no property at {path:?}"));
        let Some(last) = segments.pop() else {
            return Ok(std::mem::take(&mut self.root));
        };

        let mut node = &mut self.root;
        for segment in &segments {
            node = match (segment, node) {
                (Segment::Key(k), Value::Object(map)) => map.get_mut(k).ok_or_else(missing)?,
                (Segment::Index(i), Value::Array(list)) => list.get_mut(*i).ok_or_else(missing)?,
                _ => return Err(missing()),
            };
        }
        match (last, node) {
            (Segment::Key(k), Value::Object(map)) => map.remove(&k).ok_or_else(missing),
            (Segment::Index(i), Value::Array(list)) if i < list.len() => Ok(list.remove(i)),
            _ => Err(missing()),
        }
    }

    /// Number of elements of the list or map at `path`.
    pub fn count(&self, path: &str) -> Result<usize> {
        match self.get(path)? {
            Some(Value::Array(list)) => Ok(list.len()),
            Some(Value::Object(map)) => Ok(map.len()),
            Some(Value::Null) | None => Ok(0),
            Some(_) => Err(VnaCalError::InvalidArgument(format!(
                "property {path:?} is a scalar"
            ))),
        }
    }

    /// Keys of the map at `path`, in sorted order.
    pub fn keys(&self, path: &str) -> Result<Vec<String>> {
        match self.get(path)? {
            Some(Value::Object(map)) => Ok(map.keys().cloned().collect()),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(_) => Err(VnaCalError::InvalidArgument(format!(
                "property {path:?} is not a map"
            ))),
        }
    }
}
