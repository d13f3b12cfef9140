//! Path arithmetic and mutations over a JSON document tree.
//!
//! Both gateways keep their data as nested JSON objects addressed by
//! `/`-separated paths. A `null` value never lives in the tree: writing
//! `null` removes the node, and objects emptied by a removal are pruned.

use serde_json::{Map, Value};

/// Split a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
  path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Join segments back into a canonical path.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
  segments
    .iter()
    .map(AsRef::as_ref)
    .collect::<Vec<_>>()
    .join("/")
}

/// `true` when a change at `changed` is visible from a watcher at `watched`:
/// one path is a prefix of the other.
pub fn related<A: AsRef<str>, B: AsRef<str>>(watched: &[A], changed: &[B]) -> bool {
  watched
    .iter()
    .zip(changed)
    .all(|(a, b)| a.as_ref() == b.as_ref())
}

/// Whether `key` can be used as a single path segment.
pub fn is_valid_key(key: &str) -> bool { !key.is_empty() && !key.contains('/') }

/// Look up the node at `segments`.
pub fn get<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
  segments
    .iter()
    .try_fold(root, |node, seg| node.as_object()?.get(*seg))
}

/// `true` for `null` and for objects with no entries.
pub fn is_vacant(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// A write applied to the node at some path.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  /// Overwrite the node; `null` removes it.
  Set(Value),
  /// Set only the named children; a `null` child is removed.
  Merge(Map<String, Value>),
}

impl Mutation {
  pub fn apply(self, root: &mut Value, segments: &[&str]) {
    match self {
      Self::Set(value) => set(root, segments, value),
      Self::Merge(fields) => {
        for (key, value) in fields {
          let mut path = segments.to_vec();
          path.push(key.as_str());
          set(root, &path, value);
        }
      }
    }
  }
}

/// Overwrite the node at `segments`, creating intermediate objects and
/// pruning emptied parents.
pub fn set(node: &mut Value, segments: &[&str], value: Value) {
  let Some((first, rest)) = segments.split_first() else {
    *node = value;
    return;
  };

  if !node.is_object() {
    if value.is_null() {
      return;
    }
    *node = Value::Object(Map::new());
  }
  let Value::Object(map) = node else { return };

  if rest.is_empty() {
    if is_vacant(&value) {
      map.remove(*first);
    } else {
      map.insert((*first).to_owned(), value);
    }
    return;
  }

  let vacant = {
    let child = map.entry((*first).to_owned()).or_insert(Value::Null);
    set(child, rest, value);
    is_vacant(child)
  };
  if vacant {
    map.remove(*first);
  }
}
