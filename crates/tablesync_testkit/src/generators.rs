//! Property-based test generators using proptest.
//!
//! Strategies produce remote operation scripts over small key spaces so
//! that keys collide often enough to exercise coalescing.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tablesync_core::MemoryBackend;

/// A change made to the backend by another client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOp {
    /// Create or overwrite `key` with `value`.
    Upsert(String, i64),
    /// Delete `key`.
    Delete(String),
}

impl RemoteOp {
    /// Key the operation touches.
    pub fn key(&self) -> &str {
        match self {
            RemoteOp::Upsert(key, _) | RemoteOp::Delete(key) => key,
        }
    }

    /// Performs the operation on `backend` under `path`.
    pub fn run(&self, backend: &MemoryBackend, path: &str) {
        match self {
            RemoteOp::Upsert(key, value) => {
                backend.put_remote(path, key, value.to_string().into_bytes());
            }
            RemoteOp::Delete(key) => backend.remove_remote(&format!("{path}/{key}")),
        }
    }
}

/// Folds a script into the contents it leaves behind.
pub fn expected_contents(ops: &[RemoteOp]) -> BTreeMap<String, i64> {
    let mut contents = BTreeMap::new();
    for op in ops {
        match op {
            RemoteOp::Upsert(key, value) => {
                contents.insert(key.clone(), *value);
            }
            RemoteOp::Delete(key) => {
                contents.remove(key);
            }
        }
    }
    contents
}

/// Strategy for record keys drawn from `prefix0..prefix{space-1}`.
pub fn key_strategy(prefix: &'static str, space: usize) -> impl Strategy<Value = String> {
    (0..space.max(1)).prop_map(move |i| format!("{prefix}{i}"))
}

/// Strategy for a single remote operation.
pub fn remote_op_strategy(prefix: &'static str, space: usize) -> impl Strategy<Value = RemoteOp> {
    prop_oneof![
        3 => (key_strategy(prefix, space), any::<i64>())
            .prop_map(|(key, value)| RemoteOp::Upsert(key, value)),
        1 => key_strategy(prefix, space).prop_map(RemoteOp::Delete),
    ]
}

/// Strategy for a script of remote operations.
pub fn remote_ops_strategy(
    prefix: &'static str,
    space: usize,
    len: std::ops::Range<usize>,
) -> impl Strategy<Value = Vec<RemoteOp>> {
    prop::collection::vec(remote_op_strategy(prefix, space), len)
}

/// Strategy for a table name.
pub fn table_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_contents_follows_the_last_op() {
        let ops = vec![
            RemoteOp::Upsert("c".into(), 1),
            RemoteOp::Upsert("c".into(), 2),
            RemoteOp::Upsert("a".into(), 5),
            RemoteOp::Delete("a".into()),
        ];
        let contents = expected_contents(&ops);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents["c"], 2);
    }

    proptest! {
        #[test]
        fn keys_stay_in_their_space(op in remote_op_strategy("k", 4)) {
            prop_assert!(op.key().starts_with('k'));
            let index: usize = op.key()[1..].parse().unwrap();
            prop_assert!(index < 4);
        }
    }
}
