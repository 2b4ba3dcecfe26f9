//! Key/value divergence between the last known and the desired state

use std::collections::BTreeMap;

/// Tag map as sent to and read from the API
pub type Tags = BTreeMap<String, String>;

/// Entries to create and to remove to turn `old` into `new`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta<K, V> {
    /// Keys of `new` whose value is absent or different in `old`
    pub to_create: Vec<(K, V)>,
    /// Keys of `old` absent from `new`
    pub to_remove: Vec<(K, V)>,
}

impl<K, V> Delta<K, V> {
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_remove.is_empty()
    }
}

/// Compute the create/remove sets between two maps.
///
/// A key whose value changed appears only in `to_create`: tag APIs
/// overwrite on create, so the old entry need not be removed first.
pub fn diff<K, V>(old: &BTreeMap<K, V>, new: &BTreeMap<K, V>) -> Delta<K, V>
where
    K: Ord + Clone,
    V: PartialEq + Clone,
{
    let to_create = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let to_remove = old
        .iter()
        .filter(|(k, _)| !new.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Delta {
        to_create,
        to_remove,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, i32)]) -> BTreeMap<String, i32> {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_diff_mixed() {
        let delta = diff(&map(&[("a", 1), ("b", 2)]), &map(&[("a", 1), ("c", 3)]));
        assert_eq!(delta.to_create, vec![("c".to_string(), 3)]);
        assert_eq!(delta.to_remove, vec![("b".to_string(), 2)]);
    }

    #[test]
    fn test_diff_from_empty() {
        let delta = diff(&map(&[]), &map(&[("x", 1)]));
        assert_eq!(delta.to_create, vec![("x".to_string(), 1)]);
        assert!(delta.to_remove.is_empty());
    }

    #[test]
    fn test_diff_to_empty() {
        let delta = diff(&map(&[("x", 1)]), &map(&[]));
        assert!(delta.to_create.is_empty());
        assert_eq!(delta.to_remove, vec![("x".to_string(), 1)]);
    }

    #[test]
    fn test_diff_changed_value() {
        let delta = diff(&map(&[("env", 1)]), &map(&[("env", 2)]));
        assert_eq!(delta.to_create, vec![("env".to_string(), 2)]);
        assert!(delta.to_remove.is_empty());
    }

    #[test]
    fn test_diff_identical() {
        let m = map(&[("a", 1), ("b", 2)]);
        assert!(diff(&m, &m).is_empty());
    }
}
