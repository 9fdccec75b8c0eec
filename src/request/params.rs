use smallvec::SmallVec;
use std::sync::Arc;

/// The path parameters captured while matching a request against a layer's
/// pattern.
///
/// Entries preserve capture order. An entry with a `None` value records an
/// optional parameter that was absent from the request path, which is
/// distinct from a parameter the pattern does not declare at all.
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    entries: SmallVec<[(Arc<str>, Option<String>); 4]>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the decoded value of the parameter with the provided name.
    ///
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find_map(|(key, value)| {
            if &**key == name {
                value.as_deref()
            } else {
                None
            }
        })
    }

    /// Returns true if the pattern declared a parameter with the provided
    /// name, whether or not a value was captured for it.
    ///
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(key, _)| &**key == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries
            .iter()
            .map(|(key, value)| (&**key, value.as_deref()))
    }

    pub(crate) fn entries(&self) -> &[(Arc<str>, Option<String>)] {
        &self.entries
    }

    /// Insert a captured value, replacing any existing entry with the same
    /// name.
    ///
    pub(crate) fn insert(&mut self, name: Arc<str>, value: Option<String>) {
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Returns a copy of `self` layered over the provided parent params.
    /// Entries captured by this match shadow inherited entries with the
    /// same name.
    ///
    pub(crate) fn merged_over(&self, parent: &Params) -> Params {
        let mut merged = parent.clone();

        for (name, value) in &self.entries {
            merged.insert(Arc::clone(name), value.clone());
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::Params;
    use std::sync::Arc;

    #[test]
    fn absent_optional_is_declared_but_empty() {
        let mut params = Params::new();

        params.insert(Arc::from("id"), None);

        assert!(params.contains("id"));
        assert_eq!(params.get("id"), None);
        assert!(!params.contains("other"));
    }

    #[test]
    fn merged_over_shadows_parent() {
        let mut parent = Params::new();
        parent.insert(Arc::from("tenant"), Some("acme".to_owned()));
        parent.insert(Arc::from("id"), Some("1".to_owned()));

        let mut child = Params::new();
        child.insert(Arc::from("id"), Some("2".to_owned()));

        let merged = child.merged_over(&parent);

        assert_eq!(merged.get("tenant"), Some("acme"));
        assert_eq!(merged.get("id"), Some("2"));
    }
}
