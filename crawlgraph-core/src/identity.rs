use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// Result of minting an id for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minted {
    pub id: String,
    pub fresh: bool,
}

/// Maps natural keys (URLs, hostnames) to graph-local node ids for one
/// construction pass. Ids are minted sequentially in first-seen order.
#[derive(Debug, Clone)]
pub struct IdentityMap<K> {
    prefix: &'static str,
    ids: HashMap<K, String>,
    order: Vec<K>,
    duplicates: Vec<K>,
}

impl<K: Eq + Hash + Clone> IdentityMap<K> {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            ids: HashMap::new(),
            order: Vec::new(),
            duplicates: Vec::new(),
        }
    }

    /// Single left-to-right pass over `records`. Records whose key is `None`
    /// are skipped. A key seen twice keeps its first id and is reported in
    /// `duplicates`.
    pub fn build<T, F>(prefix: &'static str, records: &[T], mut key: F) -> Self
    where
        F: FnMut(&T) -> Option<K>,
    {
        let mut map = Self::new(prefix);
        for record in records {
            if let Some(k) = key(record)
                && !map.mint(k.clone()).fresh
            {
                map.duplicates.push(k);
            }
        }
        map
    }

    pub fn mint(&mut self, key: K) -> Minted {
        if let Some(id) = self.ids.get(&key) {
            return Minted {
                id: id.clone(),
                fresh: false,
            };
        }

        let id = format!("{}{}", self.prefix, self.order.len());
        self.ids.insert(key.clone(), id.clone());
        self.order.push(key);
        Minted { id, fresh: true }
    }

    /// `None` means unresolved: the key was not part of this pass.
    pub fn resolve<Q>(&self, key: &Q) -> Option<&str>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.ids.get(key).map(String::as_str)
    }

    /// Keys in first-seen order.
    pub fn keys(&self) -> &[K] {
        &self.order
    }

    pub fn duplicates(&self) -> &[K] {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
