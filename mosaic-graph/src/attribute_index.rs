//! # Attribute-set indexes
//!
//! Edges and turn-cost tables reference their classification by a compact
//! integer id instead of a full attribute bag. An index owns the mapping in
//! both directions, together with the classification function that reduces a
//! full bag to the (typically much smaller) bag that actually matters for
//! classification — e.g. keeping only the `highway` tag of a road.
//!
//! Replacing the classification function produces a *new* index with a
//! bumped generation; ids interned under the old function survive, so tiles
//! whose classification did not change can be rewritten cheaply. Tiles
//! remember the generation they were last rewritten for, and two tiles'
//! type ids are only comparable when their generations match.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Reduces a full attribute bag to its classification bag.
pub type Classifier = Arc<dyn Fn(&[(String, String)]) -> Vec<(String, String)> + Send + Sync>;

/// Sorts a bag by key (then value) and drops exact duplicates, so that
/// interning is insensitive to input order.
fn canonicalize(bag: &[(String, String)]) -> Vec<(String, String)> {
    let mut bag = bag.to_vec();
    bag.sort();
    bag.dedup();
    bag
}

#[derive(Default)]
struct Inner {
    /// Bag `i` has id `i`.
    bags: Vec<Arc<Vec<(String, String)>>>,
    ids: HashMap<Vec<(String, String)>, u32>,
}

/// A bidirectional map between canonical classification bags and dense ids.
pub struct AttributeSetIndex {
    inner: RwLock<Inner>,
    classifier: Classifier,
    generation: u32,
}

impl AttributeSetIndex {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            classifier,
            generation: 0,
        }
    }

    /// An index whose classification function is the identity.
    pub fn identity() -> Self {
        Self::new(Arc::new(|bag: &[(String, String)]| bag.to_vec()))
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// The number of interned classification bags.
    #[allow(clippy::cast_possible_truncation)]
    pub fn len(&self) -> u32 {
        match self.inner.read() {
            Ok(inner) => inner.bags.len() as u32,
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The id of the classification of `bag`, interning it if new.
    #[allow(clippy::cast_possible_truncation, clippy::missing_panics_doc)]
    pub fn get(&self, bag: &[(String, String)]) -> u32 {
        let classified = canonicalize(&(self.classifier)(bag));

        if let Ok(inner) = self.inner.read()
            && let Some(id) = inner.ids.get(&classified)
        {
            return *id;
        }

        let mut inner = self.inner.write().expect("attribute index lock poisoned");
        if let Some(id) = inner.ids.get(&classified) {
            return *id;
        }
        let id = inner.bags.len() as u32;
        inner.bags.push(Arc::new(classified.clone()));
        inner.ids.insert(classified, id);
        id
    }

    /// The canonical bag interned under the given id.
    pub fn bag(&self, id: u32) -> Option<Arc<Vec<(String, String)>>> {
        self.inner
            .read()
            .ok()
            .and_then(|inner| inner.bags.get(id as usize).cloned())
    }

    /// Returns a new index with the given classification function and a
    /// bumped generation.
    ///
    /// All interned bags keep their ids, so records whose classification is
    /// unchanged re-encode identically when their tile is rewritten.
    pub fn next(&self, classifier: Classifier) -> Self {
        let inner = match self.inner.read() {
            Ok(inner) => Inner {
                bags: inner.bags.clone(),
                ids: inner.ids.clone(),
            },
            Err(_) => Inner::default(),
        };
        Self {
            inner: RwLock::new(inner),
            classifier,
            generation: self.generation + 1,
        }
    }

    /// Rewrites a tile's edge type ids through this index.
    pub fn update(&self, tile: &crate::GraphTile) -> crate::GraphTile {
        tile.apply_edge_type_fn(self)
    }

    /// Rebuilds an index from its serialized parts. The classification
    /// function is not persistable; callers re-install it (bumping the
    /// generation) after loading.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn from_parts(bags: Vec<Vec<(String, String)>>, generation: u32) -> Self {
        let ids = bags
            .iter()
            .enumerate()
            .map(|(id, bag)| (bag.clone(), id as u32))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                bags: bags.into_iter().map(Arc::new).collect(),
                ids,
            }),
            classifier: Arc::new(|bag: &[(String, String)]| bag.to_vec()),
            generation,
        }
    }
}

impl std::fmt::Debug for AttributeSetIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeSetIndex")
            .field("len", &self.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
