//! Splitter hyperobject state: views, hypermaps, hypermap deques
//!
//! Each splitter name owns a forest of `View` nodes linked by parent
//! pointers; pushing a splitter grows the chain, popping shrinks it. A
//! `HMap` records, per stacklet execution chunk, the view each splitter
//! held when the chunk began (`base`) and holds now (`top`). Hypermaps
//! themselves form a parent chain across chunks so that `access` can find
//! the current view of a splitter the local chunk never touched.

use std::collections::BTreeMap;

use slab::Slab;

/// Identifier of a view in the view arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViewId(pub usize);

/// One node in a splitter's lineage chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct View {
    pub value: String,
    pub parent: Option<ViewId>,
}

/// Arena of views. Unlike frames, views really are destroyed: at a deep
/// pop and when a merge reclaims dominated lineage segments.
#[derive(Debug, Default)]
pub struct ViewArena {
    slab: Slab<View>,
}

impl ViewArena {
    pub fn new() -> Self {
        ViewArena { slab: Slab::new() }
    }

    pub fn alloc(&mut self, value: impl Into<String>, parent: Option<ViewId>) -> ViewId {
        ViewId(self.slab.insert(View {
            value: value.into(),
            parent,
        }))
    }

    /// Reclaim a view. Destroying an already-dead view indicates a defect
    /// upstream and trips only a debug assertion.
    pub fn destroy(&mut self, id: ViewId) {
        let removed = self.slab.try_remove(id.0);
        debug_assert!(removed.is_some(), "view destroyed twice");
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.slab.contains(id.0)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.slab.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }
}

impl std::ops::Index<ViewId> for ViewArena {
    type Output = View;

    fn index(&self, id: ViewId) -> &View {
        &self.slab[id.0]
    }
}

impl std::ops::IndexMut<ViewId> for ViewArena {
    fn index_mut(&mut self, id: ViewId) -> &mut View {
        &mut self.slab[id.0]
    }
}

/// Identifier of a hypermap in the hypermap arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HMapId(pub usize);

/// Per-chunk splitter record: base and top view of every splitter the
/// chunk has touched, plus a link to the hypermap of the enclosing chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HMap {
    pub base: BTreeMap<String, ViewId>,
    pub top: BTreeMap<String, ViewId>,
    pub parent: Option<HMapId>,
}

impl HMap {
    pub fn new(parent: Option<HMapId>) -> Self {
        HMap {
            base: BTreeMap::new(),
            top: BTreeMap::new(),
            parent,
        }
    }

    /// A hypermap "contains" a splitter when its base map does; base and
    /// top always share a key set.
    pub fn contains(&self, splitter: &str) -> bool {
        self.base.contains_key(splitter)
    }

    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

/// Arena of hypermaps
#[derive(Debug, Default)]
pub struct HMapArena {
    slab: Slab<HMap>,
}

impl HMapArena {
    pub fn new() -> Self {
        HMapArena { slab: Slab::new() }
    }

    pub fn alloc(&mut self, hmap: HMap) -> HMapId {
        HMapId(self.slab.insert(hmap))
    }

    pub fn destroy(&mut self, id: HMapId) -> Option<HMap> {
        let removed = self.slab.try_remove(id.0);
        debug_assert!(removed.is_some(), "hypermap destroyed twice");
        removed
    }

    pub fn contains(&self, id: HMapId) -> bool {
        self.slab.contains(id.0)
    }

    pub fn get(&self, id: HMapId) -> Option<&HMap> {
        self.slab.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (HMapId, &HMap)> {
        self.slab.iter().map(|(k, h)| (HMapId(k), h))
    }

    /// Whether a hypermap list carries no unpopped pushes.
    ///
    /// For every splitter seen anywhere in the list, the top of the
    /// youngest hypermap containing it must equal the base of the oldest
    /// hypermap containing it. Lists inherited across steals spread one
    /// lineage over several hypermaps, so balance is a property of the
    /// list, not of any single map.
    pub fn net_balanced(&self, list: &[HMapId]) -> bool {
        let mut names: Vec<&str> = Vec::new();
        for &h in list {
            for name in self[h].base.keys() {
                let name = name.as_str();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        for name in names {
            let top = list.iter().rev().find_map(|&h| self[h].top.get(name));
            let base = list.iter().find_map(|&h| self[h].base.get(name));
            if top != base {
                return false;
            }
        }
        true
    }
}

impl std::ops::Index<HMapId> for HMapArena {
    type Output = HMap;

    fn index(&self, id: HMapId) -> &HMap {
        &self.slab[id.0]
    }
}

impl std::ops::IndexMut<HMapId> for HMapArena {
    fn index_mut(&mut self, id: HMapId) -> &mut HMap {
        &mut self.slab[id.0]
    }
}

/// Per-worker list of hypermap lists, aligned entry-for-entry with the
/// worker's stacklet deque.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HMapDeque {
    lists: Vec<Vec<HMapId>>,
}

impl HMapDeque {
    pub fn new() -> Self {
        HMapDeque::default()
    }

    pub fn push_list(&mut self, list: Vec<HMapId>) {
        self.lists.push(list);
    }

    pub fn pop_list(&mut self) -> Option<Vec<HMapId>> {
        self.lists.pop()
    }

    /// Remove the head list; travels with a stolen stacklet
    pub fn pop_head_list(&mut self) -> Option<Vec<HMapId>> {
        if self.lists.is_empty() {
            return None;
        }
        Some(self.lists.remove(0))
    }

    pub fn lists(&self) -> &[Vec<HMapId>] {
        &self.lists
    }

    pub fn oldest_list(&self) -> Option<&[HMapId]> {
        self.lists.first().map(|l| l.as_slice())
    }

    pub fn youngest_list(&self) -> Option<&[HMapId]> {
        self.lists.last().map(|l| l.as_slice())
    }

    /// Youngest hypermap of the youngest list: where pushes land
    pub fn youngest_hmap(&self) -> Option<HMapId> {
        self.lists.last().and_then(|l| l.last()).copied()
    }

    /// Oldest hypermap of the youngest list: the scope boundary for pops
    pub fn oldest_of_youngest(&self) -> Option<HMapId> {
        self.lists.last().and_then(|l| l.first()).copied()
    }

    /// Youngest hypermap of the oldest list: where `access` starts its walk
    pub fn youngest_of_oldest(&self) -> Option<HMapId> {
        self.lists.first().and_then(|l| l.last()).copied()
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}
