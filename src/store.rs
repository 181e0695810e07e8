//! Shared arena state: every frame, view and hypermap in the runtime
//!
//! All three arenas live behind one `Store` owned by the runtime, never in
//! globals, so that constructing a fresh runtime and replaying history
//! reproduces identical ids.

use crate::frame::FrameArena;
use crate::splitter::{HMapArena, HMapId, ViewArena};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct Store {
    pub frames: FrameArena,
    pub views: ViewArena,
    pub hmaps: HMapArena,
}

impl Store {
    pub fn new() -> Self {
        Store {
            frames: FrameArena::new(),
            views: ViewArena::new(),
            hmaps: HMapArena::new(),
        }
    }

    /// Reclaim a whole hypermap list. Views are untouched: a list is only
    /// dropped once it is net balanced, at which point it owns none.
    pub fn destroy_hmap_list(&mut self, list: Vec<HMapId>) {
        for h in list {
            self.hmaps.destroy(h);
        }
    }

    /// Fold a detachment-payload hypermap list into its oldest entry.
    ///
    /// Adjacent lineage segments are stitched left to right: for every
    /// splitter the incoming map knows, the walk from the accumulated top
    /// down to the incoming base destroys the views a cross-chunk pop
    /// skipped over, then the incoming top becomes the accumulated top.
    /// Splitters the accumulator has not seen are adopted wholesale. All
    /// maps except the accumulator are destroyed.
    pub fn merge_hmaps(&mut self, hmaps: Vec<HMapId>) -> Result<HMapId> {
        let mut iter = hmaps.into_iter();
        let accum = iter
            .next()
            .ok_or(Error::Internal("merge of an empty hypermap list"))?;
        for child_id in iter {
            let child = self
                .hmaps
                .destroy(child_id)
                .ok_or(Error::Internal("merged hypermap missing from arena"))?;
            for (name, &child_base) in &child.base {
                let child_top = *child
                    .top
                    .get(name)
                    .ok_or(Error::Internal("hypermap base/top key sets diverged"))?;
                match self.hmaps[accum].top.get(name).copied() {
                    Some(accum_top) => {
                        let mut cur = accum_top;
                        while cur != child_base {
                            let parent = self.views[cur].parent;
                            self.views.destroy(cur);
                            cur = parent
                                .ok_or(Error::Internal("merge walk fell off a view lineage"))?;
                        }
                        self.hmaps[accum].top.insert(name.clone(), child_top);
                    }
                    None => {
                        self.hmaps[accum].base.insert(name.clone(), child_base);
                        self.hmaps[accum].top.insert(name.clone(), child_top);
                    }
                }
            }
        }
        Ok(accum)
    }
}
