//! Frames: nodes of the spawn/call activation tree
//!
//! A frame records one function activation. The tree structure (parent
//! pointer plus ordered children) is global and logical; which worker, if
//! any, currently executes a frame is tracked separately so that frames can
//! move between deques, be suspended at a sync, and be resumed later.

use slab::Slab;

use crate::splitter::HMapId;
use crate::worker::WorkerId;
use crate::{Error, Result};

/// Identifier of a frame in the arena. Ids are assigned monotonically and
/// never reused within one runtime instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub usize);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of control transfer created a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The root activation; exactly one exists and it never returns
    Initial,
    /// Created by `call`, lives on its parent's stacklet
    Call,
    /// Created by `spawn`, starts a stacklet of its own
    Spawn,
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Initial => write!(f, "initial"),
            FrameKind::Call => write!(f, "call"),
            FrameKind::Spawn => write!(f, "spawn"),
        }
    }
}

/// Hypermap state parked on a frame while it is suspended at a sync.
///
/// `hmaps` is the hypermap list of the stacklet that was popped at the
/// sync, extended by the lists of children that return while the frame is
/// suspended. `ancestor` is the hypermap the list's oldest entry descends
/// from, restored as the parent of the merged map at resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub ancestor: Option<HMapId>,
    pub hmaps: Vec<HMapId>,
}

/// One function activation in the spawn/call tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Parent activation; `None` only for the initial frame
    pub parent: Option<FrameId>,
    /// Outstanding children in creation order
    pub children: Vec<FrameId>,
    /// Worker currently executing this frame, `None` if suspended or pending
    pub worker: Option<WorkerId>,
    /// Present exactly while the frame is suspended at a sync
    pub payload: Option<Payload>,
}

impl Frame {
    fn new(kind: FrameKind) -> Self {
        Frame {
            kind,
            parent: None,
            children: Vec::new(),
            worker: None,
            payload: None,
        }
    }

    /// A frame may return only once every child has returned
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Arena of frames.
///
/// Frames are never removed: a returned frame simply becomes unreachable
/// from the tree and the deques. Keeping slots alive makes slab keys
/// coincide with monotonic creation ids, which the undo/replay path relies
/// on for bit-identical restored state.
#[derive(Debug, Default)]
pub struct FrameArena {
    slab: Slab<Frame>,
}

impl FrameArena {
    pub fn new() -> Self {
        FrameArena { slab: Slab::new() }
    }

    /// Allocate a fresh frame of the given kind, unattached and unowned
    pub fn alloc(&mut self, kind: FrameKind) -> FrameId {
        FrameId(self.slab.insert(Frame::new(kind)))
    }

    /// Register `child` under `parent` in the tree
    pub fn attach(&mut self, child: FrameId, parent: FrameId) -> Result<()> {
        if self[child].parent.is_some() {
            return Err(Error::Internal("frame attached twice"));
        }
        self[child].parent = Some(parent);
        self[parent].children.push(child);
        Ok(())
    }

    /// Unlink `child` from its parent; returns the former parent
    pub fn detach(&mut self, child: FrameId) -> Result<FrameId> {
        let parent = self[child]
            .parent
            .take()
            .ok_or(Error::Internal("detach of a parentless frame"))?;
        self[parent].children.retain(|&c| c != child);
        Ok(parent)
    }

    pub fn get(&self, id: FrameId) -> Option<&Frame> {
        self.slab.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.slab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slab.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FrameId, &Frame)> {
        self.slab.iter().map(|(k, f)| (FrameId(k), f))
    }
}

impl std::ops::Index<FrameId> for FrameArena {
    type Output = Frame;

    fn index(&self, id: FrameId) -> &Frame {
        &self.slab[id.0]
    }
}

impl std::ops::IndexMut<FrameId> for FrameArena {
    fn index_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.slab[id.0]
    }
}
