//! The runtime system: workers, dispatch, history and undo
//!
//! `Rts` owns the arenas, the workers and the initial frame, and is the
//! only entry point for mutating state. Actions are totally ordered; a
//! successful action is appended to the history, a failed one restores the
//! pre-action state by replaying the history from a fresh runtime. `undo`
//! is the same replay minus the last entry.

use tracing::debug;

use crate::action::Action;
use crate::deque::Stacklet;
use crate::frame::{FrameId, FrameKind};
use crate::render;
use crate::splitter::HMap;
use crate::store::Store;
use crate::worker::{Worker, WorkerId};
use crate::{Error, Result};

/// Splitters that exist from startup, with their default view value
pub(crate) const INITIAL_SPLITTERS: [&str; 2] = ["x", "y"];
pub(crate) const INITIAL_VALUE: &str = "init-val";

pub struct Rts {
    store: Store,
    workers: Vec<Worker>,
    initial_frame: FrameId,
    history: Vec<Action>,
    num_workers: usize,
}

impl Rts {
    /// Build a fresh runtime. The lowest-index worker holds the initial
    /// frame and the initial hypermap.
    pub fn new(num_workers: usize) -> Self {
        let mut store = Store::new();
        let mut workers: Vec<Worker> = (0..num_workers)
            .map(|i| Worker::new(WorkerId(i)))
            .collect();

        let initial_frame = store.frames.alloc(FrameKind::Initial);
        let mut hmap = HMap::new(None);
        for name in INITIAL_SPLITTERS {
            let view = store.views.alloc(INITIAL_VALUE, None);
            hmap.base.insert(name.to_owned(), view);
            hmap.top.insert(name.to_owned(), view);
        }
        let hmap = store.hmaps.alloc(hmap);

        if let Some(first) = workers.first_mut() {
            store.frames[initial_frame].worker = Some(first.id);
            first.deque.push(Stacklet::new(initial_frame));
            first.hmaps.push_list(vec![hmap]);
        }

        Rts {
            store,
            workers,
            initial_frame,
            history: Vec::new(),
            num_workers,
        }
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn initial_frame(&self) -> FrameId {
        self.initial_frame
    }

    pub fn history(&self) -> &[Action] {
        &self.history
    }

    /// Execute one action. On success it joins the history; on failure the
    /// pre-action state is restored and the error reported. `Help` is a
    /// no-op here, the front end answers it.
    pub fn do_action(&mut self, action: &Action) -> Result<()> {
        debug!(?action, "dispatch");
        if matches!(action, Action::Help) {
            return Ok(());
        }
        if matches!(action, Action::Undo) {
            self.history.pop();
            return self.restore();
        }
        match self.apply(action) {
            Ok(()) => {
                self.history.push(action.clone());
                self.prune_caches();
                Ok(())
            }
            Err(err) => {
                // An action may fail after partial mutation; rebuild from
                // the history to keep rejection atomic.
                self.restore()?;
                Err(err)
            }
        }
    }

    fn apply(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Call { worker } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.call(store)
            }
            Action::Spawn { worker } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.spawn(store)
            }
            Action::Return { worker } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.ret(store)
            }
            Action::Sync { worker } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.sync(store)
            }
            Action::Steal { thief, victim } => self.steal(*thief, *victim),
            Action::Push { worker, splitter } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.push_splitter(splitter, store)
            }
            Action::Set {
                worker,
                splitter,
                value,
            } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.set_splitter(splitter, value, store)
            }
            Action::Pop { worker, splitter } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.pop_splitter(splitter, store)
            }
            Action::Access { worker, splitter } => {
                let (worker, store) = self.worker_mut(*worker)?;
                worker.access(splitter, store).map(|_| ())
            }
            Action::Undo | Action::Help => Ok(()),
        }
    }

    fn worker_mut(&mut self, id: WorkerId) -> Result<(&mut Worker, &mut Store)> {
        if id.0 >= self.workers.len() {
            return Err(Error::UnknownWorker(id.0));
        }
        Ok((&mut self.workers[id.0], &mut self.store))
    }

    fn steal(&mut self, thief: WorkerId, victim: WorkerId) -> Result<()> {
        let (t, v) = (thief.0, victim.0);
        if t >= self.workers.len() {
            return Err(Error::UnknownWorker(t));
        }
        if v >= self.workers.len() {
            return Err(Error::UnknownWorker(v));
        }
        if t == v {
            // A worker stealing from itself can never satisfy both steal
            // preconditions; report whichever fails.
            return if self.workers[t].deque.is_empty() {
                Err(Error::InsufficientVictim)
            } else {
                Err(Error::NonemptyThiefDeque)
            };
        }
        let (lo, hi) = (t.min(v), t.max(v));
        let (left, right) = self.workers.split_at_mut(hi);
        let (first, second) = (&mut left[lo], &mut right[0]);
        if t < v {
            first.steal_from(second, &mut self.store)
        } else {
            second.steal_from(first, &mut self.store)
        }
    }

    /// Rebuild from scratch and replay the history
    fn restore(&mut self) -> Result<()> {
        let history = std::mem::take(&mut self.history);
        *self = Rts::new(self.num_workers);
        for action in &history {
            self.apply(action)
                .map_err(|_| Error::Internal("history replay diverged"))?;
            self.history.push(action.clone());
            self.prune_caches();
        }
        Ok(())
    }

    /// Drop cache entries whose views were reclaimed during this action.
    /// Runs before any later action can reuse the freed slots.
    fn prune_caches(&mut self) {
        let views = &self.store.views;
        for worker in &mut self.workers {
            worker.cache.retain(|_, view| views.contains(*view));
        }
    }

    /// Render the full state: frame tree, worker deques, hypermaps, caches
    pub fn render_state(&self) -> String {
        render::state(self)
    }

    /// Check every structural invariant of the current state. Returns the
    /// first violation found; used by tests after every action.
    pub fn check_invariants(&self) -> Result<()> {
        self.check_tree()?;
        self.check_deques()?;
        self.check_hypermaps()
    }

    fn check_tree(&self) -> Result<()> {
        let mut stack = vec![self.initial_frame];
        while let Some(id) = stack.pop() {
            let frame = &self.store.frames[id];
            match frame.kind {
                FrameKind::Initial if frame.parent.is_some() => {
                    return Err(Error::Internal("initial frame has a parent"));
                }
                FrameKind::Call | FrameKind::Spawn if frame.parent.is_none() => {
                    return Err(Error::Internal("non-initial tree frame has no parent"));
                }
                _ => {}
            }
            for &child in &frame.children {
                if self.store.frames[child].parent != Some(id) {
                    return Err(Error::Internal("child does not point back at parent"));
                }
                stack.push(child);
            }
            // A frame is suspended exactly when it has a payload and no worker
            if frame.payload.is_some() && frame.worker.is_some() {
                return Err(Error::Internal("suspended frame has a worker"));
            }
        }
        Ok(())
    }

    fn check_deques(&self) -> Result<()> {
        for worker in &self.workers {
            for stacklet in worker.deque.iter() {
                if stacklet.is_empty() {
                    return Err(Error::Internal("empty stacklet on a deque"));
                }
                for &frame in stacklet.frames() {
                    if self.store.frames[frame].worker != Some(worker.id) {
                        return Err(Error::Internal("on-deque frame not owned by its worker"));
                    }
                }
                for pair in stacklet.frames().windows(2) {
                    let (older, younger) = (pair[0], pair[1]);
                    if self.store.frames[younger].parent != Some(older) {
                        return Err(Error::Internal("stacklet frames not parent-linked"));
                    }
                    if self.store.frames[younger].kind != FrameKind::Call {
                        return Err(Error::Internal("non-call frame inside a stacklet"));
                    }
                }
            }
        }
        // The reverse direction of tree/deque consistency
        let mut stack = vec![self.initial_frame];
        while let Some(id) = stack.pop() {
            let frame = &self.store.frames[id];
            if let Some(owner) = frame.worker {
                let owned = self
                    .workers
                    .get(owner.0)
                    .map(|w| w.deque.contains(id))
                    .unwrap_or(false);
                if !owned {
                    return Err(Error::Internal("owned frame missing from owner's deque"));
                }
            }
            stack.extend(frame.children.iter().copied());
        }
        Ok(())
    }

    fn check_hypermaps(&self) -> Result<()> {
        for worker in &self.workers {
            if worker.hmaps.len() != worker.deque.len() {
                return Err(Error::Internal("hypermap deque misaligned with deque"));
            }
        }
        let bound = self.store.views.len() + 1;
        for (_, hmap) in self.store.hmaps.iter() {
            if !hmap.base.keys().eq(hmap.top.keys()) {
                return Err(Error::Internal("hypermap base/top key sets diverged"));
            }
            for (name, &top) in &hmap.top {
                let base = hmap.base[name];
                let mut cursor = top;
                let mut steps = 0;
                while cursor != base {
                    cursor = match self.store.views[cursor].parent {
                        Some(parent) => parent,
                        None => return Err(Error::Internal("top view does not reach base view")),
                    };
                    steps += 1;
                    if steps > bound {
                        return Err(Error::Internal("view lineage contains a cycle"));
                    }
                }
            }
        }
        Ok(())
    }
}
