//! Workers: the owners of deques and hypermap deques
//!
//! A worker implements every control-point operation of the simulated
//! runtime. All of them mutate shared arena state, so each takes the
//! `Store` explicitly; the dispatcher in `rts` is the only caller and
//! serializes them one action at a time.

use std::collections::BTreeMap;

use tracing::{debug, trace};

use crate::deque::{Deque, Stacklet};
use crate::frame::{FrameId, FrameKind, Payload};
use crate::splitter::{HMap, HMapDeque, HMapId, ViewId};
use crate::store::Store;
use crate::{Error, Result};

/// Zero-based worker identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One simulated worker: a stacklet deque, the aligned hypermap deque and
/// the memoized splitter view cache.
#[derive(Debug)]
pub struct Worker {
    pub id: WorkerId,
    pub deque: Deque,
    pub hmaps: HMapDeque,
    pub cache: BTreeMap<String, ViewId>,
}

impl Worker {
    pub fn new(id: WorkerId) -> Self {
        Worker {
            id,
            deque: Deque::new(),
            hmaps: HMapDeque::new(),
            cache: BTreeMap::new(),
        }
    }

    /// A worker with an empty deque is idle and may only steal
    pub fn is_idle(&self) -> bool {
        self.deque.is_empty()
    }

    // =========================================================================
    // Scheduler control points
    // =========================================================================

    /// `call`: push a new frame onto the tail stacklet
    pub fn call(&mut self, store: &mut Store) -> Result<()> {
        let parent = self
            .deque
            .youngest_frame()
            .ok_or(Error::EmptyDeque("call"))?;
        let frame = store.frames.alloc(FrameKind::Call);
        store.frames.attach(frame, parent)?;
        store.frames[frame].worker = Some(self.id);
        self.deque
            .youngest_stacklet_mut()
            .ok_or(Error::Internal("deque emptied mid-call"))?
            .push(frame);
        trace!(worker = self.id.0, frame = frame.0, "call");
        Ok(())
    }

    /// `spawn`: start a new stacklet holding the spawned frame, and a new
    /// hypermap list whose single fresh map descends from the previous
    /// youngest hypermap.
    pub fn spawn(&mut self, store: &mut Store) -> Result<()> {
        let parent = self
            .deque
            .youngest_frame()
            .ok_or(Error::EmptyDeque("spawn"))?;
        let frame = store.frames.alloc(FrameKind::Spawn);
        store.frames.attach(frame, parent)?;
        store.frames[frame].worker = Some(self.id);
        self.deque.push(Stacklet::new(frame));

        let chunk_parent = self.hmaps.youngest_hmap();
        let fresh = store.hmaps.alloc(HMap::new(chunk_parent));
        self.hmaps.push_list(vec![fresh]);
        trace!(worker = self.id.0, frame = frame.0, "spawn");
        Ok(())
    }

    /// `return`: retire the current frame, possibly destroying its
    /// stacklet and rescheduling the parent.
    pub fn ret(&mut self, store: &mut Store) -> Result<()> {
        let frame = self
            .deque
            .youngest_frame()
            .ok_or(Error::EmptyDeque("return"))?;
        if store.frames[frame].kind == FrameKind::Initial {
            return Err(Error::ReturnFromInitial);
        }
        if store.frames[frame].has_children() {
            return Err(Error::OutstandingChildren);
        }
        let kind = store.frames[frame].kind;
        if kind == FrameKind::Spawn {
            let list = self
                .hmaps
                .youngest_list()
                .ok_or(Error::Internal("hypermap deque out of step"))?;
            if !store.hmaps.net_balanced(list) {
                return Err(Error::UnpoppedOnReturn);
            }
        }

        store.frames[frame].worker = None;
        let parent = store.frames.detach(frame)?;
        trace!(worker = self.id.0, frame = frame.0, kind = %kind, "return");
        match kind {
            FrameKind::Call => self.ret_from_call(parent, store),
            FrameKind::Spawn => self.ret_from_spawn(parent, store),
            FrameKind::Initial => Err(Error::ReturnFromInitial),
        }
    }

    fn ret_from_call(&mut self, parent: FrameId, store: &mut Store) -> Result<()> {
        let stacklet = self
            .deque
            .youngest_stacklet_mut()
            .ok_or(Error::Internal("deque emptied mid-return"))?;
        if stacklet.pop().is_some() {
            // The chunk continues in the previous frame of the stacklet.
            return Ok(());
        }
        // The returning frame was the whole stacklet. Execution continues
        // in the parent, which is off-deque and must be rescheduled here;
        // the hypermap list travels with it, the chunk is the same.
        self.deque.pop();
        let list = self
            .hmaps
            .pop_list()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        if !self.deque.is_empty() {
            return Err(Error::Internal("lone call frame was not the last stacklet"));
        }
        self.cache.clear();
        self.unconditional_steal(parent, list, store)
    }

    fn ret_from_spawn(&mut self, parent: FrameId, store: &mut Store) -> Result<()> {
        let stacklet = self
            .deque
            .pop()
            .ok_or(Error::Internal("deque emptied mid-return"))?;
        if stacklet.len() != 1 {
            return Err(Error::Internal("spawned frame was not alone on its stacklet"));
        }
        let list = self
            .hmaps
            .pop_list()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        // A suspended parent collects the lists of returning children for
        // the merge at resume; otherwise the net-balanced list is dead.
        match store.frames[parent].payload.as_mut() {
            Some(payload) => payload.hmaps.extend(list),
            None => store.destroy_hmap_list(list),
        }
        if self.deque.is_empty() {
            self.cache.clear();
            self.provably_good_steal(parent, store)?;
        }
        Ok(())
    }

    /// `steal`: claim the victim's head stacklet, keeping only its
    /// youngest frame. The frames trimmed away no longer have return
    /// addresses anywhere, so from the thief's perspective they are
    /// de-facto completed. The head hypermap list transfers wholesale,
    /// extended with a fresh map for the thief's new execution chunk.
    pub fn steal_from(&mut self, victim: &mut Worker, store: &mut Store) -> Result<()> {
        if !self.deque.is_empty() {
            return Err(Error::NonemptyThiefDeque);
        }
        if victim.deque.len() <= 1 {
            return Err(Error::InsufficientVictim);
        }
        let stolen = victim
            .deque
            .pop_head()
            .ok_or(Error::Internal("victim deque emptied mid-steal"))?;
        let youngest = stolen.youngest();
        for &f in stolen.frames() {
            store.frames[f].worker = None;
        }
        store.frames[youngest].worker = Some(self.id);
        self.deque.push(Stacklet::new(youngest));

        let mut list = victim
            .hmaps
            .pop_head_list()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        let chunk_parent = list.last().copied();
        list.push(store.hmaps.alloc(HMap::new(chunk_parent)));
        self.hmaps.push_list(list);
        self.cache.clear();
        debug!(
            thief = self.id.0,
            victim = victim.id.0,
            frame = youngest.0,
            "steal"
        );
        Ok(())
    }

    /// `sync`: a no-op while local work remains; otherwise the current
    /// frame is a join point waiting on outstanding children. It is
    /// suspended with its hypermap list parked on it as the detachment
    /// payload, then immediately offered back via a provably-good steal.
    pub fn sync(&mut self, store: &mut Store) -> Result<()> {
        if self.deque.is_empty() {
            return Err(Error::EmptyDeque("sync"));
        }
        if !self.deque.is_single_frame() {
            trace!(worker = self.id.0, "sync is a no-op, work remains");
            return Ok(());
        }
        let frame = self
            .deque
            .youngest_frame()
            .ok_or(Error::Internal("deque emptied mid-sync"))?;
        store.frames[frame].worker = None;
        self.deque.pop();
        let list = self
            .hmaps
            .pop_list()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        if !self.hmaps.is_empty() {
            return Err(Error::Internal("hypermap deque out of step at sync"));
        }
        let ancestor = list.first().and_then(|&h| store.hmaps[h].parent);
        store.frames[frame].payload = Some(Payload {
            ancestor,
            hmaps: list,
        });
        self.cache.clear();
        debug!(worker = self.id.0, frame = frame.0, "sync suspends frame");
        self.provably_good_steal(frame, store)
    }

    /// Resume a suspended frame if and only if it has no outstanding
    /// children and no owner. Refusal is not an error: the frame stays
    /// suspended until its last child returns.
    fn provably_good_steal(&mut self, frame: FrameId, store: &mut Store) -> Result<()> {
        if !self.deque.is_empty() {
            return Err(Error::Internal("provably-good steal by a busy worker"));
        }
        if store.frames[frame].has_children() || store.frames[frame].worker.is_some() {
            trace!(worker = self.id.0, frame = frame.0, "provably-good steal refused");
            return Ok(());
        }
        let payload = store.frames[frame]
            .payload
            .take()
            .ok_or(Error::Internal("resumable frame carries no detachment payload"))?;
        let ancestor = payload.ancestor;
        let accum = store.merge_hmaps(payload.hmaps)?;
        store.hmaps[accum].parent = ancestor;

        store.frames[frame].worker = Some(self.id);
        self.deque.push(Stacklet::new(frame));
        self.hmaps.push_list(vec![accum]);
        self.cache.clear();
        debug!(worker = self.id.0, frame = frame.0, "provably-good steal succeeded");
        Ok(())
    }

    /// Reschedule the parent after a call-return consumed the last frame
    /// of a chunk. Unlike the provably-good variant this ignores
    /// outstanding children; the parent is not at a join point.
    fn unconditional_steal(
        &mut self,
        frame: FrameId,
        hmap_list: Vec<HMapId>,
        store: &mut Store,
    ) -> Result<()> {
        if store.frames[frame].worker.is_some() {
            return Err(Error::Internal("unconditional steal of a frame in execution"));
        }
        store.frames[frame].worker = Some(self.id);
        self.deque.push(Stacklet::new(frame));
        self.hmaps.push_list(hmap_list);
        debug!(worker = self.id.0, frame = frame.0, "unconditional steal");
        Ok(())
    }

    // =========================================================================
    // Splitter control points
    // =========================================================================

    /// `access`: resolve the worker's current view of a splitter.
    ///
    /// Starts at the youngest hypermap of the oldest stacklet's list and
    /// walks the hypermap parent chain until some map knows the splitter.
    /// The result is memoized; pushes and pops keep the cache current, and
    /// every ownership transfer clears it.
    pub fn access(&mut self, splitter: &str, store: &Store) -> Result<ViewId> {
        if self.deque.is_empty() {
            return Err(Error::EmptyDeque("operate on a splitter"));
        }
        if let Some(&view) = self.cache.get(splitter) {
            return Ok(view);
        }
        let mut cursor = self
            .hmaps
            .youngest_of_oldest()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        let view = loop {
            let hmap = &store.hmaps[cursor];
            if let Some(&view) = hmap.top.get(splitter) {
                break view;
            }
            match hmap.parent {
                Some(parent) => cursor = parent,
                None => return Err(Error::UnknownSplitter(splitter.to_owned())),
            }
        };
        self.cache.insert(splitter.to_owned(), view);
        Ok(view)
    }

    /// `push`: begin a fresh view for a splitter, seeded with the current
    /// view's value.
    pub fn push_splitter(&mut self, splitter: &str, store: &mut Store) -> Result<()> {
        let parent_view = self.access(splitter, store)?;
        let value = store.views[parent_view].value.clone();
        let fresh = store.views.alloc(value, Some(parent_view));

        let h = self
            .hmaps
            .youngest_hmap()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        let hmap = &mut store.hmaps[h];
        if !hmap.base.contains_key(splitter) {
            hmap.base.insert(splitter.to_owned(), parent_view);
        }
        hmap.top.insert(splitter.to_owned(), fresh);
        self.cache.insert(splitter.to_owned(), fresh);
        trace!(worker = self.id.0, splitter, "push splitter");
        Ok(())
    }

    /// `set`: overwrite the current view's value
    pub fn set_splitter(&mut self, splitter: &str, value: &str, store: &mut Store) -> Result<()> {
        let view = self.access(splitter, store)?;
        store.views[view].value = value.to_owned();
        Ok(())
    }

    /// `pop`: retire the current view and fall back to its parent.
    ///
    /// Popping is scoped to the current stacklet: the oldest hypermap of
    /// the youngest list must know the splitter, and its base must sit
    /// strictly below the view being popped. A pop that the youngest
    /// hypermap cannot account for (its entry is absent or already
    /// balanced) collapses that entry onto the parent without destroying
    /// the view; the skipped views are reclaimed by the merge at resume.
    pub fn pop_splitter(&mut self, splitter: &str, store: &mut Store) -> Result<()> {
        let view = self.access(splitter, store)?;
        let scope = self
            .hmaps
            .oldest_of_youngest()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        let out_of_scope = match store.hmaps[scope].base.get(splitter) {
            None => true,
            Some(&base) => base == view,
        };
        if out_of_scope {
            return Err(Error::PopOutOfScope(splitter.to_owned()));
        }
        let parent = store.views[view]
            .parent
            .ok_or(Error::Internal("poppable view has no parent"))?;

        let youngest = self
            .hmaps
            .youngest_hmap()
            .ok_or(Error::Internal("hypermap deque out of step"))?;
        let collapse = {
            let hmap = &store.hmaps[youngest];
            match (hmap.top.get(splitter), hmap.base.get(splitter)) {
                (Some(top), Some(base)) => top == base,
                _ => true,
            }
        };
        let hmap = &mut store.hmaps[youngest];
        hmap.top.insert(splitter.to_owned(), parent);
        if collapse {
            hmap.base.insert(splitter.to_owned(), parent);
        } else {
            store.views.destroy(view);
        }
        self.cache.insert(splitter.to_owned(), parent);
        trace!(worker = self.id.0, splitter, "pop splitter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal runtime bootstrap mirroring `Rts::new`: worker 0 holds the
    /// initial frame and the initial hypermap with splitters `x` and `y`.
    fn boot(n: usize) -> (Store, Vec<Worker>) {
        let mut store = Store::new();
        let mut workers: Vec<Worker> = (0..n).map(|i| Worker::new(WorkerId(i))).collect();

        let initial = store.frames.alloc(FrameKind::Initial);
        store.frames[initial].worker = Some(WorkerId(0));
        workers[0].deque.push(Stacklet::new(initial));

        let mut hmap = HMap::new(None);
        for name in ["x", "y"] {
            let view = store.views.alloc("init-val", None);
            hmap.base.insert(name.into(), view);
            hmap.top.insert(name.into(), view);
        }
        let hmap = store.hmaps.alloc(hmap);
        workers[0].hmaps.push_list(vec![hmap]);
        (store, workers)
    }

    fn steal(workers: &mut [Worker], thief: usize, victim: usize, store: &mut Store) -> Result<()> {
        assert_ne!(thief, victim);
        let (lo, hi) = (thief.min(victim), thief.max(victim));
        let (left, right) = workers.split_at_mut(hi);
        let (a, b) = (&mut left[lo], &mut right[0]);
        if thief < victim {
            a.steal_from(b, store)
        } else {
            b.steal_from(a, store)
        }
    }

    #[test]
    fn test_call_extends_tail_stacklet() {
        let (mut store, mut workers) = boot(1);
        workers[0].call(&mut store).unwrap();
        workers[0].call(&mut store).unwrap();

        assert_eq!(workers[0].deque.len(), 1);
        assert_eq!(workers[0].deque.youngest_stacklet().unwrap().len(), 3);
        let top = workers[0].deque.youngest_frame().unwrap();
        assert_eq!(store.frames[top].kind, FrameKind::Call);
        assert_eq!(store.frames[top].worker, Some(WorkerId(0)));
    }

    #[test]
    fn test_spawn_starts_new_stacklet_and_hmap_list() {
        let (mut store, mut workers) = boot(1);
        workers[0].spawn(&mut store).unwrap();

        assert_eq!(workers[0].deque.len(), 2);
        assert_eq!(workers[0].hmaps.len(), 2);
        let spawned = workers[0].deque.youngest_frame().unwrap();
        assert_eq!(store.frames[spawned].kind, FrameKind::Spawn);

        // The fresh hypermap descends from the initial one
        let fresh = workers[0].hmaps.youngest_hmap().unwrap();
        let root = workers[0].hmaps.youngest_of_oldest().unwrap();
        assert_eq!(store.hmaps[fresh].parent, Some(root));
        assert!(store.hmaps[fresh].is_empty());
    }

    #[test]
    fn test_ops_require_nonempty_deque() {
        let (mut store, mut workers) = boot(2);
        assert_eq!(workers[1].call(&mut store), Err(Error::EmptyDeque("call")));
        assert_eq!(workers[1].spawn(&mut store), Err(Error::EmptyDeque("spawn")));
        assert_eq!(workers[1].ret(&mut store), Err(Error::EmptyDeque("return")));
        assert_eq!(workers[1].sync(&mut store), Err(Error::EmptyDeque("sync")));
        assert_eq!(
            workers[1].access("x", &store),
            Err(Error::EmptyDeque("operate on a splitter"))
        );
    }

    #[test]
    fn test_return_from_initial_rejected() {
        let (mut store, mut workers) = boot(1);
        assert_eq!(workers[0].ret(&mut store), Err(Error::ReturnFromInitial));
    }

    #[test]
    fn test_return_with_outstanding_children_rejected() {
        let (mut store, mut workers) = boot(1);
        workers[0].call(&mut store).unwrap();
        workers[0].spawn(&mut store).unwrap();
        workers[0].ret(&mut store).unwrap(); // spawned child returns fine

        // The call frame spawned a child once; respawn and try to return
        // the call frame while the child is still outstanding.
        workers[0].spawn(&mut store).unwrap();
        let spawned = workers[0].deque.youngest_frame().unwrap();
        // Steal the call chain away so the call frame can be asked to
        // return while its spawn child is still outstanding.
        let mut thief = Worker::new(WorkerId(9));
        thief.steal_from(&mut workers[0], &mut store).unwrap();
        assert_eq!(workers[0].deque.youngest_frame(), Some(spawned));
        assert_eq!(thief.ret(&mut store), Err(Error::OutstandingChildren));
    }

    #[test]
    fn test_call_return_pops_frame() {
        let (mut store, mut workers) = boot(1);
        workers[0].call(&mut store).unwrap();
        let frame = workers[0].deque.youngest_frame().unwrap();
        workers[0].ret(&mut store).unwrap();

        assert!(workers[0].deque.is_single_frame());
        assert_eq!(store.frames[frame].worker, None);
        assert_eq!(store.frames[frame].parent, None);
        let initial = workers[0].deque.youngest_frame().unwrap();
        assert!(store.frames[initial].children.is_empty());
    }

    #[test]
    fn test_steal_trims_to_youngest_frame() {
        // call 0, call 0, spawn 0, steal 1 0: the thief ends with only the
        // youngest call frame of the stolen chunk, the victim keeps the
        // spawned frame as its sole entry.
        let (mut store, mut workers) = boot(2);
        workers[0].call(&mut store).unwrap();
        workers[0].call(&mut store).unwrap();
        let top_call = workers[0].deque.youngest_frame().unwrap();
        workers[0].spawn(&mut store).unwrap();
        let spawned = workers[0].deque.youngest_frame().unwrap();

        steal(&mut workers, 1, 0, &mut store).unwrap();

        assert_eq!(workers[1].deque.len(), 1);
        assert_eq!(
            workers[1].deque.youngest_stacklet().unwrap().frames(),
            &[top_call][..]
        );
        assert_eq!(store.frames[top_call].worker, Some(WorkerId(1)));

        assert_eq!(workers[0].deque.len(), 1);
        assert_eq!(workers[0].deque.youngest_frame(), Some(spawned));

        // Trimmed frames lost their worker but stayed in the tree
        let initial = store.frames[top_call].parent.unwrap();
        assert_eq!(store.frames[initial].worker, None);
        assert_eq!(store.frames[initial].parent, None);
    }

    #[test]
    fn test_steal_transfers_hypermap_list() {
        let (mut store, mut workers) = boot(2);
        let root_hmap = workers[0].hmaps.youngest_hmap().unwrap();
        workers[0].spawn(&mut store).unwrap();

        steal(&mut workers, 1, 0, &mut store).unwrap();

        // The thief inherited the head list plus one fresh chunk map
        assert_eq!(workers[1].hmaps.len(), 1);
        let list = workers[1].hmaps.youngest_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0], root_hmap);
        let fresh = list[1];
        assert_eq!(store.hmaps[fresh].parent, Some(root_hmap));
        assert!(store.hmaps[fresh].is_empty());
        assert!(workers[1].cache.is_empty());

        // The victim keeps only the spawn chunk's list
        assert_eq!(workers[0].hmaps.len(), 1);
    }

    #[test]
    fn test_steal_preconditions() {
        let (mut store, mut workers) = boot(3);
        workers[0].spawn(&mut store).unwrap();

        // Victim needs at least two stacklets
        let err = steal(&mut workers, 1, 2, &mut store);
        assert_eq!(err, Err(Error::InsufficientVictim));

        // Thief must be idle
        steal(&mut workers, 1, 0, &mut store).unwrap();
        workers[0].spawn(&mut store).unwrap();
        let err = steal(&mut workers, 1, 0, &mut store);
        assert_eq!(err, Err(Error::NonemptyThiefDeque));
    }

    #[test]
    fn test_spawn_return_leaves_worker_idle_when_parent_taken() {
        // spawn 0, steal 1 0: worker 1 takes the initial continuation,
        // worker 0 returns from the spawned frame and finds the parent
        // owned, so the provably-good steal is refused.
        let (mut store, mut workers) = boot(2);
        workers[0].spawn(&mut store).unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        workers[0].ret(&mut store).unwrap();
        assert!(workers[0].is_idle());
        assert!(workers[0].hmaps.is_empty());

        let initial = workers[1].deque.youngest_frame().unwrap();
        assert_eq!(store.frames[initial].kind, FrameKind::Initial);
        assert!(store.frames[initial].children.is_empty());
        assert_eq!(store.frames[initial].worker, Some(WorkerId(1)));
    }

    #[test]
    fn test_sync_noop_while_work_remains() {
        let (mut store, mut workers) = boot(1);
        workers[0].spawn(&mut store).unwrap();
        workers[0].sync(&mut store).unwrap();
        assert_eq!(workers[0].deque.len(), 2);
    }

    #[test]
    fn test_sync_suspends_join_frame() {
        let (mut store, mut workers) = boot(2);
        workers[0].spawn(&mut store).unwrap();
        let spawned = workers[0].deque.youngest_frame().unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        // Worker 1 holds the initial frame, which still waits on the
        // spawned child: sync suspends it.
        workers[1].sync(&mut store).unwrap();
        assert!(workers[1].is_idle());
        let initial = store.frames[spawned].parent.unwrap();
        assert_eq!(store.frames[initial].worker, None);
        assert_eq!(store.frames[initial].children, vec![spawned]);
        assert!(store.frames[initial].payload.is_some());

        // The last child's return hands the frame to the returning worker.
        workers[0].ret(&mut store).unwrap();
        assert_eq!(store.frames[initial].worker, Some(WorkerId(0)));
        assert!(store.frames[initial].payload.is_none());
        assert!(workers[0].deque.is_single_frame());
        assert_eq!(workers[0].hmaps.len(), 1);
        assert_eq!(workers[0].hmaps.youngest_list().unwrap().len(), 1);
    }

    #[test]
    fn test_sync_resumes_immediately_without_children() {
        let (mut store, mut workers) = boot(1);
        workers[0].sync(&mut store).unwrap();

        // No children: the provably-good steal-back succeeds on the spot
        // and collapses the hypermap list to a single merged map.
        assert!(workers[0].deque.is_single_frame());
        let initial = workers[0].deque.youngest_frame().unwrap();
        assert_eq!(store.frames[initial].worker, Some(WorkerId(0)));
        assert!(store.frames[initial].payload.is_none());
        assert_eq!(workers[0].hmaps.youngest_list().unwrap().len(), 1);
    }

    #[test]
    fn test_unconditional_steal_after_call_return() {
        // A stolen call frame returns alone: execution continues in its
        // trimmed-away parent, reacquired without a children check.
        let (mut store, mut workers) = boot(2);
        workers[0].call(&mut store).unwrap();
        let call_frame = workers[0].deque.youngest_frame().unwrap();
        workers[0].spawn(&mut store).unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        // The spawned child must return first; its parent is the stolen
        // call frame, still owned by worker 1, so the provably-good steal
        // is refused and worker 0 goes idle.
        workers[0].ret(&mut store).unwrap();
        assert!(workers[0].is_idle());

        assert_eq!(workers[1].deque.youngest_frame(), Some(call_frame));
        let hmap_list = workers[1].hmaps.youngest_list().unwrap().to_vec();
        workers[1].ret(&mut store).unwrap();

        // Worker 1 now runs the initial frame, same hypermap list.
        let resumed = workers[1].deque.youngest_frame().unwrap();
        assert_eq!(store.frames[resumed].kind, FrameKind::Initial);
        assert_eq!(store.frames[resumed].worker, Some(WorkerId(1)));
        assert!(workers[1].deque.is_single_frame());
        assert_eq!(workers[1].hmaps.youngest_list().unwrap(), &hmap_list[..]);
    }

    #[test]
    fn test_access_finds_initial_splitters() {
        let (mut store, mut workers) = boot(1);
        let view = workers[0].access("x", &store).unwrap();
        assert_eq!(store.views[view].value, "init-val");
        assert_eq!(workers[0].cache.get("x"), Some(&view));

        assert_eq!(
            workers[0].access("z", &store),
            Err(Error::UnknownSplitter("z".into()))
        );
    }

    #[test]
    fn test_access_walks_hmap_chain() {
        let (mut store, mut workers) = boot(2);
        workers[0].spawn(&mut store).unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        // Worker 0's only hypermap is the empty spawn-chunk map; the walk
        // crosses its parent link into the stolen list.
        let view = workers[0].access("x", &store).unwrap();
        assert_eq!(store.views[view].value, "init-val");
    }

    #[test]
    fn test_push_set_access_pop_locality() {
        let (mut store, mut workers) = boot(1);
        workers[0].spawn(&mut store).unwrap();

        workers[0].push_splitter("x", &mut store).unwrap();
        workers[0].set_splitter("x", "42", &mut store).unwrap();
        let view = workers[0].access("x", &store).unwrap();
        assert_eq!(store.views[view].value, "42");

        workers[0].pop_splitter("x", &mut store).unwrap();
        let view_after = workers[0].access("x", &store).unwrap();
        assert_eq!(store.views[view_after].value, "init-val");
        assert!(!store.views.contains(view));

        // The youngest hypermap is balanced again
        let h = workers[0].hmaps.youngest_hmap().unwrap();
        assert_eq!(store.hmaps[h].base["x"], store.hmaps[h].top["x"]);
    }

    #[test]
    fn test_pop_of_initial_view_is_out_of_scope() {
        let (mut store, mut workers) = boot(1);
        assert_eq!(
            workers[0].pop_splitter("x", &mut store),
            Err(Error::PopOutOfScope("x".into()))
        );
    }

    #[test]
    fn test_pop_cannot_cross_spawn_scope() {
        let (mut store, mut workers) = boot(1);
        workers[0].push_splitter("x", &mut store).unwrap();
        workers[0].spawn(&mut store).unwrap();

        // The spawned chunk's scope starts above the parent's push.
        assert_eq!(
            workers[0].pop_splitter("x", &mut store),
            Err(Error::PopOutOfScope("x".into()))
        );
    }

    #[test]
    fn test_unpopped_splitter_blocks_spawn_return() {
        let (mut store, mut workers) = boot(1);
        workers[0].spawn(&mut store).unwrap();
        workers[0].push_splitter("x", &mut store).unwrap();

        assert_eq!(workers[0].ret(&mut store), Err(Error::UnpoppedOnReturn));

        workers[0].pop_splitter("x", &mut store).unwrap();
        workers[0].ret(&mut store).unwrap();
    }

    #[test]
    fn test_cross_chunk_pop_collapses_and_merge_reclaims() {
        // Worker 0 pushes x, spawns, loses its continuation to worker 1.
        // Worker 1 (inherited list) pops x past the older chunk's push:
        // the entry collapses without destroying the view. When the
        // suspended frame resumes, the merge walk reclaims it.
        let (mut store, mut workers) = boot(2);
        workers[0].push_splitter("x", &mut store).unwrap();
        workers[0].set_splitter("x", "a", &mut store).unwrap();
        let pushed = workers[0].access("x", &store).unwrap();
        workers[0].spawn(&mut store).unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        workers[1].pop_splitter("x", &mut store).unwrap();
        // Collapsed, not destroyed: the merge owns the reclamation.
        assert!(store.views.contains(pushed));
        let current = workers[1].access("x", &store).unwrap();
        assert_eq!(store.views[current].value, "init-val");

        // Suspend the initial frame, return the child, resume and merge.
        workers[1].sync(&mut store).unwrap();
        workers[0].ret(&mut store).unwrap();
        assert!(!store.views.contains(pushed));

        let resumed_list = workers[0].hmaps.youngest_list().unwrap();
        assert_eq!(resumed_list.len(), 1);
        let h = &store.hmaps[resumed_list[0]];
        assert_eq!(store.views[h.top["x"]].value, "init-val");
    }

    #[test]
    fn test_victim_cache_stays_consistent_across_steal() {
        let (mut store, mut workers) = boot(2);
        workers[0].push_splitter("x", &mut store).unwrap();
        workers[0].set_splitter("x", "a", &mut store).unwrap();
        let cached = workers[0].access("x", &store).unwrap();
        workers[0].spawn(&mut store).unwrap();
        steal(&mut workers, 1, 0, &mut store).unwrap();

        // The victim's cache survives the steal and still resolves to the
        // same view the hypermap chain walk would find.
        assert_eq!(workers[0].access("x", &store), Ok(cached));
        workers[0].cache.clear();
        assert_eq!(workers[0].access("x", &store), Ok(cached));
    }
}
