//! Pretty-printing of runtime state
//!
//! The layout mirrors what an operator needs at every step: the full frame
//! tree first, then each worker's deque oldest-to-youngest with the
//! hypermaps of every stacklet beneath it and the view cache at the end.
//! The active (tail) stacklet block is tinted and marked `Active:`.

use colored::Colorize;

use crate::frame::FrameId;
use crate::rts::Rts;
use crate::splitter::HMapId;
use crate::store::Store;
use crate::worker::Worker;

pub(crate) fn state(rts: &Rts) -> String {
    let mut out = String::new();
    out.push_str("Full frame tree:\n\n");
    for line in tree_lines(rts.store(), rts.initial_frame()) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("\n\nWorker deques:\n\n");
    for worker in rts.workers() {
        out.push_str(&format!("* Worker {} *\n", worker.id));
        out.push_str(&worker_state(rts.store(), worker));
        out.push('\n');
    }
    out
}

fn tree_lines(store: &Store, frame: FrameId) -> Vec<String> {
    let mut lines = vec![frame_label(store, frame)];
    let children = store.frames[frame].children.clone();
    for (i, &child) in children.iter().enumerate() {
        let child_lines = tree_lines(store, child);
        // children before the last keep a vertical rule in front
        let (head, cont) = if i + 1 == children.len() {
            ("`-", "  ")
        } else {
            ("|-", "| ")
        };
        lines.push(format!("{head}{}", child_lines[0]));
        for line in &child_lines[1..] {
            lines.push(format!("{cont}{line}"));
        }
    }
    lines
}

fn frame_label(store: &Store, frame: FrameId) -> String {
    let f = &store.frames[frame];
    let mut label = format!("{} {}", f.kind, frame);
    if let Some(worker) = f.worker {
        label.push_str(&format!(" (Worker {worker})"));
    }
    if let Some(payload) = &f.payload {
        let maps: Vec<String> = payload
            .hmaps
            .iter()
            .map(|&h| hmap_summary(store, h))
            .collect();
        label.push_str(&format!(" [suspended: {}]", maps.join(" | ")));
    }
    label
}

/// One hypermap as `name: base<-...<-top` chains, oldest view in front
fn hmap_summary(store: &Store, hmap: HMapId) -> String {
    let hmap = &store.hmaps[hmap];
    if hmap.is_empty() {
        return "-".to_owned();
    }
    let mut entries = Vec::new();
    for (name, &top) in &hmap.top {
        let base = hmap.base[name];
        let mut values = Vec::new();
        let mut cursor = top;
        while cursor != base {
            values.push(store.views[cursor].value.clone());
            match store.views[cursor].parent {
                Some(parent) => cursor = parent,
                None => break,
            }
        }
        values.push(store.views[base].value.clone());
        values.reverse();
        entries.push(format!("{name}: {}", values.join("<-")));
    }
    entries.join("    ")
}

fn worker_state(store: &Store, worker: &Worker) -> String {
    let mut out = String::new();
    let count = worker.deque.len();
    for (i, (stacklet, hmaps)) in worker
        .deque
        .iter()
        .zip(worker.hmaps.lists())
        .enumerate()
    {
        let mut block = String::new();
        let active = i + 1 == count;
        block.push_str(if active { "Active: " } else { "        " });
        let frames: Vec<String> = stacklet
            .frames()
            .iter()
            .map(|&f| frame_label(store, f))
            .collect();
        block.push_str(&frames.join("\t\t"));
        block.push('\n');
        for &h in hmaps {
            block.push('\t');
            block.push_str(&hmap_summary(store, h));
            block.push('\n');
        }
        if active {
            out.push_str(&block.bright_black().to_string());
        } else {
            out.push_str(&block);
        }
    }
    let cache: Vec<String> = worker
        .cache
        .iter()
        .map(|(name, &view)| format!("{name}: {}", store.views[view].value))
        .collect();
    out.push_str(&format!("Cache: {{{}}}\n", cache.join(", ")));
    out
}
