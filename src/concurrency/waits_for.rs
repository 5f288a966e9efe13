//! Wait-for graph over transactions.

use std::collections::{HashMap, HashSet};

use crate::common::TransactionId;

/// Directed graph with an edge `A -> B` whenever transaction `A` is blocked
/// on a page lock that `B` holds. A cycle means deadlock.
///
/// Small enough that cycle detection is simply rerun from scratch on every
/// contention event.
#[derive(Debug, Default)]
pub struct WaitsForGraph {
    edges: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl WaitsForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace `waiter`'s outgoing edges with edges to `holders`.
    pub fn set_waits(&mut self, waiter: TransactionId, holders: &[TransactionId]) {
        let targets: HashSet<TransactionId> = holders
            .iter()
            .copied()
            .filter(|&holder| holder != waiter)
            .collect();
        if targets.is_empty() {
            self.edges.remove(&waiter);
        } else {
            self.edges.insert(waiter, targets);
        }
    }

    /// Drop `waiter`'s outgoing edges.
    pub fn clear_waits(&mut self, waiter: TransactionId) {
        self.edges.remove(&waiter);
    }

    /// Drop every edge into or out of `tid`.
    pub fn remove_transaction(&mut self, tid: TransactionId) {
        self.edges.remove(&tid);
        self.edges.retain(|_, targets| {
            targets.remove(&tid);
            !targets.is_empty()
        });
    }

    /// Transactions `waiter` is currently blocked on.
    pub fn waits_on(&self, waiter: TransactionId) -> Vec<TransactionId> {
        self.edges
            .get(&waiter)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Depth-first search for a back edge anywhere in the graph.
    pub fn has_cycle(&self) -> bool {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        self.edges
            .keys()
            .any(|&tid| self.visit(tid, &mut visited, &mut on_stack))
    }

    fn visit(
        &self,
        tid: TransactionId,
        visited: &mut HashSet<TransactionId>,
        on_stack: &mut HashSet<TransactionId>,
    ) -> bool {
        if on_stack.contains(&tid) {
            return true;
        }
        if !visited.insert(tid) {
            return false;
        }

        on_stack.insert(tid);
        if let Some(targets) = self.edges.get(&tid) {
            for &next in targets {
                if self.visit(next, visited, on_stack) {
                    return true;
                }
            }
        }
        on_stack.remove(&tid);
        false
    }
}
