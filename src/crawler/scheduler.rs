//! Frontier and dispatch budget
//!
//! This module handles:
//! - The FIFO queue of pending page tasks
//! - In-flight deduplication and the visited set
//! - The `max-pages` dispatch ceiling
//!
//! Both types are owned by the coordinator loop; workers never touch them.

use crate::state::{CrawlState, PageTask};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use tracing::trace;

/// Pending tasks, in-flight tasks and visited URLs
///
/// A URL is in at most one of: the queue, the in-flight map, the visited
/// set. Visited URLs are never re-queued.
#[derive(Debug, Default)]
pub struct Frontier {
    queue: VecDeque<PageTask>,
    pending: HashSet<String>,
    in_flight: HashMap<String, PageTask>,
    visited: BTreeSet<String>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the frontier from a persisted state
    pub fn from_state(state: &CrawlState) -> Self {
        let mut frontier = Self {
            visited: state.visited.clone(),
            ..Self::default()
        };
        for task in &state.pending {
            frontier.enqueue(task.clone());
        }
        frontier
    }

    /// Adds a task unless its URL is visited, queued or in flight
    ///
    /// Returns true if the task was added.
    pub fn enqueue(&mut self, task: PageTask) -> bool {
        let key = task.key();
        if self.visited.contains(key) || self.pending.contains(key) || self.in_flight.contains_key(key)
        {
            trace!("Already known: {}", key);
            return false;
        }
        self.pending.insert(key.to_string());
        self.queue.push_back(task);
        true
    }

    /// Takes up to `n` tasks off the queue and marks them in flight
    pub fn next_batch(&mut self, n: usize) -> Vec<PageTask> {
        let mut batch = Vec::with_capacity(n.min(self.queue.len()));
        while batch.len() < n {
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            self.pending.remove(task.key());
            self.in_flight.insert(task.key().to_string(), task.clone());
            batch.push(task);
        }
        batch
    }

    /// Marks an in-flight task visited and enqueues its children
    ///
    /// Returns the number of children actually added.
    pub fn mark_resolved(&mut self, task: &PageTask, children: Vec<PageTask>) -> usize {
        self.in_flight.remove(task.key());
        self.pending.remove(task.key());
        self.visited.insert(task.key().to_string());

        children
            .into_iter()
            .filter(|child| child.key() != task.key())
            .map(|child| self.enqueue(child))
            .filter(|added| *added)
            .count()
    }

    /// Puts an in-flight task back at the head of the queue
    pub fn release(&mut self, task: PageTask) {
        if self.in_flight.remove(task.key()).is_some() && self.pending.insert(task.key().to_string())
        {
            self.queue.push_front(task);
        }
    }

    /// Exports pending work (in-flight first) and the visited set
    pub fn snapshot(&self) -> (Vec<PageTask>, BTreeSet<String>) {
        let mut in_flight: Vec<PageTask> = self.in_flight.values().cloned().collect();
        in_flight.sort_by(|a, b| a.key().cmp(b.key()));
        let pending = in_flight
            .into_iter()
            .chain(self.queue.iter().cloned())
            .collect();
        (pending, self.visited.clone())
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Dispatch decisions on top of the frontier
///
/// Caps dispatches at the remaining `max-pages` budget. The budget counts
/// every dispatch over the life of the crawl, resumed runs included.
#[derive(Debug)]
pub struct Scheduler {
    frontier: Frontier,
    concurrency: usize,
    max_pages: Option<u64>,
    dispatched_total: u64,
    dispatched_run: u64,
}

impl Scheduler {
    /// Creates a scheduler
    ///
    /// # Arguments
    ///
    /// * `frontier` - Pending work and visited set
    /// * `concurrency` - Maximum tasks in flight
    /// * `max_pages` - All-time dispatch ceiling
    /// * `dispatched_total` - Dispatches already made by earlier runs
    pub fn new(
        frontier: Frontier,
        concurrency: usize,
        max_pages: Option<u64>,
        dispatched_total: u64,
    ) -> Self {
        Self {
            frontier,
            concurrency: concurrency.max(1),
            max_pages,
            dispatched_total,
            dispatched_run: 0,
        }
    }

    /// Dispatchable tasks for the free worker slots
    ///
    /// Never returns more than `concurrency - in_flight` tasks nor more
    /// than the remaining page budget.
    pub fn next_batch(&mut self) -> Vec<PageTask> {
        let free = self
            .concurrency
            .saturating_sub(self.frontier.in_flight_count());
        let n = match self.remaining_budget() {
            Some(left) => free.min(usize::try_from(left).unwrap_or(usize::MAX)),
            None => free,
        };
        if n == 0 {
            return Vec::new();
        }

        let batch = self.frontier.next_batch(n);
        self.dispatched_total += batch.len() as u64;
        self.dispatched_run += batch.len() as u64;
        batch
    }

    /// Returns an undispatched task to the frontier, refunding its budget
    pub fn release(&mut self, task: PageTask) {
        self.frontier.release(task);
        self.dispatched_total = self.dispatched_total.saturating_sub(1);
        self.dispatched_run = self.dispatched_run.saturating_sub(1);
    }

    pub fn mark_resolved(&mut self, task: &PageTask, children: Vec<PageTask>) -> usize {
        self.frontier.mark_resolved(task, children)
    }

    pub fn snapshot(&self) -> (Vec<PageTask>, BTreeSet<String>) {
        self.frontier.snapshot()
    }

    pub fn remaining_budget(&self) -> Option<u64> {
        self.max_pages
            .map(|max| max.saturating_sub(self.dispatched_total))
    }

    /// True once `max-pages` dispatches have been made
    pub fn budget_exhausted(&self) -> bool {
        self.remaining_budget() == Some(0)
    }

    pub fn dispatched_total(&self) -> u64 {
        self.dispatched_total
    }

    pub fn dispatched_run(&self) -> u64 {
        self.dispatched_run
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }
}
