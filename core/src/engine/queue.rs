//! engine/queue.rs
//! Stack-shaped run queue with O(1) removal and boost by task id.
//!
//! Nodes are linked by id through a map, so membership is simply
//! "the id is a key". Removing a task that is not queued is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::task::{Job, TaskId};

struct Node {
    job: Arc<dyn Job>,
    prev: Option<TaskId>,
    next: Option<TaskId>,
}

/// Not-yet-selected tasks, most recently pushed first.
#[derive(Default)]
pub(crate) struct TaskQueue {
    nodes: HashMap<TaskId, Node>,
    head: Option<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Push onto the head. Returns false if the task is already queued.
    pub fn push_front(&mut self, job: Arc<dyn Job>) -> bool {
        let id = job.id();
        if self.nodes.contains_key(&id) {
            return false;
        }
        let old_head = self.head.replace(id);
        if let Some(old) = old_head {
            if let Some(node) = self.nodes.get_mut(&old) {
                node.prev = Some(id);
            }
        }
        self.nodes.insert(
            id,
            Node {
                job,
                prev: None,
                next: old_head,
            },
        );
        true
    }

    pub fn pop_front(&mut self) -> Option<Arc<dyn Job>> {
        let id = self.head?;
        self.unlink(id)
    }

    /// Remove a task wherever it sits. Idempotent.
    pub fn remove(&mut self, id: TaskId) -> Option<Arc<dyn Job>> {
        self.unlink(id)
    }

    /// Move a queued task to the head. Returns false if it is not queued.
    pub fn move_to_front(&mut self, id: TaskId) -> bool {
        match self.nodes.get(&id) {
            None => return false,
            Some(node) if node.prev.is_none() => return true,
            Some(_) => {}
        }
        if let Some(job) = self.unlink(id) {
            self.push_front(job);
        }
        true
    }

    /// Empty the queue, returning the tasks head first.
    pub fn drain(&mut self) -> Vec<Arc<dyn Job>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        while let Some(job) = self.pop_front() {
            out.push(job);
        }
        out
    }

    fn unlink(&mut self, id: TaskId) -> Option<Arc<dyn Job>> {
        let node = self.nodes.remove(&id)?;
        match node.prev {
            Some(prev) => {
                if let Some(p) = self.nodes.get_mut(&prev) {
                    p.next = node.next;
                }
            }
            None => self.head = node.next,
        }
        if let Some(next) = node.next {
            if let Some(n) = self.nodes.get_mut(&next) {
                n.prev = node.prev;
            }
        }
        Some(node.job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Marker(TaskId);

    impl Job for Marker {
        fn id(&self) -> TaskId {
            self.0
        }
        fn run(&self) {}
        fn abandon(&self) {}
    }

    fn job(id: TaskId) -> Arc<dyn Job> {
        Arc::new(Marker(id))
    }

    fn order(q: &mut TaskQueue) -> Vec<TaskId> {
        q.drain().iter().map(|j| j.id()).collect()
    }

    #[test]
    fn pops_most_recent_first() {
        let mut q = TaskQueue::new();
        for id in 1..=4 {
            assert!(q.push_front(job(id)));
        }
        assert_eq!(order(&mut q), vec![4, 3, 2, 1]);
        assert!(q.is_empty());
    }

    #[test]
    fn duplicate_push_is_rejected() {
        let mut q = TaskQueue::new();
        assert!(q.push_front(job(7)));
        assert!(!q.push_front(job(7)));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn remove_from_middle_head_and_tail() {
        let mut q = TaskQueue::new();
        for id in 1..=5 {
            q.push_front(job(id));
        }
        assert!(q.remove(3).is_some());
        assert!(q.remove(5).is_some());
        assert!(q.remove(1).is_some());
        assert!(q.remove(3).is_none());
        assert_eq!(order(&mut q), vec![4, 2]);
    }

    #[test]
    fn boost_moves_task_to_head() {
        let mut q = TaskQueue::new();
        for id in 1..=3 {
            q.push_front(job(id));
        }
        assert!(q.move_to_front(1));
        assert!(q.move_to_front(1));
        assert!(!q.move_to_front(42));
        assert_eq!(order(&mut q), vec![1, 3, 2]);
    }
}
