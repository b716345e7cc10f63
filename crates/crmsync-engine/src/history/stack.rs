//! The past/future stacks.
//!
//! Invariants:
//! - recording clears `future` (no branching history),
//! - `past` holds at most `limit` actions, oldest evicted first,
//! - an action lives on at most one stack.

use std::collections::VecDeque;

use super::action::Action;

#[derive(Debug, Clone)]
pub struct HistoryState {
    past: VecDeque<Action>,
    future: VecDeque<Action>,
    limit: usize,
    /// Bumped by `record` and `clear`; lets an in-flight undo/redo notice
    /// that the history branched while it was awaiting.
    revision: u64,
}

impl HistoryState {
    pub fn new(limit: usize) -> Self {
        HistoryState {
            past: VecDeque::new(),
            future: VecDeque::new(),
            limit: limit.max(1),
            revision: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn past(&self) -> impl Iterator<Item = &Action> {
        self.past.iter()
    }

    pub fn future(&self) -> impl Iterator<Item = &Action> {
        self.future.iter()
    }

    pub fn past_len(&self) -> usize {
        self.past.len()
    }

    pub fn future_len(&self) -> usize {
        self.future.len()
    }

    /// Pushes a new action, discarding the redo stack. Returns the actions
    /// evicted from the bottom of the undo stack.
    pub fn record(&mut self, action: Action) -> Vec<Action> {
        self.revision += 1;
        self.future.clear();
        self.past.push_back(action);
        self.trim()
    }

    pub fn clear(&mut self) {
        self.revision += 1;
        self.past.clear();
        self.future.clear();
    }

    pub(crate) fn take_undo(&mut self) -> Option<Action> {
        self.past.pop_back()
    }

    pub(crate) fn take_redo(&mut self) -> Option<Action> {
        self.future.pop_front()
    }

    pub(crate) fn push_future(&mut self, action: Action) {
        self.future.push_front(action);
    }

    pub(crate) fn push_past(&mut self, action: Action) {
        self.past.push_back(action);
        self.trim();
    }

    /// Puts an action taken by `take_undo` back where it came from.
    pub(crate) fn restore_undo(&mut self, action: Action, index: usize) {
        let index = index.min(self.past.len());
        self.past.insert(index, action);
        self.trim();
    }

    /// Puts an action taken by `take_redo` back on top of the redo stack.
    pub(crate) fn restore_redo(&mut self, action: Action) {
        self.future.push_front(action);
    }

    fn trim(&mut self) -> Vec<Action> {
        let mut evicted = Vec::new();
        while self.past.len() > self.limit {
            if let Some(oldest) = self.past.pop_front() {
                evicted.push(oldest);
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(n: usize) -> Action {
        Action::create("leads", json!({"id": n}), vec![]).with_description(format!("#{n}"))
    }

    #[test]
    fn record_clears_future() {
        let mut state = HistoryState::new(10);
        state.record(action(1));
        state.record(action(2));
        let undone = state.take_undo().unwrap();
        state.push_future(undone);
        assert_eq!(state.future_len(), 1);

        state.record(action(3));
        assert_eq!(state.future_len(), 0);
        assert_eq!(state.past_len(), 2);
    }

    #[test]
    fn past_is_bounded_fifo() {
        let mut state = HistoryState::new(3);
        for n in 0..5 {
            state.record(action(n));
        }
        let kept: Vec<_> = state.past().map(|a| a.description.clone()).collect();
        assert_eq!(kept, vec!["#2", "#3", "#4"]);
    }

    #[test]
    fn restore_undo_reinserts_at_original_position() {
        let mut state = HistoryState::new(10);
        state.record(action(1));
        state.record(action(2));
        let index = state.past_len() - 1;
        let taken = state.take_undo().unwrap();
        state.restore_undo(taken, index);
        let order: Vec<_> = state.past().map(|a| a.description.clone()).collect();
        assert_eq!(order, vec!["#1", "#2"]);
    }
}
