//! Content-change event coalescing.

/// What a pass gets from the events queued since the previous pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<N> {
    /// The event's node when exactly one distinct event was queued.
    pub node: Option<N>,
    /// Events folded into this batch beyond the first.
    pub coalesced: usize,
}

/// Outcome of [`EventCoalescer::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Same node as the queued event.
    Merged,
    /// Inside the debounce window; remembered only as "something changed".
    Throttled,
}

/// Keeps at most one node reference between passes.
///
/// A burst collapses to the root: once more than one distinct event (or any
/// throttled one) is pending, the node reference is discarded and the next
/// pass reads the active window root instead.
#[derive(Debug)]
pub struct EventCoalescer<N> {
    latest: Option<N>,
    queued: usize,
    throttled: usize,
    last_accepted_at: Option<u64>,
}

impl<N> Default for EventCoalescer<N> {
    fn default() -> Self {
        Self {
            latest: None,
            queued: 0,
            throttled: 0,
            last_accepted_at: None,
        }
    }
}

impl<N: PartialEq> EventCoalescer<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event. `None` stands for "somewhere in the window".
    ///
    /// Unless `bypass_debounce` is set, an event within `debounce_ms` of the
    /// last accepted one is throttled.
    pub fn push(&mut self, node: Option<N>, now: u64, debounce_ms: u64, bypass_debounce: bool) -> Push {
        let within = self
            .last_accepted_at
            .is_some_and(|at| now.saturating_sub(at) < debounce_ms);
        if within && !bypass_debounce {
            self.throttled += 1;
            return Push::Throttled;
        }
        self.last_accepted_at = Some(now);
        if self.queued > 0 && node.is_some() && node == self.latest {
            return Push::Merged;
        }
        self.latest = node;
        self.queued += 1;
        Push::Queued
    }

    pub fn is_pending(&self) -> bool {
        self.queued > 0 || self.throttled > 0
    }

    /// Take everything queued, or `None` when nothing is.
    pub fn take(&mut self) -> Option<Batch<N>> {
        if !self.is_pending() {
            return None;
        }
        let latest = self.latest.take();
        let node = if self.queued == 1 && self.throttled == 0 {
            latest
        } else {
            None
        };
        let coalesced = (self.queued + self.throttled).saturating_sub(1);
        self.queued = 0;
        self.throttled = 0;
        Some(Batch { node, coalesced })
    }

    /// When a throttled event should be flushed by a pass of its own.
    pub fn flush_at(&self, debounce_ms: u64) -> Option<u64> {
        if self.throttled == 0 {
            return None;
        }
        self.last_accepted_at.map(|at| at + debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event_keeps_node() {
        let mut c = EventCoalescer::new();
        assert_eq!(c.push(Some(1), 0, 100, false), Push::Queued);
        assert_eq!(c.take(), Some(Batch { node: Some(1), coalesced: 0 }));
        assert_eq!(c.take(), None);
    }

    #[test]
    fn burst_falls_back_to_root() {
        let mut c = EventCoalescer::new();
        c.push(Some(1), 0, 100, true);
        c.push(Some(2), 10, 100, true);
        assert_eq!(c.take(), Some(Batch { node: None, coalesced: 1 }));
    }

    #[test]
    fn same_node_merges() {
        let mut c = EventCoalescer::new();
        c.push(Some(7), 0, 100, true);
        assert_eq!(c.push(Some(7), 20, 100, true), Push::Merged);
        assert_eq!(c.take(), Some(Batch { node: Some(7), coalesced: 0 }));
    }

    #[test]
    fn throttled_event_discards_node_and_flushes_later() {
        let mut c = EventCoalescer::new();
        c.push(Some(1), 1000, 100, false);
        assert_eq!(c.push(Some(1), 1050, 100, false), Push::Throttled);
        assert_eq!(c.flush_at(100), Some(1100));
        assert_eq!(c.take(), Some(Batch { node: None, coalesced: 1 }));
        assert_eq!(c.flush_at(100), None);
        assert_eq!(c.push(Some(2), 1150, 100, false), Push::Queued);
    }
}
