//! The active window - the bounded set of drones currently compared.
//!
//! A hash map gives O(1) lookup by identifier, and an index-linked list
//! over a slab of slots keeps update order with O(1) move-to-back and
//! O(1) eviction of the oldest entry. Slots are recycled through a free
//! list, so the slab never grows past the capacity.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::geodesy::GeocentricPoint;

/// Upper bound on slots reserved up front; larger windows grow on demand.
const INITIAL_RESERVE: usize = 4096;

/// The latest known position of one drone.
///
/// Immutable once created; a newer report for the same drone supersedes it.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Drone identifier
    pub id: Arc<str>,

    /// Earth-centered coordinates and radius
    pub point: GeocentricPoint,

    /// Source altitude in meters
    pub altitude: f64,

    /// Source latitude in radians
    pub latitude: f64,

    /// Source longitude in radians
    pub longitude: f64,

    /// Capture time as stamped by the drone
    pub captured_at: String,
}

impl Position {
    pub fn new(
        id: impl Into<Arc<str>>,
        point: GeocentricPoint,
        altitude: f64,
        latitude: f64,
        longitude: f64,
        captured_at: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            point,
            altitude,
            latitude,
            longitude,
            captured_at: captured_at.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WindowError {
    #[error("Window capacity must be a positive integer, got {0}")]
    InvalidCapacity(usize),
}

#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded, insertion-ordered map from drone id to its latest [`Position`].
///
/// Order is "most recently touched": a re-insert of a known id replaces its
/// position and moves it to the newest end. Inserting a new id into a full
/// window evicts the oldest entry first.
#[derive(Debug)]
pub struct ActiveWindow {
    capacity: usize,
    index: HashMap<Arc<str>, usize>,
    entries: Vec<Option<Position>>,
    links: Vec<Link>,
    free: Vec<usize>,
    oldest: Option<usize>,
    newest: Option<usize>,
}

impl ActiveWindow {
    /// Creates an empty window holding at most `capacity` drones.
    pub fn new(capacity: usize) -> Result<Self, WindowError> {
        if capacity == 0 {
            return Err(WindowError::InvalidCapacity(capacity));
        }

        Ok(Self {
            capacity,
            index: HashMap::with_capacity(capacity.min(INITIAL_RESERVE)),
            entries: Vec::new(),
            links: Vec::new(),
            free: Vec::new(),
            oldest: None,
            newest: None,
        })
    }

    /// Inserts or replaces the position for `position.id`.
    ///
    /// # Returns
    /// The identifier evicted to make room, if any. Replacing a known id
    /// never evicts.
    pub fn upsert(&mut self, position: Position) -> Option<Arc<str>> {
        if let Some(&slot) = self.index.get(&position.id) {
            self.unlink(slot);
            self.entries[slot] = Some(position);
            self.push_newest(slot);
            return None;
        }

        let evicted = if self.index.len() >= self.capacity {
            self.evict_oldest()
        } else {
            None
        };

        let id = Arc::clone(&position.id);
        let slot = self.allocate(position);
        self.index.insert(id, slot);
        self.push_newest(slot);

        evicted
    }

    /// Current position for `id`, if the drone is in the window.
    pub fn get(&self, id: &str) -> Option<&Position> {
        self.index
            .get(id)
            .and_then(|&slot| self.entries[slot].as_ref())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates positions oldest-first (ascending update order).
    pub fn iter(&self) -> WindowIter<'_> {
        WindowIter {
            window: self,
            cursor: self.oldest,
            remaining: self.len(),
        }
    }

    /// Ordered snapshot, oldest first. Pair enumeration is indexed by this order.
    pub fn snapshot(&self) -> Vec<&Position> {
        self.iter().collect()
    }

    /// Identifiers oldest-first.
    pub fn ids(&self) -> Vec<Arc<str>> {
        self.iter().map(|p| Arc::clone(&p.id)).collect()
    }

    fn allocate(&mut self, position: Position) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.entries[slot] = Some(position);
                slot
            }
            None => {
                self.entries.push(Some(position));
                self.links.push(Link::default());
                self.entries.len() - 1
            }
        }
    }

    fn evict_oldest(&mut self) -> Option<Arc<str>> {
        let slot = self.oldest?;
        self.unlink(slot);
        self.free.push(slot);

        let evicted = self.entries[slot].take()?;
        self.index.remove(&evicted.id);
        Some(evicted.id)
    }

    fn unlink(&mut self, slot: usize) {
        let Link { prev, next } = self.links[slot];

        match prev {
            Some(p) => self.links[p].next = next,
            None => self.oldest = next,
        }
        match next {
            Some(n) => self.links[n].prev = prev,
            None => self.newest = prev,
        }

        self.links[slot] = Link::default();
    }

    fn push_newest(&mut self, slot: usize) {
        self.links[slot] = Link {
            prev: self.newest,
            next: None,
        };

        match self.newest {
            Some(n) => self.links[n].next = Some(slot),
            None => self.oldest = Some(slot),
        }
        self.newest = Some(slot);
    }
}

/// Oldest-first iterator over an [`ActiveWindow`].
pub struct WindowIter<'a> {
    window: &'a ActiveWindow,
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for WindowIter<'a> {
    type Item = &'a Position;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        self.cursor = self.window.links[slot].next;
        self.remaining = self.remaining.saturating_sub(1);
        self.window.entries[slot].as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for WindowIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesy::to_cartesian;

    fn pos(id: &str, altitude: f64) -> Position {
        Position::new(id, to_cartesian(altitude, 0.0, 0.0), altitude, 0.0, 0.0, "t")
    }

    fn ids(window: &ActiveWindow) -> Vec<String> {
        window.ids().iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_unbounded_capacity_constructs() {
        let mut window = ActiveWindow::new(usize::MAX).unwrap();
        assert_eq!(window.capacity(), usize::MAX);

        for k in 0..10 {
            assert!(window.upsert(pos(&format!("d{}", k), 10.0)).is_none());
        }
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert_eq!(
            ActiveWindow::new(0).unwrap_err(),
            WindowError::InvalidCapacity(0)
        );
    }

    #[test]
    fn test_insert_below_capacity() {
        let mut window = ActiveWindow::new(3).unwrap();
        assert!(window.upsert(pos("a", 0.0)).is_none());
        assert!(window.upsert(pos("b", 0.0)).is_none());

        assert_eq!(window.len(), 2);
        assert_eq!(ids(&window), vec!["a", "b"]);
    }

    #[test]
    fn test_overflow_evicts_first_inserted() {
        let mut window = ActiveWindow::new(3).unwrap();
        for id in ["a", "b", "c"] {
            assert!(window.upsert(pos(id, 0.0)).is_none());
        }

        let evicted = window.upsert(pos("d", 0.0));
        assert_eq!(evicted.as_deref(), Some("a"));
        assert_eq!(window.len(), 3);
        assert!(!window.contains("a"));
        assert_eq!(ids(&window), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_duplicate_never_grows_or_evicts() {
        let mut window = ActiveWindow::new(2).unwrap();
        window.upsert(pos("a", 0.0));
        window.upsert(pos("b", 0.0));

        for _ in 0..5 {
            assert!(window.upsert(pos("a", 10.0)).is_none());
            assert_eq!(window.len(), 2);
        }
        assert_eq!(window.get("a").unwrap().altitude, 10.0);
    }

    #[test]
    fn test_reinsert_moves_to_newest() {
        let mut window = ActiveWindow::new(3).unwrap();
        for id in ["a", "b", "c"] {
            window.upsert(pos(id, 0.0));
        }

        window.upsert(pos("a", 5.0));
        assert_eq!(ids(&window), vec!["b", "c", "a"]);

        // "b" is now the oldest and goes first
        let evicted = window.upsert(pos("d", 0.0));
        assert_eq!(evicted.as_deref(), Some("b"));
        assert_eq!(ids(&window), vec!["c", "a", "d"]);
    }

    #[test]
    fn test_capacity_one() {
        let mut window = ActiveWindow::new(1).unwrap();
        assert!(window.upsert(pos("a", 0.0)).is_none());
        assert!(window.upsert(pos("a", 1.0)).is_none());

        assert_eq!(window.upsert(pos("b", 0.0)).as_deref(), Some("a"));
        assert_eq!(window.upsert(pos("c", 0.0)).as_deref(), Some("b"));
        assert_eq!(ids(&window), vec!["c"]);
    }

    #[test]
    fn test_slots_are_recycled() {
        let mut window = ActiveWindow::new(4).unwrap();
        for i in 0..1000 {
            window.upsert(pos(&format!("d{}", i), 0.0));
        }

        assert_eq!(window.len(), 4);
        assert!(window.entries.len() <= 4);
        assert_eq!(ids(&window), vec!["d996", "d997", "d998", "d999"]);
    }

    #[test]
    fn test_snapshot_is_deterministic() {
        let sequence = ["x", "y", "x", "z", "w", "y", "v"];
        let run = || {
            let mut window = ActiveWindow::new(3).unwrap();
            for id in sequence {
                window.upsert(pos(id, 0.0));
            }
            ids(&window)
        };

        assert_eq!(run(), run());
        assert_eq!(run(), vec!["w", "y", "v"]);
    }

    #[test]
    fn test_iter_exact_size() {
        let mut window = ActiveWindow::new(5).unwrap();
        for id in ["a", "b", "c"] {
            window.upsert(pos(id, 0.0));
        }
        assert_eq!(window.iter().len(), 3);
        assert_eq!(window.snapshot().len(), 3);
    }
}
