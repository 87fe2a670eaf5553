//! Bounded buffers backing windowed aggregation.
//!
//! Both synopsis flavours are single-writer. The slide callback runs
//! synchronously inside `enqueue` and receives a read-only
//! [`WindowContents`] view of the window that just completed.

use std::collections::vec_deque;
use std::collections::VecDeque;

use fxhash::FxHashMap;

use super::{Window, WindowKind};
use crate::tuple::{RelationId, Timestamp, TupleRef};

/// Read-only view of a window's tuples, oldest first.
#[derive(Debug, Clone, Copy)]
pub struct WindowContents<'a> {
    tuples: &'a VecDeque<TupleRef>,
    next_beginning: Timestamp,
}

impl<'a> WindowContents<'a> {
    /// Iterates the tuples in arrival order.
    pub fn iter(&self) -> vec_deque::Iter<'a, TupleRef> {
        self.tuples.iter()
    }

    /// Returns the number of tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tuples.len()
    }

    /// Returns `true` if the window holds no tuple.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tuples.is_empty()
    }

    /// Returns the most recently accepted tuple.
    #[must_use]
    pub fn newest(&self) -> Option<&'a TupleRef> {
        self.tuples.back()
    }

    /// Returns the smallest low-water mark in the window.
    #[must_use]
    pub fn lwm(&self) -> Option<Timestamp> {
        self.tuples.iter().map(|t| t.lwm()).min()
    }

    /// Returns the newest arrival time in the window.
    #[must_use]
    pub fn hwm(&self) -> Option<Timestamp> {
        self.tuples.iter().map(|t| t.arrived_at()).max()
    }

    /// Returns the oldest timestamp the following window still needs.
    ///
    /// Backed-up tuples below this mark can be evicted once this window
    /// has committed.
    #[must_use]
    pub fn window_beginning_lwm(&self) -> Timestamp {
        self.next_beginning
    }

    /// Returns `true` if, for every relation, all tuples stamped with that
    /// relation carry the same version. Unstamped tuples are ignored.
    #[must_use]
    pub fn has_reference_consistency(&self) -> bool {
        let mut seen: FxHashMap<RelationId, u64> = FxHashMap::default();
        for tuple in self.tuples {
            for &(relation, version) in tuple.versions() {
                if *seen.entry(relation).or_insert(version) != version {
                    return false;
                }
            }
        }
        true
    }
}

// ── Tuple-count synopsis ────────────────────────────────────────────────

/// Count-based sliding buffer.
///
/// The first `width` tuples fill the window. After that, newcomers wait in
/// a pending area; each group of `stride` newcomers replaces the oldest
/// `stride` tuples at once and fires the callback.
#[derive(Debug)]
pub struct TupleSynopsis {
    width: usize,
    stride: usize,
    window: VecDeque<TupleRef>,
    pending: Vec<TupleRef>,
    filled: bool,
}

impl TupleSynopsis {
    fn new(window: &Window) -> Self {
        let width = usize::try_from(window.width()).unwrap_or(usize::MAX);
        let stride = usize::try_from(window.stride()).unwrap_or(width);
        Self {
            width,
            stride,
            window: VecDeque::with_capacity(width.min(4096)),
            pending: Vec::new(),
            filled: false,
        }
    }

    fn enqueue<F: FnMut(WindowContents<'_>)>(&mut self, tuple: TupleRef, on_slide: &mut F) {
        if !self.filled {
            self.window.push_back(tuple);
            if self.window.len() == self.width {
                self.filled = true;
                on_slide(self.contents());
            }
            return;
        }
        self.pending.push(tuple);
        if self.pending.len() == self.stride {
            self.window.drain(..self.stride.min(self.window.len()));
            self.window.extend(self.pending.drain(..));
            on_slide(self.contents());
        }
    }

    fn next_beginning(&self) -> Timestamp {
        if self.stride < self.window.len() {
            self.window
                .iter()
                .skip(self.stride)
                .map(|t| t.lwm())
                .min()
                .unwrap_or(Timestamp::MIN)
        } else {
            self.window
                .iter()
                .map(|t| t.lwm())
                .max()
                .map_or(Timestamp::MIN, |m| m.saturating_add(1))
        }
    }

    fn contents(&self) -> WindowContents<'_> {
        WindowContents {
            tuples: &self.window,
            next_beginning: self.next_beginning(),
        }
    }

    /// Returns the number of newcomers waiting for the next slide.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn reset(&mut self) {
        self.window.clear();
        self.pending.clear();
        self.filled = false;
    }
}

// ── Time synopsis ───────────────────────────────────────────────────────

/// Time-based sliding buffer.
///
/// The first tuple opens the window `[t, t + width]`. A tuple arriving past
/// the window end closes the current window (firing when non-empty), then
/// the window advances by `stride` and drops tuples older than its new
/// beginning, until the tuple fits.
#[derive(Debug)]
pub struct TimeSynopsis {
    width: Timestamp,
    stride: Timestamp,
    begin: Option<Timestamp>,
    window: VecDeque<TupleRef>,
}

impl TimeSynopsis {
    fn new(window: &Window) -> Self {
        Self {
            width: Timestamp::try_from(window.width()).unwrap_or(Timestamp::MAX),
            stride: Timestamp::try_from(window.stride()).unwrap_or(Timestamp::MAX),
            begin: None,
            window: VecDeque::new(),
        }
    }

    fn end(&self, begin: Timestamp) -> Timestamp {
        begin.saturating_add(self.width)
    }

    fn enqueue<F: FnMut(WindowContents<'_>)>(&mut self, tuple: TupleRef, on_slide: &mut F) {
        let ts = tuple.arrived_at();
        let mut begin = *self.begin.get_or_insert(ts);
        if ts <= self.end(begin) {
            if ts >= begin {
                self.window.push_back(tuple);
            }
            return;
        }

        while ts > self.end(begin) {
            if self.window.is_empty() {
                // Jump straight to the first window that can hold `ts`.
                let behind = ts - self.end(begin);
                let steps = behind.saturating_add(self.stride - 1) / self.stride;
                begin = begin.saturating_add(steps.saturating_mul(self.stride));
                break;
            }
            on_slide(WindowContents {
                tuples: &self.window,
                next_beginning: begin.saturating_add(self.stride),
            });
            begin = begin.saturating_add(self.stride);
            self.evict_before(begin);
        }
        self.begin = Some(begin);
        if ts >= begin {
            self.window.push_back(tuple);
        }
        self.evict_before(begin);
    }

    fn evict_before(&mut self, begin: Timestamp) {
        self.window.retain(|t| t.arrived_at() >= begin);
    }

    /// Returns the beginning of the open window.
    #[must_use]
    pub fn begin(&self) -> Option<Timestamp> {
        self.begin
    }

    fn contents(&self) -> WindowContents<'_> {
        WindowContents {
            tuples: &self.window,
            next_beginning: self
                .begin
                .map_or(Timestamp::MIN, |b| b.saturating_add(self.stride)),
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.begin = None;
    }
}

// ── Synopsis ────────────────────────────────────────────────────────────

/// The buffered state of one windowed operator.
#[derive(Debug)]
pub enum Synopsis {
    /// Count-based window.
    Tuples(TupleSynopsis),
    /// Time-based window.
    Time(TimeSynopsis),
}

impl Synopsis {
    /// Creates an empty synopsis for `window`.
    #[must_use]
    pub fn new(window: &Window) -> Self {
        match window.kind() {
            WindowKind::Tuples => Self::Tuples(TupleSynopsis::new(window)),
            WindowKind::Time => Self::Time(TimeSynopsis::new(window)),
        }
    }

    /// Accepts one tuple, invoking `on_slide` once per completed window.
    pub fn enqueue<F: FnMut(WindowContents<'_>)>(&mut self, tuple: TupleRef, mut on_slide: F) {
        match self {
            Self::Tuples(s) => s.enqueue(tuple, &mut on_slide),
            Self::Time(s) => s.enqueue(tuple, &mut on_slide),
        }
    }

    /// Returns a view of the current window.
    #[must_use]
    pub fn contents(&self) -> WindowContents<'_> {
        match self {
            Self::Tuples(s) => s.contents(),
            Self::Time(s) => s.contents(),
        }
    }

    /// Iterates the current window, oldest first.
    pub fn iter(&self) -> vec_deque::Iter<'_, TupleRef> {
        match self {
            Self::Tuples(s) => s.window.iter(),
            Self::Time(s) => s.window.iter(),
        }
    }

    /// Returns the number of tuples in the current window.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contents().len()
    }

    /// Returns `true` if nothing is buffered, pending newcomers included.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Tuples(s) => s.window.is_empty() && s.pending.is_empty(),
            Self::Time(s) => s.window.is_empty(),
        }
    }

    /// Drops all buffered tuples and restarts window alignment.
    pub fn reset(&mut self) {
        match self {
            Self::Tuples(s) => s.reset(),
            Self::Time(s) => s.reset(),
        }
    }

    /// See [`WindowContents::has_reference_consistency`].
    #[must_use]
    pub fn has_reference_consistency(&self) -> bool {
        self.contents().has_reference_consistency()
    }

    /// See [`WindowContents::window_beginning_lwm`].
    #[must_use]
    pub fn window_beginning_lwm(&self) -> Timestamp {
        self.contents().window_beginning_lwm()
    }

    /// Returns the smallest low-water mark in the current window.
    #[must_use]
    pub fn lwm(&self) -> Option<Timestamp> {
        self.contents().lwm()
    }

    /// Returns the newest arrival time in the current window.
    #[must_use]
    pub fn hwm(&self) -> Option<Timestamp> {
        self.contents().hwm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;
    use crate::tuple::Tuple;
    use crate::value::{Value, ValueType};

    /// Helper to create a tuple carrying `v`, arriving at `ts`.
    fn tuple(v: i64, ts: Timestamp) -> TupleRef {
        Tuple::new(Schema::of(&[("v", ValueType::Int)]), vec![Value::Int(v)], ts).unwrap()
    }

    fn values(synopsis: &Synopsis) -> Vec<i64> {
        synopsis
            .iter()
            .map(|t| match t.value(0) {
                Some(Value::Int(v)) => *v,
                _ => panic!("unexpected value"),
            })
            .collect()
    }

    /// Feeds `n` tuples and returns how many times the callback fired.
    fn feed(synopsis: &mut Synopsis, range: std::ops::Range<i64>) -> usize {
        let mut fired = 0;
        for i in range {
            synopsis.enqueue(tuple(i, i), |_| fired += 1);
        }
        fired
    }

    #[test]
    fn test_tuple_window_first_fill() {
        let mut s = Synopsis::new(&Window::tuples(3, 3));
        assert_eq!(feed(&mut s, 0..2), 0);
        assert_eq!(values(&s), vec![0, 1]);
        assert_eq!(feed(&mut s, 2..3), 1);
        assert_eq!(values(&s), vec![0, 1, 2]);
    }

    #[test]
    fn test_tuple_window_eviction_law() {
        let (w, st) = (5i64, 2i64);
        let mut s = Synopsis::new(&Window::tuples(5, 2));
        let mut fired = feed(&mut s, 0..w);
        assert_eq!(fired, 1);
        let mut next = w;
        for k in 2..=6i64 {
            fired += feed(&mut s, next..next + st);
            next += st;
            assert_eq!(fired, usize::try_from(k).unwrap());
            let start = (k - 1) * st;
            assert_eq!(values(&s), (start..start + w).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_pending_newcomers_are_hidden() {
        let mut s = Synopsis::new(&Window::tuples(2, 2));
        feed(&mut s, 0..3);
        assert_eq!(values(&s), vec![0, 1]);
        match &s {
            Synopsis::Tuples(t) => assert_eq!(t.pending(), 1),
            Synopsis::Time(_) => unreachable!(),
        }
        s.reset();
        assert!(s.is_empty());
        assert_eq!(feed(&mut s, 10..12), 1);
        assert_eq!(values(&s), vec![10, 11]);
    }

    #[test]
    fn test_callback_sees_completed_window() {
        let mut s = Synopsis::new(&Window::tuples(3, 1));
        let mut seen = Vec::new();
        for i in 0..5 {
            s.enqueue(tuple(i, i), |w| {
                seen.push((w.len(), w.lwm(), w.hwm(), w.window_beginning_lwm()));
            });
        }
        assert_eq!(
            seen,
            vec![
                (3, Some(0), Some(2), 1),
                (3, Some(1), Some(3), 2),
                (3, Some(2), Some(4), 3),
            ]
        );
    }

    #[test]
    fn test_tumbling_window_beginning_is_past_newest() {
        let mut s = Synopsis::new(&Window::tuples(3, 3));
        let mut mark = None;
        for i in 0..3 {
            s.enqueue(tuple(i, i * 10), |w| mark = Some(w.window_beginning_lwm()));
        }
        assert_eq!(mark, Some(21));
    }

    #[test]
    fn test_time_window_slides() {
        let mut s = Synopsis::new(&Window::time(10, 5));
        let mut windows: Vec<Vec<Timestamp>> = Vec::new();
        for ts in [0, 3, 7, 10, 12, 16, 30] {
            s.enqueue(tuple(ts, ts), |w| {
                windows.push(w.iter().map(|t| t.arrived_at()).collect());
            });
        }
        // [0,10] closes at 12, [5,15] closes at 16, [10,20] and [15,25]
        // close at 30.
        assert_eq!(
            windows,
            vec![vec![0, 3, 7, 10], vec![7, 10, 12], vec![10, 12, 16], vec![16]]
        );
        assert_eq!(values(&s), vec![30]);
    }

    #[test]
    fn test_time_window_gap_jumps() {
        let mut s = Synopsis::new(&Window::time(4, 2));
        let fired = feed(&mut s, 0..1);
        assert_eq!(fired, 0);
        let mut count = 0;
        s.enqueue(tuple(100, 100), |_| count += 1);
        assert_eq!(count, 1);
        assert_eq!(values(&s), vec![100]);
        match &s {
            Synopsis::Time(t) => {
                let begin = t.begin().unwrap();
                assert!(begin <= 100 && 100 <= begin + 4);
            }
            Synopsis::Tuples(_) => unreachable!(),
        }
    }

    // ── Reference consistency ──

    /// Helper to fill a 3-wide window with tuples stamped per `stamps`.
    fn stamped_window(stamps: &[&[(u32, u64)]]) -> Synopsis {
        let mut s = Synopsis::new(&Window::tuples(3, 3));
        for (i, per_tuple) in stamps.iter().enumerate() {
            let mut t = tuple(0, i64::try_from(i).unwrap());
            for &(rel, version) in *per_tuple {
                t = t.stamped(RelationId(rel), version);
            }
            s.enqueue(t, |_| {});
        }
        s
    }

    #[test]
    fn test_consistent_single_relation() {
        let s = stamped_window(&[&[(0, 2)], &[(0, 2)], &[(0, 2)]]);
        assert!(s.has_reference_consistency());
    }

    #[test]
    fn test_inconsistent_single_relation() {
        let s = stamped_window(&[&[(0, 1)], &[(0, 2)], &[(0, 3)]]);
        assert!(!s.has_reference_consistency());
    }

    #[test]
    fn test_two_relations_consistent() {
        let s = stamped_window(&[&[(0, 2), (1, 2)], &[(0, 2), (1, 2)], &[(0, 2), (1, 2)]]);
        assert!(s.has_reference_consistency());
    }

    #[test]
    fn test_two_relations_one_inconsistent() {
        let s = stamped_window(&[&[(0, 2), (1, 2)], &[(0, 2), (1, 3)], &[(0, 2), (1, 2)]]);
        assert!(!s.has_reference_consistency());
    }

    #[test]
    fn test_relations_at_different_versions() {
        let s = stamped_window(&[&[(0, 2), (1, 5)], &[(0, 2), (1, 5)], &[(0, 2), (1, 5)]]);
        assert!(s.has_reference_consistency());
    }

    #[test]
    fn test_unstamped_tuples_are_ignored() {
        let s = stamped_window(&[&[(0, 4)], &[], &[(0, 4), (1, 1)]]);
        assert!(s.has_reference_consistency());
    }
}
