use core::marker::PhantomData;
use std::collections::VecDeque;

/// Trait for defining order policies for monotonic queue
///
/// # Type Parameters
///
/// * `T` - The type of the elements in the queue
///
/// # Methods
///
/// * `should_remove(existing: &T, new: &T) -> bool` - Returns true if the existing element is
///   dominated by the new one and can never again be the window extremum
///
pub trait OrderPolicy<T> {
    fn should_remove(existing: &T, new: &T) -> bool;
}

/// Order policy for minimum
#[derive(Debug, Clone)]
pub struct Min;

/// Order policy for maximum
#[derive(Debug, Clone)]
pub struct Max;

impl<T: PartialOrd> OrderPolicy<T> for Min {
    #[inline]
    fn should_remove(existing: &T, new: &T) -> bool {
        existing >= new
    }
}

impl<T: PartialOrd> OrderPolicy<T> for Max {
    #[inline]
    fn should_remove(existing: &T, new: &T) -> bool {
        existing <= new
    }
}

// Pair of (value, timestamp)
pub type Entry<T> = (T, u64);

/// Monotonic queue of extremum candidates keyed by timestamp
///
/// Candidates are kept in arrival order; the front is always the extremum of the live window.
/// Unlike a fixed-period queue, expiry is driven from outside by evicting every candidate up to
/// a timestamp.
///
/// # Type Parameters
///
/// * `T` - The type of the elements in the queue
/// * `O` - The order policy for the queue
#[derive(Debug, Clone)]
pub struct MonotonicQueue<T, O> {
    deque: VecDeque<Entry<T>>,
    _order: PhantomData<O>,
}

impl<T, O> MonotonicQueue<T, O>
where
    T: PartialOrd + Copy,
    O: OrderPolicy<T>,
{
    /// Creates a new empty `MonotonicQueue`
    ///
    /// # Returns
    ///
    /// * `Self` - The `MonotonicQueue` instance
    #[inline]
    pub fn new() -> Self {
        Self {
            deque: VecDeque::new(),
            _order: PhantomData,
        }
    }

    /// Rebuilds a queue from candidates previously obtained with [`MonotonicQueue::iter`]
    #[inline]
    pub fn from_entries(entries: impl IntoIterator<Item = Entry<T>>) -> Self {
        Self {
            deque: entries.into_iter().collect(),
            _order: PhantomData,
        }
    }

    /// Maintains monotonic property by removing dominated elements
    #[inline]
    fn maintain_monotonic_property(&mut self, value: T) {
        while let Some(&(existing, _)) = self.deque.back() {
            if O::should_remove(&existing, &value) {
                self.deque.pop_back();
            } else {
                break;
            }
        }
    }

    /// Pushes a new candidate into the queue
    ///
    /// # Arguments
    ///
    /// * `value` - The value to push into the queue
    /// * `timestamp` - The timestamp of the value
    #[inline]
    pub fn push(&mut self, value: T, timestamp: u64) {
        self.maintain_monotonic_property(value);
        self.deque.push_back((value, timestamp));
    }

    /// Removes every candidate from the front whose timestamp is not after `timestamp`
    ///
    /// # Arguments
    ///
    /// * `timestamp` - The newest timestamp that left the window
    ///
    /// # Returns
    ///
    /// * `usize` - The number of candidates removed
    #[inline]
    pub fn evict_through(&mut self, timestamp: u64) -> usize {
        let mut removed = 0;
        while let Some(&(_, ts)) = self.deque.front() {
            if ts <= timestamp {
                self.deque.pop_front();
                removed += 1;
            } else {
                break;
            }
        }
        removed
    }

    /// Returns the front element of the queue
    ///
    /// # Returns
    ///
    /// * `Option<T>` - The front element of the queue, or `None` if the queue is empty
    #[inline]
    pub fn front(&self) -> Option<T> {
        self.deque.front().map(|&(value, _)| value)
    }

    /// Iterates over the candidates from front to back
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.deque.iter()
    }

    /// Returns the number of candidates
    #[inline]
    pub fn len(&self) -> usize {
        self.deque.len()
    }

    /// Resets the queue to its initial state
    ///
    /// # Returns
    ///
    /// * `&mut Self` - The queue object
    #[inline]
    pub fn reset(&mut self) -> &mut Self {
        self.deque.clear();
        self
    }

    /// Returns true if the queue is empty
    ///
    /// # Returns
    ///
    /// * `bool` - True if the queue is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.deque.is_empty()
    }
}

impl<T, O> Default for MonotonicQueue<T, O>
where
    T: PartialOrd + Copy,
    O: OrderPolicy<T>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::all)]
mod tests {
    use super::{Max, Min, MonotonicQueue};

    // Drives a count-based window of `window` elements through timestamp eviction
    fn sliding<O: super::OrderPolicy<i32>>(input: &[i32], window: usize) -> Vec<i32> {
        let mut mq = MonotonicQueue::<i32, O>::new();
        let mut result = vec![];
        for (i, &val) in input.iter().enumerate() {
            mq.push(val, i as u64);
            if i >= window {
                mq.evict_through((i - window) as u64);
            }
            if i + 1 >= window {
                result.push(mq.front().unwrap());
            }
        }
        result
    }

    #[test]
    fn test_monotonic_queue_equal_values_handling() {
        let mut mq = MonotonicQueue::<_, Min>::new();
        mq.push(5, 0);
        mq.push(5, 1);
        mq.push(5, 2);
        assert_eq!(mq.front(), Some(5));
        // equal candidates collapse into the newest one
        assert_eq!(mq.len(), 1);
        assert_eq!(mq.iter().next(), Some(&(5, 2)));

        mq.push(4, 3);
        assert_eq!(mq.front(), Some(4));
    }

    #[test]
    fn test_monotonic_queue_min_sliding_window() {
        let input = [254, 262, 260, 261, 258, 259, 263, 262, 265];
        assert_eq!(
            sliding::<Min>(&input, 3),
            vec![254, 260, 258, 258, 258, 259, 262]
        );
    }

    #[test]
    fn test_monotonic_queue_max_sliding_window() {
        let input = [
            31, 4, 52, 60, 61, 15, 28, 2, 36, 1, 4, 39, 12, 96, 1, 21, 95, 20, 35, 83,
        ];
        assert_eq!(
            sliding::<Max>(&input, 3),
            vec![
                52, 60, 61, 61, 61, 28, 36, 36, 36, 39, 39, 96, 96, 96, 95, 95, 95, 83,
            ]
        );
    }

    #[test]
    fn test_edge_case_window_size_one() {
        let input = [5, 2, 9, 1, 7, 3];
        assert_eq!(sliding::<Min>(&input, 1), input);
        assert_eq!(sliding::<Max>(&input, 1), input);
    }

    #[test]
    fn test_duplicated_values() {
        let input = [3, 3, 3, 3, 2, 2, 2, 4, 4];
        assert_eq!(sliding::<Min>(&input, 3), vec![3, 3, 2, 2, 2, 2, 2]);
        assert_eq!(sliding::<Max>(&input, 3), vec![3, 3, 3, 3, 2, 4, 4]);
    }

    #[test]
    fn test_oscillating_values() {
        let oscillating = [10, 2, 8, 1, 9, 3, 7, 0];
        assert_eq!(sliding::<Min>(&oscillating, 4), vec![1, 1, 1, 1, 0]);
        assert_eq!(sliding::<Max>(&oscillating, 4), vec![10, 9, 9, 9, 9]);
    }

    #[test]
    fn test_evict_through_reports_removed() {
        let mut mq = MonotonicQueue::<_, Max>::new();
        mq.push(9, 10);
        mq.push(7, 20);
        mq.push(5, 30);
        assert_eq!(mq.evict_through(5), 0);
        assert_eq!(mq.evict_through(20), 2);
        assert_eq!(mq.front(), Some(5));
        assert_eq!(mq.evict_through(30), 1);
        assert!(mq.is_empty());
        assert_eq!(mq.front(), None);
    }

    #[test]
    fn test_monotonic_reset() {
        let mut mq = MonotonicQueue::<_, Min>::new();
        mq.push(14, 1);
        mq.push(13, 2);
        mq.reset();
        assert!(mq.is_empty());
        mq.push(10, 3);
        assert_eq!(mq.front(), Some(10));
    }

    #[test]
    fn test_from_entries_round_trip() {
        let mut mq = MonotonicQueue::<_, Min>::new();
        mq.push(3, 1);
        mq.push(5, 2);
        mq.push(4, 3);
        let copy = MonotonicQueue::<_, Min>::from_entries(mq.iter().copied());
        assert_eq!(
            copy.iter().copied().collect::<Vec<_>>(),
            vec![(3, 1), (4, 3)]
        );
    }
}
