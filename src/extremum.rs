use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::ensure_same_len;
use crate::utils::{MonotonicQueue, OrderPolicy};
use crate::{StatsError, StatsResult};

/// Shared state of the window extremum trackers
///
/// Candidates enter in timestamp order and leave once an eviction at or after their timestamp
/// is reported. Evictions older than the newest one already applied are rejected.
#[derive(Debug, Clone)]
pub(crate) struct Extremum<O> {
    queue: MonotonicQueue<f64, O>,
    timestamp: u64,
    last_evicted: Option<u64>,
    name: &'static str,
}

impl<O: OrderPolicy<f64>> Extremum<O> {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            queue: MonotonicQueue::new(),
            timestamp: 0,
            last_evicted: None,
            name,
        }
    }

    pub(crate) fn update_batch(
        &mut self,
        values: &[f64],
        timestamps: &[u64],
        evicted_timestamps: &[u64],
    ) -> StatsResult<()> {
        ensure_same_len("values/timestamps", values.len(), timestamps.len())?;
        if values.iter().any(|v| v.is_nan()) {
            return Err(StatsError::NanValue(self.name));
        }
        let evict_through = evicted_timestamps.iter().copied().max();
        if let Some(evicted) = evict_through {
            if let Some(last) = self.last_evicted.filter(|&last| evicted < last) {
                return Err(StatsError::OutOfOrderEviction { evicted, last });
            }
            if self.queue.is_empty() && values.is_empty() {
                return Err(StatsError::EmptyAggregate(self.name));
            }
        }

        let mut points: Vec<(u64, f64)> = timestamps
            .iter()
            .copied()
            .zip(values.iter().copied())
            .collect();
        points.sort_by_key(|&(ts, _)| ts);
        for (ts, value) in points {
            self.queue.push(value, ts);
            self.timestamp = self.timestamp.max(ts);
        }
        if let Some(evicted) = evict_through {
            self.queue.evict_through(evicted);
            self.last_evicted = Some(evicted);
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn value(&self) -> Option<f64> {
        self.queue.front()
    }

    #[inline]
    pub(crate) fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[inline]
    pub(crate) fn candidates(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn reset(&mut self) {
        self.queue.reset();
        self.timestamp = 0;
        self.last_evicted = None;
    }

    /// Field order: timestamp, has last eviction, last eviction, candidate count, then
    /// `(value, timestamp)` per candidate from front to back
    pub(crate) fn encode(&self, enc: &mut Encoder) {
        enc.put_u64(self.timestamp);
        enc.put_bool(self.last_evicted.is_some());
        enc.put_u64(self.last_evicted.unwrap_or_default());
        enc.put_len(self.queue.len());
        for &(value, ts) in self.queue.iter() {
            enc.put_f64(value);
            enc.put_u64(ts);
        }
    }

    pub(crate) fn decode(name: &'static str, dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let timestamp = dec.get_u64()?;
        let has_evicted = dec.get_bool()?;
        let last_evicted = dec.get_u64()?;
        let len = dec.get_len(16)?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push((dec.get_f64()?, dec.get_u64()?));
        }
        Ok(Self {
            queue: MonotonicQueue::from_entries(entries),
            timestamp,
            last_evicted: has_evicted.then_some(last_evicted),
            name,
        })
    }
}
