use std::collections::VecDeque;

use tracing::trace;

use crate::traits::{Persist, StateKind};
use crate::utils::codec::{Decoder, Encoder};
use crate::utils::helper::lerp;
use crate::{StatsError, StatsResult};

/// Interpolation policy of an [`Interpolator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolatorKind {
    /// Latest point at or before the query time, once a later point confirms it is the latest
    Previous,
    /// Latest known point at or before the query time
    Current,
    /// Linear interpolation between the points bracketing the query time
    Linear,
}

impl InterpolatorKind {
    /// Resolves a policy name (`previous`, `current`, `linear`)
    ///
    /// # Returns
    ///
    /// * `StatsResult<Self>` - `UnknownType` for any other name
    pub fn from_name(name: &str) -> StatsResult<Self> {
        match name {
            "previous" => Ok(Self::Previous),
            "current" => Ok(Self::Current),
            "linear" => Ok(Self::Linear),
            _ => Err(StatsError::unknown("interpolator", name)),
        }
    }

    /// Returns the policy name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Previous => "previous",
            Self::Current => "current",
            Self::Linear => "linear",
        }
    }

    const fn tag(self) -> u8 {
        match self {
            Self::Previous => 0,
            Self::Current => 1,
            Self::Linear => 2,
        }
    }

    fn from_tag(tag: u8) -> StatsResult<Self> {
        match tag {
            0 => Ok(Self::Previous),
            1 => Ok(Self::Current),
            2 => Ok(Self::Linear),
            _ => Err(StatsError::Decode(format!("unknown interpolator tag {tag}"))),
        }
    }
}

/// # Buffered Time-Series Interpolator
///
/// Resamples an irregular series at caller-chosen times. Raw points are appended with
/// [`Interpolator::add_point`]; before evaluating at `t` the caller announces the time with
/// [`Interpolator::set_next_interp_time`], which drops every point no query at `t` or later can
/// need. Evaluation times must never go backwards.
#[derive(Debug, Clone)]
pub struct Interpolator {
    kind: InterpolatorKind,
    /// `(timestamp, value)` pairs, oldest first
    buffer: VecDeque<(u64, f64)>,
}

impl Interpolator {
    /// Creates an empty interpolator with the given policy
    pub fn new(kind: InterpolatorKind) -> Self {
        Self {
            kind,
            buffer: VecDeque::new(),
        }
    }

    /// Creates an empty interpolator from a policy name
    pub fn from_name(name: &str) -> StatsResult<Self> {
        InterpolatorKind::from_name(name).map(Self::new)
    }

    /// Returns the interpolation policy
    #[inline]
    pub const fn kind(&self) -> InterpolatorKind {
        self.kind
    }

    /// Returns the number of buffered points
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no point is buffered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Appends a raw point
    ///
    /// Timestamps must increase strictly. Offering the newest point again is accepted and does
    /// not buffer it twice.
    ///
    /// # Arguments
    ///
    /// * `value` - The observed value, not NaN
    /// * `timestamp` - Its timestamp in milliseconds
    ///
    /// # Returns
    ///
    /// * `StatsResult<()>` - `NanValue` or `OutOfOrderPoint` on a rejected point
    pub fn add_point(&mut self, value: f64, timestamp: u64) -> StatsResult<()> {
        if value.is_nan() {
            return Err(StatsError::NanValue("interpolator"));
        }
        match self.buffer.back() {
            Some(&(last, _)) if last < timestamp => {}
            Some(&(last, last_value)) if last == timestamp && last_value == value => return Ok(()),
            Some(&(last, _)) => return Err(StatsError::OutOfOrderPoint { timestamp, last }),
            None => {}
        }
        self.buffer.push_back((timestamp, value));
        Ok(())
    }

    #[inline]
    fn second_timestamp(&self) -> Option<u64> {
        self.buffer.get(1).map(|&(ts, _)| ts)
    }

    /// Drops every point that no query at `time` or later can need
    ///
    /// All policies keep the latest point at or before `time` together with every later point.
    pub fn set_next_interp_time(&mut self, time: u64) {
        let mut dropped = 0;
        while self.second_timestamp().is_some_and(|ts| ts <= time) {
            self.buffer.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            trace!(kind = self.kind.name(), dropped, time, "interpolator buffer trimmed");
        }
    }

    /// Returns true if the buffered points allow evaluating at `time`
    pub fn can_interpolate(&self, time: u64) -> bool {
        let Some(&(first, _)) = self.buffer.front() else {
            return false;
        };
        match self.kind {
            InterpolatorKind::Current => first <= time,
            InterpolatorKind::Previous | InterpolatorKind::Linear => {
                first == time
                    || (first <= time && self.second_timestamp().is_some_and(|ts| time <= ts))
            }
        }
    }

    /// Evaluates the series at `time`
    ///
    /// # Returns
    ///
    /// * `StatsResult<f64>` - The interpolated value, or `CannotInterpolate` when `time` lies
    ///   outside the retained bracket
    pub fn interpolate(&self, time: u64) -> StatsResult<f64> {
        if !self.can_interpolate(time) {
            return Err(StatsError::CannotInterpolate(time));
        }
        let (prev_ts, prev) = self.buffer[0];
        match self.kind {
            InterpolatorKind::Previous | InterpolatorKind::Current => Ok(prev),
            InterpolatorKind::Linear if time == prev_ts => Ok(prev),
            InterpolatorKind::Linear => {
                let (next_ts, next) = self.buffer[1];
                let t = (time - prev_ts) as f64 / (next_ts - prev_ts) as f64;
                Ok(lerp(prev, next, t))
            }
        }
    }

    /// Drops every buffered point
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Persist for Interpolator {
    const KIND: StateKind = StateKind::Interpolator;

    /// Field order: policy tag, point count, `(timestamp, value)` per point
    fn encode(&self, enc: &mut Encoder) {
        enc.put_u8(self.kind.tag());
        enc.put_len(self.buffer.len());
        for &(ts, value) in &self.buffer {
            enc.put_u64(ts);
            enc.put_f64(value);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> StatsResult<Self> {
        let kind = InterpolatorKind::from_tag(dec.get_u8()?)?;
        let len = dec.get_len(16)?;
        let mut buffer = VecDeque::with_capacity(len);
        for _ in 0..len {
            buffer.push_back((dec.get_u64()?, dec.get_f64()?));
        }
        Ok(Self { kind, buffer })
    }
}
