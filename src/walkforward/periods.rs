//! Walk-forward origin scheduling.
//!
//! Enumerates the retraining origins of an expanding-window backtest and,
//! for each one, the training and prediction ranges.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("Invalid partition: train_start ({train_start}) > train_end ({train_end})")]
    TrainRange { train_start: i64, train_end: i64 },

    #[error("Invalid partition: test_start ({test_start}) > test_end ({test_end})")]
    TestRange { test_start: i64, test_end: i64 },

    #[error("Invalid partition: train_start ({train_start}) > test_start ({test_start})")]
    TrainAfterTest { train_start: i64, test_start: i64 },

    #[error("Invalid partition: steps must be >= 1, got {0}")]
    Steps(usize),
}

/// Half-open integer time interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Closed interval `[first, last]` as a half-open range.
    pub fn inclusive(first: i64, last: i64) -> Self {
        Self::new(first, last + 1)
    }

    pub fn contains(&self, time_id: i64) -> bool {
        self.start <= time_id && time_id < self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Last period in the range, if any.
    pub fn last(&self) -> Option<i64> {
        (!self.is_empty()).then(|| self.end - 1)
    }
}

/// Train/test month boundaries, both closed intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Partition {
    pub train_start: i64,
    pub train_end: i64,
    pub test_start: i64,
    pub test_end: i64,
}

impl Partition {
    pub fn new(train_start: i64, train_end: i64, test_start: i64, test_end: i64) -> Self {
        Self {
            train_start,
            train_end,
            test_start,
            test_end,
        }
    }

    /// Check the boundary invariants.
    pub fn validate(&self) -> Result<(), PartitionError> {
        if self.train_start > self.train_end {
            return Err(PartitionError::TrainRange {
                train_start: self.train_start,
                train_end: self.train_end,
            });
        }
        if self.test_start > self.test_end {
            return Err(PartitionError::TestRange {
                test_start: self.test_start,
                test_end: self.test_end,
            });
        }
        if self.train_start > self.test_start {
            return Err(PartitionError::TrainAfterTest {
                train_start: self.train_start,
                test_start: self.test_start,
            });
        }
        Ok(())
    }

    pub fn test_range(&self) -> TimeRange {
        TimeRange::inclusive(self.test_start, self.test_end)
    }

    /// Everything from the first training month through the last test month.
    pub fn full_range(&self) -> TimeRange {
        TimeRange::inclusive(self.train_start, self.test_end)
    }
}

/// One retraining origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Position in the schedule (1-indexed).
    pub period_num: usize,
    /// Retraining point. The model sees everything strictly before it.
    pub origin: i64,
    train_start: i64,
    predict_end: i64,
}

impl Window {
    /// Last period the model can see. Horizons are counted from here.
    pub fn anchor(&self) -> i64 {
        self.origin - 1
    }

    /// `[train_start, origin)`.
    pub fn train_range(&self) -> TimeRange {
        TimeRange::new(self.train_start, self.origin)
    }

    /// `[origin, min(origin + steps - 1, test_end)]`.
    pub fn predict_range(&self) -> TimeRange {
        TimeRange::inclusive(self.origin, self.predict_end)
    }

    /// Largest horizon this origin produces. Shrinks near the end of the test range.
    pub fn max_horizon(&self) -> usize {
        self.predict_range().len()
    }
}

/// Origin schedule for one partition.
///
/// Holds no iteration state; every call to [`WindowSchedule::iter`] starts
/// from the first origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSchedule {
    partition: Partition,
    steps: usize,
}

impl WindowSchedule {
    pub fn new(partition: Partition, steps: usize) -> Result<Self, PartitionError> {
        partition.validate()?;
        if steps < 1 {
            return Err(PartitionError::Steps(steps));
        }
        Ok(Self { partition, steps })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// First origin: `test_start - steps + 1`.
    pub fn first_origin(&self) -> i64 {
        self.partition.test_start - self.steps as i64 + 1
    }

    pub fn last_origin(&self) -> i64 {
        self.partition.test_end
    }

    /// Number of origins: `test_end - (test_start - steps + 1) + 1`.
    pub fn len(&self) -> usize {
        (self.last_origin() - self.first_origin() + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> Windows {
        Windows {
            train_start: self.partition.train_start,
            test_end: self.partition.test_end,
            steps: self.steps as i64,
            first: self.first_origin(),
            next: self.first_origin(),
            last: self.last_origin(),
        }
    }
}

impl IntoIterator for &WindowSchedule {
    type Item = Window;
    type IntoIter = Windows;

    fn into_iter(self) -> Windows {
        self.iter()
    }
}

/// Lazy iterator over the origins of a [`WindowSchedule`], ascending.
#[derive(Debug, Clone)]
pub struct Windows {
    train_start: i64,
    test_end: i64,
    steps: i64,
    first: i64,
    next: i64,
    last: i64,
}

impl Iterator for Windows {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.next > self.last {
            return None;
        }
        let origin = self.next;
        self.next += 1;

        Some(Window {
            period_num: (origin - self.first + 1) as usize,
            origin,
            train_start: self.train_start,
            predict_end: (origin + self.steps - 1).min(self.test_end),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last - self.next + 1).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows {}

impl std::iter::FusedIterator for Windows {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_time_range() {
        let range = TimeRange::inclusive(3, 5);
        assert_eq!(range, TimeRange::new(3, 6));
        assert_eq!(range.len(), 3);
        assert!(range.contains(5));
        assert!(!range.contains(6));
        assert_eq!(range.last(), Some(5));

        let empty = TimeRange::new(4, 2);
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.last(), None);
    }

    #[test]
    fn test_partition_validation() {
        assert!(Partition::new(1, 9, 10, 12).validate().is_ok());
        assert!(matches!(
            Partition::new(5, 4, 10, 12).validate(),
            Err(PartitionError::TrainRange { .. })
        ));
        assert!(matches!(
            Partition::new(1, 9, 12, 10).validate(),
            Err(PartitionError::TestRange { .. })
        ));
        assert!(matches!(
            Partition::new(11, 11, 10, 12).validate(),
            Err(PartitionError::TrainAfterTest { .. })
        ));
    }

    #[test]
    fn test_zero_steps_rejected() {
        let err = WindowSchedule::new(Partition::new(1, 9, 10, 12), 0).unwrap_err();
        assert_eq!(err, PartitionError::Steps(0));
    }

    #[test]
    fn test_origins_for_short_test_range() {
        let schedule = WindowSchedule::new(Partition::new(1, 9, 10, 12), 3).unwrap();
        let origins: Vec<i64> = schedule.iter().map(|w| w.origin).collect();
        assert_eq!(origins, vec![8, 9, 10, 11, 12]);
        assert_eq!(schedule.len(), 5);

        let windows: Vec<Window> = schedule.iter().collect();
        assert_eq!(windows[0].train_range(), TimeRange::new(1, 8));
        assert_eq!(windows[0].predict_range(), TimeRange::inclusive(8, 10));
        assert_eq!(windows[0].anchor(), 7);
        assert_eq!(windows[0].period_num, 1);

        // Origin 12 is clipped to [12, 12] because 12 + 3 - 1 > test_end.
        let last = windows[4];
        assert_eq!(last.origin, 12);
        assert_eq!(last.predict_range(), TimeRange::inclusive(12, 12));
        assert_eq!(last.max_horizon(), 1);
        assert_eq!(last.period_num, 5);
    }

    #[test]
    fn test_schedule_is_restartable() {
        let schedule = WindowSchedule::new(Partition::new(1, 9, 10, 12), 2).unwrap();
        let mut first = schedule.iter();
        first.next();
        first.next();

        let again: Vec<i64> = schedule.iter().map(|w| w.origin).collect();
        assert_eq!(again, vec![9, 10, 11, 12]);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn test_origin_before_train_start_still_emitted() {
        let schedule = WindowSchedule::new(Partition::new(5, 5, 6, 7), 4).unwrap();
        let first = schedule.iter().next().unwrap();
        assert_eq!(first.origin, 3);
        assert!(first.train_range().is_empty());
    }

    proptest! {
        #[test]
        fn origin_count_matches_formula(
            train_start in -50i64..50,
            train_len in 0i64..40,
            gap in 0i64..20,
            test_len in 0i64..30,
            steps in 1usize..12,
        ) {
            let test_start = train_start + gap;
            let partition = Partition::new(
                train_start,
                train_start + train_len,
                test_start,
                test_start + test_len,
            );
            let schedule = WindowSchedule::new(partition, steps).unwrap();
            let expected = partition.test_end - (partition.test_start - steps as i64 + 1) + 1;

            prop_assert_eq!(schedule.len() as i64, expected);
            prop_assert_eq!(schedule.iter().count() as i64, expected);

            let mut previous = None;
            for window in schedule.iter() {
                let predict = window.predict_range();
                prop_assert!(!predict.is_empty());
                prop_assert!(predict.end - 1 <= partition.test_end);
                prop_assert!(window.max_horizon() <= steps);
                prop_assert_eq!(window.train_range().end, window.origin);
                if let Some(prev) = previous {
                    prop_assert!(window.origin > prev);
                }
                previous = Some(window.origin);
            }
        }
    }
}
