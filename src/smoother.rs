//! Moving-average smoothing
//!
//! Fixed-capacity rolling windows over the per-tick percentages, one per
//! smoothed metric. Oldest samples are evicted first.

use std::collections::VecDeque;

use crate::config::DEFAULT_SMOOTHING_WINDOW;

/// Rolling arithmetic mean over the most recent `capacity` samples
#[derive(Debug, Clone, PartialEq)]
pub struct MovingAverage {
    values: VecDeque<f64>,
    capacity: usize,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

impl MovingAverage {
    /// Create a window holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.values.push_back(value);
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }
    }

    /// Mean of the current window, 0 when empty
    pub fn average(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.values.iter().sum();
        sum / self.values.len() as f64
    }

    pub fn reset(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// One smoother per smoothed metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSmoothers {
    pub eye_contact: MovingAverage,
    pub posture: MovingAverage,
    pub speaking: MovingAverage,
    pub head_tilt: MovingAverage,
    pub engagement: MovingAverage,
    pub confidence: MovingAverage,
}

impl Default for MetricSmoothers {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_WINDOW)
    }
}

impl MetricSmoothers {
    pub fn new(window: usize) -> Self {
        Self {
            eye_contact: MovingAverage::new(window),
            posture: MovingAverage::new(window),
            speaking: MovingAverage::new(window),
            head_tilt: MovingAverage::new(window),
            engagement: MovingAverage::new(window),
            confidence: MovingAverage::new(window),
        }
    }

    pub fn reset(&mut self) {
        self.eye_contact.reset();
        self.posture.reset();
        self.speaking.reset();
        self.head_tilt.reset();
        self.engagement.reset();
        self.confidence.reset();
    }

    pub fn is_empty(&self) -> bool {
        self.eye_contact.is_empty()
            && self.posture.is_empty()
            && self.speaking.is_empty()
            && self.head_tilt.is_empty()
            && self.engagement.is_empty()
            && self.confidence.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_zero() {
        let smoother = MovingAverage::new(10);
        assert_eq!(smoother.average(), 0.0);
        assert!(smoother.is_empty());
    }

    #[test]
    fn test_average_within_capacity() {
        let mut smoother = MovingAverage::new(10);
        for v in [10.0, 20.0, 60.0] {
            smoother.add(v);
        }
        assert!((smoother.average() - 30.0).abs() < 1e-9);
        assert_eq!(smoother.len(), 3);
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut smoother = MovingAverage::new(3);
        for v in [100.0, 0.0, 30.0, 60.0, 90.0] {
            smoother.add(v);
        }
        // Only 30, 60, 90 remain
        assert_eq!(smoother.len(), 3);
        assert!((smoother.average() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_window() {
        let mut smoother = MovingAverage::new(5);
        smoother.add(42.0);
        smoother.reset();
        assert_eq!(smoother.average(), 0.0);

        smoother.reset();
        assert!(smoother.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one_sample() {
        let mut smoother = MovingAverage::new(0);
        smoother.add(1.0);
        smoother.add(7.0);
        assert_eq!(smoother.capacity(), 1);
        assert_eq!(smoother.average(), 7.0);
    }

    #[test]
    fn test_metric_smoothers_reset() {
        let mut smoothers = MetricSmoothers::new(4);
        smoothers.eye_contact.add(50.0);
        smoothers.confidence.add(20.0);
        assert!(!smoothers.is_empty());

        smoothers.reset();
        assert!(smoothers.is_empty());
        assert_eq!(smoothers.eye_contact.capacity(), 4);
    }
}
