//! Bounded rolling buffer of raw IMU samples
//!
//! Only filled while a position is being validated locally, and cleared
//! as soon as it has been averaged.

use core_types::ImuSample;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<ImuSample>,
    capacity: usize,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, sample: ImuSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Mean acceleration over the buffered samples, None when empty
    pub fn average(&self) -> Option<[f64; 3]> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sum = [0.0f64; 3];
        for sample in &self.samples {
            for (acc, value) in sum.iter_mut().zip(sample.accel.iter()) {
                *acc += value;
            }
        }
        let n = self.samples.len() as f64;
        Some(sum.map(|s| s / n))
    }

    /// Average and discard
    pub fn drain_average(&mut self) -> Option<[f64; 3]> {
        let avg = self.average();
        self.clear();
        avg
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample(accel: [f64; 3]) -> ImuSample {
        ImuSample::from_accel(accel, 0)
    }

    #[test]
    fn test_empty_window_has_no_average() {
        let window = SampleWindow::new(5);
        assert!(window.is_empty());
        assert_eq!(window.average(), None);
    }

    #[test]
    fn test_average() {
        let mut window = SampleWindow::new(5);
        window.push(sample([1.0, 0.0, -9.0]));
        window.push(sample([-1.0, 2.0, -11.0]));
        assert_eq!(window.average(), Some([0.0, 1.0, -10.0]));
    }

    #[test]
    fn test_bounded_eviction() {
        let mut window = SampleWindow::new(3);
        for i in 0..10 {
            window.push(sample([f64::from(i), 0.0, 0.0]));
        }
        assert_eq!(window.len(), 3);
        // 7, 8, 9 remain
        assert_eq!(window.average().unwrap()[0], 8.0);
    }

    #[test]
    fn test_drain_clears() {
        let mut window = SampleWindow::new(3);
        window.push(sample([0.0, 0.0, -9.8]));
        assert!(window.drain_average().is_some());
        assert!(window.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut window = SampleWindow::new(0);
        window.push(sample([1.0, 1.0, 1.0]));
        window.push(sample([2.0, 2.0, 2.0]));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.average(), Some([2.0, 2.0, 2.0]));
    }
}
