use std::collections::VecDeque;

/// Bounded FIFO of the most recent chart samples.
#[derive(Debug, Clone)]
pub struct TimeSeriesWindow<T> {
    samples: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> TimeSeriesWindow<T> {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Builds a window from previously recorded samples, keeping the newest.
    pub fn with_samples(capacity: usize, samples: impl IntoIterator<Item = T>) -> Self {
        let mut window = Self::new(capacity);
        for sample in samples {
            window.append(sample);
        }
        window
    }

    pub fn append(&mut self, sample: T) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.samples.iter().cloned().collect()
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
}
