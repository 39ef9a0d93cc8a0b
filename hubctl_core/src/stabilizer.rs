//! Temporal majority-vote filter over color index readings.

use std::collections::VecDeque;

use crate::codec::decode::NO_COLOR;

pub const DEFAULT_CAPACITY: usize = 5;
pub const DEFAULT_THRESHOLD: usize = 3;

/// Bounded window of recent color indices and the last stable emission.
#[derive(Debug, Clone)]
pub struct ColorStabilizer {
    history: VecDeque<u8>,
    capacity: usize,
    threshold: usize,
    last_stable: Option<u8>,
}

impl Default for ColorStabilizer {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_CAPACITY)
    }
}

impl ColorStabilizer {
    /// `capacity` is clamped to at least 1 and `threshold` to `1..=capacity`.
    pub fn new(threshold: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            threshold: threshold.clamp(1, capacity),
            last_stable: None,
        }
    }

    /// Feed one raw reading. Returns the newly stable color, if one emerged.
    ///
    /// The no-color sentinel is discarded before it reaches the window.
    pub fn observe(&mut self, raw: u8) -> Option<u8> {
        if raw == NO_COLOR {
            return None;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(raw);

        let (mode, count) = self.mode()?;
        if count >= self.threshold && self.last_stable != Some(mode) {
            tracing::debug!(color = mode, count, window = self.history.len(), "stable color");
            self.last_stable = Some(mode);
            return Some(mode);
        }
        None
    }

    /// Most frequent value in the window.
    ///
    /// On a tied count the last stable color keeps its place if it is one of
    /// the tied values; otherwise the value whose count reached the top first
    /// while scanning oldest to newest wins.
    fn mode(&self) -> Option<(u8, usize)> {
        let mut counts = [0usize; 256];
        for &v in &self.history {
            counts[usize::from(v)] += 1;
        }
        let top = counts.iter().copied().max().filter(|&c| c > 0)?;
        if let Some(stable) = self.last_stable.filter(|&c| counts[usize::from(c)] == top) {
            return Some((stable, top));
        }
        let mut running = [0usize; 256];
        self.history.iter().find_map(|&v| {
            let slot = &mut running[usize::from(v)];
            *slot += 1;
            (*slot == top).then_some((v, top))
        })
    }

    /// Change sensitivity. Clears the window and forgets the last stable color.
    pub fn reconfigure(&mut self, threshold: usize, capacity: usize) {
        *self = Self::new(threshold, capacity);
    }

    /// Forget everything, keeping the current sensitivity.
    pub fn clear(&mut self) {
        self.history.clear();
        self.last_stable = None;
    }

    pub fn last_stable(&self) -> Option<u8> {
        self.last_stable
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn feed(s: &mut ColorStabilizer, seq: &[u8]) -> Vec<Option<u8>> {
        seq.iter().map(|&v| s.observe(v)).collect()
    }

    #[test]
    fn emits_once_on_third_occurrence() {
        let mut s = ColorStabilizer::default();
        let out = feed(&mut s, &[1, 1, 2, 1, 1]);
        assert_eq!(out, vec![None, None, None, Some(1), None]);
    }

    #[test]
    fn no_color_readings_never_enter_the_window() {
        let mut s = ColorStabilizer::default();
        let out = feed(&mut s, &[3, NO_COLOR, 3, NO_COLOR, NO_COLOR, 3]);
        assert_eq!(out.last().copied().flatten(), Some(3));
    }

    #[test]
    fn switches_once_new_color_dominates() {
        let mut s = ColorStabilizer::default();
        feed(&mut s, &[4, 4, 4]);
        let out = feed(&mut s, &[9, 9, 9]);
        assert_eq!(out, vec![None, None, Some(9)]);
        assert_eq!(s.last_stable(), Some(9));
    }

    #[rstest]
    #[case(2, 5, &[7, 7], Some(7))]
    #[case(5, 5, &[7, 7, 7, 7], None)]
    #[case(1, 1, &[2], Some(2))]
    fn threshold_controls_latency(
        #[case] threshold: usize,
        #[case] capacity: usize,
        #[case] seq: &[u8],
        #[case] last: Option<u8>,
    ) {
        let mut s = ColorStabilizer::new(threshold, capacity);
        let out = feed(&mut s, seq);
        assert_eq!(out.last().copied().flatten(), last);
    }

    #[test]
    fn reconfigure_resets_last_stable() {
        let mut s = ColorStabilizer::default();
        feed(&mut s, &[5, 5, 5]);
        s.reconfigure(2, 4);
        assert_eq!(s.last_stable(), None);
        assert_eq!(feed(&mut s, &[5, 5]), vec![None, Some(5)]);
    }

    #[test]
    fn tie_keeps_the_current_stable_color() {
        let mut s = ColorStabilizer::new(2, 4);
        assert_eq!(feed(&mut s, &[1, 2, 2, 1]), vec![None, None, Some(2), None]);
        assert_eq!(s.last_stable(), Some(2));
    }

    #[test]
    fn alternating_colors_settle_once() {
        let mut s = ColorStabilizer::new(2, 4);
        let out = feed(&mut s, &[1, 2, 1, 2, 1, 2, 1, 2, 1, 2]);
        let emitted: Vec<u8> = out.into_iter().flatten().collect();
        assert_eq!(emitted, vec![1]);
    }

    #[test]
    fn tie_without_stable_color_goes_to_first_to_reach_count() {
        let mut s = ColorStabilizer::new(2, 4);
        assert_eq!(
            feed(&mut s, &[5, 5, 3, 4, 4, 3]),
            vec![None, Some(5), None, None, None, Some(4)]
        );
    }

    #[test]
    fn clear_forgets_window_and_stable_color() {
        let mut s = ColorStabilizer::default();
        feed(&mut s, &[6, 6, 6]);
        s.clear();
        assert_eq!(s.last_stable(), None);
        assert_eq!(s.threshold(), DEFAULT_THRESHOLD);
        assert_eq!(feed(&mut s, &[6, 6, 6]), vec![None, None, Some(6)]);
    }
}
