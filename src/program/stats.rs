//! Typing statistics

use std::time::Duration;

/// Characters per "word" in the standard wpm measure
const CHARS_PER_WORD: f64 = 5.0;

/// Outcome of a finished typing test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub elapsed: Duration,
    /// Characters of correctly typed words, spaces included
    pub correct_chars: usize,
    /// Every character typed, spaces included
    pub typed_chars: usize,
    pub keystrokes: usize,
    pub correct_keystrokes: usize,
}

impl TestResult {
    fn per_minute(&self, chars: usize) -> f64 {
        let minutes = self.elapsed.as_secs_f64() / 60.0;
        if minutes <= 0.0 {
            return 0.0;
        }
        chars as f64 / CHARS_PER_WORD / minutes
    }

    /// Net words per minute, counting only correct words
    pub fn wpm(&self) -> f64 {
        self.per_minute(self.correct_chars)
    }

    /// Gross words per minute, counting everything typed
    pub fn raw_wpm(&self) -> f64 {
        self.per_minute(self.typed_chars)
    }

    /// Share of keystrokes that were correct, in percent
    pub fn accuracy(&self) -> f64 {
        if self.keystrokes == 0 {
            return 0.0;
        }
        self.correct_keystrokes as f64 * 100.0 / self.keystrokes as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wpm() {
        let result = TestResult {
            elapsed: Duration::from_secs(30),
            correct_chars: 150,
            typed_chars: 200,
            keystrokes: 210,
            correct_keystrokes: 189,
        };
        assert!((result.wpm() - 60.0).abs() < f64::EPSILON);
        assert!((result.raw_wpm() - 80.0).abs() < f64::EPSILON);
        assert!((result.accuracy() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_elapsed() {
        let result = TestResult {
            elapsed: Duration::ZERO,
            correct_chars: 10,
            typed_chars: 10,
            keystrokes: 0,
            correct_keystrokes: 0,
        };
        assert_eq!(result.wpm(), 0.0);
        assert_eq!(result.accuracy(), 0.0);
    }
}
