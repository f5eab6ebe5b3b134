//! Typing test state
//!
//! A test runs either against the clock or against a fixed number of
//! words. The clock starts on the first keystroke.

use std::time::{Duration, Instant};

use rand::Rng;

use super::stats::TestResult;
use super::words::random_words;

/// Words generated up front for a timer test, topped up as the user types
const TIMER_BATCH: usize = 100;

/// Kind of test and its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestKind {
    Timer(Duration),
    Words(usize),
}

/// A running typing test
#[derive(Debug, Clone)]
pub struct TypingTest {
    kind: TestKind,
    words: Vec<String>,
    /// Input per word; the last entry is the word being typed
    typed: Vec<String>,
    started: Option<Instant>,
    finished: Option<Instant>,
    keystrokes: usize,
    correct_keystrokes: usize,
}

impl TypingTest {
    pub fn new<R: Rng + ?Sized>(kind: TestKind, rng: &mut R) -> Self {
        let count = match kind {
            TestKind::Timer(_) => TIMER_BATCH,
            TestKind::Words(n) => n.max(1),
        };
        Self::with_words(kind, random_words(rng, count))
    }

    pub fn with_words(kind: TestKind, words: Vec<String>) -> Self {
        Self {
            kind,
            words,
            typed: vec![String::new()],
            started: None,
            finished: None,
            keystrokes: 0,
            correct_keystrokes: 0,
        }
    }

    pub fn kind(&self) -> TestKind {
        self.kind
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn typed(&self) -> &[String] {
        &self.typed
    }

    /// Index of the word being typed
    pub fn current(&self) -> usize {
        self.typed.len() - 1
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Time left on the clock for timer tests
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        match self.kind {
            TestKind::Timer(limit) => {
                let elapsed = self.started.map(|s| now.saturating_duration_since(s));
                Some(limit.saturating_sub(elapsed.unwrap_or_default()))
            }
            TestKind::Words(_) => None,
        }
    }

    /// Type a character
    pub fn type_char<R: Rng + ?Sized>(&mut self, ch: char, now: Instant, rng: &mut R) {
        if self.is_finished() {
            return;
        }
        let current = self.current();
        if ch == ' ' && self.typed[current].is_empty() {
            // Leading space neither skips a word nor starts the clock
            return;
        }
        self.started.get_or_insert(now);
        self.keystrokes += 1;

        let target = &self.words[current];
        if ch == ' ' {
            if self.typed[current] == *target {
                self.correct_keystrokes += 1;
            }
            self.advance(now, rng);
            return;
        }

        let position = self.typed[current].chars().count();
        if target.chars().nth(position) == Some(ch) {
            self.correct_keystrokes += 1;
        }
        self.typed[current].push(ch);

        // The last word of a word test completes without a trailing space
        if let TestKind::Words(_) = self.kind {
            if current + 1 == self.words.len() && self.typed[current] == *target {
                self.finished = Some(now);
            }
        }
    }

    /// Delete the last character, stepping back into the previous word when empty
    pub fn backspace(&mut self) {
        if self.is_finished() {
            return;
        }
        let current = self.current();
        if self.typed[current].pop().is_none() && current > 0 {
            self.typed.pop();
        }
    }

    /// Advance the clock
    pub fn tick(&mut self, now: Instant) {
        if self.is_finished() {
            return;
        }
        if let (TestKind::Timer(limit), Some(started)) = (self.kind, self.started) {
            if now.saturating_duration_since(started) >= limit {
                self.finished = Some(started + limit);
            }
        }
    }

    fn advance<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) {
        if self.current() + 1 >= self.words.len() {
            match self.kind {
                TestKind::Words(_) => {
                    self.finished = Some(now);
                    return;
                }
                TestKind::Timer(_) => {
                    self.words.extend(random_words(rng, TIMER_BATCH));
                }
            }
        }
        self.typed.push(String::new());
    }

    /// Statistics so far, measured until `now` or until the test finished
    pub fn result(&self, now: Instant) -> TestResult {
        let elapsed = match (self.started, self.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => now.saturating_duration_since(start),
            _ => Duration::ZERO,
        };

        let current = self.current();
        let mut correct_chars = 0;
        let mut typed_chars = 0;

        for (i, input) in self.typed.iter().enumerate() {
            let len = input.chars().count();
            let target = &self.words[i];
            if i < current {
                // Committed word plus its space
                typed_chars += len + 1;
                if input == target {
                    correct_chars += len + 1;
                }
            } else {
                typed_chars += len;
                if target.starts_with(input.as_str()) {
                    correct_chars += len;
                }
            }
        }

        TestResult {
            elapsed,
            correct_chars,
            typed_chars,
            keystrokes: self.keystrokes,
            correct_keystrokes: self.correct_keystrokes,
        }
    }
}
