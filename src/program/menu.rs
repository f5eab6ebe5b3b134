//! Main menu state

use std::time::Duration;

use super::typing::TestKind;

/// Timer test durations in seconds
pub const DURATIONS: [u64; 4] = [15, 30, 60, 120];
/// Word test lengths
pub const WORD_COUNTS: [usize; 4] = [10, 25, 50, 100];

/// Menu entries, top to bottom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Timer,
    Words,
    Quit,
}

impl MenuItem {
    pub const ALL: [MenuItem; 3] = [MenuItem::Timer, MenuItem::Words, MenuItem::Quit];

    pub fn label(self) -> &'static str {
        match self {
            MenuItem::Timer => "Timer run",
            MenuItem::Words => "Word count run",
            MenuItem::Quit => "Quit",
        }
    }
}

/// Selection state of the main menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainMenu {
    cursor: usize,
    duration: usize,
    word_count: usize,
}

impl Default for MainMenu {
    fn default() -> Self {
        Self {
            cursor: 0,
            // 30 seconds / 25 words
            duration: 1,
            word_count: 1,
        }
    }
}

impl MainMenu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highlighted entry
    pub fn selected(&self) -> MenuItem {
        MenuItem::ALL[self.cursor]
    }

    pub fn up(&mut self) {
        self.cursor = (self.cursor + MenuItem::ALL.len() - 1) % MenuItem::ALL.len();
    }

    pub fn down(&mut self) {
        self.cursor = (self.cursor + 1) % MenuItem::ALL.len();
    }

    /// Cycle the option of the highlighted entry
    pub fn cycle(&mut self, forward: bool) {
        let step = |i: usize, len: usize| if forward { (i + 1) % len } else { (i + len - 1) % len };
        match self.selected() {
            MenuItem::Timer => self.duration = step(self.duration, DURATIONS.len()),
            MenuItem::Words => self.word_count = step(self.word_count, WORD_COUNTS.len()),
            MenuItem::Quit => {}
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(DURATIONS[self.duration])
    }

    pub fn word_count(&self) -> usize {
        WORD_COUNTS[self.word_count]
    }

    /// Test started by the given entry, if it starts one
    pub fn test_for(&self, item: MenuItem) -> Option<TestKind> {
        match item {
            MenuItem::Timer => Some(TestKind::Timer(self.duration())),
            MenuItem::Words => Some(TestKind::Words(self.word_count())),
            MenuItem::Quit => None,
        }
    }

    /// Option text shown next to an entry
    pub fn option_label(&self, item: MenuItem) -> Option<String> {
        match item {
            MenuItem::Timer => Some(format!("{}s", DURATIONS[self.duration])),
            MenuItem::Words => Some(format!("{} words", WORD_COUNTS[self.word_count])),
            MenuItem::Quit => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_wraps() {
        let mut menu = MainMenu::new();
        assert_eq!(menu.selected(), MenuItem::Timer);
        menu.up();
        assert_eq!(menu.selected(), MenuItem::Quit);
        menu.down();
        menu.down();
        assert_eq!(menu.selected(), MenuItem::Words);
    }

    #[test]
    fn test_cycle_options() {
        let mut menu = MainMenu::new();
        assert_eq!(menu.duration(), Duration::from_secs(30));
        menu.cycle(true);
        assert_eq!(menu.duration(), Duration::from_secs(60));
        menu.cycle(false);
        menu.cycle(false);
        menu.cycle(false);
        assert_eq!(menu.duration(), Duration::from_secs(120));

        menu.down();
        menu.cycle(true);
        assert_eq!(menu.word_count(), 50);
        assert_eq!(menu.test_for(MenuItem::Words), Some(TestKind::Words(50)));
        assert_eq!(menu.test_for(MenuItem::Quit), None);
    }
}
