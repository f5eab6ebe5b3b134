//! The typing test program.
//!
//! One `Program` runs per session. It owns all of its state, including its
//! random number generator, so two sessions never share anything.
//!
//! - **menu**: main menu selections
//! - **typing**: a running test (timer or word count)
//! - **stats**: wpm / accuracy computation
//! - **words**: embedded word list
//!
//! # Screens
//!
//! ```text
//! Menu ──Enter──▶ Test ──finished──▶ Results
//!  ▲               │                   │
//!  └──────Esc──────┴────Enter/Esc──────┘
//! ```

pub mod menu;
pub mod stats;
pub mod typing;
pub mod words;

use std::time::Instant;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use rand::rngs::StdRng;
use rand::SeedableRng;
use ratatui::Frame;

use crate::core::context::RenderingContext;
use crate::ui::render;

pub use menu::{MainMenu, MenuItem};
pub use stats::TestResult;
pub use typing::{TestKind, TypingTest};

/// How the program should be attached to its terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub alt_screen: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { alt_screen: true }
    }
}

/// Initial state a program is seeded with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Start {
    /// Top-level menu, no timer running
    #[default]
    Menu,
    /// Straight into a timer test; the program quits once it is done
    Timer,
}

/// Message fed to the program's update loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Msg {
    Key(KeyEvent),
    Tick,
}

/// Screen currently shown
#[derive(Debug, Clone)]
pub enum Screen {
    Menu,
    Test(TypingTest),
    Results { kind: TestKind, result: TestResult },
}

/// A single session's typing test program
#[derive(Debug)]
pub struct Program {
    context: RenderingContext,
    menu: MainMenu,
    screen: Screen,
    rng: StdRng,
    jump_to_timer: bool,
    quit: bool,
    last_wpm: Option<f64>,
}

/// Build a fresh program in its initial menu state
pub fn build(context: RenderingContext) -> (Program, RunOptions) {
    build_with(context, Start::Menu)
}

/// Build a fresh program seeded with the given start state
pub fn build_with(context: RenderingContext, start: Start) -> (Program, RunOptions) {
    (Program::new(context, start, StdRng::from_os_rng()), RunOptions::default())
}

impl Program {
    pub fn new(context: RenderingContext, start: Start, mut rng: StdRng) -> Self {
        let menu = MainMenu::new();
        let (screen, jump_to_timer) = match start {
            Start::Menu => (Screen::Menu, false),
            Start::Timer => {
                let test = TypingTest::new(TestKind::Timer(menu.duration()), &mut rng);
                (Screen::Test(test), true)
            }
        };

        Self {
            context,
            menu,
            screen,
            rng,
            jump_to_timer,
            quit: false,
            last_wpm: None,
        }
    }

    pub fn context(&self) -> &RenderingContext {
        &self.context
    }

    pub fn menu(&self) -> &MainMenu {
        &self.menu
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Whether the program asked to quit
    pub fn is_finished(&self) -> bool {
        self.quit
    }

    /// Net wpm of the most recently finished test
    pub fn last_wpm(&self) -> Option<f64> {
        self.last_wpm
    }

    pub fn update(&mut self, msg: Msg, now: Instant) {
        match msg {
            Msg::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key, now),
            Msg::Key(_) => {}
            Msg::Tick => {
                if let Screen::Test(test) = &mut self.screen {
                    test.tick(now);
                }
            }
        }
        self.finish_test(now);
    }

    pub fn render(&self, frame: &mut Frame, now: Instant) {
        render::draw(self, frame, now);
    }

    fn handle_key(&mut self, key: KeyEvent, now: Instant) {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            self.quit = true;
            return;
        }

        if let Screen::Menu = self.screen {
            self.handle_menu_key(key);
            return;
        }

        match &mut self.screen {
            Screen::Menu => {}
            Screen::Test(test) => match key.code {
                KeyCode::Esc => {
                    if self.jump_to_timer {
                        self.quit = true;
                    } else {
                        self.screen = Screen::Menu;
                    }
                }
                KeyCode::Backspace => test.backspace(),
                KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                    test.type_char(ch, now, &mut self.rng);
                }
                _ => {}
            },
            Screen::Results { kind, .. } => match key.code {
                KeyCode::Char('q') => self.quit = true,
                KeyCode::Char('r') => {
                    let kind = *kind;
                    self.screen = Screen::Test(TypingTest::new(kind, &mut self.rng));
                }
                KeyCode::Enter | KeyCode::Esc => self.screen = Screen::Menu,
                _ => {}
            },
        }
    }

    fn handle_menu_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.menu.up(),
            KeyCode::Down | KeyCode::Char('j') | KeyCode::Tab => self.menu.down(),
            KeyCode::Left | KeyCode::Char('h') => self.menu.cycle(false),
            KeyCode::Right | KeyCode::Char('l') => self.menu.cycle(true),
            KeyCode::Esc | KeyCode::Char('q') => self.quit = true,
            KeyCode::Enter => {
                let item = self.menu.selected();
                match self.menu.test_for(item) {
                    Some(kind) => {
                        self.screen = Screen::Test(TypingTest::new(kind, &mut self.rng));
                    }
                    None => self.quit = true,
                }
            }
            _ => {}
        }
    }

    /// Move a finished test to the results screen
    fn finish_test(&mut self, now: Instant) {
        let Screen::Test(test) = &self.screen else {
            return;
        };
        if !test.is_finished() {
            return;
        }

        let kind = test.kind();
        let result = test.result(now);
        self.last_wpm = Some(result.wpm());
        tracing::debug!(wpm = result.wpm(), accuracy = result.accuracy(), "test finished");

        if self.jump_to_timer {
            self.quit = true;
        }
        self.screen = Screen::Results { kind, result };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn press(code: KeyCode) -> Msg {
        Msg::Key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn program(start: Start) -> Program {
        Program::new(RenderingContext::remote(80, 24), start, StdRng::seed_from_u64(42))
    }

    #[test]
    fn test_build_starts_at_menu() {
        let context = RenderingContext::remote(80, 24);
        let (program, options) = build(context);
        assert!(options.alt_screen);
        assert!(matches!(program.screen(), Screen::Menu));
        assert_eq!(*program.context(), context);
        assert_eq!(program.menu(), &MainMenu::new());
        assert!(!program.is_finished());
        assert_eq!(program.last_wpm(), None);
    }

    #[test]
    fn test_programs_are_isolated() {
        let context = RenderingContext::remote(80, 24);
        let (mut a, _) = build(context);
        let (b, _) = build(context);
        let now = Instant::now();

        a.update(press(KeyCode::Down), now);
        a.update(press(KeyCode::Right), now);
        a.update(press(KeyCode::Enter), now);
        a.update(press(KeyCode::Char('x')), now);

        assert!(matches!(a.screen(), Screen::Test(_)));
        assert!(matches!(b.screen(), Screen::Menu));
        assert_eq!(b.menu(), &MainMenu::new());
        assert_ne!(a.menu(), b.menu());
    }

    #[test]
    fn test_quit_from_menu() {
        let mut p = program(Start::Menu);
        p.update(press(KeyCode::Up), Instant::now());
        assert_eq!(p.menu().selected(), MenuItem::Quit);
        p.update(press(KeyCode::Enter), Instant::now());
        assert!(p.is_finished());

        let mut p = program(Start::Menu);
        p.update(
            Msg::Key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Instant::now(),
        );
        assert!(p.is_finished());
    }

    #[test]
    fn test_timer_run_flow() {
        let now = Instant::now();
        let mut p = program(Start::Menu);
        p.update(press(KeyCode::Enter), now);
        let first = match p.screen() {
            Screen::Test(test) => test.words()[0].clone(),
            other => panic!("expected test screen, got {:?}", other),
        };
        for ch in first.chars() {
            p.update(press(KeyCode::Char(ch)), now);
        }
        p.update(press(KeyCode::Char(' ')), now);
        p.update(Msg::Tick, now + Duration::from_secs(30));

        match p.screen() {
            Screen::Results { kind, result } => {
                assert_eq!(*kind, TestKind::Timer(Duration::from_secs(30)));
                assert_eq!(result.correct_chars, first.len() + 1);
            }
            other => panic!("expected results, got {:?}", other),
        }
        assert!(!p.is_finished());
        assert!(p.last_wpm().is_some());

        p.update(press(KeyCode::Char('r')), now);
        assert!(matches!(p.screen(), Screen::Test(t) if !t.is_started()));
        p.update(press(KeyCode::Esc), now);
        assert!(matches!(p.screen(), Screen::Menu));
    }

    #[test]
    fn test_jump_to_timer_quits_after_results() {
        let now = Instant::now();
        let mut p = program(Start::Timer);
        assert!(matches!(p.screen(), Screen::Test(_)));

        p.update(press(KeyCode::Char('a')), now);
        p.update(Msg::Tick, now + Duration::from_secs(31));
        assert!(p.is_finished());
        assert!(p.last_wpm().is_some());
    }
}
