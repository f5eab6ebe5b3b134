//! Program renderer using ratatui
//!
//! Draws the menu, a running test and the results screen. Every color goes
//! through the session's `RenderingContext` so clients only receive colors
//! their profile can show.

use std::time::Instant;

use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph};
use ratatui::Frame;
use unicode_width::UnicodeWidthStr;

use crate::core::context::RenderingContext;
use crate::program::{MenuItem, Program, Screen, TestKind, TestResult, TypingTest};

const ACCENT: Color = Color::Rgb(255, 175, 95);
const ERROR: Color = Color::Rgb(255, 95, 95);
const DIM: Color = Color::Rgb(108, 108, 108);

/// Width of the content column
const CONTENT_WIDTH: u16 = 64;
/// Word lines shown during a test
const VISIBLE_LINES: usize = 3;

/// Draw the program into the frame
pub fn draw(program: &Program, frame: &mut Frame, now: Instant) {
    let area = frame.size();
    frame.render_widget(Clear, area);

    let ctx = program.context();
    let lines = match program.screen() {
        Screen::Menu => menu_lines(program, ctx),
        Screen::Test(test) => test_lines(test, ctx, now, content_width(area)),
        Screen::Results { kind, result } => results_lines(*kind, result, ctx),
    };

    let height = (lines.len() as u16 + 2).min(area.height);
    let rect = centered(area, CONTENT_WIDTH + 2, height);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(ctx.color(DIM)))
        .title(Span::styled(" typioca ", Style::default().fg(ctx.color(ACCENT))));

    let paragraph = Paragraph::new(lines).block(block).alignment(Alignment::Left);
    frame.render_widget(paragraph, rect);
}

fn content_width(area: Rect) -> usize {
    area.width.saturating_sub(2).min(CONTENT_WIDTH) as usize
}

/// Rectangle of at most `width` x `height` centered in `area`
fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn menu_lines(program: &Program, ctx: &RenderingContext) -> Vec<Line<'static>> {
    let menu = program.menu();
    let fg = Style::default().fg(ctx.fg());
    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled("  cozy typing speed tester", fg)),
        Line::from(""),
    ];

    for item in MenuItem::ALL {
        let selected = menu.selected() == item;
        let style = if selected {
            Style::default().fg(ctx.color(ACCENT)).add_modifier(Modifier::BOLD)
        } else {
            fg
        };
        let marker = if selected { "  ▸ " } else { "    " };
        let mut spans = vec![Span::styled(format!("{}{:<16}", marker, item.label()), style)];
        if let Some(option) = menu.option_label(item) {
            spans.push(Span::styled(
                format!("‹ {} ›", option),
                Style::default().fg(ctx.color(DIM)),
            ));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  ↑/↓ select  ←/→ change  enter start  esc quit",
        Style::default().fg(ctx.color(DIM)),
    )));
    lines
}

fn test_lines(
    test: &TypingTest,
    ctx: &RenderingContext,
    now: Instant,
    width: usize,
) -> Vec<Line<'static>> {
    let header = match test.kind() {
        TestKind::Timer(_) => {
            let remaining = test.remaining(now).unwrap_or_default();
            format!("{}s", remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
        }
        TestKind::Words(total) => format!("{}/{}", test.current(), total),
    };

    let mut lines = vec![
        Line::from(Span::styled(
            format!(" {}", header),
            Style::default().fg(ctx.color(ACCENT)).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];

    let wrapped = wrap_words(test.words(), width.saturating_sub(2).max(1));
    let current = test.current();
    let current_line = wrapped
        .iter()
        .position(|range| range.contains(&current))
        .unwrap_or(0);

    for range in wrapped.iter().skip(current_line).take(VISIBLE_LINES) {
        let mut spans = vec![Span::raw(" ")];
        for i in range.clone() {
            spans.extend(word_spans(test, i, ctx));
            spans.push(Span::raw(" "));
        }
        lines.push(Line::from(spans));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        " esc menu  ctrl+c quit",
        Style::default().fg(ctx.color(DIM)),
    )));
    lines
}

/// Spans for word `index`, colored by what has been typed so far
fn word_spans(test: &TypingTest, index: usize, ctx: &RenderingContext) -> Vec<Span<'static>> {
    let target = &test.words()[index];
    let current = test.current();
    let correct = Style::default().fg(ctx.fg());
    let wrong = Style::default().fg(ctx.color(ERROR));
    let pending = Style::default().fg(ctx.color(DIM));

    let Some(typed) = test.typed().get(index) else {
        return vec![Span::styled(target.clone(), pending)];
    };

    let typed: Vec<char> = typed.chars().collect();
    let mut spans = Vec::new();

    for (pos, ch) in target.chars().enumerate() {
        let style = match typed.get(pos) {
            Some(t) if *t == ch => correct,
            Some(_) => wrong,
            None if index == current && pos == typed.len() => {
                pending.add_modifier(Modifier::UNDERLINED)
            }
            None if index < current => wrong.add_modifier(Modifier::DIM),
            None => pending,
        };
        spans.push(Span::styled(ch.to_string(), style));
    }

    // Overtyped characters
    let extra: String = typed.iter().skip(target.chars().count()).collect();
    if !extra.is_empty() {
        spans.push(Span::styled(extra, wrong.add_modifier(Modifier::CROSSED_OUT)));
    }
    spans
}

/// Greedy word wrap; returns the word index range of each line
fn wrap_words(words: &[String], width: usize) -> Vec<std::ops::Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut used = 0;

    for (i, word) in words.iter().enumerate() {
        let w = word.width() + 1;
        if used > 0 && used + w > width {
            lines.push(start..i);
            start = i;
            used = 0;
        }
        used += w;
    }
    if start < words.len() {
        lines.push(start..words.len());
    }
    lines
}

fn results_lines(
    kind: TestKind,
    result: &TestResult,
    ctx: &RenderingContext,
) -> Vec<Line<'static>> {
    let label = Style::default().fg(ctx.color(DIM));
    let value = Style::default().fg(ctx.color(ACCENT)).add_modifier(Modifier::BOLD);
    let test = match kind {
        TestKind::Timer(d) => format!("timer {}s", d.as_secs()),
        TestKind::Words(n) => format!("{} words", n),
    };

    let row = |name: &str, text: String| {
        Line::from(vec![
            Span::styled(format!("  {:<12}", name), label),
            Span::styled(text, value),
        ])
    };

    vec![
        Line::from(""),
        row("wpm", format!("{:.0}", result.wpm())),
        row("raw", format!("{:.0}", result.raw_wpm())),
        row("accuracy", format!("{:.1}%", result.accuracy())),
        row("time", format!("{:.1}s", result.elapsed.as_secs_f64())),
        row("test", test),
        Line::from(""),
        Line::from(Span::styled("  enter menu  r restart  q quit", label)),
    ]
}
