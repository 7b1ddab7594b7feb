//! Typewriter intro shown once before the rain starts.

use tracing::debug;

use crate::cell::{ActiveCell, GlyphChoice};
use crate::config::IntroConfig;
use crate::units::{ColumnIndex, RowIndex, ViewUnits};

const MARGIN_COLUMNS: i32 = 2;
const MARGIN_ROWS: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntroState {
    Typing,
    LineBreak,
    Done,
}

pub struct TerminalIntro {
    lines: Vec<Vec<char>>,
    line: usize,
    revealed: usize,
    timer: f32,
    state: IntroState,
    char_delay: f32,
    line_delay: f32,
    line_break: f32,
    cell_size: ViewUnits,
    color: [f32; 4],
}

impl TerminalIntro {
    pub fn new(config: &IntroConfig) -> Self {
        let lines = config
            .lines
            .iter()
            .map(|line| line.chars().collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let state = if config.enabled && !lines.is_empty() {
            IntroState::Typing
        } else {
            IntroState::Done
        };
        let [r, g, b] = config.color;
        Self {
            lines,
            line: 0,
            revealed: 0,
            timer: config.char_delay_secs,
            state,
            char_delay: config.char_delay_secs,
            line_delay: config.line_delay_secs,
            line_break: config.line_break_secs,
            cell_size: ViewUnits(config.cell_size),
            color: [r, g, b, 1.0],
        }
    }

    pub fn state(&self) -> IntroState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == IntroState::Done
    }

    /// Index of the line being typed and how many of its characters are visible.
    pub fn cursor(&self) -> (usize, usize) {
        (self.line, self.revealed)
    }

    /// Advance the countdown, taking as many transitions as `dt` covers.
    pub fn update(&mut self, dt: f32) -> IntroState {
        if self.state == IntroState::Done {
            return self.state;
        }
        self.timer -= dt;
        while self.timer <= 0.0 && self.state != IntroState::Done {
            self.step();
        }
        self.state
    }

    fn step(&mut self) {
        match self.state {
            IntroState::Typing => {
                let len = self.lines[self.line].len();
                if self.revealed < len {
                    self.revealed += 1;
                    self.timer += if self.revealed == len {
                        self.line_delay
                    } else {
                        self.char_delay
                    };
                } else if self.line + 1 == self.lines.len() {
                    debug!("intro finished");
                    self.state = IntroState::Done;
                } else {
                    self.state = IntroState::LineBreak;
                    self.timer += self.line_break;
                }
            }
            IntroState::LineBreak => {
                self.line += 1;
                self.revealed = 0;
                self.state = IntroState::Typing;
                self.timer += self.char_delay;
            }
            IntroState::Done => {}
        }
    }

    /// Append the visible text as cells. Lower-case letters are shown in upper case
    /// so the rain character set covers them.
    pub fn collect_cells(&self, out: &mut Vec<ActiveCell>) {
        if self.state == IntroState::Done {
            return;
        }
        for (line_index, line) in self.lines.iter().enumerate().take(self.line + 1) {
            let visible = if line_index == self.line {
                self.revealed
            } else {
                line.len()
            };
            for (column, ch) in line.iter().take(visible).enumerate() {
                if ch.is_whitespace() {
                    continue;
                }
                out.push(ActiveCell {
                    column: ColumnIndex(MARGIN_COLUMNS + column as i32),
                    row: RowIndex(MARGIN_ROWS + line_index as i32),
                    size: self.cell_size,
                    color: self.color,
                    glyph: GlyphChoice::Char(ch.to_ascii_uppercase()),
                });
            }
        }
    }
}
