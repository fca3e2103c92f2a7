//! Screen and keyboard contracts, plus the text screen and keyboards used by
//! the command line front end and the tests.

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::basic_dialect::{PRINT_ZONE_WIDTH, SCREEN_WIDTH};
use crate::basic_types::{BasicError, LineNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorHint {
    /// Always end the current row.
    NewLine,
    /// End the current row unless the cursor is already at its start.
    LineStart,
    /// Advance to the next print zone.
    NextZone,
    /// Move to a 1-based column, starting a new row if it lies behind.
    Tab(usize),
}

/// Where PRINT output and reports go.
pub trait OutputSink {
    fn append(&mut self, text: &str);
    fn clear(&mut self);
    fn place_cursor(&mut self, hint: CursorHint);

    // Graphics hooks. A plain text screen ignores them.
    fn set_screen_color(&mut self, _color: u8) {}
    fn set_character_color(&mut self, _set: u8, _foreground: u8, _background: u8) {}
    fn define_character(&mut self, _code: u32, _pattern: &str) {}
    fn place_character(&mut self, _row: usize, _column: usize, _code: u32) {}
    fn character_at(&self, _row: usize, _column: usize) -> Option<u32> {
        None
    }
    fn play_sound(&mut self, _duration: i32, _tones: &[(f64, u8)]) {}
}

/// What the machine knows when it asks for input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputContext {
    /// Requests made since the run started.
    pub call_count: usize,
    pub line: Option<LineNumber>,
    /// Requests made on this line since the run started.
    pub line_call_count: usize,
    /// Responses to this request that could not be used.
    pub unaccepted_count: usize,
}

pub trait InputProvider {
    /// One line of typed input. Returning `Breakpoint` aborts the request.
    fn provide_input(&mut self, ctx: &InputContext) -> Result<String, BasicError>;

    /// Key held down right now, for CALL KEY.
    fn currently_pressed_key_code(&mut self, _ctx: &InputContext) -> Option<i32> {
        None
    }

    /// Stick position (x, y), each -4, 0 or 4.
    fn joystick(&mut self, _unit: u8) -> (i32, i32) {
        (0, 0)
    }
}

/// Cursor bookkeeping shared by the screens: zones, TAB and wrapping.
#[derive(Debug, Default, Clone)]
struct ScreenLayout {
    column: usize,
}

impl ScreenLayout {
    fn newline(&mut self, out: &mut String) {
        out.push('\n');
        self.column = 0;
    }

    fn spaces(&mut self, count: usize, out: &mut String) {
        out.extend(std::iter::repeat(' ').take(count));
        self.column += count;
    }

    /// Text that does not fit on a partly used row starts a new one. Trailing
    /// blanks don't count toward the fit.
    fn text(&mut self, text: &str, out: &mut String) {
        let visible = text.trim_end_matches(' ').chars().count();
        if self.column > 0 && self.column + visible > SCREEN_WIDTH {
            self.newline(out);
        }
        for c in text.chars() {
            if c == '\n' {
                self.newline(out);
                continue;
            }
            if self.column >= SCREEN_WIDTH {
                if c == ' ' {
                    continue;
                }
                self.newline(out);
            }
            out.push(c);
            self.column += 1;
        }
    }

    fn hint(&mut self, hint: CursorHint, out: &mut String) {
        match hint {
            CursorHint::NewLine => self.newline(out),
            CursorHint::LineStart => {
                if self.column > 0 {
                    self.newline(out);
                }
            }
            CursorHint::NextZone => {
                let target = (self.column / PRINT_ZONE_WIDTH + 1) * PRINT_ZONE_WIDTH;
                if target >= SCREEN_WIDTH {
                    self.newline(out);
                } else {
                    self.spaces(target - self.column, out);
                }
            }
            CursorHint::Tab(column) => {
                let target = (column.max(1) - 1) % SCREEN_WIDTH;
                if target < self.column {
                    self.newline(out);
                }
                self.spaces(target - self.column, out);
            }
        }
    }
}

/// In-memory 28-column screen that keeps everything printed.
#[derive(Debug, Default, Clone)]
pub struct TextScreen {
    layout: ScreenLayout,
    transcript: String,
}

impl TextScreen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything printed so far, with trailing blanks cut from each row.
    pub fn transcript(&self) -> String {
        self.transcript
            .split('\n')
            .map(|row| row.trim_end())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl OutputSink for TextScreen {
    fn append(&mut self, text: &str) {
        let mut out = String::new();
        self.layout.text(text, &mut out);
        self.transcript.push_str(&out);
    }

    fn clear(&mut self) {
        *self = TextScreen::new();
    }

    fn place_cursor(&mut self, hint: CursorHint) {
        let mut out = String::new();
        self.layout.hint(hint, &mut out);
        self.transcript.push_str(&out);
    }
}

/// Screen that streams to a writer, for the command line.
pub struct WriterScreen<W: Write> {
    layout: ScreenLayout,
    writer: W,
}

impl<W: Write> WriterScreen<W> {
    pub fn new(writer: W) -> Self {
        WriterScreen { layout: ScreenLayout::default(), writer }
    }

    fn emit(&mut self, out: &str) {
        // Nothing sensible to do if the terminal has gone away.
        if self.writer.write_all(out.as_bytes()).is_ok() {
            let _ = self.writer.flush();
        }
    }
}

impl<W: Write> OutputSink for WriterScreen<W> {
    fn append(&mut self, text: &str) {
        let mut out = String::new();
        self.layout.text(text, &mut out);
        self.emit(&out);
    }

    fn clear(&mut self) {
        if self.layout.column > 0 {
            self.emit("\n");
        }
        self.layout = ScreenLayout::default();
    }

    fn place_cursor(&mut self, hint: CursorHint) {
        let mut out = String::new();
        self.layout.hint(hint, &mut out);
        self.emit(&out);
    }
}

/// Replays canned responses; aborts with a breakpoint once they run out.
#[derive(Debug, Default, Clone)]
pub struct ScriptedKeyboard {
    responses: VecDeque<String>,
    keys: VecDeque<i32>,
    requests: Vec<InputContext>,
}

impl ScriptedKeyboard {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedKeyboard {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_keys(mut self, keys: &[i32]) -> Self {
        self.keys = keys.iter().copied().collect();
        self
    }

    pub fn push(&mut self, response: &str) {
        self.responses.push_back(response.to_string());
    }

    /// Every request made so far.
    pub fn requests(&self) -> &[InputContext] {
        &self.requests
    }
}

impl InputProvider for ScriptedKeyboard {
    fn provide_input(&mut self, ctx: &InputContext) -> Result<String, BasicError> {
        self.requests.push(ctx.clone());
        self.responses.pop_front().ok_or(BasicError::Breakpoint)
    }

    fn currently_pressed_key_code(&mut self, _ctx: &InputContext) -> Option<i32> {
        self.keys.pop_front()
    }
}

/// Reads responses line by line, e.g. from stdin. End of input aborts.
pub struct LineKeyboard<R: BufRead> {
    reader: R,
}

impl<R: BufRead> LineKeyboard<R> {
    pub fn new(reader: R) -> Self {
        LineKeyboard { reader }
    }
}

impl<R: BufRead> InputProvider for LineKeyboard<R> {
    fn provide_input(&mut self, _ctx: &InputContext) -> Result<String, BasicError> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) | Err(_) => Err(BasicError::Breakpoint),
            Ok(_) => Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_zones() {
        let mut screen = TextScreen::new();
        screen.append("A");
        screen.place_cursor(CursorHint::NextZone);
        screen.append("B");
        screen.place_cursor(CursorHint::NextZone);
        screen.append("C");
        assert_eq!(screen.transcript(), "A             B\nC");
    }

    #[test]
    fn test_wrap_before_item_that_does_not_fit() {
        let mut screen = TextScreen::new();
        screen.append(&"X".repeat(20));
        screen.append(" 12345678 ");
        // Trailing blank ignored: 20 + 9 = 29 still too wide
        assert_eq!(screen.transcript(), format!("{}\n 12345678", "X".repeat(20)));
    }

    #[test]
    fn test_long_text_wraps() {
        let mut screen = TextScreen::new();
        screen.append(&"Y".repeat(30));
        assert_eq!(screen.transcript(), format!("{}\nYY", "Y".repeat(28)));
    }

    #[test]
    fn test_tab() {
        let mut screen = TextScreen::new();
        screen.place_cursor(CursorHint::Tab(5));
        screen.append("X");
        screen.place_cursor(CursorHint::Tab(2));
        screen.append("Y");
        assert_eq!(screen.transcript(), "    X\n Y");
    }

    #[test]
    fn test_line_start() {
        let mut screen = TextScreen::new();
        screen.place_cursor(CursorHint::LineStart);
        screen.append("A");
        screen.place_cursor(CursorHint::LineStart);
        screen.place_cursor(CursorHint::LineStart);
        screen.append("B");
        assert_eq!(screen.transcript(), "A\nB");
    }

    #[test]
    fn test_scripted_keyboard() {
        let mut keyboard = ScriptedKeyboard::new(["12"]);
        let ctx = InputContext { call_count: 1, line: Some(100), ..Default::default() };
        assert_eq!(keyboard.provide_input(&ctx), Ok("12".to_string()));
        assert_eq!(keyboard.provide_input(&ctx), Err(BasicError::Breakpoint));
        assert_eq!(keyboard.requests().len(), 2);
    }

    #[test]
    fn test_line_keyboard() {
        let mut keyboard = LineKeyboard::new("YES\r\nNO\n".as_bytes());
        let ctx = InputContext::default();
        assert_eq!(keyboard.provide_input(&ctx), Ok("YES".to_string()));
        assert_eq!(keyboard.provide_input(&ctx), Ok("NO".to_string()));
        assert_eq!(keyboard.provide_input(&ctx), Err(BasicError::Breakpoint));
    }
}
