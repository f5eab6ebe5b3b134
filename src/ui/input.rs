//! Input decoding for remote terminals
//!
//! Remote clients send raw terminal bytes. `InputDecoder` turns them back
//! into crossterm key events so the program handles local and remote input
//! the same way.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Event delivered to a running program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// A key press
    Key(KeyEvent),
    /// The client terminal was resized
    Resize { width: u16, height: u16 },
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum DecoderState {
    #[default]
    Ground,
    Escape,
    Csi,
    Ss3,
}

/// Byte-fed decoder for keyboard input
#[derive(Debug, Default)]
pub struct InputDecoder {
    state: DecoderState,
    params: Vec<u16>,
    current_param: Option<u16>,
    utf8: Vec<u8>,
}

impl InputDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk of bytes.
    ///
    /// A lone ESC at the end of a chunk is reported as the Escape key; the
    /// rest of an escape sequence always arrives in the same write.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<KeyEvent> {
        let mut keys = Vec::new();
        for &byte in bytes {
            if let Some(key) = self.feed(byte) {
                keys.push(key);
            }
        }
        if self.state == DecoderState::Escape {
            self.state = DecoderState::Ground;
            keys.push(key(KeyCode::Esc, KeyModifiers::NONE));
        }
        keys
    }

    /// Feed a single byte to the decoder
    pub fn feed(&mut self, byte: u8) -> Option<KeyEvent> {
        match self.state {
            DecoderState::Ground => self.ground(byte),
            DecoderState::Escape => self.escape(byte),
            DecoderState::Csi => self.csi(byte),
            DecoderState::Ss3 => self.ss3(byte),
        }
    }

    fn ground(&mut self, byte: u8) -> Option<KeyEvent> {
        if !self.utf8.is_empty() || byte >= 0x80 {
            return self.utf8_byte(byte);
        }

        match byte {
            0x1B => {
                self.state = DecoderState::Escape;
                None
            }
            _ => Some(map_byte(byte, KeyModifiers::NONE)),
        }
    }

    fn escape(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            b'[' => {
                self.state = DecoderState::Csi;
                self.params.clear();
                self.current_param = None;
                None
            }
            b'O' => {
                self.state = DecoderState::Ss3;
                None
            }
            0x1B => {
                // ESC ESC: first one was a bare Escape press
                Some(key(KeyCode::Esc, KeyModifiers::NONE))
            }
            _ if byte >= 0x80 => {
                self.state = DecoderState::Ground;
                self.utf8_byte(byte).map(|mut k| {
                    k.modifiers |= KeyModifiers::ALT;
                    k
                })
            }
            _ => {
                self.state = DecoderState::Ground;
                let mut k = map_byte(byte, KeyModifiers::NONE);
                k.modifiers |= KeyModifiers::ALT;
                Some(k)
            }
        }
    }

    fn csi(&mut self, byte: u8) -> Option<KeyEvent> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param.unwrap_or(0).saturating_mul(10).saturating_add(digit),
                );
                None
            }
            b';' => {
                self.params.push(self.current_param.take().unwrap_or(0));
                None
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.params.push(p);
                }
                self.state = DecoderState::Ground;
                self.execute_csi(byte)
            }
            _ => {
                self.state = DecoderState::Ground;
                None
            }
        }
    }

    fn ss3(&mut self, byte: u8) -> Option<KeyEvent> {
        self.state = DecoderState::Ground;
        let code = match byte {
            b'A' => KeyCode::Up,
            b'B' => KeyCode::Down,
            b'C' => KeyCode::Right,
            b'D' => KeyCode::Left,
            b'H' => KeyCode::Home,
            b'F' => KeyCode::End,
            b'P' => KeyCode::F(1),
            b'Q' => KeyCode::F(2),
            b'R' => KeyCode::F(3),
            b'S' => KeyCode::F(4),
            _ => return None,
        };
        Some(key(code, KeyModifiers::NONE))
    }

    fn execute_csi(&mut self, final_byte: u8) -> Option<KeyEvent> {
        // xterm encodes modifiers as the second parameter: 1 + bitmask
        let mods = self
            .params
            .get(1)
            .map(|m| decode_modifiers(*m))
            .unwrap_or(KeyModifiers::NONE);

        let code = match final_byte {
            b'A' => KeyCode::Up,
            b'B' => KeyCode::Down,
            b'C' => KeyCode::Right,
            b'D' => KeyCode::Left,
            b'H' => KeyCode::Home,
            b'F' => KeyCode::End,
            b'Z' => return Some(key(KeyCode::BackTab, KeyModifiers::SHIFT)),
            b'~' => match self.params.first().copied().unwrap_or(0) {
                1 | 7 => KeyCode::Home,
                2 => KeyCode::Insert,
                3 => KeyCode::Delete,
                4 | 8 => KeyCode::End,
                5 => KeyCode::PageUp,
                6 => KeyCode::PageDown,
                15 => KeyCode::F(5),
                17 => KeyCode::F(6),
                18 => KeyCode::F(7),
                19 => KeyCode::F(8),
                20 => KeyCode::F(9),
                21 => KeyCode::F(10),
                23 => KeyCode::F(11),
                24 => KeyCode::F(12),
                _ => return None,
            },
            _ => return None,
        };
        Some(key(code, mods))
    }

    fn utf8_byte(&mut self, byte: u8) -> Option<KeyEvent> {
        self.utf8.push(byte);
        let expected = match self.utf8[0] {
            b if b & 0xE0 == 0xC0 => 2,
            b if b & 0xF0 == 0xE0 => 3,
            b if b & 0xF8 == 0xF0 => 4,
            _ => {
                // Invalid lead byte, drop it
                self.utf8.clear();
                return None;
            }
        };
        if self.utf8.len() < expected {
            return None;
        }

        let decoded = std::str::from_utf8(&self.utf8)
            .ok()
            .and_then(|s| s.chars().next());
        self.utf8.clear();
        decoded.map(|ch| key(KeyCode::Char(ch), KeyModifiers::NONE))
    }
}

fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
    KeyEvent::new(code, modifiers)
}

fn decode_modifiers(param: u16) -> KeyModifiers {
    let bits = param.saturating_sub(1);
    let mut mods = KeyModifiers::NONE;
    if bits & 0b001 != 0 {
        mods |= KeyModifiers::SHIFT;
    }
    if bits & 0b010 != 0 {
        mods |= KeyModifiers::ALT;
    }
    if bits & 0b100 != 0 {
        mods |= KeyModifiers::CONTROL;
    }
    mods
}

/// Map a single ASCII byte to a key
fn map_byte(byte: u8, mods: KeyModifiers) -> KeyEvent {
    match byte {
        0x0D | 0x0A => key(KeyCode::Enter, mods),
        0x09 => key(KeyCode::Tab, mods),
        0x7F | 0x08 => key(KeyCode::Backspace, mods),
        0x00 => key(KeyCode::Char(' '), mods | KeyModifiers::CONTROL),
        0x01..=0x1A => {
            let ch = (b'a' + byte - 1) as char;
            key(KeyCode::Char(ch), mods | KeyModifiers::CONTROL)
        }
        0x1C..=0x1F => {
            let ch = (b'4' + byte - 0x1C) as char;
            key(KeyCode::Char(ch), mods | KeyModifiers::CONTROL)
        }
        _ => key(KeyCode::Char(byte as char), mods),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<KeyEvent> {
        InputDecoder::new().decode(bytes)
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(decode(b"a"), vec![key(KeyCode::Char('a'), KeyModifiers::NONE)]);

        // Ctrl+C
        assert_eq!(decode(&[0x03]), vec![key(KeyCode::Char('c'), KeyModifiers::CONTROL)]);

        // Alt+x
        assert_eq!(decode(&[0x1B, b'x']), vec![key(KeyCode::Char('x'), KeyModifiers::ALT)]);
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(decode(b"\r"), vec![key(KeyCode::Enter, KeyModifiers::NONE)]);
        assert_eq!(decode(&[0x7F]), vec![key(KeyCode::Backspace, KeyModifiers::NONE)]);
        assert_eq!(decode(b"\t"), vec![key(KeyCode::Tab, KeyModifiers::NONE)]);
        assert_eq!(decode(b"\x1b[Z"), vec![key(KeyCode::BackTab, KeyModifiers::SHIFT)]);
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(decode(b"\x1b[A"), vec![key(KeyCode::Up, KeyModifiers::NONE)]);
        assert_eq!(decode(b"\x1bOB"), vec![key(KeyCode::Down, KeyModifiers::NONE)]);

        // With Ctrl
        assert_eq!(decode(b"\x1b[1;5C"), vec![key(KeyCode::Right, KeyModifiers::CONTROL)]);
    }

    #[test]
    fn test_tilde_keys() {
        assert_eq!(decode(b"\x1b[3~"), vec![key(KeyCode::Delete, KeyModifiers::NONE)]);
        assert_eq!(decode(b"\x1b[15~"), vec![key(KeyCode::F(5), KeyModifiers::NONE)]);
    }

    #[test]
    fn test_lone_escape() {
        assert_eq!(decode(&[0x1B]), vec![key(KeyCode::Esc, KeyModifiers::NONE)]);
        assert_eq!(
            decode(&[0x1B, 0x1B]),
            vec![
                key(KeyCode::Esc, KeyModifiers::NONE),
                key(KeyCode::Esc, KeyModifiers::NONE)
            ]
        );
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut decoder = InputDecoder::new();
        let bytes = "é".as_bytes();
        assert!(decoder.decode(&bytes[..1]).is_empty());
        assert_eq!(
            decoder.decode(&bytes[1..]),
            vec![key(KeyCode::Char('é'), KeyModifiers::NONE)]
        );
    }

    #[test]
    fn test_pasted_text() {
        let keys = decode(b"hi there");
        assert_eq!(keys.len(), 8);
        assert_eq!(keys[2], key(KeyCode::Char(' '), KeyModifiers::NONE));
    }
}
