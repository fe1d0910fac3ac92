// Key translation for the terminal passthrough
// Turns crossterm key events into the text a remote shell expects on stdin

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// What the terminal front end should do with one key press
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyAction {
    /// Forward these characters as `stdin`
    Send(String),
    /// Ctrl-C: send `interrupt`
    Interrupt,
    /// Ctrl-]: leave the terminal, sending `terminate`
    Detach,
    Ignore,
}

pub fn translate(key: &KeyEvent) -> KeyAction {
    if key.kind == KeyEventKind::Release {
        return KeyAction::Ignore;
    }
    let mods = key.modifiers;
    if mods.contains(KeyModifiers::CONTROL) && !mods.contains(KeyModifiers::ALT) {
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('C') => return KeyAction::Interrupt,
            KeyCode::Char(']') => return KeyAction::Detach,
            _ => {}
        }
    }
    match encode(key.code, mods) {
        Some(text) => KeyAction::Send(text),
        None => KeyAction::Ignore,
    }
}

fn encode(code: KeyCode, mods: KeyModifiers) -> Option<String> {
    let alt = mods.contains(KeyModifiers::ALT);
    match code {
        KeyCode::Char(ch) => {
            let mut out = String::new();
            if alt {
                out.push('\x1b');
            }
            match control_char(ch).filter(|_| mods.contains(KeyModifiers::CONTROL)) {
                Some(ctrl) => out.push(ctrl),
                None => out.push(ch),
            }
            Some(out)
        }
        KeyCode::Enter => Some("\r".to_string()),
        KeyCode::Tab if mods.contains(KeyModifiers::SHIFT) => Some("\x1b[Z".to_string()),
        KeyCode::Tab => Some("\t".to_string()),
        KeyCode::BackTab => Some("\x1b[Z".to_string()),
        KeyCode::Backspace => Some("\x7f".to_string()),
        KeyCode::Esc => Some("\x1b".to_string()),
        KeyCode::Left => Some(cursor('D', mods)),
        KeyCode::Right => Some(cursor('C', mods)),
        KeyCode::Up => Some(cursor('A', mods)),
        KeyCode::Down => Some(cursor('B', mods)),
        KeyCode::Home => Some(cursor('H', mods)),
        KeyCode::End => Some(cursor('F', mods)),
        KeyCode::Insert => Some(tilde("2", mods)),
        KeyCode::Delete => Some(tilde("3", mods)),
        KeyCode::PageUp => Some(tilde("5", mods)),
        KeyCode::PageDown => Some(tilde("6", mods)),
        KeyCode::F(n) => function_key(n, mods),
        _ => None,
    }
}

fn control_char(ch: char) -> Option<char> {
    let byte = match ch {
        '@' | ' ' => 0x00,
        'a'..='z' => ch as u8 - b'a' + 1,
        'A'..='Z' => ch as u8 - b'A' + 1,
        '[' => 0x1b,
        '\\' => 0x1c,
        ']' => 0x1d,
        '^' => 0x1e,
        '_' => 0x1f,
        '?' => 0x7f,
        _ => return None,
    };
    Some(byte as char)
}

/// xterm modifier parameter: 1 + (shift=1 | alt=2 | ctrl=4)
fn modifier_param(mods: KeyModifiers) -> Option<u8> {
    let mut bits = 0u8;
    if mods.contains(KeyModifiers::SHIFT) {
        bits |= 1;
    }
    if mods.contains(KeyModifiers::ALT) {
        bits |= 2;
    }
    if mods.contains(KeyModifiers::CONTROL) {
        bits |= 4;
    }
    (bits != 0).then_some(1 + bits)
}

fn cursor(letter: char, mods: KeyModifiers) -> String {
    match modifier_param(mods) {
        Some(param) => format!("\x1b[1;{param}{letter}"),
        None => format!("\x1b[{letter}"),
    }
}

fn tilde(base: &str, mods: KeyModifiers) -> String {
    match modifier_param(mods) {
        Some(param) => format!("\x1b[{base};{param}~"),
        None => format!("\x1b[{base}~"),
    }
}

fn function_key(n: u8, mods: KeyModifiers) -> Option<String> {
    let ss3 = match n {
        1 => 'P',
        2 => 'Q',
        3 => 'R',
        4 => 'S',
        _ => {
            let base = match n {
                5 => "15",
                6 => "17",
                7 => "18",
                8 => "19",
                9 => "20",
                10 => "21",
                11 => "23",
                12 => "24",
                _ => return None,
            };
            return Some(tilde(base, mods));
        }
    };
    Some(match modifier_param(mods) {
        Some(param) => format!("\x1b[1;{param}{ss3}"),
        None => format!("\x1bO{ss3}"),
    })
}
