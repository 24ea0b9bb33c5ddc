use std::fmt;

use crate::error::BracketError;

/// The eight-instruction tape language.
///
/// Programs operate on a byte tape with a single data pointer:
/// - `+` / `-` change the cell under the pointer, wrapping modulo 256
/// - `>` / `<` move the pointer (never below zero)
/// - `[` / `]` loop while the current cell is non-zero
/// - `.` writes the current cell to the output as a Latin-1 character
/// - `,` reads one byte of input into the current cell
///
/// Every other character is commentary and is discarded on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    Increment,
    Decrement,
    Left,
    Right,
    LoopStart,
    LoopEnd,
    Output,
    Input,
}

pub const PLUS: u8 = b'+';
pub const MINUS: u8 = b'-';
pub const LESS: u8 = b'<';
pub const GREATER: u8 = b'>';
pub const LBRACKET: u8 = b'[';
pub const RBRACKET: u8 = b']';
pub const DOT: u8 = b'.';
pub const COMMA: u8 = b',';

/// All instruction symbols in canonical order.
pub const ALPHABET: [char; 8] = ['+', '-', '<', '>', '[', ']', '.', ','];

impl Instruction {
    pub const ALL: [Instruction; 8] = [
        Instruction::Increment,
        Instruction::Decrement,
        Instruction::Left,
        Instruction::Right,
        Instruction::LoopStart,
        Instruction::LoopEnd,
        Instruction::Output,
        Instruction::Input,
    ];

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            PLUS => Some(Instruction::Increment),
            MINUS => Some(Instruction::Decrement),
            LESS => Some(Instruction::Left),
            GREATER => Some(Instruction::Right),
            LBRACKET => Some(Instruction::LoopStart),
            RBRACKET => Some(Instruction::LoopEnd),
            DOT => Some(Instruction::Output),
            COMMA => Some(Instruction::Input),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        ALPHABET[self as usize]
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Returns true if the character is one of the eight instruction symbols.
pub fn is_instruction(c: char) -> bool {
    ALPHABET.contains(&c)
}

/// A sanitized program: only instruction symbols survive construction.
///
/// Sanitization is lossy. Comments and formatting in the source cannot be
/// recovered from a `Program`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    code: Vec<u8>,
}

impl Program {
    pub fn new(source: &str) -> Self {
        let code = source
            .chars()
            .filter(|&c| is_instruction(c))
            .map(|c| c as u8)
            .collect();
        Self { code }
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII instruction bytes are ever stored.
        std::str::from_utf8(&self.code).unwrap_or_default()
    }

    /// The instruction at `pc`, or `None` past the end of the program.
    pub fn get(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied().and_then(Instruction::from_byte)
    }

    /// Check bracket balance without executing anything.
    ///
    /// Unmatched `]` are reported in program order as they are found, followed
    /// by every unclosed `[` from the innermost outwards.
    pub fn validate(&self) -> Vec<BracketError> {
        let mut errors = Vec::new();
        let mut stack = Vec::new();

        for (i, &byte) in self.code.iter().enumerate() {
            match byte {
                LBRACKET => stack.push(i),
                RBRACKET => {
                    if stack.pop().is_none() {
                        errors.push(BracketError {
                            bracket: ']',
                            position: i,
                        });
                    }
                }
                _ => {}
            }
        }

        while let Some(position) = stack.pop() {
            errors.push(BracketError {
                bracket: '[',
                position,
            });
        }

        errors
    }

    /// Build a bracket-match lookup table.
    ///
    /// `result[i]` is the index of the bracket matching position `i`, or
    /// `usize::MAX` if `i` is unmatched or not a bracket.
    pub fn bracket_table(&self) -> Vec<usize> {
        let mut table = vec![usize::MAX; self.code.len()];
        let mut stack = Vec::new();

        for (i, &byte) in self.code.iter().enumerate() {
            match byte {
                LBRACKET => stack.push(i),
                RBRACKET => {
                    if let Some(open) = stack.pop() {
                        table[open] = i;
                        table[i] = open;
                    }
                }
                _ => {}
            }
        }

        table
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Program {
    fn from(source: &str) -> Self {
        Program::new(source)
    }
}
