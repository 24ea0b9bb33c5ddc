use crate::codec;
use crate::program::{Instruction, Program};

/// Size comparison between a text and the program that prints it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodingStats {
    /// Characters in the source text.
    pub text_len: usize,
    /// Instructions in the generated program.
    pub code_len: usize,
    /// `code_len / text_len`, with an empty text counted as length 1.
    pub ratio: f64,
}

impl EncodingStats {
    pub fn new(text: &str, program: &str) -> Self {
        let text_len = text.chars().count();
        let code_len = program.len();
        Self {
            text_len,
            code_len,
            ratio: code_len as f64 / text_len.max(1) as f64,
        }
    }
}

/// Characters after n-gram compression divided by characters before.
///
/// Returns 0.0 for an empty program.
pub fn compression_ratio(program: &str) -> f64 {
    let before = program.chars().count();
    if before == 0 {
        return 0.0;
    }
    codec::compress(program).chars().count() as f64 / before as f64
}

/// Count each instruction kind, indexed by `Instruction as usize`.
pub fn instruction_histogram(program: &Program) -> [usize; 8] {
    let mut hist = [0usize; 8];
    for inst in (0..program.len()).filter_map(|pc| program.get(pc)) {
        hist[inst as usize] += 1;
    }
    hist
}

/// Deepest loop nesting reached by the program text.
pub fn max_loop_depth(program: &Program) -> usize {
    let mut depth = 0usize;
    let mut max = 0;
    for inst in (0..program.len()).filter_map(|pc| program.get(pc)) {
        match inst {
            Instruction::LoopStart => {
                depth += 1;
                max = max.max(depth);
            }
            Instruction::LoopEnd => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    max
}
