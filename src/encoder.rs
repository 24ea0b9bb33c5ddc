use crate::table::TransitionTable;

/// Synthesize a program that prints `text`.
///
/// Each character is reduced to its low 8 bits. For every byte the encoder
/// picks the shorter of two continuations, then appends `.`:
/// - `>` to a fresh zero cell, then `table[0][byte]`
/// - stay on the current cell, then `table[prev][byte]`
///
/// Ties go to the fresh cell. The choice is greedy: no lookahead past the
/// previous byte. The pointer only ever moves right, which keeps every table
/// entry valid (they assume zero cells to the right).
pub fn encode(text: &str, table: &TransitionTable) -> String {
    let mut program = String::new();
    let mut prev = 0u8;
    for c in text.chars() {
        let byte = (c as u32 & 0xFF) as u8;
        let fresh = table.cost(0, byte) + 1;
        let stay = table.cost(prev, byte);
        if fresh <= stay {
            program.push('>');
            program.push_str(table.get(0, byte));
        } else {
            program.push_str(table.get(prev, byte));
        }
        program.push('.');
        prev = byte;
    }
    program
}

/// [`encode`] against the process-wide table, building it on first use.
pub fn encode_shared(text: &str) -> String {
    encode(text, TransitionTable::shared())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ExecutionLimits;
    use crate::vm::execute;
    use rand::Rng;
    use rand::SeedableRng;

    fn roundtrip(text: &str) -> String {
        let program = encode_shared(text);
        let limits = ExecutionLimits::default().with_max_steps(u64::MAX).with_timeout_ms(60_000);
        execute(&program, limits).unwrap()
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(encode_shared(""), "");
    }

    #[test]
    fn test_hello_world_roundtrip() {
        assert_eq!(roundtrip("Hello World"), "Hello World");
        assert_eq!(roundtrip("Hello World!\n"), "Hello World!\n");
    }

    #[test]
    fn test_repeated_character_stays_on_cell() {
        let program = encode_shared("aaaa");
        // After the first 'a' the same cell is reprinted.
        assert!(program.ends_with("...."));
        assert_eq!(program.matches('.').count(), 4);
    }

    #[test]
    fn test_nul_byte() {
        // 0 from 0 costs nothing: fresh costs 1, staying costs 0.
        assert_eq!(encode_shared("\0"), ".");
    }

    #[test]
    fn test_first_char_starts_on_cell_zero() {
        // From the initial zero cell staying is always one shorter.
        let program = encode_shared("A");
        assert!(!program.starts_with('>'));
    }

    #[test]
    fn test_shorter_than_unary() {
        let text = "The quick brown fox jumps over the lazy dog";
        let program = encode_shared(text);
        let unary: usize = text.bytes().map(|b| b as usize + 2).sum();
        assert!(program.len() < unary);
    }

    #[test]
    fn test_latin1_roundtrip() {
        let text: String = (0u8..=255).map(char::from).collect();
        assert_eq!(roundtrip(&text), text);
    }

    #[test]
    fn test_wide_chars_are_masked() {
        // U+0141 encodes as 0x41.
        assert_eq!(roundtrip("\u{141}"), "A");
    }

    #[test]
    fn test_random_text_roundtrip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(12345);
        for _ in 0..20 {
            let len = rng.gen_range(1..80);
            let text: String = (0..len).map(|_| char::from(rng.r#gen::<u8>())).collect();
            assert_eq!(roundtrip(&text), text);
        }
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::limits::ExecutionLimits;
    use crate::vm::execute;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn encoded_programs_print_their_text(text in "[ -~]{0,40}") {
            let program = encode_shared(&text);
            let out = execute(&program, ExecutionLimits::default()).unwrap();
            prop_assert_eq!(out, text);
        }

        #[test]
        fn encoded_programs_are_balanced(text in "\\PC{0,20}") {
            let program = encode_shared(&text);
            prop_assert!(crate::program::Program::new(&program).validate().is_empty());
        }
    }
}
