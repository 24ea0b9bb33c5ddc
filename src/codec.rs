//! Compact single-character tokens for instruction n-grams.
//!
//! Every instruction 2-, 3- and 4-gram gets its own code point, assigned in
//! enumeration order (all 2-grams, then 3-grams, then 4-grams, each in
//! alphabet order) from a fixed list of printable Unicode ranges.
//!
//! The code points overlap ordinary text, including the instruction symbols
//! themselves. A lone instruction left over at the end of `compress` passes
//! through unchanged, and `decompress` will read it as the 2-gram that owns
//! that code point. Round-trips are exact for programs whose length is not
//! `1 mod 4`.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::program::ALPHABET;

/// Code point ranges (inclusive) the tokens are drawn from, in order.
const CHAR_RANGES: [(u32, u32); 60] = [
    (32, 126),       // Basic Latin printable
    (160, 255),      // Latin-1 Supplement
    (256, 383),      // Latin Extended-A
    (384, 591),      // Latin Extended-B
    (592, 687),      // IPA Extensions
    (688, 767),      // Spacing Modifier Letters
    (880, 1023),     // Greek and Coptic
    (1024, 1279),    // Cyrillic
    (1280, 1327),    // Cyrillic Supplement
    (1328, 1423),    // Armenian
    (1424, 1535),    // Hebrew
    (1536, 1791),    // Arabic
    (1792, 1871),    // Syriac
    (1920, 1983),    // Thaana
    (2304, 2431),    // Devanagari
    (2432, 2559),    // Bengali
    (2560, 2687),    // Gurmukhi
    (2688, 2815),    // Gujarati
    (2816, 2943),    // Oriya
    (2944, 3071),    // Tamil
    (3072, 3199),    // Telugu
    (3200, 3327),    // Kannada
    (3328, 3455),    // Malayalam
    (3456, 3583),    // Sinhala
    (3584, 3711),    // Thai
    (3712, 3839),    // Lao
    (3840, 4095),    // Tibetan
    (4096, 4255),    // Myanmar
    (4256, 4351),    // Georgian
    (4352, 4607),    // Hangul Jamo
    (4608, 4991),    // Ethiopic
    (5024, 5119),    // Cherokee
    (5120, 5759),    // Unified Canadian Aboriginal Syllabics
    (5760, 5791),    // Ogham
    (5792, 5887),    // Runic
    (5888, 5919),    // Tagalog
    (5920, 5951),    // Hanunoo
    (5952, 5983),    // Buhid
    (5984, 6015),    // Tagbanwa
    (6016, 6143),    // Khmer
    (6144, 6319),    // Mongolian
    (7680, 7935),    // Latin Extended Additional
    (7936, 8191),    // Greek Extended
    (8192, 8303),    // General Punctuation
    (8352, 8399),    // Currency Symbols
    (8448, 8527),    // Letterlike Symbols
    (8528, 8591),    // Number Forms
    (8592, 8703),    // Arrows
    (8704, 8959),    // Mathematical Operators
    (9472, 9599),    // Box Drawing
    (9600, 9631),    // Block Elements
    (9632, 9727),    // Geometric Shapes
    (9728, 9983),    // Miscellaneous Symbols
    (9984, 10175),   // Dingbats
    (12352, 12447),  // Hiragana
    (12448, 12543),  // Katakana
    (12544, 12591),  // Bopomofo
    (12592, 12687),  // Hangul Compatibility Jamo
    (19968, 20991),  // CJK Unified Ideographs (subset)
    (44032, 45055),  // Hangul Syllables (subset)
];

/// Longest n-gram tried first.
const MAX_GRAM: usize = 4;
const MIN_GRAM: usize = 2;

/// The two inverse token maps.
pub struct CodecTables {
    encode: HashMap<String, char>,
    decode: HashMap<char, String>,
}

impl CodecTables {
    fn build() -> Self {
        let chars: Vec<char> = CHAR_RANGES
            .iter()
            .flat_map(|&(start, end)| (start..=end).filter_map(char::from_u32))
            .collect();

        let mut combos = Vec::new();
        for len in MIN_GRAM..=MAX_GRAM {
            push_ngrams(&mut combos, &mut String::new(), len);
        }

        assert!(
            combos.len() <= chars.len(),
            "not enough code points ({}) to encode all {} n-grams",
            chars.len(),
            combos.len()
        );

        let mut encode = HashMap::with_capacity(combos.len());
        let mut decode = HashMap::with_capacity(combos.len());
        for (combo, &c) in combos.into_iter().zip(&chars) {
            decode.insert(c, combo.clone());
            encode.insert(combo, c);
        }
        Self { encode, decode }
    }

    /// The token for an instruction n-gram.
    pub fn token(&self, combo: &str) -> Option<char> {
        self.encode.get(combo).copied()
    }

    /// The n-gram a token stands for.
    pub fn combo(&self, token: char) -> Option<&str> {
        self.decode.get(&token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.encode.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encode.is_empty()
    }
}

/// Append every `len`-gram over the alphabet, in alphabet order.
fn push_ngrams(out: &mut Vec<String>, prefix: &mut String, len: usize) {
    if prefix.len() == len {
        out.push(prefix.clone());
        return;
    }
    for c in ALPHABET {
        prefix.push(c);
        push_ngrams(out, prefix, len);
        prefix.pop();
    }
}

/// The process-wide token tables.
///
/// # Panics
///
/// Panics on first use if the code point ranges cannot cover every n-gram.
pub fn tables() -> &'static CodecTables {
    static TABLES: OnceLock<CodecTables> = OnceLock::new();
    TABLES.get_or_init(CodecTables::build)
}

/// Replace instruction n-grams with single tokens, longest match first.
///
/// Characters that start no n-gram pass through unchanged.
pub fn compress(program: &str) -> String {
    let tables = tables();
    let chars: Vec<char> = program.chars().collect();
    let mut out = String::with_capacity(program.len());
    let mut key = String::with_capacity(MAX_GRAM);
    let mut i = 0;

    'scan: while i < chars.len() {
        for len in (MIN_GRAM..=MAX_GRAM).rev() {
            if i + len > chars.len() {
                continue;
            }
            key.clear();
            key.extend(&chars[i..i + len]);
            if let Some(token) = tables.token(&key) {
                out.push(token);
                i += len;
                continue 'scan;
            }
        }
        out.push(chars[i]);
        i += 1;
    }

    out
}

/// Expand every token back into its n-gram; other characters pass through.
pub fn decompress(code: &str) -> String {
    let tables = tables();
    let mut out = String::with_capacity(code.len() * MAX_GRAM);
    for c in code.chars() {
        match tables.combo(c) {
            Some(combo) => out.push_str(combo),
            None => out.push(c),
        }
    }
    out
}
