//! All-pairs cell transition table.
//!
//! `TransitionTable::get(a, b)` is the shortest known instruction string that
//! takes a cell holding `a` to `b`. Strings may end one cell to the right of
//! where they started (loop entries move the value into the neighbouring
//! cell), so they are only valid when every cell to the right of the pointer
//! is still zero. The encoder maintains that invariant by only ever moving
//! right.
//!
//! Construction:
//! 1. seed every entry with a unary run of `+` or `-` over the circular delta
//! 2. for each pass: discover multiply loops `[-{a}>+{d}<]>` (and the
//!    sign-flipped form) that reach a target in fewer characters, then relax
//!    `t[c][b]` through every intermediate `e`
//!
//! Only [`PASSES`] passes run. The result is a fixed approximation, not a true
//! shortest-path fixpoint, and encoder output is defined relative to it.

use std::sync::OnceLock;
use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

/// Number of cell values.
const N: usize = 256;

/// Loop multipliers and inner steps are tried in `1..LOOP_LIMIT`.
const LOOP_LIMIT: usize = 40;

/// Loop-discovery plus relaxation passes after the unary seed.
pub const PASSES: usize = 2;

/// The 256x256 table of shortest known transitions.
pub struct TransitionTable {
    /// Row-major: entry `a * N + b`.
    entries: Vec<String>,
}

impl TransitionTable {
    /// Build the table from scratch.
    ///
    /// Deterministic: every call produces the same table. Prefer
    /// [`shared`](Self::shared) to reuse one process-wide instance.
    pub fn build() -> Self {
        let start = Instant::now();
        let mut table = Self::unary();
        for pass in 1..=PASSES {
            table.discover_loops();
            table.relax();
            debug!(pass, elapsed = ?start.elapsed(), "transition table pass done");
        }
        debug!(elapsed = ?start.elapsed(), "transition table built");
        table
    }

    /// The process-wide table, built on first use.
    ///
    /// Concurrent first callers block on the same build; it runs once.
    pub fn shared() -> &'static TransitionTable {
        static TABLE: OnceLock<TransitionTable> = OnceLock::new();
        TABLE.get_or_init(TransitionTable::build)
    }

    /// [`shared`](Self::shared) without blocking an async worker thread.
    pub async fn shared_async() -> &'static TransitionTable {
        match tokio::task::spawn_blocking(TransitionTable::shared).await {
            Ok(table) => table,
            // The build panicked on the blocking pool; surface it here.
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }

    /// The instruction string taking a cell from `from` to `to`.
    pub fn get(&self, from: u8, to: u8) -> &str {
        &self.entries[from as usize * N + to as usize]
    }

    /// Length of [`get`](Self::get).
    pub fn cost(&self, from: u8, to: u8) -> usize {
        self.get(from, to).len()
    }

    /// The closed-form seed: `+` or `-` repeated over the circular delta,
    /// with the delta taken in `-128..=128`.
    fn unary() -> Self {
        let mut entries = Vec::with_capacity(N * N);
        for x in 0..N as i32 {
            for y in 0..N as i32 {
                let mut delta = y - x;
                if delta > 128 {
                    delta -= 256;
                }
                if delta < -128 {
                    delta += 256;
                }
                entries.push(unary_run(delta));
            }
        }
        Self { entries }
    }

    /// Replace entries with multiply loops where they are strictly shorter.
    ///
    /// Each row only reads and writes itself, so rows run in parallel.
    fn discover_loops(&mut self) {
        self.entries.par_chunks_mut(N).enumerate().for_each(|(c, row)| {
            for a in 1..LOOP_LIMIT {
                let inverse = inverse_mod(a as i64, N as i64).rem_euclid(N as i64) as usize;
                for d in 1..LOOP_LIMIT {
                    if gcd(a, d) != 1 {
                        continue;
                    }
                    let len = a + d + 5;

                    // [-{a}>+{d}<]> : drain c by a per iteration, add d next door.
                    if let Some(iterations) = iterations_to_zero(c, a, inverse, false) {
                        let target = (d * iterations) % N;
                        if len < row[target].len() {
                            row[target] = multiply_loop('-', a, '+', d);
                        }
                    }

                    // [+{a}>-{d}<]> : the same with both signs flipped.
                    if let Some(iterations) = iterations_to_zero(c, a, inverse, true) {
                        let target = (N - (d * iterations) % N) % N;
                        if len < row[target].len() {
                            row[target] = multiply_loop('+', a, '-', d);
                        }
                    }
                }
            }
        });
    }

    /// One in-place sweep of `t[c][b] = t[c][e] + t[e][b]` where strictly
    /// shorter.
    ///
    /// Rows updated earlier in the sweep feed later ones, so this stays
    /// sequential.
    fn relax(&mut self) {
        for c in 0..N {
            for e in 0..N {
                let first = self.entries[c * N + e].clone();
                for b in 0..N {
                    let via = first.len() + self.entries[e * N + b].len();
                    if via < self.entries[c * N + b].len() {
                        let joined = format!("{first}{}", self.entries[e * N + b]);
                        self.entries[c * N + b] = joined;
                    }
                }
            }
        }
    }
}

fn unary_run(delta: i32) -> String {
    if delta >= 0 {
        "+".repeat(delta as usize)
    } else {
        "-".repeat(delta.unsigned_abs() as usize)
    }
}

fn multiply_loop(outer: char, a: usize, inner: char, d: usize) -> String {
    let mut s = String::with_capacity(a + d + 5);
    s.push('[');
    s.extend(std::iter::repeat_n(outer, a));
    s.push('>');
    s.extend(std::iter::repeat_n(inner, d));
    s.push_str("<]>");
    s
}

/// How many iterations of adding `-a` (or `+a` when `up`) take `c` to zero.
///
/// Odd `a` is invertible mod 256, so the count is solved directly. Even `a`
/// is simulated for at most 256 iterations and may never reach zero.
fn iterations_to_zero(c: usize, a: usize, inverse: usize, up: bool) -> Option<usize> {
    if a & 1 == 1 {
        let c = if up { (N - c) % N } else { c };
        return Some((c * inverse) % N);
    }
    let mut value = c;
    let mut iterations = 0;
    while iterations < N && value != 0 {
        value = if up { (value + a) % N } else { (value + N - a) % N };
        iterations += 1;
    }
    (value == 0).then_some(iterations)
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

/// Extended Euclid. The result is congruent to `c⁻¹ mod m` when the inverse
/// exists and may be negative.
fn inverse_mod(mut c: i64, mut m: i64) -> i64 {
    let (mut f, mut d) = (1i64, 0i64);
    while m != 0 {
        let q = c / m;
        (f, d) = (d, f - d * q);
        (c, m) = (m, c % m);
    }
    f
}
