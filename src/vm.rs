use std::cell::OnceCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{debug, trace};

use crate::error::{ExecError, Result};
use crate::input::InputProvider;
use crate::limits::ExecutionLimits;
use crate::program::{Instruction, Program};
use crate::trace::{Steps, TraceRecorder};

/// The async run loop hands control back to the scheduler this often.
pub const YIELD_EVERY: usize = 1000;

/// Byte cells indexed from zero.
///
/// Cells are allocated the first time an instruction touches them; anything
/// past the allocated extent reads as 0. Values always stay in `0..=255`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tape {
    cells: Vec<u8>,
}

impl Tape {
    pub fn get(&self, index: usize) -> u8 {
        self.cells.get(index).copied().unwrap_or(0)
    }

    /// Mutable access to a cell, allocating up to it if needed.
    pub fn cell_mut(&mut self, index: usize) -> &mut u8 {
        if index >= self.cells.len() {
            self.cells.resize(index + 1, 0);
        }
        &mut self.cells[index]
    }

    /// Every cell touched so far, from index 0.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Requests cancellation of a running VM from elsewhere.
///
/// The flag is checked once per step: the current instruction completes, then
/// the run fails with [`ExecError::UserStopped`].
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A point-in-time copy of the interpreter's registers and memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmState {
    pub pc: usize,
    pub pointer: usize,
    pub cells: Vec<u8>,
    pub output: String,
    pub input_position: usize,
    pub loop_stack: Vec<usize>,
    pub step_count: u64,
    pub running: bool,
}

/// Interpreter for one program under one set of limits.
pub struct Vm {
    program: Program,
    /// Matching-bracket index for each position, `usize::MAX` if unmatched.
    brackets: Vec<usize>,
    limits: ExecutionLimits,
    input: Vec<u8>,
    tape: Tape,
    pointer: usize,
    pc: usize,
    loop_stack: Vec<usize>,
    output: String,
    input_position: usize,
    step_count: u64,
    started: Option<Instant>,
    running: bool,
    stop: StopHandle,
    steps: OnceCell<Steps>,
}

impl Vm {
    pub fn new(program: impl Into<Program>, limits: ExecutionLimits) -> Self {
        let program = program.into();
        let brackets = program.bracket_table();
        // `,` sees each input character as a Latin-1 byte.
        let input = limits
            .user_input
            .chars()
            .map(|c| (c as u32 & 0xFF) as u8)
            .collect();
        Self {
            program,
            brackets,
            limits,
            input,
            tape: Tape::default(),
            pointer: 0,
            pc: 0,
            loop_stack: Vec::new(),
            output: String::new(),
            input_position: 0,
            step_count: 0,
            started: None,
            running: false,
            stop: StopHandle::default(),
            steps: OnceCell::new(),
        }
    }

    /// Restore the initial state and drop any cached trace.
    pub fn reset(&mut self) {
        self.tape = Tape::default();
        self.pointer = 0;
        self.pc = 0;
        self.loop_stack.clear();
        self.output.clear();
        self.input_position = 0;
        self.step_count = 0;
        self.started = None;
        self.stop.clear();
        self.steps = OnceCell::new();
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn tape(&self) -> &Tape {
        &self.tape
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn input_position(&self) -> usize {
        self.input_position
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// The instruction about to execute, `None` once the program has ended.
    pub fn current_instruction(&self) -> Option<Instruction> {
        self.program.get(self.pc)
    }

    pub fn is_finished(&self) -> bool {
        self.pc >= self.program.len()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn state(&self) -> VmState {
        VmState {
            pc: self.pc,
            pointer: self.pointer,
            cells: self.tape.cells().to_vec(),
            output: self.output.clone(),
            input_position: self.input_position,
            loop_stack: self.loop_stack.clone(),
            step_count: self.step_count,
            running: self.running,
        }
    }

    /// Report every unmatched bracket without executing anything.
    pub fn validate(&self) -> Vec<crate::error::BracketError> {
        self.program.validate()
    }

    /// The full trace of this program, recorded on first access and cached.
    ///
    /// Recording uses a separate interpreter, so the state of `self` is not
    /// touched.
    pub fn steps(&self) -> &Steps {
        self.steps.get_or_init(|| {
            let mut recorder = TraceRecorder::new(self.program.clone(), self.limits.clone());
            recorder.record_all();
            recorder.into_steps()
        })
    }

    /// Start the wall-clock budget now.
    ///
    /// The run loops do this themselves. Single stepping without a started
    /// clock is not timed, so a paused debugger never times out.
    pub fn start_clock(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Execute exactly one instruction.
    ///
    /// Returns whether any instructions remain. Calling this on a finished
    /// program does nothing and returns `Ok(false)`.
    pub fn step(&mut self) -> Result<bool> {
        self.step_with(None)
    }

    /// Like [`step`](Self::step), but a `,` is served by `provider`.
    pub async fn step_async<P: InputProvider>(&mut self, provider: &mut P) -> Result<bool> {
        if self.current_instruction() != Some(Instruction::Input) {
            return self.step_with(None);
        }
        self.check_budget()?;
        let position = self.pc;
        let byte = provider
            .next_byte()
            .await
            .map_err(|source| ExecError::InputUnavailable { position, source })?;
        self.step_with(Some(byte))
    }

    /// Run from the initial state until the program ends or a limit is hit.
    pub fn run(&mut self) -> Result<String> {
        self.reset();
        self.start_clock();
        self.running = true;
        debug!(len = self.program.len(), "run started");

        let result = loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break Ok(self.output.clone()),
                Err(e) => break Err(e),
            }
        };

        self.finish(result)
    }

    /// Run from the initial state, yielding to the scheduler every
    /// [`YIELD_EVERY`] steps. `,` reads from the configured user input.
    pub async fn run_async(&mut self) -> Result<String> {
        self.reset();
        self.start_clock();
        self.running = true;
        debug!(len = self.program.len(), "async run started");

        let mut since_yield = 0;
        let result = loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break Ok(self.output.clone()),
                Err(e) => break Err(e),
            }
            since_yield += 1;
            if since_yield >= YIELD_EVERY {
                since_yield = 0;
                trace!(steps = self.step_count, "yielding");
                tokio::task::yield_now().await;
            }
        };

        self.finish(result)
    }

    /// Run from the initial state with `,` suspended on `provider`.
    pub async fn run_with_input<P: InputProvider>(&mut self, provider: &mut P) -> Result<String> {
        self.reset();
        self.start_clock();
        self.running = true;
        debug!(len = self.program.len(), "async run with input provider started");

        let mut since_yield = 0;
        let result = loop {
            match self.step_async(provider).await {
                Ok(true) => {}
                Ok(false) => break Ok(self.output.clone()),
                Err(e) => break Err(e),
            }
            since_yield += 1;
            if since_yield >= YIELD_EVERY {
                since_yield = 0;
                trace!(steps = self.step_count, "yielding");
                tokio::task::yield_now().await;
            }
        };

        self.finish(result)
    }

    fn finish(&mut self, result: Result<String>) -> Result<String> {
        self.running = false;
        match &result {
            Ok(output) => debug!(steps = self.step_count, bytes = output.len(), "run completed"),
            Err(e) => debug!(steps = self.step_count, reason = %e.reason(), "run aborted: {e}"),
        }
        result
    }

    fn check_budget(&self) -> Result<()> {
        if self.step_count >= self.limits.max_steps {
            return Err(ExecError::StepLimit {
                limit: self.limits.max_steps,
            });
        }
        Ok(())
    }

    /// Execute one instruction. `provided` overrides the user-input buffer
    /// for `,`.
    fn step_with(&mut self, provided: Option<u8>) -> Result<bool> {
        let Some(instruction) = self.program.get(self.pc) else {
            return Ok(false);
        };
        self.check_budget()?;

        match instruction {
            Instruction::Increment => {
                let cell = self.tape.cell_mut(self.pointer);
                *cell = cell.wrapping_add(1);
            }
            Instruction::Decrement => {
                let cell = self.tape.cell_mut(self.pointer);
                *cell = cell.wrapping_sub(1);
            }
            Instruction::Right => {
                if self.pointer + 1 >= self.limits.max_memory {
                    return Err(ExecError::MemoryLimit {
                        limit: self.limits.max_memory,
                        position: self.pc,
                    });
                }
                self.pointer += 1;
            }
            Instruction::Left => {
                self.pointer = self.pointer.saturating_sub(1);
            }
            Instruction::LoopStart => {
                if *self.tape.cell_mut(self.pointer) != 0 {
                    self.loop_stack.push(self.pc);
                } else {
                    let target = self.brackets[self.pc];
                    if target == usize::MAX {
                        return Err(ExecError::UnmatchedBracket {
                            bracket: '[',
                            position: self.pc,
                        });
                    }
                    self.pc = target;
                }
            }
            Instruction::LoopEnd => {
                let Some(&open) = self.loop_stack.last() else {
                    return Err(ExecError::UnmatchedBracket {
                        bracket: ']',
                        position: self.pc,
                    });
                };
                if *self.tape.cell_mut(self.pointer) != 0 {
                    self.pc = open;
                } else {
                    self.loop_stack.pop();
                }
            }
            Instruction::Output => {
                let value = *self.tape.cell_mut(self.pointer);
                self.output.push(char::from(value));
            }
            Instruction::Input => {
                let value = match provided {
                    Some(byte) => byte,
                    None => match self.input.get(self.input_position) {
                        Some(&byte) => {
                            self.input_position += 1;
                            byte
                        }
                        // EOF reads as 0.
                        None => 0,
                    },
                };
                *self.tape.cell_mut(self.pointer) = value;
            }
        }

        self.pc += 1;
        self.step_count += 1;

        if self.stop.is_stopped() {
            return Err(ExecError::UserStopped);
        }
        if let Some(started) = self.started {
            if started.elapsed() > self.limits.timeout() {
                return Err(ExecError::Timeout {
                    limit_ms: self.limits.timeout_ms,
                });
            }
        }

        Ok(!self.is_finished())
    }
}

/// Run `source` to completion under `limits` and return its output.
pub fn execute(source: &str, limits: ExecutionLimits) -> Result<String> {
    Vm::new(source, limits).run()
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn n_pluses_print_n_mod_256(n in 0usize..1024) {
            let program = format!("{}.", "+".repeat(n));
            let out = execute(&program, ExecutionLimits::default()).unwrap();
            prop_assert_eq!(out.chars().next().map(|c| c as usize), Some(n % 256));
        }

        #[test]
        fn random_programs_respect_step_limit(
            source in "[-+<>\\[\\].,]{0,64}",
            limit in 1u64..500,
        ) {
            let limits = ExecutionLimits::default().with_max_steps(limit).with_max_memory(64);
            let mut vm = Vm::new(source.as_str(), limits);
            let _ = vm.run();
            prop_assert!(vm.step_count() <= limit);
            prop_assert!(vm.pointer() < 64);
        }

        #[test]
        fn runs_are_deterministic(source in "[-+<>\\[\\].]{0,48}") {
            let limits = ExecutionLimits::default().with_max_steps(2000);
            let a = execute(&source, limits.clone()).map_err(|e| e.to_string());
            let b = execute(&source, limits).map_err(|e| e.to_string());
            prop_assert_eq!(a, b);
        }
    }
}
