use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ExecError, TerminationReason};
use crate::input::InputProvider;
use crate::limits::ExecutionLimits;
use crate::program::Program;
use crate::vm::Vm;

/// Upper bound on recorded snapshots, initial state included.
pub const MAX_TRACE_STEPS: usize = 10_000;

/// Traces never report fewer display cells than this.
pub const MIN_DISPLAY_CELLS: usize = 15;

/// Interpreter state just before the instruction at `pc` executes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(rename = "index")]
    pub pc: usize,
    pub pointer: usize,
    pub cells: Vec<u8>,
    #[serde(rename = "result")]
    pub output: String,
    /// `None` once the program has run off its end.
    pub instruction: Option<char>,
    pub input_position: usize,
}

impl Step {
    pub fn capture(vm: &Vm) -> Self {
        Self {
            pc: vm.pc(),
            pointer: vm.pointer(),
            cells: vm.tape().cells().to_vec(),
            output: vm.output().to_string(),
            instruction: vm.current_instruction().map(|i| i.symbol()),
            input_position: vm.input_position(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total_steps: usize,
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
    pub max_memory_used: usize,
    pub completed: bool,
    pub termination_reason: TerminationReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A recorded run: every snapshot plus aggregate statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Steps {
    /// The sanitized program.
    pub input: String,
    pub user_input: String,
    #[serde(rename = "max_cells")]
    pub max_cells: usize,
    pub steps: Vec<Step>,
    pub stats: ExecutionStats,
}

#[derive(Debug, Clone)]
struct Outcome {
    reason: TerminationReason,
    error: Option<String>,
}

/// Drives a private interpreter and records a snapshot after every step.
///
/// Recording is incremental: [`seek`](Self::seek) and
/// [`step_forward`](Self::step_forward) execute only as far as needed, and
/// anything already recorded is served by index without re-execution. A
/// terminal error ends recording but keeps the snapshots collected so far.
pub struct TraceRecorder {
    vm: Vm,
    steps: Vec<Step>,
    cap: usize,
    elapsed: Duration,
    outcome: Option<Outcome>,
}

impl TraceRecorder {
    pub fn new(program: impl Into<Program>, limits: ExecutionLimits) -> Self {
        Self::with_cap(program, limits, MAX_TRACE_STEPS)
    }

    /// A recorder that keeps at most `cap` snapshots (at least one).
    pub fn with_cap(program: impl Into<Program>, limits: ExecutionLimits, cap: usize) -> Self {
        let vm = Vm::new(program, limits);
        let mut recorder = Self {
            steps: vec![Step::capture(&vm)],
            vm,
            cap: cap.max(1),
            elapsed: Duration::ZERO,
            outcome: None,
        };
        if recorder.vm.is_finished() {
            recorder.finish(TerminationReason::Completed, None);
        }
        recorder
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// True once no further steps can be recorded.
    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// An already recorded snapshot.
    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// The snapshot at `index`, recording forward until it exists.
    ///
    /// Returns `None` if the run ends before reaching `index`.
    pub fn seek(&mut self, index: usize) -> Option<&Step> {
        while self.steps.len() <= index {
            self.step_forward()?;
        }
        self.steps.get(index)
    }

    /// Execute one more instruction and record the resulting snapshot.
    pub fn step_forward(&mut self) -> Option<&Step> {
        if !self.ready() {
            return None;
        }
        let start = Instant::now();
        let result = self.vm.step();
        self.elapsed += start.elapsed();
        self.record(result)
    }

    /// Like [`step_forward`](Self::step_forward), with `,` served by
    /// `provider`.
    pub async fn step_forward_async<P: InputProvider>(&mut self, provider: &mut P) -> Option<&Step> {
        if !self.ready() {
            return None;
        }
        let start = Instant::now();
        let result = self.vm.step_async(provider).await;
        self.elapsed += start.elapsed();
        self.record(result)
    }

    /// Record until the program ends, fails, or the cap is reached.
    ///
    /// The timeout applies from here on.
    pub fn record_all(&mut self) {
        self.vm.start_clock();
        while self.step_forward().is_some() {}
    }

    /// The trace record as it stands now.
    pub fn to_steps(&self) -> Steps {
        self.build(self.steps.clone())
    }

    pub fn into_steps(mut self) -> Steps {
        let steps = std::mem::take(&mut self.steps);
        self.build(steps)
    }

    fn ready(&mut self) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        if self.steps.len() >= self.cap {
            warn!(cap = self.cap, "trace length cap reached");
            self.finish(TerminationReason::MaxSteps, None);
            return false;
        }
        true
    }

    fn record(&mut self, result: Result<bool, ExecError>) -> Option<&Step> {
        match result {
            Ok(more) => {
                self.steps.push(Step::capture(&self.vm));
                if !more {
                    self.finish(TerminationReason::Completed, None);
                }
                self.steps.last()
            }
            Err(e) => {
                // Stop and timeout fire after the instruction has taken effect.
                if matches!(e, ExecError::Timeout { .. } | ExecError::UserStopped) {
                    self.steps.push(Step::capture(&self.vm));
                }
                self.finish(e.reason(), Some(e.to_string()));
                None
            }
        }
    }

    fn finish(&mut self, reason: TerminationReason, error: Option<String>) {
        debug!(steps = self.steps.len(), %reason, "trace finished");
        self.outcome = Some(Outcome { reason, error });
    }

    fn build(&self, steps: Vec<Step>) -> Steps {
        let widest = steps.iter().map(|s| s.cells.len()).max().unwrap_or(0);
        let max_cells = widest.max(MIN_DISPLAY_CELLS);
        let (reason, error) = match &self.outcome {
            Some(outcome) => (outcome.reason, outcome.error.clone()),
            // Still recordable: report the cap-style partial state.
            None => (TerminationReason::MaxSteps, None),
        };
        Steps {
            input: self.vm.program().to_string(),
            user_input: self.vm.limits().user_input.clone(),
            max_cells,
            stats: ExecutionStats {
                total_steps: steps.len().saturating_sub(1),
                execution_time_ms: self.elapsed.as_millis() as u64,
                max_memory_used: max_cells,
                completed: reason == TerminationReason::Completed,
                termination_reason: reason,
                error,
            },
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::FnInput;

    #[test]
    fn test_initial_snapshot_precedes_execution() {
        let recorder = TraceRecorder::new("+.", ExecutionLimits::default());
        let first = recorder.get(0).unwrap();
        assert_eq!(first.pc, 0);
        assert_eq!(first.instruction, Some('+'));
        assert!(first.cells.is_empty());
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_full_trace() {
        let mut recorder = TraceRecorder::new("++>+.", ExecutionLimits::default());
        recorder.record_all();
        let steps = recorder.into_steps();
        assert_eq!(steps.steps.len(), 6);
        assert_eq!(steps.stats.total_steps, 5);
        assert!(steps.stats.completed);
        assert_eq!(steps.stats.termination_reason, TerminationReason::Completed);
        assert_eq!(steps.max_cells, MIN_DISPLAY_CELLS);

        let last = steps.steps.last().unwrap();
        assert_eq!(last.instruction, None);
        assert_eq!(last.cells, vec![2, 1]);
        assert_eq!(last.output, "\u{1}");
        assert_eq!(steps.steps[3].pointer, 1);
    }

    #[test]
    fn test_empty_program_is_complete() {
        let recorder = TraceRecorder::new("no code here", ExecutionLimits::default());
        assert!(recorder.is_finished());
        let steps = recorder.into_steps();
        assert_eq!(steps.steps.len(), 1);
        assert!(steps.stats.completed);
    }

    #[test]
    fn test_cap_bounds_infinite_loop() {
        let limits = ExecutionLimits::default().with_max_steps(u64::MAX).with_timeout_ms(60_000);
        let mut recorder = TraceRecorder::with_cap("+[]", limits, 50);
        recorder.record_all();
        let steps = recorder.into_steps();
        assert_eq!(steps.steps.len(), 50);
        assert!(!steps.stats.completed);
        assert_eq!(steps.stats.termination_reason, TerminationReason::MaxSteps);
    }

    #[test]
    fn test_error_keeps_partial_trace() {
        let mut recorder = TraceRecorder::new("++]", ExecutionLimits::default());
        recorder.record_all();
        let steps = recorder.to_steps();
        assert_eq!(steps.steps.len(), 3);
        assert_eq!(steps.stats.termination_reason, TerminationReason::Error);
        assert_eq!(steps.stats.error.as_deref(), Some("Unmatched ']' at position 2"));
    }

    #[test]
    fn test_stop_keeps_the_interrupted_step() {
        let mut recorder = TraceRecorder::new("++.", ExecutionLimits::default());
        recorder.step_forward();
        recorder.vm.stop();
        assert!(recorder.step_forward().is_none());
        assert!(recorder.is_finished());

        let steps = recorder.into_steps();
        assert_eq!(steps.steps.len(), 3);
        let last = steps.steps.last().unwrap();
        assert_eq!(last.pc, 2);
        assert_eq!(last.cells, vec![2]);
        assert_eq!(steps.stats.total_steps, 2);
        assert_eq!(steps.stats.termination_reason, TerminationReason::UserStopped);
    }

    #[test]
    fn test_step_limit_reason() {
        let limits = ExecutionLimits::default().with_max_steps(10);
        let mut recorder = TraceRecorder::new("+[]", limits);
        recorder.record_all();
        let steps = recorder.into_steps();
        assert_eq!(steps.stats.total_steps, 10);
        assert_eq!(steps.stats.termination_reason, TerminationReason::MaxSteps);
    }

    #[test]
    fn test_seek_records_lazily() {
        let mut recorder = TraceRecorder::new("+++++", ExecutionLimits::default());
        assert_eq!(recorder.seek(2).map(|s| s.cells.clone()), Some(vec![2]));
        assert_eq!(recorder.len(), 3);
        // Going back is a lookup only.
        assert_eq!(recorder.get(1).map(|s| s.pc), Some(1));
        assert_eq!(recorder.len(), 3);
        assert!(recorder.seek(99).is_none());
        assert!(recorder.is_finished());
        assert_eq!(recorder.len(), 6);
    }

    #[test]
    fn test_user_input_advances_cursor() {
        let limits = ExecutionLimits::default().with_user_input("z");
        let mut recorder = TraceRecorder::new(",.", limits);
        recorder.record_all();
        let steps = recorder.into_steps();
        assert_eq!(steps.user_input, "z");
        assert_eq!(steps.steps[1].input_position, 1);
        assert_eq!(steps.steps[2].output, "z");
    }

    #[test]
    fn test_wide_tape_raises_max_cells() {
        let program = format!("{}+", ">".repeat(20));
        let mut recorder = TraceRecorder::new(program.as_str(), ExecutionLimits::default());
        recorder.record_all();
        assert_eq!(recorder.to_steps().max_cells, 21);
    }

    #[test]
    fn test_vm_caches_trace() {
        let vm = Vm::new("+.", ExecutionLimits::default());
        let first = vm.steps() as *const Steps;
        let second = vm.steps() as *const Steps;
        assert_eq!(first, second);
        assert_eq!(vm.steps().steps.len(), 3);
        // The trace is recorded on a separate interpreter.
        assert_eq!(vm.step_count(), 0);
    }

    #[test]
    fn test_export_field_names() {
        let mut recorder = TraceRecorder::new("+", ExecutionLimits::default());
        recorder.record_all();
        let json = serde_json::to_value(recorder.into_steps()).unwrap();
        assert_eq!(json["input"], "+");
        assert_eq!(json["max_cells"], 15);
        assert_eq!(json["steps"][1]["index"], 1);
        assert_eq!(json["steps"][0]["instruction"], "+");
        assert_eq!(json["stats"]["terminationReason"], "completed");
        assert!(json["stats"].get("error").is_none());
    }

    #[tokio::test]
    async fn test_async_step_forward_with_provider() {
        let mut provider = FnInput(|| async { Ok(b'Q') });
        let mut recorder = TraceRecorder::new(",.", ExecutionLimits::default());
        recorder.step_forward_async(&mut provider).await.unwrap();
        let step = recorder.step_forward_async(&mut provider).await.unwrap();
        assert_eq!(step.output, "Q");
        assert!(recorder.is_finished());
    }
}
