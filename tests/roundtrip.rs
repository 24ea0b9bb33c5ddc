use bfkit::codec::{compress, decompress};
use bfkit::encoder::encode_shared;
use bfkit::table::TransitionTable;
use bfkit::{ExecutionLimits, TerminationReason, TraceRecorder, Vm, execute};

const HELLO_WORLD: &str = "++++++++++[>+>+++>+++++++>++++++++++<<<<-]>>>++.>+.+++++++..+++.<<++.>+++++++++++++++.>.+++.------.--------.";
const HELLO_WORLD_NEWLINE: &str = "++++++++++[>+>+++>+++++++>++++++++++<<<<-]>>>++.>+.+++++++..+++.<<++.>+++++++++++++++.>.+++.------.--------.<<+.<.";

#[test]
fn canonical_program_prints_hello_world() {
    assert_eq!(execute(HELLO_WORLD, ExecutionLimits::default()).unwrap(), "Hello World");
    assert_eq!(
        execute(HELLO_WORLD_NEWLINE, ExecutionLimits::default()).unwrap(),
        "Hello World!\n"
    );
}

#[test]
fn encoded_text_runs_back_to_text() {
    let text = "Encoders, decoders & tapes: 100% deterministic.\n";
    let program = encode_shared(text);
    assert_eq!(execute(&program, ExecutionLimits::default()).unwrap(), text);
}

#[test]
fn encoded_program_survives_compression() {
    let text = "compact links";
    let mut program = encode_shared(text);
    // Pad to a length that round-trips exactly.
    while program.len() % 4 == 1 {
        program.push_str("><");
    }
    let restored = decompress(&compress(&program));
    assert_eq!(restored, program);
    assert_eq!(execute(&restored, ExecutionLimits::default()).unwrap(), text);
}

#[test]
fn concurrent_table_requests_share_one_build() {
    let handles: Vec<_> = (0..4)
        .map(|_| std::thread::spawn(|| TransitionTable::shared() as *const TransitionTable as usize))
        .collect();
    let addrs: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(addrs.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn trace_replays_the_run() {
    let mut recorder = TraceRecorder::new(HELLO_WORLD_NEWLINE, ExecutionLimits::default());
    recorder.record_all();
    let steps = recorder.into_steps();
    assert!(steps.stats.completed);
    assert_eq!(steps.steps.last().unwrap().output, "Hello World!\n");
    assert_eq!(steps.stats.total_steps as u64, {
        let mut vm = Vm::new(HELLO_WORLD_NEWLINE, ExecutionLimits::default());
        vm.run().unwrap();
        vm.step_count()
    });

    let json = serde_json::to_string(&steps).unwrap();
    assert!(json.contains("\"terminationReason\":\"completed\""));
}

#[test]
fn infinite_loop_hits_step_limit() {
    let limits = ExecutionLimits::default().with_max_steps(10);
    let err = execute("+[]", limits).unwrap_err();
    assert_eq!(err.reason(), TerminationReason::MaxSteps);
}
