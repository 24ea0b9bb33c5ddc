use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use bfkit::codec::{compress, decompress};
use bfkit::encoder::encode;
use bfkit::input::StdinInput;
use bfkit::metrics::{EncodingStats, compression_ratio, instruction_histogram, max_loop_depth};
use bfkit::program::Instruction;
use bfkit::table::TransitionTable;
use bfkit::{ExecutionLimits, Program, TraceRecorder, Vm};

#[derive(Parser)]
#[command(name = "bfkit", about = "Run, trace, encode and compress tape-language programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a program and print its output.
    Run {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        limits: LimitArgs,

        /// Read `,` input from stdin as the program asks for it.
        #[arg(long)]
        interactive: bool,
    },

    /// Record a step-by-step trace and print it as JSON.
    Trace {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        limits: LimitArgs,
    },

    /// Report unmatched brackets without running.
    Validate {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Generate a program that prints TEXT.
    Encode {
        /// Text to encode.
        text: String,

        /// Run the generated program and check it reproduces TEXT.
        #[arg(long)]
        verify: bool,
    },

    /// Pack instruction n-grams into single characters.
    Compress {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Expand packed characters back into instructions.
    Decompress {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Show instruction counts and compression ratio.
    Stats {
        #[command(flatten)]
        source: SourceArgs,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Program file (stdin if neither FILE nor --code is given).
    file: Option<PathBuf>,

    /// Program text given inline.
    #[arg(short = 'e', long = "code", conflicts_with = "file")]
    code: Option<String>,
}

impl SourceArgs {
    fn read(&self) -> Result<String> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        if let Some(path) = &self.file {
            return std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()));
        }
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    }
}

#[derive(Args)]
struct LimitArgs {
    /// JSON file with `timeout`, `maxSteps`, `maxMemory`, `userInput`.
    #[arg(long)]
    limits: Option<PathBuf>,

    /// Wall-clock budget in milliseconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Instruction budget.
    #[arg(long)]
    max_steps: Option<u64>,

    /// Number of addressable cells.
    #[arg(long)]
    max_memory: Option<usize>,

    /// Input consumed by `,`.
    #[arg(long)]
    input: Option<String>,
}

impl LimitArgs {
    /// File values first, then individual flags on top.
    fn resolve(&self) -> Result<ExecutionLimits> {
        let mut limits = match &self.limits {
            Some(path) => ExecutionLimits::from_json_file(path)
                .with_context(|| format!("loading limits from {}", path.display()))?,
            None => ExecutionLimits::default(),
        };
        if let Some(timeout) = self.timeout {
            limits.timeout_ms = timeout;
        }
        if let Some(max_steps) = self.max_steps {
            limits.max_steps = max_steps;
        }
        if let Some(max_memory) = self.max_memory {
            limits.max_memory = max_memory;
        }
        if let Some(input) = &self.input {
            limits.user_input = input.clone();
        }
        Ok(limits)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            source,
            limits,
            interactive,
        } => cmd_run(&source, &limits, interactive).await,
        Commands::Trace { source, limits } => cmd_trace(&source, &limits),
        Commands::Validate { source } => cmd_validate(&source),
        Commands::Encode { text, verify } => cmd_encode(&text, verify).await,
        Commands::Compress { source } => {
            println!("{}", compress(&Program::new(&source.read()?).to_string()));
            Ok(())
        }
        Commands::Decompress { source } => {
            println!("{}", decompress(source.read()?.trim_end_matches('\n')));
            Ok(())
        }
        Commands::Stats { source } => cmd_stats(&source),
    }
}

async fn cmd_run(source: &SourceArgs, limits: &LimitArgs, interactive: bool) -> Result<()> {
    if interactive && source.file.is_none() && source.code.is_none() {
        bail!("--interactive needs the program from FILE or --code, stdin is used for input");
    }
    let mut vm = Vm::new(source.read()?.as_str(), limits.resolve()?);

    let errors = vm.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("{e}");
        }
        bail!("program has {} unmatched bracket(s)", errors.len());
    }

    let result = if interactive {
        vm.run_with_input(&mut StdinInput::new()).await
    } else {
        vm.run_async().await
    };

    let mut stdout = std::io::stdout();
    // Cells are bytes; print them as such rather than as UTF-8 text.
    let bytes: Vec<u8> = vm.output().chars().map(|c| c as u32 as u8).collect();
    stdout.write_all(&bytes)?;
    stdout.flush()?;

    match result {
        Ok(_) => {
            info!(steps = vm.step_count(), "completed");
            Ok(())
        }
        Err(e) => {
            error!(reason = %e.reason(), steps = vm.step_count(), "{e}");
            bail!("execution failed: {e}")
        }
    }
}

fn cmd_trace(source: &SourceArgs, limits: &LimitArgs) -> Result<()> {
    let mut recorder = TraceRecorder::new(source.read()?.as_str(), limits.resolve()?);
    recorder.record_all();
    let steps = recorder.into_steps();
    info!(
        steps = steps.stats.total_steps,
        reason = %steps.stats.termination_reason,
        "trace recorded"
    );
    println!("{}", serde_json::to_string_pretty(&steps)?);
    Ok(())
}

fn cmd_validate(source: &SourceArgs) -> Result<()> {
    let program = Program::new(&source.read()?);
    let errors = program.validate();
    if errors.is_empty() {
        println!("ok ({} instructions)", program.len());
        return Ok(());
    }
    for e in &errors {
        println!("{e}");
    }
    std::process::exit(1);
}

async fn cmd_encode(text: &str, verify: bool) -> Result<()> {
    info!("building transition table");
    let table = TransitionTable::shared_async().await;
    let program = encode(text, table);
    println!("{program}");

    let stats = EncodingStats::new(text, &program);
    eprintln!("text length = {} chars", stats.text_len);
    eprintln!("code length = {} instructions", stats.code_len);
    eprintln!("ratio = {:.2}", stats.ratio);

    if verify {
        let limits = ExecutionLimits::default()
            .with_max_steps(u64::MAX)
            .with_timeout_ms(60_000)
            .with_max_memory(usize::MAX);
        let output = Vm::new(program.as_str(), limits).run_async().await?;
        let expected: String = text.chars().map(|c| char::from(c as u32 as u8)).collect();
        if output != expected {
            bail!("generated program printed {output:?}, expected {expected:?}");
        }
        info!("verified");
    }
    Ok(())
}

fn cmd_stats(source: &SourceArgs) -> Result<()> {
    let program = Program::new(&source.read()?);
    let hist = instruction_histogram(&program);

    println!("instructions: {}", program.len());
    for inst in Instruction::ALL {
        println!("  {inst}  {}", hist[inst as usize]);
    }
    println!("max loop depth: {}", max_loop_depth(&program));
    println!("compression ratio: {:.3}", compression_ratio(program.as_str()));
    Ok(())
}
