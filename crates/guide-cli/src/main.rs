//! Guided Learning CLI
//!
//! Runs an interactive tutoring session in the terminal for one lesson of a
//! lesson plan.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::Parser;
use guide_engine::{
    find_lesson_plans, Config, GuideError, LessonContext, LessonPlan, OpenAiCompatibleClient,
    OrchestrationEngine, PathOption, SessionState, TranscriptGenerator, TurnOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

/// Words that end the session when typed at any prompt.
const QUIT_WORDS: [&str; 3] = ["quit", "exit", "q"];

/// Guide - Interactive Tutoring Sessions
///
/// Teaches one lesson of a lesson plan through a sequence of short turns,
/// checking each of your answers before moving on.
#[derive(Parser, Debug)]
#[command(name = "guide")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the lesson plan JSON file (default: first LessonPlan*.json in the current directory)
    #[arg(value_name = "LESSON_FILE")]
    lesson_file: Option<PathBuf>,

    /// Lesson number to teach (prompted for when omitted)
    #[arg(short = 'n', long, value_name = "N")]
    lesson_number: Option<u32>,

    /// List the lessons in the plan and exit
    #[arg(short, long)]
    list_lessons: bool,

    /// Path to configuration file (default: guide.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Write a Markdown transcript of the session to this file on exit
    #[arg(short, long, value_name = "FILE")]
    transcript: Option<PathBuf>,
}

/// How an input prompt was answered.
enum Input {
    Line(String),
    Quit,
}

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args) {
        eprintln!("Error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("Guide starting");
    tracing::debug!(config = ?args.config, lesson_file = ?args.lesson_file, "Arguments");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Installs the tracing subscriber.
///
/// Priority: `RUST_LOG` env var > --verbose flag > default (warn).
fn init_tracing(args: &Args) -> anyhow::Result<()> {
    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match &args.log_file {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                anyhow::anyhow!("Failed to create log file '{}': {e}", path.display())
            })?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    Ok(())
}

/// Runs one tutoring session.
///
/// 1. Load config and lesson plan
/// 2. Pick the lesson
/// 3. Generate and select a teaching path
/// 4. Exchange turns until the path is complete or the learner quits
/// 5. Write the transcript
async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let plan_path = resolve_lesson_plan(args.lesson_file)?;
    let plan = LessonPlan::load(&plan_path)?;

    if args.list_lessons {
        print_lessons(&plan);
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let lesson_number = match args.lesson_number {
        Some(number) => number,
        None => match prompt_lesson_number(&plan, &mut lines).await? {
            Some(number) => number,
            None => return Ok(()),
        },
    };
    let lesson = plan.lesson(lesson_number)?;

    let client = OpenAiCompatibleClient::from_config(&config)?;
    print_config(&config, client.model());
    let engine = OrchestrationEngine::new(Arc::new(client), &config);

    let mut state = engine.new_session(lesson);
    print_lesson(&state.lesson_context);

    let finished = teach(&engine, &mut state, &mut lines).await;

    if let Some(path) = &args.transcript {
        write_transcript(&state, path)?;
    }
    println!();
    print_summary(&state);

    finished
}

/// Drives path selection and the turn loop.
async fn teach(
    engine: &OrchestrationEngine,
    state: &mut SessionState,
    lines: &mut StdinLines,
) -> anyhow::Result<()> {
    println!();
    println!("Designing teaching paths...");
    let options = engine.initialize_session(state).await?;
    print_path_options(&options);

    loop {
        let Input::Line(choice) = read_input(lines, "Choose a path: ").await? else {
            return Ok(());
        };
        match engine.select_path(state, choice.trim()) {
            Ok(()) => break,
            Err(e @ GuideError::InvalidPathId { .. }) => println!("{e}"),
            Err(e) => return Err(e.into()),
        }
    }

    println!();
    let first_turn = engine.start_teaching(state).await?;
    print_turn(state, &first_turn);

    loop {
        let Input::Line(reply) = read_input(lines, "\nYou: ").await? else {
            tracing::info!(session_id = %state.session_id, "Learner quit the session");
            return Ok(());
        };
        if reply.trim().is_empty() {
            continue;
        }

        match engine.process_user_response(state, reply.trim()).await {
            Ok(TurnOutcome::Turn(text)) => print_turn(state, &text),
            Ok(TurnOutcome::Completed) => {
                println!();
                println!(
                    "Well done! You have completed \"{}\".",
                    state.lesson_context.title
                );
                return Ok(());
            }
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "Turn failed, waiting for the learner to retry");
                println!();
                println!("{e}");
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Prints `prompt` and reads one line; quit words, EOF and Ctrl+C end the session.
async fn read_input(lines: &mut StdinLines, prompt: &str) -> anyhow::Result<Input> {
    print!("{prompt}");
    std::io::stdout().flush()?;

    tokio::select! {
        line = lines.next_line() => match line? {
            Some(line) if is_quit(&line) => Ok(Input::Quit),
            Some(line) => Ok(Input::Line(line)),
            None => Ok(Input::Quit),
        },
        Ok(()) = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, ending session");
            println!();
            Ok(Input::Quit)
        }
    }
}

fn is_quit(line: &str) -> bool {
    let line = line.trim();
    QUIT_WORDS.iter().any(|word| line.eq_ignore_ascii_case(word))
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&Path>) -> anyhow::Result<Config> {
    match config_path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Ok(Config::load_from_file(path)?)
        }
        None => Ok(Config::load()?),
    }
}

/// Uses the given lesson plan, or the first `LessonPlan*.json` in the current directory.
fn resolve_lesson_plan(lesson_file: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = lesson_file {
        return Ok(path);
    }

    let cwd = std::env::current_dir()?;
    find_lesson_plans(&cwd).into_iter().next().ok_or_else(|| {
        anyhow::anyhow!(
            "No lesson plan found in '{}'\n\nSuggestion: Pass a lesson plan file or add a LessonPlan*.json file to the current directory",
            cwd.display()
        )
    })
}

/// Asks for a lesson number; an empty answer picks the first lesson.
async fn prompt_lesson_number(
    plan: &LessonPlan,
    lines: &mut StdinLines,
) -> anyhow::Result<Option<u32>> {
    print_lessons(plan);
    let default = plan.lessons.first().map_or(1, |lesson| lesson.lesson_number);

    loop {
        let Input::Line(answer) = read_input(lines, &format!("\nLesson number [{default}]: ")).await?
        else {
            return Ok(None);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Some(default));
        }
        match answer.parse::<u32>() {
            Ok(number) if plan.lessons.iter().any(|l| l.lesson_number == number) => {
                return Ok(Some(number));
            }
            _ => println!("Please enter one of the lesson numbers listed above."),
        }
    }
}

fn write_transcript(state: &SessionState, path: &Path) -> anyhow::Result<()> {
    let markdown = TranscriptGenerator::new(state).generate();
    std::fs::write(path, markdown).map_err(|e| {
        anyhow::anyhow!("Failed to write transcript '{}': {e}", path.display())
    })?;
    tracing::info!(path = %path.display(), "Transcript written");
    println!("Transcript saved to {}", path.display());
    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config, model: &str) {
    println!("Configuration loaded:");
    println!("  Provider: {:?}", config.provider);
    println!("  Endpoint: {}", config.resolved_base_url());
    println!("  Model: {model}");
    println!("  Reviewer retries: {}", config.max_reviewer_retries);
}

/// Prints the lessons of a plan.
fn print_lessons(plan: &LessonPlan) {
    println!("{}", plan.module_title);
    for summary in plan.summaries() {
        println!("  {:>2}. {}", summary.number, summary.title);
        if !summary.topics.is_empty() {
            println!("      Topics: {}", summary.topics.join(", "));
        }
    }
}

/// Prints the lesson header.
fn print_lesson(lesson: &LessonContext) {
    println!();
    println!("=== {} ===", lesson.title);
    println!("Objectives:");
    for objective in &lesson.objectives {
        println!("  - {objective}");
    }
    println!("Type 'quit' at any prompt to stop.");
}

/// Prints the generated path options.
fn print_path_options(options: &[PathOption]) {
    println!();
    for option in options {
        println!("[{}] {} ({} steps)", option.id, option.name, option.node_count);
        if !option.description.is_empty() {
            println!("    {}", option.description);
        }
        for (i, node) in option.sequence.iter().enumerate() {
            println!("    {}. {}", i + 1, node.concept);
        }
        println!();
    }
}

/// Prints a tutor turn with the current position.
fn print_turn(state: &SessionState, text: &str) {
    if let (Some((position, total)), Some(node)) = (state.progress(), state.current_node()) {
        println!();
        println!("--- Step {position}/{total}: {} ---", node.concept);
    }
    println!();
    println!("Tutor: {text}");
}

/// Prints the end-of-session summary.
fn print_summary(state: &SessionState) {
    println!("=== Session Summary ===");
    println!("Status: {}", state.status());
    if let Some((position, total)) = state.progress() {
        let reached = if state.is_complete() { total } else { position };
        println!("Progress: {reached}/{total} steps");
    }

    let elapsed = state.elapsed();
    println!(
        "Duration: {}m {}s",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );
}
