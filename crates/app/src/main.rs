use std::fmt;

use chrono::{DateTime, Utc};
use progress_core::model::{AnswerEvent, AttemptKey, OutcomeId, PracticeBlockId};
use services::{Clock, EngineConfig, ProgressEngine, Submission};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq)]
struct Args {
    db_url: String,
    learner: String,
    lesson: String,
    course: String,
    block: String,
    outcome: Option<String>,
    answers: Vec<AnswerEvent>,
    personalized: bool,
    confidence: bool,
    complete: bool,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidAnswer { raw: String },
    InvalidNow { raw: String },
    NoAnswers,
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidAnswer { raw } => {
                write!(f, "invalid answer (expected c or x, optionally @seconds): {raw}")
            }
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
            ArgsError::NoAnswers => write!(f, "--answers must list at least one answer"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Parses `c,c@8,x@50`: `c` correct, `x` incorrect, `@n` response seconds.
fn parse_answers(raw: &str) -> Result<Vec<AnswerEvent>, ArgsError> {
    let mut answers = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let invalid = || ArgsError::InvalidAnswer {
            raw: token.to_owned(),
        };
        let (mark, seconds) = match token.split_once('@') {
            Some((mark, seconds)) => {
                let seconds: f64 = seconds.parse().map_err(|_| invalid())?;
                if !seconds.is_finite() || seconds < 0.0 {
                    return Err(invalid());
                }
                (mark, Some(seconds))
            }
            None => (token, None),
        };
        let mut answer = match mark {
            "c" => AnswerEvent::correct(),
            "x" => AnswerEvent::incorrect(),
            _ => return Err(invalid()),
        };
        if let Some(seconds) = seconds {
            answer = answer.with_response_time(seconds);
        }
        answers.push(answer);
    }
    if answers.is_empty() {
        return Err(ArgsError::NoAnswers);
    }
    Ok(answers)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let defaults = Self {
            db_url: std::env::var("PROGRESS_DB_URL")
                .unwrap_or_else(|_| "sqlite:progress.sqlite3?mode=rwc".into()),
            learner: std::env::var("PROGRESS_LEARNER").unwrap_or_else(|_| "learner-1".into()),
            lesson: std::env::var("PROGRESS_LESSON").unwrap_or_else(|_| "lesson-1".into()),
            course: std::env::var("PROGRESS_COURSE").unwrap_or_else(|_| "course-1".into()),
            block: std::env::var("PROGRESS_BLOCK").unwrap_or_else(|_| "block-1".into()),
            outcome: std::env::var("PROGRESS_OUTCOME").ok(),
            answers: Vec::new(),
            personalized: env_flag("PROGRESS_PERSONALIZED"),
            confidence: env_flag("PROGRESS_CONFIDENCE"),
            complete: false,
            now: None,
        };
        let answers = std::env::var("PROGRESS_ANSWERS").unwrap_or_else(|_| "c,c,c,x,x".into());
        Self::parse_from(defaults, &answers, std::env::args().skip(1))
    }

    fn parse_from(
        mut parsed: Self,
        default_answers: &str,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        let mut answers = default_answers.to_owned();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = value;
                }
                "--learner" => parsed.learner = require_value(&mut args, "--learner")?,
                "--lesson" => parsed.lesson = require_value(&mut args, "--lesson")?,
                "--course" => parsed.course = require_value(&mut args, "--course")?,
                "--block" => parsed.block = require_value(&mut args, "--block")?,
                "--outcome" => parsed.outcome = Some(require_value(&mut args, "--outcome")?),
                "--answers" => answers = require_value(&mut args, "--answers")?,
                "--personalized" => parsed.personalized = true,
                "--confidence" => parsed.confidence = true,
                "--complete" => parsed.complete = true,
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let at = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    parsed.now = Some(at);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }
        parsed.answers = parse_answers(&answers)?;
        Ok(parsed)
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p progress-app -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>     SQLite URL (default: sqlite:progress.sqlite3?mode=rwc)");
    eprintln!("  --learner <id>        Learner id (default: learner-1)");
    eprintln!("  --lesson <id>         Lesson id (default: lesson-1)");
    eprintln!("  --course <id>         Course id (default: course-1)");
    eprintln!("  --block <id>          Practice block id (default: block-1)");
    eprintln!("  --outcome <id>        Outcome scored by each answer (default: <block>.core)");
    eprintln!("  --answers <list>      Answers such as c,c@8,x@50 (default: c,c,c,x,x)");
    eprintln!("  --personalized        Tune thresholds from the learner's history");
    eprintln!("  --confidence          Weight correct streaks by answer confidence");
    eprintln!("  --complete            Complete the attempt after the last answer");
    eprintln!("  --now <rfc3339>       Fixed current time for deterministic runs");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!(
        "  PROGRESS_DB_URL, PROGRESS_LEARNER, PROGRESS_LESSON, PROGRESS_COURSE, PROGRESS_BLOCK,"
    );
    eprintln!(
        "  PROGRESS_OUTCOME, PROGRESS_ANSWERS, PROGRESS_PERSONALIZED, PROGRESS_CONFIDENCE"
    );
    eprintln!("  RUST_LOG controls log output (default: info)");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let clock = args.now.map_or_else(Clock::system, Clock::fixed);
    let config = EngineConfig::with_features(args.personalized, args.confidence);
    let engine = ProgressEngine::new_sqlite(&args.db_url, clock, config).await?;
    let attempts = engine.attempts();
    let progress = engine.progress();

    let status = attempts.get_status(&args.lesson, &args.learner, true).await?;
    println!(
        "lesson {} for {}: {:?} ({:?}), {} completed",
        args.lesson, args.learner, status.state, status.action, status.completed_count
    );

    let key = AttemptKey::parse(&args.lesson, &args.learner, &args.course)?;
    let block = PracticeBlockId::parse(&args.block)?;
    let outcome = match &args.outcome {
        Some(raw) => OutcomeId::parse(raw)?,
        None => OutcomeId::parse(format!("{block}.core"))?,
    };

    let mut attempt_id = None;
    for (n, answer) in args.answers.iter().enumerate() {
        let score = if answer.is_correct { 1.0 } else { 0.0 };
        let submission = Submission::new(key.clone(), block.clone(), *answer)
            .with_score(outcome.clone(), score);
        let result = progress.submit_answer(&submission).await?;
        if result.is_new_attempt {
            tracing::info!(attempt_id = %result.attempt_id, "started attempt");
        }
        attempt_id = Some(result.attempt_id);

        let mastery = result
            .mastery
            .get(&outcome)
            .map_or(0.0, |update| update.new_value);
        println!(
            "#{:<2} {:<9} mastery {:.3}  level {:<6} {:?}",
            n + 1,
            if answer.is_correct { "correct" } else { "incorrect" },
            mastery,
            result.difficulty.state.level.as_str(),
            result.difficulty.step.change_type,
        );
    }

    if args.complete {
        if let Some(id) = attempt_id {
            let done = attempts
                .complete_attempt(&id.to_string(), &args.learner)
                .await?;
            println!("completed attempt {}", done.id);
        }
    }

    let status = attempts.get_status(&args.lesson, &args.learner, true).await?;
    println!(
        "now {:?} ({:?}), {} completed",
        status.state, status.action, status.completed_count
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
