//! Examgen CLI - question bank statistics, exam generation and PDF extraction

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use examgen_core::extract::{extract_all, write_bank_csv};
use examgen_core::{
    assemble_now, export_to_file, load_csv, Assembly, BankLoader, BankSource, Exam, ExportFormat,
    HeuristicExtractor, LlmExtractor, PoolSummary, QuestionBank, QuestionExtractor,
    QuestionFilter, RandomPermuter, SheetCache,
};

/// Exit code when the filters and target leave no possible exam
const EXIT_NO_EXAM: u8 = 2;

#[derive(Parser)]
#[command(name = "examgen")]
#[command(about = "Randomized exam generation from a shared question bank")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path of the cache for fetched spreadsheets
    #[arg(long, global = true, default_value = "./examgen-cache.db")]
    cache: PathBuf,

    /// Always re-fetch remote spreadsheets
    #[arg(long, global = true)]
    no_cache: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show question bank statistics
    Stats {
        /// CSV file, URL, or spreadsheet id / link
        #[arg(short, long)]
        source: String,
    },

    /// Randomly assemble an exam close to a target score
    Generate {
        /// CSV file, URL, or spreadsheet id / link
        #[arg(short, long)]
        source: String,

        /// Subjects to include (default: all)
        #[arg(long = "subject")]
        subjects: Vec<String>,

        /// Question types to include (default: all)
        #[arg(long = "type")]
        types: Vec<String>,

        /// Lowest question score to include
        #[arg(long)]
        min_score: Option<u32>,

        /// Highest question score to include
        #[arg(long)]
        max_score: Option<u32>,

        /// Target total score
        #[arg(short, long, default_value = "100", allow_negative_numbers = true)]
        target: i64,

        /// Seed for a reproducible exam
        #[arg(long)]
        seed: Option<u64>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Export the exam to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export format (csv, json, md); guessed from --output when omitted
        #[arg(short, long)]
        export: Option<String>,
    },

    /// Extract questions from PDF files into a question sheet CSV
    Extract {
        /// PDF file or directory of PDFs
        #[arg(short, long)]
        input: PathBuf,

        /// CSV file to write
        #[arg(short, long, default_value = "./extracted_questions.csv")]
        output: PathBuf,

        /// Extraction backend (heuristic, llm)
        #[arg(short, long, default_value = "heuristic")]
        backend: String,

        /// Model for the llm backend
        #[arg(short, long)]
        model: Option<String>,

        /// API key for the llm backend
        #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Existing question CSV to merge the extracted questions into
        #[arg(long)]
        merge: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Stats { source } => {
            let bank = load_bank(&source, &cli.cache, cli.no_cache)?;
            print_stats(&bank);
        }

        Commands::Generate {
            source,
            subjects,
            types,
            min_score,
            max_score,
            target,
            seed,
            format,
            output,
            export,
        } => {
            let bank = load_bank(&source, &cli.cache, cli.no_cache)?;
            let filter = build_filter(&bank, subjects, types, min_score, max_score);

            let pool = PoolSummary::of(&filter.apply(bank.questions()));
            tracing::info!(
                "{} questions match the filters, {} points in total",
                pool.count,
                pool.total_score
            );

            let mut permuter = match seed {
                Some(seed) => RandomPermuter::seeded(seed),
                None => RandomPermuter::from_entropy(),
            };

            let exam = match assemble_now(bank.questions(), target, &filter, &mut permuter)? {
                Assembly::Assembled(exam) => exam,
                Assembly::NoExamPossible(reason) => {
                    eprintln!("{} {}", "✗".red(), reason.hint());
                    return Ok(ExitCode::from(EXIT_NO_EXAM));
                }
            };

            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&exam)?);
            } else {
                print_exam(&exam);
            }

            if let Some(path) = output {
                let export_format = match export {
                    Some(name) => name.parse()?,
                    None => ExportFormat::from_path(&path).unwrap_or(ExportFormat::Csv),
                };
                let path = if path.is_dir() {
                    path.join(examgen_core::export::default_file_name(&exam, export_format))
                } else {
                    path
                };
                export_to_file(&exam, export_format, &path)?;
                eprintln!("{} Exam saved to {}", "✓".green(), path.display().to_string().cyan());
            }
        }

        Commands::Extract {
            input,
            output,
            backend,
            model,
            api_key,
            merge,
        } => {
            run_extract(&input, &output, &backend, model.as_deref(), api_key.as_deref(), merge.as_deref())?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn load_bank(source: &str, cache_path: &Path, no_cache: bool) -> Result<QuestionBank> {
    let source = BankSource::parse(source);

    let cache = match (&source, no_cache) {
        (BankSource::File(_), _) | (_, true) => None,
        _ => match SheetCache::open(cache_path) {
            Ok(cache) => Some(cache),
            Err(e) => {
                tracing::warn!("Continuing without sheet cache: {:#}", e);
                None
            }
        },
    };

    let bank = BankLoader::new(cache)
        .load(&source)
        .with_context(|| format!("Failed to load question bank from {:?}", source))?;

    if bank.is_empty() {
        tracing::warn!("Question bank has no usable questions");
    }
    Ok(bank)
}

fn build_filter(
    bank: &QuestionBank,
    subjects: Vec<String>,
    types: Vec<String>,
    min_score: Option<u32>,
    max_score: Option<u32>,
) -> QuestionFilter {
    let mut filter = QuestionFilter::all_of(bank);

    if !subjects.is_empty() {
        for subject in &subjects {
            if !filter.subjects.contains(subject) {
                tracing::warn!("Subject {:?} does not occur in the question bank", subject);
            }
        }
        filter.subjects = subjects.into_iter().collect();
    }
    if !types.is_empty() {
        for kind in &types {
            if !filter.types.contains(kind) {
                tracing::warn!("Question type {:?} does not occur in the question bank", kind);
            }
        }
        filter.types = types.into_iter().collect();
    }

    if min_score.is_some() || max_score.is_some() {
        let (lowest, highest) = bank.score_bounds().unwrap_or((0, u32::MAX));
        filter = filter.with_score_range(min_score.unwrap_or(lowest), max_score.unwrap_or(highest));
    }

    filter
}

fn print_stats(bank: &QuestionBank) {
    println!("\n=== Question Bank ===");
    println!("Questions:    {}", bank.len());
    println!("Total score:  {}", bank.total_score());
    if let Some((min, max)) = bank.score_bounds() {
        println!("Score range:  {} - {}", min, max);
    }
    println!("Subjects:     {}", bank.subjects().join(", "));
    println!("Types:        {}", bank.types().join(", "));
}

fn print_exam(exam: &Exam) {
    println!("\n{}", "═".repeat(60).bright_blue());
    println!(
        "  {} {}   {} {}   {} {}",
        "總分".bold(),
        format!("{} 分", exam.total_score()).cyan(),
        "題數".bold(),
        format!("{} 題", exam.question_count()).cyan(),
        "生成時間".bold(),
        exam.generated_at_display().cyan()
    );
    println!("{}", "═".repeat(60).bright_blue());

    for (idx, q) in exam.questions().iter().enumerate() {
        println!(
            "\n{}",
            format!("第 {} 題 ({} 分)", idx + 1, q.score).bold().yellow()
        );
        println!("  科目：{}  |  類型：{}", q.subject, q.question_type);
        println!("  {}", q.content.replace('\n', "\n  "));
        if let Some(answer) = q.reference_answer() {
            println!("  {} {}", "參考解答：".green(), answer.replace('\n', "\n  "));
        }
    }
    println!();
}

fn run_extract(
    input: &Path,
    output: &Path,
    backend: &str,
    model: Option<&str>,
    api_key: Option<&str>,
    merge: Option<&Path>,
) -> Result<()> {
    let extractor: Box<dyn QuestionExtractor> = match backend {
        "heuristic" => Box::new(HeuristicExtractor::new()),
        "llm" => {
            let key = api_key.context("The llm backend needs --api-key or ANTHROPIC_API_KEY")?;
            Box::new(LlmExtractor::new(key, model)?)
        }
        other => anyhow::bail!("Unknown extraction backend: {} (expected heuristic or llm)", other),
    };

    let (questions, report) = extract_all(extractor.as_ref(), input)?;

    let (bank, skipped) = match merge {
        Some(path) => {
            let file = fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
            let mut bank = load_csv(file).with_context(|| format!("Failed to load {:?}", path))?;
            let skipped = bank.merge(QuestionBank::new(questions));
            (bank, skipped)
        }
        None => (QuestionBank::new(questions), 0),
    };

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = fs::File::create(output).with_context(|| format!("Failed to create {:?}", output))?;
    write_bank_csv(file, bank.questions())?;

    println!("Files found:        {}", report.files_found);
    println!("Files extracted:    {}", report.files_extracted);
    println!("Questions found:    {}", report.questions);
    println!("Duplicates skipped: {}", skipped);
    println!("Errors:             {}", report.errors);
    println!("Questions written:  {} -> {}", bank.len(), output.display());

    Ok(())
}
