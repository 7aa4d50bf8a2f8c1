//! CLI for the babel library

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use babel::model::DEFAULT_SUGGESTIONS;
use babel::{
    Address, Budget, ChainSynthesizer, ContextModel, Library, LibraryConfig, Probe, Results,
    Synthesizer, UniformSynthesizer,
};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "babel")]
#[command(about = "Search a procedurally generated library of Babel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Training corpus (phrases separated by newlines or commas).
    /// Without it, pages are uniform random characters.
    #[arg(short, long)]
    corpus: Option<PathBuf>,

    /// Library configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Search every address for a target string
    Search {
        /// Text to look for (case-insensitive)
        target: String,

        #[command(flatten)]
        source: Source,

        /// Number of workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Report the lowest matching address instead of the first found
        #[arg(long)]
        deterministic: bool,

        /// Let other workers finish after a match
        #[arg(long)]
        no_cancel: bool,

        /// Give up after this many milliseconds
        #[arg(long)]
        deadline_ms: Option<u64>,
    },

    /// Generate candidates until one contains the target
    Probe {
        /// Text to look for (case-insensitive)
        target: String,

        #[command(flatten)]
        source: Source,

        /// Maximum number of candidates
        #[arg(short = 'n', long, default_value_t = 1_000_000)]
        iterations: u64,

        /// Maximum run time in seconds
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Shortest candidate, in tokens
        #[arg(long, default_value_t = 5)]
        min: usize,

        /// Longest candidate, in tokens
        #[arg(long, default_value_t = 20)]
        max: usize,
    },

    /// Print the book at an address
    Read {
        #[arg(long, default_value_t = 0)]
        room: u64,

        #[arg(long, default_value_t = 0)]
        shelf: u64,

        #[arg(long, default_value_t = 0)]
        book: u64,

        #[command(flatten)]
        source: Source,
    },

    /// Write a short passage from a prompt, word by word
    Compose {
        /// Prompt text
        input: String,

        /// Training corpus
        #[arg(short, long)]
        corpus: PathBuf,

        /// Maximum number of words
        #[arg(short, long, default_value_t = 100)]
        max_words: usize,
    },

    /// Show the most frequent next words after a context
    Suggest {
        /// Context text; its last words form the lookup key
        context: String,

        /// Training corpus
        #[arg(short, long)]
        corpus: PathBuf,

        /// Number of suggestions
        #[arg(short = 'k', long, default_value_t = DEFAULT_SUGGESTIONS)]
        count: usize,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LibraryConfig> {
    match path {
        Some(p) => LibraryConfig::from_path(p).with_context(|| format!("reading {}", p.display())),
        None => Ok(LibraryConfig::default()),
    }
}

fn synthesizer(corpus: Option<&PathBuf>, order: usize) -> Arc<dyn Synthesizer> {
    match corpus {
        Some(path) => Arc::new(ChainSynthesizer::new(Arc::new(ContextModel::load_or_empty(path, order)))),
        None => Arc::new(UniformSynthesizer::new()),
    }
}

fn open_library(source: &Source) -> anyhow::Result<Library> {
    let config = load_config(source.config.as_ref())?;
    let synth = synthesizer(source.corpus.as_ref(), config.context_order);
    Ok(Library::from_config(&config, synth)?)
}

fn report(results: &Results) {
    match results.hit() {
        Some(hit) => {
            println!("Found at {} (page {})", hit.address, hit.page_index);
            println!();
            println!("{}", hit.content);
        }
        None => println!("Not found."),
    }
    let s = &results.stats;
    eprintln!(
        "inspected {} in {:.3}s ({}/s){}",
        s.inspected,
        s.duration.as_secs_f64(),
        s.per_sec,
        s.stopped.map(|r| format!(", stopped: {r:?}")).unwrap_or_default()
    );
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("babel=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Search {
            target,
            source,
            workers,
            deterministic,
            no_cancel,
            deadline_ms,
        } => {
            let library = Arc::new(open_library(&source)?);

            let last = Arc::new(AtomicU64::new(0));
            let mut builder = babel::search()
                .library(library)
                .matching(target)
                .deterministic(deterministic)
                .cancel_on_match(!no_cancel)
                .on_progress(move |fraction| {
                    let pct = (fraction * 100.0) as u64;
                    if last.fetch_max(pct, Ordering::Relaxed) < pct {
                        eprint!("\r{pct:3}%");
                        let _ = std::io::stderr().flush();
                    }
                });
            if let Some(n) = workers {
                builder = builder.workers(n);
            }
            if let Some(ms) = deadline_ms {
                builder = builder.deadline(Duration::from_millis(ms));
            }

            let results = builder.run()?;
            eprintln!();
            report(&results);
        }

        Commands::Probe {
            target,
            source,
            iterations,
            seconds,
            min,
            max,
        } => {
            let config = load_config(source.config.as_ref())?;
            let synth = synthesizer(source.corpus.as_ref(), config.context_order);

            let mut budget = Budget::iterations(iterations);
            if let Some(s) = seconds {
                budget = budget.and_time(Duration::from_secs(s));
            }

            let results = Probe::new(synth).lengths(min..=max).run(&target, budget)?;
            report(&results);
        }

        Commands::Read {
            room,
            shelf,
            book,
            source,
        } => {
            let library = open_library(&source)?;
            let address = Address::new(room, shelf, book);
            let content = library.get_content(address)?;

            println!("{address}");
            for (i, page) in content.pages().iter().enumerate() {
                println!();
                println!("-- page {} --", i + 1);
                println!("{}", page.text());
            }
        }

        Commands::Compose {
            input,
            corpus,
            max_words,
        } => {
            let model = ContextModel::from_path(&corpus, babel::model::DEFAULT_ORDER)?;
            let synth = ChainSynthesizer::new(Arc::new(model));
            let mut rng = rand::rngs::StdRng::from_entropy();

            let text = synth.compose(&input, max_words, &mut rng, |word, _| {
                eprintln!("word chosen: {word}");
            });
            match text {
                Some(text) => println!("{text}"),
                None => bail!("the prompt has no words"),
            }
        }

        Commands::Suggest {
            context,
            corpus,
            count,
        } => {
            let model = ContextModel::from_path(&corpus, babel::model::DEFAULT_ORDER)?;
            let suggestions = model.suggest(&context, count);
            if suggestions.is_empty() {
                println!("No suggestions.");
            }
            for (word, uses) in suggestions {
                println!("{word} (used {uses} times)");
            }
        }
    }

    Ok(())
}
