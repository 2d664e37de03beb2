//! cadence: render sessions and run the pattern generators from the terminal

use std::path::PathBuf;

use anyhow::{Context, Result};
use cadence_core::{
    chord_progression, constrained_melody, euclidean_rhythm, scale, MelodyRules, Pitch, ScaleMode, Step,
};
use cadence_services::{load_config, load_or_default, parse_commands, Session};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Generative pattern sequencer")]
#[command(version)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session offline and print every triggered note
    Play {
        /// Config file (defaults to the user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Editor command script (JSON array or one object per line) applied before playing
        #[arg(long)]
        script: Option<PathBuf>,
        /// Transport seconds to render
        #[arg(short, long, default_value = "8")]
        seconds: f64,
        /// Block size in seconds
        #[arg(long, default_value = "0.05")]
        resolution: f64,
        /// Override the config seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Print an accumulator-spread rhythm
    Euclid {
        #[arg(long, value_delimiter = ',', default_value = "C2")]
        notes: Vec<Pitch>,
        #[arg(short, long, default_value = "8")]
        length: usize,
        #[arg(short, long, default_value = "3")]
        fills: usize,
    },
    /// Generate a random-walk melody
    Melody {
        #[arg(long, default_value = "C4")]
        root: Pitch,
        #[arg(long, default_value = "minor")]
        scale: ScaleMode,
        #[arg(short, long, default_value = "16")]
        length: usize,
        #[arg(long)]
        max_interval: Option<u32>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// List the pitches of a scale
    Scale {
        #[arg(long, default_value = "C4")]
        root: Pitch,
        #[arg(long, default_value = "minor")]
        scale: ScaleMode,
    },
    /// Expand scale degrees of a major key into triads
    Chords {
        #[arg(long, default_value = "C4")]
        key: Pitch,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "1,4,5")]
        degrees: Vec<i32>,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "cadence=debug" } else { "cadence=info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.parse()?))
        .init();
    Ok(())
}

fn join(pitches: &[Pitch]) -> String {
    pitches.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" ")
}

fn play(
    config: Option<PathBuf>,
    script: Option<PathBuf>,
    seconds: f64,
    resolution: f64,
    seed: Option<u64>,
) -> Result<()> {
    let mut config = match config {
        Some(path) => load_config(&path).with_context(|| format!("loading {}", path.display()))?,
        None => load_or_default(),
    };
    if seed.is_some() {
        config.seed = seed;
    }

    let mut session = Session::from_config(&config)?;
    if let Some(path) = script {
        let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        for command in parse_commands(&text)? {
            if let Err(e) = session.apply(command) {
                tracing::warn!("Command failed: {}", e);
            }
        }
    }

    let notes = session.render(seconds, resolution);
    for note in &notes {
        println!(
            "{:>8.3}s  {:<4} {:>6}  vel {:.2}",
            note.time,
            note.pitch.to_string(),
            note.duration.to_string(),
            note.velocity
        );
    }
    tracing::info!(
        "Rendered {} note(s) in {}, {} dropped",
        notes.len(),
        session.sequencer().clock().format_time(),
        session.dropped_notes()
    );
    session.dispose();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Play { config, script, seconds, resolution, seed } => {
            play(config, script, seconds, resolution, seed)?
        }
        Commands::Euclid { notes, length, fills } => {
            let steps = euclidean_rhythm(&notes, length, fills)?;
            let line: Vec<String> = steps
                .iter()
                .map(|step| match step {
                    Step::Rest => ".".to_string(),
                    Step::Note(event) => event.pitch().to_string(),
                })
                .collect();
            println!("{}", line.join(" "));
        }
        Commands::Melody { root, scale: mode, length, max_interval, seed } => {
            let pitches = scale(root, mode)?;
            let mut rng = match seed {
                Some(seed) => fastrand::Rng::with_seed(seed),
                None => fastrand::Rng::new(),
            };
            let rules = MelodyRules { max_interval, rhythm_pattern: None };
            for event in constrained_melody(&pitches, length, &rules, &mut rng)? {
                println!("{:<4} {}", event.pitch().to_string(), event.duration());
            }
        }
        Commands::Scale { root, scale: mode } => {
            println!("{}", join(&scale(root, mode)?));
        }
        Commands::Chords { key, degrees } => {
            let notes = chord_progression(key, &degrees)?;
            for chord in notes.chunks(3) {
                println!("{}", join(chord));
            }
        }
    }

    Ok(())
}
