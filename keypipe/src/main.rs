use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keypipe_core::{Keycode, ManualClock, MemoryTextField, ReloadMode};
use keypipe::{default_config_dir, simulate, ImeService};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Physical-keyboard input pipeline: layouts, multi-tap, nav mode and
/// auto-correction, driven from the terminal.
#[derive(Parser, Debug)]
#[command(name = "keypipe", version)]
struct Cli {
    /// User configuration directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Keep all edits in memory
    #[arg(long, global = true)]
    in_memory: bool,

    /// Input locale for this run, e.g. `fr` or `it_IT`
    #[arg(long, global = true)]
    locale: Option<String>,

    /// Force a layout for this run
    #[arg(long, global = true)]
    layout: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Type a key script and print the resulting text
    Type {
        script: String,
        /// Milliseconds between keys
        #[arg(long, default_value_t = 100)]
        gap_ms: u64,
    },
    /// Rank suggestions for a word
    Suggest {
        word: String,
        #[arg(long)]
        json: bool,
    },
    /// Type a word followed by a space and print what the field holds
    Correct { word: String },
    /// Show the variants offered after typing a letter
    Variants { letter: char },
    /// List layouts and the locale map
    Layouts,
    /// Import a layout JSON file into the user tier
    ImportLayout { name: String, file: PathBuf },
    /// Print the effective JSON of a layout
    ExportLayout { name: String },
    /// Add or replace a correction in the user tier
    SetCorrection {
        language: String,
        original: String,
        corrected: String,
    },
    EnableLanguage { language: String },
    DisableLanguage { language: String },
    /// Type scripts line by line into one field
    Interactive {
        #[arg(long, default_value_t = 100)]
        gap_ms: u64,
    },
}

fn open_service(cli: &Cli) -> Result<ImeService> {
    let service = if cli.in_memory {
        ImeService::in_memory()
    } else {
        let dir = cli.config_dir.clone().unwrap_or_else(default_config_dir);
        ImeService::open(&dir)
            .with_context(|| format!("opening configuration in {}", dir.display()))?
    };
    let service = service.with_reload_mode(ReloadMode::Inline);

    if cli.locale.is_some() || cli.layout.is_some() {
        service.override_settings(|c| {
            if let Some(locale) = &cli.locale {
                c.locale = locale.clone();
            }
            if cli.layout.is_some() {
                c.layout = cli.layout.clone();
            }
        });
    }
    service.load_now();
    Ok(service)
}

fn type_script(service: &ImeService, script: &str, gap_ms: u64) -> Result<String> {
    let strokes = simulate::parse_script(script)?;
    let clock = Arc::new(ManualClock::new(0));
    let mut pipeline = service.pipeline(clock.clone());
    let mut field = MemoryTextField::new();
    simulate::run(&mut pipeline, &mut field, &clock, &strokes, gap_ms);
    Ok(field.text())
}

fn interactive(service: &ImeService, gap_ms: u64) -> Result<()> {
    let clock = Arc::new(ManualClock::new(0));
    let mut pipeline = service.pipeline(clock.clone());
    let mut field = MemoryTextField::new();

    println!("Type key scripts; `:s` suggests, `:v` shows variants, `:c` clears, `:q` quits.");
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("> ");
        stdout.flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim_end_matches(['\r', '\n']);
        match line {
            ":q" => break,
            ":c" => {
                field = MemoryTextField::new();
                pipeline.reset();
            }
            ":s" => {
                for (i, s) in pipeline.suggestions(&field).iter().enumerate() {
                    println!("  {}. {} (distance {})", i + 1, s.word, s.distance);
                }
                continue;
            }
            ":v" => {
                println!("  {}", pipeline.variants_at_cursor(&field).join(" "));
                continue;
            }
            script => match simulate::parse_script(script) {
                Ok(strokes) => simulate::run(&mut pipeline, &mut field, &clock, &strokes, gap_ms),
                Err(e) => {
                    eprintln!("  {e}");
                    continue;
                }
            },
        }
        println!("  {:?}", field.text());
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let service = open_service(&cli)?;

    match &cli.command {
        Command::Type { script, gap_ms } => {
            println!("{}", type_script(&service, script, *gap_ms)?);
        }
        Command::Suggest { word, json } => {
            let clock = Arc::new(ManualClock::new(0));
            let mut pipeline = service.pipeline(clock);
            let field = MemoryTextField::with_text(word);
            let suggestions = pipeline.suggestions(&field);
            if *json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else if suggestions.is_empty() {
                println!("(no suggestions)");
            } else {
                for (i, s) in suggestions.iter().enumerate() {
                    println!(
                        "{}. {} (distance {}, frequency {}, {})",
                        i + 1,
                        s.word,
                        s.distance,
                        s.frequency,
                        s.language
                    );
                }
            }
        }
        Command::Correct { word } => {
            let text = type_script(&service, &format!("{word} "), 500)?;
            println!("{}", text.trim_end_matches(' '));
        }
        Command::Variants { letter } => {
            if Keycode::from_letter(*letter).is_none() {
                bail!("{letter:?} is not a letter key");
            }
            let clock = Arc::new(ManualClock::new(0));
            let mut pipeline = service.pipeline(clock);
            let field = MemoryTextField::with_text(&letter.to_string());
            println!("{}", pipeline.variants_at_cursor(&field).join(" "));
        }
        Command::Layouts => {
            let snapshot = service.snapshot();
            for name in snapshot.layouts.names() {
                println!("{name}");
            }
            for (locale, layout) in snapshot.layouts.locale_map() {
                println!("  {locale} -> {layout}");
            }
        }
        Command::ImportLayout { name, file } => {
            let json = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            service.import_layout(name, &json)?;
            println!("imported layout {name}");
        }
        Command::ExportLayout { name } => println!("{}", service.export_layout(name)?),
        Command::SetCorrection {
            language,
            original,
            corrected,
        } => {
            service.set_correction(language, original, corrected)?;
            println!("{language}: {original} -> {corrected}");
        }
        Command::EnableLanguage { language } => service.enable_language(language)?,
        Command::DisableLanguage { language } => service.disable_language(language)?,
        Command::Interactive { gap_ms } => interactive(&service, *gap_ms)?,
    }
    Ok(())
}
