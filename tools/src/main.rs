mod convert_dict;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dict_tools", about = "Build keypipe dictionary files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Keep the most frequent words of a base list
    Truncate {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 50_000)]
        max_words: usize,
    },
    /// Write `<lang>_base.dict` from a base list
    Build {
        #[arg(long)]
        language: String,
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Skip the precomputed SymSpell deletes
        #[arg(long)]
        no_deletes: bool,
    },
    /// Write the `<lang>.fst` + `<lang>.bincode` pair from a base list
    Compact {
        #[arg(long)]
        language: String,
        input: PathBuf,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Print term counts for a compact pair as JSON
    Inspect {
        fst: PathBuf,
        payload: PathBuf,
        #[arg(long, default_value_t = 10)]
        sample: usize,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Truncate {
            input,
            output,
            max_words,
        } => {
            let kept = convert_dict::truncate(&input, &output, max_words)?;
            println!("Kept {} words in {}", kept, output.display());
        }
        Command::Build {
            language,
            input,
            out_dir,
            no_deletes,
        } => {
            let out = convert_dict::build(&language, &input, &out_dir, !no_deletes)?;
            println!("Wrote {}", out.display());
        }
        Command::Compact {
            language,
            input,
            out_dir,
        } => {
            let (fst_out, payload_out) = convert_dict::compact(&language, &input, &out_dir)?;
            println!("Wrote fst to {} and payloads to {}", fst_out.display(), payload_out.display());
        }
        Command::Inspect {
            fst,
            payload,
            sample,
        } => {
            let stats = convert_dict::inspect(&fst, &payload, sample)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
