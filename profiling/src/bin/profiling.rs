use serde_jsonlines::json_lines;
use std::fs::read_to_string;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tageval::{
    evaluate_batch, segment, AlignmentMode, DivByZeroStrat, EvalConfigBuilder, LabelSet, Token,
    TokenSequence,
};

use clap::Parser;

fn read_tokens<P: AsRef<Path>>(path: P) -> io::Result<TokenSequence> {
    let tokens = json_lines::<Token, P>(path)?.collect::<io::Result<Vec<_>>>()?;
    Ok(TokenSequence::new(tokens))
}

#[derive(Debug, Parser)]
struct Args {
    /// Reference tokens, one JSON object per line
    #[arg(short, long)]
    reference: PathBuf,
    /// Sentence boundaries, one sentence per line
    #[arg(short, long)]
    sentences: PathBuf,
    /// Predicted tokens, one file per run
    #[arg(short, long, required = true, num_args = 1..)]
    predictions: Vec<PathBuf>,
    /// `positional`, `key-based[:<policy>]` or `fuzzy[:<threshold>[:<policy>]]`, the policy being
    /// `drop` or `count-as-incorrect`
    #[arg(short, long)]
    mode: AlignmentMode,
    #[arg(short, long, default_value_t = DivByZeroStrat::ReplaceBy0)]
    zero_division: DivByZeroStrat,
    #[arg(short, long, default_value_t = 10)]
    top_k: usize,
    /// Leave the `missing` sentinel out of the label set
    #[arg(long, default_value_t = false)]
    drop_missing: bool,
    #[arg(long, default_value_t = false)]
    parallel: bool,
    #[arg(short, long, default_value_t = 1)]
    n_samples: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let reference = read_tokens(&args.reference)?;
    let boundaries = segment(&read_to_string(&args.sentences)?)?;
    let mut predictions = Vec::with_capacity(args.predictions.len());
    for path in &args.predictions {
        let file_id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match read_tokens(path) {
            Ok(tokens) => predictions.push((file_id, tokens)),
            Err(e) => log::warn!("could not read {}: {}", path.display(), e),
        }
    }
    let labels = LabelSet::from_reference(&reference, args.drop_missing);
    let config = EvalConfigBuilder::new(args.mode)
        .division_by_zero(args.zero_division)
        .top_k(args.top_k)
        .parallel(args.parallel)
        .build();
    log::info!("{}", config);

    let n_samples = args.n_samples;
    let iter = Range {
        start: 0,
        end: n_samples,
    };
    let mut total_duration = Duration::ZERO;
    let mut batch = None;
    for _ in iter {
        let now = Instant::now();
        batch = Some(evaluate_batch(
            &reference,
            &boundaries,
            &predictions,
            &labels,
            &config,
        )?);
        total_duration += now.elapsed();
    }
    if let Some(batch) = batch {
        println!("{}", serde_json::to_string_pretty(&batch)?);
    }
    eprintln!(
        "Total duration: {} with {n_samples} samples",
        total_duration.as_secs_f64()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tageval::UnmatchedPolicy;

    const FILES: [&str; 7] = [
        "profiling",
        "--reference",
        "reference.jsonl",
        "--sentences",
        "sentences.txt",
        "--predictions",
        "run.jsonl",
    ];

    #[test]
    fn test_mode_is_required() {
        assert!(Args::try_parse_from(FILES).is_err());
    }

    #[test]
    fn test_mode_is_parsed() {
        let args = Args::try_parse_from(FILES.into_iter().chain(["--mode", "fuzzy:0.6"])).unwrap();
        assert_eq!(
            args.mode,
            AlignmentMode::Fuzzy {
                threshold: 0.6,
                unmatched: UnmatchedPolicy::Drop
            }
        );
    }
}
