/// Corpus Trainer: trains a text synthesizer from a plain-text corpus.
///
/// Usage: corpus_trainer --input <file.txt> --output <model.ron> --state-size <1-4>
use std::env;
use std::process;

use narrative_events::core::markov::{save_model, TextSynthesizer};

const USAGE: &str = "Usage: corpus_trainer --input <file.txt> --output <model.ron> --state-size <1-4>";

fn main() {
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut output = None;
    let mut state_size = 2usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input = args.get(i).cloned();
            }
            "--output" => {
                i += 1;
                output = args.get(i).cloned();
            }
            "--state-size" => {
                i += 1;
                state_size = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("Error: --state-size must be a number between 1 and 4");
                    process::exit(1);
                });
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
        i += 1;
    }

    let input_path = input.unwrap_or_else(|| {
        eprintln!("Error: --input is required");
        eprintln!("{}", USAGE);
        process::exit(1);
    });

    let output_path = output.unwrap_or_else(|| {
        eprintln!("Error: --output is required");
        eprintln!("{}", USAGE);
        process::exit(1);
    });

    if !(1..=4).contains(&state_size) {
        eprintln!("Error: --state-size must be a number between 1 and 4");
        process::exit(1);
    }

    let text = std::fs::read_to_string(&input_path).unwrap_or_else(|e| {
        eprintln!("Error reading input file '{}': {}", input_path, e);
        process::exit(1);
    });

    println!("Training state size {} model from '{}'...", state_size, input_path);
    let mut model = TextSynthesizer::new(state_size);
    model.ingest_text(&text);

    if model.is_empty() {
        eprintln!("Error: corpus produced no windows; sentences may be shorter than the state size");
        process::exit(1);
    }

    let transition_count: usize = model.transitions.values().map(|v| v.len()).sum();
    println!(
        "Model trained: {} sentences, {} windows, {} transitions",
        model.corpus().len(),
        model.transitions.len(),
        transition_count
    );

    save_model(&model, std::path::Path::new(&output_path)).unwrap_or_else(|e| {
        eprintln!("Error saving model to '{}': {}", output_path, e);
        process::exit(1);
    });

    println!("Model saved to '{}'", output_path);
}
