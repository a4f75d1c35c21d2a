//! Command-line interface for wikitok
//! This binary runs a lexed token stream through the transform pipeline and
//! prints the structured result.
//!
//! Usage:
//!   wikitok transform `<path>` [--format `<format>`] [--trace]  - Transform a JSON token stream

use clap::{Arg, ArgAction, Command};
use wikitok::wikitext::pipeline::{PipelineConfig, TokenPipeline};
use wikitok::wikitext::token::{render_tokens, Token};
use wikitok::wikitext::transform::Frame;

fn main() {
    env_logger::init();

    let matches = Command::new("wikitok")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A tool for transforming wiki markup token streams")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("transform")
                .about("Run a JSON token stream through the transform pipeline")
                .arg(
                    Arg::new("path")
                        .help("Path to the JSON token stream")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format ('json' or 'render')")
                        .default_value("json"),
                )
                .arg(
                    Arg::new("trace")
                        .long("trace")
                        .help("Print per-handler trace output to stderr")
                        .action(ArgAction::SetTrue),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("transform", transform_matches)) => {
            let path = transform_matches.get_one::<String>("path").unwrap();
            let format = transform_matches.get_one::<String>("format").unwrap();
            let trace = transform_matches.get_flag("trace");
            handle_transform_command(path, format, trace);
        }
        _ => unreachable!(),
    }
}

/// Handle the transform command
fn handle_transform_command(path: &str, format: &str, trace: bool) {
    let source = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file: {}", e);
        std::process::exit(1);
    });

    let tokens: Vec<Token> = serde_json::from_str(&source).unwrap_or_else(|e| {
        eprintln!("Error parsing token stream: {}", e);
        std::process::exit(1);
    });

    let mut pipeline = TokenPipeline::with_config(Frame::default(), PipelineConfig { trace })
        .unwrap_or_else(|e| {
            eprintln!("Error building pipeline: {}", e);
            std::process::exit(1);
        });

    let output = pipeline.run(tokens).unwrap_or_else(|e| {
        eprintln!("Error transforming token stream: {}", e);
        std::process::exit(1);
    });

    for line in pipeline.trace_lines() {
        eprintln!("{}", line);
    }

    match format {
        "render" => println!("{}", render_tokens(&output)),
        "json" => {
            let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
                eprintln!("Error serializing output: {}", e);
                std::process::exit(1);
            });
            println!("{}", json);
        }
        other => {
            eprintln!("Unknown output format: {}", other);
            std::process::exit(1);
        }
    }
}
