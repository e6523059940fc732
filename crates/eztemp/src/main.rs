/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Command-line front end for quarto-eztemp templates
 */

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "eztemp")]
#[command(about = "Render an eztemp template against JSON parameters")]
struct Args {
    /// Template text, or a template file when it ends in `.ez`
    #[arg(value_name = "INPUT")]
    input: String,

    /// Output file (defaults to stdout)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// JSON parameters, or a JSON file when it ends in `.json`
    #[arg(short = 'p', long = "params", default_value = "{}")]
    params: String,

    /// Report how long rendering took
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eztemp=warn,quarto_eztemp=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Compilation error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let input = unescape(&args.input);
    let mut params = unescape(&args.params);
    if params.ends_with(".json") {
        params = fs::read_to_string(&params)
            .with_context(|| format!("Failed to read parameters file: {}", params))?;
    }

    let start = Instant::now();
    let rendered = if input.ends_with(".ez") {
        tracing::debug!(path = %input, "rendering template file");
        quarto_eztemp::render_file(&input, &params)?
    } else {
        quarto_eztemp::render_json(&input, &params)?
    };
    let elapsed = start.elapsed();

    match &args.output {
        Some(path) => fs::write(path, &rendered)
            .with_context(|| format!("Failed to write output file: {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }

    if args.verbose {
        eprintln!(
            "Generated in {} milliseconds.",
            elapsed.as_secs_f64() * 1000.0
        );
    }
    Ok(())
}

/// Expand `\n`, `\t` and `\\`; any other escaped character is dropped
/// together with its backslash.
fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('\\') => out.push('\\'),
            Some(_) => {}
            None => out.push('\\'),
        }
    }
    out
}
