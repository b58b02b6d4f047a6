// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! idlc: message description compiler.
//!
//! # Usage
//!
//! ```bash
//! # One output file per input, C++ bindings (the default)
//! idlc camera.msg telemetry.msg
//!
//! # Python bindings
//! idlc --language python camera.msg
//!
//! # No input files: read one description from stdin, write to stdout
//! idlc --language cpp < camera.msg > camera_msgs.cpp
//! ```
//!
//! Exits 0 on success and 1 on any parse or emission error; an error in
//! one input aborts that file but later inputs are still processed.

use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use routio_gen::codegen::{generate, output_filename};
use routio_gen::parse;
use routio_gen::Language;

/// routio message description compiler
#[derive(Parser, Debug)]
#[command(name = "idlc")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Output language (cpp or python)
    #[arg(long, default_value = "cpp")]
    language: String,

    /// Description files to compile; stdin/stdout when empty
    files: Vec<PathBuf>,
}

fn compile_text(
    text: &str,
    file: &str,
    basename: &str,
    language: Language,
) -> Result<String, routio_gen::DescriptionError> {
    let desc = parse(text, file)?;
    generate(&desc, language, basename, file)
}

fn compile_file(path: &PathBuf, language: Language) -> anyhow::Result<()> {
    let name = path.display().to_string();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to open input file: {name}"))?;

    let out_name = output_filename(&name, language);
    let basename = out_name
        .rsplit_once('.')
        .map(|(base, _)| base.to_string())
        .unwrap_or_else(|| out_name.clone());

    let code = compile_text(&text, &name, &basename, language)?;

    std::fs::write(&out_name, code)
        .with_context(|| format!("Failed to write output file: {out_name}"))?;
    tracing::info!("{name} -> {out_name}");
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let language = match args.language.as_str() {
        "cpp" => Language::Cpp,
        "python" => Language::Python,
        other => {
            eprintln!("Unknown output language: {other}");
            std::process::exit(1);
        }
    };

    if args.files.is_empty() {
        let mut text = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut text) {
            eprintln!("Failed to read stdin: {e}");
            std::process::exit(1);
        }
        match compile_text(&text, "input", "messages", language) {
            Ok(code) => print!("{code}"),
            Err(e) => {
                eprintln!("{e}");
                std::process::exit(1);
            }
        }
        return;
    }

    let mut failed = false;
    for path in &args.files {
        if let Err(e) = compile_file(path, language) {
            eprintln!("{e:#}");
            failed = true;
        }
    }
    if failed {
        std::process::exit(1);
    }
}
