//! Conformance coverage checker.
//!
//! Compares the server conformance statements tagged in the specification
//! HTML with the `tested conformance id:` lines printed by `ift-conformance`.
//!
//! # Usage
//!
//! ```bash
//! ift-coverage Overview.html tested.txt
//!
//! # JSON report; unknown ids also fail
//! ift-coverage Overview.html tested.txt --json --strict
//! ```

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use ift_conformance::coverage::check_files;
use serde_json::json;

/// IFT conformance coverage checker.
///
/// Reports conformance statements that no test exercised, and tested ids the
/// specification does not define.
#[derive(Parser, Debug)]
#[command(name = "ift-coverage")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the specification HTML.
    spec: PathBuf,

    /// File containing `tested conformance id:` lines.
    tested_ids: PathBuf,

    /// Output JSON report.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Treat tested ids missing from the specification as errors.
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// Output JSONL log file for structured CI output.
    #[arg(long)]
    log_jsonl: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let report = match check_files(&args.spec, &args.tested_ids) {
        Ok(report) => report,
        Err(e) => {
            eprintln!(
                "Error reading {} or {}: {e}",
                args.spec.display(),
                args.tested_ids.display()
            );
            return ExitCode::from(2);
        }
    };

    let failed = !report.is_complete() || (args.strict && !report.unknown.is_empty());

    if args.json {
        let output = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "spec_path": args.spec.display().to_string(),
            "tested_ids_path": args.tested_ids.display().to_string(),
            "complete": report.is_complete(),
            "report": report
        });
        match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("Error encoding report: {e}");
                return ExitCode::from(2);
            }
        }
    } else {
        println!("\nConformance Coverage Report");
        println!("===========================");
        println!("Spec: {}", args.spec.display());
        println!("Statements in specification: {}", report.spec_ids);
        println!("Tested ids: {}", report.tested_ids);
        println!();

        if report.untested.is_empty() {
            println!("OK: Every conformance statement is tested.");
        } else {
            println!("Conformance statements that are not tested ({}):", report.untested.len());
            for id in &report.untested {
                println!("  - {id}");
            }
        }

        if !report.unknown.is_empty() {
            println!("\nTested ids that are not in the specification ({}):", report.unknown.len());
            for id in &report.unknown {
                println!("  - {id}");
            }
        }

        println!();
        if failed {
            println!("FAILED: Coverage is incomplete.");
        } else {
            println!("PASSED: Coverage is complete.");
        }
    }

    if let Some(log_path) = &args.log_jsonl {
        let log_entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "tool": "ift-coverage",
            "phase": "verify",
            "result": if failed { "fail" } else { "pass" },
            "details": {
                "spec_path": args.spec.display().to_string(),
                "spec_ids": report.spec_ids,
                "tested_ids": report.tested_ids,
                "untested": report.untested.len(),
                "unknown": report.unknown.len()
            }
        });
        if let Err(e) = std::fs::write(log_path, format!("{log_entry}\n")) {
            eprintln!("Warning: Could not write log file: {e}");
        }
    }

    if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
