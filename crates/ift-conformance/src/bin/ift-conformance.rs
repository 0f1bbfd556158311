//! IFT server conformance test driver.
//!
//! Runs the conformance suite against a live server and reports every case
//! plus the conformance ids it exercised.
//!
//! # Usage
//!
//! ```bash
//! # Positional server address, font path and reference font
//! ift-conformance http://localhost:8080 /fonts/Roboto.ttf Roboto.ttf
//!
//! # Everything from a config file, GET requests, JSON report
//! ift-conformance --config ift-conformance.toml --get --json
//!
//! # Keep the tested ids for ift-coverage
//! ift-conformance --config ift-conformance.toml --tested-ids tested.txt
//! ```

#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use ift_conformance::adapters::{
    CommandPatchApplier, HttpTransport, OpenTypeShapingComparator, SkrifaFontInspector,
};
use ift_conformance::rules;
use ift_conformance::{
    CheckStatus, Collaborators, ConformanceConfig, ConformanceSuite, SuiteSummary, Target,
};
use serde_json::json;
use tracing_subscriber::EnvFilter;

/// IFT server conformance tester.
///
/// Sends well-formed and malformed patch requests to a server and checks its
/// responses against the incremental font transfer specification.
#[derive(Parser, Debug)]
#[command(name = "ift-conformance")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address, e.g. `http://localhost:8080`.
    server: Option<String>,

    /// Path of a font on the server, e.g. `/fonts/Roboto.ttf`.
    path: Option<String>,

    /// Local copy of the original font.
    font: Option<PathBuf>,

    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Send requests as `GET ?request=` instead of POST.
    #[arg(long, default_value_t = false)]
    get: bool,

    /// Output JSON report.
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Seed for random request bodies and shaping strings.
    #[arg(long)]
    seed: Option<u64>,

    /// Run only cases whose name contains this text (repeatable).
    #[arg(long = "case")]
    cases: Vec<String>,

    /// List case names and exit.
    #[arg(long, default_value_t = false)]
    list_cases: bool,

    /// Write `tested conformance id:` lines to this file.
    #[arg(long)]
    tested_ids: Option<PathBuf>,

    /// Output JSONL log file for structured CI output.
    #[arg(long)]
    log_jsonl: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if args.list_cases {
        for name in ConformanceSuite::case_names() {
            println!("{name}");
        }
        return ExitCode::SUCCESS;
    }

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Settings after merging the config file and flags.
struct Resolved {
    config: ConformanceConfig,
    target: Target,
    font: PathBuf,
}

fn resolve(args: &Args) -> Result<Resolved> {
    let mut config = match &args.config {
        Some(path) => ConformanceConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConformanceConfig::default(),
    };
    if let Some(server) = &args.server {
        config.server.address = Some(server.clone());
    }
    if let Some(path) = &args.path {
        config.server.font_path = Some(path.clone());
    }
    if let Some(font) = &args.font {
        config.font.reference = Some(font.clone());
    }
    if args.get {
        config.server.use_get = true;
    }
    if args.seed.is_some() {
        config.shaping.seed = args.seed;
    }
    config.validate().context("invalid settings")?;

    let address = config
        .server
        .address
        .clone()
        .context("no server address given (positional SERVER or [server] address)")?;
    let font_path = config
        .server
        .font_path
        .clone()
        .context("no font path given (positional PATH or [server] font_path)")?;
    let font = config
        .font
        .reference
        .clone()
        .context("no reference font given (positional FONT or [font] reference)")?;

    let mut target = Target::new(address, font_path);
    target.not_found_path.clone_from(&config.server.not_found_path);
    target.use_get = config.server.use_get;
    Ok(Resolved {
        config,
        target,
        font,
    })
}

fn run(args: &Args) -> Result<bool> {
    let Resolved {
        config,
        target,
        font,
    } = resolve(args)?;
    let original_font =
        std::fs::read(&font).with_context(|| format!("reading reference font {}", font.display()))?;

    let transport = HttpTransport::new(Duration::from_secs(config.server.timeout_secs))?;
    let inspector = SkrifaFontInspector;
    let shaping =
        OpenTypeShapingComparator::new(config.shaping.rounds_per_codepoint, config.shaping.seed);
    let patcher = CommandPatchApplier::from_config(&config.patch_tools);
    let collaborators = Collaborators {
        transport: &transport,
        inspector: &inspector,
        shaping: &shaping,
        patcher: &patcher,
    };

    let mut suite = ConformanceSuite::new(target.clone(), &original_font, collaborators)
        .with_codepoints(config.codepoints.minimal.clone(), config.codepoints.extend.clone());
    if let Some(seed) = config.shaping.seed {
        suite = suite.with_seed(seed);
    }

    let summary = if args.cases.is_empty() {
        suite.run_all()
    } else {
        suite.run_matching(|name| args.cases.iter().any(|c| name.contains(c.as_str())))
    };
    let passed = summary.all_passed();

    if args.json {
        let output = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "server": target.base_url,
            "font_path": target.font_path,
            "use_get": target.use_get,
            "passed": passed,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_report(&target, &summary)?;
    }

    if let Some(path) = &args.tested_ids {
        write_tested_ids(path, &summary)?;
    }
    if let Some(path) = &args.log_jsonl {
        let log_entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "tool": "ift-conformance",
            "phase": "verify",
            "result": if passed { "pass" } else { "fail" },
            "details": {
                "server": target.base_url,
                "cases": summary.total,
                "passed": summary.passed,
                "failed": summary.failed,
                "skipped": summary.skipped,
                "exercised": summary.exercised.len(),
            }
        });
        if let Err(e) = std::fs::write(path, format!("{log_entry}\n")) {
            eprintln!("Warning: Could not write log file: {e}");
        }
    }

    Ok(passed)
}

fn print_report(target: &Target, summary: &SuiteSummary) -> io::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "\nIFT Server Conformance Report")?;
    writeln!(out, "=============================")?;
    writeln!(out, "Server: {}{}", target.base_url, target.font_path)?;
    writeln!(
        out,
        "Cases: {} run, {} passed, {} failed, {} skipped",
        summary.total, summary.passed, summary.failed, summary.skipped
    )?;
    writeln!(out)?;

    for case in &summary.cases {
        let label = match case.status {
            CheckStatus::Pass => "ok  ",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Skipped => "skip",
        };
        writeln!(out, "  [{label}] {}", case.name)?;
        if case.status == CheckStatus::Skipped {
            if let Some(message) = &case.message {
                writeln!(out, "         {message}")?;
            }
        }
    }

    let failures: Vec<_> = summary.failures().collect();
    if !failures.is_empty() {
        writeln!(out, "\nFAILURES ({}):", failures.len())?;
        for case in failures {
            writeln!(out, "  {}:", case.name)?;
            if let Some(message) = &case.message {
                writeln!(out, "    {message}")?;
            }
            if let Some(rule) = case.rule.as_deref().and_then(rules::lookup) {
                writeln!(out, "    rule: {} ({})", rule, rule.link())?;
            }
            if let Some(url) = &case.url {
                writeln!(out, "    url: {url}")?;
            }
        }
    }

    let not_exercised: BTreeSet<&str> = rules::ALL
        .iter()
        .map(|r| r.id())
        .filter(|id| !summary.exercised.contains(*id))
        .collect();
    if !not_exercised.is_empty() {
        writeln!(out, "\nNOT EXERCISED ({}):", not_exercised.len())?;
        for id in not_exercised {
            writeln!(out, "  - {id}")?;
        }
    }

    writeln!(out)?;
    summary.write_tested_ids(&mut out)?;
    writeln!(out)?;
    if summary.all_passed() {
        writeln!(out, "PASSED: Server conforms on every case run.")?;
    } else {
        writeln!(out, "FAILED: {} case(s) did not pass.", summary.failed)?;
    }
    Ok(())
}

fn write_tested_ids(path: &Path, summary: &SuiteSummary) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    summary
        .write_tested_ids(&mut file)
        .with_context(|| format!("writing {}", path.display()))
}
