use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use msc_engine::harness::{load_fixture, run_fixture, HarnessOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Print,
    Check,
    Bless,
}

fn main() {
    if let Err(err) = run_cli() {
        eprintln!("[harness] error: {err:?}");
        std::process::exit(1);
    }
}

fn run_cli() -> Result<()> {
    let (mode, targets) = parse_args()?;
    let fixtures = collect_fixtures(&targets)?;
    if fixtures.is_empty() {
        bail!("no fixtures found under {}", targets.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "));
    }

    let mut mismatches = 0;
    for fixture_path in &fixtures {
        let fixture = load_fixture(fixture_path)?;
        let output = run_fixture(&fixture).with_context(|| format!("running {}", fixture_path.display()))?;
        let golden = golden_path(fixture_path);
        match mode {
            Mode::Print => {
                serde_json::to_writer_pretty(std::io::stdout(), &output)?;
                println!();
            }
            Mode::Bless => {
                let file =
                    File::create(&golden).with_context(|| format!("writing golden '{}'", golden.display()))?;
                serde_json::to_writer_pretty(file, &output).with_context(|| "serializing harness output")?;
                println!("[harness] blessed {}", golden.display());
            }
            Mode::Check => {
                let file = File::open(&golden).with_context(|| format!("opening golden '{}'", golden.display()))?;
                let expected: HarnessOutput =
                    serde_json::from_reader(file).with_context(|| format!("parsing golden '{}'", golden.display()))?;
                if expected == output {
                    println!("[harness] ok {}", fixture_path.display());
                } else {
                    mismatches += 1;
                    println!("[harness] MISMATCH {}: {}", fixture_path.display(), describe_mismatch(&expected, &output));
                }
            }
        }
    }

    if mismatches > 0 {
        bail!("{mismatches} of {} fixture(s) differ from their goldens (rerun with --bless to refresh)", fixtures.len());
    }
    Ok(())
}

/// `counter.json` is checked against `counter.golden.json` next to it.
fn golden_path(fixture: &Path) -> PathBuf {
    fixture.with_extension("golden.json")
}

fn is_fixture(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.ends_with(".json") && !name.ends_with(".golden.json")
}

fn collect_fixtures(targets: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for target in targets {
        if target.is_dir() {
            let mut found: Vec<PathBuf> = fs::read_dir(target)
                .with_context(|| format!("listing '{}'", target.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && is_fixture(path))
                .collect();
            found.sort();
            out.extend(found);
        } else {
            out.push(target.clone());
        }
    }
    Ok(out)
}

fn describe_mismatch(expected: &HarnessOutput, actual: &HarnessOutput) -> String {
    if expected.diagnostics != actual.diagnostics || expected.import_errors != actual.import_errors {
        return "diagnostics differ".to_string();
    }
    if let Some((want, got)) = expected.results.iter().zip(&actual.results).find(|(want, got)| want != got) {
        return format!(
            "first difference at step {}\nexpected: {}\nactual:   {}",
            want.step,
            serde_json::to_string(want).unwrap_or_default(),
            serde_json::to_string(got).unwrap_or_default()
        );
    }
    if expected.results.len() != actual.results.len() {
        return format!("{} steps expected, {} recorded", expected.results.len(), actual.results.len());
    }
    if expected.final_entities != actual.final_entities {
        return format!(
            "final entities differ\nexpected: {}\nactual:   {}",
            serde_json::to_string(&expected.final_entities).unwrap_or_default(),
            serde_json::to_string(&actual.final_entities).unwrap_or_default()
        );
    }
    "camera differs".to_string()
}

fn parse_args() -> Result<(Mode, Vec<PathBuf>)> {
    let mut mode = Mode::Print;
    let mut targets = Vec::new();
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--check" | "-c" => mode = Mode::Check,
            "--bless" | "-b" => mode = Mode::Bless,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => bail!("unknown argument '{flag}'"),
            path => targets.push(PathBuf::from(path)),
        }
    }
    if targets.is_empty() {
        bail!("at least one fixture file or directory is required");
    }
    Ok((mode, targets))
}

fn print_help() {
    println!("Usage: msc_harness [--check | --bless] <fixture.json | dir>...");
    println!("  (default)      Print the output JSON of each fixture");
    println!("  -c, --check    Compare each fixture with its sibling <name>.golden.json");
    println!("  -b, --bless    Rewrite the sibling golden files from the current output");
}
