use anyhow::{Context, Result};
use colored::Colorize;
use std::process::{Command, Output};
use std::time::Instant;

/// Run `cargo` with `args`, print a one-line summary, fail on test failures.
fn run_suite(label: &str, args: &[&str], fatal: bool) -> Result<()> {
    println!("{}", format!("  Running {label}...").cyan());
    let start = Instant::now();

    let output: Output = Command::new("cargo")
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {label}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    if output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ {label} passed {} in {:.2}s",
                extract_test_summary(&stdout),
                start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else if fatal {
        eprintln!("{}", format!("  ✗ {label} failed").red().bold());
        eprintln!();
        for line in stdout.lines() {
            eprintln!("  {line}");
        }
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{label} failed");
    } else {
        eprintln!("{}", format!("  ⚠ {label} failed").yellow().bold());
    }
    println!();
    Ok(())
}

pub fn run(unit_only: bool, integration_only: bool) -> Result<()> {
    println!();
    println!("{}", "🧪 Running tests...".cyan().bold());
    println!();

    let total_start = Instant::now();

    if !integration_only {
        run_suite("unit tests", &["test", "--lib", "--workspace"], true)?;
    }
    if !unit_only {
        run_suite("integration tests", &["test", "--workspace", "--test", "*"], true)?;
    }
    // Doc test failures are reported but not fatal.
    run_suite("doc tests", &["test", "--doc", "--workspace"], false)?;

    println!(
        "{}",
        format!(
            "✓ All tests completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

/// Sum the `test result:` lines of every test binary in `output`.
fn extract_test_summary(output: &str) -> String {
    let mut passed = 0u64;
    let mut failed = 0u64;
    let mut ignored = 0u64;
    let mut found = false;

    // "test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out"
    for line in output.lines() {
        let Some(result) = line.split("test result:").nth(1) else {
            continue;
        };
        found = true;
        for part in result.split(';') {
            let mut words = part.split_whitespace().rev();
            let (Some(kind), Some(count)) = (words.next(), words.next()) else {
                continue;
            };
            let Ok(count) = count.parse::<u64>() else {
                continue;
            };
            match kind {
                "passed" => passed = passed.saturating_add(count),
                "failed" => failed = failed.saturating_add(count),
                "ignored" => ignored = ignored.saturating_add(count),
                _ => {}
            }
        }
    }

    if found {
        format!("({passed} passed; {failed} failed; {ignored} ignored)")
    } else {
        "(summary not available)".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_adds_up_every_binary() {
        let output = "\
running 3 tests
test result: ok. 3 passed; 0 failed; 1 ignored; 0 measured; 0 filtered out; finished in 0.01s
running 5 tests
test result: ok. 5 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out; finished in 0.20s
";
        assert_eq!(
            extract_test_summary(output),
            "(8 passed; 0 failed; 1 ignored)"
        );
    }

    #[test]
    fn summary_without_results() {
        assert_eq!(extract_test_summary("error: no tests"), "(summary not available)");
    }
}
