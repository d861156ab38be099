use anyhow::{Context, Result};
use colored::Colorize;
use std::process::Command;
use std::time::Instant;

/// Bare-metal target used to prove the driver crates stay `no_std`.
const NO_STD_TARGET: &str = "thumbv7em-none-eabihf";

/// One `cargo` invocation that must succeed.
struct Step {
    label: &'static str,
    args: &'static [&'static str],
}

const BUILD_STEPS: &[Step] = &[
    Step {
        label: "platform crate (no_std)",
        args: &["check", "-p", "platform", "--target", NO_STD_TARGET, "--no-default-features"],
    },
    Step {
        label: "taboot bootloader (no_std, defmt)",
        args: &["check", "-p", "taboot", "--target", NO_STD_TARGET, "--features", "hardware"],
    },
    Step {
        label: "tabx drivers (no_std, defmt)",
        args: &["check", "-p", "tabx", "--target", NO_STD_TARGET, "--features", "hardware"],
    },
    Step {
        label: "taboot emulator (host)",
        args: &["check", "-p", "taboot", "--features", "emulator", "--bins"],
    },
];

fn run_step(step: &Step) -> Result<()> {
    println!("{}", format!("  Checking {}...", step.label).cyan());
    let start = Instant::now();

    let output = Command::new("cargo")
        .args(step.args)
        .output()
        .with_context(|| format!("Failed to check {}", step.label))?;

    if !output.status.success() {
        eprintln!("{}", format!("  ✗ {} check failed", step.label).red().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&output.stderr));
        anyhow::bail!("{} check failed", step.label);
    }

    println!(
        "{}",
        format!(
            "  ✓ {} passed in {:.2}s",
            step.label,
            start.elapsed().as_secs_f64()
        )
        .green()
    );
    println!();
    Ok(())
}

pub fn run() -> Result<()> {
    println!();
    println!("{}", "🔍 Checking TABX builds...".cyan().bold());
    println!();

    let total_start = Instant::now();

    for step in BUILD_STEPS {
        run_step(step)?;
    }

    // Clippy lints
    println!("{}", "  Running clippy lints...".cyan());
    let clippy_start = Instant::now();

    let clippy_output = Command::new("cargo")
        .args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])
        .output()
        .context("Failed to run clippy")?;

    if clippy_output.status.success() {
        println!(
            "{}",
            format!(
                "  ✓ Clippy passed in {:.2}s",
                clippy_start.elapsed().as_secs_f64()
            )
            .green()
        );
    } else {
        eprintln!("{}", "  ⚠ Clippy warnings found".yellow().bold());
        eprintln!();
        eprintln!("{}", String::from_utf8_lossy(&clippy_output.stderr));
        // Don't fail on clippy warnings, just show them
    }
    println!();

    // Format check
    println!("{}", "  Checking code formatting...".cyan());

    let fmt_output = Command::new("cargo")
        .args(["fmt", "--all", "--check"])
        .output()
        .context("Failed to run cargo fmt")?;

    if fmt_output.status.success() {
        println!("{}", "  ✓ Formatting check passed".green());
    } else {
        eprintln!("{}", "  ⚠ Formatting issues found".yellow().bold());
        eprintln!("     Run 'cargo fmt --all' to fix");
    }
    println!();

    println!(
        "{}",
        format!(
            "✓ All checks completed in {:.2}s",
            total_start.elapsed().as_secs_f64()
        )
        .green()
        .bold()
    );
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_driver_crate_is_checked_bare_metal() {
        for krate in ["platform", "taboot", "tabx"] {
            assert!(
                BUILD_STEPS
                    .iter()
                    .any(|s| s.args.contains(&krate) && s.args.contains(&NO_STD_TARGET)),
                "{krate} has no bare-metal check"
            );
        }
    }
}
