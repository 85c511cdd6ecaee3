//! pinref: rewrite mutable image tags and action refs into immutable digests.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use pinref::cli::Args;
use pinref::github::GitHubCommits;
use pinref::pinner::Pinner;
use pinref::processor::{Processor, RunSummary};
use pinref::registry::{HttpRegistry, RegistryResolver};
use pinref::scanner;

fn main() -> Result<()> {
    let args = Args::parse();
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = args.processor_config();
    let options = args.scan_options()?;
    let images = RegistryResolver::new(HttpRegistry::new()?);
    let commits = GitHubCommits::new(args.github_api_url.as_str(), args.github_token.clone())?;
    let pinner = Pinner::new(&config, &images, &commits);

    let targets = scanner::collect_targets(&args.paths, &options, &config)?;
    let summary = Processor::new(pinner)
        .interactive(args.interactive)
        .run(&targets)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, config.dry_run);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    if summary.files_scanned == 0 {
        println!("{} No supported files found", "info:".blue().bold());
        return;
    }
    println!(
        "\n{} {} file(s) scanned, {} reference(s) pinned, {} already pinned, {} failed",
        "ok:".green().bold(),
        summary.files_scanned,
        summary.pinned,
        summary.already_pinned,
        summary.failures
    );
    if dry_run && summary.files_changed > 0 {
        println!("{} Run without --dry-run to write changes", "hint:".cyan().bold());
    }
}
