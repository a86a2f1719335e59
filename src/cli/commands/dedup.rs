//! Duplicate file report.

use std::path::Path;

use console::style;

use crate::services::dedup::scan_directory;

pub async fn cmd_dedup(dir: &Path, md5: bool) -> anyhow::Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let detector = scan_directory(dir, md5).await?;
    let stats = detector.stats();
    let groups = detector.groups();

    if groups.is_empty() {
        println!(
            "{} No duplicates among {} files",
            style("✓").green(),
            stats.total_files
        );
        return Ok(());
    }

    println!(
        "{} {} duplicate group{} ({} redundant files, {} bytes wasted)",
        style("≡").cyan(),
        stats.groups,
        if stats.groups == 1 { "" } else { "s" },
        stats.duplicate_files,
        stats.wasted_bytes
    );
    for group in groups {
        println!(
            "\n  {} ({} bytes each)",
            style(&group.hash[..16]).bold(),
            group.total_size / group.members.len().max(1) as u64
        );
        for member in &group.members {
            let marker = if *member == group.original_file_id {
                style("original").green()
            } else {
                style("duplicate").dim()
            };
            println!("    {} [{}]", member, marker);
        }
    }
    Ok(())
}
