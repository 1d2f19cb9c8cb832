use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod error;
mod models;
mod report;
mod stats;
mod store;
mod workbook;

use models::{Evidence, ScoreDelta, ScoringType, Snapshot, SubItemDraft};

#[derive(Parser)]
#[command(name = "quality-scorecard")]
#[command(about = "Quality assessment scorecards for hospital departments", long_about = None)]
struct Cli {
    /// Session workbook holding the criteria tree
    #[arg(long, global = true, env = "SCORECARD_WORKBOOK", default_value = "workbook.json")]
    workbook: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the workbook with sample data
    Seed,
    /// Add a criterion group
    AddGroup {
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
    },
    /// Rename a group or move it to another department
    UpdateGroup {
        #[arg(long)]
        group: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        department: String,
    },
    /// Delete a group with everything under it
    DeleteGroup {
        #[arg(long)]
        group: String,
    },
    /// Add a criterion to a group
    AddCriterion {
        #[arg(long)]
        group: String,
        #[arg(long)]
        name: String,
    },
    /// Rename a criterion
    UpdateCriterion {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        name: String,
    },
    /// Delete a criterion with its sub-items
    DeleteCriterion {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
    },
    /// Add a scorable sub-item to a criterion
    AddSubItem {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        description: String,
        #[arg(long, default_value = "")]
        guide: String,
        #[arg(long)]
        scoring_type: ScoringType,
        #[arg(long, default_value_t = 1.0)]
        weight: f64,
    },
    /// Edit a sub-item; unspecified fields keep their value
    UpdateSubItem {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        sub_item: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        guide: Option<String>,
        #[arg(long)]
        scoring_type: Option<ScoringType>,
        #[arg(long)]
        weight: Option<f64>,
        /// Drop the existing score, e.g. when changing the scoring type
        #[arg(long)]
        reset_score: bool,
    },
    /// Delete a sub-item with its score and evidence
    DeleteSubItem {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        sub_item: String,
    },
    /// Record or patch the score of a sub-item
    Score {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        sub_item: String,
        /// New status; pass an empty value to clear it
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Attach an evidence file reference to a sub-item's score
    Attach {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        sub_item: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "application/octet-stream")]
        media_type: String,
    },
    /// Remove an evidence reference
    Detach {
        #[arg(long)]
        group: String,
        #[arg(long)]
        criterion: String,
        #[arg(long)]
        sub_item: String,
        #[arg(long)]
        evidence: String,
    },
    /// Print completion, status mix and department averages
    Stats,
    /// Export one row per sub-item to CSV
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Replace the workbook with rows imported from CSV
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .init();

    let tree = workbook::load(&cli.workbook)?;

    let next = match cli.command {
        Commands::Seed => Some(workbook::seed()),
        Commands::AddGroup { name, department } => {
            let (next, id) = store::add_group(&tree, &name, &department);
            println!("{id}");
            Some(next)
        }
        Commands::UpdateGroup {
            group,
            name,
            department,
        } => Some(store::update_group(&tree, &group, &name, &department)),
        Commands::DeleteGroup { group } => Some(store::delete_group(&tree, &group)),
        Commands::AddCriterion { group, name } => {
            let (next, id) = store::add_criterion(&tree, &group, &name)?;
            println!("{id}");
            Some(next)
        }
        Commands::UpdateCriterion {
            group,
            criterion,
            name,
        } => Some(store::update_criterion(&tree, &group, &criterion, &name)),
        Commands::DeleteCriterion { group, criterion } => {
            Some(store::delete_criterion(&tree, &group, &criterion))
        }
        Commands::AddSubItem {
            group,
            criterion,
            description,
            guide,
            scoring_type,
            weight,
        } => {
            let draft = SubItemDraft {
                description,
                scoring_guide: guide,
                scoring_type,
                weight,
            };
            let (next, id) = store::add_sub_item(&tree, &group, &criterion, draft)?;
            println!("{id}");
            Some(next)
        }
        Commands::UpdateSubItem {
            group,
            criterion,
            sub_item,
            description,
            guide,
            scoring_type,
            weight,
            reset_score,
        } => {
            match tree.sub_item(&group, &criterion, &sub_item).cloned() {
                Some(mut replacement) => {
                    if let Some(description) = description {
                        replacement.description = description;
                    }
                    if let Some(guide) = guide {
                        replacement.scoring_guide = guide;
                    }
                    if let Some(scoring_type) = scoring_type {
                        replacement.scoring_type = scoring_type;
                    }
                    if let Some(weight) = weight {
                        replacement.weight = weight;
                    }
                    if reset_score {
                        replacement.score = None;
                    }
                    Some(store::update_sub_item(&tree, &group, &criterion, replacement)?)
                }
                None => {
                    warn!(%group, %criterion, %sub_item, "sub-item not found, nothing to update");
                    Some(tree.clone())
                }
            }
        }
        Commands::DeleteSubItem {
            group,
            criterion,
            sub_item,
        } => Some(store::delete_sub_item(&tree, &group, &criterion, &sub_item)),
        Commands::Score {
            group,
            criterion,
            sub_item,
            status,
            date,
            notes,
        } => {
            let item = tree.sub_item(&group, &criterion, &sub_item);
            let status = match (status, item) {
                (Some(raw), _) if raw.trim().is_empty() => Some(None),
                (Some(raw), Some(item)) => {
                    let options: Vec<String> = item
                        .scoring_type
                        .options()
                        .iter()
                        .map(ToString::to_string)
                        .collect();
                    let parsed = item
                        .scoring_type
                        .parse_status(&raw)
                        .with_context(|| format!("expected one of: {}", options.join(", ")))?;
                    Some(Some(parsed))
                }
                // set_score leaves the tree alone and warns when the path is missing
                (Some(_), None) | (None, _) => None,
            };
            let delta = ScoreDelta {
                status,
                date,
                notes,
                evidence: None,
            };
            Some(store::set_score(&tree, &group, &criterion, &sub_item, delta)?)
        }
        Commands::Attach {
            group,
            criterion,
            sub_item,
            file,
            media_type,
        } => {
            let name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let evidence = Evidence::new(name, media_type, file.display().to_string());
            let id = evidence.id.clone();
            let next = store::add_evidence(&tree, &group, &criterion, &sub_item, evidence)?;
            println!("{id}");
            Some(next)
        }
        Commands::Detach {
            group,
            criterion,
            sub_item,
            evidence,
        } => Some(store::remove_evidence(&tree, &group, &criterion, &sub_item, &evidence)),
        Commands::Stats => {
            print_stats(&tree);
            None
        }
        Commands::Export { csv } => {
            let rows = report::to_export_rows(&tree);
            let written = workbook::export_csv(&csv, &rows)?;
            println!("Exported {written} rows to {}.", csv.display());
            None
        }
        Commands::Import { csv } => {
            let rows = workbook::import_csv(&csv)?;
            let imported = report::from_export_rows(&rows)
                .with_context(|| format!("failed to rebuild workbook from {}", csv.display()))?;
            println!("Imported {} rows from {}.", rows.len(), csv.display());
            Some(imported)
        }
        Commands::Report { out } => {
            let output = report::build_report(&tree, Utc::now().date_naive());
            std::fs::write(&out, output)?;
            println!("Report written to {}.", out.display());
            None
        }
    };

    if let Some(next) = next {
        if next.ptr_eq(&tree) {
            warn!("nothing changed, workbook not rewritten");
        } else {
            let untouched = next
                .groups
                .iter()
                .filter(|group| next.shares_group_with(&tree, &group.id))
                .count();
            debug!(untouched, groups = next.groups.len(), "groups carried over unchanged");
            workbook::save(&cli.workbook, &next)?;
        }
    }

    Ok(())
}

fn print_stats(tree: &Snapshot) {
    println!(
        "Completion: {:.1}% across {} sub-items",
        stats::completion_ratio(tree) * 100.0,
        stats::flatten_sub_items(tree).count()
    );

    let distribution = stats::status_distribution(tree);
    if distribution.is_empty() {
        println!("No scores recorded yet.");
    } else {
        println!("Status mix:");
        for (status, count) in distribution.iter() {
            let label = if status.is_empty() { "(unset)" } else { status.as_str() };
            println!("- {label}: {count}");
        }
    }

    let averages = stats::department_average_score(tree);
    if !averages.is_empty() {
        println!("Average SCALE_10 score by department:");
        for (department, average) in averages.iter() {
            println!("- {department}: {average:.2}");
        }
    }
}
