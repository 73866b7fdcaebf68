use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod advisory;
mod catalog;
mod db;
mod difficulty;
mod export;
mod import;
mod models;
mod report;
mod stats;

use advisory::{UsagePurpose, UsageQuota};
use catalog::Catalogs;
use models::RelationType;

#[derive(Parser)]
#[command(name = "class-reassign")]
#[command(about = "Class reassignment planning with difficulty scoring and balance statistics", long_about = None)]
struct Cli {
    /// JSON file replacing the built-in tag catalogs
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a sample project
    Seed,
    /// Import students from a roster CSV
    Import {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        csv: PathBuf,
    },
    /// Write an empty roster sheet to fill in before importing
    Template {
        #[arg(long, default_value = "roster_template.csv")]
        out: PathBuf,
    },
    /// Write summary, roster, relationship and per-class CSVs
    Export {
        #[arg(long)]
        project: Uuid,
        #[arg(long, default_value = "export")]
        out_dir: PathBuf,
    },
    /// List students with their difficulty level
    Level {
        #[arg(long)]
        project: Uuid,
        /// Only students placed in this target class
        #[arg(long)]
        class: Option<i32>,
    },
    /// Print per-class balance statistics
    Stats {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown balance report
    Report {
        #[arg(long)]
        project: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Place a student in a target class
    Assign {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        class: i32,
    },
    /// Return a student to the unassigned pool
    Unassign {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        student: Uuid,
    },
    /// Record a conflict or friendly relationship
    Relate {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        target: Uuid,
        #[arg(long, value_enum)]
        kind: RelationType,
    },
    /// Write the advisory prompt for the generative model
    Prompt {
        #[arg(long)]
        project: Uuid,
        #[arg(long, value_enum)]
        purpose: UsagePurpose,
        #[arg(long, default_value = "prompt.txt")]
        out: PathBuf,
    },
    /// Read a saved model response, apply it and count the use
    Advise {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        user: String,
        #[arg(long, value_enum)]
        purpose: UsagePurpose,
        #[arg(long)]
        response: PathBuf,
    },
    /// Show remaining AI uses for a user
    Usage {
        #[arg(long)]
        project: Uuid,
        #[arg(long)]
        user: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn describe_placement(student: &models::Student) -> String {
    match student.target_class {
        Some(class) => format!("from class {}, placed in class {class}", student.current_class),
        None => format!("from class {}, unassigned", student.current_class),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let catalogs = match &cli.catalog {
        Some(path) => Catalogs::load(path)?,
        None => Catalogs::builtin()?,
    };

    if let Commands::Template { out } = &cli.command {
        let file = std::fs::File::create(out)
            .with_context(|| format!("failed to create {}", out.display()))?;
        export::write_roster_template(file, &catalogs)?;
        println!("Template written to {}.", out.display());
        return Ok(());
    }

    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        // written before connecting
        Commands::Template { .. } => {}
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let project_id = db::seed(&pool).await?;
            println!("Seed project {project_id} ready.");
        }
        Commands::Import { project, csv } => {
            let project = db::fetch_project(&pool, project).await?;
            let students = import::read_roster(&csv, &catalogs)?;
            let inserted = db::insert_students(&pool, project.id, &students).await?;
            println!("Imported {inserted} students into {}.", project.name);
        }
        Commands::Export { project, out_dir } => {
            let project = db::fetch_project(&pool, project).await?;
            let students = db::fetch_students(&pool, project.id).await?;
            let relationships = db::fetch_relationships(&pool, project.id).await?;
            let classes = stats::aggregate_all_classes(
                project.target_classes,
                &students,
                &relationships,
                &catalogs,
            );

            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("failed to create {}", out_dir.display()))?;
            let create = |name: &str| {
                let path = out_dir.join(name);
                std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))
            };
            export::write_class_summary(create("summary.csv")?, &classes)?;
            export::write_roster_detail(create("students.csv")?, &students, &catalogs)?;
            export::write_relationships(create("relationships.csv")?, &students, &relationships)?;
            for class_number in 1..=project.target_classes {
                let name = format!("class_{class_number}.csv");
                export::write_class_roster(create(name.as_str())?, class_number, &students)?;
            }
            println!("Export written to {}.", out_dir.display());
        }
        Commands::Level { project, class } => {
            let students = db::fetch_students(&pool, project).await?;
            let selected: Vec<_> = students
                .iter()
                .filter(|s| class.is_none() || s.target_class == class)
                .collect();

            if selected.is_empty() {
                println!("No students found.");
                return Ok(());
            }

            for student in selected {
                let difficulty = difficulty::compute_difficulty(
                    student,
                    &catalogs.behaviors,
                    &catalogs.special_notes,
                );
                println!(
                    "- {} ({}) score {} level {} [{}, {}]",
                    student.name,
                    describe_placement(student),
                    difficulty.score,
                    difficulty.level.number(),
                    difficulty.label,
                    difficulty.level.style()
                );
            }
        }
        Commands::Stats { project, json } => {
            let project = db::fetch_project(&pool, project).await?;
            let students = db::fetch_students(&pool, project.id).await?;
            let relationships = db::fetch_relationships(&pool, project.id).await?;
            let classes = stats::aggregate_all_classes(
                project.target_classes,
                &students,
                &relationships,
                &catalogs,
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&classes)?);
                return Ok(());
            }

            let progress = stats::assignment_progress(&students);
            println!(
                "{}: {}/{} placed ({}%)",
                project.name, progress.assigned, progress.total, progress.percent
            );
            for class in &classes {
                let ranks = class
                    .rank_stats
                    .map(|r| format!("ranks {}-{} avg {:.1}", r.min, r.max, r.avg))
                    .unwrap_or_else(|| "no ranks".to_string());
                println!(
                    "- class {}: {} students ({} M / {} F), difficulty {}, conflicts {}, friendly {}, {}",
                    class.class_number,
                    class.total,
                    class.male,
                    class.female,
                    class.difficulty_score,
                    class.conflict_count,
                    class.friendly_count,
                    ranks
                );
            }
        }
        Commands::Report { project, out } => {
            let project = db::fetch_project(&pool, project).await?;
            let students = db::fetch_students(&pool, project.id).await?;
            let relationships = db::fetch_relationships(&pool, project.id).await?;
            let report = report::build_report(
                &project,
                chrono::Utc::now().date_naive(),
                &students,
                &relationships,
                &catalogs,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Assign {
            project,
            student,
            class,
        } => {
            let project = db::fetch_project(&pool, project).await?;
            db::set_target_class(&pool, &project, student, Some(class)).await?;
            println!("Student {student} placed in class {class}.");
        }
        Commands::Unassign { project, student } => {
            let project = db::fetch_project(&pool, project).await?;
            db::set_target_class(&pool, &project, student, None).await?;
            println!("Student {student} unassigned.");
        }
        Commands::Relate {
            project,
            student,
            target,
            kind,
        } => {
            let id = db::add_relationship(&pool, project, student, target, kind).await?;
            println!("Recorded {kind} relationship {id}.");
        }
        Commands::Prompt {
            project,
            purpose,
            out,
        } => {
            let project = db::fetch_project(&pool, project).await?;
            let students = db::fetch_students(&pool, project.id).await?;
            let relationships = db::fetch_relationships(&pool, project.id).await?;
            let prompt = match purpose {
                UsagePurpose::Analyze => {
                    let classes = stats::aggregate_all_classes(
                        project.target_classes,
                        &students,
                        &relationships,
                        &catalogs,
                    );
                    advisory::build_analysis_prompt(&classes, &catalogs)?
                }
                UsagePurpose::Assign => advisory::build_assignment_prompt(
                    &students,
                    &relationships,
                    project.target_classes,
                )?,
            };
            std::fs::write(&out, prompt)?;
            println!("Prompt written to {}.", out.display());
        }
        Commands::Advise {
            project,
            user,
            purpose,
            response,
        } => {
            let project = db::fetch_project(&pool, project).await?;
            let used = db::count_usage(&pool, project.id, &user, purpose).await?;
            UsageQuota::new(purpose, used).ensure_available(purpose)?;

            let text = std::fs::read_to_string(&response)
                .with_context(|| format!("failed to read {}", response.display()))?;

            match purpose {
                UsagePurpose::Analyze => {
                    let analysis = advisory::parse_analysis(&text)?;
                    db::record_usage(&pool, project.id, &user, purpose).await?;
                    for class in &analysis.class_analyses {
                        println!("- class {}: {}", class.class_number, class.summary);
                    }
                    println!("{}", analysis.overall_analysis.recommendations);
                }
                UsagePurpose::Assign => {
                    let suggestion = advisory::parse_assignments(&text)?;
                    let students = db::fetch_students(&pool, project.id).await?;
                    let plan = advisory::validate_assignments(
                        &suggestion.assignments,
                        &students,
                        project.target_classes,
                    );
                    for rejected in &plan.rejected {
                        warn!(
                            student = %rejected.student_id,
                            class = rejected.target_class,
                            reason = %rejected.reason,
                            "suggested assignment skipped"
                        );
                    }
                    let updated = db::apply_assignments(&pool, project.id, &plan.accepted).await?;
                    db::record_usage(&pool, project.id, &user, purpose).await?;
                    println!(
                        "Applied {updated} assignments, skipped {}.",
                        plan.rejected.len()
                    );
                    if !suggestion.reasoning.is_empty() {
                        println!("{}", suggestion.reasoning);
                    }
                }
            }

            let remaining = UsageQuota::new(purpose, used + 1).remaining;
            println!("{remaining} {} uses left.", purpose.as_str());
        }
        Commands::Usage { project, user } => {
            for purpose in [UsagePurpose::Assign, UsagePurpose::Analyze] {
                let used = db::count_usage(&pool, project, &user, purpose).await?;
                let quota = UsageQuota::new(purpose, used);
                println!(
                    "- {}: {} of {} used, {} left",
                    purpose.as_str(),
                    quota.used,
                    quota.limit,
                    quota.remaining
                );
            }
        }
    }

    Ok(())
}
