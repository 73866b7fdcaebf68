use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::catalog::{Catalogs, TagCatalog};
use crate::difficulty::compute_difficulty;
use crate::models::{Project, RelationType, Relationship, Student};
use crate::stats;

fn describe_counts(counts: &BTreeMap<String, usize>, catalog: &TagCatalog) -> String {
    let mut entries: Vec<(&str, usize)> = counts
        .iter()
        .map(|(id, count)| (catalog.label_of(id).unwrap_or(id.as_str()), *count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .iter()
        .map(|(label, count)| format!("{label} {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_report(
    project: &Project,
    generated_on: NaiveDate,
    students: &[Student],
    relationships: &[Relationship],
    catalogs: &Catalogs,
) -> String {
    let progress = stats::assignment_progress(students);
    let classes = stats::aggregate_all_classes(
        project.target_classes,
        students,
        relationships,
        catalogs,
    );
    let names: HashMap<Uuid, &str> = students.iter().map(|s| (s.id, s.name.as_str())).collect();

    let mut output = String::new();
    let _ = writeln!(output, "# Class Reassignment Report: {}", project.name);
    let _ = writeln!(
        output,
        "Generated {} ({} current classes into {} target classes)",
        generated_on, project.current_classes, project.target_classes
    );
    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "Progress: {} of {} students placed ({}%), {} unassigned.",
        progress.assigned, progress.total, progress.percent, progress.unassigned
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Balance");

    if classes.is_empty() {
        let _ = writeln!(output, "No target classes configured.");
    } else {
        let _ = writeln!(
            output,
            "| Class | Total | Male | Female | Conflicts | Friendly | Difficulty | Ranks (n / min / max / avg) |"
        );
        let _ = writeln!(output, "|---|---|---|---|---|---|---|---|");
        for class in &classes {
            let ranks = match class.rank_stats {
                Some(rank) => format!("{} / {} / {} / {:.1}", rank.count, rank.min, rank.max, rank.avg),
                None => "-".to_string(),
            };
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                class.class_number,
                class.total,
                class.male,
                class.female,
                class.conflict_count,
                class.friendly_count,
                class.difficulty_score,
                ranks
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tag Distribution");
    for class in classes.iter().filter(|class| class.total > 0) {
        let _ = writeln!(output, "- Class {}", class.class_number);
        if !class.behavior_counts.is_empty() {
            let _ = writeln!(
                output,
                "  - Behaviors: {}",
                describe_counts(&class.behavior_counts, &catalogs.behaviors)
            );
        }
        if !class.special_note_counts.is_empty() {
            let _ = writeln!(
                output,
                "  - Special notes: {}",
                describe_counts(&class.special_note_counts, &catalogs.special_notes)
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Conflicts Placed Together");
    let mut any_conflict = false;
    for class in &classes {
        for relationship in stats::in_class_relationships(class.class_number, students, relationships)
            .into_iter()
            .filter(|r| r.relation_type == RelationType::Conflict)
        {
            any_conflict = true;
            let _ = writeln!(
                output,
                "- Class {}: {} and {}",
                class.class_number,
                names.get(&relationship.student_id).copied().unwrap_or("?"),
                names.get(&relationship.target_student_id).copied().unwrap_or("?")
            );
        }
    }
    if !any_conflict {
        let _ = writeln!(output, "No conflict pairs share a class.");
    }

    let mut scored: Vec<(&Student, _)> = students
        .iter()
        .map(|s| (s, compute_difficulty(s, &catalogs.behaviors, &catalogs.special_notes)))
        .filter(|(_, difficulty)| difficulty.score > 0)
        .collect();
    scored.sort_by(|a, b| b.1.score.cmp(&a.1.score).then_with(|| a.0.name.cmp(&b.0.name)));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Difficulty Students");
    if scored.is_empty() {
        let _ = writeln!(output, "No students with a positive difficulty score.");
    } else {
        for (student, difficulty) in scored.iter().take(10) {
            let placement = student
                .target_class
                .map(|class| format!("class {class}"))
                .unwrap_or_else(|| "unassigned".to_string());
            let _ = writeln!(
                output,
                "- {} ({}) score {} [{}]",
                student.name, placement, difficulty.score, difficulty.label
            );
        }
    }

    output
}
