use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::catalog::Catalogs;
use crate::difficulty::difficulty_score;
use crate::models::{
    AssignmentProgress, ClassStats, Gender, RankStats, RelationType, Relationship, Student,
};

fn add_student(stats: &mut ClassStats, student: &Student, catalogs: &Catalogs) {
    stats.total += 1;
    if student.gender == Gender::Male {
        stats.male += 1;
    }
    stats.female = stats.total - stats.male;

    for tag in &student.behaviors {
        *stats.behavior_counts.entry(tag.clone()).or_insert(0) += 1;
    }
    for tag in &student.special_notes {
        *stats.special_note_counts.entry(tag.clone()).or_insert(0) += 1;
    }

    stats.difficulty_score = stats.difficulty_score.saturating_add(difficulty_score(
        student,
        &catalogs.behaviors,
        &catalogs.special_notes,
    ));
}

fn count_relationship(stats: &mut ClassStats, relation_type: RelationType) {
    match relation_type {
        RelationType::Conflict => stats.conflict_count += 1,
        RelationType::Friendly => stats.friendly_count += 1,
    }
}

/// Count/min/max/average over recorded ranks; `None` when nobody is ranked.
pub fn rank_stats(ranks: &[i32]) -> Option<RankStats> {
    let min = *ranks.iter().min()?;
    let max = *ranks.iter().max()?;
    let sum: i64 = ranks.iter().map(|rank| i64::from(*rank)).sum();
    let mean = sum as f64 / ranks.len() as f64;

    Some(RankStats {
        count: ranks.len(),
        min,
        max,
        avg: (mean * 10.0).round() / 10.0,
    })
}

/// Statistics for one target class. Relationships count only when both
/// endpoints are placed in this class.
pub fn aggregate_class(
    class_number: i32,
    students: &[Student],
    relationships: &[Relationship],
    catalogs: &Catalogs,
) -> ClassStats {
    let members: Vec<&Student> = students
        .iter()
        .filter(|student| student.target_class == Some(class_number))
        .collect();
    let member_ids: HashSet<Uuid> = members.iter().map(|student| student.id).collect();

    let mut stats = ClassStats::empty(class_number);
    for student in &members {
        add_student(&mut stats, student, catalogs);
    }

    for relationship in relationships {
        if member_ids.contains(&relationship.student_id)
            && member_ids.contains(&relationship.target_student_id)
        {
            count_relationship(&mut stats, relationship.relation_type);
        }
    }

    let ranks: Vec<i32> = members.iter().filter_map(|student| student.ranked()).collect();
    stats.rank_stats = rank_stats(&ranks);
    stats
}

fn class_index(target_class: Option<i32>, target_class_count: i32) -> Option<usize> {
    match target_class {
        Some(class) if (1..=target_class_count).contains(&class) => Some((class - 1) as usize),
        _ => None,
    }
}

/// Statistics for classes `1..=target_class_count`, empty classes included.
///
/// Students are placed in one pass and relationships are resolved against that
/// placement in a second pass. Students outside the class range are skipped.
pub fn aggregate_all_classes(
    target_class_count: i32,
    students: &[Student],
    relationships: &[Relationship],
    catalogs: &Catalogs,
) -> Vec<ClassStats> {
    let mut all: Vec<ClassStats> = (1..=target_class_count).map(ClassStats::empty).collect();
    let mut ranks: Vec<Vec<i32>> = vec![Vec::new(); all.len()];
    let mut placement: HashMap<Uuid, usize> = HashMap::with_capacity(students.len());

    for student in students {
        let Some(idx) = class_index(student.target_class, target_class_count) else {
            continue;
        };
        placement.insert(student.id, idx);
        add_student(&mut all[idx], student, catalogs);
        if let Some(rank) = student.ranked() {
            ranks[idx].push(rank);
        }
    }

    for relationship in relationships {
        let from = placement.get(&relationship.student_id);
        let to = placement.get(&relationship.target_student_id);
        if let (Some(a), Some(b)) = (from, to) {
            if a == b {
                count_relationship(&mut all[*a], relationship.relation_type);
            }
        }
    }

    for (stats, class_ranks) in all.iter_mut().zip(ranks) {
        stats.rank_stats = rank_stats(&class_ranks);
    }

    all
}

/// The relationships whose endpoints both sit in `class_number`.
pub fn in_class_relationships<'a>(
    class_number: i32,
    students: &[Student],
    relationships: &'a [Relationship],
) -> Vec<&'a Relationship> {
    let member_ids: HashSet<Uuid> = students
        .iter()
        .filter(|student| student.target_class == Some(class_number))
        .map(|student| student.id)
        .collect();

    relationships
        .iter()
        .filter(|r| member_ids.contains(&r.student_id) && member_ids.contains(&r.target_student_id))
        .collect()
}

pub fn assignment_progress(students: &[Student]) -> AssignmentProgress {
    let total = students.len();
    let assigned = students
        .iter()
        .filter(|student| student.target_class.is_some())
        .count();
    let percent = if total == 0 {
        0
    } else {
        ((assigned as f64 / total as f64) * 100.0).round() as u32
    };

    AssignmentProgress {
        total,
        assigned,
        unassigned: total - assigned,
        percent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::tests::student;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn placed(behaviors: &[&str], gender: Gender, target_class: Option<i32>) -> Student {
        let mut s = student(behaviors, &[]);
        s.gender = gender;
        s.target_class = target_class;
        s
    }

    fn relation(a: &Student, b: &Student, relation_type: RelationType) -> Relationship {
        Relationship {
            id: Uuid::new_v4(),
            student_id: a.id,
            target_student_id: b.id,
            relation_type,
        }
    }

    #[test]
    fn class_difficulty_saturates() {
        let catalogs = crate::difficulty::tests::heaviest_catalogs();
        let mut a = placed(&[], Gender::Male, Some(1));
        a.behaviors = vec!["heavy".to_string(); 1_500_000];
        let mut b = a.clone();
        b.id = Uuid::new_v4();
        let stats = aggregate_class(1, &[a, b], &[], &catalogs);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.difficulty_score, i32::MAX);
    }

    #[test]
    fn mitigating_and_aggravating_tags_cancel_out() {
        let catalogs = Catalogs::builtin().unwrap();
        let a = placed(&["leadership"], Gender::Male, Some(1));
        let b = placed(&["distracted"], Gender::Female, Some(1));
        let stats = aggregate_class(1, &[a, b], &[], &catalogs);

        assert_eq!(stats.total, 2);
        assert_eq!(stats.male, 1);
        assert_eq!(stats.female, 1);
        assert_eq!(stats.difficulty_score, 0);
        assert_eq!(stats.behavior_counts.get("leadership"), Some(&1));
        assert_eq!(stats.behavior_counts.get("distracted"), Some(&1));
        assert_eq!(stats.rank_stats, None);
    }

    #[test]
    fn conflict_counts_only_inside_one_class() {
        let catalogs = Catalogs::builtin().unwrap();
        let a = placed(&[], Gender::Male, Some(1));
        let mut b = placed(&[], Gender::Male, Some(1));
        let relationships = vec![relation(&a, &b, RelationType::Conflict)];

        let stats = aggregate_class(1, &[a.clone(), b.clone()], &relationships, &catalogs);
        assert_eq!(stats.conflict_count, 1);

        b.target_class = Some(2);
        let students = vec![a, b];
        let all = aggregate_all_classes(2, &students, &relationships, &catalogs);
        assert_eq!(all[0].conflict_count, 0);
        assert_eq!(all[1].conflict_count, 0);
        assert_eq!(aggregate_class(1, &students, &relationships, &catalogs).conflict_count, 0);
    }

    #[test]
    fn duplicate_relationships_are_counted_twice() {
        let catalogs = Catalogs::builtin().unwrap();
        let a = placed(&[], Gender::Female, Some(3));
        let b = placed(&[], Gender::Female, Some(3));
        let relationships = vec![
            relation(&a, &b, RelationType::Friendly),
            relation(&b, &a, RelationType::Friendly),
            relation(&a, &b, RelationType::Conflict),
        ];
        let all = aggregate_all_classes(3, &[a, b], &relationships, &catalogs);
        assert_eq!(all[2].friendly_count, 2);
        assert_eq!(all[2].conflict_count, 1);
    }

    #[test]
    fn rank_stats_ignore_unranked_students() {
        let catalogs = Catalogs::builtin().unwrap();
        let mut students: Vec<Student> = [1, 3, 5]
            .into_iter()
            .map(|rank| {
                let mut s = placed(&[], Gender::Male, Some(2));
                s.student_rank = Some(rank);
                s
            })
            .collect();
        students.push(placed(&[], Gender::Female, Some(2)));
        let mut zero_rank = placed(&[], Gender::Female, Some(2));
        zero_rank.student_rank = Some(0);
        students.push(zero_rank);

        let stats = aggregate_class(2, &students, &[], &catalogs);
        assert_eq!(
            stats.rank_stats,
            Some(RankStats {
                count: 3,
                min: 1,
                max: 5,
                avg: 3.0
            })
        );
        assert_eq!(stats.total, 5);
    }

    #[test]
    fn rank_average_rounds_to_one_decimal() {
        let stats = rank_stats(&[1, 2, 2]).unwrap();
        assert_eq!(stats.avg, 1.7);
        assert_eq!(rank_stats(&[]), None);
    }

    #[test]
    fn empty_classes_still_appear() {
        let catalogs = Catalogs::builtin().unwrap();
        let all = aggregate_all_classes(4, &[], &[], &catalogs);
        assert_eq!(all.len(), 4);
        for (idx, stats) in all.iter().enumerate() {
            assert_eq!(stats, &ClassStats::empty(idx as i32 + 1));
        }
    }

    #[test]
    fn all_classes_agree_with_single_class() {
        let catalogs = Catalogs::builtin().unwrap();
        let mut students = vec![
            placed(&["aggressive", "lying"], Gender::Male, Some(1)),
            placed(&["helpful"], Gender::Female, Some(2)),
            placed(&["passive"], Gender::Male, Some(2)),
            placed(&["creative"], Gender::Female, None),
        ];
        students[1].custom_behavior = Some("독서광".to_string());
        students[2].student_rank = Some(4);
        let relationships = vec![
            relation(&students[1], &students[2], RelationType::Friendly),
            relation(&students[0], &students[3], RelationType::Conflict),
        ];

        let all = aggregate_all_classes(2, &students, &relationships, &catalogs);
        for stats in &all {
            assert_eq!(
                stats,
                &aggregate_class(stats.class_number, &students, &relationships, &catalogs)
            );
        }
        assert_eq!(all[1].difficulty_score, -5 + 1 + 2);
    }

    #[test]
    fn in_class_relationships_lists_pairs() {
        let a = placed(&[], Gender::Male, Some(1));
        let b = placed(&[], Gender::Male, Some(1));
        let c = placed(&[], Gender::Male, Some(2));
        let relationships = vec![
            relation(&a, &b, RelationType::Conflict),
            relation(&a, &c, RelationType::Conflict),
        ];
        let students = vec![a, b, c];
        let pairs = in_class_relationships(1, &students, &relationships);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].id, relationships[0].id);
    }

    #[test]
    fn progress_rounds_percent() {
        let students = vec![
            placed(&[], Gender::Male, Some(1)),
            placed(&[], Gender::Male, None),
            placed(&[], Gender::Male, None),
        ];
        assert_eq!(
            assignment_progress(&students),
            AssignmentProgress {
                total: 3,
                assigned: 1,
                unassigned: 2,
                percent: 33
            }
        );
        assert_eq!(assignment_progress(&[]).percent, 0);
    }

    proptest! {
        #[test]
        fn headcounts_are_preserved(
            placements in proptest::collection::vec((proptest::option::of(1..=5i32), any::<bool>(), proptest::option::of(-2..40i32)), 0..60)
        ) {
            let catalogs = Catalogs::builtin().unwrap();
            let students: Vec<Student> = placements
                .iter()
                .map(|(class, male, rank)| {
                    let gender = if *male { Gender::Male } else { Gender::Female };
                    let mut s = placed(&[], gender, *class);
                    s.student_rank = *rank;
                    s
                })
                .collect();

            let all = aggregate_all_classes(5, &students, &[], &catalogs);
            let placed_total: usize = all.iter().map(|stats| stats.total).sum();
            let unset = students.iter().filter(|s| s.target_class.is_none()).count();
            prop_assert_eq!(placed_total + unset, students.len());

            for stats in &all {
                prop_assert_eq!(stats.male + stats.female, stats.total);
                if let Some(ranks) = stats.rank_stats {
                    prop_assert!(ranks.min as f64 <= ranks.avg && ranks.avg <= ranks.max as f64);
                }
            }
        }
    }
}
