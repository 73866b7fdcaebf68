use serde::Serialize;

use crate::catalog::TagCatalog;
use crate::models::Student;

/// Five teaching-difficulty buckets, hardest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "u8")]
pub enum DifficultyLevel {
    Highest,
    High,
    Medium,
    Low,
    Good,
}

impl DifficultyLevel {
    pub fn from_score(score: i32) -> Self {
        match score {
            20.. => DifficultyLevel::Highest,
            10..=19 => DifficultyLevel::High,
            5..=9 => DifficultyLevel::Medium,
            0..=4 => DifficultyLevel::Low,
            _ => DifficultyLevel::Good,
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            DifficultyLevel::Highest => 1,
            DifficultyLevel::High => 2,
            DifficultyLevel::Medium => 3,
            DifficultyLevel::Low => 4,
            DifficultyLevel::Good => 5,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DifficultyLevel::Highest => "최상",
            DifficultyLevel::High => "상",
            DifficultyLevel::Medium => "중",
            DifficultyLevel::Low => "하",
            DifficultyLevel::Good => "양호",
        }
    }

    /// Style keyword for display, most severe first.
    pub fn style(&self) -> &'static str {
        match self {
            DifficultyLevel::Highest => "danger",
            DifficultyLevel::High => "warning",
            DifficultyLevel::Medium => "attention",
            DifficultyLevel::Low => "success",
            DifficultyLevel::Good => "safe",
        }
    }
}

impl From<DifficultyLevel> for u8 {
    fn from(level: DifficultyLevel) -> Self {
        level.number()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Difficulty {
    pub score: i32,
    pub level: DifficultyLevel,
    pub label: &'static str,
}

impl Difficulty {
    pub fn from_score(score: i32) -> Self {
        let level = DifficultyLevel::from_score(score);
        Self {
            score,
            level,
            label: level.label(),
        }
    }
}

/// Sum of tag weights plus one point for each non-empty custom label.
pub fn difficulty_score(
    student: &Student,
    behaviors: &TagCatalog,
    special_notes: &TagCatalog,
) -> i32 {
    student
        .behaviors
        .iter()
        .map(|id| behaviors.score_of(id))
        .chain(student.special_notes.iter().map(|id| special_notes.score_of(id)))
        .chain([
            i32::from(student.has_custom_behavior()),
            i32::from(student.has_custom_special_note()),
        ])
        .fold(0i32, i32::saturating_add)
}

pub fn compute_difficulty(
    student: &Student,
    behaviors: &TagCatalog,
    special_notes: &TagCatalog,
) -> Difficulty {
    Difficulty::from_score(difficulty_score(student, behaviors, special_notes))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::catalog::Catalogs;
    use crate::models::Gender;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub(crate) fn student(behaviors: &[&str], special_notes: &[&str]) -> Student {
        Student {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            student_number: None,
            name: "김하늘".to_string(),
            current_class: 1,
            target_class: None,
            gender: Gender::Male,
            behaviors: behaviors.iter().map(|s| s.to_string()).collect(),
            special_notes: special_notes.iter().map(|s| s.to_string()).collect(),
            custom_behavior: None,
            custom_special_note: None,
            student_rank: None,
            memo: None,
        }
    }

    #[test]
    fn untagged_student_is_low() {
        let catalogs = Catalogs::builtin().unwrap();
        let result = compute_difficulty(
            &student(&[], &[]),
            &catalogs.behaviors,
            &catalogs.special_notes,
        );
        assert_eq!(result.score, 0);
        assert_eq!(result.level.number(), 4);
        assert_eq!(result.label, "하");
    }

    #[test]
    fn levels_follow_thresholds() {
        let cases = [
            (1000, 1),
            (20, 1),
            (19, 2),
            (10, 2),
            (9, 3),
            (5, 3),
            (4, 4),
            (0, 4),
            (-1, 5),
            (-30, 5),
        ];
        for (score, level) in cases {
            assert_eq!(DifficultyLevel::from_score(score).number(), level, "score {score}");
        }
    }

    #[test]
    fn sums_both_tag_sets_and_custom_labels() {
        let catalogs = Catalogs::builtin().unwrap();
        let mut s = student(&["disruptive", "distracted"], &["adhd"]);
        s.custom_behavior = Some("급식 거부".to_string());
        s.custom_special_note = Some(String::new());
        let result = compute_difficulty(&s, &catalogs.behaviors, &catalogs.special_notes);
        assert_eq!(result.score, 26);
        assert_eq!(result.level, DifficultyLevel::Highest);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let catalogs = Catalogs::builtin().unwrap();
        let s = student(&["leadership", "unicycling"], &["not_a_note"]);
        let result = compute_difficulty(&s, &catalogs.behaviors, &catalogs.special_notes);
        assert_eq!(result.score, -5);
        assert_eq!(result.level.number(), 5);
        assert_eq!(result.label, "양호");
    }

    /// Catalogs whose only weighted behavior carries the largest allowed score.
    pub(crate) fn heaviest_catalogs() -> Catalogs {
        use crate::catalog::{TagCatalog, TagOption, TagStyle, MAX_TAG_SCORE};
        let option = |id: &str, score| TagOption {
            id: id.to_string(),
            label: id.to_string(),
            style: TagStyle::Danger,
            score,
        };
        Catalogs {
            behaviors: TagCatalog::new(
                "behaviors",
                "etc",
                vec![option("heavy", MAX_TAG_SCORE), option("etc", 1)],
            )
            .unwrap(),
            special_notes: TagCatalog::new("specialNotes", "etc", vec![option("etc", 1)]).unwrap(),
        }
    }

    #[test]
    fn huge_tag_lists_saturate_instead_of_overflowing() {
        let catalogs = heaviest_catalogs();
        let mut s = student(&[], &["etc"]);
        s.behaviors = vec!["heavy".to_string(); 2_200_000];
        s.custom_behavior = Some("많음".to_string());
        let result = compute_difficulty(&s, &catalogs.behaviors, &catalogs.special_notes);
        assert_eq!(result.score, i32::MAX);
        assert_eq!(result.level, DifficultyLevel::Highest);
    }

    #[test]
    fn serializes_level_as_number() {
        let value = serde_json::to_value(Difficulty::from_score(7)).unwrap();
        assert_eq!(value, serde_json::json!({"score": 7, "level": 3, "label": "중"}));
    }

    fn tag_orders() -> impl Strategy<Value = (Vec<String>, Vec<String>)> {
        let ids: Vec<String> = crate::catalog::default_behaviors()
            .into_iter()
            .map(|o| o.id)
            .collect();
        let len = ids.len();
        proptest::sample::subsequence(ids, 0..=len)
            .prop_flat_map(|tags| (Just(tags.clone()), Just(tags).prop_shuffle()))
    }

    proptest! {
        #[test]
        fn tag_order_does_not_change_result((original, shuffled) in tag_orders()) {
            let catalogs = Catalogs::builtin().unwrap();
            let mut a = student(&[], &["twins", "adhd"]);
            a.behaviors = original;
            let mut b = student(&[], &["adhd", "twins"]);
            b.behaviors = shuffled;
            prop_assert_eq!(
                compute_difficulty(&a, &catalogs.behaviors, &catalogs.special_notes),
                compute_difficulty(&b, &catalogs.behaviors, &catalogs.special_notes)
            );
        }
    }
}
