use std::collections::HashMap;
use std::io::Write;

use uuid::Uuid;

use crate::catalog::{Catalogs, TagCatalog};
use crate::difficulty::compute_difficulty;
use crate::models::{ClassStats, Relationship, Student};

fn class_label(class: Option<i32>) -> String {
    match class {
        Some(class) => format!("{class}반"),
        None => "미배정".to_string(),
    }
}

/// Tag labels joined for a sheet cell; the "other" tag carries its custom text.
fn tag_labels(tags: &[String], custom: Option<&str>, catalog: &TagCatalog) -> String {
    tags.iter()
        .filter_map(|id| {
            let label = catalog.label_of(id)?;
            match custom.filter(|text| !text.is_empty()) {
                Some(text) if id == catalog.other_id() => Some(format!("{label}:{text}")),
                _ => Some(label.to_string()),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn write_class_summary<W: Write>(out: W, stats: &[ClassStats]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "학급",
        "총원",
        "남학생",
        "여학생",
        "갈등관계",
        "우호관계",
        "지도난이도",
        "석차인원",
        "최고석차",
        "최저석차",
        "평균석차",
    ])?;

    for class in stats {
        let (count, min, max, avg) = match class.rank_stats {
            Some(rank) => (
                rank.count.to_string(),
                rank.min.to_string(),
                rank.max.to_string(),
                format!("{:.1}", rank.avg),
            ),
            None => ("0".to_string(), String::new(), String::new(), String::new()),
        };
        writer.write_record([
            class_label(Some(class.class_number)),
            class.total.to_string(),
            class.male.to_string(),
            class.female.to_string(),
            class.conflict_count.to_string(),
            class.friendly_count.to_string(),
            class.difficulty_score.to_string(),
            count,
            min,
            max,
            avg,
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Assigned students ordered by target class, then name.
pub fn write_roster_detail<W: Write>(
    out: W,
    students: &[Student],
    catalogs: &Catalogs,
) -> anyhow::Result<()> {
    let mut assigned: Vec<&Student> = students
        .iter()
        .filter(|student| student.target_class.is_some())
        .collect();
    assigned.sort_by(|a, b| {
        a.target_class
            .cmp(&b.target_class)
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "진학학급",
        "이름",
        "성별",
        "원학급",
        "지도난이도",
        "행동특성",
        "특이사항",
        "석차",
        "메모",
    ])?;

    for student in assigned {
        let difficulty =
            compute_difficulty(student, &catalogs.behaviors, &catalogs.special_notes);
        writer.write_record([
            class_label(student.target_class),
            student.name.clone(),
            student.gender.short_label().to_string(),
            class_label(Some(student.current_class)),
            difficulty.label.to_string(),
            tag_labels(
                &student.behaviors,
                student.custom_behavior.as_deref(),
                &catalogs.behaviors,
            ),
            tag_labels(
                &student.special_notes,
                student.custom_special_note.as_deref(),
                &catalogs.special_notes,
            ),
            student
                .ranked()
                .map(|rank| rank.to_string())
                .unwrap_or_default(),
            student.memo.clone().unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Roster of one target class, ordered by name and numbered from 1.
pub fn write_class_roster<W: Write>(
    out: W,
    class_number: i32,
    students: &[Student],
) -> anyhow::Result<()> {
    let mut members: Vec<&Student> = students
        .iter()
        .filter(|student| student.target_class == Some(class_number))
        .collect();
    members.sort_by(|a, b| a.name.cmp(&b.name));

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(["번호", "이름", "성별", "원 학급"])?;
    for (idx, student) in members.iter().enumerate() {
        writer.write_record([
            (idx + 1).to_string(),
            student.name.clone(),
            student.gender.short_label().to_string(),
            class_label(Some(student.current_class)),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn example_cell(catalog: &TagCatalog, custom: &str) -> String {
    let mut items: Vec<String> = catalog
        .options()
        .iter()
        .filter(|option| option.id != catalog.other_id())
        .take(2)
        .map(|option| option.label.clone())
        .collect();
    if let Some(other) = catalog.label_of(catalog.other_id()) {
        items.push(format!("{other}:{custom}"));
    }
    items.join(", ")
}

/// Blank import sheet with the expected headers and one example row.
pub fn write_roster_template<W: Write>(out: W, catalogs: &Catalogs) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "번호",
        "이름",
        "학급",
        "성별",
        "행동특성(선택)",
        "특이사항(선택)",
        "메모(선택)",
        "석차(선택)",
    ])?;
    writer.write_record([
        "1".to_string(),
        "홍길동".to_string(),
        "1".to_string(),
        "남".to_string(),
        example_cell(&catalogs.behaviors, "봉사활동"),
        example_cell(&catalogs.special_notes, "상담필요"),
        "예시 행입니다".to_string(),
        "1".to_string(),
    ])?;

    writer.flush()?;
    Ok(())
}

/// One row per relationship whose endpoints are both on the roster.
pub fn write_relationships<W: Write>(
    out: W,
    students: &[Student],
    relationships: &[Relationship],
) -> anyhow::Result<()> {
    let by_id: HashMap<Uuid, &Student> = students.iter().map(|s| (s.id, s)).collect();
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record([
        "유형",
        "학생1",
        "학생1 진학학급",
        "학생2",
        "학생2 진학학급",
        "같은 학급 여부",
    ])?;

    for relationship in relationships {
        let (Some(first), Some(second)) = (
            by_id.get(&relationship.student_id),
            by_id.get(&relationship.target_student_id),
        ) else {
            continue;
        };
        let same_class = first.target_class.is_some() && first.target_class == second.target_class;
        writer.write_record([
            relationship.relation_type.label().to_string(),
            first.name.clone(),
            class_label(first.target_class),
            second.name.clone(),
            class_label(second.target_class),
            if same_class { "예" } else { "아니오" }.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}
