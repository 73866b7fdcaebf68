use anyhow::Context;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::advisory::UsagePurpose;
use crate::import::NewStudent;
use crate::models::{Gender, Project, RelationType, Relationship, Student};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_PROJECT_ID: &str = "5b1f0c8e-7a43-4f8b-9a59-2f1d6c0e4a11";

pub async fn seed(pool: &PgPool) -> anyhow::Result<Uuid> {
    let project_id = Uuid::parse_str(SEED_PROJECT_ID)?;
    sqlx::query(
        r#"
        INSERT INTO class_reassign.projects (id, name, current_classes, target_classes)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO UPDATE
        SET name = EXCLUDED.name,
            current_classes = EXCLUDED.current_classes,
            target_classes = EXCLUDED.target_classes
        "#,
    )
    .bind(project_id)
    .bind("새봄초 5학년 진급")
    .bind(2)
    .bind(3)
    .execute(pool)
    .await?;

    let students: [(&str, i32, &str, i32, Gender, &[&str], &[&str], Option<i32>); 6] = [
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e01",
            1,
            "김민준",
            1,
            Gender::Male,
            &["leadership", "responsible"],
            &[],
            Some(2),
        ),
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e02",
            2,
            "이서연",
            1,
            Gender::Female,
            &["academic_high"],
            &["allergy"],
            Some(1),
        ),
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e03",
            3,
            "박도윤",
            1,
            Gender::Male,
            &["disruptive", "aggressive"],
            &["adhd"],
            Some(14),
        ),
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e04",
            1,
            "최하은",
            2,
            Gender::Female,
            &["introverted", "passive"],
            &["transfer"],
            None,
        ),
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e05",
            2,
            "정시우",
            2,
            Gender::Male,
            &["distracted"],
            &["twins"],
            Some(9),
        ),
        (
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e06",
            3,
            "정시아",
            2,
            Gender::Female,
            &["helpful"],
            &["twins"],
            Some(5),
        ),
    ];

    for (id, number, name, class, gender, behaviors, notes, rank) in students {
        sqlx::query(
            r#"
            INSERT INTO class_reassign.students
            (id, project_id, student_number, name, current_class, gender,
             behaviors, special_notes, student_rank)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(project_id)
        .bind(number)
        .bind(name)
        .bind(class)
        .bind(gender.as_str())
        .bind(behaviors.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .bind(notes.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .bind(rank)
        .execute(pool)
        .await?;
    }

    let relationships = vec![
        (
            "7c3e9a10-5d2b-4f6e-a1c8-3e5f7a9b0d01",
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e03",
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e05",
            RelationType::Conflict,
        ),
        (
            "7c3e9a10-5d2b-4f6e-a1c8-3e5f7a9b0d02",
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e01",
            "0f6b2d3a-1c4e-4a7b-8d2e-9b1a3c5d7e04",
            RelationType::Friendly,
        ),
    ];

    for (id, from, to, relation_type) in relationships {
        sqlx::query(
            r#"
            INSERT INTO class_reassign.relationships
            (id, project_id, student_id, target_student_id, relation_type)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::parse_str(id)?)
        .bind(project_id)
        .bind(Uuid::parse_str(from)?)
        .bind(Uuid::parse_str(to)?)
        .bind(relation_type.as_str())
        .execute(pool)
        .await?;
    }

    info!(%project_id, "seed data written");
    Ok(project_id)
}

pub async fn fetch_project(pool: &PgPool, project_id: Uuid) -> anyhow::Result<Project> {
    let row = sqlx::query(
        "SELECT id, name, current_classes, target_classes, created_at \
         FROM class_reassign.projects WHERE id = $1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("project {project_id} not found"))?;

    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        current_classes: row.get("current_classes"),
        target_classes: row.get("target_classes"),
        created_at: row.get("created_at"),
    })
}

fn student_from_row(row: &PgRow) -> anyhow::Result<Student> {
    let gender: String = row.get("gender");
    Ok(Student {
        id: row.get("id"),
        project_id: row.get("project_id"),
        student_number: row.get("student_number"),
        name: row.get("name"),
        current_class: row.get("current_class"),
        target_class: row.get("target_class"),
        gender: gender.parse()?,
        behaviors: row.get("behaviors"),
        special_notes: row.get("special_notes"),
        custom_behavior: row.get("custom_behavior"),
        custom_special_note: row.get("custom_special_note"),
        student_rank: row.get("student_rank"),
        memo: row.get("memo"),
    })
}

pub async fn fetch_students(pool: &PgPool, project_id: Uuid) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, project_id, student_number, name, current_class, target_class, gender, \
         behaviors, special_notes, custom_behavior, custom_special_note, student_rank, memo \
         FROM class_reassign.students WHERE project_id = $1 \
         ORDER BY current_class, student_number NULLS LAST, name",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(student_from_row).collect()
}

pub async fn fetch_relationships(
    pool: &PgPool,
    project_id: Uuid,
) -> anyhow::Result<Vec<Relationship>> {
    let rows = sqlx::query(
        "SELECT id, student_id, target_student_id, relation_type \
         FROM class_reassign.relationships WHERE project_id = $1 ORDER BY created_at",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    let mut relationships = Vec::with_capacity(rows.len());
    for row in rows {
        let relation_type: String = row.get("relation_type");
        relationships.push(Relationship {
            id: row.get("id"),
            student_id: row.get("student_id"),
            target_student_id: row.get("target_student_id"),
            relation_type: relation_type.parse()?,
        });
    }

    Ok(relationships)
}

pub async fn insert_students(
    pool: &PgPool,
    project_id: Uuid,
    students: &[NewStudent],
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for student in students {
        sqlx::query(
            r#"
            INSERT INTO class_reassign.students
            (id, project_id, student_number, name, current_class, gender, behaviors,
             special_notes, custom_behavior, custom_special_note, student_rank, memo)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_id)
        .bind(student.student_number)
        .bind(&student.name)
        .bind(student.current_class)
        .bind(student.gender.as_str())
        .bind(&student.behaviors)
        .bind(&student.special_notes)
        .bind(&student.custom_behavior)
        .bind(&student.custom_special_note)
        .bind(student.student_rank)
        .bind(&student.memo)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert student {}", student.name))?;
    }

    tx.commit().await?;
    info!(%project_id, count = students.len(), "students imported");
    Ok(students.len())
}

/// Moves a student into a target class, or back to unassigned with `None`.
pub async fn set_target_class(
    pool: &PgPool,
    project: &Project,
    student_id: Uuid,
    target_class: Option<i32>,
) -> anyhow::Result<()> {
    if let Some(class) = target_class {
        anyhow::ensure!(
            (1..=project.target_classes).contains(&class),
            "class {class} is outside 1..={}",
            project.target_classes
        );
    }

    let result = sqlx::query(
        "UPDATE class_reassign.students SET target_class = $1 WHERE id = $2 AND project_id = $3",
    )
    .bind(target_class)
    .bind(student_id)
    .bind(project.id)
    .execute(pool)
    .await?;

    anyhow::ensure!(
        result.rows_affected() > 0,
        "student {student_id} is not in project {}",
        project.id
    );
    debug!(%student_id, ?target_class, "target class updated");
    Ok(())
}

pub async fn apply_assignments(
    pool: &PgPool,
    project_id: Uuid,
    assignments: &[(Uuid, i32)],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let mut updated = 0;

    for (student_id, target_class) in assignments {
        updated += sqlx::query(
            "UPDATE class_reassign.students SET target_class = $1 WHERE id = $2 AND project_id = $3",
        )
        .bind(*target_class)
        .bind(*student_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    }

    tx.commit().await?;
    info!(%project_id, updated, "suggested assignments applied");
    Ok(updated)
}

pub async fn add_relationship(
    pool: &PgPool,
    project_id: Uuid,
    student_id: Uuid,
    target_student_id: Uuid,
    relation_type: RelationType,
) -> anyhow::Result<Uuid> {
    anyhow::ensure!(
        student_id != target_student_id,
        "a student cannot be related to themselves"
    );

    let members: i64 = sqlx::query(
        "SELECT COUNT(*) AS members FROM class_reassign.students \
         WHERE project_id = $1 AND id IN ($2, $3)",
    )
    .bind(project_id)
    .bind(student_id)
    .bind(target_student_id)
    .fetch_one(pool)
    .await?
    .get("members");
    anyhow::ensure!(
        members == 2,
        "both students must belong to project {project_id}"
    );

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO class_reassign.relationships
        (id, project_id, student_id, target_student_id, relation_type)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(project_id)
    .bind(student_id)
    .bind(target_student_id)
    .bind(relation_type.as_str())
    .execute(pool)
    .await?;

    info!(%project_id, %relation_type, "relationship recorded");
    Ok(id)
}

pub async fn count_usage(
    pool: &PgPool,
    project_id: Uuid,
    user: &str,
    purpose: UsagePurpose,
) -> anyhow::Result<i64> {
    let used: i64 = sqlx::query(
        "SELECT COUNT(*) AS used FROM class_reassign.ai_usage \
         WHERE project_id = $1 AND user_name = $2 AND usage_type = $3",
    )
    .bind(project_id)
    .bind(user)
    .bind(purpose.as_str())
    .fetch_one(pool)
    .await?
    .get("used");
    Ok(used)
}

pub async fn record_usage(
    pool: &PgPool,
    project_id: Uuid,
    user: &str,
    purpose: UsagePurpose,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO class_reassign.ai_usage (id, project_id, user_name, usage_type) \
         VALUES ($1, $2, $3, $4)",
    )
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(user)
    .bind(purpose.as_str())
    .execute(pool)
    .await?;
    Ok(())
}
