use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStyle {
    Danger,
    Warning,
    Success,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagOption {
    pub id: String,
    pub label: String,
    pub style: TagStyle,
    pub score: i32,
}

impl TagOption {
    fn new(id: &str, label: &str, style: TagStyle, score: i32) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            style,
            score,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("{table}: duplicate tag id '{id}'")]
    DuplicateId { table: String, id: String },
    #[error("{table}: duplicate tag label '{label}'")]
    DuplicateLabel { table: String, label: String },
    #[error("{table}: 'other' tag '{id}' is not in the table")]
    MissingOther { table: String, id: String },
    #[error("{table}: tag '{id}' score {score} is out of range")]
    ScoreOutOfRange { table: String, id: String, score: i32 },
}

/// Largest weight a single tag may carry in either direction.
pub const MAX_TAG_SCORE: i32 = 1000;

/// One lookup table with O(1) access by id and by label.
#[derive(Debug, Clone)]
pub struct TagCatalog {
    other_id: String,
    options: Vec<TagOption>,
    by_id: HashMap<String, usize>,
    by_label: HashMap<String, usize>,
}

impl TagCatalog {
    /// Builds a catalog, rejecting duplicate ids or labels, scores beyond
    /// `MAX_TAG_SCORE` and a missing "other" tag.
    pub fn new(
        table: &str,
        other_id: impl Into<String>,
        options: Vec<TagOption>,
    ) -> Result<Self, CatalogError> {
        let other_id = other_id.into();
        let mut by_id = HashMap::with_capacity(options.len());
        let mut by_label = HashMap::with_capacity(options.len());

        for (idx, option) in options.iter().enumerate() {
            if !(-MAX_TAG_SCORE..=MAX_TAG_SCORE).contains(&option.score) {
                return Err(CatalogError::ScoreOutOfRange {
                    table: table.to_string(),
                    id: option.id.clone(),
                    score: option.score,
                });
            }
            if by_id.insert(option.id.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateId {
                    table: table.to_string(),
                    id: option.id.clone(),
                });
            }
            if by_label.insert(option.label.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateLabel {
                    table: table.to_string(),
                    label: option.label.clone(),
                });
            }
        }

        if !by_id.contains_key(&other_id) {
            return Err(CatalogError::MissingOther {
                table: table.to_string(),
                id: other_id,
            });
        }

        Ok(Self {
            other_id,
            options,
            by_id,
            by_label,
        })
    }

    /// Score contributed by a tag id. Unknown ids contribute nothing.
    pub fn score_of(&self, id: &str) -> i32 {
        self.get(id).map(|option| option.score).unwrap_or(0)
    }

    pub fn get(&self, id: &str) -> Option<&TagOption> {
        self.by_id.get(id).map(|idx| &self.options[*idx])
    }

    pub fn find_by_label(&self, label: &str) -> Option<&TagOption> {
        self.by_label.get(label).map(|idx| &self.options[*idx])
    }

    pub fn label_of(&self, id: &str) -> Option<&str> {
        self.get(id).map(|option| option.label.as_str())
    }

    pub fn other_id(&self) -> &str {
        &self.other_id
    }

    pub fn options(&self) -> &[TagOption] {
        &self.options
    }
}

/// Both catalogs as one injected dependency.
#[derive(Debug, Clone)]
pub struct Catalogs {
    pub behaviors: TagCatalog,
    pub special_notes: TagCatalog,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    behaviors: TableFile,
    special_notes: TableFile,
}

#[derive(Debug, Deserialize)]
struct TableFile {
    other: String,
    options: Vec<TagOption>,
}

impl Catalogs {
    pub fn builtin() -> Result<Self, CatalogError> {
        Ok(Self {
            behaviors: TagCatalog::new("behaviors", "other_behavior", default_behaviors())?,
            special_notes: TagCatalog::new("specialNotes", "other_note", default_special_notes())?,
        })
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let file: CatalogFile =
            serde_json::from_str(content).context("failed to parse catalog JSON")?;
        Ok(Self {
            behaviors: TagCatalog::new("behaviors", file.behaviors.other, file.behaviors.options)?,
            special_notes: TagCatalog::new(
                "specialNotes",
                file.special_notes.other,
                file.special_notes.options,
            )?,
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid catalog file {}", path.display()))
    }
}

pub fn default_behaviors() -> Vec<TagOption> {
    use TagStyle::*;
    vec![
        TagOption::new("leadership", "리더십", Success, -5),
        TagOption::new("active", "활동적", Success, -2),
        TagOption::new("introverted", "내향적", Neutral, 0),
        TagOption::new("extroverted", "외향적", Neutral, 0),
        TagOption::new("academic_high", "학습우수", Success, -5),
        TagOption::new("academic_low", "학습부진", Warning, 5),
        TagOption::new("distracted", "산만함", Danger, 5),
        TagOption::new("disruptive", "수업방해", Danger, 10),
        TagOption::new("helpful", "협조적", Success, -5),
        TagOption::new("responsible", "책임감", Success, -5),
        TagOption::new("creative", "창의적", Success, -2),
        TagOption::new("aggressive", "공격적", Danger, 10),
        TagOption::new("passive", "소극적", Neutral, 2),
        TagOption::new("emotional", "정서불안", Danger, 8),
        TagOption::new("peer_issues", "교우관계", Danger, 8),
        TagOption::new("lying", "거짓말", Danger, 8),
        TagOption::new("other_behavior", "기타", Neutral, 1),
    ]
}

pub fn default_special_notes() -> Vec<TagOption> {
    use TagStyle::*;
    vec![
        TagOption::new("adhd", "ADHD", Danger, 10),
        TagOption::new("twins", "쌍둥이", Warning, 3),
        TagOption::new("disability", "장애", Warning, 5),
        TagOption::new("multicultural", "다문화", Neutral, 1),
        TagOption::new("gifted", "영재", Success, -2),
        TagOption::new("special_care", "특별관리", Warning, 5),
        TagOption::new("transfer", "전학생", Neutral, 2),
        TagOption::new("single_parent", "한부모", Neutral, 2),
        TagOption::new("grandparent", "조손가정", Neutral, 2),
        TagOption::new("low_income", "기초수급", Neutral, 2),
        TagOption::new("allergy", "알레르기", Warning, 3),
        TagOption::new("violence", "학폭관련", Danger, 15),
        TagOption::new("other_note", "기타", Neutral, 1),
    ]
}
