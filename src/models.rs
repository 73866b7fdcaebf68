use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Short Korean label used in sheets and reports.
    pub fn short_label(&self) -> &'static str {
        match self {
            Gender::Male => "남",
            Gender::Female => "여",
        }
    }
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => anyhow::bail!("unknown gender '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Conflict,
    Friendly,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Conflict => "conflict",
            RelationType::Friendly => "friendly",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationType::Conflict => "갈등",
            RelationType::Friendly => "우호",
        }
    }
}

impl FromStr for RelationType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "conflict" => Ok(RelationType::Conflict),
            "friendly" => Ok(RelationType::Friendly),
            other => anyhow::bail!("unknown relationship type '{other}'"),
        }
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub current_classes: i32,
    pub target_classes: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub project_id: Uuid,
    pub student_number: Option<i32>,
    pub name: String,
    pub current_class: i32,
    pub target_class: Option<i32>,
    pub gender: Gender,
    pub behaviors: Vec<String>,
    pub special_notes: Vec<String>,
    pub custom_behavior: Option<String>,
    pub custom_special_note: Option<String>,
    pub student_rank: Option<i32>,
    pub memo: Option<String>,
}

impl Student {
    pub fn has_custom_behavior(&self) -> bool {
        self.custom_behavior.as_deref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_custom_special_note(&self) -> bool {
        self.custom_special_note
            .as_deref()
            .is_some_and(|s| !s.is_empty())
    }

    /// Rank counts only when it is recorded and positive.
    pub fn ranked(&self) -> Option<i32> {
        self.student_rank.filter(|rank| *rank > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Uuid,
    pub student_id: Uuid,
    pub target_student_id: Uuid,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankStats {
    pub count: usize,
    pub min: i32,
    pub max: i32,
    pub avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStats {
    pub class_number: i32,
    pub total: usize,
    pub male: usize,
    pub female: usize,
    pub behavior_counts: BTreeMap<String, usize>,
    pub special_note_counts: BTreeMap<String, usize>,
    pub conflict_count: usize,
    pub friendly_count: usize,
    pub difficulty_score: i32,
    pub rank_stats: Option<RankStats>,
}

impl ClassStats {
    pub fn empty(class_number: i32) -> Self {
        Self {
            class_number,
            total: 0,
            male: 0,
            female: 0,
            behavior_counts: BTreeMap::new(),
            special_note_counts: BTreeMap::new(),
            conflict_count: 0,
            friendly_count: 0,
            difficulty_score: 0,
            rank_stats: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AssignmentProgress {
    pub total: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub percent: u32,
}
