use std::collections::HashSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{Catalogs, TagCatalog};
use crate::models::{ClassStats, Relationship, Student};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum UsagePurpose {
    Analyze,
    Assign,
}

impl UsagePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsagePurpose::Analyze => "analyze",
            UsagePurpose::Assign => "assign",
        }
    }

    /// Uses allowed per project per user.
    pub fn limit(&self) -> i64 {
        match self {
            UsagePurpose::Analyze => 2,
            UsagePurpose::Assign => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdvisoryError {
    #[error("AI {purpose} quota used up ({limit} allowed)")]
    QuotaExhausted { purpose: &'static str, limit: i64 },
    #[error("model response contains no JSON object")]
    NoJsonObject,
    #[error("model response JSON does not match the expected shape: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsageQuota {
    pub used: i64,
    pub limit: i64,
    pub remaining: i64,
}

impl UsageQuota {
    pub fn new(purpose: UsagePurpose, used: i64) -> Self {
        let limit = purpose.limit();
        Self {
            used,
            limit,
            remaining: (limit - used).max(0),
        }
    }

    pub fn ensure_available(&self, purpose: UsagePurpose) -> Result<(), AdvisoryError> {
        if self.remaining == 0 {
            return Err(AdvisoryError::QuotaExhausted {
                purpose: purpose.as_str(),
                limit: self.limit,
            });
        }
        Ok(())
    }
}

/// Slice from the first `{` to the last `}` of a free-text reply.
pub fn extract_json_object(text: &str) -> Result<&str, AdvisoryError> {
    let start = text.find('{').ok_or(AdvisoryError::NoJsonObject)?;
    let end = text.rfind('}').ok_or(AdvisoryError::NoJsonObject)?;
    if end < start {
        return Err(AdvisoryError::NoJsonObject);
    }
    Ok(&text[start..=end])
}

/// Models answer scores as either numbers or strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreField {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalysis {
    pub class_number: i32,
    #[serde(default)]
    pub gender_balance: String,
    #[serde(default)]
    pub behavior_analysis: String,
    #[serde(default)]
    pub special_note_analysis: String,
    #[serde(default)]
    pub relationship_analysis: String,
    #[serde(default)]
    pub rank_analysis: Option<String>,
    #[serde(default)]
    pub difficulty_level: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallAnalysis {
    pub gender_balance_score: Option<ScoreField>,
    pub difficulty_balance_score: Option<ScoreField>,
    pub relationship_score: Option<ScoreField>,
    pub rank_balance_score: Option<ScoreField>,
    pub overall_score: Option<ScoreField>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub recommendations: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub class_analyses: Vec<ClassAnalysis>,
    pub overall_analysis: OverallAnalysis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedAssignment {
    pub student_id: String,
    pub target_class: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub assignments: Vec<SuggestedAssignment>,
    #[serde(default)]
    pub reasoning: String,
}

pub fn parse_analysis(text: &str) -> Result<AnalysisResponse, AdvisoryError> {
    Ok(serde_json::from_str(extract_json_object(text)?)?)
}

pub fn parse_assignments(text: &str) -> Result<AssignmentResponse, AdvisoryError> {
    Ok(serde_json::from_str(extract_json_object(text)?)?)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RejectReason {
    #[error("student id is not a UUID")]
    MalformedId,
    #[error("student is not in this project")]
    UnknownStudent,
    #[error("class is outside the configured target classes")]
    ClassOutOfRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RejectedAssignment {
    pub student_id: String,
    pub target_class: i32,
    pub reason: RejectReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentPlan {
    pub accepted: Vec<(Uuid, i32)>,
    pub rejected: Vec<RejectedAssignment>,
}

/// Splits suggestions into those safe to apply and those to report back.
pub fn validate_assignments(
    suggestions: &[SuggestedAssignment],
    students: &[Student],
    target_classes: i32,
) -> AssignmentPlan {
    let known: HashSet<Uuid> = students.iter().map(|student| student.id).collect();
    let mut plan = AssignmentPlan::default();

    for suggestion in suggestions {
        let reject = |reason| RejectedAssignment {
            student_id: suggestion.student_id.clone(),
            target_class: suggestion.target_class,
            reason,
        };

        let Ok(id) = Uuid::parse_str(suggestion.student_id.trim()) else {
            plan.rejected.push(reject(RejectReason::MalformedId));
            continue;
        };
        if !known.contains(&id) {
            plan.rejected.push(reject(RejectReason::UnknownStudent));
        } else if !(1..=target_classes).contains(&suggestion.target_class) {
            plan.rejected.push(reject(RejectReason::ClassOutOfRange));
        } else {
            plan.accepted.push((id, suggestion.target_class));
        }
    }

    plan
}

#[derive(Serialize)]
struct CatalogEntry<'a> {
    id: &'a str,
    label: &'a str,
    score: i32,
}

fn catalog_entries(catalog: &TagCatalog) -> Vec<CatalogEntry<'_>> {
    catalog
        .options()
        .iter()
        .map(|option| CatalogEntry {
            id: &option.id,
            label: &option.label,
            score: option.score,
        })
        .collect()
}

const ANALYSIS_SCHEMA: &str = r#"{
  "classAnalyses": [
    {
      "classNumber": 1,
      "genderBalance": "성별 균형 평가",
      "behaviorAnalysis": "행동 특성 분포 평가",
      "specialNoteAnalysis": "특이사항 분포 평가",
      "relationshipAnalysis": "갈등/우호 관계 평가",
      "rankAnalysis": "석차 분포 평가 (석차 자료가 있을 때)",
      "difficultyLevel": "상/중/하",
      "summary": "학급 요약 2-3문장"
    }
  ],
  "overallAnalysis": {
    "genderBalanceScore": "1-10",
    "difficultyBalanceScore": "1-10",
    "relationshipScore": "1-10",
    "rankBalanceScore": "1-10",
    "overallScore": "1-10",
    "strengths": ["강점"],
    "improvements": ["개선점"],
    "recommendations": "권장사항 3-4문장"
  }
}"#;

const ASSIGNMENT_SCHEMA: &str = r#"{
  "assignments": [
    { "studentId": "학생 ID", "targetClass": 1 }
  ],
  "reasoning": "배정 근거 요약"
}"#;

/// Request text asking the model to review the current placement.
pub fn build_analysis_prompt(stats: &[ClassStats], catalogs: &Catalogs) -> anyhow::Result<String> {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "초등학교 반편성 결과를 검토하는 컨설턴트로서 아래 학급별 현황을 평가해 주세요."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 학급별 현황");
    let _ = writeln!(prompt, "{}", serde_json::to_string_pretty(stats)?);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 행동 특성 점수표 (높을수록 지도가 어려움)");
    let _ = writeln!(
        prompt,
        "{}",
        serde_json::to_string_pretty(&catalog_entries(&catalogs.behaviors))?
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 특이사항 점수표");
    let _ = writeln!(
        prompt,
        "{}",
        serde_json::to_string_pretty(&catalog_entries(&catalogs.special_notes))?
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 평가 항목");
    for item in [
        "학급별 성별 균형",
        "행동 특성 분포",
        "특이사항 분포",
        "갈등/우호 관계 배치",
        "학급 간 지도 난이도 차이",
        "석차 분포 균형",
        "종합 평가와 권장사항",
    ] {
        let _ = writeln!(prompt, "- {item}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 응답 형식 (아래 JSON 하나만 응답)");
    let _ = writeln!(prompt, "{ANALYSIS_SCHEMA}");
    Ok(prompt)
}

/// Request text asking the model to propose a placement for every student.
pub fn build_assignment_prompt(
    students: &[Student],
    relationships: &[Relationship],
    target_classes: i32,
) -> anyhow::Result<String> {
    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "다음 학생들을 {target_classes}개 진학 학급에 배정해 주세요."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 배정 원칙");
    for rule in [
        "학급마다 남녀 수를 비슷하게 맞춥니다.",
        "같은 행동 특성이 한 학급에 몰리지 않게 합니다.",
        "conflict 관계 학생은 서로 다른 학급에 둡니다.",
        "friendly 관계는 가능하면 같은 학급에 둡니다.",
        "쌍둥이는 분리하고 특별관리 학생은 분산합니다.",
    ] {
        let _ = writeln!(prompt, "- {rule}");
    }
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 학생");
    let _ = writeln!(prompt, "{}", serde_json::to_string_pretty(students)?);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 관계 (student_id ↔ target_student_id)");
    let _ = writeln!(prompt, "{}", serde_json::to_string_pretty(relationships)?);
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "## 응답 형식 (아래 JSON 하나만 응답)");
    let _ = writeln!(prompt, "{ASSIGNMENT_SCHEMA}");
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::tests::student;
    use crate::stats::aggregate_all_classes;

    #[test]
    fn quota_never_goes_negative() {
        let quota = UsageQuota::new(UsagePurpose::Assign, 3);
        assert_eq!(quota.remaining, 0);
        assert!(matches!(
            quota.ensure_available(UsagePurpose::Assign),
            Err(AdvisoryError::QuotaExhausted { limit: 1, .. })
        ));

        let quota = UsageQuota::new(UsagePurpose::Analyze, 1);
        assert_eq!(quota.remaining, 1);
        assert!(quota.ensure_available(UsagePurpose::Analyze).is_ok());
    }

    #[test]
    fn extracts_outermost_object() {
        let text = "분석 결과입니다:\n```json\n{\"a\": {\"b\": 1}}\n```\n끝";
        assert_eq!(extract_json_object(text).unwrap(), "{\"a\": {\"b\": 1}}");
        assert!(matches!(
            extract_json_object("no braces here"),
            Err(AdvisoryError::NoJsonObject)
        ));
        assert!(matches!(
            extract_json_object("} backwards {"),
            Err(AdvisoryError::NoJsonObject)
        ));
    }

    #[test]
    fn parses_analysis_with_mixed_score_types() {
        let text = r#"Sure! {
            "classAnalyses": [{"classNumber": 1, "genderBalance": "좋음", "summary": "무난함"}],
            "overallAnalysis": {
                "genderBalanceScore": 8,
                "overallScore": "7",
                "strengths": ["성별 균형"],
                "recommendations": "유지"
            }
        }"#;
        let analysis = parse_analysis(text).unwrap();
        assert_eq!(analysis.class_analyses[0].class_number, 1);
        assert_eq!(analysis.class_analyses[0].rank_analysis, None);
        assert_eq!(
            analysis.overall_analysis.gender_balance_score,
            Some(ScoreField::Number(8.0))
        );
        assert_eq!(
            analysis.overall_analysis.overall_score,
            Some(ScoreField::Text("7".to_string()))
        );
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            parse_assignments("{ \"assignments\": oops }"),
            Err(AdvisoryError::InvalidJson(_))
        ));
    }

    #[test]
    fn validation_splits_suggestions() {
        let a = student(&[], &[]);
        let b = student(&[], &[]);
        let response = parse_assignments(&format!(
            r#"{{"assignments": [
                {{"studentId": "{}", "targetClass": 2}},
                {{"studentId": "{}", "targetClass": 9}},
                {{"studentId": "{}", "targetClass": 1}},
                {{"studentId": "kim", "targetClass": 1}}
            ], "reasoning": "균형"}}"#,
            a.id,
            b.id,
            Uuid::new_v4()
        ))
        .unwrap();

        let plan = validate_assignments(&response.assignments, &[a.clone(), b], 3);
        assert_eq!(plan.accepted, vec![(a.id, 2)]);
        let reasons: Vec<RejectReason> = plan.rejected.iter().map(|r| r.reason).collect();
        assert_eq!(
            reasons,
            vec![
                RejectReason::ClassOutOfRange,
                RejectReason::UnknownStudent,
                RejectReason::MalformedId
            ]
        );
    }

    #[test]
    fn analysis_prompt_embeds_stats_and_catalogs() {
        let catalogs = Catalogs::builtin().unwrap();
        let mut s = student(&["leadership"], &[]);
        s.target_class = Some(1);
        let stats = aggregate_all_classes(2, &[s], &[], &catalogs);
        let prompt = build_analysis_prompt(&stats, &catalogs).unwrap();
        assert!(prompt.contains("\"classNumber\": 2"));
        assert!(prompt.contains("\"difficultyScore\": -5"));
        assert!(prompt.contains("\"rankStats\": null"));
        assert!(prompt.contains("\"id\": \"violence\""));
        assert!(prompt.contains("overallAnalysis"));
    }

    #[test]
    fn assignment_prompt_lists_students_and_relationships() {
        let s = student(&["twins"], &[]);
        let prompt = build_assignment_prompt(&[s.clone()], &[], 4).unwrap();
        assert!(prompt.contains("4개 진학 학급"));
        assert!(prompt.contains(&s.id.to_string()));
        assert!(prompt.contains("\"assignments\""));
    }
}
