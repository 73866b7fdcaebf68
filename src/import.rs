use std::io::Read;
use std::path::Path;

use anyhow::Context;
use csv::StringRecord;

use crate::catalog::{Catalogs, TagCatalog};
use crate::models::Gender;

const CUSTOM_PREFIXES: &[&str] = &["기타:", "other:"];

/// A student row ready to be inserted into a project.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub student_number: Option<i32>,
    pub name: String,
    pub current_class: i32,
    pub gender: Gender,
    pub behaviors: Vec<String>,
    pub special_notes: Vec<String>,
    pub custom_behavior: Option<String>,
    pub custom_special_note: Option<String>,
    pub student_rank: Option<i32>,
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Column {
    Number,
    Name,
    Class,
    Gender,
    Behaviors,
    SpecialNotes,
    Memo,
    Rank,
}

impl Column {
    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Column::Number => &["번호", "number"],
            Column::Name => &["이름", "name"],
            Column::Class => &["학급", "class"],
            Column::Gender => &["성별", "gender"],
            Column::Behaviors => &["행동특성", "behaviors"],
            Column::SpecialNotes => &["특이사항", "special_notes"],
            Column::Memo => &["메모", "memo"],
            Column::Rank => &["석차", "rank"],
        }
    }
}

fn normalize_header(header: &str) -> String {
    header
        .trim()
        .trim_start_matches('\u{feff}')
        .trim_end_matches("(선택)")
        .trim_end_matches("(필수)")
        .trim()
        .to_lowercase()
}

struct Header {
    names: Vec<String>,
}

impl Header {
    fn new(record: &StringRecord) -> Self {
        Self {
            names: record.iter().map(normalize_header).collect(),
        }
    }

    fn cell<'r>(&self, record: &'r StringRecord, column: Column) -> &'r str {
        column
            .aliases()
            .iter()
            .find_map(|alias| self.names.iter().position(|name| name == alias))
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .unwrap_or("")
    }
}

/// Leading integer of a cell, ignoring anything after the digits.
fn leading_int(cell: &str) -> Option<i32> {
    let cell = cell.trim();
    let digits_end = cell
        .char_indices()
        .find(|(idx, ch)| !(ch.is_ascii_digit() || (*idx == 0 && (*ch == '-' || *ch == '+'))))
        .map(|(idx, _)| idx)
        .unwrap_or(cell.len());
    cell[..digits_end].parse().ok()
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Splits a tag cell into catalog ids and an optional custom label.
pub fn parse_tag_cell(cell: &str, catalog: &TagCatalog) -> (Vec<String>, Option<String>) {
    let mut tags: Vec<String> = Vec::new();
    let mut custom: Option<String> = None;
    let other_label = catalog.label_of(catalog.other_id());

    for item in cell.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        let prefixed = CUSTOM_PREFIXES
            .iter()
            .find_map(|prefix| item.strip_prefix(prefix))
            .or_else(|| {
                item.strip_prefix(other_label?)
                    .and_then(|rest| rest.strip_prefix(':'))
            });

        let id = if let Some(text) = prefixed {
            custom = non_empty(text);
            catalog.other_id().to_string()
        } else if let Some(option) = catalog.find_by_label(item) {
            option.id.clone()
        } else {
            custom = Some(match custom {
                Some(existing) => format!("{existing}, {item}"),
                None => item.to_string(),
            });
            catalog.other_id().to_string()
        };

        if !tags.contains(&id) {
            tags.push(id);
        }
    }

    (tags, custom)
}

fn parse_gender(cell: &str) -> Gender {
    match cell.to_lowercase().as_str() {
        "남" | "남자" | "male" => Gender::Male,
        _ => Gender::Female,
    }
}

fn parse_row(header: &Header, record: &StringRecord, catalogs: &Catalogs) -> Option<NewStudent> {
    let name = non_empty(header.cell(record, Column::Name))?;
    let (behaviors, custom_behavior) =
        parse_tag_cell(header.cell(record, Column::Behaviors), &catalogs.behaviors);
    let (special_notes, custom_special_note) =
        parse_tag_cell(header.cell(record, Column::SpecialNotes), &catalogs.special_notes);

    Some(NewStudent {
        student_number: leading_int(header.cell(record, Column::Number)).filter(|n| *n != 0),
        name,
        current_class: leading_int(header.cell(record, Column::Class))
            .filter(|class| *class != 0)
            .unwrap_or(1),
        gender: parse_gender(header.cell(record, Column::Gender)),
        behaviors,
        special_notes,
        custom_behavior,
        custom_special_note,
        student_rank: leading_int(header.cell(record, Column::Rank)).filter(|rank| *rank > 0),
        memo: non_empty(header.cell(record, Column::Memo)),
    })
}

/// Parses every row with a non-empty name.
pub fn parse_roster<R: Read>(input: R, catalogs: &Catalogs) -> anyhow::Result<Vec<NewStudent>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    let header = Header::new(reader.headers().context("roster has no header row")?);
    let mut students = Vec::new();

    for (line, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("malformed roster row {}", line + 2))?;
        if let Some(student) = parse_row(&header, &record, catalogs) {
            students.push(student);
        }
    }

    Ok(students)
}

pub fn read_roster(path: &Path, catalogs: &Catalogs) -> anyhow::Result<Vec<NewStudent>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open roster {}", path.display()))?;
    parse_roster(file, catalogs)
}
