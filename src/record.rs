use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::text::{is_blank, normalize_value};

pub const PARTICIPANT_NAME_SEPARATOR: &str = "、";
pub const EDUCATION_LEVEL_SUFFIX: char = '组';

// Field names historical templates use for the participant list.
pub const PARTICIPANT_FIELD_ALIASES: &[&str] = &[
    "participants_names",
    "participant_names",
    "participant_name",
    "name",
    "winner_name",
    "winners",
    "student_name",
    "student_names",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub seq_no: i64,
    #[serde(alias = "participant_name")]
    pub name: String,
}

/// Read-only view of one application as seen by the renderer.
pub trait RenderRecord {
    fn attribute(&self, name: &str) -> Option<String>;

    fn participants(&self) -> Vec<Participant>;

    fn category(&self) -> String {
        normalize_value(self.attribute("category").as_deref())
    }

    fn award_level(&self) -> String {
        normalize_value(self.attribute("award_level").as_deref())
    }

    /// Participant names ordered by sequence number.
    fn participant_names(&self) -> Vec<String> {
        let mut participants = self.participants();
        participants.sort_by_key(|p| p.seq_no);
        participants.into_iter().map(|p| p.name).collect()
    }
}

/// JSON-backed application record: a `participants` array plus any number of
/// scalar attributes at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ApplicationRecord {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn with_participant(mut self, seq_no: i64, name: &str) -> Self {
        self.participants.push(Participant {
            seq_no,
            name: name.to_string(),
        });
        self
    }
}

impl RenderRecord for ApplicationRecord {
    fn attribute(&self, name: &str) -> Option<String> {
        match self.attributes.get(name)? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    fn participants(&self) -> Vec<Participant> {
        self.participants.clone()
    }
}

/// Where a template field's text comes from. The mapping is closed: unknown
/// names read the attribute of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    ParticipantNames,
    CategoryTask,
    AwardLevel,
    EducationLevel,
    Attribute(String),
}

impl FieldSource {
    pub fn parse(field: &str) -> Self {
        let field = field.trim();
        if PARTICIPANT_FIELD_ALIASES.contains(&field) {
            return FieldSource::ParticipantNames;
        }
        match field {
            "category_task" => FieldSource::CategoryTask,
            "award_level" => FieldSource::AwardLevel,
            "education_level" => FieldSource::EducationLevel,
            other => FieldSource::Attribute(other.to_string()),
        }
    }

    /// Resolved display text; "" means nothing should be drawn.
    pub fn resolve(&self, record: &dyn RenderRecord) -> String {
        match self {
            FieldSource::ParticipantNames => record
                .participant_names()
                .into_iter()
                .filter(|name| !is_blank(name))
                .collect::<Vec<_>>()
                .join(PARTICIPANT_NAME_SEPARATOR),
            FieldSource::CategoryTask => {
                let category = normalize_value(record.attribute("category").as_deref());
                let task = normalize_value(record.attribute("task").as_deref());
                if category.is_empty() && task.is_empty() {
                    String::new()
                } else {
                    format!("{category} - {task}")
                }
            }
            FieldSource::AwardLevel => record.award_level(),
            FieldSource::EducationLevel => {
                let value = normalize_value(record.attribute("education_level").as_deref());
                match value.strip_suffix(EDUCATION_LEVEL_SUFFIX) {
                    Some(stripped) => stripped.to_string(),
                    None => value,
                }
            }
            FieldSource::Attribute(name) => normalize_value(record.attribute(name).as_deref()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApplicationRecord {
        ApplicationRecord::default()
            .with_attribute("category", "机器人")
            .with_attribute("task", "越障")
            .with_attribute("award_level", "一等奖")
            .with_attribute("education_level", "初中组")
            .with_attribute("school_name", "第一中学")
            .with_attribute("teacher_name", "nan")
            .with_attribute("match_no", 1024)
            .with_participant(2, "李四")
            .with_participant(1, "张三")
    }

    #[test]
    fn participant_aliases_join_names_in_sequence_order() {
        let record = sample();
        for alias in PARTICIPANT_FIELD_ALIASES {
            assert_eq!(FieldSource::parse(alias), FieldSource::ParticipantNames);
            assert_eq!(FieldSource::parse(alias).resolve(&record), "张三、李四");
        }
    }

    #[test]
    fn derived_fields() {
        let record = sample();
        assert_eq!(FieldSource::parse("category_task").resolve(&record), "机器人 - 越障");
        assert_eq!(FieldSource::parse("education_level").resolve(&record), "初中");
        assert_eq!(FieldSource::parse("award_level").resolve(&record), "一等奖");
        assert_eq!(FieldSource::parse(" school_name ").resolve(&record), "第一中学");
        assert_eq!(FieldSource::parse("match_no").resolve(&record), "1024");
    }

    #[test]
    fn missing_and_sentinel_attributes_are_empty() {
        let record = sample();
        assert_eq!(FieldSource::parse("teacher_name").resolve(&record), "");
        assert_eq!(FieldSource::parse("no_such_field").resolve(&record), "");
        let empty = ApplicationRecord::default();
        assert_eq!(FieldSource::parse("category_task").resolve(&empty), "");
        assert_eq!(FieldSource::ParticipantNames.resolve(&empty), "");
    }

    #[test]
    fn education_level_without_suffix_is_unchanged() {
        let record = ApplicationRecord::default().with_attribute("education_level", "高中");
        assert_eq!(FieldSource::EducationLevel.resolve(&record), "高中");
    }

    #[test]
    fn records_deserialize_from_json() {
        let record = ApplicationRecord::from_json(
            r#"{
                "category": "编程",
                "award_level": null,
                "participants": [
                    {"seq_no": 2, "participant_name": "王五"},
                    {"seq_no": 1, "name": "赵六"}
                ]
            }"#,
        )
        .expect("record");
        assert_eq!(record.category(), "编程");
        assert_eq!(record.award_level(), "");
        assert_eq!(record.participant_names(), vec!["赵六", "王五"]);
    }
}
