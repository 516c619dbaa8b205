use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Declares a closed set of labels that serialize as their display text.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $label)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let wanted = value.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| {
                        let choices: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        format!("unknown value '{value}', expected one of: {}", choices.join(", "))
                    })
            }
        }
    };
}

labelled_enum!(
    #[allow(clippy::upper_case_acronyms)]
    Board {
        CBSE => "CBSE",
        ICSE => "ICSE",
        GSEB => "GSEB",
        Cambridge => "Cambridge",
        IB => "IB",
    }
);

labelled_enum!(EntryType {
    Start => "start",
    Milestone => "milestone",
    Finish => "finish",
});

labelled_enum!(WorkStatus {
    Assign => "Assign",
    Pending => "Pending",
    Completed => "Completed",
});

labelled_enum!(
    /// Shared by work items and doubts.
    Priority {
        Low => "Low",
        Medium => "Medium",
        High => "High",
    }
);

labelled_enum!(
    /// Which rule generated a work item.
    WorkSource {
        Syllabus => "syllabus",
        Doubt => "doubt",
    }
);

labelled_enum!(DoubtStatus {
    Open => "Open",
    Resolved => "Resolved",
    Tasked => "Tasked",
});

labelled_enum!(
    /// Per-student workload signal derived from open and overdue work.
    WorkHealth {
        Healthy => "Healthy",
        Warning => "Warning",
        Critical => "Critical",
    }
);

labelled_enum!(DoubtOrigin {
    DuringReading => "During Reading",
    DuringWorkTask => "During Work Task",
    DuringNotes => "During Notes",
    BeforeTest => "Before Test",
    AfterTest => "After Test",
    Other => "Other",
});

pub const TIME_SLOTS: [&str; 3] = ["3:00–4:30", "4:30–6:00", "6:00–8:00"];

/// Generates a fresh record id such as `w_3f2a...`.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

/// Chapter number as entered by the mentor.
///
/// Stored documents carry it either as a JSON string or a number; both are
/// read and it is always compared in trimmed string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChapterNo(String);

impl ChapterNo {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChapterNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ChapterNo {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ChapterNo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Whole(i64),
            Fraction(f64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => ChapterNo::new(text),
            Raw::Whole(number) => ChapterNo(number.to_string()),
            Raw::Fraction(number) => ChapterNo(number.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub grade: String,
    pub board: Board,
    pub school: String,
    #[serde(default)]
    pub batch: String,
    #[serde(default)]
    pub time_slot: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub father_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mother_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_stage: Option<String>,
}

impl Student {
    pub fn phones(&self) -> [(&'static str, Option<&str>); 3] {
        [
            ("personalPhone", self.personal_phone.as_deref()),
            ("fatherPhone", self.father_phone.as_deref()),
            ("motherPhone", self.mother_phone.as_deref()),
        ]
    }
}

/// Program stage label implied by board and grade, if the board has one.
pub fn program_stage(board: Board, grade: &str) -> Option<String> {
    let grade: u32 = grade.trim().parse().ok()?;
    let label = match (board, grade) {
        (Board::Cambridge, 1..=5) => return Some(format!("Primary (Stage {grade})")),
        (Board::Cambridge, 6) => "Lower Secondary (Stage 7)",
        (Board::Cambridge, 7) => "Lower Secondary (Stage 8)",
        (Board::Cambridge, 8) => "Lower Secondary (Stage 9)",
        (Board::Cambridge, 9) => "IGCSE (Year 1)",
        (Board::Cambridge, 10) => "IGCSE (Year 2)",
        (Board::Cambridge, 11) => "AS Level (A1)",
        (Board::Cambridge, 12) => "A Level (A2)",
        (Board::IB, 1..=5) => "PYP",
        (Board::IB, 6..=10) => "MYP",
        (Board::IB, 11..=12) => "DP",
        _ => return None,
    };
    Some(label.to_string())
}

pub fn batch_for_time_slot(time_slot: &str) -> Option<&'static str> {
    match time_slot.trim() {
        "3:00–4:30" => Some("A"),
        "4:30–6:00" => Some("B"),
        "6:00–8:00" => Some("C"),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub no: ChapterNo,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectData {
    pub subject: String,
    #[serde(default)]
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSubjects {
    pub student_id: String,
    pub subjects: Vec<SubjectData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterProgressEntry {
    pub id: String,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterProgress {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    pub chapter_no: ChapterNo,
    pub chapter_name: String,
    #[serde(default)]
    pub entries: Vec<ChapterProgressEntry>,
}

impl ChapterProgress {
    /// Composite identity `studentId-subject-chapterNo`.
    pub fn key(student_id: &str, subject: &str, chapter_no: &ChapterNo) -> String {
        format!("{student_id}-{subject}-{chapter_no}")
    }

    pub fn new(student_id: &str, subject: &str, chapter: &Chapter) -> Self {
        Self {
            id: Self::key(student_id, subject, &chapter.no),
            student_id: student_id.to_string(),
            subject: subject.to_string(),
            chapter_no: chapter.no.clone(),
            chapter_name: chapter.name.clone(),
            entries: Vec::new(),
        }
    }

    pub fn latest_entry(&self) -> Option<&ChapterProgressEntry> {
        self.entries.iter().max_by_key(|entry| entry.date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub data_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: String,
    pub student_id: String,
    pub title: String,
    pub subject: String,
    #[serde(default)]
    pub chapter_no: ChapterNo,
    #[serde(default)]
    pub chapter_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub description: String,
    pub due_date: NaiveDate,
    pub status: WorkStatus,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mentor_note: Option<String>,
    pub date_created: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_doubt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<WorkSource>,
}

impl WorkItem {
    pub fn is_completed(&self) -> bool {
        self.status == WorkStatus::Completed
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_completed() && self.due_date < today
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doubt {
    pub id: String,
    pub student_id: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_no: Option<ChapterNo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    pub text: String,
    pub priority: Priority,
    pub origin: DoubtOrigin,
    pub created_at: NaiveDate,
    pub status: DoubtStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_note: Option<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chapter_numbers_accept_strings_and_numbers() {
        let chapters: Vec<Chapter> = serde_json::from_str(
            r#"[{"no": 1, "name": "Real Numbers"}, {"no": " 2 ", "name": "Polynomials"}]"#,
        )
        .unwrap();
        assert_eq!(chapters[0].no, ChapterNo::new("1"));
        assert_eq!(chapters[1].no.as_str(), "2");

        let json = serde_json::to_string(&chapters[0]).unwrap();
        assert_eq!(json, r#"{"no":"1","name":"Real Numbers"}"#);
    }

    #[test]
    fn reads_stored_work_item_layout() {
        let raw = r#"{
            "id": "w_1700000000000",
            "studentId": "1",
            "title": "Start reading & note making for Polynomials",
            "subject": "Mathematics",
            "chapterNo": "2",
            "chapterName": "Polynomials",
            "topic": "",
            "description": "Begin reading and making notes as the chapter has started in school.",
            "dueDate": "2024-01-08",
            "status": "Assign",
            "priority": "Low",
            "links": [],
            "files": [],
            "mentorNote": "",
            "dateCreated": "2024-01-01",
            "source": "syllabus"
        }"#;
        let item: WorkItem = serde_json::from_str(raw).unwrap();
        assert_eq!(item.source, Some(WorkSource::Syllabus));
        assert_eq!(item.due_date, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
        assert!(item.linked_doubt_id.is_none());
    }

    #[test]
    fn doubt_origin_uses_display_labels() {
        let origin: DoubtOrigin = serde_json::from_str(r#""Before Test""#).unwrap();
        assert_eq!(origin, DoubtOrigin::BeforeTest);
        assert_eq!("during notes".parse::<DoubtOrigin>(), Ok(DoubtOrigin::DuringNotes));
        assert!("sometime".parse::<DoubtOrigin>().is_err());
    }

    #[test]
    fn program_stage_follows_board_tables() {
        assert_eq!(program_stage(Board::Cambridge, "3").as_deref(), Some("Primary (Stage 3)"));
        assert_eq!(program_stage(Board::Cambridge, "11").as_deref(), Some("AS Level (A1)"));
        assert_eq!(program_stage(Board::IB, "7").as_deref(), Some("MYP"));
        assert_eq!(program_stage(Board::IB, "12").as_deref(), Some("DP"));
        assert_eq!(program_stage(Board::CBSE, "10"), None);
        assert_eq!(program_stage(Board::IB, ""), None);
    }

    #[test]
    fn batch_follows_time_slot() {
        assert_eq!(batch_for_time_slot("4:30–6:00"), Some("B"));
        assert_eq!(batch_for_time_slot("9:00"), None);
    }
}
