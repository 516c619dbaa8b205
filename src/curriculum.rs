//! Reads subject/chapter lists proposed by the curriculum assistant.
//!
//! The assistant answers in prose, JSON, or both. Only the JSON array
//! `[{"subject": ..., "chapters": [{"no": ..., "name": ...}]}]` is applied;
//! it is located between the first `[{` and the last `}]` of the reply.

use tracing::debug;

use crate::error::{DeskError, DeskResult};
use crate::models::{ChapterNo, SubjectData};

fn payload(reply: &str) -> Option<&str> {
    let start = reply.find("[{")?;
    let end = reply.rfind("}]")?;
    (end > start).then(|| &reply[start..end + 2])
}

/// Parses the assistant's reply into a subject list ready for saving.
pub fn parse_reply(reply: &str) -> DeskResult<Vec<SubjectData>> {
    let json = payload(reply)
        .ok_or_else(|| DeskError::Curriculum("no subject list found in the reply".to_string()))?;

    let mut subjects: Vec<SubjectData> = serde_json::from_str(json)
        .map_err(|err| DeskError::Curriculum(format!("subject list is not valid JSON: {err}")))?;
    if subjects.is_empty() {
        return Err(DeskError::Curriculum("subject list is empty".to_string()));
    }

    for subject in &mut subjects {
        subject.subject = subject.subject.trim().to_string();
        for chapter in &mut subject.chapters {
            chapter.no = ChapterNo::new(chapter.no.as_str());
            chapter.name = chapter.name.trim().to_string();
        }
    }

    debug!(subjects = subjects.len(), "parsed curriculum reply");
    Ok(subjects)
}
