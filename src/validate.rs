use std::collections::HashSet;

use crate::error::{DeskError, DeskResult, FieldError};
use crate::models::{Doubt, Student, SubjectData, WorkItem, TIME_SLOTS};

fn finish(errors: Vec<FieldError>) -> DeskResult<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(DeskError::Validation(errors))
    }
}

fn is_phone_number(value: &str) -> bool {
    value.len() == 10 && value.chars().all(|c| c.is_ascii_digit())
}

pub fn student(student: &Student) -> DeskResult<()> {
    let mut errors = Vec::new();

    if student.name.trim().is_empty() {
        errors.push(FieldError::new("name", "Full Name is required"));
    }
    if student.school.trim().is_empty() {
        errors.push(FieldError::new("school", "School is required"));
    }
    match student.grade.trim().parse::<u32>() {
        Ok(1..=12) => {}
        _ if student.grade.trim().is_empty() => {
            errors.push(FieldError::new("grade", "Grade is required"));
        }
        _ => errors.push(FieldError::new("grade", "Grade must be between 1 and 12")),
    }
    if student.time_slot.trim().is_empty() {
        errors.push(FieldError::new("timeSlot", "Time Slot is required"));
    } else if !TIME_SLOTS.contains(&student.time_slot.trim()) {
        errors.push(FieldError::new(
            "timeSlot",
            format!("Time Slot must be one of {}", TIME_SLOTS.join(", ")),
        ));
    }
    for (field, phone) in student.phones() {
        if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
            if !is_phone_number(phone) {
                errors.push(FieldError::new(field, "Must be a 10-digit number"));
            }
        }
    }

    finish(errors)
}

/// Subject names unique per student; chapter numbers and names unique per
/// subject. Names compare trimmed and case-insensitively.
pub fn subjects(subjects: &[SubjectData]) -> DeskResult<()> {
    let mut errors = Vec::new();
    let mut seen_subjects = HashSet::new();

    for (s_idx, subject) in subjects.iter().enumerate() {
        let subject_name = subject.subject.trim().to_lowercase();
        if subject_name.is_empty() {
            errors.push(FieldError::new(
                format!("subjects[{s_idx}].subject"),
                "Subject name cannot be empty.",
            ));
        } else if !seen_subjects.insert(subject_name) {
            errors.push(FieldError::new(
                format!("subjects[{s_idx}].subject"),
                "Subject name must be unique.",
            ));
        }

        let mut seen_nos = HashSet::new();
        let mut seen_names = HashSet::new();
        for (c_idx, chapter) in subject.chapters.iter().enumerate() {
            let field = |name: &str| format!("subjects[{s_idx}].chapters[{c_idx}].{name}");

            if chapter.no.is_empty() {
                errors.push(FieldError::new(field("no"), "No. is required."));
            } else if !seen_nos.insert(chapter.no.as_str()) {
                errors.push(FieldError::new(field("no"), "No. must be unique."));
            }

            let chapter_name = chapter.name.trim().to_lowercase();
            if chapter_name.is_empty() {
                errors.push(FieldError::new(field("name"), "Name is required."));
            } else if !seen_names.insert(chapter_name) {
                errors.push(FieldError::new(field("name"), "Name must be unique."));
            }
        }
    }

    finish(errors)
}

/// Required fields, then the duplicate-task guard against `existing`.
///
/// A duplicate is another unfinished task of the same student with the same
/// subject, chapter, title and description.
pub fn work_item(item: &WorkItem, existing: &[WorkItem]) -> DeskResult<()> {
    let mut errors = Vec::new();

    if item.title.trim().is_empty() {
        errors.push(FieldError::new("title", "Title is required"));
    }
    if item.subject.trim().is_empty() {
        errors.push(FieldError::new("subject", "Subject is required"));
    }
    if item.chapter_no.is_empty() {
        errors.push(FieldError::new("chapter", "Chapter is required"));
    }
    if item.description.trim().is_empty() {
        errors.push(FieldError::new("description", "Description is required"));
    }
    finish(errors)?;

    let title = item.title.trim().to_lowercase();
    let description = item.description.trim().to_lowercase();
    let duplicate = existing.iter().any(|other| {
        other.id != item.id
            && other.student_id == item.student_id
            && !other.is_completed()
            && other.subject == item.subject
            && other.chapter_no == item.chapter_no
            && other.title.trim().to_lowercase() == title
            && other.description.trim().to_lowercase() == description
    });
    if duplicate {
        return Err(DeskError::DuplicateTask(
            "a similar task already exists for this student".to_string(),
        ));
    }

    Ok(())
}

pub fn doubt(doubt: &Doubt) -> DeskResult<()> {
    let mut errors = Vec::new();

    if doubt.subject.trim().is_empty() {
        errors.push(FieldError::new("subject", "Subject is required"));
    }
    if doubt.text.trim().is_empty() {
        errors.push(FieldError::new("text", "Doubt text is required"));
    }

    finish(errors)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{Board, Chapter, ChapterNo, Priority, WorkStatus};

    fn rohan() -> Student {
        Student {
            id: "1".to_string(),
            name: "Rohan Sharma".to_string(),
            grade: "10".to_string(),
            board: Board::CBSE,
            school: "Delhi Public School".to_string(),
            batch: "A".to_string(),
            time_slot: "3:00–4:30".to_string(),
            personal_phone: Some("9876543210".to_string()),
            father_phone: None,
            mother_phone: None,
            address: None,
            is_archived: false,
            avatar_url: None,
            program_stage: None,
        }
    }

    fn task(id: &str, title: &str) -> WorkItem {
        let day = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        WorkItem {
            id: id.to_string(),
            student_id: "1".to_string(),
            title: title.to_string(),
            subject: "Mathematics".to_string(),
            chapter_no: ChapterNo::new("2"),
            chapter_name: "Polynomials".to_string(),
            topic: None,
            description: "Exercise 2.1".to_string(),
            due_date: day,
            status: WorkStatus::Assign,
            priority: Priority::Medium,
            links: Vec::new(),
            files: Vec::new(),
            mentor_note: None,
            date_created: day,
            linked_doubt_id: None,
            source: None,
        }
    }

    fn fields(err: DeskError) -> Vec<String> {
        err.fields().iter().map(|f| f.field.clone()).collect()
    }

    #[test]
    fn accepts_complete_student() {
        assert!(student(&rohan()).is_ok());
    }

    #[test]
    fn flags_missing_fields_and_bad_phones() {
        let mut broken = rohan();
        broken.name = "  ".to_string();
        broken.grade = "13".to_string();
        broken.father_phone = Some("98765".to_string());
        broken.mother_phone = Some(String::new());

        let err = student(&broken).unwrap_err();
        assert_eq!(fields(err), ["name", "grade", "fatherPhone"]);
    }

    #[test]
    fn subject_names_and_chapters_must_be_unique() {
        let chapter = |no: &str, name: &str| Chapter {
            no: ChapterNo::new(no),
            name: name.to_string(),
        };
        let list = vec![
            SubjectData {
                subject: "Science".to_string(),
                chapters: vec![chapter("1", "Light"), chapter("1", "light "), chapter("", "Sound")],
            },
            SubjectData {
                subject: " science".to_string(),
                chapters: vec![],
            },
        ];

        let err = subjects(&list).unwrap_err();
        assert_eq!(
            fields(err),
            [
                "subjects[0].chapters[1].no",
                "subjects[0].chapters[1].name",
                "subjects[0].chapters[2].no",
                "subjects[1].subject",
            ]
        );
    }

    #[test]
    fn duplicate_task_ignores_case_and_completed_items() {
        let existing = task("w1", "Practice zeroes");
        let candidate = task("w2", "  practice ZEROES ");
        assert!(matches!(
            work_item(&candidate, &[existing.clone()]),
            Err(DeskError::DuplicateTask(_))
        ));

        let mut finished = existing.clone();
        finished.status = WorkStatus::Completed;
        assert!(work_item(&candidate, &[finished]).is_ok());

        assert!(work_item(&existing, &[existing.clone()]).is_ok());
    }

    #[test]
    fn work_item_requires_chapter_and_description() {
        let mut item = task("w1", "Practice");
        item.chapter_no = ChapterNo::default();
        item.description = String::new();
        let err = work_item(&item, &[]).unwrap_err();
        assert_eq!(fields(err), ["chapter", "description"]);
    }
}
