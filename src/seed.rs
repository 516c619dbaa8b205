use std::collections::BTreeMap;

use crate::models::{Board, Chapter, ChapterNo, Student, StudentSubjects, SubjectData};
use crate::repo::{Collection, SubjectBook};

struct SeedStudent {
    id: &'static str,
    name: &'static str,
    grade: &'static str,
    board: Board,
    program_stage: Option<&'static str>,
    school: &'static str,
    batch: &'static str,
    time_slot: &'static str,
    phone: (&'static str, &'static str),
    is_archived: bool,
    avatar_url: Option<&'static str>,
}

const STUDENTS: [SeedStudent; 5] = [
    SeedStudent {
        id: "1",
        name: "Rohan Sharma",
        grade: "10",
        board: Board::CBSE,
        program_stage: None,
        school: "Delhi Public School",
        batch: "A",
        time_slot: "3:00–4:30",
        phone: ("personal", "9876543210"),
        is_archived: false,
        avatar_url: Some("https://i.pravatar.cc/150?u=a1"),
    },
    SeedStudent {
        id: "2",
        name: "Priya Patel",
        grade: "9",
        board: Board::ICSE,
        program_stage: None,
        school: "St. Xavier's",
        batch: "B",
        time_slot: "4:30–6:00",
        phone: ("father", "9876543211"),
        is_archived: false,
        avatar_url: Some("https://i.pravatar.cc/150?u=b2"),
    },
    SeedStudent {
        id: "3",
        name: "Amit Singh",
        grade: "11",
        board: Board::Cambridge,
        program_stage: Some("AS Level (A1)"),
        school: "Global International",
        batch: "C",
        time_slot: "6:00–8:00",
        phone: ("mother", "9876543212"),
        is_archived: false,
        avatar_url: Some("https://i.pravatar.cc/150?u=c3"),
    },
    SeedStudent {
        id: "4",
        name: "Sneha Reddy",
        grade: "12",
        board: Board::IB,
        program_stage: Some("DP"),
        school: "Oakridge International",
        batch: "A",
        time_slot: "3:00–4:30",
        phone: ("", ""),
        is_archived: true,
        avatar_url: None,
    },
    SeedStudent {
        id: "5",
        name: "Vikram Mehta",
        grade: "8",
        board: Board::GSEB,
        program_stage: None,
        school: "Gujarat Public School",
        batch: "B",
        time_slot: "4:30–6:00",
        phone: ("father", "9876543214"),
        is_archived: false,
        avatar_url: Some("https://i.pravatar.cc/150?u=d4"),
    },
];

const CURRICULA: [(&str, &str, [(&str, &str); 2]); 4] = [
    ("1", "Mathematics", [("1", "Real Numbers"), ("2", "Polynomials")]),
    ("1", "Science", [("1", "Chemical Reactions"), ("2", "Acids & Bases")]),
    ("2", "English", [("1", "Merchant of Venice"), ("2", "Grammar Practice")]),
    ("3", "Physics", [("1", "Measurements"), ("2", "Motion in 1D")]),
];

pub fn students() -> Collection<Student> {
    Collection::new(
        STUDENTS
            .iter()
            .map(|seed| {
                let (kind, number) = seed.phone;
                let phone = |wanted: &str| (kind == wanted).then(|| number.to_string());
                Student {
                    id: seed.id.to_string(),
                    name: seed.name.to_string(),
                    grade: seed.grade.to_string(),
                    board: seed.board,
                    school: seed.school.to_string(),
                    batch: seed.batch.to_string(),
                    time_slot: seed.time_slot.to_string(),
                    personal_phone: phone("personal"),
                    father_phone: phone("father"),
                    mother_phone: phone("mother"),
                    address: None,
                    is_archived: seed.is_archived,
                    avatar_url: seed.avatar_url.map(str::to_string),
                    program_stage: seed.program_stage.map(str::to_string),
                }
            })
            .collect(),
    )
}

pub fn subjects() -> SubjectBook {
    let mut by_student: BTreeMap<String, StudentSubjects> = BTreeMap::new();
    for (student_id, subject, chapters) in CURRICULA {
        by_student
            .entry(student_id.to_string())
            .or_insert_with(|| StudentSubjects {
                student_id: student_id.to_string(),
                subjects: Vec::new(),
            })
            .subjects
            .push(SubjectData {
                subject: subject.to_string(),
                chapters: chapters
                    .iter()
                    .map(|(no, name)| Chapter {
                        no: ChapterNo::new(*no),
                        name: name.to_string(),
                    })
                    .collect(),
            });
    }
    SubjectBook::new(by_student)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate;

    #[test]
    fn seed_roster_passes_validation() {
        let roster = students();
        assert_eq!(roster.len(), 5);
        for student in &roster {
            validate::student(student).unwrap();
        }
        assert_eq!(roster.get("2").unwrap().father_phone.as_deref(), Some("9876543211"));
        assert!(roster.get("4").unwrap().is_archived);
    }

    #[test]
    fn seed_curricula_cover_three_students() {
        let book = subjects();
        assert_eq!(book.subjects_for("1").len(), 2);
        assert_eq!(book.subjects_for("3")[0].subject, "Physics");
        assert!(book.subjects_for("5").is_empty());
        for entry in book.iter() {
            validate::subjects(&entry.subjects).unwrap();
        }
    }
}
