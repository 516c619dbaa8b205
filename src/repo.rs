use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Chapter, ChapterNo, ChapterProgress, Doubt, Student, StudentSubjects, SubjectData, WorkItem};

pub trait Keyed {
    fn key(&self) -> &str;
}

impl Keyed for Student {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for ChapterProgress {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for WorkItem {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Keyed for Doubt {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Ordered list of records addressed by id. Writes return a new collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    items: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: Keyed + Clone> Collection<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Inserts `item` at the end if its id is unseen, otherwise replaces the
    /// existing record in place.
    #[must_use]
    pub fn save(&self, item: T) -> Self {
        let mut items = self.items.clone();
        match items.iter().position(|existing| existing.key() == item.key()) {
            Some(index) => items[index] = item,
            None => items.push(item),
        }
        Self { items }
    }

    #[must_use]
    pub fn delete(&self, id: &str) -> Self {
        self.retain(|item| item.key() != id)
    }

    #[must_use]
    pub fn retain(&self, keep: impl Fn(&T) -> bool) -> Self {
        Self {
            items: self.items.iter().filter(|item| keep(item)).cloned().collect(),
        }
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Curriculum per student, persisted as an object keyed by student id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectBook {
    by_student: BTreeMap<String, StudentSubjects>,
}

impl SubjectBook {
    pub fn new(by_student: BTreeMap<String, StudentSubjects>) -> Self {
        Self { by_student }
    }

    pub fn subjects_for(&self, student_id: &str) -> &[SubjectData] {
        self.by_student
            .get(student_id)
            .map(|entry| entry.subjects.as_slice())
            .unwrap_or_default()
    }

    pub fn chapter(&self, student_id: &str, subject: &str, no: &ChapterNo) -> Option<&Chapter> {
        self.subjects_for(student_id)
            .iter()
            .find(|data| data.subject == subject)
            .and_then(|data| data.chapters.iter().find(|chapter| &chapter.no == no))
    }

    #[must_use]
    pub fn save(&self, student_id: &str, subjects: Vec<SubjectData>) -> Self {
        let mut by_student = self.by_student.clone();
        by_student.insert(
            student_id.to_string(),
            StudentSubjects {
                student_id: student_id.to_string(),
                subjects,
            },
        );
        Self { by_student }
    }

    pub fn iter(&self) -> impl Iterator<Item = &StudentSubjects> {
        self.by_student.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Board;

    fn student(id: &str, name: &str) -> Student {
        Student {
            id: id.to_string(),
            name: name.to_string(),
            grade: "10".to_string(),
            board: Board::CBSE,
            school: "Delhi Public School".to_string(),
            batch: "A".to_string(),
            time_slot: "3:00–4:30".to_string(),
            personal_phone: None,
            father_phone: None,
            mother_phone: None,
            address: None,
            is_archived: false,
            avatar_url: None,
            program_stage: None,
        }
    }

    #[test]
    fn save_replaces_in_place_and_appends_new() {
        let students = Collection::new(vec![student("1", "Rohan"), student("2", "Priya")]);

        let renamed = students.save(student("1", "Rohan Sharma"));
        assert_eq!(renamed.len(), 2);
        assert_eq!(renamed.as_slice()[0].name, "Rohan Sharma");
        assert_eq!(students.as_slice()[0].name, "Rohan");

        let grown = renamed.save(student("3", "Amit"));
        let ids: Vec<&str> = grown.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn delete_removes_only_matching_id() {
        let students = Collection::new(vec![student("1", "Rohan"), student("2", "Priya")]);
        let remaining = students.delete("1");
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains("2"));
        assert_eq!(remaining.delete("missing"), remaining);
    }

    #[test]
    fn subject_book_serializes_as_object_keyed_by_student() {
        let book = SubjectBook::default().save(
            "1",
            vec![SubjectData {
                subject: "Mathematics".to_string(),
                chapters: vec![Chapter {
                    no: ChapterNo::new("2"),
                    name: "Polynomials".to_string(),
                }],
            }],
        );
        let json = serde_json::to_value(&book).unwrap();
        assert_eq!(json["1"]["studentId"], "1");
        assert_eq!(json["1"]["subjects"][0]["chapters"][0]["no"], "2");

        let chapter = book.chapter("1", "Mathematics", &ChapterNo::new("2")).unwrap();
        assert_eq!(chapter.name, "Polynomials");
        assert!(book.chapter("1", "Science", &ChapterNo::new("2")).is_none());
    }
}
