//! Cross-collection synchronization rules.
//!
//! Each rule is a pure function from the current collections to the records
//! that must change. [`crate::state::AppState`] applies the results; nothing
//! here touches storage.
//!
//! - syllabus start logged   -> reading task created
//! - syllabus start removed  -> reading task deleted
//! - linked task completed   -> doubt resolved
//! - doubt converted         -> doubt task created, doubt tasked
//! - doubt resolved by hand  -> doubt task completed
//! - doubt deleted           -> doubt task deleted

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};

use crate::error::{DeskError, DeskResult};
use crate::models::{
    new_id, ChapterNo, ChapterProgress, ChapterProgressEntry, Doubt, DoubtStatus, EntryType,
    Priority, WorkItem, WorkSource, WorkStatus,
};

pub const SYLLABUS_TASK_DESCRIPTION: &str =
    "Begin reading and making notes as the chapter has started in school.";
const SYLLABUS_TASK_DUE_DAYS: i64 = 7;
const DOUBT_TASK_DUE_DAYS: i64 = 3;

/// Identifies which syllabus event or doubt generated a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProvenanceKey {
    Syllabus {
        student_id: String,
        subject: String,
        chapter_no: ChapterNo,
    },
    Doubt {
        doubt_id: String,
    },
}

impl ProvenanceKey {
    pub fn for_chapter(progress: &ChapterProgress) -> Self {
        ProvenanceKey::Syllabus {
            student_id: progress.student_id.clone(),
            subject: progress.subject.clone(),
            chapter_no: progress.chapter_no.clone(),
        }
    }

    pub fn for_doubt(doubt_id: &str) -> Self {
        ProvenanceKey::Doubt {
            doubt_id: doubt_id.to_string(),
        }
    }

    /// Key of a generated item; manual items have none.
    pub fn of(item: &WorkItem) -> Option<Self> {
        match item.source? {
            WorkSource::Syllabus => Some(ProvenanceKey::Syllabus {
                student_id: item.student_id.clone(),
                subject: item.subject.clone(),
                chapter_no: item.chapter_no.clone(),
            }),
            WorkSource::Doubt => item
                .linked_doubt_id
                .as_deref()
                .map(ProvenanceKey::for_doubt),
        }
    }

    pub fn matches(&self, item: &WorkItem) -> bool {
        ProvenanceKey::of(item).as_ref() == Some(self)
    }
}

pub fn syllabus_task_title(chapter_name: &str) -> String {
    format!("Start reading & note making for {chapter_name}")
}

pub fn doubt_task_title(doubt: &Doubt) -> String {
    let about = doubt
        .chapter_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&doubt.subject);
    format!("Resolve Doubt: {about}")
}

/// Work-item changes implied by saving a chapter progress record.
#[derive(Debug, Default, PartialEq)]
pub struct SyllabusEffect {
    /// Ids of reading tasks to delete.
    pub removed: Vec<String>,
    pub created: Option<WorkItem>,
}

impl SyllabusEffect {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.created.is_none()
    }
}

/// Compares the entry ids of `old` and `new`.
///
/// A removed `start` entry deletes every reading task for the chapter. An
/// added `start` entry creates one unless a reading task for the chapter
/// survives the removal step.
pub fn syllabus_effect(
    old: Option<&ChapterProgress>,
    new: &ChapterProgress,
    work_items: &[WorkItem],
    today: NaiveDate,
) -> SyllabusEffect {
    let old_entries: &[ChapterProgressEntry] = old.map(|p| p.entries.as_slice()).unwrap_or_default();
    let old_ids: HashSet<&str> = old_entries.iter().map(|e| e.id.as_str()).collect();
    let new_ids: HashSet<&str> = new.entries.iter().map(|e| e.id.as_str()).collect();

    let start_removed = old_entries
        .iter()
        .any(|e| e.kind == EntryType::Start && !new_ids.contains(e.id.as_str()));
    let start_added = new
        .entries
        .iter()
        .find(|e| e.kind == EntryType::Start && !old_ids.contains(e.id.as_str()));

    let key = ProvenanceKey::for_chapter(new);
    let mut effect = SyllabusEffect::default();

    if start_removed {
        effect.removed = work_items
            .iter()
            .filter(|item| key.matches(item))
            .map(|item| item.id.clone())
            .collect();
    }

    if let Some(start) = start_added {
        let already_tasked = work_items
            .iter()
            .any(|item| key.matches(item) && !effect.removed.contains(&item.id));
        if !already_tasked {
            effect.created = Some(reading_task(new, start, today));
        }
    }

    effect
}

fn reading_task(progress: &ChapterProgress, start: &ChapterProgressEntry, today: NaiveDate) -> WorkItem {
    WorkItem {
        id: new_id("w"),
        student_id: progress.student_id.clone(),
        title: syllabus_task_title(&progress.chapter_name),
        subject: progress.subject.clone(),
        chapter_no: progress.chapter_no.clone(),
        chapter_name: progress.chapter_name.clone(),
        topic: None,
        description: SYLLABUS_TASK_DESCRIPTION.to_string(),
        due_date: start.date + Duration::days(SYLLABUS_TASK_DUE_DAYS),
        status: WorkStatus::Assign,
        priority: Priority::Low,
        links: Vec::new(),
        files: Vec::new(),
        mentor_note: None,
        date_created: today,
        linked_doubt_id: None,
        source: Some(WorkSource::Syllabus),
    }
}

/// Doubts that must become resolved because a linked task is completed.
///
/// Returns only doubts whose status actually changes.
pub fn reconcile_doubts(work_items: &[WorkItem], doubts: &[Doubt], today: NaiveDate) -> Vec<Doubt> {
    let completed: HashSet<&str> = work_items
        .iter()
        .filter(|item| item.is_completed())
        .filter_map(|item| item.linked_doubt_id.as_deref())
        .collect();

    doubts
        .iter()
        .filter(|doubt| doubt.status != DoubtStatus::Resolved && completed.contains(doubt.id.as_str()))
        .map(|doubt| resolved(doubt, today))
        .collect()
}

/// Builds the task for a doubt, refusing if any task already links to it.
pub fn task_for_doubt(doubt: &Doubt, work_items: &[WorkItem], today: NaiveDate) -> DeskResult<WorkItem> {
    if work_items
        .iter()
        .any(|item| item.linked_doubt_id.as_deref() == Some(doubt.id.as_str()))
    {
        return Err(DeskError::DuplicateTask(format!(
            "doubt '{}' has already been converted to a work task",
            doubt.id
        )));
    }

    Ok(WorkItem {
        id: new_id("w"),
        student_id: doubt.student_id.clone(),
        title: doubt_task_title(doubt),
        subject: doubt.subject.clone(),
        chapter_no: doubt.chapter_no.clone().unwrap_or_default(),
        chapter_name: doubt.chapter_name.clone().unwrap_or_default(),
        topic: None,
        description: doubt.text.clone(),
        due_date: today + Duration::days(DOUBT_TASK_DUE_DAYS),
        status: WorkStatus::Assign,
        priority: doubt.priority,
        links: Vec::new(),
        files: Vec::new(),
        mentor_note: None,
        date_created: today,
        linked_doubt_id: Some(doubt.id.clone()),
        source: Some(WorkSource::Doubt),
    })
}

/// Doubt tasks to mark completed when their doubt is resolved by hand.
pub fn completions_for_resolved_doubt(doubt_id: &str, work_items: &[WorkItem]) -> Vec<WorkItem> {
    let key = ProvenanceKey::for_doubt(doubt_id);
    work_items
        .iter()
        .filter(|item| key.matches(item) && !item.is_completed())
        .map(|item| WorkItem {
            status: WorkStatus::Completed,
            ..item.clone()
        })
        .collect()
}

/// Ids of the doubt tasks that go away with the doubt.
pub fn cascade_for_deleted_doubt(doubt_id: &str, work_items: &[WorkItem]) -> Vec<String> {
    let key = ProvenanceKey::for_doubt(doubt_id);
    work_items
        .iter()
        .filter(|item| key.matches(item))
        .map(|item| item.id.clone())
        .collect()
}

pub fn resolved(doubt: &Doubt, today: NaiveDate) -> Doubt {
    Doubt {
        status: DoubtStatus::Resolved,
        resolved_at: Some(today),
        ..doubt.clone()
    }
}

pub fn reopened(doubt: &Doubt) -> Doubt {
    Doubt {
        status: DoubtStatus::Open,
        resolved_at: None,
        ..doubt.clone()
    }
}

/// Describes how a doubt's status disagrees with its linked tasks, if it does.
///
/// Manual edits can leave these out of step; callers only report it.
pub fn link_inconsistency(doubt: &Doubt, work_items: &[WorkItem]) -> Option<&'static str> {
    let linked: Vec<&WorkItem> = work_items
        .iter()
        .filter(|item| item.linked_doubt_id.as_deref() == Some(doubt.id.as_str()))
        .collect();
    match doubt.status {
        DoubtStatus::Tasked if linked.is_empty() => Some("doubt is tasked but no work item links to it"),
        DoubtStatus::Open if linked.iter().any(|item| !item.is_completed()) => {
            Some("doubt is open while a linked work item is still live")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DoubtOrigin;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entry(id: &str, kind: EntryType, on: NaiveDate) -> ChapterProgressEntry {
        ChapterProgressEntry {
            id: id.to_string(),
            date: on,
            kind,
            note: None,
        }
    }

    fn polynomials(entries: Vec<ChapterProgressEntry>) -> ChapterProgress {
        ChapterProgress {
            id: "s1-Mathematics-2".to_string(),
            student_id: "s1".to_string(),
            subject: "Mathematics".to_string(),
            chapter_no: ChapterNo::new("2"),
            chapter_name: "Polynomials".to_string(),
            entries,
        }
    }

    fn doubt(id: &str, status: DoubtStatus) -> Doubt {
        Doubt {
            id: id.to_string(),
            student_id: "s1".to_string(),
            subject: "Mathematics".to_string(),
            chapter_no: Some(ChapterNo::new("2")),
            chapter_name: Some("Polynomials".to_string()),
            test_id: None,
            text: "Why does a quadratic have at most two zeroes?".to_string(),
            priority: Priority::High,
            origin: DoubtOrigin::DuringReading,
            created_at: date(2024, 1, 2),
            status,
            resolved_at: None,
            attachment: None,
            voice_note: None,
        }
    }

    #[test]
    fn first_start_entry_creates_reading_task() {
        let today = date(2024, 1, 1);
        let new = polynomials(vec![entry("e1", EntryType::Start, date(2024, 1, 1))]);

        let effect = syllabus_effect(None, &new, &[], today);
        assert!(effect.removed.is_empty());
        let task = effect.created.expect("reading task");
        assert_eq!(task.title, "Start reading & note making for Polynomials");
        assert_eq!(task.due_date, date(2024, 1, 8));
        assert_eq!(task.status, WorkStatus::Assign);
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.source, Some(WorkSource::Syllabus));
        assert_eq!(task.description, SYLLABUS_TASK_DESCRIPTION);
        assert_eq!(task.date_created, today);
    }

    #[test]
    fn existing_reading_task_blocks_a_second_one() {
        let today = date(2024, 1, 1);
        let new = polynomials(vec![entry("e1", EntryType::Start, date(2024, 1, 1))]);
        let first = syllabus_effect(None, &new, &[], today).created.unwrap();

        let again = syllabus_effect(None, &new, &[first], today);
        assert!(again.is_empty());
    }

    #[test]
    fn milestone_entries_do_not_create_tasks() {
        let new = polynomials(vec![entry("e1", EntryType::Milestone, date(2024, 1, 3))]);
        assert!(syllabus_effect(None, &new, &[], date(2024, 1, 3)).is_empty());
    }

    #[test]
    fn removing_start_deletes_task_even_after_title_edit() {
        let today = date(2024, 1, 1);
        let old = polynomials(vec![entry("e1", EntryType::Start, date(2024, 1, 1))]);
        let mut task = syllabus_effect(None, &old, &[], today).created.unwrap();
        task.title = "Read chapter 2 carefully".to_string();
        task.status = WorkStatus::Pending;

        let effect = syllabus_effect(Some(&old), &polynomials(vec![]), &[task.clone()], today);
        assert_eq!(effect.removed, vec![task.id]);
        assert!(effect.created.is_none());
    }

    #[test]
    fn replacing_start_entry_recreates_task_with_new_due_date() {
        let today = date(2024, 1, 10);
        let old = polynomials(vec![entry("e1", EntryType::Start, date(2024, 1, 1))]);
        let task = syllabus_effect(None, &old, &[], today).created.unwrap();
        let new = polynomials(vec![entry("e2", EntryType::Start, date(2024, 1, 10))]);

        let effect = syllabus_effect(Some(&old), &new, &[task.clone()], today);
        assert_eq!(effect.removed, vec![task.id]);
        assert_eq!(effect.created.unwrap().due_date, date(2024, 1, 17));
    }

    #[test]
    fn manual_task_with_same_chapter_is_not_provenance_matched() {
        let today = date(2024, 1, 1);
        let progress = polynomials(vec![entry("e1", EntryType::Start, today)]);
        let mut manual = syllabus_effect(None, &progress, &[], today).created.unwrap();
        manual.source = None;

        let effect = syllabus_effect(None, &progress, &[manual], today);
        assert!(effect.created.is_some());
    }

    #[test]
    fn completed_linked_task_resolves_doubt() {
        let today = date(2024, 1, 5);
        let tasked = doubt("d1", DoubtStatus::Tasked);
        let untouched = doubt("d2", DoubtStatus::Open);
        let pending = doubt("d3", DoubtStatus::Tasked);

        let mut done = task_for_doubt(&tasked, &[], today).unwrap();
        done.status = WorkStatus::Completed;
        let open_task = task_for_doubt(&pending, &[], today).unwrap();

        let updates = reconcile_doubts(&[done, open_task], &[tasked, untouched, pending], today);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].id, "d1");
        assert_eq!(updates[0].status, DoubtStatus::Resolved);
        assert_eq!(updates[0].resolved_at, Some(today));
    }

    #[test]
    fn already_resolved_doubts_are_not_rewritten() {
        let today = date(2024, 1, 5);
        let resolved_doubt = resolved(&doubt("d1", DoubtStatus::Tasked), date(2024, 1, 3));
        let mut done = task_for_doubt(&doubt("d1", DoubtStatus::Open), &[], today).unwrap();
        done.status = WorkStatus::Completed;

        assert!(reconcile_doubts(&[done], &[resolved_doubt], today).is_empty());
    }

    #[test]
    fn doubt_task_copies_doubt_fields() {
        let today = date(2024, 1, 5);
        let task = task_for_doubt(&doubt("d1", DoubtStatus::Open), &[], today).unwrap();
        assert_eq!(task.title, "Resolve Doubt: Polynomials");
        assert_eq!(task.due_date, date(2024, 1, 8));
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.linked_doubt_id.as_deref(), Some("d1"));
        assert_eq!(task.source, Some(WorkSource::Doubt));
        assert_eq!(task.description, "Why does a quadratic have at most two zeroes?");
    }

    #[test]
    fn doubt_without_chapter_titles_task_by_subject() {
        let mut loose = doubt("d1", DoubtStatus::Open);
        loose.chapter_name = None;
        loose.chapter_no = None;
        let task = task_for_doubt(&loose, &[], date(2024, 1, 5)).unwrap();
        assert_eq!(task.title, "Resolve Doubt: Mathematics");
        assert!(task.chapter_no.is_empty());
    }

    #[test]
    fn second_conversion_is_rejected() {
        let today = date(2024, 1, 5);
        let open = doubt("d1", DoubtStatus::Open);
        let task = task_for_doubt(&open, &[], today).unwrap();

        let err = task_for_doubt(&open, &[task], today).unwrap_err();
        assert!(matches!(err, DeskError::DuplicateTask(_)));
    }

    #[test]
    fn manual_resolution_completes_only_live_doubt_tasks() {
        let today = date(2024, 1, 5);
        let task = task_for_doubt(&doubt("d1", DoubtStatus::Open), &[], today).unwrap();
        let other = task_for_doubt(&doubt("d2", DoubtStatus::Open), &[], today).unwrap();

        let completions = completions_for_resolved_doubt("d1", &[task.clone(), other]);
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].id, task.id);
        assert!(completions[0].is_completed());

        let finished = completions[0].clone();
        assert!(completions_for_resolved_doubt("d1", &[finished]).is_empty());
    }

    #[test]
    fn deleting_doubt_cascades_to_doubt_sourced_tasks_only() {
        let today = date(2024, 1, 5);
        let task = task_for_doubt(&doubt("d1", DoubtStatus::Open), &[], today).unwrap();
        let mut manual = task.clone();
        manual.id = "w_manual".to_string();
        manual.source = None;

        let removed = cascade_for_deleted_doubt("d1", &[task.clone(), manual]);
        assert_eq!(removed, vec![task.id]);
        assert!(cascade_for_deleted_doubt("d9", &[]).is_empty());
    }

    #[test]
    fn reopening_clears_resolution_date() {
        let done = resolved(&doubt("d1", DoubtStatus::Tasked), date(2024, 1, 5));
        let open = reopened(&done);
        assert_eq!(open.status, DoubtStatus::Open);
        assert!(open.resolved_at.is_none());
    }

    #[test]
    fn reports_tasked_doubt_without_task() {
        let tasked = doubt("d1", DoubtStatus::Tasked);
        assert!(link_inconsistency(&tasked, &[]).is_some());

        let task = task_for_doubt(&doubt("d1", DoubtStatus::Open), &[], date(2024, 1, 5)).unwrap();
        assert!(link_inconsistency(&tasked, &[task.clone()]).is_none());
        assert!(link_inconsistency(&doubt("d1", DoubtStatus::Open), &[task]).is_some());
    }
}
