use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use tracing::{debug, info, warn};

use crate::curriculum;
use crate::error::{DeskError, DeskResult};
use crate::models::{
    batch_for_time_slot, new_id, program_stage, Board, ChapterNo, ChapterProgress,
    ChapterProgressEntry, Doubt, DoubtStatus, EntryType, Priority, Student, SubjectData, WorkHealth,
    WorkItem, WorkStatus,
};
use crate::repo::{Collection, SubjectBook};
use crate::seed;
use crate::store::{self, CollectionKey, KvStore};
use crate::sync;
use crate::validate;

/// Student directory filter; empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub archived: bool,
    pub board: Option<Board>,
    pub grade: Option<String>,
    pub batch: Option<String>,
    pub search: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &Student) -> bool {
        if student.is_archived != self.archived {
            return false;
        }
        if self.board.is_some_and(|board| board != student.board) {
            return false;
        }
        if self.grade.as_deref().is_some_and(|grade| grade != student.grade) {
            return false;
        }
        if self.batch.as_deref().is_some_and(|batch| batch != student.batch) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(query) => student.name.to_lowercase().contains(&query.to_lowercase()),
            None => true,
        }
    }
}

/// Work list filter. Only students whose archived flag matches are shown.
#[derive(Debug, Clone, Default)]
pub struct WorkFilter {
    pub archived: bool,
    pub student_id: Option<String>,
    pub search: Option<String>,
    pub batch: Option<String>,
    pub subject: Option<String>,
    pub status: Option<WorkStatus>,
    pub priority: Option<Priority>,
}

impl WorkFilter {
    pub fn matches(&self, student: &Student, item: &WorkItem) -> bool {
        student.is_archived == self.archived
            && contains_ignore_case(&student.name, self.search.as_deref())
            && self.batch.as_deref().map_or(true, |batch| batch == student.batch)
            && self.subject.as_deref().map_or(true, |subject| subject == item.subject)
            && self.status.map_or(true, |status| status == item.status)
            && self.priority.map_or(true, |priority| priority == item.priority)
    }
}

/// Doubt list filter. `open` keeps open and tasked doubts.
#[derive(Debug, Clone, Default)]
pub struct DoubtFilter {
    pub student_id: Option<String>,
    pub open: bool,
    pub status: Option<DoubtStatus>,
    pub subject: Option<String>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
}

impl DoubtFilter {
    pub fn matches(&self, doubt: &Doubt) -> bool {
        (!self.open || doubt.status != DoubtStatus::Resolved)
            && self.subject.as_deref().map_or(true, |subject| subject == doubt.subject)
            && self.priority.map_or(true, |priority| priority == doubt.priority)
            && contains_ignore_case(&doubt.text, self.search.as_deref())
    }
}

fn contains_ignore_case(haystack: &str, query: Option<&str>) -> bool {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => haystack.to_lowercase().contains(&query.to_lowercase()),
        None => true,
    }
}

fn is_finished(progress: &ChapterProgress) -> bool {
    progress.entries.iter().any(|e| e.kind == EntryType::Finish)
}

fn percentage(part: usize, whole: usize) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkHealthSummary {
    pub health: WorkHealth,
    pub pending: usize,
    pub overdue: usize,
}

impl WorkHealthSummary {
    /// Critical at two overdue or more than three pending; warning at one overdue.
    pub fn new(pending: usize, overdue: usize) -> Self {
        let health = if overdue >= 2 || pending > 3 {
            WorkHealth::Critical
        } else if overdue == 1 {
            WorkHealth::Warning
        } else {
            WorkHealth::Healthy
        };
        Self {
            health,
            pending,
            overdue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectCompletion {
    pub subject: String,
    pub completed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyllabusSummary {
    /// Finished chapters over all curriculum chapters, rounded.
    pub percentage: u32,
    pub subjects: Vec<SubjectCompletion>,
    pub last_update: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubtStats {
    pub total: usize,
    pub open: usize,
    pub tasked: usize,
    pub resolved: usize,
}

pub struct AppState {
    students: Collection<Student>,
    subjects: SubjectBook,
    chapters: Collection<ChapterProgress>,
    work_items: Collection<WorkItem>,
    doubts: Collection<Doubt>,
    today: NaiveDate,
    dirty: BTreeSet<CollectionKey>,
}

impl AppState {
    /// Empty desk, nothing to persist.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            students: Collection::default(),
            subjects: SubjectBook::default(),
            chapters: Collection::default(),
            work_items: Collection::default(),
            doubts: Collection::default(),
            today,
            dirty: BTreeSet::new(),
        }
    }

    /// Desk holding the built-in roster and curricula.
    #[cfg(test)]
    pub fn seeded(today: NaiveDate) -> Self {
        Self {
            students: seed::students(),
            subjects: seed::subjects(),
            ..Self::new(today)
        }
    }

    pub async fn load<S: KvStore>(store: &S, today: NaiveDate) -> Self {
        let state = Self {
            students: store::load_or(store, CollectionKey::Students, seed::students).await,
            subjects: store::load_or(store, CollectionKey::Subjects, seed::subjects).await,
            chapters: store::load_or(store, CollectionKey::Chapters, Collection::default).await,
            work_items: store::load_or(store, CollectionKey::Work, Collection::default).await,
            doubts: store::load_or(store, CollectionKey::Doubts, Collection::default).await,
            today,
            dirty: BTreeSet::new(),
        };
        info!(
            students = state.students.len(),
            chapters = state.chapters.len(),
            work_items = state.work_items.len(),
            doubts = state.doubts.len(),
            "desk loaded"
        );
        state
    }

    /// Writes every document changed since the last commit.
    pub async fn commit<S: KvStore>(&mut self, store: &S) -> anyhow::Result<usize> {
        let pending: Vec<CollectionKey> = self.dirty.iter().copied().collect();
        for key in &pending {
            match key {
                CollectionKey::Students => store::save(store, *key, &self.students).await?,
                CollectionKey::Subjects => store::save(store, *key, &self.subjects).await?,
                CollectionKey::Chapters => store::save(store, *key, &self.chapters).await?,
                CollectionKey::Work => store::save(store, *key, &self.work_items).await?,
                CollectionKey::Doubts => store::save(store, *key, &self.doubts).await?,
            }
            self.dirty.remove(key);
            debug!(key = key.as_str(), "document persisted");
        }
        Ok(pending.len())
    }

    /// Upserts the built-in roster and curricula and persists both documents.
    /// Returns the student count.
    pub fn apply_seed(&mut self) -> DeskResult<usize> {
        let students = seed::students();
        for student in &students {
            self.save_student(student.clone())?;
        }
        for entry in seed::subjects().iter() {
            self.save_subjects(&entry.student_id, entry.subjects.clone())?;
        }
        // A fresh store loads these same defaults, so write them regardless.
        self.dirty.extend([CollectionKey::Students, CollectionKey::Subjects]);
        Ok(students.len())
    }

    #[cfg(test)]
    pub fn is_dirty(&self, key: CollectionKey) -> bool {
        self.dirty.contains(&key)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn students(&self) -> &Collection<Student> {
        &self.students
    }

    pub fn subjects(&self) -> &SubjectBook {
        &self.subjects
    }

    pub fn chapters(&self) -> &Collection<ChapterProgress> {
        &self.chapters
    }

    pub fn work_items(&self) -> &Collection<WorkItem> {
        &self.work_items
    }

    pub fn doubts(&self) -> &Collection<Doubt> {
        &self.doubts
    }

    fn set_students(&mut self, next: Collection<Student>) {
        if next != self.students {
            self.students = next;
            self.dirty.insert(CollectionKey::Students);
        }
    }

    fn set_subjects(&mut self, next: SubjectBook) {
        if next != self.subjects {
            self.subjects = next;
            self.dirty.insert(CollectionKey::Subjects);
        }
    }

    fn set_chapters(&mut self, next: Collection<ChapterProgress>) {
        if next != self.chapters {
            self.chapters = next;
            self.dirty.insert(CollectionKey::Chapters);
        }
    }

    fn set_doubts(&mut self, next: Collection<Doubt>) {
        if next != self.doubts {
            self.doubts = next;
            self.dirty.insert(CollectionKey::Doubts);
        }
    }

    fn set_work_items(&mut self, next: Collection<WorkItem>) {
        if next != self.work_items {
            self.work_items = next;
            self.dirty.insert(CollectionKey::Work);
            self.work_items_changed();
        }
    }

    /// Resolves doubts whose linked task is now completed.
    fn work_items_changed(&mut self) {
        let updates = sync::reconcile_doubts(self.work_items.as_slice(), self.doubts.as_slice(), self.today);
        if updates.is_empty() {
            return;
        }
        let mut next = self.doubts.clone();
        for doubt in updates {
            info!(doubt = %doubt.id, "doubt resolved by completed task");
            next = next.save(doubt);
        }
        self.set_doubts(next);
    }

    fn student(&self, id: &str) -> DeskResult<&Student> {
        self.students.get(id).ok_or_else(|| DeskError::not_found("student", id))
    }

    fn doubt(&self, id: &str) -> DeskResult<&Doubt> {
        self.doubts.get(id).ok_or_else(|| DeskError::not_found("doubt", id))
    }

    // Students

    /// Inserts or replaces a student. Batch and program stage are always
    /// derived from the time slot, board and grade.
    pub fn save_student(&mut self, mut student: Student) -> DeskResult<Student> {
        student.name = student.name.trim().to_string();
        student.school = student.school.trim().to_string();
        student.time_slot = student.time_slot.trim().to_string();
        student.batch = batch_for_time_slot(&student.time_slot).unwrap_or_default().to_string();
        student.program_stage = program_stage(student.board, &student.grade);
        if student.id.is_empty() {
            student.id = new_id("s");
        }
        validate::student(&student)?;

        self.set_students(self.students.save(student.clone()));
        Ok(student)
    }

    /// Applies `edit` to a copy of a stored student and saves it.
    pub fn edit_student(&mut self, id: &str, edit: impl FnOnce(&mut Student)) -> DeskResult<Student> {
        let mut student = self.student(id)?.clone();
        edit(&mut student);
        student.id = id.to_string();
        self.save_student(student)
    }

    /// Flips the archived flag and returns the new value.
    pub fn toggle_archive(&mut self, id: &str) -> DeskResult<bool> {
        let mut student = self.student(id)?.clone();
        student.is_archived = !student.is_archived;
        let archived = student.is_archived;
        self.set_students(self.students.save(student));
        Ok(archived)
    }

    /// Deletes an archived student. Their other records are kept.
    pub fn delete_student(&mut self, id: &str) -> DeskResult<()> {
        if !self.student(id)?.is_archived {
            return Err(DeskError::StudentNotArchived(id.to_string()));
        }
        self.set_students(self.students.delete(id));
        Ok(())
    }

    pub fn filter_students(&self, filter: &StudentFilter) -> Vec<&Student> {
        self.students.iter().filter(|s| filter.matches(s)).collect()
    }

    // Subjects

    pub fn save_subjects(&mut self, student_id: &str, subjects: Vec<SubjectData>) -> DeskResult<()> {
        self.student(student_id)?;
        validate::subjects(&subjects)?;
        let subjects = subjects
            .into_iter()
            .map(|mut data| {
                data.subject = data.subject.trim().to_string();
                for chapter in &mut data.chapters {
                    chapter.name = chapter.name.trim().to_string();
                }
                data
            })
            .collect();
        self.set_subjects(self.subjects.save(student_id, subjects));
        Ok(())
    }

    /// Replaces a student's subjects with the list found in an assistant reply.
    pub fn apply_curriculum(&mut self, student_id: &str, reply: &str) -> DeskResult<usize> {
        let subjects = curriculum::parse_reply(reply)?;
        let count = subjects.len();
        self.save_subjects(student_id, subjects)?;
        info!(student = student_id, subjects = count, "curriculum applied");
        Ok(count)
    }

    // Syllabus progress

    /// Saves a progress record, keeping reading tasks in step with its
    /// `start` entries. A record left without entries is removed.
    pub fn save_chapter_progress(&mut self, mut progress: ChapterProgress) {
        progress.id = ChapterProgress::key(&progress.student_id, &progress.subject, &progress.chapter_no);
        progress.entries.sort_by_key(|entry| entry.date);

        let effect = sync::syllabus_effect(
            self.chapters.get(&progress.id),
            &progress,
            self.work_items.as_slice(),
            self.today,
        );
        if !effect.is_empty() {
            let mut next = self.work_items.clone();
            for id in &effect.removed {
                info!(work_item = %id, chapter = %progress.id, "reading task removed with start entry");
                next = next.delete(id);
            }
            if let Some(task) = effect.created {
                info!(work_item = %task.id, chapter = %progress.id, "reading task created for chapter start");
                next = next.save(task);
            }
            self.set_work_items(next);
        }

        if progress.entries.is_empty() {
            self.set_chapters(self.chapters.delete(&progress.id));
        } else {
            self.set_chapters(self.chapters.save(progress));
        }
    }

    /// Appends an entry to a chapter's progress, creating the record if needed.
    pub fn log_chapter_entry(
        &mut self,
        student_id: &str,
        subject: &str,
        chapter_no: &ChapterNo,
        kind: EntryType,
        date: NaiveDate,
        note: Option<String>,
    ) -> DeskResult<ChapterProgressEntry> {
        self.student(student_id)?;
        let chapter = self
            .subjects
            .chapter(student_id, subject, chapter_no)
            .ok_or_else(|| DeskError::not_found("chapter", format!("{subject} {chapter_no}")))?;

        let key = ChapterProgress::key(student_id, subject, chapter_no);
        let mut progress = self
            .chapters
            .get(&key)
            .cloned()
            .unwrap_or_else(|| ChapterProgress::new(student_id, subject, chapter));
        let entry = ChapterProgressEntry {
            id: new_id("e"),
            date,
            kind,
            note: note.filter(|n| !n.trim().is_empty()),
        };
        progress.entries.push(entry.clone());
        self.save_chapter_progress(progress);
        Ok(entry)
    }

    pub fn remove_chapter_entry(&mut self, progress_id: &str, entry_id: &str) -> DeskResult<()> {
        let mut progress = self
            .chapters
            .get(progress_id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("chapter progress", progress_id))?;
        let before = progress.entries.len();
        progress.entries.retain(|entry| entry.id != entry_id);
        if progress.entries.len() == before {
            return Err(DeskError::not_found("progress entry", entry_id));
        }
        self.save_chapter_progress(progress);
        Ok(())
    }

    // Work items

    pub fn save_work_item(&mut self, mut item: WorkItem) -> DeskResult<WorkItem> {
        item.title = item.title.trim().to_string();
        if item.id.is_empty() {
            item.id = new_id("w");
        }
        validate::work_item(&item, self.work_items.as_slice())?;
        self.set_work_items(self.work_items.save(item.clone()));
        Ok(item)
    }

    /// Applies `edit` to a copy of a stored work item and saves it.
    pub fn edit_work_item(&mut self, id: &str, edit: impl FnOnce(&mut WorkItem)) -> DeskResult<WorkItem> {
        let mut item = self
            .work_items
            .get(id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("work item", id))?;
        edit(&mut item);
        item.id = id.to_string();
        self.save_work_item(item)
    }

    pub fn set_work_status(&mut self, id: &str, status: WorkStatus) -> DeskResult<()> {
        let mut item = self
            .work_items
            .get(id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("work item", id))?;
        item.status = status;
        self.set_work_items(self.work_items.save(item));
        Ok(())
    }

    pub fn delete_work_item(&mut self, id: &str) -> DeskResult<()> {
        if !self.work_items.contains(id) {
            return Err(DeskError::not_found("work item", id));
        }
        self.set_work_items(self.work_items.delete(id));
        Ok(())
    }

    /// Work items by student name, newest first within a student.
    pub fn sorted_work_items(&self, student_id: Option<&str>) -> Vec<&WorkItem> {
        let names: BTreeMap<&str, &str> = self
            .students
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();
        let name_of = |item: &WorkItem| names.get(item.student_id.as_str()).copied().unwrap_or_default();

        let mut items: Vec<&WorkItem> = self
            .work_items
            .iter()
            .filter(|item| student_id.map_or(true, |id| item.student_id == id))
            .collect();
        items.sort_by(|a, b| {
            name_of(a)
                .cmp(name_of(b))
                .then_with(|| b.date_created.cmp(&a.date_created))
        });
        items
    }

    /// Sorted work items of students matching `filter`.
    pub fn filter_work_items(&self, filter: &WorkFilter) -> Vec<&WorkItem> {
        self.sorted_work_items(filter.student_id.as_deref())
            .into_iter()
            .filter(|item| {
                self.students
                    .get(&item.student_id)
                    .is_some_and(|student| filter.matches(student, item))
            })
            .collect()
    }

    /// Open and overdue work counts for one student.
    pub fn work_health(&self, student_id: &str) -> WorkHealthSummary {
        let (pending, overdue) = self
            .work_items
            .iter()
            .filter(|item| item.student_id == student_id && !item.is_completed())
            .fold((0, 0), |(pending, overdue), item| {
                (pending + 1, overdue + usize::from(item.due_date < self.today))
            });
        WorkHealthSummary::new(pending, overdue)
    }

    /// Chapters with a `finish` entry against the student's curriculum.
    pub fn syllabus_summary(&self, student_id: &str) -> SyllabusSummary {
        let progress: Vec<&ChapterProgress> = self
            .chapters
            .iter()
            .filter(|p| p.student_id == student_id)
            .collect();

        let subjects: Vec<SubjectCompletion> = self
            .subjects
            .subjects_for(student_id)
            .iter()
            .map(|data| SubjectCompletion {
                subject: data.subject.clone(),
                completed: progress
                    .iter()
                    .filter(|p| p.subject == data.subject && is_finished(p))
                    .count(),
                total: data.chapters.len(),
            })
            .collect();
        let total: usize = subjects.iter().map(|s| s.total).sum();
        let completed = progress.iter().filter(|p| is_finished(p)).count();

        SyllabusSummary {
            percentage: percentage(completed, total),
            subjects,
            last_update: progress
                .iter()
                .flat_map(|p| p.entries.iter().map(|e| e.date))
                .max(),
        }
    }

    // Doubts

    /// Inserts or replaces a doubt as edited by hand. Any status is accepted;
    /// a status that disagrees with the linked tasks is only reported.
    pub fn save_doubt(&mut self, mut doubt: Doubt) -> DeskResult<Doubt> {
        validate::doubt(&doubt)?;
        if doubt.id.is_empty() {
            doubt.id = new_id("d");
        }
        if let Some(problem) = sync::link_inconsistency(&doubt, self.work_items.as_slice()) {
            warn!(doubt = %doubt.id, status = %doubt.status, "{problem}");
        }
        self.set_doubts(self.doubts.save(doubt.clone()));
        Ok(doubt)
    }

    /// Applies `edit` to a copy of a stored doubt and saves it.
    pub fn edit_doubt(&mut self, id: &str, edit: impl FnOnce(&mut Doubt)) -> DeskResult<Doubt> {
        let mut doubt = self.doubt(id)?.clone();
        edit(&mut doubt);
        doubt.id = id.to_string();
        self.save_doubt(doubt)
    }

    /// Creates the doubt's task and marks the doubt tasked.
    pub fn convert_doubt_to_task(&mut self, doubt_id: &str) -> DeskResult<WorkItem> {
        let doubt = self.doubt(doubt_id)?.clone();
        let task = sync::task_for_doubt(&doubt, self.work_items.as_slice(), self.today)?;
        self.set_work_items(self.work_items.save(task.clone()));
        self.set_doubts(self.doubts.save(Doubt {
            status: DoubtStatus::Tasked,
            ..doubt
        }));
        info!(doubt = doubt_id, work_item = %task.id, "doubt converted to task");
        Ok(task)
    }

    /// Resolves a doubt and completes its live doubt task, if any.
    pub fn resolve_doubt(&mut self, doubt_id: &str) -> DeskResult<()> {
        let doubt = self.doubt(doubt_id)?.clone();
        let completions = sync::completions_for_resolved_doubt(doubt_id, self.work_items.as_slice());
        if !completions.is_empty() {
            let mut next = self.work_items.clone();
            for item in completions {
                next = next.save(item);
            }
            self.set_work_items(next);
        }
        if self.doubt(doubt_id)?.status != DoubtStatus::Resolved {
            self.set_doubts(self.doubts.save(sync::resolved(&doubt, self.today)));
        }
        Ok(())
    }

    /// Undoes a resolution.
    pub fn reopen_doubt(&mut self, doubt_id: &str) -> DeskResult<()> {
        let doubt = self.doubt(doubt_id)?;
        if doubt.status != DoubtStatus::Resolved {
            return Err(DeskError::InvalidTransition {
                id: doubt_id.to_string(),
                from: doubt.status.as_str(),
                to: DoubtStatus::Open.as_str(),
            });
        }
        let reopened = sync::reopened(doubt);
        self.set_doubts(self.doubts.save(reopened));
        Ok(())
    }

    /// Deletes a doubt together with the tasks that only tracked it.
    pub fn delete_doubt(&mut self, doubt_id: &str) -> DeskResult<()> {
        self.doubt(doubt_id)?;
        let cascade = sync::cascade_for_deleted_doubt(doubt_id, self.work_items.as_slice());
        if !cascade.is_empty() {
            let next = self.work_items.retain(|item| !cascade.contains(&item.id));
            self.set_work_items(next);
        }
        self.set_doubts(self.doubts.delete(doubt_id));
        Ok(())
    }

    /// Doubts newest first, optionally for one student or status.
    pub fn list_doubts(&self, student_id: Option<&str>, status: Option<DoubtStatus>) -> Vec<&Doubt> {
        let mut doubts: Vec<&Doubt> = self
            .doubts
            .iter()
            .filter(|d| student_id.map_or(true, |id| d.student_id == id))
            .filter(|d| status.map_or(true, |s| d.status == s))
            .collect();
        doubts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        doubts
    }

    pub fn filter_doubts(&self, filter: &DoubtFilter) -> Vec<&Doubt> {
        self.list_doubts(filter.student_id.as_deref(), filter.status)
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect()
    }

    pub fn doubt_stats(&self, student_id: Option<&str>) -> DoubtStats {
        self.list_doubts(student_id, None)
            .into_iter()
            .fold(DoubtStats::default(), |mut stats, doubt| {
                stats.total += 1;
                match doubt.status {
                    DoubtStatus::Open => stats.open += 1,
                    DoubtStatus::Tasked => stats.tasked += 1,
                    DoubtStatus::Resolved => stats.resolved += 1,
                }
                stats
            })
    }

    /// Doubts logged per day over the last `days` days, oldest first.
    pub fn doubt_activity(&self, days: u32) -> Vec<(NaiveDate, usize)> {
        (0..i64::from(days))
            .rev()
            .map(|back| {
                let day = self.today - Duration::days(back);
                let count = self.doubts.iter().filter(|d| d.created_at == day).count();
                (day, count)
            })
            .collect()
    }
}
