use std::fmt::Write;

use crate::models::{ChapterProgress, Student, WorkItem};
use crate::state::AppState;

const ACTIVITY_DAYS: u32 = 30;

pub fn overdue_work(state: &AppState) -> Vec<&WorkItem> {
    let today = state.today();
    let mut items: Vec<&WorkItem> = state
        .work_items()
        .iter()
        .filter(|item| item.is_overdue(today))
        .collect();
    items.sort_by(|a, b| a.due_date.cmp(&b.due_date));
    items
}

pub fn build_report(state: &AppState, student_id: Option<&str>) -> String {
    let stats = state.doubt_stats(student_id);
    let activity = state.doubt_activity(ACTIVITY_DAYS);
    let student_label = student_id
        .and_then(|id| state.students().get(id))
        .map(|s| s.name.as_str())
        .unwrap_or("all students");

    let mut output = String::new();

    let _ = writeln!(output, "# Tutor Desk Report");
    let _ = writeln!(output, "Generated for {} on {}", student_label, state.today());
    let _ = writeln!(output);
    let _ = writeln!(output, "## Doubts");

    if stats.total == 0 {
        let _ = writeln!(output, "No doubts logged.");
    } else {
        let _ = writeln!(
            output,
            "- {} total: {} open, {} tasked, {} resolved",
            stats.total, stats.open, stats.tasked, stats.resolved
        );
    }

    let logged: usize = activity.iter().map(|(_, count)| count).sum();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Doubt Activity (last {ACTIVITY_DAYS} days)");

    if logged == 0 {
        let _ = writeln!(output, "No doubts logged in this window.");
    } else {
        for (day, count) in activity.iter().filter(|(_, count)| *count > 0) {
            let _ = writeln!(output, "- {day}: {count}");
        }
    }

    let overdue: Vec<&WorkItem> = overdue_work(state)
        .into_iter()
        .filter(|item| student_id.map_or(true, |id| item.student_id == id))
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overdue Work");

    if overdue.is_empty() {
        let _ = writeln!(output, "Nothing overdue.");
    } else {
        for item in overdue {
            let name = state
                .students()
                .get(&item.student_id)
                .map(|s| s.name.as_str())
                .unwrap_or("N/A");
            let _ = writeln!(
                output,
                "- {} ({}, {}) due {} [{}]",
                item.title, name, item.subject, item.due_date, item.priority
            );
        }
    }

    let roster: Vec<&Student> = state
        .students()
        .iter()
        .filter(|s| match student_id {
            Some(id) => s.id == id,
            None => !s.is_archived,
        })
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Work Health");

    if roster.is_empty() {
        let _ = writeln!(output, "No students.");
    } else {
        for student in &roster {
            let health = state.work_health(&student.id);
            let _ = writeln!(
                output,
                "- {}: {} ({} pending, {} overdue)",
                student.name, health.health, health.pending, health.overdue
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Syllabus Completion");

    if roster.is_empty() {
        let _ = writeln!(output, "No students.");
    } else {
        for student in &roster {
            let summary = state.syllabus_summary(&student.id);
            let subjects = summary
                .subjects
                .iter()
                .map(|s| format!("{} {}/{}", s.subject, s.completed, s.total))
                .collect::<Vec<_>>()
                .join(", ");
            let updated = summary
                .last_update
                .map(|d| d.to_string())
                .unwrap_or_else(|| "never".to_string());
            let _ = writeln!(
                output,
                "- {}: {}% [{}] last update {}",
                student.name, summary.percentage, subjects, updated
            );
        }
    }

    let mut progress: Vec<&ChapterProgress> = state
        .chapters()
        .iter()
        .filter(|p| student_id.map_or(true, |id| p.student_id == id))
        .collect();
    progress.sort_by(|a, b| {
        (&a.student_id, &a.subject, &a.chapter_no).cmp(&(&b.student_id, &b.subject, &b.chapter_no))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Syllabus Status");

    if progress.is_empty() {
        let _ = writeln!(output, "No chapter progress recorded.");
    } else {
        for chapter in progress {
            let name = state
                .students()
                .get(&chapter.student_id)
                .map(|s| s.name.as_str())
                .unwrap_or("N/A");
            let latest = chapter
                .latest_entry()
                .map(|entry| format!("{} on {}", entry.kind, entry.date))
                .unwrap_or_else(|| "no entries".to_string());
            let _ = writeln!(
                output,
                "- {}: {} Ch {} {} ({})",
                name, chapter.subject, chapter.chapter_no, chapter.chapter_name, latest
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{ChapterNo, EntryType};

    #[test]
    fn empty_desk_reports_placeholders() {
        let state = AppState::seeded(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let report = build_report(&state, None);
        assert!(report.starts_with("# Tutor Desk Report\nGenerated for all students on 2024-03-01"));
        assert!(report.contains("No doubts logged."));
        assert!(report.contains("Nothing overdue."));
        assert!(report.contains("No chapter progress recorded."));
        assert!(report.contains("- Rohan Sharma: Healthy (0 pending, 0 overdue)"));
        assert!(report.contains("- Rohan Sharma: 0% [Mathematics 0/2, Science 0/2] last update never"));
    }

    #[test]
    fn lists_overdue_reading_task_and_latest_entry() {
        let mut state = AppState::seeded(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        state
            .log_chapter_entry(
                "1",
                "Mathematics",
                &ChapterNo::new("2"),
                EntryType::Start,
                NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
                None,
            )
            .unwrap();

        let report = build_report(&state, Some("1"));
        assert!(report.contains("Generated for Rohan Sharma"));
        assert!(report.contains(
            "- Start reading & note making for Polynomials (Rohan Sharma, Mathematics) due 2024-02-08 [Low]"
        ));
        assert!(report.contains("- Rohan Sharma: Mathematics Ch 2 Polynomials (start on 2024-02-01)"));
        assert_eq!(overdue_work(&state).len(), 1);
    }

    #[test]
    fn health_and_completion_follow_selected_student() {
        let mut state = AppState::seeded(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 2, d).unwrap();
        let no = ChapterNo::new("1");
        state
            .log_chapter_entry("1", "Science", &no, EntryType::Finish, day(20), None)
            .unwrap();
        state
            .log_chapter_entry("1", "Mathematics", &no, EntryType::Start, day(10), None)
            .unwrap();

        let report = build_report(&state, Some("1"));
        assert!(report.contains("## Work Health\n- Rohan Sharma: Warning (1 pending, 1 overdue)\n"));
        assert!(report.contains("- Rohan Sharma: 25% [Mathematics 0/2, Science 1/2] last update 2024-02-20"));
        assert!(!report.contains("Priya Patel"));
    }
}
