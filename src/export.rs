use std::collections::HashMap;

use anyhow::{anyhow, Context};
use csv::{QuoteStyle, WriterBuilder};

use crate::models::{Doubt, Student, WorkItem};

const WORK_HEADERS: [&str; 7] = [
    "Student Name",
    "Title",
    "Subject",
    "Chapter",
    "Status",
    "Priority",
    "Due Date",
];

const DOUBT_HEADERS: [&str; 10] = [
    "Student Name",
    "Subject",
    "Chapter No",
    "Chapter Name",
    "Doubt Text",
    "Priority",
    "Status",
    "Origin",
    "Logged At",
    "Resolved At",
];

fn names<'a>(students: impl IntoIterator<Item = &'a Student>) -> HashMap<&'a str, &'a str> {
    students
        .into_iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect()
}

fn write_rows<I>(headers: &[&str], rows: I) -> anyhow::Result<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());
    writer.write_record(headers).context("failed to write CSV header")?;
    for row in rows {
        writer.write_record(&row).context("failed to write CSV row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow!("failed to flush CSV: {}", err.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Work items in the given order, one row each.
pub fn work_csv<'a>(
    students: impl IntoIterator<Item = &'a Student>,
    items: &[&WorkItem],
) -> anyhow::Result<String> {
    let names = names(students);
    write_rows(
        &WORK_HEADERS,
        items.iter().map(|item| {
            vec![
                names.get(item.student_id.as_str()).copied().unwrap_or("N/A").to_string(),
                item.title.clone(),
                item.subject.clone(),
                format!("Ch {} - {}", item.chapter_no, item.chapter_name),
                item.status.to_string(),
                item.priority.to_string(),
                item.due_date.to_string(),
            ]
        }),
    )
}

pub fn doubts_csv<'a>(
    students: impl IntoIterator<Item = &'a Student>,
    doubts: &[&Doubt],
) -> anyhow::Result<String> {
    let names = names(students);
    write_rows(
        &DOUBT_HEADERS,
        doubts.iter().map(|doubt| {
            vec![
                names.get(doubt.student_id.as_str()).copied().unwrap_or("N/A").to_string(),
                doubt.subject.clone(),
                doubt.chapter_no.as_ref().map(ToString::to_string).unwrap_or_default(),
                doubt.chapter_name.clone().unwrap_or_default(),
                doubt.text.clone(),
                doubt.priority.to_string(),
                doubt.status.to_string(),
                doubt.origin.to_string(),
                doubt.created_at.to_string(),
                doubt.resolved_at.map(|d| d.to_string()).unwrap_or_default(),
            ]
        }),
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::{ChapterNo, DoubtOrigin, DoubtStatus, Priority, WorkStatus};
    use crate::seed;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn work_rows_quote_every_field() {
        let item = WorkItem {
            id: "w_1".to_string(),
            student_id: "1".to_string(),
            title: "Read \"Polynomials\" again".to_string(),
            subject: "Mathematics".to_string(),
            chapter_no: ChapterNo::new("2"),
            chapter_name: "Polynomials".to_string(),
            topic: None,
            description: "Notes".to_string(),
            due_date: date(2024, 1, 8),
            status: WorkStatus::Assign,
            priority: Priority::Low,
            links: Vec::new(),
            files: Vec::new(),
            mentor_note: None,
            date_created: date(2024, 1, 1),
            linked_doubt_id: None,
            source: None,
        };
        let students = seed::students();
        let csv = work_csv(&students, &[&item]).unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next(),
            Some(r#""Student Name","Title","Subject","Chapter","Status","Priority","Due Date""#)
        );
        assert_eq!(
            lines.next(),
            Some(
                r#""Rohan Sharma","Read ""Polynomials"" again","Mathematics","Ch 2 - Polynomials","Assign","Low","2024-01-08""#
            )
        );
    }

    #[test]
    fn doubt_rows_leave_missing_values_blank() {
        let doubt = Doubt {
            id: "d_1".to_string(),
            student_id: "9".to_string(),
            subject: "Physics".to_string(),
            chapter_no: None,
            chapter_name: None,
            test_id: None,
            text: "Why is g constant?".to_string(),
            priority: Priority::High,
            origin: DoubtOrigin::BeforeTest,
            created_at: date(2024, 2, 1),
            status: DoubtStatus::Open,
            resolved_at: None,
            attachment: None,
            voice_note: None,
        };
        let csv = doubts_csv(&seed::students(), &[&doubt]).unwrap();
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(
            row,
            r#""N/A","Physics","","","Why is g constant?","High","Open","Before Test","2024-02-01","""#
        );
    }
}
