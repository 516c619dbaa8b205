use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::info;

mod config;
mod curriculum;
mod db;
mod error;
mod export;
mod logging;
mod models;
mod repo;
mod report;
mod seed;
mod state;
mod store;
mod sync;
mod validate;

use config::{StoreConfig, DEFAULT_DATA_DIR};
use error::DeskError;
use models::{
    Board, ChapterNo, Doubt, DoubtOrigin, DoubtStatus, EntryType, Priority, Student, SubjectData,
    WorkItem, WorkStatus,
};
use state::{AppState, DoubtFilter, StudentFilter, WorkFilter};

#[derive(Parser)]
#[command(name = "tutor-desk")]
#[command(about = "Mentor desk for students, syllabus progress, work and doubts", long_about = None)]
struct Cli {
    /// Directory for the JSON documents when DATABASE_URL is unset
    #[arg(long, global = true, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the built-in roster and curricula
    Seed,
    /// Manage the student directory
    Students {
        #[command(subcommand)]
        action: StudentCommand,
    },
    /// Manage a student's subjects and chapters
    Subjects {
        #[command(subcommand)]
        action: SubjectCommand,
    },
    /// Record chapter progress
    Syllabus {
        #[command(subcommand)]
        action: SyllabusCommand,
    },
    /// Manage work items
    Work {
        #[command(subcommand)]
        action: WorkCommand,
    },
    /// Manage doubts
    Doubts {
        #[command(subcommand)]
        action: DoubtCommand,
    },
    /// Export a list as CSV
    Export {
        #[command(subcommand)]
        target: ExportCommand,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        student: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum StudentCommand {
    List {
        #[arg(long)]
        archived: bool,
        #[arg(long)]
        board: Option<Board>,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    Add(StudentArgs),
    /// Change fields of an existing student
    Edit(StudentEditArgs),
    /// Toggle the archived flag
    Archive { id: String },
    /// Delete an archived student
    Delete { id: String },
}

#[derive(Args)]
struct StudentArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    grade: String,
    #[arg(long)]
    board: Board,
    #[arg(long)]
    school: String,
    /// Also sets the batch
    #[arg(long)]
    time_slot: String,
    #[arg(long)]
    personal_phone: Option<String>,
    #[arg(long)]
    father_phone: Option<String>,
    #[arg(long)]
    mother_phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Args)]
struct StudentEditArgs {
    id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    grade: Option<String>,
    #[arg(long)]
    board: Option<Board>,
    #[arg(long)]
    school: Option<String>,
    #[arg(long)]
    time_slot: Option<String>,
    #[arg(long)]
    personal_phone: Option<String>,
    #[arg(long)]
    father_phone: Option<String>,
    #[arg(long)]
    mother_phone: Option<String>,
    #[arg(long)]
    address: Option<String>,
}

#[derive(Subcommand)]
enum SubjectCommand {
    /// Replace subjects from a JSON file
    Set {
        student: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Apply a curriculum assistant reply saved to a file
    Apply {
        student: String,
        #[arg(long)]
        reply: PathBuf,
    },
}

#[derive(Subcommand)]
enum SyllabusCommand {
    Log {
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        chapter: String,
        #[arg(long)]
        kind: EntryType,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
    },
    Remove { progress_id: String, entry_id: String },
}

#[derive(Subcommand)]
enum WorkCommand {
    Add {
        student: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        chapter: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        due: NaiveDate,
        #[arg(long, default_value = "Medium")]
        priority: Priority,
        #[arg(long)]
        topic: Option<String>,
    },
    /// Change fields of an existing work item
    Edit(WorkEditArgs),
    Status { id: String, status: WorkStatus },
    Delete { id: String },
    List {
        #[arg(long)]
        student: Option<String>,
        /// Show work of archived students
        #[arg(long)]
        archived: bool,
        /// Student name contains
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        batch: Option<String>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        status: Option<WorkStatus>,
        #[arg(long)]
        priority: Option<Priority>,
    },
}

#[derive(Args)]
struct WorkEditArgs {
    id: String,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    chapter: Option<String>,
    #[arg(long)]
    topic: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    due: Option<NaiveDate>,
    #[arg(long)]
    status: Option<WorkStatus>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    mentor_note: Option<String>,
    /// Append a reference link; repeatable
    #[arg(long = "link")]
    links: Vec<String>,
}

#[derive(Subcommand)]
enum DoubtCommand {
    Add {
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        chapter: Option<String>,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "Medium")]
        priority: Priority,
        #[arg(long, default_value = "Other")]
        origin: DoubtOrigin,
    },
    /// Change fields of an existing doubt, status included
    Edit(DoubtEditArgs),
    /// Create a work task for the doubt
    Convert { id: String },
    Resolve { id: String },
    Reopen { id: String },
    /// Delete the doubt and its task
    Delete { id: String },
    List {
        #[arg(long)]
        student: Option<String>,
        /// Only open and tasked doubts
        #[arg(long)]
        open: bool,
        #[arg(long)]
        status: Option<DoubtStatus>,
        #[arg(long)]
        subject: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
        /// Doubt text contains
        #[arg(long)]
        search: Option<String>,
    },
}

#[derive(Args)]
struct DoubtEditArgs {
    id: String,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    chapter: Option<String>,
    #[arg(long)]
    text: Option<String>,
    #[arg(long)]
    priority: Option<Priority>,
    #[arg(long)]
    origin: Option<DoubtOrigin>,
    #[arg(long)]
    status: Option<DoubtStatus>,
}

#[derive(Subcommand)]
enum ExportCommand {
    Work {
        #[arg(long)]
        student: Option<String>,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    Doubts {
        #[arg(long)]
        student: Option<String>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    let config = StoreConfig::from_env(cli.data_dir);
    let today = Utc::now().date_naive();

    if let Commands::InitDb = cli.command {
        let store = db::PgStore::connect(config.require_database_url()?).await?;
        db::init_db(store.pool()).await?;
        println!("Schema ready.");
        return Ok(());
    }

    let store = config.open().await?;
    let mut state = AppState::load(&store, today).await;

    match cli.command {
        Commands::InitDb => {}
        Commands::Seed => {
            let count = state.apply_seed()?;
            println!("Seeded {count} students.");
        }
        Commands::Students { action } => run_students(&mut state, action)?,
        Commands::Subjects { action } => run_subjects(&mut state, action)?,
        Commands::Syllabus { action } => run_syllabus(&mut state, action)?,
        Commands::Work { action } => run_work(&mut state, action)?,
        Commands::Doubts { action } => run_doubts(&mut state, action)?,
        Commands::Export { target } => run_export(&state, target)?,
        Commands::Report { student, out } => {
            let report = report::build_report(&state, student.as_deref());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    let written = state.commit(&store).await?;
    info!(documents = written, "changes saved");
    Ok(())
}

fn run_students(state: &mut AppState, action: StudentCommand) -> anyhow::Result<()> {
    match action {
        StudentCommand::List {
            archived,
            board,
            grade,
            batch,
            search,
        } => {
            let filter = StudentFilter {
                archived,
                board,
                grade,
                batch,
                search,
            };
            let students = state.filter_students(&filter);
            if students.is_empty() {
                println!("No students match.");
            }
            for s in students {
                let stage = s.program_stage.as_deref().map(|p| format!(" {p}")).unwrap_or_default();
                let syllabus = state.syllabus_summary(&s.id);
                println!(
                    "- [{}] {} (grade {} {}{}, {}) batch {} {} syllabus {}%",
                    s.id, s.name, s.grade, s.board, stage, s.school, s.batch, s.time_slot, syllabus.percentage
                );
            }
        }
        StudentCommand::Add(args) => {
            let student = state.save_student(Student {
                id: String::new(),
                name: args.name,
                grade: args.grade,
                board: args.board,
                school: args.school,
                batch: String::new(),
                time_slot: args.time_slot,
                personal_phone: args.personal_phone,
                father_phone: args.father_phone,
                mother_phone: args.mother_phone,
                address: args.address,
                is_archived: false,
                avatar_url: None,
                program_stage: None,
            })?;
            println!("Added {} as {}.", student.name, student.id);
        }
        StudentCommand::Edit(args) => {
            let student = state.edit_student(&args.id, |s| {
                replace(&mut s.name, args.name);
                replace(&mut s.grade, args.grade);
                replace(&mut s.board, args.board);
                replace(&mut s.school, args.school);
                replace(&mut s.time_slot, args.time_slot);
                replace_some(&mut s.personal_phone, args.personal_phone);
                replace_some(&mut s.father_phone, args.father_phone);
                replace_some(&mut s.mother_phone, args.mother_phone);
                replace_some(&mut s.address, args.address);
            })?;
            println!("Updated {} ({}, batch {}).", student.name, student.id, student.batch);
        }
        StudentCommand::Archive { id } => {
            let archived = state.toggle_archive(&id)?;
            println!("Student {id} {}.", if archived { "archived" } else { "restored" });
        }
        StudentCommand::Delete { id } => {
            state.delete_student(&id)?;
            println!("Student {id} deleted.");
        }
    }
    Ok(())
}

fn run_subjects(state: &mut AppState, action: SubjectCommand) -> anyhow::Result<()> {
    match action {
        SubjectCommand::Set { student, file } => {
            let raw = read_file(&file)?;
            let subjects: Vec<SubjectData> = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not a subject list", file.display()))?;
            let count = subjects.len();
            state.save_subjects(&student, subjects)?;
            println!("Saved {count} subjects for {student}.");
        }
        SubjectCommand::Apply { student, reply } => {
            let count = state.apply_curriculum(&student, &read_file(&reply)?)?;
            println!("Applied {count} subjects for {student}.");
        }
    }
    Ok(())
}

fn run_syllabus(state: &mut AppState, action: SyllabusCommand) -> anyhow::Result<()> {
    match action {
        SyllabusCommand::Log {
            student,
            subject,
            chapter,
            kind,
            date,
            note,
        } => {
            let date = date.unwrap_or(state.today());
            let entry = state.log_chapter_entry(&student, &subject, &ChapterNo::new(chapter), kind, date, note)?;
            println!("Logged {} entry {} on {}.", entry.kind, entry.id, entry.date);
        }
        SyllabusCommand::Remove { progress_id, entry_id } => {
            state.remove_chapter_entry(&progress_id, &entry_id)?;
            println!("Removed entry {entry_id}.");
        }
    }
    Ok(())
}

fn run_work(state: &mut AppState, action: WorkCommand) -> anyhow::Result<()> {
    match action {
        WorkCommand::Add {
            student,
            title,
            subject,
            chapter,
            description,
            due,
            priority,
            topic,
        } => {
            let today = state.today();
            let chapter_no = ChapterNo::new(chapter);
            let chapter_name = chapter_name(state, &student, &subject, &chapter_no)?;
            let item = state.save_work_item(WorkItem {
                id: String::new(),
                student_id: student,
                title,
                subject,
                chapter_no,
                chapter_name,
                topic,
                description,
                due_date: due,
                status: WorkStatus::Assign,
                priority,
                links: Vec::new(),
                files: Vec::new(),
                mentor_note: None,
                date_created: today,
                linked_doubt_id: None,
                source: None,
            })?;
            println!("Added work item {}.", item.id);
        }
        WorkCommand::Edit(args) => {
            let chapter = match (&args.subject, &args.chapter) {
                (None, None) => None,
                _ => {
                    let current = state
                        .work_items()
                        .get(&args.id)
                        .ok_or_else(|| DeskError::not_found("work item", args.id.as_str()))?;
                    let subject = args.subject.clone().unwrap_or_else(|| current.subject.clone());
                    let no = args
                        .chapter
                        .as_deref()
                        .map(ChapterNo::new)
                        .unwrap_or_else(|| current.chapter_no.clone());
                    let name = chapter_name(state, &current.student_id, &subject, &no)?;
                    Some((subject, no, name))
                }
            };
            let item = state.edit_work_item(&args.id, |w| {
                if let Some((subject, no, name)) = chapter {
                    w.subject = subject;
                    w.chapter_no = no;
                    w.chapter_name = name;
                }
                replace(&mut w.title, args.title);
                replace(&mut w.description, args.description);
                replace(&mut w.due_date, args.due);
                replace(&mut w.status, args.status);
                replace(&mut w.priority, args.priority);
                replace_some(&mut w.topic, args.topic);
                replace_some(&mut w.mentor_note, args.mentor_note);
                w.links.extend(args.links);
            })?;
            println!("Updated work item {} ({}, due {}).", item.id, item.status, item.due_date);
        }
        WorkCommand::Status { id, status } => {
            state.set_work_status(&id, status)?;
            println!("Work item {id} is now {status}.");
        }
        WorkCommand::Delete { id } => {
            state.delete_work_item(&id)?;
            println!("Work item {id} deleted.");
        }
        WorkCommand::List {
            student,
            archived,
            search,
            batch,
            subject,
            status,
            priority,
        } => {
            let today = state.today();
            let filter = WorkFilter {
                archived,
                student_id: student,
                search,
                batch,
                subject,
                status,
                priority,
            };
            let items = state.filter_work_items(&filter);
            if items.is_empty() {
                println!("No work items.");
            }
            let mut current_student: Option<&str> = None;
            for item in items {
                if current_student != Some(item.student_id.as_str()) {
                    current_student = Some(item.student_id.as_str());
                    let health = state.work_health(&item.student_id);
                    let name = state
                        .students()
                        .get(&item.student_id)
                        .map(|s| s.name.as_str())
                        .unwrap_or("N/A");
                    println!(
                        "{name}: {} ({} pending, {} overdue)",
                        health.health, health.pending, health.overdue
                    );
                }
                let overdue = if item.is_overdue(today) { " OVERDUE" } else { "" };
                println!(
                    "- [{}] {} ({} Ch {}) {} {} due {}{}",
                    item.id,
                    item.title,
                    item.subject,
                    item.chapter_no,
                    item.status,
                    item.priority,
                    item.due_date,
                    overdue
                );
            }
        }
    }
    Ok(())
}

fn run_doubts(state: &mut AppState, action: DoubtCommand) -> anyhow::Result<()> {
    match action {
        DoubtCommand::Add {
            student,
            subject,
            chapter,
            text,
            priority,
            origin,
        } => {
            let today = state.today();
            let chapter_no = chapter.map(ChapterNo::new);
            let chapter_name = chapter_no
                .as_ref()
                .and_then(|no| state.subjects().chapter(&student, &subject, no))
                .map(|c| c.name.clone());
            let doubt = state.save_doubt(Doubt {
                id: String::new(),
                student_id: student,
                subject,
                chapter_no,
                chapter_name,
                test_id: None,
                text,
                priority,
                origin,
                created_at: today,
                status: DoubtStatus::Open,
                resolved_at: None,
                attachment: None,
                voice_note: None,
            })?;
            println!("Logged doubt {}.", doubt.id);
        }
        DoubtCommand::Edit(args) => {
            let chapter = match args.chapter {
                Some(chapter) => {
                    let current = state
                        .doubts()
                        .get(&args.id)
                        .ok_or_else(|| DeskError::not_found("doubt", args.id.as_str()))?;
                    let subject = args.subject.clone().unwrap_or_else(|| current.subject.clone());
                    let no = ChapterNo::new(chapter);
                    let name = state
                        .subjects()
                        .chapter(&current.student_id, &subject, &no)
                        .map(|c| c.name.clone());
                    Some((no, name))
                }
                None => None,
            };
            let doubt = state.edit_doubt(&args.id, |d| {
                if let Some((no, name)) = chapter {
                    d.chapter_no = Some(no);
                    d.chapter_name = name;
                }
                replace(&mut d.subject, args.subject);
                replace(&mut d.text, args.text);
                replace(&mut d.priority, args.priority);
                replace(&mut d.origin, args.origin);
                replace(&mut d.status, args.status);
            })?;
            println!("Updated doubt {} ({}).", doubt.id, doubt.status);
        }
        DoubtCommand::Convert { id } => {
            let task = state.convert_doubt_to_task(&id)?;
            println!("Created task {} due {}.", task.id, task.due_date);
        }
        DoubtCommand::Resolve { id } => {
            state.resolve_doubt(&id)?;
            println!("Doubt {id} resolved.");
        }
        DoubtCommand::Reopen { id } => {
            state.reopen_doubt(&id)?;
            println!("Doubt {id} reopened.");
        }
        DoubtCommand::Delete { id } => {
            state.delete_doubt(&id)?;
            println!("Doubt {id} deleted.");
        }
        DoubtCommand::List {
            student,
            open,
            status,
            subject,
            priority,
            search,
        } => {
            let stats = state.doubt_stats(student.as_deref());
            println!(
                "{} doubts: {} open, {} tasked, {} resolved",
                stats.total, stats.open, stats.tasked, stats.resolved
            );
            let filter = DoubtFilter {
                student_id: student,
                open,
                status,
                subject,
                priority,
                search,
            };
            for doubt in state.filter_doubts(&filter) {
                println!(
                    "- [{}] {} {} ({}, {}) {}",
                    doubt.id, doubt.created_at, doubt.subject, doubt.status, doubt.priority, doubt.text
                );
            }
        }
    }
    Ok(())
}

fn run_export(state: &AppState, target: ExportCommand) -> anyhow::Result<()> {
    let (csv, out) = match target {
        ExportCommand::Work { student, out } => {
            let items = state.sorted_work_items(student.as_deref());
            (export::work_csv(state.students(), &items)?, out)
        }
        ExportCommand::Doubts { student, out } => {
            let doubts = state.list_doubts(student.as_deref(), None);
            (export::doubts_csv(state.students(), &doubts)?, out)
        }
    };
    match out {
        Some(path) => {
            std::fs::write(&path, csv).with_context(|| format!("failed to write {}", path.display()))?;
            println!("Export written to {}.", path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn chapter_name(state: &AppState, student: &str, subject: &str, no: &ChapterNo) -> Result<String, DeskError> {
    state
        .subjects()
        .chapter(student, subject, no)
        .map(|c| c.name.clone())
        .ok_or_else(|| DeskError::not_found("chapter", format!("{subject} {no}")))
}

fn replace<T>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

/// Sets an optional field; an empty value clears it.
fn replace_some(field: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value {
        *field = Some(value).filter(|v| !v.trim().is_empty());
    }
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}
