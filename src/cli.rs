use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;

use crate::data::{CourseRow, Db, ItemRow};
use crate::error::Error;
use crate::natsort::norm;
use crate::nav::{Navigator, OpenPolicy, Opener};
use crate::scanner;
use crate::sections::SectionStates;

fn require_course(db: &Db, course_id: i64) -> Result<CourseRow> {
    Ok(db
        .course_by_id(course_id)?
        .ok_or(Error::CourseNotFound(course_id))?)
}

fn require_item(db: &Db, item_id: i64) -> Result<ItemRow> {
    match db.item_by_id(item_id)? {
        Some(item) => Ok(item),
        None => bail!("item {} not found (rescan the course?)", item_id),
    }
}

fn human_bytes(n: i64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    if n < 1024 {
        return format!("{} B", n);
    }
    let mut f = n as f64 / 1024.0;
    let mut unit = 1;
    while f >= 1024.0 && unit < UNITS.len() - 1 {
        f /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", f, UNITS[unit])
}

fn pct(part: i64, whole: i64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64 * 100.0
    } else {
        0.0
    }
}

// ── add / scan ───────────────────────────────────────────────────────────

pub fn add(db: &Db, path: &Path) -> Result<()> {
    let course_id = scanner::scan(db, path)?;
    let course = require_course(db, course_id)?;
    let p = db.course_progress(course_id)?;
    println!(
        "Added {} — {} files, {}.",
        course.name,
        p.total_count,
        human_bytes(p.total_bytes)
    );
    println!("Run `ct show {}` to browse it.", course_id);
    Ok(())
}

pub fn scan(db: &Db, course_id: Option<i64>) -> Result<()> {
    let targets = match course_id {
        Some(id) => vec![require_course(db, id)?],
        None => db.list_courses()?,
    };
    if targets.is_empty() {
        println!("No courses in library. Use `ct add PATH` first.");
        return Ok(());
    }

    for course in &targets {
        println!("Scanning {}...", course.path);
        match scanner::scan(db, Path::new(&course.path)) {
            Ok(id) => {
                let p = db.course_progress(id)?;
                println!("  {} files, {}", p.total_count, human_bytes(p.total_bytes));
            }
            // A failed scan leaves the course's catalog untouched.
            Err(e) => eprintln!("ct scan: {}: {}", course.path, e),
        }
    }
    Ok(())
}

// ── list / show / status ─────────────────────────────────────────────────

#[derive(Serialize)]
struct CourseSummary {
    id: i64,
    name: String,
    path: String,
    completed_count: i64,
    total_count: i64,
    completed_bytes: i64,
    total_bytes: i64,
    last_opened: Option<String>,
}

pub fn list(db: &Db, filter: Option<&str>, json: bool) -> Result<()> {
    let q = filter.map(norm);
    let mut summaries = Vec::new();
    for course in db.list_courses()? {
        if let Some(q) = &q {
            if !norm(&course.name).contains(q.as_str()) && !norm(&course.path).contains(q.as_str())
            {
                continue;
            }
        }
        let p = db.course_progress(course.id)?;
        let last_opened = match course.last_opened_item_id {
            Some(item_id) => db.item_by_id(item_id)?.map(|i| i.rel_path),
            None => None,
        };
        summaries.push(CourseSummary {
            id: course.id,
            name: course.name,
            path: course.path,
            completed_count: p.completed_count,
            total_count: p.total_count,
            completed_bytes: p.completed_bytes,
            total_bytes: p.total_bytes,
            last_opened,
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No courses. Use `ct add PATH` first.");
        return Ok(());
    }
    for s in &summaries {
        println!(
            "[{}] {} — {}/{} files ({:.1}%), {} / {} ({:.1}%)",
            s.id,
            s.name,
            s.completed_count,
            s.total_count,
            pct(s.completed_count, s.total_count),
            human_bytes(s.completed_bytes),
            human_bytes(s.total_bytes),
            pct(s.completed_bytes, s.total_bytes),
        );
        println!("    {}", s.path);
        if let Some(last) = &s.last_opened {
            println!("    last: {}", last);
        }
    }
    Ok(())
}

pub fn show(
    db: &Db,
    course_id: i64,
    filter: Option<&str>,
    hide_completed: bool,
    collapse_all: bool,
) -> Result<()> {
    let course = require_course(db, course_id)?;
    let items = db.course_items(course_id, false)?;
    let q = filter.map(norm);

    let visible: Vec<&ItemRow> = items
        .iter()
        .filter(|it| !(hide_completed && it.completed))
        .filter(|it| match &q {
            Some(q) => norm(&it.name).contains(q.as_str()),
            None => true,
        })
        .collect();

    let mut states = SectionStates::load(db, course_id)?;
    states.ensure_known(visible.iter().map(|it| it.section.clone()));
    if collapse_all {
        // View-only collapse: nothing is persisted.
        states.collapse_all();
    }

    let p = db.course_progress(course_id)?;
    println!(
        "{} — {}/{} files ({:.1}%), {} / {} ({:.1}%)",
        course.name,
        p.completed_count,
        p.total_count,
        pct(p.completed_count, p.total_count),
        human_bytes(p.completed_bytes),
        human_bytes(p.total_bytes),
        pct(p.completed_bytes, p.total_bytes),
    );

    // Items arrive sorted by (section, rel path); group consecutively.
    let mut groups: Vec<(&str, Vec<&ItemRow>)> = Vec::new();
    for &it in &visible {
        match groups.last_mut() {
            Some((section, rows)) if *section == it.section => rows.push(it),
            _ => groups.push((it.section.as_str(), vec![it])),
        }
    }

    for (section, rows) in &groups {
        let done = rows.iter().filter(|it| it.completed).count();
        let collapsed = states.is_collapsed(section);
        let marker = if collapsed { "▸" } else { "▾" };
        println!();
        println!("{} {}  {}/{}", marker, section, done, rows.len());
        if collapsed {
            continue;
        }
        for it in rows {
            let check = if it.completed { "[x]" } else { "[ ]" };
            let last = if course.last_opened_item_id == Some(it.id) {
                "  ← last"
            } else {
                ""
            };
            println!(
                "  {} {:>6}  {}  {}{}",
                check,
                it.id,
                it.name,
                human_bytes(it.size_bytes),
                last
            );
        }
    }
    Ok(())
}

pub fn status(db: &Db, json: bool) -> Result<()> {
    let s = db.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&s)?);
        return Ok(());
    }
    println!("courses:   {}", s.courses);
    println!(
        "files:     {} ({} completed, {:.1}%)",
        s.items,
        s.completed,
        pct(s.completed, s.items)
    );
    println!(
        "size:      {} / {} ({:.1}%)",
        human_bytes(s.completed_bytes),
        human_bytes(s.total_bytes),
        pct(s.completed_bytes, s.total_bytes)
    );
    Ok(())
}

// ── open / navigation ────────────────────────────────────────────────────

fn report_outcome(outcome: &crate::nav::OpenOutcome) {
    match &outcome.launch_error {
        None => println!("Opened {}", outcome.item.rel_path),
        Some(err) => {
            eprintln!("ct: could not open {}: {}", outcome.item.abs_path, err);
            if outcome.recorded {
                eprintln!("    (still recorded as opened)");
            }
        }
    }
}

pub fn open<O: Opener>(db: &Db, opener: &O, policy: OpenPolicy, item_id: i64) -> Result<()> {
    let nav = Navigator::new(db, opener, policy);
    match nav.open_item(item_id)? {
        Some(outcome) => report_outcome(&outcome),
        None => bail!("item {} not found (rescan the course?)", item_id),
    }
    Ok(())
}

pub fn next<O: Opener>(
    db: &Db,
    opener: &O,
    policy: OpenPolicy,
    item_id: i64,
    hide_completed: bool,
) -> Result<()> {
    let item = require_item(db, item_id)?;
    let ordered: Vec<i64> = db
        .course_items(item.course_id, false)?
        .into_iter()
        .filter(|it| !(hide_completed && it.completed))
        .map(|it| it.id)
        .collect();

    let nav = Navigator::new(db, opener, policy);
    match nav.open_next(&ordered, item_id)? {
        Some(outcome) => {
            println!("Done: {}", item.rel_path);
            report_outcome(&outcome);
        }
        None => println!("Done: {} (nothing further to open)", item.rel_path),
    }
    Ok(())
}

pub fn resume<O: Opener>(db: &Db, opener: &O, policy: OpenPolicy) -> Result<()> {
    let nav = Navigator::new(db, opener, policy);
    match nav.resume_global()? {
        Some(last) => {
            println!("Resuming {} — {}", last.course_name, last.rel_path);
            if let Some(outcome) = nav.open_item(last.item_id)? {
                report_outcome(&outcome);
            }
        }
        None => println!("No last opened file yet."),
    }
    Ok(())
}

pub fn continue_course<O: Opener>(
    db: &Db,
    opener: &O,
    policy: OpenPolicy,
    course_id: i64,
) -> Result<()> {
    let nav = Navigator::new(db, opener, policy);
    match nav.continue_course(course_id)? {
        Some(outcome) => report_outcome(&outcome),
        None => println!("Course has no opened file yet; use `ct show {}`.", course_id),
    }
    Ok(())
}

pub fn done(db: &Db, item_id: i64, undo: bool) -> Result<()> {
    let item = require_item(db, item_id)?;
    db.set_completed(item_id, !undo)?;
    if undo {
        println!("Unmarked {}", item.rel_path);
    } else {
        println!("Completed {}", item.rel_path);
    }
    Ok(())
}

// ── sections ─────────────────────────────────────────────────────────────

pub fn toggle(db: &Db, course_id: i64, section: &str) -> Result<()> {
    require_course(db, course_id)?;
    let mut states = SectionStates::load(db, course_id)?;
    let collapsed = states.toggle(db, section)?;
    println!(
        "Section '{}' is now {}.",
        section,
        if collapsed { "collapsed" } else { "expanded" }
    );
    Ok(())
}

pub fn expand(db: &Db, course_id: i64) -> Result<()> {
    require_course(db, course_id)?;
    let mut states = SectionStates::load(db, course_id)?;
    states.expand_all(db)?;
    println!("All sections expanded; remembered collapse state cleared.");
    Ok(())
}

// ── reveal / remove ──────────────────────────────────────────────────────

pub fn reveal<O: Opener>(db: &Db, opener: &O, item_id: i64) -> Result<()> {
    let item = require_item(db, item_id)?;
    let nav = Navigator::new(db, opener, OpenPolicy::default());
    if let Some(err) = nav.reveal_path(Path::new(&item.abs_path)) {
        eprintln!("ct: could not reveal {}: {}", item.abs_path, err);
    }
    Ok(())
}

pub fn reveal_course<O: Opener>(db: &Db, opener: &O, course_id: i64) -> Result<()> {
    let course = require_course(db, course_id)?;
    let nav = Navigator::new(db, opener, OpenPolicy::default());
    if let Some(err) = nav.reveal_path(Path::new(&course.path)) {
        eprintln!("ct: could not reveal {}: {}", course.path, err);
    }
    Ok(())
}

pub fn remove(db: &Db, course_id: i64) -> Result<()> {
    let course = require_course(db, course_id)?;
    db.delete_course(course_id)?;
    println!(
        "Removed {} from the library (files on disk are untouched).",
        course.name
    );
    Ok(())
}
