mod cli;
pub mod data;
pub mod db;
pub mod error;
pub mod natsort;
pub mod nav;
pub mod scanner;
pub mod sections;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nav::{OpenPolicy, SystemOpener};

#[derive(Parser, Debug)]
#[command(name = "ct", about = "Course Tracker — catalog local courses, track progress")]
struct Cli {
    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    debug: bool,

    /// Only count an open after a successful launch (default: an open is
    /// recorded even when the launcher fails)
    #[arg(long, global = true)]
    record_on_success: bool,

    /// Database file override (default: per-user data dir)
    #[arg(long, global = true, value_name = "FILE")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add a course folder to the library and scan it
    Add { path: PathBuf },
    /// Rescan one course, or every course
    #[command(short_flag = 's')]
    Scan { course_id: Option<i64> },
    /// List courses with progress, most recently used first
    #[command(short_flag = 'l')]
    List {
        /// Match against course name or path
        #[arg(short, long)]
        filter: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Show a course's sections and files
    Show {
        course_id: i64,
        /// Match against file name
        #[arg(short, long)]
        filter: Option<String>,
        /// Skip completed files
        #[arg(long)]
        hide_completed: bool,
        /// Render every section collapsed, without persisting anything
        #[arg(long)]
        collapse_all: bool,
    },
    /// Open a file with the system handler and record the open
    Open { item_id: i64 },
    /// Mark a file done, then open the next one in its course
    Next {
        item_id: i64,
        /// Build the "next" sequence from not-yet-completed files only
        #[arg(long)]
        hide_completed: bool,
    },
    /// Re-open the last opened file across all courses
    Resume,
    /// Re-open a course's last opened file
    Continue { course_id: i64 },
    /// Mark a file completed
    Done {
        item_id: i64,
        /// Clear the completion mark instead
        #[arg(long)]
        undo: bool,
    },
    /// Flip one section's remembered collapsed state
    Toggle { course_id: i64, section: String },
    /// Expand all sections and forget the course's collapse memory
    Expand { course_id: i64 },
    /// Show a file in the file manager
    Reveal { item_id: i64 },
    /// Show a course folder in the file manager
    RevealCourse { course_id: i64 },
    /// Remove a course and its tracking data (files stay on disk)
    Remove { course_id: i64 },
    /// Library totals
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "ct=debug" } else { "ct=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub fn run() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let db_path = args.db.clone().unwrap_or_else(db::default_db_path);
    let conn = db::open(&db_path)?;
    let db = data::Db::new(conn);

    let policy = if args.record_on_success {
        OpenPolicy::RecordOnSuccess
    } else {
        OpenPolicy::AlwaysRecord
    };
    let opener = SystemOpener;

    match args.command {
        Commands::Add { path } => cli::add(&db, &path),
        Commands::Scan { course_id } => cli::scan(&db, course_id),
        Commands::List { filter, json } => cli::list(&db, filter.as_deref(), json),
        Commands::Show {
            course_id,
            filter,
            hide_completed,
            collapse_all,
        } => cli::show(&db, course_id, filter.as_deref(), hide_completed, collapse_all),
        Commands::Open { item_id } => cli::open(&db, &opener, policy, item_id),
        Commands::Next {
            item_id,
            hide_completed,
        } => cli::next(&db, &opener, policy, item_id, hide_completed),
        Commands::Resume => cli::resume(&db, &opener, policy),
        Commands::Continue { course_id } => cli::continue_course(&db, &opener, policy, course_id),
        Commands::Done { item_id, undo } => cli::done(&db, item_id, undo),
        Commands::Toggle { course_id, section } => cli::toggle(&db, course_id, &section),
        Commands::Expand { course_id } => cli::expand(&db, course_id),
        Commands::Reveal { item_id } => cli::reveal(&db, &opener, item_id),
        Commands::RevealCourse { course_id } => cli::reveal_course(&db, &opener, course_id),
        Commands::Remove { course_id } => cli::remove(&db, course_id),
        Commands::Status { json } => cli::status(&db, json),
    }
}
