//! Backlog-driven coding agent loop.
//!
//! Works through `prd.json` one item per agent session, logging every
//! iteration to `progress.txt`.

use std::fmt::Write as _;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser, Subcommand};

use ralph::backlog::{Backlog, Item};
use ralph::bootstrap::{BootstrapSource, generate_backlog};
use ralph::exit_codes;
use ralph::io::agent::Agent;
use ralph::io::init::{InitAction, InitOptions, init_project};
use ralph::io::signal::install_stop_handler;
use ralph::io::tracker::{GhTracker, IssueTracker};
use ralph::logging;
use ralph::looping::{LoopObserver, LoopOutcome, Orchestrator, StopFlag, prepare_prompt};
use ralph::project::Project;
use ralph::select::SelectOutcome;
use ralph::sync::{PushAction, pull_issues, push_status};

const OUTPUT_PREVIEW_LINES: usize = 5;

#[derive(Parser)]
#[command(
    name = "ralph",
    version,
    about = "Backlog-driven autonomous coding agent loop"
)]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scaffold `ralph.toml`, `prd.json`, `progress.txt` and agent notes.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Generate `prd.json` through the agent.
    #[command(group(ArgGroup::new("source").args(["describe", "from", "from_issues"])))]
    Prd {
        /// What to build, in plain words.
        #[arg(long)]
        describe: Option<String>,
        /// Markdown requirements document to convert.
        #[arg(long)]
        from: Option<PathBuf>,
        /// Import open tracker issues.
        #[arg(long)]
        from_issues: bool,
        /// Issue label filter (defaults to `tracker.label`).
        #[arg(long, requires = "from_issues")]
        label: Option<String>,
    },
    /// Run the loop.
    Run {
        /// Override `max_iterations` from config.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        max_iterations: Option<u32>,
        /// Work only on this item id.
        #[arg(long)]
        story: Option<String>,
        /// Print the next prompt without invoking the agent.
        #[arg(long)]
        dry_run: bool,
    },
    /// Start an interactive agent session for the next (or given) item.
    Session {
        #[arg(long)]
        story: Option<String>,
    },
    /// Show backlog progress.
    Status,
    /// Sync item status with tracker issues.
    Sync {
        /// Pull new issues into the backlog instead of pushing status.
        #[arg(long)]
        pull: bool,
        /// Push status and pull new issues.
        #[arg(long)]
        both: bool,
    },
    /// Reset loop state for a fresh run.
    Reset {
        /// Clear the progress journal.
        #[arg(long)]
        progress: bool,
        /// Mark every item as not passing.
        #[arg(long)]
        stories: bool,
        /// Both of the above.
        #[arg(long)]
        all: bool,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = cli.root.as_path();
    match cli.command {
        Command::Init { force } => cmd_init(root, force),
        Command::Prd {
            describe,
            from,
            from_issues,
            label,
        } => cmd_prd(root, describe, from, from_issues, label),
        Command::Run {
            max_iterations,
            story,
            dry_run,
        } => cmd_run(root, max_iterations, story, dry_run),
        Command::Session { story } => cmd_session(root, story),
        Command::Status => cmd_status(root),
        Command::Sync { pull, both } => cmd_sync(root, pull, both),
        Command::Reset {
            progress,
            stories,
            all,
            yes,
        } => cmd_reset(root, progress || all, stories || all, yes),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let (_, actions) = init_project(root, &InitOptions { force })?;
    for action in actions {
        match action {
            InitAction::Created(path) => println!("created   {}", path.display()),
            InitAction::Appended(path) => println!("appended  {}", path.display()),
            InitAction::Skipped(path) => {
                println!("skipped   {} (exists; use --force)", path.display());
            }
        }
    }
    println!();
    println!("Next steps:");
    println!("  1. Fill prd.json with backlog items (or run `ralph prd`)");
    println!("  2. Run `ralph run` to start the loop");
    Ok(exit_codes::OK)
}

fn cmd_prd(
    root: &Path,
    describe: Option<String>,
    from: Option<PathBuf>,
    from_issues: bool,
    label: Option<String>,
) -> Result<i32> {
    let project = Project::open(root)?;
    let source = if from_issues {
        let label = label.unwrap_or_else(|| project.config.tracker.label.clone());
        println!("Fetching open issues labelled '{label}'...");
        let tracker = GhTracker::new(project.config.tracker.binary.clone());
        let issues = tracker.pull_issues(&label)?;
        if issues.is_empty() {
            println!("No open issues found with label '{label}'.");
            return Ok(exit_codes::OK);
        }
        println!("Converting {} issues...", issues.len());
        BootstrapSource::Issues(issues)
    } else if let Some(path) = from {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("read {}", path.display()))?;
        println!("Generating backlog from {}...", path.display());
        BootstrapSource::Document(text)
    } else {
        let text = match describe {
            Some(text) => text,
            None => ask("What do you want to build? ")?,
        };
        if text.trim().is_empty() {
            bail!("no description provided");
        }
        println!("Generating backlog...");
        BootstrapSource::Description(text)
    };

    let backlog = generate_backlog(
        &project.agent(),
        &project.composer()?,
        &project.store,
        &project.archiver,
        &source,
    )?;
    println!(
        "Saved {} with {} items.",
        project.store.path().display(),
        backlog.total_count()
    );
    Ok(exit_codes::OK)
}

fn cmd_run(
    root: &Path,
    max_iterations: Option<u32>,
    story: Option<String>,
    dry_run: bool,
) -> Result<i32> {
    let project = Project::open(root)?;
    let composer = project.composer()?;

    if dry_run {
        return match prepare_prompt(
            &project.store,
            &project.journal,
            &composer,
            story.as_deref(),
            1,
        )? {
            Ok(prepared) => {
                println!("Dry run: prompt for item {}", prepared.item.id);
                println!();
                println!("{}", prepared.prompt);
                Ok(exit_codes::OK)
            }
            Err(outcome) => {
                println!("{}", describe_nothing_to_do(&outcome));
                Ok(exit_codes::OK)
            }
        };
    }

    if let Some(folder) = project.archiver.check_and_archive()? {
        println!("Branch changed; archived previous run to {}", folder.display());
    }

    let stop = StopFlag::new();
    install_stop_handler(&stop)?;

    let settings = project.loop_settings(max_iterations, story);
    println!(
        "Starting ralph loop (max {} iterations)...",
        settings.max_iterations
    );
    println!();

    let agent = project.agent();
    let tracker = project.tracker();
    let mut orchestrator =
        Orchestrator::new(&project.store, &project.journal, &agent, &composer, settings);
    if let Some(tracker) = tracker.as_ref() {
        orchestrator = orchestrator.with_tracker(tracker);
    }
    let outcome = orchestrator.run(&stop, &mut ConsoleObserver)?;

    println!();
    print!("{}", render_summary(&outcome));

    Ok(if outcome.completed {
        exit_codes::OK
    } else {
        exit_codes::INCOMPLETE
    })
}

fn cmd_session(root: &Path, story: Option<String>) -> Result<i32> {
    let project = Project::open(root)?;
    let composer = project.composer()?;
    let prepared =
        match prepare_prompt(&project.store, &project.journal, &composer, story.as_deref(), 1)? {
            Ok(prepared) => prepared,
            Err(outcome) => {
                println!("{}", describe_nothing_to_do(&outcome));
                return Ok(exit_codes::OK);
            }
        };
    println!(
        "Starting interactive session for {}: {}",
        prepared.item.id, prepared.item.title
    );
    let code = project.agent().passthrough(&prepared.prompt)?;
    Ok(if code == 0 {
        exit_codes::OK
    } else {
        exit_codes::INVALID
    })
}

fn cmd_status(root: &Path) -> Result<i32> {
    let project = Project::open(root)?;
    let backlog = project.store.load()?;
    print!("{}", render_status(&backlog));
    Ok(exit_codes::OK)
}

fn cmd_sync(root: &Path, pull: bool, both: bool) -> Result<i32> {
    let project = Project::open(root)?;
    // Fails early with the bootstrap hint when there is no backlog yet.
    project.store.load()?;
    let tracker = GhTracker::new(project.config.tracker.binary.clone());
    let mut code = exit_codes::OK;

    if !pull || both {
        let pushed = push_status(&project.store, &tracker, project.push_policy())?;
        if pushed.is_empty() {
            println!("No items linked to tracker issues.");
        }
        for entry in &pushed {
            let action = match &entry.action {
                PushAction::Closed => "closed".to_string(),
                PushAction::Commented => "commented".to_string(),
                PushAction::Skipped => "skipped".to_string(),
                PushAction::Failed(err) => {
                    code = exit_codes::INVALID;
                    format!("failed: {err}")
                }
            };
            println!("{} -> #{}: {action}", entry.id, entry.issue);
        }
    }

    if pull || both {
        let label = project.config.tracker.label.clone();
        println!("Pulling issues labelled '{label}'...");
        let appended = pull_issues(
            &project.agent(),
            &project.composer()?,
            &project.store,
            &tracker,
            &label,
        )?;
        if appended.is_empty() {
            println!("No new issues to import.");
        } else {
            println!("Imported {} items from tracker issues.", appended.len());
        }
    }
    Ok(code)
}

fn cmd_reset(root: &Path, progress: bool, stories: bool, yes: bool) -> Result<i32> {
    if !progress && !stories {
        bail!("specify --progress, --stories, or --all");
    }
    let project = Project::open(root)?;

    println!("This will:");
    if progress {
        println!("  - Clear {}", project.journal.path().display());
    }
    if stories {
        println!("  - Mark every item in {} as not passing", project.store.path().display());
    }
    if !yes && !confirm("Continue? [y/N] ")? {
        println!("Cancelled.");
        return Ok(exit_codes::OK);
    }

    if progress {
        project.journal.clear()?;
        project.journal.initialize()?;
        println!("Cleared {}", project.journal.path().display());
    }
    if stories {
        let count = project.store.reset_all()?;
        println!("Reset {count} items");
    }
    Ok(exit_codes::OK)
}

/// Prints loop progress to stdout.
struct ConsoleObserver;

impl LoopObserver for ConsoleObserver {
    fn on_iteration(&mut self, iteration: u32, max_iterations: u32, item: &Item) {
        println!("Iteration {iteration}/{max_iterations}  {}: {}", item.id, item.title);
    }

    fn on_output(&mut self, output: &str) {
        println!("{}", preview(output, OUTPUT_PREVIEW_LINES));
        println!();
    }
}

fn preview(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let mut out = lines
        .iter()
        .take(max_lines)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > max_lines {
        let _ = write!(out, "\n... ({} more lines)", lines.len() - max_lines);
    }
    out
}

fn render_summary(outcome: &LoopOutcome) -> String {
    let headline = if outcome.completed {
        "All items complete!"
    } else {
        "Loop ended before every item passed."
    };
    format!(
        "{headline}\nReason: {}\nProgress: {}/{} items complete\nIterations run: {}\n",
        outcome.reason(),
        outcome.items_completed,
        outcome.items_total,
        outcome.iterations_run
    )
}

fn describe_nothing_to_do(outcome: &SelectOutcome) -> String {
    match outcome {
        SelectOutcome::AlreadyDone(item) => format!("Item {} already passes.", item.id),
        SelectOutcome::NoRemainingWork | SelectOutcome::Open(_) => {
            "No incomplete items found.".to_string()
        }
    }
}

fn render_status(backlog: &Backlog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", backlog.project_name, backlog.description);
    if !backlog.branch_label.is_empty() {
        let _ = writeln!(out, "Branch: {}", backlog.branch_label);
    }
    out.push('\n');

    let header = ["ID", "Title", "Priority", "Status", "Issue"];
    let rows: Vec<[String; 5]> = backlog
        .items
        .iter()
        .map(|item| {
            [
                item.id.clone(),
                item.title.clone(),
                item.priority.to_string(),
                if item.passes { "Pass" } else { "Todo" }.to_string(),
                item.tracker_ref.map(|n| format!("#{n}")).unwrap_or_default(),
            ]
        })
        .collect();
    let mut widths = header.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    let header_row = header.map(str::to_string);
    for row in std::iter::once(&header_row).chain(rows.iter()) {
        let line = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line.trim_end());
    }

    let completed = backlog.completed_count();
    let total = backlog.total_count();
    let percentage = if total > 0 {
        ((completed as f64 / total as f64) * 100.0).round() as u32
    } else {
        0
    };
    let _ = writeln!(
        out,
        "\nProgress: {completed}/{total} items complete ({percentage}%)"
    );
    out
}

fn ask(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush().context("flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read answer from stdin")?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = ask(question)?;
    Ok(matches!(answer.to_ascii_lowercase().as_str(), "y" | "yes"))
}
