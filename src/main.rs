use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use ont_dashboard_lib::commands::{self, CommandResult, ProjectPatch};
use ont_dashboard_lib::timeline::DragEdge;
use ont_dashboard_lib::{
    config, logging, Dashboard, FileStore, Gateway, KeyValueStore, ProjectDraft, SystemClock,
};

#[derive(Parser)]
#[command(name = "ont")]
#[command(about = "Open New Tab dashboard: tasks, project timeline and countdown")]
#[command(version)]
struct Cli {
    /// Directory holding the state record, backups and logs
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: TopCommand,
}

#[derive(Subcommand)]
enum TopCommand {
    #[command(flatten)]
    Dashboard(Command),
    /// Read one command per line from stdin against a single session
    Session,
}

#[derive(Subcommand)]
enum Command {
    /// Print settings, visible tasks, active projects, timeline range and countdown
    Show,
    AddTask {
        text: String,
    },
    ToggleTask {
        id: String,
    },
    DeleteTask {
        id: String,
    },
    AddProject {
        name: String,
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        /// Palette color, e.g. #7dd3fc
        #[arg(long)]
        color: Option<String>,
    },
    EditProject {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        #[arg(long, conflicts_with = "clear_color")]
        color: Option<String>,
        /// Fall back to the default render color
        #[arg(long)]
        clear_color: bool,
    },
    DeleteProject {
        id: String,
    },
    ArchiveProject {
        id: String,
        /// Bring an archived project back
        #[arg(long)]
        restore: bool,
    },
    /// Move one edge of a project by a number of days
    ResizeProject {
        id: String,
        #[arg(long)]
        edge: DragEdge,
        #[arg(long, allow_negative_numbers = true)]
        days: i64,
    },
    /// Set the theme (dark or light)
    Theme {
        theme: String,
    },
    /// Toggle whether completed tasks are listed
    ShowCompleted,
    Countdown,
    SetCountdown {
        label: String,
        /// ISO-8601 instant or YYYY-MM-DD; omit to clear
        #[arg(long)]
        target: Option<String>,
    },
    /// Write the persisted state to a dated JSON file
    Export {
        /// Target directory, defaults to <data-dir>/exports
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Replace all data with the contents of an exported file
    Import {
        file: PathBuf,
    },
}

#[derive(Parser)]
#[command(no_binary_name = true)]
struct SessionLine {
    #[command(subcommand)]
    command: SessionCommand,
}

#[derive(Subcommand)]
enum SessionCommand {
    #[command(flatten)]
    Dashboard(Command),
    /// Revert the newest change made in this session
    Undo,
    /// Use the delete notice's undo while it is still showing
    UndoNotice,
    Select {
        id: String,
    },
    /// Start a resize gesture; frames stay in memory until `release`
    Drag {
        id: String,
        #[arg(long)]
        edge: DragEdge,
    },
    Frame {
        #[arg(allow_negative_numbers = true)]
        days: i64,
    },
    Release,
    CancelDrag,
    /// Re-read the persisted record
    Reload,
    Quit,
}

fn render<T: Serialize>(result: CommandResult<T>) -> (String, bool) {
    let ok = result.ok;
    let line = serde_json::to_string(&result).unwrap_or_else(|error| {
        serde_json::json!({ "ok": false, "data": null, "error": format!("json error: {error}") })
            .to_string()
    });
    (line, ok)
}

async fn dispatch<S: KeyValueStore>(
    dash: &Dashboard<S>,
    command: Command,
    data_dir: &Path,
) -> (String, bool) {
    match command {
        Command::Show => render(commands::overview_impl(dash)),
        Command::AddTask { text } => render(commands::add_task_impl(dash, &text).await),
        Command::ToggleTask { id } => render(commands::toggle_task_impl(dash, &id).await),
        Command::DeleteTask { id } => render(commands::delete_task_impl(dash, &id).await),
        Command::AddProject {
            name,
            start,
            end,
            color,
        } => {
            let draft = ProjectDraft {
                name,
                start_date: start,
                end_date: end,
                color,
            };
            render(commands::add_project_impl(dash, draft).await)
        }
        Command::EditProject {
            id,
            name,
            start,
            end,
            color,
            clear_color,
        } => {
            let patch = ProjectPatch {
                name,
                start_date: start,
                end_date: end,
                color,
                clear_color,
            };
            render(commands::edit_project_impl(dash, &id, patch).await)
        }
        Command::DeleteProject { id } => render(commands::delete_project_impl(dash, &id).await),
        Command::ArchiveProject { id, restore } => {
            render(commands::archive_project_impl(dash, &id, restore).await)
        }
        Command::ResizeProject { id, edge, days } => {
            render(commands::resize_project_impl(dash, &id, edge, days).await)
        }
        Command::Theme { theme } => render(commands::set_theme_impl(dash, &theme).await),
        Command::ShowCompleted => render(commands::toggle_show_completed_impl(dash).await),
        Command::Countdown => render(commands::countdown_impl(dash)),
        Command::SetCountdown { label, target } => {
            render(commands::set_countdown_impl(dash, &label, target.as_deref()).await)
        }
        Command::Export { out } => {
            let dir = out.unwrap_or_else(|| data_dir.join("exports"));
            render(commands::export_to_dir_impl(dash, &dir).await)
        }
        Command::Import { file } => render(commands::import_from_path_impl(dash, &file).await),
    }
}

async fn run_session<S: KeyValueStore>(dash: &Dashboard<S>, data_dir: &Path) -> ExitCode {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    log::info!("session: started");
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                log::error!("session: stdin read failed: {error}");
                return ExitCode::FAILURE;
            }
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let args = match commands::split_command_line(line) {
            Ok(args) => args,
            Err(error) => {
                println!("{}", render(commands::err::<()>(&error)).0);
                continue;
            }
        };
        let parsed = match SessionLine::try_parse_from(args) {
            Ok(parsed) => parsed,
            Err(error) => {
                println!("{}", render(commands::err::<()>(error.to_string().trim())).0);
                continue;
            }
        };
        let (output, _) = match parsed.command {
            SessionCommand::Quit => break,
            SessionCommand::Dashboard(command) => dispatch(dash, command, data_dir).await,
            SessionCommand::Undo => render(commands::undo_impl(dash).await),
            SessionCommand::UndoNotice => render(commands::undo_from_notice_impl(dash).await),
            SessionCommand::Select { id } => render(commands::select_task_impl(dash, &id)),
            SessionCommand::Drag { id, edge } => render(commands::begin_drag_impl(dash, &id, edge)),
            SessionCommand::Frame { days } => render(commands::drag_frame_impl(dash, days)),
            SessionCommand::Release => render(commands::end_drag_impl(dash).await),
            SessionCommand::CancelDrag => render(commands::cancel_drag_impl(dash)),
            SessionCommand::Reload => render(commands::reload_impl(dash).await),
        };
        println!("{output}");
    }
    log::info!("session: ended");
    ExitCode::SUCCESS
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = match config::resolve_data_dir(cli.data_dir.as_deref()) {
        Ok(dir) => dir,
        Err(error) => {
            eprintln!("ont: {error}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(error) = logging::init_logging(&data_dir) {
        eprintln!("ont: logging disabled: {error}");
    }

    let store = FileStore::new(data_dir.clone());
    if let Err(error) = store.ensure_dirs().await {
        log::error!("startup: data dir unavailable dir={} err={error}", data_dir.display());
        eprintln!("ont: {error}");
        return ExitCode::FAILURE;
    }
    let dash = Dashboard::open(Gateway::new(store, Arc::new(SystemClock))).await;

    match cli.command {
        TopCommand::Dashboard(command) => {
            let (output, ok) = dispatch(&dash, command, &data_dir).await;
            println!("{output}");
            if ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        TopCommand::Session => run_session(&dash, &data_dir).await,
    }
}
