//! `monodo` command-line front-end.
//!
//! # Responsibility
//! - Expose task CRUD, export/import and the long-running reminder watcher.
//! - Keep all business rules inside `monodo_core`.

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use log::{info, warn};
use monodo_core::db::open_db;
use monodo_core::snapshot::{export_json, import_into, parse_snapshot};
use monodo_core::{
    core_version, deadline_progress, init_logging, now_epoch_ms, AlertBannerDispatcher,
    BackgroundWorker, Category, ChannelDispatcher, DeadlineScheduler, DispatchError,
    FallbackDispatcher, MonodoConfig, NewTaskRequest, Notification, NotificationAction,
    NotificationDispatcher, NotificationSettings, PermissionGate, SqliteTaskRepository, Task,
    TaskService, WorkerHandle,
};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

const MINUTE_MS: i64 = 60_000;

/// MonoDo: local-first to-do list with deadline reminders.
#[derive(Parser)]
#[command(name = "monodo", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Add a task.
    Add {
        title: String,
        /// Deadline, in minutes from now.
        #[arg(long = "in", value_name = "MINUTES")]
        in_minutes: Option<i64>,
        /// work, study, personal or urgent.
        #[arg(long, value_parser = parse_category)]
        category: Option<Category>,
        /// Reminder window and cadence, e.g. `30/10`.
        #[arg(
            long,
            value_name = "START/INTERVAL",
            value_parser = parse_remind,
            conflicts_with = "no_remind"
        )]
        remind: Option<NotificationSettings>,
        /// Only the one-shot reminder shortly before the deadline.
        #[arg(long)]
        no_remind: bool,
    },
    /// List tasks in display order.
    List,
    /// Toggle completion of a task.
    Done { id: Uuid },
    /// Delete a task.
    Rm { id: Uuid },
    /// Write all tasks as JSON to a file or stdout.
    Export { file: Option<PathBuf> },
    /// Upsert tasks from a JSON export.
    Import { file: PathBuf },
    /// Run the reminder scheduler until Ctrl-C.
    Watch,
    /// Print the core version.
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Command::Version = cli.command {
        println!("monodo_core version={}", core_version());
        return Ok(());
    }

    let config = MonodoConfig::from_env()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating {}", config.data_dir.display()))?;
    init_logging(&config.log_level, &config.log_dir())?;

    match cli.command {
        Command::Add {
            title,
            in_minutes,
            category,
            remind,
            no_remind,
        } => {
            let now = now_epoch_ms();
            let mut request = NewTaskRequest::titled(title);
            if let Some(minutes) = in_minutes {
                request.deadline = Some(deadline_after(now, minutes)?);
            }
            if let Some(category) = category {
                request.category = category;
            }
            if let Some(settings) = remind {
                request.notification = settings;
            }
            if no_remind {
                request.notification.enabled = false;
            }
            add(&config, request, now)
        }
        Command::List => list(&config),
        Command::Done { id } => toggle(&config, id),
        Command::Rm { id } => remove(&config, id),
        Command::Export { file } => export(&config, file),
        Command::Import { file } => import(&config, file),
        Command::Watch => watch(config),
        Command::Version => Ok(()),
    }
}

fn add(config: &MonodoConfig, request: NewTaskRequest, now: i64) -> anyhow::Result<()> {
    let conn = open_db(config.db_path())?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);
    let task = service.create_task(request, now)?;
    info!("event=cli_add module=cli status=ok task_id={}", task.id);
    println!("{}", task.id);
    Ok(())
}

fn list(config: &MonodoConfig) -> anyhow::Result<()> {
    let conn = open_db(config.db_path())?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);
    let now = now_epoch_ms();

    for task in service.sorted_for_display() {
        println!("{}", render_task(&task, now));
    }
    let stats = service.completion_stats();
    println!(
        "{}/{} done ({}%)",
        stats.completed, stats.total, stats.percent
    );
    Ok(())
}

fn toggle(config: &MonodoConfig, id: Uuid) -> anyhow::Result<()> {
    let conn = open_db(config.db_path())?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);
    let task = service.toggle_task(id, now_epoch_ms())?;
    println!("{} completed={}", task.id, task.completed);
    Ok(())
}

fn remove(config: &MonodoConfig, id: Uuid) -> anyhow::Result<()> {
    let conn = open_db(config.db_path())?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);
    service.delete_task(id)?;
    Ok(())
}

fn export(config: &MonodoConfig, file: Option<PathBuf>) -> anyhow::Result<()> {
    let conn = open_db(config.db_path())?;
    let service = TaskService::new(SqliteTaskRepository::try_new(&conn)?);
    let text = export_json(&service.list_tasks())?;
    match file {
        Some(path) => std::fs::write(&path, text)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}

fn import(config: &MonodoConfig, file: PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
    let tasks = parse_snapshot(&text)?;
    let conn = open_db(config.db_path())?;
    let count = import_into(&SqliteTaskRepository::try_new(&conn)?, &tasks)?;
    info!("event=cli_import module=cli status=ok count={count}");
    println!("imported {count} tasks");
    Ok(())
}

fn watch(config: MonodoConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let conn = open_db(config.db_path())?;

        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (worker, worker_join) = BackgroundWorker::new(client_tx).spawn();
        let surfaces = FallbackDispatcher::new()
            .with_surface(ChannelDispatcher::new(worker.sender()))
            .with_surface(AlertBannerDispatcher::new());
        let terminal = TerminalSurface::new(std::io::stdout(), surfaces);
        let dispatcher = PermissionGate::new(config.notification_permission, terminal);

        let scheduler = DeadlineScheduler::new(conn, dispatcher)
            .with_language(config.language)
            .with_tick_interval(config.tick_interval)
            .with_client_messages(client_rx);
        let (handle, scheduler_join) = scheduler.spawn();
        info!("event=cli_watch module=cli status=start");

        println!("watching for deadlines; reply `done|snooze|open <task-id>`, Ctrl-C to stop");
        let mut replies = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                result = &mut ctrl_c => {
                    result?;
                    break;
                }
                line = replies.next_line(), if stdin_open => match line? {
                    Some(line) => relay_reply(&worker, &line),
                    None => stdin_open = false,
                },
            }
        }

        handle.shutdown();
        scheduler_join.await?;
        worker.shutdown();
        worker_join.await?;
        info!("event=cli_watch module=cli status=stopped");
        Ok::<(), anyhow::Error>(())
    })
}

/// Prints every reminder, then hands it to the interactive surfaces.
struct TerminalSurface<W, D> {
    out: W,
    inner: D,
}

impl<W, D> TerminalSurface<W, D> {
    fn new(out: W, inner: D) -> Self {
        Self { out, inner }
    }
}

impl<W, D> NotificationDispatcher for TerminalSurface<W, D>
where
    W: Write + Send,
    D: NotificationDispatcher,
{
    fn deliver(&mut self, notification: &Notification) -> Result<(), DispatchError> {
        writeln!(self.out, "{}", render_notification(notification))
            .and_then(|()| self.out.flush())
            .map_err(|err| DispatchError::Unavailable(err.to_string()))?;
        self.inner.deliver(notification)
    }
}

fn render_notification(notification: &Notification) -> String {
    let buttons = notification
        .buttons
        .iter()
        .map(|button| button.label.as_str())
        .collect::<Vec<_>>()
        .join(" / ");
    format!(
        "* {}: {} [{}] ({buttons})",
        notification.title, notification.body, notification.correlation_id
    )
}

fn relay_reply(worker: &WorkerHandle, line: &str) {
    match parse_reply(line) {
        Ok(None) => {}
        Ok(Some((action, task_id))) => {
            if !worker.interact(task_id, action) {
                warn!("event=cli_reply module=cli status=dropped reason=worker_gone task_id={task_id}");
            }
        }
        Err(err) => eprintln!("monodo: {err}"),
    }
}

/// Parses `done|snooze|open <task-id>`; blank lines yield `None`.
fn parse_reply(line: &str) -> anyhow::Result<Option<(NotificationAction, Uuid)>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let action = match verb {
        "done" => NotificationAction::Complete,
        "snooze" => NotificationAction::Snooze,
        "open" => NotificationAction::Focus,
        other => return Err(anyhow!("unknown reply `{other}`; expected done|snooze|open")),
    };
    let raw_id = words
        .next()
        .ok_or_else(|| anyhow!("`{verb}` needs a task id"))?;
    let task_id = Uuid::parse_str(raw_id).with_context(|| format!("invalid task id `{raw_id}`"))?;
    Ok(Some((action, task_id)))
}

fn parse_category(value: &str) -> Result<Category, String> {
    Category::parse(value).ok_or_else(|| {
        format!("unknown category `{value}`; expected work|study|personal|urgent")
    })
}

fn parse_remind(value: &str) -> Result<NotificationSettings, String> {
    let (start, interval) = value
        .split_once('/')
        .ok_or_else(|| format!("expected <start>/<interval>, got `{value}`"))?;
    let minutes = |raw: &str| match raw.trim().parse::<u32>() {
        Ok(0) | Err(_) => Err(format!("`{raw}` is not a positive number of minutes")),
        Ok(minutes) => Ok(minutes),
    };
    Ok(NotificationSettings {
        enabled: true,
        start_before_minutes: minutes(start)?,
        interval_minutes: minutes(interval)?,
    })
}

fn deadline_after(now: i64, minutes: i64) -> anyhow::Result<i64> {
    minutes
        .checked_mul(MINUTE_MS)
        .and_then(|offset| now.checked_add(offset))
        .ok_or_else(|| anyhow!("--in {minutes} is out of range"))
}

fn render_task(task: &Task, now: i64) -> String {
    let mark = if task.completed { "x" } else { " " };
    let category = task.category.map(Category::as_str).unwrap_or("-");
    let due = match (task.deadline, deadline_progress(task, now)) {
        (Some(deadline), Some(progress)) => {
            let minutes_left = deadline.saturating_sub(now) / MINUTE_MS;
            format!(" due_in={minutes_left}m elapsed={progress}%")
        }
        _ => String::new(),
    };
    format!("[{mark}] {} {} ({category}){due}", task.id, task.title)
}

#[cfg(test)]
mod tests {
    use super::{
        deadline_after, parse_remind, parse_reply, render_notification, Cli, Command,
        TerminalSurface, MINUTE_MS,
    };
    use clap::Parser;
    use monodo_core::{
        Category, DueNotification, Language, Notification, NotificationAction,
        NotificationDispatcher, NotificationKind, Task,
    };
    use uuid::Uuid;

    fn reminder(title: &str) -> Notification {
        let due = DueNotification {
            task: Task::new(title, 0),
            kind: NotificationKind::Configured,
        };
        Notification::for_due(&due, Language::En.strings())
    }

    #[derive(Default)]
    struct Counting {
        delivered: usize,
    }

    impl NotificationDispatcher for Counting {
        fn deliver(
            &mut self,
            _: &Notification,
        ) -> Result<(), monodo_core::DispatchError> {
            self.delivered += 1;
            Ok(())
        }
    }

    #[test]
    fn add_parses_flags() {
        let cli = Cli::try_parse_from([
            "monodo", "add", "write report", "--in", "90", "--category", "work", "--remind",
            "45/15",
        ])
        .unwrap();
        match cli.command {
            Command::Add {
                title,
                in_minutes,
                category,
                remind,
                no_remind,
            } => {
                assert_eq!(title, "write report");
                assert_eq!(in_minutes, Some(90));
                assert_eq!(category, Some(Category::Work));
                let remind = remind.unwrap();
                assert_eq!((remind.start_before_minutes, remind.interval_minutes), (45, 15));
                assert!(!no_remind);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn add_rejects_bad_values() {
        assert!(Cli::try_parse_from(["monodo", "add", "x", "--category", "chores"]).is_err());
        assert!(Cli::try_parse_from(["monodo", "add", "x", "--remind", "30"]).is_err());
        assert!(
            Cli::try_parse_from(["monodo", "add", "x", "--remind", "30/10", "--no-remind"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["monodo", "done", "not-a-uuid"]).is_err());
    }

    #[test]
    fn remind_requires_positive_minutes() {
        assert!(parse_remind("0/10").is_err());
        assert!(parse_remind("30/-1").is_err());
        assert!(parse_remind(" 30 / 10 ").unwrap().enabled);
    }

    #[test]
    fn deadline_after_rejects_overflow() {
        assert_eq!(deadline_after(1_000, 2).unwrap(), 1_000 + 2 * MINUTE_MS);
        assert!(deadline_after(1_000, i64::MAX / 2).is_err());
        assert!(deadline_after(i64::MAX - 10, 1).is_err());
    }

    #[test]
    fn replies_map_to_actions() {
        let id = Uuid::new_v4();
        assert_eq!(
            parse_reply(&format!("done {id}")).unwrap(),
            Some((NotificationAction::Complete, id))
        );
        assert_eq!(
            parse_reply(&format!("  open {id} ")).unwrap(),
            Some((NotificationAction::Focus, id))
        );
        assert_eq!(parse_reply("   ").unwrap(), None);
        assert!(parse_reply("done").is_err());
        assert!(parse_reply(&format!("delete {id}")).is_err());
    }

    #[test]
    fn terminal_surface_prints_and_forwards() {
        let notification = reminder("water plants");
        let mut surface = TerminalSurface::new(Vec::new(), Counting::default());
        surface.deliver(&notification).unwrap();

        let printed = String::from_utf8(surface.out.clone()).unwrap();
        assert_eq!(printed.trim_end(), render_notification(&notification));
        assert!(printed.contains("water plants"));
        assert!(printed.contains(&notification.correlation_id.to_string()));
        assert_eq!(surface.inner.delivered, 1);
    }
}
