use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use taskboard::bucket::{bucket, View};
use taskboard::calendar::{timeline_for_day, Month};
use taskboard::client::{ApiClient, TaskStore};
use taskboard::config::{ClientConfig, ServerConfig};
use taskboard::display::{
    format_date, format_long_date, format_time, format_time_or_all_day, preview, priority_label,
};
use taskboard::models::{Task, TaskFields, TaskUpdate};
use taskboard::server;
use taskboard::session::{CredentialStore, SessionManager};

#[derive(Parser)]
#[command(name = "taskboard")]
#[command(about = "Personal task manager: server and command-line client")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    client: ClientConfig,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web server
    Serve(ServerConfig),

    /// Create an account and sign in with it
    Register {
        username: String,
        #[arg(long, env = "TASKBOARD_PASSWORD")]
        password: String,
    },

    /// Sign in and remember the credentials
    Login {
        username: String,
        #[arg(long, env = "TASKBOARD_PASSWORD")]
        password: String,
    },

    /// Forget the stored credentials
    Logout,

    /// Show who is signed in
    Whoami,

    #[command(flatten)]
    Tasks(TaskCommands),
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List tasks
    List {
        /// Show archived tasks instead of active ones
        #[arg(long)]
        archived: bool,
    },

    /// Show overdue tasks and tasks due in the next 7 days
    Agenda,

    /// Show a month with task counts, and optionally one day's timeline
    Calendar {
        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long)]
        month: Option<String>,
        /// Day as YYYY-MM-DD whose timeline to show
        #[arg(long)]
        day: Option<NaiveDate>,
    },

    /// Show a task and its subtasks
    Show { id: i64 },

    /// Add a task
    Add {
        title: String,
        #[command(flatten)]
        details: DetailArgs,
    },

    /// Change a task
    Edit {
        id: i64,
        #[arg(short, long)]
        title: Option<String>,
        #[command(flatten)]
        details: DetailArgs,
    },

    /// Toggle a task's completed flag
    Done { id: i64 },

    /// Toggle a task's archived flag
    Archive { id: i64 },

    /// Delete a task and its subtasks
    Delete { id: i64 },

    /// Manage subtasks
    #[command(subcommand)]
    Subtask(SubtaskCommands),
}

#[derive(Subcommand)]
enum SubtaskCommands {
    /// Add a subtask under a task
    Add {
        task_id: i64,
        title: String,
        #[command(flatten)]
        details: DetailArgs,
    },
    /// List a task's subtasks
    List { task_id: i64 },
    /// Toggle a subtask's completed flag
    Done { id: i64 },
    /// Delete a subtask
    Delete { id: i64 },
}

/// Optional task fields shared by add and edit.
#[derive(Args)]
struct DetailArgs {
    #[arg(short, long)]
    description: Option<String>,
    #[arg(short, long)]
    category: Option<String>,
    /// Mark as high priority
    #[arg(long, conflicts_with = "low")]
    high: bool,
    /// Mark as low priority
    #[arg(long)]
    low: bool,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Due date (YYYY-MM-DD)
    #[arg(long)]
    due: Option<NaiveDate>,
    /// Start time (HH:MM)
    #[arg(long, value_parser = parse_time)]
    start_time: Option<NaiveTime>,
    /// End time (HH:MM)
    #[arg(long, value_parser = parse_time)]
    end_time: Option<NaiveTime>,
}

impl DetailArgs {
    fn apply(self, fields: &mut TaskFields) {
        if let Some(description) = self.description {
            fields.description = Some(description);
        }
        if let Some(category) = self.category {
            fields.category = Some(category);
        }
        if self.high {
            fields.priority = true;
        }
        if self.low {
            fields.priority = false;
        }
        fields.start_date = self.start.or(fields.start_date);
        fields.due_date = self.due.or(fields.due_date);
        fields.start_time = self.start_time.or(fields.start_time);
        fields.end_time = self.end_time.or(fields.end_time);
    }
}

fn parse_time(text: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(text, "%H:%M").map_err(|e| format!("expected HH:MM: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("taskboard=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let api = ApiClient::new(&cli.client.server)?;
    let mut session = SessionManager::restore(CredentialStore::new(cli.client.session_path()));

    match cli.command {
        Commands::Serve(config) => {
            server::serve(&config)
                .await
                .with_context(|| format!("serving on {}", config.bind))?;
        }
        Commands::Register { username, password } => {
            session
                .register(&api, &username, &password)
                .await
                .context("Registration failed")?;
            println!("Registered and signed in as {}", username.trim());
        }
        Commands::Login { username, password } => {
            let tasks = session.login(&api, &username, &password).await?;
            println!("Signed in as {} ({} tasks)", username.trim(), tasks.len());
        }
        Commands::Logout => {
            session.logout()?;
            println!("Signed out");
        }
        Commands::Whoami => match session.user() {
            Some(user) => println!("{} @ {}", user.username, api.base_url()),
            None => println!("Not signed in"),
        },
        Commands::Tasks(command) => {
            let credentials = session.credentials().context("Run `taskboard login` first")?;
            run(api.tasks(credentials), command).await?;
        }
    }

    Ok(())
}

async fn run(store: TaskStore<'_>, command: TaskCommands) -> Result<()> {
    match command {
        TaskCommands::List { archived } => {
            let tasks = store.list().await?;
            let view = if archived { View::Archived } else { View::Active };
            let buckets = bucket(&tasks, today(), view);
            if buckets.all.is_empty() {
                println!("No tasks found");
            }
            for task in buckets.all {
                print_task_line(task);
            }
        }
        TaskCommands::Agenda => {
            let tasks = store.list().await?;
            let buckets = bucket(&tasks, today(), View::Active);
            println!("Overdue ({}):", buckets.overdue.len());
            for task in buckets.overdue {
                print_task_line(task);
            }
            println!("\nUpcoming ({}):", buckets.upcoming.len());
            for task in buckets.upcoming {
                print_task_line(task);
            }
        }
        TaskCommands::Calendar { month, day } => {
            let tasks = store.list().await?;
            let month = match (month, day) {
                (Some(text), _) => Month::parse(&text)?,
                (None, Some(day)) => Month::containing(day),
                (None, None) => Month::containing(today()),
            };
            print_month(month, &tasks);
            if let Some(day) = day {
                println!("\nTasks for {}", format_long_date(day));
                let timeline = timeline_for_day(day, &tasks);
                if timeline.is_empty() {
                    println!("  No tasks scheduled for this date.");
                }
                for occurrence in timeline {
                    println!(
                        "  {:>8}  {:<6} #{} {}",
                        format_time_or_all_day(occurrence.time),
                        occurrence.kind.label(),
                        occurrence.task.id,
                        occurrence.task.fields.title
                    );
                }
            }
        }
        TaskCommands::Show { id } => {
            let task = store.get(id).await?;
            let subtasks = store.subtasks(id).await?;
            let fields = &task.fields;
            println!("#{} {} [{}]", task.id, fields.title, priority_label(fields.priority));
            if let Some(description) = &fields.description {
                println!("  {description}");
            }
            if let Some(category) = &fields.category {
                println!("  Category: {category}");
            }
            println!("  Created: {}", format_date(Some(task.created_date)));
            println!(
                "  Starts: {} {}",
                format_date(fields.start_date),
                fields.start_time.map(format_time).unwrap_or_default()
            );
            println!(
                "  Due: {} {}",
                format_date(fields.due_date),
                fields.end_time.map(format_time).unwrap_or_default()
            );
            println!("  Completed: {}  Archived: {}", fields.completed, fields.archived);
            println!("Subtasks ({}):", subtasks.len());
            for subtask in subtasks {
                println!(
                    "  [{}] #{} {}",
                    if subtask.fields.completed { "x" } else { " " },
                    subtask.id,
                    subtask.fields.title
                );
            }
        }
        TaskCommands::Add { title, details } => {
            let mut fields = TaskFields::titled(title);
            details.apply(&mut fields);
            let task = store.create(&fields.normalized()).await?;
            println!("Added task #{}", task.id);
        }
        TaskCommands::Edit { id, title, details } => {
            let mut update = TaskUpdate::from(store.get(id).await?);
            if let Some(title) = title {
                update.fields.title = title;
            }
            details.apply(&mut update.fields);
            update.fields = update.fields.normalized();
            store.update(&update).await?;
            println!("Updated task #{id}");
        }
        TaskCommands::Done { id } => {
            let mut update = TaskUpdate::from(store.get(id).await?);
            update.fields.completed = !update.fields.completed;
            let task = store.update(&update).await?;
            println!(
                "Task #{id} marked {}",
                if task.fields.completed { "completed" } else { "not completed" }
            );
        }
        TaskCommands::Archive { id } => {
            let mut update = TaskUpdate::from(store.get(id).await?);
            update.fields.archived = !update.fields.archived;
            let task = store.update(&update).await?;
            println!(
                "Task #{id} {}",
                if task.fields.archived { "archived" } else { "restored" }
            );
        }
        TaskCommands::Delete { id } => {
            store.delete(id).await?;
            println!("Deleted task #{id}");
        }
        TaskCommands::Subtask(command) => run_subtask(store, command).await?,
    }
    Ok(())
}

async fn run_subtask(store: TaskStore<'_>, command: SubtaskCommands) -> Result<()> {
    match command {
        SubtaskCommands::Add {
            task_id,
            title,
            details,
        } => {
            let mut fields = TaskFields::titled(title);
            details.apply(&mut fields);
            let subtask = store.create_subtask(task_id, &fields.normalized()).await?;
            println!("Added subtask #{} to task #{task_id}", subtask.id);
        }
        SubtaskCommands::List { task_id } => {
            for subtask in store.subtasks(task_id).await? {
                println!(
                    "[{}] #{} {}{}",
                    if subtask.fields.completed { "x" } else { " " },
                    subtask.id,
                    subtask.fields.title,
                    if subtask.fields.archived { " (archived)" } else { "" }
                );
            }
        }
        SubtaskCommands::Done { id } => {
            let mut update = TaskUpdate::from(store.get_subtask(id).await?);
            update.fields.completed = !update.fields.completed;
            store.update_subtask(&update).await?;
            println!("Toggled subtask #{id}");
        }
        SubtaskCommands::Delete { id } => {
            store.delete_subtask(id).await?;
            println!("Deleted subtask #{id}");
        }
    }
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn print_task_line(task: &Task) {
    let fields = &task.fields;
    let mut line = format!(
        "[{}] #{} {} ({})",
        if fields.completed { "x" } else { " " },
        task.id,
        fields.title,
        priority_label(fields.priority)
    );
    if let Some(due) = fields.due_date {
        line.push_str(&format!(" due {}", format_date(Some(due))));
    }
    if let Some(category) = &fields.category {
        line.push_str(&format!(" [{category}]"));
    }
    println!("{line}");
    if let Some(description) = &fields.description {
        println!("      {}", preview(description));
    }
}

fn print_month(month: Month, tasks: &[Task]) {
    println!("{:^35}", month.label());
    println!("  Sun  Mon  Tue  Wed  Thu  Fri  Sat");
    for week in month.grid(tasks).chunks(7) {
        let mut line = String::new();
        for cell in week {
            match cell {
                None => line.push_str("     "),
                Some(cell) => {
                    let marker = match cell.count {
                        0 => String::new(),
                        1..=9 => format!("*{}", cell.count),
                        _ => "*+".to_string(),
                    };
                    line.push_str(&format!(" {:>2}{:<2}", cell.date.day(), marker));
                }
            }
        }
        println!("{line}");
    }
}
