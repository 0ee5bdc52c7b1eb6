//! Server-rendered HTML pages: task lists, calendar, detail, forms.

use axum::{
    extract::{Form, Path, Query, State},
    http::{header, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use super::origin::same_origin;
use super::{AppState, AuthUser};
use crate::bucket::{bucket, View};
use crate::calendar::{timeline_for_day, Month};
use crate::display::{
    format_date, format_long_date, format_time, format_time_or_all_day, preview, priority_label,
};
use crate::error::{Error, Result, ValidationError};
use crate::models::{opt_date, opt_time, Registration, Subtask, Task, TaskFields, TaskUpdate};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/calendar", get(calendar))
        .route("/register", get(register_form).post(register))
        .route("/tasks/new", get(new_task_form).post(create_task))
        .route("/tasks/:id", get(task_detail))
        .route("/tasks/:id/edit", get(edit_task_form).post(edit_task))
        .route("/tasks/:id/complete", post(toggle_task_completed))
        .route("/tasks/:id/archive", post(toggle_task_archived))
        .route("/tasks/:id/delete", post(delete_task))
        .route("/tasks/:id/subtasks", post(add_subtask))
        .route("/subtasks/:id/complete", post(toggle_subtask_completed))
        .route("/subtasks/:id/archive", post(toggle_subtask_archived))
        .route("/subtasks/:id/delete", post(delete_subtask))
        .route_layer(middleware::from_fn(same_origin))
}

#[derive(Deserialize)]
struct IndexQuery {
    #[serde(default)]
    view: Option<String>,
    #[serde(default)]
    notice: Option<String>,
}

#[derive(Deserialize)]
struct CalendarQuery {
    #[serde(default)]
    month: Option<String>,
    #[serde(default)]
    day: Option<String>,
}

/// Raw task form input; every field arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
struct TaskForm {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    completed: Option<String>,
    #[serde(default)]
    archived: Option<String>,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    due_date: String,
    #[serde(default)]
    start_time: String,
    #[serde(default)]
    end_time: String,
}

impl TaskForm {
    fn from_fields(fields: &TaskFields) -> Self {
        let date = |d: Option<NaiveDate>| d.map(|d| d.format(opt_date::FORMAT).to_string());
        let time = |t: Option<chrono::NaiveTime>| t.map(|t| t.format(opt_time::FORMAT).to_string());
        let flag = |b: bool| b.then(|| "on".to_string());
        Self {
            title: fields.title.clone(),
            description: fields.description.clone().unwrap_or_default(),
            category: fields.category.clone().unwrap_or_default(),
            priority: flag(fields.priority),
            completed: flag(fields.completed),
            archived: flag(fields.archived),
            start_date: date(fields.start_date).unwrap_or_default(),
            due_date: date(fields.due_date).unwrap_or_default(),
            start_time: time(fields.start_time).unwrap_or_default(),
            end_time: time(fields.end_time).unwrap_or_default(),
        }
    }

    fn to_fields(&self) -> std::result::Result<TaskFields, ValidationError> {
        let fields = TaskFields {
            title: self.title.clone(),
            description: Some(self.description.clone()),
            category: Some(self.category.clone()),
            priority: self.priority.is_some(),
            completed: self.completed.is_some(),
            archived: self.archived.is_some(),
            start_date: parse_optional("start date", &self.start_date, opt_date::parse)?,
            due_date: parse_optional("due date", &self.due_date, opt_date::parse)?,
            start_time: parse_optional("start time", &self.start_time, opt_time::parse)?,
            end_time: parse_optional("end time", &self.end_time, opt_time::parse)?,
        }
        .normalized();
        fields.validate()?;
        Ok(fields)
    }
}

fn parse_optional<T, E>(
    field: &'static str,
    text: &str,
    parse: impl Fn(&str) -> std::result::Result<T, E>,
) -> std::result::Result<Option<T>, ValidationError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    parse(text).map(Some).map_err(|_| ValidationError::Unparseable {
        field,
        value: text.to_string(),
    })
}

#[derive(Deserialize)]
struct RegisterForm {
    username: String,
    password: String,
    confirm_password: String,
}

async fn index(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<IndexQuery>,
) -> Result<Html<String>> {
    let user_id = user.id;
    let tasks = state.with_db_blocking(move |db, _| db.list_tasks(user_id)).await?;
    let view = match query.view.as_deref() {
        Some("archived") => View::Archived,
        _ => View::Active,
    };
    let today = Local::now().date_naive();
    let buckets = bucket(&tasks, today, view);

    let mut body = String::from(
        r#"<div class="page-header">
  <h1>Your Tasks</h1>
  <div class="subtitle">Organize with ease, accomplish with zen</div>
  <a class="button" href="/tasks/new">+ Add New Task</a>
</div>
"#,
    );

    if let Some(notice) = query.notice.as_deref().and_then(notice_text) {
        body.push_str(&format!(r#"<div class="notice">{notice}</div>"#));
    }

    if view == View::Active {
        if !buckets.overdue.is_empty() {
            body.push_str(&task_section("Overdue", "overdue", &buckets.overdue));
        }
        if !buckets.upcoming.is_empty() {
            body.push_str(&task_section("Upcoming (next 7 days)", "upcoming", &buckets.upcoming));
        }
    }

    let (all_title, toggle) = match view {
        View::Active => ("All Tasks", r#"<a href="/?view=archived">Show archived</a>"#),
        View::Archived => ("Archived Tasks", r#"<a href="/">Show active</a>"#),
    };
    if buckets.all.is_empty() {
        body.push_str(&format!(
            r#"<h2>{all_title}</h2><div class="toggle">{toggle}</div>
<div class="empty-state">
  <h3>No tasks found</h3>
  <p>Get started by adding your first task!</p>
</div>"#
        ));
    } else {
        body.push_str(&task_section(all_title, "all", &buckets.all));
        body.push_str(&format!(r#"<div class="toggle">{toggle}</div>"#));
    }

    Ok(page("Tasks", &user, &body))
}

fn notice_text(code: &str) -> Option<&'static str> {
    match code {
        "added" => Some("Task added successfully!"),
        "deleted" => Some("Task deleted."),
        "registered" => Some("Account created. Sign in with your new credentials."),
        _ => None,
    }
}

fn task_section(title: &str, class: &str, tasks: &[&Task]) -> String {
    let mut html = format!(
        r#"<h2>{title} <span class="count">{count}</span></h2>
<div class="todo-list {class}">
"#,
        title = html_escape(title),
        count = tasks.len(),
    );
    for task in tasks {
        html.push_str(&task_card(task));
    }
    html.push_str("</div>\n");
    html
}

fn task_card(task: &Task) -> String {
    let fields = &task.fields;
    let mut html = format!(
        r#"<div class="todo{done}">
  <div class="meta">
    <a class="title" href="/tasks/{id}">{title}</a>
"#,
        done = if fields.completed { " done" } else { "" },
        id = task.id,
        title = html_escape(&fields.title),
    );
    if let Some(description) = &fields.description {
        html.push_str(&format!(
            r#"    <div class="description">{}</div>
"#,
            html_escape(&preview(description))
        ));
    }
    if let Some(category) = &fields.category {
        html.push_str(&format!(
            r#"    <span class="category">{}</span>
"#,
            html_escape(category)
        ));
    }
    html.push_str(&format!(
        r#"    <div class="time">Created: {created}{due} · ID: {id}</div>
  </div>
  <div class="actions">
    {priority}
    {status}
    <form method="post" action="/tasks/{id}/complete"><button type="submit">{complete_label}</button></form>
    <form method="post" action="/tasks/{id}/archive"><button type="submit">{archive_label}</button></form>
    <form method="post" action="/tasks/{id}/delete" onsubmit="return confirm('Delete this task?')">
      <button class="delete" type="submit">Delete</button>
    </form>
  </div>
</div>
"#,
        created = format_date(Some(task.created_date)),
        due = fields
            .due_date
            .map(|d| format!(" · Due: {}", format_date(Some(d))))
            .unwrap_or_default(),
        id = task.id,
        priority = priority_badge(fields.priority),
        status = status_badge(fields),
        complete_label = if fields.completed { "Undo" } else { "Done" },
        archive_label = if fields.archived { "Unarchive" } else { "Archive" },
    ));
    html
}

fn priority_badge(priority: bool) -> String {
    format!(
        r#"<span class="status priority-{class}">{label}</span>"#,
        class = if priority { "high" } else { "low" },
        label = priority_label(priority),
    )
}

fn status_badge(fields: &TaskFields) -> &'static str {
    match (fields.completed, fields.archived) {
        (_, true) => r#"<span class="status archived">Archived</span>"#,
        (true, false) => r#"<span class="status done">Completed</span>"#,
        (false, false) => "",
    }
}

async fn calendar(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CalendarQuery>,
) -> Result<Html<String>> {
    let user_id = user.id;
    let tasks = state.with_db_blocking(move |db, _| db.list_tasks(user_id)).await?;
    let today = Local::now().date_naive();
    let month = match query.month.as_deref() {
        Some(text) if !text.trim().is_empty() => Month::parse(text)?,
        _ => Month::containing(today),
    };
    let selected = match query.day.as_deref() {
        Some(text) if !text.trim().is_empty() => Some(opt_date::parse(text.trim()).map_err(|_| {
            ValidationError::Unparseable {
                field: "day",
                value: text.to_string(),
            }
        })?),
        _ => None,
    };

    let mut body = format!(
        r#"<div class="page-header">
  <h1>Calendar</h1>
  <div class="subtitle">View your tasks by date</div>
  <a class="button" href="/tasks/new">+ Add New Task</a>
</div>
<div class="calendar-header">
  <a class="button secondary" href="/calendar?month={prev}">← Previous</a>
  <h2>{label}</h2>
  <a class="button secondary" href="/calendar?month={next}">Next →</a>
</div>
<a class="today-link" href="/calendar">Go to Today</a>
<table class="calendar">
  <thead><tr><th>Sun</th><th>Mon</th><th>Tue</th><th>Wed</th><th>Thu</th><th>Fri</th><th>Sat</th></tr></thead>
  <tbody>
"#,
        prev = month.previous().key(),
        next = month.next().key(),
        label = month.label(),
    );

    let cells = month.grid(&tasks);
    for week in cells.chunks(7) {
        body.push_str("    <tr>");
        for cell in week {
            match cell {
                None => body.push_str(r#"<td class="empty"></td>"#),
                Some(cell) => {
                    let mut classes = vec!["day"];
                    if cell.date == today {
                        classes.push("today");
                    }
                    if Some(cell.date) == selected {
                        classes.push("selected");
                    }
                    if cell.count > 0 {
                        classes.push("has-tasks");
                    }
                    let badge = if cell.count > 0 {
                        format!(r#"<span class="task-count">{}</span>"#, cell.count)
                    } else {
                        String::new()
                    };
                    body.push_str(&format!(
                        r#"<td class="{classes}"><a href="/calendar?month={month}&day={date}"><span class="day-number">{day}</span>{badge}</a></td>"#,
                        classes = classes.join(" "),
                        month = month.key(),
                        date = cell.date.format(opt_date::FORMAT),
                        day = cell.date.format("%-d"),
                    ));
                }
            }
        }
        // pad the final week
        for _ in week.len()..7 {
            body.push_str(r#"<td class="empty"></td>"#);
        }
        body.push_str("</tr>\n");
    }
    body.push_str("  </tbody>\n</table>\n");

    if let Some(day) = selected {
        body.push_str(&format!(
            r#"<div class="timeline">
  <h3>Tasks for {}</h3>
"#,
            format_long_date(day)
        ));
        let timeline = timeline_for_day(day, &tasks);
        if timeline.is_empty() {
            body.push_str(
                r#"  <div class="empty-state"><p>No tasks scheduled for this date.</p><a class="button" href="/tasks/new">Add a Task</a></div>
"#,
            );
        }
        for occurrence in timeline {
            let task = occurrence.task;
            body.push_str(&format!(
                r#"  <div class="timeline-item">
    <div class="timeline-time">{time}</div>
    <div class="meta">
      <a class="title" href="/tasks/{id}">{title}</a>
      <span class="status type-{kind_class}">{kind}</span> {priority}
      {description}
      {category}
    </div>
  </div>
"#,
                time = format_time_or_all_day(occurrence.time),
                id = task.id,
                title = html_escape(&task.fields.title),
                kind_class = occurrence.kind.label().to_lowercase(),
                kind = occurrence.kind.label(),
                priority = priority_badge(task.fields.priority),
                description = task
                    .fields
                    .description
                    .as_deref()
                    .map(|d| format!(r#"<div class="description">{}</div>"#, html_escape(&preview(d))))
                    .unwrap_or_default(),
                category = task
                    .fields
                    .category
                    .as_deref()
                    .map(|c| format!(r#"<span class="category">{}</span>"#, html_escape(c)))
                    .unwrap_or_default(),
            ));
        }
        body.push_str("</div>\n");
    }

    Ok(page("Calendar", &user, &body))
}

async fn task_detail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Html<String>> {
    let (task, subtasks) = task_with_subtasks(&state, user.id, id).await?;
    Ok(detail_page(&user, &task, &subtasks, &TaskForm::default(), None))
}

async fn task_with_subtasks(state: &AppState, user_id: i64, id: i64) -> Result<(Task, Vec<Subtask>)> {
    state
        .with_db_blocking(move |db, _| Ok((db.get_task(user_id, id)?, db.subtasks_for_task(user_id, id)?)))
        .await
}

fn detail_page(
    user: &AuthUser,
    task: &Task,
    subtasks: &[Subtask],
    subtask_form: &TaskForm,
    error: Option<&str>,
) -> Html<String> {
    let fields = &task.fields;
    let schedule = |date: Option<NaiveDate>, time: Option<chrono::NaiveTime>| match (date, time) {
        (None, _) => "Not set".to_string(),
        (Some(d), None) => format_date(Some(d)),
        (Some(d), Some(t)) => format!("{} at {}", format_date(Some(d)), format_time(t)),
    };
    let mut body = format!(
        r#"<div class="page-header">
  <h1>{title}</h1>
  <div class="actions">
    {priority} {status}
    <a class="button secondary" href="/tasks/{id}/edit">Edit</a>
    <form method="post" action="/tasks/{id}/delete" onsubmit="return confirm('Delete this task and its subtasks?')">
      <button class="delete" type="submit">Delete</button>
    </form>
  </div>
</div>
<dl class="details">
  <dt>Description</dt><dd>{description}</dd>
  <dt>Category</dt><dd>{category}</dd>
  <dt>Created</dt><dd>{created}</dd>
  <dt>Starts</dt><dd>{starts}</dd>
  <dt>Due</dt><dd>{due}</dd>
</dl>
<h2>Subtasks <span class="count">{count}</span></h2>
<div class="todo-list">
"#,
        title = html_escape(&fields.title),
        priority = priority_badge(fields.priority),
        status = status_badge(fields),
        id = task.id,
        description = fields.description.as_deref().map(html_escape).unwrap_or_else(|| "No description".into()),
        category = fields.category.as_deref().map(html_escape).unwrap_or_else(|| "None".into()),
        created = format_date(Some(task.created_date)),
        starts = schedule(fields.start_date, fields.start_time),
        due = schedule(fields.due_date, fields.end_time),
        count = subtasks.len(),
    );

    if subtasks.is_empty() {
        body.push_str(r#"<div class="subtitle">No subtasks yet.</div>"#);
    }
    for subtask in subtasks {
        let sf = &subtask.fields;
        body.push_str(&format!(
            r#"<div class="todo{done}">
  <div class="meta">
    <div class="title">{title}</div>
    {description}
    <div class="time">{due}</div>
  </div>
  <div class="actions">
    {priority} {status}
    <form method="post" action="/subtasks/{id}/complete"><button type="submit">{complete_label}</button></form>
    <form method="post" action="/subtasks/{id}/archive"><button type="submit">{archive_label}</button></form>
    <form method="post" action="/subtasks/{id}/delete" onsubmit="return confirm('Delete this subtask?')">
      <button class="delete" type="submit">Delete</button>
    </form>
  </div>
</div>
"#,
            done = if sf.completed { " done" } else { "" },
            title = html_escape(&sf.title),
            description = sf
                .description
                .as_deref()
                .map(|d| format!(r#"<div class="description">{}</div>"#, html_escape(&preview(d))))
                .unwrap_or_default(),
            due = sf
                .due_date
                .map(|d| format!("Due: {}", format_date(Some(d))))
                .unwrap_or_default(),
            priority = priority_badge(sf.priority),
            status = status_badge(sf),
            id = subtask.id,
            complete_label = if sf.completed { "Undo" } else { "Done" },
            archive_label = if sf.archived { "Unarchive" } else { "Archive" },
        ));
    }
    body.push_str("</div>\n<h3>Add Subtask</h3>\n");
    body.push_str(&task_form_html(
        &format!("/tasks/{}/subtasks", task.id),
        subtask_form,
        error,
        false,
        "Add Subtask",
    ));

    page(&fields.title, user, &body)
}

async fn new_task_form(user: AuthUser) -> Html<String> {
    new_task_page(&user, &TaskForm::default(), None)
}

fn new_task_page(user: &AuthUser, form: &TaskForm, error: Option<&str>) -> Html<String> {
    let body = format!(
        "<h1>Add New Task</h1>\n{}",
        task_form_html("/tasks/new", form, error, false, "Add Task")
    );
    page("Add Task", user, &body)
}

async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    Form(form): Form<TaskForm>,
) -> Result<Response> {
    let fields = match form.to_fields() {
        Ok(fields) => fields,
        Err(e) => return Ok(new_task_page(&user, &form, Some(&e.to_string())).into_response()),
    };
    let user_id = user.id;
    let task = state
        .with_db_blocking(move |db, _| db.add_task(user_id, &fields))
        .await?;
    tracing::info!(user = %user.username, task = task.id, "task added");
    Ok(redirect("/?notice=added"))
}

async fn edit_task_form(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Html<String>> {
    let user_id = user.id;
    let task = state.with_db_blocking(move |db, _| db.get_task(user_id, id)).await?;
    Ok(edit_task_page(&user, id, &TaskForm::from_fields(&task.fields), None))
}

fn edit_task_page(user: &AuthUser, id: i64, form: &TaskForm, error: Option<&str>) -> Html<String> {
    let body = format!(
        "<h1>Edit Task</h1>\n{}<a href=\"/tasks/{id}\">Cancel</a>",
        task_form_html(&format!("/tasks/{id}/edit"), form, error, true, "Save Changes")
    );
    page("Edit Task", user, &body)
}

async fn edit_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Form(form): Form<TaskForm>,
) -> Result<Response> {
    let fields = match form.to_fields() {
        Ok(fields) => fields,
        Err(e) => return Ok(edit_task_page(&user, id, &form, Some(&e.to_string())).into_response()),
    };
    let user_id = user.id;
    state
        .with_db_blocking(move |db, _| db.update_task(user_id, &TaskUpdate { id, fields }))
        .await?;
    tracing::debug!(user = %user.username, task = id, "task updated");
    Ok(redirect(&format!("/tasks/{id}")))
}

async fn toggle_task_completed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    toggle_task(&state, user.id, id, |fields| fields.completed = !fields.completed).await?;
    Ok(redirect("/"))
}

async fn toggle_task_archived(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    toggle_task(&state, user.id, id, |fields| fields.archived = !fields.archived).await?;
    Ok(redirect("/"))
}

async fn toggle_task(
    state: &AppState,
    user_id: i64,
    id: i64,
    flip: impl FnOnce(&mut TaskFields) + Send + 'static,
) -> Result<()> {
    state
        .with_db_blocking(move |db, _| {
            let mut update = TaskUpdate::from(db.get_task(user_id, id)?);
            flip(&mut update.fields);
            db.update_task(user_id, &update)?;
            Ok(())
        })
        .await
}

async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let user_id = user.id;
    state
        .with_db_blocking(move |db, _| db.delete_task(user_id, id))
        .await?;
    tracing::info!(user = %user.username, task = id, "task deleted");
    Ok(redirect("/?notice=deleted"))
}

async fn add_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i64>,
    Form(form): Form<TaskForm>,
) -> Result<Response> {
    let user_id = user.id;
    match form.to_fields() {
        Ok(fields) => {
            let subtask = state
                .with_db_blocking(move |db, _| db.add_subtask(user_id, task_id, &fields))
                .await?;
            tracing::info!(user = %user.username, task = task_id, subtask = subtask.id, "subtask added");
            Ok(redirect(&format!("/tasks/{task_id}")))
        }
        Err(e) => {
            let (task, subtasks) = task_with_subtasks(&state, user_id, task_id).await?;
            Ok(detail_page(&user, &task, &subtasks, &form, Some(&e.to_string())).into_response())
        }
    }
}

async fn toggle_subtask_completed(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let parent = toggle_subtask(&state, user.id, id, |fields| fields.completed = !fields.completed).await?;
    Ok(redirect(&format!("/tasks/{parent}")))
}

async fn toggle_subtask_archived(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let parent = toggle_subtask(&state, user.id, id, |fields| fields.archived = !fields.archived).await?;
    Ok(redirect(&format!("/tasks/{parent}")))
}

/// Flips a flag on a subtask and returns its parent task id.
async fn toggle_subtask(
    state: &AppState,
    user_id: i64,
    id: i64,
    flip: impl FnOnce(&mut TaskFields) + Send + 'static,
) -> Result<i64> {
    state
        .with_db_blocking(move |db, _| {
            let subtask = db.get_subtask(user_id, id)?;
            let parent = subtask.parent_task_id;
            let mut update = TaskUpdate::from(subtask);
            flip(&mut update.fields);
            db.update_subtask(user_id, &update)?;
            Ok(parent)
        })
        .await
}

async fn delete_subtask(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response> {
    let user_id = user.id;
    let parent = state
        .with_db_blocking(move |db, _| {
            let parent = db.get_subtask(user_id, id)?.parent_task_id;
            db.delete_subtask(user_id, id)?;
            Ok(parent)
        })
        .await?;
    Ok(redirect(&format!("/tasks/{parent}")))
}

async fn register_form() -> Html<String> {
    register_page("", None)
}

fn register_page(username: &str, error: Option<&str>) -> Html<String> {
    let body = format!(
        r#"<h1>Create Account</h1>
<div class="subtitle">Join us and start organizing your tasks</div>
{error}
<form class="stacked" method="post" action="/register">
  <label>Username <input type="text" name="username" value="{username}" minlength="3" required /></label>
  <label>Password <input type="password" name="password" minlength="6" required /></label>
  <label>Confirm Password <input type="password" name="confirm_password" required /></label>
  <button type="submit">Create Account</button>
</form>
<p>Already have an account? <a href="/">Sign in</a></p>"#,
        error = error_html(error),
        username = html_escape(username),
    );
    Html(layout("Register", None, &body))
}

async fn register(State(state): State<AppState>, Form(form): Form<RegisterForm>) -> Result<Response> {
    let registration = Registration::new(&form.username, &form.password);
    if let Err(e) = registration.validate_confirmed(&form.confirm_password) {
        return Ok(register_page(&form.username, Some(&e.to_string())).into_response());
    }
    let username = registration.username.clone();
    let result = state
        .with_db_blocking(move |db, cost| db.register_user(&registration, cost))
        .await;
    match result {
        Ok(_) => {
            tracing::info!(%username, "user registered");
            Ok(redirect("/?notice=registered"))
        }
        Err(e @ Error::UsernameTaken(_)) => Ok(register_page(&username, Some(&e.to_string())).into_response()),
        Err(e) => Err(e),
    }
}

fn task_form_html(action: &str, form: &TaskForm, error: Option<&str>, with_status: bool, submit: &str) -> String {
    let checked = |flag: &Option<String>| if flag.is_some() { " checked" } else { "" };
    let status = if with_status {
        format!(
            r#"  <label class="inline"><input type="checkbox" name="completed"{} /> Completed</label>
  <label class="inline"><input type="checkbox" name="archived"{} /> Archived</label>
"#,
            checked(&form.completed),
            checked(&form.archived),
        )
    } else {
        String::new()
    };
    format!(
        r#"{error}
<form class="stacked" method="post" action="{action}">
  <label>Title <input type="text" name="title" value="{title}" required /></label>
  <label>Description <textarea name="description" rows="3">{description}</textarea></label>
  <label>Category <input type="text" name="category" value="{category}" /></label>
  <label class="inline"><input type="checkbox" name="priority"{priority} /> High priority</label>
  <div class="row">
    <label>Start date <input type="date" name="start_date" value="{start_date}" /></label>
    <label>Start time <input type="time" name="start_time" value="{start_time}" /></label>
  </div>
  <div class="row">
    <label>Due date <input type="date" name="due_date" value="{due_date}" /></label>
    <label>End time <input type="time" name="end_time" value="{end_time}" /></label>
  </div>
{status}  <button type="submit">{submit}</button>
</form>
"#,
        error = error_html(error),
        action = action,
        title = html_escape(&form.title),
        description = html_escape(&form.description),
        category = html_escape(&form.category),
        priority = checked(&form.priority),
        start_date = html_escape(&form.start_date),
        start_time = html_escape(&form.start_time),
        due_date = html_escape(&form.due_date),
        end_time = html_escape(&form.end_time),
        status = status,
        submit = submit,
    )
}

fn error_html(error: Option<&str>) -> String {
    error
        .map(|e| format!(r#"<div class="error">{}</div>"#, html_escape(e)))
        .unwrap_or_default()
}

fn page(title: &str, user: &AuthUser, body: &str) -> Html<String> {
    Html(layout(title, Some(&user.username), body))
}

fn layout(title: &str, username: Option<&str>, body: &str) -> String {
    let nav = match username {
        Some(name) => format!(
            r#"<nav><a href="/">Tasks</a><a href="/calendar">Calendar</a><a href="/tasks/new">Add Task</a><span class="user">{}</span></nav>"#,
            html_escape(name)
        ),
        None => r#"<nav><a href="/">Sign in</a><a href="/register">Register</a></nav>"#.to_string(),
    };
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title} · taskboard</title>
  <style>{STYLE}</style>
</head>
<body>
  <div class="app">
    {nav}
    {body}
  </div>
</body>
</html>"#,
        title = html_escape(title),
    )
}

const STYLE: &str = r#"
    :root { color-scheme: light; font-family: "Inter", system-ui, -apple-system, sans-serif; background: #f4f5f7; }
    body { margin: 0; padding: 32px; display: flex; justify-content: center; }
    .app { width: min(880px, 100%); background: #ffffff; border-radius: 16px; box-shadow: 0 24px 48px rgba(15, 23, 42, 0.08); padding: 28px; }
    nav { display: flex; gap: 16px; margin-bottom: 24px; align-items: center; }
    nav .user { margin-left: auto; color: #64748b; }
    a { color: #111827; }
    h1 { margin: 0 0 8px 0; font-size: 28px; letter-spacing: -0.02em; }
    h2 .count { font-size: 14px; color: #64748b; }
    .subtitle { color: #64748b; margin-bottom: 16px; }
    .page-header { margin-bottom: 24px; }
    .button, button { display: inline-block; border: none; border-radius: 10px; padding: 10px 14px; background: #111827; color: white; font-weight: 600; cursor: pointer; text-decoration: none; }
    .button.secondary { background: #e2e8f0; color: #0f172a; }
    .notice { background: #dcfce7; color: #166534; padding: 12px; border-radius: 10px; margin-bottom: 16px; }
    .error { background: #fee2e2; color: #991b1b; padding: 12px; border-radius: 10px; margin-bottom: 16px; }
    .todo-list { display: grid; gap: 12px; margin-bottom: 24px; }
    .todo { display: flex; align-items: center; justify-content: space-between; padding: 12px 16px; border-radius: 12px; background: #f8fafc; border: 1px solid #e2e8f0; }
    .overdue .todo { border-color: #fca5a5; }
    .todo.done .title { text-decoration: line-through; color: #94a3b8; }
    .meta { display: flex; flex-direction: column; gap: 4px; }
    .title { font-weight: 600; }
    .time, .description { font-size: 13px; color: #64748b; }
    .category { font-size: 12px; background: #e0e7ff; color: #3730a3; padding: 2px 8px; border-radius: 999px; width: fit-content; }
    .status { font-size: 12px; text-transform: uppercase; letter-spacing: 0.08em; color: #0f172a; background: #e2e8f0; padding: 4px 8px; border-radius: 999px; }
    .status.done { background: #dcfce7; color: #166534; }
    .status.archived { background: #fef9c3; color: #854d0e; }
    .status.priority-high { background: #fee2e2; color: #991b1b; }
    .actions { display: flex; gap: 8px; align-items: center; flex-wrap: wrap; }
    .actions form { margin: 0; }
    .actions button { background: #e2e8f0; color: #0f172a; padding: 8px 12px; }
    .actions button.delete, button.delete { background: #fee2e2; color: #991b1b; }
    form.stacked { display: flex; flex-direction: column; gap: 12px; margin-bottom: 24px; }
    form.stacked label { display: flex; flex-direction: column; gap: 4px; font-size: 14px; }
    form.stacked label.inline { flex-direction: row; align-items: center; gap: 8px; }
    form.stacked .row { display: flex; gap: 12px; }
    input[type="text"], input[type="password"], input[type="date"], input[type="time"], textarea { padding: 10px 12px; border-radius: 10px; border: 1px solid #e2e8f0; font-size: 15px; }
    .calendar-header { display: flex; justify-content: space-between; align-items: center; }
    table.calendar { width: 100%; border-collapse: collapse; margin: 16px 0 24px; table-layout: fixed; }
    table.calendar th { font-size: 12px; color: #64748b; padding: 6px; }
    table.calendar td { height: 64px; border: 1px solid #e2e8f0; vertical-align: top; }
    table.calendar td a { display: block; height: 100%; padding: 6px; text-decoration: none; }
    table.calendar td.today { background: #eff6ff; }
    table.calendar td.selected { outline: 2px solid #111827; }
    table.calendar td.empty { background: #f8fafc; }
    .task-count { float: right; background: #111827; color: white; border-radius: 999px; padding: 0 8px; font-size: 12px; }
    .timeline-item { display: flex; gap: 16px; padding: 12px 0; border-top: 1px solid #e2e8f0; }
    .timeline-time { width: 80px; font-weight: 600; color: #334155; }
    dl.details { display: grid; grid-template-columns: 120px 1fr; gap: 8px; }
    dl.details dt { color: #64748b; }
    dl.details dd { margin: 0; }
"#;

fn redirect(location: &str) -> Response {
    (StatusCode::SEE_OTHER, [(header::LOCATION, location.to_string())]).into_response()
}

fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_blank_inputs_are_absent() {
        let form = TaskForm {
            title: " Plan trip ".into(),
            description: "   ".into(),
            ..TaskForm::default()
        };
        let fields = form.to_fields().unwrap();
        assert_eq!(fields.title, "Plan trip");
        assert_eq!(fields.description, None);
        assert_eq!(fields.start_date, None);
        assert!(!fields.priority);
    }

    #[test]
    fn test_form_parses_dates_and_checkboxes() {
        let form = TaskForm {
            title: "Plan trip".into(),
            priority: Some("on".into()),
            start_date: "2024-03-01".into(),
            start_time: "09:00".into(),
            due_date: "2024-03-03".into(),
            ..TaskForm::default()
        };
        let fields = form.to_fields().unwrap();
        assert!(fields.priority);
        assert_eq!(fields.start_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(fields.start_time, chrono::NaiveTime::from_hms_opt(9, 0, 0));

        let back = TaskForm::from_fields(&fields);
        assert_eq!(back.start_date, "2024-03-01");
        assert_eq!(back.start_time, "09:00");
        assert_eq!(back.priority.as_deref(), Some("on"));
    }

    #[test]
    fn test_form_reports_validation_errors() {
        let form = TaskForm {
            title: "Plan trip".into(),
            start_date: "2024-03-05".into(),
            due_date: "2024-03-01".into(),
            ..TaskForm::default()
        };
        assert_eq!(form.to_fields(), Err(ValidationError::DueBeforeStart));

        let garbled = TaskForm {
            title: "Plan trip".into(),
            due_date: "soon".into(),
            ..TaskForm::default()
        };
        assert!(matches!(
            garbled.to_fields(),
            Err(ValidationError::Unparseable { field: "due date", .. })
        ));
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_task_card_escapes_title() {
        let task = Task {
            id: 3,
            created_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            fields: TaskFields::titled("<script>"),
        };
        let html = task_card(&task);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
