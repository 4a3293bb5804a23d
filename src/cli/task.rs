//! simplr task command implementations.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::category::Category;
use crate::cli::{
    parse_due, parse_instant, resolve_category_id, resolve_task_id, short_id, Clearable, Globals,
    Session,
};
use crate::error::{Error, Result, ScheduleError};
use crate::orchestrator::TaskOrchestrator;
use crate::output::{emit_success, HumanOutput};
use crate::task::{DueStatus, ListFilter, NewTask, Task, TaskEdit};

pub struct AddOptions {
    pub title: String,
    pub description: Option<String>,
    pub due: Option<String>,
    pub remind: Option<String>,
    pub category: Option<String>,
    pub checklist: Vec<String>,
    pub quick_list: Vec<String>,
    pub globals: Globals,
}

pub struct EditOptions {
    pub id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub due: Clearable,
    pub remind: Clearable,
    pub category: Clearable,
    pub checklist: Vec<String>,
    pub quick_list: Vec<String>,
    pub globals: Globals,
}

/// Task as shown to users: the stored record plus derived fields.
#[derive(Serialize)]
struct TaskView {
    #[serde(flatten)]
    task: Task,
    status: DueStatus,
    category: Category,
}

impl TaskView {
    fn build(orchestrator: &mut TaskOrchestrator, task: Task, now: &DateTime<Local>) -> Self {
        let category = orchestrator.resolve_category(task.category_id.as_deref());
        Self {
            status: task.due_status(now),
            task,
            category,
        }
    }

    fn line(&self) -> String {
        let mark = if self.task.completed { "x" } else { " " };
        let mut line = format!("[{mark}] {} ({})", self.task.title, short_id(&self.task.id));
        match (self.status, self.task.due_date) {
            (DueStatus::Overdue, _) => line.push_str(" · overdue"),
            (DueStatus::DueToday, _) => line.push_str(" · due today"),
            (DueStatus::Upcoming, Some(due)) => {
                line.push_str(&format!(" · due {}", due.with_timezone(&Local).format("%Y-%m-%d")))
            }
            _ => {}
        }
        if self.task.has_reminder {
            if let Some(reminder) = self.task.reminder_date {
                line.push_str(&format!(
                    " · reminder {}",
                    reminder.with_timezone(&Local).format("%Y-%m-%d %H:%M")
                ));
            }
        }
        line.push_str(&format!(" · {}", self.category.name));
        line
    }
}

#[derive(Serialize)]
struct TaskReport {
    profile: String,
    task: TaskView,
}

#[derive(Serialize)]
struct TasksReport {
    profile: String,
    tasks: Vec<TaskView>,
}

#[derive(Serialize)]
struct ListReport {
    profile: String,
    filter: ListFilter,
    total: usize,
    tasks: Vec<TaskView>,
}

#[derive(Serialize)]
struct DeleteReport {
    profile: String,
    deleted: String,
}

fn push_schedule_warnings(human: &mut HumanOutput, warnings: &[ScheduleError]) {
    for warning in warnings {
        human.push_warning(warning.to_string());
    }
}

fn parse_optional(
    raw: Option<&str>,
    now: DateTime<Utc>,
    parse: fn(&str, DateTime<Utc>) -> Result<DateTime<Utc>>,
) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| parse(value, now)).transpose()
}

fn clearable_time(
    value: &Clearable,
    now: DateTime<Utc>,
    parse: fn(&str, DateTime<Utc>) -> Result<DateTime<Utc>>,
) -> Result<Option<Option<DateTime<Utc>>>> {
    match value {
        Clearable::Keep => Ok(None),
        Clearable::Clear => Ok(Some(None)),
        Clearable::Set(raw) => parse(raw, now).map(|instant| Some(Some(instant))),
    }
}

pub async fn run_add(options: AddOptions) -> Result<()> {
    let mut session = Session::open(&options.globals)?;
    let orchestrator = &mut session.orchestrator;
    let now = orchestrator.now();

    let category_id = options
        .category
        .as_deref()
        .map(|raw| resolve_category_id(orchestrator, raw))
        .transpose()?;
    let new_task = NewTask {
        title: options.title,
        description: options.description.unwrap_or_default(),
        due_date: parse_optional(options.due.as_deref(), now, parse_due)?,
        reminder_date: parse_optional(options.remind.as_deref(), now, parse_instant)?,
        category_id,
        checklist: options.checklist,
        quick_list: options.quick_list,
    };

    let report = orchestrator.create(new_task)?;
    let task = report
        .task
        .ok_or_else(|| Error::OperationFailed("created task missing from store".to_string()))?;
    let view = TaskView::build(orchestrator, task, &now.with_timezone(&Local));

    let mut human = HumanOutput::new(format!("simplr task add: {}", view.task.title));
    human.push_summary("id", view.task.id.clone());
    human.push_summary("profile", orchestrator.profile().to_string());
    human.push_summary("category", view.category.name.clone());
    if let Some(reminder) = view.task.reminder_date {
        human.push_summary("reminder", reminder.to_rfc3339());
    }
    push_schedule_warnings(&mut human, &report.warnings);
    human.push_next_step("simplr task list");

    let data = TaskReport {
        profile: orchestrator.profile().to_string(),
        task: view,
    };
    emit_success(session.output, "task add", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_edit(options: EditOptions) -> Result<()> {
    let mut session = Session::open(&options.globals)?;
    let orchestrator = &mut session.orchestrator;
    let now = orchestrator.now();
    let task_id = resolve_task_id(orchestrator, &options.id)?;

    let category_id = match &options.category {
        Clearable::Keep => None,
        Clearable::Clear => Some(None),
        Clearable::Set(raw) => Some(Some(resolve_category_id(orchestrator, raw)?)),
    };
    let edit = TaskEdit {
        title: options.title,
        description: options.description,
        due_date: clearable_time(&options.due, now, parse_due)?,
        reminder_date: clearable_time(&options.remind, now, parse_instant)?,
        category_id,
        add_checklist: options.checklist,
        add_quick_list: options.quick_list,
    };
    if edit.is_empty() {
        return Err(Error::InvalidArgument("nothing to edit".to_string()));
    }

    let report = orchestrator.edit(&task_id, edit)?;
    let task = report
        .task
        .ok_or_else(|| Error::OperationFailed("edited task missing from store".to_string()))?;
    let view = TaskView::build(orchestrator, task, &now.with_timezone(&Local));

    let mut human = HumanOutput::new(format!("simplr task edit: {}", view.task.title));
    human.push_summary("id", view.task.id.clone());
    human.push_detail(view.line());
    push_schedule_warnings(&mut human, &report.warnings);

    let data = TaskReport {
        profile: orchestrator.profile().to_string(),
        task: view,
    };
    emit_success(session.output, "task edit", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_set_completed(ids: Vec<String>, completed: bool, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let now = orchestrator.now().with_timezone(&Local);
    let command = if completed { "task done" } else { "task undo" };

    let mut human = HumanOutput::new(format!("simplr {command}"));
    let mut views = Vec::with_capacity(ids.len());
    for raw in &ids {
        let task_id = resolve_task_id(orchestrator, raw)?;
        let report = orchestrator.set_completed(&task_id, completed)?;
        push_schedule_warnings(&mut human, &report.warnings);
        if let Some(task) = report.task {
            views.push(TaskView::build(orchestrator, task, &now));
        }
    }
    for view in &views {
        human.push_detail(view.line());
    }
    human.push_summary("tasks", views.len().to_string());

    let data = TasksReport {
        profile: orchestrator.profile().to_string(),
        tasks: views,
    };
    emit_success(session.output, command, &data, Some(&human))?;
    session.finish().await
}

pub async fn run_rm(id: String, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let task_id = resolve_task_id(orchestrator, &id)?;
    let title = orchestrator.task(&task_id)?.title.clone();
    orchestrator.delete(&task_id)?;

    let mut human = HumanOutput::new(format!("simplr task rm: {title}"));
    human.push_summary("id", task_id.clone());
    let data = DeleteReport {
        profile: orchestrator.profile().to_string(),
        deleted: task_id,
    };
    emit_success(session.output, "task rm", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_move(id: String, position: usize, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let task_id = resolve_task_id(orchestrator, &id)?;
    if position == 0 || position > orchestrator.tasks().len() {
        return Err(Error::InvalidArgument(format!(
            "position must be between 1 and {}",
            orchestrator.tasks().len()
        )));
    }
    let from = orchestrator
        .tasks()
        .iter()
        .position(|task| task.id == task_id)
        .ok_or_else(|| Error::TaskNotFound(task_id.clone()))?;
    orchestrator.reorder(from, position - 1)?;

    let now = orchestrator.now().with_timezone(&Local);
    let tasks = orchestrator.tasks().to_vec();
    let views: Vec<TaskView> = tasks
        .into_iter()
        .map(|task| TaskView::build(orchestrator, task, &now))
        .collect();
    let mut human = HumanOutput::new(format!("simplr task move: position {position}"));
    for (index, view) in views.iter().enumerate() {
        human.push_detail(format!("{}. {}", index + 1, view.line()));
    }

    let data = TasksReport {
        profile: orchestrator.profile().to_string(),
        tasks: views,
    };
    emit_success(session.output, "task move", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_assign(category: String, ids: Vec<String>, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let category_id = if category.trim().eq_ignore_ascii_case("none") {
        None
    } else {
        Some(resolve_category_id(orchestrator, &category)?)
    };
    let task_ids = ids
        .iter()
        .map(|raw| resolve_task_id(orchestrator, raw))
        .collect::<Result<Vec<_>>>()?;

    let report = orchestrator.assign_category(&task_ids, category_id.as_deref())?;
    let now = orchestrator.now().with_timezone(&Local);
    let views: Vec<TaskView> = report
        .tasks
        .into_iter()
        .map(|task| TaskView::build(orchestrator, task, &now))
        .collect();

    let label = orchestrator.resolve_category(category_id.as_deref()).name;
    let mut human = HumanOutput::new(format!("simplr task assign: {label}"));
    human.push_summary("tasks", views.len().to_string());
    for view in &views {
        human.push_detail(view.line());
    }
    push_schedule_warnings(&mut human, &report.warnings);

    let data = TasksReport {
        profile: orchestrator.profile().to_string(),
        tasks: views,
    };
    emit_success(session.output, "task assign", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_list(filter: Option<String>, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let filter = match filter {
        Some(raw) => {
            let filter: ListFilter = raw.parse()?;
            orchestrator.set_filter(filter)?;
            filter
        }
        None => orchestrator.filter(),
    };

    let now = orchestrator.now().with_timezone(&Local);
    let total = orchestrator.tasks().len();
    let tasks: Vec<Task> = orchestrator
        .tasks()
        .iter()
        .filter(|task| filter.matches(task, &now))
        .cloned()
        .collect();
    let views: Vec<TaskView> = tasks
        .into_iter()
        .map(|task| TaskView::build(orchestrator, task, &now))
        .collect();

    let profile = orchestrator.profile();
    let mut human = HumanOutput::new(format!("simplr tasks ({})", profile.display_name()));
    human.push_summary("showing", format!("{} of {total}", views.len()));
    human.push_summary("filter", format!("{filter:?}").to_lowercase());
    for view in &views {
        human.push_detail(view.line());
    }
    if total == 0 {
        human.push_next_step("simplr task add \"<title>\"");
    }

    let data = ListReport {
        profile: profile.to_string(),
        filter,
        total,
        tasks: views,
    };
    emit_success(session.output, "task list", &data, Some(&human))?;
    session.finish().await
}

pub async fn run_check(id: String, item: String, quick: bool, globals: Globals) -> Result<()> {
    let mut session = Session::open(&globals)?;
    let orchestrator = &mut session.orchestrator;
    let task_id = resolve_task_id(orchestrator, &id)?;
    let task = orchestrator.task(&task_id)?;
    let item_ids: Vec<String> = if quick {
        task.quick_list.iter().map(|entry| entry.id.clone()).collect()
    } else {
        task.checklist.iter().map(|entry| entry.id.clone()).collect()
    };
    let item_id = resolve_item_id(&item_ids, &item)?;

    let report = if quick {
        orchestrator.toggle_quick_item(&task_id, &item_id)?
    } else {
        orchestrator.toggle_checklist_item(&task_id, &item_id)?
    };
    let task = report
        .task
        .ok_or_else(|| Error::OperationFailed("task missing from store".to_string()))?;

    let mut human = HumanOutput::new(format!("simplr task check: {}", task.title));
    let entries: Vec<(String, bool)> = if quick {
        task.quick_list
            .iter()
            .map(|entry| (entry.text.clone(), entry.completed))
            .collect()
    } else {
        task.checklist
            .iter()
            .map(|entry| (entry.text.clone(), entry.completed))
            .collect()
    };
    for (text, completed) in entries {
        let mark = if completed { "x" } else { " " };
        human.push_detail(format!("[{mark}] {text}"));
    }

    let now = orchestrator.now().with_timezone(&Local);
    let data = TaskReport {
        profile: orchestrator.profile().to_string(),
        task: TaskView::build(orchestrator, task, &now),
    };
    emit_success(session.output, "task check", &data, Some(&human))?;
    session.finish().await
}

/// Item by 1-based position, exact id, or unique id prefix.
fn resolve_item_id(item_ids: &[String], raw: &str) -> Result<String> {
    let raw = raw.trim();
    if let Ok(position) = raw.parse::<usize>() {
        return position
            .checked_sub(1)
            .and_then(|index| item_ids.get(index))
            .cloned()
            .ok_or_else(|| Error::InvalidArgument(format!("no item at position {position}")));
    }
    let matches: Vec<&String> = item_ids
        .iter()
        .filter(|id| id.as_str() == raw || id.starts_with(raw))
        .collect();
    match matches.as_slice() {
        [only] => Ok((*only).clone()),
        _ => Err(Error::InvalidArgument(format!("item not found: {raw}"))),
    }
}
