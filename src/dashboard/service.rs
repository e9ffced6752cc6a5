//! Item, project and task operations.
//!
//! Every function here is synchronous and takes `&DashboardDb`; handlers run
//! them inside `DbHandle::call`, so a whole check-then-write sequence holds
//! the connection lock for its duration.

use std::collections::BTreeMap;
use std::str::FromStr;

use super::db::{DashboardDb, Table};
use super::models::*;
use crate::errors::DashboardError;

const NAME_MIN: usize = 3;
const NAME_MAX: usize = 255;
const DESCRIPTION_MIN: usize = 10;
pub const DEFAULT_PROJECT_COLOR: &str = "#1976d2";

// ── Validation helpers ───────────────────────────────────────────────

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), DashboardError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(DashboardError::validation(format!("{} is required", field)));
    }
    if len < min || len > max {
        return Err(DashboardError::validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn check_description(value: &str) -> Result<(), DashboardError> {
    let len = value.chars().count();
    if len == 0 {
        return Err(DashboardError::validation("description is required"));
    }
    if len < DESCRIPTION_MIN {
        return Err(DashboardError::validation(format!(
            "description must be at least {} characters",
            DESCRIPTION_MIN
        )));
    }
    Ok(())
}

fn check_repo_url(value: &str) -> Result<(), DashboardError> {
    reqwest::Url::parse(value)
        .map(|_| ())
        .map_err(|e| DashboardError::validation(format!("repoUrl is not a valid URL: {}", e)))
}

/// Accepts `#RGB` and `#RRGGBB`.
fn check_color(value: &str) -> Result<(), DashboardError> {
    let valid = value
        .strip_prefix('#')
        .filter(|hex| hex.len() == 3 || hex.len() == 6)
        .is_some_and(|hex| hex.chars().all(|c| c.is_ascii_hexdigit()));
    if valid {
        Ok(())
    } else {
        Err(DashboardError::validation(format!(
            "color must be a hex color like #1976d2, got '{}'",
            value
        )))
    }
}

fn parse_enum<T: FromStr<Err = String>>(value: &str) -> Result<T, DashboardError> {
    T::from_str(value).map_err(DashboardError::Validation)
}

/// Trimmed value of an optional update field, if it is present and non-blank.
fn provided(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn ensure_name_free(
    db: &DashboardDb,
    table: Table,
    entity: &'static str,
    name: &str,
    exclude_id: Option<i64>,
) -> Result<(), DashboardError> {
    if db.name_taken(table, name, exclude_id)? {
        return Err(DashboardError::AlreadyExists { entity });
    }
    Ok(())
}

fn delete_live(db: &DashboardDb, table: Table, entity: &'static str, id: i64) -> Result<(), DashboardError> {
    if db.soft_delete(table, id)? {
        Ok(())
    } else {
        Err(DashboardError::not_found(entity, id))
    }
}

// ── Items ────────────────────────────────────────────────────────────

pub fn create_item(db: &DashboardDb, input: ItemCreateInput) -> Result<Item, DashboardError> {
    let name = input.name.trim();
    let description = input.description.trim();
    check_length("name", name, NAME_MIN, NAME_MAX)?;
    check_description(description)?;
    ensure_name_free(db, Table::Items, "Item", name, None)?;
    Ok(db.insert_item(name, description)?)
}

pub fn list_items(db: &DashboardDb) -> Result<Vec<Item>, DashboardError> {
    Ok(db.list_items()?)
}

pub fn get_item(db: &DashboardDb, id: i64) -> Result<Item, DashboardError> {
    db.get_item(id)?
        .ok_or_else(|| DashboardError::not_found("Item", id))
}

pub fn update_item(db: &DashboardDb, id: i64, input: ItemUpdateInput) -> Result<Item, DashboardError> {
    let mut item = get_item(db, id)?;
    if let Some(name) = provided(&input.name) {
        check_length("name", name, NAME_MIN, NAME_MAX)?;
        ensure_name_free(db, Table::Items, "Item", name, Some(id))?;
        item.name = name.to_string();
    }
    if let Some(description) = provided(&input.description) {
        check_description(description)?;
        item.description = description.to_string();
    }
    Ok(db.update_item(&item)?)
}

pub fn delete_item(db: &DashboardDb, id: i64) -> Result<(), DashboardError> {
    delete_live(db, Table::Items, "Item", id)
}

// ── Projects ─────────────────────────────────────────────────────────

pub fn create_project(db: &DashboardDb, input: ProjectCreateInput) -> Result<Project, DashboardError> {
    let name = input.name.trim();
    let description = input.description.trim();
    check_length("name", name, NAME_MIN, NAME_MAX)?;
    check_description(description)?;

    let repo_url = provided(&input.repo_url).unwrap_or_default();
    if !repo_url.is_empty() {
        check_repo_url(repo_url)?;
    }
    let status = match provided(&input.status) {
        Some(s) => parse_enum::<ProjectStatus>(s)?,
        None => ProjectStatus::Active,
    };
    let color = provided(&input.color).unwrap_or(DEFAULT_PROJECT_COLOR);
    check_color(color)?;

    ensure_name_free(db, Table::Projects, "Project", name, None)?;
    Ok(db.insert_project(&NewProject {
        name: name.to_string(),
        description: description.to_string(),
        repo_url: repo_url.to_string(),
        status,
        color: color.to_string(),
    })?)
}

pub fn list_projects(db: &DashboardDb) -> Result<Vec<Project>, DashboardError> {
    Ok(db.list_projects()?)
}

fn load_project(db: &DashboardDb, id: i64) -> Result<Project, DashboardError> {
    db.get_project(id)?
        .ok_or_else(|| DashboardError::not_found("Project", id))
}

/// A live project together with its live tasks.
pub fn get_project(db: &DashboardDb, id: i64) -> Result<ProjectDetail, DashboardError> {
    let project = load_project(db, id)?;
    let tasks = db.list_tasks(Some(id))?;
    Ok(ProjectDetail { project, tasks })
}

pub fn update_project(
    db: &DashboardDb,
    id: i64,
    input: ProjectUpdateInput,
) -> Result<Project, DashboardError> {
    let mut project = load_project(db, id)?;
    if let Some(name) = provided(&input.name) {
        check_length("name", name, NAME_MIN, NAME_MAX)?;
        ensure_name_free(db, Table::Projects, "Project", name, Some(id))?;
        project.name = name.to_string();
    }
    if let Some(description) = provided(&input.description) {
        check_description(description)?;
        project.description = description.to_string();
    }
    if let Some(repo_url) = provided(&input.repo_url) {
        check_repo_url(repo_url)?;
        project.repo_url = repo_url.to_string();
    }
    if let Some(status) = provided(&input.status) {
        project.status = parse_enum(status)?;
    }
    if let Some(color) = provided(&input.color) {
        check_color(color)?;
        project.color = color.to_string();
    }
    Ok(db.update_project(&project)?)
}

pub fn delete_project(db: &DashboardDb, id: i64) -> Result<(), DashboardError> {
    delete_live(db, Table::Projects, "Project", id)
}

pub fn project_stats(db: &DashboardDb) -> Result<ProjectStats, DashboardError> {
    Ok(ProjectStats {
        total_projects: db.count_projects(None)?,
        active_projects: db.count_projects(Some(ProjectStatus::Active))?,
        tasks_per_project: db.task_counts_per_project()?,
    })
}

// ── Tasks ────────────────────────────────────────────────────────────

/// Validate a create payload into an insert shape. Also used by the importer.
pub fn validate_new_task(db: &DashboardDb, input: TaskCreateInput) -> Result<NewTask, DashboardError> {
    if input.project_id <= 0 {
        return Err(DashboardError::validation("projectId is required"));
    }
    if db.get_project(input.project_id)?.is_none() {
        return Err(DashboardError::validation("project not found"));
    }

    let title = input.title.trim();
    check_length("title", title, NAME_MIN, NAME_MAX)?;
    let description = input.description.trim();
    if description.is_empty() {
        return Err(DashboardError::validation("description is required"));
    }

    let status = match provided(&input.status) {
        Some(s) => parse_enum::<TaskStatus>(s)?,
        None => TaskStatus::Todo,
    };
    let priority = match provided(&input.priority) {
        Some(p) => parse_enum::<Priority>(p)?,
        None => Priority::Medium,
    };
    let estimated_hours = input.estimated_hours.unwrap_or(0);
    if estimated_hours < 0 {
        return Err(DashboardError::validation("estimatedHours must not be negative"));
    }

    Ok(NewTask {
        project_id: input.project_id,
        title: title.to_string(),
        description: description.to_string(),
        status,
        priority,
        labels: provided(&input.labels).unwrap_or_default().to_string(),
        assignee: provided(&input.assignee).unwrap_or_default().to_string(),
        due_date: input.due_date,
        estimated_hours,
    })
}

pub fn create_task(db: &DashboardDb, input: TaskCreateInput) -> Result<Task, DashboardError> {
    let task = validate_new_task(db, input)?;
    Ok(db.insert_task(&task)?)
}

pub fn list_tasks(db: &DashboardDb, project_id: Option<i64>) -> Result<Vec<Task>, DashboardError> {
    Ok(db.list_tasks(project_id)?)
}

pub fn get_task(db: &DashboardDb, id: i64) -> Result<Task, DashboardError> {
    db.get_task(id)?
        .ok_or_else(|| DashboardError::not_found("Task", id))
}

pub fn update_task(db: &DashboardDb, id: i64, input: TaskUpdateInput) -> Result<Task, DashboardError> {
    let mut task = get_task(db, id)?;
    if let Some(title) = provided(&input.title) {
        check_length("title", title, NAME_MIN, NAME_MAX)?;
        task.title = title.to_string();
    }
    if let Some(description) = provided(&input.description) {
        task.description = description.to_string();
    }
    if let Some(status) = provided(&input.status) {
        task.status = parse_enum(status)?;
    }
    if let Some(priority) = provided(&input.priority) {
        task.priority = parse_enum(priority)?;
    }
    if let Some(labels) = provided(&input.labels) {
        task.labels = labels.to_string();
    }
    if let Some(assignee) = provided(&input.assignee) {
        task.assignee = assignee.to_string();
    }
    if let Some(due) = input.due_date {
        task.due_date = Some(due);
    }
    if let Some(hours) = input.estimated_hours {
        if hours < 0 {
            return Err(DashboardError::validation("estimatedHours must not be negative"));
        }
        task.estimated_hours = hours;
    }
    Ok(db.update_task(&task)?)
}

pub fn delete_task(db: &DashboardDb, id: i64) -> Result<(), DashboardError> {
    delete_live(db, Table::Tasks, "Task", id)
}

pub fn task_stats(db: &DashboardDb) -> Result<TaskStats, DashboardError> {
    let mut by_status = BTreeMap::new();
    for status in TaskStatus::ALL {
        by_status.insert(status.as_str().to_string(), db.count_tasks(Some(status))?);
    }
    Ok(TaskStats {
        total_tasks: db.count_tasks(None)?,
        by_status,
    })
}
