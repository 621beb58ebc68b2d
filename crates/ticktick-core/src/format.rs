//! Human-readable text rendering for tool responses.

use crate::timezone::convert_utc_to_local;
use crate::types::{Project, Task};

/// Render one task as a labeled text block.
///
/// Dates are shown in the task's resolved zone with the raw UTC value
/// appended, so the caller always sees both.
pub fn format_task(task: &Task, default_tz: Option<&str>) -> String {
    let mut out = format!("ID: {}\n", task.id);
    out.push_str(&format!("Title: {}\n", task.title));
    out.push_str(&format!(
        "Project ID: {}\n",
        if task.project_id.is_empty() {
            "None"
        } else {
            &task.project_id
        }
    ));

    if let Some(start) = &task.start_date {
        out.push_str(&format!(
            "Start Date: {}\n",
            convert_utc_to_local(start, task.time_zone.as_deref(), default_tz)
        ));
    }
    if let Some(due) = &task.due_date {
        out.push_str(&format!(
            "Due Date: {}\n",
            convert_utc_to_local(due, task.time_zone.as_deref(), default_tz)
        ));
    }
    if let Some(tz) = &task.time_zone {
        out.push_str(&format!("Task Timezone: {tz}\n"));
    }

    out.push_str(&format!("Priority: {}\n", task.priority.label()));
    out.push_str(&format!(
        "Status: {}\n",
        if task.is_completed() { "Completed" } else { "Active" }
    ));

    if let Some(content) = &task.content {
        if !content.is_empty() {
            out.push_str(&format!("\nContent:\n{content}\n"));
        }
    }

    if !task.items.is_empty() {
        out.push_str(&format!("\nSubtasks ({}):\n", task.items.len()));
        for (i, item) in task.items.iter().enumerate() {
            let mark = if item.is_completed() { "✓" } else { "□" };
            out.push_str(&format!("{}. [{mark}] {}\n", i + 1, item.title));
        }
    }

    out
}

/// Render one project as a labeled text block.
pub fn format_project(project: &Project) -> String {
    let mut out = format!("Name: {}\n", project.name);
    out.push_str(&format!("ID: {}\n", project.id));
    if let Some(color) = &project.color {
        out.push_str(&format!("Color: {color}\n"));
    }
    if let Some(view_mode) = &project.view_mode {
        out.push_str(&format!("View Mode: {view_mode}\n"));
    }
    out.push_str(&format!(
        "Closed: {}\n",
        if project.closed { "Yes" } else { "No" }
    ));
    if let Some(kind) = &project.kind {
        out.push_str(&format!("Kind: {kind}\n"));
    }
    out
}

/// Render a task list with a counted header, e.g. `Found 2 tasks:`.
/// `title` names the collection ("tasks", "overdue tasks").
pub fn format_task_list(tasks: &[Task], title: &str, default_tz: Option<&str>) -> String {
    let lower = title.to_lowercase();
    if tasks.is_empty() {
        return format!("No {lower} found.");
    }
    let mut out = format!("Found {} {lower}:\n\n", tasks.len());
    for (i, task) in tasks.iter().enumerate() {
        out.push_str(&format!("Task {}:\n", i + 1));
        out.push_str(&format_task(task, default_tz));
        out.push('\n');
    }
    out
}

/// Render a project list with a counted header.
pub fn format_project_list(projects: &[Project], title: &str) -> String {
    let lower = title.to_lowercase();
    if projects.is_empty() {
        return format!("No {lower} found.");
    }
    let mut out = format!("Found {} {lower}:\n\n", projects.len());
    for (i, project) in projects.iter().enumerate() {
        out.push_str(&format!("Project {}:\n", i + 1));
        out.push_str(&format_project(project));
        out.push('\n');
    }
    out
}
