//! Tool handlers for the MCP server.
//!
//! Implements the tool surface: project management, batch task
//! mutations, and the date/priority/search query tools. All output is
//! plain text shaped for a reading client.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use ticktick_api::TickTickClient;
use ticktick_core::batch::{execute_batch, BatchAction, BatchInput, BatchSuccess};
use ticktick_core::config::DisplayConfig;
use ticktick_core::filter::{matches_search, QueryClock, TaskFilter};
use ticktick_core::format::{format_project, format_project_list, format_task, format_task_list};
use ticktick_core::timezone::normalize_instant;
use ticktick_core::types::{
    is_inbox_id, ChecklistItem, DateFilterKind, Priority, Project, ProjectPayload, Task,
    TaskPayload,
};
use ticktick_core::{Error, Result};

use crate::protocol::{ToolCallResult, ToolDefinition};

const VALID_VIEW_MODES: [&str; 3] = ["list", "kanban", "timeline"];
const DEFAULT_PROJECT_COLOR: &str = "#F18181";

/// Tool handler holding the shared API client and display preferences.
pub struct ToolHandler {
    client: Arc<TickTickClient>,
    display: DisplayConfig,
}

impl ToolHandler {
    pub fn new(client: Arc<TickTickClient>, display: DisplayConfig) -> Self {
        Self { client, display }
    }

    /// One clock per query so every task in a run sees the same "now".
    fn clock(&self) -> QueryClock {
        QueryClock::new(self.display.timezone.clone(), self.display.week_start_day())
    }

    fn display_tz(&self) -> Option<&str> {
        self.display.timezone.as_deref()
    }

    /// Get available tool definitions.
    pub fn available_tools(&self) -> Vec<ToolDefinition> {
        let batch_tasks_schema = |item_fields: Value, description: &str| {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "tasks": {
                        "description": description,
                        "oneOf": [
                            item_fields,
                            { "type": "array", "items": item_fields }
                        ]
                    }
                },
                "required": ["tasks"]
            })
        };

        let create_item = serde_json::json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Task name (required)" },
                "project_id": { "type": "string", "description": "Target project ID, or \"inbox\" (required)" },
                "content": { "type": "string" },
                "desc": { "type": "string" },
                "start_date": { "type": "string", "description": "ISO format, e.g. 2025-07-19T10:00:00+0000" },
                "due_date": { "type": "string", "description": "ISO format, e.g. 2025-07-19T10:00:00+0000" },
                "priority": { "type": "integer", "enum": [0, 1, 3, 5], "description": "0 None, 1 Low, 3 Medium, 5 High" },
                "is_all_day": { "type": "boolean" },
                "time_zone": { "type": "string", "description": "IANA zone, e.g. America/Los_Angeles" },
                "reminders": { "type": "array", "items": { "type": "string" } },
                "repeat_flag": { "type": "string", "description": "Recurring rule, e.g. RRULE:FREQ=DAILY;INTERVAL=1" },
                "sort_order": { "type": "integer" },
                "items": { "type": "array", "items": { "type": "object" }, "description": "Checklist items" }
            }
        });

        let update_item = serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": { "type": "string", "description": "ID of the task to update (required)" },
                "project_id": { "type": "string", "description": "Project the task belongs to (required)" },
                "title": { "type": "string" },
                "content": { "type": "string" },
                "desc": { "type": "string" },
                "start_date": { "type": "string" },
                "due_date": { "type": "string" },
                "priority": { "type": "integer", "enum": [0, 1, 3, 5] },
                "is_all_day": { "type": "boolean" },
                "time_zone": { "type": "string" },
                "reminders": { "type": "array", "items": { "type": "string" } },
                "repeat_flag": { "type": "string" },
                "sort_order": { "type": "integer" },
                "items": { "type": "array", "items": { "type": "object" } }
            }
        });

        let id_pair_item = serde_json::json!({
            "type": "object",
            "properties": {
                "project_id": { "type": "string", "description": "ID of the project (required)" },
                "task_id": { "type": "string", "description": "ID of the task (required)" }
            }
        });

        let subtask_item = serde_json::json!({
            "type": "object",
            "properties": {
                "subtask_title": { "type": "string", "description": "Title of the subtask (required)" },
                "parent_task_id": { "type": "string", "description": "ID of the parent task (required)" },
                "project_id": { "type": "string", "description": "Project shared by parent and subtask (required)" },
                "content": { "type": "string" },
                "priority": { "type": "integer", "enum": [0, 1, 3, 5] }
            }
        });

        let no_args = serde_json::json!({ "type": "object", "properties": {} });

        vec![
            ToolDefinition {
                name: "get_all_projects".to_string(),
                description: "Get all projects. Does not include the special Inbox; use get_project_info(\"inbox\") for that.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_project_info".to_string(),
                description: "Get a project's details together with all of its tasks. Pass \"inbox\" for the inbox.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "project_id": { "type": "string", "description": "Project ID, or \"inbox\"" }
                    },
                    "required": ["project_id"]
                }),
            },
            ToolDefinition {
                name: "create_project".to_string(),
                description: "Create a new project.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Project name" },
                        "color": { "type": "string", "description": "Hex color code (default #F18181)" },
                        "view_mode": { "type": "string", "enum": VALID_VIEW_MODES, "description": "View mode (default list)" }
                    },
                    "required": ["name"]
                }),
            },
            ToolDefinition {
                name: "delete_project".to_string(),
                description: "Delete a project.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "project_id": { "type": "string", "description": "ID of the project" }
                    },
                    "required": ["project_id"]
                }),
            },
            ToolDefinition {
                name: "create_tasks".to_string(),
                description: "Create one or more tasks. Pass a single task object or an array of task objects.".to_string(),
                input_schema: batch_tasks_schema(create_item, "Task object or array of task objects"),
            },
            ToolDefinition {
                name: "update_tasks".to_string(),
                description: "Update one or more existing tasks. Pass a single task object or an array of task objects.".to_string(),
                input_schema: batch_tasks_schema(update_item, "Task object or array of task objects"),
            },
            ToolDefinition {
                name: "complete_tasks".to_string(),
                description: "Mark one or more tasks as complete.".to_string(),
                input_schema: batch_tasks_schema(id_pair_item.clone(), "Task reference or array of task references"),
            },
            ToolDefinition {
                name: "delete_tasks".to_string(),
                description: "Delete one or more tasks.".to_string(),
                input_schema: batch_tasks_schema(id_pair_item, "Task reference or array of task references"),
            },
            ToolDefinition {
                name: "create_subtasks".to_string(),
                description: "Create one or more subtasks under parent tasks.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "subtasks": {
                            "description": "Subtask object or array of subtask objects",
                            "oneOf": [
                                subtask_item,
                                { "type": "array", "items": subtask_item }
                            ]
                        }
                    },
                    "required": ["subtasks"]
                }),
            },
            ToolDefinition {
                name: "get_all_tasks".to_string(),
                description: "Get all tasks across every open project and the inbox.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_tasks_by_priority".to_string(),
                description: "Get all tasks with a given priority. Ignores closed projects.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "priority_id": { "type": "integer", "enum": [0, 1, 3, 5], "description": "0 None, 1 Low, 3 Medium, 5 High" }
                    },
                    "required": ["priority_id"]
                }),
            },
            ToolDefinition {
                name: "get_tasks_due_today".to_string(),
                description: "Get all tasks due today. Ignores closed projects.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_overdue_tasks".to_string(),
                description: "Get all overdue tasks. Ignores closed projects.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_tasks_due_tomorrow".to_string(),
                description: "Get all tasks due tomorrow. Ignores closed projects.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_tasks_due_in_days".to_string(),
                description: "Get all tasks due in exactly N days. Ignores closed projects.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "days": { "type": "integer", "minimum": 0, "description": "Days from today (0 today, 1 tomorrow)" }
                    },
                    "required": ["days"]
                }),
            },
            ToolDefinition {
                name: "get_tasks_due_this_week".to_string(),
                description: "Get all tasks due in the current calendar week. Ignores closed projects.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "search_tasks".to_string(),
                description: "Search tasks by title, content, or checklist item titles (case-insensitive). Ignores closed projects.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "search_term": { "type": "string", "description": "Text to search for" }
                    },
                    "required": ["search_term"]
                }),
            },
            ToolDefinition {
                name: "get_engaged_tasks".to_string(),
                description: "Get tasks needing attention now: high priority, due today, or overdue.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "get_next_tasks".to_string(),
                description: "Get upcoming tasks: medium priority or due tomorrow.".to_string(),
                input_schema: no_args.clone(),
            },
            ToolDefinition {
                name: "filter_tasks".to_string(),
                description: "Query tasks with any combination of date window, priority, text search, and project. With task_id, fetches that single task.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "date_filter": {
                            "type": "string",
                            "enum": ["today", "tomorrow", "overdue", "next_7_days", "custom"],
                            "description": "Date window to match"
                        },
                        "custom_days": { "type": "integer", "minimum": 0, "description": "Day offset, required with date_filter=custom" },
                        "priority": { "type": "integer", "enum": [0, 1, 3, 5] },
                        "search_term": { "type": "string", "description": "Case-insensitive text match" },
                        "project_id": { "type": "string" },
                        "task_id": { "type": "string", "description": "Fetch one task directly (requires project_id)" },
                        "include_all_projects": { "type": "boolean", "description": "Walk all open projects plus the inbox (default true)" }
                    }
                }),
            },
        ]
    }

    /// Execute a tool by name with arguments.
    pub async fn execute(&self, name: &str, arguments: Option<Value>) -> ToolCallResult {
        let args = arguments.unwrap_or(Value::Null);

        let outcome = match name {
            "get_all_projects" => self.get_all_projects().await,
            "get_project_info" => self.get_project_info(args).await,
            "create_project" => self.create_project(args).await,
            "delete_project" => self.delete_project(args).await,
            "create_tasks" => self.create_tasks(args).await,
            "update_tasks" => self.update_tasks(args).await,
            "complete_tasks" => self.complete_tasks(args).await,
            "delete_tasks" => self.delete_tasks(args).await,
            "create_subtasks" => self.create_subtasks(args).await,
            "get_all_tasks" => self.run_query("included", |_| true).await,
            "get_tasks_by_priority" => self.get_tasks_by_priority(args).await,
            "get_tasks_due_today" => {
                let clock = self.clock();
                self.run_query("due today", move |t| clock.is_due_today(t)).await
            }
            "get_overdue_tasks" => {
                let clock = self.clock();
                self.run_query("overdue", move |t| clock.is_overdue(t)).await
            }
            "get_tasks_due_tomorrow" => {
                let clock = self.clock();
                self.run_query("due tomorrow", move |t| clock.is_due_in_days(t, 1))
                    .await
            }
            "get_tasks_due_in_days" => self.get_tasks_due_in_days(args).await,
            "get_tasks_due_this_week" => {
                let clock = self.clock();
                self.run_query("due this week", move |t| clock.is_due_this_week(t))
                    .await
            }
            "search_tasks" => self.search_tasks(args).await,
            "get_engaged_tasks" => {
                let clock = self.clock();
                self.run_query("engaged (high priority, due today, or overdue)", move |t| {
                    t.priority == Priority::High || clock.is_due_today(t) || clock.is_overdue(t)
                })
                .await
            }
            "get_next_tasks" => {
                let clock = self.clock();
                self.run_query("next (medium priority or due tomorrow)", move |t| {
                    t.priority == Priority::Medium || clock.is_due_in_days(t, 1)
                })
                .await
            }
            "filter_tasks" => self.filter_tasks(args).await,
            _ => return ToolCallResult::error(format!("Unknown tool: {}", name)),
        };

        match outcome {
            Ok(text) => ToolCallResult::text(text),
            Err(e) => ToolCallResult::error(e.to_string()),
        }
    }

    // =========================================================================
    // Project tools
    // =========================================================================

    async fn get_all_projects(&self) -> Result<String> {
        let projects = self.client.get_projects().await?;
        Ok(format_project_list(&projects, "Projects"))
    }

    async fn get_project_info(&self, args: Value) -> Result<String> {
        let params: ProjectIdParams = parse_args(args)?;
        let data = self.client.get_project_with_tasks(&params.project_id).await?;

        let project = data.project.unwrap_or_else(|| Project {
            id: params.project_id.clone(),
            name: if is_inbox_id(&params.project_id) {
                "Inbox".to_string()
            } else {
                params.project_id.clone()
            },
            color: None,
            view_mode: None,
            kind: None,
            closed: false,
        });

        let bar = "=".repeat(60);
        let mut out = format!("{bar}\n📁 PROJECT INFORMATION\n{bar}\n\n");
        out.push_str(&format_project(&project));
        out.push_str(&format!(
            "\n{bar}\n📋 TASKS IN '{}' ({} tasks)\n{bar}\n\n",
            project.name,
            data.tasks.len()
        ));

        if is_inbox_id(&params.project_id) && data.tasks.is_empty() {
            out.push_str("Your inbox is empty. 📭 Great job staying organized!\n");
        } else if data.tasks.is_empty() {
            out.push_str("No tasks found in this project.\n");
        } else {
            for (i, task) in data.tasks.iter().enumerate() {
                out.push_str(&format!(
                    "Task {}:\n{}\n",
                    i + 1,
                    format_task(task, self.display_tz())
                ));
            }
        }

        Ok(out)
    }

    async fn create_project(&self, args: Value) -> Result<String> {
        let params: CreateProjectParams = parse_args(args)?;

        let view_mode = params.view_mode.unwrap_or_else(|| "list".to_string());
        if !VALID_VIEW_MODES.contains(&view_mode.as_str()) {
            return Err(Error::Validation(
                "Invalid view_mode. Must be one of: list, kanban, timeline.".to_string(),
            ));
        }

        let payload = ProjectPayload {
            name: params.name,
            color: Some(
                params
                    .color
                    .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            ),
            view_mode: Some(view_mode),
        };
        let project = self.client.create_project(&payload).await?;
        Ok(format!(
            "Project created successfully:\n\n{}",
            format_project(&project)
        ))
    }

    async fn delete_project(&self, args: Value) -> Result<String> {
        let params: ProjectIdParams = parse_args(args)?;
        self.client.delete_project(&params.project_id).await?;
        Ok(format!(
            "Project {} deleted successfully.",
            params.project_id
        ))
    }

    // =========================================================================
    // Batch task tools
    // =========================================================================

    async fn create_tasks(&self, args: Value) -> Result<String> {
        let params: TasksParams = parse_args(args)?;
        let client = Arc::clone(&self.client);
        let tz = self.display.timezone.clone();
        let mut num = 0usize;

        let report = execute_batch(
            BatchAction::Create,
            "task",
            params.tasks,
            title_label,
            move |raw| {
                num += 1;
                let n = num;
                let client = Arc::clone(&client);
                let tz = tz.clone();
                async move {
                    let item: CreateTaskItem = parse_item(raw)?;
                    let payload = item.into_payload()?;
                    let task = client.create_task(&payload).await?;
                    Ok(BatchSuccess {
                        line: format!("{}. {} (ID: {})", n, task.title, task.id),
                        detail: format!(
                            "Task created successfully:\n\n{}",
                            format_task(&task, tz.as_deref())
                        ),
                    })
                }
            },
        )
        .await?;

        Ok(report.render())
    }

    async fn update_tasks(&self, args: Value) -> Result<String> {
        let params: TasksParams = parse_args(args)?;
        let client = Arc::clone(&self.client);
        let tz = self.display.timezone.clone();
        let mut num = 0usize;

        let report = execute_batch(
            BatchAction::Update,
            "task",
            params.tasks,
            task_id_label,
            move |raw| {
                num += 1;
                let n = num;
                let client = Arc::clone(&client);
                let tz = tz.clone();
                async move {
                    let item: UpdateTaskItem = parse_item(raw)?;
                    let (task_id, payload) = item.into_payload()?;
                    let task = client.update_task(&task_id, &payload).await?;
                    Ok(BatchSuccess {
                        line: format!("{}. {} (ID: {})", n, task.title, task_id),
                        detail: format!(
                            "Task updated successfully:\n\n{}",
                            format_task(&task, tz.as_deref())
                        ),
                    })
                }
            },
        )
        .await?;

        Ok(report.render())
    }

    async fn complete_tasks(&self, args: Value) -> Result<String> {
        let params: TasksParams = parse_args(args)?;
        let client = Arc::clone(&self.client);
        let mut num = 0usize;

        let report = execute_batch(
            BatchAction::Complete,
            "task",
            params.tasks,
            task_id_label,
            move |raw| {
                num += 1;
                let n = num;
                let client = Arc::clone(&client);
                async move {
                    let item: TaskRefItem = parse_item(raw)?;
                    let (project_id, task_id) = item.into_ids()?;
                    client.complete_task(&project_id, &task_id).await?;
                    Ok(BatchSuccess {
                        line: format!("{}. Task ID: {}", n, task_id),
                        detail: format!("Task {} marked as complete.", task_id),
                    })
                }
            },
        )
        .await?;

        Ok(report.render())
    }

    async fn delete_tasks(&self, args: Value) -> Result<String> {
        let params: TasksParams = parse_args(args)?;
        let client = Arc::clone(&self.client);
        let mut num = 0usize;

        let report = execute_batch(
            BatchAction::Delete,
            "task",
            params.tasks,
            task_id_label,
            move |raw| {
                num += 1;
                let n = num;
                let client = Arc::clone(&client);
                async move {
                    let item: TaskRefItem = parse_item(raw)?;
                    let (project_id, task_id) = item.into_ids()?;
                    client.delete_task(&project_id, &task_id).await?;
                    Ok(BatchSuccess {
                        line: format!("{}. Task ID: {}", n, task_id),
                        detail: format!("Task {} deleted successfully.", task_id),
                    })
                }
            },
        )
        .await?;

        Ok(report.render())
    }

    async fn create_subtasks(&self, args: Value) -> Result<String> {
        let params: SubtasksParams = parse_args(args)?;
        let client = Arc::clone(&self.client);
        let tz = self.display.timezone.clone();
        let mut num = 0usize;

        let report = execute_batch(
            BatchAction::Create,
            "subtask",
            params.subtasks,
            subtask_label,
            move |raw| {
                num += 1;
                let n = num;
                let client = Arc::clone(&client);
                let tz = tz.clone();
                async move {
                    let item: CreateSubtaskItem = parse_item(raw)?;
                    let payload = item.into_payload()?;
                    let task = client.create_task(&payload).await?;
                    Ok(BatchSuccess {
                        line: format!("{}. {} (ID: {})", n, task.title, task.id),
                        detail: format!(
                            "Subtask created successfully:\n\n{}",
                            format_task(&task, tz.as_deref())
                        ),
                    })
                }
            },
        )
        .await?;

        Ok(report.render())
    }

    // =========================================================================
    // Query tools
    // =========================================================================

    async fn get_tasks_by_priority(&self, args: Value) -> Result<String> {
        let params: PriorityParams = parse_args(args)?;
        let priority = Priority::try_from(params.priority_id)?;
        self.run_query(&format!("priority {}", priority.label()), move |t| {
            t.priority == priority
        })
        .await
    }

    async fn get_tasks_due_in_days(&self, args: Value) -> Result<String> {
        let params: DaysParams = parse_args(args)?;
        if params.days < 0 {
            return Err(Error::InvalidFilterArgument(
                "Days must be a non-negative integer.".to_string(),
            ));
        }
        let day_text = match params.days {
            0 => "today".to_string(),
            1 => "in 1 day".to_string(),
            n => format!("in {} days", n),
        };
        let clock = self.clock();
        let days = params.days;
        self.run_query(&format!("due {}", day_text), move |t| {
            clock.is_due_in_days(t, days)
        })
        .await
    }

    async fn search_tasks(&self, args: Value) -> Result<String> {
        let params: SearchParams = parse_args(args)?;
        let term = params.search_term.trim().to_string();
        if term.is_empty() {
            return Err(Error::Validation("Search term cannot be empty.".to_string()));
        }
        let name = format!("matching '{}'", term);
        self.run_query(&name, move |t| matches_search(t, &term)).await
    }

    async fn filter_tasks(&self, args: Value) -> Result<String> {
        let params: FilterTasksParams = parse_args(args)?;

        let filter = TaskFilter::build(
            params.date_filter.map(|k| (k, params.custom_days)),
            params.priority,
            params.search_term,
            params.project_id.clone(),
        )?;
        let clock = self.clock();

        // Point lookup fetches one task directly; the remaining
        // criteria still have to hold for it.
        if let Some(task_id) = &params.task_id {
            let project_id = params.project_id.as_deref().ok_or_else(|| {
                Error::Validation("project_id is required when task_id is given".to_string())
            })?;
            let task = self.client.get_task(project_id, task_id).await?;
            if !filter.matches(&task, &clock) {
                return Ok("No matching tasks found.".to_string());
            }
            return Ok(format_task(&task, self.display_tz()));
        }

        if !params.include_all_projects.unwrap_or(true) {
            let project_id = params.project_id.as_deref().ok_or_else(|| {
                Error::Validation(
                    "project_id is required when include_all_projects is false".to_string(),
                )
            })?;
            let data = self.client.get_project_with_tasks(project_id).await?;
            let matched: Vec<Task> = data
                .tasks
                .into_iter()
                .filter(|t| filter.matches(t, &clock))
                .collect();
            return Ok(format_task_list(&matched, "matching tasks", self.display_tz()));
        }

        self.run_query("matching filter", move |t| filter.matches(t, &clock))
            .await
    }

    /// Walk every open project plus the inbox, rendering the tasks the
    /// predicate admits, grouped by project.
    async fn run_query<F>(&self, filter_name: &str, predicate: F) -> Result<String>
    where
        F: Fn(&Task) -> bool,
    {
        let projects = self.client.get_projects().await?;
        if projects.is_empty() {
            return Ok("No projects found.".to_string());
        }

        let mut out = format!("Found {} projects + Inbox:\n\n", projects.len());

        for (i, project) in projects.iter().enumerate() {
            if project.closed {
                continue;
            }

            let data = self.client.get_project_with_tasks(&project.id).await?;
            let matched: Vec<(usize, &Task)> = data
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| predicate(t))
                .map(|(n, t)| (n + 1, t))
                .collect();

            out.push_str(&format!("Project {}:\n{}", i + 1, format_project(project)));
            out.push_str(&format!(
                "With {} tasks that are to be '{}' in this project :\n",
                matched.len(),
                filter_name
            ));
            for (n, task) in matched {
                out.push_str(&format!(
                    "Task {}:\n{}\n",
                    n,
                    format_task(task, self.display_tz())
                ));
            }
            out.push_str("\n\n");
        }

        // The inbox is not part of the project list; a failure here
        // must not lose the project results already collected.
        match self.client.get_project_with_tasks(Project::INBOX_ID).await {
            Ok(inbox) => {
                let name = inbox
                    .project
                    .as_ref()
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| "Inbox".to_string());
                let matched: Vec<(usize, &Task)> = inbox
                    .tasks
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| predicate(t))
                    .map(|(n, t)| (n + 1, t))
                    .collect();

                out.push_str(&format!("Inbox:\nName: {}\nID: inbox\n", name));
                out.push_str(&format!(
                    "With {} tasks that are to be '{}' in this project :\n",
                    matched.len(),
                    filter_name
                ));
                for (n, task) in matched {
                    out.push_str(&format!(
                        "Task {}:\n{}\n",
                        n,
                        format_task(task, self.display_tz())
                    ));
                }
                out.push('\n');
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not fetch inbox tasks");
                out.push_str(&format!("Inbox: Could not fetch (error: {})\n", e));
            }
        }

        Ok(out)
    }
}

// =============================================================================
// Parameters and batch item shapes
// =============================================================================

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    let args = if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(args).map_err(|e| Error::Validation(format!("Invalid arguments: {}", e)))
}

fn parse_item<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T> {
    serde_json::from_value(raw).map_err(|e| Error::Validation(format!("Invalid item: {}", e)))
}

fn title_label(raw: &Value) -> String {
    raw.get("title")
        .and_then(Value::as_str)
        .map(|t| format!("'{}'", t))
        .unwrap_or_else(|| "'Unknown'".to_string())
}

fn subtask_label(raw: &Value) -> String {
    raw.get("subtask_title")
        .and_then(Value::as_str)
        .map(|t| format!("'{}'", t))
        .unwrap_or_else(|| "'Unknown'".to_string())
}

fn task_id_label(raw: &Value) -> String {
    let id = raw
        .get("task_id")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    format!("ID: {}", id)
}

#[derive(Debug, Deserialize)]
struct ProjectIdParams {
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct CreateProjectParams {
    name: String,
    color: Option<String>,
    view_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TasksParams {
    tasks: BatchInput<Value>,
}

#[derive(Debug, Deserialize)]
struct SubtasksParams {
    subtasks: BatchInput<Value>,
}

#[derive(Debug, Deserialize)]
struct PriorityParams {
    priority_id: i64,
}

#[derive(Debug, Deserialize)]
struct DaysParams {
    days: i64,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    search_term: String,
}

#[derive(Debug, Deserialize)]
struct FilterTasksParams {
    date_filter: Option<DateFilterKind>,
    custom_days: Option<i64>,
    priority: Option<i64>,
    search_term: Option<String>,
    project_id: Option<String>,
    task_id: Option<String>,
    include_all_projects: Option<bool>,
}

fn require_field(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Validation(format!("'{}' is required and cannot be empty", field)))
}

fn validate_priority(priority: Option<i64>) -> Result<Option<Priority>> {
    priority.map(Priority::try_from).transpose()
}

fn validate_date(field: &str, value: Option<&str>) -> Result<()> {
    if let Some(raw) = value {
        normalize_instant(raw).map_err(|_| {
            Error::Validation(format!(
                "Invalid {} format '{}'. Use ISO format: YYYY-MM-DDTHH:mm:ss or with timezone",
                field, raw
            ))
        })?;
    }
    Ok(())
}

/// Item shape for create_tasks. Everything optional at parse time so
/// missing fields produce per-item messages instead of a serde failure
/// for the whole batch.
#[derive(Debug, Deserialize)]
struct CreateTaskItem {
    title: Option<String>,
    project_id: Option<String>,
    content: Option<String>,
    desc: Option<String>,
    start_date: Option<String>,
    due_date: Option<String>,
    priority: Option<i64>,
    is_all_day: Option<bool>,
    time_zone: Option<String>,
    reminders: Option<Vec<String>>,
    repeat_flag: Option<String>,
    sort_order: Option<i64>,
    items: Option<Vec<ChecklistItem>>,
}

impl CreateTaskItem {
    fn into_payload(self) -> Result<TaskPayload> {
        let title = require_field(self.title, "title")?;
        let project_id = require_field(self.project_id, "project_id")?;
        let priority = validate_priority(self.priority)?;
        validate_date("start_date", self.start_date.as_deref())?;
        validate_date("due_date", self.due_date.as_deref())?;

        Ok(TaskPayload {
            title: Some(title),
            project_id: Some(project_id),
            content: self.content,
            desc: self.desc,
            start_date: self.start_date,
            due_date: self.due_date,
            priority,
            is_all_day: self.is_all_day,
            time_zone: self.time_zone,
            reminders: self.reminders,
            repeat_flag: self.repeat_flag,
            sort_order: self.sort_order,
            items: self.items,
            ..Default::default()
        })
    }
}

/// Item shape for update_tasks.
#[derive(Debug, Deserialize)]
struct UpdateTaskItem {
    task_id: Option<String>,
    project_id: Option<String>,
    title: Option<String>,
    content: Option<String>,
    desc: Option<String>,
    start_date: Option<String>,
    due_date: Option<String>,
    priority: Option<i64>,
    is_all_day: Option<bool>,
    time_zone: Option<String>,
    reminders: Option<Vec<String>>,
    repeat_flag: Option<String>,
    sort_order: Option<i64>,
    items: Option<Vec<ChecklistItem>>,
}

impl UpdateTaskItem {
    fn into_payload(self) -> Result<(String, TaskPayload)> {
        let task_id = self
            .task_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("Missing required field 'task_id'".to_string()))?;
        let project_id = self
            .project_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("Missing required field 'project_id'".to_string()))?;
        let priority = validate_priority(self.priority)?;
        validate_date("start_date", self.start_date.as_deref())?;
        validate_date("due_date", self.due_date.as_deref())?;

        let payload = TaskPayload {
            id: Some(task_id.clone()),
            project_id: Some(project_id),
            title: self.title,
            content: self.content,
            desc: self.desc,
            start_date: self.start_date,
            due_date: self.due_date,
            priority,
            is_all_day: self.is_all_day,
            time_zone: self.time_zone,
            reminders: self.reminders,
            repeat_flag: self.repeat_flag,
            sort_order: self.sort_order,
            items: self.items,
            parent_id: None,
        };
        Ok((task_id, payload))
    }
}

/// Item shape for complete_tasks and delete_tasks.
#[derive(Debug, Deserialize)]
struct TaskRefItem {
    project_id: Option<String>,
    task_id: Option<String>,
}

impl TaskRefItem {
    fn into_ids(self) -> Result<(String, String)> {
        let task_id = self
            .task_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("Missing required field 'task_id'".to_string()))?;
        let project_id = self
            .project_id
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::Validation("Missing required field 'project_id'".to_string()))?;
        Ok((project_id, task_id))
    }
}

/// Item shape for create_subtasks.
#[derive(Debug, Deserialize)]
struct CreateSubtaskItem {
    subtask_title: Option<String>,
    parent_task_id: Option<String>,
    project_id: Option<String>,
    content: Option<String>,
    priority: Option<i64>,
}

impl CreateSubtaskItem {
    fn into_payload(self) -> Result<TaskPayload> {
        let title = require_field(self.subtask_title, "subtask_title")?;
        let parent_task_id = require_field(self.parent_task_id, "parent_task_id")?;
        let project_id = require_field(self.project_id, "project_id")?;
        let priority = validate_priority(self.priority)?;

        Ok(TaskPayload {
            title: Some(title),
            project_id: Some(project_id),
            content: self.content,
            priority,
            parent_id: Some(parent_task_id),
            ..Default::default()
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use ticktick_api::CredentialProvider;

    fn create_handler(server: &MockServer) -> ToolHandler {
        let client = TickTickClient::with_base_url(
            server.base_url(),
            Arc::new(CredentialProvider::fixed("test-token")),
        );
        ToolHandler::new(Arc::new(client), DisplayConfig::default())
    }

    fn result_text(result: &ToolCallResult) -> &str {
        let crate::protocol::ToolResultContent::Text { text } = &result.content[0];
        text
    }

    fn task_json(id: &str, title: &str, priority: i64) -> Value {
        serde_json::json!({
            "id": id,
            "projectId": "p1",
            "title": title,
            "priority": priority,
            "status": 0
        })
    }

    #[test]
    fn test_available_tools() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let tools = handler.available_tools();
        assert_eq!(tools.len(), 20);
        for name in [
            "get_all_projects",
            "create_tasks",
            "update_tasks",
            "complete_tasks",
            "delete_tasks",
            "create_subtasks",
            "get_engaged_tasks",
            "get_next_tasks",
            "filter_tasks",
        ] {
            assert!(tools.iter().any(|t| t.name == name), "missing {name}");
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler.execute("no_such_tool", None).await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("Unknown tool"));
    }

    #[tokio::test]
    async fn test_get_all_projects() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project");
            then.status(200).json_body(serde_json::json!([
                {"id": "p1", "name": "Work"},
                {"id": "p2", "name": "Home"}
            ]));
        });

        let handler = create_handler(&server);
        let result = handler.execute("get_all_projects", None).await;
        assert!(result.is_error.is_none());
        let text = result_text(&result);
        assert!(text.starts_with("Found 2 projects:"));
        assert!(text.contains("Name: Work"));
    }

    #[tokio::test]
    async fn test_get_project_info_empty_inbox() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project/inbox/data");
            then.status(200).json_body(serde_json::json!({
                "project": {"id": "inbox", "name": "Inbox"},
                "tasks": []
            }));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "get_project_info",
                Some(serde_json::json!({"project_id": "inbox"})),
            )
            .await;
        let text = result_text(&result);
        assert!(text.contains("📁 PROJECT INFORMATION"));
        assert!(text.contains("Your inbox is empty."));
    }

    #[tokio::test]
    async fn test_create_project_rejects_bad_view_mode() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute(
                "create_project",
                Some(serde_json::json!({"name": "X", "view_mode": "calendar"})),
            )
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("Invalid view_mode"));
    }

    #[tokio::test]
    async fn test_create_project_defaults() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/project")
                .body_includes("\"color\":\"#F18181\"")
                .body_includes("\"viewMode\":\"list\"");
            then.status(200)
                .json_body(serde_json::json!({"id": "p9", "name": "Reading"}));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute("create_project", Some(serde_json::json!({"name": "Reading"})))
            .await;
        mock.assert();
        assert!(result_text(&result).starts_with("Project created successfully:"));
    }

    #[tokio::test]
    async fn test_create_tasks_batch_continues_past_invalid_item() {
        let server = MockServer::start();
        let create = server.mock(|when, then| {
            when.method(POST).path("/task");
            then.status(200).json_body(task_json("t-new", "made", 0));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "create_tasks",
                Some(serde_json::json!({"tasks": [
                    {"title": "one", "project_id": "p1"},
                    {"project_id": "p1"},
                    {"title": "three", "project_id": "p1"}
                ]})),
            )
            .await;

        // Only the two valid items reach the API.
        create.assert_hits(2);
        let text = result_text(&result);
        assert!(text.starts_with("Batch task creation completed."));
        assert!(text.contains("Successfully created: 2 tasks"));
        assert!(text.contains("Failed: 1 tasks"));
        assert!(text.contains("❌ Failed Tasks:"));
        assert!(text.contains("Task 2 ('Unknown')"));
        assert!(text.contains("'title' is required"));
    }

    #[tokio::test]
    async fn test_create_tasks_single_object() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/task")
                .body_includes("\"title\":\"Buy milk\"");
            then.status(200).json_body(task_json("t7", "Buy milk", 0));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "create_tasks",
                Some(serde_json::json!({"tasks": {"title": "Buy milk", "project_id": "inbox"}})),
            )
            .await;
        let text = result_text(&result);
        assert!(text.starts_with("Task created successfully:\n\n"));
        assert!(text.contains("ID: t7"));
    }

    #[tokio::test]
    async fn test_create_tasks_rejects_bad_date() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute(
                "create_tasks",
                Some(serde_json::json!({"tasks": {
                    "title": "x", "project_id": "p1", "due_date": "next tuesday"
                }})),
            )
            .await;
        let text = result_text(&result);
        assert!(text.starts_with("Failed to create task:"));
        assert!(text.contains("Invalid due_date format 'next tuesday'"));
    }

    #[tokio::test]
    async fn test_complete_tasks_single() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/project/p1/task/t1/complete");
            then.status(200);
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "complete_tasks",
                Some(serde_json::json!({"tasks": {"project_id": "p1", "task_id": "t1"}})),
            )
            .await;
        mock.assert();
        assert_eq!(result_text(&result), "Task t1 marked as complete.");
    }

    #[tokio::test]
    async fn test_delete_tasks_batch_report() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/project/p1/task/t1");
            then.status(200);
        });
        server.mock(|when, then| {
            when.method(DELETE).path("/project/p1/task/missing");
            then.status(404).body("not found");
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "delete_tasks",
                Some(serde_json::json!({"tasks": [
                    {"project_id": "p1", "task_id": "t1"},
                    {"project_id": "p1", "task_id": "missing"}
                ]})),
            )
            .await;
        let text = result_text(&result);
        assert!(text.starts_with("Batch task deletion completed."));
        assert!(text.contains("Successfully deleted: 1 tasks"));
        assert!(text.contains("1. Task ID: t1"));
        assert!(text.contains("Task 2 (ID: missing)"));
    }

    #[tokio::test]
    async fn test_create_subtasks_sets_parent() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/task")
                .body_includes("\"parentId\":\"parent1\"");
            then.status(200).json_body(task_json("sub1", "step one", 0));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "create_subtasks",
                Some(serde_json::json!({"subtasks": {
                    "subtask_title": "step one",
                    "parent_task_id": "parent1",
                    "project_id": "p1"
                }})),
            )
            .await;
        mock.assert();
        assert!(result_text(&result).starts_with("Subtask created successfully:"));
    }

    #[tokio::test]
    async fn test_search_tasks_walks_projects_and_inbox() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project");
            then.status(200).json_body(serde_json::json!([
                {"id": "p1", "name": "Work"},
                {"id": "p2", "name": "Archive", "closed": true}
            ]));
        });
        let p1 = server.mock(|when, then| {
            when.method(GET).path("/project/p1/data");
            then.status(200).json_body(serde_json::json!({
                "project": {"id": "p1", "name": "Work"},
                "tasks": [task_json("t1", "Quarterly report", 0), task_json("t2", "Water plants", 0)]
            }));
        });
        let inbox = server.mock(|when, then| {
            when.method(GET).path("/project/inbox/data");
            then.status(200).json_body(serde_json::json!({
                "project": {"id": "inbox", "name": "Inbox"},
                "tasks": [task_json("t3", "Report expenses", 0)]
            }));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute("search_tasks", Some(serde_json::json!({"search_term": "report"})))
            .await;
        p1.assert();
        inbox.assert();

        let text = result_text(&result);
        assert!(text.starts_with("Found 2 projects + Inbox:"));
        // Closed project never fetched; only p1 and inbox sections exist.
        assert!(text.contains("With 1 tasks that are to be 'matching 'report'' in this project :"));
        assert!(text.contains("Quarterly report"));
        assert!(text.contains("Inbox:\nName: Inbox\nID: inbox"));
        assert!(text.contains("Report expenses"));
        assert!(!text.contains("Water plants"));
    }

    #[tokio::test]
    async fn test_search_tasks_empty_term() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute("search_tasks", Some(serde_json::json!({"search_term": "   "})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("Search term cannot be empty."));
    }

    #[tokio::test]
    async fn test_get_tasks_by_priority_invalid() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute("get_tasks_by_priority", Some(serde_json::json!({"priority_id": 2})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("Invalid priority: 2"));
    }

    #[tokio::test]
    async fn test_get_tasks_by_priority_matches() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project");
            then.status(200)
                .json_body(serde_json::json!([{"id": "p1", "name": "Work"}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/project/p1/data");
            then.status(200).json_body(serde_json::json!({
                "tasks": [task_json("t1", "urgent thing", 5), task_json("t2", "someday", 0)]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/project/inbox/data");
            then.status(200).json_body(serde_json::json!({"tasks": []}));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute("get_tasks_by_priority", Some(serde_json::json!({"priority_id": 5})))
            .await;
        let text = result_text(&result);
        assert!(text.contains("With 1 tasks that are to be 'priority High' in this project :"));
        assert!(text.contains("urgent thing"));
        assert!(!text.contains("someday"));
    }

    #[tokio::test]
    async fn test_get_tasks_due_in_days_negative() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute("get_tasks_due_in_days", Some(serde_json::json!({"days": -1})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("non-negative"));
    }

    #[tokio::test]
    async fn test_inbox_failure_keeps_project_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project");
            then.status(200)
                .json_body(serde_json::json!([{"id": "p1", "name": "Work"}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/project/p1/data");
            then.status(200).json_body(serde_json::json!({
                "tasks": [task_json("t1", "something", 0)]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/project/inbox/data");
            then.status(500).body("boom");
        });

        let handler = create_handler(&server);
        let result = handler.execute("get_all_tasks", None).await;
        assert!(result.is_error.is_none());
        let text = result_text(&result);
        assert!(text.contains("something"));
        assert!(text.contains("Inbox: Could not fetch"));
    }

    #[tokio::test]
    async fn test_filter_tasks_point_lookup() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/project/p1/task/t1");
            then.status(200).json_body(task_json("t1", "the one", 3));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "filter_tasks",
                Some(serde_json::json!({"task_id": "t1", "project_id": "p1"})),
            )
            .await;
        mock.assert();
        let text = result_text(&result);
        assert!(text.starts_with("ID: t1"));
        assert!(text.contains("Title: the one"));
    }

    #[tokio::test]
    async fn test_filter_tasks_point_lookup_applies_criteria() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/project/p1/task/t1");
            then.status(200).json_body(task_json("t1", "the one", 3));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "filter_tasks",
                Some(serde_json::json!({
                    "task_id": "t1",
                    "project_id": "p1",
                    "priority": 5
                })),
            )
            .await;
        assert_eq!(result_text(&result), "No matching tasks found.");
    }

    #[tokio::test]
    async fn test_filter_tasks_task_id_requires_project() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute("filter_tasks", Some(serde_json::json!({"task_id": "t1"})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("project_id is required when task_id is given"));
    }

    #[tokio::test]
    async fn test_filter_tasks_custom_requires_days() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute("filter_tasks", Some(serde_json::json!({"date_filter": "custom"})))
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result).contains("custom_days"));
    }

    #[tokio::test]
    async fn test_filter_tasks_single_project_scope() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/project/p1/data");
            then.status(200).json_body(serde_json::json!({
                "tasks": [task_json("t1", "high prio", 5), task_json("t2", "low prio", 1)]
            }));
        });

        let handler = create_handler(&server);
        let result = handler
            .execute(
                "filter_tasks",
                Some(serde_json::json!({
                    "priority": 5,
                    "project_id": "p1",
                    "include_all_projects": false
                })),
            )
            .await;
        mock.assert();
        let text = result_text(&result);
        assert!(text.starts_with("Found 1 matching tasks:"));
        assert!(text.contains("high prio"));
        assert!(!text.contains("low prio"));
    }

    #[tokio::test]
    async fn test_filter_tasks_scoped_without_project_fails() {
        let server = MockServer::start();
        let handler = create_handler(&server);
        let result = handler
            .execute(
                "filter_tasks",
                Some(serde_json::json!({"include_all_projects": false})),
            )
            .await;
        assert_eq!(result.is_error, Some(true));
        assert!(result_text(&result)
            .contains("project_id is required when include_all_projects is false"));
    }
}
