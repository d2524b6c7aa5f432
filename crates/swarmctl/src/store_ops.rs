//! Shared helpers over the task store: task lines, lookups, doc checks
//! and the save/export/lint sequence.

use std::collections::BTreeSet;
use std::path::Path;

use swarm_core::{DependencyState, Task, TaskStatus};
use swarm_docs::sections::validate_required_sections;
use swarm_store::{lint_snapshot_file, parse_frontmatter, LintReport, TaskStore};

use crate::context::AppContext;
use crate::failure::Failure;

pub fn format_list_short(items: &[String], max_items: usize) -> String {
    if items.len() <= max_items {
        return items.join(", ");
    }
    format!(
        "{}, +{}",
        items[..max_items].join(", "),
        items.len() - max_items
    )
}

fn format_deps_summary(task_id: &str, dep_state: Option<&DependencyState>) -> Option<String> {
    let info = dep_state?.get(task_id)?;
    if info.depends_on.is_empty() {
        return Some("deps=none".to_string());
    }
    if !info.missing.is_empty() || !info.incomplete.is_empty() {
        let mut parts = Vec::new();
        if !info.missing.is_empty() {
            parts.push(format!("missing:{}", format_list_short(&info.missing, 3)));
        }
        if !info.incomplete.is_empty() {
            parts.push(format!("wait:{}", format_list_short(&info.incomplete, 3)));
        }
        return Some(format!("deps={}", parts.join(",")));
    }
    Some("deps=ready".to_string())
}

fn format_task_extras(task: &Task, dep_state: Option<&DependencyState>) -> String {
    let mut extras = Vec::new();
    if let Some(owner) = task.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        extras.push(format!("owner={owner}"));
    }
    if let Some(priority) = task
        .priority
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        extras.push(format!("prio={priority}"));
    }
    if let Some(deps) = format_deps_summary(task.id.trim(), dep_state) {
        extras.push(deps);
    }
    if !task.tags.is_empty() {
        extras.push(format!("tags={}", task.tags.join(",")));
    }
    let commands = task.verify_commands();
    if !commands.is_empty() {
        extras.push(format!("verify={}", commands.len()));
    }
    extras.join(", ")
}

pub fn format_task_line(task: &Task, dep_state: Option<&DependencyState>) -> String {
    let title = if task.title.trim().is_empty() {
        "(untitled task)"
    } else {
        task.title.trim()
    };
    let mut line = format!("{} [{}] {}", task.id.trim(), task.status, title);
    let extras = format_task_extras(task, dep_state);
    if !extras.is_empty() {
        line.push_str(&format!(" ({extras})"));
    }
    line
}

pub fn find_task<'a>(tasks: &'a [Task], task_id: &str) -> Result<&'a Task, Failure> {
    tasks
        .iter()
        .find(|task| task.id == task_id)
        .ok_or_else(|| Failure::policy(format!("Unknown task id: {task_id}")))
}

pub fn find_task_mut<'a>(tasks: &'a mut [Task], task_id: &str) -> Result<&'a mut Task, Failure> {
    tasks
        .iter_mut()
        .find(|task| task.id == task_id)
        .ok_or_else(|| Failure::policy(format!("Unknown task id: {task_id}")))
}

/// Save, re-export the snapshot, and (in snapshot mode) lint the result.
pub fn save_and_export(
    ctx: &AppContext,
    store: &mut TaskStore,
    tasks: Vec<Task>,
    quiet: bool,
) -> Result<(), Failure> {
    let local_mode = !store.has_backend();
    store.save(tasks)?;
    let target = store.export_snapshot(None)?;
    if local_mode {
        let report = lint_current_snapshot(ctx)?;
        if !report.is_clean() {
            for message in &report.errors {
                eprintln!("❌ {message}");
            }
            return Err(Failure::policy("tasks snapshot failed lint after write"));
        }
    }
    if !quiet {
        let rel = target
            .strip_prefix(&ctx.repo.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| target.display().to_string());
        println!("✅ exported tasks to {rel}");
    }
    Ok(())
}

pub fn lint_current_snapshot(ctx: &AppContext) -> Result<LintReport, Failure> {
    let agents = ctx.agents_index()?;
    let required = ctx.config.verify_required_tags();
    Ok(lint_snapshot_file(&ctx.paths.tasks_path, &agents, &required)?)
}

/// Readiness wrapper over the store view.
pub fn readiness(store: &mut TaskStore, task_id: &str) -> Result<(bool, Vec<String>), Failure> {
    Ok(store.readiness(task_id)?)
}

pub fn requires_verify(ctx: &AppContext, tags: &[String]) -> bool {
    let required = ctx.config.verify_required_tags();
    tags.iter()
        .map(|tag| tag.trim().to_lowercase())
        .any(|tag| required.contains(&tag))
}

/// The README sections a task must fill before it can be finished.
pub fn validate_task_doc_complete(
    ctx: &AppContext,
    task_id: &str,
    source_text: Option<&str>,
) -> Result<(), Failure> {
    let text = match source_text {
        Some(text) => text.to_string(),
        None => {
            let readme = ctx.paths.task_readme_path(task_id);
            if !readme.exists() {
                return Ok(());
            }
            std::fs::read_to_string(&readme).map_err(|err| Failure::msg(err.to_string()))?
        }
    };
    let required = ctx.config.doc_required_sections()?;
    let (missing, empty) = validate_required_sections(&text, &required);
    if !missing.is_empty() {
        return Err(Failure::policy(format!(
            "{task_id}: task doc missing required section(s): {}",
            missing.join(", ")
        )));
    }
    if !empty.is_empty() {
        return Err(Failure::policy(format!(
            "{task_id}: task doc has placeholder/empty section(s): {}",
            empty.join(", ")
        )));
    }
    Ok(())
}

/// Staged task READMEs must carry agentctl doc metadata; hand-edited
/// frontmatter is rejected before commit.
pub fn validate_task_readme_metadata(
    ctx: &AppContext,
    staged: &[String],
    cwd: &Path,
) -> Result<(), Failure> {
    let workflow_rel = ctx
        .paths
        .workflow_dir
        .strip_prefix(&ctx.repo.root)
        .map(|rel| rel.display().to_string())
        .unwrap_or_default();
    for path in staged {
        if workflow_rel.is_empty()
            || !path.starts_with(&format!("{workflow_rel}/"))
            || !path.ends_with("/README.md")
        {
            continue;
        }
        let target = cwd.join(path);
        if !target.exists() {
            continue;
        }
        let content =
            std::fs::read_to_string(&target).map_err(|err| Failure::msg(err.to_string()))?;
        let doc = parse_frontmatter(&content);
        let updated_by = doc
            .frontmatter
            .get("doc_updated_by")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let updated_at = doc
            .frontmatter
            .get("doc_updated_at")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let has_version = doc.frontmatter.get("doc_version").is_some();
        if updated_by.trim().is_empty() || updated_at.trim().is_empty() || !has_version {
            return Err(Failure::policy(format!(
                "Task README {path} is missing agentctl doc metadata.\n\
                 Fix:\n  1) Use `agentctl task doc set ...` to update task docs\n  2) Re-stage the README after agentctl updates it"
            )));
        }
    }
    Ok(())
}

/// Search blob: every searchable text field of a task.
pub fn task_text_blob(task: &Task) -> String {
    let mut parts: Vec<String> = Vec::new();
    for value in [
        Some(task.id.as_str()),
        Some(task.title.as_str()),
        task.description.as_deref(),
        Some(task.status.as_str()),
        task.priority.as_deref(),
        task.owner.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        let value = value.trim();
        if !value.is_empty() {
            parts.push(value.to_string());
        }
    }
    parts.extend(task.tags.iter().map(|tag| tag.trim().to_string()));
    for comment in &task.comments {
        parts.push(comment.author.trim().to_string());
        parts.push(comment.body.trim().to_string());
    }
    if let Some(commit) = &task.commit {
        parts.push(commit.hash.trim().to_string());
        parts.push(commit.message.trim().to_string());
    }
    parts.retain(|part| !part.is_empty());
    parts.join("\n")
}

/// Status/owner/tag filters shared by list, next and search.
pub fn filter_tasks(
    tasks: Vec<Task>,
    statuses: &[String],
    owners: &[String],
    tags: &[String],
) -> Vec<Task> {
    let status_set: BTreeSet<String> = statuses
        .iter()
        .map(|status| status.trim().to_uppercase())
        .collect();
    let owner_set: BTreeSet<String> = owners
        .iter()
        .map(|owner| owner.trim().to_uppercase())
        .collect();
    let tag_set: BTreeSet<String> = tags.iter().map(|tag| tag.trim().to_string()).collect();
    tasks
        .into_iter()
        .filter(|task| {
            status_set.is_empty() || status_set.contains(task.status.as_str())
        })
        .filter(|task| {
            owner_set.is_empty()
                || owner_set.contains(
                    &task
                        .owner
                        .as_deref()
                        .unwrap_or("")
                        .trim()
                        .to_uppercase(),
                )
        })
        .filter(|task| {
            tag_set.is_empty() || task.tags.iter().any(|tag| tag_set.contains(tag.trim()))
        })
        .collect()
}

/// Sorted by id, duplicates removed (first record wins).
pub fn sorted_unique_tasks(tasks: &[Task]) -> Vec<Task> {
    let mut seen = BTreeSet::new();
    let mut sorted: Vec<Task> = tasks
        .iter()
        .filter(|task| seen.insert(task.id.clone()))
        .cloned()
        .collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));
    sorted
}

pub fn status_counts_summary(tasks: &[Task]) -> String {
    let mut counts: std::collections::BTreeMap<&'static str, usize> =
        std::collections::BTreeMap::new();
    for task in tasks {
        *counts.entry(task.status.as_str()).or_default() += 1;
    }
    let summary = counts
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("Total: {} ({summary})", tasks.len())
}

pub fn parse_status(raw: &str) -> Result<TaskStatus, Failure> {
    raw.parse::<TaskStatus>()
        .map_err(|message| Failure::policy(format!("Invalid status: {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{compute_dependency_state, index_tasks};

    fn mk(id: &str, status: TaskStatus) -> Task {
        let mut task = Task::new(id, format!("Task {id}"));
        task.status = status;
        task
    }

    #[test]
    fn task_line_includes_status_and_extras() {
        let mut task = mk("202501020304-ABCD12", TaskStatus::Doing);
        task.owner = Some("CODER".to_string());
        task.priority = Some("med".to_string());
        task.tags = vec!["code".to_string()];
        task.verify = vec!["make test".to_string()];

        let (index, _) = index_tasks(std::slice::from_ref(&task));
        let (dep_state, _) = compute_dependency_state(&index);
        let line = format_task_line(&task, Some(&dep_state));
        assert!(line.starts_with("202501020304-ABCD12 [DOING] Task 202501020304-ABCD12"));
        assert!(line.contains("owner=CODER"));
        assert!(line.contains("prio=med"));
        assert!(line.contains("deps=none"));
        assert!(line.contains("tags=code"));
        assert!(line.contains("verify=1"));
    }

    #[test]
    fn dep_summary_reports_waits() {
        let mut blocked = mk("B", TaskStatus::Todo);
        blocked.depends_on = vec!["A".to_string()];
        let tasks = vec![mk("A", TaskStatus::Doing), blocked.clone()];
        let (index, _) = index_tasks(&tasks);
        let (dep_state, _) = compute_dependency_state(&index);
        let line = format_task_line(&blocked, Some(&dep_state));
        assert!(line.contains("deps=wait:A"));
    }

    #[test]
    fn filters_compose() {
        let mut a = mk("A", TaskStatus::Todo);
        a.owner = Some("CODER".to_string());
        a.tags = vec!["code".to_string()];
        let mut b = mk("B", TaskStatus::Doing);
        b.owner = Some("DOCS".to_string());

        let filtered = filter_tasks(
            vec![a.clone(), b],
            &["todo".to_string()],
            &["coder".to_string()],
            &[],
        );
        assert_eq!(filtered, vec![a]);
    }

    #[test]
    fn blob_contains_comments_and_commit() {
        let mut task = mk("A", TaskStatus::Done);
        task.push_comment("CODER", "Start: working");
        task.commit = Some(swarm_core::CommitRecord {
            hash: "abc1234".to_string(),
            message: "✅ A close".to_string(),
        });
        let blob = task_text_blob(&task);
        assert!(blob.contains("Start: working"));
        assert!(blob.contains("abc1234"));
    }

    #[test]
    fn sorted_unique_drops_later_duplicates() {
        let tasks = vec![mk("B", TaskStatus::Todo), mk("A", TaskStatus::Todo), {
            let mut dup = mk("B", TaskStatus::Done);
            dup.title = "dup".to_string();
            dup
        }];
        let sorted = sorted_unique_tasks(&tasks);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].id, "A");
        assert_eq!(sorted[1].status, TaskStatus::Todo, "first record wins");
    }

    #[test]
    fn counts_summary_formats_totals() {
        let tasks = vec![mk("A", TaskStatus::Todo), mk("B", TaskStatus::Todo)];
        assert_eq!(status_counts_summary(&tasks), "Total: 2 (TODO=2)");
    }
}
