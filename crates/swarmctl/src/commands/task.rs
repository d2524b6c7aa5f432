//! Task CRUD and queries: list, next, search, show, new, add, update,
//! comment, scrub, lint, scaffold, export, normalize, migrate, doc.

use clap::Args;

use swarm_core::{
    normalize_task_ids, validate_owner, EventKind, Task, TaskStatus,
};
use swarm_docs::{
    normalize_doc_section_name, parse_doc_sections, render_doc_sections, ensure_required_sections,
    split_frontmatter_block, task_readme_template,
};
use swarm_store::{read_snapshot, StoreError};

use crate::context::{resolve_under_root, AppContext};
use crate::failure::Failure;
use crate::store_ops::{
    filter_tasks, find_task, find_task_mut, format_task_line, lint_current_snapshot,
    requires_verify, save_and_export, status_counts_summary, task_text_blob,
};

#[derive(Debug, Args)]
pub struct TaskListOpts {
    #[arg(long)]
    pub status: Vec<String>,
    #[arg(long)]
    pub owner: Vec<String>,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskNextOpts {
    #[arg(long)]
    pub status: Vec<String>,
    #[arg(long)]
    pub owner: Vec<String>,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskSearchOpts {
    pub query: String,
    #[arg(long)]
    pub status: Vec<String>,
    #[arg(long)]
    pub owner: Vec<String>,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long)]
    pub regex: bool,
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskShowOpts {
    pub task_id: String,
    #[arg(long = "last-comments", default_value = "5")]
    pub last_comments: usize,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskNewOpts {
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, default_value = "med")]
    pub priority: String,
    #[arg(long)]
    pub owner: String,
    #[arg(long, default_value = "TODO")]
    pub status: String,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long = "depends-on")]
    pub depends_on: Vec<String>,
    #[arg(long)]
    pub verify: Vec<String>,
    #[arg(long = "id-length")]
    pub id_length: Option<usize>,
    #[arg(long = "comment-author")]
    pub comment_author: Option<String>,
    #[arg(long = "comment-body")]
    pub comment_body: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskAddOpts {
    /// Explicit task id(s)
    #[arg(required = true)]
    pub task_id: Vec<String>,
    #[arg(long)]
    pub title: String,
    #[arg(long)]
    pub description: String,
    #[arg(long, default_value = "med")]
    pub priority: String,
    #[arg(long)]
    pub owner: String,
    #[arg(long, default_value = "TODO")]
    pub status: String,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long = "depends-on")]
    pub depends_on: Vec<String>,
    #[arg(long)]
    pub verify: Vec<String>,
    #[arg(long = "comment-author")]
    pub comment_author: Option<String>,
    #[arg(long = "comment-body")]
    pub comment_body: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskUpdateOpts {
    pub task_id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long)]
    pub owner: Option<String>,
    #[arg(long)]
    pub tag: Vec<String>,
    #[arg(long = "replace-tags")]
    pub replace_tags: bool,
    #[arg(long = "depends-on")]
    pub depends_on: Vec<String>,
    #[arg(long = "replace-depends-on")]
    pub replace_depends_on: bool,
    #[arg(long)]
    pub verify: Vec<String>,
    #[arg(long = "replace-verify")]
    pub replace_verify: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskCommentOpts {
    pub task_id: String,
    #[arg(long)]
    pub author: String,
    #[arg(long)]
    pub body: String,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskScrubOpts {
    #[arg(long)]
    pub find: String,
    #[arg(long, default_value = "")]
    pub replace: String,
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskLintOpts {
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskScaffoldOpts {
    pub task_id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub overwrite: bool,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskExportOpts {
    #[arg(long)]
    pub out: Option<String>,
    #[arg(long, default_value = "json")]
    pub format: String,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskNormalizeOpts {
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskMigrateOpts {
    #[arg(long)]
    pub source: Option<String>,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskDocShowOpts {
    pub task_id: String,
    #[arg(long)]
    pub section: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TaskDocSetOpts {
    pub task_id: String,
    #[arg(long)]
    pub text: Option<String>,
    #[arg(long)]
    pub file: Option<String>,
    #[arg(long)]
    pub section: Option<String>,
    #[arg(long, default_value = "agentctl")]
    pub author: String,
    #[arg(long, short)]
    pub quiet: bool,
}

fn print_warnings(warnings: &[String], quiet: bool) {
    if quiet {
        return;
    }
    for warning in warnings {
        println!("⚠️ {warning}");
    }
}

pub fn cmd_task_list(ctx: &AppContext, opts: &TaskListOpts) -> Result<(), Failure> {
    let mut store = ctx.make_store()?;
    let view = store.view()?;
    print_warnings(&view.warnings(), opts.quiet);
    let dep_state = view.dep_state.clone();
    let tasks: Vec<Task> = view.index.values().cloned().collect();
    let filtered = filter_tasks(tasks, &opts.status, &opts.owner, &opts.tag);
    for task in &filtered {
        println!("{}", format_task_line(task, Some(&dep_state)));
    }
    if !opts.quiet {
        println!("{}", status_counts_summary(&filtered));
    }
    Ok(())
}

pub fn cmd_task_next(ctx: &AppContext, opts: &TaskNextOpts) -> Result<(), Failure> {
    let mut store = ctx.make_store()?;
    let view = store.view()?;
    print_warnings(&view.warnings(), opts.quiet);
    let dep_state = view.dep_state.clone();
    let tasks: Vec<Task> = view.index.values().cloned().collect();
    let statuses = if opts.status.is_empty() {
        vec!["TODO".to_string()]
    } else {
        opts.status.clone()
    };
    let filtered = filter_tasks(tasks, &statuses, &opts.owner, &opts.tag);
    let total = filtered.len();
    let mut ready_tasks: Vec<Task> = filtered
        .into_iter()
        .filter(|task| {
            dep_state
                .get(task.id.trim())
                .map(|info| info.is_ready())
                .unwrap_or(true)
        })
        .collect();
    if let Some(limit) = opts.limit {
        ready_tasks.truncate(limit);
    }
    for task in &ready_tasks {
        println!("{}", format_task_line(task, Some(&dep_state)));
    }
    if !opts.quiet {
        println!("Ready: {} / {}", ready_tasks.len(), total);
    }
    Ok(())
}

pub fn cmd_task_search(ctx: &AppContext, opts: &TaskSearchOpts) -> Result<(), Failure> {
    let query = opts.query.trim();
    if query.is_empty() {
        return Err(Failure::policy("Query must be non-empty"));
    }
    let mut store = ctx.make_store()?;
    let view = store.view()?;
    print_warnings(&view.warnings(), opts.quiet);
    let dep_state = view.dep_state.clone();
    let tasks: Vec<Task> = view.index.values().cloned().collect();
    let filtered = filter_tasks(tasks, &opts.status, &opts.owner, &opts.tag);

    let mut matches: Vec<Task> = if opts.regex {
        let pattern = regex::RegexBuilder::new(query)
            .case_insensitive(true)
            .build()
            .map_err(|err| Failure::policy(format!("Invalid regex: {err}")))?;
        filtered
            .into_iter()
            .filter(|task| pattern.is_match(&task_text_blob(task)))
            .collect()
    } else {
        let needle = query.to_lowercase();
        filtered
            .into_iter()
            .filter(|task| task_text_blob(task).to_lowercase().contains(&needle))
            .collect()
    };
    if let Some(limit) = opts.limit {
        matches.truncate(limit);
    }
    for task in &matches {
        println!("{}", format_task_line(task, Some(&dep_state)));
    }
    Ok(())
}

pub fn cmd_task_show(ctx: &AppContext, opts: &TaskShowOpts) -> Result<(), Failure> {
    let mut store = ctx.make_store()?;
    let view = store.view()?;
    print_warnings(&view.warnings(), opts.quiet);
    let Some(task) = view.index.get(opts.task_id.trim()).cloned() else {
        return Err(Failure::policy(format!("Unknown task id: {}", opts.task_id)));
    };
    let info = view.dep_state.get(opts.task_id.trim()).cloned();

    println!("ID: {}", task.id);
    println!("Title: {}", task.title.trim());
    println!("Status: {}", task.status);
    println!(
        "Priority: {}",
        task.priority.as_deref().map(str::trim).filter(|p| !p.is_empty()).unwrap_or("-")
    );
    println!(
        "Owner: {}",
        task.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()).unwrap_or("-")
    );
    let depends_on = info.as_ref().map(|i| i.depends_on.clone()).unwrap_or_default();
    println!(
        "Depends on: {}",
        if depends_on.is_empty() {
            "-".to_string()
        } else {
            depends_on.join(", ")
        }
    );
    let ready = info.as_ref().map(|i| i.is_ready()).unwrap_or(true);
    println!("Ready: {}", if ready { "yes" } else { "no" });
    if let Some(info) = &info {
        if !info.missing.is_empty() {
            println!("Missing deps: {}", info.missing.join(", "));
        }
        if !info.incomplete.is_empty() {
            println!("Incomplete deps: {}", info.incomplete.join(", "));
        }
    }
    println!(
        "Tags: {}",
        if task.tags.is_empty() {
            "-".to_string()
        } else {
            task.tags.join(", ")
        }
    );
    if task.doc_version.is_some() || task.doc_updated_at.is_some() || task.doc_updated_by.is_some()
    {
        let mut doc_parts = Vec::new();
        if let Some(version) = task.doc_version {
            doc_parts.push(format!("v{version}"));
        }
        if let Some(at) = &task.doc_updated_at {
            doc_parts.push(format!("updated_at={at}"));
        }
        if let Some(by) = &task.doc_updated_by {
            doc_parts.push(format!("updated_by={by}"));
        }
        println!("Doc: {}", doc_parts.join(", "));
    }
    let readme_path = ctx.paths.task_readme_path(&task.id);
    if readme_path.exists() {
        let rel = readme_path
            .strip_prefix(&ctx.repo.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| readme_path.display().to_string());
        println!("Doc file: {rel}");
    }
    if let Some(description) = task.description.as_deref().map(str::trim).filter(|d| !d.is_empty())
    {
        println!();
        println!("Description:");
        println!("{description}");
    }
    let commands = task.verify_commands();
    println!();
    println!("Verify ({}):", commands.len());
    if commands.is_empty() {
        println!("- (none)");
    } else {
        for command in &commands {
            println!("- {command}");
        }
    }
    if let Some(commit) = &task.commit {
        println!();
        println!("Commit:");
        println!("{}", format!("{} {}", commit.hash, commit.message).trim_end());
    }
    if !task.comments.is_empty() {
        println!();
        println!(
            "Comments (total {}, showing last {}):",
            task.comments.len(),
            opts.last_comments
        );
        let start = task.comments.len().saturating_sub(opts.last_comments);
        for comment in &task.comments[start..] {
            println!("- {}: {}", comment.author, comment.body.trim());
        }
    }
    Ok(())
}

fn dedup_preserving_order(values: &[String]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    values
        .iter()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty() && value != "[]")
        .filter(|value| seen.insert(value.clone()))
        .collect()
}

fn build_task(
    task_id: String,
    title: &str,
    description: &str,
    status: TaskStatus,
    priority: &str,
    owner: &str,
    tags: &[String],
    depends_on: &[String],
    verify: &[String],
    comment: Option<(String, String)>,
) -> Task {
    let mut task = Task::new(task_id, title);
    task.description = Some(description.to_string());
    task.status = status;
    task.priority = Some(priority.to_string());
    task.owner = Some(owner.to_string());
    task.tags = dedup_preserving_order(tags);
    task.depends_on = dedup_preserving_order(depends_on);
    task.verify = dedup_preserving_order(verify);
    if let Some((author, body)) = comment {
        task.push_comment(author, body);
    }
    task
}

pub fn cmd_task_new(ctx: &AppContext, opts: &TaskNewOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(false)?;
    let status = crate::store_ops::parse_status(&opts.status)?;
    validate_owner(&opts.owner, &ctx.agents_index()?).map_err(Failure::policy)?;

    let mut store = ctx.make_store()?;
    let tasks = store.load()?;
    let existing: std::collections::BTreeSet<String> =
        tasks.iter().map(|task| task.id.clone()).collect();

    let id_length = match opts.id_length {
        Some(length) if (4..=12).contains(&length) => length,
        Some(length) => {
            return Err(Failure::policy(format!(
                "--id-length must be between 4 and 12 (got: {length})"
            )));
        }
        None => ctx.config.id_suffix_length_default()?,
    };

    let verify = dedup_preserving_order(&opts.verify);
    let tags = dedup_preserving_order(&opts.tag);
    if requires_verify(ctx, &tags) && verify.is_empty() {
        return Err(Failure::policy(
            "verify commands are required for tasks with code/backend/frontend tags",
        ));
    }

    let task_id = generate_task_id(ctx, &mut store, &existing, id_length)?;
    let comment = match (&opts.comment_author, &opts.comment_body) {
        (Some(author), Some(body)) => Some((author.clone(), body.clone())),
        _ => None,
    };
    let task = build_task(
        task_id.clone(),
        &opts.title,
        &opts.description,
        status,
        &opts.priority,
        &opts.owner,
        &tags,
        &opts.depends_on,
        &verify,
        comment,
    );
    let mut tasks = tasks;
    tasks.push(task);
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::TaskCreated {
            title: opts.title.clone(),
        },
    );
    if opts.quiet {
        println!("{task_id}");
    } else {
        println!("✅ created {task_id}");
    }
    Ok(())
}

fn generate_task_id(
    ctx: &AppContext,
    store: &mut swarm_store::TaskStore,
    existing: &std::collections::BTreeSet<String>,
    length: usize,
) -> Result<String, Failure> {
    // Id generation goes through the backend when it offers it; the
    // fallback is a throwaway local backend over the tasks root.
    let fallback = swarm_store::LocalBackend::new(&ctx.paths.workflow_dir);
    let attempts = 1000;
    for _ in 0..attempts {
        let candidate = match store.backend().and_then(|backend| backend.id_generator()) {
            Some(generator) => generator.generate_task_id(length, 1)?,
            None => {
                use swarm_store::GenerateTaskId;
                fallback.generate_task_id(length, 1)?
            }
        };
        if !candidate.is_empty() && !existing.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(StoreError::IdGeneration.into())
}

pub fn cmd_task_add(ctx: &AppContext, opts: &TaskAddOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(false)?;
    let task_ids =
        normalize_task_ids(opts.task_id.iter().map(String::as_str)).map_err(Failure::policy)?;
    let status = crate::store_ops::parse_status(&opts.status)?;

    let mut store = ctx.make_store()?;
    let mut tasks = store.load()?;
    let existing: std::collections::BTreeSet<String> =
        tasks.iter().map(|task| task.id.clone()).collect();
    for task_id in &task_ids {
        if existing.contains(task_id) {
            return Err(Failure::policy(format!("Task already exists: {task_id}")));
        }
    }
    for task_id in &task_ids {
        let comment = match (&opts.comment_author, &opts.comment_body) {
            (Some(author), Some(body)) => Some((author.clone(), body.clone())),
            _ => None,
        };
        tasks.push(build_task(
            task_id.clone(),
            &opts.title,
            &opts.description,
            status,
            &opts.priority,
            &opts.owner,
            &opts.tag,
            &opts.depends_on,
            &opts.verify,
            comment,
        ));
        ctx.emit(
            Some(task_id.as_str()),
            EventKind::TaskCreated {
                title: opts.title.clone(),
            },
        );
    }
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    if !opts.quiet {
        println!("✅ added {} task(s)", task_ids.len());
    }
    Ok(())
}

pub fn cmd_task_update(ctx: &AppContext, opts: &TaskUpdateOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(false)?;
    let mut store = ctx.make_store()?;
    let mut tasks = store.load()?;
    {
        let task = find_task_mut(&mut tasks, opts.task_id.trim())?;

        if let Some(title) = &opts.title {
            task.title = title.clone();
        }
        if let Some(description) = &opts.description {
            task.description = Some(description.clone());
        }
        if let Some(priority) = &opts.priority {
            task.priority = Some(priority.clone());
        }
        if opts.replace_tags {
            task.tags.clear();
        }
        if !opts.tag.is_empty() {
            let mut merged = task.tags.clone();
            merged.extend(opts.tag.clone());
            task.tags = dedup_preserving_order(&merged);
        }
        if opts.replace_depends_on {
            task.depends_on.clear();
        }
        if !opts.depends_on.is_empty() {
            let mut merged = task.depends_on.clone();
            merged.extend(opts.depends_on.clone());
            task.depends_on = dedup_preserving_order(&merged);
        }
        if opts.replace_verify {
            task.verify.clear();
        }
        if !opts.verify.is_empty() {
            let mut merged = task.verify.clone();
            merged.extend(opts.verify.clone());
            task.verify = dedup_preserving_order(&merged);
        }
    }
    if let Some(owner) = &opts.owner {
        validate_owner(owner, &ctx.agents_index()?).map_err(Failure::policy)?;
        find_task_mut(&mut tasks, opts.task_id.trim())?.owner = Some(owner.clone());
    }
    {
        let task = find_task(&tasks, opts.task_id.trim())?;
        if requires_verify(ctx, &task.tags) && task.verify_commands().is_empty() {
            return Err(Failure::policy(
                "verify commands are required for tasks with code/backend/frontend tags",
            ));
        }
    }
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    Ok(())
}

pub fn cmd_task_comment(ctx: &AppContext, opts: &TaskCommentOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(false)?;
    let mut store = ctx.make_store()?;
    let mut tasks = store.load()?;
    find_task_mut(&mut tasks, opts.task_id.trim())?
        .push_comment(&opts.author, &opts.body);
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    ctx.emit(
        Some(opts.task_id.trim()),
        EventKind::CommentAdded {
            author: opts.author.clone(),
        },
    );
    Ok(())
}

pub fn cmd_task_scrub(ctx: &AppContext, opts: &TaskScrubOpts) -> Result<(), Failure> {
    if opts.find.is_empty() {
        return Err(Failure::policy("--find must be non-empty"));
    }
    ctx.require_tasks_write_context(false)?;
    let mut store = ctx.make_store()?;
    let tasks = store.load()?;

    let mut updated_tasks = Vec::with_capacity(tasks.len());
    let mut changed_ids = std::collections::BTreeSet::new();
    for task in tasks {
        let before = serde_json::to_value(&task).map_err(|err| Failure::msg(err.to_string()))?;
        let after = scrub_value(before.clone(), &opts.find, &opts.replace);
        if after != before {
            changed_ids.insert(task.id.clone());
        }
        let scrubbed: Task =
            serde_json::from_value(after).map_err(|err| Failure::msg(err.to_string()))?;
        updated_tasks.push(scrubbed);
    }

    if opts.dry_run {
        if !opts.quiet {
            println!("Would update {} task(s).", changed_ids.len());
            for task_id in &changed_ids {
                println!("{task_id}");
            }
        }
        return Ok(());
    }

    save_and_export(ctx, &mut store, updated_tasks, opts.quiet)?;
    if !opts.quiet {
        println!("Updated {} task(s).", changed_ids.len());
    }
    Ok(())
}

fn scrub_value(value: serde_json::Value, find: &str, replace: &str) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => {
            serde_json::Value::String(text.replace(find, replace))
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|item| scrub_value(item, find, replace))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(key, item)| (key, scrub_value(item, find, replace)))
                .collect(),
        ),
        other => other,
    }
}

pub fn cmd_task_lint(ctx: &AppContext, opts: &TaskLintOpts) -> Result<(), Failure> {
    let report = lint_current_snapshot(ctx)?;
    if !opts.quiet {
        for message in &report.warnings {
            println!("⚠️ {message}");
        }
    }
    if !report.is_clean() {
        for message in &report.errors {
            eprintln!("❌ {message}");
        }
        return Err(Failure {
            message: String::new(),
            code: 2,
        });
    }
    println!("✅ {} OK", ctx.paths.tasks_path_rel);
    Ok(())
}

/// Scaffolds the per-task README, preserving an existing frontmatter
/// block (rewritten through the backend when one is configured).
pub fn scaffold_readme(
    ctx: &AppContext,
    task_id: &str,
    title: Option<&str>,
    force: bool,
    overwrite: bool,
    quiet: bool,
) -> Result<(), Failure> {
    let task_id = task_id.trim();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }

    let mut store = ctx.make_store()?;
    let mut title = title.map(str::to_string);
    let mut known_task: Option<Task> = None;
    if title.is_none() && !force {
        let tasks = store.load()?;
        let task = find_task(&tasks, task_id)?;
        title = Some(task.title.trim().to_string());
        known_task = Some(task.clone());
    }

    let target = ctx.paths.task_readme_path(task_id);
    if target.exists() && !overwrite {
        return Err(Failure::policy(format!(
            "File already exists: {}",
            target.display()
        )));
    }
    std::fs::create_dir_all(target.parent().unwrap_or(&ctx.paths.workflow_dir))
        .map_err(|err| Failure::msg(err.to_string()))?;

    let mut frontmatter = String::new();
    if target.exists() {
        let existing =
            std::fs::read_to_string(&target).map_err(|err| Failure::msg(err.to_string()))?;
        frontmatter = split_frontmatter_block(&existing).0;
    }
    // Writing through the backend refreshes the frontmatter canonically.
    if let (Some(task), Some(backend)) = (&known_task, store.backend()) {
        backend.write_task(task)?;
        if target.exists() {
            let existing =
                std::fs::read_to_string(&target).map_err(|err| Failure::msg(err.to_string()))?;
            frontmatter = split_frontmatter_block(&existing).0;
        }
        store.invalidate();
    }

    let template = task_readme_template(task_id, title.as_deref(), &ctx.config.doc_sections());
    let content = if frontmatter.is_empty() {
        format!("{template}\n")
    } else {
        format!("{}\n\n{template}\n", frontmatter.trim_end())
    };
    std::fs::write(&target, content).map_err(|err| Failure::msg(err.to_string()))?;
    if !quiet {
        let rel = target
            .strip_prefix(&ctx.repo.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| target.display().to_string());
        println!("✅ wrote {rel}");
    }
    Ok(())
}

pub fn cmd_task_scaffold(ctx: &AppContext, opts: &TaskScaffoldOpts) -> Result<(), Failure> {
    scaffold_readme(
        ctx,
        &opts.task_id,
        opts.title.as_deref(),
        opts.force,
        opts.overwrite,
        opts.quiet,
    )
}

pub fn cmd_task_export(ctx: &AppContext, opts: &TaskExportOpts) -> Result<(), Failure> {
    let format = opts.format.trim().to_lowercase();
    if format != "json" {
        return Err(Failure::policy(format!("Unsupported export format: {format}")));
    }
    let mut store = ctx.make_store()?;
    let target = match &opts.out {
        Some(out) => Some(resolve_under_root(&ctx.repo.root, out, "task export output")?),
        None => None,
    };
    let written = store.export_snapshot(target.as_deref())?;
    ctx.emit(None, EventKind::SnapshotExported);
    if !opts.quiet {
        let rel = written
            .strip_prefix(&ctx.repo.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| written.display().to_string());
        println!("✅ exported tasks to {rel}");
    }
    Ok(())
}

pub fn cmd_task_normalize(ctx: &AppContext, opts: &TaskNormalizeOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(opts.force)?;
    let mut store = ctx.make_store()?;
    let count = match store.backend() {
        None => {
            return Err(Failure::policy(
                "No backend configured (set tasks_backend.config_path in .codex-swarm/config.json)",
            ));
        }
        Some(backend) => match backend.normalizer() {
            Some(normalizer) => normalizer.normalize_tasks()?,
            None => {
                let tasks = backend.list_tasks()?;
                backend.write_tasks(&tasks)?;
                tasks.len()
            }
        },
    };
    store.invalidate();
    if !opts.quiet {
        println!("✅ normalized {count} task(s)");
    }
    Ok(())
}

pub fn cmd_task_migrate(ctx: &AppContext, opts: &TaskMigrateOpts) -> Result<(), Failure> {
    ctx.require_tasks_write_context(opts.force)?;
    let store = ctx.make_store()?;
    let Some(backend) = store.backend() else {
        return Err(Failure::policy(
            "No backend configured (set tasks_backend.config_path in .codex-swarm/config.json)",
        ));
    };
    let source = match &opts.source {
        Some(raw) => resolve_under_root(&ctx.repo.root, raw, "task migrate source")?,
        None => ctx.paths.tasks_path.clone(),
    };
    let doc = read_snapshot(&source)?;
    backend.write_tasks(&doc.tasks)?;
    if !opts.quiet {
        println!("✅ migrated {} task(s) into backend", doc.tasks.len());
    }
    Ok(())
}

pub fn cmd_task_doc_show(ctx: &AppContext, opts: &TaskDocShowOpts) -> Result<(), Failure> {
    let store = ctx.make_store()?;
    let Some(backend) = store.backend() else {
        return Err(Failure::policy(
            "No backend configured (set tasks_backend.config_path in .codex-swarm/config.json)",
        ));
    };
    let Some(docs) = backend.docs() else {
        return Err(Failure::policy("Configured backend does not support task docs"));
    };
    let doc = docs.get_task_doc(opts.task_id.trim())?;
    if let Some(section) = &opts.section {
        let canonical = ctx.config.doc_sections();
        let section_name = normalize_doc_section_name(section, &canonical);
        let (sections, _) = parse_doc_sections(&doc);
        if let Some(lines) = sections.get(&section_name) {
            let content = lines.join("\n").trim_end().to_string();
            if !content.trim().is_empty() {
                println!("{content}");
                return Ok(());
            }
        }
        if !opts.quiet {
            println!("ℹ️ no content for section: {section_name}");
        }
        return Ok(());
    }
    if !doc.trim().is_empty() {
        println!("{}", doc.trim_end());
        return Ok(());
    }
    if !opts.quiet {
        println!("ℹ️ no task doc metadata");
    }
    Ok(())
}

pub fn cmd_task_doc_set(ctx: &AppContext, opts: &TaskDocSetOpts) -> Result<(), Failure> {
    let store = ctx.make_store()?;
    let Some(backend) = store.backend() else {
        return Err(Failure::policy(
            "No backend configured (set tasks_backend.config_path in .codex-swarm/config.json)",
        ));
    };
    let Some(docs) = backend.docs() else {
        return Err(Failure::policy("Configured backend does not support task docs"));
    };

    if opts.text.is_some() && opts.file.is_some() {
        return Err(Failure::policy("Use only one of --text or --file"));
    }
    let mut doc = match (&opts.text, &opts.file) {
        (Some(text), _) => text.clone(),
        (None, Some(source)) => {
            if source == "-" {
                use std::io::Read;
                let mut buffer = String::new();
                std::io::stdin()
                    .read_to_string(&mut buffer)
                    .map_err(|err| Failure::msg(err.to_string()))?;
                buffer
            } else {
                let path = resolve_under_root(&ctx.repo.root, source, "task doc source")?;
                std::fs::read_to_string(&path).map_err(|err| Failure::msg(err.to_string()))?
            }
        }
        (None, None) => {
            return Err(Failure::policy("Provide --text or --file to set task docs"));
        }
    };

    if let Some(section) = &opts.section {
        let canonical = ctx.config.doc_sections();
        let section_name = normalize_doc_section_name(section, &canonical);
        if section_name.is_empty() {
            return Err(Failure::policy("--section must be non-empty"));
        }
        let existing = docs.get_task_doc(opts.task_id.trim())?;
        let (mut sections, order) = parse_doc_sections(&existing);
        let required = ctx.config.doc_required_sections()?;
        let order = ensure_required_sections(&mut sections, order, &required, &canonical);
        sections.insert(
            section_name.clone(),
            doc.lines().map(|line| line.trim_end().to_string()).collect(),
        );
        let order = swarm_docs::insert_section_order(&order, &section_name, &canonical);
        doc = render_doc_sections(&sections, &order, &canonical);
    }
    docs.set_task_doc(opts.task_id.trim(), &doc, &opts.author)?;
    if !opts.quiet {
        println!("✅ updated task doc for {}", opts.task_id.trim());
    }
    Ok(())
}

/// `agents`: list agent descriptors and fail on duplicate ids.
pub fn cmd_agents(ctx: &AppContext) -> Result<(), Failure> {
    let descriptors = swarm_core::load_agent_descriptors(&ctx.paths.agents_dir)?;
    if descriptors.is_empty() {
        return Err(Failure::msg(format!(
            "No agents found under {}",
            ctx.paths.agents_dir.display()
        )));
    }
    let mut seen = std::collections::BTreeSet::new();
    let mut duplicates = std::collections::BTreeSet::new();
    let rows: Vec<(String, String, String)> = descriptors
        .into_iter()
        .map(|(file, descriptor)| {
            let id = if descriptor.id.trim().is_empty() {
                "<missing-id>".to_string()
            } else {
                descriptor.id.trim().to_string()
            };
            if !seen.insert(id.clone()) {
                duplicates.insert(id.clone());
            }
            let role = if descriptor.role.trim().is_empty() {
                "-".to_string()
            } else {
                descriptor.role.trim().to_string()
            };
            (id, file, role)
        })
        .collect();

    let width_id = rows.iter().map(|row| row.0.len()).max().unwrap_or(2).max(2);
    let width_file = rows.iter().map(|row| row.1.len()).max().unwrap_or(4).max(4);
    println!("{:width_id$}  {:width_file$}  ROLE", "ID", "FILE");
    println!("{}  {}  ----", "-".repeat(width_id), "-".repeat(width_file));
    for (id, file, role) in &rows {
        println!("{id:width_id$}  {file:width_file$}  {role}");
    }
    if !duplicates.is_empty() {
        return Err(Failure::policy(format!(
            "Duplicate agent ids: {}",
            duplicates.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(())
}

