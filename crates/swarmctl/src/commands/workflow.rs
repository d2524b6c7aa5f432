//! State transitions: start, block, set-status, finish, ready, verify.

use clap::Args;
use std::path::{Path, PathBuf};
use std::process::Command;

use swarm_core::{
    compute_dependency_state, index_tasks, now_iso_utc, CommentKind, CommitRecord, EventKind,
    Task, TaskStatus,
};
use swarm_docs::{
    append_verify_log, extract_last_verified_sha, load_pr_meta, parse_handoff_notes, write_pr_meta,
    handoff_digest, PrStatus, PR_META_FILE, PR_REVIEW_FILE, PR_VERIFY_LOG_FILE,
};
use swarm_git::{self as git};
use swarm_policy::{
    commit_subject_mentions_task, commit_subject_missing_error, default_commit_emoji_for_status,
    infer_commit_emoji,
};
use swarm_store::TaskStore;

use crate::commands::commit::{
    commit_from_comment, enforce_status_commit_policy, formatted_comment_body, CommentCommit,
};
use crate::commands::pr::pr_check;
use crate::context::{resolve_under_root, AppContext};
use crate::failure::Failure;
use crate::store_ops::{
    find_task_mut, format_task_line, lint_current_snapshot, save_and_export,
    validate_task_doc_complete,
};

/// Shared `--commit-from-comment` flag bundle.
#[derive(Debug, Args, Clone, Default)]
pub struct CommentCommitFlags {
    /// Also create a commit derived from the comment body
    #[arg(long = "commit-from-comment")]
    pub commit_from_comment: bool,
    /// Emoji prefix override for the derived commit
    #[arg(long = "commit-emoji")]
    pub commit_emoji: Option<String>,
    /// Allow prefixes for the derived commit
    #[arg(long = "commit-allow")]
    pub commit_allow: Vec<String>,
    /// Derive allow prefixes from the changed paths
    #[arg(long = "commit-auto-allow")]
    pub commit_auto_allow: bool,
    /// Permit staging the tasks snapshot in the derived commit
    #[arg(long = "commit-allow-tasks")]
    pub commit_allow_tasks: bool,
    /// Require a clean tree for the derived commit
    #[arg(long = "commit-require-clean")]
    pub commit_require_clean: bool,
    /// Acknowledge the status-commit policy gate
    #[arg(long = "confirm-status-commit")]
    pub confirm_status_commit: bool,
}

#[derive(Debug, Args)]
pub struct StartOpts {
    pub task_id: String,
    #[arg(long)]
    pub author: String,
    #[arg(long)]
    pub body: String,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
    #[command(flatten)]
    pub commit: CommentCommitFlags,
}

#[derive(Debug, Args)]
pub struct BlockOpts {
    pub task_id: String,
    #[arg(long)]
    pub author: String,
    #[arg(long)]
    pub body: String,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
    #[command(flatten)]
    pub commit: CommentCommitFlags,
}

#[derive(Debug, Args)]
pub struct SetStatusOpts {
    pub task_id: String,
    pub status: String,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    /// Attach commit metadata from this revision
    #[arg(long)]
    pub commit: Option<String>,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
    #[command(flatten)]
    pub comment_commit: CommentCommitFlags,
}

#[derive(Debug, Args)]
pub struct FinishOpts {
    /// One or more task ids to close
    #[arg(required = true)]
    pub task_id: Vec<String>,
    /// Revision whose commit metadata is attached (e.g. HEAD)
    #[arg(long)]
    pub commit: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long)]
    pub body: Option<String>,
    #[arg(long = "skip-verify")]
    pub skip_verify: bool,
    #[arg(long)]
    pub force: bool,
    /// Skip the commit-subject suffix requirement
    #[arg(long = "no-require-task-id-in-commit")]
    pub no_require_task_id_in_commit: bool,
    /// Also commit the snapshot/status change afterwards
    #[arg(long = "status-commit")]
    pub status_commit: bool,
    #[arg(long = "status-commit-emoji")]
    pub status_commit_emoji: Option<String>,
    #[arg(long = "status-commit-allow")]
    pub status_commit_allow: Vec<String>,
    #[arg(long = "status-commit-auto-allow")]
    pub status_commit_auto_allow: bool,
    #[arg(long = "status-commit-require-clean")]
    pub status_commit_require_clean: bool,
    #[arg(long, short)]
    pub quiet: bool,
    #[command(flatten)]
    pub comment_commit: CommentCommitFlags,
}

#[derive(Debug, Args)]
pub struct ReadyOpts {
    pub task_id: String,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct VerifyOpts {
    pub task_id: String,
    /// Working directory for the verify commands (repo-relative)
    #[arg(long)]
    pub cwd: Option<String>,
    /// Log file to append entries to (defaults to the PR verify.log)
    #[arg(long)]
    pub log: Option<String>,
    /// Fail when the task declares no verify commands
    #[arg(long)]
    pub require: bool,
    /// Skip when HEAD already matches the recorded verified sha
    #[arg(long = "skip-if-unchanged")]
    pub skip_if_unchanged: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

fn require_structured_comment(
    ctx: &AppContext,
    kind: CommentKind,
    body: &str,
) -> Result<(), Failure> {
    let (prefix, min_chars) = ctx.config.comment_rule(kind)?;
    let normalized = body.trim();
    if !normalized.to_lowercase().starts_with(&prefix.to_lowercase()) {
        return Err(Failure::policy(format!(
            "Comment body must start with '{prefix}'"
        )));
    }
    if normalized.chars().count() < min_chars {
        return Err(Failure::policy(format!(
            "Comment body must be at least {min_chars} characters"
        )));
    }
    Ok(())
}

fn require_ready(store: &mut TaskStore, task_id: &str) -> Result<(), Failure> {
    let (ready, warnings) = store.readiness(task_id)?;
    if !ready {
        for warning in warnings {
            println!("⚠️ {warning}");
        }
        return Err(Failure::policy(format!(
            "Task is not ready: {task_id} (use --force to override)"
        )));
    }
    Ok(())
}

fn transition_or_fail(task: &Task, next: TaskStatus, force: bool) -> Result<(), Failure> {
    if !task.status.can_transition_to(next) && !force {
        return Err(Failure::policy(format!(
            "Refusing status transition {} -> {next} (use --force to override)",
            task.status
        )));
    }
    Ok(())
}

fn comment_commit_args(
    task_id: &str,
    body: &str,
    formatted: Option<String>,
    emoji: String,
    flags: &CommentCommitFlags,
    quiet: bool,
) -> CommentCommit {
    CommentCommit {
        task_id: task_id.to_string(),
        comment_body: body.to_string(),
        formatted_comment: formatted,
        emoji,
        allow: flags.commit_allow.clone(),
        auto_allow: flags.commit_auto_allow || flags.commit_allow.is_empty(),
        allow_tasks: flags.commit_allow_tasks,
        require_clean: flags.commit_require_clean,
        quiet,
    }
}

fn print_done_line(
    store: &mut TaskStore,
    task_id: &str,
    label: &str,
    commit: Option<&git::CommitInfo>,
) -> Result<(), Failure> {
    let view = store.view()?;
    let line = match view.index.get(task_id) {
        Some(task) => format_task_line(task, Some(&view.dep_state)),
        None => task_id.to_string(),
    };
    let suffix = commit
        .map(|info| format!(" (commit={})", &info.hash[..info.hash.len().min(12)]))
        .unwrap_or_default();
    println!("✅ {label}: {line}{suffix}");
    Ok(())
}

pub fn cmd_start(ctx: &AppContext, opts: &StartOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if opts.commit.commit_from_comment {
        enforce_status_commit_policy(ctx, "start", opts.commit.confirm_status_commit, opts.quiet)?;
    }
    ctx.require_tasks_write_context(opts.force)?;
    if !opts.force {
        require_structured_comment(ctx, CommentKind::Start, &opts.body)?;
    }

    let mut store = ctx.make_store()?;
    if !opts.force {
        require_ready(&mut store, &task_id)?;
    }

    let mut tasks = store.load()?;
    let previous = {
        let target = find_task_mut(&mut tasks, &task_id)?;
        transition_or_fail(target, TaskStatus::Doing, opts.force)?;
        let previous = target.status;
        target.status = TaskStatus::Doing;
        let comment_body = if opts.commit.commit_from_comment {
            formatted_comment_body(ctx, &opts.body)?
        } else {
            opts.body.clone()
        };
        target.push_comment(&opts.author, comment_body);
        previous
    };
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::StatusChanged {
            from: previous.to_string(),
            to: TaskStatus::Doing.to_string(),
        },
    );
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::CommentAdded {
            author: opts.author.clone(),
        },
    );

    let mut commit_info = None;
    if opts.commit.commit_from_comment {
        let formatted = formatted_comment_body(ctx, &opts.body)?;
        let emoji = opts
            .commit
            .commit_emoji
            .clone()
            .unwrap_or_else(|| {
                default_commit_emoji_for_status(TaskStatus::Doing, Some(opts.body.as_str())).to_string()
            });
        let args = comment_commit_args(
            &task_id,
            &opts.body,
            Some(formatted),
            emoji,
            &opts.commit,
            opts.quiet,
        );
        commit_info = Some(commit_from_comment(ctx, &args)?);
    }

    if !opts.quiet {
        print_done_line(&mut store, &task_id, "started", commit_info.as_ref())?;
    }
    Ok(())
}

pub fn cmd_block(ctx: &AppContext, opts: &BlockOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if opts.commit.commit_from_comment {
        enforce_status_commit_policy(ctx, "block", opts.commit.confirm_status_commit, opts.quiet)?;
    }
    ctx.require_tasks_write_context(opts.force)?;
    if !opts.force {
        require_structured_comment(ctx, CommentKind::Blocked, &opts.body)?;
    }

    let mut store = ctx.make_store()?;
    let mut tasks = store.load()?;
    let previous = {
        let target = find_task_mut(&mut tasks, &task_id)?;
        transition_or_fail(target, TaskStatus::Blocked, opts.force)?;
        let previous = target.status;
        target.status = TaskStatus::Blocked;
        let comment_body = if opts.commit.commit_from_comment {
            formatted_comment_body(ctx, &opts.body)?
        } else {
            opts.body.clone()
        };
        target.push_comment(&opts.author, comment_body);
        previous
    };
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::StatusChanged {
            from: previous.to_string(),
            to: TaskStatus::Blocked.to_string(),
        },
    );

    let mut commit_info = None;
    if opts.commit.commit_from_comment {
        let formatted = formatted_comment_body(ctx, &opts.body)?;
        let emoji = opts.commit.commit_emoji.clone().unwrap_or_else(|| {
            default_commit_emoji_for_status(TaskStatus::Blocked, Some(opts.body.as_str())).to_string()
        });
        let args = comment_commit_args(
            &task_id,
            &opts.body,
            Some(formatted),
            emoji,
            &opts.commit,
            opts.quiet,
        );
        commit_info = Some(commit_from_comment(ctx, &args)?);
    }

    if !opts.quiet {
        print_done_line(&mut store, &task_id, "blocked", commit_info.as_ref())?;
    }
    Ok(())
}

pub fn cmd_set_status(ctx: &AppContext, opts: &SetStatusOpts) -> Result<(), Failure> {
    let next = crate::store_ops::parse_status(&opts.status)?;
    if next == TaskStatus::Done && !opts.force {
        return Err(Failure::policy(
            "Use `agentctl finish <task-id>` to mark DONE (use --force to override)",
        ));
    }
    if opts.author.is_some() != opts.body.is_some() {
        return Err(Failure::policy(
            "--author and --body must be provided together",
        ));
    }
    if opts.comment_commit.commit_from_comment {
        enforce_status_commit_policy(
            ctx,
            "task set-status",
            opts.comment_commit.confirm_status_commit,
            opts.quiet,
        )?;
    }

    ctx.require_tasks_write_context(opts.force)?;
    let mut store = ctx.make_store()?;
    if matches!(next, TaskStatus::Doing | TaskStatus::Done) && !opts.force {
        require_ready(&mut store, opts.task_id.trim())?;
    }

    let commit_record = match &opts.commit {
        Some(rev) => {
            let info = git::commit_info(&ctx.repo, &ctx.git, rev)?;
            Some(CommitRecord {
                hash: info.hash,
                message: info.subject,
            })
        }
        None => None,
    };

    let mut tasks = store.load()?;
    let previous = {
        let target = find_task_mut(&mut tasks, opts.task_id.trim())?;
        transition_or_fail(target, next, opts.force)?;
        let previous = target.status;
        target.status = next;
        if let (Some(author), Some(body)) = (&opts.author, &opts.body) {
            let comment_body = if opts.comment_commit.commit_from_comment {
                formatted_comment_body(ctx, body)?
            } else {
                body.clone()
            };
            target.push_comment(author, comment_body);
        }
        if let Some(record) = commit_record {
            target.commit = Some(record);
        }
        previous
    };
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;
    ctx.emit(
        Some(opts.task_id.trim()),
        EventKind::StatusChanged {
            from: previous.to_string(),
            to: next.to_string(),
        },
    );

    if opts.comment_commit.commit_from_comment {
        let Some(body) = &opts.body else {
            return Err(Failure::policy(
                "--body is required when using --commit-from-comment",
            ));
        };
        let formatted = formatted_comment_body(ctx, body)?;
        let emoji = opts.comment_commit.commit_emoji.clone().unwrap_or_else(|| {
            default_commit_emoji_for_status(next, Some(body.as_str())).to_string()
        });
        let args = comment_commit_args(
            opts.task_id.trim(),
            body,
            Some(formatted),
            emoji,
            &opts.comment_commit,
            opts.quiet,
        );
        commit_from_comment(ctx, &args)?;
    }
    Ok(())
}

pub fn cmd_ready(ctx: &AppContext, opts: &ReadyOpts) -> Result<(), Failure> {
    let mut store = ctx.make_store()?;
    let (ok, warnings) = store.readiness(opts.task_id.trim())?;
    for warning in &warnings {
        println!("⚠️ {warning}");
    }
    let view = store.view()?;
    if let Some(task) = view.index.get(opts.task_id.trim()) {
        println!(
            "Task: {} [{}] {}",
            task.id,
            task.status,
            task.title.trim()
        );
        println!(
            "Owner: {}",
            task.owner.as_deref().map(str::trim).filter(|o| !o.is_empty()).unwrap_or("-")
        );
        let info = view.dep_state.get(opts.task_id.trim());
        let depends_on = info.map(|i| i.depends_on.clone()).unwrap_or_default();
        println!(
            "Depends on: {}",
            if depends_on.is_empty() {
                "-".to_string()
            } else {
                depends_on.join(", ")
            }
        );
        if let Some(info) = info {
            if !info.missing.is_empty() {
                println!("Missing deps: {}", info.missing.join(", "));
            }
            if !info.incomplete.is_empty() {
                println!("Incomplete deps: {}", info.incomplete.join(", "));
            }
        }
    }
    println!("{}", if ok { "✅ ready" } else { "⛔ not ready" });
    if ok {
        Ok(())
    } else {
        Err(Failure {
            message: String::new(),
            code: 2,
        })
    }
}

/// Verify-log entries captured during a run: (header, output) pairs.
pub type VerifyEntries = Vec<(String, String)>;

/// Runs the declared verify commands sequentially in `cwd`, appending
/// `[iso8601] sha=<sha> $ <cmd>` entries to the log. The first failing
/// command aborts with its exit code. A trailing `verified_sha=` entry
/// records success.
pub fn run_verify_with_capture(
    ctx: &AppContext,
    task_id: &str,
    commands: &[String],
    cwd: &Path,
    quiet: bool,
    log_path: Option<&Path>,
    current_sha: Option<&str>,
) -> Result<VerifyEntries, Failure> {
    let mut entries = VerifyEntries::new();
    if commands.is_empty() {
        let header = format!("[{}] ℹ️ no verify commands configured", now_iso_utc());
        if let Some(path) = log_path {
            append_verify_log(path, &header, "")?;
        }
        entries.push((header, String::new()));
        if !quiet {
            println!("ℹ️ {task_id}: no verify commands configured");
        }
        return Ok(entries);
    }

    ctx.emit(
        Some(task_id),
        EventKind::VerifyStarted {
            commands: commands.len(),
        },
    );
    for command in commands {
        if !quiet {
            println!("$ {command}");
        }
        let timestamp = now_iso_utc();
        let output = Command::new("bash")
            .arg("-lc")
            .arg(command)
            .current_dir(cwd)
            .output()
            .map_err(|err| Failure::msg(format!("failed to spawn verify command: {err}")))?;
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !captured.is_empty() && !captured.ends_with('\n') {
                captured.push('\n');
            }
            captured.push_str(&stderr);
        }
        let sha_prefix = current_sha
            .map(|sha| format!("sha={sha} "))
            .unwrap_or_default();
        let header = format!("[{timestamp}] {sha_prefix}$ {command}")
            .trim_end()
            .to_string();
        if let Some(path) = log_path {
            append_verify_log(path, &header, &captured)?;
        }
        entries.push((header, captured.clone()));
        if !output.status.success() {
            let code = output.status.code().unwrap_or(1);
            ctx.emit(Some(task_id), EventKind::VerifyCompleted { success: false });
            return Err(Failure::tool(
                format!("❌ verify failed: {command} (exit {code})\n{}", captured.trim_end()),
                code,
            ));
        }
    }
    if let Some(sha) = current_sha {
        let header = format!("[{}] ✅ verified_sha={sha}", now_iso_utc());
        if let Some(path) = log_path {
            append_verify_log(path, &header, "")?;
        }
        entries.push((header, String::new()));
    }
    ctx.emit(Some(task_id), EventKind::VerifyCompleted { success: true });
    if !quiet {
        println!("✅ verify passed for {task_id}");
    }
    Ok(entries)
}

pub fn cmd_verify(ctx: &AppContext, opts: &VerifyOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    let mut store = ctx.make_store()?;
    let tasks = store.load()?;
    let commands = crate::store_ops::find_task(&tasks, &task_id)?.verify_commands();

    if commands.is_empty() {
        if opts.require {
            return Err(Failure::policy(format!(
                "{task_id}: no verify commands configured"
            )));
        }
        if !opts.quiet {
            println!("ℹ️ {task_id}: no verify commands configured");
        }
        return Ok(());
    }

    let cwd: PathBuf = match &opts.cwd {
        Some(raw) => resolve_under_root(&ctx.repo.root, raw, "--cwd")?,
        None => ctx.repo.root.clone(),
    };

    let pr_dir = ctx.paths.pr_dir(&task_id);
    let log_path: Option<PathBuf> = match &opts.log {
        Some(raw) => Some(resolve_under_root(&ctx.repo.root, raw, "--log")?),
        None => {
            if pr_dir.exists() {
                Some(pr_dir.join(PR_VERIFY_LOG_FILE))
            } else {
                None
            }
        }
    };

    let meta_path = pr_dir.join(PR_META_FILE);
    let pr_meta = if meta_path.exists() {
        Some(load_pr_meta(&meta_path)?)
    } else {
        None
    };

    let head_sha = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
    let mut current_sha = head_sha.clone();
    if let (Some(log), Some(meta)) = (&log_path, &pr_meta) {
        if log.starts_with(&pr_dir) {
            if let Some(meta_head) = meta.head_sha.as_deref().map(str::trim).filter(|s| !s.is_empty())
            {
                current_sha = meta_head.to_string();
                if meta_head != head_sha && !opts.quiet {
                    println!(
                        "⚠️ {task_id}: PR meta head_sha differs from HEAD; run `agentctl pr update {task_id}` if needed"
                    );
                }
            }
        }
    }

    if opts.skip_if_unchanged {
        if !git::is_clean(&cwd, &ctx.git)? {
            if !opts.quiet {
                println!("⚠️ {task_id}: working tree is dirty; ignoring --skip-if-unchanged");
            }
        } else {
            let mut last_verified = pr_meta
                .as_ref()
                .and_then(|meta| meta.last_verified_sha.clone())
                .map(|sha| sha.trim().to_string())
                .filter(|sha| !sha.is_empty());
            if last_verified.is_none() {
                if let Some(log) = &log_path {
                    if log.exists() {
                        let text = std::fs::read_to_string(log)
                            .map_err(|err| Failure::msg(err.to_string()))?;
                        last_verified = extract_last_verified_sha(&text);
                    }
                }
            }
            if last_verified.as_deref() == Some(current_sha.as_str()) {
                let header = format!(
                    "[{}] ℹ️ skipped (unchanged verified_sha={current_sha})",
                    now_iso_utc()
                );
                if let Some(log) = &log_path {
                    append_verify_log(log, &header, "")?;
                }
                if !opts.quiet {
                    println!(
                        "ℹ️ {task_id}: verify skipped (unchanged sha {})",
                        &current_sha[..current_sha.len().min(12)]
                    );
                }
                ctx.emit(
                    Some(task_id.as_str()),
                    EventKind::VerifySkipped {
                        sha: current_sha.clone(),
                    },
                );
                return Ok(());
            }
        }
    }

    run_verify_with_capture(
        ctx,
        &task_id,
        &commands,
        &cwd,
        opts.quiet,
        log_path.as_deref(),
        Some(current_sha.as_str()),
    )?;

    if meta_path.exists() {
        let mut meta = load_pr_meta(&meta_path)?;
        meta.last_verified_sha = Some(current_sha);
        meta.last_verified_at = Some(now_iso_utc());
        write_pr_meta(&meta_path, &meta)?;
    }
    Ok(())
}

pub fn cmd_finish(ctx: &AppContext, opts: &FinishOpts) -> Result<(), Failure> {
    let task_ids =
        swarm_core::normalize_task_ids(opts.task_id.iter().map(String::as_str)).map_err(Failure::policy)?;
    let primary_task_id = task_ids.first().cloned().unwrap_or_default();
    let commit_from_comment_flag = opts.comment_commit.commit_from_comment;
    let auto_status_commit = ctx.config.finish_auto_status_commit();
    let status_commit_flag =
        opts.status_commit || commit_from_comment_flag || (auto_status_commit && opts.body.is_some());

    if opts.author.is_some() != opts.body.is_some() {
        return Err(Failure::policy(
            "--author and --body must be provided together",
        ));
    }
    if commit_from_comment_flag && task_ids.len() != 1 {
        return Err(Failure::policy(
            "--commit-from-comment supports exactly one task id",
        ));
    }
    if status_commit_flag && task_ids.len() != 1 {
        return Err(Failure::policy(
            "--status-commit/--commit-from-comment supports exactly one task id",
        ));
    }
    if (commit_from_comment_flag || status_commit_flag) && opts.body.is_none() {
        return Err(Failure::policy(
            "--body is required when building commit messages from comments",
        ));
    }
    if commit_from_comment_flag || status_commit_flag {
        enforce_status_commit_policy(
            ctx,
            "finish",
            opts.comment_commit.confirm_status_commit,
            opts.quiet,
        )?;
    }

    ctx.require_tasks_write_context(opts.force)?;
    if ctx.config.is_branch_pr_mode() && !opts.force {
        ctx.ensure_git_clean("finish")?;
        let (Some(author), Some(_)) = (&opts.author, &opts.body) else {
            return Err(Failure::policy(
                "--author and --body are required in workflow_mode='branch_pr'",
            ));
        };
        if author.trim().to_uppercase() != "INTEGRATOR" {
            return Err(Failure::policy(
                "--author must be INTEGRATOR in workflow_mode='branch_pr'",
            ));
        }
    }
    if opts.author.is_some() && opts.body.is_some() && !opts.force {
        require_structured_comment(ctx, CommentKind::Verified, opts.body.as_deref().unwrap())?;
    }
    let formatted_comment = match (&opts.body, commit_from_comment_flag || status_commit_flag) {
        (Some(body), true) => Some(formatted_comment_body(ctx, body)?),
        _ => None,
    };

    let mut store = ctx.make_store()?;
    if !store.has_backend() {
        let report = lint_current_snapshot(ctx)?;
        if !opts.quiet {
            for message in &report.warnings {
                println!("⚠️ {message}");
            }
        }
        if !report.is_clean() && !opts.force {
            for message in &report.errors {
                eprintln!("❌ {message}");
            }
            return Err(Failure::policy(
                "tasks snapshot failed lint (use --force to override)",
            ));
        }
    }

    let tasks = store.load()?;
    let (tasks_by_id, _) = index_tasks(&tasks);

    // Readiness is evaluated as if every finishing task were already
    // DONE, so mutually dependent batches can close together.
    let mut override_index = tasks_by_id.clone();
    for task_id in &task_ids {
        if let Some(task) = override_index.get_mut(task_id) {
            task.status = TaskStatus::Done;
        }
    }
    let (dep_state, dep_warnings) = compute_dependency_state(&override_index);

    if !opts.force {
        for task_id in &task_ids {
            if !override_index.contains_key(task_id) {
                return Err(Failure::policy(format!("Unknown task id: {task_id}")));
            }
            let info = dep_state.get(task_id).cloned().unwrap_or_default();
            if !info.missing.is_empty() || !info.incomplete.is_empty() {
                for warning in &dep_warnings {
                    println!("⚠️ {warning}");
                }
                if !info.missing.is_empty() {
                    println!("⚠️ {task_id}: missing deps: {}", info.missing.join(", "));
                }
                if !info.incomplete.is_empty() {
                    println!("⚠️ {task_id}: incomplete deps: {}", info.incomplete.join(", "));
                }
                return Err(Failure::policy(format!(
                    "Task is not ready: {task_id} (use --force to override)"
                )));
            }
            if !ctx.config.is_branch_pr_mode() {
                let target_owner = tasks_by_id
                    .get(task_id)
                    .and_then(|task| task.owner.clone())
                    .unwrap_or_default()
                    .trim()
                    .to_uppercase();
                let author_upper = opts
                    .author
                    .as_deref()
                    .unwrap_or("")
                    .trim()
                    .to_uppercase();
                if !author_upper.is_empty() && author_upper != target_owner {
                    let owner_label = if target_owner.is_empty() {
                        "unknown".to_string()
                    } else {
                        target_owner
                    };
                    return Err(Failure::policy(format!(
                        "--author must match task owner ({owner_label}) in direct mode (use --force to override)"
                    )));
                }
            }
            validate_task_doc_complete(ctx, task_id, None)?;
        }
    }

    let mut verify_commands: std::collections::BTreeMap<String, Vec<String>> =
        std::collections::BTreeMap::new();
    for task_id in &task_ids {
        let target = tasks_by_id
            .get(task_id)
            .ok_or_else(|| Failure::policy(format!("Unknown task id: {task_id}")))?;
        verify_commands.insert(task_id.clone(), target.verify_commands());
    }

    let mut commit_rev = opts.commit.clone();
    if commit_from_comment_flag {
        let body = opts.body.as_deref().unwrap_or_default();
        let emoji = opts
            .comment_commit
            .commit_emoji
            .clone()
            .unwrap_or_else(|| infer_commit_emoji(body).to_string());
        let args = comment_commit_args(
            &primary_task_id,
            body,
            formatted_comment.clone(),
            emoji,
            &opts.comment_commit,
            opts.quiet,
        );
        let info = commit_from_comment(ctx, &args)?;
        commit_rev = Some(info.hash);
    }
    let Some(commit_rev) = commit_rev else {
        return Err(Failure::policy(
            "--commit is required (e.g. --commit HEAD) unless --commit-from-comment is used",
        ));
    };
    let commit_info = git::commit_info(&ctx.repo, &ctx.git, &commit_rev)?;

    if !opts.no_require_task_id_in_commit && !opts.force {
        let missing: Vec<String> = task_ids
            .iter()
            .filter(|task_id| !commit_subject_mentions_task(task_id.as_str(), &commit_info.subject))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Failure::policy(format!(
                "{} (use --force or --no-require-task-id-in-commit)",
                commit_subject_missing_error(&missing, &commit_info.subject, None)
            )));
        }
    }

    let mut pr_context: std::collections::BTreeMap<String, PathBuf> =
        std::collections::BTreeMap::new();
    if ctx.config.is_branch_pr_mode() && !opts.force {
        for task_id in &task_ids {
            let pr_path = ctx.paths.pr_dir(task_id);
            if !pr_path.exists() {
                return Err(Failure::policy(format!(
                    "Missing PR artifact dir: {} (required for finish in branch_pr mode)",
                    pr_path.display()
                )));
            }
            let meta = load_pr_meta(&pr_path.join(PR_META_FILE))?;
            let branch = meta.branch.trim().to_string();
            let base = if meta.base_branch.trim().is_empty() {
                ctx.base_branch()?
            } else {
                meta.base_branch.trim().to_string()
            };
            pr_check(
                ctx,
                task_id,
                if branch.is_empty() { None } else { Some(branch.as_str()) },
                Some(base.as_str()),
                true,
            )?;
            pr_context.insert(task_id.clone(), pr_path);
        }
    }

    let current_sha = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
    for task_id in &task_ids {
        let commands = verify_commands.get(task_id).cloned().unwrap_or_default();
        if !commands.is_empty() && !opts.skip_verify && !opts.force {
            run_verify_with_capture(
                ctx,
                task_id,
                &commands,
                &ctx.repo.root,
                opts.quiet,
                None,
                Some(current_sha.as_str()),
            )?;
        }
    }

    let mut tasks = store.load()?;
    for task_id in &task_ids {
        let mut handoff_comments: Vec<(String, String)> = Vec::new();
        if let Some(pr_path) = pr_context.get(task_id) {
            let review_path = pr_path.join(PR_REVIEW_FILE);
            let meta_path = pr_path.join(PR_META_FILE);
            let mut meta = load_pr_meta(&meta_path)?;
            if review_path.exists() {
                let review_text = std::fs::read_to_string(&review_path)
                    .map_err(|err| Failure::msg(err.to_string()))?;
                let notes = parse_handoff_notes(&review_text);
                if !notes.is_empty() {
                    let digest = handoff_digest(&notes);
                    let applied = meta
                        .handoff_applied_digest
                        .as_deref()
                        .unwrap_or("")
                        .trim()
                        .to_string();
                    if digest != applied {
                        for note in &notes {
                            handoff_comments.push((note.author.clone(), note.body.clone()));
                        }
                        meta.handoff_applied_digest = Some(digest);
                        meta.handoff_applied_at = Some(now_iso_utc());
                        write_pr_meta(&meta_path, &meta)?;
                    }
                }
            }
            let now = now_iso_utc();
            let mut meta = load_pr_meta(&meta_path)?;
            if meta.merged_at.is_none() {
                meta.merged_at = Some(now.clone());
            }
            if meta.merge_commit.is_none() {
                meta.merge_commit = Some(commit_info.hash.clone());
            }
            if meta.closed_at.is_none() {
                meta.closed_at = Some(now.clone());
            }
            meta.close_commit = Some(commit_info.hash.clone());
            if meta.status.is_none() || meta.status == Some(PrStatus::Open) {
                meta.status = Some(PrStatus::Closed);
            }
            meta.updated_at = Some(now);
            write_pr_meta(&meta_path, &meta)?;
        }

        let target = find_task_mut(&mut tasks, task_id)?;
        target.status = TaskStatus::Done;
        target.commit = Some(CommitRecord {
            hash: commit_info.hash.clone(),
            message: commit_info.subject.clone(),
        });
        for (author, body) in handoff_comments {
            target.push_comment(author, body);
        }
        if let (Some(author), Some(body)) = (&opts.author, &opts.body) {
            let comment_body = formatted_comment.clone().unwrap_or_else(|| body.clone());
            target.push_comment(author, comment_body);
        }
        ctx.emit(
            Some(task_id.as_str()),
            EventKind::TaskFinished {
                commit: commit_info.hash.clone(),
            },
        );
    }
    save_and_export(ctx, &mut store, tasks, opts.quiet)?;

    if status_commit_flag {
        let body = opts.body.as_deref().unwrap_or_default();
        let emoji = opts.status_commit_emoji.clone().unwrap_or_else(|| {
            default_commit_emoji_for_status(TaskStatus::Done, Some(body)).to_string()
        });
        let status_allow = opts.status_commit_allow.clone();
        let args = CommentCommit {
            task_id: primary_task_id.clone(),
            comment_body: body.to_string(),
            formatted_comment: formatted_comment.clone(),
            emoji,
            auto_allow: opts.status_commit_auto_allow || status_allow.is_empty(),
            allow: status_allow,
            allow_tasks: true,
            require_clean: opts.status_commit_require_clean,
            quiet: opts.quiet,
        };
        commit_from_comment(ctx, &args)?;
    }

    if !opts.quiet {
        for task_id in &task_ids {
            println!(
                "✅ finished {task_id} (commit={} '{}')",
                &commit_info.hash[..commit_info.hash.len().min(12)],
                commit_info.subject
            );
        }
    }
    Ok(())
}
