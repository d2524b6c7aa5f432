//! Guarded commits: `commit`, `guard {clean,suggest-allow,commit}` and the
//! commit-from-comment pipeline the workflow verbs reuse.

use clap::Args;

use swarm_core::StatusCommitPolicy;
use swarm_git::{self as git, CommitInfo};
use swarm_policy::{
    build_hook_env, filter_stageable, guard_commit_check, suggest_allow_prefixes, GuardContext,
    GuardRequest,
};

use crate::context::AppContext;
use crate::failure::Failure;
use crate::store_ops::validate_task_readme_metadata;

#[derive(Debug, Args)]
pub struct CommitOpts {
    /// Task id the commit belongs to
    pub task_id: String,
    /// Commit message (must mention the task suffix)
    #[arg(short = 'm', long = "message")]
    pub message: String,
    /// Allowed path prefixes for staged files
    #[arg(long = "allow")]
    pub allow: Vec<String>,
    /// Derive allow prefixes from the staged files
    #[arg(long = "auto-allow")]
    pub auto_allow: bool,
    /// Permit staging the tasks snapshot file
    #[arg(long = "allow-tasks")]
    pub allow_tasks: bool,
    /// Refuse to commit when unstaged changes exist
    #[arg(long = "require-clean")]
    pub require_clean: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct GuardCommitOpts {
    pub task_id: String,
    #[arg(short = 'm', long = "message")]
    pub message: String,
    #[arg(long = "allow")]
    pub allow: Vec<String>,
    #[arg(long = "auto-allow")]
    pub auto_allow: bool,
    #[arg(long = "allow-tasks")]
    pub allow_tasks: bool,
    #[arg(long = "require-clean")]
    pub require_clean: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct GuardSuggestAllowOpts {
    /// Output format: lines or args
    #[arg(long, default_value = "lines")]
    pub format: String,
}

/// The `--commit-from-comment` / `--status-commit` parameter bundle.
#[derive(Debug, Clone, Default)]
pub struct CommentCommit {
    pub task_id: String,
    pub comment_body: String,
    pub formatted_comment: Option<String>,
    pub emoji: String,
    pub allow: Vec<String>,
    pub auto_allow: bool,
    pub allow_tasks: bool,
    pub require_clean: bool,
    pub quiet: bool,
}

pub fn guard_context(ctx: &AppContext) -> Result<GuardContext, Failure> {
    Ok(GuardContext {
        branch_pr_mode: ctx.config.is_branch_pr_mode(),
        current_branch: ctx.current_branch()?,
        base_branch: ctx.base_branch()?,
        branch_prefix: ctx.branch_prefix.clone(),
        tasks_path_rel: ctx.paths.tasks_path_rel.clone(),
        worktrees_dirname: ctx.paths.worktrees_dirname.clone(),
        in_task_worktree: ctx.is_task_worktree()?,
        generic_tokens: ctx.config.generic_commit_tokens(),
        context_line: ctx.context_line(),
    })
}

/// `status_commit_policy` gate for status/comment-driven commits.
pub fn enforce_status_commit_policy(
    ctx: &AppContext,
    action: &str,
    confirmed: bool,
    quiet: bool,
) -> Result<(), Failure> {
    match ctx.config.status_commit_policy() {
        StatusCommitPolicy::Allow => Ok(()),
        StatusCommitPolicy::Warn => {
            if !quiet && !confirmed {
                eprintln!(
                    "⚠️ {action}: status/comment-driven commit requested; policy=warn \
                     (pass --confirm-status-commit to acknowledge)"
                );
            }
            Ok(())
        }
        StatusCommitPolicy::Confirm => {
            if confirmed {
                Ok(())
            } else {
                Err(Failure::policy(format!(
                    "{action}: status/comment-driven commit blocked by status_commit_policy='confirm' \
                     (pass --confirm-status-commit to proceed)"
                )))
            }
        }
    }
}

/// Runs the full guard against the current index, then `git commit` with
/// the hook env.
fn guarded_commit(
    ctx: &AppContext,
    task_id: &str,
    message: &str,
    allow: &[String],
    allow_tasks: bool,
    require_clean: bool,
    quiet: bool,
) -> Result<CommitInfo, Failure> {
    let staged = git::staged_files(&ctx.cwd, &ctx.git)?;
    let unstaged = git::unstaged_files(&ctx.cwd, &ctx.git)?;
    let guard_ctx = guard_context(ctx)?;
    let warnings = guard_commit_check(
        &GuardRequest {
            task_id,
            message,
            allow,
            allow_tasks,
            require_clean,
            staged: &staged,
            unstaged: &unstaged,
        },
        &guard_ctx,
    )?;
    validate_task_readme_metadata(ctx, &staged, &ctx.cwd)?;
    if !quiet {
        for warning in warnings {
            println!("⚠️ {warning}");
        }
    }

    let env = build_hook_env(Some(task_id), allow_tasks, allow_tasks);
    git::commit(&ctx.cwd, &ctx.git, message, &env)?;
    Ok(git::commit_info(&ctx.repo, &ctx.git, "HEAD")?)
}

/// Stage auto-allowed paths, derive the message from the comment, guard,
/// commit. Returns the resulting commit for follow-ups (`finish --commit`).
pub fn commit_from_comment(ctx: &AppContext, args: &CommentCommit) -> Result<CommitInfo, Failure> {
    let mut allow_prefixes: Vec<String> = args
        .allow
        .iter()
        .map(|prefix| prefix.trim().to_string())
        .filter(|prefix| !prefix.is_empty())
        .collect();
    if args.auto_allow && allow_prefixes.is_empty() {
        let changed = git::changed_paths(&ctx.cwd, &ctx.git)?;
        allow_prefixes = suggest_allow_prefixes(changed.iter().map(String::as_str));
    }
    if allow_prefixes.is_empty() {
        return Err(Failure::policy(
            "Provide at least one --allow prefix or enable --commit-auto-allow",
        ));
    }

    let changed = git::changed_paths(&ctx.cwd, &ctx.git)?;
    if changed.is_empty() {
        return Err(Failure::policy("No changes to stage"));
    }
    let stageable = filter_stageable(
        &changed,
        &allow_prefixes,
        args.allow_tasks,
        &ctx.paths.tasks_path_rel,
    );
    if stageable.is_empty() {
        return Err(Failure::policy(
            "No changes matched the allowed prefixes (use --commit-auto-allow or broaden --commit-allow)",
        ));
    }
    git::stage_paths(&ctx.cwd, &ctx.git, &stageable)?;

    let summary = match &args.formatted_comment {
        Some(formatted) => formatted.clone(),
        None => formatted_comment_body(ctx, &args.comment_body)?,
    };
    let message =
        swarm_policy::derive_commit_message_from_comment(&args.task_id, &summary, &args.emoji)?;

    let info = guarded_commit(
        ctx,
        &args.task_id,
        &message,
        &allow_prefixes,
        args.allow_tasks,
        args.require_clean,
        args.quiet,
    )?;
    if !args.quiet {
        println!(
            "✅ committed {} {} (staged: {})",
            info.hash[..info.hash.len().min(12)].to_string(),
            info.subject,
            stageable.join(", ")
        );
    }
    Ok(info)
}

/// Comment body normalized into `label: summary | details: …` using the
/// configured comment-rule prefixes.
pub fn formatted_comment_body(ctx: &AppContext, body: &str) -> Result<String, Failure> {
    let rules = vec![
        ctx.config.comment_rule(swarm_core::CommentKind::Start)?,
        ctx.config.comment_rule(swarm_core::CommentKind::Blocked)?,
        ctx.config.comment_rule(swarm_core::CommentKind::Verified)?,
    ];
    Ok(swarm_policy::format_comment_body_for_commit(body, &rules))
}

pub fn cmd_commit(ctx: &AppContext, opts: &CommitOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    let mut allow = opts.allow.clone();
    if opts.auto_allow {
        allow = suggest_allow_prefixes(
            git::staged_files(&ctx.cwd, &ctx.git)?
                .iter()
                .map(String::as_str),
        );
        if allow.is_empty() {
            return Err(Failure::policy("No staged files"));
        }
    }
    let info = guarded_commit(
        ctx,
        &task_id,
        &opts.message,
        &allow,
        opts.allow_tasks,
        opts.require_clean,
        opts.quiet,
    )?;
    if !opts.quiet {
        println!(
            "✅ committed {} {}",
            &info.hash[..info.hash.len().min(12)],
            info.subject
        );
    }
    Ok(())
}

pub fn cmd_guard_clean(ctx: &AppContext, quiet: bool) -> Result<(), Failure> {
    let staged = git::staged_files(&ctx.cwd, &ctx.git)?;
    if !staged.is_empty() {
        let listing = staged
            .iter()
            .map(|path| format!("❌ staged: {path}"))
            .collect::<Vec<_>>()
            .join("\n");
        return Err(Failure::policy(listing));
    }
    if !quiet {
        println!("✅ index clean (no staged files)");
    }
    Ok(())
}

pub fn cmd_guard_suggest_allow(ctx: &AppContext, opts: &GuardSuggestAllowOpts) -> Result<(), Failure> {
    let staged = git::staged_files(&ctx.cwd, &ctx.git)?;
    if staged.is_empty() {
        return Err(Failure::policy("No staged files"));
    }
    let prefixes = suggest_allow_prefixes(staged.iter().map(String::as_str));
    if opts.format == "args" {
        println!(
            "{}",
            prefixes
                .iter()
                .map(|prefix| format!("--allow {prefix}"))
                .collect::<Vec<_>>()
                .join(" ")
        );
        return Ok(());
    }
    for prefix in prefixes {
        println!("{prefix}");
    }
    Ok(())
}

pub fn cmd_guard_commit(ctx: &AppContext, opts: &GuardCommitOpts) -> Result<(), Failure> {
    let mut allow = opts.allow.clone();
    if opts.auto_allow && allow.is_empty() {
        allow = suggest_allow_prefixes(
            git::staged_files(&ctx.cwd, &ctx.git)?
                .iter()
                .map(String::as_str),
        );
        if allow.is_empty() {
            return Err(Failure::policy("No staged files"));
        }
    }
    let staged = git::staged_files(&ctx.cwd, &ctx.git)?;
    let unstaged = git::unstaged_files(&ctx.cwd, &ctx.git)?;
    let guard_ctx = guard_context(ctx)?;
    let warnings = guard_commit_check(
        &GuardRequest {
            task_id: opts.task_id.trim(),
            message: &opts.message,
            allow: &allow,
            allow_tasks: opts.allow_tasks,
            require_clean: opts.require_clean,
            staged: &staged,
            unstaged: &unstaged,
        },
        &guard_ctx,
    )?;
    validate_task_readme_metadata(ctx, &staged, &ctx.cwd)?;
    if !opts.quiet {
        for warning in warnings {
            println!("⚠️ {warning}");
        }
        println!("✅ guard passed");
    }
    Ok(())
}
