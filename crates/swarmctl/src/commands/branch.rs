//! Task branch and worktree lifecycle, plus the `work start` bundle and
//! merged-branch cleanup.

use clap::Args;
use std::path::PathBuf;

use swarm_core::{normalize_slug, parse_task_id_from_task_branch, task_branch_name, EventKind, TaskStatus};
use swarm_git::{self as git};

use crate::context::{canonical_or_lexical, AppContext};
use crate::failure::Failure;
use crate::store_ops::find_task;

#[derive(Debug, Args)]
pub struct BranchCreateOpts {
    pub task_id: String,
    /// Agent id working the branch (required in branch_pr mode)
    #[arg(long)]
    pub agent: Option<String>,
    /// Branch slug (defaults to the kebab-cased task title)
    #[arg(long)]
    pub slug: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    /// Create a worktree under the configured worktrees dir
    #[arg(long)]
    pub worktree: bool,
    /// Attach to an already-registered worktree/branch
    #[arg(long)]
    pub reuse: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct BranchStatusOpts {
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
}

#[derive(Debug, Args)]
pub struct BranchRemoveOpts {
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub worktree: Option<String>,
    #[arg(long)]
    pub force: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct WorkStartOpts {
    pub task_id: String,
    #[arg(long)]
    pub agent: Option<String>,
    #[arg(long)]
    pub slug: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    #[arg(long)]
    pub worktree: bool,
    #[arg(long)]
    pub reuse: bool,
    /// Re-scaffold the README even when it exists
    #[arg(long)]
    pub overwrite: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct CleanupMergedOpts {
    #[arg(long)]
    pub base: Option<String>,
    /// Actually delete (default prints the plan)
    #[arg(long)]
    pub yes: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

fn task_title_or_default(ctx: &AppContext, task_id: &str) -> String {
    let Ok(mut store) = ctx.make_store() else {
        return String::new();
    };
    let Ok(tasks) = store.load() else {
        return String::new();
    };
    tasks
        .iter()
        .find(|task| task.id == task_id)
        .map(|task| task.title.trim().to_string())
        .unwrap_or_default()
}

fn expected_worktree_path(ctx: &AppContext, task_id: &str, slug: &str) -> PathBuf {
    ctx.paths.worktrees_dir.join(format!("{task_id}-{slug}"))
}

pub fn cmd_branch_create(ctx: &AppContext, opts: &BranchCreateOpts) -> Result<(), Failure> {
    ctx.require_not_task_worktree("branch create")?;
    ctx.ensure_git_clean("branch create")?;
    ctx.ensure_worktrees_ignored()?;

    if ctx.config.is_direct_mode() {
        return Err(Failure::policy(format!(
            "Refusing branch/worktree creation in workflow_mode='direct'\n\
             Fix:\n  - Work directly in the current checkout (no task branches/worktrees), or\n  - Switch to workflow_mode='branch_pr' to use task branches/worktrees.\n\
             Config: {}",
            swarm_core::SWARM_CONFIG_REL
        )));
    }

    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }
    let agent = opts.agent.clone().unwrap_or_default().trim().to_string();
    if ctx.config.is_branch_pr_mode() && agent.is_empty() {
        return Err(Failure::policy(
            "--agent is required in workflow_mode='branch_pr' (e.g., --agent CODER)",
        ));
    }
    if ctx.config.is_branch_pr_mode() && !opts.worktree {
        return Err(Failure::policy(
            "--worktree is required in workflow_mode='branch_pr' for `branch create`",
        ));
    }

    let slug_source = opts
        .slug
        .clone()
        .filter(|slug| !slug.trim().is_empty())
        .unwrap_or_else(|| task_title_or_default(ctx, &task_id));
    let slug = normalize_slug(&slug_source);
    let base = opts
        .base
        .clone()
        .map(|base| base.trim().to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or(ctx.base_branch()?);
    let branch = task_branch_name(&ctx.branch_prefix, &task_id, &slug);

    if !git::branch_exists(&ctx.repo, &ctx.git, &base)? {
        return Err(Failure::policy(format!("Base branch does not exist: {base}")));
    }

    let expected = expected_worktree_path(ctx, &task_id, &slug);
    let attached = git::find_worktree_for_branch(&ctx.repo, &ctx.git, &branch)?;
    if let Some(attached) = &attached {
        if canonical_or_lexical(attached) != canonical_or_lexical(&expected) {
            return Err(Failure::policy(format!(
                "Branch is already checked out in another worktree: {}",
                attached.display()
            )));
        }
        if !opts.reuse {
            return Err(Failure::policy(format!(
                "Branch is already checked out in an existing worktree: {} (use --reuse)",
                attached.display()
            )));
        }
    }
    let branch_exists = git::branch_exists(&ctx.repo, &ctx.git, &branch)?;
    if branch_exists && !opts.reuse {
        return Err(Failure::policy(format!(
            "Branch already exists: {branch} (use --reuse to reuse an existing worktree)"
        )));
    }

    if opts.worktree {
        if expected.exists() {
            if !opts.reuse {
                return Err(Failure::policy(format!(
                    "Worktree path already exists: {} (use --reuse if it's a registered worktree)",
                    expected.display()
                )));
            }
            let registered = git::find_branch_for_worktree(&ctx.repo, &ctx.git, &expected)?;
            if registered.as_deref() != Some(branch.as_str()) {
                return Err(Failure::policy(format!(
                    "Worktree path exists but is not registered for '{branch}': {}\nRegistered: {:?}",
                    expected.display(),
                    registered
                )));
            }
            ctx.print_block("CONTEXT", &ctx.context_line());
            ctx.print_block("ACTION", &format!("Reuse existing worktree for {branch}"));
            ctx.print_block(
                "RESULT",
                &format!("branch={branch} worktree={}", expected.display()),
            );
            ctx.print_block("NEXT", "Open the worktree in your IDE and continue work there.");
            return Ok(());
        }
        if branch_exists {
            git::worktree_add(&ctx.repo, &ctx.git, &expected, &branch, None)?;
        } else {
            git::worktree_add(&ctx.repo, &ctx.git, &expected, &branch, Some(base.as_str()))?;
        }
        ctx.emit(
            Some(task_id.as_str()),
            EventKind::WorktreeCreated {
                path: expected.display().to_string(),
            },
        );
        if !branch_exists {
            ctx.emit(
                Some(task_id.as_str()),
                EventKind::BranchCreated {
                    branch: branch.clone(),
                },
            );
        }
        if !opts.quiet {
            ctx.print_block("CONTEXT", &ctx.context_line());
            ctx.print_block(
                "ACTION",
                &format!(
                    "Create task branch + worktree for {task_id} (agent={})",
                    if agent.is_empty() { "-" } else { &agent }
                ),
            );
            ctx.print_block(
                "RESULT",
                &format!("branch={branch} worktree={}", expected.display()),
            );
            ctx.print_block(
                "NEXT",
                &format!(
                    "Open `{}` in your IDE and run `agentctl pr open {task_id} --branch {branch} --author {}`.",
                    expected.display(),
                    if agent.is_empty() { "CODER" } else { &agent }
                ),
            );
        }
        return Ok(());
    }

    git::switch_create(&ctx.repo, &ctx.git, &branch, &base)?;
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::BranchCreated {
            branch: branch.clone(),
        },
    );
    if !opts.quiet {
        ctx.print_block("CONTEXT", &ctx.context_line());
        ctx.print_block(
            "ACTION",
            &format!(
                "Create and switch to task branch for {task_id} (agent={})",
                if agent.is_empty() { "-" } else { &agent }
            ),
        );
        ctx.print_block("RESULT", &format!("branch={branch}"));
        ctx.print_block(
            "NEXT",
            &format!(
                "Run `agentctl pr open {task_id} --branch {branch} --author {}`.",
                if agent.is_empty() { "CODER" } else { &agent }
            ),
        );
    }
    Ok(())
}

pub fn cmd_branch_status(ctx: &AppContext, opts: &BranchStatusOpts) -> Result<(), Failure> {
    let branch = opts
        .branch
        .clone()
        .map(|branch| branch.trim().to_string())
        .filter(|branch| !branch.is_empty())
        .unwrap_or(ctx.current_branch()?);
    let base = opts
        .base
        .clone()
        .map(|base| base.trim().to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or(ctx.base_branch()?);
    if !git::branch_exists(&ctx.repo, &ctx.git, &branch)? {
        return Err(Failure::policy(format!("Unknown branch: {branch}")));
    }
    if !git::branch_exists(&ctx.repo, &ctx.git, &base)? {
        return Err(Failure::policy(format!("Unknown base branch: {base}")));
    }

    let task_id = parse_task_id_from_task_branch(&ctx.branch_prefix, &branch);
    let worktree = git::find_worktree_for_branch(&ctx.repo, &ctx.git, &branch)?;
    let (ahead, behind) = git::ahead_behind(&ctx.repo, &ctx.git, &branch, &base)?;

    ctx.print_block("CONTEXT", &ctx.context_line());
    ctx.print_block(
        "RESULT",
        &format!(
            "branch={branch} base={base} ahead={ahead} behind={behind} task_id={}",
            task_id.unwrap_or("-")
        ),
    );
    if let Some(worktree) = worktree {
        ctx.print_block("RESULT", &format!("worktree={}", worktree.display()));
    }
    ctx.print_block(
        "NEXT",
        "If you are ready, update PR artifacts via `agentctl pr update <task-id>`.",
    );
    Ok(())
}

pub fn cmd_branch_remove(ctx: &AppContext, opts: &BranchRemoveOpts) -> Result<(), Failure> {
    ctx.require_not_task_worktree("branch remove")?;

    let branch = opts.branch.clone().unwrap_or_default().trim().to_string();
    let worktree = opts.worktree.clone().unwrap_or_default().trim().to_string();
    if branch.is_empty() && worktree.is_empty() {
        return Err(Failure::policy("Provide --branch and/or --worktree"));
    }

    if !worktree.is_empty() {
        let path = if std::path::Path::new(&worktree).is_absolute() {
            PathBuf::from(&worktree)
        } else {
            ctx.repo.root.join(&worktree)
        };
        let worktrees_root = canonical_or_lexical(&ctx.paths.worktrees_dir);
        let resolved = canonical_or_lexical(&path);
        if !resolved.starts_with(&worktrees_root) || resolved == worktrees_root {
            return Err(Failure::policy(format!(
                "Refusing to remove worktree outside {}: {}",
                worktrees_root.display(),
                resolved.display()
            )));
        }
        git::worktree_remove(&ctx.repo, &ctx.git, &path, opts.force)?;
        if !opts.quiet {
            println!("✅ removed worktree {}", path.display());
        }
    }

    if !branch.is_empty() {
        if !git::branch_exists(&ctx.repo, &ctx.git, &branch)? {
            return Err(Failure::policy(format!("Unknown branch: {branch}")));
        }
        git::delete_branch(&ctx.repo, &ctx.git, &branch, opts.force)?;
        ctx.emit(
            parse_task_id_from_task_branch(&ctx.branch_prefix, &branch),
            EventKind::BranchRemoved {
                branch: branch.clone(),
            },
        );
        if !opts.quiet {
            println!("✅ removed branch {branch}");
        }
    }
    Ok(())
}

/// Re-invokes agentctl inside another checkout (the new worktree).
fn run_agentctl_in_checkout(args: &[String], cwd: &std::path::Path, quiet: bool) -> Result<(), Failure> {
    let exe = std::env::current_exe().map_err(|err| Failure::msg(err.to_string()))?;
    let output = std::process::Command::new(exe)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|err| Failure::msg(format!("failed to re-invoke agentctl: {err}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let message = if !stderr.is_empty() {
            stderr
        } else if !stdout.is_empty() {
            stdout
        } else {
            format!("agentctl failed: {}", args.join(" "))
        };
        return Err(Failure::tool(message, output.status.code().unwrap_or(2)));
    }
    if !quiet {
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !stdout.is_empty() {
            println!("{stdout}");
        }
    }
    Ok(())
}

pub fn cmd_work_start(ctx: &AppContext, opts: &WorkStartOpts) -> Result<(), Failure> {
    ctx.require_not_task_worktree("work start")?;
    ctx.ensure_git_clean("work start")?;
    ctx.ensure_worktrees_ignored()?;

    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }

    if ctx.config.is_direct_mode() {
        let readme_path = ctx.paths.task_readme_path(&task_id);
        if !readme_path.exists() || opts.overwrite {
            crate::commands::task::scaffold_readme(ctx, &task_id, None, true, opts.overwrite, true)?;
        }
        if !opts.quiet {
            let readme_rel = readme_path
                .strip_prefix(&ctx.repo.root)
                .map(|rel| rel.display().to_string())
                .unwrap_or_else(|_| readme_path.display().to_string());
            ctx.print_block("CONTEXT", &ctx.context_line());
            ctx.print_block(
                "ACTION",
                &format!("Initialize direct-mode task docs for {task_id} (no branch/worktree)"),
            );
            ctx.print_block("RESULT", &format!("readme={readme_rel}"));
            ctx.print_block(
                "NEXT",
                &format!(
                    "Implement changes in this checkout (no task branches/worktrees).\n\
                     Edit `{readme_rel}` to capture scope/risks/verify steps.\n\
                     Commit via `agentctl commit {task_id} -m \"…\" --auto-allow` when ready."
                ),
            );
        }
        return Ok(());
    }

    let agent = opts.agent.clone().unwrap_or_default().trim().to_string();
    if ctx.config.is_branch_pr_mode() && agent.is_empty() {
        return Err(Failure::policy(
            "--agent is required in workflow_mode='branch_pr' (e.g., --agent CODER)",
        ));
    }
    if ctx.config.is_branch_pr_mode() && !opts.worktree {
        return Err(Failure::policy(
            "--worktree is required in workflow_mode='branch_pr' for `work start`",
        ));
    }

    let slug_source = opts
        .slug
        .clone()
        .filter(|slug| !slug.trim().is_empty())
        .unwrap_or_else(|| task_title_or_default(ctx, &task_id));
    let slug = normalize_slug(&slug_source);
    let base = opts
        .base
        .clone()
        .map(|base| base.trim().to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or(ctx.base_branch()?);
    let branch = task_branch_name(&ctx.branch_prefix, &task_id, &slug);
    let worktree_path = expected_worktree_path(ctx, &task_id, &slug);

    ctx.print_block("CONTEXT", &ctx.context_line());
    ctx.print_block(
        "ACTION",
        &format!("Initialize task checkout for {task_id} (branch+PR+README)"),
    );

    cmd_branch_create(
        ctx,
        &BranchCreateOpts {
            task_id: task_id.clone(),
            agent: Some(agent.clone()),
            slug: Some(slug.clone()),
            base: Some(base.clone()),
            worktree: opts.worktree,
            reuse: opts.reuse,
            quiet: true,
        },
    )?;

    if !worktree_path.exists() {
        return Err(Failure::policy(format!(
            "Expected worktree not found: {}",
            worktree_path.display()
        )));
    }

    // Scaffold and PR artifacts are produced inside the new checkout so
    // they land on the task branch.
    let workflow_rel = ctx
        .paths
        .workflow_dir
        .strip_prefix(&ctx.repo.root)
        .map(|rel| rel.display().to_string())
        .unwrap_or_default();
    let readme_in_worktree = worktree_path
        .join(&workflow_rel)
        .join(&task_id)
        .join("README.md");
    if !readme_in_worktree.exists() || opts.overwrite {
        let mut scaffold_args = vec![
            "task".to_string(),
            "scaffold".to_string(),
            task_id.clone(),
            "--quiet".to_string(),
        ];
        if opts.overwrite {
            scaffold_args.insert(3, "--overwrite".to_string());
        }
        run_agentctl_in_checkout(&scaffold_args, &worktree_path, true)?;
    }

    let pr_in_worktree = worktree_path.join(&workflow_rel).join(&task_id).join("pr");
    let pr_action = if pr_in_worktree.exists() {
        run_agentctl_in_checkout(
            &[
                "pr".to_string(),
                "update".to_string(),
                task_id.clone(),
                "--quiet".to_string(),
            ],
            &worktree_path,
            true,
        )?;
        "updated"
    } else {
        run_agentctl_in_checkout(
            &[
                "pr".to_string(),
                "open".to_string(),
                task_id.clone(),
                "--branch".to_string(),
                branch.clone(),
                "--base".to_string(),
                base.clone(),
                "--author".to_string(),
                agent.clone(),
                "--quiet".to_string(),
            ],
            &worktree_path,
            true,
        )?;
        "opened"
    };

    if !opts.quiet {
        ctx.print_block(
            "RESULT",
            &format!(
                "branch={branch} worktree={} pr={pr_action}",
                worktree_path.display()
            ),
        );
        ctx.print_block(
            "NEXT",
            &format!(
                "Open `{}` in your IDE\n\
                 Edit `{workflow_rel}/{task_id}/README.md` and implement changes\n\
                 Update PR artifacts: `agentctl pr update {task_id}`",
                worktree_path.display()
            ),
        );
    }
    Ok(())
}

pub fn cmd_cleanup_merged(ctx: &AppContext, opts: &CleanupMergedOpts) -> Result<(), Failure> {
    ctx.require_not_task_worktree("cleanup merged")?;
    ctx.require_invoked_from_repo_root("cleanup merged")?;
    ctx.require_branch(&ctx.base_branch()?, "cleanup merged")?;
    ctx.ensure_git_clean("cleanup merged")?;

    let base = opts
        .base
        .clone()
        .map(|base| base.trim().to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or(ctx.base_branch()?);
    if !git::branch_exists(&ctx.repo, &ctx.git, &base)? {
        return Err(Failure::policy(format!("Unknown base branch: {base}")));
    }

    let mut store = ctx.make_store()?;
    let tasks = store.load()?;

    let mut candidates: Vec<(String, String, Option<PathBuf>)> = Vec::new();
    for branch in git::list_branches_with_prefix(&ctx.repo, &ctx.git, &ctx.branch_prefix)? {
        let Some(task_id) = parse_task_id_from_task_branch(&ctx.branch_prefix, &branch) else {
            continue;
        };
        let done = find_task(&tasks, task_id)
            .map(|task| task.status == TaskStatus::Done)
            .unwrap_or(false);
        if !done {
            continue;
        }
        if !git::diff_names(&ctx.repo, &ctx.git, &base, &branch)?.is_empty() {
            continue;
        }
        let worktree = git::find_worktree_for_branch(&ctx.repo, &ctx.git, &branch)?;
        candidates.push((task_id.to_string(), branch.clone(), worktree));
    }

    ctx.print_block("CONTEXT", &ctx.context_line());
    ctx.print_block(
        "ACTION",
        &format!("Cleanup merged task branches/worktrees (base={base})"),
    );

    if candidates.is_empty() {
        ctx.print_block("RESULT", "no candidates");
        return Ok(());
    }

    let lines: Vec<String> = candidates
        .iter()
        .map(|(task_id, branch, worktree)| {
            let wt = worktree
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "-".to_string());
            format!("- {task_id}: branch={branch} worktree={wt}")
        })
        .collect();
    ctx.print_block("RESULT", &lines.join("\n"));

    if !opts.yes {
        ctx.print_block("NEXT", "Re-run with `--yes` to delete these branches/worktrees.");
        return Ok(());
    }

    let deleted = candidates.len();
    for (_, branch, worktree) in candidates {
        cmd_branch_remove(
            ctx,
            &BranchRemoveOpts {
                branch: Some(branch),
                worktree: worktree.map(|path| path.display().to_string()),
                force: true,
                quiet: opts.quiet,
            },
        )?;
    }
    if !opts.quiet {
        ctx.print_block("RESULT", &format!("deleted={deleted}"));
    }
    Ok(())
}
