//! The integrate pipeline: merge a task branch into base and close the
//! task, with verify, rollback and artifact refresh.

use clap::Args;
use std::path::PathBuf;

use swarm_core::{now_iso_utc, EventKind};
use swarm_docs::{
    append_verify_log, extract_last_verified_sha, load_pr_meta, parse_pr_meta, write_pr_meta,
    MergeStrategy, PrStatus, PR_DIFFSTAT_FILE, PR_META_FILE, PR_VERIFY_LOG_FILE,
};
use swarm_git::{self as git};

use crate::commands::pr::{
    pr_check, pr_read_file_text, pr_try_read_file_text, refresh_readme_auto_summary,
};
use crate::commands::workflow::{cmd_finish, run_verify_with_capture, FinishOpts, VerifyEntries};
use crate::context::AppContext;
use crate::failure::Failure;
use crate::store_ops::{find_task, lint_current_snapshot};

#[derive(Debug, Args)]
pub struct IntegrateOpts {
    pub task_id: String,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    /// squash (default), merge, or rebase
    #[arg(long = "merge-strategy")]
    pub merge_strategy: Option<String>,
    /// Run verify even when the branch head is already verified
    #[arg(long = "run-verify")]
    pub run_verify: bool,
    /// Validate and report without merging
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    #[arg(long, short)]
    pub quiet: bool,
}

struct TempWorktree<'a> {
    ctx: &'a AppContext,
    path: PathBuf,
    created: bool,
}

impl Drop for TempWorktree<'_> {
    fn drop(&mut self) {
        if self.created {
            let _ = git::worktree_remove(&self.ctx.repo, &self.ctx.git, &self.path, true);
        }
    }
}

fn already_verified_sha(
    ctx: &AppContext,
    task_id: &str,
    branch: &str,
    meta_verified: Option<&str>,
    branch_head: &str,
) -> Result<Option<String>, Failure> {
    if let Some(meta_verified) = meta_verified.map(str::trim).filter(|sha| !sha.is_empty()) {
        if meta_verified == branch_head {
            return Ok(Some(branch_head.to_string()));
        }
    }
    if let Some(log_text) = pr_try_read_file_text(ctx, task_id, PR_VERIFY_LOG_FILE, Some(branch))? {
        if let Some(log_verified) = extract_last_verified_sha(&log_text) {
            if log_verified == branch_head {
                return Ok(Some(branch_head.to_string()));
            }
        }
    }
    Ok(None)
}

pub fn cmd_integrate(ctx: &AppContext, opts: &IntegrateOpts) -> Result<(), Failure> {
    ctx.require_not_task_worktree("integrate")?;
    ctx.require_invoked_from_repo_root("integrate")?;
    ctx.require_branch(&ctx.base_branch()?, "integrate")?;
    ctx.ensure_git_clean("integrate")?;
    ctx.ensure_worktrees_ignored()?;

    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }

    let mut store = ctx.make_store()?;
    let (ready, warnings) = store.readiness(&task_id)?;
    if !ready {
        for warning in warnings {
            println!("⚠️ {warning}");
        }
        return Err(Failure::policy(format!(
            "Task is not ready: {task_id} (use --force to override)"
        )));
    }

    let pr_path = ctx.paths.pr_dir(&task_id);
    let mut branch = opts.branch.clone().unwrap_or_default().trim().to_string();
    if branch.is_empty() {
        let existing = load_pr_meta(&pr_path.join(PR_META_FILE))?;
        branch = existing.branch.trim().to_string();
    }
    if branch.is_empty() {
        return Err(Failure::policy(
            "Missing --branch (and PR meta.json is not available in this checkout)",
        ));
    }

    let meta_rel = format!(
        "{}/{PR_META_FILE}",
        pr_path
            .strip_prefix(&ctx.repo.root)
            .map(|rel| rel.display().to_string())
            .unwrap_or_else(|_| pr_path.display().to_string())
    );
    let meta_text = pr_read_file_text(ctx, &task_id, PR_META_FILE, Some(branch.as_str()))?;
    let meta_source = if pr_path.join(PR_META_FILE).exists() {
        meta_rel
    } else {
        format!("{branch}:{meta_rel}")
    };
    let meta = parse_pr_meta(&meta_text, &meta_source)?;

    let base = opts
        .base
        .clone()
        .map(|base| base.trim().to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or_else(|| {
            let existing = meta.base_branch.trim().to_string();
            if existing.is_empty() {
                ctx.base_branch().unwrap_or_default()
            } else {
                existing
            }
        });
    let strategy: MergeStrategy = match &opts.merge_strategy {
        Some(raw) => raw.parse().map_err(Failure::policy)?,
        None => meta.merge_strategy(),
    };

    ctx.print_block("CONTEXT", &ctx.context_line());
    ctx.print_block(
        "ACTION",
        &format!("Integrate {branch} into {base} for {task_id} (strategy={strategy})"),
    );

    pr_check(ctx, &task_id, Some(branch.as_str()), Some(base.as_str()), true)?;

    // The single-writer rule, enforced against the branch diff.
    let changed = git::diff_names(&ctx.repo, &ctx.git, &base, &branch)?;
    if changed.iter().any(|path| path == &ctx.paths.tasks_path_rel) {
        return Err(Failure::policy(format!(
            "Refusing operation: branch '{branch}' modifies forbidden path(s): {}\n\
             Fix:\n  1) Revert the forbidden change(s) in the task branch\n  2) Re-run the command\n\
             Context: {}",
            ctx.paths.tasks_path_rel,
            ctx.context_line()
        )));
    }
    let base_sha_before_merge = git::rev_parse(&ctx.repo, &ctx.git, &base)?;

    let tasks = store.load()?;
    let verify_commands = find_task(&tasks, &task_id)?.verify_commands();
    let mut branch_head_sha = git::rev_parse(&ctx.repo, &ctx.git, &branch)?;
    let mut already_verified: Option<String> = None;
    if !verify_commands.is_empty() && !opts.run_verify {
        already_verified = already_verified_sha(
            ctx,
            &task_id,
            &branch,
            meta.last_verified_sha.as_deref(),
            &branch_head_sha,
        )?;
    }
    let mut should_run_verify =
        opts.run_verify || (!verify_commands.is_empty() && already_verified.is_none());

    let mut worktree_path = git::find_worktree_for_branch(&ctx.repo, &ctx.git, &branch)?;
    let temp_path = ctx.paths.worktrees_dir.join(format!("_integrate_tmp_{task_id}"));
    if strategy == MergeStrategy::Rebase && worktree_path.is_none() {
        return Err(Failure::policy(
            "Rebase strategy requires an existing worktree for the task branch",
        ));
    }
    let mut temp_guard = TempWorktree {
        ctx,
        path: temp_path.clone(),
        created: false,
    };
    if should_run_verify && worktree_path.is_none() {
        if opts.dry_run {
            ctx.print_block(
                "RESULT",
                &format!("verify_worktree=(would create {})", temp_path.display()),
            );
        } else {
            if temp_path.exists() {
                let registered = git::find_branch_for_worktree(&ctx.repo, &ctx.git, &temp_path)?;
                if registered.is_none() {
                    return Err(Failure::policy(format!(
                        "Temp worktree path exists but is not registered: {}",
                        temp_path.display()
                    )));
                }
            } else {
                git::worktree_add(&ctx.repo, &ctx.git, &temp_path, &branch, None)?;
                temp_guard.created = true;
            }
            worktree_path = Some(temp_path.clone());
        }
    }

    if opts.dry_run {
        let verify_label = if verify_commands.is_empty() {
            "no (no commands)".to_string()
        } else if should_run_verify {
            "yes".to_string()
        } else if let Some(sha) = &already_verified {
            format!("no (already verified_sha={sha})")
        } else {
            "no".to_string()
        };
        ctx.print_block(
            "RESULT",
            &format!("pr_check=OK base={base} branch={branch} verify={verify_label}"),
        );
        ctx.print_block("NEXT", "Re-run without --dry-run to perform merge+finish.");
        return Ok(());
    }

    let head_before = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
    let mut verify_entries: VerifyEntries = VerifyEntries::new();
    let merge_hash: String;

    match strategy {
        MergeStrategy::Squash => {
            if should_run_verify {
                let Some(worktree) = &worktree_path else {
                    return Err(Failure::policy(
                        "Unable to locate/create a worktree for verify execution",
                    ));
                };
                verify_entries = run_verify_with_capture(
                    ctx,
                    &task_id,
                    &verify_commands,
                    worktree,
                    opts.quiet,
                    None,
                    Some(branch_head_sha.as_str()),
                )?;
            }
            let exit = git::try_merge_squash(&ctx.repo, &ctx.git, &branch)?;
            if !exit.success {
                git::reset_hard(&ctx.repo, &ctx.git, &head_before);
                return Err(Failure::policy(or_default(
                    exit.message(),
                    "git merge --squash failed",
                )));
            }
            let staged = git::staged_names(&ctx.repo, &ctx.git)?;
            if staged.is_empty() {
                git::reset_hard(&ctx.repo, &ctx.git, &head_before);
                return Err(Failure::policy(format!(
                    "Nothing to integrate: '{branch}' is already merged into '{base}'"
                )));
            }
            let mut subject = git::last_subject(&ctx.repo, &ctx.git, &branch)?;
            if subject.is_empty() || !subject.contains(&task_id) {
                subject = format!("🧩 {task_id} integrate {branch}");
            }
            let env = swarm_policy::build_hook_env(Some(task_id.as_str()), false, true);
            let exit = git::try_commit(&ctx.repo.root, &ctx.git, &subject, &env)?;
            if !exit.success {
                git::reset_hard(&ctx.repo, &ctx.git, &head_before);
                return Err(Failure::policy(or_default(exit.message(), "git commit failed")));
            }
            merge_hash = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
        }
        MergeStrategy::Merge => {
            if should_run_verify {
                let Some(worktree) = &worktree_path else {
                    return Err(Failure::policy(
                        "Unable to locate/create a worktree for verify execution",
                    ));
                };
                verify_entries = run_verify_with_capture(
                    ctx,
                    &task_id,
                    &verify_commands,
                    worktree,
                    opts.quiet,
                    None,
                    Some(branch_head_sha.as_str()),
                )?;
            }
            let env = swarm_policy::build_hook_env(Some(task_id.as_str()), false, true);
            let exit = git::try_merge_no_ff(
                &ctx.repo,
                &ctx.git,
                &branch,
                &format!("🔀 {task_id} merge {branch}"),
                &env,
            )?;
            if !exit.success {
                git::reset_hard(&ctx.repo, &ctx.git, &head_before);
                return Err(Failure::policy(or_default(exit.message(), "git merge failed")));
            }
            merge_hash = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
        }
        MergeStrategy::Rebase => {
            let Some(worktree) = worktree_path.clone() else {
                return Err(Failure::policy(
                    "Rebase strategy requires an existing worktree for the task branch",
                ));
            };
            let exit = git::try_rebase(&worktree, &ctx.git, &base)?;
            if !exit.success {
                git::rebase_abort(&worktree, &ctx.git);
                return Err(Failure::policy(or_default(exit.message(), "git rebase failed")));
            }
            // The rebase moved the branch head; re-evaluate the verify skip.
            branch_head_sha = git::rev_parse(&ctx.repo, &ctx.git, &branch)?;
            if !verify_commands.is_empty() && !opts.run_verify {
                already_verified = already_verified_sha(
                    ctx,
                    &task_id,
                    &branch,
                    meta.last_verified_sha.as_deref(),
                    &branch_head_sha,
                )?;
                should_run_verify = already_verified.is_none();
            }
            if should_run_verify {
                verify_entries = run_verify_with_capture(
                    ctx,
                    &task_id,
                    &verify_commands,
                    &worktree,
                    opts.quiet,
                    None,
                    Some(branch_head_sha.as_str()),
                )?;
            }
            let exit = git::try_merge_ff_only(&ctx.repo, &ctx.git, &branch)?;
            if !exit.success {
                git::reset_hard(&ctx.repo, &ctx.git, &head_before);
                return Err(Failure::policy(or_default(
                    exit.message(),
                    "git merge --ff-only failed",
                )));
            }
            merge_hash = git::rev_parse(&ctx.repo, &ctx.git, "HEAD")?;
        }
    }

    let verify_desc = if verify_commands.is_empty() {
        "skipped(no commands)".to_string()
    } else if should_run_verify {
        "ran".to_string()
    } else if let Some(sha) = &already_verified {
        format!("skipped(already verified_sha={sha})")
    } else {
        "skipped".to_string()
    };
    let pr_rel = pr_path
        .strip_prefix(&ctx.repo.root)
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|_| pr_path.display().to_string());
    let finish_body =
        format!("Verified: Integrated via {strategy}; verify={verify_desc}; pr={pr_rel}.");

    cmd_finish(
        ctx,
        &FinishOpts {
            task_id: vec![task_id.clone()],
            commit: Some(merge_hash.clone()),
            author: Some("INTEGRATOR".to_string()),
            body: Some(finish_body),
            skip_verify: true,
            force: false,
            no_require_task_id_in_commit: false,
            status_commit: false,
            status_commit_emoji: None,
            status_commit_allow: Vec::new(),
            status_commit_auto_allow: false,
            status_commit_require_clean: false,
            quiet: opts.quiet,
            comment_commit: Default::default(),
        },
    )?;

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
        return Err(Failure::policy("tasks snapshot failed lint after integrate"));
    }

    if !pr_path.exists() {
        return Err(Failure::policy(format!(
            "Missing PR artifact dir after merge: {}",
            pr_path.display()
        )));
    }
    if should_run_verify && !verify_entries.is_empty() {
        let verify_log = pr_path.join(PR_VERIFY_LOG_FILE);
        for (header, content) in &verify_entries {
            append_verify_log(&verify_log, header, content)?;
        }
    }
    let meta_path = pr_path.join(PR_META_FILE);
    let mut meta_main = load_pr_meta(&meta_path)?;
    let now = now_iso_utc();
    meta_main.merge_strategy = Some(strategy);
    meta_main.status = Some(PrStatus::Merged);
    if meta_main.merged_at.is_none() {
        meta_main.merged_at = Some(now.clone());
    }
    meta_main.merge_commit = Some(merge_hash.clone());
    meta_main.head_sha = Some(branch_head_sha.clone());
    meta_main.updated_at = Some(now.clone());
    if should_run_verify && !verify_entries.is_empty() {
        meta_main.last_verified_sha = Some(branch_head_sha.clone());
        meta_main.last_verified_at = Some(now);
    }
    write_pr_meta(&meta_path, &meta_main)?;

    let diffstat = git::diff_stat(&ctx.repo, &ctx.git, &base_sha_before_merge, &branch)?;
    std::fs::write(pr_path.join(PR_DIFFSTAT_FILE), diffstat)
        .map_err(|err| Failure::msg(err.to_string()))?;
    let changed = git::diff_names(&ctx.repo, &ctx.git, &base_sha_before_merge, &branch)?;
    let mut store = ctx.make_store()?;
    refresh_readme_auto_summary(ctx, &mut store, &task_id, &changed)?;

    ctx.emit(
        Some(task_id.as_str()),
        EventKind::Integrated {
            branch: branch.clone(),
            strategy: strategy.to_string(),
            merge_commit: merge_hash.clone(),
        },
    );
    ctx.print_block("RESULT", &format!("merge_commit={merge_hash} finish=OK"));
    ctx.print_block(
        "NEXT",
        &format!(
            "Commit closure on base branch: stage `{}` + `{}/meta.json` (and any docs), then commit `✅ {task_id} close ...`.",
            ctx.paths.tasks_path_rel, pr_rel
        ),
    );
    Ok(())
}

fn or_default(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}
