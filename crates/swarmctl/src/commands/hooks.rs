//! Managed hook installation and the hook entry points git invokes.

use clap::Args;
use std::path::Path;

use swarm_core::EventKind;
use swarm_git::{self as git};
use swarm_policy::{
    collect_task_suffixes, commit_msg_check, hook_is_managed, install_hooks, pre_commit_check,
    read_commit_subject, uninstall_hooks, HookCheckout, HOOK_ENV_ALLOW_BASE, HOOK_ENV_ALLOW_TASKS,
    HOOK_ENV_TASK_ID, HOOK_NAMES,
};

use crate::context::AppContext;
use crate::failure::Failure;

#[derive(Debug, Args)]
pub struct HooksInstallOpts {
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct HooksUninstallOpts {
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct HooksRunOpts {
    /// Hook name: commit-msg or pre-commit
    pub hook: String,
    /// Arguments git passes to the hook (commit-msg: message file path)
    #[arg(trailing_var_arg = true)]
    pub hook_args: Vec<String>,
}

pub fn cmd_hooks_install(ctx: &AppContext, opts: &HooksInstallOpts) -> Result<(), Failure> {
    let hooks_dir = git::hooks_dir(&ctx.repo, &ctx.git)?;
    let installed = install_hooks(&hooks_dir)?;
    ctx.emit(None, EventKind::HooksInstalled);
    if !opts.quiet {
        for path in installed {
            println!("✅ installed hook: {}", path.display());
        }
    }
    Ok(())
}

pub fn cmd_hooks_uninstall(ctx: &AppContext, opts: &HooksUninstallOpts) -> Result<(), Failure> {
    let hooks_dir = git::hooks_dir(&ctx.repo, &ctx.git)?;
    let (removed, skipped) = uninstall_hooks(&hooks_dir);
    ctx.emit(None, EventKind::HooksUninstalled);
    if !opts.quiet {
        for path in &removed {
            println!("✅ removed hook: {}", path.display());
        }
        for path in &skipped {
            println!("⚠️ skipped non-agentctl hook: {}", path.display());
        }
        if removed.is_empty() && skipped.is_empty() {
            println!("✅ no agentctl hooks to remove");
        }
    }
    Ok(())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| value.trim() == "1")
        .unwrap_or(false)
}

pub fn cmd_hooks_run(ctx: &AppContext, opts: &HooksRunOpts) -> Result<(), Failure> {
    match opts.hook.as_str() {
        "commit-msg" => {
            let Some(message_path) = opts.hook_args.first() else {
                return Err(Failure::policy("commit-msg hook requires a commit message path"));
            };
            let content = std::fs::read_to_string(Path::new(message_path)).map_err(|_| {
                Failure::msg(format!("Missing commit message file: {message_path}"))
            })?;
            let subject = read_commit_subject(&content);
            let active_task = std::env::var(HOOK_ENV_TASK_ID).ok();
            let known_suffixes = match active_task
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
            {
                Some(_) => Vec::new(),
                None => {
                    let mut store = ctx.make_store()?;
                    collect_task_suffixes(&store.load()?)
                }
            };
            commit_msg_check(&subject, active_task.as_deref(), &known_suffixes)?;
            Ok(())
        }
        "pre-commit" => {
            let staged = git::staged_files(&ctx.cwd, &ctx.git)?;
            let checkout = HookCheckout {
                branch_pr_mode: ctx.config.is_branch_pr_mode(),
                current_branch: ctx.current_branch()?,
                base_branch: ctx.base_branch()?,
                branch_prefix: ctx.branch_prefix.clone(),
                tasks_path_rel: ctx.paths.tasks_path_rel.clone(),
                worktrees_dirname: ctx.paths.worktrees_dirname.clone(),
                in_task_worktree: ctx.is_task_worktree()?,
                allow_tasks: env_flag(HOOK_ENV_ALLOW_TASKS),
                allow_base: env_flag(HOOK_ENV_ALLOW_BASE),
                context_line: ctx.context_line(),
            };
            pre_commit_check(&staged, &checkout)?;
            Ok(())
        }
        other => {
            if HOOK_NAMES.contains(&other) {
                return Err(Failure::policy(format!("Hook not wired: {other}")));
            }
            Err(Failure::policy(format!("Unknown hook: {other}")))
        }
    }
}
