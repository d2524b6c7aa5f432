//! PR artifacts: open, update, check, note.

use clap::Args;
use std::path::Path;

use swarm_core::{now_iso_utc, task_branch_example, EventKind, parse_task_id_from_task_branch};
use swarm_docs::{
    append_handoff_note, load_pr_meta, parse_pr_meta, review_template, task_readme_template,
    update_auto_summary, write_pr_meta, PrMeta, PrStatus, VERIFY_LOG_INITIAL, PR_DIFFSTAT_FILE,
    PR_META_FILE, PR_REVIEW_FILE, PR_VERIFY_LOG_FILE,
};
use swarm_git::{self as git};
use swarm_policy::{commit_subject_mentions_task, commit_subject_missing_error};
use swarm_store::TaskStore;

use crate::context::AppContext;
use crate::failure::Failure;

#[derive(Debug, Args)]
pub struct PrOpenOpts {
    pub task_id: String,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct PrUpdateOpts {
    pub task_id: String,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct PrCheckOpts {
    pub task_id: String,
    #[arg(long)]
    pub branch: Option<String>,
    #[arg(long)]
    pub base: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct PrNoteOpts {
    pub task_id: String,
    #[arg(long)]
    pub author: String,
    #[arg(long)]
    pub body: String,
    #[arg(long, short)]
    pub quiet: bool,
}

fn task_title(store: &mut TaskStore, task_id: &str) -> Result<Option<String>, Failure> {
    let tasks = store.load()?;
    Ok(tasks
        .iter()
        .find(|task| task.id == task_id)
        .map(|task| task.title.trim().to_string())
        .filter(|title| !title.is_empty()))
}

fn rel_display(ctx: &AppContext, path: &Path) -> String {
    path.strip_prefix(&ctx.repo.root)
        .map(|rel| rel.display().to_string())
        .unwrap_or_else(|_| path.display().to_string())
}

/// PR artifact text from disk, or from the task branch when the local
/// checkout lacks the folder.
pub fn pr_try_read_file_text(
    ctx: &AppContext,
    task_id: &str,
    filename: &str,
    branch: Option<&str>,
) -> Result<Option<String>, Failure> {
    let path = ctx.paths.pr_dir(task_id).join(filename);
    if path.exists() {
        return std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|err| Failure::msg(err.to_string()));
    }
    let Some(branch) = branch else {
        return Ok(None);
    };
    let rel = rel_display(ctx, &path);
    Ok(git::show_file_at_rev(&ctx.repo, &ctx.git, branch, &rel)?)
}

pub fn pr_try_read_doc_text(
    ctx: &AppContext,
    task_id: &str,
    branch: Option<&str>,
) -> Result<Option<String>, Failure> {
    let readme = ctx.paths.task_readme_path(task_id);
    if let Some(branch) = branch {
        let rel = rel_display(ctx, &readme);
        if let Some(text) = git::show_file_at_rev(&ctx.repo, &ctx.git, branch, &rel)? {
            return Ok(Some(text));
        }
    }
    if readme.exists() {
        return std::fs::read_to_string(&readme)
            .map(Some)
            .map_err(|err| Failure::msg(err.to_string()));
    }
    Ok(None)
}

pub fn pr_read_file_text(
    ctx: &AppContext,
    task_id: &str,
    filename: &str,
    branch: Option<&str>,
) -> Result<String, Failure> {
    if let Some(text) = pr_try_read_file_text(ctx, task_id, filename, branch)? {
        return Ok(text);
    }
    let target = ctx.paths.pr_dir(task_id);
    let Some(branch) = branch else {
        return Err(Failure::policy(format!(
            "Missing PR artifact dir in this checkout.\n\
             Fix:\n  1) Re-run with `--branch {}` so agentctl can read PR artifacts from that branch\n  2) Or check out the task branch that contains the PR artifact files\n\
             Expected: {}\n\
             Context: {}",
            task_branch_example(&ctx.branch_prefix),
            rel_display(ctx, &target),
            ctx.context_line()
        )));
    };
    let rel = rel_display(ctx, &target.join(filename));
    Err(Failure::policy(format!(
        "Missing PR artifact file in '{branch}': {rel}\n\
         Fix:\n  1) Ensure the task branch contains `{rel}` (run `agentctl pr open {task_id}` in the branch)\n  2) Commit the PR artifact files to the task branch\n  3) Re-run the command\n\
         Context: {}",
        ctx.context_line()
    )))
}

/// Creates the PR folder with meta/diffstat/verify.log/review.md; the
/// README is scaffolded when absent. Idempotent on existing artifacts.
pub fn pr_ensure_skeleton(
    ctx: &AppContext,
    store: &mut TaskStore,
    task_id: &str,
    branch: &str,
    author: &str,
    base_branch: &str,
) -> Result<std::path::PathBuf, Failure> {
    let target = ctx.paths.pr_dir(task_id);
    std::fs::create_dir_all(&target).map_err(|err| Failure::msg(err.to_string()))?;

    let readme_path = ctx.paths.task_readme_path(task_id);
    if !readme_path.exists() {
        let title = task_title(store, task_id)?;
        let template =
            task_readme_template(task_id, title.as_deref(), &ctx.config.doc_sections());
        std::fs::write(&readme_path, template + "\n")
            .map_err(|err| Failure::msg(err.to_string()))?;
    }

    let meta_path = target.join(PR_META_FILE);
    let mut meta = load_pr_meta(&meta_path)?;
    let created_at = meta.created_at.clone().unwrap_or_else(now_iso_utc);
    meta.task_id = task_id.to_string();
    meta.task_title = task_title(store, task_id)?;
    meta.branch = branch.to_string();
    meta.base_branch = base_branch.to_string();
    meta.author = author.to_string();
    meta.created_at = Some(created_at);
    meta.updated_at = Some(now_iso_utc());
    meta.head_sha = Some(git::rev_parse(&ctx.repo, &ctx.git, branch)?);
    if meta.merge_strategy.is_none() {
        meta.merge_strategy = Some(swarm_docs::MergeStrategy::Squash);
    }
    if meta.status.is_none() {
        meta.status = Some(PrStatus::Open);
    }
    write_pr_meta(&meta_path, &meta)?;

    let diffstat_path = target.join(PR_DIFFSTAT_FILE);
    if !diffstat_path.exists() {
        std::fs::write(&diffstat_path, "").map_err(|err| Failure::msg(err.to_string()))?;
    }
    let verify_path = target.join(PR_VERIFY_LOG_FILE);
    if !verify_path.exists() {
        std::fs::write(&verify_path, VERIFY_LOG_INITIAL)
            .map_err(|err| Failure::msg(err.to_string()))?;
    }
    let review_path = target.join(PR_REVIEW_FILE);
    if !review_path.exists() {
        std::fs::write(&review_path, review_template(task_id))
            .map_err(|err| Failure::msg(err.to_string()))?;
    }
    Ok(target)
}

/// Rewrites the README auto-summary from the branch's changed paths.
pub fn refresh_readme_auto_summary(
    ctx: &AppContext,
    store: &mut TaskStore,
    task_id: &str,
    changed: &[String],
) -> Result<(), Failure> {
    let readme_path = ctx.paths.task_readme_path(task_id);
    if !readme_path.exists() {
        let title = task_title(store, task_id)?;
        let template =
            task_readme_template(task_id, title.as_deref(), &ctx.config.doc_sections());
        std::fs::create_dir_all(readme_path.parent().unwrap_or(&ctx.paths.workflow_dir))
            .map_err(|err| Failure::msg(err.to_string()))?;
        std::fs::write(&readme_path, template + "\n")
            .map_err(|err| Failure::msg(err.to_string()))?;
    }
    let text =
        std::fs::read_to_string(&readme_path).map_err(|err| Failure::msg(err.to_string()))?;
    if let Some(new_text) = update_auto_summary(&text, changed) {
        std::fs::write(&readme_path, new_text).map_err(|err| Failure::msg(err.to_string()))?;
        if let Some(backend) = store.backend() {
            if let Some(docs) = backend.docs() {
                // Metadata touch is best-effort; a backend without the
                // capability never blocks the write.
                let _ = docs.touch_task_doc_metadata(task_id, "agentctl");
                store.invalidate();
            }
        }
    }
    Ok(())
}

pub fn cmd_pr_open(ctx: &AppContext, opts: &PrOpenOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }
    let mut author = opts.author.clone().unwrap_or_default().trim().to_string();
    if ctx.config.is_branch_pr_mode() && author.is_empty() {
        return Err(Failure::policy(
            "--author is required in workflow_mode='branch_pr' (e.g., --author CODER)",
        ));
    }
    if author.is_empty() {
        author = "unknown".to_string();
    }

    let branch = match &opts.branch {
        Some(branch) => branch.trim().to_string(),
        None => ctx.current_branch()?,
    };
    let base = match &opts.base {
        Some(base) => base.trim().to_string(),
        None => ctx.base_branch()?,
    };
    if branch == base {
        return Err(Failure::policy(format!(
            "Refusing to open PR on base branch '{base}'"
        )));
    }
    if ctx.config.is_branch_pr_mode() {
        let parsed = parse_task_id_from_task_branch(&ctx.branch_prefix, &branch);
        if parsed != Some(task_id.as_str()) {
            return Err(Failure::policy(format!(
                "Branch '{branch}' does not match task id {task_id} (expected {})",
                task_branch_example(&ctx.branch_prefix)
            )));
        }
    }
    if !git::branch_exists(&ctx.repo, &ctx.git, &branch)? {
        return Err(Failure::policy(format!("Unknown branch: {branch}")));
    }

    let target = ctx.paths.pr_dir(&task_id);
    if target.exists() {
        return Err(Failure::policy(format!(
            "PR artifact dir already exists: {} (use `pr update`)",
            target.display()
        )));
    }

    let mut store = ctx.make_store()?;
    let target = pr_ensure_skeleton(ctx, &mut store, &task_id, &branch, &author, &base)?;
    cmd_pr_update(
        ctx,
        &PrUpdateOpts {
            task_id: task_id.clone(),
            branch: Some(branch.clone()),
            base: Some(base.clone()),
            quiet: true,
        },
    )?;
    ctx.emit(
        Some(task_id.as_str()),
        EventKind::PrOpened {
            branch: branch.clone(),
        },
    );
    if !opts.quiet {
        ctx.print_block("CONTEXT", &ctx.context_line());
        ctx.print_block("ACTION", &format!("Open PR artifact for {task_id}"));
        ctx.print_block(
            "RESULT",
            &format!(
                "dir={} branch={branch} base={base} author={author}",
                rel_display(ctx, &target)
            ),
        );
        let readme_rel = rel_display(ctx, &ctx.paths.task_readme_path(&task_id));
        ctx.print_block(
            "NEXT",
            &format!("Fill out `{readme_rel}` then run `agentctl pr check {task_id}`."),
        );
    }
    Ok(())
}

pub fn cmd_pr_update(ctx: &AppContext, opts: &PrUpdateOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }
    let target = ctx.paths.pr_dir(&task_id);
    if !target.exists() {
        return Err(Failure::policy(format!(
            "Missing PR artifact dir: {}",
            target.display()
        )));
    }

    let meta_path = target.join(PR_META_FILE);
    let mut meta = load_pr_meta(&meta_path)?;
    let branch = opts
        .branch
        .clone()
        .map(|branch| branch.trim().to_string())
        .filter(|branch| !branch.is_empty())
        .or_else(|| {
            let existing = meta.branch.trim().to_string();
            if existing.is_empty() {
                None
            } else {
                Some(existing)
            }
        })
        .unwrap_or(ctx.current_branch()?);
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
    if !git::branch_exists(&ctx.repo, &ctx.git, &branch)? {
        return Err(Failure::policy(format!("Unknown branch: {branch}")));
    }

    let diffstat = git::diff_stat(&ctx.repo, &ctx.git, &base, &branch)?;
    std::fs::write(target.join(PR_DIFFSTAT_FILE), diffstat)
        .map_err(|err| Failure::msg(err.to_string()))?;

    // Idempotent: a second update with an unchanged branch head leaves
    // meta.json byte-identical.
    let head_sha = git::rev_parse(&ctx.repo, &ctx.git, &branch)?;
    let stale = meta.head_sha.as_deref() != Some(head_sha.as_str())
        || meta.branch != branch
        || meta.base_branch != base;
    if stale {
        meta.updated_at = Some(now_iso_utc());
        meta.head_sha = Some(head_sha.clone());
        meta.branch = branch.clone();
        meta.base_branch = base.clone();
        write_pr_meta(&meta_path, &meta)?;
    }

    let changed = git::diff_names(&ctx.repo, &ctx.git, &base, &branch)?;
    let mut store = ctx.make_store()?;
    refresh_readme_auto_summary(ctx, &mut store, &task_id, &changed)?;
    ctx.emit(Some(task_id.as_str()), EventKind::PrUpdated { head_sha });

    if !opts.quiet {
        ctx.print_block("CONTEXT", &ctx.context_line());
        ctx.print_block("ACTION", &format!("Update PR artifact for {task_id}"));
        ctx.print_block(
            "RESULT",
            &format!("dir={} branch={branch} base={base}", rel_display(ctx, &target)),
        );
        ctx.print_block(
            "NEXT",
            &format!("Run `agentctl pr check {task_id} --branch {branch} --base {base}`."),
        );
    }
    Ok(())
}

/// The full PR validation gate: meta identity, clean tree,
/// branch shape, artifact completeness, doc sections, commit subjects,
/// and the single-writer diff rule.
pub fn pr_check(
    ctx: &AppContext,
    task_id: &str,
    branch: Option<&str>,
    base: Option<&str>,
    quiet: bool,
) -> Result<(), Failure> {
    let target = ctx.paths.pr_dir(task_id);
    let meta_rel = rel_display(ctx, &target.join(PR_META_FILE));
    let meta_text = pr_read_file_text(ctx, task_id, PR_META_FILE, branch)?;
    let meta_source = if target.join(PR_META_FILE).exists() {
        meta_rel.clone()
    } else {
        format!("{}:{meta_rel}", branch.unwrap_or("?"))
    };
    let meta: PrMeta = parse_pr_meta(&meta_text, &meta_source)?;
    let meta_task_id = meta.task_id.trim();
    if !meta_task_id.is_empty() && meta_task_id != task_id {
        return Err(Failure::policy(format!(
            "PR meta.json task_id mismatch: expected {task_id}, got {meta_task_id}"
        )));
    }

    let base_ref = base
        .map(str::trim)
        .filter(|base| !base.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            let existing = meta.base_branch.trim().to_string();
            if existing.is_empty() {
                ctx.base_branch().unwrap_or_default()
            } else {
                existing
            }
        });
    let meta_branch = meta.branch.trim();
    if let Some(branch) = branch {
        if !meta_branch.is_empty() && meta_branch != branch {
            return Err(Failure::policy(format!(
                "PR meta.json branch mismatch: expected {branch}, got {meta_branch}"
            )));
        }
    }
    let pr_branch = branch
        .map(str::to_string)
        .or_else(|| {
            if meta_branch.is_empty() {
                None
            } else {
                Some(meta_branch.to_string())
            }
        })
        .unwrap_or(ctx.current_branch()?);

    if !git::is_clean(&ctx.cwd, &ctx.git)? {
        return Err(Failure::policy(format!(
            "Working tree is dirty (pr check requires clean state)\nContext: {}",
            ctx.context_line()
        )));
    }
    if !git::branch_exists(&ctx.repo, &ctx.git, &pr_branch)? {
        return Err(Failure::policy(format!("Unknown branch: {pr_branch}")));
    }
    if !git::branch_exists(&ctx.repo, &ctx.git, &base_ref)? {
        return Err(Failure::policy(format!("Unknown base branch: {base_ref}")));
    }
    let parsed_task_id = parse_task_id_from_task_branch(&ctx.branch_prefix, &pr_branch);
    if ctx.config.is_branch_pr_mode() && parsed_task_id != Some(task_id) {
        return Err(Failure::policy(format!(
            "Branch '{pr_branch}' does not match task id {task_id} (expected {})",
            task_branch_example(&ctx.branch_prefix)
        )));
    }

    let artifact_branch = if target.exists() {
        None
    } else {
        Some(pr_branch.as_str())
    };
    let mut missing_files = Vec::new();
    for name in [PR_META_FILE, PR_DIFFSTAT_FILE, PR_VERIFY_LOG_FILE] {
        if pr_try_read_file_text(ctx, task_id, name, artifact_branch)?.is_none() {
            missing_files.push(name);
        }
    }
    if !missing_files.is_empty() {
        return Err(Failure::policy(format!(
            "Missing PR artifact file(s): {}",
            missing_files.join(", ")
        )));
    }

    let Some(pr_doc) = pr_try_read_doc_text(ctx, task_id, artifact_branch)? else {
        return Err(Failure::policy(format!(
            "Missing PR doc: {}",
            rel_display(ctx, &ctx.paths.task_readme_path(task_id))
        )));
    };
    let doc_hint = rel_display(ctx, &ctx.paths.task_readme_path(task_id));
    let required = ctx.config.doc_required_sections()?;
    let (missing_sections, empty_sections) =
        swarm_docs::validate_required_sections(&pr_doc, &required);
    if !missing_sections.is_empty() {
        return Err(Failure::policy(format!(
            "PR doc {doc_hint} missing required section(s): {}",
            missing_sections.join(", ")
        )));
    }
    if !empty_sections.is_empty() {
        return Err(Failure::policy(format!(
            "PR doc {doc_hint} has empty section(s): {}",
            empty_sections.join(", ")
        )));
    }

    let subjects = git::log_subjects(&ctx.repo, &ctx.git, &base_ref, &pr_branch, 200)?;
    if subjects.is_empty() {
        return Err(Failure::policy(format!(
            "No commits found on '{pr_branch}' compared to '{base_ref}'"
        )));
    }
    if !subjects
        .iter()
        .any(|subject| commit_subject_mentions_task(task_id, subject))
    {
        let sample = subjects
            .iter()
            .take(3)
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        return Err(Failure::policy(commit_subject_missing_error(
            &[task_id.to_string()],
            &sample,
            Some(format!("Branch '{pr_branch}'").as_str()),
        )));
    }

    let changed = git::diff_names(&ctx.repo, &ctx.git, &base_ref, &pr_branch)?;
    if changed
        .iter()
        .any(|path| path == &ctx.paths.tasks_path_rel)
    {
        return Err(Failure::policy(format!(
            "Branch '{pr_branch}' modifies {} (single-writer violation)",
            ctx.paths.tasks_path_rel
        )));
    }

    if !quiet {
        ctx.print_block("CONTEXT", &ctx.context_line());
        ctx.print_block("ACTION", &format!("Validate PR for {task_id}"));
        ctx.print_block(
            "RESULT",
            &format!(
                "dir={} branch={pr_branch} base={base_ref}",
                rel_display(ctx, &target)
            ),
        );
        ctx.print_block("NEXT", "If green, INTEGRATOR can run `agentctl integrate ...`.");
    }
    Ok(())
}

pub fn cmd_pr_check(ctx: &AppContext, opts: &PrCheckOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }
    pr_check(
        ctx,
        &task_id,
        opts.branch.as_deref(),
        opts.base.as_deref(),
        opts.quiet,
    )
}

pub fn cmd_pr_note(ctx: &AppContext, opts: &PrNoteOpts) -> Result<(), Failure> {
    let task_id = opts.task_id.trim().to_string();
    if task_id.is_empty() {
        return Err(Failure::policy("task_id must be non-empty"));
    }
    let author = opts.author.trim().to_string();
    let body = opts.body.trim().to_string();
    if author.is_empty() {
        return Err(Failure::policy("--author is required (e.g., --author CODER)"));
    }
    if body.is_empty() {
        return Err(Failure::policy("--body is required"));
    }

    let review_path = ctx.paths.pr_dir(&task_id).join(PR_REVIEW_FILE);
    if !review_path.exists() {
        return Err(Failure::policy(format!(
            "Missing PR artifact file: {}\n\
             Fix:\n  1) Run `agentctl pr open {task_id} --author {author} --branch {}`\n  2) Commit the PR artifact files on the task branch\n  3) Re-run `agentctl pr note {task_id} --author {author} --body \"...\"`\n\
             Context: {}",
            rel_display(ctx, &review_path),
            task_branch_example(&ctx.branch_prefix),
            ctx.context_line()
        )));
    }

    let text =
        std::fs::read_to_string(&review_path).map_err(|err| Failure::msg(err.to_string()))?;
    let rel = rel_display(ctx, &review_path);
    let updated = append_handoff_note(&text, &author, &body, &rel)?;
    if updated != text {
        std::fs::write(&review_path, updated).map_err(|err| Failure::msg(err.to_string()))?;
    }
    if !opts.quiet {
        ctx.print_block("CONTEXT", &ctx.context_line());
        ctx.print_block("ACTION", &format!("Append handoff note for {task_id}"));
        ctx.print_block("RESULT", &format!("path={rel} author={author}"));
    }
    Ok(())
}
