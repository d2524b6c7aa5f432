//! Push/pull between the local cache and the remote tracker.

use clap::Args;

use swarm_core::EventKind;
use swarm_store::{ConflictStrategy, SyncDirection, SyncOptions, SyncOutcome};

use crate::context::AppContext;
use crate::failure::Failure;

#[derive(Debug, Args)]
pub struct SyncOpts {
    /// push or pull
    #[arg(long, default_value = "push")]
    pub direction: String,
    /// diff | prefer-local | prefer-remote | fail
    #[arg(long, default_value = "diff")]
    pub conflict: String,
    /// Confirm the push (without it, only the preview prints)
    #[arg(long)]
    pub yes: bool,
    /// Expected backend id (safety check)
    #[arg(long)]
    pub backend: Option<String>,
    #[arg(long, short)]
    pub quiet: bool,
}

pub fn cmd_sync(ctx: &AppContext, opts: &SyncOpts) -> Result<(), Failure> {
    let store = ctx.make_store()?;
    let Some(backend) = store.backend() else {
        return Err(Failure::policy(
            "No backend configured (set tasks_backend.config_path in .codex-swarm/config.json)",
        ));
    };
    if let Some(expected) = opts
        .backend
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        let decl = ctx.config.load_backend_decl(&ctx.repo.root)?;
        let configured = decl.map(|decl| decl.id).unwrap_or_default();
        if !configured.is_empty() && configured != expected {
            return Err(Failure::policy(format!(
                "Configured backend is '{configured}', not '{expected}'"
            )));
        }
    }
    let Some(syncer) = backend.syncer() else {
        return Err(Failure::policy("Configured backend does not support sync()"));
    };

    let direction: SyncDirection = opts.direction.parse().map_err(Failure::policy)?;
    let conflict: ConflictStrategy = opts.conflict.parse().map_err(Failure::policy)?;
    let outcome = syncer.sync(&SyncOptions {
        direction,
        conflict,
        confirm: opts.yes,
    })?;

    match outcome {
        SyncOutcome::NothingToPush => {
            if !opts.quiet {
                println!("ℹ️ no dirty tasks to push");
            }
        }
        SyncOutcome::PushPreview { dirty } => {
            println!("Dirty tasks ({}):", dirty.len());
            for line in &dirty {
                println!("- {line}");
            }
            ctx.print_block("NEXT", "Re-run with `--yes` to push these tasks.");
        }
        SyncOutcome::Pushed { count } => {
            ctx.emit(None, EventKind::SyncPushed { count });
            if !opts.quiet {
                println!("✅ pushed {count} dirty task(s)");
            }
        }
        SyncOutcome::Pulled { count } => {
            ctx.emit(None, EventKind::SyncPulled { count });
            if !opts.quiet {
                println!("✅ pulled {count} task(s)");
            }
        }
    }
    Ok(())
}
