//! agentctl: task-and-commit orchestration over a git repository.

use clap::{Parser, Subcommand};

use swarmctl::commands::branch::{
    cmd_branch_create, cmd_branch_remove, cmd_branch_status, cmd_cleanup_merged, cmd_work_start,
    BranchCreateOpts, BranchRemoveOpts, BranchStatusOpts, CleanupMergedOpts, WorkStartOpts,
};
use swarmctl::commands::commit::{
    cmd_commit, cmd_guard_clean, cmd_guard_commit, cmd_guard_suggest_allow, CommitOpts,
    GuardCommitOpts, GuardSuggestAllowOpts,
};
use swarmctl::commands::config::{cmd_config_set, cmd_config_show, cmd_quickstart, ConfigSetOpts};
use swarmctl::commands::hooks::{
    cmd_hooks_install, cmd_hooks_run, cmd_hooks_uninstall, HooksInstallOpts, HooksRunOpts,
    HooksUninstallOpts,
};
use swarmctl::commands::integrate::{cmd_integrate, IntegrateOpts};
use swarmctl::commands::pr::{
    cmd_pr_check, cmd_pr_note, cmd_pr_open, cmd_pr_update, PrCheckOpts, PrNoteOpts, PrOpenOpts,
    PrUpdateOpts,
};
use swarmctl::commands::sync::{cmd_sync, SyncOpts};
use swarmctl::commands::task::{
    cmd_agents, cmd_task_add, cmd_task_comment, cmd_task_doc_set, cmd_task_doc_show,
    cmd_task_export, cmd_task_lint, cmd_task_list, cmd_task_migrate, cmd_task_new,
    cmd_task_next, cmd_task_normalize, cmd_task_scaffold, cmd_task_scrub, cmd_task_search,
    cmd_task_show, cmd_task_update, TaskAddOpts, TaskCommentOpts, TaskDocSetOpts, TaskDocShowOpts,
    TaskExportOpts, TaskLintOpts, TaskListOpts, TaskMigrateOpts, TaskNewOpts, TaskNextOpts,
    TaskNormalizeOpts, TaskScaffoldOpts, TaskScrubOpts, TaskSearchOpts, TaskShowOpts,
    TaskUpdateOpts,
};
use swarmctl::commands::workflow::{
    cmd_block, cmd_finish, cmd_ready, cmd_set_status, cmd_start, cmd_verify, BlockOpts, FinishOpts,
    ReadyOpts, SetStatusOpts, StartOpts, VerifyOpts,
};
use swarmctl::{AppContext, Failure};

#[derive(Parser)]
#[command(name = "agentctl")]
#[command(about = "codex-swarm agent workflow helper")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Task store operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Check dependency readiness of a task
    Ready(ReadyOpts),
    /// Run a task's verify commands
    Verify(VerifyOpts),
    /// Transition a task to DOING with a structured comment
    Start(StartOpts),
    /// Transition a task to BLOCKED with a structured comment
    Block(BlockOpts),
    /// Mark task(s) DONE with commit metadata
    Finish(FinishOpts),
    /// Guarded git commit mentioning the task
    Commit(CommitOpts),
    /// Commit guard checks without committing
    Guard {
        #[command(subcommand)]
        action: GuardAction,
    },
    /// Task branch and worktree management
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },
    /// Convenience bundles
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },
    /// Repository cleanup helpers
    Cleanup {
        #[command(subcommand)]
        action: CleanupAction,
    },
    /// PR artifact management
    Pr {
        #[command(subcommand)]
        action: PrAction,
    },
    /// Merge a task branch into base and close the task
    Integrate(IntegrateOpts),
    /// Managed git hooks
    Hooks {
        #[command(subcommand)]
        action: HooksAction,
    },
    /// Sync the task store with the remote tracker
    Sync(SyncOpts),
    /// Workflow config access
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List agent descriptors
    Agents,
    /// Print the agentctl usage quick reference
    Quickstart,
}

#[derive(Subcommand)]
enum TaskAction {
    List(TaskListOpts),
    Next(TaskNextOpts),
    Search(TaskSearchOpts),
    Show(TaskShowOpts),
    New(TaskNewOpts),
    Add(TaskAddOpts),
    Update(TaskUpdateOpts),
    Comment(TaskCommentOpts),
    SetStatus(SetStatusOpts),
    Lint(TaskLintOpts),
    Scrub(TaskScrubOpts),
    Scaffold(TaskScaffoldOpts),
    Export(TaskExportOpts),
    Normalize(TaskNormalizeOpts),
    Migrate(TaskMigrateOpts),
    Doc {
        #[command(subcommand)]
        action: TaskDocAction,
    },
}

#[derive(Subcommand)]
enum TaskDocAction {
    Show(TaskDocShowOpts),
    Set(TaskDocSetOpts),
}

#[derive(Subcommand)]
enum GuardAction {
    /// Fail when anything is staged
    Clean {
        #[arg(long, short)]
        quiet: bool,
    },
    /// Suggest --allow prefixes from the staged files
    SuggestAllow(GuardSuggestAllowOpts),
    /// Run the full commit guard without committing
    Commit(GuardCommitOpts),
}

#[derive(Subcommand)]
enum BranchAction {
    Create(BranchCreateOpts),
    Status(BranchStatusOpts),
    Remove(BranchRemoveOpts),
}

#[derive(Subcommand)]
enum WorkAction {
    /// Branch + worktree + README + PR artifact in one step
    Start(WorkStartOpts),
}

#[derive(Subcommand)]
enum CleanupAction {
    /// Delete task branches already merged into base
    Merged(CleanupMergedOpts),
}

#[derive(Subcommand)]
enum PrAction {
    Open(PrOpenOpts),
    Update(PrUpdateOpts),
    Check(PrCheckOpts),
    Note(PrNoteOpts),
}

#[derive(Subcommand)]
enum HooksAction {
    Install(HooksInstallOpts),
    Uninstall(HooksUninstallOpts),
    Run(HooksRunOpts),
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    Set(ConfigSetOpts),
}

fn run(cli: Cli) -> Result<(), Failure> {
    let ctx = AppContext::init()?;
    match cli.command {
        Commands::Task { action } => match action {
            TaskAction::List(opts) => cmd_task_list(&ctx, &opts),
            TaskAction::Next(opts) => cmd_task_next(&ctx, &opts),
            TaskAction::Search(opts) => cmd_task_search(&ctx, &opts),
            TaskAction::Show(opts) => cmd_task_show(&ctx, &opts),
            TaskAction::New(opts) => cmd_task_new(&ctx, &opts),
            TaskAction::Add(opts) => cmd_task_add(&ctx, &opts),
            TaskAction::Update(opts) => cmd_task_update(&ctx, &opts),
            TaskAction::Comment(opts) => cmd_task_comment(&ctx, &opts),
            TaskAction::SetStatus(opts) => cmd_set_status(&ctx, &opts),
            TaskAction::Lint(opts) => cmd_task_lint(&ctx, &opts),
            TaskAction::Scrub(opts) => cmd_task_scrub(&ctx, &opts),
            TaskAction::Scaffold(opts) => cmd_task_scaffold(&ctx, &opts),
            TaskAction::Export(opts) => cmd_task_export(&ctx, &opts),
            TaskAction::Normalize(opts) => cmd_task_normalize(&ctx, &opts),
            TaskAction::Migrate(opts) => cmd_task_migrate(&ctx, &opts),
            TaskAction::Doc { action } => match action {
                TaskDocAction::Show(opts) => cmd_task_doc_show(&ctx, &opts),
                TaskDocAction::Set(opts) => cmd_task_doc_set(&ctx, &opts),
            },
        },
        Commands::Ready(opts) => cmd_ready(&ctx, &opts),
        Commands::Verify(opts) => cmd_verify(&ctx, &opts),
        Commands::Start(opts) => cmd_start(&ctx, &opts),
        Commands::Block(opts) => cmd_block(&ctx, &opts),
        Commands::Finish(opts) => cmd_finish(&ctx, &opts),
        Commands::Commit(opts) => cmd_commit(&ctx, &opts),
        Commands::Guard { action } => match action {
            GuardAction::Clean { quiet } => cmd_guard_clean(&ctx, quiet),
            GuardAction::SuggestAllow(opts) => cmd_guard_suggest_allow(&ctx, &opts),
            GuardAction::Commit(opts) => cmd_guard_commit(&ctx, &opts),
        },
        Commands::Branch { action } => match action {
            BranchAction::Create(opts) => cmd_branch_create(&ctx, &opts),
            BranchAction::Status(opts) => cmd_branch_status(&ctx, &opts),
            BranchAction::Remove(opts) => cmd_branch_remove(&ctx, &opts),
        },
        Commands::Work { action } => match action {
            WorkAction::Start(opts) => cmd_work_start(&ctx, &opts),
        },
        Commands::Cleanup { action } => match action {
            CleanupAction::Merged(opts) => cmd_cleanup_merged(&ctx, &opts),
        },
        Commands::Pr { action } => match action {
            PrAction::Open(opts) => cmd_pr_open(&ctx, &opts),
            PrAction::Update(opts) => cmd_pr_update(&ctx, &opts),
            PrAction::Check(opts) => cmd_pr_check(&ctx, &opts),
            PrAction::Note(opts) => cmd_pr_note(&ctx, &opts),
        },
        Commands::Integrate(opts) => cmd_integrate(&ctx, &opts),
        Commands::Hooks { action } => match action {
            HooksAction::Install(opts) => cmd_hooks_install(&ctx, &opts),
            HooksAction::Uninstall(opts) => cmd_hooks_uninstall(&ctx, &opts),
            HooksAction::Run(opts) => cmd_hooks_run(&ctx, &opts),
        },
        Commands::Sync(opts) => cmd_sync(&ctx, &opts),
        Commands::Config { action } => match action {
            ConfigAction::Show => cmd_config_show(&ctx),
            ConfigAction::Set(opts) => cmd_config_set(&ctx, &opts),
        },
        Commands::Agents => cmd_agents(&ctx),
        Commands::Quickstart => cmd_quickstart(&ctx),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(failure) = run(cli) {
        if !failure.message.is_empty() {
            eprintln!("{failure}");
        }
        std::process::exit(failure.code);
    }
}
