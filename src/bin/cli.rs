use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use colored::*;
use snapview::classify::Classification;
use snapview::config::Settings;
use snapview::error::with_retry;
use snapview::loadrules::PathStyle;
use snapview::refresh::{classify_workspace, resolve_load_rules};
use snapview::{
    refresh, swipe, Cleartool, Components, LoadRuleSource, RefreshFailure, RefreshOptions,
    RefreshResult, SwipeOutcome, VersionControl, Workspace,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "snapview")]
#[command(
    about = "Reconcile and refresh ClearCase snapshot views",
    version
)]
#[command(after_help = "Examples:
   snapview update --swipe --modifiable
   snapview update --load-rules \"\\Model \\Tools\" --overwrite
   snapview swipe --dry-run
   snapview load-rules --modifiable")]
struct Cli {
    /// Settings file (defaults to $SNAPVIEW_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Swipe (optionally), reset the config spec and update the view
    #[command(group(ArgGroup::new("rules").args(["all", "modifiable", "load_rules"])))]
    Update {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Delete view-private files first
        #[arg(long)]
        swipe: bool,

        /// Regenerate the stream configuration first
        #[arg(long)]
        generate: bool,

        /// Overwrite hijacked files
        #[arg(long)]
        overwrite: bool,

        /// Leave files directly under the view root alone
        #[arg(long)]
        exclude_root: bool,

        /// Load every component in the config spec (default)
        #[arg(long)]
        all: bool,

        /// Load only the modifiable components
        #[arg(long)]
        modifiable: bool,

        /// Explicit load rules, whitespace separated
        #[arg(long, value_name = "RULES")]
        load_rules: Option<String>,

        /// Retry while the stream is being rebased
        #[arg(long)]
        retry: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete view-private files
    Swipe {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        /// Leave files directly under the view root alone
        #[arg(long)]
        exclude_root: bool,

        /// List what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the load rules of the current config spec
    LoadRules {
        #[arg(short, long, default_value = ".")]
        path: PathBuf,

        #[arg(long)]
        modifiable: bool,
    },
}

fn init_tracing(verbose: u8, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_level = match verbose {
        0 => "snapview=info",
        1 => "snapview=debug",
        _ => "snapview=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "snapview.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;
    let _guard = init_tracing(cli.verbose, settings.log_dir.as_deref());

    let tool = Cleartool::new(&settings.executable);

    match cli.command {
        Commands::Update {
            path,
            swipe,
            generate,
            overwrite,
            exclude_root,
            all: _,
            modifiable,
            load_rules,
            retry,
            json,
        } => {
            let source = match load_rules {
                Some(rules) => LoadRuleSource::Explicit(rules),
                None if modifiable => LoadRuleSource::Components(Components::Modifiable),
                None => LoadRuleSource::Components(Components::All),
            };
            let options = RefreshOptions {
                swipe,
                generate_stream: generate,
                overwrite,
                exclude_root,
                load_rules: source,
            };

            let workspace = {
                let tool = tool.clone();
                let identity_file = settings.identity_file.clone();
                tokio::task::spawn_blocking(move || Workspace::open(&tool, &path, &identity_file))
                    .await??
            };

            let policy = if retry {
                settings.retry_policy()
            } else {
                snapview::RetryPolicy::no_retry()
            };

            let result = with_retry(&policy, || {
                let tool = tool.clone();
                let workspace = workspace.clone();
                let options = options.clone();
                async move {
                    tokio::task::spawn_blocking(move || refresh(&tool, &workspace, &options)).await?
                }
            })
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_refresh(&workspace, &result);
            }

            if let Some(failure) = result.failure {
                if matches!(failure, RefreshFailure::Busy { .. }) && !retry {
                    eprintln!("{}", "Try again shortly, or pass --retry".yellow());
                }
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Swipe {
            path,
            exclude_root,
            dry_run,
        } => {
            let identity_file = settings.identity_file.clone();
            let (classification, outcome) = tokio::task::spawn_blocking(move || {
                let root = tool
                    .working_view_root(&path)
                    .with_context(|| format!("Unable to get view root for {}", path.display()))?;
                let workspace = Workspace::new(root).with_identity_file(identity_file);
                let rules = resolve_load_rules(
                    &tool,
                    &workspace,
                    &LoadRuleSource::default(),
                    PathStyle::native(),
                )?;
                let classification =
                    classify_workspace(&tool, &workspace, &rules.all, exclude_root)?;
                let outcome = (!dry_run).then(|| swipe(&classification));
                anyhow::Ok((classification, outcome))
            })
            .await??;

            match outcome {
                None => print_candidates(&classification),
                Some(outcome) => {
                    print_swipe(&outcome);
                    if !outcome.is_clean() {
                        return Ok(ExitCode::FAILURE);
                    }
                }
            }
        }

        Commands::LoadRules { path, modifiable } => {
            let rules = tokio::task::spawn_blocking(move || {
                let root = tool
                    .working_view_root(&path)
                    .with_context(|| format!("Unable to get view root for {}", path.display()))?;
                let source = LoadRuleSource::Components(if modifiable {
                    Components::Modifiable
                } else {
                    Components::All
                });
                resolve_load_rules(&tool, &Workspace::new(root), &source, PathStyle::native())
            })
            .await??;

            if rules.selected.is_empty() {
                println!("{}", "No load rules in the config spec".yellow());
            }
            for rule in rules.selected.iter() {
                let marker = if rule.read_only {
                    "read-only".bright_black()
                } else {
                    "modifiable".green()
                };
                println!("  {} {}", rule.path.bright_white(), marker);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_refresh(workspace: &Workspace, result: &RefreshResult) {
    if let Some(outcome) = &result.swipe {
        print_swipe(outcome);
    }

    match &result.failure {
        None => {
            println!("{} Updated {}", "✓".green(), workspace.to_string().bright_cyan());
            if let Some(path) = &result.cache_log_path {
                println!("  Log: {}", path.display().to_string().bright_blue());
            }
        }
        Some(failure) => eprintln!("{}", failure.display().red()),
    }
}

fn print_swipe(outcome: &SwipeOutcome) {
    let mark = if outcome.is_clean() {
        "✓".green()
    } else {
        "✗".red()
    };
    println!(
        "{} Swiped {} file(s) and {} director(y/ies) of {} candidate(s)",
        mark, outcome.files_deleted, outcome.dirs_deleted, outcome.total_candidates
    );
    if outcome.foreign_dirs_removed > 0 {
        println!(
            "  Removed {} top-level director(y/ies) outside the load rules",
            outcome.foreign_dirs_removed
        );
    }
    if outcome.foreign_dirs_failed > 0 {
        println!(
            "  {} {} top-level director(y/ies) outside the load rules left on disk",
            "✗".red(),
            outcome.foreign_dirs_failed
        );
    }
    if !outcome.success {
        println!(
            "  {} of {} candidate(s) could not be deleted",
            outcome.residue(),
            outcome.total_candidates
        );
    }
}

fn print_candidates(classification: &Classification) {
    if classification.is_empty() {
        println!("{}", "Nothing to swipe".green());
        return;
    }
    for dir in &classification.foreign_dirs {
        println!("  {} {}", "dir/".yellow(), dir.display());
    }
    for candidate in &classification.candidates {
        let kind = if candidate.is_directory {
            "dir ".yellow()
        } else {
            "file".normal()
        };
        println!("  {} {}", kind, candidate.path.display());
    }
}
