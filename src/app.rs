//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler and dispatches
//! the subcommand to the library.

use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

use cleanshift::cli::{AnalyzeArgs, Args, Command, MoveArgs};
use cleanshift::config::{CONFIG_ENV, Config, LoadResult, default_config_path, load_or_init};
use cleanshift::output as out;
use cleanshift::{
    CancelToken, MoveFailure, MoveRequest, NativePlatform, Platform, RelocationEngine,
    ResultLog, SafetyPolicy, ScanOptions, format_bytes, rank, scan, shutdown,
};

use crate::logging::init_tracing;

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    if let Command::PrintConfig = args.command {
        print_config();
        return Ok(());
    }

    let mut cfg = match load_or_init()? {
        LoadResult::CreatedTemplate(path) => {
            out::print_success(&format!(
                "A template cleanshift config was written to: {}",
                path.display()
            ));
            out::print_info("Built-in defaults apply until you edit it.");
            Config::default()
        }
        other => other.into_config(),
    };
    args.apply_overrides(&mut cfg);
    cfg.validate().context("invalid configuration")?;

    let guard = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    // The guard is dropped on interrupt so buffered file logs are flushed.
    let guard_slot = Arc::new(Mutex::new(guard));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; stopping at the next safe point...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("install signal handler")?;
    }

    debug!(?args, "starting cleanshift");
    let platform: Arc<dyn Platform> = Arc::new(NativePlatform);
    if !platform.is_elevated() {
        out::print_warn(
            "Not running as administrator/root: protected or system-owned folders may be refused.",
        );
    }

    let result = match &args.command {
        Command::Analyze(a) => analyze(&cfg, a, platform),
        Command::Move(m) => relocate(&cfg, m, platform),
        Command::PrintConfig => Ok(()),
    };

    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }
    result
}

fn print_config() {
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        out::print_info(&format!(
            "Using {CONFIG_ENV} (explicit):\n  {}\n",
            Path::new(&p).display()
        ));
        out::print_info(&format!(
            "To override, unset {CONFIG_ENV} or set it to another file."
        ));
        return;
    }
    match default_config_path() {
        Some(p) => {
            out::print_info(&format!(
                "Default cleanshift config path:\n  {}\n",
                p.display()
            ));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info(
                    "No config file exists there yet. Run any other command to create a template.",
                );
            }
        }
        None => out::print_error("Could not determine a default config path."),
    }
}

fn analyze(cfg: &Config, a: &AnalyzeArgs, platform: Arc<dyn Platform>) -> Result<()> {
    let options = ScanOptions {
        follow_symlinks: a.follow_symlinks,
        max_depth: a.max_depth,
        threads: cfg.scan_threads,
        cancel: CancelToken::new(),
        busy: None,
    };
    let index = scan(&a.root, &options).map_err(|e| {
        error!(code = e.code(), root = %a.root.display(), error = %e, "scan failed");
        anyhow!(e)
    })?;
    if !index.is_complete() {
        out::print_warn("Scan was interrupted; sizes below cover only what was visited.");
    }
    for issue in &index.issues {
        debug!(path = %issue.path.display(), kind = ?issue.kind, "{}", issue.message);
    }
    if !index.issues.is_empty() {
        out::print_warn(&format!(
            "{} folder(s) could not be read and count as 0 bytes.",
            index.issues.len()
        ));
    }

    let safety = SafetyPolicy::new(cfg.protected_table(), platform);
    let mut candidates = rank(&index, &cfg.rank_policy(a.targets.clone()), &safety);
    if let Some(limit) = a.limit {
        candidates.truncate(limit);
    }

    if a.report_json {
        let json = serde_json::to_string_pretty(&candidates).context("serialise candidates")?;
        out::print_user(&json);
        return Ok(());
    }

    out::print_info(&format!(
        "Scanned {} ({} in {} files, {:.1}s)",
        index.root.path.display(),
        format_bytes(index.total_bytes()),
        index.root.file_count,
        index.elapsed.as_secs_f64()
    ));
    if candidates.is_empty() {
        out::print_info(&format!(
            "No folders of at least {} found.",
            format_bytes(cfg.min_size_bytes())
        ));
        return Ok(());
    }
    out::print_heading(&format!(
        "{:>10}  {:<22}  {:<22}  PATH",
        "SIZE", "CATEGORY", "STATUS"
    ));
    for c in &candidates {
        let status = format!("{:?}", c.classification);
        let mut line = format!(
            "{:>10}  {:<22}  {:<22}  {}",
            format_bytes(c.node.size_bytes),
            c.category.label(),
            status,
            c.node.path.display()
        );
        if !c.is_selectable() {
            line.push_str(&format!("  ({})", c.reason));
        } else if let Some(t) = &c.suggested_target {
            line.push_str(&format!("  -> {}", t.display()));
        }
        out::print_user(&line);
    }
    Ok(())
}

fn relocate(cfg: &Config, m: &MoveArgs, platform: Arc<dyn Platform>) -> Result<()> {
    let safety = Arc::new(SafetyPolicy::new(cfg.protected_table(), platform.clone()));
    let mut engine = RelocationEngine::new(cfg.engine_settings(), safety.clone(), platform);
    if let Some(path) = &cfg.result_log {
        engine = engine.with_result_log(ResultLog::new(path));
    }

    let mut request = MoveRequest::new(&m.source, &m.target_volume).confirmed(m.confirm);
    if !request.confirm && !m.dry_run {
        let verdict = safety.evaluate(&m.source);
        if verdict.requires_confirmation && !verdict.protected && out::stdin_is_tty() {
            let question = format!(
                "{} is {}. Relocate it anyway?",
                m.source.display(),
                verdict.reason.describe()
            );
            request.confirm = out::confirm(&question).context("read confirmation")?;
        }
    }

    if m.dry_run {
        let plan = engine.plan(&request).map_err(report_failure)?;
        out::print_info(&format!(
            "Dry-run: would move '{}' ({} in {} files) -> '{}'",
            plan.source_path.display(),
            format_bytes(plan.tally.bytes),
            plan.tally.files,
            plan.target_path.display()
        ));
        out::print_user(&format!("  staging: {}", plan.staging_path.display()));
        out::print_user(&format!("  link:    {}", plan.link_path.display()));
        out::print_user(&format!(
            "  space:   need {} (with margin), {} free",
            format_bytes(plan.required_bytes),
            format_bytes(plan.available_bytes)
        ));
        return Ok(());
    }

    let report = engine
        .relocate(request, CancelToken::new())
        .map_err(report_failure)?;
    if report.job.cancel_deferred {
        out::print_warn("Interrupt arrived after the source was removed; the move was finished to stay consistent.");
    }
    info!(
        job = report.job.id,
        source = %report.job.source_path.display(),
        target = %report.job.target_path.display(),
        "relocation finished"
    );
    out::print_success(&format!(
        "Moved {} ({}) -> {}; link left at the original path.",
        report.job.source_path.display(),
        format_bytes(report.moved.bytes),
        report.job.target_path.display()
    ));
    Ok(())
}

/// Print a failure the way the operator needs to read it and turn it into an error.
fn report_failure(f: MoveFailure) -> anyhow::Error {
    match &f.job.inconsistency {
        Some(inc) => {
            out::print_error("The move stopped after the source was modified. Operator attention required.");
            out::print_error(&inc.to_string());
            out::print_error(&format!("Cause: {}", f.error));
        }
        None => {
            if f.job.state == cleanshift::MoveState::RolledBack {
                out::print_error(&format!(
                    "Move failed and was rolled back; '{}' is unchanged. Cause: {}",
                    f.job.source_path.display(),
                    f.error
                ));
            } else {
                out::print_error(&format!("Move not started: {}", f.error));
            }
        }
    }
    warn!(code = f.error.code(), kind = f.error.kind(), "move did not complete");
    anyhow!(f)
}
