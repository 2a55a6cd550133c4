//! Command-line parsing and config overrides.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use cleanshift::cli::{Args, Command};
use cleanshift::{Config, LogLevel};

#[test]
fn analyze_flags_override_config() {
    let args = Args::try_parse_from([
        "cleanshift",
        "analyze",
        "/home/u",
        "--min-size-mb",
        "200",
        "--target",
        "/mnt/d",
        "--target",
        "/mnt/e",
        "--threads",
        "2",
        "--max-depth",
        "6",
    ])
    .unwrap();
    let Command::Analyze(a) = &args.command else {
        panic!("expected analyze");
    };
    assert_eq!(a.root, PathBuf::from("/home/u"));
    assert_eq!(a.targets, vec![PathBuf::from("/mnt/d"), PathBuf::from("/mnt/e")]);
    assert_eq!(a.max_depth, Some(6));

    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.min_size_mb, 200);
    assert_eq!(cfg.scan_threads, 2);
    assert_eq!(cfg.log_level, LogLevel::Normal);
}

#[test]
fn move_flags_override_config() {
    let args = Args::try_parse_from([
        "cleanshift",
        "move",
        "/home/u/.cache",
        "/mnt/d",
        "--yes",
        "--dry-run",
        "--stall-timeout",
        "5",
        "--no-preserve-metadata",
        "--debug",
    ])
    .unwrap();
    let Command::Move(m) = &args.command else {
        panic!("expected move");
    };
    assert!(m.confirm);
    assert!(m.dry_run);

    let mut cfg = Config::default();
    args.apply_overrides(&mut cfg);
    assert_eq!(cfg.stall_timeout, Duration::from_secs(5));
    assert!(!cfg.preserve_metadata);
    assert_eq!(cfg.log_level, LogLevel::Debug);
    assert_eq!(cfg.move_dir_name, "CleanShift_Moved");
}

#[test]
fn move_requires_both_paths() {
    assert!(Args::try_parse_from(["cleanshift", "move", "/home/u/.cache"]).is_err());
}
