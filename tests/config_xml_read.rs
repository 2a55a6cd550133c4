//! XML config parsing and the CLEANSHIFT_CONFIG override.

use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::tempdir;

use cleanshift::config::{CONFIG_ENV, LoadResult, load_or_init};
use cleanshift::{LogLevel, default_config_path, load_config_from_xml_path};

#[test]
fn reads_every_key() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    let log_file = td.path().join("cleanshift.log");
    let xml = format!(
        r#"
<config>
  <log_level> debug </log_level>
  <log_file>{}</log_file>
  <result_log></result_log>
  <min_size_mb> 512 </min_size_mb>
  <space_margin_percent>10</space_margin_percent>
  <stall_timeout_seconds>90</stall_timeout_seconds>
  <scan_threads>4</scan_threads>
  <move_dir_name>Relocated</move_dir_name>
  <preserve_metadata>false</preserve_metadata>
  <protected_path>/srv/keep</protected_path>
  <protected_path>/srv/also</protected_path>
  <confirm_path>/home/u/.cache</confirm_path>
</config>
"#,
        log_file.display()
    );
    fs::write(&cfg_path, xml).unwrap();

    let cfg = load_config_from_xml_path(&cfg_path).unwrap();
    assert_eq!(cfg.log_level, LogLevel::Debug);
    assert_eq!(cfg.log_file.as_deref(), Some(log_file.as_path()));
    assert_eq!(cfg.min_size_mb, 512);
    assert_eq!(cfg.space_margin_percent, 10);
    assert_eq!(cfg.stall_timeout, Duration::from_secs(90));
    assert_eq!(cfg.scan_threads, 4);
    assert_eq!(cfg.move_dir_name, "Relocated");
    assert!(!cfg.preserve_metadata);
    assert_eq!(
        cfg.protected_paths,
        vec![PathBuf::from("/srv/keep"), PathBuf::from("/srv/also")]
    );
    assert_eq!(cfg.confirm_paths, vec![PathBuf::from("/home/u/.cache")]);
    // An empty element keeps the default.
    assert_eq!(cfg.result_log, cleanshift::Config::default().result_log);
}

#[test]
fn unknown_key_is_rejected() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><min_size_gb>1</min_size_gb></config>").unwrap();
    let err = load_config_from_xml_path(&cfg_path).unwrap_err();
    assert!(format!("{err:#}").contains("min_size_gb"), "{err:#}");
}

#[test]
fn invalid_log_level_is_rejected() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("config.xml");
    fs::write(&cfg_path, "<config><log_level>loud</log_level></config>").unwrap();
    assert!(load_config_from_xml_path(&cfg_path).is_err());
}

#[test]
#[serial]
fn env_override_selects_the_file() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("custom.xml");
    fs::write(&cfg_path, "<config><min_size_mb>2048</min_size_mb></config>").unwrap();

    unsafe {
        std::env::set_var(CONFIG_ENV, &cfg_path);
    }
    let resolved = default_config_path();
    let loaded = load_or_init();
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }

    assert_eq!(resolved.as_deref(), Some(cfg_path.as_path()));
    match loaded.unwrap() {
        LoadResult::Loaded(cfg, path) => {
            assert_eq!(path, cfg_path);
            assert_eq!(cfg.min_size_mb, 2048);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
#[serial]
fn missing_explicit_file_falls_back_to_defaults_without_writing() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("absent.xml");

    unsafe {
        std::env::set_var(CONFIG_ENV, &cfg_path);
    }
    let loaded = load_or_init();
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }

    assert!(matches!(loaded.unwrap(), LoadResult::Defaults));
    assert!(!cfg_path.exists());
}
