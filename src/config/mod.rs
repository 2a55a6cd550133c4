//! Configuration: types, default paths, XML loading and validation.
//!
//! Precedence is CLI flag > XML file > built-in default. The XML file is read from
//! `$CLEANSHIFT_CONFIG` when set, otherwise from the OS config directory.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

pub use paths::{
    CONFIG_ENV, default_config_path, default_log_path, default_result_log_path,
    path_has_symlink_ancestor,
};
pub use types::{Config, LogLevel};
pub use xml::{LoadResult, create_template_config, load_config_from_xml_path, load_or_init};

pub const MIN_SIZE_MB_DEFAULT: u64 = 1024;
pub const SPACE_MARGIN_PERCENT_DEFAULT: u32 = 5;
pub const STALL_TIMEOUT_SECS_DEFAULT: u64 = 60;
pub const MOVE_DIR_NAME_DEFAULT: &str = "CleanShift_Moved";
