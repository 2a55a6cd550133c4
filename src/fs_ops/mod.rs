//! Filesystem primitives for relocation: staged tree copy, tallies, metadata
//! preservation, promotion by rename, and error enrichment.

mod atomic;
mod copy_tree;
mod helpers;
mod io_copy;
mod metadata;
mod tally;
mod util;

pub use atomic::try_atomic_move;
pub use copy_tree::{CopyError, CopyOptions, CopyProgress, copy_tree};
pub use helpers::describe_io;
pub use io_copy::DurabilityMode;
pub use metadata::{preserve_metadata, preserve_xattrs};
pub use tally::{TreeTally, special_kind, tally_tree};
pub use util::{force_remove_tree, fsync_dir, is_staging_name, remove_tree, staging_path};
