/// Application name used for config, data and state directories.
pub const APP_NAME: &str = "mbuild";

/// Directory (relative to the install prefix) holding per-prefix bookkeeping.
pub const PREFIX_META_DIR: &str = ".mbuild";

/// Revision token used for modules whose source revision is not known.
pub const UNVERSIONED: &str = "unversioned";
