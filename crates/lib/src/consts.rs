/// Application name, used for cache and config directory names.
pub const APP_NAME: &str = "envpin";

/// File name of a flake-form descriptor (pinned inputs + outputs function).
pub const DESCRIPTOR_FILENAME: &str = "envpin.lua";

/// File name of a classic descriptor (unpinned package set + overlays + tools).
pub const CLASSIC_FILENAME: &str = "shell.lua";

/// Length of the truncated object hashes used in store labels.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Environment variable overriding the detected system triple.
pub const SYSTEM_ENV: &str = "ENVPIN_SYSTEM";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "ENVPIN_CACHE_DIR";

/// Environment variable set inside every shell spawned by envpin.
pub const IN_SHELL_ENV: &str = "ENVPIN_SHELL";
