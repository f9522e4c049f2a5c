//! Configuration resolution for the promise runtime's default executor.
//!
//! Resolution order per key (highest priority first): process environment,
//! then a `promise-configuration.properties` file discovered next to the
//! running executable or in the current working directory, then hardcoded
//! defaults. `load()` has a total contract — it never fails; malformed or
//! missing values simply fall through to the next source.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::executor::ManagedExecutor;
use crate::per_task_executor::PerTaskExecutor;
use crate::pool_executor::PoolExecutor;

const CLASS_KEY: &str = "promise.managed.service.class";
const CAPACITY_KEY: &str = "promise.managed.service.capacity";
const PROPERTIES_FILE_NAME: &str = "promise-configuration.properties";

/// Symbolic identifier for [`crate::pool_executor::PoolExecutor`] in the
/// configuration file and environment.
pub const CLASS_POOL: &str = "pool";
/// Symbolic identifier for [`crate::per_task_executor::PerTaskExecutor`].
pub const CLASS_PER_TASK: &str = "per-task";

/// Resolved `{executor_class_name, capacity}` pair, read once per [`load`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub executor_class_name: String,
    pub capacity: usize,
}

impl Configuration {
    /// Resolves configuration from (in priority order) the process
    /// environment, a properties file on the load path, then hardcoded
    /// defaults. Never fails.
    pub fn load() -> Configuration {
        let file_props = read_properties_file();

        let executor_class_name = std::env::var(CLASS_KEY)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| file_props.get(CLASS_KEY).cloned())
            .unwrap_or_else(|| CLASS_POOL.to_string());

        let capacity = std::env::var(CAPACITY_KEY)
            .ok()
            .and_then(|v| parse_capacity(&v))
            .or_else(|| file_props.get(CAPACITY_KEY).and_then(|v| parse_capacity(v)))
            .unwrap_or_else(default_capacity);

        Configuration { executor_class_name, capacity }
    }

    /// Binds a fresh `ManagedExecutor` from this configuration's resolved
    /// class name and capacity — the "Promise factory binds executor via
    /// Configuration" wiring the data flow names. An unknown class name falls
    /// through to `PoolExecutor`, the documented default.
    pub fn create_executor(&self, auto_shutdown: bool) -> Arc<dyn ManagedExecutor> {
        match self.executor_class_name.as_str() {
            CLASS_PER_TASK => PerTaskExecutor::new(self.capacity, auto_shutdown) as Arc<dyn ManagedExecutor>,
            _ => PoolExecutor::new(self.capacity, auto_shutdown) as Arc<dyn ManagedExecutor>,
        }
    }
}

/// Parses a capacity value: a positive integer, or the sentinel `-1` which
/// resolves to the number of available logical cores. Anything else
/// (negative other than `-1`, zero, non-numeric) is treated as absent.
fn parse_capacity(raw: &str) -> Option<usize> {
    match raw.trim().parse::<i64>() {
        Ok(-1) => Some(default_capacity()),
        Ok(n) if n > 0 => Some(n as usize),
        _ => None,
    }
}

fn default_capacity() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Discovers and parses `promise-configuration.properties`, first next to the
/// running executable, then in the current working directory. Read or parse
/// failure of any kind is swallowed and yields an empty map.
fn read_properties_file() -> HashMap<String, String> {
    for candidate in candidate_paths() {
        if let Ok(contents) = std::fs::read_to_string(&candidate) {
            return parse_properties(&contents);
        }
    }
    HashMap::new()
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(2);
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            paths.push(dir.join(PROPERTIES_FILE_NAME));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd.join(PROPERTIES_FILE_NAME));
    }
    paths
}

/// Parses `key=value` lines; `#`-prefixed and blank lines are ignored.
/// Malformed lines (no `=`) are skipped rather than rejecting the whole file.
fn parse_properties(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_capacity_positive_integer() {
        assert_eq!(parse_capacity("8"), Some(8));
    }

    #[test]
    fn test_parse_capacity_sentinel_minus_one() {
        assert_eq!(parse_capacity("-1"), Some(default_capacity()));
    }

    #[test]
    fn test_parse_capacity_zero_is_absent() {
        assert_eq!(parse_capacity("0"), None);
    }

    #[test]
    fn test_parse_capacity_negative_other_than_sentinel_is_absent() {
        assert_eq!(parse_capacity("-2"), None);
    }

    #[test]
    fn test_parse_capacity_malformed_is_absent() {
        assert_eq!(parse_capacity("not-a-number"), None);
    }

    #[test]
    fn test_parse_properties_skips_comments_and_blanks() {
        let contents = "# a comment\n\npromise.managed.service.class=per-task\n  \n# another\npromise.managed.service.capacity=4\n";
        let map = parse_properties(contents);
        assert_eq!(map.get(CLASS_KEY).map(String::as_str), Some("per-task"));
        assert_eq!(map.get(CAPACITY_KEY).map(String::as_str), Some("4"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_properties_ignores_malformed_line() {
        let contents = "no-equals-sign-here\npromise.managed.service.class=pool\n";
        let map = parse_properties(contents);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(CLASS_KEY).map(String::as_str), Some("pool"));
    }

    #[test]
    fn test_create_executor_defaults_to_pool_for_unknown_class() {
        let config = Configuration { executor_class_name: "nonsense".to_string(), capacity: 1 };
        let executor = config.create_executor(false);
        assert_eq!(executor.service_name(), "PoolExecutor");
    }

    #[test]
    fn test_create_executor_selects_per_task_by_name() {
        let config = Configuration { executor_class_name: CLASS_PER_TASK.to_string(), capacity: 1 };
        let executor = config.create_executor(false);
        assert_eq!(executor.service_name(), "PerTaskExecutor");
    }

    #[test]
    fn test_load_never_fails_and_has_defaults_absent_overrides() {
        std::env::remove_var(CLASS_KEY);
        std::env::remove_var(CAPACITY_KEY);
        let config = Configuration::load();
        assert!(!config.executor_class_name.is_empty());
        assert!(config.capacity >= 1);
    }
}
