//! Environment variable lookup
//!
//! The resolver never reads the process environment directly. It goes
//! through an injected [`EnvLookup`], which keeps resolution a pure function
//! of its inputs and makes it testable without mutating global state.

use std::collections::HashMap;

/// Capability to look up environment variables by name
#[cfg_attr(test, mockall::automock)]
pub trait EnvLookup: Send + Sync {
    /// Value of `name`, or `None` when unset or not valid UTF-8
    fn get(&self, name: &str) -> Option<String>;
}

/// Lookup backed by the process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvLookup for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_lookup() {
        let env = HashMap::from([("HOST".to_string(), "localhost".to_string())]);
        assert_eq!(EnvLookup::get(&env, "HOST").as_deref(), Some("localhost"));
        assert_eq!(EnvLookup::get(&env, "PORT"), None);
    }

    #[test]
    fn test_process_env_lookup() {
        std::env::set_var("CONFIG_RESOLVER_ENV_TEST", "from-process");
        assert_eq!(
            ProcessEnv.get("CONFIG_RESOLVER_ENV_TEST").as_deref(),
            Some("from-process")
        );
        std::env::remove_var("CONFIG_RESOLVER_ENV_TEST");
        assert_eq!(ProcessEnv.get("CONFIG_RESOLVER_ENV_TEST"), None);
    }
}
