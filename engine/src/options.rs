use std::collections::{BTreeMap, BTreeSet};

use crate::ResourceUrn;

/// Narrowing and environment for one preview or execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationOptions {
    pub targets: BTreeSet<ResourceUrn>,
    pub replaces: BTreeSet<ResourceUrn>,
    pub excludes: BTreeSet<ResourceUrn>,
    pub env: BTreeMap<String, String>,
}

impl OperationOptions {
    /// Merge a base environment with plugin-supplied variables.
    ///
    /// Plugin values win on key collision.
    pub fn merge_env(
        base: &BTreeMap<String, String>,
        plugin: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        let mut env = base.clone();
        env.extend(plugin.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_env_plugin_wins() {
        let base = BTreeMap::from([
            ("AWS_PROFILE".to_string(), "default".to_string()),
            ("HOME".to_string(), "/home/me".to_string()),
        ]);
        let plugin = BTreeMap::from([("AWS_PROFILE".to_string(), "prod".to_string())]);

        let env = OperationOptions::merge_env(&base, &plugin);

        assert_eq!(env.get("AWS_PROFILE").map(String::as_str), Some("prod"));
        assert_eq!(env.get("HOME").map(String::as_str), Some("/home/me"));
    }
}
