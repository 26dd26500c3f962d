use regex::Regex;
use serde::{Deserialize, Serialize};

/// Changeset options.
///
/// Deserializes from camelCase JSON; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Record writes without running validators.
    pub skip_validate: bool,
    /// Validate every field in the validator map at construction.
    pub init_validate: bool,
    /// Allow-list of writable keys. Each entry is a regular expression
    /// matched anywhere in the key. `None` or empty allows every key.
    pub changeset_keys: Option<Vec<String>>,
}

impl Config {
    /// The allow-list, if one is configured and non-empty.
    pub fn allowed_keys(&self) -> Option<&[String]> {
        self.changeset_keys
            .as_deref()
            .filter(|keys| !keys.is_empty())
    }
}

/// Compiled form of [`Config::changeset_keys`].
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyFilter {
    patterns: Vec<Regex>,
}

impl KeyFilter {
    /// Entries that are not valid expressions match literally.
    pub fn new(config: &Config) -> Self {
        let patterns = config
            .allowed_keys()
            .unwrap_or_default()
            .iter()
            .filter_map(|pattern| {
                Regex::new(pattern)
                    .or_else(|_| Regex::new(&regex::escape(pattern)))
                    .ok()
            })
            .collect();
        Self { patterns }
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json() {
        let config: Config =
            serde_json::from_str(r#"{"skipValidate": true, "changesetKeys": ["name"]}"#).unwrap();
        assert!(config.skip_validate);
        assert!(!config.init_validate);
        assert_eq!(config.allowed_keys(), Some(&["name".to_string()][..]));

        let empty: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Config::default());
    }

    #[test]
    fn test_key_filter() {
        let open = KeyFilter::new(&Config::default());
        assert!(open.accepts("anything"));

        let config = Config {
            changeset_keys: Some(vec!["^name$".into(), "address".into(), "(".into()]),
            ..Config::default()
        };
        let filter = KeyFilter::new(&config);
        assert!(filter.accepts("name"));
        assert!(!filter.accepts("nickname"));
        assert!(filter.accepts("address.city"));
        assert!(filter.accepts("a(b"));
        assert!(!filter.accepts("email"));
    }

    #[test]
    fn test_empty_allow_list_allows_all() {
        let config = Config {
            changeset_keys: Some(Vec::new()),
            ..Config::default()
        };
        assert_eq!(config.allowed_keys(), None);
        assert!(KeyFilter::new(&config).accepts("x"));
    }
}
