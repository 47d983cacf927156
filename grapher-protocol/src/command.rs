//! Command parsing.
//!
//! One input unit (a line, a read chunk or a message) carries one command:
//!
//! ```text
//! <verb> [<name>=<value>(&&<name>=<value>)*]
//! ```
//!
//! The verb is case-insensitive. Argument names are lower-cased; values are
//! kept verbatim and may contain anything except the `&&` separator.

use crate::error::ProtocolError;
use std::collections::HashMap;

/// Verb that loads a driver into the session.
pub const LOAD_VERB: &str = "load";

/// Verb that unloads the session's driver.
pub const UNLOAD_VERB: &str = "unload";

/// Separator between argument clauses.
pub const ARGUMENT_SEPARATOR: &str = "&&";

/// A parsed command: the verb and the unparsed remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Lower-cased first token. Empty for blank input.
    pub verb: String,
    /// Everything after the first run of whitespace, trimmed.
    pub raw_args: String,
}

impl Command {
    /// Splits one input unit into verb and raw arguments.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match input.split_once(char::is_whitespace) {
            Some((verb, rest)) => Self {
                verb: verb.to_lowercase(),
                raw_args: rest.trim().to_string(),
            },
            None => Self {
                verb: input.to_lowercase(),
                raw_args: String::new(),
            },
        }
    }

    /// Returns whether the input carried no verb at all.
    pub fn is_empty(&self) -> bool {
        self.verb.is_empty()
    }

    /// Returns whether this is one of the session-level verbs.
    pub fn is_reserved(&self) -> bool {
        self.verb == LOAD_VERB || self.verb == UNLOAD_VERB
    }

    /// Parses the raw arguments into an argument map.
    pub fn arguments(&self) -> Result<ArgumentMap, ProtocolError> {
        ArgumentMap::parse(&self.raw_args)
    }
}

/// Argument names mapped to their string values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgumentMap {
    values: HashMap<String, String>,
}

impl ArgumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `a=1&&b=2` style arguments.
    ///
    /// Empty input yields an empty map. A clause without `=` fails the whole
    /// parse. A repeated name keeps its last value.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let mut args = Self::new();
        if raw.is_empty() {
            return Ok(args);
        }
        for clause in raw.split(ARGUMENT_SEPARATOR) {
            let (name, value) = clause
                .split_once('=')
                .ok_or_else(|| ProtocolError::MalformedArgument(clause.to_string()))?;
            args.insert(name, value);
        }
        Ok(args)
    }

    /// Inserts an argument, lower-casing its name.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_lowercase(), value.into());
    }

    /// Returns the raw value of an argument.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Splits a comma-separated value, e.g. `types=node,edge`.
    ///
    /// Empty items are dropped and the rest are trimmed.
    pub fn list(&self, name: &str) -> Option<Vec<&str>> {
        self.get(name).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .collect()
        })
    }

    /// Parses a boolean value (`true`/`false`/`1`/`0`, any case).
    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.get(name)?.trim().to_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        }
    }

    /// Iterates over argument names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for ArgumentMap {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut args = Self::new();
        for (name, value) in iter {
            args.insert(name, value);
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_verb_and_args() {
        let cmd = Command::parse("DATA types=node,edge");
        assert_eq!(cmd.verb, "data");
        assert_eq!(cmd.raw_args, "types=node,edge");
    }

    #[test]
    fn test_parse_verb_only() {
        let cmd = Command::parse("  Info \n");
        assert_eq!(cmd.verb, "info");
        assert_eq!(cmd.raw_args, "");
        assert!(!cmd.is_empty());
    }

    #[test]
    fn test_parse_collapses_leading_whitespace_run() {
        let cmd = Command::parse("load \t  graphdrv  ");
        assert_eq!(cmd.verb, "load");
        assert_eq!(cmd.raw_args, "graphdrv");
        assert!(cmd.is_reserved());
    }

    #[test]
    fn test_parse_blank_input() {
        assert!(Command::parse("").is_empty());
        assert!(Command::parse("   \r\n").is_empty());
    }

    #[test]
    fn test_parse_keeps_inner_spaces_of_args() {
        let cmd = Command::parse("query q=a b  c&&limit=5");
        assert_eq!(cmd.raw_args, "q=a b  c&&limit=5");
    }

    #[test]
    fn test_parse_arguments() {
        let args = ArgumentMap::parse("a=1&&b=2").unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args.get("a"), Some("1"));
        assert_eq!(args.get("b"), Some("2"));
    }

    #[test]
    fn test_parse_arguments_missing_separator() {
        let err = ArgumentMap::parse("a=1&&bad").unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedArgument(ref c) if c == "bad"));
        assert_eq!(
            err.status_code(),
            crate::error::StatusCode::IncorrectParameters
        );
    }

    #[test]
    fn test_parse_arguments_splits_on_first_equals() {
        let args = ArgumentMap::parse("expr=x=y").unwrap();
        assert_eq!(args.get("expr"), Some("x=y"));
    }

    #[test]
    fn test_parse_arguments_lowercases_names_only() {
        let args = ArgumentMap::parse("Types=Node,Edge").unwrap();
        assert_eq!(args.get("types"), Some("Node,Edge"));
        assert!(!args.contains("Types"));
    }

    #[test]
    fn test_parse_arguments_last_value_wins() {
        let args = ArgumentMap::parse("a=1&&A=2").unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.get("a"), Some("2"));
    }

    #[test]
    fn test_parse_arguments_empty() {
        assert!(ArgumentMap::parse("").unwrap().is_empty());
        assert!(Command::parse("info").arguments().unwrap().is_empty());
    }

    #[test]
    fn test_empty_value_is_allowed() {
        let args = ArgumentMap::parse("links=").unwrap();
        assert_eq!(args.get("links"), Some(""));
        assert_eq!(args.list("links"), Some(vec![]));
    }

    #[test]
    fn test_list_and_flag() {
        let args = ArgumentMap::parse("types=node, edge,&&show=False&&x=maybe").unwrap();
        assert_eq!(args.list("types"), Some(vec!["node", "edge"]));
        assert_eq!(args.flag("show"), Some(false));
        assert_eq!(args.flag("x"), None);
        assert_eq!(args.flag("missing"), None);
    }

    proptest! {
        #[test]
        fn prop_well_formed_clauses_roundtrip(
            pairs in proptest::collection::btree_map("[a-z][a-z0-9_]{0,8}", "[A-Za-z0-9,.:= ]{0,12}", 1..6)
        ) {
            let raw = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(ARGUMENT_SEPARATOR);
            let args = ArgumentMap::parse(&raw).unwrap();
            prop_assert_eq!(args.len(), pairs.len());
            for (k, v) in &pairs {
                prop_assert_eq!(args.get(k), Some(v.as_str()));
            }
        }

        #[test]
        fn prop_verb_is_lowercase_first_token(verb in "[A-Za-z_.-]{1,10}", rest in "[a-z=&]{0,10}") {
            let cmd = Command::parse(&format!("{} {}", verb, rest));
            prop_assert_eq!(cmd.verb, verb.to_lowercase());
            prop_assert_eq!(cmd.raw_args, rest.trim().to_string());
        }
    }
}
