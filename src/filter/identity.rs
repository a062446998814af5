//! User/group id admission.

use std::collections::BTreeSet;

use crate::config::schema::IdRuleConfig;
use crate::filter::mode::{IdMode, ModeError};

/// Compiled identity rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRule {
    mode: IdMode,
    ids: BTreeSet<i64>,
}

impl IdRule {
    pub fn new(mode: IdMode, ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            mode,
            ids: ids.into_iter().collect(),
        }
    }

    /// Compile a bot-app rule; an empty or `default` mode takes `fallback` as a whole.
    pub fn compile(config: &IdRuleConfig, fallback: &IdRuleConfig) -> Result<Self, ModeError> {
        match IdMode::parse_inheritable(&config.mode)? {
            Some(mode) => Ok(Self::new(mode, config.ids.iter().copied())),
            None => Ok(Self::new(fallback.mode.parse()?, fallback.ids.iter().copied())),
        }
    }

    pub fn mode(&self) -> IdMode {
        self.mode
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().copied()
    }

    /// Whether `id` may pass. Id 0 means "unknown" and always passes.
    pub fn admits(&self, id: i64) -> bool {
        if id == 0 {
            return true;
        }
        match self.mode {
            IdMode::On => true,
            IdMode::Off => false,
            IdMode::Whitelist => self.ids.contains(&id),
            IdMode::Blacklist => !self.ids.contains(&id),
        }
    }
}

impl Default for IdRule {
    fn default() -> Self {
        Self::new(IdMode::On, [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(mode: &str, ids: &[i64]) -> IdRuleConfig {
        IdRuleConfig {
            mode: mode.into(),
            ids: ids.to_vec(),
        }
    }

    #[test]
    fn mode_semantics() {
        assert!(IdRule::new(IdMode::On, []).admits(5));
        assert!(!IdRule::new(IdMode::Off, []).admits(5));
        assert!(IdRule::new(IdMode::Whitelist, [5]).admits(5));
        assert!(!IdRule::new(IdMode::Whitelist, [5]).admits(6));
        assert!(!IdRule::new(IdMode::Blacklist, [5]).admits(5));
        assert!(IdRule::new(IdMode::Blacklist, [5]).admits(6));
    }

    #[test]
    fn zero_always_admitted() {
        for mode in [IdMode::On, IdMode::Off, IdMode::Whitelist, IdMode::Blacklist] {
            assert!(IdRule::new(mode, [1, 2]).admits(0), "{} rejected id 0", mode);
        }
    }

    #[test]
    fn default_inherits_mode_and_ids() {
        let fallback = rule("whitelist", &[9]);
        let compiled = IdRule::compile(&rule("default", &[1]), &fallback).unwrap();
        assert_eq!(compiled, IdRule::new(IdMode::Whitelist, [9]));

        let compiled = IdRule::compile(&rule("", &[]), &fallback).unwrap();
        assert_eq!(compiled.mode(), IdMode::Whitelist);
    }

    #[test]
    fn explicit_mode_ignores_fallback() {
        let compiled = IdRule::compile(&rule("blacklist", &[3]), &rule("off", &[])).unwrap();
        assert_eq!(compiled, IdRule::new(IdMode::Blacklist, [3]));
    }

    #[test]
    fn unknown_mode_is_an_error() {
        assert!(IdRule::compile(&rule("maybe", &[]), &rule("", &[])).is_err());
        assert!(IdRule::compile(&rule("", &[]), &rule("maybe", &[])).is_err());
    }
}
