use anyhow::{bail, Context, Result};
use peril_control::StrategyKind;
use peril_core::GameConfig;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seeds: SeedSpec,
    /// Base game configuration; omitted fields take engine defaults.
    #[serde(default)]
    pub config: GameConfig,
    /// One entry for every seat, or a single entry shared by all seats.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<StrategyKind>,
    /// Flat tweaks applied on top of `config`; see `overrides::VALID_KEYS`.
    #[serde(default)]
    pub overrides: BTreeMap<String, serde_json::Value>,
    /// Also write the full event log per game.
    #[serde(default)]
    pub write_events: bool,
}

fn default_strategies() -> Vec<StrategyKind> {
    vec![StrategyKind::default()]
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    List(Vec<u64>),
    Range { range: [u64; 2] },
}

impl SeedSpec {
    pub fn expand(&self) -> Vec<u64> {
        match self {
            SeedSpec::List(seeds) => seeds.clone(),
            SeedSpec::Range { range } => (range[0]..=range[1]).collect(),
        }
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&json)
        .with_context(|| format!("parsing scenario file: {}", path.display()))?;
    if scenario.name.is_empty() {
        bail!("scenario 'name' must not be empty");
    }
    if scenario.seeds.expand().is_empty() {
        bail!("scenario 'seeds' must produce at least one seed");
    }
    if scenario.strategies.is_empty() {
        bail!("scenario 'strategies' must name at least one strategy");
    }
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_scenario(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn seed_list_and_defaults() {
        let file = write_temp_scenario(
            r#"{
            "name": "baseline",
            "seeds": [1, 2, 3]
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.name, "baseline");
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3]);
        assert_eq!(scenario.config, GameConfig::default());
        assert_eq!(scenario.strategies, vec![StrategyKind::default()]);
        assert!(scenario.overrides.is_empty());
        assert!(!scenario.write_events);
    }

    #[test]
    fn seed_range_is_inclusive() {
        let file = write_temp_scenario(
            r#"{
            "name": "range",
            "seeds": {"range": [1, 5]}
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn partial_config_and_mixed_seats() {
        let file = write_temp_scenario(
            r#"{
            "name": "mixed",
            "seeds": [9],
            "config": {"max_rounds": 12, "victory": {"mode": "competitive"}},
            "strategies": [
                {"kind": "rule_based"},
                {"kind": "adaptive", "learning_rate": 0.3},
                {"kind": "pass"},
                {"kind": "rule_based", "style": "frugal"}
            ],
            "overrides": {"chaos_threshold": 5}
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.config.max_rounds, 12);
        assert_eq!(scenario.config.grid_width, 8);
        assert_eq!(scenario.strategies.len(), 4);
        assert_eq!(scenario.overrides.len(), 1);
    }

    #[test]
    fn empty_name_fails() {
        let file = write_temp_scenario(r#"{"name": "", "seeds": [1]}"#);
        let err = load_scenario(file.path()).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn empty_seed_list_fails() {
        let file = write_temp_scenario(r#"{"name": "none", "seeds": []}"#);
        assert!(load_scenario(file.path()).is_err());
    }
}
