use anyhow::{anyhow, bail, Result};
use peril_core::{GameConfig, ServiceType};
use std::collections::BTreeMap;

const VALID_KEYS: &[&str] = &[
    "max_rounds",
    "grid_width",
    "grid_height",
    "decision_deadline_ms",
    "actions_per_round",
    "gather_amount",
    "max_upgrades",
    "upgrade_capacity_bonus",
    "traffic_dice",
    "bugs_per_overload",
    "uptime_smoothing",
    "starting_uptime",
    "max_rejections_per_turn",
    "collapse_uptime",
    "require_adjacent_connections",
    "starting_cpu",
    "starting_memory",
    "starting_storage",
    "chaos_threshold",
    "chaos_probability",
    "chaos_entropy_increment",
    "chaos_starting_entropy",
    "chaos_mitigation",
    "<service>_capacity",
    "<service>_cpu",
    "<service>_memory",
    "<service>_storage",
];

pub fn apply_overrides(
    config: &mut GameConfig,
    overrides: &BTreeMap<String, serde_json::Value>,
) -> Result<()> {
    for (key, value) in overrides {
        if apply_catalog_override(config, key, value)? {
            continue;
        }
        let rules = &mut config.rules;
        let chaos = &mut config.chaos;
        match key.as_str() {
            "max_rounds" => config.max_rounds = as_u32(key, value)?,
            "grid_width" => config.grid_width = as_u32(key, value)?,
            "grid_height" => config.grid_height = as_u32(key, value)?,
            "decision_deadline_ms" => config.decision_deadline_ms = as_u64(key, value)?,
            "actions_per_round" => rules.actions_per_round = as_u32(key, value)?,
            "gather_amount" => rules.gather_amount = as_u32(key, value)?,
            "max_upgrades" => rules.max_upgrades = as_u32(key, value)?,
            "upgrade_capacity_bonus" => rules.upgrade_capacity_bonus = as_u32(key, value)?,
            "traffic_dice" => rules.traffic_dice = as_u8(key, value)?,
            "bugs_per_overload" => rules.bugs_per_overload = as_u32(key, value)?,
            "uptime_smoothing" => rules.uptime_smoothing = as_f64(key, value)?,
            "starting_uptime" => rules.starting_uptime = as_f64(key, value)?,
            "max_rejections_per_turn" => rules.max_rejections_per_turn = as_u32(key, value)?,
            "collapse_uptime" => rules.collapse_uptime = Some(as_f64(key, value)?),
            "require_adjacent_connections" => {
                rules.require_adjacent_connections = as_bool(key, value)?;
            }
            "starting_cpu" => rules.starting_resources.cpu = as_u32(key, value)?,
            "starting_memory" => rules.starting_resources.memory = as_u32(key, value)?,
            "starting_storage" => rules.starting_resources.storage = as_u32(key, value)?,
            "chaos_threshold" => chaos.threshold = as_u8(key, value)?,
            "chaos_probability" => chaos.probability = as_f64(key, value)?,
            "chaos_entropy_increment" => chaos.entropy_increment = as_u8(key, value)?,
            "chaos_starting_entropy" => chaos.starting_entropy = as_u8(key, value)?,
            "chaos_mitigation" => chaos.mitigation = as_bool(key, value)?,
            _ => bail!(
                "unknown override key '{key}'. Valid keys: {}",
                VALID_KEYS.join(", ")
            ),
        }
    }
    Ok(())
}

/// `<service>_<field>` keys such as `cache_capacity` or `database_storage`.
/// Returns false when the key does not name a catalog entry.
fn apply_catalog_override(
    config: &mut GameConfig,
    key: &str,
    value: &serde_json::Value,
) -> Result<bool> {
    let Some((service_type, field)) = ServiceType::ALL.into_iter().find_map(|t| {
        key.strip_prefix(t.label())
            .and_then(|rest| rest.strip_prefix('_'))
            .map(|field| (t, field))
    }) else {
        return Ok(false);
    };
    let spec = config.catalog.get_mut(service_type);
    let slot = match field {
        "capacity" => &mut spec.capacity,
        "cpu" => &mut spec.cost.cpu,
        "memory" => &mut spec.cost.memory,
        "storage" => &mut spec.cost.storage,
        _ => return Ok(false),
    };
    *slot = as_u32(key, value)?;
    Ok(true)
}

fn as_f64(key: &str, value: &serde_json::Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| anyhow!("override '{key}': expected a number, got {value}"))
}

fn as_bool(key: &str, value: &serde_json::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| anyhow!("override '{key}': expected true or false, got {value}"))
}

fn as_u64(key: &str, value: &serde_json::Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| anyhow!("override '{key}': expected a positive integer, got {value}"))
}

fn as_u32(key: &str, value: &serde_json::Value) -> Result<u32> {
    let val = as_u64(key, value)?;
    u32::try_from(val).map_err(|_| anyhow!("override '{key}': value {val} exceeds u32 range"))
}

fn as_u8(key: &str, value: &serde_json::Value) -> Result<u8> {
    let val = as_u64(key, value)?;
    u8::try_from(val).map_err(|_| anyhow!("override '{key}': value {val} exceeds u8 range"))
}
