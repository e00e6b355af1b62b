use crate::run_result::SummaryMetrics;
use serde::Serialize;
use std::collections::BTreeMap;

type Extractor = (&'static str, fn(&SummaryMetrics) -> f64);

const EXTRACTORS: &[Extractor] = &[
    ("rounds_played", |s| f64::from(s.rounds_played)),
    ("final_entropy", |s| f64::from(s.final_entropy)),
    ("requests_handled", |s| s.requests_handled as f64),
    ("requests_dropped", |s| s.requests_dropped as f64),
    ("overloads", |s| s.overloads as f64),
    ("cascade_failures", |s| s.cascade_failures as f64),
    ("avg_uptime", |s| s.avg_uptime),
    ("min_uptime", |s| s.min_uptime),
    ("services_built", |s| f64::from(s.services_built)),
    ("services_lost", |s| f64::from(s.services_lost)),
    ("resource_starvation", |s| f64::from(s.resource_starvation)),
    ("chaos_events", |s| s.chaos_events as f64),
    ("strategy_timeouts", |s| f64::from(s.strategy_timeouts)),
    ("actions_rejected", |s| s.actions_rejected as f64),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    pub failed_count: usize,
    /// Games per outcome label (`timeout`, `cooperative_win`, ...).
    pub outcome_counts: BTreeMap<String, usize>,
    pub cooperative_win_rate: f64,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

/// `games` pairs each finished game's outcome label with its summary.
pub fn compute_summary(games: &[(&str, &SummaryMetrics)], failed_count: usize) -> SummaryStats {
    let mut outcome_counts = BTreeMap::new();
    for (outcome, _) in games {
        *outcome_counts.entry((*outcome).to_string()).or_insert(0) += 1;
    }
    let cooperative_wins = games.iter().filter(|(_, s)| s.cooperative_win).count();
    let cooperative_win_rate = if games.is_empty() {
        0.0
    } else {
        cooperative_wins as f64 / games.len() as f64
    };

    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = games.iter().map(|(_, s)| extract(s)).collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    SummaryStats {
        seed_count: games.len(),
        failed_count,
        outcome_counts,
        cooperative_win_rate,
        metrics,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    if values.is_empty() {
        return MetricSummary {
            name: name.to_string(),
            mean: 0.0,
            min: 0.0,
            max: 0.0,
            stddev: 0.0,
        };
    }
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

/// Metrics keyed by name: `{ "avg_uptime": { "mean": .., "min": .., ... } }`.
pub fn aggregated_metrics(stats: &SummaryStats) -> serde_json::Value {
    let map = stats
        .metrics
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                serde_json::json!({
                    "mean": m.mean,
                    "min": m.min,
                    "max": m.max,
                    "stddev": m.stddev,
                }),
            )
        })
        .collect();
    serde_json::Value::Object(map)
}

pub fn print_summary(scenario_name: &str, max_rounds: u32, stats: &SummaryStats) {
    println!(
        "\n=== {} ({} games, up to {} rounds each) ===\n",
        scenario_name, stats.seed_count, max_rounds
    );
    println!(
        "{:<24} {:>10} {:>10} {:>10} {:>10}",
        "Metric", "Mean", "Min", "Max", "StdDev"
    );
    println!("{}", "-".repeat(68));
    for metric in &stats.metrics {
        println!(
            "{:<24} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            metric.name, metric.mean, metric.min, metric.max, metric.stddev
        );
    }
    println!("{}", "-".repeat(68));
    for (outcome, count) in &stats.outcome_counts {
        println!("{outcome:<24} {count}/{}", stats.seed_count);
    }
    if stats.failed_count > 0 {
        println!("{:<24} {}", "failed", stats.failed_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(avg_uptime: f64, handled: u64, cooperative_win: bool) -> SummaryMetrics {
        SummaryMetrics {
            rounds_played: 10,
            final_entropy: 9,
            requests_handled: handled,
            requests_dropped: 0,
            overloads: 0,
            cascade_failures: 0,
            avg_uptime,
            min_uptime: avg_uptime,
            services_built: 4,
            services_lost: 0,
            resource_starvation: 0,
            chaos_events: 2,
            strategy_timeouts: 0,
            actions_rejected: 1,
            cooperative_win,
        }
    }

    fn metric<'a>(stats: &'a SummaryStats, name: &str) -> &'a MetricSummary {
        stats.metrics.iter().find(|m| m.name == name).unwrap()
    }

    #[test]
    fn basic_stats_and_outcomes() {
        let a = summary(60.0, 100, false);
        let b = summary(80.0, 300, true);
        let stats = compute_summary(&[("timeout", &a), ("cooperative_win", &b)], 1);

        assert_eq!(stats.seed_count, 2);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.outcome_counts["timeout"], 1);
        assert_eq!(stats.outcome_counts["cooperative_win"], 1);
        assert!((stats.cooperative_win_rate - 0.5).abs() < 1e-12);

        let uptime = metric(&stats, "avg_uptime");
        assert!((uptime.mean - 70.0).abs() < 1e-9);
        assert!((uptime.min - 60.0).abs() < 1e-9);
        assert!((uptime.max - 80.0).abs() < 1e-9);
        assert!((uptime.stddev - 10.0).abs() < 1e-9);
    }

    #[test]
    fn identical_games_have_zero_spread() {
        let a = summary(50.0, 10, false);
        let stats = compute_summary(&[("timeout", &a), ("timeout", &a)], 0);
        for metric in &stats.metrics {
            assert!(metric.stddev.abs() < 1e-10, "{} spread", metric.name);
        }
    }

    #[test]
    fn aggregated_metrics_cover_every_extractor() {
        let a = summary(50.0, 10, false);
        let stats = compute_summary(&[("timeout", &a)], 0);
        let agg = aggregated_metrics(&stats);
        let obj = agg.as_object().unwrap();
        assert_eq!(obj.len(), EXTRACTORS.len());
        assert!((agg["requests_handled"]["mean"].as_f64().unwrap() - 10.0).abs() < 1e-9);
    }
}
