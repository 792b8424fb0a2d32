//! Metric aggregation over selected inventory projects

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SowMetrics {
    pub project_count: usize,
    pub total_hours_low: f64,
    pub total_hours_high: f64,
    pub with_estimates: usize,
    pub with_ci: usize,
    pub with_lfs: usize,
    pub archived: usize,
    pub buckets: BucketCounts,
    pub confidence: ConfidenceCounts,
    pub blockers: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub s: usize,
    pub m: usize,
    pub l: usize,
    pub xl: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Select projects by id from a serialized inventory. An empty
/// selection takes every project.
pub fn select_projects<'a>(inventory: &'a Value, selected_ids: &[u64]) -> Vec<&'a Value> {
    let projects = inventory["projects"].as_array();
    projects
        .map(|projects| {
            projects
                .iter()
                .filter(|project| {
                    selected_ids.is_empty()
                        || project["id"]
                            .as_u64()
                            .map(|id| selected_ids.contains(&id))
                            .unwrap_or(false)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Aggregate metrics over the selected projects.
pub fn aggregate_metrics(projects: &[&Value]) -> SowMetrics {
    let mut metrics = SowMetrics {
        project_count: projects.len(),
        ..Default::default()
    };

    for project in projects {
        if project["facts"]["has_ci"].as_bool() == Some(true) {
            metrics.with_ci += 1;
        }
        if project["facts"]["has_lfs"].as_bool() == Some(true) {
            metrics.with_lfs += 1;
        }
        if project["archived"].as_bool() == Some(true) {
            metrics.archived += 1;
        }

        for blocker in project["readiness"]["blockers"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            if let Some(blocker) = blocker.as_str() {
                if !metrics.blockers.iter().any(|b| b == blocker) {
                    metrics.blockers.push(blocker.to_string());
                }
            }
        }

        let estimate = &project["estimate"];
        if !estimate.is_object() {
            continue;
        }
        metrics.with_estimates += 1;
        metrics.total_hours_low += estimate["hours_low"].as_f64().unwrap_or(0.0);
        metrics.total_hours_high += estimate["hours_high"].as_f64().unwrap_or(0.0);

        match estimate["confidence"].as_str() {
            Some("high") => metrics.confidence.high += 1,
            Some("medium") => metrics.confidence.medium += 1,
            Some("low") => metrics.confidence.low += 1,
            _ => {}
        }
        match project["facts"]["migration_estimate"]["bucket"].as_str() {
            Some("S") => metrics.buckets.s += 1,
            Some("M") => metrics.buckets.m += 1,
            Some("L") => metrics.buckets.l += 1,
            Some("XL") => metrics.buckets.xl += 1,
            _ => {}
        }

        for blocker in estimate["blockers"]
            .as_array()
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            if let Some(blocker) = blocker.as_str() {
                if !metrics.blockers.iter().any(|b| b == blocker) {
                    metrics.blockers.push(blocker.to_string());
                }
            }
        }
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inventory() -> Value {
        json!({
            "projects": [
                {
                    "id": 1,
                    "path_with_namespace": "acme/api",
                    "archived": false,
                    "facts": {"has_ci": true, "has_lfs": false,
                              "migration_estimate": {"bucket": "M"}},
                    "readiness": {"blockers": ["Has CI/CD pipeline - requires conversion to destination workflows"]},
                    "estimate": {"hours_low": 5.0, "hours_high": 12.0,
                                 "confidence": "high", "blockers": []},
                },
                {
                    "id": 2,
                    "path_with_namespace": "acme/docs",
                    "archived": true,
                    "facts": {"has_ci": false, "has_lfs": true},
                    "readiness": {"blockers": ["Uses Git LFS - requires LFS migration setup"]},
                },
            ]
        })
    }

    #[test]
    fn selection_by_id_filters_projects() {
        let inventory = inventory();
        let selected = select_projects(&inventory, &[2]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["id"], 2);
        let all = select_projects(&inventory, &[]);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn aggregation_counts_facts_and_hours() {
        let inventory = inventory();
        let selected = select_projects(&inventory, &[]);
        let metrics = aggregate_metrics(&selected);
        assert_eq!(metrics.project_count, 2);
        assert_eq!(metrics.with_ci, 1);
        assert_eq!(metrics.with_lfs, 1);
        assert_eq!(metrics.archived, 1);
        assert_eq!(metrics.with_estimates, 1);
        assert_eq!(metrics.total_hours_low, 5.0);
        assert_eq!(metrics.total_hours_high, 12.0);
        assert_eq!(metrics.buckets.m, 1);
        assert_eq!(metrics.confidence.high, 1);
        assert_eq!(metrics.blockers.len(), 2);
    }
}
