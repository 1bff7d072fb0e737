//! Benchmark Planner
//!
//! Builds the execution plan shared by all hosts:
//! - Only names every host registers are kept, so comparisons stay well-defined
//! - The name filter is a regex matched anywhere in the name
//!
//! Ordering follows the first host's registration order.

use regex::Regex;
use rodbench_ipc::BenchmarkEntry;
use std::collections::HashMap;
use tracing::warn;

/// One benchmark, resolved on every host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedBenchmark {
    /// Benchmark name
    pub name: String,
    /// Host-local entry, one per host in connection order
    pub entries: Vec<BenchmarkEntry>,
}

/// Execution plan for benchmarks
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    /// Ordered list of benchmarks to run
    pub benchmarks: Vec<PlannedBenchmark>,
}

impl ExecutionPlan {
    /// Number of planned benchmarks
    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    /// Whether nothing matched
    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// Planned names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.benchmarks.iter().map(|b| b.name.as_str())
    }
}

/// Build the plan from each host's registry listing.
///
/// A name registered more than once is planned once per registration: the
/// k-th registration on the first host pairs with the k-th on every other
/// host. Repeats are labelled `name#index` with the first host's index.
pub fn build_plan(hosts: &[Vec<BenchmarkEntry>], filter: &Regex) -> ExecutionPlan {
    let Some((first, rest)) = hosts.split_first() else {
        return ExecutionPlan::default();
    };

    let lookups: Vec<HashMap<&str, Vec<&BenchmarkEntry>>> = rest
        .iter()
        .map(|entries| {
            let mut map: HashMap<&str, Vec<&BenchmarkEntry>> = HashMap::new();
            for entry in entries {
                map.entry(entry.name.as_str()).or_default().push(entry);
            }
            map
        })
        .collect();

    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    let mut benchmarks = Vec::new();
    for entry in first {
        if !filter.is_match(&entry.name) {
            continue;
        }
        let occurrence = occurrences.entry(entry.name.as_str()).or_insert(0);
        let k = *occurrence;
        *occurrence += 1;

        let name = if k == 0 {
            entry.name.clone()
        } else {
            format!("{}#{}", entry.name, entry.index)
        };
        let mut entries = vec![entry.clone()];
        for lookup in &lookups {
            match lookup.get(entry.name.as_str()).and_then(|matches| matches.get(k)) {
                Some(other) => entries.push((*other).clone()),
                None => break,
            }
        }
        if entries.len() == hosts.len() {
            if k > 0 {
                warn!(
                    benchmark = %entry.name,
                    index = entry.index,
                    "duplicate name, planned as {}",
                    name
                );
            }
            benchmarks.push(PlannedBenchmark { name, entries });
        } else if k > 0 {
            warn!(
                benchmark = %entry.name,
                index = entry.index,
                "duplicate registration missing on some hosts, skipped"
            );
        }
    }

    ExecutionPlan { benchmarks }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(names: &[&str]) -> Vec<BenchmarkEntry> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| BenchmarkEntry {
                index: i as u32,
                name: name.to_string(),
            })
            .collect()
    }

    fn all() -> Regex {
        Regex::new(".").unwrap()
    }

    #[test]
    fn test_single_host_keeps_order() {
        let plan = build_plan(&[listing(&["BenchmarkB", "BenchmarkA"])], &all());
        assert_eq!(plan.names().collect::<Vec<_>>(), ["BenchmarkB", "BenchmarkA"]);
    }

    #[test]
    fn test_intersection_maps_host_indices() {
        let hosts = [
            listing(&["BenchmarkA", "BenchmarkB", "BenchmarkC"]),
            listing(&["BenchmarkC", "BenchmarkA"]),
        ];
        let plan = build_plan(&hosts, &all());
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.benchmarks[0].name, "BenchmarkA");
        assert_eq!(plan.benchmarks[0].entries[0].index, 0);
        assert_eq!(plan.benchmarks[0].entries[1].index, 1);
        assert_eq!(plan.benchmarks[1].name, "BenchmarkC");
        assert_eq!(plan.benchmarks[1].entries[1].index, 0);
    }

    #[test]
    fn test_filter() {
        let hosts = [listing(&["BenchmarkEncode", "BenchmarkDecode", "BenchmarkEncodeFast"])];
        let plan = build_plan(&hosts, &Regex::new("^BenchmarkEncode").unwrap());
        assert_eq!(
            plan.names().collect::<Vec<_>>(),
            ["BenchmarkEncode", "BenchmarkEncodeFast"]
        );
        assert!(build_plan(&hosts, &Regex::new("Nothing").unwrap()).is_empty());
    }

    #[test]
    fn test_duplicates_pair_by_occurrence() {
        let hosts = [
            listing(&["BenchmarkA", "BenchmarkA"]),
            listing(&["BenchmarkX", "BenchmarkA", "BenchmarkA"]),
        ];
        let plan = build_plan(&hosts, &all());
        assert_eq!(plan.names().collect::<Vec<_>>(), ["BenchmarkA", "BenchmarkA#1"]);
        assert_eq!(plan.benchmarks[0].entries[0].index, 0);
        assert_eq!(plan.benchmarks[0].entries[1].index, 1);
        assert_eq!(plan.benchmarks[1].entries[0].index, 1);
        assert_eq!(plan.benchmarks[1].entries[1].index, 2);
    }

    #[test]
    fn test_single_host_plans_every_duplicate() {
        let hosts = [listing(&["BenchmarkDup", "BenchmarkB", "BenchmarkDup"])];
        let plan = build_plan(&hosts, &all());
        assert_eq!(
            plan.names().collect::<Vec<_>>(),
            ["BenchmarkDup", "BenchmarkB", "BenchmarkDup#2"]
        );
        let indices: Vec<u32> = plan.benchmarks.iter().map(|b| b.entries[0].index).collect();
        assert_eq!(indices, [0, 1, 2]);
    }

    #[test]
    fn test_unmatched_duplicate_skipped() {
        let hosts = [
            listing(&["BenchmarkA", "BenchmarkA"]),
            listing(&["BenchmarkA"]),
        ];
        let plan = build_plan(&hosts, &all());
        assert_eq!(plan.names().collect::<Vec<_>>(), ["BenchmarkA"]);
    }

    #[test]
    fn test_no_hosts() {
        assert!(build_plan(&[], &all()).is_empty());
    }
}
