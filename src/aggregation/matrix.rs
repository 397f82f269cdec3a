use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::owner::OwnerResolver;
use super::payload::{CostRecord, UserCosts, Window, TOTAL_COST_KEY, WINDOW_KEY};

/// Per-user, per-namespace accumulated cost.
///
/// Users and namespaces keep first-seen order so the chart legend is
/// stable for a given payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostMatrix {
    users: IndexMap<String, IndexMap<String, f64>>,
}

impl CostMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a by-user payload as-is; users are the top-level keys.
    pub fn from_by_user(entries: &[UserCosts]) -> Self {
        let mut matrix = Self::new();
        for entry in entries {
            let row = matrix.users.entry(entry.user.clone()).or_default();
            for (namespace, cost) in &entry.namespaces {
                row.insert(namespace.clone(), *cost);
            }
        }
        matrix
    }

    /// Group flat records by resolved owner, summing repeated namespaces.
    pub fn from_records(records: &[CostRecord], resolver: &OwnerResolver) -> Self {
        let mut matrix = Self::new();
        for record in records {
            let user = resolver.resolve(&record.namespace);
            matrix.add(&user, &record.namespace, record.total_cost);
        }
        matrix
    }

    pub fn add(&mut self, user: &str, namespace: &str, cost: f64) {
        let row = self.users.entry(user.to_string()).or_default();
        *row.entry(namespace.to_string()).or_insert(0.0) += cost;
    }

    pub fn cost(&self, user: &str, namespace: &str) -> Option<f64> {
        self.users.get(user)?.get(namespace).copied()
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.keys().map(String::as_str)
    }

    /// Every namespace under any user, in first-seen order.
    pub fn namespaces(&self) -> Vec<&str> {
        let mut seen: IndexMap<&str, ()> = IndexMap::new();
        for row in self.users.values() {
            for namespace in row.keys() {
                seen.entry(namespace.as_str()).or_insert(());
            }
        }
        seen.into_keys().collect()
    }

    pub fn user_total(&self, user: &str) -> f64 {
        self.users
            .get(user)
            .map(|row| row.values().sum())
            .unwrap_or(0.0)
    }

    pub fn grand_total(&self) -> f64 {
        self.users.values().flat_map(|row| row.values()).sum()
    }

    /// Regroup into the by-user wire shape: each user maps its namespaces
    /// plus `totalCost` and `window` (`null` when unknown).
    pub fn to_grouped_summary(&self, window: Option<&Window>) -> Value {
        let window = window
            .and_then(|window| serde_json::to_value(window).ok())
            .unwrap_or(Value::Null);
        let mut summary = Map::new();
        for (user, row) in &self.users {
            let mut entry = Map::new();
            for (namespace, cost) in row {
                entry.insert(namespace.clone(), Value::from(*cost));
            }
            entry.insert(TOTAL_COST_KEY.to_string(), Value::from(self.user_total(user)));
            entry.insert(WINDOW_KEY.to_string(), window.clone());
            summary.insert(user.clone(), Value::Object(entry));
        }
        Value::Object(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::payload::RawCostPayload;
    use serde_json::json;

    fn record(namespace: &str, total_cost: f64) -> CostRecord {
        CostRecord {
            namespace: namespace.to_string(),
            total_cost,
            window: None,
        }
    }

    #[test]
    fn sums_repeated_namespaces_per_user() {
        let records = vec![record("ns1-us1", 5.0), record("ns1-us1", 3.0)];
        let matrix = CostMatrix::from_records(&records, &OwnerResolver::default());
        assert_eq!(matrix.cost("us1", "ns1-us1"), Some(8.0));
        assert_eq!(matrix.users().count(), 1);
    }

    #[test]
    fn keeps_namespaces_separate_within_a_user() {
        let records = vec![
            record("ns1-us1", 1.0),
            record("ns2-us1", 2.0),
            record("billing-core", 4.0),
            record("ns1-us1", 0.5),
        ];
        let matrix = CostMatrix::from_records(&records, &OwnerResolver::default());
        assert_eq!(matrix.users().collect::<Vec<_>>(), vec!["us1", "system"]);
        assert_eq!(matrix.cost("us1", "ns1-us1"), Some(1.5));
        assert_eq!(matrix.cost("us1", "ns2-us1"), Some(2.0));
        assert_eq!(matrix.cost("system", "billing-core"), Some(4.0));
        assert_eq!(matrix.user_total("us1"), 3.5);
        assert_eq!(matrix.grand_total(), 7.5);
    }

    #[test]
    fn namespace_union_preserves_first_seen_order() {
        let mut matrix = CostMatrix::new();
        matrix.add("bob", "ns-b", 1.0);
        matrix.add("alice", "ns-a", 1.0);
        matrix.add("alice", "ns-b", 1.0);
        matrix.add("bob", "ns-c", 1.0);
        assert_eq!(matrix.namespaces(), vec!["ns-b", "ns-c", "ns-a"]);
    }

    #[test]
    fn by_user_payload_is_copied_in_document_order() {
        let payload = json!({
            "zed": { "ns-z": 1, "totalCost": 1 },
            "amy": { "ns-a": 2, "ns-z": 3, "totalCost": 5 }
        });
        let Some(RawCostPayload::ByUser(users)) = RawCostPayload::detect(&payload).unwrap() else {
            panic!("expected by-user payload");
        };
        let matrix = CostMatrix::from_by_user(&users);
        assert_eq!(matrix.users().collect::<Vec<_>>(), vec!["zed", "amy"]);
        assert_eq!(matrix.namespaces(), vec!["ns-z", "ns-a"]);
        assert_eq!(matrix.cost("amy", "ns-z"), Some(3.0));
        assert_eq!(matrix.cost("zed", "ns-a"), None);
    }

    #[test]
    fn grouped_summary_round_trips_through_by_user_shape() {
        let records = vec![record("ns1-us1", 5.0), record("ns1-us1", 3.0), record("default", 1.0)];
        let matrix = CostMatrix::from_records(&records, &OwnerResolver::default());
        let window = Window::new(
            "2024-01-01T00:00:00Z".parse().unwrap(),
            "2024-01-02T00:00:00Z".parse().unwrap(),
        )
        .unwrap();

        let summary = matrix.to_grouped_summary(Some(&window));
        assert_eq!(summary["us1"]["ns1-us1"], json!(8.0));
        assert_eq!(summary["us1"]["totalCost"], json!(8.0));
        assert_eq!(summary["system"]["default"], json!(1.0));

        let reparsed = RawCostPayload::detect(&summary).unwrap().unwrap();
        assert_eq!(reparsed.window().unwrap(), Some(window));
        let RawCostPayload::ByUser(users) = reparsed else {
            panic!("expected by-user payload");
        };
        assert_eq!(CostMatrix::from_by_user(&users), matrix);
    }

    #[test]
    fn grouped_summary_without_window_writes_null() {
        let matrix = CostMatrix::from_records(&[record("ns1-us1", 2.0)], &OwnerResolver::default());
        let summary = matrix.to_grouped_summary(None);
        assert_eq!(summary["us1"]["window"], Value::Null);
        assert_eq!(summary["us1"]["totalCost"], json!(2.0));
    }
}
