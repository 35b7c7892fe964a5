//! Persisted pricing state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::item::ItemId;

/// One persisted row: the smoothed multiplier of an item, keyed uniquely by `item_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaRecord {
    pub item_id: ItemId,
    pub ema_multiplier: f64,
    pub updated_at: DateTime<Utc>,
}

impl EmaRecord {
    pub fn new(item_id: impl Into<ItemId>, ema_multiplier: f64, updated_at: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.into(),
            ema_multiplier,
            updated_at,
        }
    }
}

/// Collapse duplicate item ids, keeping the last occurrence of each.
///
/// Order of first appearance is preserved so batched writes stay deterministic.
pub fn last_write_wins(records: &[EmaRecord]) -> Vec<EmaRecord> {
    let mut position = std::collections::HashMap::with_capacity(records.len());
    let mut out: Vec<EmaRecord> = Vec::with_capacity(records.len());

    for record in records {
        match position.get(&record.item_id) {
            Some(&idx) => out[idx] = record.clone(),
            None => {
                position.insert(record.item_id.clone(), out.len());
                out.push(record.clone());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let now = Utc::now();
        let records = vec![
            EmaRecord::new("a", 1.0, now),
            EmaRecord::new("b", 0.9, now),
            EmaRecord::new("a", 1.2, now),
        ];

        let deduped = last_write_wins(&records);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].item_id.as_str(), "a");
        assert_eq!(deduped[0].ema_multiplier, 1.2);
        assert_eq!(deduped[1].ema_multiplier, 0.9);
    }
}
