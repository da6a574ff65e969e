//! Temporary identifiers for records created while offline.

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Prefix of every temporary id. Server ids never carry it.
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// Issues time-based temporary ids, strictly increasing per generator.
///
/// Two calls within the same millisecond still get distinct ids; collisions
/// across separate generators writing one store are accepted as negligible.
#[derive(Debug, Default)]
pub struct TempIdGenerator {
    last: AtomicI64,
}

impl TempIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut previous = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(previous.saturating_add(1));
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return format!("{}{}", TEMP_ID_PREFIX, candidate),
                Err(actual) => previous = actual,
            }
        }
    }
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_and_increasing() {
        let generator = TempIdGenerator::new();
        let ids: Vec<String> = (0..500).map(|_| generator.next_id()).collect();

        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let numbers: Vec<i64> = ids
            .iter()
            .map(|id| {
                id.trim_start_matches(TEMP_ID_PREFIX)
                    .parse::<i64>()
                    .expect("numeric suffix")
            })
            .collect();
        assert!(numbers.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn temp_ids_are_recognised() {
        let generator = TempIdGenerator::new();
        assert!(is_temp_id(&generator.next_id()));
        assert!(!is_temp_id("42"));
    }
}
