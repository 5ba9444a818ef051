use log::debug;
use serde::Serialize;

use crate::{
    normalize::normalize_record,
    record::{CanonicalRecord, RawRecord, RejectedRecord},
};

/// Ordered partition of one input batch. Every input row lands in exactly one side.
#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub valid: Vec<CanonicalRecord>,
    pub rejected: Vec<RejectedRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransformCounts {
    pub input: usize,
    pub valid: usize,
    pub rejected: usize,
}

impl TransformOutcome {
    pub fn counts(&self) -> TransformCounts {
        TransformCounts {
            input: self.valid.len() + self.rejected.len(),
            valid: self.valid.len(),
            rejected: self.rejected.len(),
        }
    }
}

pub fn transform_batch<'a, I>(records: I, min_age: i64) -> TransformOutcome
where
    I: IntoIterator<Item = &'a RawRecord>,
{
    let mut outcome = TransformOutcome::default();
    for (idx, raw) in records.into_iter().enumerate() {
        match normalize_record(raw, min_age) {
            Ok(record) => outcome.valid.push(record),
            Err(reason) => {
                debug!("Rejecting row {}: {}", idx + 1, reason);
                outcome.rejected.push(RejectedRecord::from_raw(raw, reason));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{AGE_FIELD, CITY_FIELD, NAME_FIELD, RejectReason};

    fn raw(name: &str, age: &str, city: &str) -> RawRecord {
        RawRecord::from_pairs([(NAME_FIELD, name), (AGE_FIELD, age), (CITY_FIELD, city)])
    }

    #[test]
    fn partitions_rows_preserving_order() {
        let input = vec![
            raw("Guillermo", "26", "San Luis"),
            raw("Noemi", "52", "San Luis"),
            raw("Naomi", "23", "San Juan"),
            raw("Pedro", "error", "Querétaro"),
        ];
        let outcome = transform_batch(&input, 25);

        assert_eq!(
            outcome.valid,
            vec![
                CanonicalRecord::new("Guillermo", 26, "San Luis"),
                CanonicalRecord::new("Noemi", 52, "San Luis"),
            ]
        );
        let reasons = outcome
            .rejected
            .iter()
            .map(|r| r.reason.clone())
            .collect::<Vec<_>>();
        assert_eq!(
            reasons,
            vec![
                RejectReason::AgeBelowThreshold { threshold: 25 },
                RejectReason::AgeNotInteger
            ]
        );
        assert_eq!(outcome.rejected[1].age.as_deref(), Some("error"));
        assert_eq!(
            outcome.counts(),
            TransformCounts {
                input: 4,
                valid: 2,
                rejected: 2
            }
        );
    }

    #[test]
    fn rejected_rows_keep_unnormalized_values() {
        let input = vec![raw("  naomi ", "23", " san juan")];
        let outcome = transform_batch(&input, 25);
        assert_eq!(outcome.rejected[0].name.as_deref(), Some("  naomi "));
        assert_eq!(outcome.rejected[0].city.as_deref(), Some(" san juan"));
    }

    #[test]
    fn empty_batch_yields_empty_outcome() {
        let outcome = transform_batch(&Vec::<RawRecord>::new(), 25);
        assert!(outcome.valid.is_empty());
        assert!(outcome.rejected.is_empty());
    }
}
