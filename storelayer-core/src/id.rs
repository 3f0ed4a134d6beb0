//! Identifier generation for records created without an id.

use std::{
    fmt::Debug,
    sync::atomic::{AtomicI64, Ordering},
};
use uuid::Uuid;

use crate::{record::RecordId, schema::PropertyKind};

/// Upper bound (exclusive) of randomly generated numeric ids.
pub const MAX_RANDOM_ID: u128 = 100_000_000_000;

/// Produces fresh identifiers.
pub trait IdGenerator: Send + Sync + Debug {
    /// Returns a new identifier of the requested kind.
    fn generate(&self, kind: PropertyKind) -> RecordId;
}

/// Random identifiers: numbers in `[1, MAX_RANDOM_ID)` for numeric ids, UUID
/// v4 strings for everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self, kind: PropertyKind) -> RecordId {
        let uuid = Uuid::new_v4();

        match kind {
            PropertyKind::Number => {
                RecordId::Number((uuid.as_u128() % (MAX_RANDOM_ID - 1)) as i64 + 1)
            }
            _ => RecordId::Text(uuid.to_string()),
        }
    }
}

/// Monotonic identifiers starting from a seed; textual ids are the decimal form.
#[derive(Debug, Default)]
pub struct SequenceIdGenerator {
    next: AtomicI64,
}

impl SequenceIdGenerator {
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }
}

impl IdGenerator for SequenceIdGenerator {
    fn generate(&self, kind: PropertyKind) -> RecordId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);

        match kind {
            PropertyKind::Number => RecordId::Number(id),
            _ => RecordId::Text(id.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_numbers_stay_in_range() {
        for _ in 0..100 {
            match RandomIdGenerator.generate(PropertyKind::Number) {
                RecordId::Number(n) => assert!(n >= 1 && (n as u128) < MAX_RANDOM_ID),
                other => panic!("unexpected id {other:?}"),
            }
        }
    }

    #[test]
    fn sequences_count_up() {
        let ids = SequenceIdGenerator::starting_at(42);

        assert_eq!(ids.generate(PropertyKind::Number), RecordId::Number(42));
        assert_eq!(ids.generate(PropertyKind::Text), RecordId::Text("43".into()));
    }
}
