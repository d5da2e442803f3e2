// Document ID Generator - Snowflake-like ids rendered as decimal strings
// 64-bit layout: [timestamp:42][node_id:10][sequence:12]

use std::sync::atomic::{AtomicU64, Ordering};

const SEQUENCE_BITS: u64 = 12;
const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1;

/// Generates unique, roughly time-ordered document ids for one node
#[derive(Debug)]
pub struct DocumentIdGenerator {
    node_id: u16,
    /// Last issued `(timestamp << 12) | sequence`
    state: AtomicU64,
}

impl DocumentIdGenerator {
    /// Create new ID generator; node ids wrap into 10 bits
    pub fn new(node_id: u16) -> Self {
        Self {
            node_id: node_id & 0x3FF,
            state: AtomicU64::new(0),
        }
    }

    /// Generate next unique ID
    pub fn next_id(&self) -> u64 {
        loop {
            let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
            let current = self.state.load(Ordering::Acquire);
            let last_ts = current >> SEQUENCE_BITS;

            let next = if now > last_ts {
                now << SEQUENCE_BITS
            } else if (current & MAX_SEQUENCE) < MAX_SEQUENCE {
                // Same millisecond, or the clock stepped back
                current + 1
            } else {
                // Sequence exhausted; the next millisecond is under 1ms away
                std::hint::spin_loop();
                continue;
            };

            if self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let ts = next >> SEQUENCE_BITS;
                return ((ts & 0x3FF_FFFF_FFFF) << 22)
                    | ((self.node_id as u64) << 12)
                    | (next & MAX_SEQUENCE);
            }
        }
    }

    /// Next id as the string form used at the store boundary
    pub fn next_string(&self) -> String {
        self.next_id().to_string()
    }

    /// Extract node ID from a generated id
    pub fn extract_node_id(id: u64) -> u16 {
        ((id >> 12) & 0x3FF) as u16
    }
}

impl Default for DocumentIdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Whether `id` has the shape of a generated primary key
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 20
        && id.bytes().all(|b| b.is_ascii_digit())
        && id.parse::<u64>().map(|n| n > 0).unwrap_or(false)
}
