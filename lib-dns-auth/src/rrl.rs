//! Response rate limiting.  State lives in a sharded, fixed-size
//! table: each (source prefix, response class) pair hashes to one
//! slot, colliding pairs simply evict each other, and each shard is
//! behind its own mutex so the hot path holds a lock only for one
//! table probe.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Mutex;

const SHARD_COUNT: usize = 16;
const SLOTS_PER_SHARD: usize = 512;

/// Rate limit parameters.  `rate` is responses per second per
/// tracked prefix; `slip` answers every Nth limited response with a
/// truncated reply instead of dropping it, so a legitimate client
/// behind a spoofed address can still fall back to TCP.  Zero never
/// slips.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RrlConfig {
    pub rate: u32,
    pub slip: u32,
}

/// How a response is bucketed.  Errors and negative answers are
/// usually the amplification vector, so they are tracked separately
/// from positive answers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResponseClass {
    Normal,
    NxDomain,
    Wildcard,
    Error,
}

/// What to do with one response.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RrlVerdict {
    Pass,
    Slip,
    Drop,
}

#[derive(Debug, Copy, Clone, Default)]
struct Slot {
    key: u64,
    epoch: u64,
    count: u32,
}

struct Shard {
    slots: Vec<Slot>,
}

pub struct RateLimiter {
    config: RrlConfig,
    shards: Vec<Mutex<Shard>>,
}

impl RateLimiter {
    pub fn new(config: RrlConfig) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(Shard {
                slots: vec![Slot::default(); SLOTS_PER_SHARD],
            }));
        }
        Self { config, shards }
    }

    /// Account one response and decide its fate.  `now_secs` is
    /// wall-clock seconds; counters reset on every tick.
    pub fn check(&self, source: IpAddr, class: ResponseClass, now_secs: u64) -> RrlVerdict {
        if self.config.rate == 0 {
            return RrlVerdict::Pass;
        }

        let key = slot_key(source, class);
        #[allow(clippy::cast_possible_truncation)]
        let shard_index = (key % SHARD_COUNT as u64) as usize;
        #[allow(clippy::cast_possible_truncation)]
        let slot_index = ((key / SHARD_COUNT as u64) % SLOTS_PER_SHARD as u64) as usize;

        let mut shard = self.shards[shard_index]
            .lock()
            .expect("rate limit shard poisoned");
        let slot = &mut shard.slots[slot_index];

        if slot.key != key || slot.epoch != now_secs {
            *slot = Slot {
                key,
                epoch: now_secs,
                count: 0,
            };
        }

        slot.count = slot.count.saturating_add(1);

        if slot.count <= self.config.rate {
            RrlVerdict::Pass
        } else if self.config.slip != 0 && (slot.count - self.config.rate - 1) % self.config.slip == 0
        {
            RrlVerdict::Slip
        } else {
            RrlVerdict::Drop
        }
    }
}

/// Limiting is per network, not per host: a /24 for IPv4, a /56 for
/// IPv6.
fn slot_key(source: IpAddr, class: ResponseClass) -> u64 {
    let mut hasher = DefaultHasher::new();
    match source {
        IpAddr::V4(addr) => (u32::from(addr) & 0xffff_ff00).hash(&mut hasher),
        IpAddr::V6(addr) => (u128::from(addr) & !((1u128 << 72) - 1)).hash(&mut hasher),
    }
    class.hash(&mut hasher);
    hasher.finish()
}
