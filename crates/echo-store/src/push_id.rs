//! Chronologically sortable id generation.
//!
//! Ids follow the classic push-key scheme of the deployed backend: 20
//! characters from an alphabet whose ASCII order matches its logical
//! order, the first 8 encoding the millisecond timestamp and the last 12
//! carrying entropy. Ids minted in the same millisecond increment the
//! entropy tail, so lexicographic order always matches generation order.

use std::sync::Mutex;

use rand::Rng;

use echo_shared::time::now_millis;

/// Alphabet in ascending ASCII order; 64 symbols, 6 bits per character.
const ALPHABET: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIMESTAMP_CHARS: usize = 8;
const ENTROPY_CHARS: usize = 12;

/// Monotonic push-id source. One generator per client process is enough;
/// it is cheap and internally synchronized.
pub struct PushIdGenerator {
    state: Mutex<GenState>,
}

struct GenState {
    last_ms: i64,
    tail: [u8; ENTROPY_CHARS],
}

impl PushIdGenerator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GenState {
                last_ms: 0,
                tail: [0; ENTROPY_CHARS],
            }),
        }
    }

    /// Mint the next id.
    pub fn generate(&self) -> String {
        let now = now_millis();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if now == state.last_ms {
            // Same millisecond: bump the tail so the new id still sorts
            // after the previous one.
            for slot in state.tail.iter_mut().rev() {
                if *slot < 63 {
                    *slot += 1;
                    break;
                }
                *slot = 0;
            }
        } else {
            state.last_ms = now;
            let mut rng = rand::thread_rng();
            for slot in state.tail.iter_mut() {
                *slot = rng.gen_range(0..64);
            }
        }

        let mut id = String::with_capacity(TIMESTAMP_CHARS + ENTROPY_CHARS);
        let mut ts = now;
        let mut ts_chars = [0u8; TIMESTAMP_CHARS];
        for slot in ts_chars.iter_mut().rev() {
            *slot = (ts % 64) as u8;
            ts /= 64;
        }
        for idx in ts_chars {
            id.push(ALPHABET[idx as usize] as char);
        }
        for idx in state.tail {
            id.push(ALPHABET[idx as usize] as char);
        }
        id
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
