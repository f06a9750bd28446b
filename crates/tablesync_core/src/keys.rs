//! Unique record keys.

use parking_lot::Mutex;
use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Alphabet in ASCII order so generated keys sort by creation time.
const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

/// Length of every generated key.
pub const KEY_LEN: usize = TIME_CHARS + RANDOM_CHARS;

#[derive(Debug)]
struct GeneratorState {
    last_time: u64,
    last_random: [u8; RANDOM_CHARS],
}

/// Generates chronologically ordered, collision-resistant keys.
///
/// Each key is 8 characters of millisecond timestamp followed by 12
/// random characters. Keys generated within the same millisecond (or
/// while the clock runs backwards) reuse the previous random suffix
/// incremented by one, so a single generator never repeats itself and
/// its keys sort in issue order.
#[derive(Debug)]
pub struct PushIdGenerator {
    state: Mutex<GeneratorState>,
}

impl PushIdGenerator {
    /// Creates a new generator.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GeneratorState {
                last_time: 0,
                last_random: [0; RANDOM_CHARS],
            }),
        }
    }

    /// Returns a new key.
    pub fn next_key(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        self.next_key_at(now)
    }

    pub(crate) fn next_key_at(&self, now: u64) -> String {
        let mut state = self.state.lock();

        let mut time = now;
        if time > state.last_time {
            Self::reroll(&mut state.last_random);
        } else {
            time = state.last_time;
            if !Self::increment(&mut state.last_random) {
                // Suffix space exhausted for this millisecond.
                time += 1;
                Self::reroll(&mut state.last_random);
            }
        }
        state.last_time = time;

        let mut key = [0u8; KEY_LEN];
        let mut t = time;
        for slot in key[..TIME_CHARS].iter_mut().rev() {
            *slot = PUSH_CHARS[(t % 64) as usize];
            t /= 64;
        }
        for (slot, digit) in key[TIME_CHARS..].iter_mut().zip(state.last_random.iter()) {
            *slot = PUSH_CHARS[*digit as usize];
        }

        // PUSH_CHARS is ASCII.
        key.iter().map(|&b| b as char).collect()
    }

    fn reroll(digits: &mut [u8; RANDOM_CHARS]) {
        let mut rng = rand::thread_rng();
        for digit in digits.iter_mut() {
            *digit = rng.gen_range(0..64);
        }
    }

    fn increment(digits: &mut [u8; RANDOM_CHARS]) -> bool {
        for digit in digits.iter_mut().rev() {
            if *digit == 63 {
                *digit = 0;
            } else {
                *digit += 1;
                return true;
            }
        }
        false
    }
}

impl Default for PushIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn keys_have_fixed_length_and_alphabet() {
        let keys = PushIdGenerator::new();
        let key = keys.next_key();
        assert_eq!(key.len(), KEY_LEN);
        assert!(key.bytes().all(|b| PUSH_CHARS.contains(&b)));
    }

    #[test]
    fn same_millisecond_keys_are_distinct_and_ordered() {
        let keys = PushIdGenerator::new();
        let issued: Vec<String> = (0..500).map(|_| keys.next_key_at(1_000)).collect();

        let unique: HashSet<_> = issued.iter().collect();
        assert_eq!(unique.len(), issued.len());

        let mut sorted = issued.clone();
        sorted.sort();
        assert_eq!(sorted, issued);
    }

    #[test]
    fn clock_going_backwards_stays_monotonic() {
        let keys = PushIdGenerator::new();
        let first = keys.next_key_at(5_000);
        let second = keys.next_key_at(4_000);
        assert!(second > first);
    }

    #[test]
    fn later_time_sorts_later() {
        let keys = PushIdGenerator::new();
        let a = keys.next_key_at(10);
        let b = keys.next_key_at(11);
        assert!(b > a);
        assert_eq!(&a[..TIME_CHARS], "-------9");
    }

    #[test]
    fn exhausted_suffix_rolls_into_next_millisecond() {
        let keys = PushIdGenerator::new();
        let first = keys.next_key_at(7);
        keys.state.lock().last_random = [63; RANDOM_CHARS];
        let second = keys.next_key_at(7);
        assert!(second > first);
        assert_eq!(keys.state.lock().last_time, 8);
    }
}
