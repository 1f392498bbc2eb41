//! Time-ordered keys for appended children.
//!
//! A key is 8 characters of millisecond timestamp followed by 12 random
//! characters, drawn from an alphabet whose ASCII order matches its value
//! order. Keys generated later always sort after earlier ones, so iterating a
//! parent by key yields insertion order.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

const PUSH_CHARS: &[u8; 64] = b"-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";
const TIME_CHARS: usize = 8;
const RANDOM_CHARS: usize = 12;

#[derive(Default)]
pub(crate) struct PushIdGenerator {
    last: Mutex<LastKey>,
}

#[derive(Default)]
struct LastKey {
    ms: u64,
    random: [u8; RANDOM_CHARS],
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PushIdGenerator {
    pub(crate) fn next_id(&self) -> String {
        self.next_id_at(now_ms())
    }

    fn next_id_at(&self, now: u64) -> String {
        let (ms, random) = match self.last.lock() {
            Ok(mut last) => {
                if now > last.ms {
                    last.ms = now;
                    last.random = fresh_random();
                } else if !increment(&mut last.random) {
                    // Random part wrapped around; borrow the next millisecond.
                    last.ms += 1;
                    last.random = fresh_random();
                }
                (last.ms, last.random)
            }
            Err(_) => (now, fresh_random()),
        };
        encode(ms, &random)
    }
}

fn fresh_random() -> [u8; RANDOM_CHARS] {
    let bytes = Uuid::new_v4().into_bytes();
    let mut out = [0u8; RANDOM_CHARS];
    for (slot, byte) in out.iter_mut().zip(bytes.iter()) {
        *slot = byte % 64;
    }
    out
}

/// Add one to the base-64 random suffix. Returns false on overflow.
fn increment(random: &mut [u8; RANDOM_CHARS]) -> bool {
    for digit in random.iter_mut().rev() {
        if *digit == 63 {
            *digit = 0;
        } else {
            *digit += 1;
            return true;
        }
    }
    false
}

fn encode(ms: u64, random: &[u8; RANDOM_CHARS]) -> String {
    let mut time = [0u8; TIME_CHARS];
    let mut rest = ms;
    for slot in time.iter_mut().rev() {
        *slot = PUSH_CHARS[(rest % 64) as usize];
        rest /= 64;
    }

    let mut out = String::with_capacity(TIME_CHARS + RANDOM_CHARS);
    out.extend(time.iter().map(|&b| b as char));
    out.extend(random.iter().map(|&d| PUSH_CHARS[d as usize] as char));
    out
}
