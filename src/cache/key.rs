//! Composite cache key
//!
//! A key is the ordered list of everything that influences a statement's
//! result: statement id, paging bounds, SQL text, bound parameters and the
//! environment id. Three running scalars (polynomial hash, additive checksum,
//! element count) reject most mismatches before the element-wise compare.

use crate::types::Value;
use std::hash::{BuildHasher, Hash, Hasher};

const DEFAULT_MULTIPLIER: u32 = 37;
const DEFAULT_HASHCODE: u32 = 17;
const NULL_HASHCODE: u32 = 1;

// Fixed seeds: an element hashes identically in every key of the process.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: u32,
    hashcode: u32,
    checksum: u64,
    count: usize,
    elements: Vec<Value>,
}

impl CacheKey {
    pub fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            elements: Vec::new(),
        }
    }

    /// Build a key from an ordered list of elements.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        let mut key = Self::new();
        key.update_all(values);
        key
    }

    /// Append one element. Lists expand element by element so that
    /// `[1, 2]` and `[2, 1]` never collide on a single opaque hash.
    pub fn update(&mut self, value: impl Into<Value>) {
        match value.into() {
            Value::List(items) => {
                for item in items {
                    self.update(item);
                }
            }
            value => self.append(value),
        }
    }

    pub fn update_all<I>(&mut self, values: I)
    where
        I: IntoIterator<Item = Value>,
    {
        for value in values {
            self.update(value);
        }
    }

    fn append(&mut self, value: Value) {
        let mut base = element_hash(&value);

        self.count += 1;
        self.checksum = self.checksum.wrapping_add(base as u64);
        base = base.wrapping_mul(self.count as u32);

        self.hashcode = self
            .multiplier
            .wrapping_mul(self.hashcode)
            .wrapping_add(base);

        self.elements.push(value);
    }

    pub fn update_count(&self) -> usize {
        self.count
    }

    pub fn hashcode(&self) -> u32 {
        self.hashcode
    }

    pub fn elements(&self) -> &[Value] {
        &self.elements
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if self.hashcode != other.hashcode
            || self.checksum != other.checksum
            || self.count != other.count
        {
            return false;
        }
        self.elements
            .iter()
            .zip(other.elements.iter())
            .all(|(a, b)| element_eq(a, b))
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hashcode);
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for element in &self.elements {
            write!(f, ":{}", element)?;
        }
        Ok(())
    }
}

fn element_hash(value: &Value) -> u32 {
    if value.is_null() {
        return NULL_HASHCODE;
    }
    let state = ahash::RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3);
    let mut hasher = state.build_hasher();
    hash_value(value, &mut hasher);
    let h = hasher.finish();
    (h ^ (h >> 32)) as u32
}

fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Integer(v) => {
            state.write_u8(1);
            v.hash(state);
        }
        Value::Float(v) => {
            state.write_u8(2);
            v.to_bits().hash(state);
        }
        Value::Bool(v) => {
            state.write_u8(3);
            v.hash(state);
        }
        Value::Text(s) => {
            state.write_u8(4);
            s.hash(state);
        }
        Value::Bytes(b) => {
            state.write_u8(5);
            b.hash(state);
        }
        Value::Timestamp(ts) => {
            state.write_u8(6);
            ts.hash(state);
        }
        Value::List(items) => {
            state.write_u8(7);
            state.write_usize(items.len());
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Null => state.write_u8(0),
    }
}

// Floats compare by bit pattern so that a key is always equal to itself.
fn element_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::List(xs), Value::List(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys.iter()).all(|(x, y)| element_eq(x, y))
        }
        _ => a == b,
    }
}
