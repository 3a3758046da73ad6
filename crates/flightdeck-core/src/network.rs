//! Network index pool arithmetic

use std::fmt;

/// Bookable network indices per domain
pub const POOL_CAPACITY: u8 = 128;

/// Indices per networking pool
const POOL_WIDTH: u8 = 32;

/// A booked slot in a domain's network pool, always below [`POOL_CAPACITY`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NetworkIndex(u8);

impl NetworkIndex {
    pub fn new(index: u8) -> Option<Self> {
        (index < POOL_CAPACITY).then_some(Self(index))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// 1-based networking pool the index falls in
    pub fn pool(self) -> u8 {
        self.0 / POOL_WIDTH + 1
    }

    /// 1-based position within the pool
    pub fn position(self) -> u8 {
        self.0 % POOL_WIDTH + 1
    }

    /// Every index of the pool, lowest first
    pub fn all() -> impl Iterator<Item = NetworkIndex> {
        (0..POOL_CAPACITY).map(NetworkIndex)
    }
}

impl fmt::Display for NetworkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NetworkIndex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid network index '{}'", s))?;
        NetworkIndex::new(value).ok_or_else(|| format!("network index {} out of range", value))
    }
}
