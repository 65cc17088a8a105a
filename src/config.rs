//! Map construction settings.

use std::fmt;
use std::str::FromStr;

use crate::codec::DEFAULT_MAP_BASE;
use crate::error::MapError;

/// Bit layout used for the map units.
///
/// Both layouts answer every query identically; they differ in cost.
/// `Classic` scans backwards unit by unit until it meets a block start.
/// `Compressed` fills the units spanned by long blocks with relative
/// pointers so lookups never look further back than one unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum Encoding {
    Classic,
    #[default]
    Compressed,
}

impl Encoding {
    pub const ALL: [Encoding; 2] = [Encoding::Classic, Encoding::Compressed];

    pub fn name(self) -> &'static str {
        match self {
            Encoding::Classic => "classic",
            Encoding::Compressed => "compressed",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "original" => Ok(Encoding::Classic),
            "compressed" | "optimized" | "new" => Ok(Encoding::Compressed),
            _ => Err(MapError::UnknownEncoding(s.to_string())),
        }
    }
}

/// Configuration for a nibble map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapConfig {
    /// First address of the indexed code region
    pub region_start: u64,
    /// Size of the indexed code region in bytes
    pub region_size: u64,
    /// Unit layout
    pub encoding: Encoding,
    /// Address the map's backing store is mapped at
    pub map_base: u64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            region_start: 0,
            region_size: 0,
            encoding: Encoding::default(),
            map_base: DEFAULT_MAP_BASE,
        }
    }
}

impl MapConfig {
    pub fn new(region_start: u64, region_size: u64) -> Self {
        Self {
            region_start,
            region_size,
            ..Self::default()
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_map_base(mut self, map_base: u64) -> Self {
        self.map_base = map_base;
        self
    }
}
