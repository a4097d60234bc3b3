//! Channel identifiers, the channel universe and occupied-channel configurations

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::TableError;

/// Largest number of occupied channels a configuration may hold
pub const MAX_CONFIGURATION_SIZE: usize = 4;

/// Default lower bound of the channel universe (nm)
pub const DEFAULT_LOW: u16 = 1530;

/// Default upper bound of the channel universe (nm)
pub const DEFAULT_HIGH: u16 = 1565;

/// Channels of the default reference configuration
pub const DEFAULT_REFERENCE_CHANNELS: [u16; 3] = [1530, 1537, 1538];

/// A discrete wavelength slot, identified by its wavelength in nm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Channel(pub u16);

impl Channel {
    /// Get the raw wavelength value
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Wavelength as a float, for the interference formulas
    pub fn wavelength(&self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Channel {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u16>()
            .map(Channel)
            .map_err(|_| TableError::InvalidConfiguration(format!("not a channel: {s:?}")))
    }
}

/// The contiguous, immutable universe of channels `[low, high]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "RangeBounds", into = "RangeBounds"))]
pub struct ChannelRange {
    low: u16,
    high: u16,
}

/// Unchecked wire form of a [`ChannelRange`]
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
struct RangeBounds {
    low: u16,
    high: u16,
}

#[cfg(feature = "serde")]
impl TryFrom<RangeBounds> for ChannelRange {
    type Error = TableError;

    fn try_from(bounds: RangeBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.low, bounds.high)
    }
}

#[cfg(feature = "serde")]
impl From<ChannelRange> for RangeBounds {
    fn from(range: ChannelRange) -> Self {
        Self {
            low: range.low,
            high: range.high,
        }
    }
}

impl ChannelRange {
    /// Create a range, rejecting inverted bounds
    pub fn new(low: u16, high: u16) -> Result<Self, TableError> {
        if low > high {
            return Err(TableError::InvalidRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> Channel {
        Channel(self.low)
    }

    pub fn high(&self) -> Channel {
        Channel(self.high)
    }

    /// Number of channels in the universe
    pub fn len(&self) -> usize {
        usize::from(self.high - self.low) + 1
    }

    /// Always false; a range holds at least one channel
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, channel: Channel) -> bool {
        (self.low..=self.high).contains(&channel.0)
    }

    /// Dense index of a channel, or None if outside the universe
    pub fn index_of(&self, channel: Channel) -> Option<usize> {
        self.contains(channel)
            .then(|| usize::from(channel.0 - self.low))
    }

    /// Channel at a dense index
    pub fn channel_at(&self, index: usize) -> Option<Channel> {
        (index < self.len()).then(|| Channel(self.low + index as u16))
    }

    /// Iterate channels in ascending order
    pub fn iter(&self) -> impl Iterator<Item = Channel> {
        (self.low..=self.high).map(Channel)
    }

    /// All configurations of sizes `1..=max_size`, smallest first, each size
    /// in lexicographic order
    pub fn configurations(
        &self,
        max_size: usize,
    ) -> Result<impl Iterator<Item = Configuration>, TableError> {
        if max_size == 0 || max_size > MAX_CONFIGURATION_SIZE {
            return Err(TableError::InvalidConfiguration(format!(
                "configuration size must be 1..={MAX_CONFIGURATION_SIZE}, got {max_size}"
            )));
        }
        let channels: Vec<Channel> = self.iter().collect();
        let sizes = 1..=max_size.min(channels.len());
        Ok(sizes.flat_map(move |size| {
            let pool = channels.clone();
            Combinations::new(pool.len(), size)
                .map(move |picks| Configuration(picks.iter().map(|&i| pool[i]).collect()))
        }))
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self {
            low: DEFAULT_LOW,
            high: DEFAULT_HIGH,
        }
    }
}

/// Index combinations of `size` out of `n`, in lexicographic order
struct Combinations {
    n: usize,
    indices: Vec<usize>,
    first: bool,
}

impl Combinations {
    fn new(n: usize, size: usize) -> Self {
        Self {
            n,
            indices: (0..size).collect(),
            first: true,
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.indices.len();
        if k > self.n {
            return None;
        }
        if self.first {
            self.first = false;
            return Some(self.indices.clone());
        }
        // Rightmost index that can still advance
        let pos = (0..k).rev().find(|&i| self.indices[i] < self.n - k + i)?;
        self.indices[pos] += 1;
        for i in pos + 1..k {
            self.indices[i] = self.indices[i - 1] + 1;
        }
        Some(self.indices.clone())
    }
}

/// A set of 1 to 4 distinct, already committed channels
///
/// Stored sorted so that equal sets compare, hash and print identically.
/// The canonical key is the hyphen-joined channel list, e.g. `1530-1537-1538`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<Channel>", into = "Vec<Channel>"))]
pub struct Configuration(Vec<Channel>);

impl Configuration {
    /// Canonicalise a set of channels
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Result<Self, TableError> {
        let mut channels: Vec<Channel> = channels.into_iter().collect();
        channels.sort_unstable();

        if channels.is_empty() {
            return Err(TableError::InvalidConfiguration(
                "configuration is empty".into(),
            ));
        }
        if channels.len() > MAX_CONFIGURATION_SIZE {
            return Err(TableError::InvalidConfiguration(format!(
                "configuration holds {} channels, at most {MAX_CONFIGURATION_SIZE} allowed",
                channels.len()
            )));
        }
        if let Some(pair) = channels.windows(2).find(|w| w[0] == w[1]) {
            return Err(TableError::InvalidConfiguration(format!(
                "channel {} appears twice",
                pair[0]
            )));
        }

        Ok(Self(channels))
    }

    /// The configuration selections are made against unless told otherwise
    pub fn default_reference() -> Self {
        Self(DEFAULT_REFERENCE_CHANNELS.iter().copied().map(Channel).collect())
    }

    /// Channels in ascending order
    pub fn channels(&self) -> &[Channel] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0.binary_search(&channel).is_ok()
    }

    /// Canonical lookup key
    pub fn key(&self) -> String {
        self.0
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl FromStr for Configuration {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let channels = s
            .trim()
            .split('-')
            .map(Channel::from_str)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(channels)
    }
}

impl TryFrom<Vec<Channel>> for Configuration {
    type Error = TableError;

    fn try_from(channels: Vec<Channel>) -> Result<Self, Self::Error> {
        Self::new(channels)
    }
}

impl From<Configuration> for Vec<Channel> {
    fn from(config: Configuration) -> Self {
        config.0
    }
}

impl Ord for Configuration {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Configuration {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(channels: &[u16]) -> Configuration {
        Configuration::new(channels.iter().copied().map(Channel)).unwrap()
    }

    #[test]
    fn test_range_indexing() {
        let range = ChannelRange::default();
        assert_eq!(range.len(), 36);
        assert_eq!(range.index_of(Channel(1530)), Some(0));
        assert_eq!(range.index_of(Channel(1565)), Some(35));
        assert_eq!(range.index_of(Channel(1566)), None);
        assert_eq!(range.channel_at(7), Some(Channel(1537)));
        assert_eq!(range.channel_at(36), None);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(matches!(
            ChannelRange::new(1565, 1530),
            Err(TableError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_configuration_is_canonical() {
        let a = config(&[1538, 1530, 1537]);
        let b = config(&[1537, 1538, 1530]);
        assert_eq!(a, b);
        assert_eq!(a.key(), "1530-1537-1538");
        assert!(a.contains(Channel(1537)));
        assert!(!a.contains(Channel(1531)));
    }

    #[test]
    fn test_default_reference_is_canonical() {
        let reference = Configuration::default_reference();
        assert_eq!(reference, config(&DEFAULT_REFERENCE_CHANNELS));
    }

    #[test]
    fn test_configuration_rules() {
        assert!(Configuration::new(Vec::new()).is_err());
        assert!(Configuration::new([1530, 1531, 1532, 1533, 1534].map(Channel)).is_err());
        assert!(Configuration::new([1530, 1530].map(Channel)).is_err());
    }

    #[test]
    fn test_configuration_key_parse() {
        let parsed: Configuration = "1538-1530-1537".parse().unwrap();
        assert_eq!(parsed, config(&[1530, 1537, 1538]));
        assert!("1530-abc".parse::<Configuration>().is_err());
        assert!("".parse::<Configuration>().is_err());
    }

    #[test]
    fn test_configuration_ordering_by_size_then_lexicographic() {
        let mut configs = vec![config(&[1531, 1532]), config(&[1535]), config(&[1530, 1540])];
        configs.sort();
        assert_eq!(
            configs,
            vec![config(&[1535]), config(&[1530, 1540]), config(&[1531, 1532])]
        );
    }

    #[test]
    fn test_configuration_enumeration_counts() {
        let range = ChannelRange::default();
        let count = range.configurations(4).unwrap().count();
        // C(36,1) + C(36,2) + C(36,3) + C(36,4)
        assert_eq!(count, 36 + 630 + 7140 + 58905);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_range_deserialize_checks_bounds() {
        let range: ChannelRange = serde_json::from_str(r#"{"low":1530,"high":1565}"#).unwrap();
        assert_eq!(range, ChannelRange::default());
        assert_eq!(serde_json::to_string(&range).unwrap(), r#"{"low":1530,"high":1565}"#);

        let inverted = serde_json::from_str::<ChannelRange>(r#"{"low":1565,"high":1530}"#);
        assert!(inverted.is_err());
    }

    #[test]
    fn test_configuration_enumeration_order() {
        let range = ChannelRange::new(1, 4).unwrap();
        let keys: Vec<String> = range.configurations(2).unwrap().map(|c| c.key()).collect();
        assert_eq!(
            keys,
            vec!["1", "2", "3", "4", "1-2", "1-3", "1-4", "2-3", "2-4", "3-4"]
        );
    }

    #[test]
    fn test_enumeration_caps_size_at_universe() {
        let range = ChannelRange::new(10, 11).unwrap();
        assert_eq!(range.configurations(4).unwrap().count(), 3);
        assert!(range.configurations(0).is_err());
        assert!(range.configurations(5).is_err());
    }
}
