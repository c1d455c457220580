use std::fmt;

use bytestring::ByteString;
use serde::{Deserialize, Serialize};

use crate::error::Malformed;
use crate::types::QoS;
use crate::utils::MAX_FIELD_LENGTH;
use crate::version::ProtocolVersion;

const SHARE_PREFIX: &str = "$share/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("topic is empty")]
    Empty,
    #[error("topic contains a null character")]
    NullCharacter,
    #[error("topic of {len} bytes is too long")]
    TooLong { len: usize },
    #[error("multi-level wildcard must be the last level and occupy it entirely")]
    MisplacedMultiWildcard,
    #[error("single-level wildcard must occupy an entire level")]
    PartialWildcard,
    #[error("wildcards are not allowed in a topic name")]
    WildcardInTopicName,
}

/// One `/` separated level of a topic filter.
#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash)]
pub enum Level<'a> {
    Normal(&'a str),
    /// first level starting with `$`, e.g. `$SYS`
    Metadata(&'a str),
    Blank,
    /// `+`
    SingleWildcard,
    /// `#`
    MultiWildcard,
}

impl<'a> Level<'a> {
    fn classify(s: &'a str, first: bool) -> Level<'a> {
        match s {
            "" => Level::Blank,
            "+" => Level::SingleWildcard,
            "#" => Level::MultiWildcard,
            s if first && s.starts_with('$') => Level::Metadata(s),
            s => Level::Normal(s),
        }
    }

    #[inline]
    pub fn value(&self) -> Option<&'a str> {
        match *self {
            Level::Normal(s) | Level::Metadata(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        matches!(*self, Level::SingleWildcard | Level::MultiWildcard)
    }
}

impl fmt::Display for Level<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Level::Normal(s) | Level::Metadata(s) => f.write_str(s),
            Level::Blank => Ok(()),
            Level::SingleWildcard => f.write_str("+"),
            Level::MultiWildcard => f.write_str("#"),
        }
    }
}

/// Checks the wildcard placement of a subscription filter.
///
/// `#` must be the whole of the last level, `+` the whole of any level. Empty levels are
/// allowed.
pub fn validate_filter(pattern: &str) -> Result<(), TopicError> {
    validate_common(pattern)?;
    let mut levels = pattern.split('/').peekable();
    while let Some(level) = levels.next() {
        match level {
            "#" => ensure!(levels.peek().is_none(), TopicError::MisplacedMultiWildcard),
            "+" => {}
            l if l.contains('#') => return Err(TopicError::MisplacedMultiWildcard),
            l if l.contains('+') => return Err(TopicError::PartialWildcard),
            _ => {}
        }
    }
    Ok(())
}

/// Checks a PUBLISH topic name, which may not contain wildcards at all.
pub fn validate_topic_name(name: &str) -> Result<(), TopicError> {
    validate_common(name)?;
    ensure!(!name.contains(['+', '#']), TopicError::WildcardInTopicName);
    Ok(())
}

fn validate_common(topic: &str) -> Result<(), TopicError> {
    ensure!(!topic.is_empty(), TopicError::Empty);
    ensure!(topic.len() <= MAX_FIELD_LENGTH, TopicError::TooLong { len: topic.len() });
    ensure!(!topic.contains('\0'), TopicError::NullCharacter);
    Ok(())
}

prim_enum! {
    /// When retained messages are sent for a new subscription
    #[derive(Deserialize, Serialize, Hash)]
    pub enum RetainHandling {
        AtSubscribe = 0,
        AtSubscribeNew = 1,
        NoAtSubscribe = 2
    }
}

impl Default for RetainHandling {
    fn default() -> Self {
        RetainHandling::AtSubscribe
    }
}

/// Per-filter options byte of a SUBSCRIBE record.
///
/// MQTT 3.x only carries the QoS, the remaining fields are MQTT 5 only.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default, Hash, Deserialize, Serialize)]
pub struct SubscriptionOptions {
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl SubscriptionOptions {
    #[inline]
    pub fn new(qos: QoS) -> Self {
        SubscriptionOptions { qos, ..Default::default() }
    }

    /// Parses the options byte, rejecting bits the version reserves.
    pub(crate) fn from_byte(val: u8, version: ProtocolVersion) -> Result<Self, Malformed> {
        let qos = QoS::try_from(val & 0b0000_0011)?;
        if !version.is_v5() {
            ensure!(val & 0b1111_1100 == 0, Malformed::ReservedBits { field: "subscription options", value: val });
            return Ok(SubscriptionOptions::new(qos));
        }

        ensure!(val & 0b1100_0000 == 0, Malformed::ReservedBits { field: "subscription options", value: val });
        let retain_handling = RetainHandling::try_from((val & 0b0011_0000) >> 4)?;
        Ok(SubscriptionOptions {
            qos,
            no_local: val & 0b0000_0100 != 0,
            retain_as_published: val & 0b0000_1000 != 0,
            retain_handling,
        })
    }

    #[inline]
    pub(crate) fn to_byte(self) -> u8 {
        u8::from(self.qos)
            | ((self.no_local as u8) << 2)
            | ((self.retain_as_published as u8) << 3)
            | (u8::from(self.retain_handling) << 4)
    }

    /// Whether the options fit in a MQTT 3.x options byte.
    #[inline]
    pub fn is_v3(&self) -> bool {
        !self.no_local && !self.retain_as_published && self.retain_handling == RetainHandling::AtSubscribe
    }
}

/// Validated subscription filter with its options.
///
/// The pattern always satisfies [`validate_filter`].
#[derive(Debug, PartialEq, Eq, Clone, Hash, Serialize)]
pub struct TopicFilter {
    pattern: ByteString,
    options: SubscriptionOptions,
}

impl TopicFilter {
    pub fn new<T: Into<ByteString>>(pattern: T, options: SubscriptionOptions) -> Result<Self, TopicError> {
        let pattern = pattern.into();
        validate_filter(&pattern)?;
        Ok(TopicFilter { pattern, options })
    }

    /// Caller has already run [`validate_filter`] on `pattern`.
    #[inline]
    pub(crate) fn from_parts(pattern: ByteString, options: SubscriptionOptions) -> Self {
        TopicFilter { pattern, options }
    }

    #[inline]
    pub fn pattern(&self) -> &ByteString {
        &self.pattern
    }

    #[inline]
    pub fn options(&self) -> SubscriptionOptions {
        self.options
    }

    #[inline]
    pub fn qos(&self) -> QoS {
        self.options.qos
    }

    pub fn levels(&self) -> Vec<Level<'_>> {
        self.pattern.split('/').enumerate().map(|(pos, s)| Level::classify(s, pos == 0)).collect()
    }

    #[inline]
    pub fn has_wildcard(&self) -> bool {
        self.pattern.contains(['+', '#'])
    }

    /// Group name of a `$share/{group}/{filter}` subscription.
    pub fn share_name(&self) -> Option<&str> {
        let (group, filter) = self.pattern.strip_prefix(SHARE_PREFIX)?.split_once('/')?;
        if group.is_empty() || group.contains(['+', '#']) || filter.is_empty() {
            return None;
        }
        Some(group)
    }

    #[inline]
    pub fn is_shared(&self) -> bool {
        self.share_name().is_some()
    }

    /// The filter without any `$share/{group}/` prefix.
    pub fn filter(&self) -> &str {
        match self.share_name() {
            Some(group) => &self.pattern[SHARE_PREFIX.len() + group.len() + 1..],
            None => &self.pattern[..],
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
