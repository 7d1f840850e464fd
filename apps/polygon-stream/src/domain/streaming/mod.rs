//! Market Data Event Types
//!
//! Typed records for the four event kinds carried on the Polygon stock
//! cluster: minute aggregates, second aggregates, trades and quotes.
//! These map directly to the upstream JSON schema; the short field keys
//! are renamed to readable Rust names.
//!
//! # Event Tags
//!
//! | Tag  | Kind              | Record            |
//! |------|-------------------|-------------------|
//! | `AM` | Minute aggregate  | [`StreamAggregate`] |
//! | `A`  | Second aggregate  | [`StreamAggregate`] |
//! | `T`  | Trade             | [`StreamTrade`]     |
//! | `Q`  | Quote             | [`StreamQuote`]     |

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Channel Tags
// =============================================================================

/// Channel tag for minute aggregates.
pub const MINUTE_AGGS: &str = "AM";

/// Channel tag for second aggregates.
pub const SECOND_AGGS: &str = "A";

/// Channel tag for trades.
pub const TRADES: &str = "T";

/// Channel tag for quotes.
pub const QUOTES: &str = "Q";

// =============================================================================
// Event Kind
// =============================================================================

/// Closed set of event kinds the dispatcher knows how to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Minute aggregate (`AM`).
    MinuteAggregate,
    /// Second aggregate (`A`).
    SecondAggregate,
    /// Trade (`T`).
    Trade,
    /// Quote (`Q`).
    Quote,
}

impl EventKind {
    /// Get all known event kinds.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::MinuteAggregate,
            Self::SecondAggregate,
            Self::Trade,
            Self::Quote,
        ]
    }

    /// Resolve an envelope tag. Unknown tags yield `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            MINUTE_AGGS => Some(Self::MinuteAggregate),
            SECOND_AGGS => Some(Self::SecondAggregate),
            TRADES => Some(Self::Trade),
            QUOTES => Some(Self::Quote),
            _ => None,
        }
    }

    /// Wire tag for this kind.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::MinuteAggregate => MINUTE_AGGS,
            Self::SecondAggregate => SECOND_AGGS,
            Self::Trade => TRADES,
            Self::Quote => QUOTES,
        }
    }

    /// Metric label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MinuteAggregate => "minute_aggregate",
            Self::SecondAggregate => "second_aggregate",
            Self::Trade => "trade",
            Self::Quote => "quote",
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// OHLCV aggregate, shared by minute (`AM`) and second (`A`) channels.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "ev": "AM", "sym": "MSFT", "v": 10204, "av": 200304,
///   "op": 114.04, "vw": 114.4040, "o": 114.11, "c": 114.14,
///   "h": 114.19, "l": 114.09, "a": 114.1314,
///   "s": 1536036818784, "e": 1536036818784
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamAggregate {
    /// Event tag ("AM" or "A")
    #[serde(rename = "ev")]
    pub event_type: String,

    /// Ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Tick volume
    #[serde(rename = "v")]
    pub volume: i64,

    /// Volume accumulated for the day
    #[serde(rename = "av", default)]
    pub accumulated_volume: i64,

    /// Official opening price for the day
    #[serde(rename = "op", default)]
    pub official_open: Option<Decimal>,

    /// Volume-weighted average price
    #[serde(rename = "vw", default)]
    pub vwap: Option<Decimal>,

    /// Open price
    #[serde(rename = "o")]
    pub open: Decimal,

    /// Close price
    #[serde(rename = "c")]
    pub close: Decimal,

    /// High price
    #[serde(rename = "h")]
    pub high: Decimal,

    /// Low price
    #[serde(rename = "l")]
    pub low: Decimal,

    /// Day average price
    #[serde(rename = "a", default)]
    pub average: Option<Decimal>,

    /// Start of the aggregate window
    #[serde(rename = "s", with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,

    /// End of the aggregate window
    #[serde(rename = "e", with = "chrono::serde::ts_milliseconds")]
    pub end: DateTime<Utc>,
}

/// Real-time trade.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "ev": "T", "sym": "MSFT", "x": 4, "i": "12345",
///   "z": 3, "p": 114.125, "s": 100, "c": [0, 12],
///   "t": 1536036818784
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTrade {
    /// Event tag (always "T")
    #[serde(rename = "ev")]
    pub event_type: String,

    /// Ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Exchange id
    #[serde(rename = "x")]
    pub exchange: i32,

    /// Trade id
    #[serde(rename = "i", default)]
    pub trade_id: String,

    /// Tape (1 = NYSE, 2 = AMEX, 3 = Nasdaq)
    #[serde(rename = "z", default)]
    pub tape: i32,

    /// Trade price
    #[serde(rename = "p")]
    pub price: Decimal,

    /// Trade size (shares)
    #[serde(rename = "s")]
    pub size: i64,

    /// Trade condition codes
    #[serde(rename = "c", default)]
    pub conditions: Vec<i32>,

    /// Trade timestamp
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

/// Real-time NBBO quote.
///
/// # Wire Format (JSON)
/// ```json
/// {
///   "ev": "Q", "sym": "MSFT", "bx": 4, "bp": 114.125, "bs": 100,
///   "ax": 7, "ap": 114.128, "as": 160, "c": 0, "t": 1536036818784
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamQuote {
    /// Event tag (always "Q")
    #[serde(rename = "ev")]
    pub event_type: String,

    /// Ticker symbol
    #[serde(rename = "sym")]
    pub symbol: String,

    /// Bid exchange id
    #[serde(rename = "bx")]
    pub bid_exchange: i32,

    /// Bid price
    #[serde(rename = "bp")]
    pub bid_price: Decimal,

    /// Bid size
    #[serde(rename = "bs")]
    pub bid_size: i64,

    /// Ask exchange id
    #[serde(rename = "ax")]
    pub ask_exchange: i32,

    /// Ask price
    #[serde(rename = "ap")]
    pub ask_price: Decimal,

    /// Ask size
    #[serde(rename = "as")]
    pub ask_size: i64,

    /// Quote condition
    #[serde(rename = "c", default)]
    pub condition: i32,

    /// Quote timestamp
    #[serde(rename = "t", with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Stream Event
// =============================================================================

/// A decoded market data event, delivered to subscription handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Minute aggregate (`AM`).
    MinuteAggregate(StreamAggregate),
    /// Second aggregate (`A`).
    SecondAggregate(StreamAggregate),
    /// Trade (`T`).
    Trade(StreamTrade),
    /// Quote (`Q`).
    Quote(StreamQuote),
}

impl StreamEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::MinuteAggregate(_) => EventKind::MinuteAggregate,
            Self::SecondAggregate(_) => EventKind::SecondAggregate,
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
        }
    }

    /// Channel tag of this event.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        self.kind().tag()
    }

    /// Ticker symbol the event refers to.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::MinuteAggregate(agg) | Self::SecondAggregate(agg) => &agg.symbol,
            Self::Trade(trade) => &trade.symbol,
            Self::Quote(quote) => &quote.symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_tags_round_trip() {
        for kind in EventKind::all() {
            assert_eq!(EventKind::from_tag(kind.tag()), Some(*kind));
        }
    }

    #[test]
    fn event_kind_unknown_tag() {
        assert_eq!(EventKind::from_tag("status"), None);
        assert_eq!(EventKind::from_tag("t"), None);
        assert_eq!(EventKind::from_tag(""), None);
    }

    #[test]
    fn deserialize_aggregate() {
        let json = r#"{
            "ev": "AM", "sym": "MSFT", "v": 10204, "av": 200304,
            "op": 114.04, "vw": 114.4040, "o": 114.11, "c": 114.14,
            "h": 114.19, "l": 114.09, "a": 114.1314,
            "s": 1536036818784, "e": 1536036878784
        }"#;

        let agg: StreamAggregate = serde_json::from_str(json).unwrap();
        assert_eq!(agg.symbol, "MSFT");
        assert_eq!(agg.volume, 10204);
        assert_eq!(agg.open, Decimal::new(11411, 2));
        assert_eq!(agg.start.timestamp_millis(), 1_536_036_818_784);
        assert_eq!(agg.end.timestamp_millis(), 1_536_036_878_784);
    }

    #[test]
    fn deserialize_aggregate_without_optional_fields() {
        let json = r#"{
            "ev": "A", "sym": "SPY", "v": 5,
            "o": 1, "c": 2, "h": 3, "l": 0.5,
            "s": 0, "e": 1000
        }"#;

        let agg: StreamAggregate = serde_json::from_str(json).unwrap();
        assert_eq!(agg.accumulated_volume, 0);
        assert!(agg.vwap.is_none());
        assert!(agg.official_open.is_none());
    }

    #[test]
    fn deserialize_trade() {
        let json = r#"{
            "ev": "T", "sym": "AAPL", "x": 4, "i": "52983525029461",
            "z": 3, "p": 126.55, "s": 100, "c": [14, 41],
            "t": 1614008504208
        }"#;

        let trade: StreamTrade = serde_json::from_str(json).unwrap();
        assert_eq!(trade.symbol, "AAPL");
        assert_eq!(trade.price, Decimal::new(12655, 2));
        assert_eq!(trade.conditions, vec![14, 41]);
    }

    #[test]
    fn deserialize_quote() {
        let json = r#"{
            "ev": "Q", "sym": "AMD", "bx": 12, "bp": 87.66, "bs": 1,
            "ax": 11, "ap": 87.68, "as": 4, "c": 1, "t": 1614009105335
        }"#;

        let quote: StreamQuote = serde_json::from_str(json).unwrap();
        assert_eq!(quote.symbol, "AMD");
        assert_eq!(quote.ask_size, 4);
        assert_eq!(quote.bid_price, Decimal::new(8766, 2));
    }

    #[test]
    fn trade_missing_price_is_rejected() {
        let json = r#"{"ev": "T", "sym": "AAPL", "x": 4, "s": 100, "t": 1}"#;
        assert!(serde_json::from_str::<StreamTrade>(json).is_err());
    }

    #[test]
    fn stream_event_channel_and_symbol() {
        let json = r#"{"ev": "Q", "sym": "AMD", "bx": 1, "bp": 1, "bs": 1,
                       "ax": 1, "ap": 1, "as": 1, "t": 0}"#;
        let event = StreamEvent::Quote(serde_json::from_str(json).unwrap());
        assert_eq!(event.kind(), EventKind::Quote);
        assert_eq!(event.channel(), QUOTES);
        assert_eq!(event.symbol(), "AMD");
    }
}
