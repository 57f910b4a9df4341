//! Network ranges used to classify request origins

pub mod network;
pub mod refresher;
pub mod set;
pub mod source;

pub use network::NetworkRange;
pub use refresher::{RangeRefresher, RefreshPolicy, Snapshot, DEFAULT_UPDATE_FREQUENCY};
pub use set::RangeSet;
pub use source::{
    parse_document, HttpRangeSource, RangeSource, RegionFilter, StaticRangeSource,
    DEFAULT_FETCH_TIMEOUT, DEFAULT_IP_RANGES_URL,
};
