//! `Range` header handling for the media route.
//!
//! Only single `bytes=` ranges are honored; anything else is treated as if no
//! range was requested.

/// A single byte range as sent by the client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-`
    From(u64),
    /// `bytes=start-end`, both inclusive
    FromTo(u64, u64),
    /// `bytes=-n`: the last `n` bytes
    Suffix(u64),
}

/// What to do with a request given the bytes currently on disk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangePlan {
    /// Serve `start..=end`
    Serve {
        /// First byte
        start: u64,
        /// Last byte, inclusive
        end: u64,
    },
    /// The first requested byte is not written yet
    NotYet,
    /// The range lies outside the complete resource
    Unsatisfiable,
}

/// Parse a `Range` header value
///
/// Returns `None` for anything that should be ignored: other units, multiple
/// ranges, or malformed values.
pub fn parse_range(header: &str) -> Option<ByteRange> {
    let spec = header.trim().strip_prefix("bytes=")?.trim();
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    match (start.is_empty(), end.is_empty()) {
        (true, true) => None,
        (true, false) => end.parse().ok().map(ByteRange::Suffix),
        (false, true) => start.parse().ok().map(ByteRange::From),
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            (start <= end).then_some(ByteRange::FromTo(start, end))
        }
    }
}

/// Decide how to answer `range` when `available` bytes are readable and the
/// full length is `total` (if known)
pub fn plan(range: Option<ByteRange>, available: u64, total: Option<u64>) -> RangePlan {
    let (start, end) = match range {
        None => (0, u64::MAX),
        Some(ByteRange::From(start)) => (start, u64::MAX),
        Some(ByteRange::FromTo(start, end)) => (start, end),
        Some(ByteRange::Suffix(n)) => match total {
            Some(total) if n > 0 && total > 0 => (total.saturating_sub(n), u64::MAX),
            Some(_) => return RangePlan::Unsatisfiable,
            // The tail cannot be located before the length is known
            None => return RangePlan::NotYet,
        },
    };

    if total.is_some_and(|total| start >= total) {
        return RangePlan::Unsatisfiable;
    }
    if start >= available {
        return RangePlan::NotYet;
    }
    RangePlan::Serve {
        start,
        end: end.min(available - 1),
    }
}
