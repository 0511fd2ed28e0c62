//! Protobuf parser for GTFS Realtime feeds.

use prost::Message;

use crate::decoded::DecodedFeed;
use crate::error::DecodeError;
use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid protobuf for a `FeedMessage`.
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Parses `bytes` and converts the message into a [`DecodedFeed`] labelled
/// with `feed_id`.
pub fn decode(bytes: &[u8], feed_id: &str) -> Result<DecodedFeed, DecodeError> {
    let feed = parse_feed(bytes)?;
    Ok(DecodedFeed::from_message(&feed, feed_id))
}
