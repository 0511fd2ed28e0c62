//! JSON-friendly representation of a decoded GTFS-realtime feed.
//!
//! Every optional upstream field maps to an `Option` that is skipped when
//! serializing, so an absent field never shows up as `null` or a zero value.
//! `human_time` fields are derived from their paired timestamp and are absent
//! whenever the timestamp is zero.

use chrono::DateTime;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::gtfs_rt::{
    self, FeedEntity, FeedMessage, TranslatedString,
    alert::{Cause, Effect},
    trip_update::{StopTimeEvent, StopTimeUpdate},
};

/// Pattern used for every derived `human_time` field.
pub const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker for enum values the schema does not define.
pub const UNKNOWN: &str = "UNKNOWN";

/// Formats a POSIX timestamp (UTC), or `None` for the unset sentinel `0`.
pub fn human_time(timestamp: i64) -> Option<String> {
    if timestamp == 0 {
        return None;
    }
    let formatted =
        DateTime::from_timestamp(timestamp, 0).map(|t| t.format(HUMAN_TIME_FORMAT).to_string());
    if formatted.is_none() {
        debug!(timestamp, "Timestamp outside the representable date range, omitting human_time");
    }
    formatted
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or_else(|_| {
        debug!(timestamp = value, "Timestamp exceeds i64, clamping");
        i64::MAX
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedFeed {
    pub header: Header,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
    pub feed_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub payload: EntityPayload,
}

/// The single payload an entity carries.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityPayload {
    Vehicle(Vehicle),
    TripUpdate(TripUpdate),
    Alert(Alert),
    None,
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = match self.payload {
            EntityPayload::None => 1,
            _ => 2,
        };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("id", &self.id)?;
        match &self.payload {
            EntityPayload::Vehicle(v) => map.serialize_entry("vehicle", v)?,
            EntityPayload::TripUpdate(t) => map.serialize_entry("trip_update", t)?,
            EntityPayload::Alert(a) => map.serialize_entry("alert", a)?,
            EntityPayload::None => {}
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TripRef {
    pub trip_id: String,
    pub route_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vehicle {
    pub trip: TripRef,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub latitude: f32,
    pub longitude: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TripUpdate {
    pub trip: TripRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
    pub stop_time_updates: Vec<StopTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTime {
    pub stop_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival: Option<StopEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure: Option<StopEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopEvent {
    pub time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_text: Option<String>,
    pub active_period: Vec<ActivePeriod>,
    pub informed_entity: Vec<InformedEntity>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivePeriod {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<PeriodBound>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<PeriodBound>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodBound {
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_time: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InformedEntity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_type: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<String>,
}

impl DecodedFeed {
    /// Converts a parsed [`FeedMessage`] into its output form, tagging the
    /// header with the catalog `feed_id` it was fetched as.
    pub fn from_message(feed: &FeedMessage, feed_id: &str) -> Self {
        let timestamp = to_i64(feed.header.timestamp.unwrap_or(0));

        DecodedFeed {
            header: Header {
                timestamp,
                human_time: human_time(timestamp),
                feed_id: feed_id.to_string(),
            },
            entities: feed.entity.iter().map(Entity::from_proto).collect(),
        }
    }

    pub fn vehicle_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| matches!(e.payload, EntityPayload::Vehicle(_)))
            .count()
    }
}

impl Entity {
    fn from_proto(e: &FeedEntity) -> Self {
        let populated = [e.vehicle.is_some(), e.trip_update.is_some(), e.alert.is_some()]
            .into_iter()
            .filter(|p| *p)
            .count();
        if populated > 1 {
            debug!(entity_id = %e.id, populated, "Entity carries several payloads, keeping the first");
        }

        let payload = if let Some(v) = &e.vehicle {
            EntityPayload::Vehicle(Vehicle::from_proto(v))
        } else if let Some(t) = &e.trip_update {
            EntityPayload::TripUpdate(TripUpdate::from_proto(t))
        } else if let Some(a) = &e.alert {
            EntityPayload::Alert(Alert::from_proto(a))
        } else {
            EntityPayload::None
        };

        Entity {
            id: e.id.clone(),
            payload,
        }
    }
}

impl TripRef {
    fn from_proto(trip: &gtfs_rt::TripDescriptor) -> Self {
        TripRef {
            trip_id: trip.trip_id().to_string(),
            route_id: trip.route_id().to_string(),
        }
    }
}

/// Maps a raw `VehicleStopStatus` value to its symbolic name.
pub fn vehicle_status_name(value: i32) -> &'static str {
    match value {
        0 => "INCOMING_AT",
        1 => "STOPPED_AT",
        2 => "IN_TRANSIT_TO",
        _ => UNKNOWN,
    }
}

fn cause_name(value: i32) -> &'static str {
    Cause::try_from(value).map_or(UNKNOWN, |c| c.as_str_name())
}

fn effect_name(value: i32) -> &'static str {
    Effect::try_from(value).map_or(UNKNOWN, |e| e.as_str_name())
}

fn first_translation(text: &Option<TranslatedString>) -> Option<String> {
    text.as_ref()
        .and_then(|t| t.translation.first())
        .map(|t| t.text.clone())
}

impl Vehicle {
    fn from_proto(v: &gtfs_rt::VehiclePosition) -> Self {
        let timestamp = to_i64(v.timestamp.unwrap_or(0));

        Vehicle {
            trip: v.trip.as_ref().map(TripRef::from_proto).unwrap_or_default(),
            timestamp,
            human_time: human_time(timestamp),
            position: v.position.as_ref().map(|p| Position {
                latitude: p.latitude,
                longitude: p.longitude,
                bearing: p.bearing,
                speed: p.speed,
            }),
            current_status: v.current_status.map(vehicle_status_name),
            stop_id: v.stop_id.clone(),
        }
    }
}

impl TripUpdate {
    fn from_proto(t: &gtfs_rt::TripUpdate) -> Self {
        let timestamp = t.timestamp.map(to_i64);

        TripUpdate {
            trip: TripRef::from_proto(&t.trip),
            timestamp,
            human_time: timestamp.and_then(human_time),
            stop_time_updates: t.stop_time_update.iter().map(StopTime::from_proto).collect(),
        }
    }
}

impl StopTime {
    fn from_proto(u: &StopTimeUpdate) -> Self {
        StopTime {
            stop_id: u.stop_id().to_string(),
            arrival: u.arrival.as_ref().map(StopEvent::from_proto),
            departure: u.departure.as_ref().map(StopEvent::from_proto),
        }
    }
}

impl StopEvent {
    fn from_proto(e: &StopTimeEvent) -> Self {
        let time = e.time.unwrap_or(0);

        StopEvent {
            time,
            human_time: human_time(time),
            delay: e.delay,
        }
    }
}

impl PeriodBound {
    fn new(timestamp: u64) -> Self {
        let timestamp = to_i64(timestamp);
        PeriodBound {
            timestamp,
            human_time: human_time(timestamp),
        }
    }
}

impl Alert {
    fn from_proto(a: &gtfs_rt::Alert) -> Self {
        Alert {
            cause: a.cause.map(cause_name),
            effect: a.effect.map(effect_name),
            url: first_translation(&a.url),
            header_text: first_translation(&a.header_text),
            description_text: first_translation(&a.description_text),
            active_period: a
                .active_period
                .iter()
                .map(|p| ActivePeriod {
                    start: p.start.map(PeriodBound::new),
                    end: p.end.map(PeriodBound::new),
                })
                .collect(),
            informed_entity: a
                .informed_entity
                .iter()
                .map(|s| InformedEntity {
                    agency_id: s.agency_id.clone(),
                    route_id: s.route_id.clone(),
                    route_type: s.route_type,
                    stop_id: s.stop_id.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{
        EntitySelector, FeedHeader, TimeRange, TripDescriptor, VehiclePosition,
        translated_string::Translation,
    };
    use serde_json::{Value, json};

    fn header(timestamp: Option<u64>) -> FeedHeader {
        FeedHeader {
            gtfs_realtime_version: "2.0".to_string(),
            timestamp,
            ..Default::default()
        }
    }

    fn feed_with(entity: FeedEntity) -> FeedMessage {
        FeedMessage {
            header: header(Some(1_700_000_000)),
            entity: vec![entity],
        }
    }

    fn to_json(feed: &FeedMessage) -> Value {
        serde_json::to_value(DecodedFeed::from_message(feed, "ace")).unwrap()
    }

    fn translated(texts: &[&str]) -> Option<TranslatedString> {
        Some(TranslatedString {
            translation: texts
                .iter()
                .map(|t| Translation {
                    text: t.to_string(),
                    language: Some("en".to_string()),
                })
                .collect(),
        })
    }

    #[test]
    fn test_human_time_format_and_zero_sentinel() {
        assert_eq!(human_time(0), None);
        assert_eq!(
            human_time(1_700_000_000).as_deref(),
            Some("2023-11-14 22:13:20")
        );
    }

    #[test]
    fn test_out_of_range_timestamps() {
        assert_eq!(to_i64(u64::MAX), i64::MAX);
        assert_eq!(to_i64(1_700_000_000), 1_700_000_000);
        assert_eq!(human_time(i64::MAX), None);

        let v = to_json(&FeedMessage {
            header: header(Some(u64::MAX)),
            entity: vec![],
        });
        assert_eq!(v["header"]["timestamp"], i64::MAX);
        assert!(v["header"].get("human_time").is_none());
    }

    #[test]
    fn test_header_carries_feed_id_and_time() {
        let v = to_json(&FeedMessage {
            header: header(Some(1_700_000_000)),
            entity: vec![],
        });
        assert_eq!(
            v["header"],
            json!({
                "timestamp": 1_700_000_000,
                "human_time": "2023-11-14 22:13:20",
                "feed_id": "ace"
            })
        );
        assert_eq!(v["entities"], json!([]));
    }

    #[test]
    fn test_header_without_timestamp_omits_human_time() {
        let v = to_json(&FeedMessage {
            header: header(None),
            entity: vec![],
        });
        assert_eq!(v["header"]["timestamp"], 0);
        assert!(v["header"].get("human_time").is_none());
    }

    #[test]
    fn test_vehicle_without_position_has_no_position_key() {
        let v = to_json(&feed_with(FeedEntity {
            id: "1".to_string(),
            vehicle: Some(VehiclePosition {
                trip: Some(TripDescriptor {
                    trip_id: Some("T1".to_string()),
                    route_id: Some("A".to_string()),
                    ..Default::default()
                }),
                timestamp: Some(1_700_000_000),
                ..Default::default()
            }),
            ..Default::default()
        }));

        let vehicle = &v["entities"][0]["vehicle"];
        assert_eq!(vehicle["trip"], json!({ "trip_id": "T1", "route_id": "A" }));
        assert!(vehicle.get("position").is_none());
        assert!(vehicle.get("current_status").is_none());
        assert!(vehicle.get("stop_id").is_none());
        assert_eq!(vehicle["human_time"], "2023-11-14 22:13:20");
    }

    #[test]
    fn test_vehicle_zero_timestamp_suppresses_human_time() {
        let v = to_json(&feed_with(FeedEntity {
            id: "1".to_string(),
            vehicle: Some(VehiclePosition::default()),
            ..Default::default()
        }));

        let vehicle = &v["entities"][0]["vehicle"];
        assert_eq!(vehicle["timestamp"], 0);
        assert!(vehicle.get("human_time").is_none());
        assert_eq!(vehicle["trip"], json!({ "trip_id": "", "route_id": "" }));
    }

    #[test]
    fn test_vehicle_position_optional_parts() {
        let v = to_json(&feed_with(FeedEntity {
            id: "1".to_string(),
            vehicle: Some(VehiclePosition {
                position: Some(gtfs_rt::Position {
                    latitude: 40.5,
                    longitude: -73.5,
                    bearing: Some(90.0),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }));

        assert_eq!(
            v["entities"][0]["vehicle"]["position"],
            json!({ "latitude": 40.5, "longitude": -73.5, "bearing": 90.0 })
        );
    }

    #[test]
    fn test_vehicle_status_mapping() {
        assert_eq!(vehicle_status_name(0), "INCOMING_AT");
        assert_eq!(vehicle_status_name(1), "STOPPED_AT");
        assert_eq!(vehicle_status_name(2), "IN_TRANSIT_TO");
        for raw in [-1, 3, 7, i32::MAX] {
            assert_eq!(vehicle_status_name(raw), UNKNOWN);
        }

        let v = to_json(&feed_with(FeedEntity {
            id: "1".to_string(),
            vehicle: Some(VehiclePosition {
                current_status: Some(9),
                stop_id: Some("A27N".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }));
        assert_eq!(v["entities"][0]["vehicle"]["current_status"], "UNKNOWN");
        assert_eq!(v["entities"][0]["vehicle"]["stop_id"], "A27N");
    }

    #[test]
    fn test_trip_update_stop_times() {
        let v = to_json(&feed_with(FeedEntity {
            id: "2".to_string(),
            trip_update: Some(gtfs_rt::TripUpdate {
                trip: TripDescriptor {
                    trip_id: Some("T2".to_string()),
                    ..Default::default()
                },
                stop_time_update: vec![
                    StopTimeUpdate {
                        stop_id: Some("A27N".to_string()),
                        arrival: Some(StopTimeEvent {
                            time: Some(1_700_000_060),
                            delay: Some(30),
                            ..Default::default()
                        }),
                        ..Default::default()
                    },
                    StopTimeUpdate {
                        stop_id: Some("A28N".to_string()),
                        departure: Some(StopTimeEvent::default()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }));

        let update = &v["entities"][0]["trip_update"];
        assert!(update.get("timestamp").is_none());
        assert!(update.get("human_time").is_none());
        assert_eq!(update["trip"]["route_id"], "");
        assert_eq!(
            update["stop_time_updates"],
            json!([
                {
                    "stop_id": "A27N",
                    "arrival": {
                        "time": 1_700_000_060,
                        "human_time": "2023-11-14 22:14:20",
                        "delay": 30
                    }
                },
                { "stop_id": "A28N", "departure": { "time": 0 } }
            ])
        );
    }

    #[test]
    fn test_trip_update_explicit_zero_timestamp() {
        let v = to_json(&feed_with(FeedEntity {
            id: "2".to_string(),
            trip_update: Some(gtfs_rt::TripUpdate {
                timestamp: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        }));

        let update = &v["entities"][0]["trip_update"];
        assert_eq!(update["timestamp"], 0);
        assert!(update.get("human_time").is_none());
    }

    #[test]
    fn test_alert_uses_first_translation_only() {
        let v = to_json(&feed_with(FeedEntity {
            id: "3".to_string(),
            alert: Some(gtfs_rt::Alert {
                header_text: translated(&["Delays on the A", "Retrasos en la A"]),
                description_text: translated(&[]),
                cause: Some(Cause::Construction as i32),
                effect: Some(Effect::SignificantDelays as i32),
                ..Default::default()
            }),
            ..Default::default()
        }));

        let alert = &v["entities"][0]["alert"];
        assert_eq!(alert["header_text"], "Delays on the A");
        assert!(alert.get("description_text").is_none());
        assert!(alert.get("url").is_none());
        assert_eq!(alert["cause"], "CONSTRUCTION");
        assert_eq!(alert["effect"], "SIGNIFICANT_DELAYS");
    }

    #[test]
    fn test_alert_unknown_enum_and_absent_fields() {
        let v = to_json(&feed_with(FeedEntity {
            id: "3".to_string(),
            alert: Some(gtfs_rt::Alert {
                cause: Some(99),
                ..Default::default()
            }),
            ..Default::default()
        }));

        let alert = &v["entities"][0]["alert"];
        assert_eq!(alert["cause"], "UNKNOWN");
        assert!(alert.get("effect").is_none());
        assert!(alert.get("header_text").is_none());
        assert_eq!(alert["active_period"], json!([]));
        assert_eq!(alert["informed_entity"], json!([]));
    }

    #[test]
    fn test_alert_periods_and_informed_entities() {
        let v = to_json(&feed_with(FeedEntity {
            id: "3".to_string(),
            alert: Some(gtfs_rt::Alert {
                active_period: vec![
                    TimeRange {
                        start: Some(1_700_000_000),
                        end: None,
                    },
                    TimeRange {
                        start: Some(0),
                        end: Some(1_700_000_060),
                    },
                ],
                informed_entity: vec![EntitySelector {
                    agency_id: Some("MTASBWY".to_string()),
                    route_type: Some(1),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        }));

        let alert = &v["entities"][0]["alert"];
        assert_eq!(
            alert["active_period"],
            json!([
                { "start": { "timestamp": 1_700_000_000, "human_time": "2023-11-14 22:13:20" } },
                {
                    "start": { "timestamp": 0 },
                    "end": { "timestamp": 1_700_000_060, "human_time": "2023-11-14 22:14:20" }
                }
            ])
        );
        assert_eq!(
            alert["informed_entity"],
            json!([{ "agency_id": "MTASBWY", "route_type": 1 }])
        );
    }

    #[test]
    fn test_entity_without_payload_only_has_id() {
        let v = to_json(&feed_with(FeedEntity {
            id: "empty".to_string(),
            ..Default::default()
        }));
        assert_eq!(v["entities"][0], json!({ "id": "empty" }));
    }

    #[test]
    fn test_entity_with_several_payloads_keeps_vehicle() {
        let decoded = DecodedFeed::from_message(
            &feed_with(FeedEntity {
                id: "both".to_string(),
                vehicle: Some(VehiclePosition::default()),
                alert: Some(gtfs_rt::Alert::default()),
                ..Default::default()
            }),
            "ace",
        );

        assert!(matches!(
            decoded.entities[0].payload,
            EntityPayload::Vehicle(_)
        ));
        assert_eq!(decoded.vehicle_count(), 1);
    }
}
