// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Normalization of raw Seq events into fixed-schema request records.
//!
//! A raw event carries its payload as an unordered list of
//! `{"Name": ..., "Value": ...}` pairs. Each schema field is looked up by
//! name with a linear scan and accepted only when the JSON type matches
//! exactly; anything else falls back to the field default. A duration sent
//! as `"120"` (string) is therefore treated as absent, and so is a staff id
//! sent as a number.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw event as returned by the Seq API or read back from an archive file.
pub type RawEvent = Value;

/// Default for every absent or mistyped string field.
pub const SENTINEL: &str = "-";

/// One normalized request log entry.
///
/// Serialized with PascalCase keys; this is the webhook payload shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRecord {
    pub id: String,
    pub timestamp: DateTime<Local>,
    pub trace_id: String,
    pub route: String,
    pub method: String,
    pub query: String,
    pub request_body: String,
    pub user_name: String,
    pub staff_id: String,
    pub company_id: String,
    pub company_department_id: String,
    #[serde(rename = "RemoteIP")]
    pub remote_ip: String,
    pub user_agent: String,
    pub status_code: i32,
    pub duration: i64,
    pub request_size: i64,
    pub response_size: i64,
}

impl Default for LogRecord {
    fn default() -> Self {
        LogRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH.with_timezone(&Local),
            trace_id: SENTINEL.to_string(),
            route: SENTINEL.to_string(),
            method: SENTINEL.to_string(),
            query: SENTINEL.to_string(),
            request_body: SENTINEL.to_string(),
            user_name: SENTINEL.to_string(),
            staff_id: SENTINEL.to_string(),
            company_id: SENTINEL.to_string(),
            company_department_id: SENTINEL.to_string(),
            remote_ip: SENTINEL.to_string(),
            user_agent: SENTINEL.to_string(),
            status_code: 0,
            duration: 0,
            request_size: 0,
            response_size: 0,
        }
    }
}

type Setter<T> = fn(&mut LogRecord, T);

const STRING_FIELDS: &[(&str, Setter<String>)] = &[
    ("TraceId", |r, v| r.trace_id = v),
    ("Route", |r, v| r.route = v),
    ("Method", |r, v| r.method = v),
    ("Query", |r, v| r.query = v),
    ("RequestBody", |r, v| r.request_body = v),
    ("UserName", |r, v| r.user_name = v),
    ("StaffId", |r, v| r.staff_id = v),
    ("CompanyId", |r, v| r.company_id = v),
    ("CompanyDepartmentId", |r, v| r.company_department_id = v),
    ("RemoteIP", |r, v| r.remote_ip = v),
    ("UserAgent", |r, v| r.user_agent = v),
];

const INT_FIELDS: &[(&str, Setter<i32>)] = &[("StatusCode", |r, v| r.status_code = v)];

const LONG_FIELDS: &[(&str, Setter<i64>)] = &[
    ("Duration", |r, v| r.duration = v),
    ("RequestBytes", |r, v| r.request_size = v),
    ("ResponseBytes", |r, v| r.response_size = v),
];

fn as_string(value: &Value) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn as_int(value: &Value) -> Option<i32> {
    value.as_i64().and_then(|n| i32::try_from(n).ok())
}

fn as_long(value: &Value) -> Option<i64> {
    value.as_i64()
}

/// Returns the value of the first property called `name` that `extract` accepts.
fn lookup<T>(properties: &[Value], name: &str, extract: fn(&Value) -> Option<T>) -> Option<T> {
    properties.iter().find_map(|prop| {
        if prop.get("Name").and_then(Value::as_str) != Some(name) {
            return None;
        }
        prop.get("Value").and_then(extract)
    })
}

fn apply<T>(
    record: &mut LogRecord,
    properties: &[Value],
    fields: &[(&str, Setter<T>)],
    extract: fn(&Value) -> Option<T>,
) {
    for (name, set) in fields {
        if let Some(value) = lookup(properties, name, extract) {
            set(record, value);
        }
    }
}

/// Parses a Seq timestamp. Offsets are honored; naive timestamps are UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Local));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().with_timezone(&Local))
}

/// Maps one raw event into a [`LogRecord`]. Never fails.
pub fn map_event(raw: &RawEvent) -> LogRecord {
    let mut record = LogRecord::default();

    if let Some(id) = raw.get("Id").and_then(Value::as_str) {
        record.id = id.to_string();
    }
    if let Some(ts) = raw
        .get("Timestamp")
        .and_then(Value::as_str)
        .and_then(parse_timestamp)
    {
        record.timestamp = ts;
    }

    let properties = raw
        .get("Properties")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    apply(&mut record, properties, STRING_FIELDS, as_string);
    apply(&mut record, properties, INT_FIELDS, as_int);
    apply(&mut record, properties, LONG_FIELDS, as_long);

    record
}

/// Whether a raw entry is a structured event that can be mapped.
pub fn is_mappable(raw: &RawEvent) -> bool {
    raw.is_object() && raw.get("Properties").is_some_and(Value::is_array)
}

/// Maps every structured event, skipping entries that are not objects or lack `Properties`.
pub fn map_events(raw: &[RawEvent]) -> Vec<LogRecord> {
    raw.iter()
        .filter(|event| is_mappable(event))
        .map(map_event)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;
    use serde_json::json;

    fn event(properties: Value) -> Value {
        json!({
            "Id": "event-1",
            "Timestamp": "2025-04-17T11:22:33.1234567+00:00",
            "Properties": properties,
        })
    }

    #[test]
    fn test_map_full_event() {
        let raw = event(json!([
            {"Name": "TraceId", "Value": "abc123"},
            {"Name": "Route", "Value": "/home"},
            {"Name": "Method", "Value": "GET"},
            {"Name": "Query", "Value": "?page=2"},
            {"Name": "RequestBody", "Value": "{}"},
            {"Name": "UserName", "Value": "alice"},
            {"Name": "StaffId", "Value": "S-7"},
            {"Name": "CompanyId", "Value": "C-1"},
            {"Name": "CompanyDepartmentId", "Value": "D-3"},
            {"Name": "RemoteIP", "Value": "10.0.0.1"},
            {"Name": "UserAgent", "Value": "curl/8"},
            {"Name": "StatusCode", "Value": 200},
            {"Name": "Duration", "Value": 516},
            {"Name": "RequestBytes", "Value": 12},
            {"Name": "ResponseBytes", "Value": 2048},
        ]));

        let record = map_event(&raw);

        assert_eq!(record.id, "event-1");
        assert_eq!(record.trace_id, "abc123");
        assert_eq!(record.route, "/home");
        assert_eq!(record.method, "GET");
        assert_eq!(record.query, "?page=2");
        assert_eq!(record.request_body, "{}");
        assert_eq!(record.user_name, "alice");
        assert_eq!(record.staff_id, "S-7");
        assert_eq!(record.company_id, "C-1");
        assert_eq!(record.company_department_id, "D-3");
        assert_eq!(record.remote_ip, "10.0.0.1");
        assert_eq!(record.user_agent, "curl/8");
        assert_eq!(record.status_code, 200);
        assert_eq!(record.duration, 516);
        assert_eq!(record.request_size, 12);
        assert_eq!(record.response_size, 2048);
        assert_eq!(
            record.timestamp.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2025, 4, 17, 11, 22, 33).unwrap()
                + chrono::Duration::nanoseconds(123_456_700)
        );
    }

    #[test]
    fn test_staff_id_missing_or_numeric_maps_to_sentinel() {
        let missing = event(json!([{"Name": "Route", "Value": "/a"}]));
        let numeric = event(json!([{"Name": "StaffId", "Value": 42}]));

        assert_eq!(map_event(&missing).staff_id, SENTINEL);
        assert_eq!(map_event(&numeric).staff_id, SENTINEL);
    }

    #[test]
    fn test_numeric_fields_require_numbers() {
        let raw = event(json!([
            {"Name": "StatusCode", "Value": "200"},
            {"Name": "Duration", "Value": "120"},
            {"Name": "RequestBytes", "Value": 1.5},
            {"Name": "ResponseBytes", "Value": null},
        ]));

        let record = map_event(&raw);
        assert_eq!(record.status_code, 0);
        assert_eq!(record.duration, 0);
        assert_eq!(record.request_size, 0);
        assert_eq!(record.response_size, 0);
    }

    #[test]
    fn test_status_code_out_of_i32_range_is_default() {
        let raw = event(json!([{"Name": "StatusCode", "Value": 4_294_967_296_i64}]));
        assert_eq!(map_event(&raw).status_code, 0);
    }

    #[test]
    fn test_first_well_typed_property_wins() {
        let raw = event(json!([
            {"Name": "Route", "Value": 7},
            {"Name": "Route", "Value": "/second"},
            {"Name": "Route", "Value": "/third"},
        ]));
        assert_eq!(map_event(&raw).route, "/second");
    }

    #[test]
    fn test_missing_id_is_generated() {
        let raw = json!({"Properties": []});
        let a = map_event(&raw);
        let b = map_event(&raw);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_timestamp_is_epoch() {
        let raw = json!({"Id": "x", "Properties": []});
        assert_eq!(map_event(&raw).timestamp.timestamp(), 0);
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let ts = parse_timestamp("2025-04-17T19:05:00").unwrap();
        assert_eq!(ts.with_timezone(&Utc).hour(), 19);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_map_events_skips_unstructured_entries() {
        let raw = vec![
            json!("not an event"),
            json!({"Id": "no-props"}),
            json!({"Id": "bad-props", "Properties": {"Route": "/x"}}),
            event(json!([{"Name": "Route", "Value": "/ok"}])),
        ];
        let records = map_events(&raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].route, "/ok");
    }

    #[test]
    fn test_record_serializes_pascal_case() {
        let record = map_event(&event(json!([{"Name": "RemoteIP", "Value": "1.2.3.4"}])));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["RemoteIP"], "1.2.3.4");
        assert_eq!(value["StaffId"], "-");
        assert_eq!(value["StatusCode"], 0);
        assert!(value.get("remote_ip").is_none());
    }

    fn arbitrary_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::from),
            ".{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::from),
                prop::collection::vec(
                    (
                        prop_oneof![
                            Just("Name".to_string()),
                            Just("Value".to_string()),
                            Just("StaffId".to_string()),
                            Just("Properties".to_string()),
                            ".{0,6}"
                        ],
                        inner
                    ),
                    0..6
                )
                .prop_map(|pairs| Value::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_map_event_is_total(raw in arbitrary_json()) {
            let record = map_event(&raw);
            prop_assert!(!record.id.is_empty());
        }

        #[test]
        fn prop_mistyped_strings_fall_back(value in prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]) {
            let raw = json!({
                "Properties": [
                    {"Name": "StaffId", "Value": value.clone()},
                    {"Name": "CompanyId", "Value": value},
                ]
            });
            let record = map_event(&raw);
            prop_assert_eq!(record.staff_id.as_str(), SENTINEL);
            prop_assert_eq!(record.company_id.as_str(), SENTINEL);
        }
    }
}
