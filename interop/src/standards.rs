// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Conversion of local traceability records into interchange standards before they are
//! shared with another chain.

use crate::builders::generic::DEFAULT_DATA_STANDARD;
use crate::error::{InteropError, InteropResult};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub const GS1_EPCIS: &str = DEFAULT_DATA_STANDARD;
pub const GS1_COMPANY_PREFIX: &str = "0614141";
pub const GS1_EVENT_TIME_ZONE_OFFSET: &str = "+07:00";
pub const GS1_EXTENSION_FIELD: &str = "tracepostExtension";

pub trait DataStandardConverter: Send + Sync {
    /// Converts a JSON object record. `now` stamps the produced document.
    fn convert(&self, data: &Map<String, Value>, now: DateTime<Utc>) -> InteropResult<Value>;
}

/// Builds a GS1 EPCIS `ObjectEvent` observing the record. The record itself travels as an
/// extension element.
#[derive(Clone, Debug)]
pub struct Gs1EpcisConverter {
    pub company_prefix: String,
    pub time_zone_offset: String,
}

impl Default for Gs1EpcisConverter {
    fn default() -> Self {
        Self {
            company_prefix: GS1_COMPANY_PREFIX.to_string(),
            time_zone_offset: GS1_EVENT_TIME_ZONE_OFFSET.to_string(),
        }
    }
}

impl DataStandardConverter for Gs1EpcisConverter {
    fn convert(&self, data: &Map<String, Value>, now: DateTime<Utc>) -> InteropResult<Value> {
        let epc_list: Vec<String> = data
            .get("batch_id")
            .and_then(Value::as_str)
            .map(|batch_id| format!("urn:epc:id:sgtin:{}.{}", self.company_prefix, batch_id))
            .into_iter()
            .collect();
        let mut event = json!({
            "eventTime": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "eventTimeZoneOffset": self.time_zone_offset,
            "epcList": epc_list,
            "action": "OBSERVE",
            "bizStep": "urn:epcglobal:cbv:bizstep:commissioning",
            "disposition": "urn:epcglobal:cbv:disp:active",
            GS1_EXTENSION_FIELD: data,
        });
        let location = match data.get("location") {
            Some(Value::String(location)) if !location.is_empty() => Some(location.clone()),
            Some(Value::Number(location)) => Some(location.to_string()),
            _ => None,
        };
        if let Some(location) = location {
            event["readPoint"] = json!({ "id": format!("urn:epc:id:sgln:{}", location) });
        }
        Ok(event)
    }
}

/// Converters by standard name, e.g. `GS1-EPCIS`.
pub struct StandardRegistry {
    converters: RwLock<HashMap<String, Arc<dyn DataStandardConverter>>>,
}

impl StandardRegistry {
    pub fn empty() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// Adds or replaces the converter for `standard`.
    pub fn register(&self, standard: &str, converter: Arc<dyn DataStandardConverter>) {
        self.converters
            .write()
            .insert(standard.to_string(), converter);
        info!(standard, "Registered data standard converter");
    }

    pub fn supported(&self) -> Vec<String> {
        let mut standards: Vec<_> = self.converters.read().keys().cloned().collect();
        standards.sort();
        standards
    }

    pub fn convert(&self, standard: &str, data: &Value, now: DateTime<Utc>) -> InteropResult<Value> {
        let converter = self.converters.read().get(standard).cloned().ok_or_else(|| {
            InteropError::Validation(format!("data standard {} not supported", standard))
        })?;
        let Value::Object(record) = data else {
            return Err(InteropError::Validation(
                "data must be a JSON object".to_string(),
            ));
        };
        converter.convert(record, now)
    }
}

impl Default for StandardRegistry {
    fn default() -> Self {
        let registry = Self::empty();
        registry.register(GS1_EPCIS, Arc::new(Gs1EpcisConverter::default()));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    impl DataStandardConverter for Uppercase {
        fn convert(&self, data: &Map<String, Value>, _now: DateTime<Utc>) -> InteropResult<Value> {
            Ok(data
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect::<Map<_, _>>()
                .into())
        }
    }

    #[test]
    fn test_gs1_epcis_event() {
        let now: DateTime<Utc> = "2026-03-01T08:30:00Z".parse().unwrap();
        let data = json!({"batch_id": "B-17", "location": "hatchery-3", "species": "vannamei"});
        let event = StandardRegistry::default()
            .convert(GS1_EPCIS, &data, now)
            .unwrap();
        assert_eq!(event["eventTime"], "2026-03-01T08:30:00Z");
        assert_eq!(event["eventTimeZoneOffset"], "+07:00");
        assert_eq!(event["epcList"], json!(["urn:epc:id:sgtin:0614141.B-17"]));
        assert_eq!(event["action"], "OBSERVE");
        assert_eq!(event["bizStep"], "urn:epcglobal:cbv:bizstep:commissioning");
        assert_eq!(event["disposition"], "urn:epcglobal:cbv:disp:active");
        assert_eq!(event["readPoint"]["id"], "urn:epc:id:sgln:hatchery-3");
        assert_eq!(event[GS1_EXTENSION_FIELD], data);
    }

    #[test]
    fn test_gs1_epcis_without_batch_or_location() {
        let event = Gs1EpcisConverter::default()
            .convert(&Map::new(), Utc::now())
            .unwrap();
        assert_eq!(event["epcList"], json!([]));
        assert!(event.get("readPoint").is_none());
    }

    #[test]
    fn test_unknown_standard_and_bad_input() {
        let registry = StandardRegistry::default();
        let err = registry
            .convert("ISO-22005", &json!({"batch_id": "B-1"}), Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            InteropError::Validation("data standard ISO-22005 not supported".to_string())
        );
        assert!(matches!(
            registry.convert(GS1_EPCIS, &json!(["B-1"]), Utc::now()),
            Err(InteropError::Validation(_))
        ));
    }

    #[test]
    fn test_register_custom_converter() {
        let registry = StandardRegistry::default();
        registry.register("UPPER", Arc::new(Uppercase));
        assert_eq!(registry.supported(), vec!["GS1-EPCIS", "UPPER"]);
        assert_eq!(
            registry
                .convert("UPPER", &json!({"batch_id": "B-1"}), Utc::now())
                .unwrap(),
            json!({"BATCH_ID": "B-1"})
        );
    }
}
