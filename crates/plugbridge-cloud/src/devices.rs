//! Device list normalization
//!
//! The device listing has been observed in three envelopes:
//!
//! - a bare array of devices
//! - `{"data": [ ...devices ]}`
//! - `{"data": {"thingList": [{"itemType": 1, "itemData": {...}}]}}`
//!
//! [`PRECEDENCE`] fixes the order in which they are tried. The first envelope
//! that matches is used on its own; shapes are never merged.

use crate::commands::{OutletState, OverrideTable, ShadowStates, SwitchValue};
use serde::Serialize;
use serde_json::Value;

/// `itemType` of a device owned by the account
pub const ITEM_OWN_DEVICE: i64 = 1;
/// `itemType` of a device shared with the account
pub const ITEM_SHARED_DEVICE: i64 = 2;
/// `itemType` of a device group
pub const ITEM_GROUP: i64 = 3;

/// Flat device record sent to the frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub switch_state: Option<SwitchState>,
}

/// Reported switch state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SwitchState {
    Single(SwitchValue),
    Outlets(Vec<OutletState>),
}

/// Known envelope variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    /// Top-level array
    Bare,
    /// Object with a `data` array
    DataArray,
    /// `data.thingList` of wrapped items
    ThingList,
}

/// Resolution order for ambiguous payloads
pub const PRECEDENCE: [Envelope; 3] = [Envelope::Bare, Envelope::DataArray, Envelope::ThingList];

impl Envelope {
    /// Items of `payload` if it has this shape
    pub fn items<'a>(&self, payload: &'a Value) -> Option<&'a [Value]> {
        match self {
            Envelope::Bare => payload.as_array().map(Vec::as_slice),
            Envelope::DataArray => payload.get("data")?.as_array().map(Vec::as_slice),
            Envelope::ThingList => payload
                .get("data")?
                .get("thingList")?
                .as_array()
                .map(Vec::as_slice),
        }
    }

    /// First envelope in [`PRECEDENCE`] matching `payload`
    pub fn detect(payload: &Value) -> Option<(Envelope, &[Value])> {
        PRECEDENCE
            .iter()
            .find_map(|env| env.items(payload).map(|items| (*env, items)))
    }
}

/// Listing options
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    /// Keep device groups (`itemType` 3)
    pub include_groups: bool,
}

/// Extract the flat device list from a vendor payload.
///
/// Unrecognized payloads yield an empty list.
pub fn normalize(payload: &Value, options: ListOptions) -> Vec<Device> {
    let Some((envelope, items)) = Envelope::detect(payload) else {
        tracing::warn!("Unrecognized device list payload, returning no devices");
        return Vec::new();
    };

    match envelope {
        Envelope::Bare | Envelope::DataArray => {
            items.iter().filter_map(Device::from_vendor).collect()
        }
        Envelope::ThingList => items
            .iter()
            .filter(|item| keep_item(item, options))
            .filter_map(|item| item.get("itemData"))
            .filter_map(Device::from_vendor)
            .collect(),
    }
}

fn keep_item(item: &Value, options: ListOptions) -> bool {
    match item.get("itemType").and_then(Value::as_i64) {
        Some(ITEM_OWN_DEVICE) | Some(ITEM_SHARED_DEVICE) => true,
        Some(ITEM_GROUP) => options.include_groups,
        _ => false,
    }
}

/// Replace the reported state of shadow-tracked devices with the last command
pub fn apply_shadow(devices: &mut [Device], overrides: &OverrideTable, shadow: &ShadowStates) {
    for device in devices.iter_mut() {
        if !overrides.strategy_for(&device.id).tracks_shadow() {
            continue;
        }
        if let Some(state) = shadow.get(&device.id) {
            device.switch_state = Some(SwitchState::Single(state));
        }
    }
}

impl Device {
    /// Flatten one vendor device object; `None` if it has no id
    pub fn from_vendor(value: &Value) -> Option<Device> {
        let id = value
            .get("deviceid")
            .or_else(|| value.get("id"))
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())?
            .to_string();

        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let online = value.get("online").and_then(Value::as_bool).unwrap_or(false);

        let switch_state = value.get("params").and_then(switch_state);

        Some(Device {
            id,
            name,
            online,
            switch_state,
        })
    }
}

fn switch_state(params: &Value) -> Option<SwitchState> {
    if let Some(state) = params.get("switch").and_then(parse_switch) {
        return Some(SwitchState::Single(state));
    }

    let switches = params.get("switches")?.as_array()?;
    let outlets: Vec<OutletState> = switches
        .iter()
        .filter_map(|s| {
            Some(OutletState {
                outlet: u32::try_from(s.get("outlet")?.as_u64()?).ok()?,
                switch: parse_switch(s.get("switch")?)?,
            })
        })
        .collect();
    Some(SwitchState::Outlets(outlets))
}

fn parse_switch(value: &Value) -> Option<SwitchValue> {
    value.as_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandStrategy, DeviceOverride};
    use serde_json::json;

    fn thing_list() -> Value {
        json!({
            "error": 0,
            "msg": "",
            "data": {
                "thingList": [
                    {"itemType": 1, "itemData": {
                        "deviceid": "d1", "name": "Lamp", "online": true,
                        "params": {"switch": "on"}
                    }},
                    {"itemType": 2, "itemData": {
                        "deviceid": "d2", "name": "Strip", "online": false,
                        "params": {"switches": [
                            {"outlet": 0, "switch": "on"},
                            {"outlet": 1, "switch": "off"}
                        ]}
                    }},
                    {"itemType": 3, "itemData": {"id": "g1", "name": "Group"}}
                ],
                "total": 3
            }
        })
    }

    #[test]
    fn test_thing_list_unwraps_item_data() {
        let devices = normalize(&thing_list(), ListOptions::default());
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].id, "d1");
        assert_eq!(devices[0].name, "Lamp");
        assert!(devices[0].online);
        assert_eq!(
            devices[0].switch_state,
            Some(SwitchState::Single(SwitchValue::On))
        );
        match &devices[1].switch_state {
            Some(SwitchState::Outlets(outlets)) => {
                assert_eq!(outlets.len(), 2);
                assert_eq!(outlets[1].switch, SwitchValue::Off);
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn test_groups_only_on_request() {
        let devices = normalize(
            &thing_list(),
            ListOptions {
                include_groups: true,
            },
        );
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].id, "g1");
        assert_eq!(devices[2].switch_state, None);
    }

    #[test]
    fn test_bare_array() {
        let payload = json!([{"deviceid": "a", "name": "A", "online": true, "params": {"switch": "off"}}]);
        assert_eq!(Envelope::detect(&payload).unwrap().0, Envelope::Bare);
        let devices = normalize(&payload, ListOptions::default());
        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].switch_state,
            Some(SwitchState::Single(SwitchValue::Off))
        );
    }

    #[test]
    fn test_data_array() {
        let payload = json!({"data": [{"id": "b", "name": "B"}]});
        assert_eq!(Envelope::detect(&payload).unwrap().0, Envelope::DataArray);
        let devices = normalize(&payload, ListOptions::default());
        assert_eq!(devices[0].id, "b");
        assert!(!devices[0].online);
    }

    #[test]
    fn test_items_are_not_unwrapped_outside_thing_list() {
        // itemData wrappers inside a plain data array are not devices
        let payload = json!({"data": [{"itemType": 1, "itemData": {"deviceid": "x"}}]});
        assert!(normalize(&payload, ListOptions::default()).is_empty());
    }

    #[test]
    fn test_unrecognized_payload() {
        assert!(normalize(&json!({"data": {}}), ListOptions::default()).is_empty());
        assert!(normalize(&json!("nope"), ListOptions::default()).is_empty());
        assert!(Envelope::detect(&json!({"data": {"other": []}})).is_none());
    }

    #[test]
    fn test_entries_without_id_are_skipped() {
        let payload = json!([{"name": "ghost"}, {"deviceid": "", "name": "empty"}, {"deviceid": "ok"}]);
        let devices = normalize(&payload, ListOptions::default());
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "ok");
    }

    #[test]
    fn test_unknown_switch_literal_is_ignored() {
        let payload = json!([{"deviceid": "a", "params": {"switch": "pulse"}}]);
        assert_eq!(normalize(&payload, ListOptions::default())[0].switch_state, None);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let payload = thing_list();
        let first = normalize(&payload, ListOptions::default());
        let second = normalize(&payload, ListOptions::default());
        assert_eq!(first, second);
    }

    #[test]
    fn test_serialized_shape() {
        let devices = normalize(&thing_list(), ListOptions::default());
        assert_eq!(
            serde_json::to_value(&devices[0]).unwrap(),
            json!({"id": "d1", "name": "Lamp", "online": true, "switchState": "on"})
        );
        assert_eq!(
            serde_json::to_value(&devices[1]).unwrap()["switchState"],
            json!([{"outlet": 0, "switch": "on"}, {"outlet": 1, "switch": "off"}])
        );
    }

    #[test]
    fn test_apply_shadow() {
        let overrides = OverrideTable::new(&[DeviceOverride {
            device_id: "d1".to_string(),
            strategy: CommandStrategy::Shadow,
        }]);
        let shadow = ShadowStates::new();
        let mut devices = normalize(&thing_list(), ListOptions::default());

        // nothing recorded yet: vendor value stays
        apply_shadow(&mut devices, &overrides, &shadow);
        assert_eq!(
            devices[0].switch_state,
            Some(SwitchState::Single(SwitchValue::On))
        );

        shadow.record("d1", SwitchValue::Off);
        shadow.record("d2", SwitchValue::Off);
        apply_shadow(&mut devices, &overrides, &shadow);
        assert_eq!(
            devices[0].switch_state,
            Some(SwitchState::Single(SwitchValue::Off))
        );
        // d2 is not shadow-tracked
        assert!(matches!(devices[1].switch_state, Some(SwitchState::Outlets(_))));
    }
}
