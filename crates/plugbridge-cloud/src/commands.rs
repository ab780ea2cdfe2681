//! Device command shaping
//!
//! A toggle request is turned into the vendor's
//! `{"type":1,"id":...,"params":{...}}` payload. Most devices take the default
//! single-switch shape; a few need a per-device strategy looked up in the
//! [`OverrideTable`] first.

use crate::error::{CloudError, CloudResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Switch literal accepted by the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchValue {
    On,
    Off,
}

impl SwitchValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwitchValue::On => "on",
            SwitchValue::Off => "off",
        }
    }
}

impl fmt::Display for SwitchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchValue {
    type Err = CloudError;

    /// Exact match only: `"ON"` or `" on"` are rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(SwitchValue::On),
            "off" => Ok(SwitchValue::Off),
            other => Err(CloudError::validation(format!(
                "state must be \"on\" or \"off\", got {:?}",
                other
            ))),
        }
    }
}

/// One channel of a multi-outlet device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutletState {
    pub outlet: u32,
    pub switch: SwitchValue,
}

/// `params` of a status command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusParams {
    Single { switch: SwitchValue },
    Multi { switches: Vec<OutletState> },
}

impl StatusParams {
    fn outlets(outlets: &[u32], switch: SwitchValue) -> Self {
        StatusParams::Multi {
            switches: outlets
                .iter()
                .map(|&outlet| OutletState { outlet, switch })
                .collect(),
        }
    }
}

/// Body of `POST /v2/device/thing/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusRequest {
    /// 1 = device
    #[serde(rename = "type")]
    pub item_type: u8,
    pub id: String,
    pub params: StatusParams,
}

/// What the caller asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleTarget {
    /// Whole device
    Single(SwitchValue),
    /// Explicit outlets of a multi-channel device
    Outlets(Vec<u32>, SwitchValue),
}

impl ToggleTarget {
    pub fn state(&self) -> SwitchValue {
        match self {
            ToggleTarget::Single(state) | ToggleTarget::Outlets(_, state) => *state,
        }
    }
}

/// Validated toggle command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleCommand {
    pub device_id: String,
    pub target: ToggleTarget,
}

impl ToggleCommand {
    /// Validate a single-switch toggle
    pub fn single(device_id: &str, state: &str) -> CloudResult<Self> {
        Ok(Self {
            device_id: validate_device_id(device_id)?,
            target: ToggleTarget::Single(state.parse()?),
        })
    }

    /// Validate a per-outlet toggle
    pub fn outlets(device_id: &str, outlets: &[u32], state: &str) -> CloudResult<Self> {
        let device_id = validate_device_id(device_id)?;
        let state = state.parse()?;
        if outlets.is_empty() {
            return Err(CloudError::validation("outlets must not be empty"));
        }
        let mut outlets = outlets.to_vec();
        outlets.sort_unstable();
        outlets.dedup();
        Ok(Self {
            device_id,
            target: ToggleTarget::Outlets(outlets, state),
        })
    }
}

fn validate_device_id(device_id: &str) -> CloudResult<String> {
    let trimmed = device_id.trim();
    if trimmed.is_empty() {
        return Err(CloudError::validation("deviceId is required"));
    }
    Ok(trimmed.to_string())
}

/// How commands for a particular device are shaped
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum CommandStrategy {
    /// `{switch: state}`
    #[default]
    Default,

    /// Momentary actuator: always `on`, the device releases by itself
    Pulse,

    /// Vendor does not report the real state; remember the last command
    Shadow,

    /// Whole-device toggles fan out to these outlets
    MultiOutlet { outlets: Vec<u32> },
}

impl CommandStrategy {
    /// Build the vendor `params` for a target
    pub fn shape(&self, target: &ToggleTarget) -> StatusParams {
        match (self, target) {
            (CommandStrategy::Pulse, ToggleTarget::Single(_)) => StatusParams::Single {
                switch: SwitchValue::On,
            },
            (CommandStrategy::Pulse, ToggleTarget::Outlets(outlets, _)) => {
                StatusParams::outlets(outlets, SwitchValue::On)
            }
            (CommandStrategy::MultiOutlet { outlets }, ToggleTarget::Single(state))
                if !outlets.is_empty() =>
            {
                StatusParams::outlets(outlets, *state)
            }
            (_, ToggleTarget::Single(state)) => StatusParams::Single { switch: *state },
            (_, ToggleTarget::Outlets(outlets, state)) => StatusParams::outlets(outlets, *state),
        }
    }

    pub fn tracks_shadow(&self) -> bool {
        matches!(self, CommandStrategy::Shadow)
    }
}

/// One configured override
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceOverride {
    pub device_id: String,

    #[serde(flatten)]
    pub strategy: CommandStrategy,
}

/// Device id → strategy lookup, falling through to [`CommandStrategy::Default`]
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    strategies: HashMap<String, CommandStrategy>,
}

impl OverrideTable {
    pub fn new(overrides: &[DeviceOverride]) -> Self {
        let strategies = overrides
            .iter()
            .map(|o| (o.device_id.clone(), o.strategy.clone()))
            .collect();
        Self { strategies }
    }

    pub fn strategy_for(&self, device_id: &str) -> &CommandStrategy {
        static DEFAULT: CommandStrategy = CommandStrategy::Default;
        self.strategies.get(device_id).unwrap_or(&DEFAULT)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Resolve the strategy and build the outbound request
    pub fn plan(&self, command: &ToggleCommand) -> DispatchPlan {
        let strategy = self.strategy_for(&command.device_id);
        DispatchPlan {
            request: StatusRequest {
                item_type: 1,
                id: command.device_id.clone(),
                params: strategy.shape(&command.target),
            },
            shadow: strategy
                .tracks_shadow()
                .then(|| command.target.state()),
        }
    }
}

/// Outbound request plus what to remember once the vendor accepts it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPlan {
    pub request: StatusRequest,
    pub shadow: Option<SwitchValue>,
}

/// Last commanded state of shadow-tracked devices
#[derive(Debug, Default)]
pub struct ShadowStates {
    states: RwLock<HashMap<String, SwitchValue>>,
}

impl ShadowStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, device_id: &str, state: SwitchValue) {
        self.states.write().insert(device_id.to_string(), state);
    }

    pub fn get(&self, device_id: &str) -> Option<SwitchValue> {
        self.states.read().get(device_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table() -> OverrideTable {
        OverrideTable::new(&[
            DeviceOverride {
                device_id: "gate".to_string(),
                strategy: CommandStrategy::Pulse,
            },
            DeviceOverride {
                device_id: "heater".to_string(),
                strategy: CommandStrategy::Shadow,
            },
            DeviceOverride {
                device_id: "strip".to_string(),
                strategy: CommandStrategy::MultiOutlet {
                    outlets: vec![0, 1, 2],
                },
            },
        ])
    }

    #[test]
    fn test_state_literal_is_exact() {
        assert_eq!("on".parse::<SwitchValue>().unwrap(), SwitchValue::On);
        assert_eq!("off".parse::<SwitchValue>().unwrap(), SwitchValue::Off);
        for bad in ["ON", "Off", " on", "toggle", ""] {
            assert!(matches!(
                bad.parse::<SwitchValue>(),
                Err(CloudError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_default_payload() {
        let cmd = ToggleCommand::single("d1", "on").unwrap();
        let plan = OverrideTable::default().plan(&cmd);
        assert_eq!(
            serde_json::to_value(&plan.request).unwrap(),
            json!({"type": 1, "id": "d1", "params": {"switch": "on"}})
        );
        assert_eq!(plan.shadow, None);
    }

    #[test]
    fn test_outlets_payload() {
        let cmd = ToggleCommand::outlets("d2", &[3, 1, 1], "off").unwrap();
        let plan = OverrideTable::default().plan(&cmd);
        assert_eq!(
            serde_json::to_value(&plan.request).unwrap(),
            json!({
                "type": 1,
                "id": "d2",
                "params": {"switches": [
                    {"outlet": 1, "switch": "off"},
                    {"outlet": 3, "switch": "off"}
                ]}
            })
        );
    }

    #[test]
    fn test_validation() {
        assert!(ToggleCommand::single("", "on").is_err());
        assert!(ToggleCommand::single("  ", "on").is_err());
        assert!(ToggleCommand::single("d1", "maybe").is_err());
        assert!(ToggleCommand::outlets("d1", &[], "on").is_err());
    }

    #[test]
    fn test_pulse_always_on() {
        let cmd = ToggleCommand::single("gate", "off").unwrap();
        let plan = table().plan(&cmd);
        assert_eq!(
            plan.request.params,
            StatusParams::Single {
                switch: SwitchValue::On
            }
        );
    }

    #[test]
    fn test_shadow_recorded_state() {
        let cmd = ToggleCommand::single("heater", "off").unwrap();
        let plan = table().plan(&cmd);
        assert_eq!(plan.shadow, Some(SwitchValue::Off));
        assert_eq!(
            plan.request.params,
            StatusParams::Single {
                switch: SwitchValue::Off
            }
        );
    }

    #[test]
    fn test_multi_outlet_fan_out() {
        let cmd = ToggleCommand::single("strip", "on").unwrap();
        let plan = table().plan(&cmd);
        match plan.request.params {
            StatusParams::Multi { switches } => {
                assert_eq!(switches.len(), 3);
                assert!(switches.iter().all(|s| s.switch == SwitchValue::On));
            }
            other => panic!("unexpected params: {:?}", other),
        }
    }

    #[test]
    fn test_unlisted_device_uses_default() {
        assert_eq!(table().strategy_for("other"), &CommandStrategy::Default);
        assert_eq!(table().len(), 3);
    }

    #[test]
    fn test_override_from_json() {
        let o: DeviceOverride = serde_json::from_value(json!({
            "device_id": "strip",
            "strategy": "multi_outlet",
            "outlets": [0, 1]
        }))
        .unwrap();
        assert_eq!(
            o.strategy,
            CommandStrategy::MultiOutlet {
                outlets: vec![0, 1]
            }
        );

        let o: DeviceOverride =
            serde_json::from_value(json!({"device_id": "gate", "strategy": "pulse"})).unwrap();
        assert_eq!(o.strategy, CommandStrategy::Pulse);
    }

    #[test]
    fn test_shadow_states() {
        let shadow = ShadowStates::new();
        assert_eq!(shadow.get("heater"), None);
        shadow.record("heater", SwitchValue::On);
        shadow.record("heater", SwitchValue::Off);
        assert_eq!(shadow.get("heater"), Some(SwitchValue::Off));
    }
}
