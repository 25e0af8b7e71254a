// センサーが読む属性
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::entity::SensorState;
use crate::myenergi::{CtSlot, Device, DeviceKind, Hub};
use std::borrow::Cow;
use std::fmt;

/// ハブの属性
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum HubAttribute {
    PowerGrid,
    PowerGeneration,
    PowerCharging,
    PowerBattery,
    ConsumptionHome,
    EnergyImported,
    EnergyExported,
    EnergyGenerated,
    EnergyDiverted,
    EnergyGreen,
    EnergyConsumed,
}

impl HubAttribute {
    pub const fn path(&self) -> &'static str {
        match self {
            Self::PowerGrid => "power_grid",
            Self::PowerGeneration => "power_generation",
            Self::PowerCharging => "power_charging",
            Self::PowerBattery => "power_battery",
            Self::ConsumptionHome => "consumption_home",
            Self::EnergyImported => "energy_imported",
            Self::EnergyExported => "energy_exported",
            Self::EnergyGenerated => "energy_generated",
            Self::EnergyDiverted => "energy_diverted",
            Self::EnergyGreen => "energy_green",
            Self::EnergyConsumed => "energy_consumed",
        }
    }

    pub fn read(&self, hub: &Hub) -> SensorState {
        let value = match self {
            Self::PowerGrid => hub.power_grid,
            Self::PowerGeneration => hub.power_generation,
            Self::PowerCharging => hub.power_charging,
            Self::PowerBattery => hub.power_battery,
            Self::ConsumptionHome => hub.consumption_home,
            Self::EnergyImported => hub.energy_imported,
            Self::EnergyExported => hub.energy_exported,
            Self::EnergyGenerated => hub.energy_generated,
            Self::EnergyDiverted => hub.energy_diverted,
            Self::EnergyGreen => hub.energy_green,
            Self::EnergyConsumed => hub.energy_consumed,
        };
        SensorState::from(value)
    }
}

/// 機器の属性
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum DeviceAttribute {
    /// CTチャンネルの瞬時電力
    CtPower(CtSlot),
    Status,
    PlugStatus,
    EnergyTotal,
    EnergyDiverted,
    ChargeAdded,
    DivertedSession,
}

impl DeviceAttribute {
    pub fn path(&self) -> Cow<'static, str> {
        match self {
            Self::CtPower(slot) => Cow::Owned(format!("ct{}.power", slot.number())),
            Self::Status => Cow::Borrowed("status"),
            Self::PlugStatus => Cow::Borrowed("plug_status"),
            Self::EnergyTotal => Cow::Borrowed("energy_total"),
            Self::EnergyDiverted => Cow::Borrowed("energy_diverted"),
            Self::ChargeAdded => Cow::Borrowed("charge_added"),
            Self::DivertedSession => Cow::Borrowed("diverted_session"),
        }
    }

    /// この種類の機器がこの属性を持つか
    pub fn supported_by(&self, kind: DeviceKind) -> bool {
        match self {
            Self::CtPower(slot) => slot.number() <= kind.ct_slots(),
            Self::Status | Self::EnergyTotal | Self::EnergyDiverted => kind.reports_status(),
            Self::ChargeAdded | Self::PlugStatus => kind == DeviceKind::Zappi,
            Self::DivertedSession => kind == DeviceKind::Eddi,
        }
    }

    pub fn read(&self, device: &Device) -> SensorState {
        match self {
            Self::CtPower(slot) => device.ct(*slot).and_then(|ct| ct.power).into(),
            Self::Status => device.status.clone().into(),
            Self::PlugStatus => device.plug_status.clone().into(),
            Self::EnergyTotal => device.energy_total.into(),
            Self::EnergyDiverted => device.energy_diverted.into(),
            Self::ChargeAdded => device.charge_added.into(),
            Self::DivertedSession => device.diverted_session.into(),
        }
    }
}

/// センサーの値の出どころ
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Attribute {
    Hub(HubAttribute),
    Device(DeviceAttribute),
    /// 機器のチャンネル別積算電力量(キー)
    History(String),
}

impl Attribute {
    /// 識別子に使う属性パス
    pub fn path(&self) -> Cow<'_, str> {
        match self {
            Self::Hub(a) => Cow::Borrowed(a.path()),
            Self::Device(a) => a.path(),
            Self::History(key) => Cow::Borrowed(key.as_str()),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

#[cfg(test)]
use rust_decimal::dec;

#[test]
fn test_attribute_paths() {
    assert_eq!(Attribute::Hub(HubAttribute::PowerGrid).path(), "power_grid");
    assert_eq!(
        Attribute::Hub(HubAttribute::ConsumptionHome).path(),
        "consumption_home"
    );
    assert_eq!(
        Attribute::Device(DeviceAttribute::CtPower(CtSlot::CT5)).path(),
        "ct5.power"
    );
    assert_eq!(
        Attribute::Device(DeviceAttribute::DivertedSession).path(),
        "diverted_session"
    );
    assert_eq!(Attribute::History("h1b".to_string()).to_string(), "h1b");
}

#[test]
fn test_supported_by_kind() {
    let ct6 = DeviceAttribute::CtPower(CtSlot::CT6);
    assert!(ct6.supported_by(DeviceKind::Zappi));
    assert!(!ct6.supported_by(DeviceKind::Eddi));
    assert!(DeviceAttribute::CtPower(CtSlot::CT3).supported_by(DeviceKind::Harvi));

    assert!(DeviceAttribute::ChargeAdded.supported_by(DeviceKind::Zappi));
    assert!(!DeviceAttribute::ChargeAdded.supported_by(DeviceKind::Eddi));
    assert!(DeviceAttribute::DivertedSession.supported_by(DeviceKind::Eddi));
    assert!(!DeviceAttribute::Status.supported_by(DeviceKind::Harvi));
}

#[test]
fn test_hub_read() {
    let hub = Hub {
        power_grid: Some(dec!(-320)),
        ..Default::default()
    };
    assert_eq!(
        HubAttribute::PowerGrid.read(&hub),
        SensorState::Number(dec!(-320))
    );
    assert_eq!(HubAttribute::EnergyGreen.read(&hub), SensorState::Unknown);
}
