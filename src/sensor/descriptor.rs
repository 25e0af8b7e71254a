// センサーのメタデータ
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::entity::{DeviceClass, StateClass};
use crate::sensor::Attribute;
use std::collections::BTreeMap;

/// 計測値の種類
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum MeasurementKind {
    /// 状態などの文字列
    None,
    /// 瞬時電力(W)
    Power,
    /// 積算電力量(kWh)
    EnergyKwh,
    /// 積算電力量(Wh)
    EnergyWh,
}

impl MeasurementKind {
    pub const fn unit(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Power => Some("W"),
            Self::EnergyKwh => Some("kWh"),
            Self::EnergyWh => Some("Wh"),
        }
    }

    pub const fn device_class(&self) -> Option<DeviceClass> {
        match self {
            Self::None => None,
            Self::Power => Some(DeviceClass::Power),
            Self::EnergyKwh | Self::EnergyWh => Some(DeviceClass::Energy),
        }
    }

    pub const fn state_class(&self) -> Option<StateClass> {
        match self {
            Self::None => None,
            Self::Power => Some(StateClass::Measurement),
            Self::EnergyKwh | Self::EnergyWh => Some(StateClass::TotalIncreasing),
        }
    }

    pub const fn default_icon(&self) -> Option<&'static str> {
        match self {
            Self::Power => Some("mdi:flash"),
            _ => None,
        }
    }
}

/// センサーの記述
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct SensorDescriptor {
    pub display_name: String,
    pub attribute: Attribute,
    pub measurement: MeasurementKind,
    pub icon: Option<String>,
    pub extra_attributes: BTreeMap<String, String>,
}

impl SensorDescriptor {
    pub fn new(
        display_name: impl Into<String>,
        attribute: Attribute,
        measurement: MeasurementKind,
    ) -> Self {
        let mut extra_attributes = BTreeMap::new();
        if let Some(state_class) = measurement.state_class() {
            extra_attributes.insert("state_class".to_string(), state_class.to_string());
        }
        Self {
            display_name: display_name.into(),
            attribute,
            measurement,
            icon: measurement.default_icon().map(str::to_owned),
            extra_attributes,
        }
    }

    /// 単位なし
    pub fn plain(display_name: impl Into<String>, attribute: Attribute) -> Self {
        Self::new(display_name, attribute, MeasurementKind::None)
    }

    /// 瞬時電力
    pub fn power(display_name: impl Into<String>, attribute: Attribute) -> Self {
        Self::new(display_name, attribute, MeasurementKind::Power)
    }

    /// 積算電力量(kWh)
    pub fn energy_kwh(display_name: impl Into<String>, attribute: Attribute) -> Self {
        Self::new(display_name, attribute, MeasurementKind::EnergyKwh)
    }

    /// 積算電力量(Wh)
    pub fn energy_wh(display_name: impl Into<String>, attribute: Attribute) -> Self {
        Self::new(display_name, attribute, MeasurementKind::EnergyWh)
    }

    /// チャンネル別積算電力量
    pub fn history(key: &str) -> Self {
        Self::energy_wh(
            format!("{} today", key.replace('_', " ")),
            Attribute::History(key.to_owned()),
        )
    }
}

#[cfg(test)]
use crate::sensor::{DeviceAttribute, HubAttribute};

#[test]
fn test_power_descriptor() {
    let d = SensorDescriptor::power("Power grid", Attribute::Hub(HubAttribute::PowerGrid));
    assert_eq!(d.measurement.unit(), Some("W"));
    assert_eq!(d.measurement.device_class(), Some(DeviceClass::Power));
    assert_eq!(d.icon.as_deref(), Some("mdi:flash"));
    assert_eq!(
        d.extra_attributes.get("state_class").map(String::as_str),
        Some("measurement")
    );
}

#[test]
fn test_energy_descriptors() {
    let kwh = SensorDescriptor::energy_kwh(
        "Charge added session",
        Attribute::Device(DeviceAttribute::ChargeAdded),
    );
    let wh = SensorDescriptor::energy_wh(
        "Grid import today",
        Attribute::Hub(HubAttribute::EnergyImported),
    );
    assert_eq!(kwh.measurement.unit(), Some("kWh"));
    assert_eq!(wh.measurement.unit(), Some("Wh"));
    for d in [&kwh, &wh] {
        assert_eq!(d.measurement.device_class(), Some(DeviceClass::Energy));
        assert_eq!(d.measurement.state_class(), Some(StateClass::TotalIncreasing));
        assert_eq!(d.icon, None);
        assert_eq!(
            d.extra_attributes.get("state_class").map(String::as_str),
            Some("total_increasing")
        );
    }
}

#[test]
fn test_plain_descriptor() {
    let d = SensorDescriptor::plain("Status", Attribute::Device(DeviceAttribute::Status));
    assert_eq!(d.measurement.unit(), None);
    assert_eq!(d.measurement.device_class(), None);
    assert_eq!(d.icon, None);
    assert!(d.extra_attributes.is_empty());
}

#[test]
fn test_history_descriptor() {
    let d = SensorDescriptor::history("ct_1_import");
    assert_eq!(d.display_name, "ct 1 import today");
    assert_eq!(d.attribute, Attribute::History("ct_1_import".to_string()));
    assert_eq!(d.measurement, MeasurementKind::EnergyWh);
}
