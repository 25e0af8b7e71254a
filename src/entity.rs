// ホームオートメーション側に見せるセンサーエンティティ
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// インテグレーションのドメイン名
pub const DOMAIN: &str = "myenergi";

/// 製造者名
pub const MANUFACTURER: &str = "myenergi";

/// センサーの種類
#[derive(Serialize, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Power,
    Energy,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Power => write!(f, "power"),
            Self::Energy => write!(f, "energy"),
        }
    }
}

/// 統計の取り方
///
/// 瞬時値は平均を、積算値は増分を集計する。
#[derive(Serialize, Clone, Copy, Eq, PartialEq, Hash, Debug)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    TotalIncreasing,
}

impl fmt::Display for StateClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Measurement => write!(f, "measurement"),
            Self::TotalIncreasing => write!(f, "total_increasing"),
        }
    }
}

/// センサーの値
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub enum SensorState {
    /// 値なし(ゼロとは区別する)
    #[default]
    Unknown,
    Number(Decimal),
    Text(String),
}

impl SensorState {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl From<Option<Decimal>> for SensorState {
    fn from(value: Option<Decimal>) -> Self {
        value.map_or(Self::Unknown, Self::Number)
    }
}

impl From<Option<String>> for SensorState {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Unknown, Self::Text)
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Number(a) => write!(f, "{}", a),
            Self::Text(a) => write!(f, "{}", a),
        }
    }
}

impl Serialize for SensorState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown => serializer.serialize_str("unknown"),
            Self::Number(a) => match a.to_f64() {
                Some(v) => serializer.serialize_f64(v),
                None => serializer.collect_str(a),
            },
            Self::Text(a) => serializer.serialize_str(a),
        }
    }
}

/// エンティティが属する機器の情報
#[derive(Serialize, Clone, Eq, PartialEq, Debug)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    pub fn new(serial_number: &str, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), serial_number.to_string())],
            name: name.into(),
            manufacturer: MANUFACTURER.to_string(),
            model: model.into(),
        }
    }
}

/// ホーム側がポーリングするセンサーのプロパティ
pub trait SensorEntity {
    /// 再起動しても変わらない識別子
    fn unique_id(&self) -> String;

    fn name(&self) -> String;

    /// 現在値
    fn state(&self) -> SensorState;

    fn unit_of_measurement(&self) -> Option<&'static str>;

    fn icon(&self) -> Option<&str>;

    fn device_class(&self) -> Option<DeviceClass>;

    fn state_class(&self) -> Option<StateClass>;

    fn extra_state_attributes(&self) -> &BTreeMap<String, String>;

    fn device_info(&self) -> DeviceInfo;
}

/// ある時点のエンティティの様子
#[derive(Serialize, Clone, Eq, PartialEq, Debug)]
pub struct EntitySnapshot {
    pub unique_id: String,
    pub name: String,
    pub state: SensorState,
    pub unit_of_measurement: Option<&'static str>,
    pub icon: Option<String>,
    pub device_class: Option<DeviceClass>,
    pub state_class: Option<StateClass>,
    pub attributes: BTreeMap<String, String>,
    pub device: DeviceInfo,
}

impl EntitySnapshot {
    pub fn capture(entity: &impl SensorEntity) -> Self {
        Self {
            unique_id: entity.unique_id(),
            name: entity.name(),
            state: entity.state(),
            unit_of_measurement: entity.unit_of_measurement(),
            icon: entity.icon().map(str::to_owned),
            device_class: entity.device_class(),
            state_class: entity.state_class(),
            attributes: entity.extra_state_attributes().clone(),
            device: entity.device_info(),
        }
    }

    pub fn show(&self) -> String {
        format!(
            "{} \"{}\" = {}{}",
            self.unique_id,
            self.name,
            self.state,
            self.unit_of_measurement
                .filter(|_| !self.state.is_unknown())
                .map(|u| format!(" {u}"))
                .unwrap_or_default()
        )
    }
}

impl fmt::Display for EntitySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.show())
    }
}

#[cfg(test)]
use rust_decimal::dec;

#[test]
fn test_sensor_state_from_option() {
    assert_eq!(SensorState::from(None::<Decimal>), SensorState::Unknown);
    assert_eq!(
        SensorState::from(Some(Decimal::ZERO)),
        SensorState::Number(Decimal::ZERO)
    );
    assert_eq!(
        SensorState::from(Some("Charging".to_string())),
        SensorState::Text("Charging".to_string())
    );
}

#[test]
fn test_sensor_state_json() {
    let states = vec![
        SensorState::Unknown,
        SensorState::Number(dec!(1.5)),
        SensorState::Text("EV Connected".to_string()),
    ];
    let json = serde_json::to_string(&states).unwrap();
    assert_eq!(json, r#"["unknown",1.5,"EV Connected"]"#);
}

#[test]
fn test_device_info() {
    let info = DeviceInfo::new("16000001", "Garage", "Zappi");
    assert_eq!(
        info.identifiers,
        vec![("myenergi".to_string(), "16000001".to_string())]
    );
    assert_eq!(info.manufacturer, "myenergi");
    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["identifiers"][0][1], "16000001");
}
