// myenergi 機器(zappi, eddi, harvi)の状態
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;

/// 使われていないCTチャンネルの名前
pub const UNUSED_CT_NAME: &str = "None";

/// 機器の種類
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// EV充電器
    Zappi,
    /// 温水器ダイバーター
    Eddi,
    /// ワイヤレスCTセンサー
    Harvi,
}

impl DeviceKind {
    /// この種類の機器が持つCTチャンネル数
    pub const fn ct_slots(&self) -> u8 {
        match self {
            Self::Zappi => 6,
            Self::Eddi => 3,
            Self::Harvi => 3,
        }
    }

    /// ステータスと本日の積算値を報告する機器か
    pub const fn reports_status(&self) -> bool {
        matches!(self, Self::Zappi | Self::Eddi)
    }

    pub const fn model(&self) -> &'static str {
        match self {
            Self::Zappi => "Zappi",
            Self::Eddi => "Eddi",
            Self::Harvi => "Harvi",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Zappi => write!(f, "zappi"),
            Self::Eddi => write!(f, "eddi"),
            Self::Harvi => write!(f, "harvi"),
        }
    }
}

/// CTチャンネル番号(1～6)
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct CtSlot(u8);

impl CtSlot {
    pub const CT1: CtSlot = CtSlot(1);
    pub const CT2: CtSlot = CtSlot(2);
    pub const CT3: CtSlot = CtSlot(3);
    pub const CT4: CtSlot = CtSlot(4);
    pub const CT5: CtSlot = CtSlot(5);
    pub const CT6: CtSlot = CtSlot(6);

    pub fn new(number: u8) -> Option<Self> {
        (1..=6).contains(&number).then_some(Self(number))
    }

    pub const fn number(&self) -> u8 {
        self.0
    }

    const fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for CtSlot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CT{}", self.0)
    }
}

/// CTチャンネル
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct CtChannel {
    pub name: String,
    /// 瞬時電力(W)
    #[serde(default)]
    pub power: Option<Decimal>,
}

impl CtChannel {
    /// 未使用のチャンネルか
    pub fn is_unused(&self) -> bool {
        self.name.eq_ignore_ascii_case(UNUSED_CT_NAME)
    }
}

/// 機器の状態
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
pub struct Device {
    pub serial_number: String,
    pub name: String,
    pub kind: DeviceKind,
    /// CT1から順に並ぶ
    #[serde(default)]
    pub ct: Vec<CtChannel>,
    pub status: Option<String>,
    pub plug_status: Option<String>,
    /// 本日の使用電力量(Wh)
    pub energy_total: Option<Decimal>,
    /// 本日の余剰転用電力量(Wh)
    pub energy_diverted: Option<Decimal>,
    /// 今回のセッションで充電した電力量(kWh), zappiのみ
    pub charge_added: Option<Decimal>,
    /// 今回のセッションで転用した電力量(kWh), eddiのみ
    pub diverted_session: Option<Decimal>,
    /// 本日のチャンネル別積算電力量(Wh)
    #[serde(default)]
    pub history_data: BTreeMap<String, Decimal>,
}

impl Device {
    pub fn ct(&self, slot: CtSlot) -> Option<&CtChannel> {
        self.ct.get(slot.index())
    }
}

/// 機器の読み取り専用ハンドル
///
/// 値の更新はクライアント側が行う。
#[derive(Clone, Debug)]
pub struct DeviceView(watch::Receiver<Device>);

impl DeviceView {
    pub fn new(receiver: watch::Receiver<Device>) -> Self {
        Self(receiver)
    }

    /// 最新の状態を参照する
    pub fn borrow(&self) -> watch::Ref<'_, Device> {
        self.0.borrow()
    }
}

impl From<Device> for DeviceView {
    /// 更新されない固定値のハンドル
    fn from(device: Device) -> Self {
        let (_tx, rx) = watch::channel(device);
        Self(rx)
    }
}

#[cfg(test)]
use rust_decimal::dec;

#[test]
fn test_ct_slot_range() {
    assert_eq!(CtSlot::new(0), None);
    assert_eq!(CtSlot::new(1), Some(CtSlot::CT1));
    assert_eq!(CtSlot::new(6), Some(CtSlot::CT6));
    assert_eq!(CtSlot::new(7), None);
    assert_eq!(CtSlot::CT4.to_string(), "CT4");
}

#[test]
fn test_unused_ct_channel() {
    let unused = CtChannel {
        name: "None".to_string(),
        power: None,
    };
    let lowercase = CtChannel {
        name: "none".to_string(),
        power: None,
    };
    let solar = CtChannel {
        name: "Generation".to_string(),
        power: Some(dec!(1500)),
    };
    assert!(unused.is_unused());
    assert!(lowercase.is_unused());
    assert!(!solar.is_unused());
}

#[test]
fn test_device_from_toml() {
    let device: Device = toml::from_str(
        r#"
        serial_number = "16000001"
        name = "Garage"
        kind = "zappi"
        status = "Charging"
        charge_added = 3.5

        [[ct]]
        name = "Grid"
        power = -250

        [[ct]]
        name = "None"

        [history_data]
        h1d = 1200
        "#,
    )
    .unwrap();

    assert_eq!(device.kind, DeviceKind::Zappi);
    assert_eq!(device.ct(CtSlot::CT1).and_then(|ct| ct.power), Some(dec!(-250)));
    assert_eq!(device.ct(CtSlot::CT2).and_then(|ct| ct.power), None);
    assert_eq!(device.ct(CtSlot::CT3), None);
    assert_eq!(device.charge_added, Some(dec!(3.5)));
    assert_eq!(device.plug_status, None);
    assert_eq!(device.history_data.len(), 1);
}
