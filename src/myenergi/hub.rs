// myenergi ハブ(サイト全体)の集計値
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::myenergi::Device;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::watch;

/// ハブの集計値
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
pub struct Hub {
    pub serial_number: String,
    pub site_name: String,
    /// 系統電力(W) 正は買電、負は売電
    pub power_grid: Option<Decimal>,
    /// 発電電力(W)
    pub power_generation: Option<Decimal>,
    /// 充電電力(W)
    pub power_charging: Option<Decimal>,
    /// 蓄電池電力(W)
    pub power_battery: Option<Decimal>,
    /// 家庭内消費電力(W)
    pub consumption_home: Option<Decimal>,
    /// 本日の買電量(Wh)
    pub energy_imported: Option<Decimal>,
    /// 本日の売電量(Wh)
    pub energy_exported: Option<Decimal>,
    /// 本日の発電量(Wh)
    pub energy_generated: Option<Decimal>,
    /// 本日の転用電力量(Wh)
    pub energy_diverted: Option<Decimal>,
    /// 本日の自家消費した発電量(Wh)
    pub energy_green: Option<Decimal>,
    /// 本日の家庭内消費電力量(Wh)
    pub energy_consumed: Option<Decimal>,
}

/// ハブの読み取り専用ハンドル
#[derive(Clone, Debug)]
pub struct HubView(watch::Receiver<Hub>);

impl HubView {
    pub fn new(receiver: watch::Receiver<Hub>) -> Self {
        Self(receiver)
    }

    /// 最新の集計値を参照する
    pub fn borrow(&self) -> watch::Ref<'_, Hub> {
        self.0.borrow()
    }
}

impl From<Hub> for HubView {
    /// 更新されない固定値のハンドル
    fn from(hub: Hub) -> Self {
        let (_tx, rx) = watch::channel(hub);
        Self(rx)
    }
}

/// CTの計測対象
#[derive(Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum CtGroup {
    Grid,
    Generation,
    Load,
    Battery,
}

impl CtGroup {
    /// CTチャンネル名から計測対象を得る
    pub fn from_ct_name(name: &str) -> Option<Self> {
        match name {
            "Grid" => Some(Self::Grid),
            "Generation" => Some(Self::Generation),
            "Internal Load" => Some(Self::Load),
            "Battery" | "Storage" => Some(Self::Battery),
            _ => None,
        }
    }
}

/// 計測対象ごとの電力合計(W)
///
/// その計測対象のCTが一つもなければ値なし。
#[derive(Clone, Eq, PartialEq, Debug, Default)]
pub struct PowerTotals(BTreeMap<CtGroup, Decimal>);

impl PowerTotals {
    pub fn get(&self, group: CtGroup) -> Option<Decimal> {
        self.0.get(&group).copied()
    }

    /// 電力を加算する
    pub fn add(&mut self, group: CtGroup, watt: Decimal) {
        *self.0.entry(group).or_default() += watt;
    }

    /// 全機器のCTを計測対象ごとに合計する
    pub fn from_devices<'a>(devices: impl IntoIterator<Item = &'a Device>) -> Self {
        let mut totals = Self::default();
        for device in devices {
            for ct in device.ct.iter() {
                if let Some(group) = CtGroup::from_ct_name(&ct.name) {
                    // 計測値なしのCTも存在はする
                    totals.add(group, ct.power.unwrap_or_default());
                }
            }
        }
        totals
    }
}

impl FromIterator<(CtGroup, Decimal)> for PowerTotals {
    fn from_iter<T: IntoIterator<Item = (CtGroup, Decimal)>>(iter: T) -> Self {
        let mut totals = Self::default();
        for (group, watt) in iter {
            totals.add(group, watt);
        }
        totals
    }
}

#[cfg(test)]
use crate::myenergi::{CtChannel, DeviceKind};
#[cfg(test)]
use rust_decimal::dec;

#[cfg(test)]
fn device_with_cts(serial: &str, cts: &[(&str, Option<i64>)]) -> Device {
    Device {
        serial_number: serial.to_string(),
        name: serial.to_string(),
        kind: DeviceKind::Harvi,
        ct: cts
            .iter()
            .map(|(name, power)| CtChannel {
                name: name.to_string(),
                power: power.map(Decimal::from),
            })
            .collect(),
        status: None,
        plug_status: None,
        energy_total: None,
        energy_diverted: None,
        charge_added: None,
        diverted_session: None,
        history_data: BTreeMap::new(),
    }
}

#[test]
fn test_power_totals_from_devices() {
    let devices = [
        device_with_cts(
            "1",
            &[("Grid", Some(300)), ("Internal Load", Some(7000)), ("None", None)],
        ),
        device_with_cts("2", &[("Grid", Some(-100)), ("Generation", Some(2500))]),
    ];
    let totals = PowerTotals::from_devices(devices.iter());

    assert_eq!(totals.get(CtGroup::Grid), Some(dec!(200)));
    assert_eq!(totals.get(CtGroup::Generation), Some(dec!(2500)));
    assert_eq!(totals.get(CtGroup::Load), Some(dec!(7000)));
    assert_eq!(totals.get(CtGroup::Battery), None);
}

#[test]
fn test_power_totals_channel_without_reading() {
    let devices = [device_with_cts("1", &[("Storage", None)])];
    let totals = PowerTotals::from_devices(devices.iter());

    assert_eq!(totals.get(CtGroup::Battery), Some(Decimal::ZERO));
    assert_eq!(totals.get(CtGroup::Load), None);
}

#[test]
fn test_hub_view_follows_sender() {
    let (tx, rx) = watch::channel(Hub::default());
    let view = HubView::new(rx);
    assert_eq!(view.borrow().power_grid, None);

    tx.send_modify(|hub| hub.power_grid = Some(dec!(450)));
    assert_eq!(view.borrow().power_grid, Some(dec!(450)));
}
