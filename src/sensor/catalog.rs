// ハブと機器の一覧からセンサーを並べる
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::client::{Client, DeviceScope};
use crate::myenergi::{CtGroup, CtSlot, Device, DeviceKind, DeviceView, HubView, PowerTotals};
use crate::sensor::{
    Attribute, CatalogError, DeviceAttribute, HubAttribute, ProjectionSensor, SensorDescriptor,
    Source,
};
use crate::setup::ConfigEntry;
use std::sync::LazyLock;

/// 常に作るハブのセンサー
static HUB_SENSORS: LazyLock<Vec<SensorDescriptor>> = LazyLock::new(|| {
    use HubAttribute::*;
    vec![
        SensorDescriptor::power("Power grid", Attribute::Hub(PowerGrid)),
        SensorDescriptor::energy_wh("Grid import today", Attribute::Hub(EnergyImported)),
        SensorDescriptor::energy_wh("Grid export today", Attribute::Hub(EnergyExported)),
        SensorDescriptor::energy_wh("Diverted today", Attribute::Hub(EnergyDiverted)),
        SensorDescriptor::energy_wh("Generated today", Attribute::Hub(EnergyGenerated)),
        SensorDescriptor::power("Power generation", Attribute::Hub(PowerGeneration)),
        SensorDescriptor::power("Home consumption", Attribute::Hub(ConsumptionHome)),
        SensorDescriptor::energy_wh("Green energy today", Attribute::Hub(EnergyGreen)),
        SensorDescriptor::energy_wh("Home consumption today", Attribute::Hub(EnergyConsumed)),
    ]
});

/// 計測対象のCTがあるときだけ作るハブのセンサー
const HUB_GROUP_SENSORS: [(CtGroup, &str, HubAttribute); 2] = [
    (CtGroup::Load, "Power charging", HubAttribute::PowerCharging),
    (CtGroup::Battery, "Power battery", HubAttribute::PowerBattery),
];

/// 全機器が持つCTチャンネル
const COMMON_CT_SLOTS: [CtSlot; 3] = [CtSlot::CT1, CtSlot::CT2, CtSlot::CT3];

/// zappiだけが持つCTチャンネル
const ZAPPI_EXTRA_CT_SLOTS: [CtSlot; 3] = [CtSlot::CT4, CtSlot::CT5, CtSlot::CT6];

fn ct_descriptor(device: &Device, slot: CtSlot) -> Result<SensorDescriptor, CatalogError> {
    let ct = device
        .ct(slot)
        .ok_or_else(|| CatalogError::MissingCtChannel {
            serial_number: device.serial_number.clone(),
            slot,
        })?;
    Ok(SensorDescriptor::power(
        format!("{} {}", ct.name, slot),
        Attribute::Device(DeviceAttribute::CtPower(slot)),
    ))
}

/// 機器一台分のセンサーの記述
fn device_descriptors(device: &Device) -> Result<Vec<SensorDescriptor>, CatalogError> {
    let mut descriptors = Vec::new();
    for slot in COMMON_CT_SLOTS {
        descriptors.push(ct_descriptor(device, slot)?);
    }

    if device.kind.reports_status() {
        descriptors.push(SensorDescriptor::plain(
            "Status",
            Attribute::Device(DeviceAttribute::Status),
        ));
        descriptors.push(SensorDescriptor::energy_wh(
            "Energy used today",
            Attribute::Device(DeviceAttribute::EnergyTotal),
        ));
        descriptors.push(SensorDescriptor::energy_wh(
            "Energy diverted today",
            Attribute::Device(DeviceAttribute::EnergyDiverted),
        ));
        descriptors.extend(device.history_data.keys().map(|key| SensorDescriptor::history(key)));
    }

    match device.kind {
        DeviceKind::Zappi => {
            descriptors.push(SensorDescriptor::energy_kwh(
                "Charge added session",
                Attribute::Device(DeviceAttribute::ChargeAdded),
            ));
            descriptors.push(SensorDescriptor::plain(
                "Plug status",
                Attribute::Device(DeviceAttribute::PlugStatus),
            ));
            for slot in ZAPPI_EXTRA_CT_SLOTS {
                // 欠けているチャンネルは ct_descriptor でエラーになる
                match device.ct(slot) {
                    Some(ct) if ct.is_unused() => {
                        tracing::debug!(r#"{} {} is "{}", skipped"#, device.serial_number, slot, ct.name)
                    }
                    _ => descriptors.push(ct_descriptor(device, slot)?),
                }
            }
        }
        DeviceKind::Eddi => {
            descriptors.push(SensorDescriptor::energy_kwh(
                "Energy diverted session",
                Attribute::Device(DeviceAttribute::DivertedSession),
            ));
        }
        DeviceKind::Harvi => {}
    }
    Ok(descriptors)
}

/// センサーを並べる
///
/// 並びはハブ、機器の順。計測対象のCTが無い合計や未使用のCTは飛ばす。
pub fn catalog_sensors(
    entry: &ConfigEntry,
    hub: &HubView,
    totals: &PowerTotals,
    devices: &[DeviceView],
) -> Result<Vec<ProjectionSensor>, CatalogError> {
    let mut sensors = Vec::new();

    for descriptor in HUB_SENSORS.iter() {
        sensors.push(ProjectionSensor::bind(
            entry,
            Source::Hub(hub.clone()),
            descriptor.clone(),
        )?);
    }
    for (group, display_name, attribute) in HUB_GROUP_SENSORS {
        match totals.get(group) {
            Some(_) => sensors.push(ProjectionSensor::bind(
                entry,
                Source::Hub(hub.clone()),
                SensorDescriptor::power(display_name, Attribute::Hub(attribute)),
            )?),
            None => tracing::debug!("no {:?} CT, {} skipped", group, attribute.path()),
        }
    }

    for view in devices {
        // bind が同じハンドルを借りるので、記述を作る間だけ複製を使う
        let device = view.borrow().clone();
        for descriptor in device_descriptors(&device)? {
            sensors.push(ProjectionSensor::bind(
                entry,
                Source::Device(view.clone()),
                descriptor,
            )?);
        }
    }
    Ok(sensors)
}

/// クライアントから一覧を取ってセンサーを並べる
///
/// 一覧の再取得はしない。
#[tracing::instrument(skip_all, fields(entry_id = %entry.entry_id))]
pub async fn build_catalog<C: Client>(
    client: &C,
    entry: &ConfigEntry,
) -> Result<Vec<ProjectionSensor>, CatalogError> {
    let devices = client.get_devices(DeviceScope::All, false).await?;
    let totals = client.get_power_totals();
    tracing::debug!("{} devices, totals {:?}", devices.len(), totals);
    catalog_sensors(entry, &client.hub(), &totals, &devices)
}

#[cfg(test)]
use crate::client::ClientError;
#[cfg(test)]
use crate::entity::{SensorEntity, SensorState};
#[cfg(test)]
use crate::myenergi::{CtChannel, Hub};
#[cfg(test)]
use crate::snapshot::{Snapshot, SnapshotClient};
#[cfg(test)]
use rust_decimal::{Decimal, dec};
#[cfg(test)]
use std::collections::{BTreeMap, HashSet};
#[cfg(test)]
use std::sync::Mutex;
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};

/// 呼び出しを記録するクライアント
#[cfg(test)]
struct RecordingClient {
    inner: SnapshotClient,
    trigger_refresh_args: Mutex<Vec<bool>>,
    refresh_count: AtomicUsize,
}

#[cfg(test)]
impl Client for RecordingClient {
    fn hub(&self) -> HubView {
        self.inner.hub()
    }

    async fn get_devices(
        &self,
        scope: DeviceScope,
        trigger_refresh: bool,
    ) -> Result<Vec<DeviceView>, ClientError> {
        self.trigger_refresh_args.lock().unwrap().push(trigger_refresh);
        if trigger_refresh {
            self.refresh().await?;
        }
        self.inner.get_devices(scope, false).await
    }

    fn get_power_totals(&self) -> PowerTotals {
        self.inner.get_power_totals()
    }

    async fn refresh(&self) -> Result<(), ClientError> {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
        self.inner.refresh().await
    }
}

#[cfg(test)]
fn test_entry(entry_id: &str) -> ConfigEntry {
    ConfigEntry {
        entry_id: entry_id.to_string(),
        title: "myenergi".to_string(),
    }
}

#[cfg(test)]
fn test_hub(serial_number: &str) -> Hub {
    Hub {
        serial_number: serial_number.to_string(),
        site_name: "Home".to_string(),
        power_grid: Some(dec!(-320)),
        ..Default::default()
    }
}

#[cfg(test)]
fn test_device(serial_number: &str, kind: DeviceKind, ct_names: &[&str]) -> Device {
    Device {
        serial_number: serial_number.to_string(),
        name: kind.model().to_string(),
        kind,
        ct: ct_names
            .iter()
            .map(|name| CtChannel {
                name: name.to_string(),
                power: None,
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

#[cfg(test)]
fn unique_ids(sensors: &[ProjectionSensor]) -> Vec<String> {
    sensors.iter().map(|s| s.unique_id()).collect()
}

#[tokio::test]
async fn test_build_catalog_end_to_end() {
    let mut zappi = test_device(
        "16000001",
        DeviceKind::Zappi,
        &["Grid", "Internal Load", "None", "solar", "none", "none"],
    );
    zappi.ct[1].power = Some(dec!(500));
    zappi.history_data = BTreeMap::from([
        ("h1b".to_string(), dec!(100)),
        ("h1d".to_string(), dec!(200)),
    ]);
    let client = SnapshotClient::from_snapshot(Snapshot {
        hub: test_hub("21509692"),
        devices: vec![zappi],
    });

    let sensors = build_catalog(&client, &test_entry("e1")).await.unwrap();

    let expected = [
        "power_grid",
        "energy_imported",
        "energy_exported",
        "energy_diverted",
        "energy_generated",
        "power_generation",
        "consumption_home",
        "energy_green",
        "energy_consumed",
        "power_charging",
    ]
    .iter()
    .map(|path| format!("e1-21509692-{path}"))
    .chain(
        [
            "ct1.power",
            "ct2.power",
            "ct3.power",
            "status",
            "energy_total",
            "energy_diverted",
            "h1b",
            "h1d",
            "charge_added",
            "plug_status",
            "ct4.power",
        ]
        .iter()
        .map(|path| format!("e1-16000001-{path}")),
    )
    .collect::<Vec<String>>();
    assert_eq!(unique_ids(&sensors), expected);

    let charging = &sensors[9];
    assert_eq!(charging.name(), "myenergi Home Power charging");
    let ct4 = sensors.last().unwrap();
    assert_eq!(ct4.name(), "myenergi Zappi solar CT4");
    assert_eq!(ct4.state(), SensorState::Unknown);
    assert_eq!(sensors[0].state(), SensorState::Number(dec!(-320)));
}

#[test]
fn test_hub_group_sensors_follow_totals() {
    let entry = test_entry("e1");
    let hub = HubView::from(test_hub("21509692"));
    for (load, battery) in [(false, false), (true, false), (false, true), (true, true)] {
        let totals = [
            load.then_some((CtGroup::Load, dec!(500))),
            battery.then_some((CtGroup::Battery, Decimal::ZERO)),
        ]
        .into_iter()
        .flatten()
        .collect::<PowerTotals>();

        let ids = unique_ids(&catalog_sensors(&entry, &hub, &totals, &[]).unwrap());
        assert_eq!(ids.len(), 9 + load as usize + battery as usize);
        assert_eq!(ids.contains(&"e1-21509692-power_charging".to_string()), load);
        assert_eq!(ids.contains(&"e1-21509692-power_battery".to_string()), battery);
    }
}

#[test]
fn test_zappi_extra_ct_sensors() {
    let entry = test_entry("e1");
    let hub = HubView::from(test_hub("21509692"));
    let cases: [([&str; 3], &[&str]); 4] = [
        (["None", "None", "None"], &[]),
        (["solar", "None", "None"], &["ct4.power"]),
        (["None", "Heat pump", "NONE"], &["ct5.power"]),
        (["solar", "Heat pump", "Battery"], &["ct4.power", "ct5.power", "ct6.power"]),
    ];
    for (names, expected) in cases {
        let mut ct_names = vec!["Grid", "None", "None"];
        ct_names.extend(names);
        let zappi = DeviceView::from(test_device("16000001", DeviceKind::Zappi, &ct_names));

        let sensors = catalog_sensors(&entry, &hub, &PowerTotals::default(), &[zappi]).unwrap();
        let extra = unique_ids(&sensors)
            .into_iter()
            .filter_map(|id| id.strip_prefix("e1-16000001-").map(str::to_owned))
            .filter(|path| ["ct4.power", "ct5.power", "ct6.power"].contains(&path.as_str()))
            .collect::<Vec<String>>();
        assert_eq!(extra, expected);
    }
}

#[test]
fn test_history_sensor_per_key() {
    let entry = test_entry("e1");
    let hub = HubView::from(test_hub("21509692"));
    let mut eddi = test_device("20000002", DeviceKind::Eddi, &["Grid", "None", "None"]);
    eddi.history_data = ["h1d", "h2d", "h3d"]
        .iter()
        .map(|key| (key.to_string(), Decimal::ZERO))
        .collect();
    let harvi = test_device("30000003", DeviceKind::Harvi, &["Generation", "None", "None"]);
    let devices = [DeviceView::from(eddi), DeviceView::from(harvi)];

    let sensors = catalog_sensors(&entry, &hub, &PowerTotals::default(), &devices).unwrap();
    let ids = unique_ids(&sensors);

    for key in ["h1d", "h2d", "h3d"] {
        let id = format!("e1-20000002-{key}");
        assert_eq!(ids.iter().filter(|a| **a == id).count(), 1);
    }
    assert!(ids.contains(&"e1-20000002-diverted_session".to_string()));
    // harviはCTだけ
    let harvi_ids = ids
        .iter()
        .filter(|id| id.starts_with("e1-30000003-"))
        .count();
    assert_eq!(harvi_ids, 3);
    assert_eq!(sensors.len(), 9 + 3 + 3 + 3 + 1 + 3);
}

#[test]
fn test_unique_ids_collision_free() {
    let hub1 = HubView::from(test_hub("21509692"));
    let hub2 = HubView::from(test_hub("21509693"));
    let totals = PowerTotals::from_iter([(CtGroup::Load, Decimal::ZERO)]);
    let zappis = [
        DeviceView::from(test_device("16000001", DeviceKind::Zappi, &["Grid"; 6])),
        DeviceView::from(test_device("16000002", DeviceKind::Zappi, &["Grid"; 6])),
    ];

    let mut sensors = catalog_sensors(&test_entry("e1"), &hub1, &totals, &zappis).unwrap();
    sensors.extend(catalog_sensors(&test_entry("e2"), &hub2, &totals, &[]).unwrap());

    let ids = unique_ids(&sensors);
    let distinct = ids.iter().collect::<HashSet<_>>();
    assert_eq!(distinct.len(), ids.len());

    // 作り直しても同じ識別子
    let again = catalog_sensors(&test_entry("e1"), &hub1, &totals, &zappis).unwrap();
    assert_eq!(unique_ids(&again), ids[..again.len()]);
}

#[test]
fn test_missing_ct_channel_is_error() {
    let hub = HubView::from(test_hub("21509692"));
    let harvi = DeviceView::from(test_device("30000003", DeviceKind::Harvi, &["Grid"]));
    let result = catalog_sensors(&test_entry("e1"), &hub, &PowerTotals::default(), &[harvi]);
    assert!(matches!(
        result,
        Err(CatalogError::MissingCtChannel { slot: CtSlot::CT2, .. })
    ));
}

#[test]
fn test_zappi_missing_extra_ct_channel_is_error() {
    let hub = HubView::from(test_hub("21509692"));
    // CT4以降が無い
    let zappi = DeviceView::from(test_device(
        "16000001",
        DeviceKind::Zappi,
        &["Grid", "None", "None"],
    ));
    let result = catalog_sensors(&test_entry("e1"), &hub, &PowerTotals::default(), &[zappi]);
    assert!(matches!(
        result,
        Err(CatalogError::MissingCtChannel { slot: CtSlot::CT4, .. })
    ));
}

#[tokio::test]
async fn test_build_catalog_does_not_refresh() {
    let zappi = test_device("16000001", DeviceKind::Zappi, &["Grid"; 6]);
    let client = RecordingClient {
        inner: SnapshotClient::from_snapshot(Snapshot {
            hub: test_hub("21509692"),
            devices: vec![zappi],
        }),
        trigger_refresh_args: Mutex::new(Vec::new()),
        refresh_count: AtomicUsize::new(0),
    };

    let sensors = build_catalog(&client, &test_entry("e1")).await.unwrap();

    assert!(!sensors.is_empty());
    assert_eq!(*client.trigger_refresh_args.lock().unwrap(), vec![false]);
    assert_eq!(client.refresh_count.load(Ordering::SeqCst), 0);
}
