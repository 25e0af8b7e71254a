// ハブや機器の属性をそのまま見せるセンサー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::entity::{DeviceClass, DeviceInfo, SensorEntity, SensorState, StateClass};
use crate::myenergi::{Device, DeviceView, HubView};
use crate::sensor::{Attribute, CatalogError, DeviceAttribute, SensorDescriptor};
use crate::setup::ConfigEntry;
use std::collections::BTreeMap;

/// 値を読む相手
#[derive(Clone, Debug)]
pub enum Source {
    Hub(HubView),
    Device(DeviceView),
}

/// 投影センサー
///
/// 値は保持せず、読まれるたびに相手の最新状態から引く。
#[derive(Clone, Debug)]
pub struct ProjectionSensor {
    descriptor: SensorDescriptor,
    source: Source,
    entry_id: String,
    source_serial: String,
}

impl ProjectionSensor {
    /// 記述と読む相手を結びつける
    ///
    /// 相手が持たない属性はここでエラーにする。
    pub fn bind(
        entry: &ConfigEntry,
        source: Source,
        descriptor: SensorDescriptor,
    ) -> Result<Self, CatalogError> {
        let source_serial = match (&source, &descriptor.attribute) {
            (Source::Hub(hub), Attribute::Hub(_)) => hub.borrow().serial_number.clone(),
            (Source::Device(device), Attribute::Device(attribute)) => {
                let device = device.borrow();
                validate_device_attribute(&device, attribute)?;
                device.serial_number.clone()
            }
            (Source::Device(device), Attribute::History(key)) => {
                let device = device.borrow();
                if !device.kind.reports_status() {
                    return Err(CatalogError::UnsupportedAttribute {
                        serial_number: device.serial_number.clone(),
                        kind: device.kind,
                        attribute: key.clone(),
                    });
                }
                device.serial_number.clone()
            }
            (_, attribute) => {
                return Err(CatalogError::SourceMismatch {
                    attribute: attribute.path().into_owned(),
                });
            }
        };
        Ok(Self {
            descriptor,
            source,
            entry_id: entry.entry_id.clone(),
            source_serial,
        })
    }
}

fn validate_device_attribute(
    device: &Device,
    attribute: &DeviceAttribute,
) -> Result<(), CatalogError> {
    if !attribute.supported_by(device.kind) {
        return Err(CatalogError::UnsupportedAttribute {
            serial_number: device.serial_number.clone(),
            kind: device.kind,
            attribute: attribute.path().into_owned(),
        });
    }
    if let DeviceAttribute::CtPower(slot) = attribute {
        if device.ct(*slot).is_none() {
            return Err(CatalogError::MissingCtChannel {
                serial_number: device.serial_number.clone(),
                slot: *slot,
            });
        }
    }
    Ok(())
}

impl SensorEntity for ProjectionSensor {
    fn unique_id(&self) -> String {
        format!(
            "{}-{}-{}",
            self.entry_id,
            self.source_serial,
            self.descriptor.attribute.path()
        )
    }

    fn name(&self) -> String {
        match &self.source {
            Source::Hub(hub) => format!(
                "myenergi {} {}",
                hub.borrow().site_name,
                self.descriptor.display_name
            ),
            Source::Device(device) => format!(
                "myenergi {} {}",
                device.borrow().name,
                self.descriptor.display_name
            ),
        }
    }

    fn state(&self) -> SensorState {
        match (&self.source, &self.descriptor.attribute) {
            (Source::Hub(hub), Attribute::Hub(attribute)) => attribute.read(&hub.borrow()),
            (Source::Device(device), Attribute::Device(attribute)) => {
                attribute.read(&device.borrow())
            }
            (Source::Device(device), Attribute::History(key)) => {
                SensorState::from(device.borrow().history_data.get(key).copied())
            }
            // bind で弾いている
            _ => SensorState::Unknown,
        }
    }

    fn unit_of_measurement(&self) -> Option<&'static str> {
        self.descriptor.measurement.unit()
    }

    fn icon(&self) -> Option<&str> {
        self.descriptor.icon.as_deref()
    }

    fn device_class(&self) -> Option<DeviceClass> {
        self.descriptor.measurement.device_class()
    }

    fn state_class(&self) -> Option<StateClass> {
        self.descriptor.measurement.state_class()
    }

    fn extra_state_attributes(&self) -> &BTreeMap<String, String> {
        &self.descriptor.extra_attributes
    }

    fn device_info(&self) -> DeviceInfo {
        match &self.source {
            Source::Hub(hub) => DeviceInfo::new(
                &self.source_serial,
                format!("myenergi {}", hub.borrow().site_name),
                "Hub",
            ),
            Source::Device(device) => {
                let device = device.borrow();
                DeviceInfo::new(&self.source_serial, device.name.clone(), device.kind.model())
            }
        }
    }
}

#[cfg(test)]
use crate::myenergi::{CtChannel, CtSlot, DeviceKind, Hub};
#[cfg(test)]
use crate::sensor::HubAttribute;
#[cfg(test)]
use rust_decimal::dec;
#[cfg(test)]
use tokio::sync::watch;

#[cfg(test)]
fn test_entry() -> ConfigEntry {
    ConfigEntry {
        entry_id: "entry1".to_string(),
        title: "myenergi".to_string(),
    }
}

#[cfg(test)]
fn test_eddi() -> Device {
    Device {
        serial_number: "20000002".to_string(),
        name: "Eddi".to_string(),
        kind: DeviceKind::Eddi,
        ct: vec![
            CtChannel {
                name: "Grid".to_string(),
                power: Some(dec!(120)),
            },
            CtChannel {
                name: "Generation".to_string(),
                power: None,
            },
            CtChannel {
                name: "None".to_string(),
                power: None,
            },
        ],
        status: Some("Diverting".to_string()),
        plug_status: None,
        energy_total: Some(dec!(3400)),
        energy_diverted: None,
        charge_added: None,
        diverted_session: Some(dec!(1.2)),
        history_data: BTreeMap::from([("h1d".to_string(), dec!(800))]),
    }
}

#[test]
fn test_hub_sensor_properties() {
    let hub = HubView::from(Hub {
        serial_number: "21509692".to_string(),
        site_name: "Home".to_string(),
        power_grid: Some(dec!(250)),
        ..Default::default()
    });
    let sensor = ProjectionSensor::bind(
        &test_entry(),
        Source::Hub(hub),
        SensorDescriptor::power("Power grid", Attribute::Hub(HubAttribute::PowerGrid)),
    )
    .unwrap();

    assert_eq!(sensor.unique_id(), "entry1-21509692-power_grid");
    assert_eq!(sensor.name(), "myenergi Home Power grid");
    assert_eq!(sensor.state(), SensorState::Number(dec!(250)));
    assert_eq!(sensor.unit_of_measurement(), Some("W"));
    assert_eq!(sensor.icon(), Some("mdi:flash"));
    assert_eq!(sensor.device_class(), Some(DeviceClass::Power));
    assert_eq!(sensor.state_class(), Some(StateClass::Measurement));
    assert_eq!(sensor.device_info().model, "Hub");
    assert_eq!(sensor.device_info().name, "myenergi Home");
}

#[test]
fn test_device_sensor_unknown_instead_of_zero() {
    let eddi = DeviceView::from(test_eddi());
    let entry = test_entry();
    let diverted = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi.clone()),
        SensorDescriptor::energy_wh(
            "Energy diverted today",
            Attribute::Device(DeviceAttribute::EnergyDiverted),
        ),
    )
    .unwrap();
    let ct2 = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi),
        SensorDescriptor::power(
            "Generation CT2",
            Attribute::Device(DeviceAttribute::CtPower(CtSlot::CT2)),
        ),
    )
    .unwrap();

    assert_eq!(diverted.state(), SensorState::Unknown);
    assert_eq!(ct2.state(), SensorState::Unknown);
    assert_eq!(ct2.unique_id(), "entry1-20000002-ct2.power");
    assert_eq!(ct2.name(), "myenergi Eddi Generation CT2");
}

#[test]
fn test_history_sensor() {
    let eddi = DeviceView::from(test_eddi());
    let entry = test_entry();
    let h1d = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi.clone()),
        SensorDescriptor::history("h1d"),
    )
    .unwrap();
    let h2d = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi),
        SensorDescriptor::history("h2d"),
    )
    .unwrap();

    assert_eq!(h1d.state(), SensorState::Number(dec!(800)));
    assert_eq!(h1d.unit_of_measurement(), Some("Wh"));
    assert_eq!(h1d.state_class(), Some(StateClass::TotalIncreasing));
    assert_eq!(h1d.unique_id(), "entry1-20000002-h1d");
    assert_eq!(h1d.name(), "myenergi Eddi h1d today");
    // 構築後にキーが消えても値なしになるだけ
    assert_eq!(h2d.state(), SensorState::Unknown);
}

#[test]
fn test_state_follows_live_source() {
    let (tx, rx) = watch::channel(test_eddi());
    let sensor = ProjectionSensor::bind(
        &test_entry(),
        Source::Device(DeviceView::new(rx)),
        SensorDescriptor::plain("Status", Attribute::Device(DeviceAttribute::Status)),
    )
    .unwrap();
    assert_eq!(sensor.state(), SensorState::Text("Diverting".to_string()));

    tx.send_modify(|device| device.status = None);
    assert_eq!(sensor.state(), SensorState::Unknown);

    tx.send_modify(|device| {
        device.status = Some("Boosting".to_string());
        device.name = "Hot water".to_string();
    });
    assert_eq!(sensor.state(), SensorState::Text("Boosting".to_string()));
    assert_eq!(sensor.name(), "myenergi Hot water Status");
    // 識別子は変わらない
    assert_eq!(sensor.unique_id(), "entry1-20000002-status");
}

#[test]
fn test_bind_rejects_schema_mismatch() {
    let entry = test_entry();
    let eddi = DeviceView::from(test_eddi());

    let result = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi.clone()),
        SensorDescriptor::energy_kwh(
            "Charge added session",
            Attribute::Device(DeviceAttribute::ChargeAdded),
        ),
    );
    assert!(matches!(
        result,
        Err(CatalogError::UnsupportedAttribute { ref attribute, .. }) if attribute == "charge_added"
    ));

    let result = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi.clone()),
        SensorDescriptor::power("CT4", Attribute::Device(DeviceAttribute::CtPower(CtSlot::CT4))),
    );
    assert!(matches!(result, Err(CatalogError::UnsupportedAttribute { .. })));

    let result = ProjectionSensor::bind(
        &entry,
        Source::Device(eddi),
        SensorDescriptor::power("Power grid", Attribute::Hub(HubAttribute::PowerGrid)),
    );
    assert!(matches!(result, Err(CatalogError::SourceMismatch { .. })));

    let hub = HubView::from(Hub::default());
    let result = ProjectionSensor::bind(
        &entry,
        Source::Hub(hub),
        SensorDescriptor::history("h1d"),
    );
    assert!(matches!(result, Err(CatalogError::SourceMismatch { .. })));
}

#[test]
fn test_bind_rejects_missing_ct_channel() {
    let mut eddi = test_eddi();
    eddi.ct.truncate(2);
    let result = ProjectionSensor::bind(
        &test_entry(),
        Source::Device(DeviceView::from(eddi)),
        SensorDescriptor::power("CT3", Attribute::Device(DeviceAttribute::CtPower(CtSlot::CT3))),
    );
    assert!(matches!(
        result,
        Err(CatalogError::MissingCtChannel { slot: CtSlot::CT3, .. })
    ));
}
