// センサー構築時のエラー
// SPDX-License-Identifier: MPL-2.0
// SPDX-FileCopyrightText: 2025 Akihiro Yamamoto <github.com/ak1211>
//
use crate::client::ClientError;
use crate::myenergi::{CtSlot, DeviceKind};
use thiserror::Error;

/// 属性が無いのは「値なし」ではなく構成の誤り。
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("client {0}")]
    Client(#[from] ClientError),

    #[error(r#"attribute "{attribute}" does not match its source"#)]
    SourceMismatch { attribute: String },

    #[error(r#"device {serial_number} ({kind}) has no attribute "{attribute}""#)]
    UnsupportedAttribute {
        serial_number: String,
        kind: DeviceKind,
        attribute: String,
    },

    #[error("device {serial_number} has no {slot} channel")]
    MissingCtChannel {
        serial_number: String,
        slot: CtSlot,
    },
}
