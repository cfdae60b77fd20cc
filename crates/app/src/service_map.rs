//! Human-readable dump of a connected device's GATT tree.

use std::fmt::Write as _;

use crate::ports::{BleClient, CharProperty};

/// Render every service, characteristic and descriptor of the connected
/// device, one per line.
///
/// Readable characteristics and all descriptors are read on a best-effort
/// basis: a failure is written in place of the value and rendering goes
/// on. Listing the services is the only step whose failure ends the map.
pub async fn render<C: BleClient>(client: &C, device: &str) -> String {
    let mut out = format!("MAP FOR {}", device.to_uppercase());

    let services = match client.list_services().await {
        Ok(services) => services,
        Err(err) => {
            let _ = write!(out, "\n| cannot list services: {err}");
            return out;
        }
    };

    for service in &services {
        let _ = write!(out, "\n| [Service] {}", service.uuid);
        for characteristic in &service.characteristics {
            let properties = characteristic
                .properties
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(",");
            let value = if characteristic.has(CharProperty::Read) {
                match client.read_characteristic(characteristic.uuid).await {
                    Ok(bytes) => format!("{bytes:02x?}"),
                    Err(err) => err.to_string(),
                }
            } else {
                "None".to_owned()
            };
            let _ = write!(
                out,
                "\n| \t[Characteristic] {} ({properties}), Value: {value}",
                characteristic.uuid
            );

            for descriptor in &characteristic.descriptors {
                let value = match client.read_descriptor(descriptor.handle).await {
                    Ok(bytes) => format!("{bytes:02x?}"),
                    Err(err) => err.to_string(),
                };
                let _ = write!(
                    out,
                    "\n| \t\t[Descriptor] {} | Value: {value}",
                    descriptor.uuid
                );
            }
        }
    }

    out
}
