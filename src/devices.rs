/* src/devices.rs */
//! Device enumeration: the two CPU backends followed by every accelerator platform.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use serde::Serialize;

use crate::accel;
use crate::backend::{BackendId, CPU_CLOSED_FORM_NAME, CPU_SEARCH_NAME};
use crate::error::{DectError, Result};

/// One selectable device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceEntry {
    /// Identifier accepted by `--device`.
    pub id: u32,
    /// Display name.
    pub name: String,
}

/// Number of selectable devices.
pub fn device_count() -> usize {
    BackendId::CPU_DEVICES as usize + accel::platforms().len()
}

/// Display name of device `idx`.
pub fn device_name(idx: usize) -> Result<String> {
    match idx {
        0 => Ok(CPU_SEARCH_NAME.to_string()),
        1 => Ok(CPU_CLOSED_FORM_NAME.to_string()),
        k => accel::platforms()
            .get(k - BackendId::CPU_DEVICES as usize)
            .map(|p| p.name.clone())
            .ok_or_else(|| {
                DectError::input(format!("device {idx} out of range (have {})", device_count()))
            }),
    }
}

/// Every device, in id order.
pub fn list_devices() -> Vec<DeviceEntry> {
    (0..device_count())
        .filter_map(|idx| {
            let name = device_name(idx).ok()?;
            Some(DeviceEntry { id: u32::try_from(idx).ok()?, name })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_devices_always_present() {
        assert!(device_count() >= 2);
        assert_eq!(device_name(0).unwrap(), "CPU");
        assert_eq!(
            device_name(1).unwrap(),
            "CPU using simultaneous equations (fast but inaccurate)"
        );
        let all = list_devices();
        assert_eq!(all.len(), device_count());
        assert_eq!(all[1].id, 1);
    }

    #[test]
    fn test_out_of_range_device() {
        let err = device_name(device_count()).unwrap_err();
        assert!(matches!(err, DectError::InputContract { .. }));
    }
}
