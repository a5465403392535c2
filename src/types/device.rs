//! Device metadata

use serde::{Deserialize, Serialize};

/// Identifying metadata, read once on the first session.
///
/// Every field is optional: metadata is diagnostic only and a failed read
/// never blocks streaming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: Option<String>,
    pub mac: Option<String>,
    pub imsi: Option<String>,
    /// 5G NR band code as displayed by the device (without the `n` prefix)
    pub band: Option<String>,
}

impl DeviceInfo {
    /// Band in 3GPP notation, e.g. `n78`.
    pub fn band_label(&self) -> Option<String> {
        self.band.as_ref().map(|code| format!("n{code}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_label() {
        let info = DeviceInfo {
            band: Some("78".to_string()),
            ..Default::default()
        };
        assert_eq!(info.band_label().as_deref(), Some("n78"));
        assert_eq!(DeviceInfo::default().band_label(), None);
    }
}
