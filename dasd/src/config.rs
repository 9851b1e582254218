//! Controller configuration: which drives are attached to which
//! addresses.
use serde::Deserialize;

use base::geometry::DriveType;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnitConfiguration {
    pub address: u8,
    pub drive_type: DriveType,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControllerConfiguration {
    pub device_address: u8,
    #[serde(default)]
    pub units: Vec<UnitConfiguration>,
}

pub const DEFAULT_DEVICE_ADDRESS: u8 = 0x80;
pub const DEFAULT_UNIT_COUNT: u8 = 8;

impl Default for ControllerConfiguration {
    /// A controller at 0x80 with eight 2314 drives at 0x80-0x87.
    fn default() -> ControllerConfiguration {
        ControllerConfiguration {
            device_address: DEFAULT_DEVICE_ADDRESS,
            units: (0..DEFAULT_UNIT_COUNT)
                .map(|n| UnitConfiguration {
                    address: DEFAULT_DEVICE_ADDRESS + n,
                    drive_type: DriveType::Ibm2314,
                })
                .collect(),
        }
    }
}

#[test]
fn test_default_configuration() {
    let config = ControllerConfiguration::default();
    assert_eq!(config.device_address, 0x80);
    let addresses: Vec<u8> = config.units.iter().map(|u| u.address).collect();
    assert_eq!(addresses, (0x80..=0x87).collect::<Vec<u8>>());
    assert!(config
        .units
        .iter()
        .all(|u| u.drive_type == DriveType::Ibm2314));
}
