use crate::error::AgentError;
use powerfly_core::MissionConfig;
use powerfly_link::VehicleConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Offset of the SITL serial port an agent attaches to, above its instance's base port.
const SITL_PORT_OFFSET: u16 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub link: LinkConfig,
    pub network: NetworkConfig,
    pub mission: MissionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Base TCP port of SITL instance 0.
    pub sitl_base_port: u16,
    /// Used by instance 0.
    pub serial_port: String,
    pub baud_rate: u32,
    pub reconnect_delay_s: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sitl_base_port: 5760,
            serial_port: "/dev/ttyACM0".to_string(),
            baud_rate: 57600,
            reconnect_delay_s: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub host: String,
    /// Base port of the peer channel; each instance adds ten times its id.
    pub net_port: u16,
    /// Port of the power-measurement device.
    pub power_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            net_port: 15000,
            power_port: 13000,
        }
    }
}

impl AgentConfig {
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let text = std::fs::read_to_string(path).map_err(|source| AgentError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, AgentError> {
        let config: AgentConfig = toml::from_str(text)?;
        config.mission.validate()?;
        Ok(config)
    }

    /// MAVLink address of the vehicle. Instance 0 is the serial-attached vehicle,
    /// any other id a local SITL instance.
    pub fn vehicle_address(&self, instance: u8) -> Result<String, AgentError> {
        if instance == 0 {
            return Ok(format!("serial:{}:{}", self.link.serial_port, self.link.baud_rate));
        }
        let port = instance_port(self.link.sitl_base_port, instance, SITL_PORT_OFFSET)?;
        Ok(format!("tcpout:{}:{port}", self.network.host))
    }

    pub fn peer_address(&self, instance: u8) -> Result<String, AgentError> {
        let port = instance_port(self.network.net_port, instance, 0)?;
        Ok(format!("{}:{port}", self.network.host))
    }

    pub fn power_address(&self) -> String {
        format!("{}:{}", self.network.host, self.network.power_port)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.link.reconnect_delay_s.max(0.0))
    }

    /// Link settings that stream telemetry at the tick rate.
    pub fn vehicle_config(&self) -> VehicleConfig {
        VehicleConfig {
            telemetry_rate_hz: 1.0 / self.mission.tick_period_s,
            ..VehicleConfig::default()
        }
    }
}

/// `10 * instance + base + offset`, rejected when it does not fit a port number.
fn instance_port(base: u16, instance: u8, offset: u16) -> Result<u16, AgentError> {
    10u16
        .checked_mul(u16::from(instance))
        .and_then(|port| port.checked_add(base))
        .and_then(|port| port.checked_add(offset))
        .ok_or(AgentError::PortOutOfRange { base, instance })
}
