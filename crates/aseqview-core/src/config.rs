//! Process-wide viewer configuration, fixed at startup.

use crate::error::{Error, Result};
use crate::notify::DEFAULT_CAPACITY;
use aseqview_midi::Address;
use serde::{Deserialize, Serialize};

pub const MAX_PORTS: usize = 20;

pub const DEFAULT_CLIENT_NAME: &str = "MIDI Viewer";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Number of virtual ports, 1 to [`MAX_PORTS`].
    pub ports: usize,
    /// Open the client for output and redirect events to subscribers.
    pub output: bool,
    /// Connected to port 0 as an input at startup.
    pub source: Option<Address>,
    /// Connected from port 0 at startup when output is enabled.
    pub dest: Option<Address>,
    /// Run the engine on a dedicated worker thread.
    pub threaded: bool,
    /// Request realtime scheduling for the thread running the engine.
    pub realtime: bool,
    /// Emit per-key piano notifications.
    pub show_piano: bool,
    /// Ring buffer capacity for threaded mode, a power of two.
    pub notify_capacity: usize,
    pub client_name: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            ports: 1,
            output: true,
            source: None,
            dest: None,
            threaded: true,
            realtime: false,
            show_piano: true,
            notify_capacity: DEFAULT_CAPACITY,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
        }
    }
}

impl ViewerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ports == 0 || self.ports > MAX_PORTS {
            return Err(Error::InvalidConfig(format!(
                "invalid number of ports {} (must be 1 to {})",
                self.ports, MAX_PORTS
            )));
        }
        if self.notify_capacity < 2 || !self.notify_capacity.is_power_of_two() {
            return Err(Error::InvalidConfig(format!(
                "notification capacity {} is not a power of two",
                self.notify_capacity
            )));
        }
        if self.client_name.is_empty() {
            return Err(Error::InvalidConfig("empty client name".to_string()));
        }
        Ok(())
    }

    pub fn port_name(index: usize) -> String {
        format!("Viewer Port {}", index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.notify_capacity, 512);
        assert!(config.output);
        assert!(config.threaded);
    }

    #[test]
    fn test_port_count_bounds() {
        for ports in [0, MAX_PORTS + 1] {
            let config = ViewerConfig {
                ports,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
        let config = ViewerConfig {
            ports: MAX_PORTS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_capacity_must_be_power_of_two() {
        let config = ViewerConfig {
            notify_capacity: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_port_name() {
        assert_eq!(ViewerConfig::port_name(3), "Viewer Port 3");
    }
}
