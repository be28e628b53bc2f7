//! Builder for configuring and constructing a [`Viewer`].

use crate::viewer::Viewer;
use crate::Result;
use aseqview_core::ViewerConfig;
use aseqview_midi::{Address, PortCaps, PortId, Transport};
use tracing::debug;

/// Everything is checked in [`build_with`](Self::build_with) before the
/// transport is opened, so a bad configuration never touches the bus.
///
/// # Example
///
/// ```ignore
/// use aseqview::prelude::*;
///
/// let viewer = ViewerBuilder::new()
///     .ports(2)
///     .source("20:0")
///     .build_with(|duplex| Ok(LoopbackTransport::open(duplex)))?;
/// let mut session = viewer.start(RecordingDisplay::new())?;
/// session.idle();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ViewerBuilder {
    config: ViewerConfig,
    source: Option<String>,
    dest: Option<String>,
}

impl ViewerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration. Addresses set later override it.
    pub fn from_config(config: ViewerConfig) -> Self {
        Self {
            config,
            source: None,
            dest: None,
        }
    }

    /// Default: 1
    pub fn ports(mut self, count: usize) -> Self {
        self.config.ports = count;
        self
    }

    /// Default: true
    pub fn output(mut self, enabled: bool) -> Self {
        self.config.output = enabled;
        self
    }

    /// `client:port`, `client.port` or `subscribers`.
    pub fn source(mut self, addr: &str) -> Self {
        self.source = Some(addr.to_string());
        self
    }

    pub fn dest(mut self, addr: &str) -> Self {
        self.dest = Some(addr.to_string());
        self
    }

    /// Default: true
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.config.threaded = threaded;
        self
    }

    /// Default: false
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.config.realtime = realtime;
        self
    }

    /// Default: true
    pub fn show_piano(mut self, show: bool) -> Self {
        self.config.show_piano = show;
        self
    }

    /// Default: 512
    pub fn notify_capacity(mut self, capacity: usize) -> Self {
        self.config.notify_capacity = capacity;
        self
    }

    pub fn client_name(mut self, name: &str) -> Self {
        self.config.client_name = name.to_string();
        self
    }

    /// The resolved configuration, without validation.
    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Validates, then calls `open` with whether output is enabled and
    /// attaches the configured ports.
    pub fn build_with<T, F>(self, open: F) -> Result<Viewer<T>>
    where
        T: Transport + 'static,
        F: FnOnce(bool) -> Result<T>,
    {
        let mut config = self.config;
        if let Some(source) = self.source {
            config.source = Some(source.parse::<Address>()?);
        }
        if let Some(dest) = self.dest {
            config.dest = Some(dest.parse::<Address>()?);
        }
        config.validate()?;

        let mut transport = open(config.output)?;
        let caps = if config.output {
            PortCaps::DUPLEX
        } else {
            PortCaps::INPUT
        };
        let ports = (0..config.ports)
            .map(|i| transport.attach_port(&ViewerConfig::port_name(i), caps))
            .collect::<aseqview_midi::Result<Vec<PortId>>>()?;
        debug!(
            "Client {} attached {} port(s)",
            transport.client_id(),
            ports.len()
        );

        Ok(Viewer::from_parts(config, transport, ports))
    }

    /// Opens the system sequencer through midir.
    #[cfg(all(feature = "midi-io", unix))]
    pub fn build(self) -> Result<Viewer<aseqview_midi::MidirTransport>> {
        let name = self.config.client_name.clone();
        self.build_with(|duplex| Ok(aseqview_midi::MidirTransport::open(&name, duplex)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use aseqview_midi::LoopbackTransport;

    fn open_loopback(duplex: bool) -> Result<LoopbackTransport> {
        Ok(LoopbackTransport::open(duplex))
    }

    #[test]
    fn test_defaults_match_config() {
        let builder = ViewerBuilder::default();
        assert_eq!(builder.config(), &ViewerConfig::default());
    }

    #[test]
    fn test_rejects_port_counts_before_opening() {
        for ports in [0, 21] {
            let mut opened = false;
            let result = ViewerBuilder::default().ports(ports).build_with(|duplex| {
                opened = true;
                open_loopback(duplex)
            });
            assert!(matches!(
                result,
                Err(Error::Core(aseqview_core::Error::InvalidConfig(_)))
            ));
            assert!(!opened);
        }
    }

    #[test]
    fn test_rejects_bad_address() {
        let result = ViewerBuilder::default()
            .source("nowhere")
            .build_with(open_loopback);
        assert!(matches!(
            result,
            Err(Error::Midi(aseqview_midi::Error::InvalidAddress(_)))
        ));
    }

    #[test]
    fn test_attaches_named_ports() {
        let viewer = ViewerBuilder::default()
            .ports(3)
            .source("64:0")
            .dest("s")
            .build_with(open_loopback)
            .unwrap();
        assert_eq!(viewer.ports().len(), 3);
        assert_eq!(viewer.config().source, Some(Address::new(64, 0)));
        assert_eq!(viewer.config().dest, Some(Address::Subscribers));
        assert_eq!(
            viewer.transport().handle().port_names(),
            vec!["Viewer Port 0", "Viewer Port 1", "Viewer Port 2"]
        );
    }

    #[test]
    fn test_input_only_opens_simplex() {
        let viewer = ViewerBuilder::default()
            .output(false)
            .build_with(open_loopback)
            .unwrap();
        assert!(!viewer.transport().is_duplex());
    }
}
