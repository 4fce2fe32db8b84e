use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("failed to read {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration file: {0}")]
    ParseConfig(#[from] toml::de::Error),
    #[error("port for instance {instance} above base port {base} is out of range")]
    PortOutOfRange { base: u16, instance: u8 },
    #[error("invalid mission constants: {0}")]
    Mission(#[from] powerfly_core::ConfigError),
    #[error("vehicle link: {0}")]
    Link(#[from] powerfly_link::VehicleError),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
}
