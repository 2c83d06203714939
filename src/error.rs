/// Crate-wide error type for the startup path and the gift service.
///
/// Per-connection failures on the event loop's hot path (malformed records, failed party
/// validation) are not represented here — they are accumulated as `Vec<String>` or surfaced
/// as a disconnect reason, never as a typed error, since they never cross a thread boundary.
#[derive(Debug)]
pub enum CableClubError {
    IoError(std::io::Error),
    /// Something failed during process start up, before the event loop can run.
    StartupError(String),
    ConfigError(String),
    /// A required species data file was missing or unparsable.
    SpeciesFileError(String),
    /// A gift file failed to parse; the gift service logs and skips it rather than failing.
    GiftFileError(String),
    AddrParseError(std::net::AddrParseError),
}

impl std::fmt::Display for CableClubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CableClubError::IoError(err) => write!(f, "I/O error: {err}"),
            CableClubError::StartupError(err) => write!(f, "startup error: {err}"),
            CableClubError::ConfigError(err) => write!(f, "config error: {err}"),
            CableClubError::SpeciesFileError(err) => write!(f, "species data error: {err}"),
            CableClubError::GiftFileError(err) => write!(f, "gift file error: {err}"),
            CableClubError::AddrParseError(err) => write!(f, "invalid address: {err}"),
        }
    }
}

impl std::error::Error for CableClubError {}

impl From<std::io::Error> for CableClubError {
    fn from(error: std::io::Error) -> Self {
        CableClubError::IoError(error)
    }
}

impl From<config::ConfigError> for CableClubError {
    fn from(error: config::ConfigError) -> Self {
        CableClubError::ConfigError(error.to_string())
    }
}

impl From<std::net::AddrParseError> for CableClubError {
    fn from(error: std::net::AddrParseError) -> Self {
        CableClubError::AddrParseError(error)
    }
}

impl From<CableClubError> for std::io::Error {
    fn from(error: CableClubError) -> Self {
        match error {
            CableClubError::IoError(err) => err,
            other => std::io::Error::other(other.to_string()),
        }
    }
}
