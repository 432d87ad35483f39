//! Platform error types.

use super::WakeTrigger;
use std::fmt;

/// Result type for platform operations.
pub type Result<T> = core::result::Result<T, PlatformError>;

/// Platform-level errors.
///
/// Board implementations map their driver errors to these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// Radio driver rejected an operation.
    Radio(String),
    /// A credential does not fit the driver's fixed-size buffers.
    CredentialTooLong,
    /// Sleep or wake-source configuration failed.
    Sleep(String),
    /// GPIO configuration failed.
    Gpio { pin: u8, reason: String },
    /// The board cannot wake on this trigger for this pin.
    UnsupportedTrigger { pin: u8, trigger: WakeTrigger },
    /// Time sync could not be started.
    TimeSync(String),
    /// The settings store could not be opened.
    Storage(String),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio(msg) => write!(f, "radio error: {}", msg),
            Self::CredentialTooLong => write!(f, "credential too long for driver"),
            Self::Sleep(msg) => write!(f, "sleep error: {}", msg),
            Self::Gpio { pin, reason } => write!(f, "GPIO{} error: {}", pin, reason),
            Self::UnsupportedTrigger { pin, trigger } => {
                write!(f, "GPIO{} cannot wake on {:?}", pin, trigger)
            }
            Self::TimeSync(msg) => write!(f, "time sync error: {}", msg),
            Self::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for PlatformError {}
