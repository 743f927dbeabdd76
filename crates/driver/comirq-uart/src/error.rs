//! Driver error types.

use core::fmt;

/// Errors returned by [`UartDriver`](crate::UartDriver) operations.
///
/// The interrupt path never produces errors; these only come from mainline
/// calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The driver is not in a valid state for this operation.
    InvalidState,
    /// Nothing answered the loopback probe at the configured base port.
    DeviceNotFound,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidState => f.write_str("invalid driver state"),
            Self::DeviceNotFound => f.write_str("device not found"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_variants() {
        assert_eq!(format!("{}", DriverError::InvalidState), "invalid driver state");
        assert_eq!(format!("{}", DriverError::DeviceNotFound), "device not found");
    }
}
