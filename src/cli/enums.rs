//! CLI enum types for driver selection.

use clap::ValueEnum;

use crate::camera::DriverKind;

/// Frame source for the capture thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DriverChoice {
    /// Generated test pattern
    #[default]
    Synthetic,
    /// USB camera
    Camera,
}

impl From<DriverChoice> for DriverKind {
    fn from(d: DriverChoice) -> Self {
        match d {
            DriverChoice::Synthetic => DriverKind::Synthetic,
            DriverChoice::Camera => DriverKind::Camera,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_choice_to_kind() {
        assert_eq!(DriverKind::from(DriverChoice::Synthetic), DriverKind::Synthetic);
        assert_eq!(DriverKind::from(DriverChoice::Camera), DriverKind::Camera);
    }
}
