// SPDX-FileCopyrightText: 2023 Jade Lovelace
//
// SPDX-License-Identifier: MPL-2.0

use std::{convert::Infallible, fmt, str::FromStr};

use crate::Error;

/// Snapshot length used when nothing else is asked for.
pub const DEFAULT_SNAPLEN: usize = 65536;

/// Which interface(s) to capture from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceSelector {
    /// Every interface; the kernel interface index 0.
    Any,
    Named(String),
}

impl From<&str> for InterfaceSelector {
    fn from(s: &str) -> Self {
        if s == "any" {
            InterfaceSelector::Any
        } else {
            InterfaceSelector::Named(s.to_owned())
        }
    }
}

impl FromStr for InterfaceSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.into())
    }
}

impl fmt::Display for InterfaceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceSelector::Any => write!(f, "any"),
            InterfaceSelector::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CaptureConfig {
    interface: InterfaceSelector,
    snaplen: usize,
}

impl CaptureConfig {
    /// `snaplen` must be nonzero and fit in the 32 bit header field.
    pub fn new(interface: InterfaceSelector, snaplen: usize) -> Result<Self, Error> {
        if snaplen == 0 {
            return Err(Error::Config("snapshot length must be nonzero".into()));
        }
        if u32::try_from(snaplen).is_err() {
            return Err(Error::Config(format!(
                "snapshot length {snaplen} does not fit in 32 bits"
            )));
        }
        Ok(Self { interface, snaplen })
    }

    pub fn interface(&self) -> &InterfaceSelector {
        &self.interface
    }

    pub fn snaplen(&self) -> usize {
        self.snaplen
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_interface_parse() {
        assert_eq!("any".parse::<InterfaceSelector>(), Ok(InterfaceSelector::Any));
        assert_eq!(
            "eth0".parse::<InterfaceSelector>(),
            Ok(InterfaceSelector::Named("eth0".to_owned()))
        );
        // only the exact spelling means all interfaces
        assert_eq!(
            "ANY".parse::<InterfaceSelector>(),
            Ok(InterfaceSelector::Named("ANY".to_owned()))
        );
    }

    #[test]
    fn test_snaplen_bounds() {
        assert!(matches!(
            CaptureConfig::new(InterfaceSelector::Any, 0),
            Err(Error::Config(_))
        ));
        assert!(CaptureConfig::new(InterfaceSelector::Any, 1).is_ok());
        assert!(CaptureConfig::new(InterfaceSelector::Any, u32::MAX as usize).is_ok());

        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            CaptureConfig::new(InterfaceSelector::Any, u32::MAX as usize + 1),
            Err(Error::Config(_))
        ));
    }
}
