use std::fmt;
use std::str::FromStr;

use crate::EmbedError;

/// Where inference runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
}

impl FromStr for Device {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("cpu") {
            Ok(Device::Cpu)
        } else {
            Err(EmbedError::UnsupportedDevice(s.to_string()))
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("CPU"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cpu_any_case() {
        assert_eq!("CPU".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!(Device::Cpu.to_string(), "CPU");
    }

    #[test]
    fn parse_unknown_device() {
        let err = "MYRIAD".parse::<Device>().unwrap_err();
        assert!(matches!(err, EmbedError::UnsupportedDevice(ref d) if d == "MYRIAD"));
    }
}
