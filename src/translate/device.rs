use std::{fmt, str::FromStr};

use camino::Utf8Path;
use color_eyre::{eyre::eyre, Report, Section};

const NVIDIA_DEVICE_NODE: &str = "/dev/nvidia0";

/// Where the model runner should place the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    /// First accelerator if one is present, otherwise the CPU.
    #[default]
    Auto,
    Cpu,
    Cuda(u32),
}

impl Device {
    pub fn resolve(self) -> Device {
        self.resolve_with(Utf8Path::new(NVIDIA_DEVICE_NODE))
    }

    fn resolve_with(self, accelerator_node: &Utf8Path) -> Device {
        match self {
            Device::Auto if accelerator_node.exists() => Device::Cuda(0),
            Device::Auto => Device::Cpu,
            explicit => explicit,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => f.write_str("auto"),
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

impl FromStr for Device {
    type Err = Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "auto" => return Ok(Device::Auto),
            "cpu" => return Ok(Device::Cpu),
            "cuda" | "gpu" => return Ok(Device::Cuda(0)),
            _ => {}
        }
        s.strip_prefix("cuda:")
            .and_then(|index| index.parse().ok())
            .map(Device::Cuda)
            .ok_or_else(|| {
                eyre!("unknown compute device {s:?}")
                    .suggestion("use one of auto, cpu, cuda or cuda:<index>")
            })
    }
}
