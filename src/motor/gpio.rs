// GPIO output lines for the motor bridges
//
// Lines are requested by offset from a GPIO character device (/dev/gpiochipN)
// as outputs with an initial level of 0.

use gpiod::{Chip, Lines, Options, Output};
use tracing::{debug, info};

/// Consumer label shown by gpioinfo for lines we hold
pub const CONSUMER: &str = "sanhum-runtime";

/// Error types for GPIO line access
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("GPIO chip {chip}: {source}")]
    Chip {
        chip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} request failed: {source}")]
    Request {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("GPIO {pin} write failed: {source}")]
    Write {
        pin: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start PWM thread: {0}")]
    PwmThread(#[source] std::io::Error),
}

/// A single binary output line
pub trait OutputLine: Send {
    fn set(&mut self, high: bool) -> Result<(), LineError>;
}

/// An opened GPIO character device
pub struct GpioChip {
    name: String,
    chip: Chip,
}

impl GpioChip {
    /// Open a chip by name ("gpiochip0") or device path
    pub fn open(name: &str) -> Result<Self, LineError> {
        let chip = Chip::new(name).map_err(|source| LineError::Chip {
            chip: name.to_string(),
            source,
        })?;
        info!("Opened GPIO chip {}", name);
        Ok(Self {
            name: name.to_string(),
            chip,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request one line as an output driven low
    pub fn output(&self, pin: u32) -> Result<ChipLine, LineError> {
        let opts = Options::output([pin]).values([false]).consumer(CONSUMER);
        let lines = self
            .chip
            .request_lines(opts)
            .map_err(|source| LineError::Request { pin, source })?;
        debug!("GPIO {}/{} configured as output", self.name, pin);
        Ok(ChipLine { pin, lines })
    }
}

/// One requested output line; released back to the kernel on drop
pub struct ChipLine {
    pin: u32,
    lines: Lines<Output>,
}

impl ChipLine {
    pub fn pin(&self) -> u32 {
        self.pin
    }
}

impl OutputLine for ChipLine {
    fn set(&mut self, high: bool) -> Result<(), LineError> {
        self.lines
            .set_values([high])
            .map_err(|source| LineError::Write {
                pin: self.pin,
                source,
            })
    }
}
