// ── DDC/CI monitor control via ddcutil ──

use std::fmt;
use std::path::PathBuf;

use super::{ControlSurface, run_tool};
use crate::error::ControlError;
use crate::model::Level;

/// Native range of the VCP features driven here.
const VCP_MAX: u16 = 100;

/// A VCP feature of a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DisplayField {
    Brightness,
    Contrast,
}

impl DisplayField {
    /// MCCS VCP feature code.
    pub fn vcp_code(self) -> u8 {
        match self {
            Self::Brightness => 0x10,
            Self::Contrast => 0x12,
        }
    }
}

impl fmt::Display for DisplayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Brightness => "brightness",
            Self::Contrast => "contrast",
        })
    }
}

/// Sets brightness/contrast through `ddcutil --display N setvcp CODE VALUE`.
/// Targets are ddcutil display numbers (1-based).
#[derive(Debug, Clone)]
pub struct DdcutilSurface {
    program: PathBuf,
}

impl DdcutilSurface {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn args(display: u32, field: DisplayField, value: u16) -> Vec<String> {
        vec![
            "--display".to_owned(),
            display.to_string(),
            "setvcp".to_owned(),
            format!("0x{:02x}", field.vcp_code()),
            value.to_string(),
        ]
    }
}

impl ControlSurface for DdcutilSurface {
    type Target = u32;
    type Field = DisplayField;
    type Native = u16;

    fn name(&self) -> &'static str {
        "ddcutil"
    }

    fn scale(&self, _display: &u32, _field: DisplayField, level: Level) -> u16 {
        level.to_scale(VCP_MAX)
    }

    async fn send(&self, display: &u32, field: DisplayField, value: u16) -> Result<(), ControlError> {
        run_tool(&self.program, &Self::args(*display, field, value)).await
    }
}
