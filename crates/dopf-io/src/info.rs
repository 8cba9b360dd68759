use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::grammar::parse_document;

/// Sampling layout shared by every load file of a data set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadFileInfo {
    pub slots_per_file: usize,
    pub slot_length_minutes: f64,
}

pub fn read_info(path: &Path) -> Result<LoadFileInfo> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_info(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_info(input: &str) -> Result<LoadFileInfo> {
    let root = parse_document(input)?;
    root.expect_tag("info")?;
    let info = LoadFileInfo {
        slots_per_file: root.required("numSlotPerFile")?.value()?,
        slot_length_minutes: root.required("numMinutePerSlot")?.value()?,
    };
    if info.slot_length_minutes <= 0.0 {
        bail!(
            "numMinutePerSlot must be positive, got {}",
            info.slot_length_minutes
        );
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let info = parse_info(
            "<info>\n <numSlotPerFile> 288 </numSlotPerFile>\n <numMinutePerSlot> 5 </numMinutePerSlot>\n</info>",
        )
        .unwrap();
        assert_eq!(info.slots_per_file, 288);
        assert_eq!(info.slot_length_minutes, 5.0);
    }

    #[test]
    fn test_rejects_zero_slot_length() {
        let err = parse_info(
            "<info><numSlotPerFile>1</numSlotPerFile><numMinutePerSlot>0</numMinutePerSlot></info>",
        )
        .unwrap_err();
        assert!(err.to_string().contains("positive"));
    }
}
