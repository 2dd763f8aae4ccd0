//! Integration tests for the batch processing engine

mod batch_processing;
mod error_handling;

use std::fs;
use std::path::{Path, PathBuf};

/// Report with a two-point map and readings every five minutes from `start_minute`
pub(crate) fn report(start_minute: u32, kw: &[&str]) -> String {
    let mut content = String::from(
        "\"TI_ANDY_SCHEDULER_USE_REPORT\"\n\
\"Point_1:\",\"CH-1.KW\",\"\",\"5 minutes\"\n\
\"Point_2:\",\"CH-0.RT\",\"\",\"5 minutes\"\n\
\"<>Date\",\"Time\",\"Point_1\",\"Point_2\"\n",
    );
    for (i, value) in kw.iter().enumerate() {
        let minute = start_minute + 5 * i as u32;
        content.push_str(&format!(
            "\"2024/01/01\",\"{:02}:{:02}:00\",\"{}\",\"500\"\n",
            minute / 60,
            minute % 60,
            value
        ));
    }
    content
}

pub(crate) fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}
