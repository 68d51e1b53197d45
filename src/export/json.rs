use anyhow::Result;
use std::io::Write;

use crate::state::Summary;

/// Export run summary as pretty-printed JSON
pub fn export_json<W: Write>(summary: &Summary, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writeln!(writer)?;
    Ok(())
}
