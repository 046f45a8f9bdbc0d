use std::io::Write;

use flexi_logger::{DeferredNow, Record, style};

/// `LEVEL message`, with the level colored by severity.
pub fn cli_format(
    w: &mut dyn Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    let level = record.level();
    write!(w, "{} {}", style(level).paint(format!("{level:<5}")), record.args())
}
