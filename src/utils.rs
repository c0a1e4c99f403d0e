/// Utility functions for formatting
use time::macros::format_description;
use time::OffsetDateTime;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS.mmm format.
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    let format = format_description!(
        "[day].[month].[year] - [hour]:[minute]:[second].[subsecond digits:3]"
    );
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}
