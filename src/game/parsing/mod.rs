pub mod json;
pub mod osu;

/// Splits a `Key: Value` line, trimming both halves.
#[inline(always)]
pub(crate) fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key.trim(), value.trim()))
}
