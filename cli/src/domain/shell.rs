//! Shell quoting for values interpolated into remote scripts.

use std::borrow::Cow;

/// Quote `value` as a single POSIX shell word.
///
/// Values made only of safe characters are returned unchanged; anything
/// else is single-quoted with embedded quotes escaped.
#[must_use]
pub fn quote(value: &str) -> String {
    shell_escape::unix::escape(Cow::Borrowed(value)).into_owned()
}
