//! File content assertions
//!
//! Expected text is normalized like the content it is compared with, so a
//! literal written with `\r\n` matches a file stored with `\n` and the
//! other way round.

use vaultbridge_common::text::lines;
use vaultbridge_common::{normalize_eol, ReadMode};

use crate::bridge::Bridge;
use crate::content::read_file;
use crate::error::{HarnessError, HarnessResult};

/// Whole-file comparison
pub async fn assert_file_equals(
    bridge: &Bridge,
    path: &str,
    expected: &str,
    mode: ReadMode,
) -> HarnessResult<()> {
    let actual = read_file(bridge, path, mode).await?;
    check_file(path, &actual, expected)
}

/// Compare one zero-based line
pub async fn assert_line_equals(
    bridge: &Bridge,
    path: &str,
    line: usize,
    expected: &str,
    mode: ReadMode,
) -> HarnessResult<()> {
    let actual = read_file(bridge, path, mode).await?;
    check_line(path, &actual, line, expected)
}

/// Compare lines `start..end`, with `end` clamped to the file length
pub async fn assert_lines_equal(
    bridge: &Bridge,
    path: &str,
    start: usize,
    end: usize,
    expected: &str,
    mode: ReadMode,
) -> HarnessResult<()> {
    let actual = read_file(bridge, path, mode).await?;
    check_lines(path, &actual, start, end, expected)
}

pub(crate) fn check_file(path: &str, actual: &str, expected: &str) -> HarnessResult<()> {
    let expected = normalize_eol(expected);
    if actual != expected {
        return Err(HarnessError::AssertionFailed(format!(
            "{}: expected {:?}, got {:?}",
            path, expected, actual
        )));
    }
    Ok(())
}

pub(crate) fn check_line(path: &str, actual: &str, line: usize, expected: &str) -> HarnessResult<()> {
    let all = lines(actual);
    let expected = normalize_eol(expected);
    match all.get(line) {
        Some(got) if *got == expected => Ok(()),
        Some(got) => Err(HarnessError::AssertionFailed(format!(
            "{} line {}: expected {:?}, got {:?}",
            path, line, expected, got
        ))),
        None => Err(HarnessError::AssertionFailed(format!(
            "{} line {}: file has only {} lines",
            path,
            line,
            all.len()
        ))),
    }
}

pub(crate) fn check_lines(
    path: &str,
    actual: &str,
    start: usize,
    end: usize,
    expected: &str,
) -> HarnessResult<()> {
    let all = lines(actual);
    let end = end.min(all.len());
    let start = start.min(end);
    let got = &all[start..end];

    let expected = normalize_eol(expected);
    let want = lines(&expected);
    if got != want.as_slice() {
        return Err(HarnessError::AssertionFailed(format!(
            "{} lines {}..{}: expected {:?}, got {:?}",
            path, start, end, want, got
        )));
    }
    Ok(())
}
