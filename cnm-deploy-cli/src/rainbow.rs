// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! Rainbow-colored progress lines for the terminal.
//!
//! Progress output (the banner and the `[OK]` lines) is muted by `--silent`.
//! Command results such as a rendered manifest are printed with `println!`
//! and are never muted.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};

static SILENT: AtomicBool = AtomicBool::new(false);

/// Mutes or unmutes every later [`rainbow_println`].
pub fn set_silent(silent: bool) {
    SILENT.store(silent, Ordering::SeqCst);
}

/// Whether progress lines are muted.
pub fn is_silent() -> bool {
    SILENT.load(Ordering::SeqCst)
}

/// Prints a progress line in rainbow colors, unless muted.
pub fn rainbow_println<S: AsRef<str>>(line: S) {
    if is_silent() {
        return;
    }
    println!("{}", rainbow(line.as_ref()));
}

/// Wraps every visible character of `text` in a 24-bit color escape.
fn rainbow(text: &str) -> String {
    let mut out = String::with_capacity(text.len() * 20);
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            out.push(c);
        } else {
            let (r, g, b) = rgb(i as f64 / 3.0);
            out.push_str(&format!("\x1b[38;2;{};{};{}m{}\x1b[0m", r, g, b, c));
        }
    }
    out
}

/// Three sine waves a third of a turn apart, sampled at `x`.
fn rgb(x: f64) -> (u8, u8, u8) {
    let channel = |phase: f64| ((0.1 * x + phase).sin() * 127.0 + 128.0) as u8;
    (channel(0.0), channel(2.0 * PI / 3.0), channel(4.0 * PI / 3.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_is_colored() {
        let banner = include_str!("./banner");
        let colored = rainbow(banner);
        assert!(colored.contains("\x1b[38;2;"));
        assert_eq!(colored.lines().count(), banner.lines().count());
        rainbow_println(banner);
    }

    #[test]
    fn whitespace_is_left_alone() {
        assert_eq!(rainbow(" \n\t"), " \n\t");
        assert_eq!(rainbow("[OK]").matches("\x1b[0m").count(), 4);
    }

    #[test]
    fn channels_stay_in_range() {
        for i in 0..512 {
            let (r, g, b) = rgb(i as f64 / 3.0);
            assert!(r >= 1 && g >= 1 && b >= 1);
        }
    }
}
