// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Deterministic SVG identicons.
//!
//! The SHA-256 of the username drives a 5x5 grid mirrored around the middle
//! column; gender picks the palette.

use crate::models::Gender;
use sha2::{Digest, Sha256};
use std::fmt::Write;

const GRID: usize = 5;
const CELL: usize = 48;
const PADDING: usize = 24;

pub const CONTENT_TYPE: &str = "image/svg+xml";

fn palette(gender: Gender) -> &'static [&'static str] {
    match gender {
        Gender::Male => &["#1e88e5", "#3949ab", "#00897b", "#5e35b1"],
        Gender::Female => &["#d81b60", "#8e24aa", "#f4511e", "#c0ca33"],
        Gender::Other => &["#43a047", "#6d4c41", "#fb8c00", "#546e7a"],
    }
}

/// A generated avatar image.
#[derive(Debug, Clone, PartialEq)]
pub struct Avatar {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Render the identicon for a user.
pub fn generate(username: &str, gender: Gender) -> Avatar {
    let digest = Sha256::digest(username.as_bytes());
    let colors = palette(gender);
    let fg = colors[usize::from(digest[0]) % colors.len()];

    let size = GRID * CELL + 2 * PADDING;
    let mut svg = String::with_capacity(2048);
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" viewBox="0 0 {size} {size}">"#
    );
    let _ = write!(svg, r##"<rect width="{size}" height="{size}" fill="#f0f0f0"/>"##);
    let _ = write!(svg, r#"<g fill="{fg}">"#);

    // Only the left three columns come from the hash; the rest mirror them.
    let half = GRID.div_ceil(2);
    for row in 0..GRID {
        for col in 0..half {
            let bit = digest[1 + row * half + col] & 1 == 1;
            if !bit {
                continue;
            }
            for x in [col, GRID - 1 - col] {
                let _ = write!(
                    svg,
                    r#"<rect x="{}" y="{}" width="{CELL}" height="{CELL}"/>"#,
                    PADDING + x * CELL,
                    PADDING + row * CELL,
                );
                if x == GRID - 1 - x {
                    break;
                }
            }
        }
    }
    svg.push_str("</g></svg>");

    Avatar {
        filename: format!("{username}.svg"),
        bytes: svg.into_bytes(),
    }
}
