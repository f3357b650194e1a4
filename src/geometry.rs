//! Boundary-line solver for manual split geometry.
//!
//! The solver is pure and total: any four raw inputs plus a minimum-gap ratio
//! come back as normalized boundaries in `[0, 1]`, rounded to six decimal
//! places, satisfying the layout's ordering and gap invariants.

use crate::types::{ImageKind, Lines};

/// Tolerance used for all line comparisons across the crate.
pub const LINE_EPSILON: f64 = 1e-6;

/// Minimum guard width between the two crop lines in double layout.
const DOUBLE_GUARD_FLOOR: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitLayout {
    /// Four independent boundaries (ordinary content pages).
    Quad,
    /// Two mirrored boundary pairs (cover and spread images).
    Double,
}

impl SplitLayout {
    pub fn for_kind(kind: ImageKind) -> Self {
        match kind {
            ImageKind::Content => SplitLayout::Quad,
            ImageKind::Cover | ImageKind::Spread => SplitLayout::Double,
        }
    }
}

pub fn solve_lines(raw: Lines, gutter: f64, layout: SplitLayout) -> Lines {
    let gutter = if gutter.is_finite() {
        gutter.clamp(0.0, 0.5)
    } else {
        0.0
    };
    match layout {
        SplitLayout::Quad => solve_quad(raw, gutter),
        SplitLayout::Double => solve_double(raw, gutter),
    }
}

/// Componentwise comparison within [`LINE_EPSILON`].
pub fn lines_equal(a: Lines, b: Lines) -> bool {
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| (x - y).abs() <= LINE_EPSILON)
}

fn solve_quad(raw: Lines, gutter: f64) -> Lines {
    let left_trim = sanitize(raw[0], 0.0);
    if left_trim >= 1.0 {
        return [1.0, 1.0, 1.0, 1.0];
    }

    let mut a = left_trim;
    let mut b = sanitize(raw[1], left_trim + gutter);
    let mut c = sanitize(raw[2], b + gutter);
    let mut d = sanitize(raw[3], 1.0);

    // Forward sweep: push each boundary past its predecessor by the gap.
    if b - a < gutter - LINE_EPSILON {
        b = a + gutter;
    }
    if c - b < gutter - LINE_EPSILON {
        c = b + gutter;
    }
    if d - c < gutter - LINE_EPSILON {
        d = c + gutter;
    }

    // The sweep may have run past the right edge; redistribute the overflow
    // right-to-left while keeping the gap floor.
    if d > 1.0 {
        d = 1.0;
        if c > d - gutter {
            c = d - gutter;
        }
        if b > c - gutter {
            b = c - gutter;
        }
        if a > b - gutter {
            a = b - gutter;
        }
    }
    if c > 1.0 {
        c = 1.0;
        if b > c - gutter {
            b = c - gutter;
        }
        if a > b - gutter {
            a = b - gutter;
        }
    }

    // Gaps can only fall short of the gutter here when three full gaps do not
    // fit in [0, 1]; ordering is still restored.
    a = a.clamp(0.0, 1.0);
    b = b.clamp(a, 1.0);
    c = c.clamp(b, 1.0);
    d = d.clamp(c, 1.0);

    [round6(a), round6(b), round6(c), round6(d)]
}

fn solve_double(raw: Lines, gutter: f64) -> Lines {
    let guard = gutter.max(DOUBLE_GUARD_FLOOR);
    let mut left = sanitize(raw[0], 0.0);
    let mut right = sanitize(raw[3], 1.0);

    if right - left < guard - LINE_EPSILON {
        right = (left + guard).min(1.0);
        if right - left < guard - LINE_EPSILON && left > 0.0 {
            left = (1.0 - guard).max(0.0);
        }
    }

    let left = round6(left);
    let right = round6(right.max(left));
    [left, left, right, right]
}

fn sanitize(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}
