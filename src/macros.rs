#![allow(clippy::redundant_pub_crate)]

/// Implements a C-style for loop, for use in const fn.
macro_rules! cfor {
    ($init: stmt; $cond: expr; $step: expr; $body: block) => {{
        $init
        while $cond {
            $body;

            $step;
        }
    }};
}

pub(crate) use cfor;
