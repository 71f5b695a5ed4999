// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostic output for the control endpoint.
//!
//! With the `log` feature these forward to the `log` crate. Without it they
//! vanish, but still type-check their format arguments so that a build with
//! logging turned off can't rot.

cfg_if::cfg_if! {
    if #[cfg(feature = "log")] {
        macro_rules! ep0_trace {
            ($($arg:tt)*) => { log::trace!($($arg)*) };
        }
        macro_rules! ep0_debug {
            ($($arg:tt)*) => { log::debug!($($arg)*) };
        }
        macro_rules! ep0_warn {
            ($($arg:tt)*) => { log::warn!($($arg)*) };
        }
    } else {
        macro_rules! ep0_trace {
            ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
        }
        macro_rules! ep0_debug {
            ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
        }
        macro_rules! ep0_warn {
            ($($arg:tt)*) => {{ let _ = format_args!($($arg)*); }};
        }
    }
}

pub(crate) use {ep0_debug, ep0_trace, ep0_warn};
