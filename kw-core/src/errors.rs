pub use anyhow::{
    anyhow,
    bail,
    ensure,
};
use lazy_static::lazy_static;
pub use paste::paste;
use regex::{
    Regex,
    RegexBuilder,
};
pub use thiserror::Error;

pub type EmptyResult = anyhow::Result<()>;

// Frames from the standard library, the compiler, or libc are never interesting to us
const IGNORED_FRAME_MARKERS: &[&str] = &["/.build/", "/rustc/", "glibc"];

lazy_static! {
    static ref FRAME_RE: Regex = RegexBuilder::new(r"^\s+\d+(?s:.*?)(\s+at\s+.*:\d+)$")
        .multi_line(true)
        .build()
        .expect("backtrace frame regex should compile");
}

// Generates a thiserror enum, plus a snake-case constructor for each variant that returns an
// anyhow::Error; `ConfigError::invalid("...")` reads better at the call site than the alternative.
// String variants take a &str, everything else takes a reference and clones it.
#[macro_export]
macro_rules! err_impl {
    (@ctor $errtype:ident, $item:ident, String) => {
        $crate::errors::paste! {
            pub(crate) fn [<$item:snake>](in_: &str) -> anyhow::Error {
                $crate::errors::anyhow!($errtype::$item(in_.into()))
            }
        }
    };

    (@ctor $errtype:ident, $item:ident, $($dtype:tt)::+) => {
        $crate::errors::paste! {
            pub(crate) fn [<$item:snake>](in_: &$($dtype)::+) -> anyhow::Error {
                $crate::errors::anyhow!($errtype::$item(in_.clone()))
            }
        }
    };

    ($errtype:ident,
        $(#[$errinfo:meta] $item:ident($($dtype:tt)::+),)+
    ) => {
        #[derive(Debug, Error)]
        pub(crate) enum $errtype {
            $(#[$errinfo] $item($($dtype)::+)),+
        }

        impl $errtype {
            $($crate::err_impl! {@ctor $errtype, $item, $($dtype)::+})+
        }
    };
}

// Cuts a backtrace down to the frames from our own code, replacing each run of dropped frames with
// a marker so it's still clear where the gaps are.
pub fn prune_backtrace(bt: &str) -> String {
    let mut pruned = String::new();
    let mut skipped = 0;
    for frame in FRAME_RE.find_iter(bt).map(|m| m.as_str()) {
        if IGNORED_FRAME_MARKERS.iter().any(|marker| frame.contains(marker)) {
            skipped += 1;
            continue;
        }
        note_skipped(&mut pruned, skipped);
        skipped = 0;
        pruned.push_str(frame);
        pruned.push('\n');
    }
    note_skipped(&mut pruned, skipped);
    pruned
}

fn note_skipped(out: &mut String, skipped: usize) {
    match skipped {
        0 => (),
        1 => out.push_str("      -- <skipped 1 frame> --\n"),
        n => out.push_str(&format!("      -- <skipped {n} frames> --\n")),
    }
}

// Logs an anyhow::Error along with the relevant part of its backtrace.  Capturing and filtering the
// backtrace isn't cheap, so save this for failures that end a task or the process.
#[macro_export]
macro_rules! skerr {
    ($err:ident, $msg:literal $(, $args:expr)* $(,)?) => {
        error!(
            concat!($msg, "\n\n{}\n\nPartial Stack Trace:\n\n{}\n")
            $(, $args)*,
            $err,
            $crate::errors::prune_backtrace(&$err.backtrace().to_string())
        )
    };
}

pub use {
    err_impl,
    skerr,
};
