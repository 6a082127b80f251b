pub use std::backtrace::Backtrace;

pub use anyhow::{
    anyhow,
    bail,
    ensure,
};
pub use paste::paste;
pub use regex::{
    Regex,
    RegexBuilder,
};
pub use thiserror::Error;

pub type EmptyResult = anyhow::Result<()>;

pub const BUILD_DIR: &str = "/.build/";
pub const RUSTC_DIR: &str = "/rustc/";
pub const CARGO_REGISTRY_DIR: &str = "/.cargo/registry/";

// Declares a thiserror enum and, for every variant, a snake-case constructor that wraps the
// variant in an anyhow::Error, i.e. `KubeconfigError::duplicate_context("foo")`.
#[macro_export]
macro_rules! err_impl {
    (@hidden $errtype:ident, $item:ident, String) => {
        paste! {
            pub(crate) fn [<$item:snake>](in_: &str) -> anyhow::Error {
                anyhow!{$errtype::$item(in_.into())}
            }
        }
    };

    (@hidden $errtype:ident, $item:ident, $($dtype:tt)::+) => {
        paste! {
            pub(crate) fn [<$item:snake>](in_: &$($dtype)::+) -> anyhow::Error {
                anyhow!{$errtype::$item(in_.clone())}
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
            $(err_impl! {@hidden $errtype, $item, $($dtype)::+})+
        }
    };
}

// Logs an anyhow error along with the part of its backtrace that points into our own code.
// Frames from the toolchain, the build directory and third-party crates (mostly tokio and
// kube internals) get collapsed into "skipped" markers, which turns an eighty-frame trace from
// the orchestration loop into something readable.
//
// Building the regex and walking the backtrace is not cheap; only call this on paths that end
// a task.
#[macro_export]
macro_rules! mkerr {
    (@hidden $err:ident, $msg:literal, $($args:expr),*) => {
        let bt = $err.backtrace().to_string();
        let re = RegexBuilder::new(r"^\s+\d+(?s:.*?)(\s+at\s+.*:\d+)$")
            .multi_line(true)
            .build()
            .unwrap();
        let mut skipped_frames = 0;
        let mut filtered_bt = re.find_iter(&bt).fold(String::new(), |mut acc, frame| {
            let frame = frame.as_str();
            if frame.contains(BUILD_DIR) || frame.contains(RUSTC_DIR) || frame.contains(CARGO_REGISTRY_DIR) {
                skipped_frames += 1;
            } else if !frame.is_empty() {
                if skipped_frames == 1 {
                    acc += &format!("      -- <skipped 1 frame> --\n");
                } else if skipped_frames > 1 {
                    acc += &format!("      -- <skipped {skipped_frames} frames> --\n");
                }
                acc += &format!("{frame}\n");
                skipped_frames = 0;
            }
            acc
        });

        if skipped_frames == 1 {
            filtered_bt += &format!("      -- <skipped 1 frame> --");
        } else if skipped_frames > 1 {
            filtered_bt += &format!("      -- <skipped {skipped_frames} frames> --");
        }
        error!(concat!($msg, "\n\n{}\n\nPartial Stack Trace:\n\n{}\n\n") $(, $args)*, $err, filtered_bt);
    };

    ($err:ident, $msg:literal) => {
        mkerr! {@hidden $err, $msg, };
    };

    ($err:ident, $msg:literal, $($args:expr),*) => {
        mkerr! {@hidden $err, $msg, $($args),*};
    };
}

pub use {
    err_impl,
    mkerr,
};
