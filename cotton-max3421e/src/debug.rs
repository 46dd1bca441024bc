// feature=defmt and os=none? use defmt
//   feature=std? use std (warnings to stderr)
//     neither? compile to nothing

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "std")]
pub use std::{eprintln as warn, println};

#[cfg(all(not(feature = "std"), target_os = "none", feature = "defmt"))]
pub use defmt::{debug as println, warn};

#[cfg(all(
    not(feature = "std"),
    not(all(target_os = "none", feature = "defmt"))
))]
#[macro_export]
macro_rules! println {
    ($fmt:expr) => {};
    ($fmt:expr, $($arg:tt)*) => {};
}

#[cfg(all(
    not(feature = "std"),
    not(all(target_os = "none", feature = "defmt"))
))]
#[macro_export]
macro_rules! warn {
    ($fmt:expr) => {};
    ($fmt:expr, $($arg:tt)*) => {};
}

#[cfg(all(
    not(feature = "std"),
    not(all(target_os = "none", feature = "defmt"))
))]
pub use {println, warn};
