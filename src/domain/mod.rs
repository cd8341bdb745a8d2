//! Domain model: CMS message structure, verification outcomes, shared
//! types and constants. Free of I/O and crypto backends.

pub mod cms;
pub mod constants;
pub mod types;
pub mod verification;
