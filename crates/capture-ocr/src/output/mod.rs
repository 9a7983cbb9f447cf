//! Debug artefacts written alongside recognition.

mod roi;

pub use roi::{DumpError, RoiDumper};
