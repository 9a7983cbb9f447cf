#[cfg(feature = "engine-fixture")]
pub mod fixture;
