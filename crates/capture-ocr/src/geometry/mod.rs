pub mod reconcile;

pub use reconcile::{CoordinateReconciler, ScaleFactors, restore};
