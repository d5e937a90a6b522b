// Lifecycle actions across a machine set
pub mod lifecycle;
