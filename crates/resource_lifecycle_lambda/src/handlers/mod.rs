pub mod lifecycle;
pub mod notifier;
