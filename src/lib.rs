// Core layer - shared types and configuration
pub mod core;

// Features layer - all feature modules
pub mod features;

// External collaborators - rules engine client and messaging adapters
pub mod discord;
pub mod game;

// Re-export core config for backwards compatibility
pub use core::Config;

// Re-export feature items for backwards compatibility
pub use features::ReminderScheduler;
