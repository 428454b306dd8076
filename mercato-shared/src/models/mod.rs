pub mod events;
pub mod purchase;
pub mod snapshots;
