pub mod layout;
pub mod inventory;
pub mod reservations;
pub mod occurrences;
pub mod waitlist;
pub mod seatmap;
pub mod loans;
pub mod sweeper;
