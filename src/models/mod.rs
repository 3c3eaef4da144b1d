pub mod studio;
pub mod seat;
pub mod occurrence;
pub mod assignment;
pub mod waitlist;
pub mod loan;

pub use studio::{AddressingMode, NewStudio, Studio};
pub use seat::Seat;
pub use occurrence::{BookingWindows, ClassOccurrence, NewOccurrence, OccurrenceStatus};
pub use assignment::{AssignmentStatus, EffectiveStatus, SeatAssignment};
pub use waitlist::{WaitlistEntry, WaitlistStatus};
pub use loan::{FootwearReservation, FootwearStatus, SizeGroup};
