//! Domain logic
//!
//! Pure functions over one record at a time. Both the device and the
//! server call into this module, so given the same inputs (record, clock
//! reading and calendar policy) they compute identical results.

pub mod clock;
pub mod focus;
pub mod habits;
pub mod rules;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use habits::{CalendarPolicy, HabitPeriod, HabitStats};
