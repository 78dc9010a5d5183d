pub mod event;
pub mod property;
pub mod reservation;

pub use event::{EventAction, ReservationEvent};
pub use property::{Property, PropertyResolver};
pub use reservation::Reservation;
