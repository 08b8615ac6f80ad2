pub mod lifecycle;

pub use lifecycle::{
    allowed_transitions, can_transition, NewTicket, TicketLifecycle, TransitionOutcome,
};
