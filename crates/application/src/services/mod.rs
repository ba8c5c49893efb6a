mod message_service;
mod participant_service;

#[cfg(test)]
mod tests;

pub use message_service::{MessageService, MessageServiceDependencies};
pub use participant_service::{ParticipantService, ParticipantServiceDependencies};
