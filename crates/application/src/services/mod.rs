mod join_service;
mod token_service;

#[cfg(test)]
mod token_service_tests;

pub use join_service::{JoinService, TokenProvider};
pub use token_service::{
    AccessGrant, JoinTicket, RoomProvisioner, TokenIssuer, TokenRequest, TokenService,
    TokenServiceDependencies, MISSING_FIELDS_MESSAGE,
};
