// Outbound network side of the LTI tool: fetching platform key sets to
// validate launches, and delivering scores back to platforms.

pub mod delivery;
pub mod jwks;
pub mod validator;

#[cfg(test)]
pub(crate) mod test_support;

pub use delivery::ScoreDelivery;
pub use jwks::RemoteKeySet;
pub use validator::TokenValidator;
