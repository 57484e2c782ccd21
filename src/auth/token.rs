//! Token sets issued by the identity provider and the secret wrapper guarding them.

pub mod secret;
pub mod set;
