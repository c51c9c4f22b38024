pub mod client_access;
pub mod owner_auth;
