pub mod athlete;
pub mod invite;
pub mod training;
pub mod user;
