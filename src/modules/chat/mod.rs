pub mod controller;
pub mod routes;
pub mod schema;
pub mod stream;
pub mod validation;
