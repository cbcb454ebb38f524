//! HTTP transport: route table and the static-asset mount. Handlers
//! themselves live in [`crate::flow::handlers`]; this module only wires
//! them onto paths.

mod routes;

pub use routes::create_router;
