//! Operator HTTP surface for the Courier pipeline: health, worker status,
//! notification inspection, and the manual retry trigger. No authentication —
//! this API is deployed behind the operator network boundary.

pub mod routes;
pub mod state;
