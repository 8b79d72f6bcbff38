pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod scan;
pub mod scans;
pub mod tickets;

pub use routes::create_router;
