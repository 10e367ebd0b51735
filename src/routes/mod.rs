pub mod default_route;
pub mod upfitter_route;
