pub mod city_list;
pub mod pipeline_job;
pub mod search_result;
pub mod upfitter;

pub use city_list::*;
pub use pipeline_job::*;
pub use search_result::*;
pub use upfitter::*;
